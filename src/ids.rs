//! Newtype identifiers threaded through every component, so that a `UserId` and an
//! `OperationId` can never be swapped by accident at a call site.

use derive_more::{AsRef, Display, From, Into};
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From, Into,
)]
pub struct DocumentId(pub String);

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From, Into,
)]
pub struct UserId(pub String);

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Server-assigned monotonic per-document sequence number; defines total apply order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    From,
    Into,
    AsRef,
)]
pub struct OperationId(pub u64);

/// Dense, zero-based version number for a document (§3: "unique and dense starting at 0").
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    From,
    Into,
    AsRef,
)]
pub struct VersionNumber(pub u64);

/// Server-assigned identity of a persisted `document_versions` row, distinct from its
/// (document-scoped) `VersionNumber`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
pub struct VersionId(pub String);

/// Server-assigned identity of a persisted `change_tracking` row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
pub struct ChangeLogEntryId(pub String);
