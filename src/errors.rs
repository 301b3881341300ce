//! Typed error hierarchy for the core components (§7).
//!
//! Integration seams (registry, transport) deal in `anyhow::Result`; the core components
//! (OTE, DR, CL, VC) return `Result<T, CoreError>` so callers can match on error kind and
//! apply the propagation policy of §7 (per-operation errors never affect other members,
//! per-room errors trigger a controlled reset).

use crate::ids::{DocumentId, UserId, VersionNumber};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed or out-of-range operation, missing required field. Surfaced to the
    /// originator only; never aborts the room.
    #[error("invalid operation: {0}")]
    Validation(String),

    /// Non-member attempting to join or edit. Closes the connection at the boundary.
    #[error("user {user} is not authorized on document {document}")]
    Authorization { document: DocumentId, user: UserId },

    /// Version snapshot request with no unversioned changes; revert to a non-existent
    /// version. Surfaced to the originator.
    #[error("conflict: {0}")]
    Conflict(String),

    /// `baseVersion` older than the retention window of `recent`. The caller must respond
    /// with a `reset` frame.
    #[error("stale base version {base_version} for document {document}, current is {current}")]
    Stale {
        document: DocumentId,
        base_version: u64,
        current: u64,
    },

    /// Downstream I/O failure (change-log append, version persistence). Retried with
    /// bounded backoff where the spec allows it (change-log append); otherwise surfaced.
    #[error("transient failure: {0}")]
    Transient(String),

    /// An invariant was violated (e.g. text length diverged from the expected value after
    /// applying an operation). The room that detects this must be destroyed.
    #[error("invariant violation: {0}")]
    Fatal(String),

    #[error("document {0} not found")]
    DocumentNotFound(DocumentId),

    #[error("document {document} has no version {version}")]
    VersionNotFound {
        document: DocumentId,
        version: VersionNumber,
    },
}

impl CoreError {
    /// Stable, lowercase discriminant for the wire (`protocol::ErrorFrame::kind`) and for
    /// log filtering; kept separate from the `Display` message, which may change wording.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Authorization { .. } => "authorization",
            Self::Conflict(_) => "conflict",
            Self::Stale { .. } => "stale",
            Self::Transient(_) => "transient",
            Self::Fatal(_) => "fatal",
            Self::DocumentNotFound(_) => "document_not_found",
            Self::VersionNotFound { .. } => "version_not_found",
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
