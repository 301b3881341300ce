//! Change Log (§4.3): persistent, per-document, append-only sequence of applied operations
//! with a mutable `versionId` column.

use crate::errors::CoreResult;
use crate::ids::{ChangeLogEntryId, DocumentId, UserId, VersionId};
use crate::operation::OperationKind;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeLogEntry {
    pub id: ChangeLogEntryId,
    pub document_id: DocumentId,
    pub author_id: UserId,
    pub change_type: OperationKind,
    /// Inserted text (Insert) or the text that was removed (Delete), captured at
    /// application time.
    pub text: String,
    pub position: u64,
    /// The operation-sequence number this entry corresponds to (§3's `operationId`). Kept
    /// alongside the entry's own persistence-layer `id` so a document's next operation id can
    /// be recovered from the log itself when its room respawns, instead of always restarting
    /// at zero.
    pub operation_id: u64,
    pub timestamp: OffsetDateTime,
    pub version_id: Option<VersionId>,
}

/// Persistence boundary for the change log. A real deployment backs this with the
/// `change_tracking` table of §6; this crate ships an in-memory implementation good enough
/// for tests and for running the server standalone.
pub trait ChangeLog: Send + Sync {
    /// Appends `entry`. Fallible so a real backend's I/O failure can be surfaced as
    /// `CoreError::Transient` and retried with bounded backoff by the caller (§7); the
    /// in-memory implementation never fails.
    fn append(&self, entry: ChangeLogEntry) -> CoreResult<()>;
    /// Mints a persistence-layer id for a new entry, independent of `operation_id` (so two
    /// entries never collide on id even across room respawns, which reuse `operation_id`
    /// values recovered from `next_operation_id`).
    fn next_entry_id(&self, document_id: &DocumentId) -> ChangeLogEntryId;
    /// The operation id a newly (re)spawned room should resume numbering from: one past the
    /// highest `operation_id` ever appended for `document_id`, or 0 if the log is empty.
    /// §3: "operationId ... defines total order" for the *document*, not for a given room
    /// task's lifetime, so this must survive the room tearing down and respawning.
    fn next_operation_id(&self, document_id: &DocumentId) -> u64;
    fn list_unversioned(&self, document_id: &DocumentId) -> Vec<ChangeLogEntry>;
    /// Sets `version_id` on every currently unversioned entry of `document_id`. Must be
    /// called atomically with the creation of that version row (the in-memory
    /// implementation achieves this by holding its lock across both writes at the call
    /// site in `VersionController::create_version`).
    fn link_to_version(&self, document_id: &DocumentId, version_id: VersionId);
    /// Resets `version_id` to `None` on every entry belonging to the given versions. Used
    /// by explicit document deletion; revert (strategy B) never calls this.
    fn unlink(&self, document_id: &DocumentId, version_ids: &[VersionId]);
    fn list_by_version(&self, version_id: &VersionId) -> Vec<ChangeLogEntry>;
    /// Cascade-removes every entry for a deleted document.
    fn delete_all_for_document(&self, document_id: &DocumentId);
}

/// Lets a shared `Arc<dyn ChangeLog>` (the shape the registry hands every room) be used
/// anywhere a generic `L: ChangeLog` is expected, e.g. `VersionController`.
impl<T: ChangeLog + ?Sized> ChangeLog for Arc<T> {
    fn append(&self, entry: ChangeLogEntry) -> CoreResult<()> {
        (**self).append(entry)
    }

    fn next_entry_id(&self, document_id: &DocumentId) -> ChangeLogEntryId {
        (**self).next_entry_id(document_id)
    }

    fn next_operation_id(&self, document_id: &DocumentId) -> u64 {
        (**self).next_operation_id(document_id)
    }

    fn list_unversioned(&self, document_id: &DocumentId) -> Vec<ChangeLogEntry> {
        (**self).list_unversioned(document_id)
    }

    fn link_to_version(&self, document_id: &DocumentId, version_id: VersionId) {
        (**self).link_to_version(document_id, version_id);
    }

    fn unlink(&self, document_id: &DocumentId, version_ids: &[VersionId]) {
        (**self).unlink(document_id, version_ids);
    }

    fn list_by_version(&self, version_id: &VersionId) -> Vec<ChangeLogEntry> {
        (**self).list_by_version(version_id)
    }

    fn delete_all_for_document(&self, document_id: &DocumentId) {
        (**self).delete_all_for_document(document_id);
    }
}

#[derive(Default)]
pub struct InMemoryChangeLog {
    entries: Mutex<HashMap<DocumentId, Vec<ChangeLogEntry>>>,
    next_id: AtomicU64,
}

impl InMemoryChangeLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChangeLog for InMemoryChangeLog {
    fn append(&self, entry: ChangeLogEntry) -> CoreResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.entry(entry.document_id.clone()).or_default().push(entry);
        Ok(())
    }

    fn next_entry_id(&self, _document_id: &DocumentId) -> ChangeLogEntryId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        ChangeLogEntryId(format!("cle-{id}"))
    }

    fn next_operation_id(&self, document_id: &DocumentId) -> u64 {
        let entries = self.entries.lock().unwrap();
        entries
            .get(document_id)
            .and_then(|v| v.iter().map(|e| e.operation_id).max())
            .map_or(0, |max| max + 1)
    }

    fn list_unversioned(&self, document_id: &DocumentId) -> Vec<ChangeLogEntry> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(document_id)
            .map(|v| {
                v.iter()
                    .filter(|e| e.version_id.is_none())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn link_to_version(&self, document_id: &DocumentId, version_id: VersionId) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(v) = entries.get_mut(document_id) {
            for entry in v.iter_mut() {
                if entry.version_id.is_none() {
                    entry.version_id = Some(version_id.clone());
                }
            }
        }
    }

    fn unlink(&self, document_id: &DocumentId, version_ids: &[VersionId]) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(v) = entries.get_mut(document_id) {
            for entry in v.iter_mut() {
                if let Some(current) = &entry.version_id {
                    if version_ids.contains(current) {
                        entry.version_id = None;
                    }
                }
            }
        }
    }

    fn list_by_version(&self, version_id: &VersionId) -> Vec<ChangeLogEntry> {
        let entries = self.entries.lock().unwrap();
        entries
            .values()
            .flat_map(|v| v.iter())
            .filter(|e| e.version_id.as_ref() == Some(version_id))
            .cloned()
            .collect()
    }

    fn delete_all_for_document(&self, document_id: &DocumentId) {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(document_id);
    }
}
