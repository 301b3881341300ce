//! Contribution accounting (§4.5). Fixed at site (a) per §13: updated incrementally inside
//! `DocumentRoom::apply_edit`, under the same exclusive gate as the text mutation.

use crate::ids::{DocumentId, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq)]
pub struct UserContribution {
    pub document_id: DocumentId,
    pub user_id: UserId,
    pub edit_count: u64,
    pub characters_added: u64,
    pub characters_deleted: u64,
    pub first_contribution: OffsetDateTime,
    pub last_contribution: OffsetDateTime,
}

pub trait ContributionStore: Send + Sync {
    /// Creates the row lazily on first contribution, otherwise updates it in place.
    fn record_insert(&self, document_id: &DocumentId, user_id: &UserId, characters_added: u64);
    fn record_delete(&self, document_id: &DocumentId, user_id: &UserId, characters_deleted: u64);
    fn list_for_document(&self, document_id: &DocumentId) -> Vec<UserContribution>;
    fn delete_all_for_document(&self, document_id: &DocumentId);
}

/// Lets a shared `Arc<dyn ContributionStore>` be used anywhere a generic `C: ContributionStore`
/// is expected, e.g. `VersionController`.
impl<T: ContributionStore + ?Sized> ContributionStore for Arc<T> {
    fn record_insert(&self, document_id: &DocumentId, user_id: &UserId, characters_added: u64) {
        (**self).record_insert(document_id, user_id, characters_added);
    }

    fn record_delete(&self, document_id: &DocumentId, user_id: &UserId, characters_deleted: u64) {
        (**self).record_delete(document_id, user_id, characters_deleted);
    }

    fn list_for_document(&self, document_id: &DocumentId) -> Vec<UserContribution> {
        (**self).list_for_document(document_id)
    }

    fn delete_all_for_document(&self, document_id: &DocumentId) {
        (**self).delete_all_for_document(document_id);
    }
}

#[derive(Default)]
pub struct InMemoryContributionStore {
    rows: Mutex<HashMap<(DocumentId, UserId), UserContribution>>,
}

impl InMemoryContributionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_row(
        &self,
        document_id: &DocumentId,
        user_id: &UserId,
        update: impl FnOnce(&mut UserContribution),
    ) {
        let mut rows = self.rows.lock().unwrap();
        let key = (document_id.clone(), user_id.clone());
        let now = OffsetDateTime::now_utc();
        let row = rows.entry(key).or_insert_with(|| UserContribution {
            document_id: document_id.clone(),
            user_id: user_id.clone(),
            edit_count: 0,
            characters_added: 0,
            characters_deleted: 0,
            first_contribution: now,
            last_contribution: now,
        });
        update(row);
        row.last_contribution = now;
    }
}

impl ContributionStore for InMemoryContributionStore {
    fn record_insert(&self, document_id: &DocumentId, user_id: &UserId, characters_added: u64) {
        self.with_row(document_id, user_id, |row| {
            row.edit_count += 1;
            row.characters_added += characters_added;
        });
    }

    fn record_delete(&self, document_id: &DocumentId, user_id: &UserId, characters_deleted: u64) {
        self.with_row(document_id, user_id, |row| {
            row.edit_count += 1;
            row.characters_deleted += characters_deleted;
        });
    }

    fn list_for_document(&self, document_id: &DocumentId) -> Vec<UserContribution> {
        let rows = self.rows.lock().unwrap();
        rows.values()
            .filter(|r| &r.document_id == document_id)
            .cloned()
            .collect()
    }

    fn delete_all_for_document(&self, document_id: &DocumentId) {
        let mut rows = self.rows.lock().unwrap();
        rows.retain(|(doc, _), _| doc != document_id);
    }
}
