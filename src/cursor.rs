//! Cursor Tracker (§4.7): ephemeral, per-document caret positions with a deterministic
//! color assignment. Lost on room teardown; never persisted.

use crate::ids::{DocumentId, UserId};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorState {
    pub position: u64,
    pub user_name: String,
    pub color: String,
}

#[derive(Default)]
pub struct CursorTracker {
    palette: Vec<String>,
    cursors: Mutex<HashMap<DocumentId, HashMap<UserId, CursorState>>>,
}

impl CursorTracker {
    #[must_use]
    pub fn new(palette: Vec<String>) -> Self {
        assert!(
            palette.len() == 15,
            "cursor palette must contain exactly 15 entries"
        );
        Self {
            palette,
            cursors: Mutex::new(HashMap::new()),
        }
    }

    fn color_for(&self, user_id: &UserId) -> String {
        let hash = user_id.0.bytes().fold(0u64, |acc, b| {
            acc.wrapping_mul(31).wrapping_add(u64::from(b))
        });
        let index = (hash % self.palette.len() as u64) as usize;
        self.palette[index].clone()
    }

    /// Sets the caret entry for (document, user), assigning a color on first sight.
    pub fn update(
        &self,
        document_id: &DocumentId,
        user_id: &UserId,
        position: u64,
        user_name: impl Into<String>,
    ) -> CursorState {
        let color = self.color_for(user_id);
        let mut cursors = self.cursors.lock().unwrap();
        let per_document = cursors.entry(document_id.clone()).or_default();
        let state = per_document
            .entry(user_id.clone())
            .or_insert_with(|| CursorState {
                position,
                user_name: user_name.into(),
                color,
            });
        state.position = position;
        state.clone()
    }

    /// Drops the entry for (document, user); if the inner map empties, drops the outer
    /// entry too.
    pub fn remove(&self, document_id: &DocumentId, user_id: &UserId) {
        let mut cursors = self.cursors.lock().unwrap();
        if let Some(per_document) = cursors.get_mut(document_id) {
            per_document.remove(user_id);
            if per_document.is_empty() {
                cursors.remove(document_id);
            }
        }
    }

    /// Drops `user_id` across every document it has a cursor in.
    pub fn remove_all_for_user(&self, user_id: &UserId) {
        let mut cursors = self.cursors.lock().unwrap();
        cursors.retain(|_, per_document| {
            per_document.remove(user_id);
            !per_document.is_empty()
        });
    }

    #[must_use]
    pub fn list(&self, document_id: &DocumentId) -> HashMap<UserId, CursorState> {
        let cursors = self.cursors.lock().unwrap();
        cursors.get(document_id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_PALETTE;

    fn tracker() -> CursorTracker {
        CursorTracker::new(DEFAULT_PALETTE.iter().map(|s| (*s).to_string()).collect())
    }

    #[test]
    fn color_assignment_is_deterministic() {
        let tracker = tracker();
        let doc = DocumentId("d1".to_string());
        let user = UserId("alice".to_string());

        let first = tracker.update(&doc, &user, 0, "Alice");
        let second = tracker.update(&doc, &user, 5, "Alice");
        assert_eq!(first.color, second.color);
        assert_eq!(second.position, 5);
    }

    #[test]
    fn remove_drops_empty_document_entry() {
        let tracker = tracker();
        let doc = DocumentId("d1".to_string());
        let user = UserId("alice".to_string());

        tracker.update(&doc, &user, 0, "Alice");
        tracker.remove(&doc, &user);
        assert!(tracker.list(&doc).is_empty());
    }

    #[test]
    fn remove_all_for_user_spans_documents() {
        let tracker = tracker();
        let user = UserId("alice".to_string());
        let doc1 = DocumentId("d1".to_string());
        let doc2 = DocumentId("d2".to_string());

        tracker.update(&doc1, &user, 0, "Alice");
        tracker.update(&doc2, &user, 0, "Alice");
        tracker.remove_all_for_user(&user);

        assert!(tracker.list(&doc1).is_empty());
        assert!(tracker.list(&doc2).is_empty());
    }
}
