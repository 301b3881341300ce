//! Operational Transformation Engine (§4.1).
//!
//! Pure, stateless transformation of character operations against concurrent peers. This
//! module owns exactly one ordering decision — the author-id tie-break on colliding
//! inserts — everything else in the pipeline derives from it.

use crate::errors::{CoreError, CoreResult};
use crate::ids::{OperationId, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    Insert,
    Delete,
}

/// A single character-level edit. Immutable once assigned an `operation_id`; transforming
/// an operation produces a new value with adjusted `position`/`length`, never mutates the
/// inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OperationKind,
    /// Insert only; must be non-empty.
    pub content: Option<String>,
    /// Delete only; must be > 0.
    pub length: Option<u64>,
    /// 0-based code-point offset into the document text at the moment this operation is
    /// (or was) applied.
    pub position: u64,
    pub author_id: UserId,
    pub document_id: crate::ids::DocumentId,
    /// Assigned by the room once the operation has crossed the exclusive gate; absent on
    /// an operation still in flight from a client.
    pub operation_id: Option<OperationId>,
    /// The operation-sequence number the client believed it was editing against.
    pub base_version: u64,
    /// For an applied Delete, the exact substring removed (captured at apply time, for the
    /// change log). Never set on Insert or on an operation still in flight.
    pub deleted_text: Option<String>,
}

impl Operation {
    #[must_use]
    pub fn insert(
        document_id: crate::ids::DocumentId,
        author_id: UserId,
        position: u64,
        content: impl Into<String>,
        base_version: u64,
    ) -> Self {
        Self {
            kind: OperationKind::Insert,
            content: Some(content.into()),
            length: None,
            position,
            author_id,
            document_id,
            operation_id: None,
            base_version,
            deleted_text: None,
        }
    }

    #[must_use]
    pub fn delete(
        document_id: crate::ids::DocumentId,
        author_id: UserId,
        position: u64,
        length: u64,
        base_version: u64,
    ) -> Self {
        Self {
            kind: OperationKind::Delete,
            content: None,
            length: Some(length),
            position,
            author_id,
            document_id,
            operation_id: None,
            base_version,
            deleted_text: None,
        }
    }

    /// Number of code points this Insert carries. Zero for Delete.
    #[must_use]
    pub fn inserted_len(&self) -> u64 {
        match self.kind {
            OperationKind::Insert => self
                .content
                .as_deref()
                .map_or(0, |s| s.chars().count() as u64),
            OperationKind::Delete => 0,
        }
    }

    /// True once transformation has collapsed this into a zero-length Delete, which is a
    /// no-op downstream (§4.1 edge case, §4.2 step 4).
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.kind == OperationKind::Delete && self.length == Some(0)
    }

    fn with_position(&self, position: u64) -> Self {
        Self {
            position,
            ..self.clone()
        }
    }

    fn with_position_and_length(&self, position: u64, length: u64) -> Self {
        Self {
            position,
            length: Some(length),
            ..self.clone()
        }
    }
}

/// Transforms `op` against a single already-applied `peer` operation, per the pairwise
/// rule table of §4.1. `op` is applied *after* `peer`.
fn transform_pairwise(op: &Operation, peer: &Operation) -> Operation {
    match (op.kind, peer.kind) {
        (OperationKind::Insert, OperationKind::Insert) => {
            let shift = peer.position < op.position
                || (peer.position == op.position && peer.author_id < op.author_id);
            if shift {
                op.with_position(op.position + peer.inserted_len())
            } else {
                op.clone()
            }
        }
        (OperationKind::Insert, OperationKind::Delete) => {
            let peer_len = peer.length.unwrap_or(0);
            let peer_end = peer.position + peer_len;
            if peer_end <= op.position {
                op.with_position(op.position - peer_len)
            } else if peer.position >= op.position {
                op.clone()
            } else {
                op.with_position(peer.position)
            }
        }
        (OperationKind::Delete, OperationKind::Insert) => {
            let op_len = op.length.unwrap_or(0);
            let inserted = peer.inserted_len();
            if peer.position <= op.position {
                op.with_position(op.position + inserted)
            } else if peer.position >= op.position + op_len {
                op.clone()
            } else {
                op.with_position_and_length(op.position, op_len + inserted)
            }
        }
        (OperationKind::Delete, OperationKind::Delete) => {
            let op_len = op.length.unwrap_or(0);
            let peer_len = peer.length.unwrap_or(0);
            let op_start = op.position;
            let op_end = op.position + op_len;
            let peer_start = peer.position;
            let peer_end = peer.position + peer_len;

            let overlap_start = op_start.max(peer_start);
            let overlap_end = op_end.min(peer_end);
            let overlap = overlap_end.saturating_sub(overlap_start);

            let new_len = op_len.saturating_sub(overlap);
            let new_position = if peer_end <= op_start {
                op_start - peer_len
            } else if peer_start >= op_start {
                op_start
            } else {
                // peer starts before op and overlaps into it: only the portion of peer
                // that precedes op's start has already shifted text left.
                peer_start
            };
            op.with_position_and_length(new_position, new_len)
        }
    }
}

/// Folds the pairwise transform left-to-right over `concurrent`, the tail of already
/// applied operations with `operation_id > op.base_version`. Returns a new operation; never
/// mutates its arguments. Empty `concurrent` returns `op` unchanged.
#[must_use]
pub fn transform_against_operations(op: &Operation, concurrent: &[Operation]) -> Operation {
    concurrent
        .iter()
        .fold(op.clone(), |acc, peer| transform_pairwise(&acc, peer))
}

/// Converts a 0-based code-point index into a byte offset into `text`. An index at or beyond
/// `text`'s code-point length maps to `text.len()`.
#[must_use]
pub fn char_to_byte(text: &str, char_index: u64) -> usize {
    text.char_indices()
        .nth(char_index as usize)
        .map_or(text.len(), |(byte_idx, _)| byte_idx)
}

#[must_use]
pub fn char_len(text: &str) -> u64 {
    text.chars().count() as u64
}

/// Bounds and shape validation of §4.2 step 1, independent of membership (the caller owns
/// the member set).
pub fn validate_bounds(op: &Operation, text: &str) -> CoreResult<()> {
    let len = char_len(text);
    match op.kind {
        OperationKind::Insert => {
            let content = op.content.as_deref().unwrap_or("");
            if content.is_empty() {
                return Err(CoreError::Validation(
                    "insert content must be non-empty".to_string(),
                ));
            }
            if op.position > len {
                return Err(CoreError::Validation(format!(
                    "insert position {} out of bounds for text of length {len}",
                    op.position
                )));
            }
        }
        OperationKind::Delete => {
            let length = op.length.unwrap_or(0);
            if length == 0 {
                return Err(CoreError::Validation(
                    "delete length must be > 0".to_string(),
                ));
            }
            if op.position + length > len {
                return Err(CoreError::Validation(format!(
                    "delete range [{}, {}) out of bounds for text of length {len}",
                    op.position,
                    op.position + length
                )));
            }
        }
    }
    Ok(())
}

/// Applies `op` to `text` in place. Returns the exact substring removed for a Delete (the
/// change log's captured `deletedText`, §3); `None` for an Insert. Caller must have already
/// validated bounds.
pub fn apply_in_place(text: &mut String, op: &Operation) -> Option<String> {
    match op.kind {
        OperationKind::Insert => {
            let idx = char_to_byte(text, op.position);
            text.insert_str(idx, op.content.as_deref().unwrap_or_default());
            None
        }
        OperationKind::Delete => {
            let length = op.length.unwrap_or(0);
            let start = char_to_byte(text, op.position);
            let end = char_to_byte(text, op.position + length);
            let removed = text[start..end].to_string();
            text.replace_range(start..end, "");
            Some(removed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::DocumentId;

    fn doc() -> DocumentId {
        DocumentId("doc-1".to_string())
    }

    fn user(id: &str) -> UserId {
        UserId(id.to_string())
    }

    #[test]
    fn empty_concurrent_list_is_identity() {
        let op = Operation::insert(doc(), user("1"), 3, "x", 0);
        let transformed = transform_against_operations(&op, &[]);
        assert_eq!(transformed, op);
    }

    #[test]
    fn concurrent_inserts_tie_break_by_author_id() {
        // Scenario 1: empty doc, two concurrent inserts at position 0.
        let hello = Operation::insert(doc(), user("1"), 0, "Hello", 0);
        let world = Operation::insert(doc(), user("2"), 0, "World", 0);

        // World arrives after Hello has already been applied (authorId 1 < 2).
        let world_prime = transform_against_operations(&world, &[hello.clone()]);
        assert_eq!(world_prime.position, 5);

        // Hello arrives after World: since 1 < 2, Hello stays first, no shift.
        let hello_prime = transform_against_operations(&hello, &[world.clone()]);
        assert_eq!(hello_prime.position, 0);
    }

    #[test]
    fn insert_against_preceding_delete_shifts_left() {
        // Scenario 2: concurrent delete + insert.
        let delete = Operation::delete(doc(), user("1"), 0, 6, 0);
        let insert = Operation::insert(doc(), user("2"), 0, "Hi ", 0);

        let insert_prime = transform_against_operations(&insert, &[delete]);
        assert_eq!(insert_prime.position, 0);
    }

    #[test]
    fn overlapping_deletes_shrink_and_shift() {
        // Scenario 3: "Hello World Test", delete(6,0) then delete(6,6) concurrently.
        let first = Operation::delete(doc(), user("1"), 0, 6, 0);
        let second = Operation::delete(doc(), user("2"), 6, 6, 0);

        let second_prime = transform_against_operations(&second, &[first]);
        // After "Hello " is removed, "World " moved to position 0.
        assert_eq!(second_prime.position, 0);
        assert_eq!(second_prime.length, Some(6));
    }

    #[test]
    fn fully_overlapped_delete_becomes_noop() {
        let first = Operation::delete(doc(), user("1"), 0, 5, 0);
        let second = Operation::delete(doc(), user("2"), 1, 2, 0);

        let second_prime = transform_against_operations(&second, &[first]);
        assert!(second_prime.is_noop());
    }

    #[test]
    fn delete_against_insert_inside_range_grows_length() {
        let insert = Operation::insert(doc(), user("1"), 3, "xyz", 0);
        let delete = Operation::delete(doc(), user("2"), 0, 6, 0);

        let delete_prime = transform_against_operations(&delete, &[insert]);
        assert_eq!(delete_prime.position, 0);
        assert_eq!(delete_prime.length, Some(9));
    }

    #[test]
    fn length_conservation_for_non_overlapping_insert_then_delete() {
        let mut text = "hello world".to_string();
        let insert = Operation::insert(doc(), user("1"), 5, ", dear", 0);
        apply_in_place(&mut text, &insert);
        assert_eq!(text.chars().count(), 11 + 6);
    }

    #[test]
    fn validate_bounds_rejects_out_of_range_delete() {
        let delete = Operation::delete(doc(), user("1"), 3, 5, 0);
        assert!(validate_bounds(&delete, "abc").is_err());
    }

    #[test]
    fn apply_in_place_returns_deleted_text() {
        let mut text = "Hello World".to_string();
        let delete = Operation::delete(doc(), user("1"), 0, 6, 0);
        let removed = apply_in_place(&mut text, &delete);
        assert_eq!(removed, Some("Hello ".to_string()));
        assert_eq!(text, "World");
    }
}
