//! Wire protocol (§6): serde DTOs for the inbound edit frame and the outbound per-document
//! topic frames. Parsed into these strongly-typed shapes at the transport boundary and never
//! propagated past it as a loosely-typed JSON value (§9's "dynamic field types" note).

use crate::cursor::CursorState;
use crate::errors::CoreError;
use crate::ids::{DocumentId, OperationId, UserId};
use crate::operation::{Operation, OperationKind};
use serde::{Deserialize, Serialize};

/// The first line a client sends on a new connection (§11): identifies which document/user
/// is joining, before any edit frame is accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloFrame {
    pub document_id: DocumentId,
    pub user_id: UserId,
    pub user_name: String,
}

/// Wire shape of an operation, independent of `Operation`'s in-process representation
/// (`operation_id` is absent on the way in, present on the way out).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationFrame {
    #[serde(rename = "type")]
    pub kind: OperationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    pub position: u64,
    pub base_version: u64,
}

/// `{ documentId, userId, userName, operation: {...} }` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditFrame {
    pub document_id: DocumentId,
    pub user_id: UserId,
    pub user_name: String,
    pub operation: OperationFrame,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorFrame {
    pub document_id: DocumentId,
    pub user_id: UserId,
    pub position: u64,
    pub user_name: String,
}

/// The tagged union of inbound lines a connection may send after `HelloFrame`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundFrame {
    Edit(EditFrame),
    Cursor(CursorFrame),
    Leave,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedOperationFrame {
    pub operation_id: OperationId,
    pub author_id: UserId,
    #[serde(rename = "type")]
    pub kind: OperationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    pub position: u64,
}

impl From<&Operation> for AppliedOperationFrame {
    fn from(op: &Operation) -> Self {
        Self {
            operation_id: op.operation_id.unwrap_or(OperationId(0)),
            author_id: op.author_id.clone(),
            kind: op.kind,
            content: op.content.clone(),
            length: op.length,
            position: op.position,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundCursorFrame {
    pub user_id: UserId,
    pub position: u64,
    pub user_name: String,
    pub color: String,
}

impl OutboundCursorFrame {
    #[must_use]
    pub fn new(user_id: UserId, state: &CursorState) -> Self {
        Self {
            user_id,
            position: state.position,
            user_name: state.user_name.clone(),
            color: state.color.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersListFrame {
    pub users: Vec<MemberFrame>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberFrame {
    pub user_id: UserId,
    pub user_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetFrame {
    pub text: String,
    pub server_version: u64,
}

/// Per-originator acknowledgement for a submitted edit (§4.2 step 11); travels back over the
/// same connection that submitted it, not the broadcast topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditAckFrame {
    pub operation_id: Option<OperationId>,
    pub base_version: u64,
}

/// A `CoreError` rendered for the wire (§7): surfaced to the originating connection only,
/// never broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub kind: String,
    pub message: String,
}

/// Every frame the server can write to a connection: the ones fanned out to every member of
/// a document's topic (`Operation`, `Cursor`, `UsersList`, `UserJoined`, `UserLeft`, `Reset`,
/// §6), plus the two that only ever go back to the originating connection (`Ack`, `Error`).
/// Sharing one tagged union keeps the wire format uniform even though only a subset travels
/// over the `broadcast::Sender` fan-out of §9.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundFrame {
    Operation(AppliedOperationFrame),
    Cursor(OutboundCursorFrame),
    UsersList(UsersListFrame),
    UserJoined(MemberFrame),
    UserLeft(MemberFrame),
    Reset(ResetFrame),
    Ack(EditAckFrame),
    Error(ErrorFrame),
}

impl From<&CoreError> for ErrorFrame {
    fn from(error: &CoreError) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_frame_round_trips_through_json() {
        let frame = EditFrame {
            document_id: DocumentId("d1".to_string()),
            user_id: UserId("u1".to_string()),
            user_name: "Alice".to_string(),
            operation: OperationFrame {
                kind: OperationKind::Insert,
                content: Some("Hi".to_string()),
                length: None,
                position: 0,
                base_version: 0,
            },
        };
        let json = serde_json::to_string(&frame).unwrap();
        let parsed: EditFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.operation.content, Some("Hi".to_string()));
    }

    #[test]
    fn inbound_frame_tag_discriminates_variants() {
        let json = r#"{"kind":"leave"}"#;
        let parsed: InboundFrame = serde_json::from_str(json).unwrap();
        assert!(matches!(parsed, InboundFrame::Leave));
    }

    #[test]
    fn outbound_reset_frame_serializes_with_kind_tag() {
        let frame = OutboundFrame::Reset(ResetFrame {
            text: String::new(),
            server_version: 5,
        });
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"kind\":\"reset\""));
    }
}
