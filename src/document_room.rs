//! Document Room (§4.2, DR): the single authoritative source of a document's current text.
//! Modeled as an actor — a `tokio::task` that owns all mutable state and is driven by an
//! `mpsc` message queue — exactly the way the teacher's document-owning task is driven by
//! its `DocMessage` channel. The task's single-threaded message loop *is* the exclusive gate
//! of §5: there is no lock, because only one future ever touches `DocumentRoomState`.

use crate::change_log::{ChangeLog, ChangeLogEntry};
use crate::contributions::ContributionStore;
use crate::cursor::{CursorState, CursorTracker};
use crate::errors::{CoreError, CoreResult};
use crate::ids::{DocumentId, OperationId, UserId};
use crate::operation::{apply_in_place, char_len, transform_against_operations, validate_bounds, Operation};
use crate::protocol::{AppliedOperationFrame, OutboundFrame, ResetFrame};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct MemberInfo {
    pub user_name: String,
    pub joined_at: OffsetDateTime,
}

/// Response to `join`/`snapshot`: the full state a newly (re)connected client needs to
/// render the document (§4.2).
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub text: String,
    pub server_version: u64,
    pub members: Vec<(UserId, MemberInfo)>,
    pub cursors: HashMap<UserId, CursorState>,
}

#[derive(Debug, Clone)]
pub struct EditAck {
    pub operation_id: Option<OperationId>,
    pub base_version: u64,
}

enum RoomMessage {
    Join {
        user_id: UserId,
        user_name: String,
        resp: oneshot::Sender<RoomSnapshot>,
    },
    Leave {
        user_id: UserId,
    },
    ApplyEdit {
        op: Operation,
        resp: oneshot::Sender<CoreResult<EditAck>>,
    },
    BroadcastCursor {
        user_id: UserId,
        position: u64,
        user_name: String,
        resp: oneshot::Sender<CoreResult<()>>,
    },
    Snapshot {
        resp: oneshot::Sender<RoomSnapshot>,
    },
    /// Pushed by the Version Controller after a revert (§4.4 step 4): replaces `text`,
    /// clears `recent`, bumps `next_operation_id`, and broadcasts a `reset` frame.
    Reset {
        text: String,
        resp: oneshot::Sender<()>,
    },
    /// Arms immediate teardown regardless of the grace timer (§9: registry deletion path).
    Shutdown,
    /// Sent by the grace-period timer task; a no-op unless membership is still empty.
    GraceExpired,
}

/// Cloneable front for a running room's actor task. Cloning is cheap (two channel senders);
/// every connection handler for a document holds one.
#[derive(Clone)]
pub struct RoomHandle {
    document_id: DocumentId,
    sender: mpsc::Sender<RoomMessage>,
    broadcast_tx: broadcast::Sender<OutboundFrame>,
}

impl RoomHandle {
    #[must_use]
    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<OutboundFrame> {
        self.broadcast_tx.subscribe()
    }

    /// Adds `user_id` to the room's membership. Authorization must already have been
    /// checked by the caller (§5: the authorization lookup happens outside the gate, before
    /// this call is ever made) — the room itself does not know how to ask.
    pub async fn join(&self, user_id: UserId, user_name: String) -> CoreResult<RoomSnapshot> {
        let (resp, recv) = oneshot::channel();
        self.send(RoomMessage::Join {
            user_id,
            user_name,
            resp,
        })
        .await?;
        recv.await
            .map_err(|_| CoreError::Fatal("room task dropped join response".to_string()))
    }

    pub async fn leave(&self, user_id: UserId) -> CoreResult<()> {
        self.send(RoomMessage::Leave { user_id }).await
    }

    pub async fn apply_edit(&self, op: Operation) -> CoreResult<EditAck> {
        let (resp, recv) = oneshot::channel();
        self.send(RoomMessage::ApplyEdit { op, resp }).await?;
        recv.await
            .map_err(|_| CoreError::Fatal("room task dropped apply_edit response".to_string()))?
    }

    pub async fn broadcast_cursor(
        &self,
        user_id: UserId,
        position: u64,
        user_name: String,
    ) -> CoreResult<()> {
        let (resp, recv) = oneshot::channel();
        self.send(RoomMessage::BroadcastCursor {
            user_id,
            position,
            user_name,
            resp,
        })
        .await?;
        recv.await
            .map_err(|_| CoreError::Fatal("room task dropped cursor response".to_string()))?
    }

    pub async fn snapshot(&self) -> CoreResult<RoomSnapshot> {
        let (resp, recv) = oneshot::channel();
        self.send(RoomMessage::Snapshot { resp }).await?;
        recv.await
            .map_err(|_| CoreError::Fatal("room task dropped snapshot response".to_string()))
    }

    /// Narrow one-way push used by `VersionController::revert_to_version` (§9: VC -> DR is a
    /// one-way interface, never a back-reference to VC from DR).
    pub async fn reset(&self, text: String) -> CoreResult<()> {
        let (resp, recv) = oneshot::channel();
        self.send(RoomMessage::Reset { text, resp }).await?;
        recv.await
            .map_err(|_| CoreError::Fatal("room task dropped reset response".to_string()))
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(RoomMessage::Shutdown).await;
    }

    async fn send(&self, message: RoomMessage) -> CoreResult<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| CoreError::Fatal("room task is no longer running".to_string()))
    }
}

struct DocumentRoomState {
    document_id: DocumentId,
    text: String,
    recent: VecDeque<Operation>,
    members: HashMap<UserId, MemberInfo>,
    next_operation_id: u64,
    retention: usize,
}

impl DocumentRoomState {
    fn server_version(&self) -> u64 {
        self.next_operation_id
    }
}

struct DocumentRoomActor {
    state: DocumentRoomState,
    change_log: Arc<dyn ChangeLog>,
    contributions: Arc<dyn ContributionStore>,
    cursor_tracker: Arc<CursorTracker>,
    broadcast_tx: broadcast::Sender<OutboundFrame>,
    grace_period: Duration,
    self_tx: mpsc::Sender<RoomMessage>,
    grace_token: Option<CancellationToken>,
}

impl DocumentRoomActor {
    fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            text: self.state.text.clone(),
            server_version: self.state.server_version(),
            members: self
                .state
                .members
                .iter()
                .map(|(id, info)| (id.clone(), info.clone()))
                .collect(),
            cursors: self.cursor_tracker.list(&self.state.document_id),
        }
    }

    fn broadcast(&self, frame: OutboundFrame) {
        // No subscribers (every member disconnected mid-flight) is not an error.
        let _ = self.broadcast_tx.send(frame);
    }

    fn arm_grace_timer(&mut self) {
        if let Some(token) = self.grace_token.take() {
            token.cancel();
        }
        let token = CancellationToken::new();
        self.grace_token = Some(token.clone());
        let tx = self.self_tx.clone();
        let grace_period = self.grace_period;
        let document_id = self.state.document_id.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = sleep(grace_period) => {
                    debug!(%document_id, "grace period elapsed, offering room for teardown");
                    let _ = tx.send(RoomMessage::GraceExpired).await;
                }
                () = token.cancelled() => {
                    debug!(%document_id, "grace period cancelled by rejoin");
                }
            }
        });
    }

    fn cancel_grace_timer(&mut self) {
        if let Some(token) = self.grace_token.take() {
            token.cancel();
        }
    }

    fn handle_join(&mut self, user_id: UserId, user_name: String) -> RoomSnapshot {
        self.cancel_grace_timer();
        let now = OffsetDateTime::now_utc();
        let is_new = !self.state.members.contains_key(&user_id);
        self.state
            .members
            .entry(user_id.clone())
            .and_modify(|m| m.joined_at = now)
            .or_insert(MemberInfo {
                user_name: user_name.clone(),
                joined_at: now,
            });
        if is_new {
            self.broadcast(OutboundFrame::UserJoined(crate::protocol::MemberFrame {
                user_id,
                user_name,
            }));
        }
        self.snapshot()
    }

    fn handle_leave(&mut self, user_id: &UserId) {
        if let Some(info) = self.state.members.remove(user_id) {
            self.cursor_tracker.remove(&self.state.document_id, user_id);
            self.broadcast(OutboundFrame::UserLeft(crate::protocol::MemberFrame {
                user_id: user_id.clone(),
                user_name: info.user_name,
            }));
        }
        if self.state.members.is_empty() {
            self.arm_grace_timer();
        }
    }

    /// Appends `entry` to the change log, retrying a transient failure up to 3 times with a
    /// short linear backoff (§7) before giving up and surfacing `CoreError::Transient`.
    async fn append_with_retry(&self, entry: ChangeLogEntry) -> CoreResult<()> {
        const MAX_ATTEMPTS: u32 = 3;
        let mut attempt = 0;
        loop {
            match self.change_log.append(entry.clone()) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    attempt += 1;
                    if attempt >= MAX_ATTEMPTS {
                        return Err(CoreError::Transient(format!(
                            "change log append failed after {attempt} attempts: {err}"
                        )));
                    }
                    warn!(
                        document_id = %self.state.document_id,
                        attempt,
                        %err,
                        "change log append failed, retrying"
                    );
                    sleep(Duration::from_millis(20 * u64::from(attempt))).await;
                }
            }
        }
    }

    /// §4.2 `applyEdit`, the central hot path.
    async fn handle_apply_edit(&mut self, raw_op: Operation) -> CoreResult<EditAck> {
        if !self.state.members.contains_key(&raw_op.author_id) {
            return Err(CoreError::Authorization {
                document: self.state.document_id.clone(),
                user: raw_op.author_id.clone(),
            });
        }

        let floor = self
            .state
            .next_operation_id
            .saturating_sub(self.state.retention as u64);
        if self.state.next_operation_id > self.state.retention as u64 && raw_op.base_version < floor
        {
            return Err(CoreError::Stale {
                document: self.state.document_id.clone(),
                base_version: raw_op.base_version,
                current: self.state.server_version(),
            });
        }

        validate_bounds(&raw_op, &self.state.text)?;

        let concurrent: Vec<Operation> = self
            .state
            .recent
            .iter()
            .filter(|op| op.operation_id.is_some_and(|id| id.0 > raw_op.base_version))
            .cloned()
            .collect();

        let mut transformed = transform_against_operations(&raw_op, &concurrent);

        if transformed.is_noop() {
            return Ok(EditAck {
                operation_id: None,
                base_version: raw_op.base_version,
            });
        }

        let previous_text = self.state.text.clone();
        let previous_next_operation_id = self.state.next_operation_id;

        let operation_id = OperationId(self.state.next_operation_id);
        self.state.next_operation_id += 1;
        transformed.operation_id = Some(operation_id);

        let previous_len = char_len(&previous_text);
        let deleted_text = apply_in_place(&mut self.state.text, &transformed);
        transformed.deleted_text = deleted_text.clone();

        // §7 FatalError: the text length after applying the operation must match what the
        // operation says it did. A mismatch means `apply_in_place` or the transform pipeline
        // diverged from the operation's own bookkeeping, not a transient or client-caused
        // error — the room's state can no longer be trusted.
        let expected_len = match transformed.kind {
            crate::operation::OperationKind::Insert => previous_len + transformed.inserted_len(),
            crate::operation::OperationKind::Delete => {
                previous_len.saturating_sub(transformed.length.unwrap_or(0))
            }
        };
        let actual_len = char_len(&self.state.text);
        if actual_len != expected_len {
            error!(
                document_id = %self.state.document_id,
                expected_len,
                actual_len,
                "text length diverged after applying operation, destroying room"
            );
            self.state.text = previous_text;
            self.state.next_operation_id = previous_next_operation_id;
            return Err(CoreError::Fatal(format!(
                "text length diverged after applying operation {}: expected {expected_len}, got {actual_len}",
                operation_id.0
            )));
        }

        let log_text = match transformed.kind {
            crate::operation::OperationKind::Insert => {
                transformed.content.clone().unwrap_or_default()
            }
            crate::operation::OperationKind::Delete => deleted_text.unwrap_or_default(),
        };
        let entry = ChangeLogEntry {
            id: self.change_log.next_entry_id(&self.state.document_id),
            document_id: self.state.document_id.clone(),
            author_id: transformed.author_id.clone(),
            change_type: transformed.kind,
            text: log_text,
            position: transformed.position,
            operation_id: operation_id.0,
            timestamp: OffsetDateTime::now_utc(),
            version_id: None,
        };
        if let Err(err) = self.append_with_retry(entry).await {
            // The gate holds every step 4-10 completes or none do (§4.2): undo the text and
            // counter mutation so a permanently failed append leaves no trace of the edit.
            self.state.text = previous_text;
            self.state.next_operation_id = previous_next_operation_id;
            return Err(err);
        }

        self.state.recent.push_back(transformed.clone());
        while self.state.recent.len() > self.state.retention {
            self.state.recent.pop_front();
        }

        // Contribution accounting, site (a) per §13: incremental, under the same gate.
        match transformed.kind {
            crate::operation::OperationKind::Insert => {
                self.contributions.record_insert(
                    &self.state.document_id,
                    &transformed.author_id,
                    transformed.inserted_len(),
                );
            }
            crate::operation::OperationKind::Delete => {
                self.contributions.record_delete(
                    &self.state.document_id,
                    &transformed.author_id,
                    transformed.length.unwrap_or(0),
                );
            }
        }

        self.broadcast(OutboundFrame::Operation(AppliedOperationFrame::from(
            &transformed,
        )));

        Ok(EditAck {
            operation_id: Some(operation_id),
            base_version: raw_op.base_version,
        })
    }

    fn handle_broadcast_cursor(
        &mut self,
        user_id: UserId,
        position: u64,
        user_name: String,
    ) -> CoreResult<()> {
        if !self.state.members.contains_key(&user_id) {
            return Err(CoreError::Authorization {
                document: self.state.document_id.clone(),
                user: user_id,
            });
        }
        if position > char_len(&self.state.text) {
            return Err(CoreError::Validation(format!(
                "cursor position {position} out of bounds"
            )));
        }
        let state =
            self.cursor_tracker
                .update(&self.state.document_id, &user_id, position, user_name);
        self.broadcast(OutboundFrame::Cursor(
            crate::protocol::OutboundCursorFrame::new(user_id, &state),
        ));
        Ok(())
    }

    fn handle_reset(&mut self, text: String) {
        self.state.text = text.clone();
        self.state.recent.clear();
        self.state.next_operation_id += 1;
        self.broadcast(OutboundFrame::Reset(ResetFrame {
            text,
            server_version: self.state.server_version(),
        }));
    }

    async fn run(mut self, mut rx: mpsc::Receiver<RoomMessage>, teardown: impl FnOnce() + Send + 'static) {
        info!(document_id = %self.state.document_id, "document room active");
        while let Some(message) = rx.recv().await {
            match message {
                RoomMessage::Join {
                    user_id,
                    user_name,
                    resp,
                } => {
                    let snapshot = self.handle_join(user_id, user_name);
                    let _ = resp.send(snapshot);
                }
                RoomMessage::Leave { user_id } => self.handle_leave(&user_id),
                RoomMessage::ApplyEdit { op, resp } => {
                    let result = self.handle_apply_edit(op).await;
                    if let Err(err) = &result {
                        warn!(document_id = %self.state.document_id, %err, "edit rejected");
                    }
                    let is_fatal = matches!(result, Err(CoreError::Fatal(_)));
                    let _ = resp.send(result);
                    if is_fatal {
                        // §7: the room is destroyed and members reconnect; the next `join`
                        // rehydrates from the latest persisted version via the registry.
                        self.broadcast(OutboundFrame::Reset(ResetFrame {
                            text: self.state.text.clone(),
                            server_version: self.state.server_version(),
                        }));
                        break;
                    }
                }
                RoomMessage::BroadcastCursor {
                    user_id,
                    position,
                    user_name,
                    resp,
                } => {
                    let result = self.handle_broadcast_cursor(user_id, position, user_name);
                    let _ = resp.send(result);
                }
                RoomMessage::Snapshot { resp } => {
                    let _ = resp.send(self.snapshot());
                }
                RoomMessage::Reset { text, resp } => {
                    self.handle_reset(text);
                    let _ = resp.send(());
                }
                RoomMessage::Shutdown => break,
                RoomMessage::GraceExpired => {
                    if self.state.members.is_empty() {
                        break;
                    }
                }
            }
        }
        info!(document_id = %self.state.document_id, "document room destroyed");
        teardown();
    }
}

/// Spawns a new room task and returns a handle to it. `initial_text` is the text rehydrated
/// from the latest persisted version snapshot (§3: "its text is rehydrated on entry from the
/// latest persisted version snapshot"). `teardown` is invoked once, from inside the task,
/// after its message loop exits — the registry uses it to remove the room from its map.
#[must_use]
pub fn spawn_room(
    document_id: DocumentId,
    initial_text: String,
    next_operation_id: u64,
    retention: usize,
    grace_period: Duration,
    change_log: Arc<dyn ChangeLog>,
    contributions: Arc<dyn ContributionStore>,
    cursor_tracker: Arc<CursorTracker>,
    teardown: impl FnOnce() + Send + 'static,
) -> RoomHandle {
    let (sender, receiver) = mpsc::channel(64);
    let (broadcast_tx, _rx) = broadcast::channel(1024);

    let actor = DocumentRoomActor {
        state: DocumentRoomState {
            document_id: document_id.clone(),
            text: initial_text,
            recent: VecDeque::new(),
            members: HashMap::new(),
            next_operation_id,
            retention,
        },
        change_log,
        contributions,
        cursor_tracker,
        broadcast_tx: broadcast_tx.clone(),
        grace_period,
        self_tx: sender.clone(),
        grace_token: None,
    };

    tokio::spawn(actor.run(receiver, teardown));

    RoomHandle {
        document_id,
        sender,
        broadcast_tx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_log::InMemoryChangeLog;
    use crate::contributions::InMemoryContributionStore;
    use crate::ids::ChangeLogEntryId;
    use crate::operation::Operation;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `fail_count` appends, then delegates to a real in-memory log.
    struct FlakyChangeLog {
        inner: InMemoryChangeLog,
        fail_count: u32,
        attempts: AtomicU32,
    }

    impl ChangeLog for FlakyChangeLog {
        fn append(&self, entry: ChangeLogEntry) -> CoreResult<()> {
            let attempt = self.attempts.fetch_add(1, Ordering::Relaxed);
            if attempt < self.fail_count {
                return Err(CoreError::Transient("simulated I/O failure".to_string()));
            }
            self.inner.append(entry)
        }

        fn next_entry_id(&self, document_id: &DocumentId) -> ChangeLogEntryId {
            self.inner.next_entry_id(document_id)
        }

        fn next_operation_id(&self, document_id: &DocumentId) -> u64 {
            self.inner.next_operation_id(document_id)
        }

        fn list_unversioned(&self, document_id: &DocumentId) -> Vec<ChangeLogEntry> {
            self.inner.list_unversioned(document_id)
        }

        fn link_to_version(&self, document_id: &DocumentId, version_id: crate::ids::VersionId) {
            self.inner.link_to_version(document_id, version_id);
        }

        fn unlink(&self, document_id: &DocumentId, version_ids: &[crate::ids::VersionId]) {
            self.inner.unlink(document_id, version_ids);
        }

        fn list_by_version(&self, version_id: &crate::ids::VersionId) -> Vec<ChangeLogEntry> {
            self.inner.list_by_version(version_id)
        }

        fn delete_all_for_document(&self, document_id: &DocumentId) {
            self.inner.delete_all_for_document(document_id);
        }
    }

    fn make_room_with_change_log(document_id: &str, change_log: Arc<dyn ChangeLog>) -> RoomHandle {
        spawn_room(
            DocumentId(document_id.to_string()),
            String::new(),
            0,
            1024,
            Duration::from_millis(50),
            change_log,
            Arc::new(InMemoryContributionStore::new()),
            Arc::new(CursorTracker::new(
                crate::config::DEFAULT_PALETTE
                    .iter()
                    .map(|s| (*s).to_string())
                    .collect(),
            )),
            || {},
        )
    }

    fn make_room(document_id: &str) -> RoomHandle {
        spawn_room(
            DocumentId(document_id.to_string()),
            String::new(),
            0,
            1024,
            Duration::from_millis(50),
            Arc::new(InMemoryChangeLog::new()),
            Arc::new(InMemoryContributionStore::new()),
            Arc::new(CursorTracker::new(
                crate::config::DEFAULT_PALETTE
                    .iter()
                    .map(|s| (*s).to_string())
                    .collect(),
            )),
            || {},
        )
    }

    #[tokio::test]
    async fn scenario_1_concurrent_inserts_tie_break_by_author() {
        let room = make_room("doc-1");
        room.join(UserId("1".to_string()), "Alice".to_string())
            .await
            .unwrap();
        room.join(UserId("2".to_string()), "Bob".to_string())
            .await
            .unwrap();

        let hello = Operation::insert(DocumentId("doc-1".to_string()), UserId("1".to_string()), 0, "Hello", 0);
        let world = Operation::insert(DocumentId("doc-1".to_string()), UserId("2".to_string()), 0, "World", 0);

        let ack1 = room.apply_edit(hello).await.unwrap();
        let ack2 = room.apply_edit(world).await.unwrap();
        assert!(ack1.operation_id.unwrap().0 < ack2.operation_id.unwrap().0);

        let snapshot = room.snapshot().await.unwrap();
        assert_eq!(snapshot.text, "HelloWorld");
    }

    #[tokio::test]
    async fn rejects_edits_from_non_members() {
        let room = make_room("doc-1");
        let op = Operation::insert(DocumentId("doc-1".to_string()), UserId("ghost".to_string()), 0, "x", 0);
        let result = room.apply_edit(op).await;
        assert!(matches!(result, Err(CoreError::Authorization { .. })));
    }

    #[tokio::test]
    async fn stale_base_version_is_rejected() {
        let room = make_room("doc-1");
        room.join(UserId("1".to_string()), "Alice".to_string())
            .await
            .unwrap();
        for _ in 0..2000 {
            room.apply_edit(Operation::insert(
                DocumentId("doc-1".to_string()),
                UserId("1".to_string()),
                0,
                "x",
                2000,
            ))
            .await
            .unwrap();
        }
        let result = room
            .apply_edit(Operation::insert(
                DocumentId("doc-1".to_string()),
                UserId("1".to_string()),
                0,
                "y",
                50,
            ))
            .await;
        assert!(matches!(result, Err(CoreError::Stale { .. })));
    }

    #[tokio::test]
    async fn reset_clears_recent_and_bumps_server_version() {
        let room = make_room("doc-1");
        room.join(UserId("1".to_string()), "Alice".to_string())
            .await
            .unwrap();
        room.apply_edit(Operation::insert(
            DocumentId("doc-1".to_string()),
            UserId("1".to_string()),
            0,
            "Hi",
            0,
        ))
        .await
        .unwrap();

        let before = room.snapshot().await.unwrap().server_version;
        room.reset(String::new()).await.unwrap();
        let after = room.snapshot().await.unwrap();
        assert_eq!(after.text, "");
        assert!(after.server_version > before);
    }

    #[tokio::test]
    async fn change_log_append_recovers_after_a_couple_of_transient_failures() {
        let change_log: Arc<dyn ChangeLog> = Arc::new(FlakyChangeLog {
            inner: InMemoryChangeLog::new(),
            fail_count: 2,
            attempts: AtomicU32::new(0),
        });
        let room = make_room_with_change_log("doc-1", change_log);
        room.join(UserId("1".to_string()), "Alice".to_string())
            .await
            .unwrap();

        let ack = room
            .apply_edit(Operation::insert(
                DocumentId("doc-1".to_string()),
                UserId("1".to_string()),
                0,
                "Hi",
                0,
            ))
            .await
            .unwrap();
        assert!(ack.operation_id.is_some());

        let snapshot = room.snapshot().await.unwrap();
        assert_eq!(snapshot.text, "Hi");
    }

    #[tokio::test]
    async fn change_log_append_exhausting_retries_rolls_back_the_edit() {
        let change_log: Arc<dyn ChangeLog> = Arc::new(FlakyChangeLog {
            inner: InMemoryChangeLog::new(),
            fail_count: 10,
            attempts: AtomicU32::new(0),
        });
        let room = make_room_with_change_log("doc-1", change_log);
        room.join(UserId("1".to_string()), "Alice".to_string())
            .await
            .unwrap();

        let before = room.snapshot().await.unwrap();
        let result = room
            .apply_edit(Operation::insert(
                DocumentId("doc-1".to_string()),
                UserId("1".to_string()),
                0,
                "Hi",
                0,
            ))
            .await;
        assert!(matches!(result, Err(CoreError::Transient(_))));

        let after = room.snapshot().await.unwrap();
        assert_eq!(after.text, before.text);
        assert_eq!(after.server_version, before.server_version);
    }
}
