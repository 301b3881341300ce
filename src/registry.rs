//! Room Registry (§9 expansion): multiplexes many concurrently active `DocumentRoom` actors
//! behind one process. The teacher only ever runs one document per daemon process (it's a
//! local-file-sync tool, not a multi-tenant server), so there is no teacher counterpart for
//! this module; it is grounded instead on `dashmap`'s use in the wider example pack
//! (`harborgrid-justin-caddy`, `zed-industries-zed`) for exactly this concurrent
//! map-of-live-sessions shape.

use crate::change_log::ChangeLog;
use crate::collaborators::{AuthorizationClient, DocumentMetadataStore, UserDirectory};
use crate::config::Config;
use crate::contributions::ContributionStore;
use crate::cursor::CursorTracker;
use crate::document_room::{spawn_room, RoomHandle, RoomSnapshot};
use crate::errors::{CoreError, CoreResult};
use crate::ids::{DocumentId, UserId, VersionNumber};
use crate::version_control::{
    EnrichedContribution, EnrichedVersion, InMemoryVersionStore, RevertOutcome, VersionController,
};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::{info, warn};

/// Holds every currently active room plus the shared collaborators every room is wired to.
/// Cloning a `RoomRegistry` is cheap: it's a handful of `Arc`s around shared maps.
#[derive(Clone)]
pub struct RoomRegistry<A: AuthorizationClient, M: DocumentMetadataStore, D: UserDirectory> {
    rooms: Arc<DashMap<DocumentId, RoomHandle>>,
    authorization: Arc<A>,
    metadata: Arc<M>,
    user_directory: Arc<D>,
    change_log: Arc<dyn ChangeLog>,
    contributions: Arc<dyn ContributionStore>,
    cursor_tracker: Arc<CursorTracker>,
    versions: Arc<VersionController<InMemoryVersionStore, Arc<dyn ChangeLog>, Arc<dyn ContributionStore>>>,
    config: Config,
}

impl<A: AuthorizationClient + 'static, M: DocumentMetadataStore + 'static, D: UserDirectory + 'static>
    RoomRegistry<A, M, D>
{
    #[must_use]
    pub fn new(
        config: Config,
        authorization: Arc<A>,
        metadata: Arc<M>,
        change_log: Arc<dyn ChangeLog>,
        contributions: Arc<dyn ContributionStore>,
        user_directory: Arc<D>,
    ) -> Self {
        let cursor_tracker = Arc::new(CursorTracker::new(config.cursor_palette.clone()));
        let versions = Arc::new(VersionController::new(
            InMemoryVersionStore::new(),
            change_log.clone(),
            contributions.clone(),
            config.diff_enabled,
        ));
        Self {
            rooms: Arc::new(DashMap::new()),
            authorization,
            metadata,
            user_directory,
            change_log,
            contributions,
            cursor_tracker,
            versions,
            config,
        }
    }

    #[must_use]
    pub fn versions(
        &self,
    ) -> &VersionController<InMemoryVersionStore, Arc<dyn ChangeLog>, Arc<dyn ContributionStore>> {
        &self.versions
    }

    #[must_use]
    pub fn change_log(&self) -> &Arc<dyn ChangeLog> {
        &self.change_log
    }

    /// §10: `getHistory` enriched with each version's author display name.
    pub async fn get_history_enriched(
        &self,
        document_id: &DocumentId,
    ) -> anyhow::Result<Vec<EnrichedVersion>> {
        self.versions
            .get_history_enriched(document_id, self.user_directory.as_ref())
            .await
    }

    /// §10: `getUserContributions` enriched with each contributor's display name.
    pub async fn get_user_contributions_enriched(
        &self,
        document_id: &DocumentId,
    ) -> anyhow::Result<Vec<EnrichedContribution>> {
        self.versions
            .get_user_contributions_enriched(document_id, self.user_directory.as_ref())
            .await
    }

    fn handle_for(&self, document_id: &DocumentId) -> Option<RoomHandle> {
        self.rooms.get(document_id).map(|entry| entry.value().clone())
    }

    /// Looks up or lazily spawns the room's task, rehydrating text from the latest persisted
    /// version, then adds the (already-authorized) member to it. The authorization lookup
    /// happens here, outside the room's exclusive gate, per §5 — with the configured
    /// timeout, after which a slow authorization backend fails the join as an
    /// `AuthorizationError` rather than blocking the room indefinitely.
    pub async fn join(
        &self,
        document_id: DocumentId,
        user_id: UserId,
        user_name: String,
    ) -> CoreResult<(RoomHandle, RoomSnapshot)> {
        let authorized = timeout(
            Duration::from_millis(self.config.authorization_timeout_ms),
            self.authorization.is_member(&document_id, &user_id),
        )
        .await
        .map_err(|_| CoreError::Authorization {
            document: document_id.clone(),
            user: user_id.clone(),
        })?
        .map_err(|_| CoreError::Authorization {
            document: document_id.clone(),
            user: user_id.clone(),
        })?;

        if !authorized {
            return Err(CoreError::Authorization {
                document: document_id.clone(),
                user: user_id,
            });
        }

        let handle = match self.handle_for(&document_id) {
            Some(handle) => handle,
            None => self.spawn(document_id.clone()).await?,
        };

        let snapshot = handle.join(user_id, user_name).await?;
        Ok((handle, snapshot))
    }

    async fn spawn(&self, document_id: DocumentId) -> CoreResult<RoomHandle> {
        let initial_version = self
            .versions
            .get_history(&document_id)
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::DocumentNotFound(document_id.clone()))?;

        let rooms = self.rooms.clone();
        let teardown_id = document_id.clone();
        // §3: operationId defines total order for the *document*, not for a given room
        // task's lifetime, so a respawned room must resume numbering from the change log's
        // own state rather than restart at 0.
        let next_operation_id = self.change_log.next_operation_id(&document_id);
        let handle = spawn_room(
            document_id.clone(),
            initial_version.content,
            next_operation_id,
            self.config.recent_retention,
            Duration::from_secs(self.config.room_grace_seconds),
            self.change_log.clone(),
            self.contributions.clone(),
            self.cursor_tracker.clone(),
            move || {
                rooms.remove(&teardown_id);
            },
        );

        self.rooms.insert(document_id.clone(), handle.clone());
        info!(%document_id, "document room spawned");
        Ok(handle)
    }

    /// Looks up an already-active room without joining it (used by `leave`/edit/cursor
    /// handlers on an established connection).
    #[must_use]
    pub fn get(&self, document_id: &DocumentId) -> Option<RoomHandle> {
        self.handle_for(document_id)
    }

    /// Creates the document's version-0 row. Called once, when the document is first
    /// created by the out-of-scope metadata collaborator (§4.4 `createInitialVersion`).
    pub fn create_document(
        &self,
        document_id: &DocumentId,
        initial_text: &str,
        author_id: &UserId,
    ) {
        self.versions
            .create_initial_version(document_id, initial_text, author_id);
    }

    /// Reverts to a prior version (strategy B, §4.4/§13): creates a new version equal to the
    /// target's content, pushes the reset into the room if one is running, then best-effort
    /// refreshes the document metadata store's cached plaintext (§10). A push or cache-refresh
    /// failure is logged, not propagated — per §4.4's failure semantics, the room reconciles
    /// on next join by rehydrating from the latest persisted version regardless.
    pub async fn revert(
        &self,
        document_id: &DocumentId,
        target_version_number: VersionNumber,
        user_id: &UserId,
    ) -> CoreResult<RevertOutcome> {
        let outcome = self
            .versions
            .revert_to_version(document_id, target_version_number, user_id)?;

        if let Some(handle) = self.handle_for(document_id) {
            if let Err(err) = handle.reset(outcome.reset_text.clone()).await {
                warn!(%document_id, %err, "failed to push reverted text into running room");
            }
        }

        if let Err(err) = self
            .metadata
            .update_content(document_id, &outcome.reset_text)
            .await
        {
            warn!(%document_id, %err, "failed to refresh cached document metadata after revert");
        }

        Ok(outcome)
    }

    /// Cascade-deletes a document: shuts down any running room, then removes its versions,
    /// contributions, and change log (§3 Lifecycles, §4.4 `deleteAllForDocument`).
    pub async fn delete(&self, document_id: &DocumentId) {
        if let Some(handle) = self.handle_for(document_id) {
            handle.shutdown().await;
        }
        self.versions.delete_all_for_document(document_id);
        self.contributions.delete_all_for_document(document_id);
        self.change_log.delete_all_for_document(document_id);
        warn!(%document_id, "document deleted, cascade complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_log::InMemoryChangeLog;
    use crate::collaborators::{
        InMemoryDocumentMetadataStore, InMemoryUserDirectory, MockAuthorizationClient,
    };
    use crate::contributions::InMemoryContributionStore;

    fn registry() -> RoomRegistry<MockAuthorizationClient, InMemoryDocumentMetadataStore, InMemoryUserDirectory>
    {
        let change_log: Arc<dyn ChangeLog> = Arc::new(InMemoryChangeLog::new());
        let contributions: Arc<dyn ContributionStore> = Arc::new(InMemoryContributionStore::new());
        RoomRegistry::new(
            Config::default(),
            Arc::new(MockAuthorizationClient::new()),
            Arc::new(InMemoryDocumentMetadataStore::new()),
            change_log,
            contributions,
            Arc::new(InMemoryUserDirectory::new()),
        )
    }

    #[tokio::test]
    async fn join_spawns_a_room_from_the_initial_version() {
        let registry = registry();
        let doc = DocumentId("d1".to_string());
        let user = UserId("alice".to_string());
        registry.create_document(&doc, "hello", &user);

        let (_handle, snapshot) = registry
            .join(doc.clone(), user.clone(), "Alice".to_string())
            .await
            .unwrap();

        assert_eq!(snapshot.text, "hello");
        assert!(registry.get(&doc).is_some());
    }

    #[tokio::test]
    async fn join_rejects_non_members_before_spawning_a_room() {
        let doc = DocumentId("d1".to_string());
        let user = UserId("eve".to_string());

        // Deny before any room has ever been spawned for this document.
        let authorization = MockAuthorizationClient::new();
        authorization.deny(doc.clone(), user.clone());
        let change_log: Arc<dyn ChangeLog> = Arc::new(InMemoryChangeLog::new());
        let contributions: Arc<dyn ContributionStore> =
            Arc::new(InMemoryContributionStore::new());
        let registry = RoomRegistry::new(
            Config::default(),
            Arc::new(authorization),
            Arc::new(InMemoryDocumentMetadataStore::new()),
            change_log,
            contributions,
            Arc::new(InMemoryUserDirectory::new()),
        );
        registry.create_document(&doc, "hello", &UserId("owner".to_string()));

        let result = registry.join(doc.clone(), user, "Eve".to_string()).await;

        assert!(matches!(result, Err(CoreError::Authorization { .. })));
        assert!(registry.get(&doc).is_none());
    }

    #[tokio::test]
    async fn join_on_unknown_document_fails() {
        let registry = registry();
        let doc = DocumentId("missing".to_string());
        let user = UserId("alice".to_string());
        let result = registry.join(doc, user, "Alice".to_string()).await;
        assert!(matches!(result, Err(CoreError::DocumentNotFound(_))));
    }

    #[tokio::test]
    async fn revert_pushes_a_reset_into_the_running_room() {
        let registry = registry();
        let doc = DocumentId("d1".to_string());
        let user = UserId("alice".to_string());
        registry.create_document(&doc, "", &user);

        let (handle, _) = registry
            .join(doc.clone(), user.clone(), "Alice".to_string())
            .await
            .unwrap();
        let op = crate::operation::Operation::insert(doc.clone(), user.clone(), 0, "Hi", 0);
        handle.apply_edit(op).await.unwrap();

        registry
            .versions()
            .create_version(&doc, "Hi", &user, "checkpoint")
            .unwrap();

        let outcome = registry
            .revert(&doc, VersionNumber(0), &user)
            .await
            .unwrap();
        assert_eq!(outcome.reset_text, "");

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.text, "");
    }

    #[tokio::test]
    async fn delete_cascades_versions_contributions_and_change_log() {
        let registry = registry();
        let doc = DocumentId("d1".to_string());
        let user = UserId("alice".to_string());
        registry.create_document(&doc, "", &user);

        let (handle, _) = registry
            .join(doc.clone(), user.clone(), "Alice".to_string())
            .await
            .unwrap();
        let op = crate::operation::Operation::insert(doc.clone(), user.clone(), 0, "Hi", 0);
        handle.apply_edit(op).await.unwrap();

        assert!(!registry.get_user_contributions_enriched(&doc).await.unwrap().is_empty());
        assert!(!registry.versions.get_history(&doc).is_empty());
        assert!(!registry.change_log.list_unversioned(&doc).is_empty());

        registry.delete(&doc).await;

        assert!(registry.get(&doc).is_none());
        assert!(registry.versions.get_history(&doc).is_empty());
        assert!(registry.versions.get_user_contributions(&doc).is_empty());
        assert!(registry.change_log.list_unversioned(&doc).is_empty());
    }
}
