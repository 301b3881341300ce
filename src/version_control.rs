//! Version Controller (§4.4): snapshot and history management.

use crate::change_log::ChangeLog;
use crate::collaborators::UserDirectory;
use crate::contributions::{ContributionStore, UserContribution};
use crate::diff::{line_diff_opts, LineDiff};
use crate::errors::{CoreError, CoreResult};
use crate::ids::{DocumentId, UserId, VersionId, VersionNumber};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentVersion {
    pub id: VersionId,
    pub document_id: DocumentId,
    pub version_number: VersionNumber,
    pub content: String,
    pub created_by: UserId,
    pub created_at: OffsetDateTime,
    pub change_description: String,
}

/// Persistence boundary for versions. A real deployment backs this with the
/// `document_versions` table of §6 (`UNIQUE(documentId, versionNumber)`); this crate ships
/// an in-memory implementation for tests and for running the server standalone.
pub trait VersionStore: Send + Sync {
    /// Mints a persistence-layer id for a new version row. Delegated to the store (rather
    /// than minted ad hoc by `VersionController`) so a real backend can hand out ids however
    /// it persists them (an auto-increment primary key, a UUID, ...) without two version
    /// writes in the same instant ever colliding.
    fn next_version_id(&self) -> VersionId;
    fn insert(&self, version: DocumentVersion);
    fn get_by_number(
        &self,
        document_id: &DocumentId,
        version_number: VersionNumber,
    ) -> Option<DocumentVersion>;
    /// Newest first.
    fn list_history(&self, document_id: &DocumentId) -> Vec<DocumentVersion>;
    fn max_version_number(&self, document_id: &DocumentId) -> Option<VersionNumber>;
    fn delete_all_for_document(&self, document_id: &DocumentId);
}

#[derive(Default)]
pub struct InMemoryVersionStore {
    versions: Mutex<HashMap<DocumentId, Vec<DocumentVersion>>>,
    next_id: AtomicU64,
}

impl InMemoryVersionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl VersionStore for InMemoryVersionStore {
    fn next_version_id(&self) -> VersionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        VersionId(format!("ver-{id}"))
    }

    fn insert(&self, version: DocumentVersion) {
        let mut versions = self.versions.lock().unwrap();
        versions
            .entry(version.document_id.clone())
            .or_default()
            .push(version);
    }

    fn get_by_number(
        &self,
        document_id: &DocumentId,
        version_number: VersionNumber,
    ) -> Option<DocumentVersion> {
        let versions = self.versions.lock().unwrap();
        versions
            .get(document_id)?
            .iter()
            .find(|v| v.version_number == version_number)
            .cloned()
    }

    fn list_history(&self, document_id: &DocumentId) -> Vec<DocumentVersion> {
        let versions = self.versions.lock().unwrap();
        let mut list = versions.get(document_id).cloned().unwrap_or_default();
        list.sort_by(|a, b| b.version_number.cmp(&a.version_number));
        list
    }

    fn max_version_number(&self, document_id: &DocumentId) -> Option<VersionNumber> {
        let versions = self.versions.lock().unwrap();
        versions
            .get(document_id)
            .and_then(|v| v.iter().map(|v| v.version_number).max())
    }

    fn delete_all_for_document(&self, document_id: &DocumentId) {
        let mut versions = self.versions.lock().unwrap();
        versions.remove(document_id);
    }
}

/// Looks up every distinct user id once and returns the resulting `UserId -> display_name`
/// map, used by both enrichment methods below.
async fn resolve_display_names<'a, D: UserDirectory>(
    directory: &D,
    user_ids: impl Iterator<Item = &'a UserId>,
) -> anyhow::Result<HashMap<UserId, String>> {
    let mut distinct: Vec<UserId> = Vec::new();
    for id in user_ids {
        if !distinct.contains(id) {
            distinct.push(id.clone());
        }
    }
    let profiles = directory.get_users(&distinct).await?;
    Ok(profiles
        .into_iter()
        .map(|p| (p.user_id, p.display_name))
        .collect())
}

/// §10: a version plus the display name behind its `created_by`, resolved through the
/// out-of-scope user directory rather than cached locally.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedVersion {
    pub version: DocumentVersion,
    pub created_by_name: String,
}

/// §10: a contribution row plus its author's display name.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedContribution {
    pub contribution: UserContribution,
    pub display_name: String,
}

/// Outcome of `revert_to_version`: the new version row plus the content the caller must
/// push back into the `DocumentRoom` via its narrow `reset` interface (§9: VC -> DR is a
/// one-way call, never a back-reference).
#[derive(Debug, Clone)]
pub struct RevertOutcome {
    pub new_version: DocumentVersion,
    pub reset_text: String,
}

pub struct VersionController<S: VersionStore, L: ChangeLog, C: ContributionStore> {
    store: S,
    change_log: L,
    contributions: C,
    /// §6/§12 `diff.enabled`: whether `getDiff` pre-computes `DiffSummary` stats alongside
    /// the segments. Segments are always produced; this only gates the stats pass.
    diff_enabled: bool,
}

impl<S: VersionStore, L: ChangeLog, C: ContributionStore> VersionController<S, L, C> {
    pub fn new(store: S, change_log: L, contributions: C, diff_enabled: bool) -> Self {
        Self {
            store,
            change_log,
            contributions,
            diff_enabled,
        }
    }

    /// Called exactly once at document creation. Idempotent: if version 0 already exists,
    /// returns it without writing.
    pub fn create_initial_version(
        &self,
        document_id: &DocumentId,
        initial_text: &str,
        author_id: &UserId,
    ) -> DocumentVersion
    where
        S: VersionStore,
    {
        if let Some(existing) = self.store.get_by_number(document_id, VersionNumber(0)) {
            return existing;
        }
        let version = DocumentVersion {
            id: self.store.next_version_id(),
            document_id: document_id.clone(),
            version_number: VersionNumber(0),
            content: initial_text.to_string(),
            created_by: author_id.clone(),
            created_at: OffsetDateTime::now_utc(),
            change_description: "Initial version".to_string(),
        };
        self.store.insert(version.clone());
        version
    }

    /// Snapshots the current text. Fails with `CoreError::Conflict` if there are no
    /// unversioned changes to snapshot.
    pub fn create_version(
        &self,
        document_id: &DocumentId,
        current_text: &str,
        author_id: &UserId,
        description: impl Into<String>,
    ) -> CoreResult<DocumentVersion> {
        let unversioned = self.change_log.list_unversioned(document_id);
        if unversioned.is_empty() {
            return Err(CoreError::Conflict(
                "no changes to snapshot".to_string(),
            ));
        }

        let next_number = self
            .store
            .max_version_number(document_id)
            .map_or(VersionNumber(0), |n| VersionNumber(n.0 + 1));

        let version = DocumentVersion {
            id: self.store.next_version_id(),
            document_id: document_id.clone(),
            version_number: next_number,
            content: current_text.to_string(),
            created_by: author_id.clone(),
            created_at: OffsetDateTime::now_utc(),
            change_description: description.into(),
        };

        self.store.insert(version.clone());
        self.change_log
            .link_to_version(document_id, version.id.clone());

        Ok(version)
    }

    #[must_use]
    pub fn get_history(&self, document_id: &DocumentId) -> Vec<DocumentVersion> {
        self.store.list_history(document_id)
    }

    pub fn get_version(
        &self,
        document_id: &DocumentId,
        version_number: VersionNumber,
    ) -> CoreResult<DocumentVersion> {
        self.store
            .get_by_number(document_id, version_number)
            .ok_or_else(|| CoreError::VersionNotFound {
                document: document_id.clone(),
                version: version_number,
            })
    }

    /// Restores prior text by creating a *new* version whose content equals the target's
    /// (strategy B, §13): never rewrites history. The caller is responsible for pushing
    /// `RevertOutcome::reset_text` into the `DocumentRoom`.
    pub fn revert_to_version(
        &self,
        document_id: &DocumentId,
        target_version_number: VersionNumber,
        user_id: &UserId,
    ) -> CoreResult<RevertOutcome> {
        let target = self.get_version(document_id, target_version_number)?;

        let next_number = self
            .store
            .max_version_number(document_id)
            .map_or(VersionNumber(0), |n| VersionNumber(n.0 + 1));

        let new_version = DocumentVersion {
            id: self.store.next_version_id(),
            document_id: document_id.clone(),
            version_number: next_number,
            content: target.content.clone(),
            created_by: user_id.clone(),
            created_at: OffsetDateTime::now_utc(),
            change_description: format!("Reverted to version {}", target_version_number.0),
        };
        self.store.insert(new_version.clone());

        Ok(RevertOutcome {
            reset_text: new_version.content.clone(),
            new_version,
        })
    }

    /// Diffs two versions' content. If `from_version` is `None`, diffs from the
    /// immediately prior version, or from the empty string if `to_version` is version 0.
    pub fn get_diff(
        &self,
        document_id: &DocumentId,
        from_version: Option<VersionNumber>,
        to_version: VersionNumber,
    ) -> CoreResult<LineDiff> {
        let to = self.get_version(document_id, to_version)?;

        let from_content = match from_version {
            Some(v) => Some(self.get_version(document_id, v)?.content),
            None if to_version.0 == 0 => None,
            None => {
                let prior = VersionNumber(to_version.0 - 1);
                Some(self.get_version(document_id, prior)?.content)
            }
        };

        Ok(line_diff_opts(
            from_content.as_deref(),
            Some(to.content.as_str()),
            self.diff_enabled,
        ))
    }

    #[must_use]
    pub fn get_user_contributions(&self, document_id: &DocumentId) -> Vec<UserContribution> {
        self.contributions.list_for_document(document_id)
    }

    /// §10: enriches `getHistory` with the display name behind each version's `created_by`,
    /// resolved through the out-of-scope user directory rather than cached locally.
    pub async fn get_history_enriched<D: UserDirectory>(
        &self,
        document_id: &DocumentId,
        directory: &D,
    ) -> anyhow::Result<Vec<EnrichedVersion>> {
        let history = self.get_history(document_id);
        let names = resolve_display_names(directory, history.iter().map(|v| &v.created_by)).await?;
        Ok(history
            .into_iter()
            .map(|version| {
                let created_by_name = names
                    .get(&version.created_by)
                    .cloned()
                    .unwrap_or_else(|| version.created_by.0.clone());
                EnrichedVersion {
                    version,
                    created_by_name,
                }
            })
            .collect())
    }

    /// §10: enriches `getUserContributions` the same way.
    pub async fn get_user_contributions_enriched<D: UserDirectory>(
        &self,
        document_id: &DocumentId,
        directory: &D,
    ) -> anyhow::Result<Vec<EnrichedContribution>> {
        let contributions = self.get_user_contributions(document_id);
        let names =
            resolve_display_names(directory, contributions.iter().map(|c| &c.user_id)).await?;
        Ok(contributions
            .into_iter()
            .map(|contribution| {
                let display_name = names
                    .get(&contribution.user_id)
                    .cloned()
                    .unwrap_or_else(|| contribution.user_id.0.clone());
                EnrichedContribution {
                    contribution,
                    display_name,
                }
            })
            .collect())
    }

    /// Cascade delete of versions and contributions on document destruction. The change
    /// log's own per-document deletion is the caller's responsibility (it is a sibling
    /// collaborator, not owned by VC).
    pub fn delete_all_for_document(&self, document_id: &DocumentId) {
        self.store.delete_all_for_document(document_id);
        self.contributions.delete_all_for_document(document_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_log::InMemoryChangeLog;
    use crate::collaborators::{InMemoryUserDirectory, UserProfile};
    use crate::contributions::InMemoryContributionStore;
    use crate::ids::ChangeLogEntryId;
    use crate::operation::OperationKind;

    fn vc() -> VersionController<InMemoryVersionStore, InMemoryChangeLog, InMemoryContributionStore>
    {
        VersionController::new(
            InMemoryVersionStore::new(),
            InMemoryChangeLog::new(),
            InMemoryContributionStore::new(),
            true,
        )
    }

    fn doc() -> DocumentId {
        DocumentId("doc-1".to_string())
    }

    fn user() -> UserId {
        UserId("u1".to_string())
    }

    #[test]
    fn initial_version_is_idempotent() {
        let vc = vc();
        let first = vc.create_initial_version(&doc(), "", &user());
        let second = vc.create_initial_version(&doc(), "ignored", &user());
        assert_eq!(first.id, second.id);
        assert_eq!(second.content, "");
    }

    #[test]
    fn create_version_fails_without_unversioned_changes() {
        let vc = vc();
        vc.create_initial_version(&doc(), "", &user());
        let result = vc.create_version(&doc(), "Hi", &user(), "typed Hi");
        assert!(matches!(result, Err(CoreError::Conflict(_))));
    }

    #[test]
    fn scenario_4_first_snapshot_links_change_log() {
        let vc = vc();
        vc.create_initial_version(&doc(), "", &user());

        vc.change_log
            .append(crate::change_log::ChangeLogEntry {
                id: ChangeLogEntryId("e1".to_string()),
                document_id: doc(),
                author_id: user(),
                change_type: OperationKind::Insert,
                text: "H".to_string(),
                position: 0,
                operation_id: 0,
                timestamp: OffsetDateTime::now_utc(),
                version_id: None,
            })
            .unwrap();
        vc.change_log
            .append(crate::change_log::ChangeLogEntry {
                id: ChangeLogEntryId("e2".to_string()),
                document_id: doc(),
                author_id: user(),
                change_type: OperationKind::Insert,
                text: "i".to_string(),
                position: 1,
                operation_id: 1,
                timestamp: OffsetDateTime::now_utc(),
                version_id: None,
            })
            .unwrap();

        let version = vc.create_version(&doc(), "Hi", &user(), "typed Hi").unwrap();
        assert_eq!(version.version_number, VersionNumber(1));
        assert!(vc.change_log.list_unversioned(&doc()).is_empty());
        assert_eq!(vc.change_log.list_by_version(&version.id).len(), 2);
    }

    #[test]
    fn scenario_5_revert_round_trip() {
        let vc = vc();
        vc.create_initial_version(&doc(), "", &user());
        vc.change_log
            .append(crate::change_log::ChangeLogEntry {
                id: ChangeLogEntryId("e1".to_string()),
                document_id: doc(),
                author_id: user(),
                change_type: OperationKind::Insert,
                text: "Hi".to_string(),
                position: 0,
                operation_id: 0,
                timestamp: OffsetDateTime::now_utc(),
                version_id: None,
            })
            .unwrap();
        vc.create_version(&doc(), "Hi", &user(), "typed Hi").unwrap();

        let outcome = vc
            .revert_to_version(&doc(), VersionNumber(0), &user())
            .unwrap();
        assert_eq!(outcome.new_version.version_number, VersionNumber(2));
        assert_eq!(outcome.reset_text, "");

        let history = vc.get_history(&doc());
        assert_eq!(
            history.iter().map(|v| v.version_number.0).collect::<Vec<_>>(),
            vec![2, 1, 0]
        );

        let diff = vc
            .get_diff(&doc(), Some(VersionNumber(1)), VersionNumber(2))
            .unwrap();
        assert_eq!(diff.summary.removed_chars, 2);
    }

    #[test]
    fn version_density_holds_across_snapshots() {
        let vc = vc();
        vc.create_initial_version(&doc(), "", &user());
        for i in 0..3 {
            vc.change_log
                .append(crate::change_log::ChangeLogEntry {
                    id: ChangeLogEntryId(format!("e{i}")),
                    document_id: doc(),
                    author_id: user(),
                    change_type: OperationKind::Insert,
                    text: "x".to_string(),
                    position: 0,
                    operation_id: i,
                    timestamp: OffsetDateTime::now_utc(),
                    version_id: None,
                })
                .unwrap();
            vc.create_version(&doc(), "x", &user(), "edit").unwrap();
        }
        let mut numbers: Vec<u64> = vc.get_history(&doc()).iter().map(|v| v.version_number.0).collect();
        numbers.sort_unstable();
        assert_eq!(numbers, vec![0, 1, 2, 3]);
    }

    #[test]
    fn diff_disabled_skips_summary_but_keeps_segments() {
        let vc = VersionController::new(
            InMemoryVersionStore::new(),
            InMemoryChangeLog::new(),
            InMemoryContributionStore::new(),
            false,
        );
        vc.create_initial_version(&doc(), "Hi", &user());
        vc.change_log
            .append(crate::change_log::ChangeLogEntry {
                id: ChangeLogEntryId("e1".to_string()),
                document_id: doc(),
                author_id: user(),
                change_type: OperationKind::Delete,
                text: "Hi".to_string(),
                position: 0,
                operation_id: 0,
                timestamp: OffsetDateTime::now_utc(),
                version_id: None,
            })
            .unwrap();
        vc.create_version(&doc(), "", &user(), "cleared").unwrap();

        let diff = vc
            .get_diff(&doc(), Some(VersionNumber(0)), VersionNumber(1))
            .unwrap();
        assert_eq!(diff.summary, crate::diff::DiffSummary::default());
        assert!(!diff.segments.is_empty());
    }

    #[tokio::test]
    async fn get_history_enriched_resolves_display_names() {
        let vc = vc();
        vc.create_initial_version(&doc(), "", &user());
        let directory = InMemoryUserDirectory::new();
        directory.insert(UserProfile {
            user_id: user(),
            display_name: "Ada".to_string(),
        });

        let history = vc.get_history_enriched(&doc(), &directory).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].created_by_name, "Ada");
    }

    #[tokio::test]
    async fn get_history_enriched_falls_back_to_id_when_unregistered() {
        let vc = vc();
        vc.create_initial_version(&doc(), "", &user());
        let directory = InMemoryUserDirectory::new();

        let history = vc.get_history_enriched(&doc(), &directory).await.unwrap();
        assert_eq!(history[0].created_by_name, user().0);
    }
}
