//! External collaborator boundary (§10 expansion): narrow async trait contracts for the
//! out-of-scope services named in §1/§6 — authorization, document metadata, user directory.
//! The core calls into these; it never embeds their business rules. In-memory mocks are
//! provided so the core can be built, tested, and run standalone without a real deployment
//! wired up.

use crate::ids::{DocumentId, UserId};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub owner_id: UserId,
    pub collaborator_ids: Vec<UserId>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub user_id: UserId,
    pub display_name: String,
}

/// `isMember`/`isAdmin` pull interface (§6, §9's "Authorization enrichment" note): the core
/// asks, it never maintains its own copy of the collaborator list. Plain `async fn` in trait
/// (stable since the crate's MSRV), no `async-trait` boxing needed since every caller is
/// generic over a concrete implementation rather than holding a trait object.
pub trait AuthorizationClient: Send + Sync {
    fn is_member(
        &self,
        document_id: &DocumentId,
        user_id: &UserId,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;
    fn is_admin(&self, user_id: &UserId) -> impl std::future::Future<Output = Result<bool>> + Send;
}

pub trait DocumentMetadataStore: Send + Sync {
    fn get_document(
        &self,
        document_id: &DocumentId,
    ) -> impl std::future::Future<Output = Result<DocumentMetadata>> + Send;
    /// Best-effort cache refresh called after a revert pushes text back into the room;
    /// failures are logged, never surfaced to the reverting client (§10).
    fn update_content(
        &self,
        document_id: &DocumentId,
        text: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait UserDirectory: Send + Sync {
    fn get_user(
        &self,
        user_id: &UserId,
    ) -> impl std::future::Future<Output = Result<UserProfile>> + Send;
    fn get_users(
        &self,
        user_ids: &[UserId],
    ) -> impl std::future::Future<Output = Result<Vec<UserProfile>>> + Send;
}

/// Authorizes everyone as a member of every document and nobody as an admin, unless
/// explicitly configured otherwise. Good enough for the standalone binary and for tests that
/// don't care about authorization failures.
#[derive(Default)]
pub struct MockAuthorizationClient {
    denied: Mutex<HashMap<DocumentId, Vec<UserId>>>,
    admins: Mutex<Vec<UserId>>,
}

impl MockAuthorizationClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny(&self, document_id: DocumentId, user_id: UserId) {
        self.denied
            .lock()
            .unwrap()
            .entry(document_id)
            .or_default()
            .push(user_id);
    }

    pub fn grant_admin(&self, user_id: UserId) {
        self.admins.lock().unwrap().push(user_id);
    }
}

impl AuthorizationClient for MockAuthorizationClient {
    async fn is_member(&self, document_id: &DocumentId, user_id: &UserId) -> Result<bool> {
        let denied = self.denied.lock().unwrap();
        Ok(denied
            .get(document_id)
            .is_none_or(|list| !list.contains(user_id)))
    }

    async fn is_admin(&self, user_id: &UserId) -> Result<bool> {
        Ok(self.admins.lock().unwrap().contains(user_id))
    }
}

#[derive(Default)]
pub struct InMemoryDocumentMetadataStore {
    documents: Mutex<HashMap<DocumentId, DocumentMetadata>>,
}

impl InMemoryDocumentMetadataStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, document_id: DocumentId, metadata: DocumentMetadata) {
        self.documents.lock().unwrap().insert(document_id, metadata);
    }
}

impl DocumentMetadataStore for InMemoryDocumentMetadataStore {
    async fn get_document(&self, document_id: &DocumentId) -> Result<DocumentMetadata> {
        self.documents
            .lock()
            .unwrap()
            .get(document_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("document {document_id} not found"))
    }

    async fn update_content(&self, _document_id: &DocumentId, _text: &str) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: Mutex<HashMap<UserId, UserProfile>>,
}

impl InMemoryUserDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, profile: UserProfile) {
        self.users
            .lock()
            .unwrap()
            .insert(profile.user_id.clone(), profile);
    }
}

impl UserDirectory for InMemoryUserDirectory {
    async fn get_user(&self, user_id: &UserId) -> Result<UserProfile> {
        let existing = self.users.lock().unwrap().get(user_id).cloned();
        Ok(existing.unwrap_or_else(|| UserProfile {
            user_id: user_id.clone(),
            display_name: user_id.0.clone(),
        }))
    }

    async fn get_users(&self, user_ids: &[UserId]) -> Result<Vec<UserProfile>> {
        let mut profiles = Vec::with_capacity(user_ids.len());
        for id in user_ids {
            profiles.push(self.get_user(id).await?);
        }
        Ok(profiles)
    }
}
