//! Catalog struct, generic document helpers, project and API-key repos.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use narravo_models::{
    ApiKey, ApiKeyId, Project, ProjectId, ProjectStatus, ProviderKind, UserId,
};

use crate::crypto::SecretCipher;
use crate::error::{CatalogError, CatalogResult};
use crate::store::{DocStore, MemoryStore};

pub(crate) const PROJECTS: &str = "projects";
pub(crate) const CHAPTERS: &str = "chapters";
pub(crate) const PARAGRAPHS: &str = "paragraphs";
pub(crate) const SENTENCES: &str = "sentences";
pub(crate) const API_KEYS: &str = "api_keys";
pub(crate) const VIDEO_TASKS: &str = "video_tasks";

/// How many times an optimistic update retries before giving up.
const UPDATE_RETRIES: u32 = 5;

/// Typed repositories over a document store.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn DocStore>,
    cipher: SecretCipher,
}

impl Catalog {
    pub fn new(store: Arc<dyn DocStore>, cipher: SecretCipher) -> Self {
        Self { store, cipher }
    }

    /// In-memory catalog for tests and local runs.
    pub fn in_memory(process_secret: &str) -> Self {
        Self::new(Arc::new(MemoryStore::new()), SecretCipher::new(process_secret))
    }

    pub(crate) fn store(&self) -> &dyn DocStore {
        self.store.as_ref()
    }

    // ------------------------------------------------------------------
    // Generic document helpers
    // ------------------------------------------------------------------

    pub(crate) async fn try_load<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> CatalogResult<Option<(T, u64)>> {
        match self.store.get(collection, id).await? {
            Some(doc) => {
                let entity = serde_json::from_str(&doc.json)?;
                Ok(Some((entity, doc.version)))
            }
            None => Ok(None),
        }
    }

    pub(crate) async fn load<T: DeserializeOwned>(
        &self,
        collection: &str,
        kind: &'static str,
        id: &str,
    ) -> CatalogResult<(T, u64)> {
        self.try_load(collection, id)
            .await?
            .ok_or_else(|| CatalogError::not_found(kind, id))
    }

    /// Create a document; fails if it already exists.
    pub(crate) async fn insert<T: Serialize>(
        &self,
        collection: &str,
        id: &str,
        entity: &T,
    ) -> CatalogResult<()> {
        let json = serde_json::to_string(entity)?;
        self.store.put(collection, id, &json, Some(0)).await?;
        Ok(())
    }

    /// Read-modify-write under optimistic concurrency, retrying lost races.
    pub(crate) async fn update<T, F>(
        &self,
        collection: &str,
        kind: &'static str,
        id: &str,
        mut mutate: F,
    ) -> CatalogResult<T>
    where
        T: DeserializeOwned + Serialize,
        F: FnMut(&mut T) -> CatalogResult<()>,
    {
        for _ in 0..UPDATE_RETRIES {
            let (mut entity, version) = self.load::<T>(collection, kind, id).await?;
            mutate(&mut entity)?;
            let json = serde_json::to_string(&entity)?;
            match self.store.put(collection, id, &json, Some(version)).await {
                Ok(_) => return Ok(entity),
                Err(CatalogError::VersionMismatch(_)) => {
                    debug!(collection, id, "update lost a race, retrying");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        Err(CatalogError::VersionMismatch(format!(
            "{collection}:{id}: retries exhausted"
        )))
    }

    // ------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------

    pub async fn create_project(&self, project: &Project) -> CatalogResult<()> {
        self.insert(PROJECTS, project.id.as_str(), project).await?;
        self.store
            .index_add(&format!("user:projects:{}", project.owner_id), project.id.as_str())
            .await?;
        Ok(())
    }

    pub async fn get_project(&self, id: &ProjectId) -> CatalogResult<Project> {
        Ok(self.load(PROJECTS, "project", id.as_str()).await?.0)
    }

    fn ensure_workable(project: &Project) -> CatalogResult<()> {
        if project.status == ProjectStatus::Archived {
            return Err(CatalogError::business_rule(
                "archived projects accept no further work",
            ));
        }
        Ok(())
    }

    pub async fn set_project_status(
        &self,
        id: &ProjectId,
        status: ProjectStatus,
        progress: u8,
    ) -> CatalogResult<Project> {
        self.update(PROJECTS, "project", id.as_str(), |p: &mut Project| {
            Self::ensure_workable(p)?;
            p.set_status(status, progress);
            Ok(())
        })
        .await
    }

    pub async fn mark_project_failed(
        &self,
        id: &ProjectId,
        error: &str,
    ) -> CatalogResult<Project> {
        self.update(PROJECTS, "project", id.as_str(), |p: &mut Project| {
            p.mark_failed(error);
            Ok(())
        })
        .await
    }

    /// Reset a failed project back to `uploaded` so parsing can rerun.
    pub async fn reset_project_for_retry(&self, id: &ProjectId) -> CatalogResult<Project> {
        self.update(PROJECTS, "project", id.as_str(), |p: &mut Project| {
            if p.status != ProjectStatus::Failed {
                return Err(CatalogError::business_rule(format!(
                    "only failed projects can be retried, status is {}",
                    p.status
                )));
            }
            p.reset_for_retry();
            Ok(())
        })
        .await
    }

    pub async fn set_project_statistics(
        &self,
        id: &ProjectId,
        chapters: u32,
        paragraphs: u32,
        sentences: u32,
        words: u32,
    ) -> CatalogResult<Project> {
        self.update(PROJECTS, "project", id.as_str(), |p: &mut Project| {
            p.chapter_count = chapters;
            p.paragraph_count = paragraphs;
            p.sentence_count = sentences;
            p.word_count = words;
            Ok(())
        })
        .await
    }

    // ------------------------------------------------------------------
    // API keys
    // ------------------------------------------------------------------

    /// Store a new key; the plaintext is sealed before it touches the store.
    pub async fn create_api_key(
        &self,
        user_id: UserId,
        name: &str,
        provider: ProviderKind,
        plaintext_secret: &str,
        base_url: Option<String>,
    ) -> CatalogResult<ApiKey> {
        let sealed = self.cipher.encrypt(plaintext_secret);
        let key = ApiKey::new(user_id, name, provider, sealed, base_url);
        self.insert(API_KEYS, key.id.as_str(), &key).await?;
        self.store
            .index_add(&format!("user:api_keys:{}", key.user_id), key.id.as_str())
            .await?;
        Ok(key)
    }

    /// Fetch a key, verifying ownership.
    pub async fn get_api_key(&self, id: &ApiKeyId, user_id: &UserId) -> CatalogResult<ApiKey> {
        let (key, _): (ApiKey, u64) = self.load(API_KEYS, "api_key", id.as_str()).await?;
        if &key.user_id != user_id {
            return Err(CatalogError::not_found("api_key", id.as_str()));
        }
        Ok(key)
    }

    /// Fetch a key without an ownership filter. For worker-side use where
    /// ownership was validated when the task was enqueued.
    pub async fn get_api_key_by_id(&self, id: &ApiKeyId) -> CatalogResult<ApiKey> {
        Ok(self.load(API_KEYS, "api_key", id.as_str()).await?.0)
    }

    /// Decrypt the key's secret at the point of use.
    pub fn decrypt_api_key(&self, key: &ApiKey) -> CatalogResult<String> {
        self.cipher.decrypt(&key.secret_ciphertext)
    }

    /// Best-effort batched usage accounting.
    pub async fn record_api_key_usage(&self, id: &ApiKeyId, calls: u64) -> CatalogResult<ApiKey> {
        self.update(API_KEYS, "api_key", id.as_str(), |k: &mut ApiKey| {
            k.record_usage(calls);
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use narravo_models::ProjectFileType;

    fn project(owner: &UserId) -> Project {
        Project::new(
            owner.clone(),
            "novel",
            "novel.txt",
            42,
            ProjectFileType::Txt,
            "uploads/u/20260801/doc.txt",
            "cafe",
        )
    }

    #[tokio::test]
    async fn project_roundtrip_and_status() {
        let catalog = Catalog::in_memory("secret");
        let owner = UserId::new();
        let p = project(&owner);
        catalog.create_project(&p).await.unwrap();

        let loaded = catalog.get_project(&p.id).await.unwrap();
        assert_eq!(loaded.title, "novel");

        let updated = catalog
            .set_project_status(&p.id, ProjectStatus::Parsing, 10)
            .await
            .unwrap();
        assert_eq!(updated.status, ProjectStatus::Parsing);
        assert_eq!(updated.processing_progress, 10);
    }

    #[tokio::test]
    async fn archived_projects_reject_work() {
        let catalog = Catalog::in_memory("secret");
        let p = project(&UserId::new());
        catalog.create_project(&p).await.unwrap();
        catalog
            .set_project_status(&p.id, ProjectStatus::Archived, 100)
            .await
            .unwrap();

        let err = catalog
            .set_project_status(&p.id, ProjectStatus::Parsing, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::BusinessRule(_)));
    }

    #[tokio::test]
    async fn retry_requires_failed_state() {
        let catalog = Catalog::in_memory("secret");
        let p = project(&UserId::new());
        catalog.create_project(&p).await.unwrap();

        assert!(catalog.reset_project_for_retry(&p.id).await.is_err());

        catalog.mark_project_failed(&p.id, "boom").await.unwrap();
        let reset = catalog.reset_project_for_retry(&p.id).await.unwrap();
        assert_eq!(reset.status, ProjectStatus::Uploaded);
    }

    #[tokio::test]
    async fn api_key_secret_roundtrips_through_seal() {
        let catalog = Catalog::in_memory("secret");
        let owner = UserId::new();
        let key = catalog
            .create_api_key(owner.clone(), "main", ProviderKind::Deepseek, "sk-123", None)
            .await
            .unwrap();

        assert_ne!(key.secret_ciphertext, "sk-123");
        let loaded = catalog.get_api_key(&key.id, &owner).await.unwrap();
        assert_eq!(catalog.decrypt_api_key(&loaded).unwrap(), "sk-123");

        // Ownership is enforced.
        assert!(catalog.get_api_key(&key.id, &UserId::new()).await.is_err());
    }

    #[tokio::test]
    async fn usage_accounting_accumulates() {
        let catalog = Catalog::in_memory("secret");
        let owner = UserId::new();
        let key = catalog
            .create_api_key(owner, "main", ProviderKind::Siliconflow, "sk", None)
            .await
            .unwrap();
        catalog.record_api_key_usage(&key.id, 3).await.unwrap();
        let updated = catalog.record_api_key_usage(&key.id, 2).await.unwrap();
        assert_eq!(updated.usage_count, 5);
    }
}
