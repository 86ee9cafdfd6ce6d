//! Document store abstraction and the in-memory backend.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{CatalogError, CatalogResult};

/// A stored document with its optimistic-concurrency version.
#[derive(Debug, Clone)]
pub struct VersionedDoc {
    pub json: String,
    pub version: u64,
}

/// Key-addressed JSON documents plus set-shaped secondary indexes.
#[async_trait]
pub trait DocStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> CatalogResult<Option<VersionedDoc>>;

    /// Write a document. `expected_version` of `Some(v)` is a
    /// compare-and-swap against the current version (0 = must not exist);
    /// `None` writes unconditionally. Returns the new version.
    async fn put(
        &self,
        collection: &str,
        id: &str,
        json: &str,
        expected_version: Option<u64>,
    ) -> CatalogResult<u64>;

    async fn delete(&self, collection: &str, id: &str) -> CatalogResult<()>;

    async fn index_add(&self, index: &str, member: &str) -> CatalogResult<()>;

    /// Add to an index only if absent; `false` when the member already
    /// existed. Backs uniqueness constraints.
    async fn index_add_nx(&self, index: &str, member: &str) -> CatalogResult<bool>;

    async fn index_remove(&self, index: &str, member: &str) -> CatalogResult<()>;

    async fn index_members(&self, index: &str) -> CatalogResult<Vec<String>>;
}

#[derive(Default)]
struct MemoryInner {
    docs: HashMap<String, VersionedDoc>,
    indexes: HashMap<String, BTreeSet<String>>,
    unique: HashMap<String, HashSet<String>>,
}

/// In-memory backend for tests and single-process runs.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn doc_key(collection: &str, id: &str) -> String {
    format!("{collection}:{id}")
}

#[async_trait]
impl DocStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> CatalogResult<Option<VersionedDoc>> {
        let inner = self.inner.read().await;
        Ok(inner.docs.get(&doc_key(collection, id)).cloned())
    }

    async fn put(
        &self,
        collection: &str,
        id: &str,
        json: &str,
        expected_version: Option<u64>,
    ) -> CatalogResult<u64> {
        let mut inner = self.inner.write().await;
        let key = doc_key(collection, id);
        let current = inner.docs.get(&key).map(|d| d.version).unwrap_or(0);

        if let Some(expected) = expected_version {
            if current != expected {
                return Err(CatalogError::VersionMismatch(format!(
                    "{key}: expected v{expected}, found v{current}"
                )));
            }
        }

        let version = current + 1;
        inner.docs.insert(
            key,
            VersionedDoc {
                json: json.to_string(),
                version,
            },
        );
        Ok(version)
    }

    async fn delete(&self, collection: &str, id: &str) -> CatalogResult<()> {
        let mut inner = self.inner.write().await;
        inner.docs.remove(&doc_key(collection, id));
        Ok(())
    }

    async fn index_add(&self, index: &str, member: &str) -> CatalogResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .indexes
            .entry(index.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn index_add_nx(&self, index: &str, member: &str) -> CatalogResult<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .unique
            .entry(index.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn index_remove(&self, index: &str, member: &str) -> CatalogResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(set) = inner.indexes.get_mut(index) {
            set.remove(member);
        }
        if let Some(set) = inner.unique.get_mut(index) {
            set.remove(member);
        }
        Ok(())
    }

    async fn index_members(&self, index: &str) -> CatalogResult<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .indexes
            .get(index)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_bumps_versions() {
        let store = MemoryStore::new();
        let v1 = store.put("projects", "p1", "{}", Some(0)).await.unwrap();
        assert_eq!(v1, 1);
        let v2 = store.put("projects", "p1", "{}", Some(1)).await.unwrap();
        assert_eq!(v2, 2);
    }

    #[tokio::test]
    async fn stale_cas_is_rejected() {
        let store = MemoryStore::new();
        store.put("projects", "p1", "{}", Some(0)).await.unwrap();
        let err = store.put("projects", "p1", "{}", Some(0)).await.unwrap_err();
        assert!(matches!(err, CatalogError::VersionMismatch(_)));
    }

    #[tokio::test]
    async fn unique_index_rejects_duplicates() {
        let store = MemoryStore::new();
        assert!(store.index_add_nx("uniq:x", "1").await.unwrap());
        assert!(!store.index_add_nx("uniq:x", "1").await.unwrap());
        store.index_remove("uniq:x", "1").await.unwrap();
        assert!(store.index_add_nx("uniq:x", "1").await.unwrap());
    }

    #[tokio::test]
    async fn index_members_are_sorted() {
        let store = MemoryStore::new();
        store.index_add("idx", "b").await.unwrap();
        store.index_add("idx", "a").await.unwrap();
        assert_eq!(store.index_members("idx").await.unwrap(), vec!["a", "b"]);
    }
}
