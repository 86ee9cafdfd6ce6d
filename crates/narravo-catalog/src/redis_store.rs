//! Redis backend for the document store.
//!
//! Documents live in hashes (`narravo:doc:{collection}:{id}` with `json`
//! and `version` fields); compare-and-swap goes through a Lua script so
//! version check and write are atomic. Indexes are plain sets.

use async_trait::async_trait;
use redis::Script;

use crate::error::{CatalogError, CatalogResult};
use crate::store::{DocStore, VersionedDoc};

const CAS_PUT_SCRIPT: &str = r#"
local cur = redis.call('HGET', KEYS[1], 'version')
local current = tonumber(cur) or 0
if ARGV[2] ~= '' then
    if current ~= tonumber(ARGV[2]) then
        return -1
    end
end
local ver = current + 1
redis.call('HSET', KEYS[1], 'json', ARGV[1], 'version', ver)
return ver
"#;

/// Redis-backed document store.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    cas_put: Script,
}

impl RedisStore {
    pub fn new(redis_url: &str) -> CatalogResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            cas_put: Script::new(CAS_PUT_SCRIPT),
        })
    }

    pub fn from_env() -> CatalogResult<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        Self::new(&url)
    }

    fn doc_key(collection: &str, id: &str) -> String {
        format!("narravo:doc:{collection}:{id}")
    }

    fn index_key(index: &str) -> String {
        format!("narravo:idx:{index}")
    }

    async fn conn(&self) -> CatalogResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl DocStore for RedisStore {
    async fn get(&self, collection: &str, id: &str) -> CatalogResult<Option<VersionedDoc>> {
        let mut conn = self.conn().await?;
        let key = Self::doc_key(collection, id);
        let (json, version): (Option<String>, Option<u64>) = redis::cmd("HMGET")
            .arg(&key)
            .arg("json")
            .arg("version")
            .query_async(&mut conn)
            .await?;
        Ok(match (json, version) {
            (Some(json), Some(version)) => Some(VersionedDoc { json, version }),
            _ => None,
        })
    }

    async fn put(
        &self,
        collection: &str,
        id: &str,
        json: &str,
        expected_version: Option<u64>,
    ) -> CatalogResult<u64> {
        let mut conn = self.conn().await?;
        let key = Self::doc_key(collection, id);
        let expected = expected_version
            .map(|v| v.to_string())
            .unwrap_or_default();

        let result: i64 = self
            .cas_put
            .key(&key)
            .arg(json)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;

        if result < 0 {
            return Err(CatalogError::VersionMismatch(format!(
                "{key}: expected v{expected_version:?}"
            )));
        }
        Ok(result as u64)
    }

    async fn delete(&self, collection: &str, id: &str) -> CatalogResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("DEL")
            .arg(Self::doc_key(collection, id))
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn index_add(&self, index: &str, member: &str) -> CatalogResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("SADD")
            .arg(Self::index_key(index))
            .arg(member)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn index_add_nx(&self, index: &str, member: &str) -> CatalogResult<bool> {
        let mut conn = self.conn().await?;
        let added: u64 = redis::cmd("SADD")
            .arg(Self::index_key(index))
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(added == 1)
    }

    async fn index_remove(&self, index: &str, member: &str) -> CatalogResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("SREM")
            .arg(Self::index_key(index))
            .arg(member)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn index_members(&self, index: &str) -> CatalogResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let mut members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(Self::index_key(index))
            .query_async(&mut conn)
            .await?;
        members.sort();
        Ok(members)
    }
}
