//! Material resolver: stored reference -> local file.
//!
//! A reference is either a raw object key or a presigned URL written by an
//! older deployment. URLs are reduced back to their key and downloaded
//! through the owning client, so an expired signature never breaks the
//! pipeline.

use std::path::Path;

use tracing::debug;
use url::Url;

use std::sync::Arc;

use crate::client::StorageClient;
use crate::error::{StorageError, StorageResult};
use crate::source::ActiveStorage;

/// Resolves stored material references to local files.
///
/// Each resolve snapshots the active storage source, so a source swap
/// mid-task never mixes backends within one download.
#[derive(Clone)]
pub struct MaterialResolver {
    source: Arc<ActiveStorage>,
}

impl MaterialResolver {
    pub fn new(storage: StorageClient) -> Self {
        Self {
            source: Arc::new(ActiveStorage::new(storage)),
        }
    }

    /// Share an existing active-storage cell.
    pub fn with_source(source: Arc<ActiveStorage>) -> Self {
        Self { source }
    }

    /// Materialize `reference` at `dest`. Fails with `NotFound` when the
    /// underlying key does not exist.
    pub async fn resolve(&self, reference: &str, dest: impl AsRef<Path>) -> StorageResult<()> {
        let key = extract_key(reference)?;
        let storage = self.source.current();
        debug!(%key, source_version = self.source.version(), "resolving material");
        storage.download_file(&key, dest).await
    }
}

/// Reduce a reference to an object key.
///
/// Presigned URLs look like `{scheme}://{host}/{bucket}/{key}?sig`; the
/// signature is discarded because the process re-signs as owner.
pub fn extract_key(reference: &str) -> StorageResult<String> {
    if !(reference.starts_with("http://") || reference.starts_with("https://")) {
        if reference.is_empty() {
            return Err(StorageError::invalid_reference("empty reference"));
        }
        return Ok(reference.to_string());
    }

    let url = Url::parse(reference)
        .map_err(|e| StorageError::invalid_reference(format!("{reference}: {e}")))?;

    // Path is /<bucket>/<key...>; drop the bucket segment.
    let path = url.path().trim_start_matches('/');
    let mut parts = path.splitn(2, '/');
    let _bucket = parts.next();
    let key = parts
        .next()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| StorageError::invalid_reference(format!("no key in URL: {reference}")))?;

    let decoded = urlencoding::decode(key)
        .map_err(|e| StorageError::invalid_reference(format!("{reference}: {e}")))?;
    Ok(decoded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_keys_pass_through() {
        assert_eq!(
            extract_key("images/u1/20260801/a.png").unwrap(),
            "images/u1/20260801/a.png"
        );
    }

    #[test]
    fn presigned_url_reduces_to_key() {
        let url = "http://localhost:9000/narravo/images/u1/20260801/a.png?X-Amz-Signature=abc&X-Amz-Expires=3600";
        assert_eq!(extract_key(url).unwrap(), "images/u1/20260801/a.png");
    }

    #[test]
    fn url_encoded_keys_are_decoded() {
        let url = "https://store.example.com/bucket/audio/u1/%E7%AC%AC%E4%B8%80%E7%AB%A0.mp3?sig=1";
        assert_eq!(extract_key(url).unwrap(), "audio/u1/第一章.mp3");
    }

    #[test]
    fn url_without_key_is_rejected() {
        assert!(extract_key("http://localhost:9000/bucket").is_err());
        assert!(extract_key("http://localhost:9000/bucket/").is_err());
    }

    #[test]
    fn empty_reference_is_rejected() {
        assert!(extract_key("").is_err());
    }
}
