//! Versioned active-storage cell.
//!
//! The active object-store backend can be swapped at runtime (an admin
//! pointing the system at a new bucket). Holders take an `Arc` snapshot at
//! the start of an operation, so in-flight downloads keep using the
//! source they started with; only new operations see the swap.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::client::StorageClient;

/// The process-wide active storage source.
pub struct ActiveStorage {
    current: RwLock<Arc<StorageClient>>,
    version: AtomicU64,
}

impl ActiveStorage {
    pub fn new(client: StorageClient) -> Self {
        Self {
            current: RwLock::new(Arc::new(client)),
            version: AtomicU64::new(1),
        }
    }

    /// Snapshot the current client. The snapshot stays valid across swaps.
    pub fn current(&self) -> Arc<StorageClient> {
        self.current.read().expect("storage cell poisoned").clone()
    }

    /// Current configuration version.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Install a new storage source; returns the new version.
    pub fn swap(&self, client: StorageClient) -> u64 {
        let mut guard = self.current.write().expect("storage cell poisoned");
        *guard = Arc::new(client);
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }
}
