//! Object storage for Narravo: an S3-compatible blob store client plus the
//! material resolver that turns stored references into local files.

pub mod client;
pub mod error;
pub mod keys;
pub mod resolver;
pub mod source;

pub use client::{StorageClient, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use keys::{object_key, KeyPurpose};
pub use resolver::MaterialResolver;
pub use source::ActiveStorage;
