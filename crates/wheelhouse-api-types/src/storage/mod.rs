pub use bytes::Bytes;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use error::{StorageError, StorageResult};
pub use key::{KeyError, StorageKey};

mod error;
mod key;

/// A hierarchical blob store.
///
/// Every method may suspend, and implementations must tolerate concurrent calls on
/// independent keys. Nothing coordinates concurrent writers of the same key: the last
/// write (or move) wins.
#[async_trait]
pub trait StorageProvider {
    /// Read an object and the metadata stored with it.
    async fn pull_file(&self, key: &StorageKey) -> StorageResult<FileResponse>;

    /// Store an object, replacing whatever was there before.
    async fn put_file(&self, key: &StorageKey, file_bytes: Bytes, meta: Metadata)
        -> StorageResult<()>;

    /// Re-key an object. Once this returns `Ok`, `from` no longer exists.
    async fn move_file(&self, from: &StorageKey, to: &StorageKey) -> StorageResult<()>;

    async fn delete_file(&self, key: &StorageKey) -> StorageResult<()>;

    async fn exists(&self, key: &StorageKey) -> StorageResult<bool>;

    /// All object keys at or below `prefix`, sorted.
    async fn list_prefix(&self, prefix: &StorageKey) -> StorageResult<Vec<StorageKey>>;

    async fn healthcheck(&self) -> anyhow::Result<()>;
}

/// The subset of response headers kept next to a stored object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<[u8; 32]>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub kv: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct FileResponse {
    pub data: Bytes,
    pub metadata: Metadata,
    pub last_modified: Option<DateTime<Utc>>,
}
