//! Storage backend holding everything in process memory.
//!
//! Meant for tests and throwaway local instances; nothing survives a restart.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use wheelhouse_api_types::storage::{
    Bytes, FileResponse, KeyError, Metadata, StorageError, StorageKey, StorageProvider,
    StorageResult,
};

#[derive(Clone, Default)]
pub struct MemStorageProvider {
    objects: Arc<Mutex<BTreeMap<StorageKey, FileResponse>>>,
}

impl MemStorageProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> MutexGuard<'_, BTreeMap<StorageKey, FileResponse>> {
        // a panicking writer can't leave an entry half-updated
        self.objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn object_key(key: &StorageKey) -> StorageResult<&StorageKey> {
    if key.is_root() {
        Err(KeyError::EmptySegment.into())
    } else {
        Ok(key)
    }
}

#[async_trait]
impl StorageProvider for MemStorageProvider {
    async fn pull_file(&self, key: &StorageKey) -> StorageResult<FileResponse> {
        self.objects()
            .get(object_key(key)?)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn put_file(
        &self,
        key: &StorageKey,
        file_bytes: Bytes,
        meta: Metadata,
    ) -> StorageResult<()> {
        let key = object_key(key)?.clone();
        self.objects().insert(
            key,
            FileResponse {
                data: file_bytes,
                metadata: meta,
                last_modified: Some(Utc::now()),
            },
        );
        Ok(())
    }

    async fn move_file(&self, from: &StorageKey, to: &StorageKey) -> StorageResult<()> {
        let to = object_key(to)?.clone();
        let mut objects = self.objects();
        let file = objects
            .remove(object_key(from)?)
            .ok_or(StorageError::NotFound)?;
        objects.insert(to, file);
        Ok(())
    }

    async fn delete_file(&self, key: &StorageKey) -> StorageResult<()> {
        self.objects()
            .remove(object_key(key)?)
            .map(|_| ())
            .ok_or(StorageError::NotFound)
    }

    async fn exists(&self, key: &StorageKey) -> StorageResult<bool> {
        Ok(self.objects().contains_key(object_key(key)?))
    }

    async fn list_prefix(&self, prefix: &StorageKey) -> StorageResult<Vec<StorageKey>> {
        Ok(self
            .objects()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn healthcheck(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn move_removes_source() {
        let mem = MemStorageProvider::new();
        let tmp = StorageKey::from_path("4b1c").unwrap();
        let dst = StorageKey::from_path("pkg/pkg-1.0.zip").unwrap();

        mem.put_file(&tmp, Bytes::from_static(b"zip"), Metadata::default())
            .await
            .unwrap();
        mem.move_file(&tmp, &dst).await.unwrap();

        assert!(!mem.exists(&tmp).await.unwrap());
        assert_eq!(mem.pull_file(&dst).await.unwrap().data.as_ref(), b"zip");
        assert_eq!(mem.list_prefix(&StorageKey::root()).await.unwrap(), [dst]);
        assert!(matches!(
            mem.move_file(&tmp, &StorageKey::from_path("other").unwrap()).await,
            Err(StorageError::NotFound)
        ));
    }
}
