//! Storage backend keeping objects as plain files under a root directory.
//!
//! Key `a/b` is stored as the file `a/b.wheelhouse-object`, which leaves the directory
//! `a/b/` free for keys below it: a project page and the downloads it links to can be
//! cached side by side. Segments ending in that suffix are refused.
//!
//! Object metadata lives in JSON sidecars in a parallel `.wheelhouse-meta` tree, and
//! writes go through a named temp file in `.wheelhouse-staging` that is renamed into
//! place, so readers never observe a half-written object.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use wheelhouse_api_types::storage::{
    Bytes, FileResponse, KeyError, Metadata, StorageError, StorageKey, StorageProvider,
    StorageResult,
};

const META_DIR: &str = ".wheelhouse-meta";
const STAGING_DIR: &str = ".wheelhouse-staging";
const OBJECT_SUFFIX: &str = ".wheelhouse-object";

#[derive(Clone)]
pub struct FsStorageProvider {
    root: PathBuf,
}

impl FsStorageProvider {
    pub fn new(root: PathBuf) -> StorageResult<Self> {
        std::fs::create_dir_all(root.join(STAGING_DIR))?;
        std::fs::create_dir_all(root.join(META_DIR))?;
        Ok(Self { root })
    }

    fn abs_path(&self, key: &StorageKey) -> StorageResult<PathBuf> {
        check_key(key)?;
        Ok(object_file(self.root.clone(), key))
    }

    fn meta_path(&self, key: &StorageKey) -> PathBuf {
        object_file(self.root.join(META_DIR), key)
    }
}

fn check_key(key: &StorageKey) -> StorageResult<()> {
    if key.is_root() {
        return Err(KeyError::EmptySegment.into());
    }
    if matches!(key.segments().next(), Some(META_DIR | STAGING_DIR))
        || key.segments().any(|s| s.ends_with(OBJECT_SUFFIX))
    {
        return Err(StorageError::ServiceError(
            io::Error::from(io::ErrorKind::InvalidInput).into(),
        ));
    }
    Ok(())
}

/// `base/{segments}` with [`OBJECT_SUFFIX`] on the last segment.
fn object_file(base: PathBuf, key: &StorageKey) -> PathBuf {
    let mut path = key
        .segments()
        .fold(base, |path, s| path.join(s))
        .into_os_string();
    path.push(OBJECT_SUFFIX);
    path.into()
}

async fn blocking<T, F>(f: F) -> StorageResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> StorageResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::ServiceError(e.into()))?
}

#[async_trait]
impl StorageProvider for FsStorageProvider {
    async fn pull_file(&self, key: &StorageKey) -> StorageResult<FileResponse> {
        let path = self.abs_path(key)?;
        let meta_path = self.meta_path(key);
        blocking(move || {
            let data = std::fs::read(&path)?;
            let last_modified = std::fs::metadata(&path)?
                .modified()
                .ok()
                .map(DateTime::<Utc>::from);
            let metadata = read_sidecar(&meta_path)?.unwrap_or_default();
            Ok(FileResponse {
                data: data.into(),
                metadata,
                last_modified,
            })
        })
        .await
    }

    async fn put_file(
        &self,
        key: &StorageKey,
        file_bytes: Bytes,
        meta: Metadata,
    ) -> StorageResult<()> {
        let path = self.abs_path(key)?;
        let meta_path = self.meta_path(key);
        let staging = self.root.join(STAGING_DIR);
        blocking(move || {
            write_sidecar(&staging, &meta_path, &meta)?;
            persist(&staging, &path, &file_bytes)
        })
        .await
    }

    async fn move_file(&self, from: &StorageKey, to: &StorageKey) -> StorageResult<()> {
        let (src, dst) = (self.abs_path(from)?, self.abs_path(to)?);
        let (src_meta, dst_meta) = (self.meta_path(from), self.meta_path(to));
        blocking(move || {
            create_parent(&dst)?;
            std::fs::rename(&src, &dst)?;
            if src_meta.exists() {
                create_parent(&dst_meta)?;
                std::fs::rename(&src_meta, &dst_meta)?;
            } else {
                remove_if_present(&dst_meta)?;
            }
            Ok(())
        })
        .await
    }

    async fn delete_file(&self, key: &StorageKey) -> StorageResult<()> {
        let path = self.abs_path(key)?;
        let meta_path = self.meta_path(key);
        blocking(move || {
            std::fs::remove_file(&path)?;
            remove_if_present(&meta_path)
        })
        .await
    }

    async fn exists(&self, key: &StorageKey) -> StorageResult<bool> {
        let path = self.abs_path(key)?;
        blocking(move || Ok(path.is_file())).await
    }

    async fn list_prefix(&self, prefix: &StorageKey) -> StorageResult<Vec<StorageKey>> {
        if !prefix.is_root() && check_key(prefix).is_err() {
            return Ok(Vec::new());
        }
        let root = self.root.clone();
        let dir = prefix.segments().fold(root.clone(), |path, s| path.join(s));
        let own = (!prefix.is_root()).then(|| object_file(root.clone(), prefix));
        let prefix = prefix.clone();
        blocking(move || {
            let mut out = Vec::new();
            if own.is_some_and(|path| path.is_file()) {
                out.push(prefix);
            }
            if dir.is_dir() {
                append_dir(&root, &dir, &mut out)?;
            }
            out.sort();
            Ok(out)
        })
        .await
    }

    async fn healthcheck(&self) -> anyhow::Result<()> {
        if self.root.is_dir() {
            Ok(())
        } else {
            anyhow::bail!("root not a dir")
        }
    }
}

fn append_dir(root: &Path, path: &Path, out: &mut Vec<StorageKey>) -> StorageResult<()> {
    for e in std::fs::read_dir(path)? {
        let e = e?;
        let ty = e.file_type()?;
        if path == root && matches!(e.file_name().to_str(), Some(META_DIR | STAGING_DIR)) {
            continue;
        }
        if ty.is_dir() {
            append_dir(root, &e.path(), out)?;
        } else if ty.is_file()
            && let Some(key) = relative_key(root, &e.path())
        {
            out.push(key);
        }
    }
    Ok(())
}

/// Inverse of [`object_file`]. Files without the object suffix are not objects.
fn relative_key(root: &Path, path: &Path) -> Option<StorageKey> {
    let mut segments = path
        .strip_prefix(root)
        .ok()?
        .iter()
        .map(|part| part.to_str())
        .collect::<Option<Vec<_>>>()?;
    let leaf = segments.pop()?.strip_suffix(OBJECT_SUFFIX)?;
    segments
        .into_iter()
        .chain([leaf])
        .try_fold(StorageKey::root(), |key, s| key.join(s).ok())
}

fn create_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.exists() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

fn persist(staging: &Path, path: &Path, bytes: &[u8]) -> StorageResult<()> {
    create_parent(path)?;
    let mut tmp = NamedTempFile::new_in(staging)?;
    tmp.write_all(bytes)?;
    tmp.persist(path)
        .map_err(|e| StorageError::ServiceError(e.into()))?;
    Ok(())
}

fn remove_if_present(path: &Path) -> StorageResult<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

fn read_sidecar(path: &Path) -> StorageResult<Option<Metadata>> {
    match std::fs::read(path) {
        Ok(raw) => serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| StorageError::ServiceError(e.into())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_sidecar(staging: &Path, path: &Path, meta: &Metadata) -> StorageResult<()> {
    if *meta == Metadata::default() {
        return remove_if_present(path);
    }
    let raw = serde_json::to_vec(meta).map_err(|e| StorageError::ServiceError(e.into()))?;
    persist(staging, path, &raw)
}
