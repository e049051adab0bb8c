//! Storage backend implementation for working with bucketing solutions compatible with the S3 API.
//!
//! This is currently built on the [`aws_sdk_s3`] crate.
//!
//! This client should do connection pooling, however the HTTP connection pool parameters are not
//! well tuned at the moment.
//!
//! Bodies are fully buffered in both directions: the [`StorageProvider`] API hands whole
//! objects around, so uploads wait for the complete request and downloads for the complete
//! object before anything is forwarded.
//!
//! S3 has no rename, so [`StorageProvider::move_file`] is a server-side copy followed by a
//! delete of the source. Deleting a key that does not exist succeeds, as it does in S3 itself.

use anyhow::{bail, Context};
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{AppName, BehaviorVersion, Config, Region};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use base64::{engine, Engine as _};
use bytes::Bytes;
use std::fmt::Write as _;
use tracing::debug;
use wheelhouse_api_types::storage::{
    FileResponse, KeyError, Metadata, StorageError, StorageKey, StorageProvider, StorageResult,
};

/// User metadata entry carrying the object's sha256, since S3 only echoes checksums back
/// when explicitly asked to.
const SHA256_META_KEY: &str = "wheelhouse-sha256";

/// Storage client for working with S3-compatible APIs.
///
/// See [the module-level docs](super::s3_client) for more information.
#[derive(Clone)]
pub struct S3StorageProvider {
    client: aws_sdk_s3::Client,
    bucket_name: String,
}

impl S3StorageProvider {
    /// Construct a new client. No request is made until the first operation.
    #[must_use]
    pub fn new(
        bucket_name: &str,
        endpoint_url: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Self {
        let config = Config::builder()
            .behavior_version(BehaviorVersion::v2025_01_17())
            .region(Region::new(region.to_string()))
            .endpoint_url(endpoint_url)
            .credentials_provider(Credentials::from_keys(access_key, secret_key, None))
            .app_name(AppName::new("wheelhouse").expect("static app name is valid"))
            .force_path_style(true)
            .build();

        let bucket_name = bucket_name.to_string();
        let client = aws_sdk_s3::Client::from_conf(config);

        Self {
            client,
            bucket_name,
        }
    }

    async fn pull_object(&self, path: String) -> StorageResult<FileResponse> {
        let resp = self
            .client
            .get_object()
            .bucket(self.bucket_name.clone())
            .key(path)
            .send()
            .await;

        // on 404, we return a different error variant
        if let Err(SdkError::ServiceError(e)) = &resp
            && e.err().is_no_such_key()
        {
            return Err(StorageError::NotFound);
        }

        let resp = resp.context("Storage response error")?;
        let last_modified = resp
            .last_modified()
            .and_then(|d| chrono::DateTime::from_timestamp(d.secs(), 0));

        let mut kv = resp.metadata().cloned().unwrap_or_default();
        let sha256 = kv
            .remove(SHA256_META_KEY)
            .and_then(|b64| engine::general_purpose::STANDARD.decode(b64).ok())
            .and_then(|raw| raw.try_into().ok());
        let content_type = resp.content_type().map(String::from);
        let cache_control = resp.cache_control().map(String::from);

        let data = resp
            .body
            .collect()
            .await
            .context("Error while retrieving body")?
            .into_bytes();

        Ok(FileResponse {
            metadata: Metadata {
                content_type,
                content_length: Some(data.len()),
                cache_control,
                sha256,
                kv,
            },
            last_modified,
            data,
        })
    }

    async fn put_object(
        &self,
        path: String,
        file_bytes: ByteStream,
        meta: Metadata,
    ) -> StorageResult<()> {
        let mut obj = self
            .client
            .put_object()
            .bucket(self.bucket_name.clone())
            .key(path)
            .body(file_bytes);
        if let Some(len) = meta.content_length {
            obj = obj.content_length(len as _);
        }
        if let Some(ty) = meta.content_type {
            obj = obj.content_type(ty);
        }
        if let Some(cc) = meta.cache_control {
            obj = obj.cache_control(cc);
        }
        if let Some(sha) = meta.sha256 {
            let encoded = engine::general_purpose::STANDARD.encode(sha);
            obj = obj
                .checksum_sha256(encoded.clone())
                .metadata(SHA256_META_KEY, encoded);
        }
        for (k, v) in meta.kv {
            obj = obj.metadata(k, v);
        }

        obj.send().await.context("Failed to put file")?;
        Ok(())
    }

    async fn copy_object(&self, from: &str, to: String) -> StorageResult<()> {
        let resp = self
            .client
            .copy_object()
            .bucket(self.bucket_name.clone())
            .copy_source(copy_source(&self.bucket_name, from))
            .key(to)
            .send()
            .await;

        if let Err(SdkError::ServiceError(e)) = &resp
            && e.raw().status().as_u16() == 404
        {
            return Err(StorageError::NotFound);
        }
        resp.context("Failed to copy file")?;
        Ok(())
    }

    async fn delete_object(&self, path: String) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(self.bucket_name.clone())
            .key(path)
            .send()
            .await
            .context("Failed to delete file")?;
        Ok(())
    }

    async fn head_object(&self, path: String) -> StorageResult<bool> {
        let resp = self
            .client
            .head_object()
            .bucket(self.bucket_name.clone())
            .key(path)
            .send()
            .await;

        match resp {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(e)) if e.err().is_not_found() => Ok(false),
            Err(e) => Err(anyhow::Error::from(e).context("Failed to stat file").into()),
        }
    }

    // check that we can actually contact the bucket
    async fn healthcheck(&self, path: String) -> Result<(), anyhow::Error> {
        for _ in 0..3 {
            // try and pull the object initially to make sure the health file is there
            match self.pull_object(path.clone()).await {
                Ok(obj) => {
                    if obj.data.as_ref() == b"ok" {
                        return Ok(());
                    }

                    // this case will not attempt to repair the data - if corruption is occurring
                    // healthchecks should continue to fail until manual intervention occurs
                    bail!("wrong data");
                }
                Err(e) => {
                    if matches!(e, StorageError::NotFound) {
                        // if the key isn't there (because you just stood the service up), put it
                        // there and retry the loop
                        self.put_object(
                            path.clone(),
                            Bytes::from_static(b"ok").into(),
                            Metadata {
                                content_type: Some("text/plain".into()),
                                ..Metadata::default()
                            },
                        )
                        .await?;

                        continue;
                    }

                    // if we failed to contact the bucket or anything else happened other than not
                    // seeing the specific object, fail the check
                    bail!(e);
                }
            }
        }

        // this case should never reasonably happen with most buckets, and should be extremely
        // transient and only happen briefly when initially standing up the service with EC stores
        bail!("successfully put object but saw NotFound on pull 3 times");
    }

    async fn list_prefix(&self, prefix: &StorageKey) -> StorageResult<Vec<StorageKey>> {
        let exact = prefix.to_string();
        let dir = if prefix.is_root() {
            String::new()
        } else {
            format!("{exact}/")
        };

        let mut keys = Vec::new();
        let mut continuation = None;
        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(self.bucket_name.clone())
                .prefix(exact.clone())
                .set_continuation_token(continuation)
                .send()
                .await
                .context("failed to list files")?;

            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|obj| obj.key())
                    // `prefix` as a plain string also matches `prefix-other/...`
                    .filter(|key| *key == exact || key.starts_with(&dir))
                    .filter_map(|key| StorageKey::from_path(key).ok())
                    .filter(|key| key.last() != Some(".healthcheck")),
            );

            match page.next_continuation_token() {
                Some(token) if page.is_truncated() == Some(true) => {
                    continuation = Some(token.to_owned());
                }
                _ => break,
            }
        }

        keys.sort();
        Ok(keys)
    }
}

fn object_path(key: &StorageKey) -> StorageResult<String> {
    if key.is_root() {
        return Err(KeyError::EmptySegment.into());
    }
    Ok(key.to_string())
}

/// `x-amz-copy-source` value: the bucket and key, percent-encoded except for `/`.
fn copy_source(bucket: &str, key: &str) -> String {
    let mut out = String::with_capacity(bucket.len() + key.len() + 1);
    out.push_str(bucket);
    out.push('/');
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~' | b'/') {
            out.push(b as char);
        } else {
            let _ = write!(out, "%{b:02X}");
        }
    }
    out
}

#[async_trait]
impl StorageProvider for S3StorageProvider {
    async fn pull_file(&self, key: &StorageKey) -> StorageResult<FileResponse> {
        self.pull_object(object_path(key)?).await
    }

    async fn put_file(
        &self,
        key: &StorageKey,
        file_bytes: Bytes,
        meta: Metadata,
    ) -> StorageResult<()> {
        self.put_object(object_path(key)?, file_bytes.into(), meta)
            .await
    }

    async fn move_file(&self, from: &StorageKey, to: &StorageKey) -> StorageResult<()> {
        let from = object_path(from)?;
        let to = object_path(to)?;
        debug!(from, to, "Moving object by copy and delete");
        self.copy_object(&from, to).await?;
        self.delete_object(from).await
    }

    async fn delete_file(&self, key: &StorageKey) -> StorageResult<()> {
        self.delete_object(object_path(key)?).await
    }

    async fn exists(&self, key: &StorageKey) -> StorageResult<bool> {
        self.head_object(object_path(key)?).await
    }

    async fn list_prefix(&self, prefix: &StorageKey) -> StorageResult<Vec<StorageKey>> {
        self.list_prefix(prefix).await
    }

    async fn healthcheck(&self) -> anyhow::Result<()> {
        self.healthcheck(".healthcheck".into()).await
    }
}

#[cfg(test)]
mod tests {
    use super::copy_source;

    #[test]
    fn copy_source_is_percent_encoded() {
        assert_eq!(
            copy_source("pypi", "pkg/pkg-1.0+local.tar.gz"),
            "pypi/pkg/pkg-1.0%2Blocal.tar.gz"
        );
        assert_eq!(copy_source("pypi", "a b"), "pypi/a%20b");
    }
}
