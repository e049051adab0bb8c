#![allow(dead_code)]

pub mod archives;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, HeaderValue, Request, Response, StatusCode};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use wheelhouse_api_types::origin::{OriginError, OriginProvider, OriginResponse, OriginResult};
use wheelhouse_api_types::storage::{
    Bytes, FileResponse, Metadata, StorageKey, StorageProvider, StorageResult,
};
use wheelhouse_server::{ServiceConfig, ServiceState, SharedStorage};
use wheelhouse_storage::mem::MemStorageProvider;

pub const BOUNDARY: &str = "wheelhouse-test-boundary";

pub enum MockReply {
    Status {
        status: StatusCode,
        headers: HeaderMap,
        body: &'static str,
    },
    Unreachable,
}

impl MockReply {
    pub fn ok(body: &'static str, content_type: &'static str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        Self::Status {
            status: StatusCode::OK,
            headers,
            body,
        }
    }

    pub fn status(status: StatusCode) -> Self {
        Self::Status {
            status,
            headers: HeaderMap::new(),
            body: "",
        }
    }
}

/// Origin answering from a script of replies, one per request, and unreachable once the
/// script runs out. Clones share the script.
#[derive(Clone, Default)]
pub struct MockOrigin {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockOrigin {
    pub fn reply(&self, reply: MockReply) -> &Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl OriginProvider for MockOrigin {
    async fn fetch(&self, path_and_query: &str) -> OriginResult<OriginResponse> {
        self.requests.lock().unwrap().push(path_and_query.to_owned());

        match self.replies.lock().unwrap().pop_front() {
            Some(MockReply::Status {
                status,
                headers,
                body,
            }) => Ok(OriginResponse {
                status,
                headers,
                body: body.into(),
            }),
            Some(MockReply::Unreachable) | None => Err(OriginError::Transport(
                std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into(),
            )),
        }
    }
}

/// In-memory storage whose selected operations fail with a service error.
#[derive(Clone, Default)]
pub struct FaultyStorage {
    pub inner: MemStorageProvider,
    /// `pull_file`, `exists` and `list_prefix`
    pub fail_reads: bool,
    pub fail_writes: bool,
    pub fail_moves: bool,
}

impl FaultyStorage {
    pub fn broken() -> Self {
        Self {
            inner: MemStorageProvider::new(),
            fail_reads: true,
            fail_writes: true,
            fail_moves: true,
        }
    }

    fn check(failing: bool) -> StorageResult<()> {
        if failing {
            Err(io::Error::other("storage is down").into())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StorageProvider for FaultyStorage {
    async fn pull_file(&self, key: &StorageKey) -> StorageResult<FileResponse> {
        Self::check(self.fail_reads)?;
        self.inner.pull_file(key).await
    }

    async fn put_file(&self, key: &StorageKey, file_bytes: Bytes, meta: Metadata) -> StorageResult<()> {
        Self::check(self.fail_writes)?;
        self.inner.put_file(key, file_bytes, meta).await
    }

    async fn move_file(&self, from: &StorageKey, to: &StorageKey) -> StorageResult<()> {
        Self::check(self.fail_moves)?;
        self.inner.move_file(from, to).await
    }

    async fn delete_file(&self, key: &StorageKey) -> StorageResult<()> {
        self.inner.delete_file(key).await
    }

    async fn exists(&self, key: &StorageKey) -> StorageResult<bool> {
        Self::check(self.fail_reads)?;
        self.inner.exists(key).await
    }

    async fn list_prefix(&self, prefix: &StorageKey) -> StorageResult<Vec<StorageKey>> {
        Self::check(self.fail_reads)?;
        self.inner.list_prefix(prefix).await
    }

    async fn healthcheck(&self) -> anyhow::Result<()> {
        Ok(Self::check(self.fail_reads)?)
    }
}

pub struct ServiceStateBuilder {
    pub config: ServiceConfig,
    pub storage: SharedStorage,
    pub origin: Option<MockOrigin>,
}

impl Default for ServiceStateBuilder {
    fn default() -> Self {
        Self {
            config: ServiceConfig {
                address: "127.0.0.1:3000".parse().unwrap(),
                metrics_address: "127.0.0.1:3001".parse().unwrap(),
                upload_size_limit: 1024 * 1024,
            },
            storage: Arc::new(MemStorageProvider::new()),
            origin: None,
        }
    }
}

impl ServiceStateBuilder {
    pub fn storage(mut self, storage: impl StorageProvider + Send + Sync + 'static) -> Self {
        self.storage = Arc::new(storage);
        self
    }

    pub fn origin(mut self, origin: MockOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn upload_size_limit(mut self, limit: u64) -> Self {
        self.config.upload_size_limit = limit;
        self
    }

    pub fn build(self) -> ServiceState {
        let state = ServiceState {
            config: self.config,
            storage: self.storage,
            origin: None,
        };
        match self.origin {
            Some(origin) => state.with_origin(origin),
            None => state,
        }
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt::fmt().with_test_writer().try_init();
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// A part of a multipart form: field name, optional filename, body.
pub type Part<'a> = (&'a str, Option<&'a str>, &'a [u8]);

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, data) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let disposition = match filename {
            Some(filename) => {
                format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n")
            }
            None => format!("Content-Disposition: form-data; name=\"{name}\"\r\n"),
        };
        body.extend_from_slice(disposition.as_bytes());
        if filename.is_some() {
            body.extend_from_slice(b"Content-Type: application/octet-stream\r\n");
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn upload(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let body = to_bytes(response.into_body(), 10_000_000).await.unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

pub async fn stored_keys(storage: &MemStorageProvider) -> Vec<String> {
    storage
        .list_prefix(&StorageKey::root())
        .await
        .unwrap()
        .iter()
        .map(ToString::to_string)
        .collect()
}
