//! The remote package index a proxying repository sits in front of.

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;

pub use error::{OriginError, OriginResult};

mod error;

#[async_trait]
pub trait OriginProvider {
    /// Issue a `GET` for `path_and_query` relative to the origin's base URL.
    ///
    /// A non-2xx answer is still `Ok`; `Err` is reserved for failing to get an answer at all.
    async fn fetch(&self, path_and_query: &str) -> OriginResult<OriginResponse>;
}

#[derive(Debug, Clone)]
pub struct OriginResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl OriginResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
