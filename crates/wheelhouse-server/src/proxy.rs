//! Read-through cache in front of a remote package index.
//!
//! The origin is always asked first. A successful answer is stored and returned as is;
//! anything else (a failure status or no answer at all) falls back to whatever was stored
//! last time, and to `404` when nothing was.

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use metrics::counter;
use tracing::{debug, warn};
use wheelhouse_api_types::origin::{OriginProvider, OriginResponse};
use wheelhouse_api_types::storage::{
    FileResponse, Metadata, StorageError, StorageKey, StorageProvider,
};
use wheelhouse_meta::{has_archive_extension, normalize};

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: [HeaderName; 6] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
];

/// Where a proxied response for `path` is cached: the request path with its last segment
/// normalized. The root path has no cache entry.
#[must_use]
pub fn cache_key(path: &str) -> Option<StorageKey> {
    let key = StorageKey::from_path(path).ok()?;
    if key.is_root() {
        return None;
    }
    key.map_last(normalize).ok()
}

/// Answer a `GET` for `path` (already decoded), forwarding `path_and_query` to `origin`.
pub async fn handle_get(
    storage: &(dyn StorageProvider + Send + Sync),
    origin: &(dyn OriginProvider + Send + Sync),
    path: &str,
    path_and_query: &str,
) -> Response {
    let key = cache_key(path);

    match origin.fetch(path_and_query).await {
        Ok(remote) if remote.is_success() => {
            counter!("wheelhouse_proxy_responses_total", "source" => "remote").increment(1);
            if let Some(key) = &key {
                store(storage, key, &remote).await;
            }
            return forward(remote);
        }
        Ok(remote) => {
            debug!(path_and_query, status = %remote.status, "Origin failed, trying cache");
        }
        Err(e) => {
            warn!(path_and_query, error = %e, "Origin unreachable, trying cache");
        }
    }

    let Some(key) = key else {
        counter!("wheelhouse_proxy_responses_total", "source" => "miss").increment(1);
        return StatusCode::NOT_FOUND.into_response();
    };

    match storage.pull_file(&key).await {
        Ok(cached) => {
            counter!("wheelhouse_proxy_responses_total", "source" => "cache").increment(1);
            from_cache(&key, cached)
        }
        Err(e) => {
            if !matches!(e, StorageError::NotFound) {
                warn!(%key, error = %e, "Cache read failed");
            }
            counter!("wheelhouse_proxy_responses_total", "source" => "miss").increment(1);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

async fn store(storage: &(dyn StorageProvider + Send + Sync), key: &StorageKey, remote: &OriginResponse) {
    let meta = Metadata {
        content_type: remote
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        content_length: Some(remote.body.len()),
        ..Metadata::default()
    };

    // a stale or missing cache entry only matters once the origin is down
    if let Err(e) = storage.put_file(key, remote.body.clone(), meta).await {
        warn!(%key, error = %e, "Failed to cache origin response");
    }
}

fn forward(remote: OriginResponse) -> Response {
    let mut headers = HeaderMap::with_capacity(remote.headers.len());
    for (name, value) in &remote.headers {
        if !HOP_BY_HOP.contains(name) && *name != header::CONTENT_LENGTH {
            headers.append(name, value.clone());
        }
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(remote.body.len()));

    let mut res = Response::new(Body::from(remote.body));
    *res.status_mut() = remote.status;
    *res.headers_mut() = headers;
    res
}

fn from_cache(key: &StorageKey, cached: FileResponse) -> Response {
    let content_type = cached
        .metadata
        .content_type
        .and_then(|ty| HeaderValue::from_str(&ty).ok())
        .unwrap_or_else(|| HeaderValue::from_static(default_content_type(key)));

    let mut res = Response::new(Body::empty());
    let headers = res.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(cached.data.len()));
    if let Some(last_mod) = cached
        .last_modified
        .and_then(|d| d.to_rfc2822().try_into().ok())
    {
        headers.insert(header::LAST_MODIFIED, last_mod);
    }

    *res.body_mut() = Body::from(cached.data);
    res
}

/// Content type of a cache entry stored without one: archives are labelled the way they
/// are uploaded, anything else is taken for an index page.
fn default_content_type(key: &StorageKey) -> &'static str {
    match key.last() {
        Some(name) if has_archive_extension(name) => "multipart/form-data",
        _ => "text/html",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(path: &str) -> String {
        cache_key(path).map(|k| k.to_string()).unwrap_or_default()
    }

    #[test]
    fn cache_keys_normalize_the_last_segment() {
        assert_eq!(key("/My_Project"), "my-project");
        assert_eq!(key("/My.Project.whl"), "My.Project.whl");
        assert_eq!(key("/Johns.Project.tar.gz"), "Johns.Project.tar.gz");
        assert_eq!(key("/AnotherIndex"), "anotherindex");
        assert_eq!(key("/simple/Some__Name/"), "simple/some-name");
        assert_eq!(key("index"), "index");
        assert!(cache_key("/").is_none());
        assert!(cache_key("/a/../b").is_none());
    }

    #[test]
    fn default_content_types() {
        let archive = StorageKey::from_path("pkg/pkg-1.0.tar.gz").unwrap();
        let page = StorageKey::from_path("simple/pkg").unwrap();
        assert_eq!(default_content_type(&archive), "multipart/form-data");
        assert_eq!(default_content_type(&page), "text/html");
    }

    #[test]
    fn forward_drops_hop_by_hop_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("smth"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("999"));

        let res = forward(OriginResponse {
            status: StatusCode::OK,
            headers,
            body: "some html".into(),
        });

        assert_eq!(res.headers()[header::CONTENT_TYPE], "smth");
        assert_eq!(res.headers()[header::CONTENT_LENGTH], "9");
        assert!(res.headers().get(header::TRANSFER_ENCODING).is_none());
    }
}
