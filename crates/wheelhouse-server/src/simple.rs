//! Serving uploaded packages straight from storage when there is no index to proxy.
//!
//! Paths are read as PEP 503 "simple" repository URLs:
//!
//! * a stored object's key returns the object,
//! * `/{prefix}/{project}/` lists the files uploaded for `project` under `prefix`,
//! * `/{prefix}/` (or `/`) lists the projects below `prefix`.
//!
//! Anything else, storage failures included, is a `404`.
//!
//! ```html
//! <!DOCTYPE html>
//! <html>
//!   <head><title>Links for alarmtime</title></head>
//!   <body>
//!     <h1>Links for alarmtime</h1>
//!     <a href="/alarmtime/alarmtime-0.1.5.tar.gz#sha256=1d5e...">alarmtime-0.1.5.tar.gz</a><br/>
//!   </body>
//! </html>
//! ```

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use tracing::{debug, warn};
use wheelhouse_api_types::storage::{
    FileResponse, StorageError, StorageKey, StorageProvider, StorageResult,
};
use wheelhouse_meta::canonical_name;

pub async fn handle_get(
    storage: &(dyn StorageProvider + Send + Sync),
    path: &str,
    trailing_slash: bool,
) -> Response {
    match serve(storage, path, trailing_slash).await {
        Ok(Some(res)) => res,
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!(path, error = %e, "Failed to read from storage");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

async fn serve(
    storage: &(dyn StorageProvider + Send + Sync),
    path: &str,
    trailing_slash: bool,
) -> StorageResult<Option<Response>> {
    let Ok(key) = StorageKey::from_path(path) else {
        return Ok(None);
    };

    if !key.is_root() && !trailing_slash {
        match storage.pull_file(&key).await {
            Ok(file) => return Ok(Some(file_response(file))),
            Err(StorageError::NotFound) => {}
            Err(e) => return Err(e),
        }
    }

    if let Some(project) = key.last() {
        let project_key = key.map_last(canonical_name)?;
        if let Some(page) = project_page(storage, project, &project_key).await? {
            return Ok(Some(Html(page).into_response()));
        }
    }

    Ok(index_page(storage, &key).await?.map(|page| Html(page).into_response()))
}

/// Links to every file stored directly under `project_key`, or `None` if there are none.
async fn project_page(
    storage: &(dyn StorageProvider + Send + Sync),
    project: &str,
    project_key: &StorageKey,
) -> StorageResult<Option<String>> {
    let files: Vec<_> = storage
        .list_prefix(project_key)
        .await?
        .into_iter()
        .filter(|key| key.parent().as_ref() == Some(project_key))
        .collect();
    if files.is_empty() {
        return Ok(None);
    }
    debug!(project, files = files.len(), "Rendering project page");

    let mut html = format!(
        r#"<!DOCTYPE html>
<html>
  <head><title>Links for {project}</title></head>
  <body>
    <h1>Links for {project}</h1>
"#
    );

    for key in files {
        let digest = match storage.pull_file(&key).await {
            Ok(file) => file
                .metadata
                .sha256
                .unwrap_or_else(|| Sha256::digest(&file.data).into()),
            // removed since listing
            Err(StorageError::NotFound) => continue,
            Err(e) => return Err(e),
        };
        let filename = key.last().unwrap_or_default();
        let _ = writeln!(
            html,
            r#"    <a href="/{key}#sha256={}">{filename}</a><br/>"#,
            hex::encode(digest)
        );
    }

    html.push_str("  </body>\n</html>");
    Ok(Some(html))
}

/// Links to every directory one level below `prefix` that holds packages.
async fn index_page(
    storage: &(dyn StorageProvider + Send + Sync),
    prefix: &StorageKey,
) -> StorageResult<Option<String>> {
    let projects: BTreeSet<_> = storage
        .list_prefix(prefix)
        .await?
        .iter()
        .filter_map(|key| {
            let mut rest = key.strip_prefix(prefix)?;
            let dir = rest.next()?;
            // objects directly under the prefix are files, not projects
            rest.next().map(|_| dir.to_owned())
        })
        .collect();
    if projects.is_empty() {
        return Ok(None);
    }

    let mut html = String::from(
        r#"<!DOCTYPE html>
<html>
  <head><title>Simple index</title></head>
  <body>
    <h1>Simple index</h1>
"#,
    );

    for project in projects {
        let href = prefix.join(&project)?;
        let _ = writeln!(html, r#"    <a href="/{href}/">{project}</a><br/>"#);
    }

    html.push_str("  </body>\n</html>");
    Ok(Some(html))
}

fn file_response(file: FileResponse) -> Response {
    let content_type = file
        .metadata
        .content_type
        .and_then(|ty| HeaderValue::from_str(&ty).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));

    let mut res = Response::new(Body::from(file.data));
    res.headers_mut().insert(header::CONTENT_TYPE, content_type);
    if let Some(last_mod) = file
        .last_modified
        .and_then(|d| d.to_rfc2822().try_into().ok())
    {
        res.headers_mut().insert(header::LAST_MODIFIED, last_mod);
    }
    res
}
