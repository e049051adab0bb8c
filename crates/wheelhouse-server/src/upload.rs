//! Package uploads, as sent by `twine upload` and friends.
//!
//! The `content` part of a multipart form is staged under a random key, its embedded
//! metadata is read back and checked against the claimed filename, and only then is it
//! moved to `{prefix}/{normalized project name}/{filename}`. Every failure is a `400`.
//!
//! The `content` part is buffered in memory before it is staged, since
//! [`StorageProvider::put_file`](wheelhouse_api_types::storage::StorageProvider::put_file)
//! takes whole objects. `ServiceConfig::upload_size_limit` bounds that buffer.

use crate::{ServiceState, SharedStorage};
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::counter;
use multer::{Constraints, Multipart, SizeLimit};
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::{spawn_blocking, JoinError};
use tracing::{debug, info, warn};
use uuid::Uuid;
use wheelhouse_api_types::storage::{Bytes, KeyError, Metadata, StorageError, StorageKey};
use wheelhouse_meta::{canonical_name, read_metadata, valid_filename, MetadataError};

/// Form field holding the distribution archive.
const CONTENT_FIELD: &str = "content";

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Request is not a multipart form: {0}")]
    NotMultipart(#[source] multer::Error),
    #[error("Malformed multipart body: {0}")]
    Multipart(#[from] multer::Error),
    #[error("No `content` part in the upload")]
    NoContentPart,
    #[error("Expected one `content` part, found {0}")]
    MultipleContentParts(usize),
    #[error("The `content` part has no filename")]
    MissingFilename,
    #[error("{0:?} is not a usable filename")]
    InvalidFilename(String),
    #[error("Invalid upload location: {0}")]
    InvalidKey(#[from] KeyError),
    #[error("Could not read package metadata: {0}")]
    Metadata(#[from] MetadataError),
    #[error("Filename {filename:?} does not match package {name} {version}")]
    FilenameMismatch {
        filename: String,
        name: String,
        version: String,
    },
    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),
    #[error("Metadata extraction did not finish")]
    Aborted(#[from] JoinError),
}

impl UploadError {
    fn outcome(&self) -> &'static str {
        match self {
            Self::NotMultipart(_) | Self::Multipart(_) => "malformed",
            Self::NoContentPart | Self::MultipleContentParts(_) => "bad_parts",
            Self::MissingFilename | Self::InvalidFilename(_) | Self::InvalidKey(_) => "bad_filename",
            Self::Metadata(_) | Self::Aborted(_) => "bad_metadata",
            Self::FilenameMismatch { .. } => "mismatch",
            Self::Storage(_) => "storage",
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        counter!("wheelhouse_uploads_total", "outcome" => self.outcome()).increment(1);
        warn!(error = %self, "Rejected upload");

        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

/// `POST` handler: ingest one package under the request path.
pub async fn upload(
    State(state): State<Arc<ServiceState>>,
    path: Option<Path<String>>,
    headers: HeaderMap,
    body: Body,
) -> Result<StatusCode, UploadError> {
    let prefix = StorageKey::from_path(&path.map(|Path(p)| p).unwrap_or_default())?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let boundary = multer::parse_boundary(content_type).map_err(UploadError::NotMultipart)?;
    let constraints = Constraints::new()
        .size_limit(SizeLimit::new().whole_stream(state.config.upload_size_limit));
    let multipart = Multipart::with_constraints(body.into_data_stream(), boundary, constraints);

    let key = ingest(&state.storage, &prefix, multipart).await?;

    counter!("wheelhouse_uploads_total", "outcome" => "created").increment(1);
    info!(%key, "Stored package");

    Ok(StatusCode::CREATED)
}

/// Run the whole pipeline, making sure the staged object is gone if it fails.
async fn ingest(
    storage: &SharedStorage,
    prefix: &StorageKey,
    multipart: Multipart<'static>,
) -> Result<StorageKey, UploadError> {
    let mut temp = TempObject::new(storage.clone())?;

    match process(&mut temp, prefix, multipart).await {
        Ok(key) => Ok(key),
        Err(e) => {
            temp.discard().await;
            Err(e)
        }
    }
}

async fn process(
    temp: &mut TempObject,
    prefix: &StorageKey,
    mut multipart: Multipart<'static>,
) -> Result<StorageKey, UploadError> {
    let mut content_parts = 0;
    let mut filename = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(CONTENT_FIELD) {
            continue;
        }
        content_parts += 1;
        // extra parts are only counted, the request is rejected once the body is drained
        if content_parts > 1 {
            continue;
        }
        filename = field.file_name().map(String::from);
        temp.put(field.bytes().await?).await?;
    }

    match content_parts {
        0 => return Err(UploadError::NoContentPart),
        1 => {}
        n => return Err(UploadError::MultipleContentParts(n)),
    }
    let filename = filename.ok_or(UploadError::MissingFilename)?;
    if StorageKey::root().join(&filename).is_err() {
        return Err(UploadError::InvalidFilename(filename));
    }

    let staged = temp.read().await?;
    let archive_name = filename.clone();
    let metadata =
        spawn_blocking(move || read_metadata(Cursor::new(staged), &archive_name)).await??;

    if !valid_filename(&metadata, &filename) {
        return Err(UploadError::FilenameMismatch {
            filename,
            name: metadata.name().to_owned(),
            version: metadata.version().to_owned(),
        });
    }

    let key = prefix.join(&canonical_name(metadata.name()))?.join(&filename)?;
    temp.commit(&key).await?;

    Ok(key)
}

/// An upload staged under a random root-level key until it is either moved into place or
/// thrown away.
///
/// Dropping it while an object may still exist (the request was cancelled mid-flight)
/// schedules the delete on the runtime.
struct TempObject {
    storage: SharedStorage,
    key: StorageKey,
    written: bool,
}

impl TempObject {
    fn new(storage: SharedStorage) -> Result<Self, KeyError> {
        Ok(Self {
            storage,
            key: StorageKey::root().join(&Uuid::new_v4().to_string())?,
            written: false,
        })
    }

    async fn put(&mut self, data: Bytes) -> Result<(), StorageError> {
        let meta = Metadata {
            content_type: Some("application/octet-stream".into()),
            content_length: Some(data.len()),
            sha256: Some(Sha256::digest(&data).into()),
            ..Metadata::default()
        };
        debug!(key = %self.key, len = data.len(), "Staging upload");
        // set first: a cancelled put may still have landed
        self.written = true;
        self.storage.put_file(&self.key, data, meta).await
    }

    async fn read(&self) -> Result<Bytes, StorageError> {
        Ok(self.storage.pull_file(&self.key).await?.data)
    }

    async fn commit(&mut self, to: &StorageKey) -> Result<(), StorageError> {
        self.storage.move_file(&self.key, to).await?;
        self.written = false;
        Ok(())
    }

    async fn discard(&mut self) {
        if !self.written {
            return;
        }
        match self.storage.delete_file(&self.key).await {
            Ok(()) | Err(StorageError::NotFound) => {}
            Err(e) => warn!(key = %self.key, error = %e, "Failed to delete staged upload"),
        }
        self.written = false;
    }
}

impl Drop for TempObject {
    fn drop(&mut self) {
        if !self.written {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(key = %self.key, "No runtime to delete staged upload");
            return;
        };
        let storage = self.storage.clone();
        let key = self.key.clone();
        runtime.spawn(async move {
            match storage.delete_file(&key).await {
                Ok(()) | Err(StorageError::NotFound) => debug!(%key, "Deleted abandoned upload"),
                Err(e) => warn!(%key, error = %e, "Failed to delete abandoned upload"),
            }
        });
    }
}
