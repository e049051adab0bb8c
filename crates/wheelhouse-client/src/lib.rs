//! HTTP clients for talking to package indexes.
//!
//! [`HttpOrigin`] is what a proxying wheelhouse uses to reach its upstream index, and
//! [`Client`] is a very basic client for a wheelhouse server, used in end-to-end testing.

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use thiserror::Error;

pub use origin::{BasicAuth, HttpOrigin};

mod origin;

pub struct Client {
    http: reqwest::Client,
    endpoint: String,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Received error from wheelhouse server: {0}")]
    ServerError(#[source] anyhow::Error),
    #[error("Upload was rejected: {0}")]
    BadRequest(String),
    #[error("Requested object was not found")]
    NotFound,
    #[error("Method is not supported by the repository")]
    MethodNotAllowed,
    #[error("Received unknown error")]
    Other(#[from] anyhow::Error),
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        match value.status() {
            Some(StatusCode::INTERNAL_SERVER_ERROR) => Self::ServerError(anyhow::anyhow!(value)),
            Some(StatusCode::NOT_FOUND) => Self::NotFound,
            Some(StatusCode::METHOD_NOT_ALLOWED) => Self::MethodNotAllowed,
            _ => Self::Other(anyhow::anyhow!(value)),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl Client {
    #[must_use]
    pub fn new(endpoint: &str) -> Self {
        Self::from_reqwest(endpoint, reqwest::Client::new())
    }

    #[must_use]
    pub fn from_reqwest(endpoint: &str, client: reqwest::Client) -> Self {
        Self {
            http: client,
            endpoint: endpoint.trim_end_matches('/').to_owned(),
        }
    }

    /// Upload a distribution archive the way `twine` does, as the `content` part of a
    /// multipart form POSTed to `path`.
    pub async fn upload(&self, path: &str, filename: &str, archive: Vec<u8>) -> Result<()> {
        let part = Part::bytes(archive).file_name(filename.to_owned());
        let form = Form::new()
            .text(":action", "file_upload")
            .part("content", part);

        let resp = self
            .http
            .post(self.url(path))
            .multipart(form)
            .send()
            .await?;

        if resp.status() == StatusCode::BAD_REQUEST {
            return Err(Error::BadRequest(resp.text().await?));
        }
        resp.error_for_status()?;

        Ok(())
    }

    /// Fetch any file or index page the repository serves.
    pub async fn download(&self, path: &str) -> Result<Bytes> {
        let resp = self.http.get(self.url(path)).send().await?;

        resp.error_for_status_ref()?;

        Ok(resp.bytes().await?)
    }

    /// Fetch the simple index page listing the files of `project`.
    pub async fn project_page(&self, project: &str) -> Result<String> {
        let resp = self.http.get(self.url(project)).send().await?;

        resp.error_for_status_ref()?;

        Ok(resp.text().await?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }
}
