use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;
use tracing::debug;
use wheelhouse_api_types::origin::{OriginError, OriginProvider, OriginResponse, OriginResult};

/// Credentials sent to the upstream index with every request.
#[derive(Debug, Clone)]
pub struct BasicAuth {
    pub username: String,
    pub password: Option<String>,
}

/// An upstream package index reached over HTTP(S).
///
/// The request path is appended to the base URL verbatim, so a base of
/// `https://pypi.org/simple` and a request for `/requests/` fetch
/// `https://pypi.org/simple/requests/`.
#[derive(Clone)]
pub struct HttpOrigin {
    http: reqwest::Client,
    base: String,
    auth: Option<BasicAuth>,
}

impl HttpOrigin {
    pub fn new(
        base: &str,
        auth: Option<BasicAuth>,
        timeout: Option<Duration>,
    ) -> anyhow::Result<Self> {
        Url::parse(base)?;

        let mut builder =
            reqwest::Client::builder().user_agent(concat!("wheelhouse/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            base: base.trim_end_matches('/').to_owned(),
            auth,
        })
    }
}

fn join_url(base: &str, path_and_query: &str) -> OriginResult<Url> {
    let joined = if path_and_query.starts_with('/') {
        format!("{base}{path_and_query}")
    } else {
        format!("{base}/{path_and_query}")
    };
    Url::parse(&joined).map_err(|e| OriginError::InvalidRequest(format!("{joined}: {e}")))
}

#[async_trait]
impl OriginProvider for HttpOrigin {
    async fn fetch(&self, path_and_query: &str) -> OriginResult<OriginResponse> {
        let url = join_url(&self.base, path_and_query)?;

        let mut req = self.http.get(url.clone());
        if let Some(auth) = &self.auth {
            req = req.basic_auth(&auth.username, auth.password.as_ref());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| OriginError::Transport(Box::new(e)))?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp
            .bytes()
            .await
            .map_err(|e| OriginError::Transport(Box::new(e)))?;

        debug!(%url, %status, len = body.len(), "Fetched from origin");

        Ok(OriginResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_paths_onto_base() {
        let base = "https://pypi.org/simple";
        assert_eq!(
            join_url(base, "/requests/").unwrap().as_str(),
            "https://pypi.org/simple/requests/"
        );
        assert_eq!(
            join_url(base, "index?x=1").unwrap().as_str(),
            "https://pypi.org/simple/index?x=1"
        );
        assert_eq!(join_url(base, "/").unwrap().as_str(), "https://pypi.org/simple/");
    }

    #[tokio::test]
    async fn unreachable_origin_is_a_transport_error() {
        let origin = HttpOrigin::new(
            "http://127.0.0.1:1",
            None,
            Some(Duration::from_millis(500)),
        )
        .unwrap();
        assert!(matches!(
            origin.fetch("/index").await,
            Err(OriginError::Transport(_))
        ));
    }

    #[test]
    fn rejects_bad_base() {
        assert!(HttpOrigin::new("not a url", None, None).is_err());
    }
}
