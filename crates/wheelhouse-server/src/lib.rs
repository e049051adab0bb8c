use axum::body::Body;
use axum::extract::{MatchedPath, Path, State};
use axum::http::{Request, StatusCode, Uri};
use axum::middleware::{from_fn, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use metrics::{counter, histogram};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::classify::StatusInRangeAsFailures;
use tower_http::trace::{DefaultOnFailure, TraceLayer};
use wheelhouse_api_types::origin::OriginProvider;
use wheelhouse_api_types::storage::StorageProvider;

pub mod proxy;

pub mod simple;

pub mod upload;

pub type SharedStorage = Arc<dyn StorageProvider + Send + Sync>;

#[derive(Clone, Deserialize)]
pub struct ServiceConfig {
    pub address: SocketAddr,
    pub metrics_address: SocketAddr,

    /// Largest multipart upload body accepted, in bytes.
    #[serde(default = "default_upload_size_limit")]
    pub upload_size_limit: u64,
}

pub struct ServiceState {
    pub config: ServiceConfig,
    pub storage: SharedStorage,
    /// The index being proxied. Without one, `GET` serves what was uploaded here.
    pub origin: Option<Box<dyn OriginProvider + Send + Sync>>,
}

impl ServiceState {
    pub fn new(config: ServiceConfig, storage: impl StorageProvider + Send + Sync + 'static) -> Self {
        Self {
            config,
            storage: Arc::new(storage),
            origin: None,
        }
    }

    #[must_use]
    pub fn with_origin(mut self, origin: impl OriginProvider + Send + Sync + 'static) -> Self {
        self.origin = Some(Box::new(origin));
        self
    }
}

pub fn router(state: ServiceState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/-/healthcheck", get(healthcheck))
        .route("/", get(serve).post(upload::upload))
        .route("/*path", get(serve).post(upload::upload))
        .with_state(state)
        .layer(CatchPanicLayer::custom(|_| {
            counter!("panics_total").increment(1);

            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }))
        .layer(
            TraceLayer::new(StatusInRangeAsFailures::new(400..=599).into_make_classifier())
                .make_span_with(|request: &Request<Body>| {
                    let method = request.method();
                    let uri = request.uri();

                    tracing::info_span!("http-request", ?method, ?uri)
                })
                .on_failure(DefaultOnFailure::new()),
        )
        .layer(from_fn(metrics_layer))
}

async fn metrics_layer(request: Request<Body>, next: Next) -> Response {
    let timer = Instant::now();

    let path = if let Some(path) = request.extensions().get::<MatchedPath>() {
        path.as_str().to_string()
    } else {
        request.uri().path().to_string()
    };

    let response = next.run(request).await;

    let elapsed = timer.elapsed();

    let code = response.status().as_u16().to_string();

    histogram!("request_duration_seconds", "code" => code, "endpoint" => path).record(elapsed);

    response
}

/// `GET` on any repository path: proxied when an origin is configured, otherwise answered
/// from storage.
async fn serve(
    State(state): State<Arc<ServiceState>>,
    path: Option<Path<String>>,
    uri: Uri,
) -> Response {
    let path = path.map(|Path(p)| p).unwrap_or_default();

    match &state.origin {
        Some(origin) => {
            let forwarded = uri.path_and_query().map_or("/", |pq| pq.as_str());
            proxy::handle_get(state.storage.as_ref(), origin.as_ref(), &path, forwarded).await
        }
        None => simple::handle_get(state.storage.as_ref(), &path, uri.path().ends_with('/')).await,
    }
}

async fn healthcheck(State(state): State<Arc<ServiceState>>) -> axum::response::Result<String> {
    let check_time = Duration::from_secs(4);

    match timeout(check_time, state.storage.healthcheck()).await {
        Ok(Ok(())) => Ok("OK".into()),
        // healthcheck is unauthenticated and shouldn't leak internals via errors
        Ok(Err(e)) => {
            for e in e.chain() {
                tracing::error!("storage healthcheck: {e}");
            }
            Err((StatusCode::INTERNAL_SERVER_ERROR, "storage failed").into())
        }
        Err(_) => Err((StatusCode::INTERNAL_SERVER_ERROR, "storage timed out").into()),
    }
}

#[inline(always)]
fn default_upload_size_limit() -> u64 {
    100 * 1024 * 1024
}
