use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::fs::read_to_string;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpListener;
use wheelhouse_client::{BasicAuth, HttpOrigin};
use wheelhouse_server::{ServiceConfig, ServiceState};
use wheelhouse_storage::fs::FsStorageProvider;
use wheelhouse_storage::mem::MemStorageProvider;
use wheelhouse_storage::s3_client::S3StorageProvider;

pub mod cli;
mod config;

use config::{Config, RemoteConfig, StoreConfig};

/// Load the config, bind the listening socket and hand back the server future.
///
/// Binding happens before this returns, so requests can be sent as soon as it does.
pub async fn start_listening(
    args: cli::WheelhouseArgs,
) -> anyhow::Result<impl Future<Output = anyhow::Result<()>>> {
    let config: Config = serde_yaml::from_str(
        &read_to_string(args.config)
            .context("Failed to read config file from disk, is it present?")?,
    )
    .context("Failed to deserialize config file, please make sure its in the right format")?;

    let Config {
        service,
        remote,
        store,
    } = config;

    PrometheusBuilder::new()
        .with_http_listener(service.metrics_address)
        .set_buckets(&[
            100e-6, 500e-6, 1e-3, 5e-3, 1e-2, 5e-2, 1e-1, 2e-1, 3e-1, 4e-1, 5e-1, 6e-1, 7e-1, 8e-1,
            9e-1, 1.0, 5.0, 10.0,
        ])
        .context("Failed to set buckets for prometheus")?
        .install()
        .context("Failed to install prometheus exporter")?;

    let addr = service.address;
    let mode = if remote.is_some() { "proxy" } else { "hosted" };

    let mut state = service_state(service, store)?;
    if let Some(remote) = remote {
        state = state.with_origin(origin(remote)?);
    }

    let router = wheelhouse_server::router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!(?addr, mode, "Starting wheelhouse instance");

    Ok(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Wheelhouse server exited with error")?;

        tracing::info!("Completed graceful shutdown");

        Ok(())
    })
}

fn service_state(service: ServiceConfig, store: StoreConfig) -> anyhow::Result<ServiceState> {
    let state = match store {
        StoreConfig::S3 {
            name,
            endpoint_url,
            region,
            access_key_id,
            access_key_secret,
        } => {
            let access_key_id = access_key_id.map_or_else(
                || {
                    std::env::var("WHEELHOUSE_STORE_KEY_ID").context(
                        "Failed to find store bucket key id in environment variable or config",
                    )
                },
                Ok,
            )?;
            let access_key_secret = access_key_secret.map_or_else(
                || {
                    std::env::var("WHEELHOUSE_STORE_KEY_SECRET").context(
                        "Failed to find store bucket key secret in environment variable or config",
                    )
                },
                Ok,
            )?;
            tracing::info!(bucket = %name, %endpoint_url, "Using S3 storage");
            ServiceState::new(
                service,
                S3StorageProvider::new(
                    &name,
                    &endpoint_url,
                    &region,
                    &access_key_id,
                    &access_key_secret,
                ),
            )
        }
        StoreConfig::Fs { path } => {
            tracing::info!(path = %path.display(), "Using filesystem storage");
            let storage = FsStorageProvider::new(path)
                .context("Failed to prepare the storage directory")?;
            ServiceState::new(service, storage)
        }
        StoreConfig::Memory => {
            tracing::warn!("Using in-memory storage, nothing will survive a restart");
            ServiceState::new(service, MemStorageProvider::new())
        }
    };

    Ok(state)
}

fn origin(remote: RemoteConfig) -> anyhow::Result<HttpOrigin> {
    let auth = remote.username.map(|username| BasicAuth {
        username,
        password: remote.password,
    });
    tracing::info!(url = %remote.url, "Proxying remote index");

    HttpOrigin::new(
        &remote.url,
        auth,
        remote.timeout_secs.map(Duration::from_secs),
    )
    .context("Failed to construct the remote index client")
}

// Based on: https://github.com/tokio-rs/axum/blob/main/examples/graceful-shutdown/src/main.rs
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal;

        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, beginning graceful shutdown");
}
