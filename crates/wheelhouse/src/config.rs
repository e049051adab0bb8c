use serde::Deserialize;
use std::path::PathBuf;
use wheelhouse_server::ServiceConfig;

#[derive(Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    /// Index to proxy. Without one the instance hosts its own uploads.
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    pub store: StoreConfig,
}

#[derive(Deserialize)]
pub struct RemoteConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    S3 {
        name: String,
        endpoint_url: String,
        region: String,
        access_key_id: Option<String>,
        access_key_secret: Option<String>,
    },
    Fs {
        path: PathBuf,
    },
    Memory,
}
