use thiserror::Error;

pub type OriginResult<T> = Result<T, OriginError>;

#[derive(Error, Debug)]
pub enum OriginError {
    #[error("Could not build a request for the origin: {0}")]
    InvalidRequest(String),
    #[error("Origin could not be reached")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}
