use std::io;
use thiserror::Error;

/// Failure to recover package metadata from an archive.
///
/// Callers are not expected to branch on the variant; every one of them means the upload
/// cannot be trusted.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("{0:?} is not a supported package archive")]
    UnsupportedArchive(String),
    #[error("archive has no {0} entry")]
    MissingEntry(&'static str),
    #[error("metadata entry exceeds {0} bytes")]
    EntryTooLarge(u64),
    #[error("metadata is not valid UTF-8")]
    NotUtf8,
    #[error("metadata has no `{0}` field")]
    MissingField(&'static str),
    #[error("failed to read archive")]
    Io(#[from] io::Error),
    #[error("failed to read zip archive")]
    Zip(#[from] zip::result::ZipError),
}
