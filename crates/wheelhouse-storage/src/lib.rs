#![cfg_attr(docsrs, feature(doc_cfg))]

pub use wheelhouse_api_types::storage::{StorageError, StorageKey, StorageProvider, StorageResult};

pub mod s3_client;

pub mod fs;

pub mod mem;
