//! Everything wheelhouse knows about Python package files: how project names are
//! canonicalized, how the `PKG-INFO`/`METADATA` header block is recovered from the
//! supported archive containers, and how an uploaded filename is checked against it.

mod archive;
mod error;
mod filename;
mod normalize;
mod package;

pub use archive::{has_archive_extension, read_metadata, ArchiveKind};
pub use error::MetadataError;
pub use filename::valid_filename;
pub use normalize::{canonical_name, normalize};
pub use package::PackageMetadata;
