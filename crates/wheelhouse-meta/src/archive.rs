use crate::{MetadataError, PackageMetadata};
use flate2::read::GzDecoder;
use std::io::{Read, Seek};
use std::path::{Component, Path};
use tracing::debug;

/// Upper bound on the size of a metadata entry we are willing to inflate.
const MAX_METADATA_LEN: u64 = 16 * 1024 * 1024;

/// Suffixes that mark a string as a distribution filename rather than a project name.
/// Wider than what [`ArchiveKind`] can open: legacy formats are still stored and served.
const ARCHIVE_EXTENSIONS: &[&str] = &[
    ".whl", ".tar.gz", ".tgz", ".tar.bz2", ".tar.z", ".tar", ".zip", ".egg",
];

#[must_use]
pub fn has_archive_extension(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    ARCHIVE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Package containers wheelhouse can look inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// Built distribution, a zip with `{name}-{version}.dist-info/METADATA`.
    Wheel,
    /// Legacy built distribution, a zip with `EGG-INFO/PKG-INFO`.
    Egg,
    /// Source distribution packed as a zip.
    ZipSdist,
    /// Source distribution packed as a gzip-compressed tarball.
    TarGzSdist,
    /// Source distribution packed as an uncompressed tarball.
    TarSdist,
}

impl ArchiveKind {
    /// Recognize the container from the filename's extension, case-insensitively.
    #[must_use]
    pub fn from_filename(filename: &str) -> Option<Self> {
        let lower = filename.to_ascii_lowercase();
        [
            Self::Wheel,
            Self::Egg,
            Self::ZipSdist,
            Self::TarGzSdist,
            Self::TarSdist,
        ]
        .into_iter()
        .flat_map(|kind| kind.extensions().iter().map(move |ext| (kind, ext)))
        .find(|(_, ext)| lower.ends_with(**ext))
        .map(|(kind, _)| kind)
    }

    #[must_use]
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Wheel => &[".whl"],
            Self::Egg => &[".egg"],
            Self::ZipSdist => &[".zip"],
            Self::TarGzSdist => &[".tar.gz", ".tgz"],
            Self::TarSdist => &[".tar"],
        }
    }

    /// `filename` with this kind's extension removed.
    #[must_use]
    pub fn stem(self, filename: &str) -> Option<&str> {
        let lower = filename.to_ascii_lowercase();
        self.extensions()
            .iter()
            .find(|ext| lower.ends_with(**ext))
            .map(|ext| &filename[..filename.len() - ext.len()])
    }

    fn entry_description(self) -> &'static str {
        match self {
            Self::Wheel => "*.dist-info/METADATA",
            Self::Egg => "EGG-INFO/PKG-INFO",
            Self::ZipSdist | Self::TarGzSdist | Self::TarSdist => "*/PKG-INFO",
        }
    }

    fn is_metadata_entry(self, path: &Path) -> bool {
        let parts: Vec<_> = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect();
        match (self, parts.as_slice()) {
            (Self::Wheel, [dir, "METADATA"]) => dir.ends_with(".dist-info"),
            (Self::Egg, ["EGG-INFO", "PKG-INFO"]) => true,
            (Self::ZipSdist | Self::TarGzSdist | Self::TarSdist, [_, "PKG-INFO"]) => true,
            _ => false,
        }
    }
}

/// Extract `Name`, `Version` and `Summary` from the metadata file embedded in a package
/// archive, choosing the container format from `filename`.
///
/// Only the first entry that looks like the metadata file is read.
pub fn read_metadata<R: Read + Seek>(
    archive: R,
    filename: &str,
) -> Result<PackageMetadata, MetadataError> {
    let kind = ArchiveKind::from_filename(filename)
        .ok_or_else(|| MetadataError::UnsupportedArchive(filename.to_owned()))?;
    debug!(filename, ?kind, "Reading package metadata");

    let text = match kind {
        ArchiveKind::Wheel | ArchiveKind::Egg | ArchiveKind::ZipSdist => from_zip(archive, kind)?,
        ArchiveKind::TarGzSdist => from_tar(GzDecoder::new(archive), kind)?,
        ArchiveKind::TarSdist => from_tar(archive, kind)?,
    };

    PackageMetadata::parse(&text)
}

fn from_zip<R: Read + Seek>(archive: R, kind: ArchiveKind) -> Result<String, MetadataError> {
    let mut zip = zip::ZipArchive::new(archive)?;
    for index in 0..zip.len() {
        let entry = zip.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let matches = entry
            .enclosed_name()
            .is_some_and(|path| kind.is_metadata_entry(&path));
        if matches {
            debug!(entry = entry.name(), "Found metadata entry in zip");
            return read_entry(entry);
        }
    }
    Err(MetadataError::MissingEntry(kind.entry_description()))
}

fn from_tar<R: Read>(archive: R, kind: ArchiveKind) -> Result<String, MetadataError> {
    let mut tar = tar::Archive::new(archive);
    for entry in tar.entries()? {
        let entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        if kind.is_metadata_entry(&entry.path()?) {
            debug!(entry = %entry.path()?.display(), "Found metadata entry in tarball");
            return read_entry(entry);
        }
    }
    Err(MetadataError::MissingEntry(kind.entry_description()))
}

fn read_entry(entry: impl Read) -> Result<String, MetadataError> {
    let mut raw = Vec::new();
    entry.take(MAX_METADATA_LEN + 1).read_to_end(&mut raw)?;
    if raw.len() as u64 > MAX_METADATA_LEN {
        return Err(MetadataError::EntryTooLarge(MAX_METADATA_LEN));
    }
    String::from_utf8(raw).map_err(|_| MetadataError::NotUtf8)
}
