use crate::{canonical_name, ArchiveKind, PackageMetadata};
use tracing::debug;

/// Check that `filename` is a well-formed distribution filename for its container and that
/// the project name and version it embeds agree with `metadata`.
///
/// Names are compared in their canonical form. Never fails: anything unparseable is `false`.
#[must_use]
pub fn valid_filename(metadata: &PackageMetadata, filename: &str) -> bool {
    let Some((name, version)) = split_filename(filename, metadata.version()) else {
        debug!(
            filename,
            version = metadata.version(),
            "Filename is not a distribution filename for this version"
        );
        return false;
    };
    let name_matches = canonical_name(name) == canonical_name(metadata.name());
    let version_matches = version == metadata.version()
        || version == metadata.version().replace('-', "_");
    if !(name_matches && version_matches) {
        debug!(
            filename,
            name = metadata.name(),
            version = metadata.version(),
            "Filename disagrees with package metadata"
        );
    }
    name_matches && version_matches
}

/// Split a distribution filename into its raw project name and version tokens.
///
/// Source distributions are `{name}-{version}` where both halves may contain dashes, so
/// the expected version is used to find the boundary.
fn split_filename<'f>(filename: &'f str, expected_version: &str) -> Option<(&'f str, &'f str)> {
    if filename.contains(['/', '\\']) {
        return None;
    }
    let kind = ArchiveKind::from_filename(filename)?;
    let stem = kind.stem(filename)?;

    let (name, version) = match kind {
        // {name}-{version}(-{build})?-{python}-{abi}-{platform}
        ArchiveKind::Wheel => {
            let parts: Vec<_> = stem.split('-').collect();
            if !matches!(parts.len(), 5 | 6) {
                return None;
            }
            (parts[0], parts[1])
        }
        // {name}-{version}(-{pyver}(-{platform})?)?
        ArchiveKind::Egg => {
            let mut parts = stem.splitn(3, '-');
            (parts.next()?, parts.next()?)
        }
        ArchiveKind::ZipSdist | ArchiveKind::TarGzSdist | ArchiveKind::TarSdist => {
            let name = stem.strip_suffix(expected_version)?.strip_suffix('-')?;
            (name, &stem[name.len() + 1..])
        }
    };

    (!name.is_empty() && !version.is_empty()).then_some((name, version))
}
