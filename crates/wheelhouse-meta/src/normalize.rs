use crate::archive::has_archive_extension;
use regex::Regex;
use std::sync::OnceLock;

/// Canonicalize a project name the way PEP 503 does: lowercase it and collapse every
/// run of `-`, `_` and `.` into a single `-`.
///
/// Strings that already end in a package archive extension are filenames, not project
/// names, and come back untouched so downloads keep their exact name.
///
/// ```
/// use wheelhouse_meta::normalize;
///
/// assert_eq!(normalize("My_Project"), "my-project");
/// assert_eq!(normalize("AnotherIndex"), "anotherindex");
/// assert_eq!(normalize("My.Project.whl"), "My.Project.whl");
/// assert_eq!(normalize("Johns.Project.tar.gz"), "Johns.Project.tar.gz");
/// ```
#[must_use]
pub fn normalize(raw: &str) -> String {
    if has_archive_extension(raw) {
        return raw.to_owned();
    }
    canonical_name(raw)
}

/// PEP 503 canonical form of a string known to be a project name, even one that happens
/// to end like an archive (`Old.Egg`).
///
/// ```
/// use wheelhouse_meta::canonical_name;
///
/// assert_eq!(canonical_name("Old.Egg"), "old-egg");
/// ```
#[must_use]
pub fn canonical_name(name: &str) -> String {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    let separators =
        SEPARATORS.get_or_init(|| Regex::new(r"[-_.]+").expect("separator pattern is valid"));
    separators.replace_all(&name.to_lowercase(), "-").into_owned()
}
