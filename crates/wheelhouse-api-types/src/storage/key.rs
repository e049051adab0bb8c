use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("key segment is empty")]
    EmptySegment,
    #[error("key segment {0:?} is a relative path component")]
    Relative(String),
    #[error("key segment {0:?} contains a path separator or NUL")]
    Separator(String),
}

/// Address of an object in a [`StorageProvider`](super::StorageProvider).
///
/// An ordered list of non-empty segments, rendered joined by `/`. The key with no
/// segments is the root: it is a valid listing prefix but never names an object.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageKey {
    segments: Vec<String>,
}

impl StorageKey {
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a key from a `/`-separated path such as a request URI path.
    ///
    /// Empty segments (leading, trailing or doubled slashes) are dropped.
    pub fn from_path(path: &str) -> Result<Self, KeyError> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .try_fold(Self::root(), |key, segment| key.join(segment))
    }

    /// Append a single segment, which must not itself contain a separator.
    pub fn join(&self, segment: &str) -> Result<Self, KeyError> {
        check_segment(segment)?;
        let mut segments = self.segments.clone();
        segments.push(segment.to_owned());
        Ok(Self { segments })
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }

    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let (_, parent) = self.segments.split_last()?;
        Some(Self {
            segments: parent.to_vec(),
        })
    }

    /// Replace the last segment with the result of `f`. The root key is returned as is.
    pub fn map_last(&self, f: impl FnOnce(&str) -> String) -> Result<Self, KeyError> {
        match self.parent() {
            Some(parent) => parent.join(&f(self.last().unwrap_or_default())),
            None => Ok(self.clone()),
        }
    }

    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Segments after `prefix`, if this key lives under it.
    #[must_use]
    pub fn strip_prefix(&self, prefix: &Self) -> Option<impl Iterator<Item = &str>> {
        self.starts_with(prefix)
            .then(|| self.segments[prefix.segments.len()..].iter().map(String::as_str))
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

fn check_segment(segment: &str) -> Result<(), KeyError> {
    match segment {
        "" => Err(KeyError::EmptySegment),
        "." | ".." => Err(KeyError::Relative(segment.to_owned())),
        s if s.contains(['/', '\\', '\0']) => Err(KeyError::Separator(s.to_owned())),
        _ => Ok(()),
    }
}
