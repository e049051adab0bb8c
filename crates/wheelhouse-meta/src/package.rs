use crate::MetadataError;

/// The handful of core metadata fields wheelhouse relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMetadata {
    name: String,
    version: String,
    summary: String,
}

impl PackageMetadata {
    /// Parse the RFC 822 style header block of a `PKG-INFO` or `METADATA` file.
    ///
    /// Only lines before the first blank line are headers; anything after is the long
    /// description. Keys match case-sensitively and the first occurrence wins.
    pub fn parse(text: &str) -> Result<Self, MetadataError> {
        let mut name = None;
        let mut version = None;
        let mut summary = None;

        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                break;
            }
            // folded continuation of the previous header
            if line.starts_with([' ', '\t']) {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let slot = match key {
                "Name" => &mut name,
                "Version" => &mut version,
                "Summary" => &mut summary,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.trim().to_owned());
            }
        }

        Ok(Self {
            name: name.ok_or(MetadataError::MissingField("Name"))?,
            version: version.ok_or(MetadataError::MissingField("Version"))?,
            summary: summary.ok_or(MetadataError::MissingField("Summary"))?,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn summary(&self) -> &str {
        &self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(name: &str, version: &str, summary: &str) -> String {
        [
            "Metadata-Version: 2.1".to_owned(),
            format!("Name: {name}"),
            format!("Version: {version}"),
            format!("Summary: {summary}"),
            "Author: Someone".to_owned(),
            "Author-email: someone@example.com".to_owned(),
        ]
        .join("\n")
    }

    #[test]
    fn reads_core_fields() {
        for (name, version, summary) in [
            ("my-project", "0.3", "Sample python project"),
            ("Another project", "123-93", "Another example project"),
            (
                "Very-very-difficult project",
                "3",
                "Calculates probability of the Earth being flat",
            ),
        ] {
            let meta = PackageMetadata::parse(&metadata(name, version, summary)).unwrap();
            assert_eq!(meta.name(), name);
            assert_eq!(meta.version(), version);
            assert_eq!(meta.summary(), summary);
        }
    }

    #[test]
    fn missing_fields_are_named() {
        assert!(matches!(
            PackageMetadata::parse("some text"),
            Err(MetadataError::MissingField("Name"))
        ));
        assert!(matches!(
            PackageMetadata::parse("Name: x\nSummary: y"),
            Err(MetadataError::MissingField("Version"))
        ));
        assert!(matches!(
            PackageMetadata::parse("Name: x\nVersion: 1"),
            Err(MetadataError::MissingField("Summary"))
        ));
    }

    #[test]
    fn first_occurrence_wins_and_body_is_ignored() {
        let text = "Name: first\r\nVersion: 1.0\r\nName: second\r\nSummary: s\r\n\r\nVersion: 9.9\n";
        let meta = PackageMetadata::parse(text).unwrap();
        assert_eq!(meta.name(), "first");
        assert_eq!(meta.version(), "1.0");
    }

    #[test]
    fn keys_are_case_sensitive() {
        assert!(PackageMetadata::parse("name: x\nversion: 1\nsummary: s").is_err());
    }

    #[test]
    fn empty_summary_is_still_present() {
        let meta = PackageMetadata::parse("Name: x\nVersion: 1\nSummary:").unwrap();
        assert_eq!(meta.summary(), "");
    }
}
