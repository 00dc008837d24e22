use std::collections::BTreeMap;

use crate::error::PipelineError;

pub const KEY_NAME: &str = "name";
pub const KEY_PUBLISHER: &str = "publisher";
pub const KEY_VERSION: &str = "version";
pub const KEY_DESCRIPTION: &str = "description";

/// Flat `key=value` descriptor shipped next to every upstream app.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: BTreeMap<String, String>,
}

impl Manifest {
    /// Raw lookup, including keys whose value is empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Lookup that treats an empty value as missing.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|value| !value.is_empty())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }
}

/// Parse manifest text. Never fails: lines without `=` are ignored and the
/// value keeps every `=` after the first one.
pub fn parse_manifest(content: &str) -> Manifest {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut entries = BTreeMap::new();
    for line in content.split('\n') {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        entries.insert(key.trim().to_string(), value.trim().to_string());
    }
    Manifest { entries }
}

/// Decode a fetched manifest body and parse it.
pub fn decode_manifest(app_id: &str, body: &[u8]) -> Result<Manifest, PipelineError> {
    let text = std::str::from_utf8(body).map_err(|error| PipelineError::ManifestParse {
        app_id: app_id.to_string(),
        detail: error.to_string(),
    })?;
    Ok(parse_manifest(text))
}

#[cfg(test)]
mod tests {
    use super::{KEY_NAME, KEY_VERSION, decode_manifest, parse_manifest};
    use crate::error::PipelineError;

    #[test]
    fn value_keeps_later_separators() {
        let manifest = parse_manifest("key=value=more");
        assert_eq!(manifest.get("key"), Some("value=more"));
    }

    #[test]
    fn lines_without_separator_are_skipped() {
        let manifest = parse_manifest("just some words\nname = Alpha \n\n# comment");
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.get(KEY_NAME), Some("Alpha"));
    }

    #[test]
    fn empty_input_yields_empty_mapping() {
        assert!(parse_manifest("").is_empty());
        assert!(parse_manifest("\n\n\n").is_empty());
    }

    #[test]
    fn crlf_and_bom_are_tolerated() {
        let manifest = parse_manifest("\u{feff}name=Alpha\r\nversion=1.2.0\r\n");
        assert_eq!(manifest.get(KEY_NAME), Some("Alpha"));
        assert_eq!(manifest.get(KEY_VERSION), Some("1.2.0"));
    }

    #[test]
    fn later_duplicates_win_and_empty_values_are_not_fields() {
        let manifest = parse_manifest("name=First\nname=Second\npublisher=");
        assert_eq!(manifest.get(KEY_NAME), Some("Second"));
        assert_eq!(manifest.get("publisher"), Some(""));
        assert_eq!(manifest.field("publisher"), None);
    }

    #[test]
    fn arbitrary_text_is_total() {
        let manifest = parse_manifest("=\n==\n=x\n\u{0}\u{7f}=\u{1f600}");
        assert_eq!(manifest.get(""), Some("x"));
        assert_eq!(manifest.get("\u{0}\u{7f}"), Some("\u{1f600}"));
    }

    #[test]
    fn invalid_utf8_is_a_parse_error() {
        let error = decode_manifest("broken", &[0x6e, 0x3d, 0xff, 0xfe]).expect_err("must fail");
        assert!(matches!(
            error,
            PipelineError::ManifestParse { ref app_id, .. } if app_id == "broken"
        ));
    }
}
