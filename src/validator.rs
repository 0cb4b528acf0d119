//! Structural validation.
//!
//! Advisory sanity checks for the one file kind with a known shape: a Kodi
//! add-on manifest must have an `addon` root element carrying a fixed set of
//! attributes. Everything else passes trivially. Validation never mutates the
//! document and never blocks formatting by itself; strict handling of flagged
//! files is the engine's decision.

use std::str::from_utf8;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::document::{Document, FileKind};

/// Expected root element tag of a manifest.
pub const MANIFEST_ROOT: &str = "addon";

/// Attributes every manifest root element must carry.
pub const REQUIRED_MANIFEST_ATTRIBUTES: &[&str] = &["id", "name", "version", "provider-name"];

/// Outcome of validating one document: a pass/fail bit with the ordered
/// human-readable violations behind it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    messages: Vec<String>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<String> {
        self.messages
    }
}

/// Check the document against the structural expectations of its file kind.
///
/// A document whose markup cannot be parsed yields an empty report here; the
/// reformatter is the single place where parse failures are surfaced.
pub fn validate(document: &Document) -> ValidationReport {
    match document.kind() {
        FileKind::Generic => ValidationReport::default(),
        FileKind::Manifest => validate_manifest(document.text()),
    }
}

fn validate_manifest(text: &str) -> ValidationReport {
    let Some((root_tag, root_attributes)) = root_element(text) else {
        return ValidationReport::default();
    };

    let mut messages = Vec::new();

    if root_tag != MANIFEST_ROOT {
        messages.push(format!(
            "root element should be '{MANIFEST_ROOT}', found '{root_tag}'"
        ));
    }

    for required in REQUIRED_MANIFEST_ATTRIBUTES {
        if !root_attributes.iter().any(|name| name == required) {
            messages.push(format!("missing required attribute '{required}'"));
        }
    }

    ValidationReport { messages }
}

/// Tag name and attribute names of the first element, or None when the text
/// has no parseable element.
fn root_element(text: &str) -> Option<(String, Vec<String>)> {
    let mut reader = Reader::from_str(text.trim_start_matches('\u{feff}'));

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) | Ok(Event::Empty(start)) => {
                let tag = from_utf8(start.name().into_inner()).ok()?.to_string();
                let mut attributes = Vec::new();
                for attribute in start.attributes() {
                    let attribute = attribute.ok()?;
                    attributes.push(from_utf8(attribute.key.into_inner()).ok()?.to_string());
                }
                return Some((tag, attributes));
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn manifest(text: &str) -> Document {
        Document::new(PathBuf::from("/addons/plugin.video.x/addon.xml"), text.to_string())
    }

    fn generic(text: &str) -> Document {
        Document::new(PathBuf::from("/addons/plugin.video.x/resources/settings.xml"), text.to_string())
    }

    const COMPLETE_MANIFEST: &str = r#"<addon id="plugin.video.x" name="X" version="1.0.0" provider-name="someone"><extension point="xbmc.python.pluginsource"/></addon>"#;

    #[test]
    fn test_complete_manifest_passes() {
        let report = validate(&manifest(COMPLETE_MANIFEST));
        assert!(report.passed());
        assert!(report.messages().is_empty());
    }

    #[test]
    fn test_missing_attribute_reported_exactly() {
        let text = r#"<addon id="plugin.video.x" name="X" version="1.0.0"/>"#;
        let report = validate(&manifest(text));

        assert!(!report.passed());
        assert_eq!(
            report.messages(),
            &["missing required attribute 'provider-name'".to_string()]
        );
    }

    #[test]
    fn test_all_missing_attributes_reported_in_order() {
        let report = validate(&manifest("<addon/>"));
        let expected: Vec<String> = REQUIRED_MANIFEST_ATTRIBUTES
            .iter()
            .map(|attr| format!("missing required attribute '{attr}'"))
            .collect();
        assert_eq!(report.messages(), expected.as_slice());
    }

    #[test]
    fn test_wrong_root_tag_reported() {
        let text = r#"<plugin id="x" name="X" version="1.0.0" provider-name="p"/>"#;
        let report = validate(&manifest(text));

        assert!(!report.passed());
        assert_eq!(report.messages().len(), 1);
        assert!(report.messages()[0].contains("'addon'"));
        assert!(report.messages()[0].contains("'plugin'"));
    }

    #[test]
    fn test_generic_file_trivially_passes() {
        let report = validate(&generic("<whatever totally=\"unchecked\"/>"));
        assert!(report.passed());
        assert!(report.messages().is_empty());
    }

    #[test]
    fn test_unparseable_manifest_yields_empty_report() {
        let report = validate(&manifest("<addon id="));
        assert!(report.passed());
    }

    #[test]
    fn test_manifest_with_prolog_comment() {
        let text = format!("<?xml version=\"1.0\"?><!-- kodi -->{COMPLETE_MANIFEST}");
        let report = validate(&manifest(&text));
        assert!(report.passed());
    }
}
