use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

/// File name that marks a Kodi add-on manifest.
pub const MANIFEST_FILE_NAME: &str = "addon.xml";

/// Matches the encoding pseudo-attribute of an XML declaration.
static DECL_ENCODING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^<\?xml[^>]*\bencoding\s*=\s*["']([A-Za-z0-9._-]+)["']"#).unwrap()
});

/// File kind derived from the file name, used to select structural checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// The distinguished `addon.xml` manifest.
    Manifest,
    /// Any other markup file.
    Generic,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Self {
        match path.file_name().and_then(|name| name.to_str()) {
            Some(name) if name == MANIFEST_FILE_NAME => FileKind::Manifest,
            _ => FileKind::Generic,
        }
    }
}

/// One file's content as it moves through the pipeline.
///
/// Read once from storage and never mutated in place; every stage that
/// transforms content produces a new string value instead.
#[derive(Debug, Clone)]
pub struct Document {
    path: PathBuf,
    text: String,
    kind: FileKind,
}

impl Document {
    pub fn new(path: PathBuf, text: String) -> Self {
        let kind = FileKind::from_path(&path);
        Self { path, text, kind }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    /// The encoding named by the document's XML declaration, if any.
    pub fn declared_encoding(&self) -> Option<&str> {
        DECL_ENCODING_RE
            .captures(self.text.trim_start())
            .and_then(|caps| caps.get(1))
            .map(|group| group.as_str())
    }

    /// True when the document contains nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}
