//! Literal-section preservation.
//!
//! CDATA blocks must survive reformatting byte-exact, delimiters included.
//! Before parsing, every block is swapped for an indexed placeholder token;
//! after serialization the tokens are swapped back. The token alphabet is
//! plain ASCII word characters, so the tokens pass through text escaping
//! untouched.

use once_cell::sync::Lazy;
use regex::Regex;

/// Non-greedy so adjacent sections are never merged into one match; `(?s)`
/// because section content may span lines.
static CDATA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!\[CDATA\[.*?\]\]>").unwrap());

const CDATA_OPEN: &str = "<![CDATA[";
const SENTINEL_BASE: &str = "__CDATA_SECTION_";

/// Holds the literal sections extracted from one document, in discovery
/// order, together with the sentinel chosen for that document.
#[derive(Debug, Clone)]
pub struct CdataVault {
    sentinel: String,
    sections: Vec<String>,
}

impl CdataVault {
    /// Replace every well-formed CDATA block in `text` with a placeholder
    /// token and return the working text plus the vault needed to undo the
    /// substitution.
    ///
    /// An unterminated opening delimiter does not match and is left in the
    /// working text; whatever the parser makes of it is not the vault's
    /// concern.
    pub fn extract(text: &str) -> (String, CdataVault) {
        if !text.contains(CDATA_OPEN) {
            return (
                text.to_string(),
                CdataVault {
                    sentinel: SENTINEL_BASE.to_string(),
                    sections: Vec::new(),
                },
            );
        }

        // The sentinel must not occur anywhere in the input, or a token could
        // collide with pre-existing content. Extend it until it does not.
        let mut sentinel = SENTINEL_BASE.to_string();
        while text.contains(&sentinel) {
            sentinel.push('X');
        }

        let mut sections = Vec::new();
        let mut working = String::with_capacity(text.len());
        let mut last = 0;

        for found in CDATA_RE.find_iter(text) {
            working.push_str(&text[last..found.start()]);
            working.push_str(&token(&sentinel, sections.len()));
            sections.push(found.as_str().to_string());
            last = found.end();
        }
        working.push_str(&text[last..]);

        (working, CdataVault { sentinel, sections })
    }

    /// Put the original sections back into `formatted`, each matched by the
    /// index embedded in its token rather than by scan order, so reformatting
    /// that moved the surrounding text cannot misassign sections.
    pub fn restore(&self, formatted: &str) -> String {
        let mut result = formatted.to_string();
        for (index, section) in self.sections.iter().enumerate() {
            result = result.replace(&token(&self.sentinel, index), section);
        }
        result
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// The trailing `__` terminates the index digits, so token 1 can never match
/// inside token 11.
fn token(sentinel: &str, index: usize) -> String {
    format!("{sentinel}{index}__")
}
