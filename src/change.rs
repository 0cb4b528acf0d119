//! Change detection.
//!
//! Decides whether a candidate rewrite is worth a disk write. The comparison
//! trims leading and trailing whitespace of the document as a whole (never
//! line by line), so an original that differs only by a missing or extra
//! trailing newline is still considered canonical, while any interior
//! formatting difference forces a write.

/// True when `candidate` differs from `original` beyond outer whitespace.
///
/// Must be called with the final restored text, never with the intermediate
/// placeholder-bearing form: placeholder tokens differ in length from the
/// sections they stand for, which would skew the comparison both ways.
pub fn needs_write(original: &str, candidate: &str) -> bool {
    original.trim() != candidate.trim()
}
