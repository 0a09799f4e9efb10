//! ## ringswitch-filter::signatures
//! **Aho-Corasick payload matching**
//!
//! Patterns are plain text, or raw bytes when written as `hex:<digits>`.
//! The compiled automaton is reference counted, so cloning a set into many
//! leaves shares one matcher.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder};

use crate::FilterError;

const HEX_PREFIX: &str = "hex:";

#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<Vec<u8>>,
    matcher: AhoCorasick,
}

impl PatternSet {
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self, FilterError> {
        let patterns = patterns
            .iter()
            .map(|p| decode(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let matcher = AhoCorasickBuilder::new()
            .build(&patterns)
            .map_err(|e| FilterError::PatternError(e.to_string()))?;

        Ok(Self { patterns, matcher })
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether any pattern occurs in `data`.
    #[inline]
    pub fn is_match(&self, data: &[u8]) -> bool {
        self.matcher.is_match(data)
    }

    /// Indices of every pattern found in `data`, overlapping matches included.
    pub fn buffer_scan(&self, data: &[u8]) -> Vec<usize> {
        let mut found: Vec<usize> = self
            .matcher
            .find_overlapping_iter(data)
            .map(|m| m.pattern().as_usize())
            .collect();
        found.sort_unstable();
        found.dedup();
        found
    }
}

fn decode(pattern: &str) -> Result<Vec<u8>, FilterError> {
    let bytes = match pattern.strip_prefix(HEX_PREFIX) {
        Some(digits) => hex::decode(digits).map_err(|source| FilterError::InvalidHex {
            pattern: pattern.to_string(),
            source,
        })?,
        None => pattern.as_bytes().to_vec(),
    };
    if bytes.is_empty() {
        return Err(FilterError::EmptyPattern);
    }
    Ok(bytes)
}
