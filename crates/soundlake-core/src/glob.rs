//! Glob-style matching over `/`-separated object keys.
//!
//! Object stores have no directories, so hierarchical patterns such as
//! `song_data/*/*/*/*.json` are resolved by listing the literal prefix of the
//! pattern and filtering keys segment by segment.
//!
//! Supported syntax, per segment:
//! - `*` matches any run of characters (including none) within one segment
//! - `?` matches exactly one character
//! - everything else matches literally
//!
//! Wildcards never cross a `/`.

use crate::error::{Error, Result};

/// A parsed glob pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobPattern {
    raw: String,
    segments: Vec<String>,
}

impl GlobPattern {
    /// Parses a pattern.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for empty patterns, absolute patterns,
    /// empty segments, or `..` segments.
    pub fn new(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(Error::InvalidInput("glob pattern cannot be empty".into()));
        }
        if pattern.starts_with('/') {
            return Err(Error::InvalidInput(format!(
                "glob pattern must be relative: {pattern}"
            )));
        }

        let segments: Vec<String> = pattern.split('/').map(str::to_string).collect();
        for segment in &segments {
            if segment.is_empty() {
                return Err(Error::InvalidInput(format!(
                    "glob pattern has an empty segment: {pattern}"
                )));
            }
            if segment == ".." || segment == "." {
                return Err(Error::InvalidInput(format!(
                    "path traversal not allowed in glob: {pattern}"
                )));
            }
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    /// Returns the pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the longest leading run of wildcard-free segments, with a
    /// trailing `/` when non-empty. Listing this prefix finds every candidate.
    #[must_use]
    pub fn literal_prefix(&self) -> String {
        let literal: Vec<&str> = self
            .segments
            .iter()
            .take_while(|s| !has_wildcard(s))
            .map(String::as_str)
            .collect();

        // A fully literal pattern names a single key; list its parent.
        let literal = if literal.len() == self.segments.len() {
            &literal[..literal.len() - 1]
        } else {
            &literal[..]
        };

        if literal.is_empty() {
            String::new()
        } else {
            format!("{}/", literal.join("/"))
        }
    }

    /// Returns true if `path` matches the pattern.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let parts: Vec<&str> = path.split('/').collect();
        parts.len() == self.segments.len()
            && self
                .segments
                .iter()
                .zip(parts)
                .all(|(pattern, part)| segment_matches(pattern.as_bytes(), part.as_bytes()))
    }
}

fn has_wildcard(segment: &str) -> bool {
    segment.contains('*') || segment.contains('?')
}

/// Iterative wildcard match with single-star backtracking.
fn segment_matches(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&b| b == b'*')
}
