use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::core::CatalogError;

/// A versioned script's ordering identifier.
///
/// Versions are dotted or underscored numeric tokens (`1`, `1.2`, `2_0_1`).
/// Ordering compares numeric segments left to right, so `1.10 > 1.9`,
/// with segment count as the final tie-break (`1.2 < 1.2.0`).
/// Lexical comparison of the raw token is never used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    segments: Vec<u64>,
    raw: String,
}

impl Version {
    /// Parse a version token. Every segment must be numeric.
    pub fn parse(token: &str, file: &str) -> Result<Self, CatalogError> {
        let invalid = || CatalogError::InvalidVersion {
            token: token.to_string(),
            file: file.to_string(),
        };

        if token.is_empty() {
            return Err(invalid());
        }

        let mut segments = Vec::new();
        for part in token.split(['.', '_']) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            segments.push(part.parse::<u64>().map_err(|_| invalid())?);
        }

        Ok(Self {
            segments,
            raw: token.to_string(),
        })
    }

    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    /// The token exactly as it appeared in the file name.
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

// Equality and ordering consider segments only: "1.0" and "1_0" are the
// same version even though their raw tokens differ.
impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.segments.hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // Slice Ord is segment-wise with length as the tie-break, which is
        // exactly the required rule.
        self.segments.cmp(&other.segments)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(token: &str) -> Version {
        Version::parse(token, "test.sql").unwrap()
    }

    #[test]
    fn numeric_not_lexical() {
        assert!(v("1.9") < v("1.10"));
        assert!(v("2") > v("1.999"));
        assert!(v("10") > v("9"));
    }

    #[test]
    fn segment_count_tie_break() {
        assert!(v("1.2") < v("1.2.0"));
        assert!(v("1") < v("1.0"));
    }

    #[test]
    fn separators_are_equivalent() {
        assert_eq!(v("1.0.3"), v("1_0_3"));
    }

    #[test]
    fn rejects_non_numeric_segments() {
        assert!(Version::parse("1.a", "f.sql").is_err());
        assert!(Version::parse("", "f.sql").is_err());
        assert!(Version::parse("1..2", "f.sql").is_err());
        assert!(Version::parse("1.", "f.sql").is_err());
    }
}
