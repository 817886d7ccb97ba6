//! Opaque identifiers.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

const HEX_CHARS: &[u8] = b"0123456789abcdef";

/// An 8 hex-like character job/video identifier.
///
/// The spec treats one submitted video and its job record as the same
/// identity, so a single `VideoId` type stands in for both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    /// Generate a new random identifier.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        let s: String = (0..8)
            .map(|_| HEX_CHARS[rng.gen_range(0..HEX_CHARS.len())] as char)
            .collect();
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_eight_hex_chars() {
        let id = VideoId::new();
        assert_eq!(id.as_str().len(), 8);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn ids_are_globally_distinct_with_high_probability() {
        let a = VideoId::new();
        let b = VideoId::new();
        assert_ne!(a, b);
    }
}
