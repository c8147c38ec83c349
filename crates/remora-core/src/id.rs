//! Result identifiers.
//!
//! A `ResultId` names one pending or completed computation. Ids are minted by
//! the server on submission (16 random bytes, hex-encoded) and travel back to
//! clients as plain text. Because ids also name checkpoint files on disk, only
//! `[A-Za-z0-9_-]` is accepted when parsing ids that come off the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Longest id accepted from the wire.
pub const MAX_ID_LEN: usize = 128;

/// Opaque, write-once name of a computation outcome.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultId(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("result id is empty")]
    Empty,
    #[error("result id is longer than {MAX_ID_LEN} characters")]
    TooLong,
    #[error("result id contains invalid character {0:?}")]
    InvalidChar(char),
}

impl ResultId {
    /// Mint a fresh id.
    pub fn generate() -> Self {
        Self(hex::encode(rand::random::<[u8; 16]>()))
    }

    /// Validate an id received from a client.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        if raw.is_empty() {
            return Err(IdError::Empty);
        }
        if raw.len() > MAX_ID_LEN {
            return Err(IdError::TooLong);
        }
        if let Some(bad) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(IdError::InvalidChar(bad));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form used in log lines.
    pub fn short(&self) -> &str {
        &self.0[..16.min(self.0.len())]
    }
}

impl fmt::Display for ResultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ResultId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_valid() {
        let a = ResultId::generate();
        let b = ResultId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert_eq!(ResultId::parse(a.as_str()).unwrap(), a);
    }

    #[test]
    fn parse_rejects_path_characters() {
        assert_eq!(ResultId::parse(""), Err(IdError::Empty));
        assert_eq!(ResultId::parse("../etc"), Err(IdError::InvalidChar('.')));
        assert_eq!(ResultId::parse("a/b"), Err(IdError::InvalidChar('/')));
        assert!(ResultId::parse(&"a".repeat(MAX_ID_LEN + 1)).is_err());
    }

    #[test]
    fn parse_accepts_uuid_style_ids() {
        let id = ResultId::parse("0f8e-41aa_b2").unwrap();
        assert_eq!(id.to_string(), "0f8e-41aa_b2");
        assert_eq!(id.short(), "0f8e-41aa_b2");
    }
}
