//! Common data types for the meeting client crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum accepted length for an identifier token.
pub const MAX_ID_LEN: usize = 128;

/// Identifier validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// Identifier was empty after trimming.
    #[error("identifier is empty")]
    Empty,

    /// Identifier exceeded [`MAX_ID_LEN`].
    #[error("identifier is longer than 128 bytes")]
    TooLong,
}

fn check_token(raw: &str) -> Result<String, IdError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(IdError::Empty);
    }
    if trimmed.len() > MAX_ID_LEN {
        return Err(IdError::TooLong);
    }
    Ok(trimmed.to_string())
}

/// Opaque meeting identifier issued by the meeting directory.
///
/// The same token names the relay room used for signaling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeetingId(String);

impl MeetingId {
    /// Parse a meeting id from user or wire input.
    ///
    /// # Errors
    ///
    /// Returns [`IdError`] if the token is empty or too long.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        check_token(raw).map(Self)
    }

    /// Borrow the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MeetingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier the relay channel assigns to one connected client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Parse a peer id from wire input.
    ///
    /// # Errors
    ///
    /// Returns [`IdError`] if the token is empty or too long.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        check_token(raw).map(Self)
    }

    /// Borrow the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is usable on the wire (non-empty, bounded).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.0.trim().is_empty() && self.0.len() <= MAX_ID_LEN
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_meeting_id_trims_input() {
        let id = MeetingId::parse("  abc123 \n").unwrap();
        assert_eq!(id.as_str(), "abc123");
        assert_eq!(id.to_string(), "abc123");
    }

    #[test]
    fn test_meeting_id_rejects_empty_and_oversized() {
        assert_eq!(MeetingId::parse("   "), Err(IdError::Empty));
        let long = "x".repeat(MAX_ID_LEN + 1);
        assert_eq!(MeetingId::parse(&long), Err(IdError::TooLong));
    }

    #[test]
    fn test_peer_id_parse_bounds() {
        assert_eq!(PeerId::parse(""), Err(IdError::Empty));
        let at_limit = "p".repeat(MAX_ID_LEN);
        assert!(PeerId::parse(&at_limit).unwrap().is_valid());
    }

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let id = PeerId::parse("sock-1").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"sock-1\"");

        // Deserialization does not trim; validity is checked separately.
        let empty: PeerId = serde_json::from_str("\"\"").unwrap();
        assert!(!empty.is_valid());
    }
}
