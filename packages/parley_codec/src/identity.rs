//! Per-process session identity.
//!
//! A random v4 UUID in its hyphenated lowercase form. The relay routes on
//! it (it travels in the clear as the `id` query parameter) and its UTF-8
//! text is the keystream key for every frame the client sends or receives.
//! Generated once at startup and never persisted.

use uuid::Uuid;

use crate::cipher::TransportKey;
use crate::error::CodecError;

/// Length of the grouped-hex text form.
pub const IDENTITY_LEN: usize = 36;

const GROUP_LENS: [usize; 5] = [8, 4, 4, 4, 12];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// Generate a fresh identity from the OS random source.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().hyphenated().to_string())
    }

    /// Parse and validate an identity string.
    pub fn parse(s: &str) -> Result<Self, CodecError> {
        if s.len() != IDENTITY_LEN {
            return Err(CodecError::InvalidIdentity(format!(
                "expected {IDENTITY_LEN} chars, got {}",
                s.len()
            )));
        }

        let groups: Vec<&str> = s.split('-').collect();
        if groups.len() != GROUP_LENS.len() {
            return Err(CodecError::InvalidIdentity(
                "expected 5 dash-separated groups".into(),
            ));
        }
        for (group, &len) in groups.iter().zip(GROUP_LENS.iter()) {
            if group.len() != len {
                return Err(CodecError::InvalidIdentity(format!(
                    "group {group:?} should be {len} chars"
                )));
            }
            if !group.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
                return Err(CodecError::InvalidIdentity(format!(
                    "group {group:?} is not lowercase hex"
                )));
            }
        }

        if !groups[2].starts_with('4') {
            return Err(CodecError::InvalidIdentity("version nibble must be 4".into()));
        }
        if !matches!(groups[3].as_bytes()[0], b'8' | b'9' | b'a' | b'b') {
            return Err(CodecError::InvalidIdentity(
                "variant nibble must be one of 8, 9, a, b".into(),
            ));
        }

        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Keystream key for frames sent or received under this identity.
    pub fn transport_key(&self) -> TransportKey {
        TransportKey(self.0.as_bytes().to_vec())
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Identity {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
