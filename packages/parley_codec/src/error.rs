//! Error types and stable error codes.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("transport key must not be empty")]
    EmptyKey,

    #[error("decoded frame is not valid UTF-8")]
    InvalidUtf8,

    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

impl CodecError {
    pub fn error_code(&self) -> &str {
        match self {
            Self::EmptyKey => "empty_key",
            Self::InvalidUtf8 => "invalid_utf8",
            Self::InvalidIdentity(_) => "invalid_identity",
            Self::InvalidHex(_) => "invalid_hex",
        }
    }
}
