//! Hex helpers for frame diagnostics.

use data_encoding::HEXLOWER_PERMISSIVE;

use crate::error::CodecError;

/// Encode bytes as lowercase hex.
pub fn to_hex(bytes: &[u8]) -> String {
    HEXLOWER_PERMISSIVE.encode(bytes)
}

/// Decode hex, ignoring ASCII whitespace and accepting either case.
pub fn from_hex(s: &str) -> Result<Vec<u8>, CodecError> {
    let compact: String = s.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    HEXLOWER_PERMISSIVE
        .decode(compact.as_bytes())
        .map_err(|e| CodecError::InvalidHex(e.to_string()))
}
