//! Repeating-key XOR keystream over relay frames.
//!
//! `out[i] = in[i] ^ key[i % key.len()]`. The operation is its own inverse,
//! so [`encode`] and [`decode`] run the same keystream and differ only in
//! the text/byte conversion at either end.
//!
//! This is obfuscation, not encryption: a flipped frame bit flips exactly
//! the same decoded bit and nothing detects it.

use crate::error::CodecError;

/// Non-empty key bytes for the relay keystream.
#[derive(Clone, PartialEq, Eq)]
pub struct TransportKey(pub(crate) Vec<u8>);

impl TransportKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, CodecError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(CodecError::EmptyKey);
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for TransportKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TransportKey({} bytes)", self.0.len())
    }
}

/// XOR `data` in place with the repeating key.
pub fn apply_keystream(data: &mut [u8], key: &TransportKey) {
    let key = key.as_bytes();
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i % key.len()];
    }
}

/// Encode a text payload into a frame.
pub fn encode(message: &str, key: &TransportKey) -> Vec<u8> {
    let mut frame = message.as_bytes().to_vec();
    apply_keystream(&mut frame, key);
    frame
}

/// Decode a frame back into its text payload.
///
/// Fails only when the recovered bytes are not UTF-8, which for frames from
/// a peer using the same key means the frame was damaged or keyed
/// differently.
pub fn decode(frame: &[u8], key: &TransportKey) -> Result<String, CodecError> {
    let mut bytes = frame.to_vec();
    apply_keystream(&mut bytes, key);
    String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)
}
