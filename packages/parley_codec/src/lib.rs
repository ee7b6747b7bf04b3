//! Session identity and relay frame obfuscation for Parley.
//!
//! Every control message a Parley client exchanges with its relay passes
//! through [`cipher`] keyed by the client's [`Identity`]. The scheme is a
//! repeating-key XOR: it keeps payloads away from casual inspection and
//! nothing more. It has no integrity protection, and a short key reused
//! across many frames falls to frequency analysis. Both peers and the relay
//! must agree on it, so the wire behavior is kept as is.

pub mod cipher;
pub mod encoding;
pub mod error;
pub mod identity;

pub use cipher::{TransportKey, decode, encode};
pub use error::CodecError;
pub use identity::Identity;
