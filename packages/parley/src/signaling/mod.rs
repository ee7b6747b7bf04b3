//! Relay signaling: envelope types, the keyed connection, and dispatch.

pub mod channel;
pub mod dispatch;
pub mod protocol;

pub use channel::{ChannelEvent, FrameCodec, RelayConnection, relay_url};
pub use dispatch::{DispatchResult, dispatch};
pub use protocol::{Envelope, EnvelopeKind};
