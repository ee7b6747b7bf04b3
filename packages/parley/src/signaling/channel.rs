//! The single WebSocket connection to the relay.
//!
//! Every envelope is serialized to JSON, run through the identity-keyed
//! keystream and sent as one binary frame. Inbound frames get the reverse.
//! Frames that do not decode to a well-formed envelope are reported as
//! [`ChannelEvent::Dropped`] and the connection carries on.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parley_codec::{Identity, TransportKey, cipher};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use super::protocol::Envelope;
use crate::error::SignalError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Relay URL for an identity. The identity travels in the clear.
/// The request path must be `/`: a bare `?id=` is not a valid request target.
pub fn relay_url(host: &str, port: u16, identity: &Identity) -> String {
    format!("ws://{host}:{port}/?id={identity}")
}

/// Envelope ⇄ frame conversion under one fixed key.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    key: TransportKey,
}

impl FrameCodec {
    pub fn new(key: TransportKey) -> Self {
        Self { key }
    }

    pub fn for_identity(identity: &Identity) -> Self {
        Self::new(identity.transport_key())
    }

    pub fn seal(&self, envelope: &Envelope) -> Result<Vec<u8>, SignalError> {
        let text = serde_json::to_string(envelope)
            .map_err(|e| SignalError::Protocol(format!("serialize envelope: {e}")))?;
        Ok(cipher::encode(&text, &self.key))
    }

    pub fn open(&self, frame: &[u8]) -> Result<Envelope, SignalError> {
        let text = cipher::decode(frame, &self.key).map_err(|e| SignalError::Protocol(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| SignalError::Protocol(format!("malformed envelope: {e}")))
    }
}

/// What the receive half observed.
#[derive(Debug)]
pub enum ChannelEvent {
    Envelope(Envelope),
    /// A frame that failed to decode or parse.
    Dropped(SignalError),
    Closed { reason: String },
}

/// An open relay connection.
pub struct RelayConnection {
    ws: WsStream,
    codec: FrameCodec,
}

impl RelayConnection {
    /// Open the connection. Returning `Ok` is the readiness signal; nothing
    /// is sent until the user logs in.
    pub async fn connect(url: &str, codec: FrameCodec) -> Result<Self, SignalError> {
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| SignalError::Channel(format!("connect {}: {e}", redact_query(url))))?;
        info!(relay = %redact_query(url), "connected to relay");
        Ok(Self { ws, codec })
    }

    pub fn split(self) -> (RelaySender, RelayReceiver) {
        let (write, read) = self.ws.split();
        (
            RelaySender {
                write,
                codec: self.codec.clone(),
            },
            RelayReceiver {
                read,
                codec: self.codec,
            },
        )
    }
}

/// Sending half of a relay connection.
pub struct RelaySender {
    write: SplitSink<WsStream, Message>,
    codec: FrameCodec,
}

impl RelaySender {
    pub async fn send(&mut self, envelope: &Envelope) -> Result<(), SignalError> {
        let frame = self.codec.seal(envelope)?;
        debug!(kind = envelope.kind_str(), bytes = frame.len(), "sending envelope");
        self.write
            .send(Message::Binary(frame.into()))
            .await
            .map_err(|e| SignalError::Channel(e.to_string()))
    }

    pub async fn close(&mut self) {
        let _ = self.write.close().await;
    }
}

/// Receiving half of a relay connection.
pub struct RelayReceiver {
    read: SplitStream<WsStream>,
    codec: FrameCodec,
}

impl RelayReceiver {
    /// Wait for the next envelope, dropped frame, or closure.
    pub async fn next_event(&mut self) -> ChannelEvent {
        loop {
            let frame = match self.read.next().await {
                Some(Ok(Message::Binary(bytes))) => bytes.to_vec(),
                // Some relays send text frames; the payload is the same bytes.
                Some(Ok(Message::Text(text))) => text.as_str().as_bytes().to_vec(),
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.as_str().to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "closed by relay".to_string());
                    return ChannelEvent::Closed { reason };
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return ChannelEvent::Closed {
                        reason: e.to_string(),
                    };
                }
                None => {
                    return ChannelEvent::Closed {
                        reason: "connection ended".to_string(),
                    };
                }
            };

            return match self.codec.open(&frame) {
                Ok(envelope) => ChannelEvent::Envelope(envelope),
                Err(e) => ChannelEvent::Dropped(e),
            };
        }
    }
}

/// The relay URL without its `?id=` query, for logs.
fn redact_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}
