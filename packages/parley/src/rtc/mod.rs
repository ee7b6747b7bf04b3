//! Seam to the peer transport engine.
//!
//! The call state machine never talks to an RTC engine directly. It issues
//! fire-and-forget requests through [`PeerConnector`] and receives every
//! completion (offer ready, candidate found, data channel message, failure)
//! later as an [`RtcEvent`] on the same queue as relay traffic and user
//! actions.
//!
//! Session descriptions and candidates are opaque JSON: the client forwards
//! them between the engine and the relay without looking inside.

pub mod webrtc_peer;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub use webrtc_peer::WebRtcFactory;

/// Opaque session description (`{"type": "offer"|"answer", "sdp": ...}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionDescription(pub serde_json::Value);

impl SessionDescription {
    pub fn new(sdp_type: &str, sdp: impl Into<String>) -> Self {
        Self(serde_json::json!({ "type": sdp_type, "sdp": sdp.into() }))
    }

    pub fn sdp_type(&self) -> Option<&str> {
        self.0.get("type").and_then(|v| v.as_str())
    }

    pub fn sdp(&self) -> Option<&str> {
        self.0.get("sdp").and_then(|v| v.as_str())
    }
}

/// Opaque network-path candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IceCandidate(pub serde_json::Value);

/// Completion or notification from a connector.
#[derive(Debug, Clone, PartialEq)]
pub enum RtcEventKind {
    OfferCreated(SessionDescription),
    AnswerCreated(SessionDescription),
    CandidateDiscovered(IceCandidate),
    /// The in-call data stream is open.
    ChannelOpen,
    /// Text received on the in-call data stream.
    Message(String),
    Failed(String),
}

/// An event tagged with the epoch of the connector that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RtcEvent {
    pub epoch: u64,
    pub kind: RtcEventKind,
}

/// Where a connector reports its events.
#[derive(Debug, Clone)]
pub struct RtcEventSink {
    epoch: u64,
    tx: mpsc::UnboundedSender<RtcEvent>,
}

impl RtcEventSink {
    pub fn new(epoch: u64, tx: mpsc::UnboundedSender<RtcEvent>) -> Self {
        Self { epoch, tx }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns false once the event loop is gone.
    pub fn emit(&self, kind: RtcEventKind) -> bool {
        self.tx
            .send(RtcEvent {
                epoch: self.epoch,
                kind,
            })
            .is_ok()
    }
}

/// Requests the call state machine makes of the peer transport.
///
/// None of these block or return results; outcomes arrive as events on the
/// connector's [`RtcEventSink`]. Implementations must execute requests in
/// the order they were made.
pub trait PeerConnector: Send {
    fn create_offer(&mut self);
    fn create_answer(&mut self);
    fn set_local_description(&mut self, desc: SessionDescription);
    fn set_remote_description(&mut self, desc: SessionDescription);
    fn add_candidate(&mut self, candidate: IceCandidate);
    /// Send text on the in-call data stream (outside the relay codec).
    fn send_text(&mut self, text: String);
    fn close(&mut self);
}

/// Builds a fresh connector for each call lifetime.
pub trait ConnectorFactory: Send {
    fn create(&self, sink: RtcEventSink) -> Box<dyn PeerConnector>;
}
