//! Relay envelope types.
//!
//! The post-decode wire shape is a flat JSON object:
//! `{"type": ..., "name"?, "success"?, "offer"?, "answer"?, "candidate"?}`.
//! No version, no message id, no integrity tag. Absent fields are omitted
//! on output.

use serde::{Deserialize, Serialize};

use crate::rtc::{IceCandidate, SessionDescription};

/// Envelope `type` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Login,
    Offer,
    Answer,
    Candidate,
    Leave,
    /// Any tag this client does not understand.
    #[serde(other)]
    Unknown,
}

impl EnvelopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Candidate => "candidate",
            Self::Leave => "leave",
            Self::Unknown => "unknown",
        }
    }
}

/// The unit exchanged with the relay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EnvelopeKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer: Option<SessionDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<SessionDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<IceCandidate>,
}

impl Envelope {
    fn of(kind: EnvelopeKind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    pub fn login(name: impl Into<String>) -> Self {
        Self::of(EnvelopeKind::Login).with_name(name)
    }

    pub fn offer(offer: SessionDescription) -> Self {
        Self {
            offer: Some(offer),
            ..Self::of(EnvelopeKind::Offer)
        }
    }

    pub fn answer(answer: SessionDescription) -> Self {
        Self {
            answer: Some(answer),
            ..Self::of(EnvelopeKind::Answer)
        }
    }

    pub fn candidate(candidate: IceCandidate) -> Self {
        Self {
            candidate: Some(candidate),
            ..Self::of(EnvelopeKind::Candidate)
        }
    }

    pub fn leave() -> Self {
        Self::of(EnvelopeKind::Leave)
    }

    /// Relay reply to a login attempt.
    pub fn login_result(success: bool) -> Self {
        Self {
            success: Some(success),
            ..Self::of(EnvelopeKind::Login)
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn kind_str(&self) -> &'static str {
        self.kind.map(|k| k.as_str()).unwrap_or("<missing>")
    }
}
