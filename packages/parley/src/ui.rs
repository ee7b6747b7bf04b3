//! One-way notifications from the call state machine to whatever renders
//! them, plus the console renderer the binary uses.

use crate::error::SignalError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    LocalHangUp,
    RemoteHangUp,
    /// Negotiation failed or timed out.
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// Connected to the relay; a name can be submitted.
    Ready,
    LoggedIn { name: String },
    LoginRejected { name: String },
    Calling { peer: String },
    IncomingCall { peer: String },
    CallConnected { peer: String },
    DataChannelOpen { peer: String },
    CallEnded { peer: String, reason: EndReason },
    /// Text received from the peer over the in-call data stream.
    ChatMessage { from: String, text: String },
    Failure(SignalError),
}

/// Console line for an event.
pub fn render(event: &UiEvent) -> String {
    match event {
        UiEvent::Ready => "[parley: connected to relay, /login <name> to sign in]".to_string(),
        UiEvent::LoggedIn { name } => {
            format!("[parley: signed in as {name}, /call <name> to start a call]")
        }
        UiEvent::LoginRejected { name } => {
            let err = SignalError::IdentityCollision { name: name.clone() };
            format!("[parley: {err}, {}]", err.hint())
        }
        UiEvent::Calling { peer } => format!("[parley: calling {peer}...]"),
        UiEvent::IncomingCall { peer } => format!("[parley: incoming call from {peer}]"),
        UiEvent::CallConnected { peer } => format!("[parley: in call with {peer}]"),
        UiEvent::DataChannelOpen { peer } => format!("[parley: chat with {peer} is open]"),
        UiEvent::CallEnded { peer, reason } => match reason {
            EndReason::LocalHangUp => format!("[parley: hung up on {peer}]"),
            EndReason::RemoteHangUp => format!("[parley: {peer} left the call]"),
            EndReason::Aborted => format!("[parley: call with {peer} aborted]"),
        },
        UiEvent::ChatMessage { from, text } => format!("{from}: {text}"),
        UiEvent::Failure(err) => format!("[parley: {err} ({})]", err.hint()),
    }
}
