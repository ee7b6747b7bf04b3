//! Call state machine.
//!
//! ```text
//! Disconnected ─connected─▶ Authenticating ─login ok─▶ Idle
//!       ▲                        │ login refused           │
//!       └────────────────────────┘                         │
//!                   Idle ─call─▶ Offering ─answer─▶ InCall │
//!                   Idle ─offer─▶ Answering ─answer ready─▶ InCall
//!        Offering / Answering / InCall ─hang up, leave─▶ Idle
//! ```
//!
//! Every input (relay envelope, user action, connector event, deadline) is
//! one method call, made from a single event loop. A trigger that is not
//! valid in the current state is logged and ignored. Outbound envelopes and
//! UI notifications go out on unbounded channels so handlers never block.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::session::{CallState, Session};
use crate::error::SignalError;
use crate::rtc::{
    ConnectorFactory, IceCandidate, PeerConnector, RtcEvent, RtcEventKind, SessionDescription,
};
use crate::signaling::{Envelope, EnvelopeKind};
use crate::ui::{EndReason, UiEvent};

/// Channels the machine writes to.
pub struct MachineLinks {
    pub outbound: mpsc::UnboundedSender<Envelope>,
    pub ui: mpsc::UnboundedSender<UiEvent>,
    pub rtc: mpsc::UnboundedSender<RtcEvent>,
}

/// Point-in-time view of the machine, for status output and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: CallState,
    pub local_name: Option<String>,
    pub remote_peer: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Deadline {
    generation: u64,
    at: Instant,
}

pub struct CallMachine {
    state: CallState,
    session: Session,
    channel_open: bool,
    factory: Box<dyn ConnectorFactory>,
    links: MachineLinks,
    negotiation_timeout: Option<Duration>,
    generation: u64,
    deadline: Option<Deadline>,
}

impl CallMachine {
    /// `negotiation_timeout` bounds Offering/Answering; `None` waits forever.
    pub fn new(
        factory: Box<dyn ConnectorFactory>,
        links: MachineLinks,
        negotiation_timeout: Option<Duration>,
    ) -> Self {
        Self {
            state: CallState::Disconnected,
            session: Session::new(),
            channel_open: false,
            factory,
            links,
            negotiation_timeout,
            generation: 0,
            deadline: None,
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            local_name: self.session.local_name().map(str::to_string),
            remote_peer: self.session.remote_peer().map(str::to_string),
        }
    }

    /// The armed negotiation deadline as `(generation, instant)`.
    pub fn negotiation_deadline(&self) -> Option<(u64, Instant)> {
        self.deadline.map(|d| (d.generation, d.at))
    }

    // --- relay channel ---

    pub fn on_channel_connected(&mut self) {
        if self.state != CallState::Disconnected || self.channel_open {
            debug!(state = ?self.state, "ignoring duplicate channel connected");
            return;
        }
        self.channel_open = true;
        self.transition(CallState::Authenticating);
        self.notify(UiEvent::Ready);
    }

    /// The relay connection is gone. The client cannot continue.
    pub fn on_channel_closed(&mut self, reason: &str) {
        if !self.channel_open && self.state == CallState::Disconnected {
            return;
        }
        error!(%reason, state = ?self.state, "relay channel closed");
        self.channel_open = false;
        self.deadline = None;
        self.session.take_remote_peer();
        self.session.clear_pending_name();
        self.session.close_connector();
        self.transition(CallState::Disconnected);
        self.notify(UiEvent::Failure(SignalError::Channel(reason.to_string())));
    }

    // --- user actions ---

    /// Submit a login name. Empty names are rejected without sending, and
    /// only one login may be awaiting a reply.
    pub fn submit_login(&mut self, name: &str) {
        let can_login = self.state == CallState::Authenticating
            || (self.state == CallState::Disconnected && self.channel_open);
        if !can_login {
            debug!(state = ?self.state, "ignoring login outside pre-login states");
            return;
        }
        if let Some(pending) = self.session.pending_name() {
            debug!(pending, "ignoring login while another is awaiting a reply");
            return;
        }
        let name = name.trim();
        if name.is_empty() {
            self.notify(UiEvent::Failure(SignalError::EmptyName));
            return;
        }
        info!(name, "logging in");
        self.session.set_pending_name(name.to_string());
        self.transition(CallState::Authenticating);
        self.send(Envelope::login(name));
    }

    /// Call `target`.
    pub fn start_call(&mut self, target: &str) {
        if self.state != CallState::Idle {
            debug!(state = ?self.state, "ignoring call outside idle");
            return;
        }
        let target = target.trim();
        if target.is_empty() || Some(target) == self.session.local_name() {
            self.notify(UiEvent::Failure(SignalError::InvalidTarget(target.to_string())));
            return;
        }
        info!(peer = target, "starting call");
        self.session.set_remote_peer(target.to_string());
        self.ensure_connector();
        if let Some(connector) = self.session.connector_mut() {
            connector.create_offer();
        }
        self.transition(CallState::Offering);
        self.arm_deadline();
        self.notify(UiEvent::Calling {
            peer: target.to_string(),
        });
    }

    /// Hang up. A no-op outside a call, so repeated hang-ups send one `leave`.
    pub fn hang_up(&mut self) {
        if !self.state.in_call_flow() {
            debug!(state = ?self.state, "hang up with no call");
            return;
        }
        self.end_call(true, EndReason::LocalHangUp);
    }

    /// Send chat text over the peer data stream.
    pub fn send_text(&mut self, text: String) {
        if self.state != CallState::InCall {
            self.notify(UiEvent::Failure(SignalError::NotInCall));
            return;
        }
        if let Some(connector) = self.session.connector_mut() {
            connector.send_text(text);
        }
    }

    // --- relay envelopes ---

    pub fn handle_login(&mut self, success: bool) {
        if self.state != CallState::Authenticating || self.session.pending_name().is_none() {
            debug!(state = ?self.state, success, "ignoring unsolicited login reply");
            return;
        }
        if success {
            let name = self.session.commit_name().unwrap_or_default().to_string();
            info!(name = %name, "logged in");
            self.session
                .replace_connector(self.factory.as_ref(), &self.links.rtc);
            self.transition(CallState::Idle);
            self.notify(UiEvent::LoggedIn { name });
        } else {
            let name = self.session.pending_name().unwrap_or_default().to_string();
            warn!(name = %name, "login refused, name taken");
            self.session.clear_pending_name();
            self.transition(CallState::Disconnected);
            self.notify(UiEvent::LoginRejected { name });
        }
    }

    pub fn handle_offer(&mut self, offer: SessionDescription, from: String) {
        match self.state {
            CallState::Idle => {
                info!(peer = %from, "incoming call");
                self.session.set_remote_peer(from.clone());
                self.ensure_connector();
                self.answer_offer(offer, from);
            }
            CallState::Offering
                if self.session.remote_peer() == Some(from.as_str())
                    && self.yields_to(&from) =>
            {
                // Both sides called each other; the smaller name answers.
                info!(peer = %from, "crossed offers, answering instead");
                self.session
                    .replace_connector(self.factory.as_ref(), &self.links.rtc);
                self.answer_offer(offer, from);
            }
            state if state.in_call_flow() => {
                if self.session.remote_peer() == Some(from.as_str()) {
                    debug!(peer = %from, "ignoring repeated offer");
                } else {
                    info!(peer = %from, "busy, refusing offer");
                    self.send(Envelope::leave().with_name(from));
                }
            }
            state => debug!(?state, peer = %from, "ignoring offer before login"),
        }
    }

    pub fn handle_answer(&mut self, answer: SessionDescription, from: Option<&str>) {
        if self.state != CallState::Offering || !self.from_remote_peer(from) {
            debug!(state = ?self.state, ?from, "ignoring answer");
            return;
        }
        if let Some(connector) = self.session.connector_mut() {
            connector.set_remote_description(answer);
        }
        self.enter_call();
    }

    pub fn handle_candidate(&mut self, candidate: IceCandidate, from: Option<&str>) {
        if !self.state.in_call_flow() || !self.from_remote_peer(from) {
            debug!(state = ?self.state, ?from, "ignoring candidate");
            return;
        }
        if let Some(connector) = self.session.connector_mut() {
            connector.add_candidate(candidate);
        }
    }

    /// Remote hang-up. Never answered with our own `leave`, and ignored
    /// unless it comes from the current peer.
    pub fn handle_leave(&mut self, from: Option<&str>) {
        if !self.state.in_call_flow() {
            debug!(state = ?self.state, "leave with no call");
            return;
        }
        if !self.from_remote_peer(from) {
            debug!(?from, peer = ?self.session.remote_peer(), "ignoring leave from another user");
            return;
        }
        self.end_call(false, EndReason::RemoteHangUp);
    }

    // --- connector events ---

    pub fn on_rtc_event(&mut self, event: RtcEvent) {
        if event.epoch != self.session.epoch() || !self.session.has_connector() {
            debug!(epoch = event.epoch, "dropping event from stale connector");
            return;
        }
        match event.kind {
            RtcEventKind::OfferCreated(offer) if self.state == CallState::Offering => {
                self.send(Envelope::offer(offer.clone()));
                if let Some(connector) = self.session.connector_mut() {
                    connector.set_local_description(offer);
                }
            }
            RtcEventKind::AnswerCreated(answer) if self.state == CallState::Answering => {
                self.send(Envelope::answer(answer.clone()));
                if let Some(connector) = self.session.connector_mut() {
                    connector.set_local_description(answer);
                }
                self.enter_call();
            }
            RtcEventKind::CandidateDiscovered(candidate) if self.state.in_call_flow() => {
                self.send(Envelope::candidate(candidate));
            }
            RtcEventKind::ChannelOpen if self.state.in_call_flow() => {
                if let Some(peer) = self.session.remote_peer() {
                    let peer = peer.to_string();
                    self.notify(UiEvent::DataChannelOpen { peer });
                }
            }
            RtcEventKind::Message(text) if self.state.in_call_flow() => {
                let from = self.session.remote_peer().unwrap_or_default().to_string();
                self.notify(UiEvent::ChatMessage { from, text });
            }
            RtcEventKind::Failed(reason) => self.on_negotiation_failed(reason),
            kind => debug!(state = ?self.state, ?kind, "ignoring connector event"),
        }
    }

    /// The armed deadline fired. Stale generations are ignored.
    pub fn on_negotiation_timeout(&mut self, generation: u64) {
        let Some(deadline) = self.deadline else {
            return;
        };
        if deadline.generation != generation || !self.state.is_negotiating() {
            return;
        }
        let peer = self.session.remote_peer().unwrap_or_default().to_string();
        warn!(peer = %peer, "negotiation timed out");
        self.notify(UiEvent::Failure(SignalError::NegotiationTimeout { peer }));
        self.end_call(true, EndReason::Aborted);
    }

    fn on_negotiation_failed(&mut self, reason: String) {
        warn!(state = ?self.state, %reason, "peer connector failed");
        self.notify(UiEvent::Failure(SignalError::Negotiation(reason)));
        if self.state.in_call_flow() {
            self.end_call(true, EndReason::Aborted);
        } else {
            // rebuilt on the next call or offer
            self.session.close_connector();
        }
    }

    // --- helpers ---

    fn answer_offer(&mut self, offer: SessionDescription, from: String) {
        if let Some(connector) = self.session.connector_mut() {
            connector.set_remote_description(offer);
            connector.create_answer();
        }
        self.transition(CallState::Answering);
        self.arm_deadline();
        self.notify(UiEvent::IncomingCall { peer: from });
    }

    /// A connector closed after an idle failure is rebuilt on demand.
    fn ensure_connector(&mut self) {
        if !self.session.has_connector() {
            self.session
                .replace_connector(self.factory.as_ref(), &self.links.rtc);
        }
    }

    /// Envelopes without a sender name are taken as the current peer's.
    fn from_remote_peer(&self, from: Option<&str>) -> bool {
        from.is_none_or(|name| self.session.remote_peer() == Some(name))
    }

    /// Whether we give up our own offer when offers cross with `peer`.
    fn yields_to(&self, peer: &str) -> bool {
        self.session.local_name().is_some_and(|local| local < peer)
    }

    fn enter_call(&mut self) {
        self.deadline = None;
        self.transition(CallState::InCall);
        if let Some(peer) = self.session.remote_peer() {
            let peer = peer.to_string();
            info!(peer = %peer, "call connected");
            self.notify(UiEvent::CallConnected { peer });
        }
    }

    /// Tear the call down to Idle with a fresh connector.
    fn end_call(&mut self, send_leave: bool, reason: EndReason) {
        if send_leave {
            // stamped with the peer before it is cleared
            self.send(Envelope::leave());
        }
        let peer = self.session.take_remote_peer().unwrap_or_default();
        info!(peer = %peer, ?reason, "call ended");
        self.deadline = None;
        self.session
            .replace_connector(self.factory.as_ref(), &self.links.rtc);
        self.transition(CallState::Idle);
        self.notify(UiEvent::CallEnded { peer, reason });
    }

    fn arm_deadline(&mut self) {
        self.generation += 1;
        self.deadline = self.negotiation_timeout.map(|timeout| Deadline {
            generation: self.generation,
            at: Instant::now() + timeout,
        });
    }

    fn transition(&mut self, to: CallState) {
        if self.state != to {
            debug!(from = ?self.state, to = ?to, "call state transition");
            self.state = to;
        }
    }

    /// Queue an envelope for the relay. Non-login envelopes without an
    /// explicit `name` are addressed to the current remote peer.
    fn send(&self, mut envelope: Envelope) {
        if envelope.kind != Some(EnvelopeKind::Login) && envelope.name.is_none() {
            envelope.name = self.session.remote_peer().map(str::to_string);
        }
        if self.links.outbound.send(envelope).is_err() {
            debug!("outbound queue closed");
        }
    }

    fn notify(&self, event: UiEvent) {
        let _ = self.links.ui.send(event);
    }
}
