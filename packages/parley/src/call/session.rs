//! Per-process session state, owned by the call state machine.

use tokio::sync::mpsc;
use tracing::debug;

use crate::rtc::{ConnectorFactory, PeerConnector, RtcEvent, RtcEventSink};

/// Call lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Disconnected,
    Authenticating,
    Idle,
    Offering,
    Answering,
    InCall,
}

impl CallState {
    /// Offering, Answering, or InCall.
    pub fn in_call_flow(self) -> bool {
        matches!(self, Self::Offering | Self::Answering | Self::InCall)
    }

    pub fn is_negotiating(self) -> bool {
        matches!(self, Self::Offering | Self::Answering)
    }
}

/// Who we are, who we are talking to, and the active peer connector.
#[derive(Default)]
pub struct Session {
    local_name: Option<String>,
    pending_name: Option<String>,
    remote_peer: Option<String>,
    connector: Option<Box<dyn PeerConnector>>,
    epoch: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    pub fn remote_peer(&self) -> Option<&str> {
        self.remote_peer.as_deref()
    }

    pub fn pending_name(&self) -> Option<&str> {
        self.pending_name.as_deref()
    }

    /// Epoch of the current connector; events from older ones are stale.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn has_connector(&self) -> bool {
        self.connector.is_some()
    }

    pub(crate) fn set_pending_name(&mut self, name: String) {
        self.pending_name = Some(name);
    }

    pub(crate) fn clear_pending_name(&mut self) {
        self.pending_name = None;
    }

    /// Make the pending login name permanent. Has no effect once a name is
    /// committed.
    pub(crate) fn commit_name(&mut self) -> Option<&str> {
        if self.local_name.is_none() {
            self.local_name = self.pending_name.take();
        }
        self.pending_name = None;
        self.local_name.as_deref()
    }

    pub(crate) fn set_remote_peer(&mut self, peer: String) {
        self.remote_peer = Some(peer);
    }

    pub(crate) fn take_remote_peer(&mut self) -> Option<String> {
        self.remote_peer.take()
    }

    pub(crate) fn connector_mut(&mut self) -> Option<&mut (dyn PeerConnector + 'static)> {
        self.connector.as_deref_mut()
    }

    /// Close the current connector (if any) and build a fresh one.
    pub(crate) fn replace_connector(
        &mut self,
        factory: &dyn ConnectorFactory,
        events: &mpsc::UnboundedSender<RtcEvent>,
    ) {
        self.close_connector();
        self.epoch += 1;
        debug!(epoch = self.epoch, "creating peer connector");
        let sink = RtcEventSink::new(self.epoch, events.clone());
        self.connector = Some(factory.create(sink));
    }

    pub(crate) fn close_connector(&mut self) {
        if let Some(mut connector) = self.connector.take() {
            debug!(epoch = self.epoch, "closing peer connector");
            connector.close();
        }
    }
}
