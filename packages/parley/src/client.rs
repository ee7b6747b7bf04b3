//! The client event loop.
//!
//! One task owns the [`CallMachine`] and feeds it, in arrival order, relay
//! events, user actions, connector events and the negotiation deadline.
//! After every input the envelopes the machine queued are written to the
//! relay before the next input is taken.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::call::{CallMachine, MachineLinks, SessionSnapshot};
use crate::error::SignalError;
use crate::rtc::{ConnectorFactory, RtcEvent};
use crate::signaling::channel::RelaySender;
use crate::signaling::{ChannelEvent, DispatchResult, Envelope, RelayConnection, dispatch};
use crate::ui::UiEvent;

/// Something the local user asked for.
#[derive(Debug)]
pub enum UserAction {
    Login(String),
    Call(String),
    HangUp,
    /// Chat text for the current peer.
    Send(String),
    Inspect {
        respond_to: oneshot::Sender<SessionSnapshot>,
    },
    /// Hang up if needed and close the relay connection.
    Quit,
}

pub struct Client {
    machine: CallMachine,
    outbound_rx: mpsc::UnboundedReceiver<Envelope>,
    rtc_rx: mpsc::UnboundedReceiver<RtcEvent>,
}

impl Client {
    /// Returns the client and the receiver for its UI notifications.
    pub fn new(
        factory: Box<dyn ConnectorFactory>,
        negotiation_timeout: Option<Duration>,
    ) -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (ui, ui_rx) = mpsc::unbounded_channel();
        let (rtc, rtc_rx) = mpsc::unbounded_channel();
        let machine = CallMachine::new(
            factory,
            MachineLinks { outbound, ui, rtc },
            negotiation_timeout,
        );
        (
            Self {
                machine,
                outbound_rx,
                rtc_rx,
            },
            ui_rx,
        )
    }

    /// Drive the session until the user quits or the relay goes away.
    /// Returns the machine in its final state.
    pub async fn run(
        mut self,
        relay: RelayConnection,
        mut actions: mpsc::Receiver<UserAction>,
    ) -> CallMachine {
        let (mut sender, mut receiver) = relay.split();
        self.machine.on_channel_connected();

        loop {
            let deadline = self.machine.negotiation_deadline();
            let timer = async move {
                match deadline {
                    Some((_, at)) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                event = receiver.next_event() => match event {
                    ChannelEvent::Envelope(envelope) => {
                        if let DispatchResult::Dropped(reason) = dispatch(&mut self.machine, envelope) {
                            debug!(%reason, "envelope not routed");
                        }
                    }
                    ChannelEvent::Dropped(e) => {
                        warn!(error = %e, code = e.error_code(), "dropping undecodable frame");
                    }
                    ChannelEvent::Closed { reason } => {
                        self.machine.on_channel_closed(&reason);
                        break;
                    }
                },

                action = actions.recv() => match action {
                    Some(UserAction::Quit) | None => {
                        info!("quitting");
                        self.machine.hang_up();
                        if let Err(e) = self.flush(&mut sender).await {
                            debug!(error = %e, "could not send final envelopes");
                        }
                        sender.close().await;
                        break;
                    }
                    Some(action) => self.apply(action),
                },

                Some(event) = self.rtc_rx.recv() => self.machine.on_rtc_event(event),

                _ = timer => {
                    if let Some((generation, _)) = deadline {
                        self.machine.on_negotiation_timeout(generation);
                    }
                }
            }

            if let Err(e) = self.flush(&mut sender).await {
                if e.is_fatal() {
                    self.machine.on_channel_closed(&e.to_string());
                    break;
                }
                warn!(error = %e, code = e.error_code(), "envelope not sent");
            }
        }

        self.machine
    }

    fn apply(&mut self, action: UserAction) {
        match action {
            UserAction::Login(name) => self.machine.submit_login(&name),
            UserAction::Call(peer) => self.machine.start_call(&peer),
            UserAction::HangUp => self.machine.hang_up(),
            UserAction::Send(text) => self.machine.send_text(text),
            UserAction::Inspect { respond_to } => {
                let _ = respond_to.send(self.machine.snapshot());
            }
            UserAction::Quit => {}
        }
    }

    /// Write every queued envelope to the relay.
    async fn flush(&mut self, sender: &mut RelaySender) -> Result<(), SignalError> {
        while let Ok(envelope) = self.outbound_rx.try_recv() {
            sender.send(&envelope).await?;
        }
        Ok(())
    }
}
