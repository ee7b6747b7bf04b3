use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parley_codec::Identity;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use crate::call::{CallMachine, CallState, MachineLinks};
use crate::rtc::{
    ConnectorFactory, IceCandidate, PeerConnector, RtcEvent, RtcEventKind, RtcEventSink,
    SessionDescription,
};
use crate::signaling::{Envelope, EnvelopeKind, FrameCodec};
use crate::ui::UiEvent;

// =============================================================================
// Scripted peer connector
// =============================================================================

/// One request made of a [`ScriptedConnector`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectorCall {
    CreateOffer,
    CreateAnswer,
    SetLocal(SessionDescription),
    SetRemote(SessionDescription),
    AddCandidate(IceCandidate),
    SendText(String),
    Close,
}

/// Factory for connectors that record every request into one shared log.
///
/// With `auto_respond`, offers and answers complete immediately (followed
/// by one host candidate), which is enough to drive two clients through a
/// relay without a real RTC engine.
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    calls: Arc<Mutex<Vec<ConnectorCall>>>,
    auto_respond: bool,
    fail_on_create: bool,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_responding() -> Self {
        Self {
            auto_respond: true,
            ..Self::default()
        }
    }

    /// Every connector reports `Failed` as soon as it is built.
    pub fn failing() -> Self {
        Self {
            fail_on_create: true,
            ..Self::default()
        }
    }

    /// Drain the request log.
    pub fn take_calls(&self) -> Vec<ConnectorCall> {
        std::mem::take(&mut *self.calls.lock().expect("calls lock"))
    }
}

impl ConnectorFactory for ScriptedFactory {
    fn create(&self, sink: RtcEventSink) -> Box<dyn PeerConnector> {
        if self.fail_on_create {
            sink.emit(RtcEventKind::Failed("no usable transport".into()));
        }
        Box::new(ScriptedConnector {
            sink,
            calls: self.calls.clone(),
            auto_respond: self.auto_respond,
        })
    }
}

pub struct ScriptedConnector {
    sink: RtcEventSink,
    calls: Arc<Mutex<Vec<ConnectorCall>>>,
    auto_respond: bool,
}

impl ScriptedConnector {
    fn record(&self, call: ConnectorCall) {
        self.calls.lock().expect("calls lock").push(call);
    }

    fn complete(&self, kind: RtcEventKind) {
        if self.auto_respond {
            self.sink.emit(kind);
            self.sink
                .emit(RtcEventKind::CandidateDiscovered(scripted_candidate(self.sink.epoch())));
        }
    }
}

impl PeerConnector for ScriptedConnector {
    fn create_offer(&mut self) {
        self.record(ConnectorCall::CreateOffer);
        let sdp = format!("v=0 scripted offer {}", self.sink.epoch());
        self.complete(RtcEventKind::OfferCreated(SessionDescription::new("offer", sdp)));
    }

    fn create_answer(&mut self) {
        self.record(ConnectorCall::CreateAnswer);
        let sdp = format!("v=0 scripted answer {}", self.sink.epoch());
        self.complete(RtcEventKind::AnswerCreated(SessionDescription::new("answer", sdp)));
    }

    fn set_local_description(&mut self, desc: SessionDescription) {
        self.record(ConnectorCall::SetLocal(desc));
    }

    fn set_remote_description(&mut self, desc: SessionDescription) {
        self.record(ConnectorCall::SetRemote(desc));
    }

    fn add_candidate(&mut self, candidate: IceCandidate) {
        self.record(ConnectorCall::AddCandidate(candidate));
    }

    fn send_text(&mut self, text: String) {
        self.record(ConnectorCall::SendText(text));
    }

    fn close(&mut self) {
        self.record(ConnectorCall::Close);
    }
}

fn scripted_candidate(epoch: u64) -> IceCandidate {
    IceCandidate(serde_json::json!({
        "candidate": format!("candidate:{epoch} 1 udp 2130706431 127.0.0.1 9 typ host"),
        "sdpMid": "0",
        "sdpMLineIndex": 0,
    }))
}

// =============================================================================
// State machine harness
// =============================================================================

/// A [`CallMachine`] wired to in-memory queues and a scripted connector.
pub struct MachineHarness {
    pub machine: CallMachine,
    pub factory: ScriptedFactory,
    outbound_rx: mpsc::UnboundedReceiver<Envelope>,
    ui_rx: mpsc::UnboundedReceiver<UiEvent>,
    rtc_rx: mpsc::UnboundedReceiver<RtcEvent>,
}

impl MachineHarness {
    pub fn new() -> Self {
        Self::with_timeout(None)
    }

    pub fn with_timeout(negotiation_timeout: Option<Duration>) -> Self {
        Self::with_factory(ScriptedFactory::new(), negotiation_timeout)
    }

    pub fn with_factory(factory: ScriptedFactory, negotiation_timeout: Option<Duration>) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (ui, ui_rx) = mpsc::unbounded_channel();
        let (rtc, rtc_rx) = mpsc::unbounded_channel();
        let machine = CallMachine::new(
            Box::new(factory.clone()),
            MachineLinks { outbound, ui, rtc },
            negotiation_timeout,
        );
        Self {
            machine,
            factory,
            outbound_rx,
            ui_rx,
            rtc_rx,
        }
    }

    /// Channel up, awaiting a login name.
    pub fn connected() -> Self {
        let mut h = Self::new();
        h.machine.on_channel_connected();
        h.drain();
        h
    }

    pub fn logged_in(name: &str) -> Self {
        let mut h = Self::new();
        h.login(name);
        h
    }

    /// Logged in as `local` and in a call that `local` placed to `peer`.
    pub fn in_call_with(local: &str, peer: &str) -> Self {
        let mut h = Self::logged_in(local);
        h.machine.start_call(peer);
        h.rtc(RtcEventKind::OfferCreated(SessionDescription::new("offer", "v=0")));
        h.machine
            .handle_answer(SessionDescription::new("answer", "v=0"), None);
        h.drain();
        h
    }

    /// Connect (if needed) and complete a successful login.
    pub fn login(&mut self, name: &str) {
        if self.machine.state() == CallState::Disconnected {
            self.machine.on_channel_connected();
        }
        self.machine.submit_login(name);
        self.machine.handle_login(true);
        self.drain();
    }

    /// Deliver a connector event from the current connector.
    pub fn rtc(&mut self, kind: RtcEventKind) {
        let epoch = self.machine.session().epoch();
        self.machine.on_rtc_event(RtcEvent { epoch, kind });
    }

    /// Feed queued connector events back into the machine until none are
    /// left or `limit` have been delivered. Returns how many were delivered.
    pub fn pump_rtc(&mut self, limit: usize) -> usize {
        let mut delivered = 0;
        while delivered < limit {
            let Ok(event) = self.rtc_rx.try_recv() else {
                break;
            };
            self.machine.on_rtc_event(event);
            delivered += 1;
        }
        delivered
    }

    pub fn outbound(&mut self) -> Vec<Envelope> {
        drain_queue(&mut self.outbound_rx)
    }

    pub fn ui(&mut self) -> Vec<UiEvent> {
        drain_queue(&mut self.ui_rx)
    }

    pub fn calls(&mut self) -> Vec<ConnectorCall> {
        self.factory.take_calls()
    }

    fn drain(&mut self) {
        self.outbound();
        self.ui();
        self.calls();
    }
}

fn drain_queue<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut items = Vec::new();
    while let Ok(item) = rx.try_recv() {
        items.push(item);
    }
    items
}

// =============================================================================
// Loopback relay
// =============================================================================

#[derive(Default)]
struct RelayState {
    /// Login name → connection.
    clients: HashMap<String, RelayPeer>,
    raw_frames: Vec<Vec<u8>>,
    /// (sender login name, envelope) for every decodable inbound frame.
    received: Vec<(Option<String>, Envelope)>,
}

struct RelayPeer {
    codec: FrameCodec,
    tx: mpsc::UnboundedSender<Message>,
}

/// Minimal in-process relay speaking the client's wire format.
///
/// Login names are unique. Any other envelope is forwarded to the client
/// named in `name`, with `name` rewritten to the sender's login name.
pub struct LoopbackRelay {
    port: u16,
    state: Arc<Mutex<RelayState>>,
    task: tokio::task::JoinHandle<()>,
}

impl LoopbackRelay {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind relay");
        let port = listener.local_addr().expect("relay addr").port();
        let state = Arc::new(Mutex::new(RelayState::default()));

        let accept_state = state.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_client(stream, accept_state.clone()));
            }
        });

        Self { port, state, task }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Every inbound frame, as received.
    pub async fn raw_frames(&self) -> Vec<Vec<u8>> {
        self.state.lock().expect("relay lock").raw_frames.clone()
    }

    pub async fn received(&self) -> Vec<(Option<String>, Envelope)> {
        self.state.lock().expect("relay lock").received.clone()
    }

    /// Send an envelope to the client logged in as `name`.
    pub async fn inject(&self, name: &str, envelope: Envelope) {
        let state = self.state.lock().expect("relay lock");
        let peer = state.clients.get(name).expect("no such client");
        let frame = peer.codec.seal(&envelope).expect("seal");
        let _ = peer.tx.send(Message::Binary(frame.into()));
    }

    pub async fn inject_raw(&self, name: &str, frame: Vec<u8>) {
        let state = self.state.lock().expect("relay lock");
        let peer = state.clients.get(name).expect("no such client");
        let _ = peer.tx.send(Message::Binary(frame.into()));
    }

    /// Close the connection of the client logged in as `name`.
    pub async fn disconnect(&self, name: &str) {
        let peer = self.state.lock().expect("relay lock").clients.remove(name);
        if let Some(peer) = peer {
            let _ = peer.tx.send(Message::Close(None));
        }
    }
}

impl Drop for LoopbackRelay {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_client(stream: TcpStream, state: Arc<Mutex<RelayState>>) {
    let mut query = None;
    let handshake = tokio_tungstenite::accept_hdr_async(
        stream,
        |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            query = req.uri().query().map(str::to_string);
            Ok(resp)
        },
    )
    .await;
    let Ok(ws) = handshake else {
        return;
    };
    let Some(identity) = query
        .as_deref()
        .and_then(|q| q.strip_prefix("id="))
        .and_then(|id| Identity::parse(id).ok())
    else {
        return;
    };
    let codec = FrameCodec::for_identity(&identity);

    let (mut ws_write, mut ws_read) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_write.send(msg).await.is_err() || closing {
                break;
            }
        }
    });

    let mut login_name: Option<String> = None;
    while let Some(Ok(msg)) = ws_read.next().await {
        let Message::Binary(frame) = msg else {
            continue;
        };
        let mut relay = state.lock().expect("relay lock");
        relay.raw_frames.push(frame.to_vec());
        let Ok(envelope) = codec.open(&frame) else {
            continue;
        };
        relay.received.push((login_name.clone(), envelope.clone()));

        if envelope.kind == Some(EnvelopeKind::Login) {
            let Some(name) = envelope.name else { continue };
            let accepted = login_name.is_none() && !relay.clients.contains_key(&name);
            if accepted {
                relay.clients.insert(
                    name.clone(),
                    RelayPeer {
                        codec: codec.clone(),
                        tx: tx.clone(),
                    },
                );
                login_name = Some(name);
            }
            if let Ok(reply) = codec.seal(&Envelope::login_result(accepted)) {
                let _ = tx.send(Message::Binary(reply.into()));
            }
            continue;
        }

        let (Some(from), Some(target)) = (login_name.clone(), envelope.name.clone()) else {
            continue;
        };
        if let Some(peer) = relay.clients.get(&target) {
            let forwarded = envelope.with_name(from);
            if let Ok(frame) = peer.codec.seal(&forwarded) {
                let _ = peer.tx.send(Message::Binary(frame.into()));
            }
        }
    }

    if let Some(name) = login_name {
        state.lock().expect("relay lock").clients.remove(&name);
    }
}
