//! [`PeerConnector`] backed by the `webrtc` crate.
//!
//! Each connector is a small actor: requests go down an unbounded channel
//! to a task that owns the `RTCPeerConnection` and runs them one at a time,
//! so `set_remote_description` always lands before the `create_answer` that
//! follows it. Results and engine callbacks are reported on the sink.

use std::sync::Arc;

use anyhow::{Result, bail};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use super::{
    ConnectorFactory, IceCandidate, PeerConnector, RtcEventKind, RtcEventSink, SessionDescription,
};

/// Label of the in-call text channel the offerer opens.
pub const CHAT_LABEL: &str = "chat";

type ChannelSlot = Arc<Mutex<Option<Arc<RTCDataChannel>>>>;

#[derive(Debug)]
enum PeerCommand {
    CreateOffer,
    CreateAnswer,
    SetLocal(SessionDescription),
    SetRemote(SessionDescription),
    AddCandidate(IceCandidate),
    SendText(String),
    Close,
}

/// Builds a [`WebRtcConnector`] per call, using the given STUN/TURN urls.
#[derive(Debug, Clone)]
pub struct WebRtcFactory {
    ice_servers: Vec<String>,
}

impl WebRtcFactory {
    pub fn new(ice_servers: Vec<String>) -> Self {
        Self { ice_servers }
    }
}

impl ConnectorFactory for WebRtcFactory {
    fn create(&self, sink: RtcEventSink) -> Box<dyn PeerConnector> {
        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_peer(self.ice_servers.clone(), sink, rx));
        Box::new(WebRtcConnector { commands })
    }
}

/// Handle to a peer connection actor.
pub struct WebRtcConnector {
    commands: mpsc::UnboundedSender<PeerCommand>,
}

impl WebRtcConnector {
    fn request(&self, cmd: PeerCommand) {
        if self.commands.send(cmd).is_err() {
            debug!("peer connection actor is gone");
        }
    }
}

impl PeerConnector for WebRtcConnector {
    fn create_offer(&mut self) {
        self.request(PeerCommand::CreateOffer);
    }

    fn create_answer(&mut self) {
        self.request(PeerCommand::CreateAnswer);
    }

    fn set_local_description(&mut self, desc: SessionDescription) {
        self.request(PeerCommand::SetLocal(desc));
    }

    fn set_remote_description(&mut self, desc: SessionDescription) {
        self.request(PeerCommand::SetRemote(desc));
    }

    fn add_candidate(&mut self, candidate: IceCandidate) {
        self.request(PeerCommand::AddCandidate(candidate));
    }

    fn send_text(&mut self, text: String) {
        self.request(PeerCommand::SendText(text));
    }

    fn close(&mut self) {
        self.request(PeerCommand::Close);
    }
}

async fn build_peer_connection(ice_servers: &[String]) -> Result<RTCPeerConnection> {
    let mut m = MediaEngine::default();
    m.register_default_codecs()?;

    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut m)?;

    let api = APIBuilder::new()
        .with_media_engine(m)
        .with_interceptor_registry(registry)
        .build();

    let config = RTCConfiguration {
        ice_servers: ice_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    };

    Ok(api.new_peer_connection(config).await?)
}

async fn run_peer(
    ice_servers: Vec<String>,
    sink: RtcEventSink,
    mut commands: mpsc::UnboundedReceiver<PeerCommand>,
) {
    let pc = match build_peer_connection(&ice_servers).await {
        Ok(pc) => Arc::new(pc),
        Err(e) => {
            warn!(epoch = sink.epoch(), error = %e, "failed to create peer connection");
            sink.emit(RtcEventKind::Failed(format!("peer connection setup: {e}")));
            return;
        }
    };
    let channel: ChannelSlot = Arc::new(Mutex::new(None));
    install_handlers(&pc, &sink, &channel);

    while let Some(cmd) = commands.recv().await {
        if matches!(cmd, PeerCommand::Close) {
            break;
        }
        if let Err(e) = execute(&pc, &sink, &channel, cmd).await {
            warn!(epoch = sink.epoch(), error = %e, "peer connection request failed");
            sink.emit(RtcEventKind::Failed(e.to_string()));
        }
    }

    if let Err(e) = pc.close().await {
        debug!(epoch = sink.epoch(), error = %e, "error closing peer connection");
    }
    debug!(epoch = sink.epoch(), "peer connection closed");
}

async fn execute(
    pc: &Arc<RTCPeerConnection>,
    sink: &RtcEventSink,
    channel: &ChannelSlot,
    cmd: PeerCommand,
) -> Result<()> {
    match cmd {
        PeerCommand::CreateOffer => {
            let mut slot = channel.lock().await;
            if slot.is_none() {
                let dc = pc.create_data_channel(CHAT_LABEL, None).await?;
                wire_data_channel(&dc, sink);
                *slot = Some(dc);
            }
            drop(slot);
            let offer = pc.create_offer(None).await?;
            sink.emit(RtcEventKind::OfferCreated(SessionDescription::new(
                "offer", offer.sdp,
            )));
        }
        PeerCommand::CreateAnswer => {
            let answer = pc.create_answer(None).await?;
            sink.emit(RtcEventKind::AnswerCreated(SessionDescription::new(
                "answer", answer.sdp,
            )));
        }
        PeerCommand::SetLocal(desc) => {
            pc.set_local_description(to_rtc_description(&desc)?).await?;
        }
        PeerCommand::SetRemote(desc) => {
            pc.set_remote_description(to_rtc_description(&desc)?).await?;
        }
        PeerCommand::AddCandidate(candidate) => {
            let init = to_candidate_init(&candidate)?;
            if init.candidate.is_empty() {
                // end-of-candidates marker
                return Ok(());
            }
            pc.add_ice_candidate(init).await?;
        }
        PeerCommand::SendText(text) => {
            let dc = channel.lock().await.clone();
            match dc {
                Some(dc) => {
                    dc.send_text(text).await?;
                }
                // not a negotiation failure; the call stays up
                None => warn!(epoch = sink.epoch(), "dropping chat text, data channel not open"),
            }
        }
        PeerCommand::Close => {}
    }
    Ok(())
}

fn install_handlers(pc: &Arc<RTCPeerConnection>, sink: &RtcEventSink, channel: &ChannelSlot) {
    let candidate_sink = sink.clone();
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let sink = candidate_sink.clone();
        Box::pin(async move {
            let Some(c) = candidate else {
                debug!(epoch = sink.epoch(), "ice gathering complete");
                return;
            };
            match c.to_json() {
                Ok(init) => match serde_json::to_value(&init) {
                    Ok(value) => {
                        sink.emit(RtcEventKind::CandidateDiscovered(IceCandidate(value)));
                    }
                    Err(e) => warn!(error = %e, "failed to serialize ice candidate"),
                },
                Err(e) => warn!(error = %e, "failed to convert ice candidate"),
            }
        })
    }));

    let state_sink = sink.clone();
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        let sink = state_sink.clone();
        Box::pin(async move {
            info!(epoch = sink.epoch(), ?state, "peer connection state");
            if state == RTCPeerConnectionState::Failed {
                sink.emit(RtcEventKind::Failed("peer connection failed".into()));
            }
        })
    }));

    let dc_sink = sink.clone();
    let dc_slot = channel.clone();
    pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
        let sink = dc_sink.clone();
        let slot = dc_slot.clone();
        Box::pin(async move {
            info!(epoch = sink.epoch(), label = %dc.label(), "received data channel");
            wire_data_channel(&dc, &sink);
            *slot.lock().await = Some(dc);
        })
    }));
}

fn wire_data_channel(dc: &Arc<RTCDataChannel>, sink: &RtcEventSink) {
    let open_sink = sink.clone();
    dc.on_open(Box::new(move || {
        Box::pin(async move {
            open_sink.emit(RtcEventKind::ChannelOpen);
        })
    }));

    let message_sink = sink.clone();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let sink = message_sink.clone();
        Box::pin(async move {
            match String::from_utf8(msg.data.to_vec()) {
                Ok(text) => {
                    sink.emit(RtcEventKind::Message(text));
                }
                Err(_) => warn!(epoch = sink.epoch(), "dropping non-text data channel message"),
            }
        })
    }));
}

fn to_rtc_description(desc: &SessionDescription) -> Result<RTCSessionDescription> {
    let Some(sdp) = desc.sdp() else {
        bail!("session description has no sdp");
    };
    let rtc = match desc.sdp_type() {
        Some("offer") => RTCSessionDescription::offer(sdp.to_string())?,
        Some("answer") => RTCSessionDescription::answer(sdp.to_string())?,
        other => bail!("unsupported session description type: {other:?}"),
    };
    Ok(rtc)
}

fn to_candidate_init(candidate: &IceCandidate) -> Result<RTCIceCandidateInit> {
    let value = &candidate.0;
    let Some(candidate_str) = value.get("candidate").and_then(|c| c.as_str()) else {
        bail!("ice candidate has no candidate line");
    };
    Ok(RTCIceCandidateInit {
        candidate: candidate_str.to_string(),
        sdp_mid: value
            .get("sdpMid")
            .and_then(|m| m.as_str())
            .map(|s| s.to_string()),
        sdp_mline_index: value
            .get("sdpMLineIndex")
            .and_then(|i| i.as_u64())
            .map(|i| i as u16),
        username_fragment: value
            .get("usernameFragment")
            .and_then(|u| u.as_str())
            .map(|s| s.to_string()),
    })
}
