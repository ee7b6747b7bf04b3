//! Two clients, one loopback relay, scripted peer connectors.

use std::time::Duration;

use parley_codec::Identity;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{CallMachine, CallState, SessionSnapshot};
use crate::client::{Client, UserAction};
use crate::rtc::{IceCandidate, SessionDescription};
use crate::signaling::{Envelope, EnvelopeKind, FrameCodec, RelayConnection, relay_url};
use crate::test_helpers::{LoopbackRelay, ScriptedFactory};
use crate::ui::{EndReason, UiEvent};

const WAIT: Duration = Duration::from_secs(5);

struct TestClient {
    actions: mpsc::Sender<UserAction>,
    ui: mpsc::UnboundedReceiver<UiEvent>,
    task: JoinHandle<CallMachine>,
}

impl TestClient {
    async fn connect(relay: &LoopbackRelay) -> Self {
        let identity = Identity::generate();
        let conn = RelayConnection::connect(
            &relay_url("127.0.0.1", relay.port(), &identity),
            FrameCodec::for_identity(&identity),
        )
        .await
        .expect("connect to loopback relay");
        let (client, ui) = Client::new(Box::new(ScriptedFactory::auto_responding()), None);
        let (actions, rx) = mpsc::channel(16);
        let task = tokio::spawn(client.run(conn, rx));
        let mut c = Self { actions, ui, task };
        c.expect(|e| *e == UiEvent::Ready).await;
        c
    }

    async fn act(&self, action: UserAction) {
        self.actions.send(action).await.expect("client running");
    }

    async fn login(&mut self, name: &str) {
        self.act(UserAction::Login(name.into())).await;
        let name = name.to_string();
        self.expect(move |e| *e == UiEvent::LoggedIn { name: name.clone() })
            .await;
    }

    /// Wait for the first event matching `pred`, skipping others.
    async fn expect(&mut self, pred: impl Fn(&UiEvent) -> bool) -> UiEvent {
        tokio::time::timeout(WAIT, async {
            loop {
                match self.ui.recv().await {
                    Some(event) if pred(&event) => return event,
                    Some(_) => continue,
                    None => panic!("client stopped before expected event"),
                }
            }
        })
        .await
        .expect("timed out waiting for ui event")
    }

    async fn snapshot(&self) -> SessionSnapshot {
        let (respond_to, rx) = oneshot::channel();
        self.act(UserAction::Inspect { respond_to }).await;
        rx.await.expect("snapshot")
    }

    async fn quit(self) -> CallMachine {
        let _ = self.actions.send(UserAction::Quit).await;
        tokio::time::timeout(WAIT, self.task)
            .await
            .expect("client did not stop")
            .expect("client task")
    }
}

async fn connected_pair(relay: &LoopbackRelay) -> (TestClient, TestClient) {
    let mut alice = TestClient::connect(relay).await;
    let mut bob = TestClient::connect(relay).await;
    alice.login("alice").await;
    bob.login("bob").await;

    alice.act(UserAction::Call("bob".into())).await;
    bob.expect(|e| *e == UiEvent::IncomingCall { peer: "alice".into() })
        .await;
    bob.expect(|e| *e == UiEvent::CallConnected { peer: "alice".into() })
        .await;
    alice
        .expect(|e| *e == UiEvent::CallConnected { peer: "bob".into() })
        .await;
    (alice, bob)
}

#[tokio::test]
async fn call_reaches_in_call_on_both_sides() {
    let relay = LoopbackRelay::start().await;
    let (alice, bob) = connected_pair(&relay).await;

    let a = alice.snapshot().await;
    assert_eq!(a.state, CallState::InCall);
    assert_eq!(a.local_name.as_deref(), Some("alice"));
    assert_eq!(a.remote_peer.as_deref(), Some("bob"));

    let b = bob.snapshot().await;
    assert_eq!(b.state, CallState::InCall);
    assert_eq!(b.remote_peer.as_deref(), Some("alice"));

    // alice's offer reached the relay addressed to bob
    let received = relay.received().await;
    assert!(received.iter().any(|(from, env)| {
        from.as_deref() == Some("alice")
            && env.kind == Some(EnvelopeKind::Offer)
            && env.name.as_deref() == Some("bob")
    }));
    assert!(received.iter().any(|(from, env)| {
        from.as_deref() == Some("bob")
            && env.kind == Some(EnvelopeKind::Answer)
            && env.name.as_deref() == Some("alice")
    }));

    alice.quit().await;
    bob.quit().await;
}

#[tokio::test]
async fn duplicate_name_is_refused() {
    let relay = LoopbackRelay::start().await;
    let mut first = TestClient::connect(&relay).await;
    first.login("carl").await;

    let mut second = TestClient::connect(&relay).await;
    second.act(UserAction::Login("carl".into())).await;
    second
        .expect(|e| *e == UiEvent::LoginRejected { name: "carl".into() })
        .await;

    let snap = second.snapshot().await;
    assert_eq!(snap.state, CallState::Disconnected);
    assert_eq!(snap.local_name, None);

    // retry with a free name on the same connection
    second.login("carl2").await;
    assert_eq!(second.snapshot().await.state, CallState::Idle);

    first.quit().await;
    second.quit().await;
}

#[tokio::test]
async fn hang_up_reaches_the_peer_once() {
    let relay = LoopbackRelay::start().await;
    let (mut alice, mut bob) = connected_pair(&relay).await;

    alice.act(UserAction::HangUp).await;
    alice
        .expect(|e| {
            *e == UiEvent::CallEnded {
                peer: "bob".into(),
                reason: EndReason::LocalHangUp,
            }
        })
        .await;
    bob.expect(|e| {
        *e == UiEvent::CallEnded {
            peer: "alice".into(),
            reason: EndReason::RemoteHangUp,
        }
    })
    .await;

    assert_eq!(alice.snapshot().await.state, CallState::Idle);
    let b = bob.snapshot().await;
    assert_eq!(b.state, CallState::Idle);
    assert_eq!(b.remote_peer, None);

    let leaves: Vec<_> = relay
        .received()
        .await
        .into_iter()
        .filter(|(_, env)| env.kind == Some(EnvelopeKind::Leave))
        .collect();
    assert_eq!(leaves.len(), 1);
    assert_eq!(leaves[0].0.as_deref(), Some("alice"));
    assert_eq!(leaves[0].1.name.as_deref(), Some("bob"));

    // both can place a new call
    bob.act(UserAction::Call("alice".into())).await;
    alice
        .expect(|e| *e == UiEvent::IncomingCall { peer: "bob".into() })
        .await;

    alice.quit().await;
    bob.quit().await;
}

#[tokio::test]
async fn busy_client_refuses_second_caller() {
    let relay = LoopbackRelay::start().await;
    let (alice, bob) = connected_pair(&relay).await;
    let mut carol = TestClient::connect(&relay).await;
    carol.login("carol").await;

    carol.act(UserAction::Call("alice".into())).await;
    carol
        .expect(|e| {
            *e == UiEvent::CallEnded {
                peer: "alice".into(),
                reason: EndReason::RemoteHangUp,
            }
        })
        .await;

    // carol's late candidate and leave must not reach alice's call with bob
    let stray = IceCandidate(serde_json::json!({
        "candidate": "candidate:9 1 udp 1 192.0.2.9 9 typ host"
    }));
    relay
        .inject("alice", Envelope::candidate(stray).with_name("carol"))
        .await;
    relay.inject("alice", Envelope::leave().with_name("carol")).await;

    // alice refusing dave shows she has read everything injected before him
    let offer = Envelope::offer(SessionDescription::new("offer", "v=0")).with_name("dave");
    relay.inject("alice", offer).await;
    tokio::time::timeout(WAIT, async {
        loop {
            let refused = relay.received().await.iter().any(|(from, env)| {
                from.as_deref() == Some("alice")
                    && env.kind == Some(EnvelopeKind::Leave)
                    && env.name.as_deref() == Some("dave")
            });
            if refused {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("alice never refused dave");

    let a = alice.snapshot().await;
    assert_eq!(a.state, CallState::InCall);
    assert_eq!(a.remote_peer.as_deref(), Some("bob"));
    assert_eq!(bob.snapshot().await.state, CallState::InCall);

    alice.quit().await;
    bob.quit().await;
    carol.quit().await;
}

#[tokio::test]
async fn relay_loss_is_fatal() {
    let relay = LoopbackRelay::start().await;
    let mut alice = TestClient::connect(&relay).await;
    alice.login("alice").await;

    relay.disconnect("alice").await;
    alice
        .expect(|e| matches!(e, UiEvent::Failure(err) if err.is_fatal()))
        .await;
    let machine = tokio::time::timeout(WAIT, alice.task)
        .await
        .expect("client did not stop")
        .expect("client task");
    assert_eq!(machine.state(), CallState::Disconnected);
}

#[tokio::test]
async fn quitting_mid_call_sends_leave() {
    let relay = LoopbackRelay::start().await;
    let (alice, mut bob) = connected_pair(&relay).await;

    let machine = alice.quit().await;
    assert_eq!(machine.state(), CallState::Idle);
    bob.expect(|e| matches!(e, UiEvent::CallEnded { reason: EndReason::RemoteHangUp, .. }))
        .await;
    bob.quit().await;
}
