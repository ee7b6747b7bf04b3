pub mod console;

use std::path::Path;

use anyhow::{Context, Result};
use parley_codec::{Identity, cipher, encoding};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::ConnectArgs;
use crate::call::CallState;
use crate::client::{Client, UserAction};
use crate::config::ClientConfig;
use crate::rtc::WebRtcFactory;
use crate::signaling::{FrameCodec, RelayConnection, relay_url};
use crate::ui::{self, UiEvent};
use console::ConsoleCommand;

/// `parley connect`: open the relay connection and run the call console.
pub async fn connect_command(config_path: Option<&Path>, args: ConnectArgs) -> Result<()> {
    let mut config = ClientConfig::load(config_path)?;
    if let Some(host) = args.host {
        config.relay_host = host;
    }
    if let Some(port) = args.port {
        config.relay_port = port;
    }
    if args.name.is_some() {
        config.auto_login = args.name;
    }

    let identity = Identity::generate();
    debug!(identity = %identity, "generated connection identity");
    let url = relay_url(&config.relay_host, config.relay_port, &identity);
    let relay = RelayConnection::connect(&url, FrameCodec::for_identity(&identity))
        .await
        .context("could not reach the relay")?;

    let factory = WebRtcFactory::new(config.ice_servers.clone());
    let (client, mut ui_rx) = Client::new(Box::new(factory), config.negotiation_timeout);
    let (action_tx, action_rx) = mpsc::channel::<UserAction>(config.channel_capacity);
    let mut client_task = tokio::spawn(client.run(relay, action_rx));

    // Blocking stdin reader; lines are parsed on the async side.
    let (line_tx, mut line_rx) = mpsc::channel::<String>(config.channel_capacity);
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if line_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    let mut pending_call = args.call;
    let mut stdin_open = true;
    let mut quitting = false;

    let machine = loop {
        tokio::select! {
            Some(event) = ui_rx.recv() => {
                println!("{}", ui::render(&event));
                match event {
                    UiEvent::Ready => {
                        if let Some(name) = config.auto_login.clone() {
                            let _ = action_tx.send(UserAction::Login(name)).await;
                        }
                    }
                    UiEvent::LoggedIn { .. } => {
                        if let Some(peer) = pending_call.take() {
                            let _ = action_tx.send(UserAction::Call(peer)).await;
                        }
                    }
                    _ => {}
                }
            }

            line = line_rx.recv(), if stdin_open => {
                let Some(line) = line else {
                    debug!("stdin closed");
                    stdin_open = false;
                    quitting = true;
                    let _ = action_tx.send(UserAction::Quit).await;
                    continue;
                };
                let action = match console::parse_line(&line) {
                    ConsoleCommand::Login(name) => UserAction::Login(name),
                    ConsoleCommand::Call(peer) => UserAction::Call(peer),
                    ConsoleCommand::HangUp => UserAction::HangUp,
                    ConsoleCommand::Say(text) => UserAction::Send(text),
                    ConsoleCommand::Quit => {
                        quitting = true;
                        UserAction::Quit
                    }
                    ConsoleCommand::Status => {
                        let (respond_to, rx) = oneshot::channel();
                        if action_tx.send(UserAction::Inspect { respond_to }).await.is_ok() {
                            if let Ok(snapshot) = rx.await {
                                println!("{}", render_status(&snapshot));
                            }
                        }
                        continue;
                    }
                    ConsoleCommand::Help => {
                        println!("{}", console::HELP);
                        continue;
                    }
                    ConsoleCommand::Unknown(verb) => {
                        println!("[parley: unknown command /{verb}, try /help]");
                        continue;
                    }
                    ConsoleCommand::Empty => continue,
                };
                let _ = action_tx.send(action).await;
            }

            result = &mut client_task => break result.context("client task failed")?,
        }
    };

    while let Ok(event) = ui_rx.try_recv() {
        println!("{}", ui::render(&event));
    }

    if !quitting && machine.state() == CallState::Disconnected {
        anyhow::bail!("relay connection lost");
    }
    info!("session ended");
    Ok(())
}

fn render_status(snapshot: &crate::call::SessionSnapshot) -> String {
    let name = snapshot.local_name.as_deref().unwrap_or("(not signed in)");
    match snapshot.remote_peer.as_deref() {
        Some(peer) => format!("[parley: {name}, {:?} with {peer}]", snapshot.state),
        None => format!("[parley: {name}, {:?}]", snapshot.state),
    }
}

/// `parley inspect`: decode a captured frame with the identity it was sent under.
pub fn inspect_command(id: &str, frame_hex: &str) -> Result<()> {
    let identity = Identity::parse(id)?;
    let frame = encoding::from_hex(frame_hex)?;
    let text = cipher::decode(&frame, &identity.transport_key())
        .context("frame does not decode under this identity")?;

    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => {
            eprintln!("[parley: decoded text is not JSON]");
            println!("{text}");
        }
    }
    Ok(())
}

/// `parley identity`: print a new connection identity.
pub fn identity_command() -> Result<()> {
    println!("{}", Identity::generate());
    Ok(())
}
