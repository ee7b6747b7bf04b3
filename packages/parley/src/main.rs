use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;

mod call;
mod cli;
mod client;
mod config;
mod error;
mod rtc;
mod signaling;
mod ui;

#[cfg(test)]
mod test_helpers;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Peer-to-peer chat calls, signaled through a relay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to <config dir>/parley/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the relay and open the call console
    Connect(ConnectArgs),

    /// Decode a captured relay frame
    Inspect(InspectArgs),

    /// Print a freshly generated identity
    Identity,
}

#[derive(Parser)]
pub struct ConnectArgs {
    /// Relay host (overrides config)
    #[arg(long)]
    pub host: Option<String>,

    /// Relay port (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log in with this name once connected
    #[arg(short, long)]
    pub name: Option<String>,

    /// Call this peer right after logging in (requires a name)
    #[arg(long, requires = "name")]
    pub call: Option<String>,
}

#[derive(Parser)]
pub struct InspectArgs {
    /// Identity of the connection the frame was captured on
    #[arg(long)]
    pub id: String,

    /// Frame bytes as hex
    pub frame: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match cli.command {
        Commands::Connect(args) => cli::connect_command(cli.config.as_deref(), args).await,
        Commands::Inspect(args) => cli::inspect_command(&args.id, &args.frame),
        Commands::Identity => cli::identity_command(),
    }
}

/// Logs go to stderr so they never interleave with console output.
fn init_logging(debug: bool) {
    let default_directive = if debug {
        "parley=debug,webrtc=info,warn"
    } else {
        "parley=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}
