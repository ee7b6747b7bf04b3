use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// =============================================================================
// File config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
//   config.toml:     [relay]
//                    host = "relay.example.net"
//
//   env var:         PARLEY_RELAY__HOST=relay.example.net   (double underscore = nesting)

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub relay: RelayFileConfig,
    #[serde(default)]
    pub rtc: RtcFileConfig,
    #[serde(default)]
    pub client: ClientFileConfig,
}

/// Where the signaling relay lives (`[relay]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayFileConfig {
    #[serde(default = "default_relay_host")]
    pub host: String,
    #[serde(default = "default_relay_port")]
    pub port: u16,
}

impl Default for RelayFileConfig {
    fn default() -> Self {
        Self {
            host: default_relay_host(),
            port: default_relay_port(),
        }
    }
}

/// Peer transport tunables (`[rtc]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RtcFileConfig {
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<String>,
    /// Seconds an offer or answer may stay unanswered. 0 waits forever.
    #[serde(default = "default_negotiation_timeout_secs")]
    pub negotiation_timeout_secs: u64,
}

impl Default for RtcFileConfig {
    fn default() -> Self {
        Self {
            ice_servers: default_ice_servers(),
            negotiation_timeout_secs: default_negotiation_timeout_secs(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientFileConfig {
    /// Log in with this name as soon as the relay is up.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for ClientFileConfig {
    fn default() -> Self {
        Self {
            name: None,
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_relay_host() -> String {
    "localhost".to_string()
}
fn default_relay_port() -> u16 {
    9090
}
fn default_ice_servers() -> Vec<String> {
    vec!["stun:stun.l.google.com:19302".to_string()]
}
fn default_negotiation_timeout_secs() -> u64 {
    30
}
fn default_channel_capacity() -> usize {
    64
}

/// `<config_dir>/parley/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("parley").join("config.toml"))
}

/// Layer defaults → config.toml → `PARLEY_*` env vars.
///
/// A missing config file is not an error; figment skips it.
pub fn load_config(config_path: Option<&Path>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let mut figment = Figment::from(Serialized::defaults(FileConfig::default()));
    if let Some(path) = config_path.map(Path::to_path_buf).or_else(default_config_path) {
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(Env::prefixed("PARLEY_").split("__"))
}

// =============================================================================
// Runtime config
// =============================================================================

/// Resolved client configuration, after CLI overrides.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    pub relay_host: String,
    pub relay_port: u16,
    pub ice_servers: Vec<String>,
    pub negotiation_timeout: Option<Duration>,
    pub auto_login: Option<String>,
    pub channel_capacity: usize,
}

impl ClientConfig {
    pub fn from_file(fc: &FileConfig) -> Self {
        Self {
            relay_host: fc.relay.host.clone(),
            relay_port: fc.relay.port,
            ice_servers: fc.rtc.ice_servers.clone(),
            negotiation_timeout: match fc.rtc.negotiation_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            auto_login: fc.client.name.clone().filter(|n| !n.trim().is_empty()),
            channel_capacity: fc.client.channel_capacity.max(1),
        }
    }

    /// Extract and resolve a figment.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let fc: FileConfig = load_config(config_path)
            .extract()
            .context("invalid configuration")?;
        Ok(Self::from_file(&fc))
    }
}
