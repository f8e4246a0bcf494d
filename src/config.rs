//! Proxy configuration.
//!
//! Loaded once from a TOML file at startup; immutable afterwards. Schema
//! migration from older layouts is deliberately not handled here.

use serde::Deserialize;
use std::{collections::HashMap, path::Path, time::Duration};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("'{list}' references unknown server '{name}'")]
    UnknownServer { list: String, name: String },
    #[error("forwarding mode {0:?} requires a non-empty secret (set forwarding.secret or VELOCITY_FORWARDING_SECRET)")]
    MissingSecret(ForwardingMode),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardingMode {
    /// Backends see the proxy's address; identity is offline-style.
    None,
    /// BungeeCord-style handshake rewriting.
    Legacy,
    /// Legacy plus an authenticating token property.
    BungeeGuard,
    /// Velocity login-plugin-message forwarding with an HMAC.
    Modern,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PingPassthrough {
    /// Synthesize the status response locally.
    Disabled,
    /// Relay the whole status response from the would-be initial server.
    All,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerEntry {
    pub address: String,
    /// Per-server override of the global forwarding mode.
    #[serde(default)]
    pub forwarding: Option<ForwardingMode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ForwardingConfig {
    #[serde(default = "default_forwarding_mode")]
    pub mode: ForwardingMode,
    #[serde(default)]
    pub secret: String,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        ForwardingConfig {
            mode: default_forwarding_mode(),
            secret: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AdvancedConfig {
    /// Compression threshold in bytes; -1 disables compression.
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: i32,
    /// Backend dial timeout.
    #[serde(default = "default_connect_timeout_ms")]
    pub connection_timeout_ms: u64,
    /// Deadline for every non-Play protocol state.
    #[serde(default = "default_state_timeout_ms")]
    pub login_timeout_ms: u64,
    /// How long a paused writer may stall before the socket is closed.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default)]
    pub tcp_fast_open: bool,
    #[serde(default = "default_true")]
    pub failover_on_unexpected_server_disconnect: bool,
    /// Push unreachable candidates to the end of the candidate list.
    #[serde(default)]
    pub enable_dynamic_fallbacks: bool,
    /// Stable-sort candidates by player count, descending.
    #[serde(default)]
    pub enable_most_populated_fallbacks: bool,
    /// Kick 1.19–1.19.2 clients chatting without a published key.
    #[serde(default = "default_true")]
    pub force_key_authentication: bool,
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        toml::from_str("").expect("empty advanced config must deserialize")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ProxyConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_motd")]
    pub motd: String,
    #[serde(default = "default_show_max_players")]
    pub show_max_players: i32,
    #[serde(default = "default_true")]
    pub online_mode: bool,
    #[serde(default = "default_ping_passthrough")]
    pub ping_passthrough: PingPassthrough,
    #[serde(default)]
    pub forwarding: ForwardingConfig,
    #[serde(default)]
    pub servers: HashMap<String, ServerEntry>,
    /// Ordered fallback list for initial connections. Insertion order is
    /// meaningful.
    #[serde(default, rename = "try")]
    pub try_order: Vec<String>,
    /// Virtual-host overrides: lowercased hostname -> candidate list.
    #[serde(default)]
    pub forced_hosts: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

fn default_bind() -> String {
    "0.0.0.0:25565".to_owned()
}
fn default_motd() -> String {
    "A Minecraft proxy".to_owned()
}
fn default_show_max_players() -> i32 {
    500
}
fn default_true() -> bool {
    true
}
fn default_forwarding_mode() -> ForwardingMode {
    ForwardingMode::None
}
fn default_ping_passthrough() -> PingPassthrough {
    PingPassthrough::Disabled
}
fn default_compression_threshold() -> i32 {
    256
}
fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_state_timeout_ms() -> u64 {
    30_000
}
fn default_write_timeout_ms() -> u64 {
    30_000
}

impl ProxyConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let mut config: ProxyConfig = toml::from_str(contents)?;

        if let Ok(secret) = std::env::var("VELOCITY_FORWARDING_SECRET") {
            if !secret.is_empty() {
                config.forwarding.secret = secret;
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for name in &self.try_order {
            if !self.servers.contains_key(name) {
                return Err(ConfigError::UnknownServer {
                    list: "try".to_owned(),
                    name: name.clone(),
                });
            }
        }
        for (host, candidates) in &self.forced_hosts {
            for name in candidates {
                if !self.servers.contains_key(name) {
                    return Err(ConfigError::UnknownServer {
                        list: format!("forced-hosts.{host}"),
                        name: name.clone(),
                    });
                }
            }
        }

        let needs_secret = self.forwarding.mode != ForwardingMode::None
            || self
                .servers
                .values()
                .any(|server| matches!(server.forwarding, Some(mode) if mode != ForwardingMode::None));
        if needs_secret && self.forwarding.secret.is_empty() {
            return Err(ConfigError::MissingSecret(self.forwarding.mode));
        }

        Ok(())
    }

    /// Forwarding mode in effect for `server`, honoring the override.
    pub fn forwarding_mode_for(&self, server: &str) -> ForwardingMode {
        self.servers
            .get(server)
            .and_then(|entry| entry.forwarding)
            .unwrap_or(self.forwarding.mode)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.advanced.connection_timeout_ms)
    }

    pub fn state_timeout(&self) -> Duration {
        Duration::from_millis(self.advanced.login_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.advanced.write_timeout_ms)
    }
}
