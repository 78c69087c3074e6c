use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   config.toml:     [session]
//                    name = "ops"
//
//   env var:         TIDE_SESSION__NAME=ops   (double underscore = nesting)
//
//   CLI flags (--host, --port, --session) override both.

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub session: SessionFileConfig,
    #[serde(default)]
    pub websocket: WebSocketFileConfig,
}

/// Listener tunables (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Terminal session tunables (lives under `[session]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionFileConfig {
    /// Multiplexer session name; a restarted bridge reattaches to it
    #[serde(default = "default_session_name")]
    pub name: String,
    /// Override the child command entirely (skips the multiplexer)
    #[serde(default)]
    pub command: Option<String>,
    /// Arguments for the override command
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    /// Initial viewport, replaced by the first client resize
    #[serde(default = "default_cols")]
    pub cols: u16,
    #[serde(default = "default_rows")]
    pub rows: u16,
}

impl Default for SessionFileConfig {
    fn default() -> Self {
        Self {
            name: default_session_name(),
            command: None,
            args: Vec::new(),
            working_dir: None,
            cols: default_cols(),
            rows: default_rows(),
        }
    }
}

/// WebSocket tunables (lives under `[websocket]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebSocketFileConfig {
    /// Bounded per-client outbound queue, in output chunks. A client whose
    /// queue fills up is disconnected rather than allowed to stall the
    /// broadcast path.
    #[serde(default = "default_client_queue_depth")]
    pub client_queue_depth: usize,
}

impl Default for WebSocketFileConfig {
    fn default() -> Self {
        Self {
            client_queue_depth: default_client_queue_depth(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    7681
}
fn default_session_name() -> String {
    "tidepool".to_string()
}
fn default_cols() -> u16 {
    220
}
fn default_rows() -> u16 {
    50
}
fn default_client_queue_depth() -> usize {
    256
}

/// Build a figment that layers: defaults → config.toml → TIDE_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `TIDE_SERVER__PORT=8080`      →  `server.port = 8080`
///   `TIDE_SESSION__NAME=ops`      →  `session.name = "ops"`
pub fn load_config(config_path: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config_path))
        .merge(Env::prefixed("TIDE_").split("__"))
}

impl FileConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        load_config(config_path)
            .extract()
            .context("invalid configuration")
    }
}

// =============================================================================
// Runtime config structs (derived from FileConfig, used throughout the server)
// =============================================================================

/// Resolved bridge configuration (runtime view).
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub bind_addr: SocketAddr,
    pub session: SessionSettings,
    pub websocket: WebSocketSettings,
}

#[derive(Clone, Debug)]
pub struct SessionSettings {
    /// Multiplexer session name (informational once `command` is resolved)
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: Option<String>,
    pub cols: u16,
    pub rows: u16,
}

#[derive(Clone, Debug)]
pub struct WebSocketSettings {
    pub client_queue_depth: usize,
}

impl BridgeConfig {
    pub fn from_file(fc: &FileConfig) -> Result<Self> {
        let bind_addr = format!("{}:{}", fc.server.host, fc.server.port)
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid bind address {}:{}", fc.server.host, fc.server.port))?;

        // Default child: attach-or-create a tmux session under the configured
        // name, so a restarted bridge reattaches instead of starting fresh.
        let (command, args) = match &fc.session.command {
            Some(cmd) => (cmd.clone(), fc.session.args.clone()),
            None => (
                "tmux".to_string(),
                vec![
                    "new-session".to_string(),
                    "-A".to_string(),
                    "-s".to_string(),
                    fc.session.name.clone(),
                ],
            ),
        };

        Ok(Self {
            bind_addr,
            session: SessionSettings {
                name: fc.session.name.clone(),
                command,
                args,
                working_dir: fc.session.working_dir.clone(),
                cols: fc.session.cols,
                rows: fc.session.rows,
            },
            websocket: WebSocketSettings {
                client_queue_depth: fc.websocket.client_queue_depth,
            },
        })
    }
}
