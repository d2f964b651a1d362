use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Command-line flags. Only flags that were actually passed are serialized,
/// so unset flags never mask values from the TOML file or environment.
#[derive(Parser, Serialize, Clone, Debug, Default)]
#[command(name = "parley-server", version, about = "Parley presence and relay server")]
pub struct Cli {
    /// Port to listen on
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file
    #[arg(long, default_value = "./parley.toml")]
    #[serde(skip)]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip)]
    pub generate_config: bool,
}

/// Resolved server configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub json_logs: bool,
    /// WebSocket settings (loaded from [ws] section in TOML)
    #[serde(default)]
    pub ws: WsConfig,
}

/// Configuration for WebSocket keepalive and cross-origin access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConfig {
    /// Seconds between server pings (default: 30)
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    /// Seconds to wait for a pong before closing (default: 10)
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_secs: u64,

    /// Origins allowed by CORS (default: the local dev frontend)
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: default_ping_interval(),
            pong_timeout_secs: default_pong_timeout(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

fn default_ping_interval() -> u64 {
    30
}

fn default_pong_timeout() -> u64 {
    10
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:5173".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5001,
            bind_address: "0.0.0.0".to_string(),
            json_logs: false,
            ws: WsConfig::default(),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (PARLEY_*) < CLI args
    ///
    /// Nested keys use a double underscore, e.g. `PARLEY_WS__PING_INTERVAL_SECS`.
    pub fn load(cli: &Cli) -> Result<Self, figment::Error> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&cli.config))
            .merge(Env::prefixed("PARLEY_").split("__"))
            .merge(Serialized::defaults(cli))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Keepalive timers must be non-zero; a zero interval panics the ping task.
    fn validate(&self) -> Result<(), figment::Error> {
        if self.ws.ping_interval_secs == 0 {
            return Err(figment::Error::from(
                "ws.ping_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.ws.pong_timeout_secs == 0 {
            return Err(figment::Error::from(
                "ws.pong_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Parley Server Configuration
# Place this file at ./parley.toml or specify with --config <path>
# All settings can be overridden via environment variables (PARLEY_PORT,
# PARLEY_WS__PING_INTERVAL_SECS, etc.) or CLI flags (--port, etc.)

# Server port (default: 5001)
# port = 5001

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# ---- WebSocket ----
# [ws]

# Seconds between server pings (default: 30)
# ping_interval_secs = 30

# Seconds to wait for a pong before the connection is closed (default: 10)
# pong_timeout_secs = 10

# Origins allowed by CORS (default: the local dev frontend)
# allowed_origins = ["http://localhost:5173"]
"#
    .to_string()
}
