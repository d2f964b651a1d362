use std::time::Duration;

use crate::config::WsConfig;
use crate::ws::ConnectionRegistry;

/// Keepalive timings for each WebSocket actor.
#[derive(Debug, Clone, Copy)]
pub struct WsSettings {
    /// Server sends a ping this often.
    pub ping_interval: Duration,
    /// Connection is closed if no pong arrives within this window after a ping.
    pub pong_timeout: Duration,
}

impl Default for WsSettings {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&WsConfig> for WsSettings {
    fn from(config: &WsConfig) -> Self {
        Self {
            ping_interval: Duration::from_secs(config.ping_interval_secs),
            pong_timeout: Duration::from_secs(config.pong_timeout_secs),
        }
    }
}

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone, Default)]
pub struct AppState {
    /// Live connections and the user -> connection mapping
    pub connections: ConnectionRegistry,
    /// WebSocket keepalive settings
    pub ws: WsSettings,
}

impl AppState {
    pub fn new(ws: WsSettings) -> Self {
        Self {
            connections: ConnectionRegistry::new(),
            ws,
        }
    }
}
