//! Server-level configuration: bind address, timeouts, rate limits, and
//! the embedded match configuration.

use serde::{Deserialize, Serialize};

use shared::config::GameConfig;

use crate::rate_limit::RateLimitConfig;

/// Everything the server process reads at startup. CLI flags overlay the
/// defaults in `main`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub game: GameConfig,
    pub rate_limits: RateLimitConfig,
    /// A silent connection older than this is closed.
    pub connection_timeout_ms: u64,
    /// Cadence of transport pings and stale sweeps.
    pub heartbeat_interval_ms: u64,
    /// Cadence of the pairing / ready-timeout sweep.
    pub matchmaking_interval_ms: u64,
    /// Cadence of the status log line.
    pub status_interval_ms: u64,
    /// Shared secret for `request_game_end` with `admin_request`; absent
    /// means the admin path is disabled.
    pub admin_code: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            game: GameConfig::default(),
            rate_limits: RateLimitConfig::default(),
            connection_timeout_ms: 30_000,
            heartbeat_interval_ms: 5_000,
            matchmaking_interval_ms: 500,
            status_interval_ms: 30_000,
            admin_code: None,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
