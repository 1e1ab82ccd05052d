//! Runtime game configuration.
//!
//! Everything tunable about a match lives here so the simulator, validator,
//! and room engine all read the same numbers. Field geometry stays in
//! [`crate::constants`]; this struct carries the knobs an operator may
//! reasonably override.

use serde::{Deserialize, Serialize};

/// Match and plausibility configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Simulation cadence, ticks per second.
    pub tick_hz: u32,
    /// First score to reach this ends the game.
    pub score_limit: u16,
    /// Game clock limit, seconds.
    pub time_limit_sec: u32,
    /// Window after a goal during which further goals are not counted.
    pub goal_cooldown_ms: u64,
    /// A pause older than this force-ends the game.
    pub pause_timeout_ms: u64,
    /// Matched players must both ready up within this window.
    pub ready_timeout_ms: u64,
    /// A disconnected player may reconnect within this window.
    pub disconnect_grace_ms: u64,
    /// Plausibility ceiling for implied player speed, pixels/second.
    pub max_player_speed: f32,
    /// Plausibility ceiling for ball speed, pixels/second.
    pub max_ball_speed: f32,
    /// Maximum client inputs per sliding one-second window.
    pub max_input_rate: u32,
    /// Tolerated client/server clock skew, milliseconds.
    pub max_time_drift_ms: u64,
    /// Out-of-bounds tolerance for client-reported positions, pixels.
    pub position_margin: f32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_hz: 240,
            score_limit: 5,
            time_limit_sec: 600,
            goal_cooldown_ms: 3000,
            pause_timeout_ms: 30_000,
            ready_timeout_ms: 20_000,
            disconnect_grace_ms: 10_000,
            max_player_speed: 500.0,
            max_ball_speed: 800.0,
            max_input_rate: 60,
            max_time_drift_ms: 1000,
            position_margin: 50.0,
        }
    }
}

impl GameConfig {
    /// Fixed timestep, seconds.
    pub fn dt(&self) -> f32 {
        1.0 / self.tick_hz as f32
    }

    /// Fixed timestep, milliseconds.
    pub fn dt_ms(&self) -> f64 {
        1000.0 / self.tick_hz as f64
    }

    /// Game clock limit, milliseconds.
    pub fn time_limit_ms(&self) -> f64 {
        self.time_limit_sec as f64 * 1000.0
    }
}
