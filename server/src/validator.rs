//! Per-message plausibility gate.
//!
//! Validation rules:
//! - Position claims must sit inside the field plus a configured margin.
//! - Implied speed between consecutive claims must stay under the ceiling.
//! - Timestamps must be within the tolerated drift of the server clock.
//! - Input rate is capped over a sliding one-second window.
//! - Ball claims additionally require touch authority and the speed ceiling.
//! - Goal claims must cross the line this frame inside the mouth.
//!
//! Every rejection carries a corrected value (clamp to bounds, scale to the
//! ceiling, or fall back to the previous authoritative state) so the room
//! can keep advancing with server-authoritative data. Suspicion is recorded
//! as observation-only signals; nothing here bans anyone.

use std::collections::{HashMap, VecDeque};

use log::debug;

use shared::config::GameConfig;
use shared::constants::{
    BALL_RADIUS, FIELD_HEIGHT, FIELD_WIDTH, FLOOR_Y, GOAL_HEIGHT, GOAL_WIDTH, PLAYER_RADIUS,
};
use shared::types::{Seat, Vec2};

/// Severity scale for observation-only anti-cheat signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Signal kinds. Only the input-rate anomaly fires today; the others are
/// hooks for future pattern classifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    InputRateAnomaly,
    ImpossibleMovement,
    PatternRepetition,
    TimingInconsistency,
}

/// One recorded suspicion.
#[derive(Debug, Clone, PartialEq)]
pub struct CheatSignal {
    pub player_id: String,
    pub kind: SignalKind,
    pub severity: Severity,
    pub detail: String,
}

/// Replacement values attached to a rejection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corrected {
    pub position: Vec2,
    pub velocity: Vec2,
}

/// Outcome of a movement or ball plausibility check.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted,
    /// Claim refused; the corrected state is what the room should trust.
    Rejected { reason: String, corrected: Corrected },
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

/// Outcome of the sliding-window input rate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRateVerdict {
    Allowed,
    Limited,
}

/// Outcome of a goal claim check.
#[derive(Debug, Clone, PartialEq)]
pub enum GoalVerdict {
    /// The crossing is real. `own_goal` is set when the scorer's seat
    /// defends the goal the ball entered.
    Confirmed { side: Seat, own_goal: bool },
    Rejected { reason: String },
}

#[derive(Debug, Default)]
struct PlayerHistory {
    last_position: Option<Vec2>,
    last_velocity: Option<Vec2>,
    last_timestamp_ms: Option<u64>,
    /// Server-clock receive times inside the sliding window.
    input_times_ms: VecDeque<u64>,
}

/// Stateful plausibility gate for one room.
pub struct PlausibilityGate {
    config: GameConfig,
    history: HashMap<String, PlayerHistory>,
    signals: Vec<CheatSignal>,
}

impl PlausibilityGate {
    pub fn new(config: GameConfig) -> Self {
        Self {
            config,
            history: HashMap::new(),
            signals: Vec::new(),
        }
    }

    /// Sliding one-second window input-rate check, run before anything else
    /// touches the message. At 90% of the cap an anomaly signal is recorded;
    /// at the cap the message is refused.
    pub fn note_input(&mut self, player_id: &str, server_now_ms: u64) -> InputRateVerdict {
        let max_rate = self.config.max_input_rate as usize;
        let history = self.history.entry(player_id.to_string()).or_default();

        while let Some(front) = history.input_times_ms.front() {
            if server_now_ms.saturating_sub(*front) >= 1000 {
                history.input_times_ms.pop_front();
            } else {
                break;
            }
        }

        let current = history.input_times_ms.len();
        if current >= max_rate {
            self.signals.push(CheatSignal {
                player_id: player_id.to_string(),
                kind: SignalKind::InputRateAnomaly,
                severity: Severity::Medium,
                detail: format!("input rate {} >= cap {}", current + 1, max_rate),
            });
            return InputRateVerdict::Limited;
        }

        history.input_times_ms.push_back(server_now_ms);
        if (current + 1) as f32 >= 0.9 * max_rate as f32 {
            self.signals.push(CheatSignal {
                player_id: player_id.to_string(),
                kind: SignalKind::InputRateAnomaly,
                severity: Severity::Low,
                detail: format!("input rate {} nearing cap {}", current + 1, max_rate),
            });
        }
        InputRateVerdict::Allowed
    }

    /// Validates a positional movement claim against bounds, drift, and the
    /// implied-speed ceiling. `authoritative` is the server's current state
    /// for the player, used as the safe fallback.
    pub fn check_movement(
        &mut self,
        player_id: &str,
        claimed_position: Vec2,
        claimed_velocity: Option<Vec2>,
        timestamp_ms: u64,
        server_now_ms: u64,
        authoritative: Corrected,
    ) -> Verdict {
        let cfg = &self.config;

        if !finite(claimed_position) {
            return self.reject(player_id, "non-finite position", authoritative);
        }

        // Clock drift gate.
        let drift = server_now_ms.abs_diff(timestamp_ms);
        if drift > cfg.max_time_drift_ms {
            return self.reject(
                player_id,
                format!("timestamp drift {}ms exceeds {}ms", drift, cfg.max_time_drift_ms),
                authoritative,
            );
        }

        // Field bounds with margin.
        let m = cfg.position_margin;
        if claimed_position.x < PLAYER_RADIUS - m
            || claimed_position.x > FIELD_WIDTH - PLAYER_RADIUS + m
            || claimed_position.y < PLAYER_RADIUS - m
            || claimed_position.y > FLOOR_Y - PLAYER_RADIUS + m
        {
            let corrected = self
                .previous_state(player_id)
                .unwrap_or_else(|| clamp_player(claimed_position));
            return self.reject(player_id, "position out of bounds", corrected);
        }

        // Implied speed against the previous accepted claim.
        let history = self.history.entry(player_id.to_string()).or_default();
        if let (Some(prev_pos), Some(prev_ts)) = (history.last_position, history.last_timestamp_ms)
        {
            let dt_ms = timestamp_ms.saturating_sub(prev_ts).max(1);
            let implied = prev_pos.distance(claimed_position) / (dt_ms as f32 / 1000.0);
            if implied > cfg.max_player_speed {
                let corrected = Corrected {
                    position: prev_pos,
                    velocity: history.last_velocity.unwrap_or(authoritative.velocity),
                };
                return self.reject(
                    player_id,
                    format!("implied speed {:.0} exceeds {:.0}", implied, cfg.max_player_speed),
                    corrected,
                );
            }
        }

        // A too-fast velocity claim is corrected by scaling, not refused.
        if let Some(vel) = claimed_velocity {
            if !finite(vel) {
                return self.reject(player_id, "non-finite velocity", authoritative);
            }
            if vel.length() > cfg.max_player_speed {
                let corrected = Corrected {
                    position: claimed_position,
                    velocity: vel.clamp_length(cfg.max_player_speed),
                };
                return self.reject(player_id, "velocity above ceiling", corrected);
            }
        }

        let history = self.history.entry(player_id.to_string()).or_default();
        history.last_position = Some(claimed_position);
        history.last_velocity = claimed_velocity;
        history.last_timestamp_ms = Some(timestamp_ms);
        Verdict::Accepted
    }

    /// Validates an advisory ball claim: bounds, speed ceiling, and the
    /// implied displacement from the server's ball state.
    pub fn check_ball(
        &mut self,
        sender_id: &str,
        claimed_position: Vec2,
        claimed_velocity: Vec2,
        server_ball: Corrected,
    ) -> Verdict {
        let cfg = &self.config;

        if !finite(claimed_position) || !finite(claimed_velocity) {
            return self.reject(sender_id, "non-finite ball state", server_ball);
        }

        let m = cfg.position_margin;
        let in_mouth_band = claimed_position.y >= FIELD_HEIGHT - GOAL_HEIGHT;
        // Goal mouths legitimately hold the ball beyond the side bounds.
        let out_x = !in_mouth_band
            && (claimed_position.x < BALL_RADIUS - m
                || claimed_position.x > FIELD_WIDTH - BALL_RADIUS + m);
        let out_y =
            claimed_position.y < BALL_RADIUS - m || claimed_position.y > FLOOR_Y - BALL_RADIUS + m;
        if out_x || out_y {
            return self.reject(sender_id, "ball out of bounds", server_ball);
        }

        if claimed_velocity.length() > cfg.max_ball_speed {
            let corrected = Corrected {
                position: claimed_position,
                velocity: claimed_velocity.clamp_length(cfg.max_ball_speed),
            };
            return self.reject(sender_id, "ball velocity above ceiling", corrected);
        }

        // A claim more than a quarter second of max-speed travel away from
        // the authoritative ball is a teleport, not update jitter.
        let displacement = server_ball.position.distance(claimed_position);
        if displacement > cfg.max_ball_speed * 0.25 {
            return self.reject(sender_id, "ball teleport", server_ball);
        }

        Verdict::Accepted
    }

    /// Validates a goal claim: the ball must have crossed the goal line this
    /// frame (previous outside, current inside) within the mouth band, and
    /// the scorer must hold a seat.
    pub fn check_goal(
        &self,
        scorer_seat: Option<Seat>,
        previous_ball: Vec2,
        current_ball: Vec2,
    ) -> GoalVerdict {
        let Some(scorer_seat) = scorer_seat else {
            return GoalVerdict::Rejected {
                reason: "scorer is not seated".into(),
            };
        };

        let mouth_top = FIELD_HEIGHT - GOAL_HEIGHT;
        if current_ball.y < mouth_top || current_ball.y > FLOOR_Y {
            return GoalVerdict::Rejected {
                reason: "ball outside goal mouth".into(),
            };
        }

        let left_line = GOAL_WIDTH;
        let right_line = FIELD_WIDTH - GOAL_WIDTH;
        // side = the goal the ball entered; scoring credits the other seat.
        let side = if previous_ball.x > left_line && current_ball.x <= left_line {
            Seat::Left
        } else if previous_ball.x < right_line && current_ball.x >= right_line {
            Seat::Right
        } else {
            return GoalVerdict::Rejected {
                reason: "ball did not cross a goal line this frame".into(),
            };
        };

        GoalVerdict::Confirmed {
            side,
            own_goal: scorer_seat == side,
        }
    }

    /// Scores may only grow, by at most one, on one side per step.
    pub fn score_transition_valid(prev: (u16, u16), next: (u16, u16)) -> bool {
        let dl = next.0 as i32 - prev.0 as i32;
        let dr = next.1 as i32 - prev.1 as i32;
        dl >= 0 && dr >= 0 && dl + dr <= 1
    }

    /// Game time never runs backwards.
    pub fn time_transition_valid(prev_ms: f64, next_ms: f64) -> bool {
        next_ms >= prev_ms
    }

    /// Drains the accumulated observation signals.
    pub fn take_signals(&mut self) -> Vec<CheatSignal> {
        std::mem::take(&mut self.signals)
    }

    /// Forgets a player's history, e.g. after they leave the room.
    pub fn forget(&mut self, player_id: &str) {
        self.history.remove(player_id);
    }

    fn previous_state(&self, player_id: &str) -> Option<Corrected> {
        let history = self.history.get(player_id)?;
        Some(Corrected {
            position: history.last_position?,
            velocity: history.last_velocity.unwrap_or(Vec2::ZERO),
        })
    }

    fn reject(
        &mut self,
        player_id: &str,
        reason: impl Into<String>,
        corrected: Corrected,
    ) -> Verdict {
        let reason = reason.into();
        debug!("plausibility reject for {}: {}", player_id, reason);
        Verdict::Rejected { reason, corrected }
    }
}

fn finite(v: Vec2) -> bool {
    v.x.is_finite() && v.y.is_finite()
}

fn clamp_player(p: Vec2) -> Corrected {
    Corrected {
        position: Vec2::new(
            p.x.clamp(PLAYER_RADIUS, FIELD_WIDTH - PLAYER_RADIUS),
            p.y.clamp(PLAYER_RADIUS, FLOOR_Y - PLAYER_RADIUS),
        ),
        velocity: Vec2::ZERO,
    }
}
