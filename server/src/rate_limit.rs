//! Per-connection token buckets, one per event class.
//!
//! Buckets refill continuously at the configured per-minute rate and clamp
//! at capacity. Callers pass `now_ms` so the limiter stays clock-free and
//! unit-testable. A violation drops the message and is counted; there is no
//! automatic ban here, monitoring decides what to do with repeat offenders.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Coarse event classes sharing one bucket each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventClass {
    General,
    Chat,
    Movement,
    Matchmaking,
}

impl EventClass {
    /// Classifies an ingress event by its wire name. Unknown names fall to
    /// the general bucket.
    pub fn of(event_name: &str) -> EventClass {
        match event_name {
            "player_input" | "player_movement" | "ball_update" | "goal_attempt" => {
                EventClass::Movement
            }
            "chat_message" => EventClass::Chat,
            "join_matchmaking" | "leave_matchmaking" => EventClass::Matchmaking,
            _ => EventClass::General,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EventClass::General => "general",
            EventClass::Chat => "chat",
            EventClass::Movement => "movement",
            EventClass::Matchmaking => "matchmaking",
        }
    }
}

/// Events allowed per minute, per class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub general_per_min: u32,
    pub chat_per_min: u32,
    pub movement_per_min: u32,
    pub matchmaking_per_min: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            general_per_min: 60,
            chat_per_min: 10,
            movement_per_min: 120,
            matchmaking_per_min: 5,
        }
    }
}

impl RateLimitConfig {
    fn limit(&self, class: EventClass) -> u32 {
        match class {
            EventClass::General => self.general_per_min,
            EventClass::Chat => self.chat_per_min,
            EventClass::Movement => self.movement_per_min,
            EventClass::Matchmaking => self.matchmaking_per_min,
        }
    }
}

/// Outcome of a rate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after_ms: u64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_ms: f64,
    last_refill_ms: u64,
}

impl Bucket {
    fn new(per_minute: u32, now_ms: u64) -> Self {
        let capacity = per_minute as f64;
        Self {
            tokens: capacity,
            capacity,
            refill_per_ms: capacity / 60_000.0,
            last_refill_ms: now_ms,
        }
    }

    fn try_take(&mut self, now_ms: u64) -> RateDecision {
        let elapsed = now_ms.saturating_sub(self.last_refill_ms);
        self.tokens = (self.tokens + elapsed as f64 * self.refill_per_ms).min(self.capacity);
        self.last_refill_ms = now_ms;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            RateDecision::Allowed
        } else {
            let missing = 1.0 - self.tokens;
            RateDecision::Limited {
                retry_after_ms: (missing / self.refill_per_ms).ceil() as u64,
            }
        }
    }
}

/// One connection's buckets plus a violation tally for monitoring.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: HashMap<EventClass, Bucket>,
    violations: u64,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes one token from the class bucket, creating it lazily.
    pub fn check(
        &mut self,
        class: EventClass,
        config: &RateLimitConfig,
        now_ms: u64,
    ) -> RateDecision {
        let bucket = self
            .buckets
            .entry(class)
            .or_insert_with(|| Bucket::new(config.limit(class), now_ms));
        let decision = bucket.try_take(now_ms);
        if !decision.is_allowed() {
            self.violations += 1;
        }
        decision
    }

    pub fn violations(&self) -> u64 {
        self.violations
    }
}
