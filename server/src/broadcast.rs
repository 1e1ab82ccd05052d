//! Snapshot emission policy and fan-out.
//!
//! Each room worker owns one [`Broadcaster`] and consults it once per tick,
//! so a room never emits more than one snapshot per tick and members always
//! see tick N before tick N+1. While the game runs every tick goes out;
//! idle phases (waiting, paused, finished) drop to a keep-alive cadence
//! unless the visible state actually changed.

use shared::protocol::{GameSnapshot, ServerEvent};
use shared::types::{RoomState, RoomStatus};

use crate::connection::ConnectionManager;

/// Idle keep-alive: one snapshot per this many ticks (1 Hz at 240 Hz).
const IDLE_EMIT_EVERY: u32 = 240;

/// Per-room emission throttle.
pub struct Broadcaster {
    last_status: Option<RoomStatus>,
    last_score: (u16, u16),
    ticks_since_emit: u32,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            last_status: None,
            last_score: (0, 0),
            ticks_since_emit: 0,
        }
    }

    /// Decides whether this tick's snapshot goes out.
    pub fn should_emit(&mut self, room: &RoomState) -> bool {
        self.ticks_since_emit = self.ticks_since_emit.saturating_add(1);

        let changed =
            self.last_status != Some(room.status) || self.last_score != room.score;
        let due = match room.status {
            RoomStatus::Playing => true,
            _ => changed || self.ticks_since_emit >= IDLE_EMIT_EVERY,
        };

        if due {
            self.last_status = Some(room.status);
            self.last_score = room.score;
            self.ticks_since_emit = 0;
        }
        due
    }

    /// Fans the snapshot out to every member of the room.
    pub fn emit(&self, connections: &ConnectionManager, room_id: &str, snapshot: GameSnapshot) {
        let event = ServerEvent::GameState(snapshot);
        connections.broadcast_to_room(room_id, &event, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waiting_room() -> RoomState {
        RoomState::new("room-1".into(), 0)
    }

    fn playing_room() -> RoomState {
        let mut room = waiting_room();
        room.status = RoomStatus::Playing;
        room
    }

    #[test]
    fn test_playing_emits_every_tick() {
        let mut b = Broadcaster::new();
        let room = playing_room();
        for _ in 0..100 {
            assert!(b.should_emit(&room));
        }
    }

    #[test]
    fn test_idle_room_throttles() {
        let mut b = Broadcaster::new();
        let room = waiting_room();

        // First tick announces the initial state.
        assert!(b.should_emit(&room));

        let emitted = (0..IDLE_EMIT_EVERY - 1)
            .filter(|_| b.should_emit(&room))
            .count();
        assert_eq!(emitted, 0);
        // The keep-alive lands on schedule.
        assert!(b.should_emit(&room));
    }

    #[test]
    fn test_status_change_breaks_throttle() {
        let mut b = Broadcaster::new();
        let mut room = waiting_room();
        assert!(b.should_emit(&room));
        assert!(!b.should_emit(&room));

        room.status = RoomStatus::Paused;
        assert!(b.should_emit(&room));
    }

    #[test]
    fn test_score_change_breaks_throttle() {
        let mut b = Broadcaster::new();
        let mut room = waiting_room();
        room.status = RoomStatus::Finished;
        assert!(b.should_emit(&room));

        room.score = (1, 0);
        assert!(b.should_emit(&room));
    }
}
