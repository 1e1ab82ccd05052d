//! Terminal-transition pipeline: finalize, persist, release.
//!
//! Decoupled from the tick path: when a room reaches Finished or
//! Abandoned, the worker hands its final state here. The pipeline shapes
//! the result record, writes it through the store adapter with a TTL (the
//! external leaderboard/history service owns durable storage), and returns
//! the payload the clients get in `gameEnded`.

use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use shared::protocol::{GameEndedPayload, ScoreSnapshot};
use shared::types::{RoomState, WinReason, Winner};

use crate::store::KeyValueStore;

/// How long a finished match's record stays readable, seconds.
const RESULT_TTL_SECS: u64 = 3600;

/// The persisted end-of-match record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub room_id: String,
    pub players: Vec<String>,
    pub score_left: u16,
    pub score_right: u16,
    pub winner: Winner,
    pub win_reason: WinReason,
    /// Simulated duration, milliseconds.
    pub duration_ms: u64,
    pub ended_at_ms: u64,
}

/// Writes match results through the store boundary.
pub struct GameEndPipeline {
    store: Arc<dyn KeyValueStore>,
}

impl GameEndPipeline {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Builds the result record from a terminal room.
    ///
    /// Rooms abandoned before kickoff finalize as a draw with a
    /// technical-issue reason; nothing was contested.
    pub fn finalize(&self, room: &RoomState, now_ms: u64) -> MatchResult {
        MatchResult {
            room_id: room.id.clone(),
            players: room
                .players
                .iter()
                .flatten()
                .map(|p| p.id.clone())
                .collect(),
            score_left: room.score.0,
            score_right: room.score.1,
            winner: room.winner.unwrap_or(Winner::Draw),
            win_reason: room.win_reason.unwrap_or(WinReason::TechnicalIssue),
            duration_ms: room.game_time_ms as u64,
            ended_at_ms: room.ended_at_ms.unwrap_or(now_ms),
        }
    }

    /// Persists the record with its TTL. Failures are logged, never fatal:
    /// the game is over either way.
    pub fn persist(&self, result: &MatchResult) {
        let key = format!("match:result:{}", result.room_id);
        match serde_json::to_string(result) {
            Ok(json) => {
                self.store.set_ex(&key, RESULT_TTL_SECS, &json);
                info!(
                    "room {}: result persisted ({:?}, {:?})",
                    result.room_id, result.winner, result.win_reason
                );
            }
            Err(err) => warn!("room {}: result not persisted: {}", result.room_id, err),
        }
    }

    /// Finalize + persist, returning the broadcastable payload.
    pub fn run(&self, room: &RoomState, now_ms: u64) -> GameEndedPayload {
        let result = self.finalize(room, now_ms);
        self.persist(&result);
        GameEndedPayload {
            winner: result.winner,
            win_reason: result.win_reason,
            score: ScoreSnapshot {
                left: result.score_left,
                right: result.score_right,
            },
            duration_ms: result.duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use shared::types::{PlayerState, RoomStatus, Seat};

    fn finished_room() -> RoomState {
        let mut room = RoomState::new("room-9".into(), 0);
        room.players[0] = Some(PlayerState::spawn("a".into(), Seat::Left, String::new()));
        room.players[1] = Some(PlayerState::spawn("b".into(), Seat::Right, String::new()));
        room.score = (5, 2);
        room.status = RoomStatus::Finished;
        room.winner = Some(Winner::Left);
        room.win_reason = Some(WinReason::ScoreLimit);
        room.game_time_ms = 181_500.0;
        room.ended_at_ms = Some(99_000);
        room
    }

    #[test]
    fn test_finalize_captures_outcome() {
        let pipeline = GameEndPipeline::new(Arc::new(MemoryStore::new()));
        let result = pipeline.finalize(&finished_room(), 100_000);

        assert_eq!(result.room_id, "room-9");
        assert_eq!(result.players, vec!["a", "b"]);
        assert_eq!((result.score_left, result.score_right), (5, 2));
        assert_eq!(result.winner, Winner::Left);
        assert_eq!(result.win_reason, WinReason::ScoreLimit);
        assert_eq!(result.duration_ms, 181_500);
        assert_eq!(result.ended_at_ms, 99_000);
    }

    #[test]
    fn test_run_persists_readable_record() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = GameEndPipeline::new(store.clone());
        let payload = pipeline.run(&finished_room(), 100_000);

        assert_eq!(payload.winner, Winner::Left);
        assert_eq!(payload.score.left, 5);

        use crate::store::KeyValueStore;
        let json = store.get("match:result:room-9").expect("record stored");
        let back: MatchResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.winner, Winner::Left);
        assert_eq!(back.duration_ms, 181_500);
    }

    #[test]
    fn test_abandoned_room_defaults_to_draw() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = GameEndPipeline::new(store);
        let mut room = RoomState::new("room-x".into(), 0);
        room.status = RoomStatus::Abandoned;

        let result = pipeline.finalize(&room, 50_000);
        assert_eq!(result.winner, Winner::Draw);
        assert_eq!(result.win_reason, WinReason::TechnicalIssue);
        assert_eq!(result.ended_at_ms, 50_000);
    }
}
