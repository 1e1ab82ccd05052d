//! FIFO matchmaking queues and the ready-up handshake.
//!
//! One queue per game mode, ordered strictly by enqueue time through the
//! store adapter's sorted sets; no rating bands, the oldest two wait the
//! shortest. Pairing reserves a room id and parks both players in a
//! [`PendingMatch`] until they ready up or the window lapses.
//!
//! Ready-timeout policy: players who had readied are re-queued with their
//! original enqueue time (keeping their FIFO standing), the rest are
//! dropped. The policy name is published in every `match_cancelled` payload
//! so clients observe the behavior they will get.

use std::collections::HashMap;
use std::sync::Arc;

use log::info;
use rand::Rng;

use shared::config::GameConfig;
use shared::protocol::GameMode;

use crate::store::KeyValueStore;

/// Published ready-timeout policy label.
pub const READY_TIMEOUT_POLICY: &str = "requeue_ready";

/// Rejection codes for queue operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    AlreadyQueued,
    ConnectionError,
    InvalidMode,
    Unauthenticated,
    InGame,
    NotQueued,
}

impl QueueError {
    pub fn code(&self) -> &'static str {
        match self {
            QueueError::AlreadyQueued => "ALREADY_QUEUED",
            QueueError::ConnectionError => "CONNECTION_ERROR",
            QueueError::InvalidMode => "INVALID_MODE",
            QueueError::Unauthenticated => "UNAUTHENTICATED",
            QueueError::InGame => "IN_GAME",
            QueueError::NotQueued => "NOT_QUEUED",
        }
    }
}

/// Acceptance details echoed to a newly queued player.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuePlacement {
    pub queue_id: String,
    /// 1-based position.
    pub position: usize,
    pub estimated_wait_ms: u64,
}

/// A queued request; unique per player across all modes.
#[derive(Debug, Clone)]
pub struct MatchRequest {
    pub player_id: String,
    pub mode: GameMode,
    pub preferences: Option<serde_json::Value>,
    pub enqueued_at_ms: u64,
    pub queue_id: String,
}

/// A reserved pairing awaiting both ready-ups.
#[derive(Debug, Clone)]
pub struct PendingMatch {
    pub match_id: String,
    pub room_id: String,
    pub mode: GameMode,
    pub players: [String; 2],
    pub ready: [bool; 2],
    /// Original queue entry time per player, reused on a policy re-queue.
    pub enqueued_at_ms: [u64; 2],
    pub created_at_ms: u64,
}

impl PendingMatch {
    pub fn opponent_of(&self, player_id: &str) -> Option<&str> {
        if self.players[0] == player_id {
            Some(&self.players[1])
        } else if self.players[1] == player_id {
            Some(&self.players[0])
        } else {
            None
        }
    }

    fn slot_of(&self, player_id: &str) -> Option<usize> {
        self.players.iter().position(|p| p == player_id)
    }

    pub fn all_ready(&self) -> bool {
        self.ready == [true, true]
    }
}

/// Result of a ready-up call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyUpdate {
    pub match_id: String,
    pub room_id: String,
    pub players: [String; 2],
    pub ready: bool,
    pub all_ready: bool,
}

/// A cancelled pairing and who went back into the queue.
#[derive(Debug, Clone)]
pub struct CancelledMatch {
    pub match_id: String,
    pub room_id: String,
    pub mode: GameMode,
    pub players: [String; 2],
    pub requeued: Vec<String>,
    pub reason: String,
}

/// The matchmaker: per-mode queues in the store, pairings in memory.
pub struct Matchmaker {
    store: Arc<dyn KeyValueStore>,
    config: GameConfig,
    requests: HashMap<String, MatchRequest>,
    pending: HashMap<String, PendingMatch>,
    pending_by_player: HashMap<String, String>,
}

impl Matchmaker {
    pub fn new(store: Arc<dyn KeyValueStore>, config: GameConfig) -> Self {
        Self {
            store,
            config,
            requests: HashMap::new(),
            pending: HashMap::new(),
            pending_by_player: HashMap::new(),
        }
    }

    fn queue_key(mode: GameMode) -> String {
        format!("matchmaking:queue:{}", mode.as_str())
    }

    /// Joins a queue. A player may wait in one queue and one pending match
    /// at most; being in a game (caller-checked) excludes both.
    pub fn join(
        &mut self,
        player_id: &str,
        mode: GameMode,
        preferences: Option<serde_json::Value>,
        in_game: bool,
        now_ms: u64,
    ) -> Result<QueuePlacement, QueueError> {
        if in_game {
            return Err(QueueError::InGame);
        }
        if self.requests.contains_key(player_id) || self.pending_by_player.contains_key(player_id)
        {
            return Err(QueueError::AlreadyQueued);
        }
        if !self.store.ping() {
            return Err(QueueError::ConnectionError);
        }

        let queue_id = format!("queue-{:08x}", rand::thread_rng().gen::<u32>());
        let key = Self::queue_key(mode);
        self.store.z_add(&key, now_ms as f64, player_id);
        self.requests.insert(
            player_id.to_string(),
            MatchRequest {
                player_id: player_id.to_string(),
                mode,
                preferences,
                enqueued_at_ms: now_ms,
                queue_id: queue_id.clone(),
            },
        );

        let position = self
            .store
            .z_range(&key, 0, -1)
            .iter()
            .position(|p| p == player_id)
            .map(|i| i + 1)
            .unwrap_or(1);

        info!("{} queued for {} at position {}", player_id, mode.as_str(), position);
        Ok(QueuePlacement {
            queue_id,
            position,
            // Crude but monotone: later positions wait longer.
            estimated_wait_ms: position as u64 * 5_000,
        })
    }

    /// Leaves the queue; returns how long the player had waited.
    pub fn leave(&mut self, player_id: &str, now_ms: u64) -> Result<u64, QueueError> {
        let Some(request) = self.requests.remove(player_id) else {
            return Err(QueueError::NotQueued);
        };
        self.store
            .z_rem(&Self::queue_key(request.mode), &[player_id]);
        info!("{} left the {} queue", player_id, request.mode.as_str());
        Ok(now_ms.saturating_sub(request.enqueued_at_ms))
    }

    /// Pops the two oldest waiters of a mode into a pending match with a
    /// reserved room id.
    pub fn try_pair(&mut self, mode: GameMode, now_ms: u64) -> Option<PendingMatch> {
        let key = Self::queue_key(mode);
        if self.store.z_card(&key) < 2 {
            return None;
        }
        let oldest = self.store.z_range(&key, 0, 1);
        let [first, second] = [oldest.first()?.clone(), oldest.get(1)?.clone()];
        self.store.z_rem(&key, &[first.as_str(), second.as_str()]);
        let first_enqueued = self
            .requests
            .remove(&first)
            .map(|r| r.enqueued_at_ms)
            .unwrap_or(now_ms);
        let second_enqueued = self
            .requests
            .remove(&second)
            .map(|r| r.enqueued_at_ms)
            .unwrap_or(now_ms);

        let mut rng = rand::thread_rng();
        let pending = PendingMatch {
            match_id: format!("match-{:08x}", rng.gen::<u32>()),
            room_id: format!("room-{:08x}", rng.gen::<u32>()),
            mode,
            players: [first.clone(), second.clone()],
            ready: [false, false],
            enqueued_at_ms: [first_enqueued, second_enqueued],
            created_at_ms: now_ms,
        };
        info!(
            "paired {} vs {} into {} ({})",
            first, second, pending.match_id, pending.room_id
        );

        self.pending_by_player
            .insert(first, pending.match_id.clone());
        self.pending_by_player
            .insert(second, pending.match_id.clone());
        self.pending
            .insert(pending.match_id.clone(), pending.clone());
        Some(pending)
    }

    /// Records a ready (or un-ready) signal for a pending match.
    pub fn set_ready(&mut self, player_id: &str, ready: bool) -> Result<ReadyUpdate, QueueError> {
        let Some(match_id) = self.pending_by_player.get(player_id) else {
            return Err(QueueError::NotQueued);
        };
        let Some(pending) = self.pending.get_mut(match_id) else {
            return Err(QueueError::NotQueued);
        };
        let Some(slot) = pending.slot_of(player_id) else {
            return Err(QueueError::NotQueued);
        };

        pending.ready[slot] = ready;
        Ok(ReadyUpdate {
            match_id: pending.match_id.clone(),
            room_id: pending.room_id.clone(),
            players: pending.players.clone(),
            ready,
            all_ready: pending.all_ready(),
        })
    }

    /// Removes a fully-ready match from the pending table so the room can
    /// be activated; the players are no longer the matchmaker's concern.
    pub fn take_ready_match(&mut self, match_id: &str) -> Option<PendingMatch> {
        let ready = self
            .pending
            .get(match_id)
            .map(|p| p.all_ready())
            .unwrap_or(false);
        if !ready {
            return None;
        }
        let pending = self.pending.remove(match_id)?;
        for player in &pending.players {
            self.pending_by_player.remove(player);
        }
        Some(pending)
    }

    /// Cancels pending matches whose ready window lapsed, re-queuing the
    /// players who had readied at their original enqueue time.
    pub fn expire_pending(&mut self, now_ms: u64) -> Vec<CancelledMatch> {
        let timeout = self.config.ready_timeout_ms;
        let expired: Vec<String> = self
            .pending
            .values()
            .filter(|p| now_ms.saturating_sub(p.created_at_ms) >= timeout)
            .map(|p| p.match_id.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|match_id| self.cancel(&match_id, "ready_timeout", now_ms))
            .collect()
    }

    /// Cancels a pending match by id. The re-queue policy applies to every
    /// cancellation reason uniformly.
    pub fn cancel(
        &mut self,
        match_id: &str,
        reason: &str,
        now_ms: u64,
    ) -> Option<CancelledMatch> {
        let pending = self.pending.remove(match_id)?;
        let mut requeued = Vec::new();

        for (slot, player) in pending.players.iter().enumerate() {
            self.pending_by_player.remove(player);
            if pending.ready[slot] {
                // Original enqueue time preserved so the wait carries over.
                let enqueued_at = pending.enqueued_at_ms[slot];
                let key = Self::queue_key(pending.mode);
                self.store.z_add(&key, enqueued_at as f64, player);
                self.requests.insert(
                    player.clone(),
                    MatchRequest {
                        player_id: player.clone(),
                        mode: pending.mode,
                        preferences: None,
                        enqueued_at_ms: enqueued_at,
                        queue_id: format!("queue-{:08x}", rand::thread_rng().gen::<u32>()),
                    },
                );
                requeued.push(player.clone());
            }
        }

        info!(
            "match {} cancelled ({}), re-queued {:?}",
            match_id, reason, requeued
        );
        Some(CancelledMatch {
            match_id: pending.match_id,
            room_id: pending.room_id,
            mode: pending.mode,
            players: pending.players,
            requeued,
            reason: reason.to_string(),
        })
    }

    /// Drops a player from wherever they wait when their socket dies.
    ///
    /// A pending match involving them is cancelled under the published
    /// policy.
    pub fn handle_disconnect(&mut self, player_id: &str, now_ms: u64) -> Option<CancelledMatch> {
        if let Some(request) = self.requests.remove(player_id) {
            self.store
                .z_rem(&Self::queue_key(request.mode), &[player_id]);
        }
        let match_id = self.pending_by_player.get(player_id)?.clone();
        // The disconnected player never gets re-queued, ready or not.
        if let Some(pending) = self.pending.get_mut(&match_id) {
            if let Some(slot) = pending.slot_of(player_id) {
                pending.ready[slot] = false;
            }
        }
        self.cancel(&match_id, "opponent_disconnected", now_ms)
    }

    /// Queue depth for one mode.
    pub fn queue_len(&self, mode: GameMode) -> usize {
        self.store.z_card(&Self::queue_key(mode))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_match_of(&self, player_id: &str) -> Option<&PendingMatch> {
        let match_id = self.pending_by_player.get(player_id)?;
        self.pending.get(match_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const NOW: u64 = 100_000;

    fn matchmaker() -> Matchmaker {
        Matchmaker::new(Arc::new(MemoryStore::new()), GameConfig::default())
    }

    #[test]
    fn test_join_reports_fifo_position() {
        let mut mm = matchmaker();
        let a = mm.join("a", GameMode::Casual, None, false, NOW).unwrap();
        let b = mm.join("b", GameMode::Casual, None, false, NOW + 1).unwrap();
        assert_eq!(a.position, 1);
        assert_eq!(b.position, 2);
        assert!(b.estimated_wait_ms >= a.estimated_wait_ms);
        assert_eq!(mm.queue_len(GameMode::Casual), 2);
    }

    #[test]
    fn test_double_join_rejected() {
        let mut mm = matchmaker();
        mm.join("a", GameMode::Casual, None, false, NOW).unwrap();
        assert_eq!(
            mm.join("a", GameMode::Ranked, None, false, NOW + 1),
            Err(QueueError::AlreadyQueued)
        );
    }

    #[test]
    fn test_join_while_in_game_rejected() {
        let mut mm = matchmaker();
        assert_eq!(
            mm.join("a", GameMode::Casual, None, true, NOW),
            Err(QueueError::InGame)
        );
    }

    #[test]
    fn test_leave_returns_wait_and_restores_size() {
        let mut mm = matchmaker();
        mm.join("a", GameMode::Casual, None, false, NOW).unwrap();
        let waited = mm.leave("a", NOW + 4_000).unwrap();
        assert_eq!(waited, 4_000);
        assert_eq!(mm.queue_len(GameMode::Casual), 0);
        assert_eq!(mm.leave("a", NOW + 5_000), Err(QueueError::NotQueued));
    }

    #[test]
    fn test_pair_pops_two_oldest() {
        let mut mm = matchmaker();
        mm.join("a", GameMode::Casual, None, false, NOW).unwrap();
        mm.join("b", GameMode::Casual, None, false, NOW + 1).unwrap();
        mm.join("c", GameMode::Casual, None, false, NOW + 2).unwrap();

        let pending = mm.try_pair(GameMode::Casual, NOW + 10).unwrap();
        assert_eq!(pending.players, ["a".to_string(), "b".to_string()]);
        assert_eq!(mm.queue_len(GameMode::Casual), 1);
        assert!(mm.try_pair(GameMode::Casual, NOW + 11).is_none());
    }

    #[test]
    fn test_modes_have_separate_queues() {
        let mut mm = matchmaker();
        mm.join("a", GameMode::Casual, None, false, NOW).unwrap();
        mm.join("b", GameMode::Ranked, None, false, NOW + 1).unwrap();
        assert!(mm.try_pair(GameMode::Casual, NOW + 10).is_none());
        assert!(mm.try_pair(GameMode::Ranked, NOW + 10).is_none());
    }

    #[test]
    fn test_ready_up_both_completes() {
        let mut mm = matchmaker();
        mm.join("a", GameMode::Casual, None, false, NOW).unwrap();
        mm.join("b", GameMode::Casual, None, false, NOW + 1).unwrap();
        let pending = mm.try_pair(GameMode::Casual, NOW + 10).unwrap();

        let first = mm.set_ready("a", true).unwrap();
        assert!(!first.all_ready);
        let second = mm.set_ready("b", true).unwrap();
        assert!(second.all_ready);

        let taken = mm.take_ready_match(&pending.match_id).unwrap();
        assert_eq!(taken.room_id, pending.room_id);
        assert_eq!(mm.pending_count(), 0);
        // Consumed: a second take yields nothing.
        assert!(mm.take_ready_match(&pending.match_id).is_none());
    }

    #[test]
    fn test_ready_without_match_rejected() {
        let mut mm = matchmaker();
        assert_eq!(mm.set_ready("ghost", true), Err(QueueError::NotQueued));
    }

    #[test]
    fn test_ready_timeout_requeues_only_ready_players() {
        let mut mm = matchmaker();
        mm.join("a", GameMode::Casual, None, false, NOW).unwrap();
        mm.join("b", GameMode::Casual, None, false, NOW + 1).unwrap();
        mm.try_pair(GameMode::Casual, NOW + 10).unwrap();
        mm.set_ready("a", true).unwrap();

        let timeout = GameConfig::default().ready_timeout_ms;
        let cancelled = mm.expire_pending(NOW + 10 + timeout);
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].reason, "ready_timeout");
        assert_eq!(cancelled[0].requeued, vec!["a".to_string()]);

        // The ready player waits again; the silent one is gone.
        assert_eq!(mm.queue_len(GameMode::Casual), 1);
        assert_eq!(mm.pending_count(), 0);
        assert_eq!(mm.set_ready("b", true), Err(QueueError::NotQueued));
    }

    #[test]
    fn test_expire_before_deadline_is_noop() {
        let mut mm = matchmaker();
        mm.join("a", GameMode::Casual, None, false, NOW).unwrap();
        mm.join("b", GameMode::Casual, None, false, NOW + 1).unwrap();
        mm.try_pair(GameMode::Casual, NOW + 10).unwrap();

        assert!(mm.expire_pending(NOW + 100).is_empty());
        assert_eq!(mm.pending_count(), 1);
    }

    #[test]
    fn test_disconnect_cancels_pending_match() {
        let mut mm = matchmaker();
        mm.join("a", GameMode::Casual, None, false, NOW).unwrap();
        mm.join("b", GameMode::Casual, None, false, NOW + 1).unwrap();
        mm.try_pair(GameMode::Casual, NOW + 10).unwrap();
        mm.set_ready("b", true).unwrap();

        let cancelled = mm.handle_disconnect("a", NOW + 100).unwrap();
        assert_eq!(cancelled.reason, "opponent_disconnected");
        // The surviving ready player goes back in line, not the leaver.
        assert_eq!(cancelled.requeued, vec!["b".to_string()]);
        assert_eq!(mm.pending_count(), 0);
    }

    #[test]
    fn test_disconnect_from_queue_removes_request() {
        let mut mm = matchmaker();
        mm.join("a", GameMode::Casual, None, false, NOW).unwrap();
        assert!(mm.handle_disconnect("a", NOW + 5).is_none());
        assert_eq!(mm.queue_len(GameMode::Casual), 0);
    }

    #[test]
    fn test_requeued_player_can_pair_again() {
        let mut mm = matchmaker();
        mm.join("a", GameMode::Casual, None, false, NOW).unwrap();
        mm.join("b", GameMode::Casual, None, false, NOW + 1).unwrap();
        mm.try_pair(GameMode::Casual, NOW + 10).unwrap();
        mm.set_ready("a", true).unwrap();

        let timeout = GameConfig::default().ready_timeout_ms;
        mm.expire_pending(NOW + 10 + timeout);

        mm.join("c", GameMode::Casual, None, false, NOW + 30_000).unwrap();
        let pending = mm.try_pair(GameMode::Casual, NOW + 30_001).unwrap();
        assert!(pending.players.contains(&"a".to_string()));
        assert!(pending.players.contains(&"c".to_string()));
    }
}
