//! Room engine: one room's lifecycle, intents, and tick-by-tick advance.
//!
//! A [`RoomEngine`] owns its [`RoomState`] outright; every mutation happens
//! through the methods here, called from the single room worker task. The
//! engine itself is synchronous and clock-free (callers pass `now_ms`), so
//! the whole state machine is unit-testable without a runtime.
//!
//! State machine:
//!
//! ```text
//! Waiting → Ready (both seats ready) → Playing (start()) → Paused ↔ Playing
//!                                                        → Finished
//! Waiting/Ready/Paused → Abandoned (0 seated)
//! ```
//!
//! Rejections are values, never panics; the caller converts them into
//! protocol errors.

use log::{info, warn};

use shared::config::GameConfig;
use shared::protocol::GameSnapshot;
use shared::types::{
    IntentFrame, PauseState, PlayerState, RoomState, RoomStatus, Seat, WinReason, Winner,
};

use crate::physics::{Simulation, TickInputs};

/// Reason a player left, shaping the transition taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveReason {
    /// Deliberate departure; the seat is forfeited immediately in game.
    Quit,
    /// Transport drop; the seat is held through the grace window.
    Disconnected,
}

/// A rejected operation, surfaced to the client as `{code, reason}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub code: &'static str,
    pub reason: String,
}

impl Rejection {
    fn new(code: &'static str, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// Events one driver tick can surface to the room worker.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    /// A goal was counted; the ball has already been re-centered.
    Goal {
        scored_by: Seat,
        score: (u16, u16),
        game_ended: bool,
    },
    /// The room reached Finished this tick.
    Finished {
        winner: Winner,
        reason: WinReason,
    },
    /// Everyone is gone; the room reached Abandoned.
    Abandoned,
}

/// Owns one room: state, pending intents, ready flags, and timers.
pub struct RoomEngine {
    state: RoomState,
    sim: Simulation,
    config: GameConfig,
    ready: [bool; 2],
    /// Latest intent per seat; the most recent frame wins and persists
    /// until replaced, so 60 Hz clients drive a 240 Hz simulation smoothly.
    intents: [Option<IntentFrame>; 2],
    /// Reconnect deadline per seat while its player is disconnected.
    grace_deadline_ms: [Option<u64>; 2],
    /// Forced-end deadline for the current pause.
    pause_deadline_ms: Option<u64>,
    /// Guards the terminal event so it is surfaced exactly once.
    end_emitted: bool,
}

impl RoomEngine {
    pub fn new(id: String, config: GameConfig, now_ms: u64) -> Self {
        Self {
            state: RoomState::new(id, now_ms),
            sim: Simulation::new(config.clone()),
            config,
            ready: [false, false],
            intents: [None, None],
            grace_deadline_ms: [None, None],
            pause_deadline_ms: None,
            end_emitted: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.state.id
    }

    pub fn status(&self) -> RoomStatus {
        self.state.status
    }

    pub fn state(&self) -> &RoomState {
        &self.state
    }

    /// Test-only mutable access for scenario setup.
    #[doc(hidden)]
    pub fn state_mut_for_test(&mut self) -> &mut RoomState {
        &mut self.state
    }

    pub fn seat_of(&self, player_id: &str) -> Option<Seat> {
        self.state.seat_of(player_id)
    }

    /// Seats a player. Only valid while Waiting, Left seat first.
    pub fn join(
        &mut self,
        player_id: String,
        character: String,
    ) -> Result<Seat, Rejection> {
        if self.state.status != RoomStatus::Waiting {
            return Err(Rejection::new(
                "ROOM_NOT_JOINABLE",
                format!("room is {:?}", self.state.status),
            ));
        }
        if self.state.seat_of(&player_id).is_some() {
            return Err(Rejection::new("ALREADY_SEATED", "player already in room"));
        }
        let Some(seat) = self.state.free_seat() else {
            return Err(Rejection::new("ROOM_FULL", "both seats taken"));
        };

        info!("room {}: {} takes seat {:?}", self.state.id, player_id, seat);
        self.state.players[seat.index()] =
            Some(PlayerState::spawn(player_id, seat, character));
        Ok(seat)
    }

    /// Removes or suspends a player depending on phase and reason.
    ///
    /// In game a departure pauses the room (the seat is kept for the grace
    /// window on a disconnect, forfeited at once on a quit). Pre-game the
    /// seat is vacated; an empty room is Abandoned.
    pub fn leave(&mut self, player_id: &str, reason: LeaveReason, now_ms: u64) -> RoomStatus {
        let Some(seat) = self.state.seat_of(player_id) else {
            return self.state.status;
        };

        match self.state.status {
            RoomStatus::Playing | RoomStatus::Paused => match reason {
                LeaveReason::Disconnected => {
                    self.grace_deadline_ms[seat.index()] =
                        Some(now_ms + self.config.disconnect_grace_ms);
                    if self.state.status == RoomStatus::Playing {
                        self.enter_pause("player_left".into(), None, now_ms);
                    }
                    info!(
                        "room {}: {} disconnected, grace until +{}ms",
                        self.state.id, player_id, self.config.disconnect_grace_ms
                    );
                }
                LeaveReason::Quit => {
                    self.finish(WinReason::Forfeit, Some(seat), now_ms);
                }
            },
            RoomStatus::Waiting | RoomStatus::Ready => {
                self.state.players[seat.index()] = None;
                self.ready[seat.index()] = false;
                self.intents[seat.index()] = None;
                if self.state.seated_count() == 0 {
                    self.state.status = RoomStatus::Abandoned;
                    self.state.ended_at_ms = Some(now_ms);
                } else {
                    // A vacated seat reopens the room.
                    self.state.status = RoomStatus::Waiting;
                }
            }
            RoomStatus::Finished | RoomStatus::Abandoned => {}
        }
        self.state.status
    }

    /// Marks a seat ready; both ready while Waiting moves the room to Ready.
    ///
    /// Re-sending the same readiness is a no-op, so the call is idempotent.
    pub fn set_ready(&mut self, player_id: &str, ready: bool) -> Result<RoomStatus, Rejection> {
        let Some(seat) = self.state.seat_of(player_id) else {
            return Err(Rejection::new("NOT_IN_ROOM", "player not seated here"));
        };
        if !matches!(self.state.status, RoomStatus::Waiting | RoomStatus::Ready) {
            return Err(Rejection::new(
                "WRONG_STATE",
                format!("cannot ready while {:?}", self.state.status),
            ));
        }

        self.ready[seat.index()] = ready;
        self.state.status = if self.state.seated_count() == 2 && self.ready == [true, true] {
            RoomStatus::Ready
        } else {
            RoomStatus::Waiting
        };
        Ok(self.state.status)
    }

    /// Kickoff: Ready → Playing with everyone at spawn marks.
    pub fn start(&mut self, now_ms: u64) -> Result<(), Rejection> {
        if self.state.status != RoomStatus::Ready {
            return Err(Rejection::new(
                "WRONG_STATE",
                format!("cannot start while {:?}", self.state.status),
            ));
        }
        self.sim.spawn(&mut self.state);
        self.state.status = RoomStatus::Playing;
        self.state.started_at_ms = Some(now_ms);
        info!("room {}: game started", self.state.id);
        Ok(())
    }

    /// Records the latest intent frame; newer frames replace older ones.
    pub fn input(&mut self, player_id: &str, frame: IntentFrame) -> Result<(), Rejection> {
        let Some(seat) = self.state.seat_of(player_id) else {
            return Err(Rejection::new("NOT_IN_ROOM", "player not seated here"));
        };
        self.intents[seat.index()] = Some(frame);
        Ok(())
    }

    /// Pauses a running game on a player's request.
    pub fn pause(
        &mut self,
        requested_by: &str,
        reason: String,
        now_ms: u64,
    ) -> Result<(), Rejection> {
        if self.state.seat_of(requested_by).is_none() {
            return Err(Rejection::new("NOT_IN_ROOM", "player not seated here"));
        }
        if self.state.status != RoomStatus::Playing {
            return Err(Rejection::new(
                "WRONG_STATE",
                format!("cannot pause while {:?}", self.state.status),
            ));
        }
        self.enter_pause(reason, Some(requested_by.to_string()), now_ms);
        Ok(())
    }

    /// Resumes a paused game. Only the pauser may resume a player-requested
    /// pause; server-initiated pauses resume when the absent player returns.
    pub fn resume(&mut self, requested_by: &str) -> Result<(), Rejection> {
        if self.state.status != RoomStatus::Paused {
            return Err(Rejection::new(
                "WRONG_STATE",
                format!("cannot resume while {:?}", self.state.status),
            ));
        }
        match self.state.pause.as_ref().map(|p| p.requested_by.as_deref()) {
            Some(Some(pauser)) if pauser != requested_by => {
                return Err(Rejection::new("NOT_PAUSER", "only the pauser may resume"))
            }
            Some(None) => {
                return Err(Rejection::new(
                    "NOT_PAUSER",
                    "pause is server-initiated, wait for reconnect",
                ))
            }
            _ => {}
        }
        self.exit_pause();
        Ok(())
    }

    /// Re-seats a returning player inside the grace window.
    ///
    /// Returns `true` when the reconnect was accepted; the room resumes once
    /// no seat remains in grace.
    pub fn reconnect(&mut self, player_id: &str) -> bool {
        let Some(seat) = self.state.seat_of(player_id) else {
            return false;
        };
        if self.grace_deadline_ms[seat.index()].is_none() {
            return false;
        }
        self.grace_deadline_ms[seat.index()] = None;
        info!("room {}: {} reconnected", self.state.id, player_id);

        let server_pause = self
            .state
            .pause
            .as_ref()
            .map(|p| p.requested_by.is_none())
            .unwrap_or(false);
        if self.state.status == RoomStatus::Paused
            && server_pause
            && self.grace_deadline_ms.iter().all(|g| g.is_none())
        {
            self.exit_pause();
        }
        true
    }

    /// Ends the game now. `against` names the losing seat when the reason
    /// singles one out; otherwise the score decides (Draw on a tie).
    pub fn force_end(&mut self, reason: WinReason, against: Option<Seat>, now_ms: u64) {
        if self.state.status.is_terminal() {
            return;
        }
        self.finish(reason, against, now_ms);
    }

    /// Applies an advisory ball update that already passed the
    /// plausibility gate. The speed ceiling still applies.
    pub fn apply_ball_update(&mut self, position: shared::types::Vec2, velocity: shared::types::Vec2) {
        if self.state.status != RoomStatus::Playing {
            return;
        }
        self.state.ball.position = position;
        self.state.ball.velocity =
            velocity.clamp_length(shared::constants::MAX_BALL_SPEED);
    }

    /// Rounded, broadcast-ready view of the room.
    pub fn snapshot(&self, now_ms: u64) -> GameSnapshot {
        GameSnapshot::from_room(&self.state, now_ms)
    }

    /// One driver tick: timers first, then exactly one simulation step when
    /// Playing. Never more than one step per call, whatever the wall clock
    /// did; bounded drift is preferred over catch-up bursts.
    pub fn advance(&mut self, now_ms: u64) -> Vec<RoomEvent> {
        let mut events = Vec::new();

        // Grace expiry forfeits the absent seat, in seat order.
        for seat in [Seat::Left, Seat::Right] {
            if let Some(deadline) = self.grace_deadline_ms[seat.index()] {
                if now_ms >= deadline && !self.state.status.is_terminal() {
                    warn!(
                        "room {}: seat {:?} grace expired, forfeiting",
                        self.state.id, seat
                    );
                    self.finish(WinReason::Disconnection, Some(seat), now_ms);
                }
            }
        }

        // Pause timeout: technical loss for the pauser.
        if self.state.status == RoomStatus::Paused {
            if let Some(deadline) = self.pause_deadline_ms {
                if now_ms >= deadline {
                    let against = self
                        .state
                        .pause
                        .as_ref()
                        .and_then(|p| p.requested_by.as_deref())
                        .and_then(|id| self.state.seat_of(id));
                    warn!("room {}: pause timed out", self.state.id);
                    self.finish(WinReason::TechnicalIssue, against, now_ms);
                }
            }
        }

        if self.state.status == RoomStatus::Playing {
            let inputs = TickInputs {
                left: self.intents[0].as_ref().map(|f| f.keys),
                right: self.intents[1].as_ref().map(|f| f.keys),
            };
            let tick = self.sim.tick(&mut self.state, &inputs);
            self.state.game_time_ms += self.config.dt_ms();

            if let Some(side) = tick.goal_for {
                self.state.ball.reset();
                events.push(RoomEvent::Goal {
                    scored_by: side,
                    score: self.state.score,
                    game_ended: tick.finished.is_some(),
                });
            }
            if tick.finished.is_some() {
                self.state.ended_at_ms = Some(now_ms);
            }
        }

        // Surface the terminal transition exactly once, wherever it came
        // from (simulation end check, grace expiry, pause timeout, leave).
        if self.state.status.is_terminal() && !self.end_emitted {
            self.end_emitted = true;
            match (self.state.status, self.state.winner, self.state.win_reason) {
                (RoomStatus::Finished, Some(winner), Some(reason)) => {
                    info!(
                        "room {}: finished {:?} ({:?})",
                        self.state.id, winner, reason
                    );
                    events.push(RoomEvent::Finished { winner, reason });
                }
                _ => events.push(RoomEvent::Abandoned),
            }
        }

        events
    }

    fn enter_pause(&mut self, reason: String, requested_by: Option<String>, now_ms: u64) {
        self.state.pause = Some(PauseState {
            reason,
            since_ms: now_ms,
            requested_by,
        });
        self.pause_deadline_ms = Some(now_ms + self.config.pause_timeout_ms);
        self.state.status = RoomStatus::Paused;
    }

    fn exit_pause(&mut self) {
        self.state.pause = None;
        self.pause_deadline_ms = None;
        self.state.status = RoomStatus::Playing;
    }

    fn finish(&mut self, reason: WinReason, against: Option<Seat>, now_ms: u64) {
        let winner = match against {
            Some(loser) => Winner::from_seat(loser.other()),
            None => self.state.leader(),
        };
        self.state.status = RoomStatus::Finished;
        self.state.winner = Some(winner);
        self.state.win_reason = Some(reason);
        self.state.ended_at_ms = Some(now_ms);
        self.state.pause = None;
        self.pause_deadline_ms = None;
        self.grace_deadline_ms = [None, None];
        info!(
            "room {}: force end {:?}, winner {:?}",
            self.state.id, reason, winner
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::types::InputKeys;

    const NOW: u64 = 1_000_000;

    fn cfg() -> GameConfig {
        GameConfig::default()
    }

    fn engine() -> RoomEngine {
        RoomEngine::new("room-1".into(), cfg(), NOW)
    }

    fn seated_engine() -> RoomEngine {
        let mut e = engine();
        e.join("a".into(), "classic".into()).unwrap();
        e.join("b".into(), "retro".into()).unwrap();
        e
    }

    fn playing_engine() -> RoomEngine {
        let mut e = seated_engine();
        e.set_ready("a", true).unwrap();
        e.set_ready("b", true).unwrap();
        e.start(NOW).unwrap();
        e
    }

    fn frame(keys: InputKeys) -> IntentFrame {
        IntentFrame {
            keys,
            timestamp: NOW,
            sequence_id: None,
        }
    }

    #[test]
    fn test_join_assigns_left_then_right() {
        let mut e = engine();
        assert_eq!(e.join("a".into(), String::new()).unwrap(), Seat::Left);
        assert_eq!(e.join("b".into(), String::new()).unwrap(), Seat::Right);
        assert_eq!(e.join("c".into(), String::new()).unwrap_err().code, "ROOM_FULL");
    }

    #[test]
    fn test_double_join_rejected() {
        let mut e = engine();
        e.join("a".into(), String::new()).unwrap();
        assert_eq!(
            e.join("a".into(), String::new()).unwrap_err().code,
            "ALREADY_SEATED"
        );
    }

    #[test]
    fn test_ready_both_moves_to_ready() {
        let mut e = seated_engine();
        assert_eq!(e.set_ready("a", true).unwrap(), RoomStatus::Waiting);
        assert_eq!(e.set_ready("b", true).unwrap(), RoomStatus::Ready);
    }

    #[test]
    fn test_ready_is_idempotent() {
        let mut e = seated_engine();
        e.set_ready("a", true).unwrap();
        let first = e.set_ready("b", true).unwrap();
        let second = e.set_ready("b", true).unwrap();
        assert_eq!(first, second);
        assert_eq!(e.status(), RoomStatus::Ready);
    }

    #[test]
    fn test_unready_drops_back_to_waiting() {
        let mut e = seated_engine();
        e.set_ready("a", true).unwrap();
        e.set_ready("b", true).unwrap();
        assert_eq!(e.set_ready("a", false).unwrap(), RoomStatus::Waiting);
    }

    #[test]
    fn test_start_requires_ready() {
        let mut e = seated_engine();
        assert_eq!(e.start(NOW).unwrap_err().code, "WRONG_STATE");
        e.set_ready("a", true).unwrap();
        e.set_ready("b", true).unwrap();
        e.start(NOW).unwrap();
        assert_eq!(e.status(), RoomStatus::Playing);
        assert_eq!(e.state().started_at_ms, Some(NOW));
    }

    #[test]
    fn test_join_rejected_after_start() {
        let mut e = playing_engine();
        e.leave("a", LeaveReason::Quit, NOW);
        // Even with a free outcome the room is terminal, not joinable.
        assert!(e.join("c".into(), String::new()).is_err());
    }

    #[test]
    fn test_game_time_advances_only_while_playing() {
        let mut e = seated_engine();
        e.advance(NOW);
        assert_eq!(e.state().game_time_ms, 0.0);

        let mut e = playing_engine();
        e.advance(NOW + 4);
        assert!(e.state().game_time_ms > 0.0);
        let t = e.state().game_time_ms;

        e.pause("a", "timeout".into(), NOW + 8).unwrap();
        for i in 0..10 {
            e.advance(NOW + 10 + i);
        }
        assert_eq!(e.state().game_time_ms, t);
    }

    #[test]
    fn test_pause_resume_round_trip_preserves_game_time() {
        let mut e = playing_engine();
        for i in 0..100 {
            e.advance(NOW + i);
        }
        let t = e.state().game_time_ms;

        e.pause("a", "break".into(), NOW + 100).unwrap();
        e.advance(NOW + 101);
        e.resume("a").unwrap();
        assert_eq!(e.status(), RoomStatus::Playing);
        assert_eq!(e.state().game_time_ms, t);
    }

    #[test]
    fn test_only_pauser_resumes() {
        let mut e = playing_engine();
        e.pause("a", "break".into(), NOW).unwrap();
        assert_eq!(e.resume("b").unwrap_err().code, "NOT_PAUSER");
        e.resume("a").unwrap();
    }

    #[test]
    fn test_pause_requires_playing() {
        let mut e = seated_engine();
        assert_eq!(
            e.pause("a", "break".into(), NOW).unwrap_err().code,
            "WRONG_STATE"
        );
    }

    #[test]
    fn test_pause_timeout_ends_with_technical_issue() {
        let mut e = playing_engine();
        e.pause("a", "afk".into(), NOW).unwrap();

        let deadline = NOW + cfg().pause_timeout_ms;
        let events = e.advance(deadline);
        assert_eq!(e.status(), RoomStatus::Finished);
        assert_eq!(e.state().win_reason, Some(WinReason::TechnicalIssue));
        // Non-pauser wins.
        assert_eq!(e.state().winner, Some(Winner::Right));
        assert!(events
            .iter()
            .any(|ev| matches!(ev, RoomEvent::Finished { .. })));
    }

    #[test]
    fn test_disconnect_pauses_then_grace_forfeits() {
        let mut e = playing_engine();
        let status = e.leave("a", LeaveReason::Disconnected, NOW);
        assert_eq!(status, RoomStatus::Paused);
        assert_eq!(e.state().pause.as_ref().unwrap().reason, "player_left");

        // Before the grace deadline nothing happens.
        let events = e.advance(NOW + cfg().disconnect_grace_ms - 1);
        assert!(events.is_empty());
        assert_eq!(e.status(), RoomStatus::Paused);

        // At the deadline the absent player forfeits.
        let events = e.advance(NOW + cfg().disconnect_grace_ms);
        assert_eq!(e.status(), RoomStatus::Finished);
        assert_eq!(e.state().winner, Some(Winner::Right));
        assert_eq!(e.state().win_reason, Some(WinReason::Disconnection));
        assert!(events
            .iter()
            .any(|ev| matches!(ev, RoomEvent::Finished { .. })));
    }

    #[test]
    fn test_reconnect_within_grace_resumes() {
        let mut e = playing_engine();
        e.leave("a", LeaveReason::Disconnected, NOW);
        assert_eq!(e.status(), RoomStatus::Paused);

        assert!(e.reconnect("a"));
        assert_eq!(e.status(), RoomStatus::Playing);
        let events = e.advance(NOW + cfg().disconnect_grace_ms + 10);
        assert!(!events
            .iter()
            .any(|ev| matches!(ev, RoomEvent::Finished { .. })));
    }

    #[test]
    fn test_reconnect_unknown_player_ignored() {
        let mut e = playing_engine();
        assert!(!e.reconnect("z"));
    }

    #[test]
    fn test_quit_in_game_forfeits_immediately() {
        let mut e = playing_engine();
        e.leave("b", LeaveReason::Quit, NOW);
        assert_eq!(e.status(), RoomStatus::Finished);
        assert_eq!(e.state().winner, Some(Winner::Left));
        assert_eq!(e.state().win_reason, Some(WinReason::Forfeit));
    }

    #[test]
    fn test_pregame_leave_empties_to_abandoned() {
        let mut e = seated_engine();
        assert_eq!(e.leave("a", LeaveReason::Quit, NOW), RoomStatus::Waiting);
        assert_eq!(e.leave("b", LeaveReason::Quit, NOW), RoomStatus::Abandoned);
    }

    #[test]
    fn test_force_end_draw_from_equal_score() {
        let mut e = playing_engine();
        e.force_end(WinReason::MutualAgreement, None, NOW);
        assert_eq!(e.state().winner, Some(Winner::Draw));
        assert_eq!(e.state().win_reason, Some(WinReason::MutualAgreement));
    }

    #[test]
    fn test_force_end_on_terminal_room_is_noop() {
        let mut e = playing_engine();
        e.force_end(WinReason::MutualAgreement, None, NOW);
        e.force_end(WinReason::Forfeit, Some(Seat::Left), NOW + 1);
        // First terminal transition wins.
        assert_eq!(e.state().win_reason, Some(WinReason::MutualAgreement));
    }

    #[test]
    fn test_latest_intent_wins() {
        let mut e = playing_engine();
        e.input(
            "a",
            frame(InputKeys {
                left: true,
                ..Default::default()
            }),
        )
        .unwrap();
        e.input(
            "a",
            frame(InputKeys {
                right: true,
                ..Default::default()
            }),
        )
        .unwrap();

        let x_before = e.state().player(Seat::Left).unwrap().position.x;
        for i in 0..240 {
            e.advance(NOW + i);
        }
        // Only the newer (rightward) intent applied.
        assert!(e.state().player(Seat::Left).unwrap().position.x > x_before);
    }

    #[test]
    fn test_input_from_stranger_rejected() {
        let mut e = playing_engine();
        assert_eq!(
            e.input("z", frame(InputKeys::default())).unwrap_err().code,
            "NOT_IN_ROOM"
        );
    }

    #[test]
    fn test_goal_event_recenters_ball() {
        let mut e = playing_engine();
        // Plant the ball inside the right mouth.
        e.state.ball.position = shared::types::Vec2::new(1560.0, 700.0);
        e.state.ball.velocity = shared::types::Vec2::ZERO;

        let events = e.advance(NOW);
        let goal = events
            .iter()
            .find_map(|ev| match ev {
                RoomEvent::Goal {
                    scored_by, score, ..
                } => Some((*scored_by, *score)),
                _ => None,
            })
            .expect("goal should fire");
        assert_eq!(goal.0, Seat::Left);
        assert_eq!(goal.1, (1, 0));
        // Ball back at center spawn with zero velocity.
        assert_eq!(e.state().ball.position.x, shared::constants::FIELD_WIDTH / 2.0);
        assert_eq!(e.state().ball.velocity, shared::types::Vec2::ZERO);
    }

    #[test]
    fn test_snapshot_reflects_status() {
        let e = playing_engine();
        let snap = e.snapshot(NOW);
        assert_eq!(snap.game_state, "PLAYING");
        assert_eq!(snap.players.len(), 2);
    }
}
