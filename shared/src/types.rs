//! Core game entities shared by the simulator, room engine, and protocol.
//!
//! Everything here is plain data: positions, velocities, and the room record
//! the server mutates tick by tick. The types derive `Serialize`/`Deserialize`
//! so diagnostic tooling can dump them, but the broadcast wire shape lives in
//! [`crate::protocol`] and is built from these via `snapshot` conversions.

use serde::{Deserialize, Serialize};

use crate::constants::{
    BALL_RADIUS, BALL_SPAWN_Y, BALL_TRAIL_LEN, FIELD_WIDTH, PLAYER_SPAWN_Y,
};

/// 2-D vector, origin top-left, units pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Distance to another point.
    pub fn distance(&self, other: Vec2) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Scales the vector so its length does not exceed `max`.
    ///
    /// Zero-length vectors are returned unchanged.
    pub fn clamp_length(&self, max: f32) -> Vec2 {
        let len = self.length();
        if len > max && len > f32::EPSILON {
            let scale = max / len;
            Vec2::new(self.x * scale, self.y * scale)
        } else {
            *self
        }
    }
}

/// A player's side within a room, determining spawn and goal side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Seat {
    Left,
    Right,
}

impl Seat {
    /// The opposite seat.
    pub fn other(&self) -> Seat {
        match self {
            Seat::Left => Seat::Right,
            Seat::Right => Seat::Left,
        }
    }

    /// Spawn x-coordinate: quarter mark for Left, three-quarter for Right.
    pub fn spawn_x(&self) -> f32 {
        match self {
            Seat::Left => FIELD_WIDTH * 0.25,
            Seat::Right => FIELD_WIDTH * 0.75,
        }
    }

    /// Facing direction on spawn: each player faces the opposing goal.
    pub fn spawn_facing(&self) -> i8 {
        match self {
            Seat::Left => 1,
            Seat::Right => -1,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Seat::Left => 0,
            Seat::Right => 1,
        }
    }
}

/// The set of keys a player currently holds, consumed by the next tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputKeys {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub kick: bool,
}

/// One intent frame from a client: held keys plus transmission metadata.
///
/// Only the most recent frame per player is retained per tick; older frames
/// arriving in the same window are dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntentFrame {
    pub keys: InputKeys,
    /// Client clock, milliseconds.
    pub timestamp: u64,
    /// Client-side sequence number, echoed in movement acknowledgments.
    pub sequence_id: Option<u64>,
}

/// Per-room, per-player simulation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerState {
    /// Opaque session-stable identifier.
    pub id: String,
    pub position: Vec2,
    pub velocity: Vec2,
    /// ±1; flips to follow horizontal input.
    pub facing: i8,
    pub on_ground: bool,
    /// Set when a kick intent is accepted, consumed by the simulator.
    pub kicking: bool,
    /// Remaining cooldown; non-increasing between kicks.
    pub kick_cooldown_ms: f32,
    /// Opaque cosmetic identifier echoed in snapshots.
    pub character: String,
    pub seat: Seat,
}

impl PlayerState {
    /// Creates a player seated at the spawn mark for `seat`, at rest.
    pub fn spawn(id: String, seat: Seat, character: String) -> Self {
        Self {
            id,
            position: Vec2::new(seat.spawn_x(), PLAYER_SPAWN_Y),
            velocity: Vec2::ZERO,
            facing: seat.spawn_facing(),
            on_ground: true,
            kicking: false,
            kick_cooldown_ms: 0.0,
            character,
            seat,
        }
    }
}

/// Fixed-capacity ring of the last [`BALL_TRAIL_LEN`] ball positions.
///
/// Pushing beyond capacity evicts the oldest entry. Iteration and the
/// snapshot copy run oldest to newest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trail {
    points: Vec<Vec2>,
    head: usize,
}

impl Trail {
    pub fn new() -> Self {
        Self {
            points: Vec::with_capacity(BALL_TRAIL_LEN),
            head: 0,
        }
    }

    pub fn push(&mut self, point: Vec2) {
        if self.points.len() < BALL_TRAIL_LEN {
            self.points.push(point);
        } else {
            self.points[self.head] = point;
            self.head = (self.head + 1) % BALL_TRAIL_LEN;
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Copies the retained points, oldest first.
    pub fn to_vec(&self) -> Vec<Vec2> {
        let mut out = Vec::with_capacity(self.points.len());
        for i in 0..self.points.len() {
            out.push(self.points[(self.head + i) % self.points.len().max(1)]);
        }
        out
    }
}

impl Default for Trail {
    fn default() -> Self {
        Self::new()
    }
}

/// The ball's simulation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BallState {
    pub position: Vec2,
    pub velocity: Vec2,
    /// Accumulated rotation, radians.
    pub rotation: f32,
    /// Rotation speed, radians/second, proportional to horizontal velocity.
    pub rotation_speed: f32,
    pub trail: Trail,
    /// Authority hint for disputed client ball updates.
    pub last_touched_by: Option<String>,
}

impl BallState {
    /// Ball centered at the spawn point, at rest.
    pub fn spawn() -> Self {
        Self {
            position: Vec2::new(FIELD_WIDTH / 2.0, BALL_SPAWN_Y),
            velocity: Vec2::ZERO,
            rotation: 0.0,
            rotation_speed: 0.0,
            trail: Trail::new(),
            last_touched_by: None,
        }
    }

    /// Re-centers the ball after a goal: spawn position, zero motion.
    ///
    /// The trail and touch authority reset with it.
    pub fn reset(&mut self) {
        *self = BallState::spawn();
    }

    pub fn radius(&self) -> f32 {
        BALL_RADIUS
    }
}

/// Room lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomStatus {
    Waiting,
    Ready,
    Playing,
    Paused,
    Finished,
    Abandoned,
}

impl RoomStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RoomStatus::Finished | RoomStatus::Abandoned)
    }

    /// Wire label used in the `gameState` snapshot field.
    pub fn wire_label(&self) -> &'static str {
        match self {
            RoomStatus::Waiting | RoomStatus::Ready => "WAITING",
            RoomStatus::Playing => "PLAYING",
            RoomStatus::Paused => "PAUSED",
            RoomStatus::Finished | RoomStatus::Abandoned => "FINISHED",
        }
    }
}

/// Why a finished game ended the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinReason {
    ScoreLimit,
    TimeLimit,
    Forfeit,
    Disconnection,
    MutualAgreement,
    TechnicalIssue,
}

/// Outcome of a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Left,
    Right,
    Draw,
}

impl Winner {
    pub fn from_seat(seat: Seat) -> Winner {
        match seat {
            Seat::Left => Winner::Left,
            Seat::Right => Winner::Right,
        }
    }
}

/// An active pause, recorded so only the pauser (or a timeout) may resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PauseState {
    pub reason: String,
    /// Wall clock, milliseconds.
    pub since_ms: u64,
    /// Absent when the pause was initiated by the server (e.g. a disconnect).
    pub requested_by: Option<String>,
}

/// The authoritative per-room record the simulation advances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomState {
    pub id: String,
    /// Seats in order (Left, Right); `None` until a player joins.
    pub players: [Option<PlayerState>; 2],
    pub ball: BallState,
    /// (left, right).
    pub score: (u16, u16),
    /// Simulated time since kickoff, excludes pauses.
    pub game_time_ms: f64,
    pub status: RoomStatus,
    /// Game-clock time of the last counted goal, for the cooldown interlock.
    pub last_goal_ms: Option<f64>,
    pub pause: Option<PauseState>,
    pub created_at_ms: u64,
    pub started_at_ms: Option<u64>,
    pub ended_at_ms: Option<u64>,
    pub winner: Option<Winner>,
    pub win_reason: Option<WinReason>,
}

impl RoomState {
    pub fn new(id: String, created_at_ms: u64) -> Self {
        Self {
            id,
            players: [None, None],
            ball: BallState::spawn(),
            score: (0, 0),
            game_time_ms: 0.0,
            status: RoomStatus::Waiting,
            last_goal_ms: None,
            pause: None,
            created_at_ms,
            started_at_ms: None,
            ended_at_ms: None,
            winner: None,
            win_reason: None,
        }
    }

    pub fn player(&self, seat: Seat) -> Option<&PlayerState> {
        self.players[seat.index()].as_ref()
    }

    pub fn player_mut(&mut self, seat: Seat) -> Option<&mut PlayerState> {
        self.players[seat.index()].as_mut()
    }

    /// Seat held by `player_id`, if seated here.
    pub fn seat_of(&self, player_id: &str) -> Option<Seat> {
        for seat in [Seat::Left, Seat::Right] {
            if let Some(p) = self.player(seat) {
                if p.id == player_id {
                    return Some(seat);
                }
            }
        }
        None
    }

    pub fn seated_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_some()).count()
    }

    /// First free seat in (Left, Right) order.
    pub fn free_seat(&self) -> Option<Seat> {
        if self.players[0].is_none() {
            Some(Seat::Left)
        } else if self.players[1].is_none() {
            Some(Seat::Right)
        } else {
            None
        }
    }

    /// Winner derived from the current score; `Draw` on a tie.
    pub fn leader(&self) -> Winner {
        use std::cmp::Ordering;
        match self.score.0.cmp(&self.score.1) {
            Ordering::Greater => Winner::Left,
            Ordering::Less => Winner::Right,
            Ordering::Equal => Winner::Draw,
        }
    }
}

/// Rounds to one decimal place, the broadcast precision for positions.
pub fn round1(v: f32) -> f32 {
    (v * 10.0).round() / 10.0
}

/// Rounds to two decimal places, the broadcast precision for rotation.
pub fn round2(v: f32) -> f32 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FLOOR_Y;

    #[test]
    fn test_player_spawn_positions() {
        let left = PlayerState::spawn("a".into(), Seat::Left, "classic".into());
        let right = PlayerState::spawn("b".into(), Seat::Right, "classic".into());

        assert_eq!(left.position.x, FIELD_WIDTH * 0.25);
        assert_eq!(right.position.x, FIELD_WIDTH * 0.75);
        assert!(left.on_ground);
        assert!(left.position.y < FLOOR_Y);
        assert_eq!(left.facing, 1);
        assert_eq!(right.facing, -1);
    }

    #[test]
    fn test_ball_spawn_centered_at_rest() {
        let ball = BallState::spawn();
        assert_eq!(ball.position, Vec2::new(FIELD_WIDTH / 2.0, BALL_SPAWN_Y));
        assert_eq!(ball.velocity, Vec2::ZERO);
        assert!(ball.trail.is_empty());
        assert!(ball.last_touched_by.is_none());
    }

    #[test]
    fn test_trail_evicts_oldest() {
        let mut trail = Trail::new();
        for i in 0..15 {
            trail.push(Vec2::new(i as f32, 0.0));
        }

        assert_eq!(trail.len(), BALL_TRAIL_LEN);
        let points = trail.to_vec();
        // Entries 0..5 were evicted; the ring holds 5..15 oldest-first.
        assert_eq!(points[0].x, 5.0);
        assert_eq!(points[BALL_TRAIL_LEN - 1].x, 14.0);
    }

    #[test]
    fn test_trail_partial_fill_keeps_order() {
        let mut trail = Trail::new();
        trail.push(Vec2::new(1.0, 0.0));
        trail.push(Vec2::new(2.0, 0.0));
        let points = trail.to_vec();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].x, 1.0);
        assert_eq!(points[1].x, 2.0);
    }

    #[test]
    fn test_seat_assignment_order() {
        let mut room = RoomState::new("room-1".into(), 0);
        assert_eq!(room.free_seat(), Some(Seat::Left));

        room.players[0] = Some(PlayerState::spawn("a".into(), Seat::Left, String::new()));
        assert_eq!(room.free_seat(), Some(Seat::Right));

        room.players[1] = Some(PlayerState::spawn("b".into(), Seat::Right, String::new()));
        assert_eq!(room.free_seat(), None);
        assert_eq!(room.seat_of("a"), Some(Seat::Left));
        assert_eq!(room.seat_of("b"), Some(Seat::Right));
        assert_eq!(room.seat_of("c"), None);
    }

    #[test]
    fn test_leader_from_score() {
        let mut room = RoomState::new("room-1".into(), 0);
        assert_eq!(room.leader(), Winner::Draw);
        room.score = (3, 1);
        assert_eq!(room.leader(), Winner::Left);
        room.score = (3, 5);
        assert_eq!(room.leader(), Winner::Right);
    }

    #[test]
    fn test_vec2_clamp_length() {
        let v = Vec2::new(300.0, 400.0); // length 500
        let clamped = v.clamp_length(100.0);
        assert!((clamped.length() - 100.0).abs() < 0.01);

        let small = Vec2::new(3.0, 4.0);
        assert_eq!(small.clamp_length(100.0), small);
    }

    #[test]
    fn test_status_wire_labels() {
        assert_eq!(RoomStatus::Waiting.wire_label(), "WAITING");
        assert_eq!(RoomStatus::Ready.wire_label(), "WAITING");
        assert_eq!(RoomStatus::Playing.wire_label(), "PLAYING");
        assert_eq!(RoomStatus::Paused.wire_label(), "PAUSED");
        assert_eq!(RoomStatus::Abandoned.wire_label(), "FINISHED");
    }

    #[test]
    fn test_rounding_precision() {
        assert_eq!(round1(123.456), 123.5);
        assert_eq!(round2(1.2345), 1.23);
    }
}
