//! Wire protocol between clients and the server.
//!
//! Frames are JSON objects of the form `{"event": <name>, "data": <payload>}`
//! carried over a reliable ordered message channel (WebSocket). The event
//! names are the protocol; the enums here are their typed in-process form,
//! with the string names kept only as serde wire labels. The router validates
//! raw frames against its rule table before decoding into [`ClientEvent`],
//! so the simulator never sees an unchecked payload.
//!
//! ## Protocol Categories
//!
//! - **Session**: `authenticate`, heartbeat `ping_latency`/`pong_latency`
//! - **Matchmaking**: queue join/leave, ready-up, match notifications
//! - **Gameplay**: intent frames, advisory movement/ball updates, goal
//!   attempts, pause/resume, forfeit
//! - **Broadcast**: the per-tick `gameState` snapshot and lifecycle events

use serde::{Deserialize, Serialize};

use crate::types::{
    round1, round2, InputKeys, RoomState, Seat, Vec2, WinReason, Winner,
};

/// Matchmaking queues the server operates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    Casual,
    Ranked,
    Tournament,
}

impl GameMode {
    pub const ALL: [GameMode; 3] = [GameMode::Casual, GameMode::Ranked, GameMode::Tournament];

    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Casual => "casual",
            GameMode::Ranked => "ranked",
            GameMode::Tournament => "tournament",
        }
    }

    pub fn parse(s: &str) -> Option<GameMode> {
        match s {
            "casual" => Some(GameMode::Casual),
            "ranked" => Some(GameMode::Ranked),
            "tournament" => Some(GameMode::Tournament),
            _ => None,
        }
    }
}

/// Chat visibility scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatScope {
    All,
    Team,
    Private,
}

/// Reasons a client may give when requesting a cooperative game end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndRequestReason {
    TimeUp,
    MutualAgreement,
    AdminRequest,
}

// === Ingress payloads (client → server) ===

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatePayload {
    pub player_id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinMatchmakingPayload {
    pub game_mode: GameMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<serde_json::Value>,
    #[serde(default)]
    pub timestamp: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveMatchmakingPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyUpPayload {
    /// Absent means ready.
    #[serde(default)]
    pub ready: Option<bool>,
}

impl ReadyUpPayload {
    pub fn is_ready(&self) -> bool {
        self.ready.unwrap_or(true)
    }
}

/// Intent form: the held keys for the next tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInputPayload {
    pub keys: InputKeys,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_id: Option<u64>,
}

/// Movement form: either intent keys or an advisory position/velocity claim.
///
/// When both forms are present the intent form wins for authoritative
/// simulation; the positional claim still runs through the plausibility gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerMovementPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<InputKeys>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vec2>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<Vec2>,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallUpdatePayload {
    pub position: Vec2,
    pub velocity: Vec2,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spin: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalAttemptPayload {
    pub position: Vec2,
    /// Claimed shot power, 0–100.
    pub power: f32,
    pub direction: f32,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessagePayload {
    pub message: String,
    #[serde(rename = "type")]
    pub scope: ChatScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default)]
    pub timestamp: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseRequestPayload {
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResumeRequestPayload {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForfeitGamePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestGameEndPayload {
    pub reason: EndRequestReason,
    #[serde(default)]
    pub confirmed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_code: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRefPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingLatencyPayload {
    pub client_time: u64,
}

/// Every message a client may send, tagged by its wire event name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    Authenticate(AuthenticatePayload),
    JoinMatchmaking(JoinMatchmakingPayload),
    LeaveMatchmaking(LeaveMatchmakingPayload),
    ReadyUp(ReadyUpPayload),
    PlayerInput(PlayerInputPayload),
    PlayerMovement(PlayerMovementPayload),
    BallUpdate(BallUpdatePayload),
    GoalAttempt(GoalAttemptPayload),
    ChatMessage(ChatMessagePayload),
    PauseRequest(PauseRequestPayload),
    ResumeRequest(ResumeRequestPayload),
    ForfeitGame(ForfeitGamePayload),
    RequestGameEnd(RequestGameEndPayload),
    JoinRoom(RoomRefPayload),
    LeaveRoom(RoomRefPayload),
    PingLatency(PingLatencyPayload),
}

impl ClientEvent {
    /// The wire label, identical to the serde tag.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Authenticate(_) => "authenticate",
            ClientEvent::JoinMatchmaking(_) => "join_matchmaking",
            ClientEvent::LeaveMatchmaking(_) => "leave_matchmaking",
            ClientEvent::ReadyUp(_) => "ready_up",
            ClientEvent::PlayerInput(_) => "player_input",
            ClientEvent::PlayerMovement(_) => "player_movement",
            ClientEvent::BallUpdate(_) => "ball_update",
            ClientEvent::GoalAttempt(_) => "goal_attempt",
            ClientEvent::ChatMessage(_) => "chat_message",
            ClientEvent::PauseRequest(_) => "pause_request",
            ClientEvent::ResumeRequest(_) => "resume_request",
            ClientEvent::ForfeitGame(_) => "forfeit_game",
            ClientEvent::RequestGameEnd(_) => "request_game_end",
            ClientEvent::JoinRoom(_) => "join_room",
            ClientEvent::LeaveRoom(_) => "leave_room",
            ClientEvent::PingLatency(_) => "ping_latency",
        }
    }
}

// === Broadcast snapshot (§6.3) ===

/// One player as broadcast: positions at one decimal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub facing: i8,
    pub kicking: bool,
    pub on_ground: bool,
    pub character: String,
    /// Remaining kick cooldown, milliseconds.
    pub kick_cooldown: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailPoint {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallSnapshot {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    /// Two-decimal precision.
    pub rotation: f32,
    pub trail: Vec<TrailPoint>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSnapshot {
    pub left: u16,
    pub right: u16,
}

/// The per-tick broadcast view of a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub players: Vec<PlayerSnapshot>,
    pub ball: BallSnapshot,
    pub score: ScoreSnapshot,
    /// Game clock, seconds, one decimal.
    pub game_time: f64,
    pub game_state: String,
    /// Server wall clock, milliseconds.
    pub timestamp: u64,
}

impl GameSnapshot {
    /// Builds the rounded broadcast view from the authoritative room record.
    pub fn from_room(room: &RoomState, timestamp: u64) -> Self {
        let players = [Seat::Left, Seat::Right]
            .iter()
            .filter_map(|seat| room.player(*seat))
            .map(|p| PlayerSnapshot {
                id: p.id.clone(),
                x: round1(p.position.x),
                y: round1(p.position.y),
                vx: round1(p.velocity.x),
                vy: round1(p.velocity.y),
                facing: p.facing,
                kicking: p.kicking,
                on_ground: p.on_ground,
                character: p.character.clone(),
                kick_cooldown: round1(p.kick_cooldown_ms),
            })
            .collect();

        let ball = BallSnapshot {
            x: round1(room.ball.position.x),
            y: round1(room.ball.position.y),
            vx: round1(room.ball.velocity.x),
            vy: round1(room.ball.velocity.y),
            rotation: round2(room.ball.rotation),
            trail: room
                .ball
                .trail
                .to_vec()
                .into_iter()
                .map(|p| TrailPoint {
                    x: round1(p.x),
                    y: round1(p.y),
                })
                .collect(),
        };

        GameSnapshot {
            players,
            ball,
            score: ScoreSnapshot {
                left: room.score.0,
                right: room.score.1,
            },
            game_time: (room.game_time_ms / 100.0).round() / 10.0,
            game_state: room.status.wire_label().to_string(),
            timestamp,
        }
    }
}

// === Egress payloads (server → client) ===

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    pub socket_id: String,
    pub server_time: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedPayload {
    pub player_id: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectedPayload {
    pub player_id: String,
    /// Room the player was re-seated into, when within the grace window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthErrorPayload {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueJoinedPayload {
    pub queue_id: String,
    /// 1-based place in the queue.
    pub position: usize,
    pub estimated_wait_ms: u64,
    pub game_mode: GameMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueLeftPayload {
    /// How long the player waited, milliseconds.
    pub queue_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchmakingErrorPayload {
    pub code: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpponentInfo {
    pub player_id: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchFoundPayload {
    pub match_id: String,
    pub opponent: OpponentInfo,
    pub game_mode: GameMode,
    pub room_id: String,
    /// Milliseconds both players have to ready up.
    pub ready_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerReadyUpdatePayload {
    pub player_id: String,
    pub ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCancelledPayload {
    pub reason: String,
    /// Published re-queue policy, e.g. `requeue_ready`.
    pub policy: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomAssignedPayload {
    pub room_id: String,
    pub seat: Seat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStartedPayload {
    pub room_id: String,
    pub server_time: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GamePausedPayload {
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameResumedPayload {
    pub game_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEndedPayload {
    pub winner: Winner,
    pub win_reason: WinReason,
    pub score: ScoreSnapshot,
    /// Simulated game duration, milliseconds.
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementAckPayload {
    pub sequence_id: u64,
    pub server_position: Vec2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementRejectedPayload {
    pub reason: String,
    pub corrected_state: CorrectedState,
}

/// Server-authoritative replacement values sent with a rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectedState {
    pub position: Vec2,
    pub velocity: Vec2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalConfirmedPayload {
    pub score: ScoreSnapshot,
    pub game_ended: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalRejectedPayload {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitExceededPayload {
    pub event_class: String,
    pub retry_after_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationErrorPayload {
    pub event: String,
    pub errors: Vec<FieldError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventErrorPayload {
    pub code: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRelayPayload {
    pub from: String,
    pub message: String,
    #[serde(rename = "type")]
    pub scope: ChatScope,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PongLatencyPayload {
    pub client_time: u64,
    pub server_time: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerShutdownPayload {
    pub reason: String,
}

/// Every message the server may emit, tagged by its wire event name.
///
/// Lifecycle broadcasts keep the camelCase labels the protocol fixes
/// (`gameStarted`, `gameState`, ...); everything else is snake_case.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected(ConnectedPayload),
    Authenticated(AuthenticatedPayload),
    Reconnected(ReconnectedPayload),
    AuthError(AuthErrorPayload),
    QueueJoined(QueueJoinedPayload),
    QueueLeft(QueueLeftPayload),
    MatchmakingError(MatchmakingErrorPayload),
    MatchFound(MatchFoundPayload),
    PlayerReadyUpdate(PlayerReadyUpdatePayload),
    MatchCancelled(MatchCancelledPayload),
    RoomAssigned(RoomAssignedPayload),
    #[serde(rename = "gameStarted")]
    GameStarted(GameStartedPayload),
    #[serde(rename = "gameState")]
    GameState(GameSnapshot),
    #[serde(rename = "gamePaused")]
    GamePaused(GamePausedPayload),
    #[serde(rename = "gameResumed")]
    GameResumed(GameResumedPayload),
    #[serde(rename = "gameEnded")]
    GameEnded(GameEndedPayload),
    MovementAck(MovementAckPayload),
    MovementRejected(MovementRejectedPayload),
    GoalConfirmed(GoalConfirmedPayload),
    GoalRejected(GoalRejectedPayload),
    ChatMessage(ChatRelayPayload),
    RateLimitExceeded(RateLimitExceededPayload),
    ValidationError(ValidationErrorPayload),
    EventError(EventErrorPayload),
    PongLatency(PongLatencyPayload),
    ServerShutdown(ServerShutdownPayload),
}

impl ServerEvent {
    /// The wire label, identical to the serde tag.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected(_) => "connected",
            ServerEvent::Authenticated(_) => "authenticated",
            ServerEvent::Reconnected(_) => "reconnected",
            ServerEvent::AuthError(_) => "auth_error",
            ServerEvent::QueueJoined(_) => "queue_joined",
            ServerEvent::QueueLeft(_) => "queue_left",
            ServerEvent::MatchmakingError(_) => "matchmaking_error",
            ServerEvent::MatchFound(_) => "match_found",
            ServerEvent::PlayerReadyUpdate(_) => "player_ready_update",
            ServerEvent::MatchCancelled(_) => "match_cancelled",
            ServerEvent::RoomAssigned(_) => "room_assigned",
            ServerEvent::GameStarted(_) => "gameStarted",
            ServerEvent::GameState(_) => "gameState",
            ServerEvent::GamePaused(_) => "gamePaused",
            ServerEvent::GameResumed(_) => "gameResumed",
            ServerEvent::GameEnded(_) => "gameEnded",
            ServerEvent::MovementAck(_) => "movement_ack",
            ServerEvent::MovementRejected(_) => "movement_rejected",
            ServerEvent::GoalConfirmed(_) => "goal_confirmed",
            ServerEvent::GoalRejected(_) => "goal_rejected",
            ServerEvent::ChatMessage(_) => "chat_message",
            ServerEvent::RateLimitExceeded(_) => "rate_limit_exceeded",
            ServerEvent::ValidationError(_) => "validation_error",
            ServerEvent::EventError(_) => "event_error",
            ServerEvent::PongLatency(_) => "pong_latency",
            ServerEvent::ServerShutdown(_) => "server_shutdown",
        }
    }
}
