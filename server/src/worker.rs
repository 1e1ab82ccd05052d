//! Per-room worker: the single thread of control for one room.
//!
//! Each active room gets one task driving a [`RoomEngine`] on a fixed tick
//! clock. All mutations of the room flow through this task's inbox, so the
//! engine needs no locking; intents arriving after a tick's sampling point
//! simply apply to the next tick. The worker also runs the plausibility
//! gate, answers advisory claims, and fires the game-end pipeline on the
//! terminal transition.
//!
//! The tick clock never catches up: if a tick overruns its wall budget the
//! overrun is logged and the next tick is simply late. One simulation step
//! per wall tick is the guarantee.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use tokio::time::{interval, MissedTickBehavior};

use shared::config::GameConfig;
use shared::protocol::{
    BallUpdatePayload, ChatMessagePayload, ChatRelayPayload, ChatScope, EndRequestReason,
    EventErrorPayload, GamePausedPayload, GameResumedPayload, GameStartedPayload,
    GoalAttemptPayload, GoalConfirmedPayload, GoalRejectedPayload, MovementAckPayload,
    MovementRejectedPayload, PlayerMovementPayload, RateLimitExceededPayload,
    RequestGameEndPayload, RoomAssignedPayload, ScoreSnapshot, ServerEvent,
};
use shared::types::{IntentFrame, RoomStatus, Vec2, WinReason};

use crate::broadcast::Broadcaster;
use crate::connection::ConnectionManager;
use crate::game_end::GameEndPipeline;
use crate::room::{LeaveReason, Rejection, RoomEngine, RoomEvent};
use crate::store::KeyValueStore;
use crate::util::now_ms;
use crate::validator::{Corrected, GoalVerdict, InputRateVerdict, PlausibilityGate, Verdict};

/// A player to seat at activation: identity, character, socket.
#[derive(Debug, Clone)]
pub struct SeatAssignment {
    pub player_id: String,
    pub username: String,
    pub character: String,
    pub socket_id: String,
}

/// Everything the server can ask a room to do.
#[derive(Debug)]
pub enum RoomCommand {
    /// Seat both matched players, ready them, and kick off.
    Activate { players: Vec<SeatAssignment> },
    /// Seat one player into a waiting room (manual `join_room` path).
    Seat {
        player_id: String,
        character: String,
        socket_id: String,
    },
    SetReady {
        player_id: String,
        ready: bool,
        socket_id: String,
    },
    Input {
        player_id: String,
        frame: IntentFrame,
    },
    Movement {
        player_id: String,
        socket_id: String,
        payload: PlayerMovementPayload,
    },
    BallUpdate {
        player_id: String,
        socket_id: String,
        payload: BallUpdatePayload,
    },
    GoalAttempt {
        player_id: String,
        socket_id: String,
        payload: GoalAttemptPayload,
    },
    Chat {
        player_id: String,
        username: String,
        socket_id: String,
        payload: ChatMessagePayload,
    },
    Pause {
        player_id: String,
        socket_id: String,
        reason: String,
    },
    Resume {
        player_id: String,
        socket_id: String,
    },
    Forfeit {
        player_id: String,
    },
    RequestEnd {
        player_id: String,
        socket_id: String,
        payload: RequestGameEndPayload,
    },
    Leave {
        player_id: String,
        reason: LeaveReason,
    },
    Reconnect {
        player_id: String,
        socket_id: String,
    },
    Shutdown,
}

/// Worker → server notifications.
#[derive(Debug)]
pub enum RoomLifecycle {
    /// The room reached a terminal state and its worker is exiting.
    Ended { room_id: String },
}

/// Cheap handle the server keeps per active room.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    pub room_id: String,
    pub tx: mpsc::UnboundedSender<RoomCommand>,
}

impl RoomHandle {
    pub fn send(&self, command: RoomCommand) {
        let _ = self.tx.send(command);
    }
}

/// Spawns a room worker and returns its handle.
pub fn spawn_room(
    room_id: String,
    config: GameConfig,
    connections: Arc<RwLock<ConnectionManager>>,
    store: Arc<dyn KeyValueStore>,
    lifecycle_tx: mpsc::UnboundedSender<RoomLifecycle>,
    admin_code: Option<String>,
) -> RoomHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = RoomHandle {
        room_id: room_id.clone(),
        tx,
    };

    let worker = RoomWorker::new(room_id, config, connections, store, rx, lifecycle_tx, admin_code);
    tokio::spawn(worker.run());
    handle
}

pub struct RoomWorker {
    engine: RoomEngine,
    gate: PlausibilityGate,
    broadcaster: Broadcaster,
    pipeline: GameEndPipeline,
    connections: Arc<RwLock<ConnectionManager>>,
    rx: mpsc::UnboundedReceiver<RoomCommand>,
    lifecycle_tx: mpsc::UnboundedSender<RoomLifecycle>,
    config: GameConfig,
    admin_code: Option<String>,
    /// Mutual-agreement end votes per seat.
    end_votes: [bool; 2],
    tick_count: u64,
}

impl RoomWorker {
    #[allow(clippy::too_many_arguments)]
    fn new(
        room_id: String,
        config: GameConfig,
        connections: Arc<RwLock<ConnectionManager>>,
        store: Arc<dyn KeyValueStore>,
        rx: mpsc::UnboundedReceiver<RoomCommand>,
        lifecycle_tx: mpsc::UnboundedSender<RoomLifecycle>,
        admin_code: Option<String>,
    ) -> Self {
        Self {
            engine: RoomEngine::new(room_id, config.clone(), now_ms()),
            gate: PlausibilityGate::new(config.clone()),
            broadcaster: Broadcaster::new(),
            pipeline: GameEndPipeline::new(store),
            connections,
            rx,
            lifecycle_tx,
            config,
            admin_code,
            end_votes: [false, false],
            tick_count: 0,
        }
    }

    /// Drives the room until its terminal transition.
    pub async fn run(mut self) {
        let tick_budget = Duration::from_secs_f64(1.0 / self.config.tick_hz as f64);
        let mut ticker = interval(tick_budget);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("room {}: worker started", self.engine.id());
        loop {
            tokio::select! {
                command = self.rx.recv() => {
                    match command {
                        Some(RoomCommand::Shutdown) => {
                            self.engine.force_end(WinReason::TechnicalIssue, None, now_ms());
                        }
                        Some(command) => self.handle_command(command).await,
                        None => {
                            // The server dropped the handle: flush the
                            // terminal transition and exit.
                            self.engine.force_end(WinReason::TechnicalIssue, None, now_ms());
                            let _ = self.run_tick().await;
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    let started = Instant::now();
                    let ended = self.run_tick().await;
                    let elapsed = started.elapsed();
                    if elapsed > tick_budget {
                        warn!(
                            "room {}: tick budget overrun ({:?} > {:?}), not catching up",
                            self.engine.id(), elapsed, tick_budget
                        );
                    }
                    if ended {
                        break;
                    }
                }
            }
        }

        let room_id = self.engine.id().to_string();
        let _ = self.lifecycle_tx.send(RoomLifecycle::Ended { room_id });
        info!("room {}: worker exited", self.engine.id());
    }

    /// One tick: advance the engine, surface its events, emit the snapshot.
    /// Returns true when the room is done and the worker should exit.
    async fn run_tick(&mut self) -> bool {
        let now = now_ms();
        let events = self.engine.advance(now);
        let mut terminal = false;

        for event in events {
            match event {
                RoomEvent::Goal {
                    score, game_ended, ..
                } => {
                    self.broadcast(ServerEvent::GoalConfirmed(GoalConfirmedPayload {
                        score: ScoreSnapshot {
                            left: score.0,
                            right: score.1,
                        },
                        game_ended,
                    }))
                    .await;
                }
                RoomEvent::Finished { .. } | RoomEvent::Abandoned => {
                    let payload = self.pipeline.run(self.engine.state(), now);
                    self.broadcast(ServerEvent::GameEnded(payload)).await;
                    terminal = true;
                }
            }
        }

        // Suspicion is observational: log and forget.
        for signal in self.gate.take_signals() {
            debug!(
                "room {}: anti-cheat signal {:?}/{:?} for {}: {}",
                self.engine.id(),
                signal.kind,
                signal.severity,
                signal.player_id,
                signal.detail
            );
        }

        if self.broadcaster.should_emit(self.engine.state()) {
            let snapshot = self.engine.snapshot(now);
            let connections = self.connections.read().await;
            self.broadcaster.emit(&connections, self.engine.id(), snapshot);
        }

        self.tick_count += 1;
        if self.tick_count % (self.config.tick_hz as u64 * 30) == 0 {
            debug!(
                "room {}: tick {}, status {:?}, score {:?}",
                self.engine.id(),
                self.tick_count,
                self.engine.status(),
                self.engine.state().score
            );
        }

        terminal
    }

    async fn handle_command(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::Activate { players } => self.activate(players).await,
            RoomCommand::Seat {
                player_id,
                character,
                socket_id,
            } => self.seat(player_id, character, socket_id).await,
            RoomCommand::SetReady {
                player_id,
                ready,
                socket_id,
            } => self.set_ready(player_id, ready, socket_id).await,
            RoomCommand::Input { player_id, frame } => {
                // Inputs are pre-validated; a rejection here just means the
                // player raced their own leave.
                let _ = self.engine.input(&player_id, frame);
            }
            RoomCommand::Movement {
                player_id,
                socket_id,
                payload,
            } => self.movement(player_id, socket_id, payload).await,
            RoomCommand::BallUpdate {
                player_id,
                socket_id,
                payload,
            } => self.ball_update(player_id, socket_id, payload).await,
            RoomCommand::GoalAttempt {
                player_id,
                socket_id,
                payload,
            } => self.goal_attempt(player_id, socket_id, payload).await,
            RoomCommand::Chat {
                player_id,
                username,
                socket_id,
                payload,
            } => self.chat(player_id, username, socket_id, payload).await,
            RoomCommand::Pause {
                player_id,
                socket_id,
                reason,
            } => {
                let now = now_ms();
                match self.engine.pause(&player_id, reason.clone(), now) {
                    Ok(()) => {
                        self.broadcast(ServerEvent::GamePaused(GamePausedPayload {
                            reason,
                            requested_by: Some(player_id),
                        }))
                        .await
                    }
                    Err(rejection) => self.reject(&socket_id, rejection).await,
                }
            }
            RoomCommand::Resume {
                player_id,
                socket_id,
            } => match self.engine.resume(&player_id) {
                Ok(()) => self.broadcast_resumed().await,
                Err(rejection) => self.reject(&socket_id, rejection).await,
            },
            RoomCommand::Forfeit { player_id } => {
                let seat = self.engine.seat_of(&player_id);
                self.engine.force_end(WinReason::Forfeit, seat, now_ms());
            }
            RoomCommand::RequestEnd {
                player_id,
                socket_id,
                payload,
            } => self.request_end(player_id, socket_id, payload).await,
            RoomCommand::Leave { player_id, reason } => {
                self.gate.forget(&player_id);
                self.engine.leave(&player_id, reason, now_ms());
            }
            RoomCommand::Reconnect {
                player_id,
                socket_id,
            } => {
                if self.engine.reconnect(&player_id) {
                    let mut connections = self.connections.write().await;
                    connections.add_to_room(&socket_id, self.engine.id(), true);
                    drop(connections);
                    if self.engine.status() == RoomStatus::Playing {
                        self.broadcast_resumed().await;
                    }
                }
            }
            // Handled in run(); arriving here (tests) it is a no-op.
            RoomCommand::Shutdown => {}
        }
    }

    /// Matchmade kickoff: seat both players, mark them ready, start.
    async fn activate(&mut self, players: Vec<SeatAssignment>) {
        let now = now_ms();
        for assignment in &players {
            match self
                .engine
                .join(assignment.player_id.clone(), assignment.character.clone())
            {
                Ok(seat) => {
                    let mut connections = self.connections.write().await;
                    connections.add_to_room(&assignment.socket_id, self.engine.id(), true);
                    connections.send_to_socket(
                        &assignment.socket_id,
                        ServerEvent::RoomAssigned(RoomAssignedPayload {
                            room_id: self.engine.id().to_string(),
                            seat,
                        }),
                    );
                }
                Err(rejection) => {
                    warn!(
                        "room {}: could not seat {}: {}",
                        self.engine.id(),
                        assignment.player_id,
                        rejection.reason
                    );
                }
            }
            let _ = self.engine.set_ready(&assignment.player_id, true);
        }

        match self.engine.start(now) {
            Ok(()) => {
                self.broadcast(ServerEvent::GameStarted(GameStartedPayload {
                    room_id: self.engine.id().to_string(),
                    server_time: now,
                }))
                .await;
            }
            Err(rejection) => {
                // A player vanished between pairing and activation; the
                // leave path will abandon the room.
                warn!(
                    "room {}: activation failed: {}",
                    self.engine.id(),
                    rejection.reason
                );
            }
        }
    }

    async fn seat(&mut self, player_id: String, character: String, socket_id: String) {
        match self.engine.join(player_id, character) {
            Ok(seat) => {
                let mut connections = self.connections.write().await;
                connections.add_to_room(&socket_id, self.engine.id(), false);
                connections.send_to_socket(
                    &socket_id,
                    ServerEvent::RoomAssigned(RoomAssignedPayload {
                        room_id: self.engine.id().to_string(),
                        seat,
                    }),
                );
            }
            Err(rejection) => self.reject(&socket_id, rejection).await,
        }
    }

    async fn set_ready(&mut self, player_id: String, ready: bool, socket_id: String) {
        match self.engine.set_ready(&player_id, ready) {
            Ok(RoomStatus::Ready) => {
                // Both seats ready: kick off immediately.
                let now = now_ms();
                if self.engine.start(now).is_ok() {
                    let mut connections = self.connections.write().await;
                    connections.mark_room_in_game(self.engine.id());
                    drop(connections);
                    self.broadcast(ServerEvent::GameStarted(GameStartedPayload {
                        room_id: self.engine.id().to_string(),
                        server_time: now,
                    }))
                    .await;
                }
            }
            Ok(_) => {}
            Err(rejection) => self.reject(&socket_id, rejection).await,
        }
    }

    /// Movement handling: input-rate gate, then intent and/or positional
    /// claim. Intent drives the simulation; the claim is advisory and only
    /// acknowledged or corrected.
    async fn movement(
        &mut self,
        player_id: String,
        socket_id: String,
        payload: PlayerMovementPayload,
    ) {
        let now = now_ms();
        if self.gate.note_input(&player_id, now) == InputRateVerdict::Limited {
            self.send(
                &socket_id,
                ServerEvent::RateLimitExceeded(RateLimitExceededPayload {
                    event_class: "movement".into(),
                    retry_after_ms: 1000,
                }),
            )
            .await;
            return;
        }

        if let Some(keys) = payload.keys {
            let _ = self.engine.input(
                &player_id,
                IntentFrame {
                    keys,
                    timestamp: payload.timestamp,
                    sequence_id: payload.sequence_id,
                },
            );
        }

        if let Some(position) = payload.position {
            let authoritative = self.authoritative_state(&player_id);
            let verdict = self.gate.check_movement(
                &player_id,
                position,
                payload.velocity,
                payload.timestamp,
                now,
                authoritative,
            );
            match verdict {
                Verdict::Accepted => {
                    if let Some(sequence_id) = payload.sequence_id {
                        let server_position = self.authoritative_state(&player_id).position;
                        self.send(
                            &socket_id,
                            ServerEvent::MovementAck(MovementAckPayload {
                                sequence_id,
                                server_position,
                            }),
                        )
                        .await;
                    }
                }
                Verdict::Rejected { reason, corrected } => {
                    self.send(
                        &socket_id,
                        ServerEvent::MovementRejected(MovementRejectedPayload {
                            reason,
                            corrected_state: shared::protocol::CorrectedState {
                                position: corrected.position,
                                velocity: corrected.velocity,
                            },
                        }),
                    )
                    .await;
                }
            }
        } else if let Some(sequence_id) = payload.sequence_id {
            // Pure intent frame: acknowledge with the authoritative position.
            let server_position = self.authoritative_state(&player_id).position;
            self.send(
                &socket_id,
                ServerEvent::MovementAck(MovementAckPayload {
                    sequence_id,
                    server_position,
                }),
            )
            .await;
        }
    }

    /// Advisory ball claims: touch authority first, then plausibility.
    async fn ball_update(
        &mut self,
        player_id: String,
        socket_id: String,
        payload: BallUpdatePayload,
    ) {
        let now = now_ms();
        if self.gate.note_input(&player_id, now) == InputRateVerdict::Limited {
            self.send(
                &socket_id,
                ServerEvent::RateLimitExceeded(RateLimitExceededPayload {
                    event_class: "movement".into(),
                    retry_after_ms: 1000,
                }),
            )
            .await;
            return;
        }

        let ball = &self.engine.state().ball;
        let server_ball = Corrected {
            position: ball.position,
            velocity: ball.velocity,
        };
        let has_authority = ball.last_touched_by.as_deref() == Some(player_id.as_str());
        if !has_authority {
            self.send(
                &socket_id,
                ServerEvent::MovementRejected(MovementRejectedPayload {
                    reason: "ball update without touch authority".into(),
                    corrected_state: shared::protocol::CorrectedState {
                        position: server_ball.position,
                        velocity: server_ball.velocity,
                    },
                }),
            )
            .await;
            return;
        }

        match self
            .gate
            .check_ball(&player_id, payload.position, payload.velocity, server_ball)
        {
            Verdict::Accepted => {
                self.engine.apply_ball_update(payload.position, payload.velocity);
            }
            Verdict::Rejected { reason, corrected } => {
                self.send(
                    &socket_id,
                    ServerEvent::MovementRejected(MovementRejectedPayload {
                        reason,
                        corrected_state: shared::protocol::CorrectedState {
                            position: corrected.position,
                            velocity: corrected.velocity,
                        },
                    }),
                )
                .await;
            }
        }
    }

    /// Goal claims never move the score; the simulation owns scoring. The
    /// validator only tells the claimant whether the crossing was real.
    async fn goal_attempt(
        &mut self,
        player_id: String,
        socket_id: String,
        _payload: GoalAttemptPayload,
    ) {
        let seat = self.engine.seat_of(&player_id);
        let trail = self.engine.state().ball.trail.to_vec();
        let current = self.engine.state().ball.position;
        let previous = if trail.len() >= 2 {
            trail[trail.len() - 2]
        } else {
            current
        };

        match self.gate.check_goal(seat, previous, current) {
            GoalVerdict::Confirmed { own_goal, .. } => {
                if own_goal {
                    debug!(
                        "room {}: own goal claimed by {}",
                        self.engine.id(),
                        player_id
                    );
                }
                let score = self.engine.state().score;
                self.send(
                    &socket_id,
                    ServerEvent::GoalConfirmed(GoalConfirmedPayload {
                        score: ScoreSnapshot {
                            left: score.0,
                            right: score.1,
                        },
                        game_ended: self.engine.status() == RoomStatus::Finished,
                    }),
                )
                .await;
            }
            GoalVerdict::Rejected { reason } => {
                self.send(
                    &socket_id,
                    ServerEvent::GoalRejected(GoalRejectedPayload { reason }),
                )
                .await;
            }
        }
    }

    /// Sanitized chat fan-out. `all` and `team` stay in the room; `private`
    /// requires a seated target.
    async fn chat(
        &mut self,
        _player_id: String,
        username: String,
        socket_id: String,
        payload: ChatMessagePayload,
    ) {
        let relay = ServerEvent::ChatMessage(ChatRelayPayload {
            from: username,
            message: payload.message,
            scope: payload.scope,
            timestamp: payload.timestamp.unwrap_or_else(now_ms),
        });

        match payload.scope {
            ChatScope::All | ChatScope::Team => {
                self.broadcast(relay).await;
            }
            ChatScope::Private => {
                let Some(target) = payload.target else {
                    self.reject(
                        &socket_id,
                        Rejection {
                            code: "MISSING_TARGET",
                            reason: "private chat needs a target".into(),
                        },
                    )
                    .await;
                    return;
                };
                if self.engine.seat_of(&target).is_none() {
                    self.reject(
                        &socket_id,
                        Rejection {
                            code: "UNKNOWN_TARGET",
                            reason: "target is not in this room".into(),
                        },
                    )
                    .await;
                    return;
                }
                let connections = self.connections.read().await;
                connections.send_to_player(&target, relay);
            }
        }
    }

    /// Cooperative and administrative end requests.
    async fn request_end(
        &mut self,
        player_id: String,
        socket_id: String,
        payload: RequestGameEndPayload,
    ) {
        let now = now_ms();
        match payload.reason {
            EndRequestReason::TimeUp => {
                if self.engine.state().game_time_ms >= self.config.time_limit_ms() {
                    self.engine.force_end(WinReason::TimeLimit, None, now);
                } else {
                    self.reject(
                        &socket_id,
                        Rejection {
                            code: "TIME_NOT_UP",
                            reason: "the clock has not run out".into(),
                        },
                    )
                    .await;
                }
            }
            EndRequestReason::MutualAgreement => {
                let Some(seat) = self.engine.seat_of(&player_id) else {
                    self.reject(
                        &socket_id,
                        Rejection {
                            code: "NOT_IN_ROOM",
                            reason: "player not seated here".into(),
                        },
                    )
                    .await;
                    return;
                };
                if !payload.confirmed.unwrap_or(false) {
                    self.reject(
                        &socket_id,
                        Rejection {
                            code: "NOT_CONFIRMED",
                            reason: "mutual end requires confirmed: true".into(),
                        },
                    )
                    .await;
                    return;
                }
                self.end_votes[seat.index()] = true;
                if self.end_votes == [true, true] {
                    self.engine.force_end(WinReason::MutualAgreement, None, now);
                }
            }
            EndRequestReason::AdminRequest => {
                let authorized = match (&self.admin_code, &payload.admin_code) {
                    (Some(expected), Some(got)) => expected == got,
                    _ => false,
                };
                if authorized {
                    self.engine.force_end(WinReason::TechnicalIssue, None, now);
                } else {
                    self.reject(
                        &socket_id,
                        Rejection {
                            code: "UNAUTHORIZED",
                            reason: "admin code mismatch".into(),
                        },
                    )
                    .await;
                }
            }
        }
    }

    fn authoritative_state(&self, player_id: &str) -> Corrected {
        self.engine
            .seat_of(player_id)
            .and_then(|seat| self.engine.state().player(seat))
            .map(|p| Corrected {
                position: p.position,
                velocity: p.velocity,
            })
            .unwrap_or(Corrected {
                position: Vec2::new(
                    shared::constants::FIELD_WIDTH / 2.0,
                    shared::constants::PLAYER_SPAWN_Y,
                ),
                velocity: Vec2::ZERO,
            })
    }

    async fn broadcast_resumed(&self) {
        self.broadcast(ServerEvent::GameResumed(GameResumedPayload {
            game_time_ms: self.engine.state().game_time_ms as u64,
        }))
        .await;
    }

    async fn broadcast(&self, event: ServerEvent) {
        let connections = self.connections.read().await;
        connections.broadcast_to_room(self.engine.id(), &event, None);
    }

    async fn send(&self, socket_id: &str, event: ServerEvent) {
        let connections = self.connections.read().await;
        connections.send_to_socket(socket_id, event);
    }

    async fn reject(&self, socket_id: &str, rejection: Rejection) {
        self.send(
            socket_id,
            ServerEvent::EventError(EventErrorPayload {
                code: rejection.code.to_string(),
                reason: rejection.reason,
            }),
        )
        .await;
    }
}

impl RoomWorker {
    /// Test-only constructor used by the integration suite to drive a
    /// worker without spawning it.
    #[doc(hidden)]
    pub fn new_for_test(
        room_id: String,
        config: GameConfig,
        connections: Arc<RwLock<ConnectionManager>>,
        store: Arc<dyn KeyValueStore>,
        rx: mpsc::UnboundedReceiver<RoomCommand>,
        lifecycle_tx: mpsc::UnboundedSender<RoomLifecycle>,
    ) -> Self {
        Self::new(room_id, config, connections, store, rx, lifecycle_tx, None)
    }

    #[doc(hidden)]
    pub async fn handle_for_test(&mut self, command: RoomCommand) {
        self.handle_command(command).await;
    }

    #[doc(hidden)]
    pub async fn tick_for_test(&mut self) -> bool {
        self.run_tick().await
    }

    #[doc(hidden)]
    pub fn engine_for_test(&self) -> &RoomEngine {
        &self.engine
    }
}
