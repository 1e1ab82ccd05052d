//! # Server Network Layer
//!
//! The process-wide [`Server`] value: it owns the component instances and
//! the event loop that ties sockets to rooms. Tests construct separate
//! servers; there is no global state.
//!
//! ## Concurrency Model
//!
//! - One accept loop upgrades TCP connections to WebSocket and spawns a
//!   read task and a write task per socket.
//! - Read tasks forward parsed frames to the main loop over an unbounded
//!   channel; they never touch game state.
//! - The main loop routes, rate-limits, and dispatches. Pre-game traffic
//!   (auth, matchmaking) is handled inline; in-game traffic is forwarded to
//!   the owning room worker's inbox.
//! - Room workers run independently at tick cadence and publish snapshots
//!   through the shared connection manager.
//!
//! ## Shutdown
//!
//! On ctrl-c the server stops accepting, tells every socket goodbye, asks
//! every room worker to wind down, and drains briefly before exiting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};

use shared::protocol::{
    AuthErrorPayload, AuthenticatedPayload, ClientEvent, ConnectedPayload, EventErrorPayload,
    GameMode, MatchCancelledPayload, MatchFoundPayload, MatchmakingErrorPayload, OpponentInfo,
    PlayerMovementPayload, PlayerReadyUpdatePayload, PongLatencyPayload, QueueJoinedPayload,
    QueueLeftPayload, RateLimitExceededPayload, ReconnectedPayload, ServerEvent,
    ValidationErrorPayload,
};

use crate::config::ServerConfig;
use crate::connection::{ConnectionManager, Outbound};
use crate::matchmaker::{CancelledMatch, Matchmaker, QueueError, READY_TIMEOUT_POLICY};
use crate::metrics::Metrics;
use crate::rate_limit::RateDecision;
use crate::room::LeaveReason;
use crate::router::{EventRouter, RouteOutcome};
use crate::store::KeyValueStore;
use crate::util::now_ms;
use crate::worker::{spawn_room, RoomCommand, RoomHandle, RoomLifecycle, SeatAssignment};

/// Messages from socket tasks to the main loop.
#[derive(Debug)]
pub enum ServerMessage {
    /// A parsed JSON frame arrived from a socket.
    FrameReceived { socket_id: String, frame: Value },
    /// Liveness-only traffic (transport pong).
    SocketSeen { socket_id: String },
    /// The socket's read side ended.
    SocketClosed { socket_id: String },
}

/// The server: component instances plus the main event loop.
pub struct Server {
    config: ServerConfig,
    connections: Arc<RwLock<ConnectionManager>>,
    router: EventRouter,
    matchmaker: Matchmaker,
    metrics: Arc<Metrics>,
    store: Arc<dyn KeyValueStore>,
    rooms: HashMap<String, RoomHandle>,
    /// Active room per player, maintained on seat/leave/end.
    player_rooms: HashMap<String, String>,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    lifecycle_tx: mpsc::UnboundedSender<RoomLifecycle>,
    lifecycle_rx: mpsc::UnboundedReceiver<RoomLifecycle>,
}

impl Server {
    pub fn new(config: ServerConfig, store: Arc<dyn KeyValueStore>) -> Self {
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (lifecycle_tx, lifecycle_rx) = mpsc::unbounded_channel();
        let connections = Arc::new(RwLock::new(ConnectionManager::new(
            config.rate_limits.clone(),
            config.game.disconnect_grace_ms,
        )));

        Self {
            router: EventRouter::new(&config.game),
            matchmaker: Matchmaker::new(store.clone(), config.game.clone()),
            metrics: Arc::new(Metrics::new()),
            connections,
            store,
            config,
            rooms: HashMap::new(),
            player_rooms: HashMap::new(),
            server_tx,
            server_rx,
            lifecycle_tx,
            lifecycle_rx,
        }
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Binds the listener and runs until ctrl-c.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr).await?;
        info!("listening on {} (WebSocket)", addr);

        let accept_connections = self.connections.clone();
        let accept_tx = self.server_tx.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!("tcp connection from {}", peer);
                        let connections = accept_connections.clone();
                        let server_tx = accept_tx.clone();
                        tokio::spawn(async move {
                            handle_socket(stream, connections, server_tx).await;
                        });
                    }
                    Err(err) => {
                        error!("accept failed: {}", err);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                }
            }
        });

        let mut heartbeat = interval(Duration::from_millis(self.config.heartbeat_interval_ms));
        let mut pairing = interval(Duration::from_millis(self.config.matchmaking_interval_ms));
        let mut status = interval(Duration::from_millis(self.config.status_interval_ms));
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(message) => self.handle_message(message).await,
                        None => break,
                    }
                }
                lifecycle = self.lifecycle_rx.recv() => {
                    if let Some(RoomLifecycle::Ended { room_id }) = lifecycle {
                        self.release_room(&room_id).await;
                    }
                }
                _ = pairing.tick() => self.matchmaking_pass().await,
                _ = heartbeat.tick() => self.heartbeat_pass().await,
                _ = status.tick() => self.log_status().await,
                _ = &mut ctrl_c => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        accept_task.abort();
        self.shutdown().await;
        Ok(())
    }

    /// Graceful exit: notify sockets, wind down rooms, drain briefly.
    async fn shutdown(&mut self) {
        {
            let connections = self.connections.read().await;
            connections.shutdown_all("server_shutdown");
        }
        for handle in self.rooms.values() {
            handle.send(RoomCommand::Shutdown);
        }
        // Give write tasks and room workers a moment to flush.
        tokio::time::sleep(Duration::from_millis(200)).await;
        info!("server stopped");
    }

    async fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::FrameReceived { socket_id, frame } => {
                self.handle_frame(&socket_id, frame).await;
            }
            ServerMessage::SocketSeen { socket_id } => {
                let mut connections = self.connections.write().await;
                connections.touch(&socket_id, now_ms());
            }
            ServerMessage::SocketClosed { socket_id } => {
                self.handle_socket_closed(&socket_id).await;
            }
        }
    }

    /// Full ingress path for one frame: route, rate-limit, authorize,
    /// dispatch, measure.
    pub async fn handle_frame(&mut self, socket_id: &str, frame: Value) {
        let now = now_ms();
        {
            let mut connections = self.connections.write().await;
            connections.touch(socket_id, now);
        }

        let (event, class, requires_auth) = match self.router.route(frame, now) {
            RouteOutcome::Accepted {
                event,
                class,
                requires_auth,
            } => (event, class, requires_auth),
            RouteOutcome::Invalid(payload) => {
                self.metrics.record_validation_error();
                self.send(socket_id, ServerEvent::ValidationError(payload)).await;
                return;
            }
            RouteOutcome::Malformed { reason } => {
                self.metrics.record_rejected();
                self.send(
                    socket_id,
                    ServerEvent::EventError(EventErrorPayload {
                        code: "MALFORMED_FRAME".into(),
                        reason,
                    }),
                )
                .await;
                return;
            }
        };

        let decision = {
            let mut connections = self.connections.write().await;
            connections.check_rate(socket_id, class, now)
        };
        if let RateDecision::Limited { retry_after_ms } = decision {
            self.metrics.record_rate_limited();
            self.send(
                socket_id,
                ServerEvent::RateLimitExceeded(RateLimitExceededPayload {
                    event_class: class.label().into(),
                    retry_after_ms,
                }),
            )
            .await;
            return;
        }

        let player_id = {
            let connections = self.connections.read().await;
            connections
                .connection(socket_id)
                .and_then(|c| c.player_id.clone())
        };
        if requires_auth && player_id.is_none() {
            self.metrics.record_rejected();
            self.send(
                socket_id,
                ServerEvent::EventError(EventErrorPayload {
                    code: "UNAUTHENTICATED".into(),
                    reason: "authenticate first".into(),
                }),
            )
            .await;
            return;
        }

        let name = event.name();
        let started = Instant::now();
        self.dispatch(socket_id, player_id, event).await;
        self.metrics
            .record_processed(name, started.elapsed().as_micros() as u64);
    }

    async fn dispatch(&mut self, socket_id: &str, player_id: Option<String>, event: ClientEvent) {
        match event {
            ClientEvent::Authenticate(payload) => {
                self.handle_authenticate(socket_id, payload).await;
            }
            ClientEvent::PingLatency(payload) => {
                let now = now_ms();
                {
                    let mut connections = self.connections.write().await;
                    let rtt = now.saturating_sub(payload.client_time) as f64;
                    connections.record_rtt(socket_id, rtt);
                }
                self.send(
                    socket_id,
                    ServerEvent::PongLatency(PongLatencyPayload {
                        client_time: payload.client_time,
                        server_time: now,
                    }),
                )
                .await;
            }
            ClientEvent::JoinMatchmaking(payload) => {
                let player_id = player_id.unwrap_or_default();
                self.handle_join_matchmaking(socket_id, &player_id, payload.game_mode, payload.preferences)
                    .await;
            }
            ClientEvent::LeaveMatchmaking(_) => {
                let player_id = player_id.unwrap_or_default();
                match self.matchmaker.leave(&player_id, now_ms()) {
                    Ok(queue_time_ms) => {
                        self.send(
                            socket_id,
                            ServerEvent::QueueLeft(QueueLeftPayload { queue_time_ms }),
                        )
                        .await;
                    }
                    Err(err) => self.matchmaking_error(socket_id, err).await,
                }
            }
            ClientEvent::ReadyUp(payload) => {
                let player_id = player_id.unwrap_or_default();
                self.handle_ready_up(socket_id, &player_id, payload.is_ready()).await;
            }
            ClientEvent::PlayerInput(payload) => {
                // Same authoritative path as the movement form, intent-only.
                let movement = PlayerMovementPayload {
                    keys: Some(payload.keys),
                    position: None,
                    velocity: None,
                    timestamp: payload.timestamp,
                    sequence_id: payload.sequence_id,
                };
                self.forward(socket_id, player_id, move |player_id, socket_id| {
                    RoomCommand::Movement {
                        player_id,
                        socket_id,
                        payload: movement,
                    }
                })
                .await;
            }
            ClientEvent::PlayerMovement(payload) => {
                self.forward(socket_id, player_id, move |player_id, socket_id| {
                    RoomCommand::Movement {
                        player_id,
                        socket_id,
                        payload,
                    }
                })
                .await;
            }
            ClientEvent::BallUpdate(payload) => {
                self.forward(socket_id, player_id, move |player_id, socket_id| {
                    RoomCommand::BallUpdate {
                        player_id,
                        socket_id,
                        payload,
                    }
                })
                .await;
            }
            ClientEvent::GoalAttempt(payload) => {
                self.forward(socket_id, player_id, move |player_id, socket_id| {
                    RoomCommand::GoalAttempt {
                        player_id,
                        socket_id,
                        payload,
                    }
                })
                .await;
            }
            ClientEvent::ChatMessage(payload) => {
                let username = {
                    let connections = self.connections.read().await;
                    connections
                        .connection(socket_id)
                        .and_then(|c| c.username.clone())
                        .unwrap_or_else(|| "unknown".into())
                };
                self.forward(socket_id, player_id, move |player_id, socket_id| {
                    RoomCommand::Chat {
                        player_id,
                        username,
                        socket_id,
                        payload,
                    }
                })
                .await;
            }
            ClientEvent::PauseRequest(payload) => {
                self.forward(socket_id, player_id, move |player_id, socket_id| {
                    RoomCommand::Pause {
                        player_id,
                        socket_id,
                        reason: payload.reason,
                    }
                })
                .await;
            }
            ClientEvent::ResumeRequest(_) => {
                self.forward(socket_id, player_id, |player_id, socket_id| {
                    RoomCommand::Resume {
                        player_id,
                        socket_id,
                    }
                })
                .await;
            }
            ClientEvent::ForfeitGame(_) => {
                self.forward(socket_id, player_id, |player_id, _socket_id| {
                    RoomCommand::Forfeit { player_id }
                })
                .await;
            }
            ClientEvent::RequestGameEnd(payload) => {
                self.forward(socket_id, player_id, move |player_id, socket_id| {
                    RoomCommand::RequestEnd {
                        player_id,
                        socket_id,
                        payload,
                    }
                })
                .await;
            }
            ClientEvent::JoinRoom(payload) => {
                let player_id = player_id.unwrap_or_default();
                self.handle_join_room(socket_id, &player_id, payload.room_id).await;
            }
            ClientEvent::LeaveRoom(_) => {
                let player_id = player_id.unwrap_or_default();
                if let Some(room_id) = self.player_rooms.remove(&player_id) {
                    if let Some(handle) = self.rooms.get(&room_id) {
                        handle.send(RoomCommand::Leave {
                            player_id: player_id.clone(),
                            reason: LeaveReason::Quit,
                        });
                    }
                    let mut connections = self.connections.write().await;
                    connections.remove_from_room(socket_id);
                } else {
                    self.send(
                        socket_id,
                        ServerEvent::EventError(EventErrorPayload {
                            code: "NOT_IN_ROOM".into(),
                            reason: "no active room to leave".into(),
                        }),
                    )
                    .await;
                }
            }
        }
    }

    async fn handle_authenticate(
        &mut self,
        socket_id: &str,
        payload: shared::protocol::AuthenticatePayload,
    ) {
        let now = now_ms();
        let outcome = {
            let mut connections = self.connections.write().await;
            connections.authenticate(
                socket_id,
                payload.player_id,
                payload.username,
                payload.character_id,
                now,
            )
        };
        match outcome {
            Ok(outcome) => {
                // Reconnect path: re-seat into the surviving room.
                let rejoining = outcome
                    .rejoin_room
                    .as_ref()
                    .and_then(|room_id| self.rooms.get(room_id))
                    .cloned();
                if let Some(handle) = rejoining {
                    handle.send(RoomCommand::Reconnect {
                        player_id: outcome.player_id.clone(),
                        socket_id: socket_id.to_string(),
                    });
                    self.player_rooms
                        .insert(outcome.player_id.clone(), handle.room_id.clone());
                    self.send(
                        socket_id,
                        ServerEvent::Reconnected(ReconnectedPayload {
                            player_id: outcome.player_id,
                            room_id: Some(handle.room_id.clone()),
                        }),
                    )
                    .await;
                } else {
                    self.send(
                        socket_id,
                        ServerEvent::Authenticated(AuthenticatedPayload {
                            player_id: outcome.player_id,
                            username: outcome.username,
                        }),
                    )
                    .await;
                }
            }
            Err(rejection) => {
                self.send(
                    socket_id,
                    ServerEvent::AuthError(AuthErrorPayload {
                        reason: format!("{}: {}", rejection.code, rejection.reason),
                    }),
                )
                .await;
            }
        }
    }

    async fn handle_join_matchmaking(
        &mut self,
        socket_id: &str,
        player_id: &str,
        mode: GameMode,
        preferences: Option<Value>,
    ) {
        let in_game = self.player_rooms.contains_key(player_id);
        match self
            .matchmaker
            .join(player_id, mode, preferences, in_game, now_ms())
        {
            Ok(placement) => {
                self.send(
                    socket_id,
                    ServerEvent::QueueJoined(QueueJoinedPayload {
                        queue_id: placement.queue_id,
                        position: placement.position,
                        estimated_wait_ms: placement.estimated_wait_ms,
                        game_mode: mode,
                    }),
                )
                .await;
                // Pair eagerly; the interval pass is the fallback.
                self.pair_mode(mode).await;
            }
            Err(err) => self.matchmaking_error(socket_id, err).await,
        }
    }

    async fn handle_ready_up(&mut self, socket_id: &str, player_id: &str, ready: bool) {
        // Pending-match ready-up first, room-level ready as the fallback.
        match self.matchmaker.set_ready(player_id, ready) {
            Ok(update) => {
                for member in &update.players {
                    let connections = self.connections.read().await;
                    connections.send_to_player(
                        member,
                        ServerEvent::PlayerReadyUpdate(PlayerReadyUpdatePayload {
                            player_id: player_id.to_string(),
                            ready,
                        }),
                    );
                }
                if update.all_ready {
                    if let Some(pending) = self.matchmaker.take_ready_match(&update.match_id) {
                        self.activate_match(pending).await;
                    }
                }
            }
            Err(QueueError::NotQueued) => {
                if let Some(room_id) = self.player_rooms.get(player_id) {
                    if let Some(handle) = self.rooms.get(room_id) {
                        handle.send(RoomCommand::SetReady {
                            player_id: player_id.to_string(),
                            ready,
                            socket_id: socket_id.to_string(),
                        });
                        return;
                    }
                }
                self.matchmaking_error(socket_id, QueueError::NotQueued).await;
            }
            Err(err) => self.matchmaking_error(socket_id, err).await,
        }
    }

    async fn handle_join_room(&mut self, socket_id: &str, player_id: &str, room_id: Option<String>) {
        let Some(room_id) = room_id else {
            self.send(
                socket_id,
                ServerEvent::EventError(EventErrorPayload {
                    code: "MISSING_ROOM".into(),
                    reason: "roomId is required".into(),
                }),
            )
            .await;
            return;
        };
        let Some(handle) = self.rooms.get(&room_id) else {
            self.send(
                socket_id,
                ServerEvent::EventError(EventErrorPayload {
                    code: "ROOM_NOT_FOUND".into(),
                    reason: format!("no room {}", room_id),
                }),
            )
            .await;
            return;
        };

        let character = {
            let connections = self.connections.read().await;
            connections
                .connection(socket_id)
                .and_then(|c| c.character.clone())
                .unwrap_or_default()
        };
        handle.send(RoomCommand::Seat {
            player_id: player_id.to_string(),
            character,
            socket_id: socket_id.to_string(),
        });
        self.player_rooms
            .insert(player_id.to_string(), room_id.clone());
    }

    /// Spawns the reserved room and seats both matched players.
    async fn activate_match(&mut self, pending: crate::matchmaker::PendingMatch) {
        let mut assignments = Vec::new();
        {
            let connections = self.connections.read().await;
            for player_id in &pending.players {
                let Some(socket_id) = connections.socket_of_player(player_id) else {
                    continue;
                };
                let (username, character) = connections
                    .player_info(player_id)
                    .unwrap_or_else(|| (player_id.clone(), None));
                assignments.push(SeatAssignment {
                    player_id: player_id.clone(),
                    username,
                    character: character.unwrap_or_default(),
                    socket_id: socket_id.to_string(),
                });
            }
        }

        if assignments.len() != 2 {
            // Someone vanished between ready-up and activation.
            warn!(
                "match {} lost a player before activation",
                pending.match_id
            );
            for assignment in assignments {
                let connections = self.connections.read().await;
                connections.send_to_player(
                    &assignment.player_id,
                    ServerEvent::MatchCancelled(MatchCancelledPayload {
                        reason: "opponent_disconnected".into(),
                        policy: READY_TIMEOUT_POLICY.into(),
                    }),
                );
            }
            return;
        }

        let handle = spawn_room(
            pending.room_id.clone(),
            self.config.game.clone(),
            self.connections.clone(),
            self.store.clone(),
            self.lifecycle_tx.clone(),
            self.config.admin_code.clone(),
        );
        for assignment in &assignments {
            self.player_rooms
                .insert(assignment.player_id.clone(), pending.room_id.clone());
        }
        handle.send(RoomCommand::Activate {
            players: assignments,
        });
        self.rooms.insert(pending.room_id.clone(), handle);
        info!(
            "match {} activated in room {}",
            pending.match_id, pending.room_id
        );
    }

    /// One pairing sweep for a mode, announcing every match found.
    async fn pair_mode(&mut self, mode: GameMode) {
        while let Some(pending) = self.matchmaker.try_pair(mode, now_ms()) {
            let connections = self.connections.read().await;
            for player_id in &pending.players {
                let Some(opponent_id) = pending.opponent_of(player_id) else {
                    continue;
                };
                let (opponent_name, _) = connections
                    .player_info(opponent_id)
                    .unwrap_or_else(|| (opponent_id.to_string(), None));
                connections.send_to_player(
                    player_id,
                    ServerEvent::MatchFound(MatchFoundPayload {
                        match_id: pending.match_id.clone(),
                        opponent: OpponentInfo {
                            player_id: opponent_id.to_string(),
                            username: opponent_name,
                        },
                        game_mode: mode,
                        room_id: pending.room_id.clone(),
                        ready_timeout: self.config.game.ready_timeout_ms,
                    }),
                );
            }
        }
    }

    /// Periodic pairing and ready-timeout sweep.
    async fn matchmaking_pass(&mut self) {
        for mode in GameMode::ALL {
            self.pair_mode(mode).await;
        }
        let cancelled = self.matchmaker.expire_pending(now_ms());
        for cancellation in cancelled {
            self.announce_cancellation(&cancellation).await;
        }
    }

    async fn announce_cancellation(&self, cancellation: &CancelledMatch) {
        let connections = self.connections.read().await;
        for player_id in &cancellation.players {
            connections.send_to_player(
                player_id,
                ServerEvent::MatchCancelled(MatchCancelledPayload {
                    reason: cancellation.reason.clone(),
                    policy: READY_TIMEOUT_POLICY.into(),
                }),
            );
        }
    }

    /// Transport heartbeat: ping everyone, close the silent.
    async fn heartbeat_pass(&mut self) {
        let now = now_ms();
        let stale = {
            let connections = self.connections.read().await;
            connections.ping_all();
            connections.stale_sockets(now, self.config.connection_timeout_ms)
        };
        for socket_id in stale {
            warn!("socket {} timed out", socket_id);
            self.handle_socket_closed(&socket_id).await;
        }
    }

    /// Disconnect path: reap the record, tell the matchmaker and the room.
    async fn handle_socket_closed(&mut self, socket_id: &str) {
        let removed = {
            let mut connections = self.connections.write().await;
            connections.remove(socket_id, now_ms())
        };
        let Some((player_id, room_id)) = removed else {
            return;
        };

        if let Some(player_id) = player_id {
            if let Some(cancellation) = self.matchmaker.handle_disconnect(&player_id, now_ms()) {
                self.announce_cancellation(&cancellation).await;
            }
            if let Some(room_id) = room_id.or_else(|| self.player_rooms.get(&player_id).cloned()) {
                if let Some(handle) = self.rooms.get(&room_id) {
                    handle.send(RoomCommand::Leave {
                        player_id: player_id.clone(),
                        reason: LeaveReason::Disconnected,
                    });
                }
            }
            self.player_rooms.remove(&player_id);
        }
    }

    /// Room worker exited: clear the registry and membership indexes.
    async fn release_room(&mut self, room_id: &str) {
        self.rooms.remove(room_id);
        self.player_rooms.retain(|_, r| r != room_id);
        let mut connections = self.connections.write().await;
        for socket_id in connections.sockets_in_room(room_id) {
            connections.remove_from_room(&socket_id);
        }
        info!("room {} released", room_id);
    }

    async fn log_status(&self) {
        let gauges = {
            let connections = self.connections.read().await;
            connections.gauges()
        };
        let report = self.metrics.report();
        info!(
            "status: {} conns ({} auth, {} in room), {} rooms, queues c/r/t {}/{}/{}, {:.1} ev/s ({} processed, {} rejected)",
            gauges.total,
            gauges.authenticated,
            gauges.in_room,
            self.rooms.len(),
            self.matchmaker.queue_len(GameMode::Casual),
            self.matchmaker.queue_len(GameMode::Ranked),
            self.matchmaker.queue_len(GameMode::Tournament),
            report.events_per_sec,
            report.processed,
            report.rejected,
        );
    }

    async fn matchmaking_error(&self, socket_id: &str, err: QueueError) {
        self.metrics.record_rejected();
        self.send(
            socket_id,
            ServerEvent::MatchmakingError(MatchmakingErrorPayload {
                code: err.code().to_string(),
                reason: match err {
                    QueueError::AlreadyQueued => "already waiting in a queue".into(),
                    QueueError::ConnectionError => "matchmaking backend unavailable".into(),
                    QueueError::InvalidMode => "unknown game mode".into(),
                    QueueError::Unauthenticated => "authenticate first".into(),
                    QueueError::InGame => "leave the current game first".into(),
                    QueueError::NotQueued => "not waiting in any queue".into(),
                },
            }),
        )
        .await;
    }

    /// Forwards an in-game command to the player's room worker, or rejects
    /// with a state-mismatch error.
    async fn forward<F>(&mut self, socket_id: &str, player_id: Option<String>, build: F)
    where
        F: FnOnce(String, String) -> RoomCommand,
    {
        let Some(player_id) = player_id else {
            return;
        };
        let handle = self
            .player_rooms
            .get(&player_id)
            .and_then(|room_id| self.rooms.get(room_id));
        match handle {
            Some(handle) => handle.send(build(player_id, socket_id.to_string())),
            None => {
                self.metrics.record_rejected();
                self.send(
                    socket_id,
                    ServerEvent::EventError(EventErrorPayload {
                        code: "NOT_IN_GAME".into(),
                        reason: "no active room for this action".into(),
                    }),
                )
                .await;
            }
        }
    }

    async fn send(&self, socket_id: &str, event: ServerEvent) {
        let connections = self.connections.read().await;
        connections.send_to_socket(socket_id, event);
    }
}

/// Upgrades one TCP stream to WebSocket and runs its read/write tasks.
async fn handle_socket(
    stream: TcpStream,
    connections: Arc<RwLock<ConnectionManager>>,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(err) => {
            warn!("websocket handshake failed: {}", err);
            return;
        }
    };
    let (mut ws_sink, mut ws_source) = ws_stream.split();

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
    let socket_id = {
        let mut manager = connections.write().await;
        manager.on_connect(outbound_tx, now_ms())
    };

    // Greet with the assigned socket id.
    {
        let manager = connections.read().await;
        manager.send_to_socket(
            &socket_id,
            ServerEvent::Connected(ConnectedPayload {
                socket_id: socket_id.clone(),
                server_time: now_ms(),
            }),
        );
    }

    // Write task: drain the outbound queue onto the wire.
    let write_socket_id = socket_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = outbound_rx.recv().await {
            let result = match outbound {
                Outbound::Event(event) => match serde_json::to_string(&*event) {
                    Ok(json) => ws_sink.send(Message::Text(json)).await,
                    Err(err) => {
                        error!("serialize failed for {}: {}", write_socket_id, err);
                        continue;
                    }
                },
                Outbound::Ping => ws_sink.send(Message::Ping(Vec::new())).await,
                Outbound::Close => {
                    let _ = ws_sink.send(Message::Close(None)).await;
                    break;
                }
            };
            if result.is_err() {
                break;
            }
        }
    });

    // Read loop: parsed frames and liveness to the main loop.
    while let Some(message) = ws_source.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<Value>(&text) {
                Ok(frame) => {
                    if server_tx
                        .send(ServerMessage::FrameReceived {
                            socket_id: socket_id.clone(),
                            frame,
                        })
                        .is_err()
                    {
                        break;
                    }
                }
                Err(err) => {
                    debug!("socket {}: unparseable frame: {}", socket_id, err);
                    let manager = connections.read().await;
                    manager.send_to_socket(
                        &socket_id,
                        ServerEvent::ValidationError(ValidationErrorPayload {
                            event: "unknown".into(),
                            errors: vec![shared::protocol::FieldError {
                                field: "frame".into(),
                                reason: "not valid JSON".into(),
                            }],
                        }),
                    );
                }
            },
            Ok(Message::Pong(_)) | Ok(Message::Ping(_)) => {
                let _ = server_tx.send(ServerMessage::SocketSeen {
                    socket_id: socket_id.clone(),
                });
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {} // binary frames are not part of the protocol
            Err(err) => {
                debug!("socket {} read error: {}", socket_id, err);
                break;
            }
        }
    }

    let _ = server_tx.send(ServerMessage::SocketClosed {
        socket_id: socket_id.clone(),
    });
    writer.abort();
    debug!("socket {} read loop ended", socket_id);
}
