//! Socket table: authentication, room membership, and message fan-out.
//!
//! The [`ConnectionManager`] is the one owner of connection records; every
//! other component refers to players and sockets by id only. The server
//! wraps it in an async read-write lock; broadcasts take the read side,
//! connect/disconnect take the write side. Delivery is decoupled from the
//! caller: each socket has an unbounded outbound queue drained by its write
//! task, so fan-out never blocks on a slow peer.

use std::collections::HashMap;

use log::{debug, info};
use tokio::sync::mpsc;

use shared::protocol::ServerEvent;

use crate::metrics::ConnectionGauges;
use crate::rate_limit::{EventClass, RateDecision, RateLimitConfig, RateLimiter};
use crate::room::Rejection;

/// Maximum username length accepted at authentication.
pub const MAX_USERNAME_LEN: usize = 20;
/// Maximum player id length accepted at authentication.
pub const MAX_PLAYER_ID_LEN: usize = 50;

/// What a socket's write task should do next.
#[derive(Debug, Clone)]
pub enum Outbound {
    Event(Box<ServerEvent>),
    /// Transport-level heartbeat probe.
    Ping,
    Close,
}

/// Connection lifecycle, mirrored to the session's capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnStatus {
    Unauthenticated,
    Authenticated,
    InRoom,
    InGame,
    Disconnected,
}

/// One socket's record. Owned exclusively by the manager.
pub struct Connection {
    pub socket_id: String,
    pub player_id: Option<String>,
    pub username: Option<String>,
    pub character: Option<String>,
    pub room_id: Option<String>,
    pub status: ConnStatus,
    pub last_seen_ms: u64,
    /// Smoothed round-trip estimate from the latency ping pair.
    pub rtt_ms: Option<f64>,
    pub rate_limiter: RateLimiter,
    sender: mpsc::UnboundedSender<Outbound>,
}

impl Connection {
    fn send(&self, outbound: Outbound) {
        // A closed queue means the write task is gone; the disconnect path
        // will reap this record shortly.
        let _ = self.sender.send(outbound);
    }
}

/// Result of a successful authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub player_id: String,
    pub username: String,
    /// Room to re-seat into when this was a reconnect inside the grace
    /// window.
    pub rejoin_room: Option<String>,
}

struct RecentSession {
    room_id: String,
    disconnected_at_ms: u64,
}

/// The socket table plus its membership and player indexes.
pub struct ConnectionManager {
    connections: HashMap<String, Connection>,
    by_player: HashMap<String, String>,
    room_members: HashMap<String, Vec<String>>,
    /// Rooms recently left by disconnect, for the reconnect path.
    recent_sessions: HashMap<String, RecentSession>,
    rate_config: RateLimitConfig,
    grace_ms: u64,
    next_socket: u64,
}

impl ConnectionManager {
    pub fn new(rate_config: RateLimitConfig, grace_ms: u64) -> Self {
        Self {
            connections: HashMap::new(),
            by_player: HashMap::new(),
            room_members: HashMap::new(),
            recent_sessions: HashMap::new(),
            rate_config,
            grace_ms,
            next_socket: 1,
        }
    }

    /// Registers a fresh unauthenticated socket and returns its id.
    pub fn on_connect(&mut self, sender: mpsc::UnboundedSender<Outbound>, now_ms: u64) -> String {
        let socket_id = format!("sock-{}", self.next_socket);
        self.next_socket += 1;

        self.connections.insert(
            socket_id.clone(),
            Connection {
                socket_id: socket_id.clone(),
                player_id: None,
                username: None,
                character: None,
                room_id: None,
                status: ConnStatus::Unauthenticated,
                last_seen_ms: now_ms,
                rtt_ms: None,
                rate_limiter: RateLimiter::new(),
                sender,
            },
        );
        info!("socket {} connected", socket_id);
        socket_id
    }

    /// Binds a player identity to a socket.
    ///
    /// Rejects when another live socket already holds the player id. A
    /// player returning within the grace window gets their old room back.
    pub fn authenticate(
        &mut self,
        socket_id: &str,
        player_id: String,
        username: String,
        character: Option<String>,
        now_ms: u64,
    ) -> Result<AuthOutcome, Rejection> {
        if player_id.is_empty() || player_id.len() > MAX_PLAYER_ID_LEN {
            return Err(Rejection {
                code: "INVALID_PLAYER_ID",
                reason: format!("player id must be 1..={} chars", MAX_PLAYER_ID_LEN),
            });
        }
        if username.is_empty() || username.len() > MAX_USERNAME_LEN {
            return Err(Rejection {
                code: "INVALID_USERNAME",
                reason: format!("username must be 1..={} chars", MAX_USERNAME_LEN),
            });
        }
        if let Some(existing) = self.by_player.get(&player_id) {
            if existing != socket_id && self.connections.contains_key(existing) {
                return Err(Rejection {
                    code: "ALREADY_CONNECTED",
                    reason: "player id is held by a live connection".into(),
                });
            }
        }
        let Some(conn) = self.connections.get_mut(socket_id) else {
            return Err(Rejection {
                code: "UNKNOWN_SOCKET",
                reason: "socket is gone".into(),
            });
        };

        conn.player_id = Some(player_id.clone());
        conn.username = Some(username.clone());
        conn.character = character;
        conn.status = ConnStatus::Authenticated;
        conn.last_seen_ms = now_ms;
        self.by_player.insert(player_id.clone(), socket_id.to_string());

        let rejoin_room = match self.recent_sessions.remove(&player_id) {
            Some(recent) if now_ms.saturating_sub(recent.disconnected_at_ms) <= self.grace_ms => {
                Some(recent.room_id)
            }
            _ => None,
        };

        info!(
            "socket {} authenticated as {} ({})",
            socket_id, player_id, username
        );
        Ok(AuthOutcome {
            player_id,
            username,
            rejoin_room,
        })
    }

    /// Moves a socket into a room's membership index.
    pub fn add_to_room(&mut self, socket_id: &str, room_id: &str, in_game: bool) {
        if let Some(conn) = self.connections.get_mut(socket_id) {
            conn.room_id = Some(room_id.to_string());
            conn.status = if in_game {
                ConnStatus::InGame
            } else {
                ConnStatus::InRoom
            };
            let members = self.room_members.entry(room_id.to_string()).or_default();
            if !members.iter().any(|m| m == socket_id) {
                members.push(socket_id.to_string());
            }
        }
    }

    pub fn remove_from_room(&mut self, socket_id: &str) {
        let room_id = self
            .connections
            .get_mut(socket_id)
            .and_then(|conn| {
                conn.status = ConnStatus::Authenticated;
                conn.room_id.take()
            });
        if let Some(room_id) = room_id {
            if let Some(members) = self.room_members.get_mut(&room_id) {
                members.retain(|m| m != socket_id);
                if members.is_empty() {
                    self.room_members.remove(&room_id);
                }
            }
        }
    }

    /// Marks every member of a room as in game.
    pub fn mark_room_in_game(&mut self, room_id: &str) {
        if let Some(members) = self.room_members.get(room_id) {
            for socket_id in members.clone() {
                if let Some(conn) = self.connections.get_mut(&socket_id) {
                    conn.status = ConnStatus::InGame;
                }
            }
        }
    }

    pub fn send_to_socket(&self, socket_id: &str, event: ServerEvent) {
        if let Some(conn) = self.connections.get(socket_id) {
            conn.send(Outbound::Event(Box::new(event)));
        }
    }

    pub fn send_to_player(&self, player_id: &str, event: ServerEvent) {
        if let Some(socket_id) = self.by_player.get(player_id) {
            self.send_to_socket(socket_id, event);
        }
    }

    /// Fans an event out to a room, optionally skipping one socket.
    pub fn broadcast_to_room(&self, room_id: &str, event: &ServerEvent, except: Option<&str>) {
        let Some(members) = self.room_members.get(room_id) else {
            return;
        };
        for socket_id in members {
            if Some(socket_id.as_str()) == except {
                continue;
            }
            self.send_to_socket(socket_id, event.clone());
        }
    }

    pub fn broadcast_to_all(&self, event: &ServerEvent) {
        for conn in self.connections.values() {
            conn.send(Outbound::Event(Box::new(event.clone())));
        }
    }

    /// Queues a transport ping on every socket.
    pub fn ping_all(&self) {
        for conn in self.connections.values() {
            conn.send(Outbound::Ping);
        }
    }

    /// Refreshes liveness for a socket on any inbound traffic.
    pub fn touch(&mut self, socket_id: &str, now_ms: u64) {
        if let Some(conn) = self.connections.get_mut(socket_id) {
            conn.last_seen_ms = now_ms;
        }
    }

    /// Updates the smoothed round-trip estimate from a latency ping.
    pub fn record_rtt(&mut self, socket_id: &str, sample_ms: f64) {
        if let Some(conn) = self.connections.get_mut(socket_id) {
            conn.rtt_ms = Some(match conn.rtt_ms {
                Some(prev) => prev * 0.875 + sample_ms * 0.125,
                None => sample_ms,
            });
        }
    }

    /// Rate-limit check for one inbound event on one socket.
    pub fn check_rate(
        &mut self,
        socket_id: &str,
        class: EventClass,
        now_ms: u64,
    ) -> RateDecision {
        match self.connections.get_mut(socket_id) {
            Some(conn) => conn.rate_limiter.check(class, &self.rate_config, now_ms),
            None => RateDecision::Allowed,
        }
    }

    /// Sockets whose last activity predates the timeout.
    pub fn stale_sockets(&self, now_ms: u64, timeout_ms: u64) -> Vec<String> {
        self.connections
            .values()
            .filter(|conn| now_ms.saturating_sub(conn.last_seen_ms) > timeout_ms)
            .map(|conn| conn.socket_id.clone())
            .collect()
    }

    /// Drops a socket record and remembers its room for the grace window.
    ///
    /// Returns the identity the socket held so the caller can inform the
    /// room worker.
    pub fn remove(&mut self, socket_id: &str, now_ms: u64) -> Option<(Option<String>, Option<String>)> {
        let conn = self.connections.remove(socket_id)?;
        if let Some(room_id) = &conn.room_id {
            if let Some(members) = self.room_members.get_mut(room_id) {
                members.retain(|m| m != socket_id);
                if members.is_empty() {
                    self.room_members.remove(room_id);
                }
            }
        }
        if let Some(player_id) = &conn.player_id {
            self.by_player.remove(player_id);
            if let Some(room_id) = &conn.room_id {
                self.recent_sessions.insert(
                    player_id.clone(),
                    RecentSession {
                        room_id: room_id.clone(),
                        disconnected_at_ms: now_ms,
                    },
                );
            }
        }
        debug!("socket {} removed", socket_id);
        Some((conn.player_id, conn.room_id))
    }

    /// Tells every socket to shut down after the terminal notice.
    pub fn shutdown_all(&self, reason: &str) {
        let notice = ServerEvent::ServerShutdown(shared::protocol::ServerShutdownPayload {
            reason: reason.to_string(),
        });
        for conn in self.connections.values() {
            conn.send(Outbound::Event(Box::new(notice.clone())));
            conn.send(Outbound::Close);
        }
    }

    pub fn connection(&self, socket_id: &str) -> Option<&Connection> {
        self.connections.get(socket_id)
    }

    /// Current members of a room, by socket id.
    pub fn sockets_in_room(&self, room_id: &str) -> Vec<String> {
        self.room_members
            .get(room_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Username and chosen character for an authenticated player.
    pub fn player_info(&self, player_id: &str) -> Option<(String, Option<String>)> {
        let socket_id = self.by_player.get(player_id)?;
        let conn = self.connections.get(socket_id)?;
        Some((conn.username.clone()?, conn.character.clone()))
    }

    pub fn socket_of_player(&self, player_id: &str) -> Option<&str> {
        self.by_player.get(player_id).map(|s| s.as_str())
    }

    pub fn gauges(&self) -> ConnectionGauges {
        ConnectionGauges {
            total: self.connections.len(),
            authenticated: self
                .connections
                .values()
                .filter(|c| c.status != ConnStatus::Unauthenticated)
                .count(),
            in_room: self
                .connections
                .values()
                .filter(|c| matches!(c.status, ConnStatus::InRoom | ConnStatus::InGame))
                .count(),
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::{PongLatencyPayload, ServerEvent};

    const NOW: u64 = 10_000;

    fn manager() -> ConnectionManager {
        ConnectionManager::new(RateLimitConfig::default(), 10_000)
    }

    fn connect(
        manager: &mut ConnectionManager,
    ) -> (String, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let socket_id = manager.on_connect(tx, NOW);
        (socket_id, rx)
    }

    fn recv_event(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> ServerEvent {
        match rx.try_recv().expect("expected outbound message") {
            Outbound::Event(event) => *event,
            other => panic!("expected event, got {:?}", other),
        }
    }

    #[test]
    fn test_connect_assigns_unique_ids() {
        let mut manager = manager();
        let (a, _rx_a) = connect(&mut manager);
        let (b, _rx_b) = connect(&mut manager);
        assert_ne!(a, b);
        assert_eq!(manager.len(), 2);
        assert_eq!(
            manager.connection(&a).unwrap().status,
            ConnStatus::Unauthenticated
        );
    }

    #[test]
    fn test_authenticate_binds_identity() {
        let mut manager = manager();
        let (socket, _rx) = connect(&mut manager);
        let outcome = manager
            .authenticate(&socket, "p1".into(), "alice".into(), None, NOW)
            .unwrap();
        assert_eq!(outcome.player_id, "p1");
        assert_eq!(outcome.rejoin_room, None);
        assert_eq!(manager.socket_of_player("p1"), Some(socket.as_str()));
    }

    #[test]
    fn test_authenticate_length_limits() {
        let mut manager = manager();
        let (socket, _rx) = connect(&mut manager);

        let long_name = "x".repeat(MAX_USERNAME_LEN + 1);
        let err = manager
            .authenticate(&socket, "p1".into(), long_name, None, NOW)
            .unwrap_err();
        assert_eq!(err.code, "INVALID_USERNAME");

        let long_id = "y".repeat(MAX_PLAYER_ID_LEN + 1);
        let err = manager
            .authenticate(&socket, long_id, "alice".into(), None, NOW)
            .unwrap_err();
        assert_eq!(err.code, "INVALID_PLAYER_ID");
    }

    #[test]
    fn test_duplicate_player_id_rejected() {
        let mut manager = manager();
        let (a, _rx_a) = connect(&mut manager);
        let (b, _rx_b) = connect(&mut manager);
        manager
            .authenticate(&a, "p1".into(), "alice".into(), None, NOW)
            .unwrap();
        let err = manager
            .authenticate(&b, "p1".into(), "imposter".into(), None, NOW)
            .unwrap_err();
        assert_eq!(err.code, "ALREADY_CONNECTED");
    }

    #[test]
    fn test_reconnect_within_grace_returns_room() {
        let mut manager = manager();
        let (a, _rx_a) = connect(&mut manager);
        manager
            .authenticate(&a, "p1".into(), "alice".into(), None, NOW)
            .unwrap();
        manager.add_to_room(&a, "room-1", true);
        manager.remove(&a, NOW + 100);

        let (b, _rx_b) = connect(&mut manager);
        let outcome = manager
            .authenticate(&b, "p1".into(), "alice".into(), None, NOW + 5_000)
            .unwrap();
        assert_eq!(outcome.rejoin_room.as_deref(), Some("room-1"));
    }

    #[test]
    fn test_reconnect_after_grace_gets_no_room() {
        let mut manager = manager();
        let (a, _rx_a) = connect(&mut manager);
        manager
            .authenticate(&a, "p1".into(), "alice".into(), None, NOW)
            .unwrap();
        manager.add_to_room(&a, "room-1", true);
        manager.remove(&a, NOW);

        let (b, _rx_b) = connect(&mut manager);
        let outcome = manager
            .authenticate(&b, "p1".into(), "alice".into(), None, NOW + 60_000)
            .unwrap();
        assert_eq!(outcome.rejoin_room, None);
    }

    #[test]
    fn test_room_broadcast_with_exclusion() {
        let mut manager = manager();
        let (a, mut rx_a) = connect(&mut manager);
        let (b, mut rx_b) = connect(&mut manager);
        manager.add_to_room(&a, "room-1", false);
        manager.add_to_room(&b, "room-1", false);

        let event = ServerEvent::PongLatency(PongLatencyPayload {
            client_time: 1,
            server_time: 2,
        });
        manager.broadcast_to_room("room-1", &event, Some(&a));

        assert!(rx_a.try_recv().is_err());
        let got = recv_event(&mut rx_b);
        assert_eq!(got.name(), "pong_latency");
    }

    #[test]
    fn test_send_to_player_routes_by_identity() {
        let mut manager = manager();
        let (a, mut rx_a) = connect(&mut manager);
        manager
            .authenticate(&a, "p1".into(), "alice".into(), None, NOW)
            .unwrap();

        manager.send_to_player(
            "p1",
            ServerEvent::PongLatency(PongLatencyPayload {
                client_time: 7,
                server_time: 8,
            }),
        );
        assert_eq!(recv_event(&mut rx_a).name(), "pong_latency");
    }

    #[test]
    fn test_stale_socket_detection() {
        let mut manager = manager();
        let (a, _rx_a) = connect(&mut manager);
        let (b, _rx_b) = connect(&mut manager);
        manager.touch(&b, NOW + 40_000);

        let stale = manager.stale_sockets(NOW + 40_000, 30_000);
        assert_eq!(stale, vec![a]);
    }

    #[test]
    fn test_remove_cleans_indexes() {
        let mut manager = manager();
        let (a, _rx_a) = connect(&mut manager);
        manager
            .authenticate(&a, "p1".into(), "alice".into(), None, NOW)
            .unwrap();
        manager.add_to_room(&a, "room-1", true);

        let (player, room) = manager.remove(&a, NOW).unwrap();
        assert_eq!(player.as_deref(), Some("p1"));
        assert_eq!(room.as_deref(), Some("room-1"));
        assert!(manager.socket_of_player("p1").is_none());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_rtt_smoothing() {
        let mut manager = manager();
        let (a, _rx_a) = connect(&mut manager);
        manager.record_rtt(&a, 40.0);
        manager.record_rtt(&a, 80.0);
        let rtt = manager.connection(&a).unwrap().rtt_ms.unwrap();
        assert!(rtt > 40.0 && rtt < 80.0);
    }

    #[test]
    fn test_gauges() {
        let mut manager = manager();
        let (a, _rx_a) = connect(&mut manager);
        let (_b, _rx_b) = connect(&mut manager);
        manager
            .authenticate(&a, "p1".into(), "alice".into(), None, NOW)
            .unwrap();
        manager.add_to_room(&a, "room-1", false);

        let gauges = manager.gauges();
        assert_eq!(gauges.total, 2);
        assert_eq!(gauges.authenticated, 1);
        assert_eq!(gauges.in_room, 1);
    }

    #[test]
    fn test_shutdown_notifies_and_closes() {
        let mut manager = manager();
        let (_a, mut rx_a) = connect(&mut manager);
        manager.shutdown_all("maintenance");

        assert_eq!(recv_event(&mut rx_a).name(), "server_shutdown");
        assert!(matches!(rx_a.try_recv().unwrap(), Outbound::Close));
    }
}
