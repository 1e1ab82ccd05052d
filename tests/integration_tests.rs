//! # Integration Test Suite
//!
//! End-to-end scenarios across the server's components: matchmaking through
//! room activation, authoritative simulation, plausibility corrections,
//! and the disconnect/forfeit path. Unlike the per-module unit tests these
//! exercise several components together, the way a real match does, and
//! assert the system-level invariants: monotonic scores, a game clock that
//! only runs while playing, bounded positions, and single-queue membership.
//!
//! The scenarios mirror the protocol's end-to-end behaviors:
//! - a happy-path match from two queue joins to a running room
//! - a goal with its cooldown interlock and ball reset
//! - ready-up timeout with the published re-queue policy
//! - the sliding-window input rate cap
//! - implausible movement rejected with a server correction
//! - mid-game disconnect, grace expiry, and the persisted result

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::RwLock;

use server::connection::{ConnectionManager, Outbound};
use server::game_end::GameEndPipeline;
use server::matchmaker::Matchmaker;
use server::physics::{Simulation, TickInputs};
use server::rate_limit::RateLimitConfig;
use server::room::{LeaveReason, RoomEngine, RoomEvent};
use server::store::{KeyValueStore, MemoryStore};
use server::validator::{Corrected, InputRateVerdict, PlausibilityGate, Verdict};
use server::worker::{RoomCommand, RoomWorker, SeatAssignment};
use shared::config::GameConfig;
use shared::constants::{
    BALL_SPAWN_Y, FIELD_WIDTH, FLOOR_Y, KICK_COOLDOWN_MS, PLAYER_RADIUS,
};
use shared::protocol::{GameMode, ServerEvent};
use shared::types::{InputKeys, IntentFrame, RoomStatus, Seat, Vec2, WinReason, Winner};

const NOW: u64 = 1_000_000;

fn keys(left: bool, right: bool, up: bool, kick: bool) -> InputKeys {
    InputKeys {
        left,
        right,
        up,
        kick,
    }
}

fn playing_engine() -> RoomEngine {
    let mut engine = RoomEngine::new("room-it".into(), GameConfig::default(), NOW);
    engine.join("a".into(), "classic".into()).unwrap();
    engine.join("b".into(), "retro".into()).unwrap();
    engine.set_ready("a", true).unwrap();
    engine.set_ready("b", true).unwrap();
    engine.start(NOW).unwrap();
    engine
}

struct WorkerHarness {
    worker: RoomWorker,
    sockets: Vec<(String, mpsc::UnboundedReceiver<Outbound>)>,
}

async fn worker_harness() -> WorkerHarness {
    let connections = Arc::new(RwLock::new(ConnectionManager::new(
        RateLimitConfig::default(),
        10_000,
    )));
    let (_tx, rx) = mpsc::unbounded_channel();
    let (lifecycle_tx, _lifecycle_rx) = mpsc::unbounded_channel();
    let worker = RoomWorker::new_for_test(
        "room-e2e".into(),
        GameConfig::default(),
        connections.clone(),
        Arc::new(MemoryStore::new()),
        rx,
        lifecycle_tx,
    );

    let mut sockets = Vec::new();
    {
        let mut manager = connections.write().await;
        for (player, name) in [("a", "alice"), ("b", "bob")] {
            let (tx, rx) = mpsc::unbounded_channel();
            let socket_id = manager.on_connect(tx, 0);
            manager
                .authenticate(&socket_id, player.into(), name.into(), None, 0)
                .unwrap();
            sockets.push((socket_id, rx));
        }
    }

    WorkerHarness { worker, sockets }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(outbound) = rx.try_recv() {
        if let Outbound::Event(event) = outbound {
            events.push(*event);
        }
    }
    events
}

// === Full match flow ===

#[tokio::test]
async fn test_full_match_queue_pair_ready_start_and_drive() {
    // Two players queue; the matchmaker pairs the two oldest and parks
    // them behind the ready-up handshake.
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let mut mm = Matchmaker::new(store, GameConfig::default());
    mm.join("a", GameMode::Casual, None, false, NOW).unwrap();
    mm.join("b", GameMode::Casual, None, false, NOW + 10).unwrap();

    let pending = mm.try_pair(GameMode::Casual, NOW + 20).expect("pairing");
    assert_eq!(pending.players, ["a".to_string(), "b".to_string()]);

    assert!(!mm.set_ready("a", true).unwrap().all_ready);
    assert!(mm.set_ready("b", true).unwrap().all_ready);
    let activated = mm.take_ready_match(&pending.match_id).expect("activation");

    // Activation seats both players and kicks off.
    let mut hx = worker_harness().await;
    let players = vec![
        SeatAssignment {
            player_id: "a".into(),
            username: "alice".into(),
            character: "classic".into(),
            socket_id: hx.sockets[0].0.clone(),
        },
        SeatAssignment {
            player_id: "b".into(),
            username: "bob".into(),
            character: "retro".into(),
            socket_id: hx.sockets[1].0.clone(),
        },
    ];
    hx.worker
        .handle_for_test(RoomCommand::Activate { players })
        .await;
    assert_eq!(hx.worker.engine_for_test().status(), RoomStatus::Playing);
    let events = drain(&mut hx.sockets[0].1);
    assert!(events.iter().any(|e| e.name() == "room_assigned"));
    assert!(events.iter().any(|e| e.name() == "gameStarted"));
    assert_eq!(activated.room_id, pending.room_id);

    // Both players hold "right" for three simulated seconds. The right
    // player starts at the three-quarter mark and rides into the wall
    // clamp at FIELD_WIDTH - PLAYER_RADIUS.
    hx.worker
        .handle_for_test(RoomCommand::Input {
            player_id: "b".into(),
            frame: IntentFrame {
                keys: keys(false, true, false, false),
                timestamp: NOW,
                sequence_id: None,
            },
        })
        .await;
    hx.worker
        .handle_for_test(RoomCommand::Input {
            player_id: "a".into(),
            frame: IntentFrame {
                keys: keys(false, true, false, false),
                timestamp: NOW,
                sequence_id: None,
            },
        })
        .await;
    for _ in 0..720 {
        hx.worker.tick_for_test().await;
    }

    let state = hx.worker.engine_for_test().state();
    let right = state.player(Seat::Right).unwrap();
    assert!((right.position.x - (FIELD_WIDTH - PLAYER_RADIUS)).abs() < 0.5);
    // The left player covered most of the same ground but is not clamped.
    let left = state.player(Seat::Left).unwrap();
    assert!(left.position.x > FIELD_WIDTH * 0.25 + 500.0);
    assert!(left.position.x < FIELD_WIDTH - PLAYER_RADIUS);
}

// === Goal and cooldown ===

#[test]
fn test_goal_scores_resets_ball_and_respects_cooldown() {
    let mut engine = playing_engine();
    // Let some game time accrue first.
    for i in 0..100 {
        engine.advance(NOW + i);
    }

    engine.state_mut_for_test().ball.position = Vec2::new(1501.0, 700.0);
    engine.state_mut_for_test().ball.velocity = Vec2::new(300.0, 0.0);

    let mut goal = None;
    for i in 0..100 {
        let events = engine.advance(NOW + 100 + i);
        if let Some(event) = events.iter().find_map(|e| match e {
            RoomEvent::Goal {
                scored_by, score, ..
            } => Some((*scored_by, *score)),
            _ => None,
        }) {
            goal = Some(event);
            break;
        }
    }

    let (scored_by, score) = goal.expect("ball must cross the right goal line");
    assert_eq!(scored_by, Seat::Left);
    assert_eq!(score, (1, 0));
    // Ball re-centered at rest.
    let state = engine.state();
    assert_eq!(state.ball.position, Vec2::new(800.0, BALL_SPAWN_Y));
    assert_eq!(state.ball.velocity, Vec2::ZERO);

    // A second attempt inside the 3000 ms window does not count.
    engine.state_mut_for_test().ball.position = Vec2::new(1560.0, 700.0);
    let events = engine.advance(NOW + 300);
    assert!(!events
        .iter()
        .any(|e| matches!(e, RoomEvent::Goal { .. })));
    assert_eq!(engine.state().score, (1, 0));
}

// === Ready-up timeout ===

#[test]
fn test_ready_timeout_cancels_and_requeues_ready_player() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let mut mm = Matchmaker::new(store, GameConfig::default());
    mm.join("a", GameMode::Casual, None, false, NOW).unwrap();
    mm.join("b", GameMode::Casual, None, false, NOW + 1).unwrap();
    let pending = mm.try_pair(GameMode::Casual, NOW + 2).unwrap();
    mm.set_ready("a", true).unwrap();

    let deadline = NOW + 2 + GameConfig::default().ready_timeout_ms;
    let cancelled = mm.expire_pending(deadline);
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].reason, "ready_timeout");
    assert_eq!(cancelled[0].room_id, pending.room_id);
    // The reserved room is released with the pending match.
    assert_eq!(mm.pending_count(), 0);
    // Published policy: the player who was ready waits again.
    assert_eq!(cancelled[0].requeued, vec!["a".to_string()]);
    assert_eq!(mm.queue_len(GameMode::Casual), 1);
}

// === Input rate limit ===

#[test]
fn test_sixty_first_input_in_window_rejected() {
    let mut gate = PlausibilityGate::new(GameConfig::default());
    for i in 0..60 {
        assert_eq!(
            gate.note_input("spammer", NOW + i * 16),
            InputRateVerdict::Allowed,
            "input {} should pass",
            i
        );
    }
    // 60 inputs landed inside the same sliding second; the 61st is refused.
    assert_eq!(
        gate.note_input("spammer", NOW + 960),
        InputRateVerdict::Limited
    );
}

// === Validation and correction ===

#[test]
fn test_teleport_claim_corrected_to_plausible_state() {
    let mut gate = PlausibilityGate::new(GameConfig::default());
    let authoritative = Corrected {
        position: Vec2::new(400.0, 600.0),
        velocity: Vec2::ZERO,
    };
    assert_eq!(
        gate.check_movement("p1", Vec2::new(400.0, 600.0), None, NOW, NOW, authoritative),
        Verdict::Accepted
    );

    let verdict = gate.check_movement(
        "p1",
        Vec2::new(5000.0, 5000.0),
        None,
        NOW + 16,
        NOW + 16,
        authoritative,
    );
    match verdict {
        Verdict::Rejected { corrected, .. } => {
            // Correction stays at the last plausible state, inside bounds.
            assert_eq!(corrected.position, Vec2::new(400.0, 600.0));
            assert!(corrected.position.x <= FIELD_WIDTH);
            assert!(corrected.position.y <= FLOOR_Y);
        }
        Verdict::Accepted => panic!("teleport must be rejected"),
    }
}

// === Disconnect forfeit ===

#[test]
fn test_disconnect_grace_forfeit_and_persisted_result() {
    let config = GameConfig::default();
    let mut engine = playing_engine();
    for i in 0..50 {
        engine.advance(NOW + i);
    }

    // Player A's socket drops: pause with reason player_left, grace starts.
    let status = engine.leave("a", LeaveReason::Disconnected, NOW + 50);
    assert_eq!(status, RoomStatus::Paused);
    assert_eq!(engine.state().pause.as_ref().unwrap().reason, "player_left");

    // Inside the grace window nothing is decided.
    engine.advance(NOW + 50 + config.disconnect_grace_ms - 1);
    assert_eq!(engine.status(), RoomStatus::Paused);

    // Grace expiry: B wins by disconnection.
    let events = engine.advance(NOW + 50 + config.disconnect_grace_ms);
    assert_eq!(engine.status(), RoomStatus::Finished);
    assert_eq!(engine.state().winner, Some(Winner::Right));
    assert_eq!(engine.state().win_reason, Some(WinReason::Disconnection));
    assert!(events
        .iter()
        .any(|e| matches!(e, RoomEvent::Finished { .. })));

    // The game-end pipeline records the outcome through the store.
    let store = Arc::new(MemoryStore::new());
    let pipeline = GameEndPipeline::new(store.clone());
    let payload = pipeline.run(engine.state(), NOW + 61_000);
    assert_eq!(payload.winner, Winner::Right);
    assert!(store.get("match:result:room-it").is_some());
}

// === Universal invariants ===

#[test]
fn test_invariant_scores_monotonic_and_single_step() {
    let mut engine = playing_engine();
    let mut previous = engine.state().score;

    // Repeatedly feed goals and ticks; the score never decreases and never
    // jumps by more than one on one side per tick.
    for round in 0..5u64 {
        engine.state_mut_for_test().ball.position = Vec2::new(1560.0, 700.0);
        engine.state_mut_for_test().ball.velocity = Vec2::ZERO;
        // Walk the game clock past the goal cooldown between rounds.
        for i in 0..800 {
            engine.advance(NOW + round * 1000 + i);
            let score = engine.state().score;
            let dl = score.0 - previous.0;
            let dr = score.1 - previous.1;
            assert!(dl + dr <= 1, "score moved by more than one in a tick");
            previous = score;
        }
    }
    assert!(engine.state().score.0 >= 2);
}

#[test]
fn test_invariant_game_clock_frozen_outside_playing() {
    let mut engine = RoomEngine::new("room-clock".into(), GameConfig::default(), NOW);
    engine.join("a".into(), String::new()).unwrap();
    engine.join("b".into(), String::new()).unwrap();

    // Waiting: no clock.
    for i in 0..50 {
        engine.advance(NOW + i);
    }
    assert_eq!(engine.state().game_time_ms, 0.0);

    engine.set_ready("a", true).unwrap();
    engine.set_ready("b", true).unwrap();
    engine.start(NOW + 100).unwrap();
    for i in 0..50 {
        engine.advance(NOW + 100 + i);
    }
    let t_playing = engine.state().game_time_ms;
    assert!(t_playing > 0.0);

    // Paused: frozen again.
    engine.pause("a", "break".into(), NOW + 200).unwrap();
    for i in 0..50 {
        engine.advance(NOW + 200 + i);
    }
    assert_eq!(engine.state().game_time_ms, t_playing);
}

#[test]
fn test_invariant_kick_cooldown_bounded_and_decreasing() {
    let mut engine = playing_engine();

    // Park the ball on the left player's boot and kick.
    {
        let state = engine.state_mut_for_test();
        state.player_mut(Seat::Left).unwrap().position = Vec2::new(800.0, 850.0);
        state.ball.position = Vec2::new(830.0, 840.0);
        state.ball.velocity = Vec2::ZERO;
    }
    engine
        .input(
            "a",
            IntentFrame {
                keys: keys(false, false, false, true),
                timestamp: NOW,
                sequence_id: None,
            },
        )
        .unwrap();
    engine.advance(NOW);

    let mut last = engine
        .state()
        .player(Seat::Left)
        .unwrap()
        .kick_cooldown_ms;
    assert!(last > 0.0 && last <= KICK_COOLDOWN_MS);

    // Between kicks the cooldown only ever shrinks, to zero.
    engine
        .input(
            "a",
            IntentFrame {
                keys: InputKeys::default(),
                timestamp: NOW,
                sequence_id: None,
            },
        )
        .unwrap();
    for i in 0..200 {
        engine.advance(NOW + 1 + i);
        let cooldown = engine
            .state()
            .player(Seat::Left)
            .unwrap()
            .kick_cooldown_ms;
        assert!(cooldown <= last);
        assert!(cooldown >= 0.0);
        last = cooldown;
    }
    assert_eq!(last, 0.0);
}

#[test]
fn test_invariant_positions_bounded_under_wild_input() {
    let sim = Simulation::new(GameConfig::default());
    let mut room = playing_engine().state().clone();

    // Alternate hard directions with jumps and kicks for 20 simulated
    // seconds; nothing may escape the field.
    for i in 0..4800u32 {
        let phase = (i / 120) % 4;
        let inputs = TickInputs {
            left: Some(keys(phase == 0, phase == 1, phase == 2, phase == 3)),
            right: Some(keys(phase == 1, phase == 0, phase == 3, phase == 2)),
        };
        sim.tick(&mut room, &inputs);

        for seat in [Seat::Left, Seat::Right] {
            let p = room.player(seat).unwrap();
            assert!(p.position.x >= PLAYER_RADIUS - 0.01);
            assert!(p.position.x <= FIELD_WIDTH - PLAYER_RADIUS + 0.01);
            assert!(p.position.y <= FLOOR_Y - PLAYER_RADIUS + 0.01);
        }
        let ball = &room.ball;
        assert!(ball.position.x >= 0.0 && ball.position.x <= FIELD_WIDTH);
        assert!(ball.position.y <= FLOOR_Y);
    }
}

#[test]
fn test_invariant_single_queue_membership() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let mut mm = Matchmaker::new(store, GameConfig::default());
    mm.join("a", GameMode::Casual, None, false, NOW).unwrap();

    // A queued player cannot queue anywhere else.
    assert!(mm.join("a", GameMode::Ranked, None, false, NOW + 1).is_err());

    // A player in a pending match cannot queue either.
    mm.join("b", GameMode::Casual, None, false, NOW + 2).unwrap();
    mm.try_pair(GameMode::Casual, NOW + 3).unwrap();
    assert!(mm.join("a", GameMode::Casual, None, false, NOW + 4).is_err());

    // And a player in a room is excluded up front.
    assert!(mm.join("c", GameMode::Casual, None, true, NOW + 5).is_err());
}

// === Round-trip / idempotence ===

#[test]
fn test_ready_twice_is_idempotent() {
    let mut engine = RoomEngine::new("room-idem".into(), GameConfig::default(), NOW);
    engine.join("a".into(), String::new()).unwrap();
    engine.join("b".into(), String::new()).unwrap();

    engine.set_ready("a", true).unwrap();
    let first = engine.set_ready("b", true).unwrap();
    let second = engine.set_ready("b", true).unwrap();
    assert_eq!(first, second);
    assert_eq!(engine.status(), RoomStatus::Ready);
}

#[test]
fn test_pause_resume_returns_to_playing_with_clock_intact() {
    let mut engine = playing_engine();
    for i in 0..100 {
        engine.advance(NOW + i);
    }
    let t = engine.state().game_time_ms;

    engine.pause("b", "strategy".into(), NOW + 100).unwrap();
    engine.resume("b").unwrap();
    assert_eq!(engine.status(), RoomStatus::Playing);
    assert_eq!(engine.state().game_time_ms, t);
}

#[test]
fn test_queue_join_leave_restores_size() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let mut mm = Matchmaker::new(store, GameConfig::default());
    mm.join("z", GameMode::Tournament, None, false, NOW).unwrap();
    let before = mm.queue_len(GameMode::Tournament);

    mm.join("a", GameMode::Tournament, None, false, NOW + 1).unwrap();
    mm.leave("a", NOW + 2).unwrap();
    assert_eq!(mm.queue_len(GameMode::Tournament), before);
}

// === Boundary behaviors ===

#[test]
fn test_fifth_goal_finishes_on_its_tick() {
    let mut engine = playing_engine();
    engine.state_mut_for_test().score = (4, 0);
    // Jump past any cooldown concern.
    engine.state_mut_for_test().game_time_ms = 60_000.0;
    engine.state_mut_for_test().ball.position = Vec2::new(1560.0, 700.0);
    engine.state_mut_for_test().ball.velocity = Vec2::ZERO;

    let events = engine.advance(NOW);
    let goal_tick_ended = events.iter().any(|e| {
        matches!(
            e,
            RoomEvent::Goal {
                game_ended: true,
                ..
            }
        )
    });
    assert!(goal_tick_ended, "the fifth goal must end the game on its tick");
    assert_eq!(engine.state().score, (5, 0));
    assert_eq!(engine.status(), RoomStatus::Finished);
    assert_eq!(engine.state().win_reason, Some(WinReason::ScoreLimit));
}

// === Protocol round-trip over the wire shape ===

#[test]
fn test_snapshot_wire_roundtrip() {
    let engine = playing_engine();
    let snapshot = engine.snapshot(NOW);
    let event = ServerEvent::GameState(snapshot);

    let json = serde_json::to_string(&event).unwrap();
    let back: ServerEvent = serde_json::from_str(&json).unwrap();
    match back {
        ServerEvent::GameState(snap) => {
            assert_eq!(snap.players.len(), 2);
            assert_eq!(snap.game_state, "PLAYING");
            assert_eq!(snap.score.left, 0);
        }
        _ => panic!("wrong event after round trip"),
    }
}
