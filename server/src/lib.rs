//! # Head-Soccer Game Server Library
//!
//! The authoritative server for two-player head soccer. It owns every
//! simulation and adjudication decision: clients submit input intents and
//! advisory state over WebSocket, the server validates, simulates at a
//! fixed 240 Hz tick, and broadcasts canonical snapshots.
//!
//! ## Module Organization
//!
//! - [`physics`]: deterministic fixed-timestep simulation of one room
//! - [`room`]: room lifecycle state machine and intent sampling
//! - [`worker`]: the per-room tick-driver task and its command inbox
//! - [`matchmaker`]: FIFO queues per mode and the ready-up handshake
//! - [`connection`]: socket table, authentication, membership, fan-out
//! - [`router`]: declarative schema validation and dispatch
//! - [`rate_limit`]: per-connection token buckets by event class
//! - [`validator`]: plausibility gate and anti-cheat observations
//! - [`broadcast`]: snapshot emission policy
//! - [`game_end`]: terminal-transition pipeline through the store
//! - [`store`]: the external key-value boundary and its in-memory default
//! - [`metrics`]: event counters and handling-time percentiles
//! - [`network`]: the process-wide [`network::Server`] and socket tasks
//! - [`config`]: server configuration
//!
//! ## Architecture
//!
//! One task per active room advances that room's simulation; all room
//! mutations flow through its inbox, so rooms need no locks. Cross-room
//! concerns (matchmaking, ingress, heartbeat) run in the main event loop
//! and communicate with rooms by message passing. The connection table sits
//! behind a read-write lock: broadcasts read, connect/disconnect write.
//!
//! Rejections of every kind (validation, rate limit, authorization, state
//! mismatch, plausibility) are values surfaced to the offending client;
//! they never tear down the connection, and nothing a client sends can
//! panic the process.

pub mod broadcast;
pub mod config;
pub mod connection;
pub mod game_end;
pub mod matchmaker;
pub mod metrics;
pub mod network;
pub mod physics;
pub mod rate_limit;
pub mod room;
pub mod router;
pub mod store;
pub mod util;
pub mod validator;
pub mod worker;
