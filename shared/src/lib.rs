//! # Shared Game Library
//!
//! Data structures, constants, and the wire protocol shared by the
//! authoritative head-soccer server and its tooling. It is the foundation
//! for networked play and keeps the distributed pieces consistent.
//!
//! ## Core Components
//!
//! ### Game Constants
//! Physics parameters and field geometry in [`constants`]: gravity, movement
//! acceleration, drag factors, the 1600×900 field, goal mouths, and entity
//! radii. Every bound the validator enforces derives from these values.
//!
//! ### Entity Model
//! [`types`] holds the simulation records: [`types::PlayerState`],
//! [`types::BallState`] with its fixed-capacity position trail,
//! [`types::RoomState`] and the room lifecycle enums. These are plain data;
//! behavior lives server-side.
//!
//! ### Network Protocol
//! [`protocol`] defines the complete JSON message surface as two tagged
//! unions, [`protocol::ClientEvent`] and [`protocol::ServerEvent`], whose
//! serde tags are the wire event names, plus the rounded per-tick
//! [`protocol::GameSnapshot`].
//!
//! ### Configuration
//! [`config::GameConfig`] carries the tunable match parameters (tick rate,
//! score and time limits, timeouts, plausibility ceilings) with the
//! documented defaults.
//!
//! ## Design Philosophy
//!
//! The server is the single simulation authority: clients submit intents and
//! advisory state, and everything here is shaped so the server can validate,
//! correct, and re-broadcast without ambiguity. All physics state is
//! single-precision float for deterministic cross-platform results, and the
//! broadcast types round to the protocol's fixed precision.

pub mod config;
pub mod constants;
pub mod protocol;
pub mod types;

pub use config::GameConfig;
pub use constants::*;
pub use protocol::{ClientEvent, GameMode, GameSnapshot, ServerEvent};
pub use types::{
    BallState, InputKeys, IntentFrame, PlayerState, RoomState, RoomStatus, Seat, Vec2, WinReason,
    Winner,
};
