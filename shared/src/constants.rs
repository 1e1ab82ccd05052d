//! Physics constants and field geometry for the head-soccer world.
//!
//! These values define the physical behavior and spatial boundaries of the
//! game. Server and tooling share them so that the authoritative simulation
//! and every validation bound derive from one place.

/// Downward gravitational acceleration applied to players and the ball
///
/// Applied continuously during physics updates while an entity is airborne.
pub const GRAVITY: f32 = 1500.0; // pixels/second²

/// Horizontal acceleration applied while a movement key is held
///
/// Movement is modeled as `vel.x += MOVE_ACCEL * dt` per tick rather than a
/// fixed speed, so the effective top speed depends on AIR_RESISTANCE: with
/// the shipped constants it settles around 300 pixels/second.
pub const MOVE_ACCEL: f32 = 750.0; // pixels/second²

/// Initial upward velocity when a player jumps
///
/// Negative because the coordinate system has Y increasing downward.
pub const JUMP_VELOCITY: f32 = -700.0; // pixels/second

/// Multiplicative per-tick velocity damping for players
pub const AIR_RESISTANCE: f32 = 0.99;

/// Multiplicative per-tick velocity damping for the ball, both axes
pub const BALL_AIR_RESISTANCE: f32 = 0.998;

/// Velocity retained along the surface normal after a ball bounce
pub const BALL_RESTITUTION: f32 = 0.8;

/// Velocity retained along the surface tangent after a ball bounce
pub const BALL_BOUNCE_FRICTION: f32 = 0.95;

/// Total width of the playable field
pub const FIELD_WIDTH: f32 = 1600.0; // pixels

/// Total height of the playable field
pub const FIELD_HEIGHT: f32 = 900.0; // pixels

/// Y-coordinate of the ground
///
/// Entities rest with their lower circumference on this line; the region
/// below it is never reachable.
pub const FLOOR_Y: f32 = 880.0; // pixels from top

/// Depth of each goal mouth measured inward from the side walls
pub const GOAL_WIDTH: f32 = 75.0; // pixels

/// Height of each goal mouth measured upward from the floor region
///
/// The mouths occupy `y >= FIELD_HEIGHT - GOAL_HEIGHT` on the left and right
/// edges; inside that band the side walls do not bounce the ball.
pub const GOAL_HEIGHT: f32 = 250.0; // pixels

/// Collision radius of the ball
pub const BALL_RADIUS: f32 = 25.0; // pixels

/// Collision radius of a player head
pub const PLAYER_RADIUS: f32 = 30.0; // pixels

/// Y-coordinate the ball is (re)spawned at, centered horizontally
pub const BALL_SPAWN_Y: f32 = 220.0; // pixels

/// Y-coordinate players are seated at on spawn
pub const PLAYER_SPAWN_Y: f32 = FLOOR_Y - PLAYER_RADIUS; // pixels

/// Impulse magnitude applied to the ball by a kick
pub const KICK_POWER: f32 = 800.0; // pixels/second

/// Fixed upward velocity component added by every kick
pub const KICK_UPWARD_BIAS: f32 = -400.0; // pixels/second

/// Maximum player-to-ball center distance for a kick to connect
pub const KICK_RANGE: f32 = 70.0; // pixels

/// Cooldown between kicks for one player
pub const KICK_COOLDOWN_MS: f32 = 500.0;

/// Number of trailing ball positions retained for the snapshot trail
pub const BALL_TRAIL_LEN: usize = 10;

/// Hard ceiling on ball speed regardless of impulses
pub const MAX_BALL_SPEED: f32 = 800.0; // pixels/second
