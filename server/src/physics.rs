//! Deterministic fixed-timestep physics for one room.
//!
//! [`Simulation::tick`] advances a [`RoomState`] by exactly one step of
//! Δt = 1/tick_hz given the current intent frame per seat. It is pure with
//! respect to time: no wall clock is read, so identical state and inputs
//! always produce identical results. Callers pre-validate inputs; a missing
//! intent means "no keys pressed" and nothing in here panics on caller data.

use shared::config::GameConfig;
use shared::constants::{
    AIR_RESISTANCE, BALL_AIR_RESISTANCE, BALL_BOUNCE_FRICTION, BALL_RADIUS, BALL_RESTITUTION,
    FIELD_HEIGHT, FIELD_WIDTH, FLOOR_Y, GOAL_HEIGHT, GOAL_WIDTH, GRAVITY, JUMP_VELOCITY,
    KICK_COOLDOWN_MS, KICK_POWER, KICK_RANGE, KICK_UPWARD_BIAS, MOVE_ACCEL, PLAYER_RADIUS,
};
use shared::types::{BallState, InputKeys, PlayerState, RoomState, RoomStatus, Seat, Vec2};
use shared::types::{WinReason, Winner};

/// The sampled intent per seat for one tick. `None` = no keys pressed.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickInputs {
    pub left: Option<InputKeys>,
    pub right: Option<InputKeys>,
}

impl TickInputs {
    pub fn for_seat(&self, seat: Seat) -> InputKeys {
        match seat {
            Seat::Left => self.left.unwrap_or_default(),
            Seat::Right => self.right.unwrap_or_default(),
        }
    }
}

/// What a tick produced beyond the mutated room state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickEvents {
    /// Side credited with a goal this tick; the caller re-centers the ball.
    pub goal_for: Option<Seat>,
    /// Set when this tick crossed an end condition.
    pub finished: Option<(Winner, WinReason)>,
}

/// One room's physics stepper. Holds only configuration; all mutable state
/// lives in the [`RoomState`] it is handed.
#[derive(Debug, Clone)]
pub struct Simulation {
    config: GameConfig,
}

impl Simulation {
    pub fn new(config: GameConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Resets ball and players to kickoff positions with zero velocity.
    pub fn spawn(&self, room: &mut RoomState) {
        room.ball.reset();
        for seat in [Seat::Left, Seat::Right] {
            if let Some(player) = room.player_mut(seat) {
                let fresh = PlayerState::spawn(player.id.clone(), seat, player.character.clone());
                *player = fresh;
            }
        }
    }

    /// Advances the room by one fixed timestep.
    ///
    /// Tick order: cooldowns, player movement, ball movement, player-player
    /// collision, player-ball collision, kicks (left seat first), goal
    /// check, end-condition check. Ties resolve in seat order.
    pub fn tick(&self, room: &mut RoomState, inputs: &TickInputs) -> TickEvents {
        let dt = self.config.dt();
        let mut events = TickEvents::default();

        // 1. Kick cooldowns.
        for seat in [Seat::Left, Seat::Right] {
            if let Some(player) = room.player_mut(seat) {
                player.kick_cooldown_ms = (player.kick_cooldown_ms - dt * 1000.0).max(0.0);
            }
        }

        // 2. Players: intents, gravity, drag, integration, world clamp.
        for seat in [Seat::Left, Seat::Right] {
            let keys = inputs.for_seat(seat);
            if let Some(player) = room.player_mut(seat) {
                step_player(player, keys, dt);
            }
        }

        // 3. Ball: gravity, drag, integration, bounds.
        step_ball(&mut room.ball, dt);

        // 4. Player-player collision.
        self.collide_players(room);

        // 5. Player-ball collision.
        for seat in [Seat::Left, Seat::Right] {
            collide_player_ball(room, seat);
        }

        // 6. Kicks, left seat first.
        for seat in [Seat::Left, Seat::Right] {
            apply_kick(room, seat);
        }

        // 7. Goal check behind the cooldown interlock.
        if let Some(side) = self.check_goal(room) {
            match side {
                Seat::Left => room.score.0 += 1,
                Seat::Right => room.score.1 += 1,
            }
            room.last_goal_ms = Some(room.game_time_ms);
            events.goal_for = Some(side);
        }

        // 8. End conditions.
        if let Some((winner, reason)) = self.check_end(room) {
            room.status = RoomStatus::Finished;
            room.winner = Some(winner);
            room.win_reason = Some(reason);
            events.finished = Some((winner, reason));
        }

        events
    }

    fn collide_players(&self, room: &mut RoomState) {
        if room.players[0].is_none() || room.players[1].is_none() {
            return;
        }
        let (first, rest) = room.players.split_at_mut(1);
        if let (Some(p1), Some(p2)) = (first[0].as_mut(), rest[0].as_mut()) {
            resolve_player_collision(p1, p2);
        }
    }

    /// Side to credit when the ball sits entirely inside a goal mouth and
    /// the cooldown has elapsed.
    fn check_goal(&self, room: &RoomState) -> Option<Seat> {
        if let Some(last) = room.last_goal_ms {
            if room.game_time_ms - last < self.config.goal_cooldown_ms as f64 {
                return None;
            }
        }

        let ball = &room.ball;
        let mouth_top = FIELD_HEIGHT - GOAL_HEIGHT;
        let in_mouth_band =
            ball.position.y - BALL_RADIUS >= mouth_top && ball.position.y + BALL_RADIUS <= FLOOR_Y;
        if !in_mouth_band {
            return None;
        }

        // Full circumference past the goal line. Left mouth credits Right.
        if ball.position.x <= GOAL_WIDTH - BALL_RADIUS {
            Some(Seat::Right)
        } else if ball.position.x >= FIELD_WIDTH - GOAL_WIDTH + BALL_RADIUS {
            Some(Seat::Left)
        } else {
            None
        }
    }

    fn check_end(&self, room: &RoomState) -> Option<(Winner, WinReason)> {
        let limit = self.config.score_limit;
        if room.score.0 >= limit || room.score.1 >= limit {
            return Some((room.leader(), WinReason::ScoreLimit));
        }
        if room.game_time_ms >= self.config.time_limit_ms() {
            return Some((room.leader(), WinReason::TimeLimit));
        }
        None
    }
}

/// Applies one player's intent frame and integrates their motion.
fn step_player(player: &mut PlayerState, keys: InputKeys, dt: f32) {
    // Horizontal input accelerates; top speed comes from drag equilibrium.
    if keys.left {
        player.velocity.x -= MOVE_ACCEL * dt;
        player.facing = -1;
    }
    if keys.right {
        player.velocity.x += MOVE_ACCEL * dt;
        player.facing = 1;
    }
    if keys.up && player.on_ground {
        player.velocity.y = JUMP_VELOCITY;
        player.on_ground = false;
    }
    player.kicking = keys.kick && player.kick_cooldown_ms <= 0.0;

    if !player.on_ground {
        player.velocity.y += GRAVITY * dt;
    }
    player.velocity.x *= AIR_RESISTANCE;
    player.velocity.y *= AIR_RESISTANCE;

    player.position.x += player.velocity.x * dt;
    player.position.y += player.velocity.y * dt;

    // World clamp, zeroing the penetrating component.
    if player.position.x < PLAYER_RADIUS {
        player.position.x = PLAYER_RADIUS;
        player.velocity.x = 0.0;
    } else if player.position.x > FIELD_WIDTH - PLAYER_RADIUS {
        player.position.x = FIELD_WIDTH - PLAYER_RADIUS;
        player.velocity.x = 0.0;
    }

    if player.position.y >= FLOOR_Y - PLAYER_RADIUS {
        player.position.y = FLOOR_Y - PLAYER_RADIUS;
        player.velocity.y = 0.0;
        player.on_ground = true;
    } else if player.position.y < PLAYER_RADIUS {
        player.position.y = PLAYER_RADIUS;
        player.velocity.y = 0.0;
    } else {
        player.on_ground = false;
    }
}

/// Integrates the ball and resolves wall, floor, and ceiling contacts.
///
/// The side walls do not reflect inside the goal mouth band; there the ball
/// runs until the back of the goal, which stops it like a net.
fn step_ball(ball: &mut BallState, dt: f32) {
    ball.velocity.y += GRAVITY * dt;
    ball.velocity.x *= BALL_AIR_RESISTANCE;
    ball.velocity.y *= BALL_AIR_RESISTANCE;

    ball.position.x += ball.velocity.x * dt;
    ball.position.y += ball.velocity.y * dt;

    let mouth_top = FIELD_HEIGHT - GOAL_HEIGHT;
    let in_mouth_band = ball.position.y >= mouth_top;

    if ball.position.x < BALL_RADIUS {
        ball.position.x = BALL_RADIUS;
        if in_mouth_band {
            ball.velocity.x = 0.0;
        } else {
            ball.velocity.x = -ball.velocity.x * BALL_RESTITUTION;
            ball.velocity.y *= BALL_BOUNCE_FRICTION;
        }
    } else if ball.position.x > FIELD_WIDTH - BALL_RADIUS {
        ball.position.x = FIELD_WIDTH - BALL_RADIUS;
        if in_mouth_band {
            ball.velocity.x = 0.0;
        } else {
            ball.velocity.x = -ball.velocity.x * BALL_RESTITUTION;
            ball.velocity.y *= BALL_BOUNCE_FRICTION;
        }
    }

    if ball.position.y > FLOOR_Y - BALL_RADIUS {
        ball.position.y = FLOOR_Y - BALL_RADIUS;
        ball.velocity.y = -ball.velocity.y * BALL_RESTITUTION;
        ball.velocity.x *= BALL_BOUNCE_FRICTION;
    } else if ball.position.y < BALL_RADIUS {
        ball.position.y = BALL_RADIUS;
        ball.velocity.y = -ball.velocity.y * BALL_RESTITUTION;
        ball.velocity.x *= BALL_BOUNCE_FRICTION;
    }

    ball.velocity = ball.velocity.clamp_length(shared::constants::MAX_BALL_SPEED);

    ball.trail.push(ball.position);
    ball.rotation_speed = ball.velocity.x / BALL_RADIUS;
    ball.rotation += ball.rotation_speed * dt;
}

/// Separates two overlapping players by equal halves along their center
/// axis, then swaps velocities at half magnitude.
fn resolve_player_collision(p1: &mut PlayerState, p2: &mut PlayerState) {
    let dx = p2.position.x - p1.position.x;
    let dy = p2.position.y - p1.position.y;
    let distance = (dx * dx + dy * dy).sqrt();
    let min_distance = 2.0 * PLAYER_RADIUS;

    if distance >= min_distance {
        return;
    }

    // Coincident centers: push apart horizontally, seat order decides sides.
    if distance < 0.001 {
        p1.position.x -= PLAYER_RADIUS;
        p2.position.x += PLAYER_RADIUS;
        return;
    }

    let nx = dx / distance;
    let ny = dy / distance;
    let separation = (min_distance - distance) / 2.0;

    p1.position.x -= nx * separation;
    p1.position.y -= ny * separation;
    p2.position.x += nx * separation;
    p2.position.y += ny * separation;

    p1.position.x = p1.position.x.clamp(PLAYER_RADIUS, FIELD_WIDTH - PLAYER_RADIUS);
    p1.position.y = p1.position.y.clamp(PLAYER_RADIUS, FLOOR_Y - PLAYER_RADIUS);
    p2.position.x = p2.position.x.clamp(PLAYER_RADIUS, FIELD_WIDTH - PLAYER_RADIUS);
    p2.position.y = p2.position.y.clamp(PLAYER_RADIUS, FLOOR_Y - PLAYER_RADIUS);

    let (v1x, v1y) = (p1.velocity.x, p1.velocity.y);
    p1.velocity.x = p2.velocity.x * 0.5;
    p1.velocity.y = p2.velocity.y * 0.5;
    p2.velocity.x = v1x * 0.5;
    p2.velocity.y = v1y * 0.5;
}

/// Pushes the ball out of a player by the minimum translation and lets it
/// inherit 0.3× of the player's velocity.
fn collide_player_ball(room: &mut RoomState, seat: Seat) {
    let Some(player) = room.player(seat) else {
        return;
    };
    let player_pos = player.position;
    let player_vel = player.velocity;
    let player_id = player.id.clone();

    let ball = &mut room.ball;
    let dx = ball.position.x - player_pos.x;
    let dy = ball.position.y - player_pos.y;
    let distance = (dx * dx + dy * dy).sqrt();
    let min_distance = PLAYER_RADIUS + BALL_RADIUS;

    if distance >= min_distance {
        return;
    }

    // Degenerate overlap: eject straight up.
    let (nx, ny) = if distance < 0.001 {
        (0.0, -1.0)
    } else {
        (dx / distance, dy / distance)
    };

    let push = min_distance - distance;
    ball.position.x += nx * push;
    ball.position.y += ny * push;

    ball.velocity.x += player_vel.x * 0.3;
    ball.velocity.y += player_vel.y * 0.3;
    ball.velocity = ball.velocity.clamp_length(shared::constants::MAX_BALL_SPEED);
    ball.last_touched_by = Some(player_id);
}

/// Consumes a pending kick when the ball is in range: impulse along the
/// player→ball angle scaled by kick power and facing in X, fixed upward
/// bias in Y, then the cooldown starts.
fn apply_kick(room: &mut RoomState, seat: Seat) {
    let Some(player) = room.player(seat) else {
        return;
    };
    if !player.kicking {
        return;
    }
    let player_pos = player.position;
    let facing = player.facing as f32;
    let player_id = player.id.clone();

    let distance = player_pos.distance(room.ball.position);
    if distance > KICK_RANGE {
        return;
    }

    let angle = (room.ball.position.y - player_pos.y).atan2(room.ball.position.x - player_pos.x);
    room.ball.velocity.x += angle.cos() * KICK_POWER * facing;
    room.ball.velocity.y += KICK_UPWARD_BIAS;
    room.ball.velocity = room.ball.velocity.clamp_length(shared::constants::MAX_BALL_SPEED);
    room.ball.last_touched_by = Some(player_id);

    if let Some(player) = room.player_mut(seat) {
        player.kicking = false;
        player.kick_cooldown_ms = KICK_COOLDOWN_MS;
    }
}
