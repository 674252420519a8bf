//! The authoritative side: validated commands, server move handling, the
//! un-freeze timer and tick scheduling.
//!
//! The authority owns the canonical [`MovementState`]. Clients submit move
//! packets (unreliable, re-sent until acknowledged) and one-shot
//! [`AuthoritativeCommand`]s (reliable). Both are checked by
//! [`CommandValidator`] before anything touches the state.

use std::collections::VecDeque;

use glam::{Quat, Vec3};
use kinetic_config::{Config, ValidationConfig};
use serde::{Deserialize, Serialize};

use crate::abilities::{MovementEvent, StepContext};
use crate::input::WallJumpRequest;
use crate::query::{MovementEnv, SpatialQuery};
use crate::simulator::MovementSimulator;
use crate::state::MovementState;
use crate::timer::{TimerQueue, TimerSlot};
use crate::wire::{Reliability, ServerMessage, WireMove};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default server tick rate in Hz.
pub const DEFAULT_TICK_RATE: u32 = 60;

/// Allowed deviation of a rotation's length from 1.
const ROTATION_TOLERANCE: f32 = 1e-3;

/// Allowed excess of a move direction's length over 1.
const DIRECTION_TOLERANCE: f32 = 1e-3;

/// Width of the command rate-limit window, s.
const RATE_WINDOW_SECS: f64 = 1.0;

// ---------------------------------------------------------------------------
// AuthoritativeCommand
// ---------------------------------------------------------------------------

/// A one-shot request the authority validates before applying.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AuthoritativeCommand {
    /// Freeze or release the character.
    SetFrozen(bool),
    /// Orientation held while frozen.
    SetFrozenLookDirection(Quat),
    /// Launch off a nearby wall with this velocity.
    LaunchCharacter(Vec3),
    /// Latest move direction. Idempotent, so it may be duplicated or lost.
    SetMoveDirection(Vec3),
}

impl AuthoritativeCommand {
    /// Channel this command travels on.
    pub fn reliability(&self) -> Reliability {
        match self {
            Self::SetMoveDirection(_) => Reliability::Unreliable,
            Self::SetFrozen(_) | Self::SetFrozenLookDirection(_) | Self::LaunchCharacter(_) => {
                Reliability::Reliable
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CommandRejected
// ---------------------------------------------------------------------------

/// Reasons the authority refuses a command or a client move.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandRejected {
    /// A vector, rotation or scalar was NaN or infinite.
    #[error("non-finite {0}")]
    NonFinite(&'static str),

    /// Launch velocity exceeds the configured limit.
    #[error("launch too fast: speed {speed} > max {max}")]
    LaunchTooFast {
        /// Requested speed.
        speed: f32,
        /// Maximum allowed.
        max: f32,
    },

    /// Too many reliable commands inside one rate window.
    #[error("rate limited: more than {max} commands per second")]
    RateLimited {
        /// Maximum allowed per window.
        max: u32,
    },

    /// Launch requested with no qualifying wall in reach.
    #[error("no wall in reach for launch")]
    NoWallForLaunch,

    /// Rotation is not unit length.
    #[error("rotation not normalized: length {0}")]
    InvalidRotation(f32),

    /// Move direction longer than 1.
    #[error("move direction too long: length {0}")]
    MoveDirectionTooLong(f32),

    /// Move delta time is not a positive duration within the limit.
    #[error("invalid delta time {0}")]
    InvalidDeltaTime(f32),
}

// ---------------------------------------------------------------------------
// CommandValidator
// ---------------------------------------------------------------------------

/// Admission checks for commands and client moves.
///
/// Reliable commands are rate limited over a sliding one-second window.
pub struct CommandValidator {
    config: ValidationConfig,
    max_move_delta: f32,
    recent: VecDeque<f64>,
}

impl CommandValidator {
    /// Creates a validator. Moves longer than the larger of one tick and
    /// the maximum combined delta are refused.
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.validation.clone(),
            max_move_delta: config
                .prediction
                .max_combined_delta
                .max(config.tick_seconds()),
            recent: VecDeque::new(),
        }
    }

    /// Validates `command` against the authority's `state` at time `now`.
    /// Accepted reliable commands count towards the rate limit.
    pub fn validate(
        &mut self,
        command: &AuthoritativeCommand,
        sim: &MovementSimulator,
        state: &MovementState,
        spatial: &dyn SpatialQuery,
        now: f64,
    ) -> Result<(), CommandRejected> {
        match *command {
            AuthoritativeCommand::SetFrozen(_) => {}
            AuthoritativeCommand::SetFrozenLookDirection(rotation) => {
                check_rotation(rotation)?;
            }
            AuthoritativeCommand::LaunchCharacter(velocity) => {
                if !velocity.is_finite() {
                    return Err(CommandRejected::NonFinite("launch velocity"));
                }
                let speed = velocity.length();
                if speed > self.config.max_launch_speed {
                    return Err(CommandRejected::LaunchTooFast {
                        speed,
                        max: self.config.max_launch_speed,
                    });
                }
                let near_wall = state.wall_run.is_running
                    || sim
                        .wall_run()
                        .find_wall(
                            spatial,
                            state.position,
                            state.forward(),
                            self.config.wall_jump_margin,
                        )
                        .is_some();
                if !near_wall {
                    return Err(CommandRejected::NoWallForLaunch);
                }
            }
            AuthoritativeCommand::SetMoveDirection(direction) => {
                check_direction(direction)?;
            }
        }

        if command.reliability() == Reliability::Reliable {
            self.admit(now)?;
        }
        Ok(())
    }

    /// Validates one client move.
    pub fn validate_move(&self, wire: &WireMove) -> Result<(), CommandRejected> {
        let dt = wire.delta_time;
        if !dt.is_finite() || dt <= 0.0 || dt > self.max_move_delta * (1.0 + f32::EPSILON) {
            return Err(CommandRejected::InvalidDeltaTime(dt));
        }
        check_direction(wire.move_direction)?;
        if !wire.facing.is_finite() {
            return Err(CommandRejected::NonFinite("facing"));
        }
        if !wire.client_position.is_finite() {
            return Err(CommandRejected::NonFinite("client position"));
        }
        if wire.jetpack_fuel.is_some_and(|fuel| !fuel.is_finite()) {
            return Err(CommandRejected::NonFinite("jetpack fuel"));
        }
        if let Some(WallJumpRequest::Direction(direction)) = wire.wall_jump
            && !direction.is_finite()
        {
            return Err(CommandRejected::NonFinite("wall jump direction"));
        }
        Ok(())
    }

    fn admit(&mut self, now: f64) -> Result<(), CommandRejected> {
        while self
            .recent
            .front()
            .is_some_and(|&t| now - t >= RATE_WINDOW_SECS)
        {
            self.recent.pop_front();
        }
        let max = self.config.max_commands_per_second;
        if self.recent.len() >= max as usize {
            return Err(CommandRejected::RateLimited { max });
        }
        self.recent.push_back(now);
        Ok(())
    }
}

fn check_rotation(rotation: Quat) -> Result<(), CommandRejected> {
    if !rotation.is_finite() {
        return Err(CommandRejected::NonFinite("rotation"));
    }
    let length = rotation.length();
    if (length - 1.0).abs() > ROTATION_TOLERANCE {
        return Err(CommandRejected::InvalidRotation(length));
    }
    Ok(())
}

fn check_direction(direction: Vec3) -> Result<(), CommandRejected> {
    if !direction.is_finite() {
        return Err(CommandRejected::NonFinite("move direction"));
    }
    let length = direction.length();
    if length > 1.0 + DIRECTION_TOLERANCE {
        return Err(CommandRejected::MoveDirectionTooLong(length));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// AuthoritativeCharacter
// ---------------------------------------------------------------------------

/// Payloads of the authority's timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorityTimer {
    /// The freeze expires.
    Unfreeze,
}

/// What [`AuthoritativeCharacter::receive_moves`] produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoveBatchOutcome {
    /// Reply for the client: `Ack` if every move matched, otherwise a
    /// `Correction`. `None` before the first move is processed.
    pub reply: Option<ServerMessage>,
    /// Events from the simulated moves.
    pub events: Vec<MovementEvent>,
    /// Moves simulated (stale duplicates excluded).
    pub applied: usize,
    /// Moves refused by validation.
    pub rejected: usize,
}

/// Server-side owner of one character's canonical movement state.
pub struct AuthoritativeCharacter {
    sim: MovementSimulator,
    state: MovementState,
    validator: CommandValidator,
    timers: TimerQueue<AuthorityTimer>,
    freeze_timer: TimerSlot,
    position_tolerance: f32,
    fuel_tolerance: f32,
    last_processed_tick: Option<u64>,
}

impl AuthoritativeCharacter {
    /// Spawns a walking character at `position`.
    pub fn new(config: &Config, position: Vec3) -> Self {
        let sim = MovementSimulator::new(config);
        let state = sim.spawn(position);
        Self {
            sim,
            state,
            validator: CommandValidator::new(config),
            timers: TimerQueue::new(),
            freeze_timer: TimerSlot::new(),
            position_tolerance: config.prediction.position_tolerance,
            fuel_tolerance: config.prediction.fuel_tolerance,
            last_processed_tick: None,
        }
    }

    pub fn state(&self) -> &MovementState {
        &self.state
    }

    pub fn simulator(&self) -> &MovementSimulator {
        &self.sim
    }

    /// Last client tick simulated.
    pub fn last_processed_tick(&self) -> Option<u64> {
        self.last_processed_tick
    }

    /// Seconds of authority time elapsed.
    pub fn now(&self) -> f64 {
        self.timers.now()
    }

    /// Returns `true` while the un-freeze timer is pending.
    pub fn freeze_timer_armed(&self) -> bool {
        self.freeze_timer.is_armed()
    }

    /// Simulates a batch of client moves in tick order.
    ///
    /// Moves at or before the last processed tick are duplicates of
    /// re-sent moves and are skipped. Each new move is validated, rebuilt
    /// against the authority's own state, simulated, and its reported
    /// position compared with ours. Refused moves are still marked as
    /// processed so the client stops re-sending them, and force a
    /// correction.
    pub fn receive_moves(&mut self, moves: &[WireMove], env: MovementEnv<'_>) -> MoveBatchOutcome {
        let mut outcome = MoveBatchOutcome::default();
        let mut diverged = false;

        for wire in moves {
            if self.last_processed_tick.is_some_and(|last| wire.tick <= last) {
                continue;
            }
            self.last_processed_tick = Some(wire.tick);

            if let Err(err) = self.validator.validate_move(wire) {
                tracing::warn!(tick = wire.tick, %err, "move rejected");
                outcome.rejected += 1;
                diverged = true;
                continue;
            }

            if let Some(fuel) = wire.jetpack_fuel
                && (fuel - self.state.jetpack.fuel).abs() > self.fuel_tolerance
            {
                tracing::debug!(
                    tick = wire.tick,
                    client = fuel,
                    server = self.state.jetpack.fuel,
                    "client fuel disagrees"
                );
                diverged = true;
            }

            let record = wire.to_record(&self.state);
            outcome
                .events
                .extend(self.sim.apply_record(&mut self.state, &record, env));
            outcome.applied += 1;

            let error = wire.client_position.distance(self.state.position);
            if error > self.position_tolerance {
                tracing::debug!(tick = wire.tick, error, "client position disagrees");
                diverged = true;
            }
        }

        outcome.reply = self.last_processed_tick.map(|tick| {
            if diverged {
                ServerMessage::Correction {
                    tick,
                    state: self.state.clone(),
                }
            } else {
                ServerMessage::Ack { tick }
            }
        });
        outcome
    }

    /// Validates and applies a command. Returns the reliable messages the
    /// client must receive as a result.
    pub fn handle_command(
        &mut self,
        command: AuthoritativeCommand,
        env: MovementEnv<'_>,
    ) -> Result<Vec<ServerMessage>, CommandRejected> {
        let now = self.timers.now();
        if let Err(err) = self
            .validator
            .validate(&command, &self.sim, &self.state, env.spatial, now)
        {
            tracing::warn!(?command, %err, "command rejected");
            return Err(err);
        }
        Ok(self.apply(command, env.spatial))
    }

    /// Applies a (pre-validated) command.
    fn apply(
        &mut self,
        command: AuthoritativeCommand,
        spatial: &dyn SpatialQuery,
    ) -> Vec<ServerMessage> {
        match command {
            AuthoritativeCommand::SetFrozen(frozen) => {
                self.set_frozen(frozen).into_iter().collect()
            }
            AuthoritativeCommand::SetFrozenLookDirection(look) => {
                self.sim.freeze().set_look_direction(&mut self.state, look);
                if self.state.freeze.is_frozen {
                    vec![self.freeze_message()]
                } else {
                    Vec::new()
                }
            }
            AuthoritativeCommand::LaunchCharacter(velocity) => {
                let mut events = Vec::new();
                let mut ctx = StepContext {
                    dt: 0.0,
                    spatial,
                    events: &mut events,
                };
                self.sim
                    .wall_run()
                    .apply_launch(&mut self.state, velocity, false, &mut ctx);
                Vec::new()
            }
            AuthoritativeCommand::SetMoveDirection(direction) => {
                self.state.move_direction = direction;
                Vec::new()
            }
        }
    }

    /// Freezes or releases the character. Freezing (re)arms the expiry
    /// timer; releasing cancels it. Returns the replication message, or
    /// `None` if nothing changed.
    pub fn set_frozen(&mut self, frozen: bool) -> Option<ServerMessage> {
        let mut events = Vec::new();
        let changed = if frozen {
            let changed = self.sim.freeze().freeze(&mut self.state, &mut events);
            if changed {
                let delay = self.sim.freeze().frozen_time();
                self.freeze_timer
                    .restart(&mut self.timers, delay, AuthorityTimer::Unfreeze);
            }
            changed
        } else {
            self.freeze_timer.cancel(&mut self.timers);
            self.sim.freeze().unfreeze(&mut self.state, &mut events)
        };
        changed.then(|| self.freeze_message())
    }

    /// Advances authority time, firing due timers. Returns the reliable
    /// messages they produced.
    pub fn advance(&mut self, dt: f32) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        for fired in self.timers.advance(dt) {
            if !self.freeze_timer.claim(fired.id) {
                tracing::trace!(id = %fired.id, "stale timer ignored");
                continue;
            }
            match fired.event {
                AuthorityTimer::Unfreeze => {
                    let mut events = Vec::new();
                    if self.sim.freeze().unfreeze(&mut self.state, &mut events) {
                        tracing::debug!("freeze expired");
                        messages.push(self.freeze_message());
                    }
                }
            }
        }
        messages
    }

    fn freeze_message(&self) -> ServerMessage {
        ServerMessage::FreezeReplicated {
            is_frozen: self.state.freeze.is_frozen,
            look_direction: self.state.freeze.look_direction,
        }
    }
}

// ---------------------------------------------------------------------------
// ServerTickSchedule
// ---------------------------------------------------------------------------

/// Fixed-rate tick scheduler for the authority's simulation loop.
///
/// Accumulates real elapsed time and yields discrete ticks at the
/// configured rate (default [`DEFAULT_TICK_RATE`] Hz).
pub struct ServerTickSchedule {
    accumulator_secs: f64,
    tick_duration_secs: f64,
    total_ticks: u64,
}

impl ServerTickSchedule {
    /// Creates a new schedule at the default 60 Hz tick rate.
    pub fn new() -> Self {
        Self::with_tick_rate(DEFAULT_TICK_RATE)
    }

    /// Creates a schedule with a custom tick rate.
    pub fn with_tick_rate(hz: u32) -> Self {
        Self {
            accumulator_secs: 0.0,
            tick_duration_secs: 1.0 / f64::from(hz.max(1)),
            total_ticks: 0,
        }
    }

    /// Accumulates elapsed time and returns the number of ticks to process.
    pub fn accumulate(&mut self, dt_secs: f64) -> u32 {
        self.accumulator_secs += dt_secs;
        let mut ticks = 0u32;
        while self.accumulator_secs >= self.tick_duration_secs {
            self.accumulator_secs -= self.tick_duration_secs;
            self.total_ticks += 1;
            ticks += 1;
        }
        ticks
    }

    /// Returns the total number of ticks processed since creation.
    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    /// Returns the tick duration in seconds.
    pub fn tick_duration_secs(&self) -> f64 {
        self.tick_duration_secs
    }
}

impl Default for ServerTickSchedule {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::AbilityFlags;
    use crate::input::MoveInput;
    use crate::query::{Arena, CombatSnapshot, Plane};
    use crate::record::MoveRecord;
    use crate::state::MovementMode;

    const DT: f32 = 1.0 / 60.0;

    fn wall_arena() -> Arena {
        Arena::open_floor(0.0, 0.35).with_surface(Plane::new(
            Vec3::new(0.0, 0.5, 0.0),
            Vec3::NEG_Y,
            true,
        ))
    }

    /// Simulates `input` on a client copy and packs it like the client does.
    fn client_move(
        sim: &MovementSimulator,
        client: &mut MovementState,
        input: &MoveInput,
        tick: u64,
        env: MovementEnv<'_>,
    ) -> WireMove {
        let record = MoveRecord::capture(sim, client, input, tick, DT);
        sim.apply_record(client, &record, env);
        WireMove::from_record(&record, client.position)
    }

    #[test]
    fn test_command_serialization_roundtrip() {
        let commands = [
            AuthoritativeCommand::SetFrozen(true),
            AuthoritativeCommand::SetFrozenLookDirection(Quat::from_rotation_z(0.5)),
            AuthoritativeCommand::LaunchCharacter(Vec3::new(0.0, -8.0, 2.0)),
            AuthoritativeCommand::SetMoveDirection(Vec3::X),
        ];
        for command in &commands {
            let bytes = postcard::to_allocvec(command).expect("serialize");
            let decoded: AuthoritativeCommand = postcard::from_bytes(&bytes).expect("deserialize");
            assert_eq!(*command, decoded);

            let json = serde_json::to_string(command).expect("json serialize");
            let from_json: AuthoritativeCommand =
                serde_json::from_str(&json).expect("json deserialize");
            assert_eq!(*command, from_json);
        }
        assert_eq!(
            AuthoritativeCommand::SetMoveDirection(Vec3::X).reliability(),
            Reliability::Unreliable
        );
        assert_eq!(
            AuthoritativeCommand::SetFrozen(false).reliability(),
            Reliability::Reliable
        );
    }

    #[test]
    fn test_matching_moves_are_acknowledged() {
        let config = Config::default();
        let mut server = AuthoritativeCharacter::new(&config, Vec3::ZERO);
        let arena = Arena::open_floor(0.0, 0.35);
        let combat = CombatSnapshot::default();
        let env = MovementEnv::new(&arena, &combat);

        let sim = MovementSimulator::new(&config);
        let mut client = sim.spawn(Vec3::ZERO);
        let moves: Vec<WireMove> = (1..=3)
            .map(|tick| client_move(&sim, &mut client, &MoveInput::walking(Vec3::X), tick, env))
            .collect();

        let outcome = server.receive_moves(&moves, env);
        assert_eq!(outcome.applied, 3);
        assert_eq!(outcome.reply, Some(ServerMessage::Ack { tick: 3 }));
        assert_eq!(server.state(), &client);
    }

    #[test]
    fn test_duplicate_moves_are_skipped() {
        let config = Config::default();
        let mut server = AuthoritativeCharacter::new(&config, Vec3::ZERO);
        let arena = Arena::open_floor(0.0, 0.35);
        let combat = CombatSnapshot::default();
        let env = MovementEnv::new(&arena, &combat);

        let sim = MovementSimulator::new(&config);
        let mut client = sim.spawn(Vec3::ZERO);
        let first = client_move(&sim, &mut client, &MoveInput::walking(Vec3::X), 1, env);
        let second = client_move(&sim, &mut client, &MoveInput::walking(Vec3::X), 2, env);

        server.receive_moves(&[first], env);
        let outcome = server.receive_moves(&[first, second], env);
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.reply, Some(ServerMessage::Ack { tick: 2 }));
        assert_eq!(server.state().position, client.position);
    }

    #[test]
    fn test_divergent_client_receives_correction() {
        let config = Config::default();
        let mut server = AuthoritativeCharacter::new(&config, Vec3::ZERO);
        let arena = Arena::open_floor(0.0, 0.35);
        let combat = CombatSnapshot::default();
        let env = MovementEnv::new(&arena, &combat);

        let sim = MovementSimulator::new(&config);
        let mut client = sim.spawn(Vec3::new(0.0, 1.0, 0.0));
        let wire = client_move(&sim, &mut client, &MoveInput::walking(Vec3::X), 1, env);

        let outcome = server.receive_moves(&[wire], env);
        match outcome.reply {
            Some(ServerMessage::Correction { tick, state }) => {
                assert_eq!(tick, 1);
                assert_eq!(&state, server.state());
            }
            other => panic!("expected correction, got {other:?}"),
        }
    }

    #[test]
    fn test_fuel_compared_with_fuel_tolerance() {
        let config = Config::default();
        let arena = Arena::open_floor(0.0, 0.35);
        let combat = CombatSnapshot::default();
        let env = MovementEnv::new(&arena, &combat);
        let sim = MovementSimulator::new(&config);

        let mut client = sim.spawn(Vec3::ZERO);
        let mut wire = client_move(&sim, &mut client, &MoveInput::walking(Vec3::X), 1, env);
        let max_fuel = config.jetpack.max_fuel;

        // Inside the fuel tolerance but wider than the position tolerance.
        wire.jetpack_fuel = Some(max_fuel - 0.03);
        let mut server = AuthoritativeCharacter::new(&config, Vec3::ZERO);
        let outcome = server.receive_moves(&[wire], env);
        assert_eq!(outcome.reply, Some(ServerMessage::Ack { tick: 1 }));

        wire.jetpack_fuel = Some(max_fuel - 1.0);
        let mut server = AuthoritativeCharacter::new(&config, Vec3::ZERO);
        let outcome = server.receive_moves(&[wire], env);
        assert!(matches!(outcome.reply, Some(ServerMessage::Correction { tick: 1, .. })));
    }

    #[test]
    fn test_invalid_delta_time_rejected_but_processed() {
        let config = Config::default();
        let mut server = AuthoritativeCharacter::new(&config, Vec3::ZERO);
        let arena = Arena::open_floor(0.0, 0.35);
        let combat = CombatSnapshot::default();
        let env = MovementEnv::new(&arena, &combat);

        let wire = WireMove {
            tick: 1,
            flags: AbilityFlags::default(),
            delta_time: 5.0,
            move_direction: Vec3::X,
            facing: Quat::IDENTITY,
            wall_jump: None,
            jetpack_fuel: None,
            client_position: Vec3::new(30.0, 0.0, 0.0),
        };
        let outcome = server.receive_moves(&[wire], env);
        assert_eq!(outcome.rejected, 1);
        assert_eq!(outcome.applied, 0);
        assert_eq!(server.last_processed_tick(), Some(1));
        assert!(matches!(outcome.reply, Some(ServerMessage::Correction { .. })));
        assert_eq!(server.state().position, Vec3::ZERO);
    }

    #[test]
    fn test_freeze_expires_after_frozen_time() {
        let config = Config::default();
        let mut server = AuthoritativeCharacter::new(&config, Vec3::ZERO);

        let message = server.set_frozen(true);
        assert!(matches!(
            message,
            Some(ServerMessage::FreezeReplicated { is_frozen: true, .. })
        ));
        assert!(server.freeze_timer_armed());

        let mut released = Vec::new();
        for _ in 0..179 {
            released.extend(server.advance(DT));
        }
        assert!(released.is_empty());
        assert!(server.state().freeze.is_frozen);

        released.extend(server.advance(DT));
        assert_eq!(released.len(), 1);
        assert!(!server.state().freeze.is_frozen);
        assert_eq!(server.state().mode, MovementMode::Walking);
        assert!(!server.freeze_timer_armed());
    }

    #[test]
    fn test_refreeze_restarts_timer_without_stale_release() {
        let config = Config::default();
        let mut server = AuthoritativeCharacter::new(&config, Vec3::ZERO);

        server.set_frozen(true);
        for _ in 0..120 {
            server.advance(DT);
        }
        assert!(server.set_frozen(false).is_some());
        assert!(server.set_frozen(true).is_some());

        // The first freeze would have expired here.
        for _ in 0..90 {
            assert!(server.advance(DT).is_empty());
        }
        assert!(server.state().freeze.is_frozen);
    }

    #[test]
    fn test_unfreeze_twice_is_a_noop() {
        let config = Config::default();
        let mut server = AuthoritativeCharacter::new(&config, Vec3::ZERO);
        assert!(server.set_frozen(false).is_none());
        server.set_frozen(true);
        assert!(server.set_frozen(false).is_some());
        assert!(server.set_frozen(false).is_none());
    }

    #[test]
    fn test_launch_requires_wall_and_speed_limit() {
        let config = Config::default();
        let combat = CombatSnapshot::default();

        let open = Arena::open_floor(0.0, 0.35);
        let mut server = AuthoritativeCharacter::new(&config, Vec3::ZERO);
        let err = server
            .handle_command(
                AuthoritativeCommand::LaunchCharacter(Vec3::new(0.0, -8.0, 0.0)),
                MovementEnv::new(&open, &combat),
            )
            .unwrap_err();
        assert_eq!(err, CommandRejected::NoWallForLaunch);

        let walled = wall_arena();
        let env = MovementEnv::new(&walled, &combat);
        let err = server
            .handle_command(
                AuthoritativeCommand::LaunchCharacter(Vec3::new(0.0, -50.0, 0.0)),
                env,
            )
            .unwrap_err();
        assert!(matches!(err, CommandRejected::LaunchTooFast { .. }));

        server
            .handle_command(
                AuthoritativeCommand::LaunchCharacter(Vec3::new(0.0, -8.0, 0.0)),
                env,
            )
            .unwrap();
        assert_eq!(server.state().velocity, Vec3::new(0.0, -8.0, 0.0));
        assert_eq!(server.state().mode, MovementMode::Falling);
    }

    #[test]
    fn test_malformed_commands_never_reach_state() {
        let config = Config::default();
        let mut server = AuthoritativeCharacter::new(&config, Vec3::ZERO);
        let arena = Arena::open_floor(0.0, 0.35);
        let combat = CombatSnapshot::default();
        let env = MovementEnv::new(&arena, &combat);
        let before = server.state().clone();

        let bad = [
            AuthoritativeCommand::SetFrozenLookDirection(Quat::from_xyzw(0.0, 0.0, 0.0, 3.0)),
            AuthoritativeCommand::SetFrozenLookDirection(Quat::from_xyzw(f32::NAN, 0.0, 0.0, 1.0)),
            AuthoritativeCommand::SetMoveDirection(Vec3::new(2.0, 0.0, 0.0)),
            AuthoritativeCommand::LaunchCharacter(Vec3::splat(f32::INFINITY)),
        ];
        for command in bad {
            assert!(server.handle_command(command, env).is_err());
        }
        assert_eq!(server.state(), &before);
    }

    #[test]
    fn test_reliable_commands_rate_limited() {
        let mut config = Config::default();
        config.validation.max_commands_per_second = 3;
        let mut server = AuthoritativeCharacter::new(&config, Vec3::ZERO);
        let arena = Arena::open_floor(0.0, 0.35);
        let combat = CombatSnapshot::default();
        let env = MovementEnv::new(&arena, &combat);

        let look = AuthoritativeCommand::SetFrozenLookDirection(Quat::IDENTITY);
        for _ in 0..3 {
            server.handle_command(look, env).unwrap();
        }
        assert_eq!(
            server.handle_command(look, env),
            Err(CommandRejected::RateLimited { max: 3 })
        );
        // Unreliable move directions are not counted.
        assert!(
            server
                .handle_command(AuthoritativeCommand::SetMoveDirection(Vec3::Y), env)
                .is_ok()
        );

        for _ in 0..61 {
            server.advance(DT);
        }
        assert!(server.handle_command(look, env).is_ok());
    }

    #[test]
    fn test_tick_schedule_accumulates() {
        let mut schedule = ServerTickSchedule::with_tick_rate(60);
        assert_eq!(schedule.accumulate(0.01), 0);
        assert_eq!(schedule.accumulate(0.01), 1);
        assert_eq!(schedule.accumulate(0.05), 3);
        assert_eq!(schedule.total_ticks(), 4);
        assert!((schedule.tick_duration_secs() - 1.0 / 60.0).abs() < 1e-12);
    }
}
