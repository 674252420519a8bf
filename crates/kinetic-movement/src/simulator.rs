//! The deterministic per-tick movement update.
//!
//! [`MovementSimulator::simulate`] runs the same fixed sequence on the
//! predicting client and on the authority:
//!
//! 1. freeze check (a frozen character only holds still)
//! 2. intent capture
//! 3. teleport
//! 4. jetpack
//! 5. wall-run entry/exit
//! 6. explicit wall jump
//! 7. gravity
//! 8. steering and speed cap, then integration and floor contact
//!
//! Nothing here returns an error. Denied abilities simply leave the state
//! unchanged for that tick.

use glam::{Quat, Vec3};
use kinetic_config::{Config, SimulationConfig};

use crate::abilities::{
    Ability, FreezeController, JetpackController, MovementEvent, StepContext, TeleportController,
    WallRunController,
};
use crate::input::{MoveInput, WallJumpRequest};
use crate::query::{CombatState, MovementEnv, SpatialQuery};
use crate::record::MoveRecord;
use crate::state::{DIRECTION_EPSILON, MovementMode, MovementState, horizontal};

/// A walking character this far above the floor starts falling.
const FLOOR_SNAP_DISTANCE: f32 = 0.05;

/// Tolerance on squared lengths treated as unit length.
const UNIT_LENGTH_SLACK: f32 = 1e-5;

/// Character movement rules plus the four ability controllers.
#[derive(Debug, Clone)]
pub struct MovementSimulator {
    simulation: SimulationConfig,
    teleport: TeleportController,
    jetpack: JetpackController,
    wall_run: WallRunController,
    freeze: FreezeController,
}

impl MovementSimulator {
    /// Builds a simulator from the movement sections of `config`.
    pub fn new(config: &Config) -> Self {
        Self {
            simulation: config.simulation.clone(),
            teleport: TeleportController::new(config.teleport.clone()),
            jetpack: JetpackController::new(config.jetpack.clone()),
            wall_run: WallRunController::new(config.wall_run.clone(), config.wall_jump.clone()),
            freeze: FreezeController::new(config.freeze.clone()),
        }
    }

    /// A walking character at `position` with a full tank.
    pub fn spawn(&self, position: Vec3) -> MovementState {
        MovementState::new(position, self.jetpack.max_fuel())
    }

    pub fn teleport(&self) -> &TeleportController {
        &self.teleport
    }

    pub fn jetpack(&self) -> &JetpackController {
        &self.jetpack
    }

    pub fn wall_run(&self) -> &WallRunController {
        &self.wall_run
    }

    pub fn freeze(&self) -> &FreezeController {
        &self.freeze
    }

    /// Speed cap after the combat layer's targeting and running modifiers.
    pub fn max_speed(&self, combat: &dyn CombatState) -> f32 {
        let mut speed = self.simulation.max_walk_speed;
        if combat.is_targeting() {
            speed *= combat.targeting_speed_modifier();
        }
        if combat.is_running() {
            speed *= combat.running_speed_modifier();
        }
        speed.max(0.0)
    }

    /// Acceleration cap for the current mode, raised while thrusting.
    pub fn max_acceleration(&self, state: &MovementState) -> f32 {
        let mut accel =
            self.simulation.max_acceleration * self.jetpack.acceleration_multiplier(state);
        if state.mode == MovementMode::Falling {
            accel *= self.simulation.air_control;
        }
        accel
    }

    /// Copies this tick's intent into the state (step 2). The move
    /// direction is clamped to unit length and non-finite values are
    /// dropped.
    pub fn capture_intents(&self, state: &mut MovementState, input: &MoveInput) {
        state.move_direction = sanitize_direction(input.move_direction);
        state.facing = sanitize_rotation(input.facing, state.facing);
        self.teleport.capture_intent(state, input);
        self.jetpack.capture_intent(state, input);
        self.wall_run.capture_intent(state, input);
        self.freeze.capture_intent(state, input);
    }

    /// Advances `state` by one tick of live input.
    pub fn simulate(
        &self,
        state: &mut MovementState,
        input: &MoveInput,
        dt: f32,
        env: MovementEnv<'_>,
    ) -> Vec<MovementEvent> {
        let mut events = Vec::new();
        let dt = sanitize_dt(dt);
        if state.freeze.is_frozen {
            self.hold_frozen(state, dt, env.spatial, &mut events);
            return events;
        }
        self.capture_intents(state, input);
        self.run_steps(state, input.wall_jump, dt, env, &mut events);
        events
    }

    /// Advances `state` by one recorded move: the record's intent is
    /// restored instead of captured, then the same steps run.
    pub fn apply_record(
        &self,
        state: &mut MovementState,
        record: &MoveRecord,
        env: MovementEnv<'_>,
    ) -> Vec<MovementEvent> {
        let mut events = Vec::new();
        let dt = sanitize_dt(record.delta_time);
        if state.freeze.is_frozen {
            self.hold_frozen(state, dt, env.spatial, &mut events);
            return events;
        }
        self.restore_record(state, record);
        self.run_steps(state, record.wall_jump, dt, env, &mut events);
        events
    }

    /// Writes a record's intent back onto the state.
    pub fn restore_record(&self, state: &mut MovementState, record: &MoveRecord) {
        state.move_direction = sanitize_direction(record.move_direction);
        state.facing = sanitize_rotation(record.facing, state.facing);
        self.teleport.restore(state, &record.teleport);
        self.jetpack.restore(state, &record.jetpack);
        self.wall_run.restore(state, &record.wall_run);
        self.freeze.restore(state, &record.freeze);
    }

    fn hold_frozen(
        &self,
        state: &mut MovementState,
        dt: f32,
        spatial: &dyn SpatialQuery,
        events: &mut Vec<MovementEvent>,
    ) {
        let mut ctx = StepContext {
            dt,
            spatial,
            events,
        };
        self.freeze.simulate_step(state, &mut ctx);
    }

    fn run_steps(
        &self,
        state: &mut MovementState,
        wall_jump: Option<WallJumpRequest>,
        dt: f32,
        env: MovementEnv<'_>,
        events: &mut Vec<MovementEvent>,
    ) {
        let mut ctx = StepContext {
            dt,
            spatial: env.spatial,
            events,
        };

        self.teleport.simulate_step(state, &mut ctx);
        self.jetpack.simulate_step(state, &mut ctx);
        self.wall_run.simulate_step(state, &mut ctx);
        if let Some(request) = wall_jump {
            self.wall_run.wall_jump(state, request, &mut ctx);
        }

        self.apply_gravity(state, dt);
        self.steer(state, dt, env.combat);
        self.integrate(state, dt, &mut ctx);
    }

    fn apply_gravity(&self, state: &mut MovementState, dt: f32) {
        if state.mode == MovementMode::Falling {
            let gravity = self.simulation.gravity_z * self.jetpack.gravity_multiplier(state);
            state.velocity.z += gravity * dt;
        }
    }

    /// Horizontal acceleration towards the input direction, then the speed
    /// cap. Vertical velocity is never capped.
    fn steer(&self, state: &mut MovementState, dt: f32, combat: &dyn CombatState) {
        if state.mode == MovementMode::None {
            return;
        }
        let max_speed = self.max_speed(combat);
        let wish = horizontal(state.move_direction);
        let before = state.horizontal_velocity();

        let mut steered = if wish.length_squared() > DIRECTION_EPSILON {
            move_towards(before, wish * max_speed, self.max_acceleration(state) * dt)
        } else if state.mode == MovementMode::Walking {
            move_towards(before, Vec3::ZERO, self.simulation.braking_deceleration * dt)
        } else {
            before
        };

        if state.mode == MovementMode::Flying && state.wall_run.is_running {
            let normal = horizontal(state.wall_run.wall_normal).normalize_or_zero();
            steered -= normal * steered.dot(normal);
        }

        let cap = match state.mode {
            MovementMode::Falling => max_speed.max(before.length()),
            _ => max_speed,
        };
        let steered = steered.clamp_length_max(cap);
        state.velocity.x = steered.x;
        state.velocity.y = steered.y;
    }

    fn integrate(&self, state: &mut MovementState, dt: f32, ctx: &mut StepContext<'_>) {
        if state.mode == MovementMode::None {
            return;
        }
        state.position += state.velocity * dt;
        let floor = ctx.spatial.floor_height(state.position);

        match state.mode {
            MovementMode::Falling => {
                if let Some(height) = floor
                    && state.position.z <= height
                    && state.velocity.z <= 0.0
                {
                    state.position.z = height;
                    state.velocity.z = 0.0;
                    state.mode = MovementMode::Walking;
                    tracing::trace!(position = ?state.position, "landed");
                    ctx.emit(MovementEvent::Landed);
                }
            }
            MovementMode::Flying => {
                if let Some(height) = floor
                    && state.position.z < height
                {
                    state.position.z = height;
                    state.velocity.z = state.velocity.z.max(0.0);
                }
            }
            MovementMode::Walking => match floor {
                Some(height) if state.position.z <= height + FLOOR_SNAP_DISTANCE => {
                    state.position.z = height;
                    state.velocity.z = 0.0;
                }
                _ => state.mode = MovementMode::Falling,
            },
            MovementMode::None => {}
        }
    }
}

/// Moves `current` towards `target` by at most `max_delta`.
fn move_towards(current: Vec3, target: Vec3, max_delta: f32) -> Vec3 {
    let delta = target - current;
    let distance = delta.length();
    if distance <= max_delta || distance <= DIRECTION_EPSILON {
        target
    } else {
        current + delta * (max_delta / distance)
    }
}

fn sanitize_dt(dt: f32) -> f32 {
    if dt.is_finite() { dt.max(0.0) } else { 0.0 }
}

fn sanitize_direction(direction: Vec3) -> Vec3 {
    if !direction.is_finite() {
        Vec3::ZERO
    } else if direction.length_squared() > 1.0 + UNIT_LENGTH_SLACK {
        direction.normalize()
    } else {
        direction
    }
}

/// Already-normalized values pass through untouched, so restoring a
/// captured record reproduces the captured bits.
fn sanitize_rotation(rotation: Quat, fallback: Quat) -> Quat {
    if !rotation.is_finite() || rotation.length_squared() <= DIRECTION_EPSILON {
        fallback
    } else if (rotation.length_squared() - 1.0).abs() > UNIT_LENGTH_SLACK {
        rotation.normalize()
    } else {
        rotation
    }
}
