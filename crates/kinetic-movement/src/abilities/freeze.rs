//! Freeze: an authority-imposed stop.
//!
//! Only the authoritative side calls [`FreezeController::freeze`] and
//! [`FreezeController::unfreeze`]; the predicting side receives the result
//! as replicated state. While frozen the simulator runs nothing but
//! [`Ability::simulate_step`] of this controller.

use glam::{Quat, Vec3};
use kinetic_config::FreezeConfig;

use super::{Ability, MovementEvent, StepContext};
use crate::input::MoveInput;
use crate::state::{MovementMode, MovementState, WallSide, quat_bits_eq};

/// Recorded freeze status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreezeSnapshot {
    /// Frozen at capture time.
    pub is_frozen: bool,
    /// Held orientation.
    pub look_direction: Quat,
}

#[derive(Debug, Clone)]
pub struct FreezeController {
    config: FreezeConfig,
}

impl FreezeController {
    pub fn new(config: FreezeConfig) -> Self {
        Self { config }
    }

    /// How long a freeze lasts before it expires on its own.
    pub fn frozen_time(&self) -> f32 {
        self.config.frozen_time
    }

    /// Freezes the character in place. Cancels thrust and any wall run.
    /// Returns `false` if it was already frozen.
    pub fn freeze(&self, state: &mut MovementState, events: &mut Vec<MovementEvent>) -> bool {
        if state.freeze.is_frozen {
            return false;
        }
        state.freeze.is_frozen = true;
        state.velocity = Vec3::ZERO;
        state.jetpack.active = false;
        state.wall_run.is_running = false;
        state.wall_run.wall_normal = Vec3::ZERO;
        state.wall_run.side = WallSide::None;
        state.wall_run.run_elapsed = 0.0;
        tracing::debug!(position = ?state.position, "frozen");
        events.push(MovementEvent::Frozen);
        true
    }

    /// Releases a freeze and resumes walking. Returns `false` if the
    /// character was not frozen.
    pub fn unfreeze(&self, state: &mut MovementState, events: &mut Vec<MovementEvent>) -> bool {
        if !state.freeze.is_frozen {
            return false;
        }
        state.freeze.is_frozen = false;
        state.mode = MovementMode::Walking;
        tracing::debug!(position = ?state.position, "unfrozen");
        events.push(MovementEvent::Unfrozen);
        true
    }

    /// Sets the orientation held while frozen.
    pub fn set_look_direction(&self, state: &mut MovementState, look: Quat) {
        state.freeze.look_direction = look.normalize();
    }
}

impl Ability for FreezeController {
    type Snapshot = FreezeSnapshot;

    /// Freeze requests go to the authority as commands; nothing is
    /// captured locally.
    fn capture_intent(&self, _state: &mut MovementState, _input: &MoveInput) {}

    fn simulate_step(&self, state: &mut MovementState, _ctx: &mut StepContext<'_>) {
        if state.freeze.is_frozen {
            state.velocity = Vec3::ZERO;
            state.facing = state.freeze.look_direction;
        }
    }

    fn snapshot(&self, state: &MovementState) -> FreezeSnapshot {
        FreezeSnapshot {
            is_frozen: state.freeze.is_frozen,
            look_direction: state.freeze.look_direction,
        }
    }

    fn combinable_with(&self, a: &FreezeSnapshot, b: &FreezeSnapshot) -> bool {
        a.is_frozen == b.is_frozen && quat_bits_eq(a.look_direction, b.look_direction)
    }

    /// Freeze is authority-owned and never restored from a client record.
    fn restore(&self, _state: &mut MovementState, _snapshot: &FreezeSnapshot) {}
}
