//! Ability controllers layered onto the movement simulator.
//!
//! Each controller owns one slice of [`MovementState`] and implements the
//! same capability set: capture the tick's intent, run its simulation step,
//! snapshot what a move record needs, decide whether two snapshots may be
//! merged, and restore a snapshot before replay.

use std::fmt::Debug;

use glam::Vec3;

use crate::input::MoveInput;
use crate::query::SpatialQuery;
use crate::state::{MovementState, WallSide};

pub mod freeze;
pub mod jetpack;
pub mod teleport;
pub mod wall_run;

pub use freeze::{FreezeController, FreezeSnapshot};
pub use jetpack::{JetpackController, JetpackSnapshot};
pub use teleport::{TeleportController, TeleportSnapshot};
pub use wall_run::{WallRunController, WallRunSnapshot, side_lean_angle};

/// Something observable that happened during a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MovementEvent {
    /// Teleport fired (possibly clamped short of geometry).
    Teleported {
        /// Position before the teleport.
        from: Vec3,
        /// Position after the teleport.
        to: Vec3,
    },
    /// Jetpack switched on or off.
    JetpackToggled {
        /// New activity.
        active: bool,
    },
    /// Attached to a wall.
    WallRunStarted {
        /// Side of the wall.
        side: WallSide,
    },
    /// Detached from the wall.
    WallRunStopped,
    /// Wall side changed (entry or flip); presentation re-leans the camera.
    WallSideChanged {
        /// New side.
        side: WallSide,
    },
    /// Launched off a wall.
    WallJumped {
        /// Velocity added by the launch.
        launch: Vec3,
        /// `true` when triggered by the run timeout rather than the player.
        automatic: bool,
    },
    /// Touched down on a floor.
    Landed,
    /// Frozen by the authority.
    Frozen,
    /// Released from a freeze.
    Unfrozen,
}

/// Everything an ability step may touch besides the state itself.
pub struct StepContext<'a> {
    /// Tick length in seconds.
    pub dt: f32,
    /// World collision queries.
    pub spatial: &'a dyn SpatialQuery,
    /// Events emitted this tick.
    pub events: &'a mut Vec<MovementEvent>,
}

impl StepContext<'_> {
    /// Records an event.
    pub fn emit(&mut self, event: MovementEvent) {
        self.events.push(event);
    }
}

/// Common capability set of the ability controllers.
pub trait Ability {
    /// The slice of state a move record carries for this ability.
    type Snapshot: Copy + PartialEq + Debug;

    /// Copies this tick's intent from `input` into the state.
    fn capture_intent(&self, state: &mut MovementState, input: &MoveInput);

    /// Runs this ability's part of the tick.
    fn simulate_step(&self, state: &mut MovementState, ctx: &mut StepContext<'_>);

    /// Captures the fields a move record needs.
    fn snapshot(&self, state: &MovementState) -> Self::Snapshot;

    /// Returns `true` if two consecutive snapshots are bit-for-bit equal in
    /// every field that affects this ability.
    fn combinable_with(&self, a: &Self::Snapshot, b: &Self::Snapshot) -> bool;

    /// Writes a recorded snapshot back onto the state before replay.
    fn restore(&self, state: &mut MovementState, snapshot: &Self::Snapshot);
}
