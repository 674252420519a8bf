//! Teleport: an edge-triggered forward blink.

use kinetic_config::TeleportConfig;

use super::{Ability, MovementEvent, StepContext};
use crate::input::MoveInput;
use crate::state::MovementState;

/// Recorded teleport intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TeleportSnapshot {
    /// Rising edge: the teleport fires on this move.
    pub wants: bool,
    /// Raw input level.
    pub held: bool,
}

/// Blinks the character forward by a fixed distance, clamped by geometry.
#[derive(Debug, Clone)]
pub struct TeleportController {
    config: TeleportConfig,
}

impl TeleportController {
    pub fn new(config: TeleportConfig) -> Self {
        Self { config }
    }
}

impl Ability for TeleportController {
    type Snapshot = TeleportSnapshot;

    fn capture_intent(&self, state: &mut MovementState, input: &MoveInput) {
        state.teleport.wants = input.wants_teleport && !state.teleport.held;
        state.teleport.held = input.wants_teleport;
    }

    fn simulate_step(&self, state: &mut MovementState, ctx: &mut StepContext<'_>) {
        if !state.teleport.wants {
            return;
        }
        state.teleport.wants = false;
        if !self.config.enabled {
            tracing::trace!("teleport denied: disabled");
            return;
        }

        let from = state.position;
        let to = ctx.spatial.find_unobstructed_point_towards(
            from,
            state.forward(),
            self.config.distance,
        );
        state.position = to;
        tracing::debug!(?from, ?to, "teleported");
        ctx.emit(MovementEvent::Teleported { from, to });
    }

    fn snapshot(&self, state: &MovementState) -> TeleportSnapshot {
        TeleportSnapshot {
            wants: state.teleport.wants,
            held: state.teleport.held,
        }
    }

    fn combinable_with(&self, a: &TeleportSnapshot, b: &TeleportSnapshot) -> bool {
        a == b
    }

    fn restore(&self, state: &mut MovementState, snapshot: &TeleportSnapshot) {
        state.teleport.wants = snapshot.wants;
        state.teleport.held = snapshot.held;
    }
}
