//! Move records: one tick's captured intent, ready to send, merge or replay.

use glam::{Quat, Vec3};

use crate::abilities::{Ability, FreezeSnapshot, JetpackSnapshot, TeleportSnapshot, WallRunSnapshot};
use crate::flags::AbilityFlags;
use crate::input::{MoveInput, WallJumpRequest};
use crate::query::MovementEnv;
use crate::simulator::MovementSimulator;
use crate::state::{MovementState, quat_bits_eq, vec3_bits_eq};

/// Immutable snapshot of one simulated tick (or several merged quiescent
/// ticks).
#[derive(Debug, Clone, PartialEq)]
pub struct MoveRecord {
    /// First tick covered by this record.
    pub first_tick: u64,
    /// Last tick covered by this record; the key acknowledgements refer to.
    pub tick: u64,
    /// Seconds simulated by this record.
    pub delta_time: f32,
    /// Captured move direction (length ≤ 1).
    pub move_direction: Vec3,
    /// Captured facing.
    pub facing: Quat,
    /// Explicit wall jump requested on this move.
    pub wall_jump: Option<WallJumpRequest>,
    /// Teleport intent.
    pub teleport: TeleportSnapshot,
    /// Jetpack intent and fuel.
    pub jetpack: JetpackSnapshot,
    /// Wall-run intent and status.
    pub wall_run: WallRunSnapshot,
    /// Freeze status.
    pub freeze: FreezeSnapshot,
}

impl MoveRecord {
    /// Captures the intent `input` would apply to `state` at `tick`. The
    /// state itself is left untouched; a frozen state captures no intent.
    pub fn capture(
        sim: &MovementSimulator,
        state: &MovementState,
        input: &MoveInput,
        tick: u64,
        delta_time: f32,
    ) -> Self {
        let mut probe = state.clone();
        let frozen = probe.freeze.is_frozen;
        if !frozen {
            sim.capture_intents(&mut probe, input);
        }
        Self {
            first_tick: tick,
            tick,
            delta_time,
            move_direction: probe.move_direction,
            facing: probe.facing,
            wall_jump: if frozen { None } else { input.wall_jump },
            teleport: sim.teleport().snapshot(&probe),
            jetpack: sim.jetpack().snapshot(&probe),
            wall_run: sim.wall_run().snapshot(&probe),
            freeze: sim.freeze().snapshot(&probe),
        }
    }

    /// The wire flags byte content for this record.
    pub fn flags(&self) -> AbilityFlags {
        AbilityFlags {
            wants_teleport: self.teleport.wants,
            wants_jetpack: self.jetpack.wants,
            wants_wall_run: self.wall_run.wants,
        }
    }

    /// Live input equivalent to this record.
    pub fn to_input(&self) -> MoveInput {
        MoveInput {
            move_direction: self.move_direction,
            facing: self.facing,
            wants_teleport: self.teleport.held,
            wants_jetpack: self.jetpack.wants,
            wants_wall_run: self.wall_run.wants,
            wall_jump: self.wall_jump,
            freeze_request: None,
        }
    }

    /// Returns `true` if `next` may be merged into this record.
    ///
    /// Every ability snapshot must be bit-for-bit equal, along with the move
    /// direction and facing. Records carrying a teleport edge or a wall jump
    /// never merge, the ticks must be adjacent, and the merged duration may
    /// not exceed `max_combined_delta`.
    pub fn can_combine(
        &self,
        next: &MoveRecord,
        sim: &MovementSimulator,
        max_combined_delta: f32,
    ) -> bool {
        next.first_tick == self.tick + 1
            && self.delta_time + next.delta_time <= max_combined_delta
            && !self.teleport.wants
            && self.wall_jump.is_none()
            && next.wall_jump.is_none()
            && vec3_bits_eq(self.move_direction, next.move_direction)
            && quat_bits_eq(self.facing, next.facing)
            && sim.teleport().combinable_with(&self.teleport, &next.teleport)
            && sim.jetpack().combinable_with(&self.jetpack, &next.jetpack)
            && sim.wall_run().combinable_with(&self.wall_run, &next.wall_run)
            && sim.freeze().combinable_with(&self.freeze, &next.freeze)
    }

    /// Absorbs `next`: the merged record spans both ticks and both deltas.
    pub fn combine(&mut self, next: &MoveRecord) {
        self.tick = next.tick;
        self.delta_time += next.delta_time;
    }

    /// Re-reads the simulated fields (fuel, wall-run status, freeze) from
    /// a new `start` state. Intent is left as captured.
    pub fn rebase(&mut self, sim: &MovementSimulator, start: &MovementState) {
        self.jetpack.fuel = start.jetpack.fuel;
        self.wall_run.is_running = start.wall_run.is_running;
        self.freeze = sim.freeze().snapshot(start);
    }
}

/// Re-simulates `records` in order starting from `base`.
pub fn replay(
    sim: &MovementSimulator,
    base: &MovementState,
    records: &[MoveRecord],
    env: MovementEnv<'_>,
) -> MovementState {
    let mut state = base.clone();
    for record in records {
        sim.apply_record(&mut state, record, env);
    }
    state
}
