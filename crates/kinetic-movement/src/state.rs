//! Per-character kinematic and ability state.
//!
//! [`MovementState`] is owned by exactly one character and mutated only by
//! the simulator (and, on the authoritative side, by validated commands).
//! Axes: `+X` forward, `+Z` up.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// World up axis.
pub const UP: Vec3 = Vec3::Z;

/// Local forward axis of an unrotated character.
pub const FORWARD: Vec3 = Vec3::X;

/// Below this, a horizontal vector is treated as zero.
pub(crate) const DIRECTION_EPSILON: f32 = 1e-6;

// ---------------------------------------------------------------------------
// MovementMode
// ---------------------------------------------------------------------------

/// The single active locomotion mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementMode {
    /// Supported by a floor; jetpack refuels.
    #[default]
    Walking,
    /// Airborne under gravity.
    Falling,
    /// Gravity suspended (wall-running).
    Flying,
    /// Movement disabled.
    None,
}

// ---------------------------------------------------------------------------
// WallSide
// ---------------------------------------------------------------------------

/// Which side of the character the wall is on while wall-running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WallSide {
    /// Wall on the right (`-1`).
    Right,
    /// Not wall-running, or the side is undetermined (`0`).
    #[default]
    None,
    /// Wall on the left (`+1`).
    Left,
}

impl WallSide {
    /// Side for a signed value: positive is left, negative is right.
    pub fn from_sign(value: f32) -> Self {
        if value > DIRECTION_EPSILON {
            Self::Left
        } else if value < -DIRECTION_EPSILON {
            Self::Right
        } else {
            Self::None
        }
    }

    /// Side of a wall with the given normal relative to a forward vector:
    /// `sign(cross(normal, forward).z)`.
    pub fn of_wall(normal: Vec3, forward: Vec3) -> Self {
        Self::from_sign(normal.cross(forward).z)
    }

    /// The `{-1, 0, +1}` encoding.
    pub fn sign(self) -> i8 {
        match self {
            Self::Right => -1,
            Self::None => 0,
            Self::Left => 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Ability sub-states
// ---------------------------------------------------------------------------

/// Jetpack slice of the movement state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JetpackState {
    /// Remaining fuel, always within `[0, max_fuel]`.
    pub fuel: f32,
    /// Thrusting this tick.
    pub active: bool,
    /// Player holds the jetpack input.
    pub wants: bool,
}

/// Wall-run slice of the movement state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WallRunState {
    /// Player holds the wall-run input.
    pub wants: bool,
    /// Currently attached to a wall.
    pub is_running: bool,
    /// Normal of the wall being run on (zero when not running).
    pub wall_normal: Vec3,
    /// Side of the wall relative to facing.
    pub side: WallSide,
    /// Seconds spent on the current wall; reset when the run ends.
    pub run_elapsed: f32,
    /// Set by the timeout wall jump; the input must be released before the
    /// character can attach again.
    pub rearm_required: bool,
}

/// Teleport slice of the movement state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeleportState {
    /// Pending teleport; set on the rising edge of the input and cleared by
    /// the tick that consumes it.
    pub wants: bool,
    /// Raw input level last tick, used for edge detection.
    pub held: bool,
}

/// Freeze slice of the movement state. Only the authority writes it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FreezeState {
    /// Character is frozen in place.
    pub is_frozen: bool,
    /// Orientation held while frozen.
    pub look_direction: Quat,
}

impl Default for WallRunState {
    fn default() -> Self {
        Self {
            wants: false,
            is_running: false,
            wall_normal: Vec3::ZERO,
            side: WallSide::None,
            run_elapsed: 0.0,
            rearm_required: false,
        }
    }
}

impl Default for FreezeState {
    fn default() -> Self {
        Self {
            is_frozen: false,
            look_direction: Quat::IDENTITY,
        }
    }
}

// ---------------------------------------------------------------------------
// MovementState
// ---------------------------------------------------------------------------

/// Authoritative kinematic and ability state of one character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementState {
    /// World position of the character origin.
    pub position: Vec3,
    /// Velocity in m/s.
    pub velocity: Vec3,
    /// Last sampled input direction (length ≤ 1).
    pub move_direction: Vec3,
    /// Facing rotation.
    pub facing: Quat,
    /// Active locomotion mode.
    pub mode: MovementMode,
    /// Jetpack sub-state.
    pub jetpack: JetpackState,
    /// Wall-run sub-state.
    pub wall_run: WallRunState,
    /// Teleport sub-state.
    pub teleport: TeleportState,
    /// Freeze sub-state.
    pub freeze: FreezeState,
}

impl MovementState {
    /// A walking character at `position` with a full tank.
    pub fn new(position: Vec3, max_fuel: f32) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            move_direction: Vec3::ZERO,
            facing: Quat::IDENTITY,
            mode: MovementMode::Walking,
            jetpack: JetpackState {
                fuel: max_fuel.max(0.0),
                active: false,
                wants: false,
            },
            wall_run: WallRunState::default(),
            teleport: TeleportState::default(),
            freeze: FreezeState::default(),
        }
    }

    /// Facing projected onto the ground plane. Falls back to `+X` when the
    /// character looks straight up or down.
    pub fn forward(&self) -> Vec3 {
        horizontal_forward(self.facing)
    }

    /// Horizontal component of the velocity.
    pub fn horizontal_velocity(&self) -> Vec3 {
        horizontal(self.velocity)
    }

    /// Horizontal speed in m/s.
    pub fn horizontal_speed(&self) -> f32 {
        self.horizontal_velocity().length()
    }

    /// Returns `true` while supported by a floor.
    pub fn is_grounded(&self) -> bool {
        self.mode == MovementMode::Walking
    }
}

/// Drops the vertical component.
pub fn horizontal(v: Vec3) -> Vec3 {
    Vec3::new(v.x, v.y, 0.0)
}

/// Horizontal unit forward vector of a rotation.
pub fn horizontal_forward(rotation: Quat) -> Vec3 {
    let flat = horizontal(rotation * FORWARD);
    if flat.length_squared() > DIRECTION_EPSILON {
        flat.normalize()
    } else {
        FORWARD
    }
}

/// Bit-for-bit equality of two vectors (distinguishes `0.0` from `-0.0`).
pub fn vec3_bits_eq(a: Vec3, b: Vec3) -> bool {
    a.to_array()
        .iter()
        .zip(b.to_array().iter())
        .all(|(x, y)| x.to_bits() == y.to_bits())
}

/// Bit-for-bit equality of two rotations.
pub fn quat_bits_eq(a: Quat, b: Quat) -> bool {
    a.to_array()
        .iter()
        .zip(b.to_array().iter())
        .all(|(x, y)| x.to_bits() == y.to_bits())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_walking_with_full_tank() {
        let state = MovementState::new(Vec3::new(1.0, 2.0, 3.0), 100.0);
        assert_eq!(state.mode, MovementMode::Walking);
        assert_eq!(state.jetpack.fuel, 100.0);
        assert_eq!(state.wall_run.side, WallSide::None);
        assert!(!state.freeze.is_frozen);
        assert!(state.is_grounded());
    }

    #[test]
    fn test_forward_ignores_pitch() {
        let mut state = MovementState::new(Vec3::ZERO, 0.0);
        state.facing = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2)
            * Quat::from_rotation_y(-0.5);
        let forward = state.forward();
        assert!(forward.z.abs() < 1e-6);
        assert!((forward - Vec3::Y).length() < 1e-5, "forward = {forward}");
    }

    #[test]
    fn test_forward_falls_back_when_looking_straight_up() {
        let rotation = Quat::from_rotation_y(-std::f32::consts::FRAC_PI_2);
        assert_eq!(horizontal_forward(rotation), FORWARD);
    }

    #[test]
    fn test_wall_side_sign() {
        // Wall on the left (+Y) has a normal pointing -Y.
        assert_eq!(WallSide::of_wall(Vec3::NEG_Y, Vec3::X), WallSide::Left);
        assert_eq!(WallSide::of_wall(Vec3::Y, Vec3::X), WallSide::Right);
        // Running straight into the wall leaves the side undetermined.
        assert_eq!(WallSide::of_wall(Vec3::NEG_X, Vec3::X), WallSide::None);
        assert_eq!(WallSide::Left.sign(), 1);
        assert_eq!(WallSide::Right.sign(), -1);
    }

    #[test]
    fn test_bit_equality_distinguishes_signed_zero() {
        assert!(vec3_bits_eq(Vec3::ONE, Vec3::ONE));
        assert!(!vec3_bits_eq(Vec3::ZERO, Vec3::new(-0.0, 0.0, 0.0)));
        assert!(quat_bits_eq(Quat::IDENTITY, Quat::IDENTITY));
    }
}
