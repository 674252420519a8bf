//! Per-tick player intent.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// How a wall jump picks its launch direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WallJumpRequest {
    /// Launch along the last detected wall normal.
    AlongWallNormal,
    /// Launch along an explicit direction (normalized by the simulator).
    Direction(Vec3),
}

/// Intent sampled once per tick from the controller layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveInput {
    /// Desired movement direction; lengths above 1 are clamped.
    pub move_direction: Vec3,
    /// Desired facing.
    pub facing: Quat,
    /// Teleport input level.
    pub wants_teleport: bool,
    /// Jetpack input level.
    pub wants_jetpack: bool,
    /// Wall-run input level.
    pub wants_wall_run: bool,
    /// Explicit wall jump this tick.
    pub wall_jump: Option<WallJumpRequest>,
    /// Freeze on/off request. The simulator never applies this; it is
    /// forwarded to the authority as a reliable command.
    pub freeze_request: Option<bool>,
}

impl Default for MoveInput {
    fn default() -> Self {
        Self {
            move_direction: Vec3::ZERO,
            facing: Quat::IDENTITY,
            wants_teleport: false,
            wants_jetpack: false,
            wants_wall_run: false,
            wall_jump: None,
            freeze_request: None,
        }
    }
}

impl MoveInput {
    /// Input that only walks in `direction`.
    pub fn walking(direction: Vec3) -> Self {
        Self {
            move_direction: direction,
            ..Default::default()
        }
    }
}
