//! Client-predicted, server-authoritative character movement.
//!
//! A deterministic per-tick [`MovementSimulator`] advances a
//! [`MovementState`] from player intent. The predicting client records
//! every tick as a [`MoveRecord`] in a [`PredictionBuffer`], sends the
//! moves to the authority, and replays the unacknowledged suffix when an
//! [`AuthoritativeCharacter`] corrects it. Teleport, jetpack, wall run and
//! freeze are layered on as [`Ability`] controllers.

pub mod abilities;
pub mod authority;
pub mod client;
pub mod flags;
pub mod input;
pub mod prediction;
pub mod query;
pub mod reconciliation;
pub mod record;
pub mod simulator;
pub mod state;
pub mod timer;
pub mod wire;


pub use abilities::{
    Ability, FreezeController, JetpackController, MovementEvent, StepContext, TeleportController,
    WallRunController, side_lean_angle,
};
pub use authority::{
    AuthoritativeCharacter, AuthoritativeCommand, CommandRejected, CommandValidator,
    MoveBatchOutcome, ServerTickSchedule,
};
pub use client::{ClientTick, PredictedCharacter};
pub use flags::AbilityFlags;
pub use input::{MoveInput, WallJumpRequest};
pub use prediction::{PredictedKinematics, PredictedMove, PredictionBuffer, PushOutcome};
pub use query::{Arena, CombatSnapshot, CombatState, MovementEnv, Plane, SpatialQuery, SurfaceHit};
pub use reconciliation::{CorrectionSmoothing, ReconcileParams, ReconciliationResult, reconcile};
pub use record::{MoveRecord, replay};
pub use simulator::MovementSimulator;
pub use state::{MovementMode, MovementState, WallSide};
pub use timer::{FiredTimer, TimerHandle, TimerId, TimerQueue, TimerService, TimerSlot};
pub use wire::{
    PROTOCOL_VERSION, Reliability, ReplicatedField, ServerMessage, WireError, WireMove,
    decode_command, decode_moves, decode_server_message, encode_command, encode_moves,
    encode_server_message,
};
