//! Server reconciliation: corrects the client prediction when the
//! authority's state for a tick diverges from what the client predicted.
//!
//! The client finds its prediction for the corrected tick. If the two
//! disagree it adopts the authoritative state as the new base and replays
//! every move the authority has not processed yet.

use glam::Vec3;
use kinetic_config::PredictionConfig;

use crate::prediction::PredictionBuffer;
use crate::query::MovementEnv;
use crate::simulator::MovementSimulator;
use crate::state::MovementState;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Visual offsets shorter than this (m) snap to zero.
const MIN_OFFSET_MAGNITUDE: f32 = 0.001;

// ---------------------------------------------------------------------------
// CorrectionSmoothing
// ---------------------------------------------------------------------------

/// Visual smoothing for small prediction corrections.
///
/// The logical position snaps immediately to the corrected value, but the
/// rendered position is offset by `visual_offset`, which decays
/// exponentially each frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionSmoothing {
    /// Current visual offset from the logical position (m).
    pub visual_offset: Vec3,
    /// Exponential decay rate per second.
    pub decay_rate: f32,
    /// Longest offset kept for smoothing (m).
    pub max_smooth_distance: f32,
    /// Corrections longer than this snap without smoothing (m).
    pub no_smooth_distance: f32,
}

impl Default for CorrectionSmoothing {
    fn default() -> Self {
        Self::from_config(&PredictionConfig::default())
    }
}

impl CorrectionSmoothing {
    /// Smoothing parameters from the prediction config.
    pub fn from_config(config: &PredictionConfig) -> Self {
        Self {
            visual_offset: Vec3::ZERO,
            decay_rate: config.smoothing_decay_rate,
            max_smooth_distance: config.max_smooth_distance,
            no_smooth_distance: config.no_smooth_distance,
        }
    }

    /// Records a correction of `delta` (new logical position minus old).
    ///
    /// Corrections longer than `no_smooth_distance` snap. Otherwise the
    /// offset accumulates, clamped to `max_smooth_distance`.
    pub fn apply_correction(&mut self, delta: Vec3) {
        if delta.length() > self.no_smooth_distance {
            self.visual_offset = Vec3::ZERO;
            return;
        }
        self.visual_offset =
            (self.visual_offset - delta).clamp_length_max(self.max_smooth_distance);
    }

    /// Decays the visual offset over `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        self.visual_offset *= (-self.decay_rate * dt).exp();
        if self.visual_offset.length() < MIN_OFFSET_MAGNITUDE {
            self.visual_offset = Vec3::ZERO;
        }
    }

    /// Returns `true` if the visual offset is zero.
    pub fn is_zero(&self) -> bool {
        self.visual_offset == Vec3::ZERO
    }
}

// ---------------------------------------------------------------------------
// reconcile
// ---------------------------------------------------------------------------

/// Result of a reconciliation step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconciliationResult {
    /// Whether the prediction was rebased and replayed.
    pub corrected: bool,
    /// Distance between the prediction for the tick and the authority.
    pub error: f32,
    /// Change applied to the live position (new minus old).
    pub position_delta: Vec3,
    /// Number of moves replayed.
    pub replayed: usize,
}

/// Tuning for [`reconcile`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcileParams {
    /// Position tolerance for "prediction matched", m.
    pub tolerance: f32,
    /// Fuel tolerance for "prediction matched".
    pub fuel_tolerance: f32,
    /// Errors larger than this are logged as warnings.
    pub warn_distance: f32,
}

impl ReconcileParams {
    pub fn from_config(config: &PredictionConfig) -> Self {
        Self {
            tolerance: config.position_tolerance,
            fuel_tolerance: config.fuel_tolerance,
            warn_distance: config.divergence_warn_distance,
        }
    }
}

/// Reconciles the live predicted `state` against the authority's state
/// after `server_tick`.
///
/// 1. Finds the prediction for `server_tick` in the buffer.
/// 2. Discards every move up to `server_tick`.
/// 3. If the prediction matched, done.
/// 4. Otherwise rebases on `server_state` and replays the rest.
pub fn reconcile(
    sim: &MovementSimulator,
    state: &mut MovementState,
    buffer: &mut PredictionBuffer,
    server_tick: u64,
    server_state: &MovementState,
    params: ReconcileParams,
    env: MovementEnv<'_>,
) -> ReconciliationResult {
    let (needs_correction, error) = match buffer.find(server_tick) {
        Some(entry) => (
            !entry.predicted.matches(server_state, params.tolerance, params.fuel_tolerance),
            entry.predicted.position.distance(server_state.position),
        ),
        // No prediction for this tick (evicted or merged away).
        None => (true, state.position.distance(server_state.position)),
    };

    buffer.acknowledge(server_tick);

    if !needs_correction {
        return ReconciliationResult {
            corrected: false,
            error,
            position_delta: Vec3::ZERO,
            replayed: 0,
        };
    }

    if error > params.warn_distance {
        tracing::warn!(tick = server_tick, error, "large prediction divergence");
    } else {
        tracing::debug!(tick = server_tick, error, "prediction corrected");
    }

    let old_position = state.position;
    let replayed = buffer.len();
    *state = buffer.replay(sim, server_state, env);

    ReconciliationResult {
        corrected: true,
        error,
        position_delta: state.position - old_position,
        replayed,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
