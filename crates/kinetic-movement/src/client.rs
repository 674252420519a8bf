//! The predicting side of one locally controlled character.
//!
//! [`PredictedCharacter`] turns input-layer calls into per-tick intent,
//! simulates every tick immediately, buffers the moves until the authority
//! acknowledges them, and reconciles when the authority disagrees. Freeze
//! is never predicted: it is requested with commands and mirrored when the
//! authority replicates it.

use glam::{Quat, Vec3};
use kinetic_config::Config;

use crate::abilities::MovementEvent;
use crate::authority::AuthoritativeCommand;
use crate::input::{MoveInput, WallJumpRequest};
use crate::prediction::{PredictionBuffer, PushOutcome};
use crate::query::MovementEnv;
use crate::reconciliation::{
    CorrectionSmoothing, ReconcileParams, ReconciliationResult, reconcile,
};
use crate::record::MoveRecord;
use crate::simulator::MovementSimulator;
use crate::state::{MovementState, vec3_bits_eq};
use crate::wire::{MAX_MOVES_PER_PACKET, ServerMessage, WireMove};

/// Everything one client tick produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientTick {
    /// Tick number just simulated.
    pub tick: u64,
    /// Events from the predicted move, plus any from replicated freezes.
    pub events: Vec<MovementEvent>,
    /// Unacknowledged moves to send, on send ticks only.
    pub moves: Option<Vec<WireMove>>,
    /// Commands to send, in order.
    pub commands: Vec<AuthoritativeCommand>,
    /// Whether the move was merged into the previous one.
    pub combined: bool,
}

/// Client-side predicted character.
pub struct PredictedCharacter {
    sim: MovementSimulator,
    state: MovementState,
    buffer: PredictionBuffer,
    smoothing: CorrectionSmoothing,
    params: ReconcileParams,
    intent: MoveInput,
    pending_commands: Vec<AuthoritativeCommand>,
    pending_events: Vec<MovementEvent>,
    forwarded_direction: Option<Vec3>,
    send_interval_ticks: u32,
    ticks_since_send: u32,
    tick: u64,
    last_acked_tick: Option<u64>,
    corrections: u64,
}

impl PredictedCharacter {
    /// Spawns a walking character at `position`.
    pub fn new(config: &Config, position: Vec3) -> Self {
        let sim = MovementSimulator::new(config);
        let state = sim.spawn(position);
        Self {
            sim,
            state,
            buffer: PredictionBuffer::from_config(&config.prediction),
            smoothing: CorrectionSmoothing::from_config(&config.prediction),
            params: ReconcileParams::from_config(&config.prediction),
            intent: MoveInput::default(),
            pending_commands: Vec::new(),
            pending_events: Vec::new(),
            forwarded_direction: None,
            send_interval_ticks: config.prediction.send_interval_ticks.max(1),
            ticks_since_send: 0,
            tick: 0,
            last_acked_tick: None,
            corrections: 0,
        }
    }

    pub fn state(&self) -> &MovementState {
        &self.state
    }

    pub fn buffer(&self) -> &PredictionBuffer {
        &self.buffer
    }

    pub fn smoothing(&self) -> &CorrectionSmoothing {
        &self.smoothing
    }

    /// Last simulated tick.
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Corrections applied so far.
    pub fn corrections(&self) -> u64 {
        self.corrections
    }

    /// Position to draw: the logical position plus the smoothing offset.
    pub fn render_position(&self) -> Vec3 {
        self.state.position + self.smoothing.visual_offset
    }

    // -- input layer -------------------------------------------------------

    /// Teleport on the next tick.
    pub fn on_teleport_requested(&mut self) {
        self.intent.wants_teleport = true;
    }

    pub fn on_jetpack_toggled(&mut self, active: bool) {
        self.intent.wants_jetpack = active;
    }

    pub fn on_wall_run_toggled(&mut self, active: bool) {
        self.intent.wants_wall_run = active;
    }

    /// Wall jump on the next tick, along `direction` or, if `None`, away
    /// from the wall.
    pub fn on_wall_jump_requested(&mut self, direction: Option<Vec3>) {
        self.intent.wall_jump = Some(match direction {
            Some(direction) => WallJumpRequest::Direction(direction),
            None => WallJumpRequest::AlongWallNormal,
        });
    }

    /// Asks the authority to freeze or release the character. A freeze
    /// request sends the current facing first so the held orientation is
    /// in place when the freeze lands.
    pub fn on_freeze_requested(&mut self, frozen: bool) {
        if frozen {
            self.pending_commands
                .push(AuthoritativeCommand::SetFrozenLookDirection(self.state.facing));
        }
        self.pending_commands
            .push(AuthoritativeCommand::SetFrozen(frozen));
    }

    /// Asks the authority for a wall launch with `velocity`. Not predicted.
    pub fn on_launch_requested(&mut self, velocity: Vec3) {
        self.pending_commands
            .push(AuthoritativeCommand::LaunchCharacter(velocity));
    }

    pub fn set_move_direction(&mut self, direction: Vec3) {
        self.intent.move_direction = direction;
    }

    pub fn set_facing(&mut self, facing: Quat) {
        self.intent.facing = facing;
    }

    // -- simulation --------------------------------------------------------

    /// Predicts one tick of `dt` seconds.
    pub fn tick(&mut self, dt: f32, env: MovementEnv<'_>) -> ClientTick {
        self.tick += 1;
        let record = MoveRecord::capture(&self.sim, &self.state, &self.intent, self.tick, dt);
        let move_direction = record.move_direction;
        let (outcome, events) = self
            .buffer
            .record_move(&self.sim, &mut self.state, record, env);

        // One-shot intents last a single tick.
        self.intent.wants_teleport = false;
        self.intent.wall_jump = None;
        self.smoothing.update(dt);

        if self
            .forwarded_direction
            .is_none_or(|sent| !vec3_bits_eq(sent, move_direction))
        {
            self.forwarded_direction = Some(move_direction);
            self.pending_commands
                .push(AuthoritativeCommand::SetMoveDirection(move_direction));
        }

        self.ticks_since_send += 1;
        let moves = (self.ticks_since_send >= self.send_interval_ticks).then(|| {
            self.ticks_since_send = 0;
            self.buffer.flush();
            self.buffer
                .entries()
                .iter()
                .take(MAX_MOVES_PER_PACKET)
                .map(|entry| WireMove::from_record(&entry.record, entry.predicted.position))
                .collect::<Vec<_>>()
        });

        let mut all_events = std::mem::take(&mut self.pending_events);
        all_events.extend(events);
        ClientTick {
            tick: self.tick,
            events: all_events,
            moves,
            commands: std::mem::take(&mut self.pending_commands),
            combined: outcome == PushOutcome::Combined,
        }
    }

    /// Handles a message from the authority. Returns the reconciliation
    /// result for corrections.
    pub fn receive(
        &mut self,
        message: &ServerMessage,
        env: MovementEnv<'_>,
    ) -> Option<ReconciliationResult> {
        match message {
            ServerMessage::Ack { tick } => {
                if self.is_stale(*tick) {
                    return None;
                }
                self.last_acked_tick = Some(*tick);
                self.buffer.acknowledge(*tick);
                None
            }
            ServerMessage::Correction { tick, state } => {
                if self.is_stale(*tick) {
                    tracing::trace!(tick, "stale correction ignored");
                    return None;
                }
                self.last_acked_tick = Some(*tick);
                let result = reconcile(
                    &self.sim,
                    &mut self.state,
                    &mut self.buffer,
                    *tick,
                    state,
                    self.params,
                    env,
                );
                if result.corrected {
                    self.corrections += 1;
                    self.smoothing.apply_correction(result.position_delta);
                }
                Some(result)
            }
            ServerMessage::FreezeReplicated {
                is_frozen,
                look_direction,
            } => {
                let freeze = self.sim.freeze();
                freeze.set_look_direction(&mut self.state, *look_direction);
                if *is_frozen {
                    freeze.freeze(&mut self.state, &mut self.pending_events);
                } else {
                    freeze.unfreeze(&mut self.state, &mut self.pending_events);
                }
                None
            }
        }
    }

    fn is_stale(&self, tick: u64) -> bool {
        self.last_acked_tick.is_some_and(|acked| tick <= acked)
    }
}
