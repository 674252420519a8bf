//! Client-side prediction: immediate local application of move records.
//!
//! The client simulates each move as soon as it is captured, without
//! waiting for the authority. The [`PredictionBuffer`] keeps every move the
//! authority has not acknowledged yet, together with the state it started
//! from and the kinematics it predicted, so that reconciliation can replay
//! them on top of a corrected state.

use std::collections::VecDeque;

use glam::Vec3;
use kinetic_config::PredictionConfig;

use crate::abilities::MovementEvent;
use crate::query::MovementEnv;
use crate::record::MoveRecord;
use crate::simulator::MovementSimulator;
use crate::state::{MovementMode, MovementState};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default maximum number of buffered moves (~2 s at 60 Hz).
pub const DEFAULT_BUFFER_SIZE: usize = 128;

// ---------------------------------------------------------------------------
// PredictedKinematics
// ---------------------------------------------------------------------------

/// The part of a predicted outcome compared against the authority.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictedKinematics {
    /// Position after the move.
    pub position: Vec3,
    /// Velocity after the move.
    pub velocity: Vec3,
    /// Mode after the move.
    pub mode: MovementMode,
    /// Jetpack fuel after the move.
    pub fuel: f32,
    /// Frozen after the move.
    pub is_frozen: bool,
}

impl PredictedKinematics {
    /// Extracts the compared fields from a state.
    pub fn of(state: &MovementState) -> Self {
        Self {
            position: state.position,
            velocity: state.velocity,
            mode: state.mode,
            fuel: state.jetpack.fuel,
            is_frozen: state.freeze.is_frozen,
        }
    }

    /// Returns `true` if `authoritative` agrees with this prediction:
    /// position within `tolerance` metres, fuel within `fuel_tolerance`,
    /// same mode and freeze status.
    pub fn matches(
        &self,
        authoritative: &MovementState,
        tolerance: f32,
        fuel_tolerance: f32,
    ) -> bool {
        self.position.distance(authoritative.position) <= tolerance
            && (self.fuel - authoritative.jetpack.fuel).abs() <= fuel_tolerance
            && self.mode == authoritative.mode
            && self.is_frozen == authoritative.freeze.is_frozen
    }
}

// ---------------------------------------------------------------------------
// PredictedMove
// ---------------------------------------------------------------------------

/// A buffered move: the record, the state it was simulated from, and the
/// outcome it produced.
#[derive(Debug, Clone)]
pub struct PredictedMove {
    /// The captured move.
    pub record: MoveRecord,
    /// State immediately before the move.
    pub start: MovementState,
    /// Outcome of the move.
    pub predicted: PredictedKinematics,
    /// Already handed to the transport at least once.
    pub sent: bool,
}

/// What [`PredictionBuffer::record_move`] did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Stored as a new entry.
    Appended,
    /// Merged into the previous unsent entry.
    Combined,
}

// ---------------------------------------------------------------------------
// PredictionBuffer
// ---------------------------------------------------------------------------

/// Bounded, tick-ordered buffer of unacknowledged moves.
pub struct PredictionBuffer {
    entries: VecDeque<PredictedMove>,
    max_size: usize,
    max_combined_delta: f32,
}

impl PredictionBuffer {
    /// Creates an empty buffer.
    pub fn new(max_size: usize, max_combined_delta: f32) -> Self {
        let max_size = max_size.max(1);
        Self {
            entries: VecDeque::with_capacity(max_size),
            max_size,
            max_combined_delta,
        }
    }

    /// Creates an empty buffer sized from the prediction config.
    pub fn from_config(config: &PredictionConfig) -> Self {
        Self::new(config.buffer_capacity, config.max_combined_delta)
    }

    /// Simulates `record` on the live `state` and stores it.
    ///
    /// If the newest entry has not been sent and can absorb `record`, the
    /// state is rewound to that entry's start and the merged move is
    /// simulated instead. When the buffer is full the oldest move is
    /// evicted.
    pub fn record_move(
        &mut self,
        sim: &MovementSimulator,
        state: &mut MovementState,
        record: MoveRecord,
        env: MovementEnv<'_>,
    ) -> (PushOutcome, Vec<MovementEvent>) {
        if let Some(last) = self.entries.back_mut()
            && !last.sent
            && last.record.can_combine(&record, sim, self.max_combined_delta)
        {
            let mut merged = last.record.clone();
            merged.combine(&record);
            let mut rewound = last.start.clone();
            let events = sim.apply_record(&mut rewound, &merged, env);
            last.record = merged;
            last.predicted = PredictedKinematics::of(&rewound);
            *state = rewound;
            return (PushOutcome::Combined, events);
        }

        let start = state.clone();
        let events = sim.apply_record(state, &record, env);
        if self.entries.len() >= self.max_size
            && let Some(evicted) = self.entries.pop_front()
        {
            tracing::trace!(tick = evicted.record.tick, "prediction buffer full, evicting");
        }
        self.entries.push_back(PredictedMove {
            record,
            start,
            predicted: PredictedKinematics::of(state),
            sent: false,
        });
        (PushOutcome::Appended, events)
    }

    /// Marks every buffered move as sent and returns all of them, oldest
    /// first. Unacknowledged moves are resent until acknowledged, so a
    /// lost packet costs latency rather than a correction.
    pub fn flush(&mut self) -> Vec<MoveRecord> {
        self.entries
            .iter_mut()
            .map(|entry| {
                entry.sent = true;
                entry.record.clone()
            })
            .collect()
    }

    /// Discards all moves ending at or before `tick` (acknowledged).
    pub fn acknowledge(&mut self, tick: u64) {
        while self.entries.front().is_some_and(|e| e.record.tick <= tick) {
            self.entries.pop_front();
        }
    }

    /// The buffered move ending exactly at `tick`.
    pub fn find(&self, tick: u64) -> Option<&PredictedMove> {
        self.entries.iter().find(|e| e.record.tick == tick)
    }

    /// Re-simulates every buffered move from `base`, refreshing each
    /// entry's start state, the simulated fields of its record, and its
    /// prediction. Returns the final state.
    pub fn replay(
        &mut self,
        sim: &MovementSimulator,
        base: &MovementState,
        env: MovementEnv<'_>,
    ) -> MovementState {
        let mut state = base.clone();
        for entry in &mut self.entries {
            entry.start = state.clone();
            entry.record.rebase(sim, &state);
            sim.apply_record(&mut state, &entry.record, env);
            entry.predicted = PredictedKinematics::of(&state);
        }
        state
    }

    /// Iterates the buffered records, oldest first.
    pub fn records(&self) -> impl Iterator<Item = &MoveRecord> {
        self.entries.iter().map(|e| &e.record)
    }

    /// Returns the number of buffered moves.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns a view of all entries.
    pub fn entries(&self) -> &VecDeque<PredictedMove> {
        &self.entries
    }
}

impl Default for PredictionBuffer {
    fn default() -> Self {
        Self::from_config(&PredictionConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use kinetic_config::Config;

    use super::*;
    use crate::input::MoveInput;
    use crate::query::{Arena, CombatSnapshot};
    use crate::record::replay;

    const DT: f32 = 1.0 / 60.0;

    struct Fixture {
        sim: MovementSimulator,
        arena: Arena,
        combat: CombatSnapshot,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                sim: MovementSimulator::new(&Config::default()),
                arena: Arena::open_floor(0.0, 0.35),
                combat: CombatSnapshot::default(),
            }
        }

        fn env(&self) -> MovementEnv<'_> {
            MovementEnv::new(&self.arena, &self.combat)
        }

        fn push(
            &self,
            buffer: &mut PredictionBuffer,
            state: &mut MovementState,
            input: &MoveInput,
            tick: u64,
        ) -> PushOutcome {
            let record = MoveRecord::capture(&self.sim, state, input, tick, DT);
            buffer.record_move(&self.sim, state, record, self.env()).0
        }
    }

    #[test]
    fn test_unsent_quiescent_moves_are_combined() {
        let fx = Fixture::new();
        let mut buffer = PredictionBuffer::default();
        let mut state = fx.sim.spawn(Vec3::ZERO);
        let input = MoveInput::walking(Vec3::X);

        assert_eq!(fx.push(&mut buffer, &mut state, &input, 1), PushOutcome::Appended);
        let outcome = fx.push(&mut buffer, &mut state, &input, 2);
        assert_eq!(outcome, PushOutcome::Combined);
        assert_eq!(buffer.len(), 1);

        let entry = &buffer.entries()[0];
        assert_eq!(entry.record.first_tick, 1);
        assert_eq!(entry.record.tick, 2);
        assert_eq!(entry.predicted, PredictedKinematics::of(&state));
    }

    #[test]
    fn test_sent_moves_are_not_combined() {
        let fx = Fixture::new();
        let mut buffer = PredictionBuffer::default();
        let mut state = fx.sim.spawn(Vec3::ZERO);
        let input = MoveInput::walking(Vec3::X);

        fx.push(&mut buffer, &mut state, &input, 1);
        assert_eq!(buffer.flush().len(), 1);
        assert_eq!(fx.push(&mut buffer, &mut state, &input, 2), PushOutcome::Appended);
        assert_eq!(buffer.flush().len(), 2);
    }

    #[test]
    fn test_acknowledge_discards_confirmed_moves() {
        let fx = Fixture::new();
        let mut buffer = PredictionBuffer::default();
        let mut state = fx.sim.spawn(Vec3::ZERO);

        for tick in 1..=5 {
            fx.push(&mut buffer, &mut state, &MoveInput::walking(Vec3::X), tick);
            buffer.flush();
        }
        assert_eq!(buffer.len(), 5);

        buffer.acknowledge(3);
        assert_eq!(buffer.len(), 2);
        assert!(buffer.find(3).is_none());
        assert!(buffer.find(4).is_some());
        let ticks: Vec<u64> = buffer.records().map(|r| r.tick).collect();
        assert_eq!(ticks, vec![4, 5]);
    }

    #[test]
    fn test_full_buffer_evicts_oldest() {
        let fx = Fixture::new();
        let mut buffer = PredictionBuffer::new(3, 0.125);
        let mut state = fx.sim.spawn(Vec3::ZERO);

        for tick in 1..=5 {
            fx.push(&mut buffer, &mut state, &MoveInput::walking(Vec3::X), tick);
            buffer.flush();
        }
        let ticks: Vec<u64> = buffer.records().map(|r| r.tick).collect();
        assert_eq!(ticks, vec![3, 4, 5]);
    }

    #[test]
    fn test_replay_from_own_start_reproduces_prediction() {
        let fx = Fixture::new();
        let mut buffer = PredictionBuffer::default();
        let mut state = fx.sim.spawn(Vec3::ZERO);
        let base = state.clone();

        let inputs = [
            MoveInput::walking(Vec3::X),
            MoveInput {
                wants_jetpack: true,
                ..MoveInput::walking(Vec3::X)
            },
            MoveInput::walking(Vec3::Y),
        ];
        for (i, input) in inputs.iter().enumerate() {
            fx.push(&mut buffer, &mut state, input, i as u64 + 1);
            buffer.flush();
        }

        let records: Vec<MoveRecord> = buffer.records().cloned().collect();
        assert_eq!(replay(&fx.sim, &base, &records, fx.env()), state);
        assert_eq!(buffer.replay(&fx.sim, &base, fx.env()), state);
    }

    #[test]
    fn test_replay_from_corrected_base_moves_prediction() {
        let fx = Fixture::new();
        let mut buffer = PredictionBuffer::default();
        let mut state = fx.sim.spawn(Vec3::ZERO);

        for tick in 1..=3 {
            fx.push(&mut buffer, &mut state, &MoveInput::walking(Vec3::X), tick);
            buffer.flush();
        }

        let mut corrected = fx.sim.spawn(Vec3::new(0.0, 2.0, 0.0));
        corrected.velocity = state.velocity;
        buffer.acknowledge(1);
        let replayed = buffer.replay(&fx.sim, &corrected, fx.env());
        assert!((replayed.position.y - 2.0).abs() < 1e-5);
        assert_eq!(buffer.entries()[0].start, corrected);
    }

    #[test]
    fn test_kinematics_match_with_tolerance() {
        let state = MovementState::new(Vec3::ZERO, 100.0);
        let predicted = PredictedKinematics::of(&state);

        let mut nearby = state.clone();
        nearby.position.x = 0.005;
        assert!(predicted.matches(&nearby, 0.01, 0.05));

        let mut far = state.clone();
        far.position.x = 0.5;
        assert!(!predicted.matches(&far, 0.01, 0.05));

        let mut drained = state.clone();
        drained.jetpack.fuel = 90.0;
        assert!(!predicted.matches(&drained, 0.01, 0.05));

        // Fuel is judged in fuel units, not against the metre tolerance.
        let mut sipped = state.clone();
        sipped.jetpack.fuel = 99.97;
        assert!(predicted.matches(&sipped, 0.01, 0.05));
        assert!(!predicted.matches(&sipped, 0.01, 0.01));

        let mut frozen = state;
        frozen.freeze.is_frozen = true;
        assert!(!predicted.matches(&frozen, 0.01, 0.05));
    }
}
