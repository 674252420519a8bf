//! Jetpack: fuel-limited upward thrust with lateral steering.
//!
//! Fuel drains at `consumption_rate` while thrusting and refills at
//! `refill_rate` only while walking. It never leaves `[0, max_fuel]`.

use kinetic_config::JetpackConfig;

use super::{Ability, MovementEvent, StepContext};
use crate::input::MoveInput;
use crate::state::{MovementMode, MovementState, horizontal};

/// Share of the thrust applied along the move direction.
const LATERAL_THRUST_FACTOR: f32 = 0.5;

/// Recorded jetpack intent and fuel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JetpackSnapshot {
    /// Jetpack input held.
    pub wants: bool,
    /// Fuel at capture time.
    pub fuel: f32,
}

/// Jetpack thrust and fuel bookkeeping.
#[derive(Debug, Clone)]
pub struct JetpackController {
    config: JetpackConfig,
}

impl JetpackController {
    pub fn new(config: JetpackConfig) -> Self {
        Self { config }
    }

    /// Tank size.
    pub fn max_fuel(&self) -> f32 {
        self.config.max_fuel
    }

    /// Multiplier on the acceleration cap (never the speed cap).
    pub fn acceleration_multiplier(&self, state: &MovementState) -> f32 {
        if state.jetpack.active {
            self.config.acceleration_modifier
        } else {
            1.0
        }
    }

    /// Multiplier on gravity.
    pub fn gravity_multiplier(&self, state: &MovementState) -> f32 {
        if state.jetpack.active {
            self.config.gravity_scale
        } else {
            1.0
        }
    }
}

impl Ability for JetpackController {
    type Snapshot = JetpackSnapshot;

    fn capture_intent(&self, state: &mut MovementState, input: &MoveInput) {
        state.jetpack.wants = input.wants_jetpack;
    }

    fn simulate_step(&self, state: &mut MovementState, ctx: &mut StepContext<'_>) {
        let max_fuel = self.config.max_fuel.max(0.0);
        let was_active = state.jetpack.active;

        if self.config.enabled && state.jetpack.wants && state.jetpack.fuel > 0.0 {
            state.jetpack.active = true;
            state.jetpack.fuel =
                (state.jetpack.fuel - self.config.consumption_rate * ctx.dt).clamp(0.0, max_fuel);
            state.mode = MovementMode::Falling;

            let thrust = self.config.thrust_force * ctx.dt;
            state.velocity.z += thrust;
            state.velocity += horizontal(state.move_direction) * thrust * LATERAL_THRUST_FACTOR;
        } else {
            if state.jetpack.wants && state.jetpack.fuel <= 0.0 {
                tracing::trace!("jetpack denied: out of fuel");
            }
            state.jetpack.active = false;
        }

        if state.jetpack.active != was_active {
            tracing::debug!(
                active = state.jetpack.active,
                fuel = state.jetpack.fuel,
                "jetpack toggled"
            );
            ctx.emit(MovementEvent::JetpackToggled {
                active: state.jetpack.active,
            });
        }

        if !state.jetpack.active
            && state.mode == MovementMode::Walking
            && state.jetpack.fuel < max_fuel
        {
            state.jetpack.fuel =
                (state.jetpack.fuel + self.config.refill_rate * ctx.dt).min(max_fuel);
        }
    }

    fn snapshot(&self, state: &MovementState) -> JetpackSnapshot {
        JetpackSnapshot {
            wants: state.jetpack.wants,
            fuel: state.jetpack.fuel,
        }
    }

    fn combinable_with(&self, a: &JetpackSnapshot, b: &JetpackSnapshot) -> bool {
        a.wants == b.wants && a.fuel.to_bits() == b.fuel.to_bits()
    }

    /// Fuel is simulated state, so only the intent is restored.
    fn restore(&self, state: &mut MovementState, snapshot: &JetpackSnapshot) {
        state.jetpack.wants = snapshot.wants;
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::query::Arena;

    fn step(
        controller: &JetpackController,
        state: &mut MovementState,
        dt: f32,
    ) -> Vec<MovementEvent> {
        let arena = Arena::open_floor(0.0, 0.35);
        let mut events = Vec::new();
        let mut ctx = StepContext {
            dt,
            spatial: &arena,
            events: &mut events,
        };
        controller.simulate_step(state, &mut ctx);
        events
    }

    #[test]
    fn test_thrust_consumes_fuel_and_lifts() {
        let controller = JetpackController::new(JetpackConfig::default());
        let mut state = MovementState::new(Vec3::ZERO, 100.0);
        state.jetpack.wants = true;

        let events = step(&controller, &mut state, 0.1);
        assert!(state.jetpack.active);
        assert_eq!(state.jetpack.fuel, 99.0);
        assert_eq!(state.mode, MovementMode::Falling);
        assert!((state.velocity.z - 1.2).abs() < 1e-6);
        assert_eq!(events, vec![MovementEvent::JetpackToggled { active: true }]);
    }

    #[test]
    fn test_lateral_thrust_follows_move_direction() {
        let controller = JetpackController::new(JetpackConfig::default());
        let mut state = MovementState::new(Vec3::ZERO, 100.0);
        state.jetpack.wants = true;
        state.move_direction = Vec3::new(0.0, 1.0, 0.5);

        step(&controller, &mut state, 0.1);
        assert!((state.velocity.y - 0.6).abs() < 1e-6);
        assert_eq!(state.velocity.x, 0.0);
    }

    #[test]
    fn test_empty_tank_denies_thrust() {
        let controller = JetpackController::new(JetpackConfig::default());
        let mut state = MovementState::new(Vec3::ZERO, 0.0);
        state.mode = MovementMode::Falling;
        state.jetpack.wants = true;

        let events = step(&controller, &mut state, 0.1);
        assert!(!state.jetpack.active);
        assert_eq!(state.velocity, Vec3::ZERO);
        assert!(events.is_empty());
    }

    #[test]
    fn test_fuel_never_goes_negative() {
        let controller = JetpackController::new(JetpackConfig::default());
        let mut state = MovementState::new(Vec3::ZERO, 0.5);
        state.jetpack.wants = true;

        step(&controller, &mut state, 0.1);
        assert_eq!(state.jetpack.fuel, 0.0);
        assert!(state.jetpack.active);

        let events = step(&controller, &mut state, 0.1);
        assert!(!state.jetpack.active);
        assert_eq!(events, vec![MovementEvent::JetpackToggled { active: false }]);
    }

    #[test]
    fn test_refill_only_while_walking() {
        let controller = JetpackController::new(JetpackConfig::default());
        let mut state = MovementState::new(Vec3::ZERO, 50.0);

        step(&controller, &mut state, 1.0);
        assert_eq!(state.jetpack.fuel, 55.0);

        state.mode = MovementMode::Falling;
        step(&controller, &mut state, 1.0);
        assert_eq!(state.jetpack.fuel, 55.0);

        state.mode = MovementMode::Walking;
        state.jetpack.fuel = 99.0;
        step(&controller, &mut state, 1.0);
        assert_eq!(state.jetpack.fuel, 100.0);
    }

    #[test]
    fn test_combine_compares_fuel_bits() {
        let controller = JetpackController::new(JetpackConfig::default());
        let a = JetpackSnapshot {
            wants: false,
            fuel: 100.0,
        };
        assert!(controller.combinable_with(&a, &a));
        let b = JetpackSnapshot {
            fuel: 99.99,
            ..a
        };
        assert!(!controller.combinable_with(&a, &b));
        let c = JetpackSnapshot { wants: true, ..a };
        assert!(!controller.combinable_with(&a, &c));
    }

    #[test]
    fn test_modifiers_apply_only_while_active() {
        let controller = JetpackController::new(JetpackConfig::default());
        let mut state = MovementState::new(Vec3::ZERO, 100.0);
        assert_eq!(controller.acceleration_multiplier(&state), 1.0);
        assert_eq!(controller.gravity_multiplier(&state), 1.0);

        state.jetpack.active = true;
        assert_eq!(controller.acceleration_multiplier(&state), 2.0);
        assert_eq!(controller.gravity_multiplier(&state), 0.0);
    }
}
