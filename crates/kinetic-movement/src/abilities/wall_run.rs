//! Wall-run and wall-jump.
//!
//! Attaching to a wall switches the character to [`MovementMode::Flying`]
//! (no gravity) for at most `max_run_time` seconds. The countdown lives in
//! [`WallRunState::run_elapsed`](crate::state::WallRunState) so both sides
//! of the connection reach the timeout on the same tick; when it expires
//! the character is launched off the wall automatically.

use glam::Vec3;
use kinetic_config::{WallJumpConfig, WallRunConfig};

use super::{Ability, MovementEvent, StepContext};
use crate::input::{MoveInput, WallJumpRequest};
use crate::query::SpatialQuery;
use crate::state::{MovementMode, MovementState, UP, WallSide};

/// Slack on the run-time comparison so accumulated `dt`s hit the deadline.
const TIMEOUT_EPSILON: f32 = 1e-4;

/// Recorded wall-run intent and status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WallRunSnapshot {
    /// Wall-run input held.
    pub wants: bool,
    /// Attached at capture time.
    pub is_running: bool,
}

/// A qualifying wall next to the character.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallContact {
    /// Unit normal of the wall.
    pub normal: Vec3,
    /// Distance from the character origin.
    pub distance: f32,
}

/// Camera roll for a wall side, in degrees. Positive rolls towards a wall
/// on the left.
pub fn side_lean_angle(side: WallSide, lean_deg: f32) -> f32 {
    f32::from(side.sign()) * lean_deg
}

/// Wall detection, attach/detach and wall-jump impulses.
#[derive(Debug, Clone)]
pub struct WallRunController {
    config: WallRunConfig,
    jump: WallJumpConfig,
    /// `sin(max_wall_tilt)`: the largest accepted `|normal · UP|`.
    max_normal_up: f32,
}

impl WallRunController {
    pub fn new(config: WallRunConfig, jump: WallJumpConfig) -> Self {
        let max_normal_up = config.max_wall_tilt_deg.clamp(0.0, 90.0).to_radians().sin();
        Self {
            config,
            jump,
            max_normal_up,
        }
    }

    /// Camera roll for the current side.
    pub fn lean_angle(&self, side: WallSide) -> f32 {
        side_lean_angle(side, self.config.side_lean_deg)
    }

    /// Nearest runnable wall within `collision_radius + detection_margin +
    /// extra_margin`, probing forward, right, back and left of `forward`.
    ///
    /// Surfaces that are not wall-tagged, or tilted further than
    /// `max_wall_tilt_deg` from vertical, are skipped. On equal distances
    /// the earlier probe direction wins.
    pub fn find_wall(
        &self,
        spatial: &dyn SpatialQuery,
        position: Vec3,
        forward: Vec3,
        extra_margin: f32,
    ) -> Option<WallContact> {
        let reach = self.config.collision_radius + self.config.detection_margin + extra_margin;
        let right = forward.cross(UP);
        let probes = [forward, right, -forward, -right];

        let mut best: Option<WallContact> = None;
        for direction in probes {
            let Some(hit) = spatial.cast_ray(position, direction, reach) else {
                continue;
            };
            if !hit.wall_tagged || hit.normal.dot(UP).abs() > self.max_normal_up {
                continue;
            }
            if best.is_none_or(|b| hit.distance < b.distance) {
                best = Some(WallContact {
                    normal: hit.normal,
                    distance: hit.distance,
                });
            }
        }
        best
    }

    fn detect(&self, state: &MovementState, spatial: &dyn SpatialQuery) -> Option<WallContact> {
        self.find_wall(spatial, state.position, state.forward(), 0.0)
    }

    fn can_attach(&self, state: &MovementState) -> bool {
        let wr = &state.wall_run;
        self.config.enabled
            && wr.wants
            && !wr.is_running
            && !wr.rearm_required
            && !state.jetpack.active
            && state.mode != MovementMode::None
            && state.horizontal_speed() >= self.config.min_speed
            && !(state.mode == MovementMode::Falling && state.velocity.z > 0.0)
    }

    fn attach(&self, state: &mut MovementState, contact: WallContact, ctx: &mut StepContext<'_>) {
        let side = WallSide::of_wall(contact.normal, state.forward());
        let wr = &mut state.wall_run;
        wr.is_running = true;
        wr.wall_normal = contact.normal;
        wr.side = side;
        wr.run_elapsed = 0.0;
        state.mode = MovementMode::Flying;
        state.velocity.z = 0.0;

        tracing::debug!(?side, normal = ?contact.normal, "wall run started");
        ctx.emit(MovementEvent::WallRunStarted { side });
        ctx.emit(MovementEvent::WallSideChanged { side });
    }

    fn detach(&self, state: &mut MovementState, ctx: &mut StepContext<'_>) {
        let wr = &mut state.wall_run;
        wr.is_running = false;
        wr.wall_normal = Vec3::ZERO;
        wr.side = WallSide::None;
        wr.run_elapsed = 0.0;
        if state.mode == MovementMode::Flying {
            state.mode = MovementMode::Falling;
        }
        tracing::debug!("wall run stopped");
        ctx.emit(MovementEvent::WallRunStopped);
    }

    fn launch(
        &self,
        state: &mut MovementState,
        direction: Vec3,
        automatic: bool,
        ctx: &mut StepContext<'_>,
    ) {
        self.apply_launch(state, direction * self.jump.strength, automatic, ctx);
    }

    /// Adds `launch` to the velocity, leaving any wall run first.
    pub fn apply_launch(
        &self,
        state: &mut MovementState,
        launch: Vec3,
        automatic: bool,
        ctx: &mut StepContext<'_>,
    ) {
        if state.wall_run.is_running {
            self.detach(state, ctx);
        }
        state.velocity += launch;
        state.mode = MovementMode::Falling;
        tracing::debug!(?launch, automatic, "wall jump");
        ctx.emit(MovementEvent::WallJumped { launch, automatic });
    }

    /// Explicit wall jump. Denied (returns `false`) unless the character is
    /// running on, or standing next to, a qualifying wall.
    pub fn wall_jump(
        &self,
        state: &mut MovementState,
        request: WallJumpRequest,
        ctx: &mut StepContext<'_>,
    ) -> bool {
        let normal = if state.wall_run.is_running {
            Some(state.wall_run.wall_normal)
        } else {
            self.detect(state, ctx.spatial).map(|c| c.normal)
        };
        let Some(normal) = normal else {
            tracing::trace!("wall jump denied: no wall");
            return false;
        };

        let direction = match request {
            WallJumpRequest::AlongWallNormal => normal,
            WallJumpRequest::Direction(direction) => {
                let direction = direction.normalize_or_zero();
                if direction == Vec3::ZERO { normal } else { direction }
            }
        };
        self.launch(state, direction, false, ctx);
        true
    }
}

impl Ability for WallRunController {
    type Snapshot = WallRunSnapshot;

    fn capture_intent(&self, state: &mut MovementState, input: &MoveInput) {
        state.wall_run.wants = input.wants_wall_run;
    }

    fn simulate_step(&self, state: &mut MovementState, ctx: &mut StepContext<'_>) {
        if state.wall_run.rearm_required && !state.wall_run.wants {
            state.wall_run.rearm_required = false;
        }

        if !state.wall_run.is_running {
            if !self.can_attach(state) {
                return;
            }
            match self.detect(state, ctx.spatial) {
                Some(contact) => self.attach(state, contact, ctx),
                None => tracing::trace!("wall run denied: no wall"),
            }
            return;
        }

        state.wall_run.run_elapsed += ctx.dt;

        let keep = self.config.enabled && state.wall_run.wants && !state.jetpack.active;
        let contact = if keep {
            self.detect(state, ctx.spatial)
        } else {
            None
        };
        let Some(contact) = contact else {
            self.detach(state, ctx);
            return;
        };

        state.wall_run.wall_normal = contact.normal;
        let side = WallSide::of_wall(contact.normal, state.forward());
        if side != state.wall_run.side {
            state.wall_run.side = side;
            tracing::debug!(?side, "wall side changed");
            ctx.emit(MovementEvent::WallSideChanged { side });
        }

        if state.wall_run.run_elapsed + TIMEOUT_EPSILON >= self.config.max_run_time {
            self.launch(state, contact.normal, true, ctx);
            state.wall_run.rearm_required = true;
        }
    }

    fn snapshot(&self, state: &MovementState) -> WallRunSnapshot {
        WallRunSnapshot {
            wants: state.wall_run.wants,
            is_running: state.wall_run.is_running,
        }
    }

    fn combinable_with(&self, a: &WallRunSnapshot, b: &WallRunSnapshot) -> bool {
        a == b
    }

    fn restore(&self, state: &mut MovementState, snapshot: &WallRunSnapshot) {
        state.wall_run.wants = snapshot.wants;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Arena, Plane};

    /// Open floor with a runnable wall 0.5 m to the left of the origin.
    fn left_wall_arena() -> Arena {
        Arena::open_floor(0.0, 0.35).with_surface(Plane::new(
            Vec3::new(0.0, 0.5, 0.0),
            Vec3::NEG_Y,
            true,
        ))
    }

    fn controller() -> WallRunController {
        WallRunController::new(WallRunConfig::default(), WallJumpConfig::default())
    }

    fn running_state() -> MovementState {
        let mut state = MovementState::new(Vec3::ZERO, 100.0);
        state.velocity = Vec3::new(5.0, 0.0, 0.0);
        state.wall_run.wants = true;
        state
    }

    fn step(
        controller: &WallRunController,
        state: &mut MovementState,
        arena: &Arena,
        dt: f32,
    ) -> Vec<MovementEvent> {
        let mut events = Vec::new();
        let mut ctx = StepContext {
            dt,
            spatial: arena,
            events: &mut events,
        };
        controller.simulate_step(state, &mut ctx);
        events
    }

    #[test]
    fn test_attach_to_left_wall() {
        let controller = controller();
        let arena = left_wall_arena();
        let mut state = running_state();

        let events = step(&controller, &mut state, &arena, 0.1);
        assert!(state.wall_run.is_running);
        assert_eq!(state.mode, MovementMode::Flying);
        assert_eq!(state.wall_run.side, WallSide::Left);
        assert_eq!(state.wall_run.wall_normal, Vec3::NEG_Y);
        assert_eq!(
            events,
            vec![
                MovementEvent::WallRunStarted {
                    side: WallSide::Left
                },
                MovementEvent::WallSideChanged {
                    side: WallSide::Left
                },
            ]
        );
    }

    #[test]
    fn test_attach_requires_speed() {
        let controller = controller();
        let arena = left_wall_arena();
        let mut state = running_state();
        state.velocity = Vec3::new(1.0, 0.0, 0.0);

        step(&controller, &mut state, &arena, 0.1);
        assert!(!state.wall_run.is_running);
        assert_eq!(state.mode, MovementMode::Walking);
    }

    #[test]
    fn test_no_attach_while_ascending() {
        let controller = controller();
        let arena = left_wall_arena();
        let mut state = running_state();
        state.mode = MovementMode::Falling;
        state.velocity.z = 2.0;

        step(&controller, &mut state, &arena, 0.1);
        assert!(!state.wall_run.is_running);

        state.velocity.z = -1.0;
        step(&controller, &mut state, &arena, 0.1);
        assert!(state.wall_run.is_running);
        assert_eq!(state.velocity.z, 0.0);
    }

    #[test]
    fn test_untagged_or_tilted_surfaces_are_ignored() {
        let controller = controller();
        let untagged = Arena::open_floor(0.0, 0.35).with_surface(Plane::new(
            Vec3::new(0.0, 0.5, 0.0),
            Vec3::NEG_Y,
            false,
        ));
        let mut state = running_state();
        step(&controller, &mut state, &untagged, 0.1);
        assert!(!state.wall_run.is_running);

        // 60 degrees from vertical: beyond the 45 degree limit.
        let tilt = 60f32.to_radians();
        let tilted_normal = Vec3::new(0.0, -tilt.cos(), tilt.sin());
        let ramp = Arena::open_floor(0.0, 0.35).with_surface(Plane::new(
            Vec3::new(0.0, 0.3, 0.0),
            tilted_normal,
            true,
        ));
        let mut state = running_state();
        step(&controller, &mut state, &ramp, 0.1);
        assert!(!state.wall_run.is_running);
    }

    #[test]
    fn test_nearest_wall_wins() {
        let controller = controller();
        let arena = left_wall_arena().with_surface(Plane::new(
            Vec3::new(0.0, -0.4, 0.0),
            Vec3::Y,
            true,
        ));
        let contact = controller
            .find_wall(&arena, Vec3::ZERO, Vec3::X, 0.0)
            .expect("two walls in reach");
        assert_eq!(contact.normal, Vec3::Y);
        assert!((contact.distance - 0.4).abs() < 1e-5);
    }

    #[test]
    fn test_release_intent_detaches() {
        let controller = controller();
        let arena = left_wall_arena();
        let mut state = running_state();
        step(&controller, &mut state, &arena, 0.1);

        state.wall_run.wants = false;
        let events = step(&controller, &mut state, &arena, 0.1);
        assert!(!state.wall_run.is_running);
        assert_eq!(state.mode, MovementMode::Falling);
        assert_eq!(state.wall_run.side, WallSide::None);
        assert_eq!(events, vec![MovementEvent::WallRunStopped]);
    }

    #[test]
    fn test_timeout_launches_off_wall_and_requires_rearm() {
        let controller = controller();
        let arena = left_wall_arena();
        let mut state = running_state();
        step(&controller, &mut state, &arena, 0.25);
        assert!(state.wall_run.is_running);

        for _ in 0..13 {
            step(&controller, &mut state, &arena, 0.25);
            assert!(state.wall_run.is_running);
        }

        let events = step(&controller, &mut state, &arena, 0.25);
        assert!(!state.wall_run.is_running);
        assert_eq!(state.mode, MovementMode::Falling);
        assert!(state.wall_run.rearm_required);
        assert!(events.contains(&MovementEvent::WallJumped {
            launch: Vec3::NEG_Y * 8.0,
            automatic: true,
        }));

        // Still holding the input: no re-attach.
        state.velocity.z = 0.0;
        step(&controller, &mut state, &arena, 0.25);
        assert!(!state.wall_run.is_running);

        state.wall_run.wants = false;
        step(&controller, &mut state, &arena, 0.25);
        assert!(!state.wall_run.rearm_required);
    }

    #[test]
    fn test_explicit_wall_jump_requires_wall() {
        let controller = controller();
        let mut state = running_state();
        let mut events = Vec::new();

        let open = Arena::open_floor(0.0, 0.35);
        let mut ctx = StepContext {
            dt: 0.1,
            spatial: &open,
            events: &mut events,
        };
        assert!(!controller.wall_jump(&mut state, WallJumpRequest::AlongWallNormal, &mut ctx));
        assert_eq!(state.velocity, Vec3::new(5.0, 0.0, 0.0));

        let arena = left_wall_arena();
        let mut ctx = StepContext {
            dt: 0.1,
            spatial: &arena,
            events: &mut events,
        };
        let up = WallJumpRequest::Direction(Vec3::new(0.0, 0.0, 2.0));
        assert!(controller.wall_jump(&mut state, up, &mut ctx));
        assert_eq!(state.velocity, Vec3::new(5.0, 0.0, 8.0));
        assert_eq!(state.mode, MovementMode::Falling);
    }

    #[test]
    fn test_side_lean_angle() {
        assert_eq!(side_lean_angle(WallSide::Left, 15.0), 15.0);
        assert_eq!(side_lean_angle(WallSide::Right, 15.0), -15.0);
        assert_eq!(side_lean_angle(WallSide::None, 15.0), 0.0);
        assert_eq!(controller().lean_angle(WallSide::Right), -15.0);
    }
}
