//! Collaborator interfaces consumed by the simulator.
//!
//! The simulator never looks the world up on its own: a [`SpatialQuery`]
//! and a [`CombatState`] are passed in through [`MovementEnv`] every tick.
//! [`Arena`] is a small analytic world of planes used by tests and the
//! loopback demo.

use glam::Vec3;

use crate::state::{DIRECTION_EPSILON, UP};

// ---------------------------------------------------------------------------
// SpatialQuery
// ---------------------------------------------------------------------------

/// A surface hit by a ray cast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceHit {
    /// Contact point.
    pub point: Vec3,
    /// Unit surface normal facing the ray origin.
    pub normal: Vec3,
    /// Distance from the ray origin.
    pub distance: f32,
    /// Surface is tagged as runnable wall.
    pub wall_tagged: bool,
}

/// Collision queries against the world.
pub trait SpatialQuery {
    /// Furthest point from `origin` along `direction`, at most
    /// `max_distance` away, that the character can occupy without
    /// penetrating geometry.
    fn find_unobstructed_point_towards(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
    ) -> Vec3;

    /// Nearest surface hit by a ray, if any lies within `max_distance`.
    fn cast_ray(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<SurfaceHit>;

    /// Height of the walkable floor below `origin`, if there is one.
    fn floor_height(&self, origin: Vec3) -> Option<f32>;
}

// ---------------------------------------------------------------------------
// CombatState
// ---------------------------------------------------------------------------

/// Character state owned by the combat layer that affects movement speed.
pub trait CombatState {
    /// Aiming down sights.
    fn is_targeting(&self) -> bool;
    /// Sprinting.
    fn is_running(&self) -> bool;
    /// Speed multiplier applied while targeting.
    fn targeting_speed_modifier(&self) -> f32;
    /// Speed multiplier applied while running.
    fn running_speed_modifier(&self) -> f32;
}

/// Plain-data [`CombatState`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombatSnapshot {
    /// Aiming down sights.
    pub targeting: bool,
    /// Sprinting.
    pub running: bool,
    /// Speed multiplier applied while targeting.
    pub targeting_modifier: f32,
    /// Speed multiplier applied while running.
    pub running_modifier: f32,
}

impl CombatSnapshot {
    /// Neither targeting nor running, with modifiers from the config.
    pub fn idle(config: &kinetic_config::SimulationConfig) -> Self {
        Self {
            targeting: false,
            running: false,
            targeting_modifier: config.targeting_speed_modifier,
            running_modifier: config.running_speed_modifier,
        }
    }
}

impl Default for CombatSnapshot {
    fn default() -> Self {
        Self::idle(&kinetic_config::SimulationConfig::default())
    }
}

impl CombatState for CombatSnapshot {
    fn is_targeting(&self) -> bool {
        self.targeting
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn targeting_speed_modifier(&self) -> f32 {
        self.targeting_modifier
    }

    fn running_speed_modifier(&self) -> f32 {
        self.running_modifier
    }
}

// ---------------------------------------------------------------------------
// MovementEnv
// ---------------------------------------------------------------------------

/// The collaborators handed to one simulation step.
#[derive(Clone, Copy)]
pub struct MovementEnv<'a> {
    /// World collision queries.
    pub spatial: &'a dyn SpatialQuery,
    /// Combat-layer speed state.
    pub combat: &'a dyn CombatState,
}

impl<'a> MovementEnv<'a> {
    /// Bundles the two collaborators.
    pub fn new(spatial: &'a dyn SpatialQuery, combat: &'a dyn CombatState) -> Self {
        Self { spatial, combat }
    }
}

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

/// An infinite plane surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Any point on the plane.
    pub point: Vec3,
    /// Unit normal of the solid side's face.
    pub normal: Vec3,
    /// Runnable wall tag.
    pub wall_tagged: bool,
}

impl Plane {
    /// A plane through `point` facing `normal` (normalized here).
    pub fn new(point: Vec3, normal: Vec3, wall_tagged: bool) -> Self {
        Self {
            point,
            normal: normal.normalize_or_zero(),
            wall_tagged,
        }
    }

    /// Ray intersection with the front face only.
    fn intersect(&self, origin: Vec3, direction: Vec3) -> Option<f32> {
        let denom = direction.dot(self.normal);
        if denom >= -DIRECTION_EPSILON {
            return None;
        }
        let t = (self.point - origin).dot(self.normal) / denom;
        (t >= 0.0).then_some(t)
    }
}

/// Analytic world made of an optional flat floor and a set of planes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Arena {
    /// Height of the flat floor, or `None` for a bottomless void.
    pub floor_z: Option<f32>,
    /// Additional surfaces (walls, ramps).
    pub surfaces: Vec<Plane>,
    /// Character collision radius used to keep teleports off geometry.
    pub collision_radius: f32,
}

impl Arena {
    /// An open floor at height `floor_z`.
    pub fn open_floor(floor_z: f32, collision_radius: f32) -> Self {
        Self {
            floor_z: Some(floor_z),
            surfaces: Vec::new(),
            collision_radius,
        }
    }

    /// Adds a surface and returns the arena (builder style).
    pub fn with_surface(mut self, plane: Plane) -> Self {
        self.surfaces.push(plane);
        self
    }

    fn floor_plane(&self) -> Option<Plane> {
        self.floor_z
            .map(|z| Plane::new(Vec3::new(0.0, 0.0, z), UP, false))
    }
}

impl SpatialQuery for Arena {
    fn find_unobstructed_point_towards(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
    ) -> Vec3 {
        let direction = direction.normalize_or_zero();
        if direction == Vec3::ZERO || max_distance <= 0.0 {
            return origin;
        }
        let travel = match self.cast_ray(origin, direction, max_distance + self.collision_radius) {
            Some(hit) => (hit.distance - self.collision_radius).clamp(0.0, max_distance),
            None => max_distance,
        };
        origin + direction * travel
    }

    fn cast_ray(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<SurfaceHit> {
        let direction = direction.normalize_or_zero();
        if direction == Vec3::ZERO {
            return None;
        }
        let floor = self.floor_plane();
        let mut best: Option<SurfaceHit> = None;
        for plane in floor.iter().chain(self.surfaces.iter()) {
            let Some(t) = plane.intersect(origin, direction) else {
                continue;
            };
            if t > max_distance || best.is_some_and(|b| b.distance <= t) {
                continue;
            }
            best = Some(SurfaceHit {
                point: origin + direction * t,
                normal: plane.normal,
                distance: t,
                wall_tagged: plane.wall_tagged,
            });
        }
        best
    }

    fn floor_height(&self, origin: Vec3) -> Option<f32> {
        self.floor_z.filter(|z| origin.z >= *z - FLOOR_PENETRATION_SLACK)
    }
}

/// How far below the floor an origin may sink and still count as above it.
const FLOOR_PENETRATION_SLACK: f32 = 1.0;
