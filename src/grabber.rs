//! Mouse style grab interaction: pick a body with a ray, drag a particle
//! along a fixed distance from the ray origin, throw it on release.

#![allow(clippy::many_single_char_names)]

use glam::Vec3;
use tracing::debug;

use crate::body::DeformableBody;
use crate::xpbd::{BodyId, Simulation};

const PARALLEL_EPSILON: f32 = 1e-10;
const MIN_DISTANCE: f32 = 1e-6;

/// A half line with a unit direction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    /// Start point.
    pub origin: Vec3,
    /// Unit direction.
    pub direction: Vec3,
}

impl Ray {
    /// Build a ray, normalizing `direction`.
    #[must_use]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    /// Point at `distance` along the ray.
    #[must_use]
    pub fn at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }
}

/// Nearest ray hit over the bodies of a simulation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    /// The body that was hit.
    pub body: BodyId,
    /// Distance along the ray.
    pub distance: f32,
}

/// Möller–Trumbore ray/triangle test, both sides. Returns the hit distance.
#[must_use]
pub fn intersect_triangle(ray: &Ray, v0: Vec3, v1: Vec3, v2: Vec3) -> Option<f32> {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    let h = ray.direction.cross(edge2);
    let a = edge1.dot(h);
    if a.abs() < PARALLEL_EPSILON {
        return None;
    }

    let f = 1.0 / a;
    let s = ray.origin - v0;
    let u = f * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = f * ray.direction.dot(q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(q);
    (t >= MIN_DISTANCE).then_some(t)
}

/// Closest hit of `ray` with the surface triangles of `body`.
#[must_use]
pub fn raycast_body(body: &DeformableBody, ray: &Ray) -> Option<f32> {
    body.surface_triangles()
        .iter()
        .filter_map(|&[a, b, c]| intersect_triangle(ray, body.position(a), body.position(b), body.position(c)))
        .min_by(f32::total_cmp)
}

/// Tracks one drag gesture and the velocity to release the particle with.
#[derive(Clone, Debug, Default)]
pub struct Grabber {
    held: Option<BodyId>,
    distance: f32,
    prev_pos: Vec3,
    vel: Vec3,
    time: f32,
}

impl Grabber {
    /// Create an idle grabber.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Body currently held, if any.
    #[must_use]
    pub fn held(&self) -> Option<BodyId> {
        self.held
    }

    /// Velocity the particle will be released with.
    #[must_use]
    pub fn velocity(&self) -> Vec3 {
        self.vel
    }

    /// Accumulate frame time between drag events.
    pub fn advance(&mut self, dt: f32) {
        self.time += dt;
    }

    /// Cast `ray` into the scene and grab the body it hits first.
    pub fn start(&mut self, sim: &mut Simulation, ray: &Ray) -> Option<BodyId> {
        self.held = None;
        let hit = sim.raycast(ray)?;
        let pos = ray.at(hit.distance);
        sim.start_grab(hit.body, pos);
        debug!(body = hit.body.index(), distance = hit.distance, "Grab started");

        self.held = Some(hit.body);
        self.distance = hit.distance;
        self.prev_pos = pos;
        self.vel = Vec3::ZERO;
        self.time = 0.0;
        self.held
    }

    /// Move the held particle to the grab distance along `ray`.
    pub fn drag(&mut self, sim: &mut Simulation, ray: &Ray) {
        let Some(body) = self.held else { return };
        let pos = ray.at(self.distance);
        self.vel = if self.time > 0.0 {
            (pos - self.prev_pos) / self.time
        } else {
            Vec3::ZERO
        };
        self.prev_pos = pos;
        self.time = 0.0;
        sim.move_grabbed(body, pos);
    }

    /// Release the held particle with the last drag velocity.
    pub fn end(&mut self, sim: &mut Simulation) {
        if let Some(body) = self.held.take() {
            sim.end_grab(body, self.vel);
        }
    }
}
