//! Drive XPBD soft bodies: the body registry, simulation tunables and the
//! per-frame substep loop.

use std::path::Path;

use glam::Vec3;
use tracing::{debug, info, warn};

use crate::binding::BoneBoundBody;
use crate::body::{BodyParams, DeformableBody};
use crate::error::{ConfigError, SpawnError};
use crate::grabber::{raycast_body, Ray, RayHit};
use crate::mesh::TetMeshDescriptor;
use crate::rig::BoneChain;

/// Tunables for the whole simulation.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    /// Frame time step.
    pub dt: f32,
    /// Substeps per frame. Values below 1 are treated as 1.
    pub num_substeps: usize,
    /// Gravity acceleration.
    pub gravity: Vec3,
    /// Skip stepping entirely while set.
    pub paused: bool,
    /// Pose bone chains from the simulation clock every frame.
    pub animate_bones: bool,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            dt: 1.0 / 60.0,
            num_substeps: 5,
            gravity: Vec3::new(0.0, -10.0, 0.0),
            paused: false,
            animate_bones: true,
        }
    }
}

impl SimulationParams {
    /// Parse settings from JSON. Missing fields keep their defaults.
    ///
    /// # Errors
    /// Fails on malformed JSON.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read settings from a JSON file.
    ///
    /// # Errors
    /// Fails if the file cannot be read or parsed.
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let params = Self::from_json_str(&json)?;
        info!(?params, "Loaded simulation settings");
        Ok(params)
    }

    /// Number of substeps actually run per frame.
    #[must_use]
    pub fn substeps(&self) -> usize {
        self.num_substeps.max(1)
    }

    /// Duration of one substep.
    #[must_use]
    pub fn substep_dt(&self) -> f32 {
        self.dt / self.substeps() as f32
    }
}

/// Handle to a body inside a [`Simulation`]. Bodies are never removed, so a
/// handle stays valid for the lifetime of its simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(usize);

impl BodyId {
    /// Position of the body in [`Simulation::bodies`].
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A simulated body.
#[derive(Clone, Debug)]
pub enum Body {
    /// Edge and volume constraints only.
    Free(DeformableBody),
    /// Additionally bound to an animated bone chain.
    BoneBound(BoneBoundBody),
}

impl Body {
    /// The soft body inside either variant.
    #[must_use]
    pub fn deformable(&self) -> &DeformableBody {
        match self {
            Body::Free(body) => body,
            Body::BoneBound(bound) => bound.body(),
        }
    }

    /// The soft body inside either variant, mutably.
    pub fn deformable_mut(&mut self) -> &mut DeformableBody {
        match self {
            Body::Free(body) => body,
            Body::BoneBound(bound) => bound.body_mut(),
        }
    }

    /// Pose the skeleton, if any, for animation time `time`.
    pub fn animate(&mut self, time: f32) {
        if let Body::BoneBound(bound) = self {
            bound.animate(time);
        }
    }

    /// Prediction phase.
    pub fn pre_solve(&mut self, dt: f32, gravity: Vec3) {
        self.deformable_mut().pre_solve(dt, gravity);
    }

    /// Constraint phase. Bone bound bodies run their binding first.
    pub fn solve(&mut self, dt: f32) {
        match self {
            Body::Free(body) => body.solve(dt),
            Body::BoneBound(bound) => bound.solve(dt),
        }
    }

    /// Velocity update phase.
    pub fn post_solve(&mut self, dt: f32) {
        self.deformable_mut().post_solve(dt);
    }
}

impl From<DeformableBody> for Body {
    fn from(body: DeformableBody) -> Self {
        Body::Free(body)
    }
}

impl From<BoneBoundBody> for Body {
    fn from(bound: BoneBoundBody) -> Self {
        Body::BoneBound(bound)
    }
}

/// Simulation context: every body plus the tunables that drive them.
#[derive(Clone, Debug, Default)]
pub struct Simulation {
    /// Settings read at the start of every frame.
    pub params: SimulationParams,
    bodies: Vec<Body>,
    time: f32,
}

impl Simulation {
    /// Create an empty simulation.
    #[must_use]
    pub fn new(params: SimulationParams) -> Self {
        Self {
            params,
            bodies: Vec::new(),
            time: 0.0,
        }
    }

    /// Build a free body from `desc` and add it.
    ///
    /// # Errors
    /// Fails if the mesh is invalid; existing bodies are left untouched.
    pub fn spawn(&mut self, desc: &TetMeshDescriptor, params: BodyParams) -> Result<BodyId, SpawnError> {
        let body = DeformableBody::new(desc, params)?;
        Ok(self.add_body(body))
    }

    /// Build a body from `desc`, bind it to `chain` in its current pose and add it.
    ///
    /// # Errors
    /// Fails if the mesh is invalid or the chain has no bones.
    pub fn spawn_bone_bound(
        &mut self,
        desc: &TetMeshDescriptor,
        params: BodyParams,
        chain: BoneChain,
    ) -> Result<BodyId, SpawnError> {
        let body = DeformableBody::new(desc, params)?;
        let bound = BoneBoundBody::new(body, chain)?;
        Ok(self.add_body(bound))
    }

    /// Add an already built body.
    pub fn add_body(&mut self, body: impl Into<Body>) -> BodyId {
        let id = BodyId(self.bodies.len());
        self.bodies.push(body.into());
        debug!(body = id.index(), "Body added");
        id
    }

    /// Every body, in insertion order.
    #[must_use]
    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    /// Every body, mutably. Bodies can be retuned but not removed.
    pub fn bodies_mut(&mut self) -> &mut [Body] {
        &mut self.bodies
    }

    /// Number of bodies.
    #[must_use]
    pub fn num_bodies(&self) -> usize {
        self.bodies.len()
    }

    /// Look up a body.
    #[must_use]
    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(id.0)
    }

    /// Look up a body mutably.
    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        self.bodies.get_mut(id.0)
    }

    /// Simulated time, advanced by `dt` every unpaused frame.
    #[must_use]
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Total kinetic energy of every body.
    #[must_use]
    pub fn kinetic_energy(&self) -> f32 {
        self.bodies.iter().map(|b| b.deformable().kinetic_energy()).sum()
    }

    /// Advance one frame. Returns `false` without doing anything while paused.
    pub fn step(&mut self) -> bool {
        if self.params.paused {
            return false;
        }

        let sdt = self.params.substep_dt();
        let gravity = self.params.gravity;
        self.time += self.params.dt;

        if self.params.animate_bones {
            for body in &mut self.bodies {
                body.animate(self.time);
            }
        }

        for _ in 0..self.params.substeps() {
            for body in &mut self.bodies {
                body.pre_solve(sdt, gravity);
            }
            for body in &mut self.bodies {
                body.solve(sdt);
            }
            for body in &mut self.bodies {
                body.post_solve(sdt);
            }
        }
        true
    }

    /// Nearest hit of `ray` over every body's surface.
    #[must_use]
    pub fn raycast(&self, ray: &Ray) -> Option<RayHit> {
        self.bodies
            .iter()
            .enumerate()
            .filter_map(|(i, body)| {
                raycast_body(body.deformable(), ray).map(|distance| RayHit {
                    body: BodyId(i),
                    distance,
                })
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    /// Grab the particle of body `id` nearest to `point`.
    pub fn start_grab(&mut self, id: BodyId, point: Vec3) {
        match self.body_mut(id) {
            Some(body) => body.deformable_mut().start_grab(point),
            None => warn!(body = id.index(), "Grab on unknown body ignored"),
        }
    }

    /// Drive the grabbed particle of body `id`.
    pub fn move_grabbed(&mut self, id: BodyId, point: Vec3) {
        if let Some(body) = self.body_mut(id) {
            body.deformable_mut().move_grabbed(point);
        }
    }

    /// Release the grabbed particle of body `id` with `velocity`.
    pub fn end_grab(&mut self, id: BodyId, velocity: Vec3) {
        if let Some(body) = self.body_mut(id) {
            body.deformable_mut().end_grab(velocity);
        }
    }
}
