//! Deformable tetrahedral body: particle state, XPBD step phases and grabbing.

use glam::Vec3;
use tracing::{debug, warn};

use crate::constraint::{alpha, solve_constraint};
use crate::error::MeshResult;
use crate::mesh::{dedup_with_warning, tet_volume, Edge, Spatial, TetMeshDescriptor, Tetrahedron};
use crate::vecmath::{self, Vec3Buffer};

/// Material parameters of one body.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BodyParams {
    /// Compliance of the edge (distance) constraints. 0 is rigid.
    pub edge_compliance: f32,
    /// Compliance of the volume constraints. 0 is rigid.
    pub volume_compliance: f32,
    /// Velocity scale applied in `post_solve`, 1.0 disables damping.
    pub damping: f32,
}

impl Default for BodyParams {
    fn default() -> Self {
        Self {
            edge_compliance: 50.0,
            volume_compliance: 0.0,
            damping: 1.0,
        }
    }
}

/// A particle held by the user.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Grab {
    particle: usize,
    saved_inv_mass: f32,
}

/// Soft body simulated with edge and volume constraints.
///
/// Topology is fixed at construction. Positions, velocities and inverse masses
/// change every substep and on grab events.
#[derive(Clone, Debug)]
pub struct DeformableBody {
    pos: Vec3Buffer,
    prev_pos: Vec3Buffer,
    vel: Vec3Buffer,
    inv_mass: Vec<f32>,
    tets: Vec<Tetrahedron>,
    edges: Vec<Edge>,
    surface: Vec<[usize; 3]>,
    /// Material parameters, may be retuned between frames.
    pub params: BodyParams,
    grab: Option<Grab>,
}

impl DeformableBody {
    /// Build a body from a mesh description.
    ///
    /// Rest volumes, rest lengths and per-particle inverse masses are computed
    /// here, once. A tet contributes `1 / (volume / 4)` to each of its corners
    /// when its volume is positive and nothing otherwise, so a particle touched
    /// only by degenerate tets ends up pinned.
    ///
    /// # Errors
    /// Returns a [`crate::MeshError`] if the descriptor fails validation.
    #[tracing::instrument(skip(desc), fields(particles = desc.num_particles(), tets = desc.num_tets()))]
    pub fn new(desc: &TetMeshDescriptor, params: BodyParams) -> MeshResult<Self> {
        desc.validate()?;

        let num_particles = desc.num_particles();
        let pos = Vec3Buffer::from_flat(desc.vertices.clone())
            .unwrap_or_else(|| Vec3Buffer::zeros(num_particles));

        let tets: Vec<Tetrahedron> = desc
            .tet_ids
            .chunks_exact(4)
            .map(|t| Tetrahedron::measure([t[0], t[1], t[2], t[3]], &pos))
            .collect();

        let mut inv_mass = vec![0.0; num_particles];
        let mut degenerate = 0usize;
        for tet in &tets {
            let vol = tet.rest_volume;
            let p_inv_mass = if vol > 0.0 {
                1.0 / (vol / 4.0)
            } else {
                degenerate += 1;
                0.0
            };
            for &id in &tet.ids {
                inv_mass[id] += p_inv_mass;
            }
        }

        let pairs: Vec<[usize; 2]> = desc.edge_ids.chunks_exact(2).map(|e| [e[0], e[1]]).collect();
        let edges = dedup_with_warning(pairs, |e| crate::mesh::common::edge_key(e[0], e[1]), "edge")
            .into_iter()
            .map(|ids| Edge::measure(ids, &pos))
            .collect::<Vec<_>>();

        let surface = desc
            .tri_ids
            .chunks_exact(3)
            .map(|t| [t[0], t[1], t[2]])
            .collect();

        if degenerate > 0 {
            warn!(degenerate, "Tetrahedra with non-positive rest volume add no mass");
        }
        let pinned = inv_mass.iter().filter(|&&w| w == 0.0).count();
        if pinned > 0 {
            warn!(pinned, "Particles without positive-volume tets are pinned");
        }
        debug!(edges = edges.len(), "Deformable body initialized");

        Ok(Self {
            prev_pos: pos.clone(),
            vel: Vec3Buffer::zeros(num_particles),
            pos,
            inv_mass,
            tets,
            edges,
            surface,
            params,
            grab: None,
        })
    }

    /// Number of simulated particles.
    #[must_use]
    pub fn num_particles(&self) -> usize {
        self.inv_mass.len()
    }

    /// Live particle positions, flat `xyz` triples, updated in place every substep.
    #[must_use]
    pub fn positions(&self) -> &[f32] {
        &self.pos
    }

    /// Position of particle `i`.
    #[must_use]
    pub fn position(&self, i: usize) -> Vec3 {
        self.pos.vec(i)
    }

    /// Particle velocities, flat `xyz` triples.
    #[must_use]
    pub fn velocities(&self) -> &[f32] {
        &self.vel
    }

    /// Velocity of particle `i`.
    #[must_use]
    pub fn velocity(&self, i: usize) -> Vec3 {
        self.vel.vec(i)
    }

    /// Overwrite the velocity of particle `i`.
    pub fn set_velocity(&mut self, i: usize, v: Vec3) {
        self.vel.set_vec(i, v);
    }

    /// Per-particle inverse masses.
    #[must_use]
    pub fn inverse_masses(&self) -> &[f32] {
        &self.inv_mass
    }

    /// Overwrite the inverse mass of particle `i`. Negative values are clamped to 0.
    pub fn set_inverse_mass(&mut self, i: usize, inv_mass: f32) {
        self.inv_mass[i] = inv_mass.max(0.0);
    }

    /// Edge constraints in solve order.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Volume constraints in solve order.
    #[must_use]
    pub fn tetrahedra(&self) -> &[Tetrahedron] {
        &self.tets
    }

    /// Surface triangles for rendering and picking.
    #[must_use]
    pub fn surface_triangles(&self) -> &[[usize; 3]] {
        &self.surface
    }

    /// Current signed volume of tet `nr`.
    #[must_use]
    pub fn tet_volume(&self, nr: usize) -> f32 {
        tet_volume(&self.pos, self.tets[nr].ids)
    }

    /// Axis aligned bounds of the current positions.
    #[must_use]
    pub fn bounding_box(&self) -> (Vec3, Vec3) {
        self.pos.bounding_box()
    }

    /// Kinetic energy `Σ v² / (2 w)` over particles with nonzero inverse mass.
    #[must_use]
    pub fn kinetic_energy(&self) -> f32 {
        (0..self.num_particles())
            .filter(|&i| self.inv_mass[i] > 0.0)
            .map(|i| 0.5 * vecmath::length_squared(&self.vel, i) / self.inv_mass[i])
            .sum()
    }

    /// Move the whole body, including its previous positions.
    pub fn translate(&mut self, by: Vec3) {
        self.pos.translate(by);
        self.prev_pos.translate(by);
    }

    /// Flatten every particle onto the plane `y = 0.5`.
    pub fn squash(&mut self) {
        for i in 0..self.num_particles() {
            self.pos[3 * i + 1] = 0.5;
        }
    }

    /// Predict positions: integrate gravity into velocity, then velocity into
    /// position, for every particle with nonzero inverse mass.
    ///
    /// A particle predicted below `y = 0` is put back at its previous position
    /// with `y` clamped to exactly 0.
    pub fn pre_solve(&mut self, dt: f32, gravity: Vec3) {
        let gravity = gravity.to_array();
        for i in 0..self.num_particles() {
            if self.inv_mass[i] == 0.0 {
                continue;
            }
            vecmath::add(&mut self.vel, i, &gravity, 0, dt);
            vecmath::copy(&mut self.prev_pos, i, &self.pos, i);
            vecmath::add(&mut self.pos, i, &self.vel, i, dt);
            if self.pos[3 * i + 1] < 0.0 {
                vecmath::copy(&mut self.pos, i, &self.prev_pos, i);
                self.pos[3 * i + 1] = 0.0;
            }
        }
    }

    /// One sweep of edge constraints, then volume constraints.
    pub fn solve(&mut self, dt: f32) {
        self.solve_edges(self.params.edge_compliance, dt);
        self.solve_volumes(self.params.volume_compliance, dt);
    }

    /// Derive velocities from the position change of this substep.
    pub fn post_solve(&mut self, dt: f32) {
        let scale = self.params.damping / dt;
        for i in 0..self.num_particles() {
            if self.inv_mass[i] == 0.0 {
                continue;
            }
            vecmath::set_diff(&mut self.vel, i, &self.pos, i, &self.prev_pos, i, scale);
        }
    }

    /// Project every edge once, in array order.
    pub fn solve_edges(&mut self, compliance: f32, dt: f32) {
        let alpha = alpha(compliance, dt);
        for edge in &self.edges {
            solve_constraint(edge, alpha, &mut self.pos, &self.inv_mass);
        }
    }

    /// Project every tetrahedron's volume once, in array order.
    pub fn solve_volumes(&mut self, compliance: f32, dt: f32) {
        let alpha = alpha(compliance, dt);
        for tet in &self.tets {
            solve_constraint(tet, alpha, &mut self.pos, &self.inv_mass);
        }
    }

    /// Mutable positions together with inverse masses, for external constraint passes.
    pub(crate) fn constraint_buffers(&mut self) -> (&mut [f32], &[f32]) {
        (&mut self.pos, &self.inv_mass)
    }

    /// Index of the grabbed particle, if any.
    #[must_use]
    pub fn grabbed(&self) -> Option<usize> {
        self.grab.map(|g| g.particle)
    }

    /// Grab the particle nearest to `point`.
    ///
    /// The particle becomes kinematic (inverse mass 0) and is snapped to
    /// `point`. A particle still held from an earlier grab gets its inverse
    /// mass back first.
    pub fn start_grab(&mut self, point: Vec3) {
        if let Some(previous) = self.grab.take() {
            debug!(particle = previous.particle, "Releasing stale grab");
            self.inv_mass[previous.particle] = previous.saved_inv_mass;
        }

        let p = point.to_array();
        let mut nearest = None;
        let mut min_d2 = f32::MAX;
        for i in 0..self.num_particles() {
            let d2 = vecmath::dist_squared(&p, 0, &self.pos, i);
            if d2 < min_d2 {
                min_d2 = d2;
                nearest = Some(i);
            }
        }

        if let Some(particle) = nearest {
            self.grab = Some(Grab {
                particle,
                saved_inv_mass: self.inv_mass[particle],
            });
            self.inv_mass[particle] = 0.0;
            vecmath::copy(&mut self.pos, particle, &p, 0);
        }
    }

    /// Drive the grabbed particle to `point`. No-op when nothing is grabbed.
    pub fn move_grabbed(&mut self, point: Vec3) {
        if let Some(grab) = self.grab {
            self.pos.set_vec(grab.particle, point);
        }
    }

    /// Release the grabbed particle with `velocity`. No-op when nothing is grabbed.
    pub fn end_grab(&mut self, velocity: Vec3) {
        if let Some(grab) = self.grab.take() {
            self.inv_mass[grab.particle] = grab.saved_inv_mass;
            self.vel.set_vec(grab.particle, velocity);
        }
    }
}
