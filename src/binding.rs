//! Binding of body particles to the nearest bone of a skeleton.
//!
//! Each particle is assigned one bone at setup and keeps it. Every substep the
//! particle is pulled back to its rest distance from that bone's current pose
//! with a compliant [`AnchorDistance`] constraint.

use tracing::{debug, info};

use crate::body::DeformableBody;
use crate::constraint::{alpha, solve_constraint, AnchorDistance};
use crate::error::BindingError;
use crate::rig::{BoneChain, Skeleton};
use crate::vecmath;

/// Nearest-bone assignment and rest distance per particle.
#[derive(Clone, Debug, PartialEq)]
pub struct BoneBinding {
    bones: Vec<usize>,
    rest_distances: Vec<f32>,
}

impl BoneBinding {
    /// Bind every particle of `body` to the closest segment of `skeleton` in
    /// its current pose.
    ///
    /// # Errors
    /// [`BindingError::NoSegments`] if the skeleton is empty.
    #[tracing::instrument(skip_all, fields(particles = body.num_particles(), segments = skeleton.num_segments()))]
    pub fn setup<S: Skeleton + ?Sized>(body: &DeformableBody, skeleton: &S) -> Result<Self, BindingError> {
        let num_segments = skeleton.num_segments();
        if num_segments == 0 {
            return Err(BindingError::NoSegments);
        }

        let segments: Vec<_> = (0..num_segments).map(|j| skeleton.segment(j)).collect();
        let mut bones = Vec::with_capacity(body.num_particles());
        let mut rest_distances = Vec::with_capacity(body.num_particles());

        for i in 0..body.num_particles() {
            let p = body.position(i);
            let mut min_d2 = f32::MAX;
            let mut bone = 0;
            for (j, segment) in segments.iter().enumerate() {
                let d2 = segment.project(p).distance_squared(p);
                if d2 < min_d2 {
                    min_d2 = d2;
                    bone = j;
                }
            }
            bones.push(bone);
            rest_distances.push(min_d2.sqrt());
        }

        debug!("Bound particles to nearest bones");
        Ok(Self { bones, rest_distances })
    }

    /// Number of bound particles.
    #[must_use]
    pub fn num_particles(&self) -> usize {
        self.bones.len()
    }

    /// Bone index assigned to particle `i`.
    #[must_use]
    pub fn bone(&self, i: usize) -> usize {
        self.bones[i]
    }

    /// Distance particle `i` keeps from its bone.
    #[must_use]
    pub fn rest_distance(&self, i: usize) -> f32 {
        self.rest_distances[i]
    }

    /// One binding pass over every particle with nonzero inverse mass.
    ///
    /// A compliance of 0 leaves the denominator at 0 and the pass does nothing.
    ///
    /// # Errors
    /// Fails if `body` or `skeleton` do not match the ones used at setup.
    pub fn solve<S: Skeleton + ?Sized>(
        &self,
        body: &mut DeformableBody,
        skeleton: &S,
        compliance: f32,
        dt: f32,
    ) -> Result<(), BindingError> {
        if self.num_particles() != body.num_particles() {
            return Err(BindingError::ParticleCountMismatch {
                binding: self.num_particles(),
                body: body.num_particles(),
            });
        }
        if let Some(&required) = self.bones.iter().max() {
            if required >= skeleton.num_segments() {
                return Err(BindingError::MissingSegment {
                    required,
                    available: skeleton.num_segments(),
                });
            }
        }
        self.project(body, skeleton, compliance, dt);
        Ok(())
    }

    fn project<S: Skeleton + ?Sized>(&self, body: &mut DeformableBody, skeleton: &S, compliance: f32, dt: f32) {
        let alpha = alpha(compliance, dt);
        let (positions, inv_mass) = body.constraint_buffers();
        for (i, (&bone, &rest_distance)) in self.bones.iter().zip(&self.rest_distances).enumerate() {
            let target = skeleton.segment(bone).project(vecmath::get(positions, i));
            let anchor = AnchorDistance {
                id: i,
                target: target.to_array(),
                rest_distance,
            };
            solve_constraint(&anchor, alpha, positions, inv_mass);
        }
    }
}

/// A deformable body whose particles follow a bone chain.
#[derive(Clone, Debug)]
pub struct BoneBoundBody {
    body: DeformableBody,
    binding: BoneBinding,
    chain: BoneChain,
    /// Compliance of the bone binding, starts out equal to the edge compliance.
    pub binding_compliance: f32,
}

impl BoneBoundBody {
    /// Bind `body` to `chain` in the chain's current pose.
    ///
    /// # Errors
    /// Fails if the chain has no segments.
    pub fn new(body: DeformableBody, chain: BoneChain) -> Result<Self, BindingError> {
        let binding = BoneBinding::setup(&body, &chain)?;
        let binding_compliance = body.params.edge_compliance;
        info!(
            particles = body.num_particles(),
            bones = chain.num_segments(),
            "Created bone bound body"
        );
        Ok(Self {
            body,
            binding,
            chain,
            binding_compliance,
        })
    }

    /// The underlying soft body.
    #[must_use]
    pub fn body(&self) -> &DeformableBody {
        &self.body
    }

    /// The underlying soft body, mutably.
    pub fn body_mut(&mut self) -> &mut DeformableBody {
        &mut self.body
    }

    /// The driving chain.
    #[must_use]
    pub fn chain(&self) -> &BoneChain {
        &self.chain
    }

    /// The driving chain, mutably. Bone assignments are not recomputed.
    pub fn chain_mut(&mut self) -> &mut BoneChain {
        &mut self.chain
    }

    /// Particle to bone assignment.
    #[must_use]
    pub fn binding(&self) -> &BoneBinding {
        &self.binding
    }

    /// Pose the chain for animation time `time`.
    pub fn animate(&mut self, time: f32) {
        self.chain.animate(time);
    }

    /// Binding pass, then edges, then volumes.
    pub fn solve(&mut self, dt: f32) {
        self.binding
            .project(&mut self.body, &self.chain, self.binding_compliance, dt);
        self.body.solve(dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyParams;
    use crate::mesh::TetMeshDescriptor;
    use crate::rig::BoneSegment;
    use approx::assert_abs_diff_eq;
    use glam::Vec3;

    fn points(vertices: Vec<f32>) -> DeformableBody {
        let desc = TetMeshDescriptor {
            vertices,
            ..TetMeshDescriptor::default()
        };
        let mut body = DeformableBody::new(&desc, BodyParams::default()).unwrap();
        for i in 0..body.num_particles() {
            body.set_inverse_mass(i, 1.0);
        }
        body
    }

    fn vertical(x: f32) -> Vec<BoneSegment> {
        vec![
            BoneSegment {
                start: Vec3::new(x, 0.0, 0.0),
                end: Vec3::new(x, 1.0, 0.0),
            },
            BoneSegment {
                start: Vec3::new(x, 1.0, 0.0),
                end: Vec3::new(x, 2.0, 0.0),
            },
        ]
    }

    #[test]
    fn test_setup_picks_nearest_bone() {
        let body = points(vec![0.5, 0.25, 0.0, 0.3, 1.8, 0.0, 0.0, 3.0, 0.0]);
        let binding = BoneBinding::setup(&body, &vertical(0.0)).unwrap();
        assert_eq!(binding.bone(0), 0);
        assert_eq!(binding.bone(1), 1);
        assert_eq!(binding.bone(2), 1);
        assert_abs_diff_eq!(binding.rest_distance(0), 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(binding.rest_distance(1), 0.3, epsilon = 1e-6);
        // Past the end of the last bone, measured to its tip.
        assert_abs_diff_eq!(binding.rest_distance(2), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_setup_rejects_empty_skeleton() {
        let body = points(vec![0.0; 3]);
        let empty: Vec<BoneSegment> = Vec::new();
        assert_eq!(BoneBinding::setup(&body, &empty), Err(BindingError::NoSegments));
    }

    #[test]
    fn test_solve_follows_moved_bone() {
        let mut body = points(vec![0.5, 0.5, 0.0]);
        let binding = BoneBinding::setup(&body, &vertical(0.0)).unwrap();

        // alpha = 1, the particle lands exactly at its rest distance.
        binding.solve(&mut body, &vertical(-1.0), 1.0, 1.0).unwrap();
        assert_abs_diff_eq!(body.position(0).x, -0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(body.position(0).y, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_solve_skips_pinned_and_rigid() {
        let mut body = points(vec![0.5, 0.5, 0.0, 0.25, 1.5, 0.0]);
        let binding = BoneBinding::setup(&body, &vertical(0.0)).unwrap();
        body.set_inverse_mass(0, 0.0);
        let before = body.positions().to_vec();

        binding.solve(&mut body, &vertical(-1.0), 0.0, 1.0).unwrap();
        assert_eq!(body.positions(), before.as_slice());

        binding.solve(&mut body, &vertical(-1.0), 1.0, 1.0).unwrap();
        assert_eq!(&body.positions()[..3], &before[..3]);
        assert!(body.position(1).x < before[3]);
    }

    #[test]
    fn test_solve_rejects_mismatched_inputs() {
        let mut body = points(vec![0.5, 1.5, 0.0]);
        let binding = BoneBinding::setup(&body, &vertical(0.0)).unwrap();

        let short = vec![vertical(0.0)[0]];
        assert_eq!(
            binding.solve(&mut body, &short, 1.0, 1.0),
            Err(BindingError::MissingSegment { required: 1, available: 1 })
        );

        let mut other = points(vec![0.0; 6]);
        assert_eq!(
            binding.solve(&mut other, &vertical(0.0), 1.0, 1.0),
            Err(BindingError::ParticleCountMismatch { binding: 1, body: 2 })
        );
    }

    #[test]
    fn test_bone_bound_body_solves_binding_first() {
        let desc = TetMeshDescriptor::box_grid(Vec3::new(-0.25, 0.0, -0.25), Vec3::new(0.5, 2.0, 0.5), [1, 4, 1]);
        let body = DeformableBody::new(&desc, BodyParams::default()).unwrap();
        let chain = BoneChain::new(Vec3::ZERO, 0.5, 4);
        let mut bound = BoneBoundBody::new(body, chain).unwrap();
        assert_abs_diff_eq!(bound.binding_compliance, 50.0);

        let dt = 1.0 / 300.0;
        bound.binding_compliance = dt * dt;
        bound.chain_mut().set_angle(0, 0.5);

        let mut expected = bound.body().clone();
        bound
            .binding()
            .solve(&mut expected, bound.chain(), bound.binding_compliance, dt)
            .unwrap();
        let tip_x: f32 = (0..expected.num_particles())
            .filter(|&i| desc.vertices[3 * i + 1] == 2.0)
            .map(|i| expected.position(i).x)
            .sum();
        expected.solve(dt);

        bound.solve(dt);
        assert_eq!(bound.body().positions(), expected.positions());
        assert!(tip_x < 0.0, "tip should follow the bent chain, got {tip_x}");
    }
}
