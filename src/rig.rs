//! Bone skeletons that drive bone-bound bodies.

use glam::{Quat, Vec3};
use tracing::debug;

/// A bone as a world space line segment from its parent joint to its own joint.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BoneSegment {
    /// Parent joint position.
    pub start: Vec3,
    /// Joint position.
    pub end: Vec3,
}

impl BoneSegment {
    /// Closest point on the segment to `point`.
    ///
    /// Points behind the start clamp to `start`, points past the end clamp to
    /// `end`, anything in between projects onto the line. A zero length bone
    /// always yields `start`.
    #[must_use]
    pub fn project(&self, point: Vec3) -> Vec3 {
        let bone = self.end - self.start;
        let len_sq = bone.length_squared();
        if len_sq == 0.0 {
            return self.start;
        }

        let t = (point - self.start).dot(bone) / len_sq;
        if t < 0.0 {
            self.start
        } else if t > 1.0 {
            self.end
        } else {
            self.start + bone * t
        }
    }
}

/// Anything that can report its current bone segments in world space.
pub trait Skeleton {
    /// Number of bone segments.
    fn num_segments(&self) -> usize;

    /// Segment `i` in its current pose.
    fn segment(&self, i: usize) -> BoneSegment;
}

impl Skeleton for [BoneSegment] {
    fn num_segments(&self) -> usize {
        self.len()
    }

    fn segment(&self, i: usize) -> BoneSegment {
        self[i]
    }
}

impl Skeleton for Vec<BoneSegment> {
    fn num_segments(&self) -> usize {
        self.len()
    }

    fn segment(&self, i: usize) -> BoneSegment {
        self[i]
    }
}

/// A straight chain of equal bones rooted at `origin`, bending about the z axis.
///
/// Joint 0 sits at the origin; every following joint is offset by
/// `(0, segment_length, 0)` in its parent's frame. Each joint carries one
/// angle, so the chain has `num_segments + 1` angles (the tip angle rotates
/// nothing).
#[derive(Clone, Debug, PartialEq)]
pub struct BoneChain {
    origin: Vec3,
    segment_length: f32,
    angles: Vec<f32>,
    joints: Vec<Vec3>,
}

impl BoneChain {
    /// Build an unbent chain pointing up the y axis.
    #[tracing::instrument]
    #[must_use]
    pub fn new(origin: Vec3, segment_length: f32, num_segments: usize) -> Self {
        let mut chain = Self {
            origin,
            segment_length,
            angles: vec![0.0; num_segments + 1],
            joints: vec![origin; num_segments + 1],
        };
        chain.update_pose();
        debug!(joints = chain.joints.len(), "Bone chain created");
        chain
    }

    /// Joint angles in radians, root first.
    #[must_use]
    pub fn angles(&self) -> &[f32] {
        &self.angles
    }

    /// World space joint positions, root first.
    #[must_use]
    pub fn joints(&self) -> &[Vec3] {
        &self.joints
    }

    /// Total length of the chain.
    #[must_use]
    pub fn length(&self) -> f32 {
        self.segment_length * self.num_segments() as f32
    }

    /// Set the angle of joint `i` and repose the chain.
    pub fn set_angle(&mut self, i: usize, angle: f32) {
        self.angles[i] = angle;
        self.update_pose();
    }

    /// Procedural sway: every joint gets `sin(5 t) * 2 / joint_count`.
    pub fn animate(&mut self, time: f32) {
        let angle = (time * 5.0).sin() * 2.0 / self.angles.len() as f32;
        self.angles.fill(angle);
        self.update_pose();
    }

    fn update_pose(&mut self) {
        let offset = Vec3::new(0.0, self.segment_length, 0.0);
        let mut rotation = Quat::IDENTITY;
        let mut joint = self.origin;
        self.joints[0] = joint;
        for k in 1..self.joints.len() {
            rotation *= Quat::from_rotation_z(self.angles[k - 1]);
            joint += rotation * offset;
            self.joints[k] = joint;
        }
    }
}

impl Skeleton for BoneChain {
    fn num_segments(&self) -> usize {
        self.joints.len() - 1
    }

    fn segment(&self, i: usize) -> BoneSegment {
        BoneSegment {
            start: self.joints[i],
            end: self.joints[i + 1],
        }
    }
}
