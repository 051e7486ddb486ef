//! Topology types and helpers shared by the mesh descriptor and the bodies.

use std::collections::HashSet;
use std::hash::Hash;

use glam::Vec3;
use tracing::{debug, warn};

use crate::vecmath::{self, Vec3Buffer};

/// For local vertex `j` of a tetrahedron, the three local vertices of the
/// opposite face, wound so that `(b - a) × (c - a)` points towards `j`
/// for a positively oriented tet.
pub const TET_FACES: [[usize; 3]; 4] = [[1, 3, 2], [0, 2, 3], [0, 3, 1], [0, 1, 2]];

/// A distance constraint between two particles.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Edge {
    /// Particle indices, unordered.
    pub ids: [usize; 2],
    /// Distance between the particles at construction time.
    pub rest_length: f32,
}

impl Edge {
    /// Build an edge and measure its rest length on `positions`.
    #[must_use]
    pub fn measure(ids: [usize; 2], positions: &[f32]) -> Self {
        Self {
            ids,
            rest_length: vecmath::dist_squared(positions, ids[0], positions, ids[1]).sqrt(),
        }
    }

    /// Order independent key, `(min, max)`.
    #[must_use]
    pub fn key(&self) -> (usize, usize) {
        edge_key(self.ids[0], self.ids[1])
    }
}

/// A volume constraint over four particles.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Tetrahedron {
    /// Particle indices in the order given by the mesh.
    pub ids: [usize; 4],
    /// Signed volume at construction time.
    pub rest_volume: f32,
}

impl Tetrahedron {
    /// Build a tetrahedron and measure its rest volume on `positions`.
    #[must_use]
    pub fn measure(ids: [usize; 4], positions: &[f32]) -> Self {
        Self {
            ids,
            rest_volume: tet_volume(positions, ids),
        }
    }
}

/// Order independent key for an undirected edge.
#[must_use]
pub fn edge_key(a: usize, b: usize) -> (usize, usize) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Signed volume `((p1 - p0) × (p2 - p0)) · (p3 - p0) / 6`.
#[must_use]
pub fn tet_volume(positions: &[f32], ids: [usize; 4]) -> f32 {
    let mut temp = [0.0; 9];
    vecmath::set_diff(&mut temp, 0, positions, ids[1], positions, ids[0], 1.0);
    vecmath::set_diff(&mut temp, 1, positions, ids[2], positions, ids[0], 1.0);
    vecmath::set_diff(&mut temp, 2, positions, ids[3], positions, ids[0], 1.0);
    let cross = vecmath::cross(&temp, 0, &temp, 1);
    vecmath::dot(&cross, 0, &temp, 2) / 6.0
}

/// Drop repeated items (by `key`), keeping the first occurrence and the
/// original order.
#[tracing::instrument(skip(items, key), fields(original_count = items.len()))]
pub fn dedup_with_warning<T, K, F>(items: Vec<T>, key: F, item_name: &str) -> Vec<T>
where
    K: Hash + Eq,
    F: Fn(&T) -> K,
{
    let original_count = items.len();
    let mut seen = HashSet::with_capacity(original_count);

    let deduped: Vec<T> = items
        .into_iter()
        .filter(|item| seen.insert(key(item)))
        .collect();

    let duplicate_count = original_count - deduped.len();
    if duplicate_count > 0 {
        warn!("Found {} duplicate {} constraints", duplicate_count, item_name);
    } else {
        debug!("No duplicate {} constraints found", item_name);
    }

    deduped
}

/// A convenience trait to aggregate "spatial" operations on collections of points.
/// This trait is not intended to be replete with all possible spatial operations, but is instead a conservative interface.
pub trait Spatial {
    /// Translate all points by a vector.
    fn translate(&mut self, by: Vec3);

    /// Get bounding box of the points as (min, max) corners.
    fn bounding_box(&self) -> (Vec3, Vec3);
}

impl Spatial for Vec3Buffer {
    fn translate(&mut self, by: Vec3) {
        let by = by.to_array();
        for nr in 0..self.count() {
            vecmath::add(self, nr, &by, 0, 1.0);
        }
    }

    fn bounding_box(&self) -> (Vec3, Vec3) {
        if self.count() == 0 {
            return (Vec3::ZERO, Vec3::ZERO);
        }

        self.iter().fold(
            (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
            |(min, max), p| (min.min(p), max.max(p)),
        )
    }
}
