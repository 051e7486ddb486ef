//! Embedding of a render mesh into the tetrahedra of a body.
//!
//! Every visual vertex is expressed in barycentric coordinates of the tet that
//! contains it (or the one it is least outside of), so the visual mesh follows
//! the simulated particles with four multiply-adds per vertex.

use glam::{Mat3, Vec3};
use tracing::{debug, warn};

use crate::body::DeformableBody;
use crate::error::{MeshError, MeshResult};
use crate::spatial_hash::SpatialHash;
use crate::vecmath::{self, inverse_or_zero};

const HASH_SPACING: f32 = 0.05;
const BORDER: f32 = 0.05;

/// Tet and the first three barycentric weights of one visual vertex.
/// The fourth weight is `1 - b0 - b1 - b2`.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SkinWeight {
    /// Index into the body's tetrahedra.
    pub tet: usize,
    /// Weights of the tet's first three corners.
    pub bary: [f32; 3],
}

impl SkinWeight {
    /// All four weights.
    #[must_use]
    pub fn weights(&self) -> [f32; 4] {
        let [b0, b1, b2] = self.bary;
        [b0, b1, b2, 1.0 - b0 - b1 - b2]
    }
}

/// Skinning table for one visual mesh.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VisualSkin {
    weights: Vec<Option<SkinWeight>>,
}

impl VisualSkin {
    /// Bind `visual_vertices` (flat `xyz`) to the current tets of `body`.
    ///
    /// Vertices farther than a small border from every tet stay unbound.
    ///
    /// # Errors
    /// [`MeshError::BadLength`] if the vertex buffer is not a whole number of points.
    #[tracing::instrument(skip_all, fields(visual_vertices = visual_vertices.len() / 3, tets = body.tetrahedra().len()))]
    pub fn new(body: &DeformableBody, visual_vertices: &[f32]) -> MeshResult<Self> {
        if visual_vertices.len() % 3 != 0 {
            return Err(MeshError::BadLength {
                array: "visual vertices",
                len: visual_vertices.len(),
                stride: 3,
            });
        }

        let num_vis = visual_vertices.len() / 3;
        let mut hash = SpatialHash::new(HASH_SPACING, num_vis);
        hash.create(visual_vertices);

        let positions = body.positions();
        let mut weights = vec![None; num_vis];
        let mut min_dist = vec![f32::MAX; num_vis];

        for (nr, tet) in body.tetrahedra().iter().enumerate() {
            let corners = tet.ids.map(|id| vecmath::get(positions, id));
            let center = corners.iter().copied().sum::<Vec3>() * 0.25;
            let r_max = corners
                .iter()
                .map(|c| c.distance(center))
                .fold(0.0, f32::max)
                + BORDER;

            let candidates = hash.query(center, r_max);
            if candidates.is_empty() {
                continue;
            }

            let [x0, x1, x2, x3] = corners;
            let inv = inverse_or_zero(Mat3::from_cols(x0 - x3, x1 - x3, x2 - x3));

            for &id in candidates {
                if min_dist[id] <= 0.0 {
                    continue;
                }
                let v = vecmath::get(visual_vertices, id);
                if v.distance_squared(center) > r_max * r_max {
                    continue;
                }

                let b = inv * (v - x3);
                let bary = [b.x, b.y, b.z, 1.0 - b.x - b.y - b.z];
                let dist = bary.iter().fold(0.0_f32, |d, &bk| d.max(-bk));
                if dist < min_dist[id] {
                    min_dist[id] = dist;
                    weights[id] = Some(SkinWeight {
                        tet: nr,
                        bary: [b.x, b.y, b.z],
                    });
                }
            }
        }

        let skin = Self { weights };
        let unbound = num_vis - skin.num_bound();
        if unbound > 0 {
            warn!(unbound, "Visual vertices outside every tetrahedron");
        }
        debug!(bound = skin.num_bound(), "Computed skinning info");
        Ok(skin)
    }

    /// Number of visual vertices covered by the table.
    #[must_use]
    pub fn num_vertices(&self) -> usize {
        self.weights.len()
    }

    /// Number of bound visual vertices.
    #[must_use]
    pub fn num_bound(&self) -> usize {
        self.weights.iter().flatten().count()
    }

    /// Binding of visual vertex `i`.
    #[must_use]
    pub fn weight(&self, i: usize) -> Option<SkinWeight> {
        self.weights[i]
    }

    /// Write the skinned position of every bound vertex into `out`.
    /// Unbound vertices are left as they are.
    pub fn update(&self, body: &DeformableBody, out: &mut [f32]) {
        let positions = body.positions();
        let tets = body.tetrahedra();
        for (i, weight) in self.weights.iter().enumerate() {
            let Some(weight) = weight else { continue };
            let ids = tets[weight.tet].ids;
            vecmath::set_zero(out, i);
            for (&id, b) in ids.iter().zip(weight.weights()) {
                vecmath::add(out, i, positions, id, b);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyParams;
    use crate::mesh::TetMeshDescriptor;
    use approx::assert_abs_diff_eq;

    fn unit_body() -> DeformableBody {
        DeformableBody::new(&TetMeshDescriptor::unit_tetrahedron(), BodyParams::default()).unwrap()
    }

    fn assert_points_eq(a: &[f32], b: &[f32]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_interior_points_are_reproduced() {
        let body = unit_body();
        let visual = vec![0.25, 0.25, 0.25, 0.1, 0.2, 0.3];
        let skin = VisualSkin::new(&body, &visual).unwrap();
        assert_eq!(skin.num_bound(), 2);

        let w = skin.weight(0).unwrap();
        assert_eq!(w.tet, 0);
        for b in w.weights() {
            assert_abs_diff_eq!(b, 0.25, epsilon = 1e-6);
        }

        let mut out = vec![0.0; visual.len()];
        skin.update(&body, &mut out);
        assert_points_eq(&out, &visual);
    }

    #[test]
    fn test_skin_follows_translation() {
        let mut body = unit_body();
        let visual = vec![0.1, 0.2, 0.3];
        let skin = VisualSkin::new(&body, &visual).unwrap();

        body.translate(Vec3::new(1.0, 2.0, 3.0));
        let mut out = vec![0.0; 3];
        skin.update(&body, &mut out);
        assert_points_eq(&out, &[1.1, 2.2, 3.3]);
    }

    #[test]
    fn test_skin_follows_squash() {
        let mut body = unit_body();
        let skin = VisualSkin::new(&body, &[0.1, 0.2, 0.3]).unwrap();
        body.squash();
        let mut out = vec![0.0; 3];
        skin.update(&body, &mut out);
        assert_abs_diff_eq!(out[1], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_far_vertices_stay_unbound() {
        let body = unit_body();
        let visual = vec![5.0, 5.0, 5.0];
        let skin = VisualSkin::new(&body, &visual).unwrap();
        assert_eq!(skin.weight(0), None);

        let mut out = visual.clone();
        skin.update(&body, &mut out);
        assert_eq!(out, visual);
    }

    #[test]
    fn test_grid_skinning_picks_containing_tets() {
        let desc = TetMeshDescriptor::box_grid(Vec3::ZERO, Vec3::ONE, [2, 2, 2]);
        let body = DeformableBody::new(&desc, BodyParams::default()).unwrap();
        let visual = vec![
            0.3, 0.6, 0.2, //
            0.9, 0.1, 0.45, //
            0.5, 0.5, 0.5, //
            0.5, 0.5, -0.02, // just below the surface, inside the border
        ];
        let skin = VisualSkin::new(&body, &visual).unwrap();
        assert_eq!(skin.num_bound(), 4);
        for i in 0..3 {
            let w = skin.weight(i).unwrap();
            assert!(w.weights().iter().all(|&b| b >= -1e-5), "vertex {i} not inside {w:?}");
        }

        let mut out = vec![0.0; visual.len()];
        skin.update(&body, &mut out);
        assert_points_eq(&out, &visual);
    }

    #[test]
    fn test_bad_visual_buffer_is_rejected() {
        let body = unit_body();
        assert!(matches!(
            VisualSkin::new(&body, &[0.0; 4]),
            Err(MeshError::BadLength { stride: 3, .. })
        ));
    }
}
