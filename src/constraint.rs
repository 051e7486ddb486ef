//! XPBD constraint projection shared by every constraint type.
//!
//! A constraint supplies its value and gradients. [`solve_constraint`] owns the
//! compliance-scaled multiplier step and every degeneracy skip.

use crate::mesh::{Edge, Tetrahedron, TET_FACES};
use crate::vecmath;

/// Constraint value `C` together with one gradient per participant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Gradient<const N: usize> {
    /// Current constraint value, zero when satisfied.
    pub value: f32,
    /// `∂C/∂x_k`, one 3-vector per participant.
    pub grads: [[f32; 3]; N],
}

/// A positional constraint over `N` particles.
pub trait Constraint<const N: usize> {
    /// Particle indices taking part, in gradient order.
    fn ids(&self) -> [usize; N];

    /// Value and gradients at `positions`, or `None` when the gradient
    /// direction is undefined (coincident points).
    fn gradient(&self, positions: &[f32]) -> Option<Gradient<N>>;

    /// Generalized inverse mass `Σ w_k |∇_k C|²`.
    fn generalized_mass(&self, inv_mass: &[f32], gradient: &Gradient<N>) -> f32 {
        let grads = gradient.grads.as_flattened();
        self.ids()
            .iter()
            .enumerate()
            .map(|(k, &id)| inv_mass[id] * vecmath::length_squared(grads, k))
            .sum()
    }

    /// Scale applied to participant `slot`'s correction, its inverse mass by default.
    fn correction_weight(&self, inv_mass: &[f32], slot: usize) -> f32 {
        inv_mass[self.ids()[slot]]
    }
}

/// Project one constraint with compliance `alpha = compliance / dt²`.
///
/// Skips (returns `None`, touching nothing) when every participant has zero
/// inverse mass, when the gradient is undefined, or when `w + alpha` is zero.
/// Otherwise applies `x_k += ∇_k C · s · weight_k` and returns the multiplier
/// step `s = -C / (w + alpha)`.
pub fn solve_constraint<const N: usize, C>(
    constraint: &C,
    alpha: f32,
    positions: &mut [f32],
    inv_mass: &[f32],
) -> Option<f32>
where
    C: Constraint<N> + ?Sized,
{
    let ids = constraint.ids();
    if ids.iter().all(|&id| inv_mass[id] == 0.0) {
        return None;
    }

    let gradient = constraint.gradient(positions)?;
    let w = constraint.generalized_mass(inv_mass, &gradient);
    let denominator = w + alpha;
    if denominator == 0.0 {
        return None;
    }

    let s = -gradient.value / denominator;
    let grads = gradient.grads.as_flattened();
    for (k, &id) in ids.iter().enumerate() {
        vecmath::add(positions, id, grads, k, s * constraint.correction_weight(inv_mass, k));
    }
    Some(s)
}

/// XPBD compliance term for one substep.
#[inline]
#[must_use]
pub fn alpha(compliance: f32, dt: f32) -> f32 {
    compliance / dt / dt
}

impl Constraint<2> for Edge {
    fn ids(&self) -> [usize; 2] {
        self.ids
    }

    fn gradient(&self, positions: &[f32]) -> Option<Gradient<2>> {
        let [id0, id1] = self.ids;
        let mut n = [0.0; 3];
        vecmath::set_diff(&mut n, 0, positions, id0, positions, id1, 1.0);
        let len = vecmath::length_squared(&n, 0).sqrt();
        if len == 0.0 {
            return None;
        }
        vecmath::scale(&mut n, 0, 1.0 / len);
        Some(Gradient {
            value: len - self.rest_length,
            grads: [n, n.map(|x| -x)],
        })
    }

    fn generalized_mass(&self, inv_mass: &[f32], _gradient: &Gradient<2>) -> f32 {
        inv_mass[self.ids[0]] + inv_mass[self.ids[1]]
    }
}

impl Constraint<4> for Tetrahedron {
    fn ids(&self) -> [usize; 4] {
        self.ids
    }

    fn gradient(&self, positions: &[f32]) -> Option<Gradient<4>> {
        let mut grads = [[0.0; 3]; 4];
        let mut temp = [0.0; 6];
        for (grad, face) in grads.iter_mut().zip(TET_FACES) {
            let [a, b, c] = face.map(|local| self.ids[local]);
            vecmath::set_diff(&mut temp, 0, positions, b, positions, a, 1.0);
            vecmath::set_diff(&mut temp, 1, positions, c, positions, a, 1.0);
            vecmath::set_cross(grad, 0, &temp, 0, &temp, 1);
            vecmath::scale(grad, 0, 1.0 / 6.0);
        }
        Some(Gradient {
            value: crate::mesh::tet_volume(positions, self.ids) - self.rest_volume,
            grads,
        })
    }
}

/// Distance constraint from one particle to a fixed external point.
///
/// The anchor is treated as infinitely heavy and contributes no mass term, so
/// the step is `s = -C / alpha` and the particle moves by `∇C · s`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnchorDistance {
    /// The bound particle.
    pub id: usize,
    /// Anchor position for this substep.
    pub target: [f32; 3],
    /// Distance the particle should keep from the anchor.
    pub rest_distance: f32,
}

impl Constraint<1> for AnchorDistance {
    fn ids(&self) -> [usize; 1] {
        [self.id]
    }

    fn gradient(&self, positions: &[f32]) -> Option<Gradient<1>> {
        let mut n = [0.0; 3];
        vecmath::set_diff(&mut n, 0, positions, self.id, &self.target, 0, 1.0);
        let len = vecmath::length_squared(&n, 0).sqrt();
        if len == 0.0 {
            return None;
        }
        vecmath::scale(&mut n, 0, 1.0 / len);
        Some(Gradient {
            value: len - self.rest_distance,
            grads: [n],
        })
    }

    fn generalized_mass(&self, _inv_mass: &[f32], _gradient: &Gradient<1>) -> f32 {
        0.0
    }

    fn correction_weight(&self, _inv_mass: &[f32], _slot: usize) -> f32 {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::tet_volume;
    use approx::assert_abs_diff_eq;

    fn distance(pos: &[f32], a: usize, b: usize) -> f32 {
        vecmath::dist_squared(pos, a, pos, b).sqrt()
    }

    #[test]
    fn test_edge_rigid_projection_is_exact_and_symmetric() {
        let mut pos = vec![0.0, 0.0, 0.0, 2.0, 0.0, 0.0];
        let inv_mass = [1.0, 1.0];
        let edge = Edge { ids: [0, 1], rest_length: 1.0 };

        let s = solve_constraint(&edge, 0.0, &mut pos, &inv_mass);
        assert!(s.is_some());
        assert_abs_diff_eq!(distance(&pos, 0, 1), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(pos[0], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(pos[3], 1.5, epsilon = 1e-6);
    }

    #[test]
    fn test_edge_weighted_by_inverse_mass() {
        let mut pos = vec![0.0, 0.0, 0.0, 2.0, 0.0, 0.0];
        let inv_mass = [0.0, 1.0];
        let edge = Edge { ids: [0, 1], rest_length: 1.0 };

        solve_constraint(&edge, 0.0, &mut pos, &inv_mass);
        assert_eq!(&pos[..3], &[0.0, 0.0, 0.0]);
        assert_abs_diff_eq!(pos[3], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_edge_compliance_softens_correction() {
        let mut pos = vec![0.0, 0.0, 0.0, 2.0, 0.0, 0.0];
        let inv_mass = [1.0, 1.0];
        let edge = Edge { ids: [0, 1], rest_length: 1.0 };

        solve_constraint(&edge, alpha(1.0, 1.0), &mut pos, &inv_mass);
        let len = distance(&pos, 0, 1);
        assert!(len > 1.0 && len < 2.0);
        // s = -1 / (2 + 1), each endpoint moves by 1/3.
        assert_abs_diff_eq!(len, 2.0 - 2.0 / 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_pinned_participants_are_untouched() {
        let mut pos = vec![0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 3.0, 0.0, 0.0, 0.0, 5.0];
        let before = pos.clone();
        let inv_mass = [0.0; 4];

        let edge = Edge { ids: [0, 1], rest_length: 1.0 };
        let tet = Tetrahedron { ids: [0, 1, 2, 3], rest_volume: 1.0 };
        assert!(solve_constraint(&edge, 0.0, &mut pos, &inv_mass).is_none());
        assert!(solve_constraint(&tet, 0.0, &mut pos, &inv_mass).is_none());
        assert_eq!(pos, before);
    }

    #[test]
    fn test_coincident_edge_is_skipped() {
        let mut pos = vec![1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        let edge = Edge { ids: [0, 1], rest_length: 1.0 };
        assert!(solve_constraint(&edge, 0.0, &mut pos, &[1.0, 1.0]).is_none());
        assert!(pos.iter().all(|&x| x == 1.0));
    }

    #[test]
    fn test_volume_gradient_matches_face_normals() {
        let pos = vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let tet = Tetrahedron { ids: [0, 1, 2, 3], rest_volume: 1.0 / 6.0 };
        let g = tet.gradient(&pos).unwrap();
        assert_abs_diff_eq!(g.value, 0.0, epsilon = 1e-7);
        assert_eq!(g.grads[3], [0.0, 0.0, 1.0 / 6.0]);
        // Gradients of a translation invariant quantity sum to zero.
        for axis in 0..3 {
            let sum: f32 = g.grads.iter().map(|v| v[axis]).sum();
            assert_abs_diff_eq!(sum, 0.0, epsilon = 1e-7);
        }
    }

    #[test]
    fn test_inverted_tet_recovers_signed_rest_volume() {
        let rest = vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let tet = Tetrahedron::measure([0, 1, 2, 3], &rest);
        let inv_mass = [1.0; 4];

        let mut pos = rest.clone();
        pos[11] = -0.5;
        let initial_error = (tet_volume(&pos, tet.ids) - tet.rest_volume).abs();

        for _ in 0..50 {
            solve_constraint(&tet, 0.0, &mut pos, &inv_mass);
        }
        let error = (tet_volume(&pos, tet.ids) - tet.rest_volume).abs();
        assert!(error < 1e-3 * initial_error, "error {error} from {initial_error}");
        assert!(tet_volume(&pos, tet.ids) > 0.0);
    }

    #[test]
    fn test_anchor_moves_particle_by_compliance() {
        let mut pos = vec![2.0, 0.0, 0.0];
        let anchor = AnchorDistance { id: 0, target: [0.0; 3], rest_distance: 1.0 };

        let s = solve_constraint(&anchor, 2.0, &mut pos, &[1.0]).unwrap();
        assert_abs_diff_eq!(s, -0.5, epsilon = 1e-7);
        assert_abs_diff_eq!(pos[0], 1.5, epsilon = 1e-7);
    }

    #[test]
    fn test_rigid_anchor_is_skipped() {
        let mut pos = vec![2.0, 0.0, 0.0];
        let anchor = AnchorDistance { id: 0, target: [0.0; 3], rest_distance: 1.0 };
        assert!(solve_constraint(&anchor, 0.0, &mut pos, &[1.0]).is_none());
        assert!(solve_constraint(&anchor, 1.0, &mut pos, &[0.0]).is_none());
        assert_eq!(pos, vec![2.0, 0.0, 0.0]);
    }
}
