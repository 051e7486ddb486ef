//! Vector math on flat, stride-3 `f32` buffers.
//!
//! Every function takes a buffer plus a logical vector index (`nr`), so element
//! `nr` lives at `buf[3 * nr..3 * nr + 3]`. Nothing is copied out of the buffer
//! unless a function returns a value. Out of range indices panic like any
//! slice access.

use std::ops::{Deref, DerefMut};

use glam::{Mat3, Vec3};

/// Set vector `anr` of `a` to zero.
#[inline]
pub fn set_zero(a: &mut [f32], anr: usize) {
    a[3 * anr..3 * anr + 3].fill(0.0);
}

/// Scale vector `anr` of `a` in place.
#[inline]
pub fn scale(a: &mut [f32], anr: usize, scale: f32) {
    for x in &mut a[3 * anr..3 * anr + 3] {
        *x *= scale;
    }
}

/// Copy vector `bnr` of `b` into vector `anr` of `a`.
#[inline]
pub fn copy(a: &mut [f32], anr: usize, b: &[f32], bnr: usize) {
    a[3 * anr..3 * anr + 3].copy_from_slice(&b[3 * bnr..3 * bnr + 3]);
}

/// `a[anr] += b[bnr] * scale`.
#[inline]
pub fn add(a: &mut [f32], anr: usize, b: &[f32], bnr: usize, scale: f32) {
    let (anr, bnr) = (3 * anr, 3 * bnr);
    a[anr] += b[bnr] * scale;
    a[anr + 1] += b[bnr + 1] * scale;
    a[anr + 2] += b[bnr + 2] * scale;
}

/// `dst[dnr] = (a[anr] - b[bnr]) * scale`.
#[inline]
pub fn set_diff(
    dst: &mut [f32],
    dnr: usize,
    a: &[f32],
    anr: usize,
    b: &[f32],
    bnr: usize,
    scale: f32,
) {
    let (dnr, anr, bnr) = (3 * dnr, 3 * anr, 3 * bnr);
    dst[dnr] = (a[anr] - b[bnr]) * scale;
    dst[dnr + 1] = (a[anr + 1] - b[bnr + 1]) * scale;
    dst[dnr + 2] = (a[anr + 2] - b[bnr + 2]) * scale;
}

/// Squared length of vector `anr`.
#[inline]
#[must_use]
pub fn length_squared(a: &[f32], anr: usize) -> f32 {
    let anr = 3 * anr;
    let (a0, a1, a2) = (a[anr], a[anr + 1], a[anr + 2]);
    a0 * a0 + a1 * a1 + a2 * a2
}

/// Squared distance between `a[anr]` and `b[bnr]`.
#[inline]
#[must_use]
pub fn dist_squared(a: &[f32], anr: usize, b: &[f32], bnr: usize) -> f32 {
    let (anr, bnr) = (3 * anr, 3 * bnr);
    let a0 = a[anr] - b[bnr];
    let a1 = a[anr + 1] - b[bnr + 1];
    let a2 = a[anr + 2] - b[bnr + 2];
    a0 * a0 + a1 * a1 + a2 * a2
}

/// Dot product of `a[anr]` and `b[bnr]`.
#[inline]
#[must_use]
pub fn dot(a: &[f32], anr: usize, b: &[f32], bnr: usize) -> f32 {
    let (anr, bnr) = (3 * anr, 3 * bnr);
    a[anr] * b[bnr] + a[anr + 1] * b[bnr + 1] + a[anr + 2] * b[bnr + 2]
}

/// `dst[dnr] = b[bnr] × c[cnr]`.
#[inline]
pub fn set_cross(dst: &mut [f32], dnr: usize, b: &[f32], bnr: usize, c: &[f32], cnr: usize) {
    let cross = cross(b, bnr, c, cnr);
    dst[3 * dnr..3 * dnr + 3].copy_from_slice(&cross);
}

/// Cross product `b[bnr] × c[cnr]`, returned by value.
///
/// Use this when the destination would alias one of the operands.
#[inline]
#[must_use]
pub fn cross(b: &[f32], bnr: usize, c: &[f32], cnr: usize) -> [f32; 3] {
    let (bnr, cnr) = (3 * bnr, 3 * cnr);
    [
        b[bnr + 1] * c[cnr + 2] - b[bnr + 2] * c[cnr + 1],
        b[bnr + 2] * c[cnr] - b[bnr] * c[cnr + 2],
        b[bnr] * c[cnr + 1] - b[bnr + 1] * c[cnr],
    ]
}

/// Read vector `anr` as a [`Vec3`].
#[inline]
#[must_use]
pub fn get(a: &[f32], anr: usize) -> Vec3 {
    Vec3::from_slice(&a[3 * anr..3 * anr + 3])
}

/// Write `v` into vector `anr`.
#[inline]
pub fn set(a: &mut [f32], anr: usize, v: Vec3) {
    v.write_to_slice(&mut a[3 * anr..3 * anr + 3]);
}

/// Inverse of `m`, or the zero matrix when `m` is singular.
#[must_use]
pub fn inverse_or_zero(m: Mat3) -> Mat3 {
    if m.determinant() == 0.0 {
        Mat3::ZERO
    } else {
        m.inverse()
    }
}

/// Owned flat buffer of 3-component vectors.
///
/// Dereferences to `[f32]` so it can be handed straight to the functions in
/// this module, and to a renderer as a vertex attribute.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Vec3Buffer(Vec<f32>);

impl Vec3Buffer {
    /// Buffer holding `count` zero vectors.
    #[must_use]
    pub fn zeros(count: usize) -> Self {
        Self(vec![0.0; 3 * count])
    }

    /// Wrap a flat buffer. Returns `None` if its length is not a multiple of 3.
    #[must_use]
    pub fn from_flat(data: Vec<f32>) -> Option<Self> {
        (data.len() % 3 == 0).then_some(Self(data))
    }

    /// Number of vectors (not floats) in the buffer.
    #[must_use]
    pub fn count(&self) -> usize {
        self.0.len() / 3
    }

    /// Vector `nr` as a [`Vec3`].
    #[must_use]
    pub fn vec(&self, nr: usize) -> Vec3 {
        get(&self.0, nr)
    }

    /// Overwrite vector `nr`.
    pub fn set_vec(&mut self, nr: usize, v: Vec3) {
        set(&mut self.0, nr, v);
    }

    /// Iterate over all vectors.
    pub fn iter(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.0.chunks_exact(3).map(Vec3::from_slice)
    }
}

impl Deref for Vec3Buffer {
    type Target = [f32];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Vec3Buffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl FromIterator<Vec3> for Vec3Buffer {
    fn from_iter<I: IntoIterator<Item = Vec3>>(iter: I) -> Self {
        Self(iter.into_iter().flat_map(|v| v.to_array()).collect())
    }
}
