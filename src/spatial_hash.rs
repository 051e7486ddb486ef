//! Uniform grid spatial hash over a flat point buffer.
//!
//! Cells are hashed into a fixed table of `2 * max_num_objects` buckets, filled
//! by a counting sort, so a rebuild allocates nothing. Distinct cells may share
//! a bucket, so queries can return points outside the query box and, when two
//! visited cells collide, the same point twice.

use glam::Vec3;

/// Spatial hash with a fixed capacity.
#[derive(Clone, Debug)]
pub struct SpatialHash {
    spacing: f32,
    inv_spacing: f32,
    table_size: usize,
    cell_start: Vec<usize>,
    cell_entries: Vec<usize>,
    query_ids: Vec<usize>,
}

impl SpatialHash {
    /// Create an empty hash with cell size `spacing` holding up to
    /// `max_num_objects` points.
    #[must_use]
    pub fn new(spacing: f32, max_num_objects: usize) -> Self {
        let max_num_objects = max_num_objects.max(1);
        let table_size = 2 * max_num_objects;
        Self {
            spacing,
            inv_spacing: 1.0 / spacing,
            table_size,
            cell_start: vec![0; table_size + 1],
            cell_entries: vec![0; max_num_objects],
            query_ids: Vec::with_capacity(max_num_objects),
        }
    }

    /// Cell size.
    #[must_use]
    pub fn spacing(&self) -> f32 {
        self.spacing
    }

    fn int_coord(&self, coord: f32) -> i32 {
        (coord * self.inv_spacing).floor() as i32
    }

    fn hash_coords(&self, xi: i32, yi: i32, zi: i32) -> usize {
        let h = xi.wrapping_mul(92_837_111) ^ yi.wrapping_mul(689_287_499) ^ zi.wrapping_mul(283_923_481);
        h.unsigned_abs() as usize % self.table_size
    }

    fn hash_pos(&self, positions: &[f32], nr: usize) -> usize {
        self.hash_coords(
            self.int_coord(positions[3 * nr]),
            self.int_coord(positions[3 * nr + 1]),
            self.int_coord(positions[3 * nr + 2]),
        )
    }

    /// Rebuild the table from flat `xyz` positions. Points beyond the capacity
    /// are ignored.
    pub fn create(&mut self, positions: &[f32]) {
        let num_objects = (positions.len() / 3).min(self.cell_entries.len());

        self.cell_start.fill(0);
        self.cell_entries.fill(0);

        for i in 0..num_objects {
            let h = self.hash_pos(positions, i);
            self.cell_start[h] += 1;
        }

        let mut start = 0;
        for count in &mut self.cell_start[..self.table_size] {
            start += *count;
            *count = start;
        }
        // guard
        self.cell_start[self.table_size] = start;

        for i in 0..num_objects {
            let h = self.hash_pos(positions, i);
            self.cell_start[h] -= 1;
            self.cell_entries[self.cell_start[h]] = i;
        }
    }

    /// Indices of every point hashed into a cell overlapping the box
    /// `[point - max_dist, point + max_dist]`.
    ///
    /// Callers filter by exact distance themselves.
    pub fn query(&mut self, point: Vec3, max_dist: f32) -> &[usize] {
        let lo = point - Vec3::splat(max_dist);
        let hi = point + Vec3::splat(max_dist);
        let (x0, y0, z0) = (self.int_coord(lo.x), self.int_coord(lo.y), self.int_coord(lo.z));
        let (x1, y1, z1) = (self.int_coord(hi.x), self.int_coord(hi.y), self.int_coord(hi.z));

        self.query_ids.clear();
        for xi in x0..=x1 {
            for yi in y0..=y1 {
                for zi in z0..=z1 {
                    let h = self.hash_coords(xi, yi, zi);
                    let (start, end) = (self.cell_start[h], self.cell_start[h + 1]);
                    self.query_ids.extend_from_slice(&self.cell_entries[start..end]);
                }
            }
        }
        &self.query_ids
    }

    /// Result of the last query.
    #[must_use]
    pub fn query_ids(&self) -> &[usize] {
        &self.query_ids
    }
}
