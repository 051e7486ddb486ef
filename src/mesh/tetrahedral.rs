//! Tetrahedral mesh descriptor: the flat-array description a body is built from.

use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::path::Path;

use glam::Vec3;
use tracing::{debug, error, info};

use super::common::{edge_key, tet_volume, TET_FACES};
use crate::error::{MeshError, MeshResult};
use crate::vecmath;

/// Flat description of a tetrahedral mesh.
///
/// Field names on the wire follow the JSON asset format produced by the mesh
/// conversion script (`vertices`, `tetFaceIds`, `edgeList`, `triFaceIds`).
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TetMeshDescriptor {
    /// Particle positions, `3 * num_particles` floats.
    pub vertices: Vec<f32>,
    /// Tetrahedron corners, `4 * num_tets` indices.
    #[serde(rename = "tetFaceIds")]
    pub tet_ids: Vec<usize>,
    /// Undirected edges, `2 * num_edges` indices.
    #[serde(rename = "edgeList", default)]
    pub edge_ids: Vec<usize>,
    /// Surface triangles, `3 * num_triangles` indices.
    #[serde(rename = "triFaceIds", default)]
    pub tri_ids: Vec<usize>,
}

impl TetMeshDescriptor {
    /// Number of particles described.
    #[must_use]
    pub fn num_particles(&self) -> usize {
        self.vertices.len() / 3
    }

    /// Number of tetrahedra described.
    #[must_use]
    pub fn num_tets(&self) -> usize {
        self.tet_ids.len() / 4
    }

    /// Check array strides and index ranges.
    ///
    /// # Errors
    /// Returns the first [`MeshError::BadLength`] or [`MeshError::IndexOutOfRange`] found.
    pub fn validate(&self) -> MeshResult<()> {
        let strides: [(&'static str, usize, usize); 4] = [
            ("vertices", self.vertices.len(), 3),
            ("tetFaceIds", self.tet_ids.len(), 4),
            ("edgeList", self.edge_ids.len(), 2),
            ("triFaceIds", self.tri_ids.len(), 3),
        ];
        for (array, len, stride) in strides {
            if len % stride != 0 {
                return Err(MeshError::BadLength { array, len, stride });
            }
        }

        let num_particles = self.num_particles();
        let indexed: [(&'static str, &[usize]); 3] = [
            ("tetFaceIds", &self.tet_ids),
            ("edgeList", &self.edge_ids),
            ("triFaceIds", &self.tri_ids),
        ];
        for (array, ids) in indexed {
            if let Some((position, &index)) =
                ids.iter().enumerate().find(|&(_, &id)| id >= num_particles)
            {
                return Err(MeshError::IndexOutOfRange {
                    array,
                    position,
                    index,
                    num_particles,
                });
            }
        }
        Ok(())
    }

    /// Unique tetrahedron edges as a flat, sorted index list.
    #[must_use]
    pub fn derive_edges(&self) -> Vec<usize> {
        let mut edges = BTreeSet::new();
        for tet in self.tet_ids.chunks_exact(4) {
            for a in 0..4 {
                for b in a + 1..4 {
                    edges.insert(edge_key(tet[a], tet[b]));
                }
            }
        }
        edges.into_iter().flat_map(|(a, b)| [a, b]).collect()
    }

    /// Replace the edge list with [`Self::derive_edges`].
    #[must_use]
    pub fn with_derived_edges(mut self) -> Self {
        self.edge_ids = self.derive_edges();
        self
    }

    /// Boundary triangles of the tet mesh, wound outward.
    ///
    /// A face is on the boundary when exactly one tet references it. Output
    /// order follows the first reference in tet order.
    #[must_use]
    pub fn extract_surface(&self) -> Vec<usize> {
        let mut faces: Vec<[usize; 3]> = Vec::new();
        let mut counts: HashMap<[usize; 3], (usize, usize)> = HashMap::new();

        for tet in self.tet_ids.chunks_exact(4) {
            for (opposite, local) in TET_FACES.iter().enumerate() {
                let mut face = [tet[local[0]], tet[local[1]], tet[local[2]]];
                if self.faces_towards(face, tet[opposite]) {
                    face.swap(1, 2);
                }
                let mut key = face;
                key.sort_unstable();
                counts
                    .entry(key)
                    .and_modify(|(count, _)| *count += 1)
                    .or_insert_with(|| {
                        faces.push(face);
                        (1, faces.len() - 1)
                    });
            }
        }

        let mut boundary: Vec<(usize, [usize; 3])> = counts
            .into_values()
            .filter(|&(count, _)| count == 1)
            .map(|(_, slot)| (slot, faces[slot]))
            .collect();
        boundary.sort_unstable_by_key(|&(slot, _)| slot);
        boundary.into_iter().flat_map(|(_, face)| face).collect()
    }

    /// Replace the triangle list with [`Self::extract_surface`].
    #[must_use]
    pub fn with_extracted_surface(mut self) -> Self {
        self.tri_ids = self.extract_surface();
        self
    }

    fn faces_towards(&self, face: [usize; 3], point: usize) -> bool {
        let pos = &self.vertices;
        let mut temp = [0.0; 9];
        vecmath::set_diff(&mut temp, 0, pos, face[1], pos, face[0], 1.0);
        vecmath::set_diff(&mut temp, 1, pos, face[2], pos, face[0], 1.0);
        vecmath::set_diff(&mut temp, 2, pos, point, pos, face[0], 1.0);
        let normal = vecmath::cross(&temp, 0, &temp, 1);
        vecmath::dot(&normal, 0, &temp, 2) > 0.0
    }

    /// Translate every vertex.
    pub fn translate(&mut self, by: Vec3) {
        let by = by.to_array();
        for nr in 0..self.num_particles() {
            vecmath::add(&mut self.vertices, nr, &by, 0, 1.0);
        }
    }

    /// Axis aligned bounds of the vertices as (min, max).
    #[must_use]
    pub fn bounding_box(&self) -> (Vec3, Vec3) {
        if self.vertices.len() < 3 {
            return (Vec3::ZERO, Vec3::ZERO);
        }
        self.vertices.chunks_exact(3).map(Vec3::from_slice).fold(
            (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
            |(min, max), p| (min.min(p), max.max(p)),
        )
    }

    /// The tetrahedron spanned by the origin and the three unit axes.
    #[must_use]
    pub fn unit_tetrahedron() -> Self {
        Self {
            vertices: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            tet_ids: vec![0, 1, 2, 3],
            ..Self::default()
        }
        .with_derived_edges()
        .with_extracted_surface()
    }

    /// Axis aligned box from `origin` with extent `size`, split into
    /// `cells` cubes of six tetrahedra each (Kuhn subdivision).
    ///
    /// All tetrahedra are positively oriented. Edges and surface are derived.
    #[must_use]
    #[tracing::instrument]
    pub fn box_grid(origin: Vec3, size: Vec3, cells: [usize; 3]) -> Self {
        let [nx, ny, nz] = cells.map(|c| c.max(1));
        let step = size / Vec3::new(nx as f32, ny as f32, nz as f32);
        let index = |x: usize, y: usize, z: usize| (x * (ny + 1) + y) * (nz + 1) + z;

        let mut vertices = Vec::with_capacity(3 * (nx + 1) * (ny + 1) * (nz + 1));
        for x in 0..=nx {
            for y in 0..=ny {
                for z in 0..=nz {
                    let p = origin + step * Vec3::new(x as f32, y as f32, z as f32);
                    vertices.extend_from_slice(&p.to_array());
                }
            }
        }

        const AXIS_ORDERS: [[usize; 3]; 6] =
            [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];

        let mut tet_ids = Vec::with_capacity(24 * nx * ny * nz);
        for x in 0..nx {
            for y in 0..ny {
                for z in 0..nz {
                    for order in AXIS_ORDERS {
                        let mut corner = [x, y, z];
                        let mut ids = [index(x, y, z), 0, 0, 0];
                        for (slot, axis) in order.into_iter().enumerate() {
                            corner[axis] += 1;
                            ids[slot + 1] = index(corner[0], corner[1], corner[2]);
                        }
                        if tet_volume(&vertices, ids) < 0.0 {
                            ids.swap(2, 3);
                        }
                        tet_ids.extend_from_slice(&ids);
                    }
                }
            }
        }

        let mesh = Self {
            vertices,
            tet_ids,
            ..Self::default()
        }
        .with_derived_edges()
        .with_extracted_surface();

        debug!(
            particles = mesh.num_particles(),
            tets = mesh.num_tets(),
            edges = mesh.edge_ids.len() / 2,
            triangles = mesh.tri_ids.len() / 3,
            "Generated box grid"
        );
        mesh
    }

    /// Parse a JSON mesh from a string.
    ///
    /// # Errors
    /// Returns [`MeshError::Json`] on malformed input.
    pub fn from_json_str(json: &str) -> MeshResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON mesh file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    #[tracing::instrument]
    pub fn from_json(filename: &str) -> MeshResult<Self> {
        let data = std::fs::read_to_string(filename)?;
        debug!("Parsing {} bytes of json", data.len());
        Self::from_json_str(&data)
    }

    /// Load tetrahedral mesh from bincode file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or deserialized.
    #[tracing::instrument]
    pub fn from_bincode(filename: &str) -> MeshResult<Self> {
        let data = std::fs::read(filename)?;
        debug!("Deserializing {} bytes", data.len());
        Ok(bincode::deserialize(&data)?)
    }

    /// Export mesh to bincode format.
    ///
    /// # Errors
    /// Returns an error if serialization fails or file cannot be written.
    #[tracing::instrument(skip(self))]
    pub fn export_to_bincode(&self, output_path: &str) -> MeshResult<()> {
        info!("Serializing to binary format");
        let encoded = bincode::serialize(self)?;

        let mut file = std::fs::File::create(output_path)?;
        file.write_all(&encoded)?;

        info!(
            output_path,
            size_bytes = encoded.len(),
            "Successfully exported mesh"
        );

        debug!("Verifying serialized data");
        let _: Self = bincode::deserialize(&encoded)?;
        debug!("Verification successful");

        Ok(())
    }

    /// Load mesh with automatic format detection (`.json` or `.bin`).
    ///
    /// # Errors
    /// Returns an error if the file format is unsupported or loading fails.
    #[tracing::instrument]
    pub fn load(mesh_path: &str) -> MeshResult<Self> {
        info!(mesh_path, "Attempting to load mesh");

        let extension = Path::new(mesh_path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        let mesh = match extension.as_deref() {
            Some("bin") => {
                debug!("Loading as bincode file");
                Self::from_bincode(mesh_path)
            }
            Some("json") => {
                debug!("Loading as json file");
                Self::from_json(mesh_path)
            }
            _ => Err(MeshError::UnsupportedFormat(mesh_path.to_owned())),
        };

        match &mesh {
            Ok(m) => {
                info!(
                    vertices = m.num_particles(),
                    edges = m.edge_ids.len() / 2,
                    faces = m.tri_ids.len() / 3,
                    tetrahedra = m.num_tets(),
                    "Mesh loaded successfully"
                );
            }
            Err(e) => {
                error!(mesh_path, error = %e, "Failed to load mesh");
            }
        }

        mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_json_asset_format() {
        let json = r#"{
            "vertices": [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            "tetFaceIds": [0, 1, 2, 3],
            "edgeList": [0, 1, 0, 2, 0, 3, 1, 2, 1, 3, 2, 3],
            "triFaceIds": [0, 2, 1]
        }"#;
        let mesh = TetMeshDescriptor::from_json_str(json).unwrap();
        assert_eq!(mesh.num_particles(), 4);
        assert_eq!(mesh.num_tets(), 1);
        assert_eq!(mesh.edge_ids.len(), 12);
        assert_eq!(mesh.tri_ids, vec![0, 2, 1]);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_missing_optional_arrays_default_empty() {
        let mesh =
            TetMeshDescriptor::from_json_str(r#"{"vertices": [], "tetFaceIds": []}"#).unwrap();
        assert!(mesh.edge_ids.is_empty());
        assert!(mesh.tri_ids.is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_stride() {
        let mut mesh = TetMeshDescriptor::unit_tetrahedron();
        mesh.vertices.push(1.0);
        assert!(matches!(
            mesh.validate(),
            Err(MeshError::BadLength { array: "vertices", stride: 3, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut mesh = TetMeshDescriptor::unit_tetrahedron();
        mesh.tri_ids = vec![0, 1, 9];
        match mesh.validate() {
            Err(MeshError::IndexOutOfRange { array, position, index, num_particles }) => {
                assert_eq!(array, "triFaceIds");
                assert_eq!(position, 2);
                assert_eq!(index, 9);
                assert_eq!(num_particles, 4);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_derive_edges_unique_and_sorted() {
        let mesh = TetMeshDescriptor {
            vertices: vec![0.0; 15],
            tet_ids: vec![0, 1, 2, 3, 1, 2, 3, 4],
            ..TetMeshDescriptor::default()
        };
        let edges = mesh.derive_edges();
        // 6 + 6 edges, sharing the 3 edges of face (1, 2, 3).
        assert_eq!(edges.len() / 2, 9);
        let pairs: Vec<_> = edges.chunks_exact(2).map(|e| (e[0], e[1])).collect();
        let mut sorted = pairs.clone();
        sorted.sort_unstable();
        assert_eq!(pairs, sorted);
        assert!(pairs.iter().all(|(a, b)| a < b));
    }

    #[test]
    fn test_unit_tetrahedron_surface_is_outward() {
        let mesh = TetMeshDescriptor::unit_tetrahedron();
        assert_eq!(mesh.tri_ids.len(), 12);
        let centroid = Vec3::splat(0.25);
        for tri in mesh.tri_ids.chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| vecmath::get(&mesh.vertices, i));
            let normal = (b - a).cross(c - a);
            assert!(normal.dot(a - centroid) > 0.0);
        }
    }

    #[test]
    fn test_box_grid_counts_and_orientation() {
        let mesh = TetMeshDescriptor::box_grid(Vec3::ZERO, Vec3::new(2.0, 1.0, 1.0), [2, 1, 1]);
        assert_eq!(mesh.num_particles(), 3 * 2 * 2);
        assert_eq!(mesh.num_tets(), 12);
        assert!(mesh.validate().is_ok());

        let total: f32 = mesh
            .tet_ids
            .chunks_exact(4)
            .map(|t| {
                let vol = tet_volume(&mesh.vertices, [t[0], t[1], t[2], t[3]]);
                assert!(vol > 0.0);
                vol
            })
            .sum();
        assert!((total - 2.0).abs() < 1e-5);

        // Each of the 10 unit faces of the 2x1x1 box is split in two.
        assert_eq!(mesh.tri_ids.len() / 3, 20);
    }

    #[test]
    fn test_bincode_export_roundtrip() {
        let path = std::env::temp_dir().join("xpbdsoft_test_export.bin");
        let path = path.to_str().unwrap();
        let mesh = TetMeshDescriptor::unit_tetrahedron();
        mesh.export_to_bincode(path).unwrap();
        let loaded = TetMeshDescriptor::load(path).unwrap();
        assert_eq!(loaded, mesh);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        assert!(matches!(
            TetMeshDescriptor::load("mesh.obj"),
            Err(MeshError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_translate_and_bbox() {
        let mut mesh = TetMeshDescriptor::unit_tetrahedron();
        mesh.translate(Vec3::new(0.0, 2.0, 0.0));
        let (min, max) = mesh.bounding_box();
        assert_eq!(min, Vec3::new(0.0, 2.0, 0.0));
        assert_eq!(max, Vec3::new(1.0, 3.0, 1.0));
    }
}
