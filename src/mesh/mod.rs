//! Mesh module providing the tetrahedral mesh description and shared topology types.
//!
//! - Common data structures (edges, tetrahedra, the face table, the `Spatial` trait)
//! - The flat tetrahedral mesh descriptor, its loaders and generators

pub mod common;
pub mod tetrahedral;

// Re-export common types for convenience
pub use common::{dedup_with_warning, tet_volume, Edge, Spatial, Tetrahedron, TET_FACES};

pub use tetrahedral::TetMeshDescriptor;
