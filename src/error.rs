//! Error types for mesh loading, body construction, bone binding and configuration.

use thiserror::Error;

/// Errors raised while loading or validating a tetrahedral mesh.
#[derive(Debug, Error)]
pub enum MeshError {
    /// A flat array does not hold a whole number of elements.
    #[error("{array} has length {len}, which is not a multiple of {stride}")]
    BadLength {
        /// Name of the offending array.
        array: &'static str,
        /// Its length in scalars.
        len: usize,
        /// Number of scalars per element.
        stride: usize,
    },

    /// An index refers past the end of the vertex array.
    #[error("{array}[{position}] = {index} is out of range for {num_particles} particles")]
    IndexOutOfRange {
        /// Name of the offending array.
        array: &'static str,
        /// Position of the index inside the array.
        position: usize,
        /// The bad index.
        index: usize,
        /// Number of particles in the mesh.
        num_particles: usize,
    },

    /// File extension is neither `.json` nor `.bin`.
    #[error("unsupported mesh format: {0}")]
    UnsupportedFormat(String),

    /// Reading or writing a mesh file failed.
    #[error("mesh i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// JSON mesh could not be parsed.
    #[error("invalid json mesh: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary mesh could not be (de)serialized.
    #[error("invalid binary mesh: {0}")]
    Bincode(#[from] bincode::Error),
}

/// Errors raised while binding a body to a skeleton.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindingError {
    /// The skeleton exposes no bone segments to bind to.
    #[error("skeleton has no bone segments")]
    NoSegments,

    /// The binding was computed for a body with a different particle count.
    #[error("binding covers {binding} particles but the body has {body}")]
    ParticleCountMismatch {
        /// Particles covered by the binding.
        binding: usize,
        /// Particles in the body.
        body: usize,
    },

    /// The skeleton has fewer segments than the binding refers to.
    #[error("binding refers to bone {required} but the skeleton has {available} segments")]
    MissingSegment {
        /// Highest bone index stored in the binding.
        required: usize,
        /// Segments the skeleton exposes.
        available: usize,
    },
}

/// Errors raised while adding a body to a simulation.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The mesh could not be turned into a body.
    #[error(transparent)]
    Mesh(#[from] MeshError),

    /// The body could not be bound to its skeleton.
    #[error(transparent)]
    Binding(#[from] BindingError),
}

/// Errors raised while reading simulation settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file could not be read.
    #[error("config i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// The settings file is not valid JSON for the expected shape.
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for mesh operations.
pub type MeshResult<T> = std::result::Result<T, MeshError>;
