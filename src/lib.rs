//! XPBD (eXtended Position Based Dynamics) tetrahedral soft body library.

#![warn(clippy::pedantic)]
#![warn(missing_docs)]

pub mod binding;
pub mod body;
pub mod constraint;
pub mod error;
pub mod grabber;
pub mod mesh;
pub mod rig;
pub mod skinning;
pub mod spatial_hash;
pub mod vecmath;
pub mod xpbd;

pub use error::{BindingError, ConfigError, MeshError, SpawnError};
