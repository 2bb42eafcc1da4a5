//! Error taxonomy of the transfer engine.
//!
//! Numerical degeneracy is fatal: the step stops and the diagnostic state is
//! carried in the error. Missing configuration keys are never errors, they fall
//! back to the documented defaults of each material.

use thiserror::Error;

use crate::math::{Matrix, Real, Vector};

#[derive(Error, Debug)]
pub enum MpmError {
    #[error(
        "numerical degeneracy in `{material}` particle ({what}): density = {density}, deformation gradient = {deformation_gradient}"
    )]
    NumericalDegeneracy {
        material: &'static str,
        what: &'static str,
        deformation_gradient: Matrix,
        density: Real,
    },
    #[error("`{operation}` is not implemented for the `{material}` model")]
    NotImplemented {
        material: &'static str,
        operation: &'static str,
    },
    #[error("rigid body id {id} does not fit the coloring bits (0..{max})")]
    InvalidRigidBodyId { id: i32, max: u32 },
    #[error("{binned} of {particles} particles are binned to blocks; rebuild the blocks first")]
    StaleBlocks { binned: usize, particles: usize },
    #[error("particle at {position} left its block since the last rebuild")]
    ParticleLeftBlock { position: Vector },
    #[error("unknown material kind `{0}`")]
    UnknownMaterial(String),
    #[error("failed to (de)serialize particle state: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MpmError>;
