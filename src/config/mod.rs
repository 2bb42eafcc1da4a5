//! Configuration and parameters
//!
//! Constants, solver settings and per-material parameter maps.

pub mod constants;
pub mod material_config;
pub mod solver_params;

pub use constants::*;
pub use material_config::{MaterialConfig, MaterialKind};
pub use solver_params::{SolverParams, TransferMode};
