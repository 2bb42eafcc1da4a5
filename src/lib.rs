//! Material Point Method transfer engine on a sparse block grid.
//!
//! Particles carry their constitutive model; each step rasterizes them onto
//! the grid, updates grid velocities and resamples back. Thin rigid bodies
//! couple in both directions through node coloring and friction projection.

pub mod config;
pub mod core;
pub mod coupling;
pub mod error;
pub mod geometry;
pub mod materials;
pub mod math;
pub mod plugin;
pub mod solver;

// Public re-exports for clean API
pub use crate::config::{MaterialConfig, MaterialKind, SolverParams, TransferMode};
pub use crate::core::{MpmState, Particle, ParticleSet};
pub use crate::coupling::{RigidBody, RigidBodySet, RigidBodyState};
pub use crate::error::{MpmError, Result};
pub use crate::geometry::SparseBlockGrid;
pub use crate::materials::{ConstitutiveModel, MaterialModel};
pub use crate::plugin::MpmPlugin;
