//! Fluid-like materials

pub mod visco;
pub mod water;

pub use visco::Visco;
pub use water::Water;
