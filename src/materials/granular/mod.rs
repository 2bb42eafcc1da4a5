//! Granular and pressure-independent plastic materials

pub mod nonlocal;
pub mod sand;
pub mod von_mises;

pub use nonlocal::Nonlocal;
pub use sand::Sand;
pub use von_mises::VonMises;
