//! Elastic and elastoplastic solids

pub mod elastic;
pub mod jelly;
pub mod linear;
pub mod snow;

pub use elastic::Elastic;
pub use jelly::Jelly;
pub use linear::Linear;
pub use snow::Snow;
