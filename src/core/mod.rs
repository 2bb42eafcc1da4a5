pub mod block_cache;
pub mod grid;
pub mod kernel;
pub mod mpm_state;
pub mod particle;
pub mod particle_set;

pub use block_cache::{BlockCache, GridCache, MomentumCache};
pub use grid::{GridState, SpinLock};
pub use kernel::{MlsFastKernel, QuadraticKernel, nearest_node, stencil_base};
pub use mpm_state::MpmState;
pub use particle::Particle;
pub use particle_set::{BlockMeta, ParticleSet};
