//! Particle-grid transfer passes
//!
//! Every pass exists in two variants with the same observable contract:
//!
//! * a generic variant that walks particles in storage order and reads and
//!   writes the sparse grid directly, used as the reference;
//! * an optimized variant that processes whole blocks on the rayon pool
//!   through a block cache.
//!
//! Both variants run the same per-particle code, written against the
//! [`StencilView`] / [`StencilViewMut`] abstraction below.

pub mod g2p;
pub mod grid_update;
pub mod p2g;

use std::ops::{Deref, DerefMut};

pub use g2p::{resample, resample_optimized};
pub use grid_update::{grid_momentum, grid_update};
pub use p2g::{rasterize, rasterize_optimized};

use crate::config::{SolverParams, TransferMode};
use crate::core::Particle;
use crate::core::block_cache::{BlockCache, CacheElement, GridCache, stencil_cache_index};
use crate::core::grid::GridState;
use crate::core::kernel::{stencil_base, stencil_offset};
use crate::error::{MpmError, Result};
use crate::geometry::SparseBlockGrid;
use crate::math::{Real, Vector, VectorI};

/// Per-pass constants derived from [`SolverParams`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransferParams {
    pub dt: Real,
    pub dx: Real,
    pub inv_dx: Real,
    pub mode: TransferMode,
    pub quadratic_affine: bool,
    pub gravity: Vector,
    pub particle_gravity: bool,
    pub penalty: Real,
    pub pushing_force: Real,
    /// Domain size in cells.
    pub resolution: Vector,
}

impl TransferParams {
    pub fn new(params: &SolverParams, dt: Real) -> Self {
        Self {
            dt,
            dx: params.cell_width,
            inv_dx: params.inv_cell_width(),
            mode: params.transfer_mode,
            quadratic_affine: params.quadratic_affine,
            gravity: params.gravity,
            particle_gravity: params.particle_gravity,
            penalty: params.penalty,
            pushing_force: params.pushing_force,
            resolution: params.resolution_vector(),
        }
    }
}

/// Products `(dx dy, dy dz, dz dx)` paired with the second-order affine term.
#[inline(always)]
pub fn cross_offsets(dpos: &Vector) -> Vector {
    Vector::new(dpos.x * dpos.y, dpos.y * dpos.z, dpos.z * dpos.x)
}

/// Cache coordinate of a particle's stencil base. Particles that moved out of
/// reach of their block since the last rebuild are an error.
#[inline]
pub(crate) fn cached_stencil_base<T: CacheElement>(
    cache: &BlockCache<T>,
    particle: &Particle,
    inv_dx: Real,
) -> Result<VectorI> {
    cache
        .stencil_local(stencil_base(&(particle.position * inv_dx)))
        .ok_or(MpmError::ParticleLeftBlock {
            position: particle.position,
        })
}

/// Read access to the 27 nodes of one particle stencil.
pub trait StencilView {
    /// Grid coordinate of stencil node `(0, 0, 0)`.
    fn base(&self) -> VectorI;

    /// `None` when the node was never allocated.
    fn node(&self, node_id: usize) -> Option<&GridState>;

    #[inline(always)]
    fn cell(&self, node_id: usize) -> VectorI {
        self.base() + stencil_offset(node_id)
    }
}

pub trait StencilViewMut: StencilView {
    /// Allocates the node if necessary.
    fn node_mut(&mut self, node_id: usize) -> &mut GridState;
}

/// Stencil read straight from the sparse grid.
pub struct GridStencil<G> {
    pub grid: G,
    pub base: VectorI,
}

impl<G: Deref<Target = SparseBlockGrid>> StencilView for GridStencil<G> {
    #[inline(always)]
    fn base(&self) -> VectorI {
        self.base
    }

    #[inline(always)]
    fn node(&self, node_id: usize) -> Option<&GridState> {
        self.grid.get(self.cell(node_id))
    }
}

impl<G: DerefMut<Target = SparseBlockGrid>> StencilViewMut for GridStencil<G> {
    #[inline(always)]
    fn node_mut(&mut self, node_id: usize) -> &mut GridState {
        let cell = self.cell(node_id);
        self.grid.get_mut(cell)
    }
}

/// Stencil inside a gathered block cache.
pub struct CacheStencil<C> {
    pub cache: C,
    /// Cache coordinate of the stencil base.
    pub base_local: VectorI,
}

impl<C: Deref<Target = GridCache>> StencilView for CacheStencil<C> {
    #[inline(always)]
    fn base(&self) -> VectorI {
        self.cache.cell(self.base_local)
    }

    #[inline(always)]
    fn node(&self, node_id: usize) -> Option<&GridState> {
        Some(self.cache.node(stencil_cache_index(self.base_local, node_id)))
    }
}

impl<C: DerefMut<Target = GridCache>> StencilViewMut for CacheStencil<C> {
    #[inline(always)]
    fn node_mut(&mut self, node_id: usize) -> &mut GridState {
        let index = stencil_cache_index(self.base_local, node_id);
        self.cache.node_mut(index)
    }
}
