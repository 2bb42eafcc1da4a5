//! Contiguous scratch copy of one grid block plus a one-cell halo.
//!
//! A cache is gathered from the sparse grid before the particles of a block
//! are processed and, when opened for writing, scattered back afterwards.
//! Caches of blocks with the same parity colour never overlap, so a colour's
//! caches can be filled concurrently.

use std::ops::Range;

use crate::config::BLOCK_SIZE;
use crate::core::grid::GridState;
use crate::core::kernel::{STENCIL_NODES, stencil_offset};
use crate::geometry::{BlockKey, SparseBlockGrid, in_block_index, morton_decode, morton_encode};
use crate::math::{VectorI, VectorP};

/// Cached nodes per axis.
pub const CACHE_SIZE: i32 = BLOCK_SIZE + 2;
pub const CACHE_NODES: usize = (CACHE_SIZE * CACHE_SIZE * CACHE_SIZE) as usize;

#[inline(always)]
pub fn cache_index(local: VectorI) -> usize {
    ((local.x * CACHE_SIZE + local.y) * CACHE_SIZE + local.z) as usize
}

/// Cache index of stencil node `node_id` for a stencil whose base sits at
/// `base_local` in cache coordinates.
#[inline(always)]
pub fn stencil_cache_index(base_local: VectorI, node_id: usize) -> usize {
    cache_index(base_local + stencil_offset(node_id))
}

/// Cache coordinates covered by the neighbouring block at offset `d` on one axis.
#[inline(always)]
fn axis_span(d: i32) -> Range<i32> {
    match d {
        -1 => 0..1,
        0 => 1..BLOCK_SIZE + 1,
        _ => BLOCK_SIZE + 1..CACHE_SIZE,
    }
}

fn for_each_cached_cell(d: VectorI, mut f: impl FnMut(VectorI)) {
    for i in axis_span(d.x) {
        for j in axis_span(d.y) {
            for k in axis_span(d.z) {
                f(VectorI::new(i, j, k));
            }
        }
    }
}

/// Stored representation of one cached node.
pub trait CacheElement: Clone + Send {
    fn empty() -> Self;
    fn load(node: &GridState) -> Self;
    /// Writes back the fields the transfer passes may modify.
    fn store(&self, node: &mut GridState);
    fn is_empty(&self) -> bool;
}

impl CacheElement for GridState {
    #[inline(always)]
    fn empty() -> Self {
        GridState::zeroed()
    }

    #[inline(always)]
    fn load(node: &GridState) -> Self {
        node.clone()
    }

    #[inline(always)]
    fn store(&self, node: &mut GridState) {
        node.velocity_and_mass = self.velocity_and_mass;
        node.granular_fluidity = self.granular_fluidity;
    }

    #[inline(always)]
    fn is_empty(&self) -> bool {
        self.velocity_and_mass == VectorP::zeros() && self.granular_fluidity == 0.0
    }
}

/// Momentum-and-mass only, for blocks without rigid coloring.
impl CacheElement for VectorP {
    #[inline(always)]
    fn empty() -> Self {
        VectorP::zeros()
    }

    #[inline(always)]
    fn load(node: &GridState) -> Self {
        node.velocity_and_mass
    }

    #[inline(always)]
    fn store(&self, node: &mut GridState) {
        node.velocity_and_mass = *self;
    }

    #[inline(always)]
    fn is_empty(&self) -> bool {
        *self == VectorP::zeros()
    }
}

pub struct BlockCache<T> {
    key: BlockKey,
    /// Cell coordinate of cache entry `(0, 0, 0)`: the block origin minus one.
    origin: VectorI,
    nodes: Vec<T>,
}

/// Full node records, used where coloring or fluidity is needed.
pub type GridCache = BlockCache<GridState>;
pub type MomentumCache = BlockCache<VectorP>;

impl<T: CacheElement> BlockCache<T> {
    pub fn gather(grid: &SparseBlockGrid, key: BlockKey) -> Self {
        let center = morton_decode(key);
        let mut nodes = vec![T::empty(); CACHE_NODES];

        for n in 0..STENCIL_NODES {
            let d = stencil_offset(n).add_scalar(-1);
            let Some(block) = grid.block(morton_encode(center + d)) else {
                continue;
            };
            for_each_cached_cell(d, |local| {
                nodes[cache_index(local)] = T::load(block.node(in_block_index(local.add_scalar(-1))));
            });
        }

        Self {
            key,
            origin: center * BLOCK_SIZE - VectorI::repeat(1),
            nodes,
        }
    }

    /// Writes the cache back. Halo nodes in unallocated blocks are only
    /// allocated when they received something.
    pub fn scatter(self, grid: &mut SparseBlockGrid) {
        let center = morton_decode(self.key);
        for n in 0..STENCIL_NODES {
            let d = stencil_offset(n).add_scalar(-1);
            let key = morton_encode(center + d);

            let mut touched = false;
            for_each_cached_cell(d, |local| touched |= !self.nodes[cache_index(local)].is_empty());

            if grid.block(key).is_none() {
                if !touched {
                    continue;
                }
                grid.touch_block(key);
            }
            let Some(block) = grid.block_mut(key) else {
                continue;
            };
            let nodes = block.nodes_mut();
            for_each_cached_cell(d, |local| {
                self.nodes[cache_index(local)].store(&mut nodes[in_block_index(local.add_scalar(-1))]);
            });
        }
    }

    #[inline(always)]
    pub fn key(&self) -> BlockKey {
        self.key
    }

    #[inline(always)]
    pub fn origin(&self) -> VectorI {
        self.origin
    }

    #[inline(always)]
    pub fn node(&self, index: usize) -> &T {
        &self.nodes[index]
    }

    #[inline(always)]
    pub fn node_mut(&mut self, index: usize) -> &mut T {
        &mut self.nodes[index]
    }

    /// Cell coordinate of a cache coordinate.
    #[inline(always)]
    pub fn cell(&self, local: VectorI) -> VectorI {
        self.origin + local
    }

    /// Cache coordinate of a cell (must lie inside the cache).
    #[inline(always)]
    pub fn local(&self, cell: VectorI) -> VectorI {
        cell - self.origin
    }

    /// Cache coordinate of a stencil base, `None` when the 3x3x3 stencil would
    /// leave the cache.
    #[inline(always)]
    pub fn stencil_local(&self, base: VectorI) -> Option<VectorI> {
        let local = self.local(base);
        local
            .iter()
            .all(|c| (0..=CACHE_SIZE - 3).contains(c))
            .then_some(local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::block_key;

    #[test]
    fn gather_sees_halo_from_neighbouring_blocks() {
        let mut grid = SparseBlockGrid::new(1.0);
        grid.get_mut(VectorI::new(3, 4, 4)).velocity_and_mass = VectorP::new(1.0, 0.0, 0.0, 2.0);
        grid.get_mut(VectorI::new(8, 7, 7)).velocity_and_mass = VectorP::new(0.0, 1.0, 0.0, 3.0);

        let cache = MomentumCache::gather(&grid, block_key(VectorI::new(4, 4, 4)));
        assert_eq!(cache.origin(), VectorI::new(3, 3, 3));
        assert_eq!(cache.node(cache_index(VectorI::new(0, 1, 1))).w, 2.0);
        assert_eq!(cache.node(cache_index(VectorI::new(5, 4, 4))).w, 3.0);
    }

    #[test]
    fn stencils_leaving_the_halo_are_rejected() {
        let grid = SparseBlockGrid::new(1.0);
        let cache = MomentumCache::gather(&grid, block_key(VectorI::new(4, 4, 4)));
        assert_eq!(cache.stencil_local(VectorI::new(3, 3, 3)), Some(VectorI::zeros()));
        assert_eq!(cache.stencil_local(VectorI::new(6, 6, 6)), Some(VectorI::repeat(3)));
        assert_eq!(cache.stencil_local(VectorI::new(7, 4, 4)), None);
        assert_eq!(cache.stencil_local(VectorI::new(4, 2, 4)), None);
    }

    #[test]
    fn scatter_writes_back_and_allocates_touched_halo_only() {
        let mut grid = SparseBlockGrid::new(1.0);
        let key = block_key(VectorI::new(4, 4, 4));
        grid.touch_block(key);

        let mut cache = GridCache::gather(&grid, key);
        cache.node_mut(cache_index(VectorI::new(1, 1, 1))).velocity_and_mass.w = 1.0;
        cache.node_mut(cache_index(VectorI::new(0, 2, 2))).velocity_and_mass.w = 0.5;
        cache.scatter(&mut grid);

        assert_eq!(grid.get(VectorI::new(4, 4, 4)).unwrap().mass(), 1.0);
        assert_eq!(grid.get(VectorI::new(3, 5, 5)).unwrap().mass(), 0.5);
        assert_eq!(grid.block_count(), 2);
    }
}
