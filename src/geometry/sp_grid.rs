use indexmap::{IndexMap, IndexSet};

use crate::config::{BLOCK_BITS, BLOCK_SIZE, ELEMENTS_PER_BLOCK};
use crate::core::grid::GridState;
use crate::coupling::check_rigid_body_id;
use crate::error::Result;
use crate::math::{Real, Vector, VectorI};

/// Morton-interleaved block coordinate.
pub type BlockKey = u64;

/// Block coordinates are biased so negative halo blocks interleave cleanly.
const BLOCK_COORD_BIAS: i32 = 1 << 20;
const MORTON_AXIS_BITS: u32 = 21;
const MORTON_AXIS_MASK: u64 = (1 << MORTON_AXIS_BITS) - 1;
const IN_BLOCK_MASK: i32 = BLOCK_SIZE - 1;

#[inline]
fn spread_bits(v: u64) -> u64 {
    let mut x = v & MORTON_AXIS_MASK;
    x = (x | (x << 32)) & 0x001f_0000_0000_ffff;
    x = (x | (x << 16)) & 0x001f_0000_ff00_00ff;
    x = (x | (x << 8)) & 0x100f_00f0_0f00_f00f;
    x = (x | (x << 4)) & 0x10c3_0c30_c30c_30c3;
    x = (x | (x << 2)) & 0x1249_2492_4924_9249;
    x
}

#[inline]
fn compact_bits(v: u64) -> u64 {
    let mut x = v & 0x1249_2492_4924_9249;
    x = (x | (x >> 2)) & 0x10c3_0c30_c30c_30c3;
    x = (x | (x >> 4)) & 0x100f_00f0_0f00_f00f;
    x = (x | (x >> 8)) & 0x001f_0000_ff00_00ff;
    x = (x | (x >> 16)) & 0x001f_0000_0000_ffff;
    x = (x | (x >> 32)) & MORTON_AXIS_MASK;
    x
}

#[inline]
pub fn morton_encode(block: VectorI) -> BlockKey {
    let x = (block.x + BLOCK_COORD_BIAS) as u64;
    let y = (block.y + BLOCK_COORD_BIAS) as u64;
    let z = (block.z + BLOCK_COORD_BIAS) as u64;
    (spread_bits(x) << 2) | (spread_bits(y) << 1) | spread_bits(z)
}

#[inline]
pub fn morton_decode(key: BlockKey) -> VectorI {
    VectorI::new(
        compact_bits(key >> 2) as i32 - BLOCK_COORD_BIAS,
        compact_bits(key >> 1) as i32 - BLOCK_COORD_BIAS,
        compact_bits(key) as i32 - BLOCK_COORD_BIAS,
    )
}

/// Block coordinate containing `cell` (floor division by the block size).
#[inline(always)]
pub fn block_coord(cell: VectorI) -> VectorI {
    cell.map(|c| c >> BLOCK_BITS)
}

#[inline(always)]
pub fn block_key(cell: VectorI) -> BlockKey {
    morton_encode(block_coord(cell))
}

/// Cell coordinate of the first node of a block.
#[inline(always)]
pub fn block_origin(key: BlockKey) -> VectorI {
    morton_decode(key) * BLOCK_SIZE
}

/// Position of `cell` inside its block, x-major.
#[inline(always)]
pub fn in_block_index(cell: VectorI) -> usize {
    (((cell.x & IN_BLOCK_MASK) << (2 * BLOCK_BITS))
        | ((cell.y & IN_BLOCK_MASK) << BLOCK_BITS)
        | (cell.z & IN_BLOCK_MASK)) as usize
}

#[inline(always)]
pub fn in_block_coord(index: usize) -> VectorI {
    let index = index as i32;
    VectorI::new(
        index >> (2 * BLOCK_BITS),
        (index >> BLOCK_BITS) & IN_BLOCK_MASK,
        index & IN_BLOCK_MASK,
    )
}

/// Parity colour of a block. Two blocks of the same colour are at least two
/// blocks apart, so their one-cell halos never overlap.
#[inline(always)]
pub fn block_color(key: BlockKey) -> usize {
    let b = morton_decode(key);
    ((b.x & 1) << 2 | (b.y & 1) << 1 | (b.z & 1)) as usize
}

#[derive(Clone, Debug)]
pub struct GridBlock {
    nodes: Vec<GridState>,
    idle_steps: u32,
}

impl GridBlock {
    fn new() -> Self {
        Self {
            nodes: vec![GridState::zeroed(); ELEMENTS_PER_BLOCK],
            idle_steps: 0,
        }
    }

    #[inline(always)]
    pub fn nodes(&self) -> &[GridState] {
        &self.nodes
    }

    #[inline(always)]
    pub fn nodes_mut(&mut self) -> &mut [GridState] {
        &mut self.nodes
    }

    #[inline(always)]
    pub fn node(&self, index: usize) -> &GridState {
        &self.nodes[index]
    }

    pub fn idle_steps(&self) -> u32 {
        self.idle_steps
    }

    fn has_mass(&self) -> bool {
        self.nodes.iter().any(|n| n.mass() != 0.0)
    }
}

/// Sparse grid made of 4x4x4 blocks keyed by their Morton code. Only blocks
/// touched by a particle stencil (or by the boundary pass) are allocated.
#[derive(Clone, Debug)]
pub struct SparseBlockGrid {
    cell_width: Real,
    blocks: IndexMap<BlockKey, GridBlock>,
    rigid_pages: IndexSet<BlockKey>,
}

impl SparseBlockGrid {
    pub fn new(cell_width: Real) -> Self {
        Self {
            cell_width,
            blocks: IndexMap::new(),
            rigid_pages: IndexSet::new(),
        }
    }

    pub fn cell_width(&self) -> Real {
        self.cell_width
    }

    pub fn inv_cell_width(&self) -> Real {
        1.0 / self.cell_width
    }

    pub fn node_position(&self, cell: VectorI) -> Vector {
        cell.cast::<Real>() * self.cell_width
    }

    #[inline]
    pub fn get(&self, cell: VectorI) -> Option<&GridState> {
        self.blocks
            .get(&block_key(cell))
            .map(|block| &block.nodes[in_block_index(cell)])
    }

    #[inline]
    pub fn get_existing_mut(&mut self, cell: VectorI) -> Option<&mut GridState> {
        self.blocks
            .get_mut(&block_key(cell))
            .map(|block| &mut block.nodes[in_block_index(cell)])
    }

    /// Node at `cell`, allocating its block on first touch.
    #[inline]
    pub fn get_mut(&mut self, cell: VectorI) -> &mut GridState {
        let block = self.touch_block(block_key(cell));
        &mut block.nodes[in_block_index(cell)]
    }

    pub fn touch_block(&mut self, key: BlockKey) -> &mut GridBlock {
        let block = self.blocks.entry(key).or_insert_with(GridBlock::new);
        block.idle_steps = 0;
        block
    }

    pub fn block(&self, key: BlockKey) -> Option<&GridBlock> {
        self.blocks.get(&key)
    }

    pub fn block_mut(&mut self, key: BlockKey) -> Option<&mut GridBlock> {
        self.blocks.get_mut(&key)
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockKey, &GridBlock)> {
        self.blocks.iter().map(|(&key, block)| (key, block))
    }

    pub fn blocks_mut(&mut self) -> impl Iterator<Item = (BlockKey, &mut GridBlock)> {
        self.blocks.iter_mut().map(|(&key, block)| (key, block))
    }

    /// Every allocated node with its cell coordinate.
    pub fn nodes(&self) -> impl Iterator<Item = (VectorI, &GridState)> {
        self.blocks.iter().flat_map(|(&key, block)| {
            let origin = block_origin(key);
            block
                .nodes
                .iter()
                .enumerate()
                .map(move |(i, node)| (origin + in_block_coord(i), node))
        })
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = (VectorI, &mut GridState)> {
        self.blocks.iter_mut().flat_map(|(&key, block)| {
            let origin = block_origin(key);
            block
                .nodes
                .iter_mut()
                .enumerate()
                .map(move |(i, node)| (origin + in_block_coord(i), node))
        })
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Orders blocks along the Morton curve.
    pub fn sort_blocks(&mut self) {
        self.blocks.sort_unstable_keys();
    }

    /// Zeroes the per-step accumulators of every block and advances the idle
    /// counter of blocks that received no mass since the previous reset.
    pub fn reset(&mut self) {
        for block in self.blocks.values_mut() {
            if block.has_mass() {
                block.idle_steps = 0;
            } else {
                block.idle_steps += 1;
            }
            block.nodes.iter_mut().for_each(GridState::reset);
        }
    }

    /// Frees blocks idle for at least `idle_steps` resets. Rigid pages keep
    /// their boundary data and are never reclaimed. Returns the number freed.
    pub fn reclaim(&mut self, idle_steps: u32) -> usize {
        let before = self.blocks.len();
        let rigid_pages = &self.rigid_pages;
        self.blocks
            .retain(|key, block| block.idle_steps < idle_steps || rigid_pages.contains(key));
        before - self.blocks.len()
    }

    /// Writes boundary data for a node owned by a rigid body and marks every
    /// block whose cache halo can reach it as a rigid page.
    pub fn tag_rigid_node(
        &mut self,
        cell: VectorI,
        states: u32,
        rigid_id: i32,
        distance: Real,
    ) -> Result<()> {
        check_rigid_body_id(rigid_id)?;
        let node = self.get_mut(cell);
        node.set_rigid_body_id(rigid_id)?;
        node.set_states(states);
        node.distance = distance;
        self.mark_rigid_node(cell);
        Ok(())
    }

    pub fn mark_rigid_node(&mut self, cell: VectorI) {
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let key = block_key(cell + VectorI::new(dx, dy, dz));
                    self.touch_block(key);
                    self.rigid_pages.insert(key);
                }
            }
        }
    }

    #[inline]
    pub fn is_rigid_page(&self, key: BlockKey) -> bool {
        self.rigid_pages.contains(&key)
    }

    pub fn rigid_page_count(&self) -> usize {
        self.rigid_pages.len()
    }

    pub fn clear_rigid_pages(&mut self) {
        self.rigid_pages.clear();
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.rigid_pages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn morton_round_trips_negative_blocks() {
        for b in [
            VectorI::new(0, 0, 0),
            VectorI::new(-1, 3, 7),
            VectorI::new(1023, -1024, 5),
        ] {
            assert_eq!(morton_decode(morton_encode(b)), b);
        }
    }

    #[test]
    fn adjacent_blocks_have_close_keys() {
        let a = morton_encode(VectorI::new(4, 4, 4));
        let b = morton_encode(VectorI::new(4, 4, 5));
        let far = morton_encode(VectorI::new(40, 4, 4));
        assert_eq!(b - a, 1);
        assert!(far - a > b - a);
    }

    #[test]
    fn cells_map_into_their_block() {
        let cell = VectorI::new(-1, 6, 9);
        let key = block_key(cell);
        assert_eq!(block_origin(key), VectorI::new(-4, 4, 8));
        assert_eq!(in_block_coord(in_block_index(cell)), VectorI::new(3, 2, 1));
    }

    #[test]
    fn same_colour_blocks_are_two_apart() {
        let a = morton_encode(VectorI::new(2, 4, 6));
        let b = morton_encode(VectorI::new(4, 4, 6));
        let c = morton_encode(VectorI::new(3, 4, 6));
        assert_eq!(block_color(a), block_color(b));
        assert_ne!(block_color(a), block_color(c));
    }

    #[test]
    fn allocation_is_lazy_and_reclaim_respects_idle_steps() {
        let mut grid = SparseBlockGrid::new(0.1);
        assert!(grid.get(VectorI::new(5, 5, 5)).is_none());
        grid.get_mut(VectorI::new(5, 5, 5)).velocity_and_mass.w = 1.0;
        assert_eq!(grid.block_count(), 1);

        grid.reset();
        assert_eq!(grid.reclaim(2), 0);
        grid.reset();
        grid.reset();
        assert_eq!(grid.reclaim(2), 1);
        assert!(grid.is_empty());
    }

    #[test]
    fn rigid_tag_marks_neighbouring_pages() {
        let mut grid = SparseBlockGrid::new(0.1);
        let cell = VectorI::new(4, 5, 6);
        grid.tag_rigid_node(cell, 0b10, 0, -0.01).unwrap();
        assert!(grid.is_rigid_page(block_key(cell)));
        assert!(grid.is_rigid_page(block_key(VectorI::new(3, 5, 6))));
        assert!(!grid.is_rigid_page(block_key(VectorI::new(12, 5, 6))));
        assert_eq!(grid.get(cell).unwrap().rigid_body_id(), 0);

        for _ in 0..4 {
            grid.reset();
        }
        assert_eq!(grid.reclaim(1), 0);
    }

    #[test]
    fn rigid_tag_with_unusable_id_touches_nothing() {
        let mut grid = SparseBlockGrid::new(0.1);
        assert!(grid.tag_rigid_node(VectorI::new(4, 5, 6), 0b10, 12, -0.01).is_err());
        assert!(grid.is_empty());
        assert_eq!(grid.rigid_page_count(), 0);
    }
}
