use std::io::{Read, Write};

use crate::core::Particle;
use crate::core::kernel::nearest_node;
use crate::error::{MpmError, Result};
use crate::geometry::{BlockKey, SparseBlockGrid, block_key, in_block_index};
use crate::math::{Real, Vector, VectorI};

/// Contiguous run of particles binned to one grid block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockMeta {
    pub key: BlockKey,
    pub particle_offset: usize,
    pub particle_count: usize,
    /// Some particle of the block transports granular fluidity.
    pub carries_fluidity: bool,
}

impl BlockMeta {
    #[inline]
    pub fn range(&self) -> std::ops::Range<usize> {
        self.particle_offset..self.particle_offset + self.particle_count
    }
}

#[derive(Clone, Debug, Default)]
pub struct ParticleSet {
    particles: Vec<Particle>,
    blocks: Vec<BlockMeta>,
}

impl ParticleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_particles(particles: Vec<Particle>) -> Self {
        Self {
            particles,
            blocks: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Particle> {
        self.particles.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Particle> {
        self.particles.iter_mut()
    }

    /// Adds a particle. Block metadata is stale until the next rebuild.
    pub fn insert(&mut self, particle: Particle) -> usize {
        let index = self.particles.len();
        self.particles.push(particle);
        self.blocks.clear();
        index
    }

    pub fn insert_batch(&mut self, mut batch: Vec<Particle>) {
        self.particles.append(&mut batch);
        self.blocks.clear();
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    pub fn get(&self, index: usize) -> Option<&Particle> {
        self.particles.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Particle> {
        self.particles.get_mut(index)
    }

    pub fn clear(&mut self) {
        self.particles.clear();
        self.blocks.clear();
    }

    /// Per-block runs, in Morton order, from the last rebuild.
    pub fn blocks(&self) -> &[BlockMeta] {
        &self.blocks
    }

    /// Sorts particles by (block, node) of their nearest grid node, writes
    /// per-node particle counts into the grid and allocates every block a
    /// particle stencil can reach. The grid must have been reset beforehand.
    pub fn rebuild_blocks(&mut self, grid: &mut SparseBlockGrid) {
        let inv_dx = grid.inv_cell_width();
        let binned_cell = |p: &Particle| nearest_node(&(p.position * inv_dx));

        self.particles.sort_by_cached_key(|p| {
            let cell = binned_cell(p);
            (block_key(cell), in_block_index(cell))
        });

        self.blocks.clear();
        for (index, particle) in self.particles.iter().enumerate() {
            let cell = binned_cell(particle);
            let key = block_key(cell);
            grid.get_mut(cell).particle_count += 1;

            // The stencil spans cell - 1 ..= cell + 1; its corners cover every
            // block it can touch.
            for corner in 0..8 {
                let offset = VectorI::new(
                    if corner & 4 != 0 { 1 } else { -1 },
                    if corner & 2 != 0 { 1 } else { -1 },
                    if corner & 1 != 0 { 1 } else { -1 },
                );
                grid.touch_block(block_key(cell + offset));
            }

            let carries_fluidity = particle.material.granular_fluidity().is_some();
            match self.blocks.last_mut() {
                Some(meta) if meta.key == key => {
                    meta.particle_count += 1;
                    meta.carries_fluidity |= carries_fluidity;
                }
                _ => self.blocks.push(BlockMeta {
                    key,
                    particle_offset: index,
                    particle_count: 1,
                    carries_fluidity,
                }),
            }
        }
        grid.sort_blocks();
    }

    /// Splits the particle storage into the exclusive slice of every block.
    /// Fails when particles were added after the last rebuild.
    pub fn block_slices_mut(&mut self) -> Result<Vec<(BlockMeta, &mut [Particle])>> {
        let binned: usize = self.blocks.iter().map(|meta| meta.particle_count).sum();
        if binned != self.particles.len() {
            return Err(MpmError::StaleBlocks {
                binned,
                particles: self.particles.len(),
            });
        }

        let mut slices = Vec::with_capacity(self.blocks.len());
        let mut rest = self.particles.as_mut_slice();
        for meta in &self.blocks {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(meta.particle_count);
            slices.push((*meta, head));
            rest = tail;
        }
        Ok(slices)
    }

    pub fn total_mass(&self) -> Real {
        self.particles.iter().map(|p| p.mass).sum()
    }

    pub fn total_momentum(&self) -> Vector {
        self.particles.iter().map(Particle::momentum).sum()
    }

    pub fn save(&self, writer: impl Write) -> Result<()> {
        serde_json::to_writer(writer, &self.particles)?;
        Ok(())
    }

    pub fn load(reader: impl Read) -> Result<Self> {
        Ok(Self::from_particles(serde_json::from_reader(reader)?))
    }
}
