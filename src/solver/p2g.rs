//! Particle-to-Grid (P2G) transfer operations
//!
//! Transfers mass, momentum and internal forces from particles to grid nodes.
//! Pairs a rigid sheet separates are projected against the rigid body instead
//! and only stage an impulse on it.

use std::time::Instant;

use bevy::log::debug;
use rayon::prelude::*;

use crate::config::TransferMode;
use crate::core::block_cache::{GridCache, MomentumCache, stencil_cache_index};
use crate::core::kernel::{INV_D, MlsFastKernel, QuadraticKernel, STENCIL_NODES, stencil_base, stencil_offset};
use crate::core::{BlockMeta, Particle, ParticleSet};
use crate::coupling::{ImpulseLedger, RigidBodySet, friction_project, friction_side, is_incompatible};
use crate::error::Result;
use crate::geometry::{SparseBlockGrid, block_color};
use crate::math::{Matrix, Real, Vector, VectorP};
use crate::solver::{
    CacheStencil, GridStencil, StencilViewMut, TransferParams, cached_stencil_base, cross_offsets,
};

/// Per-particle quantities shared by every stencil node.
struct Deposit {
    pos: Vector,
    mass: Real,
    mass_v: Vector,
    /// `dt * force`.
    dt_force: Matrix,
    /// `4 m B`.
    apic_b: Matrix,
    /// `16 m C`, zero unless the second-order term is enabled.
    apic_c: Matrix,
    gf_mass: Option<Real>,
}

impl Deposit {
    /// Fails before touching the particle when its force is degenerate.
    fn prepare(particle: &mut Particle, params: &TransferParams, with_force: bool) -> Result<Self> {
        let dt_force = if with_force {
            particle.calculate_force()? * params.dt
        } else {
            Matrix::zeros()
        };
        if params.particle_gravity {
            particle.velocity += params.gravity * params.dt;
        }
        let mass = particle.mass;
        let apic_c = if params.quadratic_affine {
            particle.apic_c * (INV_D * INV_D * mass)
        } else {
            Matrix::zeros()
        };
        Ok(Self {
            pos: particle.position * params.inv_dx,
            mass,
            mass_v: particle.velocity * mass,
            dt_force,
            apic_b: particle.apic_b * (INV_D * mass),
            apic_c,
            gf_mass: particle.material.granular_fluidity().map(|gf| gf * mass),
        })
    }

    #[inline(always)]
    fn affine_momentum(&self, dpos: &Vector) -> Vector {
        self.mass_v + self.apic_b * dpos + self.apic_c * cross_offsets(dpos)
    }
}

/// Rasterizes one particle through a coloring-aware stencil.
pub fn rasterize_particle<S: StencilViewMut>(
    particle: &mut Particle,
    stencil: &mut S,
    rigids: &RigidBodySet,
    ledger: &mut ImpulseLedger,
    params: &TransferParams,
    with_force: bool,
) -> Result<()> {
    let deposit = Deposit::prepare(particle, params, with_force)?;
    let kernel = QuadraticKernel::new(&deposit.pos, params.inv_dx);
    let base = stencil.base().cast::<Real>();

    for n in 0..STENCIL_NODES {
        let dw_w = kernel.dw_w(n);
        let (w, grad) = (dw_w.w, dw_w.xyz());
        let node_pos = base + stencil_offset(n).cast::<Real>();
        let dpos = deposit.pos - node_pos;

        let incompatible_body = stencil
            .node(n)
            .filter(|node| is_incompatible(node.states(), particle.states))
            .map(|node| node.rigid_body_id());
        if let Some(body_id) = incompatible_body {
            let Some(body) = rigids.get(body_id) else {
                continue;
            };
            let node_world = node_pos * params.dx;
            let friction = body.friction(friction_side(particle.states, body.id()));
            let projected = friction_project(
                &particle.velocity,
                &body.velocity_at(&node_world),
                &particle.boundary_normal,
                friction,
            );
            let impulse = deposit.mass * w * (particle.velocity - projected) + deposit.dt_force * grad;
            ledger.push(body.id(), impulse, node_world);
            continue;
        }

        let momentum = match params.mode {
            TransferMode::Mls => {
                w * (deposit.affine_momentum(&dpos)
                    - deposit.dt_force * dpos * (INV_D * params.inv_dx))
            }
            TransferMode::Apic => w * deposit.affine_momentum(&dpos) + deposit.dt_force * grad,
        };
        let node = stencil.node_mut(n);
        node.velocity_and_mass += VectorP::new(momentum.x, momentum.y, momentum.z, w * deposit.mass);
        if let Some(gf_mass) = deposit.gf_mass {
            node.granular_fluidity += w * gf_mass;
        }
    }
    Ok(())
}

/// Rasterizes one particle of a block without rigid coloring. The MLS mode
/// folds the force into the affine matrix and only needs kernel weights.
pub fn rasterize_momentum_particle(
    particle: &mut Particle,
    cache: &mut MomentumCache,
    params: &TransferParams,
    with_force: bool,
) -> Result<()> {
    let base_local = cached_stencil_base(cache, particle, params.inv_dx)?;
    let deposit = Deposit::prepare(particle, params, with_force)?;
    let base = cache.cell(base_local);
    let fx = deposit.pos - base.cast::<Real>();

    let mut scatter = |n: usize, momentum: Vector, weight: Real| {
        *cache.node_mut(stencil_cache_index(base_local, n)) +=
            VectorP::new(momentum.x, momentum.y, momentum.z, weight * deposit.mass);
    };

    match params.mode {
        TransferMode::Mls => {
            let kernel = MlsFastKernel::new(&fx);
            let affine = deposit.apic_b + deposit.dt_force * (-INV_D * params.inv_dx);
            for n in 0..STENCIL_NODES {
                let w = kernel.weight(n);
                let dpos = fx - stencil_offset(n).cast::<Real>();
                let momentum =
                    deposit.mass_v + affine * dpos + deposit.apic_c * cross_offsets(&dpos);
                scatter(n, w * momentum, w);
            }
        }
        TransferMode::Apic => {
            let kernel = QuadraticKernel::from_offset(&fx, params.inv_dx);
            for n in 0..STENCIL_NODES {
                let dw_w = kernel.dw_w(n);
                let dpos = fx - stencil_offset(n).cast::<Real>();
                let momentum =
                    dw_w.w * deposit.affine_momentum(&dpos) + deposit.dt_force * dw_w.xyz();
                scatter(n, momentum, dw_w.w);
            }
        }
    }
    Ok(())
}

/// Cache used by one block during a pass.
pub(crate) enum CachedBlock {
    Full(GridCache),
    Momentum(MomentumCache),
}

impl CachedBlock {
    fn scatter(self, grid: &mut SparseBlockGrid) {
        match self {
            Self::Full(cache) => cache.scatter(grid),
            Self::Momentum(cache) => cache.scatter(grid),
        }
    }
}

/// Blocks near a rigid body need coloring, blocks with nonlocal particles
/// need the fluidity field; both go through the full node cache.
#[inline]
pub(crate) fn needs_full_cache(grid: &SparseBlockGrid, meta: &BlockMeta) -> bool {
    grid.is_rigid_page(meta.key) || meta.carries_fluidity
}

fn rasterize_block(
    grid: &SparseBlockGrid,
    rigids: &RigidBodySet,
    meta: &BlockMeta,
    particles: &mut [Particle],
    params: &TransferParams,
) -> Result<(CachedBlock, ImpulseLedger)> {
    let mut ledger = ImpulseLedger::new();
    let deformable = particles.iter_mut().filter(|p| !p.is_rigid());

    if needs_full_cache(grid, meta) {
        let mut cache = GridCache::gather(grid, meta.key);
        for particle in deformable {
            let base_local = cached_stencil_base(&cache, particle, params.inv_dx)?;
            let mut stencil = CacheStencil {
                cache: &mut cache,
                base_local,
            };
            rasterize_particle(particle, &mut stencil, rigids, &mut ledger, params, true)?;
        }
        Ok((CachedBlock::Full(cache), ledger))
    } else {
        let mut cache = MomentumCache::gather(grid, meta.key);
        for particle in deformable {
            rasterize_momentum_particle(particle, &mut cache, params, true)?;
        }
        Ok((CachedBlock::Momentum(cache), ledger))
    }
}

/// Reference rasterization straight into the sparse grid.
pub fn rasterize(
    particles: &mut ParticleSet,
    grid: &mut SparseBlockGrid,
    rigids: &mut RigidBodySet,
    params: &TransferParams,
    with_force: bool,
) -> Result<()> {
    let start = Instant::now();
    rigids.reset_tmp_velocity();

    let mut ledger = ImpulseLedger::new();
    for particle in particles.iter_mut().filter(|p| !p.is_rigid()) {
        let base = stencil_base(&(particle.position * params.inv_dx));
        let mut stencil = GridStencil {
            grid: &mut *grid,
            base,
        };
        rasterize_particle(particle, &mut stencil, rigids, &mut ledger, params, with_force)?;
    }

    ledger.replay(rigids);
    rigids.apply_tmp_velocity();
    debug!("rasterize: {:.3}ms", start.elapsed().as_secs_f32() * 1000.0);
    Ok(())
}

/// Block-parallel rasterization. Blocks are processed one parity colour at a
/// time so that the caches of concurrently processed blocks never overlap;
/// staged impulses are replayed in block order.
pub fn rasterize_optimized(
    particles: &mut ParticleSet,
    grid: &mut SparseBlockGrid,
    rigids: &mut RigidBodySet,
    params: &TransferParams,
) -> Result<()> {
    let start = Instant::now();
    rigids.reset_tmp_velocity();

    let mut colors: [Vec<(BlockMeta, &mut [Particle])>; 8] = Default::default();
    for (meta, slice) in particles.block_slices_mut()? {
        colors[block_color(meta.key)].push((meta, slice));
    }

    let mut ledgers = Vec::new();
    for blocks in &mut colors {
        let processed = {
            let grid: &SparseBlockGrid = grid;
            let rigids: &RigidBodySet = rigids;
            blocks
                .par_iter_mut()
                .map(|(meta, slice)| {
                    rasterize_block(grid, rigids, meta, &mut **slice, params)
                        .map(|(cache, ledger)| (meta.particle_offset, cache, ledger))
                })
                .collect::<Result<Vec<_>>>()?
        };
        for (offset, cache, ledger) in processed {
            cache.scatter(grid);
            ledgers.push((offset, ledger));
        }
    }

    ledgers.sort_unstable_by_key(|(offset, _)| *offset);
    for (_, ledger) in ledgers {
        ledger.replay(rigids);
    }
    rigids.apply_tmp_velocity();
    debug!(
        "rasterize_optimized: {:.3}ms",
        start.elapsed().as_secs_f32() * 1000.0
    );
    Ok(())
}
