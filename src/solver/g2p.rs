//! Grid-to-Particle (G2P) transfer operations
//!
//! Transfers velocities and velocity gradients from grid nodes back to particles.
//! Updates particle positions and deformation state.

use std::time::Instant;

use bevy::log::debug;
use rayon::prelude::*;

use crate::config::{PENALTY_BAND_INNER, PENALTY_BAND_OUTER, POSITION_CLAMP_EPSILON, TransferMode};
use crate::core::block_cache::{GridCache, MomentumCache, stencil_cache_index};
use crate::core::kernel::{INV_D, MlsFastKernel, QuadraticKernel, STENCIL_NODES, stencil_base, stencil_offset};
use crate::core::{BlockMeta, Particle, ParticleSet};
use crate::coupling::{ImpulseLedger, RigidBodySet, friction_project, friction_side, is_incompatible};
use crate::error::Result;
use crate::geometry::SparseBlockGrid;
use crate::math::{Matrix, Real, Vector, identity_matrix, outer_product};
use crate::solver::p2g::needs_full_cache;
use crate::solver::{
    CacheStencil, GridStencil, StencilView, TransferParams, cached_stencil_base, cross_offsets,
};

/// Interpolated grid quantities for one particle.
struct Gathered {
    velocity: Vector,
    apic_b: Matrix,
    apic_c: Matrix,
    /// Kernel-gradient velocity gradient, APIC mode only.
    grad_v: Matrix,
    laplacian_gf: Real,
    /// Last rigid body seen at an incompatible node.
    rigid_id: i32,
}

impl Gathered {
    fn new() -> Self {
        Self {
            velocity: Vector::zeros(),
            apic_b: Matrix::zeros(),
            apic_c: Matrix::zeros(),
            grad_v: Matrix::zeros(),
            laplacian_gf: 0.0,
            rigid_id: -1,
        }
    }

    #[inline(always)]
    fn add(&mut self, w: Real, grid_v: &Vector, dpos: &Vector, quadratic_affine: bool) {
        let wv = *grid_v * w;
        self.velocity += wv;
        self.apic_b += outer_product(&wv, dpos);
        if quadratic_affine {
            self.apic_c += outer_product(&wv, &cross_offsets(dpos));
        }
    }
}

/// Resamples one particle through a coloring-aware stencil.
pub fn resample_particle<S: StencilView>(
    particle: &mut Particle,
    stencil: &S,
    rigids: &RigidBodySet,
    ledger: &mut ImpulseLedger,
    params: &TransferParams,
) -> Result<i32> {
    let pos = particle.position * params.inv_dx;
    let kernel = QuadraticKernel::new(&pos, params.inv_dx);
    let base = stencil.base().cast::<Real>();
    let mut gathered = Gathered::new();

    for n in 0..STENCIL_NODES {
        let dw_w = kernel.dw_w(n);
        let node_pos = base + stencil_offset(n).cast::<Real>();
        let dpos = pos - node_pos;

        let (mut grid_v, gf, states, body_id) = match stencil.node(n) {
            Some(node) => (
                node.velocity(),
                node.granular_fluidity,
                node.states(),
                node.rigid_body_id(),
            ),
            None => (Vector::zeros(), 0.0, 0, -1),
        };

        if is_incompatible(states, particle.states) {
            let mut fake_v = particle.velocity;
            let mut body_v = Vector::zeros();
            let mut friction = 0.0;
            if let Some(body) = rigids.get(body_id) {
                body_v = body.velocity_at(&(node_pos * params.dx));
                friction = body.friction(friction_side(particle.states, body.id()));
                gathered.rigid_id = body.id();
            }
            if particle.near_boundary {
                if particle.sticky {
                    friction = -1.0;
                }
                fake_v = friction_project(&particle.velocity, &body_v, &particle.boundary_normal, friction)
                    + particle.boundary_normal * (params.dt * params.dx * params.pushing_force);
            }
            grid_v = fake_v;
        }

        gathered.add(dw_w.w, &grid_v, &dpos, params.quadratic_affine);
        gathered.grad_v += outer_product(&grid_v, &dw_w.xyz());
        gathered.laplacian_gf += gf * kernel.laplacian(n);
    }

    finish_particle(particle, gathered, ledger, params)
}

/// Resamples one particle of a block without coloring or fluidity.
pub fn resample_momentum_particle(
    particle: &mut Particle,
    cache: &MomentumCache,
    ledger: &mut ImpulseLedger,
    params: &TransferParams,
) -> Result<i32> {
    let base_local = cached_stencil_base(cache, particle, params.inv_dx)?;
    let pos = particle.position * params.inv_dx;
    let fx = pos - cache.cell(base_local).cast::<Real>();
    let grid_v = |n: usize| cache.node(stencil_cache_index(base_local, n)).xyz();
    let mut gathered = Gathered::new();

    match params.mode {
        TransferMode::Mls => {
            let kernel = MlsFastKernel::new(&fx);
            for n in 0..STENCIL_NODES {
                let dpos = fx - stencil_offset(n).cast::<Real>();
                gathered.add(kernel.weight(n), &grid_v(n), &dpos, params.quadratic_affine);
            }
        }
        TransferMode::Apic => {
            let kernel = QuadraticKernel::from_offset(&fx, params.inv_dx);
            for n in 0..STENCIL_NODES {
                let dw_w = kernel.dw_w(n);
                let v = grid_v(n);
                let dpos = fx - stencil_offset(n).cast::<Real>();
                gathered.add(dw_w.w, &v, &dpos, params.quadratic_affine);
                gathered.grad_v += outer_product(&v, &dw_w.xyz());
            }
        }
    }

    finish_particle(particle, gathered, ledger, params)
}

/// Plasticity first, so that a failing particle is left untouched; then
/// velocity, affine state, advection and the boundary penalty.
fn finish_particle(
    particle: &mut Particle,
    gathered: Gathered,
    ledger: &mut ImpulseLedger,
    params: &TransferParams,
) -> Result<i32> {
    let dt = params.dt;
    let grad_v = match params.mode {
        TransferMode::Mls => gathered.apic_b * (-INV_D * params.inv_dx),
        TransferMode::Apic => gathered.grad_v,
    };
    let cdg = identity_matrix() + dt * grad_v;
    let code = particle.plasticity(&cdg, gathered.laplacian_gf)?;

    if particle.near_boundary {
        particle.apic_b = Matrix::zeros();
        particle.apic_c = Matrix::zeros();
    } else {
        particle.apic_b = gathered.apic_b;
        particle.apic_c = if params.quadratic_affine {
            gathered.apic_c
        } else {
            Matrix::zeros()
        };
    }
    particle.velocity = gathered.velocity;

    let advected = (particle.position + dt * particle.velocity) * params.inv_dx;
    particle.position = advected.zip_map(&params.resolution, |x, res| {
        x.clamp(1.0, res - 1.0 - POSITION_CLAMP_EPSILON)
    }) * params.dx;

    if particle.near_boundary {
        let distance = particle.boundary_distance;
        if distance < -PENALTY_BAND_INNER * params.dx && distance > -PENALTY_BAND_OUTER * params.dx {
            let dv = distance * particle.boundary_normal * params.penalty;
            particle.velocity -= dv;
            if gathered.rigid_id != -1 {
                ledger.push(gathered.rigid_id, dv * particle.mass, particle.position);
            }
        }
    }
    Ok(code)
}

fn resample_block(
    grid: &SparseBlockGrid,
    rigids: &RigidBodySet,
    meta: &BlockMeta,
    particles: &mut [Particle],
    params: &TransferParams,
) -> Result<(i32, ImpulseLedger)> {
    let mut ledger = ImpulseLedger::new();
    let mut plastic = 0;
    let deformable = particles.iter_mut().filter(|p| !p.is_rigid());

    if needs_full_cache(grid, meta) {
        let cache = GridCache::gather(grid, meta.key);
        for particle in deformable {
            let stencil = CacheStencil {
                cache: &cache,
                base_local: cached_stencil_base(&cache, particle, params.inv_dx)?,
            };
            plastic += resample_particle(particle, &stencil, rigids, &mut ledger, params)?;
        }
    } else {
        let cache = MomentumCache::gather(grid, meta.key);
        for particle in deformable {
            plastic += resample_momentum_particle(particle, &cache, &mut ledger, params)?;
        }
    }
    Ok((plastic, ledger))
}

/// Reference resampling straight from the sparse grid. Returns the sum of
/// the plasticity codes.
pub fn resample(
    particles: &mut ParticleSet,
    grid: &SparseBlockGrid,
    rigids: &mut RigidBodySet,
    params: &TransferParams,
) -> Result<i32> {
    let start = Instant::now();
    rigids.reset_tmp_velocity();

    let mut ledger = ImpulseLedger::new();
    let mut plastic = 0;
    for particle in particles.iter_mut().filter(|p| !p.is_rigid()) {
        let stencil = GridStencil {
            grid,
            base: stencil_base(&(particle.position * params.inv_dx)),
        };
        plastic += resample_particle(particle, &stencil, rigids, &mut ledger, params)?;
    }

    ledger.replay(rigids);
    rigids.apply_tmp_velocity();
    debug!("resample: {:.3}ms", start.elapsed().as_secs_f32() * 1000.0);
    Ok(plastic)
}

/// Block-parallel resampling. The grid is only read, so every block runs at
/// once; staged impulses are replayed in block order.
pub fn resample_optimized(
    particles: &mut ParticleSet,
    grid: &SparseBlockGrid,
    rigids: &mut RigidBodySet,
    params: &TransferParams,
) -> Result<i32> {
    let start = Instant::now();
    rigids.reset_tmp_velocity();

    let processed = {
        let rigids: &RigidBodySet = rigids;
        particles
            .block_slices_mut()?
            .into_par_iter()
            .map(|(meta, slice)| resample_block(grid, rigids, &meta, slice, params))
            .collect::<Result<Vec<_>>>()?
    };

    let mut plastic = 0;
    for (count, ledger) in processed {
        plastic += count;
        ledger.replay(rigids);
    }
    rigids.apply_tmp_velocity();
    debug!(
        "resample_optimized: {:.3}ms",
        start.elapsed().as_secs_f32() * 1000.0
    );
    Ok(plastic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MaterialConfig, MaterialKind, SolverParams};
    use crate::error::MpmError;
    use crate::math::{VectorI, VectorP};

    fn params() -> TransferParams {
        let solver = SolverParams::default()
            .with_cell_width(1.0)
            .with_gravity(Vector::zeros());
        TransferParams::new(&solver, 1e-3)
    }

    fn grid_with(around: VectorI, velocity: impl Fn(VectorI) -> Vector) -> SparseBlockGrid {
        let mut grid = SparseBlockGrid::new(1.0);
        for x in -2..=2 {
            for y in -2..=2 {
                for z in -2..=2 {
                    let cell = around + VectorI::new(x, y, z);
                    let v = velocity(cell);
                    grid.get_mut(cell).velocity_and_mass = VectorP::new(v.x, v.y, v.z, 1.0);
                }
            }
        }
        grid
    }

    fn uniform_grid(around: VectorI, velocity: Vector) -> SparseBlockGrid {
        grid_with(around, |_| velocity)
    }

    fn water(position: Vector) -> Particle {
        Particle::from_config(position, 1.0, 1.0, MaterialKind::Water, &MaterialConfig::new())
    }

    #[test]
    fn uniform_flow_is_picked_up_without_shear() {
        let v = Vector::new(0.5, -1.0, 2.0);
        let grid = uniform_grid(VectorI::new(10, 10, 10), v);
        let start = Vector::new(10.2, 9.7, 10.4);
        let mut set = ParticleSet::from_particles(vec![water(start)]);

        resample(&mut set, &grid, &mut RigidBodySet::new(), &params()).unwrap();
        let particle = &set.particles()[0];
        assert!((particle.velocity - v).norm() < 1e-5);
        assert!(particle.apic_b.norm() < 1e-5);
        assert!((particle.position - (start + v * 1e-3)).norm() < 1e-5);
    }

    #[test]
    fn quadratic_flow_is_picked_up_into_the_second_order_term() {
        // v_x = X Y in grid units: sum w v_x dx dy = E[dx^2] E[dy^2] = 1/16
        let bilinear = |cell: VectorI| Vector::new((cell.x * cell.y) as Real, 0.0, 0.0);
        let start = Vector::new(10.3, 9.6, 10.2);

        for (quadratic_affine, expected) in [(true, 0.0625), (false, 0.0)] {
            let solver = SolverParams::default()
                .with_cell_width(1.0)
                .with_gravity(Vector::zeros())
                .with_quadratic_affine(quadratic_affine);
            let params = TransferParams::new(&solver, 1e-3);

            let grid = grid_with(VectorI::new(10, 10, 10), bilinear);
            let mut set = ParticleSet::from_particles(vec![water(start)]);
            resample(&mut set, &grid, &mut RigidBodySet::new(), &params).unwrap();
            let generic = set.particles()[0].apic_c;
            assert!((generic[(0, 0)] - expected).abs() < 1e-4, "{generic}");
            assert!(generic[(0, 1)].abs() < 1e-4);

            let mut grid = grid_with(VectorI::new(10, 10, 10), bilinear);
            let mut set = ParticleSet::from_particles(vec![water(start)]);
            set.rebuild_blocks(&mut grid);
            resample_optimized(&mut set, &grid, &mut RigidBodySet::new(), &params).unwrap();
            let optimized = set.particles()[0].apic_c;
            assert!((optimized - generic).norm() < 1e-4);
        }
    }

    #[test]
    fn moved_particle_is_refused_by_the_block_pass() {
        let mut grid = uniform_grid(VectorI::new(10, 10, 10), Vector::zeros());
        let mut set = ParticleSet::from_particles(vec![water(Vector::new(10.2, 10.2, 10.2))]);
        set.rebuild_blocks(&mut grid);
        set.particles_mut()[0].position.x += 2.5;
        let moved = set.particles()[0].clone();

        let result = resample_optimized(&mut set, &grid, &mut RigidBodySet::new(), &params());
        assert!(matches!(result, Err(MpmError::ParticleLeftBlock { .. })));
        assert_eq!(set.particles()[0], moved);
    }

    #[test]
    fn penetrating_particle_is_pushed_out() {
        let grid = uniform_grid(VectorI::new(10, 10, 10), Vector::zeros());
        let normal = Vector::new(0.0, 1.0, 0.0);
        let mut set = ParticleSet::from_particles(vec![
            water(Vector::new(10.0, 10.0, 10.0)).with_boundary(-0.1, normal),
        ]);

        resample(&mut set, &grid, &mut RigidBodySet::new(), &params()).unwrap();
        // dv = -0.1 * n * 1e3
        assert!((set.particles()[0].velocity - normal * 100.0).norm() < 1e-3);
    }

    #[test]
    fn position_is_kept_inside_the_domain() {
        let grid = uniform_grid(VectorI::new(1, 1, 1), Vector::new(-1000.0, 0.0, 0.0));
        let mut set = ParticleSet::from_particles(vec![water(Vector::new(1.2, 1.5, 1.5))]);
        resample(&mut set, &grid, &mut RigidBodySet::new(), &params()).unwrap();
        assert_eq!(set.particles()[0].position.x, 1.0);
    }
}
