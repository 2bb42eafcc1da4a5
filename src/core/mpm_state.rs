use bevy::prelude::*;

use crate::config::SolverParams;
use crate::coupling::{RigidBody, RigidBodySet};
use crate::error::Result;
use crate::geometry::SparseBlockGrid;
use crate::math::{Real, Vector, VectorI};
use crate::solver::{self, TransferParams};

use super::grid::GridState;
use super::particle::Particle;
use super::particle_set::ParticleSet;

/// Aggregate simulation state for the solver.
#[derive(Resource)]
pub struct MpmState {
    particle_set: ParticleSet,
    grid: SparseBlockGrid,
    solver_params: SolverParams,
    rigid_bodies: RigidBodySet,
    /// Sum of the plasticity codes reported by the last resample.
    plasticity_events: i32,
}

impl MpmState {
    pub fn new(solver_params: SolverParams) -> Self {
        Self {
            particle_set: ParticleSet::new(),
            grid: SparseBlockGrid::new(solver_params.cell_width),
            solver_params,
            rigid_bodies: RigidBodySet::new(),
            plasticity_events: 0,
        }
    }

    pub fn particle_set(&self) -> &ParticleSet {
        &self.particle_set
    }

    pub fn particle_set_mut(&mut self) -> &mut ParticleSet {
        &mut self.particle_set
    }

    pub fn particle_count(&self) -> usize {
        self.particle_set.len()
    }

    pub fn particles(&self) -> &[Particle] {
        self.particle_set.particles()
    }

    pub fn particles_mut(&mut self) -> &mut [Particle] {
        self.particle_set.particles_mut()
    }

    pub fn add_particle(&mut self, particle: Particle) -> usize {
        self.particle_set.insert(particle)
    }

    pub fn grid(&self) -> &SparseBlockGrid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut SparseBlockGrid {
        &mut self.grid
    }

    pub fn solver_params(&self) -> &SolverParams {
        &self.solver_params
    }

    pub fn rigid_bodies(&self) -> &RigidBodySet {
        &self.rigid_bodies
    }

    pub fn rigid_bodies_mut(&mut self) -> &mut RigidBodySet {
        &mut self.rigid_bodies
    }

    pub fn add_rigid_body(&mut self, body: impl RigidBody + 'static) -> Result<i32> {
        self.rigid_bodies.insert(body)
    }

    /// `None` for the `-1` sentinel.
    pub fn rigid_body(&self, id: i32) -> Option<&dyn RigidBody> {
        self.rigid_bodies.get(id)
    }

    pub fn plasticity_events(&self) -> i32 {
        self.plasticity_events
    }

    /// Node record at `cell`, `None` if its block is not allocated.
    pub fn get_grid(&self, cell: VectorI) -> Option<&GridState> {
        self.grid.get(cell)
    }

    /// Velocity of the node at `cell`; zero for unallocated nodes.
    pub fn grid_velocity(&self, cell: VectorI) -> Vector {
        self.grid
            .get(cell)
            .map_or_else(Vector::zeros, GridState::velocity)
    }

    fn transfer_params(&self, dt: Real) -> TransferParams {
        TransferParams::new(&self.solver_params, dt)
    }

    /// Resets the grid accumulators and re-bins particles into blocks.
    pub fn rebuild_blocks(&mut self) {
        self.grid.reset();
        self.particle_set.rebuild_blocks(&mut self.grid);
    }

    pub fn rasterize(&mut self, dt: Real, with_force: bool) -> Result<()> {
        let params = self.transfer_params(dt);
        solver::rasterize(
            &mut self.particle_set,
            &mut self.grid,
            &mut self.rigid_bodies,
            &params,
            with_force,
        )
    }

    pub fn rasterize_optimized(&mut self, dt: Real) -> Result<()> {
        let params = self.transfer_params(dt);
        solver::rasterize_optimized(
            &mut self.particle_set,
            &mut self.grid,
            &mut self.rigid_bodies,
            &params,
        )
    }

    pub fn grid_update(&mut self, dt: Real) {
        let params = self.transfer_params(dt);
        solver::grid_update(&mut self.grid, &params);
    }

    /// Resampling always advances by `base_delta_t`.
    pub fn resample(&mut self) -> Result<()> {
        let params = self.transfer_params(self.solver_params.base_delta_t);
        self.plasticity_events = solver::resample(
            &mut self.particle_set,
            &self.grid,
            &mut self.rigid_bodies,
            &params,
        )?;
        Ok(())
    }

    pub fn resample_optimized(&mut self) -> Result<()> {
        let params = self.transfer_params(self.solver_params.base_delta_t);
        self.plasticity_events = solver::resample_optimized(
            &mut self.particle_set,
            &self.grid,
            &mut self.rigid_bodies,
            &params,
        )?;
        Ok(())
    }

    /// Frees blocks that stayed massless for `block_idle_steps` resets.
    pub fn reclaim_blocks(&mut self) -> usize {
        let freed = self.grid.reclaim(self.solver_params.block_idle_steps);
        if freed > 0 {
            info!(
                "reclaimed {freed} idle grid blocks, {} remain",
                self.grid.block_count()
            );
        }
        freed
    }

    /// Smallest stable time step over all particles.
    pub fn allowed_dt(&self) -> Result<Real> {
        let dx = self.solver_params.cell_width;
        self.particle_set
            .iter()
            .try_fold(Real::INFINITY, |min, particle| Ok(min.min(particle.allowed_dt(dx)?)))
    }

    /// One full step with the optimized passes and `dt = base_delta_t`.
    pub fn step(&mut self) -> Result<()> {
        let dt = self.solver_params.base_delta_t;
        self.rebuild_blocks();
        self.rasterize_optimized(dt)?;
        self.grid_update(dt);
        self.resample_optimized()?;
        self.reclaim_blocks();
        Ok(())
    }

    /// Same as [`step`](Self::step) through the reference passes.
    pub fn step_generic(&mut self) -> Result<()> {
        let dt = self.solver_params.base_delta_t;
        self.rebuild_blocks();
        self.rasterize(dt, true)?;
        self.grid_update(dt);
        self.resample()?;
        self.reclaim_blocks();
        Ok(())
    }
}
