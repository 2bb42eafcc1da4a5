use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::constants::{
    DEFAULT_BASE_DELTA_T, DEFAULT_BLOCK_IDLE_STEPS, DEFAULT_PENALTY, DEFAULT_PUSHING_FORCE,
    GRAVITY_Y,
};
use crate::math::{Real, Vector};

/// How the velocity gradient is reconstructed during the transfers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferMode {
    /// Moving least squares: the affine matrix doubles as the velocity
    /// gradient through the fixed inverse inertia `4 / h`.
    #[default]
    Mls,
    /// APIC with explicit kernel weight gradients.
    Apic,
}

/// Solver parameters shared by both transfer passes.
#[derive(Resource, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolverParams {
    /// World-space width of one grid cell (`h`).
    pub cell_width: Real,
    /// Domain size in cells along each axis.
    pub resolution: [u32; 3],
    /// Time step used by resampling and by the stepping systems.
    pub base_delta_t: Real,
    pub gravity: Vector,
    /// Apply gravity to particle velocities before rasterization instead of on
    /// the grid.
    pub particle_gravity: bool,
    pub transfer_mode: TransferMode,
    /// Carry the second-order affine term `apic_c`.
    pub quadratic_affine: bool,
    /// Stiffness of the restoring impulse for slightly penetrating particles.
    pub penalty: Real,
    /// Outward bias (per `h` and `dt`) applied to near-boundary particles at
    /// incompatible nodes.
    pub pushing_force: Real,
    /// Consecutive massless resets after which a block is reclaimed.
    pub block_idle_steps: u32,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            cell_width: 1.0 / 64.0,
            resolution: [64, 64, 64],
            base_delta_t: DEFAULT_BASE_DELTA_T,
            gravity: Vector::new(0.0, GRAVITY_Y, 0.0),
            particle_gravity: true,
            transfer_mode: TransferMode::Mls,
            quadratic_affine: false,
            penalty: DEFAULT_PENALTY,
            pushing_force: DEFAULT_PUSHING_FORCE,
            block_idle_steps: DEFAULT_BLOCK_IDLE_STEPS,
        }
    }
}

impl SolverParams {
    pub fn with_cell_width(mut self, cell_width: Real) -> Self {
        self.cell_width = cell_width;
        self
    }

    pub fn with_resolution(mut self, resolution: [u32; 3]) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_delta_t(mut self, base_delta_t: Real) -> Self {
        self.base_delta_t = base_delta_t;
        self
    }

    pub fn with_gravity(mut self, gravity: Vector) -> Self {
        self.gravity = gravity;
        self
    }

    /// Gravity is added to the grid during the grid update instead.
    pub fn with_grid_gravity(mut self) -> Self {
        self.particle_gravity = false;
        self
    }

    pub fn with_transfer_mode(mut self, transfer_mode: TransferMode) -> Self {
        self.transfer_mode = transfer_mode;
        self
    }

    pub fn with_quadratic_affine(mut self, enabled: bool) -> Self {
        self.quadratic_affine = enabled;
        self
    }

    pub fn with_penalty(mut self, penalty: Real) -> Self {
        self.penalty = penalty;
        self
    }

    pub fn with_pushing_force(mut self, pushing_force: Real) -> Self {
        self.pushing_force = pushing_force;
        self
    }

    pub fn with_block_idle_steps(mut self, steps: u32) -> Self {
        self.block_idle_steps = steps.max(1);
        self
    }

    #[inline]
    pub fn inv_cell_width(&self) -> Real {
        1.0 / self.cell_width
    }

    #[inline]
    pub fn resolution_vector(&self) -> Vector {
        Vector::new(
            self.resolution[0] as Real,
            self.resolution[1] as Real,
            self.resolution[2] as Real,
        )
    }
}
