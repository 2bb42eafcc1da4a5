use std::time::Instant;

use bevy::log::debug;

use crate::config::WALL_CELLS;
use crate::geometry::SparseBlockGrid;
use crate::math::{Real, Vector, VectorP};
use crate::solver::TransferParams;

/// Grid update stage: divides momentum and fluidity by mass, applies grid
/// gravity and clamps the normal velocity at the domain walls.
pub fn grid_update(grid: &mut SparseBlockGrid, params: &TransferParams) {
    let start = Instant::now();
    let upper = params.resolution.map(|r| r as i32 - 1 - WALL_CELLS);

    for (cell, node) in grid.nodes_mut() {
        let mass = node.mass();
        if mass <= 0.0 {
            continue;
        }

        let mut velocity = node.velocity() / mass;
        if !params.particle_gravity {
            velocity += params.gravity * params.dt;
        }
        node.granular_fluidity /= mass;

        // Slip walls
        for axis in 0..3 {
            if cell[axis] < WALL_CELLS || cell[axis] > upper[axis] {
                velocity[axis] = 0.0;
            }
        }
        node.velocity_and_mass = VectorP::new(velocity.x, velocity.y, velocity.z, mass);
    }
    debug!("grid_update: {:.3}ms", start.elapsed().as_secs_f32() * 1000.0);
}

/// Total grid momentum, valid between rasterization and the grid update.
pub fn grid_momentum(grid: &SparseBlockGrid) -> (Vector, Real) {
    grid.nodes().fold((Vector::zeros(), 0.0), |(momentum, mass), (_, node)| {
        (momentum + node.velocity(), mass + node.mass())
    })
}
