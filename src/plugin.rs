use bevy::ecs::error::Result;
use bevy::prelude::*;

use crate::config::SolverParams;
use crate::core::MpmState;

/// Inserts [`MpmState`] and runs one optimized step per `Update`. A
/// numerical degeneracy is reported through bevy's error handler, which
/// panics by default.
#[derive(Default)]
pub struct MpmPlugin {
    pub params: SolverParams,
}

impl MpmPlugin {
    pub fn new(params: SolverParams) -> Self {
        Self { params }
    }
}

impl Plugin for MpmPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(MpmState::new(self.params.clone()))
            .add_systems(
                Update,
                (
                    rebuild_blocks,
                    rasterize,
                    grid_update,
                    resample,
                    reclaim_blocks,
                )
                    .chain(),
            );
    }
}

fn rebuild_blocks(mut state: ResMut<MpmState>) {
    state.rebuild_blocks();
}

fn rasterize(mut state: ResMut<MpmState>) -> Result {
    let dt = state.solver_params().base_delta_t;
    state.rasterize_optimized(dt)?;
    Ok(())
}

fn grid_update(mut state: ResMut<MpmState>) {
    let dt = state.solver_params().base_delta_t;
    state.grid_update(dt);
}

fn resample(mut state: ResMut<MpmState>) -> Result {
    state.resample_optimized()?;
    Ok(())
}

fn reclaim_blocks(mut state: ResMut<MpmState>) {
    state.reclaim_blocks();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MaterialConfig, MaterialKind};
    use crate::core::Particle;
    use crate::math::Vector;

    #[test]
    fn update_moves_falling_particles() {
        let mut app = App::new();
        app.add_plugins(MpmPlugin::new(
            SolverParams::default()
                .with_cell_width(0.1)
                .with_delta_t(1e-3),
        ));
        app.world_mut().resource_mut::<MpmState>().add_particle(Particle::from_config(
            Vector::new(2.0, 2.0, 2.0),
            1.0,
            1e-3,
            MaterialKind::Sand,
            &MaterialConfig::new(),
        ));

        app.update();
        app.update();

        let state = app.world().resource::<MpmState>();
        assert!(state.particles()[0].velocity.y < 0.0);
        assert!(state.particles()[0].position.y < 2.0);
        assert!(state.grid().block_count() > 0);
    }
}
