/// Simple custom benchmarking without criterion
use std::time::Instant;

use mpm3d::math::{Real, Vector};
use mpm3d::{MaterialConfig, MaterialKind, MpmState, Particle, SolverParams, TransferMode};

fn time_it<F: FnMut()>(name: &str, iterations: usize, mut f: F) {
    // Warmup
    for _ in 0..5 {
        f();
    }

    let start = Instant::now();
    for _ in 0..iterations {
        f();
    }
    let elapsed = start.elapsed();

    let avg_ms = elapsed.as_secs_f64() * 1000.0 / iterations as f64;
    println!("{}: {:.3}ms avg ({} iterations)", name, avg_ms, iterations);
}

fn create_state(count: usize, kind: MaterialKind, mode: TransferMode) -> MpmState {
    let params = SolverParams::default()
        .with_cell_width(1.0 / 64.0)
        .with_transfer_mode(mode);
    let dx = params.cell_width;
    let mut state = MpmState::new(params);

    // Two particles per cell and axis, away from the binning boundaries.
    let side = (count as Real).cbrt().ceil() as usize;
    let config = MaterialConfig::new();
    'fill: for x in 0..side {
        for y in 0..side {
            for z in 0..side {
                if state.particle_count() >= count {
                    break 'fill;
                }
                let position = Vector::new(x as Real, y as Real, z as Real) * (0.5 * dx)
                    + Vector::repeat(16.25 * dx);
                let particle = Particle::from_config(position, 1e-3, 1e-6, kind, &config)
                    .with_velocity(Vector::new(1.0, -2.0, 0.5));
                state.add_particle(particle);
            }
        }
    }
    state
}

fn main() {
    println!("\n=== MPM3D Benchmarks ===\n");

    println!("--- Block Binning ---");
    for &count in &[1_000, 10_000, 50_000] {
        let mut state = create_state(count, MaterialKind::Water, TransferMode::Mls);
        time_it(&format!("rebuild_blocks (n={count})"), 20, || {
            state.rebuild_blocks();
        });
    }

    for mode in [TransferMode::Mls, TransferMode::Apic] {
        println!("\n--- Transfers ({mode:?}) ---");
        for &count in &[10_000, 50_000] {
            let mut state = create_state(count, MaterialKind::Jelly, mode);
            let dt = state.solver_params().base_delta_t;

            time_it(&format!("rasterize (n={count})"), 10, || {
                state.rebuild_blocks();
                state.rasterize(dt, true).unwrap();
            });
            time_it(&format!("rasterize_optimized (n={count})"), 10, || {
                state.rebuild_blocks();
                state.rasterize_optimized(dt).unwrap();
            });

            // Positions are restored after every resample so particles stay
            // inside the blocks they were binned to.
            state.grid_update(dt);
            let binned: Vec<Vector> = state.particles().iter().map(|p| p.position).collect();
            let restore = |state: &mut MpmState| {
                for (particle, position) in state.particles_mut().iter_mut().zip(&binned) {
                    particle.position = *position;
                }
            };
            time_it(&format!("resample (n={count})"), 10, || {
                state.resample().unwrap();
                restore(&mut state);
            });
            time_it(&format!("resample_optimized (n={count})"), 10, || {
                state.resample_optimized().unwrap();
                restore(&mut state);
            });
        }
    }

    println!("\n--- Full Step (mixed materials) ---");
    for kind in [MaterialKind::Snow, MaterialKind::Sand, MaterialKind::Nonlocal] {
        let mut state = create_state(20_000, kind, TransferMode::Mls);
        time_it(&format!("step {kind} (n=20000)"), 10, || {
            state.step().unwrap();
        });
    }
}
