//! Coloring and friction projection properties.

use mpm3d::coupling::{coloring_mask, friction_project, is_incompatible};
use mpm3d::math::{Real, Vector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_vector(rng: &mut StdRng) -> Vector {
    Vector::new(
        rng.random_range(-2.0..2.0),
        rng.random_range(-2.0..2.0),
        rng.random_range(-2.0..2.0),
    )
}

#[test]
fn coloring_is_symmetric_and_repeatable() {
    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..10_000 {
        let grid: u32 = rng.random();
        let particle: u32 = rng.random();
        assert_eq!(coloring_mask(grid, particle), coloring_mask(particle, grid));
        assert_eq!(is_incompatible(grid, particle), is_incompatible(particle, grid));
        assert_eq!(is_incompatible(grid, particle), is_incompatible(grid, particle));
    }
}

#[test]
fn projection_is_idempotent() {
    let mut rng = StdRng::seed_from_u64(1);
    for _ in 0..5_000 {
        let velocity = random_vector(&mut rng);
        let base = random_vector(&mut rng);
        let normal = random_vector(&mut rng).normalize();
        let friction: Real = match rng.random_range(0..3) {
            0 => -1.0,
            1 => -2.0 - rng.random_range(0.0..1.0),
            _ => rng.random_range(0.0..1.0),
        };

        let once = friction_project(&velocity, &base, &normal, friction);
        let twice = friction_project(&once, &base, &normal, friction);
        assert!((once - twice).norm() < 1e-4, "friction {friction}: {once:?} vs {twice:?}");
    }
}

#[test]
fn projection_never_approaches_the_surface() {
    let mut rng = StdRng::seed_from_u64(2);
    for _ in 0..5_000 {
        let velocity = random_vector(&mut rng);
        let base = random_vector(&mut rng);
        let normal = random_vector(&mut rng).normalize();
        let projected = friction_project(&velocity, &base, &normal, rng.random_range(0.0..1.0));
        assert!((projected - base).dot(&normal) >= -1e-5);
    }
}
