//! Interpolation kernel properties over random particle offsets.

use mpm3d::core::kernel::{MlsFastKernel, QuadraticKernel, STENCIL_NODES, stencil_base, stencil_offset};
use mpm3d::math::{Real, Vector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_offset(rng: &mut StdRng) -> Vector {
    Vector::new(
        rng.random_range(0.5..1.5),
        rng.random_range(0.5..1.5),
        rng.random_range(0.5..1.5),
    )
}

#[test]
fn fast_weights_match_general_kernel() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..10_000 {
        let fx = random_offset(&mut rng);
        let fast = MlsFastKernel::new(&fx);
        let general = QuadraticKernel::from_offset(&fx, 1.0);
        for n in 0..STENCIL_NODES {
            assert!(
                (fast.weight(n) - general.weight(n)).abs() < 1e-6,
                "node {n} at {fx:?}: {} vs {}",
                fast.weight(n),
                general.weight(n)
            );
        }
    }
}

#[test]
fn weights_form_a_partition_of_unity() {
    let mut rng = StdRng::seed_from_u64(7);
    let inv_dx = 64.0;
    for _ in 0..1_000 {
        let pos = Vector::new(
            rng.random_range(2.0..60.0),
            rng.random_range(2.0..60.0),
            rng.random_range(2.0..60.0),
        );
        let kernel = QuadraticKernel::new(&pos, inv_dx);
        let base = stencil_base(&pos).cast::<Real>();

        let mut weight_sum = 0.0;
        let mut gradient_sum = Vector::zeros();
        let mut first_moment = Vector::zeros();
        for n in 0..STENCIL_NODES {
            let dw_w = kernel.dw_w(n);
            weight_sum += dw_w.w;
            gradient_sum += dw_w.xyz();
            first_moment += dw_w.w * (pos - base - stencil_offset(n).cast::<Real>());
        }
        assert!((weight_sum - 1.0).abs() < 1e-5);
        assert!(gradient_sum.norm() < 1e-3 * inv_dx);
        assert!(first_moment.norm() < 1e-4);
    }
}

#[test]
fn gradient_matches_finite_differences() {
    let mut rng = StdRng::seed_from_u64(3);
    let h = 1e-3;
    for _ in 0..200 {
        let fx = Vector::new(
            rng.random_range(0.6..1.4),
            rng.random_range(0.6..1.4),
            rng.random_range(0.6..1.4),
        );
        let kernel = QuadraticKernel::from_offset(&fx, 1.0);
        for n in 0..STENCIL_NODES {
            for axis in 0..3 {
                let mut plus = fx;
                let mut minus = fx;
                plus[axis] += h;
                minus[axis] -= h;
                let numeric = (QuadraticKernel::from_offset(&plus, 1.0).weight(n)
                    - QuadraticKernel::from_offset(&minus, 1.0).weight(n))
                    / (2.0 * h);
                assert!((kernel.dw_w(n)[axis] - numeric).abs() < 1e-2);
            }
        }
    }
}
