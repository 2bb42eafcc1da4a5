//! Helper functions for materials
//!
//! Elastic parameter conversions and the stress and wave-speed formulas the
//! constitutive models share.

use crate::math::{
    Matrix, Real, SINGULAR_VALUE_FLOOR, Svd, Vector, clamp_small_magnitude, cofactor,
    diagonal_from_vec, guarded_ln, polar_decomp,
};

/// Exact zero check inverse (prevents NaN from division by zero)
#[inline(always)]
pub fn inv_exact(e: Real) -> Real {
    if e == 0.0 { 0.0 } else { 1.0 / e }
}

/// Lamé parameters `(lambda, mu)` from Young's modulus and Poisson ratio.
#[inline]
pub fn lame_lambda_mu(young_modulus: Real, poisson_ratio: Real) -> (Real, Real) {
    let lambda =
        young_modulus * poisson_ratio / ((1.0 + poisson_ratio) * (1.0 - 2.0 * poisson_ratio));
    let mu = young_modulus / (2.0 * (1.0 + poisson_ratio));
    (lambda, mu)
}

#[inline]
pub fn bulk_modulus_from_lame(lambda: Real, mu: Real) -> Real {
    lambda + 2.0 * mu / 3.0
}

/// Fixed-corotated first Piola-Kirchhoff stress
/// `2 mu (F - R) + lambda (J - 1) J F^-T`.
#[inline]
pub fn fixed_corotated_stress(f: &Matrix, mu: Real, lambda: Real) -> Matrix {
    let j = f.determinant();
    let (r, _) = polar_decomp(f);
    2.0 * mu * (f - r) + lambda * (j - 1.0) * cofactor(f)
}

/// Element-wise guarded logarithm of singular values.
#[inline]
pub fn log_singular_values(sigma: &Vector) -> Vector {
    sigma.map(guarded_ln)
}

/// St. Venant-Kirchhoff with Hencky strain: `U (2 mu S^-1 ln S + lambda tr(ln S) S^-1) V^T`.
#[inline]
pub fn hencky_stress(svd: &Svd, mu: Real, lambda: Real) -> Matrix {
    let log_sigma = log_singular_values(&svd.sigma);
    let inv_sigma = svd
        .sigma
        .map(|s| 1.0 / clamp_small_magnitude(s, SINGULAR_VALUE_FLOOR));
    let trace = log_sigma.sum();
    let center = (2.0 * mu * log_sigma + Vector::repeat(lambda * trace)).component_mul(&inv_sigma);
    svd.u * diagonal_from_vec(center) * svd.v.transpose()
}

/// Elastic wave speed for a solid with the given Lamé parameters:
/// `c^2 = 4 mu / (3 rho) + K (1 - ln J) / rho0`, floored at `1e-20`.
#[inline]
pub fn elastic_wave_speed(mu: Real, lambda: Real, j: Real, rest_density: Real) -> Real {
    let rho = rest_density / j;
    let k = bulk_modulus_from_lame(lambda, mu);
    let c2 = 4.0 * mu / (3.0 * rho) + k * (1.0 - j.ln()) / rest_density;
    // NaN passes through so callers can detect the degeneracy
    let c2 = if c2 < 1e-20 { 1e-20 } else { c2 };
    c2.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::identity_matrix;

    #[test]
    fn rest_state_is_stress_free() {
        let (lambda, mu) = lame_lambda_mu(1.0e5, 0.3);
        let f = identity_matrix();
        assert!(fixed_corotated_stress(&f, mu, lambda).norm() < 1e-3);
        assert!(hencky_stress(&Svd::new(&f), mu, lambda).norm() < 1e-3);
    }

    #[test]
    fn lame_parameters_match_textbook_values() {
        let (lambda, mu) = lame_lambda_mu(1.0e5, 0.25);
        assert!((lambda - 4.0e4).abs() < 1.0);
        assert!((mu - 4.0e4).abs() < 1.0);
    }

    #[test]
    fn inverted_element_has_nan_wave_speed() {
        assert!(elastic_wave_speed(10.0, 10.0, -0.5, 1.0).is_nan());
        assert!(elastic_wave_speed(10.0, 10.0, 1.0, 1.0) > 0.0);
    }
}
