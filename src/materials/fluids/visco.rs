//! Viscoelastic fluid
//!
//! Fixed-corotated elasticity whose isochoric stretch relaxes towards the
//! identity at a rate set by the stress in excess of the yield stress `tau`.

use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_BASE_DELTA_T, MaterialConfig};
use crate::materials::utils::{elastic_wave_speed, fixed_corotated_stress, lame_lambda_mu};
use crate::materials::{ConstitutiveModel, MaterialContext};
use crate::math::{DIM, Matrix, Real, Svd, identity_matrix};

/// Halvings tried by [`approximate_exponent`] before giving up.
const MAX_EXPONENT_HALVINGS: u32 = 32;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Visco {
    /// Yield stress, hardened by `kappa`.
    pub tau: Real,
    pub viscosity: Real,
    pub kappa: Real,
    pub lambda_0: Real,
    pub mu_0: Real,
    pub delta_t: Real,
}

impl Visco {
    pub fn from_config(config: &MaterialConfig) -> Self {
        let (lambda_0, mu_0) = lame_lambda_mu(
            config.get("youngs_modulus", 4.0e4),
            config.get("poisson_ratio", 0.4),
        );
        Self {
            tau: config.get("tau", 1000.0),
            viscosity: config.get("nu", 1.0e4),
            kappa: config.get("kappa", 0.0),
            lambda_0,
            mu_0,
            delta_t: config.get("base_delta_t", DEFAULT_BASE_DELTA_T),
        }
    }
}

/// Second order approximation of `exp(dt m)`, squared from halved steps until
/// the result keeps orientation.
pub fn approximate_exponent(dt: Real, m: &Matrix) -> Matrix {
    approximate_exponent_halved(dt, m, 0)
}

fn approximate_exponent_halved(dt: Real, m: &Matrix, depth: u32) -> Matrix {
    let s = m * dt;
    let r = (s * 0.5 + identity_matrix()) * s + identity_matrix();
    let det = r.determinant();
    if det > 0.0 || det.is_nan() || depth >= MAX_EXPONENT_HALVINGS {
        return r;
    }
    let half = approximate_exponent_halved(dt * 0.5, m, depth + 1);
    half * half
}

impl ConstitutiveModel for Visco {
    fn name(&self) -> &'static str {
        "visco"
    }

    fn first_piola_kirchhoff(&self, f: &Matrix) -> Matrix {
        fixed_corotated_stress(f, self.mu_0, self.lambda_0)
    }

    fn plasticity(&mut self, f: &mut Matrix, cdg: &Matrix, _ctx: &MaterialContext) -> i32 {
        let dt = self.delta_t;
        let velocity_gradient = (cdg - identity_matrix()) / dt;
        let trial = approximate_exponent(dt, &velocity_gradient) * *f;
        let svd = Svd::new(&trial);

        let pnorm = self.first_piola_kirchhoff(f).norm();
        let gamma = if pnorm > 1e-5 {
            (dt * self.viscosity * (pnorm - self.tau) / pnorm).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let det = svd.determinant();
        let scale = if det.abs() > 1e-5 { 1.0 / det.cbrt() } else { 1.0 };
        let mut relaxed = svd.sigma;
        for d in 0..DIM {
            let middle = (svd.sigma[d] * scale).abs().powf(gamma);
            if middle > 1e-5 {
                relaxed[d] /= middle;
            }
        }
        let relaxed = svd.recompose(&relaxed);

        let clamped = Svd::new(&relaxed);
        *f = clamped.recompose(&clamped.sigma.map(|s| s.clamp(0.1, 10.0)));

        self.tau += self.kappa * gamma * pnorm;
        0
    }

    fn sound_speed(&self, f: &Matrix, ctx: &MaterialContext) -> Option<Real> {
        Some(elastic_wave_speed(
            self.mu_0,
            self.lambda_0,
            f.determinant(),
            ctx.rest_density(),
        ))
    }

    fn is_finite(&self) -> bool {
        self.tau.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_step_exponent_matches_taylor_series() {
        let m = Matrix::new(0.1, 0.2, 0.0, -0.2, 0.1, 0.0, 0.0, 0.0, -0.3);
        let e = approximate_exponent(1e-2, &m);
        let expected = identity_matrix() + m * 1e-2;
        assert!((e - expected).abs().max() < 1e-4);
    }

    #[test]
    fn exponent_keeps_orientation_for_large_steps() {
        let m = Matrix::from_diagonal_element(-50.0);
        assert!(approximate_exponent(0.1, &m).determinant() > 0.0);
    }

    #[test]
    fn stress_below_yield_is_not_relaxed() {
        let mut visco = Visco::from_config(&MaterialConfig::new().with("tau", 1.0e9));
        let mut f = Matrix::from_diagonal(&crate::math::Vector::new(1.05, 1.0, 0.98));
        let before = f;
        visco.plasticity(&mut f, &identity_matrix(), &MaterialContext::default());
        assert!((f - before).abs().max() < 1e-4);
    }

    #[test]
    fn stress_above_yield_relaxes_shape() {
        let mut visco = Visco::from_config(&MaterialConfig::new().with("tau", 0.0).with("nu", 1.0e4));
        let mut f = Matrix::from_diagonal(&crate::math::Vector::new(1.2, 1.0, 1.0));
        visco.plasticity(&mut f, &identity_matrix(), &MaterialContext::default());
        let svd = Svd::new(&f);
        assert!(svd.sigma.max() < 1.2 - 1e-3);
    }
}
