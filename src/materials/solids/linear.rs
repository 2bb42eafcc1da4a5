//! Small-strain linear elasticity.

use serde::{Deserialize, Serialize};

use crate::config::MaterialConfig;
use crate::error::Result;
use crate::materials::utils::lame_lambda_mu;
use crate::materials::{ConstitutiveModel, MaterialContext};
use crate::math::{DIM, Matrix, Real, diagonal_from_value, identity_matrix};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Linear {
    pub youngs_modulus: Real,
    pub poisson_ratio: Real,
    pub mu: Real,
    pub lambda: Real,
}

impl Linear {
    pub fn from_config(config: &MaterialConfig) -> Self {
        let youngs_modulus = config.get("E", 1.0e5);
        let poisson_ratio = config.get("nu", 0.3);
        let (lambda, mu) = lame_lambda_mu(youngs_modulus, poisson_ratio);
        Self {
            youngs_modulus,
            poisson_ratio,
            mu,
            lambda,
        }
    }
}

impl ConstitutiveModel for Linear {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn first_piola_kirchhoff(&self, f: &Matrix) -> Matrix {
        self.mu * (f + f.transpose() - diagonal_from_value(2.0))
            + diagonal_from_value(self.lambda * (f.trace() - DIM as Real))
    }

    fn plasticity(&mut self, f: &mut Matrix, cdg: &Matrix, _ctx: &MaterialContext) -> i32 {
        *f = cdg * *f;
        0
    }

    fn sound_speed(&self, _f: &Matrix, _ctx: &MaterialContext) -> Option<Real> {
        None
    }

    fn potential_energy(&self, f: &Matrix, volume: Real) -> Option<Real> {
        let e = 0.5 * (f + f.transpose()) - identity_matrix();
        let trace = e.trace();
        Some(volume * (self.mu * e.norm_squared() + 0.5 * self.lambda * trace * trace))
    }

    fn first_piola_kirchhoff_differential(&self, _f: &Matrix, df: &Matrix) -> Result<Matrix> {
        Ok(self.mu * (df + df.transpose()) + diagonal_from_value(self.lambda * df.trace()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn differential_matches_finite_difference() {
        let model = Linear::from_config(&MaterialConfig::new());
        let f = Matrix::new(1.1, 0.05, 0.0, 0.0, 0.95, 0.02, 0.01, 0.0, 1.0);
        let df = Matrix::new(0.0, 1.0, 0.0, 0.5, 0.0, 0.0, 0.0, 0.0, -1.0) * 1e-3;
        let expected = model.first_piola_kirchhoff(&(f + df)) - model.first_piola_kirchhoff(&f);
        let got = model.first_piola_kirchhoff_differential(&f, &df).unwrap();
        // linear in F, so the difference is exact up to rounding
        assert!((got - expected).abs().max() < 1.0);
    }

    #[test]
    fn energy_is_zero_at_rest_and_positive_under_stretch() {
        let model = Linear::from_config(&MaterialConfig::new());
        assert_eq!(model.potential_energy(&identity_matrix(), 1.0), Some(0.0));
        let stretched = diagonal_from_value(1.01);
        assert!(model.potential_energy(&stretched, 1.0).unwrap() > 0.0);
    }
}
