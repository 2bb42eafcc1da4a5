//! St. Venant-Kirchhoff elasticity on the Hencky (logarithmic) strain.

use serde::{Deserialize, Serialize};

use crate::config::MaterialConfig;
use crate::materials::utils::{elastic_wave_speed, hencky_stress, lame_lambda_mu, log_singular_values};
use crate::materials::{ConstitutiveModel, MaterialContext};
use crate::math::{Matrix, Real, Svd};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Elastic {
    pub youngs_modulus: Real,
    pub poisson_ratio: Real,
    pub lambda_0: Real,
    pub mu_0: Real,
}

impl Elastic {
    pub fn from_config(config: &MaterialConfig) -> Self {
        let youngs_modulus = config.get("E", 5.0e3);
        let poisson_ratio = config.get("nu", 0.4);
        let (lambda_0, mu_0) = lame_lambda_mu(youngs_modulus, poisson_ratio);
        Self {
            youngs_modulus,
            poisson_ratio,
            lambda_0,
            mu_0,
        }
    }
}

impl ConstitutiveModel for Elastic {
    fn name(&self) -> &'static str {
        "elastic"
    }

    fn first_piola_kirchhoff(&self, f: &Matrix) -> Matrix {
        hencky_stress(&Svd::new(f), self.mu_0, self.lambda_0)
    }

    fn plasticity(&mut self, f: &mut Matrix, cdg: &Matrix, _ctx: &MaterialContext) -> i32 {
        *f = cdg * *f;
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

    fn potential_energy(&self, f: &Matrix, volume: Real) -> Option<Real> {
        let log_sigma = log_singular_values(&Svd::new(f).sigma);
        let trace = log_sigma.sum();
        Some((self.mu_0 * log_sigma.norm_squared() + 0.5 * self.lambda_0 * trace * trace) * volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Vector, identity_matrix};

    #[test]
    fn stretch_pulls_back() {
        let elastic = Elastic::from_config(&MaterialConfig::new());
        let f = Matrix::from_diagonal(&Vector::new(1.1, 1.0, 1.0));
        let force = elastic.calculate_force(&f, 1.0);
        assert!(force[(0, 0)] < 0.0);
        assert!(elastic.potential_energy(&f, 1.0).unwrap() > 0.0);
        assert!(elastic.potential_energy(&identity_matrix(), 1.0).unwrap().abs() < 1e-6);
    }

    #[test]
    fn wave_speed_uses_rest_density() {
        let elastic = Elastic::from_config(&MaterialConfig::new());
        let ctx = MaterialContext {
            mass: 2.0,
            volume: 1.0,
            laplacian_gf: 0.0,
        };
        let c = elastic.sound_speed(&identity_matrix(), &ctx).unwrap();
        let k = elastic.lambda_0 + 2.0 * elastic.mu_0 / 3.0;
        let expected = (4.0 * elastic.mu_0 / 6.0 + k / 2.0).sqrt();
        assert!((c - expected).abs() < 1e-2);
    }
}
