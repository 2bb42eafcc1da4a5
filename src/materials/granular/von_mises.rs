//! Von Mises plasticity on the Hencky strain.

use serde::{Deserialize, Serialize};

use crate::config::MaterialConfig;
use crate::materials::utils::{elastic_wave_speed, hencky_stress, lame_lambda_mu, log_singular_values};
use crate::materials::{ConstitutiveModel, MaterialContext};
use crate::math::{DIM, Matrix, Real, Svd};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VonMises {
    pub lambda_0: Real,
    pub mu_0: Real,
    pub yield_stress: Real,
}

impl VonMises {
    pub fn from_config(config: &MaterialConfig) -> Self {
        let (lambda_0, mu_0) = lame_lambda_mu(
            config.get("youngs_modulus", 5.0e3),
            config.get("poisson_ratio", 0.4),
        );
        Self {
            lambda_0,
            mu_0,
            yield_stress: config.get("yield_stress", 1.0),
        }
    }
}

impl ConstitutiveModel for VonMises {
    fn name(&self) -> &'static str {
        "von_mises"
    }

    fn first_piola_kirchhoff(&self, f: &Matrix) -> Matrix {
        hencky_stress(&Svd::new(f), self.mu_0, self.lambda_0)
    }

    /// Returns 1 when the trial state was outside the yield surface.
    fn plasticity(&mut self, f: &mut Matrix, cdg: &Matrix, _ctx: &MaterialContext) -> i32 {
        *f = cdg * *f;
        let svd = Svd::new(f);
        let epsilon = log_singular_values(&svd.sigma);
        let epsilon_hat = epsilon.add_scalar(-epsilon.sum() / DIM as Real);
        // squared norm
        let epsilon_hat_norm = epsilon_hat.norm_squared();
        let delta_gamma = epsilon_hat_norm - self.yield_stress / (2.0 * self.mu_0);
        if delta_gamma <= 0.0 {
            return 0;
        }
        let h = epsilon - (delta_gamma / epsilon_hat_norm) * epsilon_hat;
        *f = svd.recompose(&h.map(Real::exp));
        1
    }

    fn sound_speed(&self, f: &Matrix, ctx: &MaterialContext) -> Option<Real> {
        Some(elastic_wave_speed(
            self.mu_0,
            self.lambda_0,
            f.determinant(),
            ctx.rest_density(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Vector, identity_matrix};

    #[test]
    fn small_shear_stays_elastic() {
        let mut model = VonMises::from_config(&MaterialConfig::new());
        let mut f = identity_matrix();
        let cdg = Matrix::from_diagonal(&Vector::new(1.001, 1.0, 0.999));
        assert_eq!(model.plasticity(&mut f, &cdg, &MaterialContext::default()), 0);
        assert_eq!(f, cdg);
    }

    #[test]
    fn large_shear_yields_and_keeps_volume() {
        let mut model = VonMises::from_config(&MaterialConfig::new().with("yield_stress", 1.0));
        let mut f = identity_matrix();
        let cdg = Matrix::from_diagonal(&Vector::new(1.3, 1.0, 1.0 / 1.3));
        assert_eq!(model.plasticity(&mut f, &cdg, &MaterialContext::default()), 1);
        assert!((f.determinant() - 1.0).abs() < 1e-4);
        assert!(f[(0, 0)] < 1.3);
    }
}
