//! Fixed-corotated hyperelastic solid ("jelly").

use serde::{Deserialize, Serialize};

use crate::config::MaterialConfig;
use crate::materials::utils::{fixed_corotated_stress, lame_lambda_mu};
use crate::materials::{ConstitutiveModel, MaterialContext};
use crate::math::{Matrix, Real, polar_decomp};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Jelly {
    pub youngs_modulus: Real,
    pub poisson_ratio: Real,
    pub mu: Real,
    pub lambda: Real,
}

impl Jelly {
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

impl ConstitutiveModel for Jelly {
    fn name(&self) -> &'static str {
        "jelly"
    }

    fn first_piola_kirchhoff(&self, f: &Matrix) -> Matrix {
        fixed_corotated_stress(f, self.mu, self.lambda)
    }

    fn plasticity(&mut self, f: &mut Matrix, cdg: &Matrix, _ctx: &MaterialContext) -> i32 {
        *f = cdg * *f;
        0
    }

    fn sound_speed(&self, _f: &Matrix, _ctx: &MaterialContext) -> Option<Real> {
        None
    }

    fn potential_energy(&self, f: &Matrix, volume: Real) -> Option<Real> {
        let j = f.determinant();
        let (r, _) = polar_decomp(f);
        Some((self.mu * (f - r).norm_squared() + 0.5 * self.lambda * (j - 1.0).powi(2)) * volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Vector, identity_matrix};

    #[test]
    fn rotation_is_stress_and_energy_free() {
        let jelly = Jelly::from_config(&MaterialConfig::new());
        let rotation = nalgebra::Rotation3::from_axis_angle(&Vector::z_axis(), 0.7).into_inner();
        assert!(jelly.first_piola_kirchhoff(&rotation).norm() < 1.0);
        assert!(jelly.potential_energy(&rotation, 1.0).unwrap() < 1e-3);
    }

    #[test]
    fn plasticity_accumulates_deformation() {
        let mut jelly = Jelly::from_config(&MaterialConfig::new());
        let mut f = identity_matrix();
        let cdg = Matrix::from_diagonal(&Vector::new(1.01, 1.0, 1.0));
        jelly.plasticity(&mut f, &cdg, &MaterialContext::default());
        jelly.plasticity(&mut f, &cdg, &MaterialContext::default());
        assert!((f[(0, 0)] - 1.0201).abs() < 1e-6);
    }
}
