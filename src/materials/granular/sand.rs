//! Sand
//!
//! Hencky elasticity with a Drucker-Prager yield cone in log-strain space.
//! Volume gained while the material is in tension is tracked in `log_jp` so
//! that it must be recovered before the grains can carry load again.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use crate::config::MaterialConfig;
use crate::materials::utils::{elastic_wave_speed, hencky_stress, log_singular_values};
use crate::materials::{ConstitutiveModel, MaterialContext};
use crate::math::{DIM, Matrix, Real, Svd, Vector};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sand {
    pub lambda_0: Real,
    pub mu_0: Real,
    /// Degrees.
    pub friction_angle: Real,
    /// Cone slope derived from the friction angle.
    pub alpha: Real,
    pub cohesion: Real,
    pub log_jp: Real,
    /// Fraction of the dilation that is remembered.
    pub beta: Real,
}

impl Sand {
    pub fn from_config(config: &MaterialConfig) -> Self {
        let friction_angle = config.get("friction_angle", 30.0);
        Self {
            lambda_0: config.get("lambda_0", 204_057.0),
            mu_0: config.get("mu_0", 136_038.0),
            friction_angle,
            alpha: cone_slope(friction_angle),
            cohesion: config.get("cohesion", 0.0),
            log_jp: 0.0,
            beta: config.get("beta", 1.0),
        }
    }

    /// Projects singular values onto the yield cone and updates `log_jp`.
    pub fn project(&mut self, sigma: &Vector) -> Vector {
        let d = DIM as Real;
        let epsilon = log_singular_values(sigma).add_scalar(-self.cohesion);
        let trace = epsilon.sum() + self.log_jp;
        let epsilon_hat = epsilon.add_scalar(-trace / d);
        let epsilon_hat_norm = epsilon_hat.norm();

        if trace >= 0.0 {
            // tension: grains separate
            self.log_jp += self.beta * epsilon.sum();
            return Vector::repeat(self.cohesion.exp());
        }

        self.log_jp = 0.0;
        let delta_gamma = epsilon_hat_norm
            + (d * self.lambda_0 + 2.0 * self.mu_0) / (2.0 * self.mu_0) * trace * self.alpha;
        let h = if delta_gamma <= 0.0 {
            epsilon
        } else {
            epsilon - (delta_gamma / epsilon_hat_norm) * epsilon_hat
        };
        h.add_scalar(self.cohesion).map(Real::exp)
    }
}

fn cone_slope(friction_angle: Real) -> Real {
    let sin_phi = (friction_angle / 180.0 * PI).sin();
    (2.0 as Real / 3.0).sqrt() * 2.0 * sin_phi / (3.0 - sin_phi)
}

impl ConstitutiveModel for Sand {
    fn name(&self) -> &'static str {
        "sand"
    }

    fn first_piola_kirchhoff(&self, f: &Matrix) -> Matrix {
        hencky_stress(&Svd::new(f), self.mu_0, self.lambda_0)
    }

    fn plasticity(&mut self, f: &mut Matrix, cdg: &Matrix, _ctx: &MaterialContext) -> i32 {
        let svd = Svd::new(&(cdg * *f));
        let projected = self.project(&svd.sigma);
        *f = svd.recompose(&projected);
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
        self.log_jp.is_finite()
    }
}
