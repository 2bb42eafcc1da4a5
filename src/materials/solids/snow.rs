//! Snow
//!
//! Fixed-corotated elasticity with singular values clamped to
//! `[1 - theta_c, 1 + theta_s]`; the clamped-away part hardens the material
//! through the plastic volume ratio `Jp`.

use serde::{Deserialize, Serialize};

use crate::config::MaterialConfig;
use crate::materials::utils::{fixed_corotated_stress, lame_lambda_mu};
use crate::materials::{ConstitutiveModel, MaterialContext};
use crate::math::{Matrix, Real, Svd};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snow {
    /// Determinant of the plastic deformation gradient.
    pub jp: Real,
    pub hardening: Real,
    pub mu_0: Real,
    pub lambda_0: Real,
    /// Critical compression.
    pub theta_c: Real,
    /// Critical stretch.
    pub theta_s: Real,
    pub min_jp: Real,
    pub max_jp: Real,
}

impl Snow {
    pub fn from_config(config: &MaterialConfig) -> Self {
        let (lambda, mu) = lame_lambda_mu(
            config.get("youngs_modulus", 1.4e5),
            config.get("poisson_ratio", 0.2),
        );
        Self {
            jp: config.get("Jp", 1.0),
            hardening: config.get("hardening", 10.0),
            mu_0: config.get("mu_0", mu),
            lambda_0: config.get("lambda_0", lambda),
            theta_c: config.get("theta_c", 2.5e-2),
            theta_s: config.get("theta_s", 7.5e-3),
            min_jp: config.get("min_Jp", 0.6),
            max_jp: config.get("max_Jp", 20.0),
        }
    }

    /// Hardened `(mu, lambda)`.
    pub fn lame_parameters(&self) -> (Real, Real) {
        let e = (self.hardening * (1.0 - self.jp)).exp();
        (self.mu_0 * e, self.lambda_0 * e)
    }
}

impl ConstitutiveModel for Snow {
    fn name(&self) -> &'static str {
        "snow"
    }

    fn first_piola_kirchhoff(&self, f: &Matrix) -> Matrix {
        let (mu, lambda) = self.lame_parameters();
        fixed_corotated_stress(f, mu, lambda)
    }

    fn plasticity(&mut self, f: &mut Matrix, cdg: &Matrix, _ctx: &MaterialContext) -> i32 {
        let svd = Svd::new(&(cdg * *f));
        let clamped = svd
            .sigma
            .map(|s| s.clamp(1.0 - self.theta_c, 1.0 + self.theta_s));
        *f = svd.recompose(&clamped);

        let jp = self.jp * svd.determinant() / clamped.iter().product::<Real>();
        // NaN lands on the upper bound
        self.jp = if jp <= self.max_jp { jp } else { self.max_jp };
        if !(self.jp >= self.min_jp) {
            self.jp = self.min_jp;
        }
        0
    }

    fn sound_speed(&self, f: &Matrix, ctx: &MaterialContext) -> Option<Real> {
        let j = f.determinant() * self.jp;
        let rho = ctx.rest_density() / j;
        let (mu, lambda) = self.lame_parameters();
        Some(((lambda + 2.0 * mu) / rho).sqrt())
    }

    fn is_finite(&self) -> bool {
        self.jp.is_finite()
    }
}
