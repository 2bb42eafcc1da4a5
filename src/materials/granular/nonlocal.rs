//! Nonlocal granular rheology
//!
//! Elastoplastic grains whose plastic flow rate is the granular fluidity
//! `gf`, a field that obeys its own relaxation equation with a diffusive
//! (nonlocal) term. The fluidity Laplacian is interpolated from the grid by
//! the resample pass and handed in through [`MaterialContext::laplacian_gf`].
//!
//! The model tracks the total and plastic deformation gradients itself; the
//! particle's elastic gradient is derived from them after every update.

use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_BASE_DELTA_T, MaterialConfig};
use crate::materials::utils::{elastic_wave_speed, log_singular_values};
use crate::materials::{ConstitutiveModel, MaterialContext};
use crate::math::{
    DIM, Matrix, Real, Svd, cofactor, diagonal_from_value, identity_matrix, matrix_is_finite,
};

const EPS: Real = 1e-20;
const SQRT_2: Real = 1.414;
const INV_SQRT_2: Real = 0.707;

/// Lamé parameters of the grain skeleton used for the time step bound.
const WAVE_LAMBDA: Real = 204_057.0;
const WAVE_MU: Real = 136_038.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Nonlocal {
    /// Shear modulus.
    pub s_mod: Real,
    /// Bulk modulus.
    pub b_mod: Real,
    /// Nonlocal amplitude.
    pub a_mat: Real,
    /// Grain diameter.
    pub dia: Real,
    /// Grain density.
    pub rho_s: Real,
    /// Density below which the grains are disconnected.
    pub rho_c: Real,
    pub mu_s: Real,
    pub mu_2: Real,
    pub i_0: Real,
    pub t_0: Real,
    pub delta_t: Real,

    /// Total deformation gradient.
    pub dg_t: Matrix,
    /// Plastic deformation gradient.
    pub dg_p: Matrix,
    /// Cauchy stress.
    pub stress: Matrix,
    pub pressure: Real,
    /// Equivalent shear stress.
    pub tau: Real,
    /// Granular fluidity.
    pub gf: Real,
}

impl Nonlocal {
    pub fn from_config(config: &MaterialConfig) -> Self {
        Self {
            s_mod: config.get("S_mod", 3.4483e3),
            b_mod: config.get("B_mod", 3.3333e4),
            a_mat: config.get("A_mat", 0.48),
            dia: config.get("dia", 0.005),
            rho_s: config.get("density", 2550.0),
            rho_c: config.get("critical_density", 2000.0),
            mu_s: config.get("mu_s", 0.3819),
            mu_2: config.get("mu_2", 0.6435),
            i_0: config.get("I_0", 0.278),
            t_0: config.get("t_0", 1e-3),
            delta_t: config.get("base_delta_t", DEFAULT_BASE_DELTA_T),
            dg_t: identity_matrix(),
            dg_p: identity_matrix(),
            stress: Matrix::zeros(),
            pressure: 0.0,
            tau: 0.0,
            gf: 0.0,
        }
    }

    /// Equivalent shear strain rate of the incremental deformation.
    fn shear_rate(&self, cdg: &Matrix) -> Real {
        let l = (cdg - identity_matrix()) / self.delta_t;
        let d = 0.5 * (l + l.transpose());
        SQRT_2 * d.norm()
    }

    /// Elastic part `F_t F_p^-1`.
    pub fn elastic_deformation(&self) -> Matrix {
        match self.dg_p.try_inverse() {
            Some(inv) => self.dg_t * inv,
            None => Matrix::from_element(Real::NAN),
        }
    }

    fn update(&mut self, cdg: &Matrix, ctx: &MaterialContext) {
        let p_n = self.pressure;
        let dt = self.delta_t;

        self.dg_t = cdg * self.dg_t;
        let det_t = self.dg_t.determinant();
        let rho = ctx.mass / ctx.volume / det_t;

        let svd = Svd::new(&self.elastic_deformation());
        let re = svd.u * svd.v.transpose();
        let log_sigma = log_singular_values(&svd.sigma);
        let ee = svd.v * Matrix::from_diagonal(&log_sigma) * svd.v.transpose();
        let tr_ee = ee.trace();
        let ee_0 = ee - diagonal_from_value(tr_ee / DIM as Real);
        let mut me = 2.0 * self.s_mod * ee_0 + diagonal_from_value(self.b_mod * tr_ee);
        self.pressure = -me.trace() / DIM as Real;

        if rho < self.rho_c || self.pressure <= 0.0 {
            // disconnected
            self.stress = Matrix::zeros();
            self.dg_p = self.dg_t;
            self.pressure = 0.0;
            self.gf = (self.shear_rate(cdg) / self.mu_2).max(0.0);
            return;
        }

        if p_n == 0.0 {
            self.gf = (self.shear_rate(cdg) / self.mu_2).max(0.0);
        } else {
            let mu = (self.tau / p_n).min(self.mu_2 - EPS);
            let gdot_loc = -((self.mu_s - mu) * self.gf)
                - ((self.mu_2 - self.mu_s) / self.i_0
                    * (self.rho_s * self.dia * self.dia / p_n).sqrt()
                    * mu
                    * self.gf
                    * self.gf);
            let gdot_nonloc = self.a_mat * self.a_mat * self.dia * self.dia * ctx.laplacian_gf;
            self.gf = (dt * (gdot_loc + gdot_nonloc) / self.t_0 + self.gf).max(0.0);
        }

        let me_0 = me + diagonal_from_value(self.pressure);
        let tau_trial = INV_SQRT_2 * me_0.norm();
        let np = if tau_trial > 0.0 {
            (INV_SQRT_2 / tau_trial) * me_0
        } else {
            Matrix::zeros()
        };

        let p = self.pressure;
        self.tau = (tau_trial * p / (p + self.s_mod * dt * self.gf).max(EPS))
            .max(0.0)
            .min(tau_trial);
        me -= SQRT_2 * (tau_trial - self.tau) * np;

        let mu = if p_n > 0.0 {
            (self.tau / p.max(EPS)).min(self.mu_2 - EPS)
        } else {
            self.mu_2
        };

        self.stress = (1.0 / det_t) * re * me * re.transpose();
        self.dg_p = (identity_matrix() + dt * INV_SQRT_2 * mu * self.gf * np) * self.dg_p;
    }
}

impl ConstitutiveModel for Nonlocal {
    fn name(&self) -> &'static str {
        "nonlocal"
    }

    /// `J sigma F^-T` on the total deformation gradient.
    fn first_piola_kirchhoff(&self, _f: &Matrix) -> Matrix {
        self.stress * cofactor(&self.dg_t)
    }

    fn calculate_force(&self, _f: &Matrix, volume: Real) -> Matrix {
        -volume * self.stress
    }

    fn plasticity(&mut self, f: &mut Matrix, cdg: &Matrix, ctx: &MaterialContext) -> i32 {
        self.update(cdg, ctx);
        *f = self.elastic_deformation();
        0
    }

    fn sound_speed(&self, _f: &Matrix, ctx: &MaterialContext) -> Option<Real> {
        Some(elastic_wave_speed(
            WAVE_MU,
            WAVE_LAMBDA,
            self.dg_t.determinant(),
            ctx.rest_density(),
        ))
    }

    fn is_finite(&self) -> bool {
        matrix_is_finite(&self.dg_t)
            && matrix_is_finite(&self.dg_p)
            && matrix_is_finite(&self.stress)
            && self.pressure.is_finite()
            && self.tau.is_finite()
            && self.gf.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense_context() -> MaterialContext {
        MaterialContext {
            mass: 2550.0,
            volume: 1.0,
            laplacian_gf: 0.0,
        }
    }

    #[test]
    fn loose_grains_carry_no_stress() {
        let mut model = Nonlocal::from_config(&MaterialConfig::new());
        let ctx = MaterialContext {
            mass: 1000.0,
            volume: 1.0,
            laplacian_gf: 0.0,
        };
        let mut f = identity_matrix();
        model.plasticity(&mut f, &(identity_matrix() * 0.99), &ctx);
        assert_eq!(model.stress, Matrix::zeros());
        assert_eq!(model.pressure, 0.0);
        assert_eq!(model.dg_p, model.dg_t);
        assert!((f - identity_matrix()).abs().max() < 1e-5);
    }

    #[test]
    fn compressed_dense_grains_build_pressure() {
        let mut model = Nonlocal::from_config(&MaterialConfig::new());
        let mut f = identity_matrix();
        model.plasticity(&mut f, &(identity_matrix() * 0.99), &dense_context());
        assert!(model.pressure > 0.0);
        // compressive stress on the diagonal
        assert!(model.stress[(0, 0)] < 0.0);
        assert!(model.calculate_force(&f, 1.0)[(0, 0)] > 0.0);
        assert!(model.is_finite());
    }

    #[test]
    fn sheared_dense_grains_flow() {
        let mut model = Nonlocal::from_config(&MaterialConfig::new());
        let mut f = identity_matrix();
        let squeeze = identity_matrix() * 0.99;
        model.plasticity(&mut f, &squeeze, &dense_context());

        let mut shear = identity_matrix();
        shear[(0, 1)] = 1e-3;
        for _ in 0..5 {
            model.plasticity(&mut f, &shear, &dense_context());
        }
        assert!(model.gf > 0.0);
        assert!(model.tau > 0.0);
        assert!(model.is_finite());
    }
}
