//! Weakly compressible water
//!
//! Tait equation of state on the tracked volume ratio `j`; the deformation
//! gradient itself carries no stress.

use bevy::log::warn;
use serde::{Deserialize, Serialize};

use crate::config::MaterialConfig;
use crate::materials::{ConstitutiveModel, MaterialContext};
use crate::math::{DIM, Matrix, Real, identity_matrix};

/// Lower bound on the volume ratio; compression beyond it is clamped.
pub const MIN_VOLUME_RATIO: Real = 0.1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Water {
    /// Bulk stiffness.
    pub k: Real,
    /// Equation of state exponent.
    pub gamma: Real,
    /// Volume ratio `V / V0`.
    pub j: Real,
}

impl Default for Water {
    fn default() -> Self {
        Self {
            k: 1.0e4,
            gamma: 7.0,
            j: 1.0,
        }
    }
}

impl Water {
    pub fn from_config(config: &MaterialConfig) -> Self {
        let defaults = Self::default();
        Self {
            k: config.get("k", defaults.k),
            gamma: config.get("gamma", defaults.gamma),
            j: 1.0,
        }
    }

    #[inline]
    pub fn pressure(&self) -> Real {
        self.k * (self.j.powf(-self.gamma) - 1.0)
    }
}

impl ConstitutiveModel for Water {
    fn name(&self) -> &'static str {
        "water"
    }

    /// Cauchy pressure stress scaled by the volume ratio.
    fn first_piola_kirchhoff(&self, _f: &Matrix) -> Matrix {
        -self.pressure() * self.j * identity_matrix()
    }

    fn calculate_force(&self, f: &Matrix, volume: Real) -> Matrix {
        -volume * self.first_piola_kirchhoff(f)
    }

    fn plasticity(&mut self, _f: &mut Matrix, cdg: &Matrix, _ctx: &MaterialContext) -> i32 {
        // trace(I + dt L) - (d - 1) = 1 + dt div(v)
        self.j *= cdg.trace() - (DIM - 1) as Real;
        if self.j < MIN_VOLUME_RATIO {
            warn!("water particle volume ratio {} clamped to {MIN_VOLUME_RATIO}", self.j);
            self.j = MIN_VOLUME_RATIO;
        }
        (self.j > 1.0) as i32
    }

    fn sound_speed(&self, _f: &Matrix, _ctx: &MaterialContext) -> Option<Real> {
        let c2 = self.k * self.gamma / self.j.powf(self.gamma - 1.0);
        Some(c2.sqrt())
    }

    fn is_finite(&self) -> bool {
        self.j.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rest_water_is_pressure_free_and_stays_at_rest() {
        let mut water = Water::from_config(&MaterialConfig::new().with("k", 1.0e4).with("gamma", 7.0));
        let mut f = identity_matrix();
        let code = water.plasticity(&mut f, &identity_matrix(), &MaterialContext::default());

        assert_eq!(water.j, 1.0);
        assert_eq!(code, 0);
        assert_eq!(water.calculate_force(&f, 0.5).norm(), 0.0);
    }

    #[test]
    fn compression_raises_pressure() {
        let mut water = Water::default();
        let cdg = identity_matrix() * 0.99;
        water.plasticity(&mut identity_matrix(), &cdg, &MaterialContext::default());
        assert!(water.j < 1.0);
        assert!(water.pressure() > 0.0);
        // pushes outwards: positive diagonal force
        assert!(water.calculate_force(&identity_matrix(), 1.0)[(0, 0)] > 0.0);
    }

    #[test]
    fn volume_ratio_is_floored() {
        let mut water = Water::default();
        let cdg = identity_matrix() * 0.2;
        water.plasticity(&mut identity_matrix(), &cdg, &MaterialContext::default());
        assert_eq!(water.j, MIN_VOLUME_RATIO);
    }

    #[test]
    fn sound_speed_at_rest() {
        let water = Water::default();
        let c = water.sound_speed(&identity_matrix(), &MaterialContext::default());
        assert!((c.unwrap() - (7.0e4 as Real).sqrt()).abs() < 1e-2);
    }
}
