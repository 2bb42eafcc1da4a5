//! Constitutive models
//!
//! Every particle owns exactly one [`MaterialModel`], selected when the
//! particle is created and never re-classified. The model reports the force
//! the particle exerts on the grid and projects the elastic deformation
//! gradient back onto its admissible set after every step.
//!
//! * `fluids` - weakly compressible water and a viscoelastic fluid
//! * `solids` - linear, fixed-corotated, Hencky and snow models
//! * `granular` - Drucker-Prager sand, Von Mises and the nonlocal flow model

pub mod fluids;
pub mod granular;
pub mod solids;
pub mod utils;

use serde::{Deserialize, Serialize};

use crate::config::{MaterialConfig, MaterialKind};
use crate::error::{MpmError, Result};
use crate::math::{Matrix, Real};

pub use fluids::{Visco, Water};
pub use granular::{Nonlocal, Sand, VonMises};
pub use solids::{Elastic, Jelly, Linear, Snow};

/// Particle quantities a model may need besides its deformation gradient.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MaterialContext {
    pub mass: Real,
    /// Reference (undeformed) volume.
    pub volume: Real,
    /// Laplacian of the granular fluidity field interpolated at the particle.
    pub laplacian_gf: Real,
}

impl MaterialContext {
    #[inline]
    pub fn rest_density(&self) -> Real {
        self.mass / self.volume
    }
}

pub trait ConstitutiveModel {
    fn name(&self) -> &'static str;

    /// First Piola-Kirchhoff stress for the elastic deformation gradient `f`.
    fn first_piola_kirchhoff(&self, f: &Matrix) -> Matrix;

    /// Force contribution `-V P F^T` handed to the grid.
    fn calculate_force(&self, f: &Matrix, volume: Real) -> Matrix {
        -volume * self.first_piola_kirchhoff(f) * f.transpose()
    }

    /// Applies the incremental deformation `cdg` to `f` and projects the
    /// result onto the admissible set. The return code is a diagnostic
    /// counter only.
    fn plasticity(&mut self, f: &mut Matrix, cdg: &Matrix, ctx: &MaterialContext) -> i32;

    /// Elastic wave speed, `None` when the model declares no bound.
    fn sound_speed(&self, f: &Matrix, ctx: &MaterialContext) -> Option<Real>;

    fn potential_energy(&self, _f: &Matrix, _volume: Real) -> Option<Real> {
        None
    }

    /// Directional derivative of the stress along `df`.
    fn first_piola_kirchhoff_differential(&self, _f: &Matrix, _df: &Matrix) -> Result<Matrix> {
        Err(MpmError::NotImplemented {
            material: self.name(),
            operation: "first_piola_kirchhoff_differential",
        })
    }

    /// Whether all internal state is finite.
    fn is_finite(&self) -> bool {
        true
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MaterialModel {
    Visco(Visco),
    Snow(Snow),
    Linear(Linear),
    Jelly(Jelly),
    Water(Water),
    Sand(Sand),
    VonMises(VonMises),
    Elastic(Elastic),
    Nonlocal(Nonlocal),
}

macro_rules! dispatch {
    ($self:expr, $model:ident => $body:expr) => {
        match $self {
            MaterialModel::Visco($model) => $body,
            MaterialModel::Snow($model) => $body,
            MaterialModel::Linear($model) => $body,
            MaterialModel::Jelly($model) => $body,
            MaterialModel::Water($model) => $body,
            MaterialModel::Sand($model) => $body,
            MaterialModel::VonMises($model) => $body,
            MaterialModel::Elastic($model) => $body,
            MaterialModel::Nonlocal($model) => $body,
        }
    };
}

impl MaterialModel {
    pub fn from_config(kind: MaterialKind, config: &MaterialConfig) -> Self {
        match kind {
            MaterialKind::Visco => Self::Visco(Visco::from_config(config)),
            MaterialKind::Snow => Self::Snow(Snow::from_config(config)),
            MaterialKind::Linear => Self::Linear(Linear::from_config(config)),
            MaterialKind::Jelly => Self::Jelly(Jelly::from_config(config)),
            MaterialKind::Water => Self::Water(Water::from_config(config)),
            MaterialKind::Sand => Self::Sand(Sand::from_config(config)),
            MaterialKind::VonMises => Self::VonMises(VonMises::from_config(config)),
            MaterialKind::Elastic => Self::Elastic(Elastic::from_config(config)),
            MaterialKind::Nonlocal => Self::Nonlocal(Nonlocal::from_config(config)),
        }
    }

    /// Parses the kind name first, then reads the parameters.
    pub fn from_named_config(kind: &str, config: &MaterialConfig) -> Result<Self> {
        Ok(Self::from_config(kind.parse()?, config))
    }

    pub fn kind(&self) -> MaterialKind {
        match self {
            Self::Visco(_) => MaterialKind::Visco,
            Self::Snow(_) => MaterialKind::Snow,
            Self::Linear(_) => MaterialKind::Linear,
            Self::Jelly(_) => MaterialKind::Jelly,
            Self::Water(_) => MaterialKind::Water,
            Self::Sand(_) => MaterialKind::Sand,
            Self::VonMises(_) => MaterialKind::VonMises,
            Self::Elastic(_) => MaterialKind::Elastic,
            Self::Nonlocal(_) => MaterialKind::Nonlocal,
        }
    }

    /// Granular fluidity carried to the grid, only for the nonlocal model.
    #[inline]
    pub fn granular_fluidity(&self) -> Option<Real> {
        match self {
            Self::Nonlocal(model) => Some(model.gf),
            _ => None,
        }
    }
}

impl ConstitutiveModel for MaterialModel {
    fn name(&self) -> &'static str {
        dispatch!(self, m => m.name())
    }

    #[inline]
    fn first_piola_kirchhoff(&self, f: &Matrix) -> Matrix {
        dispatch!(self, m => m.first_piola_kirchhoff(f))
    }

    #[inline]
    fn calculate_force(&self, f: &Matrix, volume: Real) -> Matrix {
        dispatch!(self, m => m.calculate_force(f, volume))
    }

    #[inline]
    fn plasticity(&mut self, f: &mut Matrix, cdg: &Matrix, ctx: &MaterialContext) -> i32 {
        dispatch!(self, m => m.plasticity(f, cdg, ctx))
    }

    fn sound_speed(&self, f: &Matrix, ctx: &MaterialContext) -> Option<Real> {
        dispatch!(self, m => m.sound_speed(f, ctx))
    }

    fn potential_energy(&self, f: &Matrix, volume: Real) -> Option<Real> {
        dispatch!(self, m => m.potential_energy(f, volume))
    }

    fn first_piola_kirchhoff_differential(&self, f: &Matrix, df: &Matrix) -> Result<Matrix> {
        dispatch!(self, m => m.first_piola_kirchhoff_differential(f, df))
    }

    fn is_finite(&self) -> bool {
        dispatch!(self, m => m.is_finite())
    }
}
