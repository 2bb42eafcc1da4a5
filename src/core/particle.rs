//! Material particles for MPM simulation
//!
//! Particles carry position, velocity, mass, the elastic deformation gradient
//! and the constitutive model that governs them.

use bevy::log::error;
use serde::{Deserialize, Serialize};

use crate::config::{MaterialConfig, MaterialKind};
use crate::error::{MpmError, Result};
use crate::materials::{ConstitutiveModel, MaterialContext, MaterialModel};
use crate::math::{Matrix, Real, Vector, identity_matrix, matrix_is_finite, zero_matrix, zero_vector};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    /// World units.
    pub position: Vector,
    pub velocity: Vector,
    pub mass: Real,
    /// Reference volume.
    pub volume: Real,
    /// Elastic deformation gradient.
    pub deformation_gradient: Matrix,
    /// Affine velocity field (grid units).
    pub apic_b: Matrix,
    /// Second-order affine term, only used with `quadratic_affine`.
    pub apic_c: Matrix,
    /// Rigid-body coloring, two bits per body.
    pub states: u32,
    /// Body this particle samples, `-1` for deformable particles.
    pub rigid_id: i32,
    pub boundary_distance: Real,
    pub boundary_normal: Vector,
    pub near_boundary: bool,
    pub sticky: bool,
    pub material: MaterialModel,
}

impl Particle {
    pub fn new(position: Vector, mass: Real, volume: Real, material: MaterialModel) -> Self {
        Self {
            position,
            velocity: zero_vector(),
            mass,
            volume,
            deformation_gradient: identity_matrix(),
            apic_b: zero_matrix(),
            apic_c: zero_matrix(),
            states: 0,
            rigid_id: -1,
            boundary_distance: 0.0,
            boundary_normal: zero_vector(),
            near_boundary: false,
            sticky: false,
            material,
        }
    }

    /// Particle whose model is read from named parameters.
    pub fn from_config(
        position: Vector,
        mass: Real,
        volume: Real,
        kind: MaterialKind,
        config: &MaterialConfig,
    ) -> Self {
        Self::new(position, mass, volume, MaterialModel::from_config(kind, config))
    }

    pub fn with_velocity(mut self, velocity: Vector) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_states(mut self, states: u32) -> Self {
        self.states = states;
        self
    }

    pub fn with_rigid_id(mut self, rigid_id: i32) -> Self {
        self.rigid_id = rigid_id;
        self
    }

    /// Marks the particle as near a boundary at signed `distance` along `normal`.
    pub fn with_boundary(mut self, distance: Real, normal: Vector) -> Self {
        self.near_boundary = true;
        self.boundary_distance = distance;
        self.boundary_normal = normal;
        self
    }

    pub fn with_sticky(mut self, sticky: bool) -> Self {
        self.sticky = sticky;
        self
    }

    #[inline(always)]
    pub fn is_rigid(&self) -> bool {
        self.rigid_id != -1
    }

    #[inline(always)]
    pub fn momentum(&self) -> Vector {
        self.velocity * self.mass
    }

    #[inline(always)]
    pub fn rest_density(&self) -> Real {
        if self.volume > 0.0 {
            self.mass / self.volume
        } else {
            0.0
        }
    }

    #[inline(always)]
    pub fn jacobian(&self) -> Real {
        self.deformation_gradient.determinant()
    }

    #[inline(always)]
    pub fn density(&self) -> Real {
        self.rest_density() / self.jacobian()
    }

    #[inline]
    pub fn material_context(&self, laplacian_gf: Real) -> MaterialContext {
        MaterialContext {
            mass: self.mass,
            volume: self.volume,
            laplacian_gf,
        }
    }

    /// Logs the particle state and builds the fatal error.
    #[cold]
    fn degeneracy(&self, what: &'static str, deformation_gradient: &Matrix) -> MpmError {
        let density = self.rest_density() / deformation_gradient.determinant();
        error!(
            "numerical degeneracy ({what}) in {} particle at {:?}: F = {deformation_gradient}, density = {density}",
            self.material.name(),
            self.position,
        );
        MpmError::NumericalDegeneracy {
            material: self.material.name(),
            what,
            deformation_gradient: *deformation_gradient,
            density,
        }
    }

    /// Force matrix handed to the grid.
    #[inline]
    pub fn calculate_force(&self) -> Result<Matrix> {
        let force = self
            .material
            .calculate_force(&self.deformation_gradient, self.volume);
        if !matrix_is_finite(&force) {
            return Err(self.degeneracy("force", &self.deformation_gradient));
        }
        Ok(force)
    }

    /// Applies the incremental deformation `cdg`. The new state is committed
    /// only when it is finite; otherwise the particle is left untouched.
    pub fn plasticity(&mut self, cdg: &Matrix, laplacian_gf: Real) -> Result<i32> {
        let ctx = self.material_context(laplacian_gf);
        let mut material = self.material.clone();
        let mut f = self.deformation_gradient;
        let code = material.plasticity(&mut f, cdg, &ctx);

        if !matrix_is_finite(&f) || !f.determinant().is_finite() || !material.is_finite() {
            return Err(self.degeneracy("plasticity", &f));
        }
        self.deformation_gradient = f;
        self.material = material;
        Ok(code)
    }

    /// CFL bound `dx / (c + |v|)`, infinite when the model declares no wave speed.
    pub fn allowed_dt(&self, dx: Real) -> Result<Real> {
        let ctx = self.material_context(0.0);
        match self.material.sound_speed(&self.deformation_gradient, &ctx) {
            None => Ok(Real::INFINITY),
            Some(c) if c.is_nan() => Err(self.degeneracy("sound speed", &self.deformation_gradient)),
            Some(c) => Ok(dx / (c + self.velocity.norm())),
        }
    }

    pub fn potential_energy(&self) -> Option<Real> {
        self.material
            .potential_energy(&self.deformation_gradient, self.volume)
    }

    pub fn to_checkpoint(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_checkpoint(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }
}
