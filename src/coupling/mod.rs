//! Two-way rigid-body coupling.
//!
//! Grid nodes and particles carry two tag bits per rigid body. A node and a
//! particle sitting on opposite sides of a thin rigid sheet are incompatible:
//! momentum is not exchanged through the grid, the particle is instead
//! frictionally projected against the body's surface velocity.

pub mod rigid_body;

pub use rigid_body::{ImpulseLedger, RigidBody, RigidBodySet, RigidBodyState, StagedImpulse};

use crate::config::{MAX_RIGID_BODIES, STATE_MASK};
use crate::error::{MpmError, Result};
use crate::math::{Real, Vector};

/// Rigid body ids must fit the two-bits-per-body coloring budget.
#[inline]
pub fn check_rigid_body_id(id: i32) -> Result<i32> {
    if (0..MAX_RIGID_BODIES as i32).contains(&id) {
        Ok(id)
    } else {
        Err(MpmError::InvalidRigidBodyId {
            id,
            max: MAX_RIGID_BODIES,
        })
    }
}

/// Bits on which grid and particle must agree: the low bit of every body pair
/// for which both carry the "tagged" high bit.
#[inline(always)]
pub fn coloring_mask(grid_states: u32, particle_states: u32) -> u32 {
    (grid_states & particle_states & STATE_MASK) >> 1
}

#[inline(always)]
pub fn is_incompatible(grid_states: u32, particle_states: u32) -> bool {
    let mask = coloring_mask(grid_states, particle_states);
    (grid_states & mask) != (particle_states & mask)
}

/// Which of the body's two friction coefficients applies to a particle.
/// Ids without coloring bits fall back to side 0.
#[inline(always)]
pub fn friction_side(particle_states: u32, body_id: i32) -> usize {
    u32::try_from(body_id)
        .ok()
        .and_then(|id| particle_states.checked_shr(id.saturating_mul(2)))
        .map_or(0, |bits| (bits & 1) as usize)
}

/// Projects `velocity` against a surface moving at `base_velocity`.
///
/// `friction == -1` sticks to the surface, `friction <= -2` slides with
/// Coulomb coefficient `-friction - 2` without separating, any other value is
/// a Coulomb coefficient with separation allowed.
#[inline]
pub fn friction_project(
    velocity: &Vector,
    base_velocity: &Vector,
    normal: &Vector,
    friction: Real,
) -> Vector {
    if friction == -1.0 {
        return *base_velocity;
    }

    let slip = friction <= -2.0;
    let mu = if slip { -friction - 2.0 } else { friction };

    let relative_vel = velocity - base_velocity;
    let normal_norm = normal.dot(&relative_vel);
    let tangential_relative_vel = relative_vel - normal_norm * normal;
    let tangential_norm = tangential_relative_vel.norm();
    let tangential_scale =
        (tangential_norm + normal_norm.min(0.0) * mu).max(0.0) / tangential_norm.max(1e-30);

    let separating = if slip { 0.0 } else { normal_norm.max(0.0) };
    tangential_scale * tangential_relative_vel + separating * normal + base_velocity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_pairs_are_compatible() {
        assert!(!is_incompatible(0, 0b11));
        assert!(!is_incompatible(0b11, 0));
        assert!(!is_incompatible(0b10, 0b10));
        assert!(!is_incompatible(0b11, 0b11));
    }

    #[test]
    fn opposite_sides_are_incompatible() {
        assert!(is_incompatible(0b10, 0b11));
        assert!(is_incompatible(0b11, 0b10));
        // body 1 differs, body 0 agrees
        assert!(is_incompatible(0b1110, 0b1010));
        // body 1 untagged on the grid side
        assert!(!is_incompatible(0b0011, 0b1011));
    }

    #[test]
    fn friction_side_reads_the_body_pair() {
        assert_eq!(friction_side(0b0100, 1), 1);
        assert_eq!(friction_side(0b0100, 0), 0);
        assert_eq!(friction_side(1 << 22, 11), 1);
    }

    #[test]
    fn ids_past_the_tag_bits_never_shift_out_of_range() {
        for id in [12, 16, 254, i32::MAX, -1] {
            assert!(friction_side(u32::MAX, id) <= 1);
        }
        assert_eq!(friction_side(u32::MAX, 16), 0);
        assert!(check_rigid_body_id(11).is_ok());
        assert!(check_rigid_body_id(12).is_err());
        assert!(check_rigid_body_id(-1).is_err());
    }

    #[test]
    fn separating_contact_keeps_velocity() {
        let n = Vector::new(0.0, 1.0, 0.0);
        let v = Vector::new(0.3, 2.0, 0.0);
        let projected = friction_project(&v, &Vector::zeros(), &n, 0.5);
        assert!((projected - v).norm() < 1e-6);
    }

    #[test]
    fn approaching_contact_loses_normal_and_some_tangential_speed() {
        let n = Vector::new(0.0, 1.0, 0.0);
        let v = Vector::new(1.0, -0.5, 0.0);
        let projected = friction_project(&v, &Vector::zeros(), &n, 0.4);
        assert_eq!(projected.y, 0.0);
        assert!((projected.x - 0.8).abs() < 1e-6);
    }

    #[test]
    fn slip_code_never_separates() {
        let n = Vector::new(0.0, 1.0, 0.0);
        let v = Vector::new(1.0, 3.0, 0.0);
        let projected = friction_project(&v, &Vector::zeros(), &n, -2.0);
        assert_eq!(projected, Vector::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn sticky_code_returns_base_velocity() {
        let base = Vector::new(0.1, -0.2, 0.3);
        let projected = friction_project(
            &Vector::new(9.0, 9.0, 9.0),
            &base,
            &Vector::new(1.0, 0.0, 0.0),
            -1.0,
        );
        assert_eq!(projected, base);
    }
}
