use super::check_rigid_body_id;
use crate::error::Result;
use crate::math::{Matrix, Real, Vector};

/// What the transfer passes need from a rigid body.
///
/// Impulses are staged: the passes call [`reset_tmp_velocity`] once before
/// the particle loop, stage every contribution with [`apply_tmp_impulse`], and
/// call [`apply_tmp_velocity`] once afterwards. Velocities read through
/// [`velocity_at`] stay those of the previous step for the whole pass.
///
/// [`reset_tmp_velocity`]: RigidBody::reset_tmp_velocity
/// [`apply_tmp_impulse`]: RigidBody::apply_tmp_impulse
/// [`apply_tmp_velocity`]: RigidBody::apply_tmp_velocity
/// [`velocity_at`]: RigidBody::velocity_at
pub trait RigidBody: Send + Sync {
    fn id(&self) -> i32;
    /// Friction code for the given side (0 or 1) of the body.
    fn friction(&self, side: usize) -> Real;
    fn velocity_at(&self, point: &Vector) -> Vector;
    fn apply_tmp_impulse(&mut self, impulse: Vector, point: Vector);
    fn reset_tmp_velocity(&mut self);
    fn apply_tmp_velocity(&mut self);
}

#[derive(Default)]
pub struct RigidBodySet {
    bodies: Vec<Box<dyn RigidBody>>,
}

impl RigidBodySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails for ids outside the coloring budget; the body is not added.
    pub fn insert(&mut self, body: impl RigidBody + 'static) -> Result<i32> {
        let id = check_rigid_body_id(body.id())?;
        self.bodies.push(Box::new(body));
        Ok(id)
    }

    /// `None` for the sentinel `-1` and for unknown ids.
    #[inline]
    pub fn get(&self, id: i32) -> Option<&dyn RigidBody> {
        if id < 0 {
            return None;
        }
        self.bodies.iter().find(|b| b.id() == id).map(|b| b.as_ref())
    }

    #[inline]
    pub fn get_mut(&mut self, id: i32) -> Option<&mut (dyn RigidBody + 'static)> {
        if id < 0 {
            return None;
        }
        self.bodies
            .iter_mut()
            .find(|b| b.id() == id)
            .map(|b| b.as_mut())
    }

    pub fn reset_tmp_velocity(&mut self) {
        self.bodies.iter_mut().for_each(|b| b.reset_tmp_velocity());
    }

    pub fn apply_tmp_velocity(&mut self) {
        self.bodies.iter_mut().for_each(|b| b.apply_tmp_velocity());
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn RigidBody> {
        self.bodies.iter().map(|b| b.as_ref())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StagedImpulse {
    pub body: i32,
    pub impulse: Vector,
    pub point: Vector,
}

/// Impulses staged by one unit of work. Ledgers are replayed serially in a
/// fixed order, which keeps rigid-body results independent of scheduling.
#[derive(Clone, Debug, Default)]
pub struct ImpulseLedger {
    entries: Vec<StagedImpulse>,
}

impl ImpulseLedger {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, body: i32, impulse: Vector, point: Vector) {
        self.entries.push(StagedImpulse {
            body,
            impulse,
            point,
        });
    }

    pub fn append(&mut self, other: &mut ImpulseLedger) {
        self.entries.append(&mut other.entries);
    }

    pub fn entries(&self) -> &[StagedImpulse] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn replay(self, bodies: &mut RigidBodySet) {
        for staged in self.entries {
            if let Some(body) = bodies.get_mut(staged.body) {
                body.apply_tmp_impulse(staged.impulse, staged.point);
            }
        }
    }
}

/// Free rigid body with linear and angular velocity. A body with infinite
/// mass is kinematic: it reports impulses but never changes velocity.
#[derive(Clone, Debug, PartialEq)]
pub struct RigidBodyState {
    pub id: i32,
    pub frictions: [Real; 2],
    pub center_of_mass: Vector,
    pub linear_velocity: Vector,
    pub angular_velocity: Vector,
    pub mass: Real,
    /// World-space inertia tensor.
    pub inertia: Matrix,
    tmp_linear_impulse: Vector,
    tmp_angular_impulse: Vector,
}

impl RigidBodyState {
    pub fn new(id: i32, center_of_mass: Vector, mass: Real, inertia: Matrix) -> Self {
        Self {
            id,
            frictions: [0.0; 2],
            center_of_mass,
            linear_velocity: Vector::zeros(),
            angular_velocity: Vector::zeros(),
            mass,
            inertia,
            tmp_linear_impulse: Vector::zeros(),
            tmp_angular_impulse: Vector::zeros(),
        }
    }

    pub fn kinematic(id: i32, center_of_mass: Vector) -> Self {
        Self::new(id, center_of_mass, Real::INFINITY, Matrix::zeros())
    }

    pub fn with_frictions(mut self, inside: Real, outside: Real) -> Self {
        self.frictions = [inside, outside];
        self
    }

    pub fn with_velocity(mut self, linear: Vector, angular: Vector) -> Self {
        self.linear_velocity = linear;
        self.angular_velocity = angular;
        self
    }

    pub fn is_kinematic(&self) -> bool {
        !self.mass.is_finite()
    }

    pub fn staged_linear_impulse(&self) -> Vector {
        self.tmp_linear_impulse
    }

    pub fn staged_angular_impulse(&self) -> Vector {
        self.tmp_angular_impulse
    }
}

impl RigidBody for RigidBodyState {
    fn id(&self) -> i32 {
        self.id
    }

    fn friction(&self, side: usize) -> Real {
        self.frictions[side & 1]
    }

    fn velocity_at(&self, point: &Vector) -> Vector {
        self.linear_velocity + self.angular_velocity.cross(&(point - self.center_of_mass))
    }

    fn apply_tmp_impulse(&mut self, impulse: Vector, point: Vector) {
        self.tmp_linear_impulse += impulse;
        self.tmp_angular_impulse += (point - self.center_of_mass).cross(&impulse);
    }

    fn reset_tmp_velocity(&mut self) {
        self.tmp_linear_impulse = Vector::zeros();
        self.tmp_angular_impulse = Vector::zeros();
    }

    fn apply_tmp_velocity(&mut self) {
        if !self.is_kinematic() {
            self.linear_velocity += self.tmp_linear_impulse / self.mass;
            if let Some(inv_inertia) = self.inertia.try_inverse() {
                self.angular_velocity += inv_inertia * self.tmp_angular_impulse;
            }
        }
    }
}
