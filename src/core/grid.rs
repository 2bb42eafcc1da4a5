//! Grid node record
//!
//! One record per grid node: packed momentum and mass, the boundary distance,
//! rigid-body coloring bits, the per-node particle count written by the block
//! scheduler, and an optional spinlock.

use std::hint;
use std::sync::atomic::{AtomicU16, Ordering};

use crate::config::{ID_MASK, TAG_BITS, TAG_MASK};
use crate::coupling::check_rigid_body_id;
use crate::error::Result;
use crate::math::{Real, Vector, VectorP};

/// Minimal test-and-set lock embedded in every node.
///
/// Only needed when nodes are updated from several workers at once; the block
/// passes partition nodes between workers and never take it.
#[derive(Debug, Default)]
pub struct SpinLock(AtomicU16);

impl SpinLock {
    pub const fn new() -> Self {
        Self(AtomicU16::new(0))
    }

    #[inline]
    pub fn try_lock(&self) -> bool {
        self.0
            .compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_> {
        while !self.try_lock() {
            while self.0.load(Ordering::Relaxed) != 0 {
                hint::spin_loop();
            }
        }
        SpinLockGuard { lock: self }
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.0.load(Ordering::Relaxed) != 0
    }

    #[inline]
    fn unlock(&self) {
        self.0.store(0, Ordering::Release);
    }
}

/// Cloning a record never clones a held lock.
impl Clone for SpinLock {
    fn clone(&self) -> Self {
        Self::new()
    }
}

pub struct SpinLockGuard<'a> {
    lock: &'a SpinLock,
}

impl Drop for SpinLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

#[repr(C, align(64))]
#[derive(Clone, Debug)]
pub struct GridState {
    /// `(momentum, mass)` during rasterization, `(velocity, mass)` after the
    /// grid update.
    pub velocity_and_mass: VectorP,
    pub distance: Real,
    states: u32,
    pub particle_count: u32,
    lock: SpinLock,
    /// Mass-weighted during rasterization, normalized by the grid update.
    pub granular_fluidity: Real,
}

const _: () = assert!(std::mem::size_of::<GridState>().is_power_of_two());

impl Default for GridState {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl GridState {
    #[inline(always)]
    pub fn zeroed() -> Self {
        Self {
            velocity_and_mass: VectorP::zeros(),
            distance: 0.0,
            states: 0,
            particle_count: 0,
            lock: SpinLock::new(),
            granular_fluidity: 0.0,
        }
    }

    /// Clears the per-step accumulators; boundary distance, coloring and the
    /// owning body are set by the boundary pass and survive.
    #[inline(always)]
    pub fn reset(&mut self) {
        self.velocity_and_mass = VectorP::zeros();
        self.particle_count = 0;
        self.granular_fluidity = 0.0;
    }

    #[inline(always)]
    pub fn mass(&self) -> Real {
        self.velocity_and_mass.w
    }

    #[inline(always)]
    pub fn velocity(&self) -> Vector {
        self.velocity_and_mass.xyz()
    }

    /// Coloring tag bits (two per rigid body).
    #[inline(always)]
    pub fn states(&self) -> u32 {
        self.states & TAG_MASK
    }

    #[inline(always)]
    pub fn set_states(&mut self, states: u32) {
        self.states = (self.states & !TAG_MASK) | (states & TAG_MASK);
    }

    /// Rigid body owning this node, `-1` for none.
    #[inline(always)]
    pub fn rigid_body_id(&self) -> i32 {
        (self.states >> TAG_BITS) as i32 - 1
    }

    /// `-1` clears the owner. Ids outside the coloring budget are rejected
    /// and leave the node unchanged.
    #[inline]
    pub fn set_rigid_body_id(&mut self, id: i32) -> Result<()> {
        if id != -1 {
            check_rigid_body_id(id)?;
        }
        self.states = (self.states & !ID_MASK) | (((id + 1) as u32) << TAG_BITS);
        Ok(())
    }

    #[inline(always)]
    pub fn raw_states(&self) -> u32 {
        self.states
    }

    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_> {
        self.lock.lock()
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }
}
