// Physical and structural constants for the transfer engine
use crate::math::Real;

// Global physics
pub const GRAVITY_Y: Real = -9.81;
pub const DEFAULT_BASE_DELTA_T: Real = 1.0e-4;

// Boundary response
pub const DEFAULT_PENALTY: Real = 1.0e3;
pub const DEFAULT_PUSHING_FORCE: Real = 20.0;
/// Penetration band `(-0.3 h, -0.05 h)` in which the restoring impulse applies.
pub const PENALTY_BAND_OUTER: Real = 0.3;
pub const PENALTY_BAND_INNER: Real = 0.05;
/// Cells next to each domain face whose velocity is clamped by the slip walls.
pub const WALL_CELLS: i32 = 2;
/// Particles are kept this far (grid units) inside the upper domain faces.
pub const POSITION_CLAMP_EPSILON: Real = 1.0e-3;

// Sparse grid layout
pub const BLOCK_BITS: u32 = 2;
pub const BLOCK_SIZE: i32 = 1 << BLOCK_BITS;
pub const ELEMENTS_PER_BLOCK: usize = 1 << (3 * BLOCK_BITS);
pub const DEFAULT_BLOCK_IDLE_STEPS: u32 = 8;

// Rigid-body coloring bit budget
pub const MAX_RIGID_BODIES: u32 = 12;
pub const STATE_TOTAL_BITS: u32 = 32;
pub const TAG_BITS: u32 = MAX_RIGID_BODIES * 2;
pub const ID_BITS: u32 = STATE_TOTAL_BITS - TAG_BITS;
pub const TAG_MASK: u32 = (1 << TAG_BITS) - 1;
pub const ID_MASK: u32 = !TAG_MASK;
/// High bit of every per-body (inside, outside) pair.
pub const STATE_MASK: u32 = 0x00AA_AAAA;
