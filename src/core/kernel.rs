//! Quadratic B-spline interpolation kernels.
//!
//! Positions are in grid units (world position times `1 / h`). The 3x3x3
//! stencil starts at `floor(x - 0.5)` so that `x - base` lies in `[0.5, 1.5)`
//! on every axis. Nodes inside the stencil are numbered `i * 9 + j * 3 + k`.

use crate::math::{Real, Vector, VectorI, VectorP};

pub const KERNEL_SIZE: usize = 3;
pub const STENCIL_NODES: usize = KERNEL_SIZE * KERNEL_SIZE * KERNEL_SIZE;
/// Inverse of the APIC inertia tensor for the quadratic kernel, in grid units.
pub const INV_D: Real = 4.0;

/// Second derivatives of the three 1D weights (grid units).
const SECOND_DERIVATIVES: [Real; KERNEL_SIZE] = [1.0, -2.0, 1.0];

#[inline(always)]
pub fn stencil_base(pos: &Vector) -> VectorI {
    pos.map(|x| (x - 0.5).floor() as i32)
}

/// Node closest to `pos`; particles are binned by it.
#[inline(always)]
pub fn nearest_node(pos: &Vector) -> VectorI {
    stencil_base(pos).add_scalar(1)
}

#[inline(always)]
pub fn stencil_offset(node_id: usize) -> VectorI {
    VectorI::new(
        (node_id / 9) as i32,
        (node_id / 3 % 3) as i32,
        (node_id % 3) as i32,
    )
}

#[inline(always)]
fn split(node_id: usize) -> (usize, usize, usize) {
    (node_id / 9, node_id / 3 % 3, node_id % 3)
}

/// General kernel: weights and their spatial gradients.
#[derive(Clone, Copy, Debug)]
pub struct QuadraticKernel {
    w: [[Real; KERNEL_SIZE]; 3],
    dw: [[Real; KERNEL_SIZE]; 3],
    inv_dx: Real,
}

impl QuadraticKernel {
    /// Kernel for a particle at grid-space position `pos`.
    #[inline]
    pub fn new(pos: &Vector, inv_dx: Real) -> Self {
        let base = stencil_base(pos);
        Self::from_offset(&(pos - base.cast::<Real>()), inv_dx)
    }

    /// Kernel from the offset `x - base`, each component in `[0.5, 1.5)`.
    #[inline]
    pub fn from_offset(fx: &Vector, inv_dx: Real) -> Self {
        let mut w = [[0.0; KERNEL_SIZE]; 3];
        let mut dw = [[0.0; KERNEL_SIZE]; 3];
        for axis in 0..3 {
            let x = fx[axis];
            let a = 1.5 - x;
            let b = x - 1.0;
            let c = x - 0.5;
            w[axis] = [0.5 * a * a, 0.75 - b * b, 0.5 * c * c];
            dw[axis] = [(x - 1.5) * inv_dx, -2.0 * b * inv_dx, c * inv_dx];
        }
        Self { w, dw, inv_dx }
    }

    #[inline(always)]
    pub fn weight(&self, node_id: usize) -> Real {
        let (i, j, k) = split(node_id);
        self.w[0][i] * self.w[1][j] * self.w[2][k]
    }

    /// `(dw/dx, dw/dy, dw/dz, w)`, gradients in world units.
    #[inline(always)]
    pub fn dw_w(&self, node_id: usize) -> VectorP {
        let (i, j, k) = split(node_id);
        let (w, dw) = (&self.w, &self.dw);
        VectorP::new(
            dw[0][i] * w[1][j] * w[2][k],
            w[0][i] * dw[1][j] * w[2][k],
            w[0][i] * w[1][j] * dw[2][k],
            w[0][i] * w[1][j] * w[2][k],
        )
    }

    /// Laplacian of the weight, world units.
    #[inline]
    pub fn laplacian(&self, node_id: usize) -> Real {
        let (i, j, k) = split(node_id);
        let w = &self.w;
        let inv_dx2 = self.inv_dx * self.inv_dx;
        (SECOND_DERIVATIVES[i] * w[1][j] * w[2][k]
            + w[0][i] * SECOND_DERIVATIVES[j] * w[2][k]
            + w[0][i] * w[1][j] * SECOND_DERIVATIVES[k])
            * inv_dx2
    }
}

/// Weight-only kernel for the moving-least-squares transfer, written as one
/// quadratic polynomial per stencil column.
#[derive(Clone, Copy, Debug)]
pub struct MlsFastKernel {
    weights: [Real; STENCIL_NODES],
}

impl MlsFastKernel {
    const A: [Real; 3] = [0.5, -1.0, 0.5];
    const B: [Real; 3] = [-1.5, 0.0, 1.5];
    const C: [Real; 3] = [1.125, 0.75, 1.125];
    const SHIFT: [Real; 3] = [-0.5, 0.5, 1.5];

    /// `fx` is the offset of the particle from the stencil base.
    #[inline]
    pub fn new(fx: &Vector) -> Self {
        let mut w_cache = [[0.0; 3]; 3];
        for (axis, cache) in w_cache.iter_mut().enumerate() {
            let p_fract = fx[axis] - 0.5;
            for n in 0..3 {
                let t = p_fract - Self::SHIFT[n];
                cache[n] = Self::A[n] * t * t + Self::B[n] * t + Self::C[n];
            }
        }

        let mut weights = [0.0; STENCIL_NODES];
        for (node_id, weight) in weights.iter_mut().enumerate() {
            let (i, j, k) = split(node_id);
            *weight = w_cache[0][i] * w_cache[1][j] * w_cache[2][k];
        }
        Self { weights }
    }

    #[inline(always)]
    pub fn weight(&self, node_id: usize) -> Real {
        self.weights[node_id]
    }
}
