use nalgebra::{Matrix3, Point3, Vector3, Vector4};

pub type Real = f32;
pub const DIM: usize = 3;

pub type Vector = Vector3<Real>;
/// Packed `(momentum, mass)` or `(gradient, weight)` record.
pub type VectorP = Vector4<Real>;
pub type Matrix = Matrix3<Real>;
pub type Point = Point3<Real>;
pub type VectorI = Vector3<i32>;

/// Singular values below this magnitude are clamped before logarithms.
pub const SINGULAR_VALUE_FLOOR: Real = 1.0e-4;

#[inline(always)]
pub fn zero_vector() -> Vector {
    Vector::zeros()
}

#[inline(always)]
pub fn repeat_vector(value: Real) -> Vector {
    Vector::repeat(value)
}

#[inline(always)]
pub fn zero_matrix() -> Matrix {
    Matrix::zeros()
}

#[inline(always)]
pub fn identity_matrix() -> Matrix {
    Matrix::identity()
}

#[inline(always)]
pub fn diagonal_from_value(value: Real) -> Matrix {
    Matrix::from_diagonal_element(value)
}

#[inline(always)]
pub fn diagonal_from_vec(vec: Vector) -> Matrix {
    Matrix::from_diagonal(&vec)
}

#[inline(always)]
pub fn outer_product(a: &Vector, b: &Vector) -> Matrix {
    a * b.transpose()
}

#[inline(always)]
pub fn frobenius_norm2(m: &Matrix) -> Real {
    m.norm_squared()
}

#[inline(always)]
pub fn matrix_is_finite(m: &Matrix) -> bool {
    m.iter().all(|e| e.is_finite())
}

#[inline(always)]
pub fn vector_is_finite(v: &Vector) -> bool {
    v.iter().all(|e| e.is_finite())
}

/// `J F^-T`, computed from column cross products so a singular `F` stays finite.
#[inline]
pub fn cofactor(m: &Matrix) -> Matrix {
    let c0 = m.column(0).into_owned();
    let c1 = m.column(1).into_owned();
    let c2 = m.column(2).into_owned();
    Matrix::from_columns(&[c1.cross(&c2), c2.cross(&c0), c0.cross(&c1)])
}

/// Pushes `x` out of `(-eps, eps)` while keeping its sign (zero goes to `+eps`).
#[inline]
pub fn clamp_small_magnitude(x: Real, eps: Real) -> Real {
    if x < -eps {
        x
    } else if x < 0.0 {
        -eps
    } else if x < eps {
        eps
    } else {
        x
    }
}

/// `ln(max(|s|, 1e-4))`.
#[inline(always)]
pub fn guarded_ln(s: Real) -> Real {
    s.abs().max(SINGULAR_VALUE_FLOOR).ln()
}

/// Rotation-variant singular value decomposition `m = u * diag(sigma) * v^T`.
///
/// `u` and `v` are proper rotations; a reflection in `m` shows up as a negative
/// smallest singular value. Singular values are sorted in decreasing magnitude.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Svd {
    pub u: Matrix,
    pub sigma: Vector,
    pub v: Matrix,
}

impl Svd {
    const MAX_ITERATIONS: usize = 256;

    pub fn new(m: &Matrix) -> Self {
        let Some(svd) = m.try_svd(true, true, Real::EPSILON, Self::MAX_ITERATIONS) else {
            // Non-convergence only happens for non-finite input; keep the NaN
            // visible so the caller's degeneracy checks fire.
            return Self {
                u: identity_matrix(),
                sigma: repeat_vector(Real::NAN),
                v: identity_matrix(),
            };
        };

        let mut u = svd.u.unwrap_or_else(identity_matrix);
        let mut v = svd
            .v_t
            .map(|v_t| v_t.transpose())
            .unwrap_or_else(identity_matrix);
        let mut sigma = svd.singular_values;

        if u.determinant() < 0.0 {
            let flipped = -u.column(DIM - 1).into_owned();
            u.set_column(DIM - 1, &flipped);
            sigma[DIM - 1] = -sigma[DIM - 1];
        }
        if v.determinant() < 0.0 {
            let flipped = -v.column(DIM - 1).into_owned();
            v.set_column(DIM - 1, &flipped);
            sigma[DIM - 1] = -sigma[DIM - 1];
        }

        Self { u, sigma, v }
    }

    #[inline]
    pub fn recompose(&self, sigma: &Vector) -> Matrix {
        self.u * diagonal_from_vec(*sigma) * self.v.transpose()
    }

    #[inline]
    pub fn determinant(&self) -> Real {
        self.sigma.iter().product()
    }
}

/// Polar decomposition `m = r * s` with `r` a rotation and `s` symmetric.
#[inline]
pub fn polar_decomp(m: &Matrix) -> (Matrix, Matrix) {
    let svd = Svd::new(m);
    let r = svd.u * svd.v.transpose();
    let s = svd.v * diagonal_from_vec(svd.sigma) * svd.v.transpose();
    (r, s)
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DecomposedTensor {
    pub deviatoric_part: Matrix,
    pub spherical_part: Real,
}

impl DecomposedTensor {
    pub fn decompose(tensor: &Matrix) -> Self {
        let spherical_part = tensor.trace() / (DIM as Real);
        let deviatoric_part = tensor - diagonal_from_value(spherical_part);
        Self {
            deviatoric_part,
            spherical_part,
        }
    }

    pub fn zero() -> Self {
        Self {
            deviatoric_part: zero_matrix(),
            spherical_part: 0.0,
        }
    }

    pub fn recompose(&self) -> Matrix {
        self.deviatoric_part + diagonal_from_value(self.spherical_part)
    }
}
