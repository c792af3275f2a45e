//! Fixed-size 3x3 Cholesky solve used by the maximum-entropy step search.
//!
//! The factorization, forward substitution and back substitution are written out
//! explicitly so that the order of floating-point operations is fixed; chi-square
//! trajectories of the solver depend on it.

use nalgebra::{Matrix3, Vector3};

use crate::error::{Result, SasError};

/// Trailing pivots at or below this fraction of their diagonal entry mark a
/// search direction that is a combination of the previous ones.
const DEGENERATE_PIVOT: f64 = 1e-12;
/// Trailing pivots below minus this fraction of their diagonal entry mean the
/// matrix is not positive semi-definite.
const INDEFINITE_PIVOT: f64 = 1e-8;

/// Lower-triangular Cholesky factor with per-row activity flags.
#[derive(Clone, Debug)]
pub struct Cholesky3 {
    lower: Matrix3<f64>,
    active: [bool; 3],
}

impl Cholesky3 {
    /// Factors the symmetric matrix `a` (only the lower triangle is read).
    pub fn new(a: &Matrix3<f64>) -> Result<Self> {
        let mut l = Matrix3::<f64>::zeros();
        let mut active = [true; 3];

        if !(a[(0, 0)] > 0.0) {
            return Err(SasError::NonPositivePivot { pivot: a[(0, 0)] });
        }
        l[(0, 0)] = a[(0, 0)].sqrt();

        for i in 1..3 {
            l[(i, 0)] = a[(i, 0)] / l[(0, 0)];
            for j in 1..=i {
                let mut z = 0.0;
                for k in 0..j {
                    z += l[(i, k)] * l[(j, k)];
                }
                z = a[(i, j)] - z;
                if j == i {
                    let scale = a[(i, i)].abs();
                    if z > DEGENERATE_PIVOT * scale {
                        l[(i, i)] = z.sqrt();
                    } else if z >= -INDEFINITE_PIVOT * scale {
                        active[i] = false;
                    } else {
                        return Err(SasError::NonPositivePivot { pivot: z });
                    }
                } else if active[j] {
                    l[(i, j)] = z / l[(j, j)];
                }
            }
        }

        Ok(Self { lower: l, active })
    }

    /// The lower-triangular factor; rows of dropped directions are partially zero.
    pub fn lower(&self) -> &Matrix3<f64> {
        &self.lower
    }

    /// Which of the three directions survived factorization.
    pub fn active(&self) -> [bool; 3] {
        self.active
    }

    /// Solves `L L^T x = b`; dropped directions get a zero coefficient.
    pub fn solve(&self, b: &Vector3<f64>) -> Vector3<f64> {
        let l = &self.lower;

        let mut y = Vector3::zeros();
        for i in 0..3 {
            if !self.active[i] {
                continue;
            }
            let mut z = 0.0;
            for k in 0..i {
                z += l[(i, k)] * y[k];
            }
            y[i] = (b[i] - z) / l[(i, i)];
        }

        let mut x = Vector3::zeros();
        for i in (0..3).rev() {
            if !self.active[i] {
                continue;
            }
            let mut z = 0.0;
            for k in (i + 1)..3 {
                z += l[(k, i)] * x[k];
            }
            x[i] = (y[i] - z) / l[(i, i)];
        }
        x
    }
}

/// Solves the symmetric positive-definite system `a x = b`.
pub fn cho_sol(a: &Matrix3<f64>, b: &Vector3<f64>) -> Result<Vector3<f64>> {
    Ok(Cholesky3::new(a)?.solve(b))
}
