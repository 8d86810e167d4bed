use nalgebra::{DMatrix, DVector};

use crate::error::{KrigingError, Result};

/// Dense LU factorization with partial pivoting, `P A = L U`.
///
/// `L` (unit diagonal, stored below the diagonal) and `U` share one matrix.
/// The factorization is read-only once built and can be shared between
/// threads to solve for many right-hand sides.
#[derive(Debug, Clone)]
pub struct LUSystem {
    pub lu: DMatrix<f64>,
    /// Row `i` of `P A` is row `perm[i]` of `A`.
    pub perm: Vec<usize>,
    pub n: usize,
}

impl LUSystem {
    /// Factorize a square matrix. A pivot smaller than `n * eps * max|a_ij|`
    /// means the matrix is numerically singular.
    pub fn factorize(matrix: DMatrix<f64>) -> Result<Self> {
        let n = matrix.nrows();
        if n != matrix.ncols() {
            return Err(KrigingError::InvalidInput(format!(
                "cannot factorize a {}x{} matrix",
                n,
                matrix.ncols()
            )));
        }

        let mut lu = matrix;
        let max_abs = lu.iter().fold(0f64, |acc, v| acc.max(v.abs()));
        let tolerance = n as f64 * f64::EPSILON * max_abs;
        let mut perm = (0..n).collect::<Vec<_>>();

        for k in 0..n {
            //largest remaining pivot in column k
            let mut pivot_row = k;
            let mut pivot = lu[(k, k)].abs();
            for i in k + 1..n {
                let v = lu[(i, k)].abs();
                if v > pivot {
                    pivot = v;
                    pivot_row = i;
                }
            }

            if pivot.is_nan() || pivot <= tolerance {
                return Err(KrigingError::SingularSystem { dimension: n });
            }

            if pivot_row != k {
                lu.swap_rows(k, pivot_row);
                perm.swap(k, pivot_row);
            }

            let diag = lu[(k, k)];
            for i in k + 1..n {
                let factor = lu[(i, k)] / diag;
                lu[(i, k)] = factor;
                if factor == 0.0 {
                    continue;
                }
                for j in k + 1..n {
                    lu[(i, j)] -= factor * lu[(k, j)];
                }
            }
        }

        Ok(Self { lu, perm, n })
    }

    /// Solve `A x = rhs`.
    pub fn solve(&self, rhs: &DVector<f64>) -> DVector<f64> {
        let mut x = DVector::zeros(self.n);
        self.solve_into(rhs, &mut x);
        x
    }

    /// Solve into `out`, reusing its allocation.
    pub fn solve_into(&self, rhs: &DVector<f64>, out: &mut DVector<f64>) {
        if out.len() != self.n {
            *out = DVector::zeros(self.n);
        }
        for i in 0..self.n {
            out[i] = rhs[self.perm[i]];
        }
        self.substitute_in_place(out);
    }

    #[inline(always)]
    fn substitute_in_place(&self, x: &mut DVector<f64>) {
        let n = self.n;

        // L y = P b
        for i in 0..n {
            let mut sum = x[i];
            for j in 0..i {
                sum -= self.lu[(i, j)] * x[j];
            }
            x[i] = sum;
        }

        // U x = y
        for i in (0..n).rev() {
            let mut sum = x[i];
            for j in i + 1..n {
                sum -= self.lu[(i, j)] * x[j];
            }
            x[i] = sum / self.lu[(i, i)];
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn solves_system_requiring_pivoting() {
        // zero in the leading position, as in a bordered kriging matrix
        let a = DMatrix::from_row_slice(3, 3, &[0.0, 1.0, 1.0, 1.0, 2.0, 0.5, 1.0, 0.5, 2.0]);
        let b = DVector::from_column_slice(&[1.0, 0.7, 0.4]);

        let lu = LUSystem::factorize(a.clone()).unwrap();
        let x = lu.solve(&b);

        assert_relative_eq!(a * x, b, epsilon = 1e-12);
    }

    #[test]
    fn solve_into_matches_solve() {
        let a = DMatrix::from_row_slice(2, 2, &[4.0, 3.0, 6.0, 3.0]);
        let b = DVector::from_column_slice(&[10.0, 12.0]);
        let lu = LUSystem::factorize(a).unwrap();

        let mut out = DVector::zeros(0);
        lu.solve_into(&b, &mut out);

        assert_eq!(out, lu.solve(&b));
        assert_relative_eq!(out, DVector::from_column_slice(&[1.0, 2.0]), epsilon = 1e-12);
    }

    #[test]
    fn duplicate_rows_are_singular() {
        let a = DMatrix::from_row_slice(3, 3, &[1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0]);

        assert!(matches!(
            LUSystem::factorize(a),
            Err(KrigingError::SingularSystem { dimension: 3 })
        ));
    }

    #[test]
    fn non_square_is_invalid() {
        let a = DMatrix::<f64>::zeros(2, 3);
        assert!(matches!(LUSystem::factorize(a), Err(KrigingError::InvalidInput(_))));
    }
}
