use nalgebra::DVector;

use crate::error::{KrigingError, Result};
use crate::systems::lu::LUSystem;

/// Solution of one ordinary kriging system.
#[derive(Clone, Debug, PartialEq)]
pub struct SolvedOKSystem {
    /// One weight per conditioning point.
    pub weights: DVector<f64>,
    /// Lagrange multiplier enforcing `sum(weights) == 1`.
    pub lagrange: f64,
}

impl SolvedOKSystem {
    pub fn solve(lu: &LUSystem, rhs: &DVector<f64>) -> Result<Self> {
        let x = lu.solve(rhs);
        if !x.iter().all(|v| v.is_finite()) {
            return Err(KrigingError::SingularSystem { dimension: lu.n });
        }

        let n_cond = lu.n - 1;
        Ok(Self {
            weights: x.rows(0, n_cond).into_owned(),
            lagrange: x[n_cond],
        })
    }

    pub fn weight_sum(&self) -> f64 {
        self.weights.sum()
    }

    #[inline(always)]
    pub fn estimate(&self, values: &[f64]) -> f64 {
        self.weights.iter().zip(values).map(|(w, v)| w * v).sum()
    }

    /// Ordinary kriging variance `c_0 - sum(w_i * c_i0) - λ`, where `cov_vec`
    /// is the right-hand side the system was solved with. Not clamped.
    #[inline(always)]
    pub fn variance(&self, c_0: f64, cov_vec: &DVector<f64>) -> f64 {
        let explained: f64 = self.weights.iter().zip(cov_vec.iter()).map(|(w, c)| w * c).sum();
        c_0 - explained - self.lagrange
    }
}
