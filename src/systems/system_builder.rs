use nalgebra::{DMatrix, DVector, Point2};

use crate::geometry::DistanceMetric;
use crate::variography::model_variograms::IsoVariogramModel;

/// Separations at or below this are treated as the same location.
pub const ZERO_LAG: f64 = 1e-12;

/// Bordered covariance matrix and right-hand side for one query point.
#[derive(Debug, Clone, PartialEq)]
pub struct KrigingSystem {
    pub matrix: DMatrix<f64>,
    pub rhs: DVector<f64>,
}

/// Assembles ordinary kriging systems in covariance form:
///
/// ```text
/// | C  1 | | w |   | c0 |
/// | 1' 0 | | λ | = | 1  |
/// ```
pub struct OKSystemBuilder;

impl OKSystemBuilder {
    /// Covariance at separation `h`. Zero separation is zero lag, so the
    /// covariance there is the full sill rather than `sill - nugget`.
    #[inline(always)]
    pub fn covariance<V>(vgram: &V, h: f64) -> f64
    where
        V: IsoVariogramModel,
    {
        if h <= ZERO_LAG {
            return vgram.c_0();
        }
        vgram.covariogram(h)
    }

    /// `(n+1) x (n+1)` matrix over the conditioning points.
    pub fn build_cov_mat<V, M>(cond: &[Point2<f64>], vgram: &V, metric: &M) -> DMatrix<f64>
    where
        V: IsoVariogramModel,
        M: DistanceMetric,
    {
        let n = cond.len();
        let mut cov_mat = DMatrix::zeros(n + 1, n + 1);

        //compute lower triangle and mirror
        for (i, p1) in cond.iter().enumerate() {
            for (j, p2) in cond.iter().enumerate().take(i + 1) {
                let cov = Self::covariance(vgram, metric.distance(p1, p2));
                cov_mat[(i, j)] = cov;
                cov_mat[(j, i)] = cov;
            }
            cov_mat[(i, n)] = 1.0;
            cov_mat[(n, i)] = 1.0;
        }

        cov_mat
    }

    /// Fill `cov_vec` (length `n+1`) with the point-to-query covariances and the constraint entry.
    pub fn build_cov_vec<V, M>(
        cov_vec: &mut DVector<f64>,
        cond: &[Point2<f64>],
        kriging_point: &Point2<f64>,
        vgram: &V,
        metric: &M,
    ) where
        V: IsoVariogramModel,
        M: DistanceMetric,
    {
        let n = cond.len();
        if cov_vec.len() != n + 1 {
            *cov_vec = DVector::zeros(n + 1);
        }

        for (i, p) in cond.iter().enumerate() {
            cov_vec[i] = Self::covariance(vgram, metric.distance(p, kriging_point));
        }
        cov_vec[n] = 1.0;
    }

    pub fn build_system<V, M>(
        cond: &[Point2<f64>],
        kriging_point: &Point2<f64>,
        vgram: &V,
        metric: &M,
    ) -> KrigingSystem
    where
        V: IsoVariogramModel,
        M: DistanceMetric,
    {
        let matrix = Self::build_cov_mat(cond, vgram, metric);
        let mut rhs = DVector::zeros(cond.len() + 1);
        Self::build_cov_vec(&mut rhs, cond, kriging_point, vgram, metric);
        KrigingSystem { matrix, rhs }
    }
}
