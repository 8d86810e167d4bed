use nalgebra::{DVector, Point2};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::{KrigingError, NumericalWarning, Result};
use crate::geometry::{DistanceMetric, Euclidean};
use crate::spatial_database::Dataset;
use crate::systems::{LUSystem, OKSystemBuilder, SolvedOKSystem};
use crate::variography::model_variograms::VariogramParameters;

use super::{GridPrediction, PredictionResult};

/// Smallest conditioning set for which the bordered system is solvable.
pub const MIN_KRIGING_SAMPLES: usize = 2;

/// Ordinary kriging over one dataset with a fixed variogram.
///
/// The bordered covariance matrix only depends on the samples and the
/// variogram, so it is factorized once here and every query solves against
/// the same factorization with a fresh right-hand side.
#[derive(Debug, Clone)]
pub struct OrdinaryKriging<M = Euclidean> {
    pub name: String,
    pub coords: Vec<Point2<f64>>,
    pub values: Vec<f64>,
    pub params: VariogramParameters,
    metric: M,
    lu: LUSystem,
}

impl OrdinaryKriging<Euclidean> {
    pub fn new(dataset: &Dataset, params: VariogramParameters) -> Result<Self> {
        Self::with_metric(dataset, params, Euclidean)
    }
}

impl<M> OrdinaryKriging<M>
where
    M: DistanceMetric,
{
    pub fn with_metric(dataset: &Dataset, params: VariogramParameters, metric: M) -> Result<Self> {
        params.validate()?;

        let (coords, values) = dataset.usable_parts();
        if coords.len() < MIN_KRIGING_SAMPLES {
            return Err(KrigingError::InsufficientData {
                reason: "usable sample points",
                required: MIN_KRIGING_SAMPLES,
                found: coords.len(),
            });
        }

        let cov_mat = OKSystemBuilder::build_cov_mat(&coords, &params, &metric);
        let lu = LUSystem::factorize(cov_mat)?;
        debug!(dataset = %dataset.name, n = coords.len(), "factorized kriging system");

        Ok(Self {
            name: dataset.name.clone(),
            coords,
            values,
            params,
            metric,
            lu,
        })
    }

    pub fn n_cond(&self) -> usize {
        self.coords.len()
    }

    /// Kriging weights and Lagrange multiplier for `query`.
    pub fn solve(&self, query: &Point2<f64>) -> Result<SolvedOKSystem> {
        let mut cov_vec = DVector::zeros(self.n_cond() + 1);
        self.solve_with_buffer(query, &mut cov_vec)
    }

    fn solve_with_buffer(&self, query: &Point2<f64>, cov_vec: &mut DVector<f64>) -> Result<SolvedOKSystem> {
        OKSystemBuilder::build_cov_vec(cov_vec, &self.coords, query, &self.params, &self.metric);
        SolvedOKSystem::solve(&self.lu, cov_vec)
    }

    fn predict_with_buffer(&self, query: &Point2<f64>, cov_vec: &mut DVector<f64>) -> Result<PredictionResult> {
        let solved = self.solve_with_buffer(query, cov_vec)?;
        let estimate = solved.estimate(&self.values);
        let raw = solved.variance(self.params.sill, cov_vec);

        let result = PredictionResult::from_raw(estimate, raw);
        if let Some(NumericalWarning::NegativeVarianceClamped { raw }) = result.warning {
            warn!(
                dataset = %self.name,
                x = query.x,
                y = query.y,
                variance = raw,
                "negative kriging variance clamped to zero"
            );
        }
        Ok(result)
    }

    pub fn predict(&self, query: &Point2<f64>) -> Result<PredictionResult> {
        let mut cov_vec = DVector::zeros(self.n_cond() + 1);
        self.predict_with_buffer(query, &mut cov_vec)
    }

    /// Independent predictions for every query, in order.
    pub fn predict_batch(&self, queries: &[Point2<f64>]) -> Vec<Result<PredictionResult>> {
        let n = self.n_cond() + 1;
        queries
            .par_iter()
            .map_with(DVector::zeros(n), |cov_vec, query| self.predict_with_buffer(query, cov_vec))
            .collect()
    }

    /// Predictions on the lattice `xs × ys`, row-major with `y` as the outer axis.
    pub fn predict_grid(&self, xs: &[f64], ys: &[f64]) -> GridPrediction {
        let queries = ys
            .iter()
            .flat_map(|y| xs.iter().map(move |x| Point2::new(*x, *y)))
            .collect::<Vec<_>>();

        GridPrediction {
            xs: xs.to_vec(),
            ys: ys.to_vec(),
            values: self.predict_batch(&queries),
        }
    }
}
