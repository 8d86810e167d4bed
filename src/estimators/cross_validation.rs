use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{KrigingError, Result};
use crate::geometry::DistanceMetric;
use crate::spatial_database::Dataset;
use crate::systems::{LUSystem, OKSystemBuilder, SolvedOKSystem};
use crate::variography::model_variograms::VariogramParameters;

use super::PredictionResult;

/// Fewest samples that still leave a solvable system after removing one.
pub const MIN_CROSS_VALIDATION_SAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationEntry {
    /// Position among the usable samples of the dataset.
    pub index: usize,
    pub observed: f64,
    pub estimate: f64,
    pub variance: f64,
}

impl CrossValidationEntry {
    pub fn residual(&self) -> f64 {
        self.observed - self.estimate
    }

    /// Residual over kriging standard deviation, if the variance is positive.
    pub fn standardized(&self) -> Option<f64> {
        (self.variance > 0.0).then(|| self.residual() / self.variance.sqrt())
    }
}

/// Leave-one-out validation statistics.
///
/// `q1` should be near 0 and `q2` near 1 for a well specified model; `c_r`
/// is the Kitanidis criterion, smaller is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidation {
    pub entries: Vec<CrossValidationEntry>,
    pub q1: Option<f64>,
    pub q2: Option<f64>,
    pub c_r: Option<f64>,
    pub rmse: f64,
    /// Samples whose reduced system could not be solved.
    pub failed: usize,
}

impl CrossValidation {
    fn from_entries(entries: Vec<CrossValidationEntry>, failed: usize) -> Self {
        let n = entries.len() as f64;
        let rmse = (entries.iter().map(|e| e.residual().powi(2)).sum::<f64>() / n).sqrt();

        let standardized = entries
            .iter()
            .filter_map(|e| e.standardized().map(|s| (s, e.variance)))
            .collect::<Vec<_>>();

        let (q1, q2, c_r) = if standardized.is_empty() {
            (None, None, None)
        } else {
            let m = standardized.len() as f64;
            let q1 = standardized.iter().map(|(s, _)| s).sum::<f64>() / m;
            let q2 = standardized.iter().map(|(s, _)| s * s).sum::<f64>() / m;
            let mean_log_var = standardized.iter().map(|(_, v)| v.ln()).sum::<f64>() / m;
            (Some(q1), Some(q2), Some(q2 * mean_log_var.exp()))
        };

        Self {
            entries,
            q1,
            q2,
            c_r,
            rmse,
            failed,
        }
    }
}

/// Krige every usable sample from all the others with fixed `params`.
pub fn leave_one_out<M>(dataset: &Dataset, params: VariogramParameters, metric: &M) -> Result<CrossValidation>
where
    M: DistanceMetric,
{
    params.validate()?;
    let (coords, values) = dataset.usable_parts();
    let n = coords.len();
    if n < MIN_CROSS_VALIDATION_SAMPLES {
        return Err(KrigingError::InsufficientData {
            reason: "usable sample points for cross-validation",
            required: MIN_CROSS_VALIDATION_SAMPLES,
            found: n,
        });
    }

    let outcomes = (0..n)
        .into_par_iter()
        .map(|i| {
            let (rest_coords, rest_values): (Vec<_>, Vec<_>) = coords
                .iter()
                .zip(values.iter())
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, (p, v))| (*p, *v))
                .unzip();

            let system = OKSystemBuilder::build_system(&rest_coords, &coords[i], &params, metric);
            let lu = LUSystem::factorize(system.matrix)?;
            let solved = SolvedOKSystem::solve(&lu, &system.rhs)?;
            let result = PredictionResult::from_raw(
                solved.estimate(&rest_values),
                solved.variance(params.sill, &system.rhs),
            );
            Ok(CrossValidationEntry {
                index: i,
                observed: values[i],
                estimate: result.estimate,
                variance: result.variance,
            })
        })
        .collect::<Vec<Result<_>>>();

    let failed = outcomes.iter().filter(|o| o.is_err()).count();
    let entries = outcomes.into_iter().filter_map(Result::ok).collect::<Vec<_>>();
    if entries.is_empty() {
        return Err(KrigingError::SingularSystem { dimension: n });
    }
    debug!(dataset = %dataset.name, n, failed, "leave-one-out cross-validation");

    Ok(CrossValidation::from_entries(entries, failed))
}
