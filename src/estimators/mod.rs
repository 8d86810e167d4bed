use std::collections::{BTreeMap, HashMap};

use nalgebra::Point2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{KrigingError, NumericalWarning, Result};
use crate::geometry::{CoordinateBounds, DistanceMetric, Euclidean};
use crate::spatial_database::Dataset;
use crate::variography::model_variograms::VariogramParameters;

pub mod cross_validation;
pub mod engine;
pub mod ordinary_kriging;

pub use cross_validation::{leave_one_out, CrossValidation};
pub use engine::PredictionEngine;
pub use ordinary_kriging::OrdinaryKriging;

/// Estimate and estimation variance at one query point for one feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub estimate: f64,
    pub variance: f64,
    pub warning: Option<NumericalWarning>,
}

impl PredictionResult {
    /// Negative variances only arise from ill-conditioning; they are clamped
    /// to zero and flagged.
    pub fn from_raw(estimate: f64, variance: f64) -> Self {
        if variance < 0.0 {
            return Self {
                estimate,
                variance: 0.0,
                warning: Some(NumericalWarning::NegativeVarianceClamped { raw: variance }),
            };
        }
        Self {
            estimate,
            variance,
            warning: None,
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance.sqrt()
    }
}

/// Predictions over a lattice, row-major with `y` as the outer axis.
#[derive(Debug, Clone, PartialEq)]
pub struct GridPrediction {
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
    pub values: Vec<Result<PredictionResult>>,
}

impl GridPrediction {
    pub fn get(&self, ix: usize, iy: usize) -> Option<&Result<PredictionResult>> {
        if ix >= self.xs.len() || iy >= self.ys.len() {
            return None;
        }
        self.values.get(iy * self.xs.len() + ix)
    }
}

/// Per-query mapping of feature name to its prediction (or the failure for it).
pub type FeaturePredictions = BTreeMap<String, Result<PredictionResult>>;

/// Trimmed, de-blanked feature names. An empty list is invalid input.
pub(crate) fn validate_features<S: AsRef<str>>(features: &[S]) -> Result<Vec<String>> {
    let names = features
        .iter()
        .map(|f| f.as_ref().trim())
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();

    if names.is_empty() {
        return Err(KrigingError::InvalidInput(
            "feature list must not be empty".to_string(),
        ));
    }
    Ok(names)
}

pub(crate) fn validate_queries(queries: &[Point2<f64>], bounds: &CoordinateBounds) -> Result<()> {
    queries.iter().try_for_each(|q| bounds.check(q))
}

/// Transpose per-feature batches into per-query mappings.
pub(crate) fn assemble(
    n_queries: usize,
    per_feature: Vec<(String, Vec<Result<PredictionResult>>)>,
) -> Vec<FeaturePredictions> {
    let mut out = vec![FeaturePredictions::new(); n_queries];
    for (name, results) in per_feature {
        for (slot, result) in out.iter_mut().zip(results) {
            slot.insert(name.clone(), result);
        }
    }
    out
}

/// Stateless prediction: krige each requested feature with its supplied
/// parameters at every query point.
///
/// Queries are checked against geographic bounds and distances are planar
/// Euclidean; use [`predict_with`] for other bounds or metrics.
pub fn predict<S: AsRef<str>>(
    query_points: &[Point2<f64>],
    datasets: &[Dataset],
    fitted_params: &HashMap<String, VariogramParameters>,
    features: &[S],
) -> Result<Vec<FeaturePredictions>> {
    predict_with(
        query_points,
        datasets,
        fitted_params,
        features,
        &CoordinateBounds::default(),
        &Euclidean,
    )
}

/// Invalid queries or features fail the whole call. Failures tied to a
/// dataset (too few samples, singular system) are reported per entry.
pub fn predict_with<S, M>(
    query_points: &[Point2<f64>],
    datasets: &[Dataset],
    fitted_params: &HashMap<String, VariogramParameters>,
    features: &[S],
    bounds: &CoordinateBounds,
    metric: &M,
) -> Result<Vec<FeaturePredictions>>
where
    S: AsRef<str>,
    M: DistanceMetric + Clone,
{
    let names = validate_features(features)?;
    validate_queries(query_points, bounds)?;

    let lookup = names
        .iter()
        .map(|name| {
            let dataset = datasets.iter().find(|d| &d.name == name).ok_or_else(|| {
                KrigingError::InvalidInput(format!("unknown feature {}", name))
            })?;
            let params = fitted_params.get(name).ok_or_else(|| {
                KrigingError::InvalidInput(format!("no variogram parameters for feature {}", name))
            })?;
            Ok((name.clone(), dataset, *params))
        })
        .collect::<Result<Vec<_>>>()?;

    let per_feature = lookup
        .into_par_iter()
        .map(|(name, dataset, params)| {
            let results = match OrdinaryKriging::with_metric(dataset, params, metric.clone()) {
                Ok(ok) => ok.predict_batch(query_points),
                Err(e) => vec![Err(e); query_points.len()],
            };
            (name, results)
        })
        .collect();

    Ok(assemble(query_points.len(), per_feature))
}
