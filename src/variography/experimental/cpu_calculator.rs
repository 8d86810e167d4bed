use itertools::Itertools;
use nalgebra::Point2;
use ordered_float::OrderedFloat;
use rayon::prelude::*;

use crate::error::{KrigingError, Result};
use crate::geometry::DistanceMetric;
use crate::spatial_database::Dataset;

use super::{ExperimentalLag, ExperimentalVariogram};

pub const MIN_FIT_SAMPLES: usize = 3;
pub const MIN_POPULATED_LAGS: usize = 2;

/// Omnidirectional empirical semivariogram over every sample pair.
pub struct CPUCalculator<'a, M> {
    coords: Vec<Point2<f64>>,
    values: Vec<f64>,
    metric: &'a M,
}

impl<'a, M> CPUCalculator<'a, M>
where
    M: DistanceMetric,
{
    pub fn new(dataset: &Dataset, metric: &'a M) -> Self {
        let (coords, values) = dataset.usable_parts();
        Self {
            coords,
            values,
            metric,
        }
    }

    /// `(distance, 0.5 * (v_i - v_j)^2)` for every pair `i < j`, in index order.
    pub fn pairs(&self) -> Vec<(f64, f64)> {
        let n = self.coords.len();
        (0..n)
            .into_par_iter()
            .flat_map_iter(|i| {
                (i + 1..n).map(move |j| {
                    let h = self.metric.distance(&self.coords[i], &self.coords[j]);
                    let dv = self.values[i] - self.values[j];
                    (h, 0.5 * dv * dv)
                })
            })
            .collect()
    }

    /// Bin the pairs into `n_lags` equal intervals between the smallest and
    /// largest separation. Empty bins are dropped.
    pub fn calculate(&self, n_lags: usize) -> Result<ExperimentalVariogram> {
        if n_lags < MIN_POPULATED_LAGS {
            return Err(KrigingError::InvalidInput(format!(
                "lag bin count {} must be at least {}",
                n_lags, MIN_POPULATED_LAGS
            )));
        }
        if self.coords.len() < MIN_FIT_SAMPLES {
            return Err(KrigingError::InsufficientData {
                reason: "usable sample points",
                required: MIN_FIT_SAMPLES,
                found: self.coords.len(),
            });
        }

        let pairs = self.pairs();
        let Some((min, max)) = pairs.iter().map(|(h, _)| OrderedFloat(*h)).minmax().into_option()
        else {
            return Err(KrigingError::InsufficientData {
                reason: "sample pairs",
                required: 1,
                found: 0,
            });
        };
        let (min, max) = (min.0, max.0);

        //separations within rounding of each other share the first bin
        let width = if max - min > f64::EPSILON * max {
            (max - min) / n_lags as f64
        } else {
            0.0
        };

        let mut sum_h = vec![0f64; n_lags];
        let mut sum_g = vec![0f64; n_lags];
        let mut counts = vec![0usize; n_lags];
        for (h, g) in pairs {
            let bin = if width > 0.0 {
                (((h - min) / width) as usize).min(n_lags - 1)
            } else {
                0
            };
            sum_h[bin] += h;
            sum_g[bin] += g;
            counts[bin] += 1;
        }

        let lags = itertools::izip!(sum_h, sum_g, counts)
            .filter(|(_, _, count)| *count > 0)
            .map(|(h, g, count)| ExperimentalLag {
                lag: h / count as f64,
                semivariance: g / count as f64,
                count,
            })
            .collect::<Vec<_>>();

        if lags.len() < MIN_POPULATED_LAGS {
            return Err(KrigingError::InsufficientData {
                reason: "populated lag bins",
                required: MIN_POPULATED_LAGS,
                found: lags.len(),
            });
        }

        Ok(ExperimentalVariogram { lags })
    }
}
