use std::time::{Duration, Instant};

use itertools::izip;
use nalgebra::{Matrix3, Vector3};
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{KrigingError, Result};
use crate::variography::experimental::ExperimentalVariogram;

use super::{IsoVariogramModel, ModelKind, VariogramParameters};

/// How residuals of each lag bin count towards the fit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LagWeighting {
    /// Plain sum of squared residuals.
    #[default]
    Uniform,
    /// Squared residuals weighted by the number of pairs in the bin.
    PairCount,
}

/// Variogram fitting options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    pub model: ModelKind,
    pub lag_bins: usize,
    pub weighting: LagWeighting,
    /// Levenberg-Marquardt iterations per start.
    pub max_iterations: usize,
    /// Random starts tried in addition to the moment-based initial guess.
    pub restarts: usize,
    pub seed: u64,
    /// Relative cost improvement below which an iteration counts as converged.
    pub tolerance: f64,
    /// Wall-clock limit for the whole fit. The best parameters found when it
    /// expires are kept.
    pub timeout: Option<Duration>,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            model: ModelKind::Spherical,
            lag_bins: 6,
            weighting: LagWeighting::Uniform,
            max_iterations: 200,
            restarts: 8,
            seed: 0,
            tolerance: 1e-12,
            timeout: Some(Duration::from_secs(5)),
        }
    }
}

impl FitConfig {
    pub fn new(model: ModelKind) -> Self {
        Self {
            model,
            ..Default::default()
        }
    }

    pub fn with_lag_bins(mut self, lag_bins: usize) -> Self {
        self.lag_bins = lag_bins;
        self
    }

    pub fn with_weighting(mut self, weighting: LagWeighting) -> Self {
        self.weighting = weighting;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_restarts(mut self, restarts: usize) -> Self {
        self.restarts = restarts;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(KrigingError::InvalidInput(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(KrigingError::InvalidInput(format!(
                "tolerance {} must be positive",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Outcome of a single fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedModel {
    pub params: VariogramParameters,
    /// Weighted sum of squared residuals at `params`.
    pub cost: f64,
    pub timed_out: bool,
}

/// Box-constrained least-squares fit of `[nugget, partial sill, range]`
/// to an empirical semivariogram.
pub struct IsoVariogramFitter {
    pub model: ModelKind,
    pub lags: Vec<f64>,
    pub exp_var: Vec<f64>,
    pub weights: Vec<f64>,
    pub lower: [f64; 3],
    pub upper: [f64; 3],
}

impl IsoVariogramFitter {
    pub fn new(lags: Vec<f64>, exp_var: Vec<f64>, weights: Vec<f64>, model: ModelKind) -> Self {
        let max_var = exp_var.iter().copied().map(OrderedFloat).max().map_or(0.0, |v| v.0);
        let max_lag = lags.iter().copied().map(OrderedFloat).max().map_or(0.0, |v| v.0);

        let var_scale = if max_var > 0.0 { max_var } else { 1.0 };
        let psill_floor = var_scale * 1e-9;
        let range_floor = if max_lag > 0.0 { max_lag * 1e-6 } else { f64::MIN_POSITIVE };

        Self {
            model,
            lags,
            exp_var,
            weights,
            lower: [0.0, psill_floor, range_floor],
            upper: [
                max_var.max(0.0),
                (10.0 * max_var).max(10.0 * psill_floor),
                max_lag.max(range_floor),
            ],
        }
    }

    pub fn from_experimental(
        vgram: &ExperimentalVariogram,
        model: ModelKind,
        weighting: LagWeighting,
    ) -> Self {
        let weights = match weighting {
            LagWeighting::Uniform => vec![1.0; vgram.len()],
            LagWeighting::PairCount => vgram.counts().iter().map(|c| (*c as f64).sqrt()).collect(),
        };
        Self::new(vgram.distances(), vgram.semivariances(), weights, model)
    }

    pub fn params_from_slice(&self, theta: &[f64; 3]) -> VariogramParameters {
        VariogramParameters {
            model: self.model,
            nugget: theta[0],
            sill: theta[0] + theta[1],
            range: theta[2],
        }
    }

    /// `nugget = min γ`, `sill = max γ`, `range = max h / 2`, clamped into bounds.
    pub fn initial_guess(&self) -> [f64; 3] {
        let min_var = self.exp_var.iter().copied().map(OrderedFloat).min().map_or(0.0, |v| v.0);
        let max_var = self.upper[0];
        self.project([min_var, max_var - min_var, self.upper[2] / 2.0])
    }

    #[inline(always)]
    fn project(&self, theta: [f64; 3]) -> [f64; 3] {
        let mut out = theta;
        for (v, lo, hi) in izip!(out.iter_mut(), self.lower, self.upper) {
            *v = v.clamp(lo, hi);
        }
        out
    }

    pub fn cost(&self, theta: &[f64; 3]) -> f64 {
        let params = self.params_from_slice(theta);
        izip!(&self.lags, &self.exp_var, &self.weights)
            .map(|(h, g, w)| {
                let r = w * (params.variogram(*h) - g);
                r * r
            })
            .sum()
    }

    /// `J^T J` and `J^T r` of the weighted residuals.
    fn normal_equations(&self, theta: &[f64; 3]) -> (Matrix3<f64>, Vector3<f64>) {
        let params = self.params_from_slice(theta);
        let mut jtj = Matrix3::zeros();
        let mut jtr = Vector3::zeros();

        for (h, g, w) in izip!(&self.lags, &self.exp_var, &self.weights) {
            let r = w * (params.variogram(*h) - g);
            let j = Vector3::from(params.gradient(*h)) * *w;
            jtj += j * j.transpose();
            jtr += j * r;
        }

        (jtj, jtr)
    }

    /// Projected Levenberg-Marquardt from `start`.
    fn levenberg_marquardt(
        &self,
        start: [f64; 3],
        max_iterations: usize,
        tolerance: f64,
        deadline: Option<Instant>,
    ) -> ([f64; 3], f64, bool) {
        let mut theta = self.project(start);
        let mut cost = self.cost(&theta);
        let mut lambda = 1e-3;
        let mut timed_out = false;

        for _ in 0..max_iterations {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                timed_out = true;
                break;
            }
            if cost == 0.0 {
                break;
            }

            let (jtj, jtr) = self.normal_equations(&theta);
            let diag_floor = 1e-12 * jtj.diagonal().max().max(f64::MIN_POSITIVE);

            let mut damped = jtj;
            for i in 0..3 {
                damped[(i, i)] += lambda * jtj[(i, i)].max(diag_floor);
            }

            let Some(chol) = damped.cholesky() else {
                lambda *= 10.0;
                if lambda > 1e12 {
                    break;
                }
                continue;
            };
            let step = chol.solve(&(-jtr));

            let candidate = self.project([theta[0] + step[0], theta[1] + step[1], theta[2] + step[2]]);
            let candidate_cost = self.cost(&candidate);

            if candidate_cost.is_finite() && candidate_cost < cost {
                let improvement = cost - candidate_cost;
                theta = candidate;
                cost = candidate_cost;
                lambda = (lambda / 10.0).max(1e-12);
                if improvement <= tolerance * cost {
                    break;
                }
            } else {
                lambda *= 10.0;
                if lambda > 1e12 {
                    break;
                }
            }
        }

        (theta, cost, timed_out)
    }

    pub fn fit(&self, config: &FitConfig) -> Result<FittedModel> {
        config.validate()?;
        // a timeout too large to represent as an instant is no deadline at all
        let deadline = config.timeout.and_then(|t| Instant::now().checked_add(t));

        //moment-based guess first, then seeded random starts inside the bounds
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut starts = vec![self.initial_guess()];
        for _ in 0..config.restarts {
            let mut start = [0f64; 3];
            for (v, lo, hi) in izip!(start.iter_mut(), self.lower, self.upper) {
                *v = if hi > lo { rng.gen_range(lo..=hi) } else { lo };
            }
            starts.push(start);
        }

        let runs = starts
            .into_par_iter()
            .map(|start| {
                self.levenberg_marquardt(start, config.max_iterations, config.tolerance, deadline)
            })
            .collect::<Vec<_>>();

        let timed_out = runs.iter().any(|(_, _, t)| *t);
        let Some((theta, cost, _)) = runs
            .into_iter()
            .filter(|(_, cost, _)| cost.is_finite())
            .min_by_key(|(_, cost, _)| OrderedFloat(*cost))
        else {
            return Err(KrigingError::InvalidInput(
                "empirical semivariogram produced no finite fit".to_string(),
            ));
        };

        if timed_out {
            warn!(
                model = %self.model,
                "variogram fit hit its timeout, keeping best parameters found"
            );
        }

        let params = self.params_from_slice(&theta);
        debug!(
            model = %params.model,
            nugget = params.nugget,
            sill = params.sill,
            range = params.range,
            cost,
            "fitted variogram"
        );

        Ok(FittedModel {
            params,
            cost,
            timed_out,
        })
    }
}
