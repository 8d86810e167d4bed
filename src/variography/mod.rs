use crate::error::Result;
use crate::geometry::{DistanceMetric, Euclidean};
use crate::spatial_database::Dataset;

pub mod experimental;
pub mod model_variograms;

use experimental::{CPUCalculator, ExperimentalVariogram};
use model_variograms::iso_fitter::{FitConfig, IsoVariogramFitter};
use model_variograms::{ModelKind, VariogramParameters};

/// Empirical semivariogram together with the model fitted to it.
#[derive(Debug, Clone, PartialEq)]
pub struct VariogramFit {
    pub params: VariogramParameters,
    pub experimental: ExperimentalVariogram,
    pub cost: f64,
}

/// Fit `model_kind` to `dataset` over `lag_bin_count` bins with default options.
pub fn fit(dataset: &Dataset, model_kind: ModelKind, lag_bin_count: usize) -> Result<VariogramParameters> {
    let config = FitConfig::new(model_kind).with_lag_bins(lag_bin_count);
    fit_with_config(dataset, &config, &Euclidean).map(|f| f.params)
}

pub fn fit_with_config<M>(dataset: &Dataset, config: &FitConfig, metric: &M) -> Result<VariogramFit>
where
    M: DistanceMetric,
{
    config.validate()?;
    let experimental = CPUCalculator::new(dataset, metric).calculate(config.lag_bins)?;
    let fitter = IsoVariogramFitter::from_experimental(&experimental, config.model, config.weighting);
    let fitted = fitter.fit(config)?;

    Ok(VariogramFit {
        params: fitted.params,
        experimental,
        cost: fitted.cost,
    })
}
