use serde::{Deserialize, Serialize};

pub mod cpu_calculator;

pub use cpu_calculator::CPUCalculator;

/// One populated bin of the empirical semivariogram.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExperimentalLag {
    /// Mean separation of the pairs in the bin.
    pub lag: f64,
    pub semivariance: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentalVariogram {
    pub lags: Vec<ExperimentalLag>,
}

impl ExperimentalVariogram {
    pub fn len(&self) -> usize {
        self.lags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lags.is_empty()
    }

    pub fn distances(&self) -> Vec<f64> {
        self.lags.iter().map(|l| l.lag).collect()
    }

    pub fn semivariances(&self) -> Vec<f64> {
        self.lags.iter().map(|l| l.semivariance).collect()
    }

    pub fn counts(&self) -> Vec<usize> {
        self.lags.iter().map(|l| l.count).collect()
    }
}
