use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{KrigingError, Result};

pub mod iso_exponential;
pub mod iso_fitter;
pub mod iso_gaussian;
pub mod iso_spherical;

use iso_exponential::IsoExponential;
use iso_gaussian::IsoGaussian;
use iso_spherical::IsoSpherical;

/// Isotropic semivariogram as a function of lag distance.
pub trait IsoVariogramModel {
    /// Semivariance at which correlation vanishes (the total sill).
    fn c_0(&self) -> f64;
    fn nugget(&self) -> f64;
    /// Semivariance at lag `h`, equal to the nugget at `h = 0`.
    fn variogram(&self, h: f64) -> f64;
    /// Partial derivatives of the variogram with respect to
    /// `[nugget, partial sill, range]`.
    fn gradient(&self, h: f64) -> [f64; 3];

    fn covariogram(&self, h: f64) -> f64 {
        self.c_0() - self.variogram(h)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Spherical,
    Gaussian,
    Exponential,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [ModelKind::Spherical, ModelKind::Gaussian, ModelKind::Exponential];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Spherical => "spherical",
            ModelKind::Gaussian => "gaussian",
            ModelKind::Exponential => "exponential",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = KrigingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spherical" => Ok(ModelKind::Spherical),
            "gaussian" => Ok(ModelKind::Gaussian),
            "exponential" => Ok(ModelKind::Exponential),
            other => Err(KrigingError::InvalidInput(format!(
                "unknown variogram model {}",
                other
            ))),
        }
    }
}

/// Fitted variogram for one dataset. Read-only once fitted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariogramParameters {
    pub model: ModelKind,
    pub nugget: f64,
    pub sill: f64,
    pub range: f64,
}

impl VariogramParameters {
    /// Checked constructor: `nugget >= 0`, `sill > nugget`, `range > 0`.
    pub fn new(model: ModelKind, nugget: f64, sill: f64, range: f64) -> Result<Self> {
        let params = Self {
            model,
            nugget,
            sill,
            range,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.nugget.is_finite() && self.sill.is_finite() && self.range.is_finite()) {
            return Err(KrigingError::InvalidInput(format!(
                "variogram parameters must be finite: {:?}",
                self
            )));
        }
        if self.nugget < 0.0 {
            return Err(KrigingError::InvalidInput(format!(
                "nugget {} must be non-negative",
                self.nugget
            )));
        }
        if self.sill <= self.nugget {
            return Err(KrigingError::InvalidInput(format!(
                "sill {} must exceed nugget {}",
                self.sill, self.nugget
            )));
        }
        if self.range <= 0.0 {
            return Err(KrigingError::InvalidInput(format!(
                "range {} must be positive",
                self.range
            )));
        }
        Ok(())
    }

    pub fn partial_sill(&self) -> f64 {
        self.sill - self.nugget
    }

    #[inline(always)]
    fn dispatch<R>(&self, f: impl FnOnce(&dyn IsoVariogramModel) -> R) -> R {
        match self.model {
            ModelKind::Spherical => f(&IsoSpherical::new(self.nugget, self.sill, self.range)),
            ModelKind::Gaussian => f(&IsoGaussian::new(self.nugget, self.sill, self.range)),
            ModelKind::Exponential => f(&IsoExponential::new(self.nugget, self.sill, self.range)),
        }
    }
}

impl IsoVariogramModel for VariogramParameters {
    fn c_0(&self) -> f64 {
        self.sill
    }

    fn nugget(&self) -> f64 {
        self.nugget
    }

    fn variogram(&self, h: f64) -> f64 {
        self.dispatch(|v| v.variogram(h))
    }

    fn gradient(&self, h: f64) -> [f64; 3] {
        self.dispatch(|v| v.gradient(h))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn nugget_at_zero_and_sill_near_range() {
        for kind in ModelKind::ALL {
            let params = VariogramParameters::new(kind, 0.25, 2.25, 12.0).unwrap();

            assert_eq!(params.variogram(0.0), 0.25);
            // gaussian and exponential reach 1 - e^-3 (~95%) of the partial sill at the range
            assert_relative_eq!(params.variogram(12.0), 2.25, max_relative = 0.05);
            assert_relative_eq!(params.covariogram(0.0), 2.0);
        }
    }

    #[test]
    fn models_are_non_decreasing() {
        for kind in ModelKind::ALL {
            let params = VariogramParameters::new(kind, 0.0, 1.0, 3.0).unwrap();
            let curve = (0..200).map(|i| params.variogram(i as f64 * 0.05)).collect::<Vec<_>>();

            assert!(curve.windows(2).all(|w| w[1] >= w[0]), "{} decreases", kind);
            assert!(curve.iter().all(|g| *g <= params.sill + 1e-12));
        }
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(VariogramParameters::new(ModelKind::Spherical, -0.1, 1.0, 1.0).is_err());
        assert!(VariogramParameters::new(ModelKind::Spherical, 1.0, 1.0, 1.0).is_err());
        assert!(VariogramParameters::new(ModelKind::Gaussian, 0.0, 1.0, 0.0).is_err());
        assert!(VariogramParameters::new(ModelKind::Exponential, 0.0, f64::NAN, 1.0).is_err());
    }

    #[test]
    fn model_kind_parses_case_insensitively() {
        assert_eq!("Spherical".parse::<ModelKind>().unwrap(), ModelKind::Spherical);
        assert_eq!(" gaussian ".parse::<ModelKind>().unwrap(), ModelKind::Gaussian);
        assert!("linear".parse::<ModelKind>().is_err());
    }
}
