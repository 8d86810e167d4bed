use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::error::{KrigingError, Result};

/// Valid region for query coordinates.
///
/// The geographic default reads `x` as latitude and `y` as longitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateBounds {
    pub x: (f64, f64),
    pub y: (f64, f64),
}

impl CoordinateBounds {
    pub fn new(x: (f64, f64), y: (f64, f64)) -> Self {
        Self { x, y }
    }

    /// Latitude in [-90, 90], longitude in [-180, 180].
    pub fn geographic() -> Self {
        Self::new((-90.0, 90.0), (-180.0, 180.0))
    }

    /// Accept any finite coordinate.
    pub fn unbounded() -> Self {
        Self::new((f64::NEG_INFINITY, f64::INFINITY), (f64::NEG_INFINITY, f64::INFINITY))
    }

    pub fn check(&self, point: &Point2<f64>) -> Result<()> {
        if !point.x.is_finite() || !point.y.is_finite() {
            return Err(KrigingError::InvalidInput(format!(
                "query coordinate ({}, {}) is not finite",
                point.x, point.y
            )));
        }
        if point.x < self.x.0 || point.x > self.x.1 {
            return Err(KrigingError::InvalidInput(format!(
                "x coordinate {} must lie between {} and {}",
                point.x, self.x.0, self.x.1
            )));
        }
        if point.y < self.y.0 || point.y > self.y.1 {
            return Err(KrigingError::InvalidInput(format!(
                "y coordinate {} must lie between {} and {}",
                point.y, self.y.0, self.y.1
            )));
        }
        Ok(())
    }
}

impl Default for CoordinateBounds {
    fn default() -> Self {
        Self::geographic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geographic_bounds() {
        let bounds = CoordinateBounds::geographic();

        assert!(bounds.check(&Point2::new(-6.9, 107.6)).is_ok());
        assert!(bounds.check(&Point2::new(90.0, -180.0)).is_ok());
        assert!(matches!(
            bounds.check(&Point2::new(91.0, 0.0)),
            Err(KrigingError::InvalidInput(_))
        ));
        assert!(matches!(
            bounds.check(&Point2::new(0.0, 180.5)),
            Err(KrigingError::InvalidInput(_))
        ));
    }

    #[test]
    fn unbounded_rejects_only_non_finite() {
        let bounds = CoordinateBounds::unbounded();

        assert!(bounds.check(&Point2::new(1.0e6, -3.0e5)).is_ok());
        assert!(bounds.check(&Point2::new(f64::NAN, 0.0)).is_err());
        assert!(bounds.check(&Point2::new(0.0, f64::INFINITY)).is_err());
    }
}
