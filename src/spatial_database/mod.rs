use nalgebra::Point2;
use serde::{Deserialize, Serialize};

pub mod feature_table;

pub use feature_table::FeatureTable;

/// One observed measurement at a planar location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    pub x: f64,
    pub y: f64,
    pub value: f64,
}

impl SamplePoint {
    pub fn new(x: f64, y: f64, value: f64) -> Self {
        Self { x, y, value }
    }

    #[inline(always)]
    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }

    /// A sample takes part in fitting and kriging only if every field is finite.
    pub fn is_usable(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.value.is_finite()
    }
}

/// Ordered samples of a single measured feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub points: Vec<SamplePoint>,
}

impl Dataset {
    pub fn new(name: impl Into<String>, points: Vec<SamplePoint>) -> Self {
        Self {
            name: name.into(),
            points,
        }
    }

    /// Build a dataset from parallel coordinate and value slices.
    /// Extra entries in the longer slice are ignored.
    pub fn from_parts(name: impl Into<String>, coords: &[Point2<f64>], values: &[f64]) -> Self {
        let points = coords
            .iter()
            .zip(values)
            .map(|(p, v)| SamplePoint::new(p.x, p.y, *v))
            .collect();
        Self::new(name, points)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn usable_points(&self) -> impl Iterator<Item = &SamplePoint> + Clone {
        self.points.iter().filter(|p| p.is_usable())
    }

    /// Positions and values of the usable samples, in dataset order.
    pub fn usable_parts(&self) -> (Vec<Point2<f64>>, Vec<f64>) {
        self.usable_points().map(|p| (p.position(), p.value)).unzip()
    }
}
