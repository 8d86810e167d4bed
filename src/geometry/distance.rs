use nalgebra::Point2;

/// Separation between two sample locations.
///
/// Every lag the variography and kriging systems see goes through this trait,
/// so a different metric can be swapped in without touching the solver.
pub trait DistanceMetric: Send + Sync {
    fn distance(&self, a: &Point2<f64>, b: &Point2<f64>) -> f64;
}

/// Planar Euclidean distance. Latitude/longitude are treated as cartesian
/// coordinates, which is acceptable over local extents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Euclidean;

impl DistanceMetric for Euclidean {
    #[inline(always)]
    fn distance(&self, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
        nalgebra::distance(a, b)
    }
}
