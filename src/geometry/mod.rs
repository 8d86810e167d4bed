pub mod bounds;
pub mod distance;

pub use bounds::CoordinateBounds;
pub use distance::{DistanceMetric, Euclidean};
