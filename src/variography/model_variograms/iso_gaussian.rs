use super::IsoVariogramModel;

/// Gaussian model scaled so that `range` is the effective range,
/// where the curve reaches ~95% of the partial sill.
#[derive(Debug, Clone, Default, Copy, PartialEq)]
pub struct IsoGaussian {
    pub nugget: f64,
    pub sill: f64,
    pub range: f64,
}

impl IsoGaussian {
    pub fn new(nugget: f64, sill: f64, range: f64) -> Self {
        Self {
            nugget,
            sill,
            range,
        }
    }
}

impl IsoVariogramModel for IsoGaussian {
    fn c_0(&self) -> f64 {
        self.sill
    }

    fn nugget(&self) -> f64 {
        self.nugget
    }

    fn variogram(&self, h: f64) -> f64 {
        let u = h / self.range;
        self.nugget + (self.sill - self.nugget) * (1.0 - (-3f64 * u * u).exp())
    }

    fn gradient(&self, h: f64) -> [f64; 3] {
        let psill = self.sill - self.nugget;
        let u = h / self.range;
        let decay = (-3f64 * u * u).exp();

        [1.0, 1.0 - decay, -psill * 6f64 * u * u * decay / self.range]
    }
}
