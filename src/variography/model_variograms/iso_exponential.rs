use super::IsoVariogramModel;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IsoExponential {
    pub nugget: f64,
    pub sill: f64,
    pub range: f64,
}

impl IsoExponential {
    pub fn new(nugget: f64, sill: f64, range: f64) -> Self {
        Self {
            nugget,
            sill,
            range,
        }
    }
}

impl IsoVariogramModel for IsoExponential {
    fn c_0(&self) -> f64 {
        self.sill
    }

    fn nugget(&self) -> f64 {
        self.nugget
    }

    fn variogram(&self, h: f64) -> f64 {
        self.nugget + (self.sill - self.nugget) * (1.0 - (-3f64 * h / self.range).exp())
    }

    //derivatives with respect to nugget, partial sill and range
    fn gradient(&self, h: f64) -> [f64; 3] {
        let psill = self.sill - self.nugget;
        let u = h / self.range;
        let decay = (-3f64 * u).exp();

        [1.0, 1.0 - decay, -psill * 3f64 * u * decay / self.range]
    }
}
