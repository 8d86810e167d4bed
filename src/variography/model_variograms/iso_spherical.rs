use super::IsoVariogramModel;

#[derive(Debug, Clone, Default, Copy, PartialEq)]
pub struct IsoSpherical {
    pub nugget: f64,
    pub sill: f64,
    pub range: f64,
}

impl IsoSpherical {
    pub fn new(nugget: f64, sill: f64, range: f64) -> Self {
        Self {
            nugget,
            sill,
            range,
        }
    }

    #[inline(always)]
    fn shape(&self, h: f64) -> f64 {
        if h < self.range {
            let u = h / self.range;
            return 1.5 * u - 0.5 * u * u * u;
        }
        1.0
    }
}

impl IsoVariogramModel for IsoSpherical {
    fn c_0(&self) -> f64 {
        self.sill
    }

    fn nugget(&self) -> f64 {
        self.nugget
    }

    fn variogram(&self, h: f64) -> f64 {
        self.nugget + (self.sill - self.nugget) * self.shape(h)
    }

    fn gradient(&self, h: f64) -> [f64; 3] {
        let psill = self.sill - self.nugget;
        let r = self.range;

        //flat beyond the range, so only the sill terms move
        let dr = if h < r {
            -psill * 1.5 * (h / (r * r) - h * h * h / (r * r * r * r))
        } else {
            0.0
        };

        [1.0, self.shape(h), dr]
    }
}
