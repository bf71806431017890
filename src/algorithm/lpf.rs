use core::f32::consts::PI;

/// First order low-pass filter whose cut-off and sample interval may change every sample
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct LPF {
    value: f32,
}

impl LPF {
    pub fn new(value: f32) -> Self {
        Self { value }
    }

    pub fn reset(&mut self, value: f32) {
        self.value = value;
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn filter(&mut self, sample: f32, freq: f32, dt: f32) -> f32 {
        let rc = 1.0 / (2.0 * PI * freq);
        let alpha = dt / (rc + dt);
        self.value += alpha * (sample - self.value);
        self.value
    }
}

mod test {
    #[test]
    fn test_lpf() {
        use super::LPF;

        let mut lpf = LPF::new(3.335);
        let value0 = lpf.filter(3.295, 1.0, 0.1);
        let value1 = lpf.filter(3.295, 1.0, 0.1);
        assert!(3.295 < value1 && value1 < value0);
        let value2 = lpf.filter(3.295, 1.0, 0.1);
        assert!(3.295 < value2 && value2 < value1);
    }

    #[test]
    fn test_lpf_reset() {
        use super::LPF;

        let mut lpf = LPF::default();
        lpf.filter(100.0, 4.0, 0.01);
        assert!(lpf.value() > 0.0);
        lpf.reset(0.0);
        assert_eq!(lpf.value(), 0.0);
    }
}
