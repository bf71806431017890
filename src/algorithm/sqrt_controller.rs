//! Proportional controller with piecewise square-root sections that bound the second
//! derivative of the controlled quantity.
//!
//! Small errors are corrected linearly with `kp`, large errors with `sqrt(2 * D * error)`
//! so the approach happens with constant deceleration `D` (`derivative_max`).

#[cfg(not(any(test, feature = "std")))]
#[allow(unused_imports)]
use micromath::F32Ext;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Mode {
    /// Corrects the error previously stored in the controller
    Normal,
    /// Computes the error from target and measurement and bounds it so that the output
    /// stays within the range given at construction
    PositionToVelocityZ,
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct SqrtController {
    pub kp: f32,
    pub error: f32,
    pub derivative_max: f32,
    error_min: f32,
    error_max: f32,
}

/// Error required for the controller to produce `output`
fn inverse(output: f32, kp: f32, derivative_max: f32) -> f32 {
    if derivative_max > 0.0 && kp == 0.0 {
        return output * output / (2.0 * derivative_max);
    }
    if derivative_max <= 0.0 {
        return if kp != 0.0 { output / kp } else { 0.0 };
    }
    let linear_velocity = derivative_max / kp;
    if output.abs() < linear_velocity {
        return output / kp;
    }
    let linear_dist = derivative_max / (kp * kp);
    let stopping_dist = linear_dist * 0.5 + output * output / (2.0 * derivative_max);
    if output > 0.0 {
        stopping_dist
    } else {
        -stopping_dist
    }
}

impl SqrtController {
    pub fn new(kp: f32, output_min: f32, output_max: f32, derivative_max: f32) -> Self {
        let mut controller = Self { kp, derivative_max, ..Default::default() };
        if output_min < 0.0 {
            controller.error_min = inverse(output_min, kp, derivative_max);
        }
        if output_max > 0.0 {
            controller.error_max = inverse(output_max, kp, derivative_max);
        }
        controller
    }

    pub fn error_limits(&self) -> (f32, f32) {
        (self.error_min, self.error_max)
    }

    fn correction(&self, dt: f32) -> f32 {
        let (kp, d_max, error) = (self.kp, self.derivative_max, self.error);
        let correction = if d_max <= 0.0 {
            error * kp
        } else if kp == 0.0 {
            if error > 0.0 {
                (2.0 * d_max * error).sqrt()
            } else if error < 0.0 {
                -(2.0 * d_max * -error).sqrt()
            } else {
                0.0
            }
        } else {
            let linear_dist = d_max / (kp * kp);
            if error > linear_dist {
                (2.0 * d_max * (error - linear_dist / 2.0)).sqrt()
            } else if error < -linear_dist {
                -(2.0 * d_max * (-error - linear_dist / 2.0)).sqrt()
            } else {
                error * kp
            }
        };
        if dt > 0.0 {
            // never overshoot the error within a single step
            let limit = error.abs() / dt;
            return correction.clamp(-limit, limit);
        }
        correction
    }

    pub fn apply(&mut self, target: f32, measurement: f32, mode: Mode, dt: f32) -> f32 {
        if mode == Mode::PositionToVelocityZ {
            self.error = target - measurement;
            if self.error_min < 0.0 && self.error < self.error_min {
                self.error = self.error_min;
            } else if self.error_max > 0.0 && self.error > self.error_max {
                self.error = self.error_max;
            }
        }
        self.correction(dt)
    }
}

mod test {
    #[test]
    fn test_linear_region() {
        use super::{Mode, SqrtController};

        let mut controller = SqrtController::new(2.0, -100.0, 100.0, 400.0);
        // linear distance is 400 / 4 = 100
        let output = controller.apply(10.0, 0.0, Mode::PositionToVelocityZ, 0.0);
        assert_eq!(output, 20.0);
    }

    #[test]
    fn test_sqrt_region() {
        use super::{Mode, SqrtController};

        let mut controller =
            SqrtController { kp: 1.0, error: 300.0, derivative_max: 100.0, ..Default::default() };
        // linear distance 100, sqrt(2 * 100 * (300 - 50)) = sqrt(50000)
        let output = controller.apply(0.0, 0.0, Mode::Normal, 0.0);
        assert!((output - 223.6068).abs() < 1e-3);
        controller.error = -300.0;
        let output = controller.apply(0.0, 0.0, Mode::Normal, 0.0);
        assert!((output + 223.6068).abs() < 1e-3);
    }

    #[test]
    fn test_no_overshoot_within_step() {
        use super::{Mode, SqrtController};

        let mut controller = SqrtController { kp: 10.0, error: 1.0, ..Default::default() };
        let output = controller.apply(0.0, 0.0, Mode::Normal, 0.5);
        assert_eq!(output, 2.0);
    }

    #[test]
    fn test_error_bounded_by_output_range() {
        use super::{Mode, SqrtController};

        let mut controller = SqrtController::new(1.0, -200.0, 300.0, 250.0);
        let (error_min, error_max) = controller.error_limits();
        assert!(error_min < 0.0 && error_max > 0.0);
        let up = controller.apply(10_000.0, 0.0, Mode::PositionToVelocityZ, 0.0);
        assert!((up - 300.0).abs() < 1e-2);
        let down = controller.apply(-10_000.0, 0.0, Mode::PositionToVelocityZ, 0.0);
        assert!((down + 200.0).abs() < 1e-2);
    }

    #[test]
    fn test_zero_kp_pure_sqrt() {
        use super::{Mode, SqrtController};

        let mut controller =
            SqrtController { kp: 0.0, error: 8.0, derivative_max: 4.0, ..Default::default() };
        assert_eq!(controller.apply(0.0, 0.0, Mode::Normal, 0.0), 8.0);
        controller.error = 0.0;
        assert_eq!(controller.apply(0.0, 0.0, Mode::Normal, 0.0), 0.0);
    }
}
