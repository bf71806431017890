use crate::{
    algorithm::{constrain, lpf::LPF},
    config::PID,
};

/// Integrator treatment after the back-calculation step
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Integrator {
    Free,
    /// Integrator kept within the output range
    Limited,
}

/// PID controller of the navigation cascades.
///
/// The D-term follows the measurement rather than the error, so setpoint steps do not kick.
/// Output saturation is fed back into the integrator through the tracking gain `kt`.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct NavPid {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub kff: f32,
    pub kt: f32,
    pub error_lpf_hz: f32,
    pub dterm_lpf_hz: f32,

    pub error: f32,
    pub integrator: f32,
    /// Output after saturation of the last cycle
    pub output_constrained: f32,
    last_input: f32,
    reset: bool,
    error_filter: LPF,
    dterm_filter: LPF,
}

impl NavPid {
    pub fn new(config: &PID, error_lpf_hz: f32, dterm_lpf_hz: f32) -> Self {
        let (kp, ki, kd, kff) = config.gains();
        let kt = if ki > 1e-6 && kp > 1e-6 { 2.0 / (kp / ki + kd / kp) } else { 0.0 };
        Self { kp, ki, kd, kff, kt, error_lpf_hz, dterm_lpf_hz, reset: true, ..Default::default() }
    }

    pub fn reset(&mut self) {
        self.error = 0.0;
        self.integrator = 0.0;
        self.output_constrained = 0.0;
        self.last_input = 0.0;
        self.reset = true;
        self.error_filter.reset(0.0);
        self.dterm_filter.reset(0.0);
    }

    /// Clears error and D-term filter memory
    pub fn reset_filters(&mut self) {
        self.error_filter.reset(0.0);
        self.dterm_filter.reset(0.0);
    }

    /// Moves the integrator towards `target` with time constant `tc` seconds
    pub fn relax_integrator(&mut self, target: f32, dt: f32, tc: f32) {
        if dt + tc <= 0.0 {
            return;
        }
        self.integrator += (target - self.integrator) * dt / (dt + tc);
    }

    pub fn apply(
        &mut self,
        setpoint: f32,
        measurement: f32,
        dt: f32,
        min: f32,
        max: f32,
        integrator: Integrator,
    ) -> f32 {
        self.apply_scaled(setpoint, measurement, dt, min, max, integrator, 1.0)
    }

    /// Same as [`NavPid::apply`] with the D-term multiplied by `dterm_scale`
    #[allow(clippy::too_many_arguments)]
    pub fn apply_scaled(
        &mut self,
        setpoint: f32,
        measurement: f32,
        dt: f32,
        min: f32,
        max: f32,
        integrator: Integrator,
        dterm_scale: f32,
    ) -> f32 {
        let mut error = setpoint - measurement;
        if self.error_lpf_hz > 0.0 {
            error = self.error_filter.filter(error, self.error_lpf_hz, dt);
        }
        self.error = error;

        let proportional = error * self.kp;

        if self.reset {
            self.last_input = measurement;
            self.reset = false;
        }
        let mut derivative = if dt > 0.0 { -(measurement - self.last_input) / dt } else { 0.0 };
        self.last_input = measurement;
        if self.dterm_lpf_hz > 0.0 {
            derivative = self.dterm_filter.filter(derivative, self.dterm_lpf_hz, dt);
        }
        let derivative = derivative * self.kd * dterm_scale;

        let feed_forward = setpoint * self.kff;

        let output = proportional + self.integrator + derivative + feed_forward;
        let constrained = constrain(output, min, max);
        let mut back_calculation = constrained - output;
        // may only shrink the integrator
        if (back_calculation >= 0.0) == (self.integrator >= 0.0) {
            back_calculation = 0.0;
        }
        self.output_constrained = constrained;

        self.integrator += error * self.ki * dt + back_calculation * self.kt * dt;
        if integrator == Integrator::Limited {
            self.integrator = constrain(self.integrator, min, max);
        }
        constrained
    }
}

mod test {
    #[test]
    fn test_proportional_and_feed_forward() {
        use super::{Integrator, NavPid};
        use crate::config::PID;

        let config = PID {
            kp: fixed_point::fixed!(2.0),
            ki: fixed_point::fixed!(0.0),
            kd: fixed_point::fixed!(0.0),
            kff: fixed_point::fixed!(0.5),
        };
        let mut pid = NavPid::new(&config, 0.0, 0.0);
        let output = pid.apply(10.0, 4.0, 0.01, -100.0, 100.0, Integrator::Free);
        assert_eq!(output, 2.0 * 6.0 + 0.5 * 10.0);
        assert_eq!(pid.output_constrained, output);
        assert_eq!(pid.kt, 0.0);
    }

    #[test]
    fn test_back_calculation_limits_windup() {
        use super::{Integrator, NavPid};
        use crate::config::PID;

        let zero: fixed_point::FixedPoint<u16, 2> = fixed_point::fixed!(0.0);
        let one: fixed_point::FixedPoint<u16, 2> = fixed_point::fixed!(1.0);
        let config = PID { kp: one, ki: one, kd: zero, kff: zero };
        let mut pid = NavPid::new(&config, 0.0, 0.0);
        for _ in 0..1000 {
            pid.apply(100.0, 0.0, 0.01, -10.0, 10.0, Integrator::Free);
        }
        assert_eq!(pid.output_constrained, 10.0);
        assert!(pid.integrator.abs() < 2.0);
        // leaves saturation as soon as the error vanishes
        let output = pid.apply(0.0, 0.0, 0.01, -10.0, 10.0, Integrator::Free);
        assert!(output.abs() < 2.0);
    }

    #[test]
    fn test_limited_integrator() {
        use super::{Integrator, NavPid};
        use crate::config::PID;

        let zero: fixed_point::FixedPoint<u16, 2> = fixed_point::fixed!(0.0);
        let config = PID { kp: zero, ki: fixed_point::fixed!(1.0), kd: zero, kff: zero };
        let mut free = NavPid::new(&config, 0.0, 0.0);
        let mut limited = NavPid::new(&config, 0.0, 0.0);
        for _ in 0..1000 {
            free.apply(100.0, 0.0, 0.01, -10.0, 10.0, Integrator::Free);
            limited.apply(100.0, 0.0, 0.01, -10.0, 10.0, Integrator::Limited);
        }
        assert_eq!(limited.integrator, 10.0);
        assert!(free.integrator > 900.0);
    }

    #[test]
    fn test_derivative_on_measurement() {
        use super::{Integrator, NavPid};
        use crate::config::PID;

        let zero: fixed_point::FixedPoint<u16, 2> = fixed_point::fixed!(0.0);
        let config = PID { kp: zero, ki: zero, kd: fixed_point::fixed!(1.0), kff: zero };
        let mut pid = NavPid::new(&config, 0.0, 0.0);
        // first sample seeds the history
        assert_eq!(pid.apply(0.0, 5.0, 0.1, -100.0, 100.0, Integrator::Free), 0.0);
        let output = pid.apply(50.0, 6.0, 0.1, -100.0, 100.0, Integrator::Free);
        assert!((output + 10.0).abs() < 1e-4);
        let output = pid.apply_scaled(50.0, 7.0, 0.1, -100.0, 100.0, Integrator::Free, 0.5);
        assert!((output + 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_reset() {
        use super::{Integrator, NavPid};
        use crate::config::PID;

        let config = PID {
            kp: fixed_point::fixed!(1.0),
            ki: fixed_point::fixed!(1.0),
            kd: fixed_point::fixed!(1.0),
            kff: fixed_point::fixed!(0.0),
        };
        let mut pid = NavPid::new(&config, 20.0, 5.0);
        let pristine = pid;
        pid.apply(10.0, 3.0, 0.01, -100.0, 100.0, Integrator::Free);
        pid.reset();
        assert_eq!(pid, pristine);
    }

    #[test]
    fn test_relax_integrator() {
        use super::NavPid;

        let mut pid = NavPid { integrator: 100.0, ..Default::default() };
        pid.relax_integrator(0.0, 0.16, 0.16);
        assert_eq!(pid.integrator, 50.0);
    }
}
