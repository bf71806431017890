//! Jerk limited kinematic path generation.
//!
//! The shaping functions advance an acceleration towards the value required to reach an
//! input position and/or velocity, honouring velocity, acceleration and jerk limits.
//! Limits violating `min <= 0 <= max` leave the state untouched.

#[cfg(not(any(test, feature = "std")))]
#[allow(unused_imports)]
use micromath::F32Ext;

use super::sqrt_controller::{Mode, SqrtController};

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ShapingLimits {
    pub vel_min: f32,
    pub vel_max: f32,
    pub accel_min: f32,
    pub accel_max: f32,
    pub jerk_max: f32,
}

impl ShapingLimits {
    pub fn accel_valid(&self) -> bool {
        self.accel_min <= 0.0 && self.accel_max >= 0.0 && self.jerk_max >= 0.0
    }

    pub fn is_valid(&self) -> bool {
        self.vel_min <= 0.0 && self.vel_max >= 0.0 && self.accel_valid()
    }
}

/// Projects velocity forward by `dt`, refusing to move it further in the direction of
/// `limit` unless that brings it back towards zero.
pub fn update_vel_accel(vel: f32, accel: f32, dt: f32, limit: f32, vel_error: f32) -> f32 {
    let mut delta_vel = accel * dt;
    if delta_vel * limit > 0.0 && vel_error * limit > 0.0 {
        if vel * limit < 0.0 {
            delta_vel = delta_vel.clamp(-vel.abs(), vel.abs());
        } else {
            delta_vel = 0.0;
        }
    }
    vel + delta_vel
}

/// Position and velocity counterpart of [`update_vel_accel`], returns `(pos, vel)`
pub fn update_pos_vel_accel(
    pos: f32,
    vel: f32,
    accel: f32,
    dt: f32,
    limit: f32,
    pos_error: f32,
    vel_error: f32,
) -> (f32, f32) {
    let mut delta_pos = vel * dt + accel * 0.5 * dt * dt;
    if delta_pos * limit > 0.0 && pos_error * limit > 0.0 {
        delta_pos = 0.0;
    }
    (pos + delta_pos, update_vel_accel(vel, accel, dt, limit, vel_error))
}

/// Moves `accel` towards `accel_input` by at most `jerk_max * dt`
pub fn shape_accel(accel_input: f32, accel: f32, jerk_max: f32, dt: f32) -> f32 {
    if jerk_max < 0.0 || dt <= 0.0 {
        return accel;
    }
    let max_delta = jerk_max * dt;
    accel + (accel_input - accel).clamp(-max_delta, max_delta)
}

/// Square-root controllers backing the position and velocity shaping stages.
///
/// Every shaping call-site owns its own `Shaper` so the controller memory is never
/// shared between unrelated trajectories.
#[derive(Copy, Clone, Debug, Default)]
pub struct Shaper {
    position: SqrtController,
    velocity: SqrtController,
}

impl Shaper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next acceleration of a jerk limited path towards `vel_input`
    #[allow(clippy::too_many_arguments)]
    pub fn shape_vel_accel(
        &mut self,
        vel_input: f32,
        accel_input: f32,
        vel: f32,
        accel: f32,
        limits: &ShapingLimits,
        dt: f32,
        limit_total: bool,
    ) -> f32 {
        if !limits.accel_valid() {
            return accel;
        }

        let vel_error = vel_input - vel;

        // acceleration limit follows the direction of the velocity error
        let kp = if vel_error > 0.0 {
            limits.jerk_max / limits.accel_max
        } else {
            limits.jerk_max / -limits.accel_min
        };
        self.velocity.kp = if kp.is_finite() { kp } else { 0.0 };
        self.velocity.error = vel_error;
        self.velocity.derivative_max = limits.jerk_max;
        let mut accel_target = self.velocity.apply(0.0, 0.0, Mode::Normal, dt);

        accel_target = accel_target.clamp(limits.accel_min, limits.accel_max);
        accel_target += accel_input;
        if limit_total {
            accel_target = accel_target.clamp(limits.accel_min, limits.accel_max);
        }

        shape_accel(accel_target, accel, limits.jerk_max, dt)
    }

    /// Returns the next acceleration of a jerk limited path towards `pos_input` and
    /// `vel_input`
    #[allow(clippy::too_many_arguments)]
    pub fn shape_pos_vel_accel(
        &mut self,
        pos_input: f32,
        vel_input: f32,
        accel_input: f32,
        pos: f32,
        vel: f32,
        accel: f32,
        limits: &ShapingLimits,
        dt: f32,
        limit_total: bool,
    ) -> f32 {
        if !limits.is_valid() {
            return accel;
        }

        let pos_error = pos_input - pos;

        // the approach decelerates, so the limit opposite to the error is used
        let (accel_tc_max, kp) = if pos_error > 0.0 {
            (-0.5 * limits.accel_min, 0.5 * limits.jerk_max / -limits.accel_min)
        } else {
            (0.5 * limits.accel_max, 0.5 * limits.jerk_max / limits.accel_max)
        };
        self.position.kp = if kp.is_finite() { kp } else { 0.0 };
        self.position.error = pos_error;
        self.position.derivative_max = accel_tc_max;
        let mut vel_target = self.position.apply(0.0, 0.0, Mode::Normal, dt);

        if limits.vel_min < 0.0 || limits.vel_max > 0.0 {
            vel_target = vel_target.clamp(limits.vel_min, limits.vel_max);
        }
        vel_target += vel_input;
        if limit_total {
            vel_target = vel_target.clamp(limits.vel_min, limits.vel_max);
        }

        self.shape_vel_accel(vel_target, accel_input, vel, accel, limits, dt, limit_total)
    }
}

mod test {
    #[test]
    fn test_shape_accel_jerk_bound() {
        use super::shape_accel;

        let (jerk_max, dt) = (500.0, 0.01);
        let mut accel = 0.0;
        for input in [1000.0, -1000.0, 3.0, 0.0, 250.0, -42.0] {
            let next = shape_accel(input, accel, jerk_max, dt);
            assert!((next - accel).abs() <= jerk_max * dt + 1e-4);
            accel = next;
        }
        assert_eq!(shape_accel(100.0, 1.0, -1.0, dt), 1.0);
        assert_eq!(shape_accel(100.0, 1.0, 500.0, 0.0), 1.0);
    }

    #[test]
    fn test_update_vel_accel_windup() {
        use super::update_vel_accel;

        // positive limit with positive error: never grows further from zero
        let mut vel = 50.0;
        for _ in 0..10 {
            let next = update_vel_accel(vel, 100.0, 0.1, 1.0, 10.0);
            assert!(next.abs() <= vel.abs());
            vel = next;
        }
        assert_eq!(vel, 50.0);

        // velocity opposite to the limit may only return to zero
        let vel = update_vel_accel(-5.0, 100.0, 0.1, 1.0, 10.0);
        assert_eq!(vel, 0.0);

        // no limit, plain integration
        assert_eq!(update_vel_accel(1.0, 10.0, 0.5, 0.0, 0.0), 6.0);
    }

    #[test]
    fn test_update_pos_vel_accel() {
        use super::update_pos_vel_accel;

        let (pos, vel) = update_pos_vel_accel(0.0, 10.0, 2.0, 1.0, 0.0, 0.0, 0.0);
        assert_eq!((pos, vel), (11.0, 12.0));

        let (pos, vel) = update_pos_vel_accel(0.0, 10.0, 2.0, 1.0, 1.0, 1.0, 1.0);
        assert_eq!((pos, vel), (0.0, 10.0));
    }

    #[test]
    fn test_invalid_limits_no_op() {
        use super::{Shaper, ShapingLimits};

        let mut shaper = Shaper::new();
        let limits = ShapingLimits {
            vel_min: 10.0,
            vel_max: 100.0,
            accel_min: -100.0,
            accel_max: 100.0,
            jerk_max: 500.0,
        };
        let accel =
            shaper.shape_pos_vel_accel(100.0, 0.0, 0.0, 0.0, 0.0, 7.0, &limits, 0.01, false);
        assert_eq!(accel, 7.0);

        let limits = ShapingLimits { accel_min: 1.0, ..limits };
        let accel = shaper.shape_vel_accel(100.0, 0.0, 0.0, 7.0, &limits, 0.01, false);
        assert_eq!(accel, 7.0);
    }

    #[test]
    fn test_shape_pos_vel_accel_converges() {
        use super::{update_pos_vel_accel, Shaper, ShapingLimits};

        let limits = ShapingLimits {
            vel_min: -200.0,
            vel_max: 200.0,
            accel_min: -250.0,
            accel_max: 250.0,
            jerk_max: 500.0,
        };
        let dt = 0.01;
        let mut shaper = Shaper::new();
        let (mut pos, mut vel, mut accel) = (0.0f32, 0.0f32, 0.0f32);
        let target = 1000.0;
        for _ in 0..3000 {
            let next =
                shaper.shape_pos_vel_accel(target, 0.0, 0.0, pos, vel, accel, &limits, dt, false);
            assert!((next - accel).abs() <= limits.jerk_max * dt + 1e-3);
            accel = next;
            assert!(accel <= limits.accel_max + 1e-3 && accel >= limits.accel_min - 1e-3);
            let (p, v) = update_pos_vel_accel(pos, vel, accel, dt, 0.0, 0.0, 0.0);
            pos = p;
            vel = v;
            assert!(vel <= limits.vel_max + 1.0);
        }
        assert!((pos - target).abs() < 5.0, "pos {}", pos);
        assert!(vel.abs() < 5.0, "vel {}", vel);
    }
}
