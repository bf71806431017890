//! Horizontal cascade: position error to velocity, velocity error to acceleration and
//! acceleration to bank angles.

use core::f32::consts::{FRAC_1_SQRT_2, PI};

use nalgebra::Vector2;

use super::{
    pid::{Integrator, NavPid},
    saturate_i16, ControllerContext, UpdateTimer,
};
use crate::{
    algorithm::{constrain, scale_range, wrap_18000},
    config::{Config, UserControlMode},
    types::{
        state::centidegrees_to_radians, EstimatedState, Quality, RcCommand, Snapshot,
        GRAVITY_CMSS, X, Y,
    },
};

#[cfg(not(any(test, feature = "std")))]
#[allow(unused_imports)]
use micromath::F32Ext;

/// cm/s/s
pub const NAV_ACCELERATION_XY_MAX: f32 = 980.0;
/// cm/s/s/s
const JERK_LIMIT: f32 = 1700.0;
/// Below this cruise speed course hold keeps the position instead, cm/s
const MIN_CRUISE_SPEED: f32 = 50.0;
/// Velocity error magnitude below which the acceleration limit is split evenly, cm/s
const MIN_VELOCITY_ERROR: f32 = 0.1;

fn radians_to_decidegrees(radians: f32) -> f32 {
    radians * 1800.0 / PI
}

/// Maps an angle in decidegrees onto the `[-500, 500]` stick range
pub fn angle_to_rc_command(angle: i16, max_inclination: u16) -> i16 {
    if max_inclination == 0 {
        return 0;
    }
    let command = angle as f32 * 500.0 / max_inclination as f32;
    constrain(command, -500.0, 500.0) as i16
}

/// Fraction of the D-term removed at `value` between the attenuation start and end points
fn velocity_attenuation(value: f32, max: f32, factor: f32, start: f32, end: f32) -> f32 {
    let normalized = constrain(scale_range(value.abs(), 0.0, max, 0.0, 1.0), 0.0, 1.0);
    constrain(scale_range(normalized, start, end, 0.0, factor), 0.0, factor)
}

pub struct PositionController {
    config: Config,
    vel_pids: [NavPid; 2],
    /// cm/s/s
    last_accel: Vector2<f32>,
    /// Velocity produced by the position stage before attenuation, cm/s
    output_constrained: Vector2<f32>,
    timer: UpdateTimer,
}

impl PositionController {
    pub fn new(config: &Config) -> Self {
        let pids = &config.pids;
        let vel_pid = NavPid::new(&pids.vel_xy, 0.0, pids.vel_xy_dterm_lpf as f32);
        Self {
            config: *config,
            vel_pids: [vel_pid; 2],
            last_accel: Vector2::zeros(),
            output_constrained: Vector2::zeros(),
            timer: UpdateTimer::default(),
        }
    }

    pub fn reconfigure(&mut self, config: &Config) {
        *self = Self::new(config);
    }

    pub fn velocity_pid(&self, axis: usize) -> &NavPid {
        &self.vel_pids[axis]
    }

    pub fn last_accel(&self) -> Vector2<f32> {
        self.last_accel
    }

    pub fn output_constrained(&self) -> Vector2<f32> {
        self.output_constrained
    }

    pub fn reset(&mut self, ctx: &mut ControllerContext) {
        for pid in self.vel_pids.iter_mut() {
            pid.reset();
        }
        ctx.rc_adjustment.roll = 0;
        ctx.rc_adjustment.pitch = 0;
        self.last_accel = Vector2::zeros();
    }

    /// Moves the horizontal target to where the craft stops when decelerating now
    pub fn set_stop_position(&self, estimate: &EstimatedState, ctx: &mut ControllerContext) {
        let stop = stop_position(estimate, self.config.mc.pos_deceleration_time());
        ctx.desired.pos.x = stop.x;
        ctx.desired.pos.y = stop.y;
    }

    /// Speed limit of the current flight mode, cm/s
    pub fn active_speed(&self, snapshot: &Snapshot) -> f32 {
        let mode = &snapshot.mode;
        let general = &self.config.general;
        match mode.wp_mode || mode.rth || mode.rth_trackback || mode.auto_wp {
            true => general.max_auto_speed as f32,
            false => general.max_manual_speed as f32,
        }
    }

    fn heading_attenuation(&self, snapshot: &Snapshot, ctx: &ControllerContext) -> f32 {
        if !(self.config.mc.slow_down_for_turning && snapshot.mode.auto_wp) {
            return 1.0;
        }
        let error = wrap_18000(ctx.desired.yaw - snapshot.estimate.yaw).clamp(-9000, 9000);
        let scaling = libm::cosf(centidegrees_to_radians(error as f32));
        constrain(scaling * scaling, 0.05, 1.0)
    }

    fn expo_attenuation(&self, vel_total: f32, vel_max: f32) -> f32 {
        let scale = match vel_max > 0.0 {
            true => constrain(vel_total / vel_max, 0.01, 1.0),
            false => 1.0,
        };
        1.0 - self.config.mc.pos_response_expo() * (1.0 - scale * scale)
    }

    fn update_velocity(
        &mut self,
        snapshot: &Snapshot,
        ctx: &mut ControllerContext,
        max_speed: f32,
    ) {
        let estimate = &snapshot.estimate;
        let mode = &snapshot.mode;
        if mode.course_hold {
            let cruise = ctx.cruise;
            if cruise.speed >= MIN_CRUISE_SPEED {
                let course = centidegrees_to_radians(cruise.course as f32);
                ctx.desired.vel.x = cruise.speed * libm::cosf(course);
                ctx.desired.vel.y = cruise.speed * libm::sinf(course);
                return;
            } else if ctx.flags.adjusting_position {
                self.set_stop_position(estimate, ctx);
            }
        }

        let (kp, _, _, _) = self.config.pids.pos_xy.gains();
        let desired = Vector2::new(ctx.desired.pos.x, ctx.desired.pos.y);
        let error = desired - Vector2::new(estimate.pos.x, estimate.pos.y);
        let mut velocity = error * kp;
        let mut total = velocity.norm();

        let slow_down = self.config.mc.slow_down_for_turning;
        let cruising = (mode.auto_wp || mode.rth_trackback) && !mode.hold_position;
        let speed_up = cruising && total < max_speed && !slow_down;
        if (speed_up || total > max_speed) && total > 0.0 {
            velocity *= max_speed / total;
            total = max_speed;
        }
        self.output_constrained = velocity;

        let attenuation = self.heading_attenuation(snapshot, ctx);
        let expo = self.expo_attenuation(total, max_speed);
        ctx.desired.vel.x = velocity.x * attenuation * expo;
        ctx.desired.vel.y = velocity.y * attenuation * expo;
    }

    fn dterm_scale(&self, setpoint: f32, measurement: f32, max_speed: f32) -> f32 {
        let attenuation = &self.config.pids.vel_xy_dterm_attenuation;
        let factor = attenuation.factor as f32 / 100.0;
        let start = attenuation.start as f32 / 100.0;
        let end = attenuation.end as f32 / 100.0;
        let setpoint_scale = velocity_attenuation(setpoint, max_speed, factor, start, end);
        let measurement_scale = velocity_attenuation(measurement, max_speed, factor, start, end);
        1.0 - setpoint_scale.min(measurement_scale)
    }

    fn update_acceleration(
        &mut self,
        snapshot: &Snapshot,
        ctx: &mut ControllerContext,
        dt: f32,
        max_accel: f32,
        max_speed: f32,
    ) {
        let estimate = &snapshot.estimate;
        let measurement = Vector2::new(estimate.vel.x, estimate.vel.y);
        let setpoint = Vector2::new(ctx.desired.vel.x, ctx.desired.vel.y);
        let error = setpoint - measurement;

        let magnitude = error.norm();
        let accel_limit = match magnitude > MIN_VELOCITY_ERROR {
            true => error.abs() * (max_accel / magnitude),
            false => Vector2::repeat(max_accel * FRAC_1_SQRT_2),
        };

        let mut max_change = dt * JERK_LIMIT;
        if ctx.flags.braking {
            max_change *= 2.0;
        }

        let dterm_scale = self.dterm_scale(setpoint.norm(), estimate.vel_xy, max_speed);
        let mut accel: Vector2<f32> = Vector2::zeros();
        for axis in [X, Y] {
            let limit = accel_limit[axis];
            let last = self.last_accel[axis];
            let min = constrain(last - max_change, -limit, limit);
            let max = constrain(last + max_change, -limit, limit);
            accel[axis] = self.vel_pids[axis].apply_scaled(
                setpoint[axis],
                measurement[axis],
                dt,
                min,
                max,
                Integrator::Free,
                dterm_scale,
            );
        }

        let mc = &self.config.mc;
        let mut max_bank = mc.max_bank_angle as f32 * 10.0;
        let boost_factor = mc.braking.boost_factor as f32 / 100.0;
        if ctx.flags.braking_boost && boost_factor > 0.0 {
            let threshold = mc.braking.boost_speed_threshold as f32;
            let max_speed = self.config.general.max_manual_speed as f32;
            let scaled = scale_range(estimate.vel_xy, threshold, max_speed, 0.0, boost_factor);
            accel *= 1.0 + constrain(scaled, 0.0, boost_factor);
            max_bank = mc.braking.bank_angle as f32 * 10.0;
        }
        self.last_accel = accel;

        let (sin, cos) = (estimate.sin_yaw, estimate.cos_yaw);
        let forward = accel.x * cos + accel.y * sin;
        let right = -accel.x * sin + accel.y * cos;
        let pitch = libm::atan2f(forward, GRAVITY_CMSS);
        let roll = libm::atan2f(right * libm::cosf(pitch), GRAVITY_CMSS);

        let roll = constrain(radians_to_decidegrees(roll), -max_bank, max_bank);
        let pitch = constrain(radians_to_decidegrees(pitch), -max_bank, max_bank);
        ctx.rc_adjustment.roll = roll as i16;
        ctx.rc_adjustment.pitch = pitch as i16;
    }

    pub fn apply(
        &mut self,
        snapshot: &Snapshot,
        ctx: &mut ControllerContext,
        command: &mut RcCommand,
    ) {
        if snapshot.estimate.pos_status < Quality::Usable {
            ctx.rc_adjustment.roll = 0;
            ctx.rc_adjustment.pitch = 0;
            return;
        }

        let atti = self.config.general.user_control_mode == UserControlMode::Atti;
        let bypass = !snapshot.mode.course_hold && atti && ctx.flags.adjusting_position;

        if ctx.flags.horizontal_data_new {
            ctx.flags.horizontal_data_consumed = true;
            let dt = self.timer.update(snapshot.now);
            if bypass {
                return;
            }
            match dt {
                Some(dt) => {
                    let max_speed = self.active_speed(snapshot);
                    self.update_velocity(snapshot, ctx, max_speed);
                    self.update_acceleration(snapshot, ctx, dt, NAV_ACCELERATION_XY_MAX, max_speed);
                    ctx.telemetry.desired_velocity[X] = saturate_i16(ctx.desired.vel.x);
                    ctx.telemetry.desired_velocity[Y] = saturate_i16(ctx.desired.vel.y);
                }
                None => {
                    debug!("Horizontal estimate stale, resetting position controller");
                    self.reset(ctx);
                }
            }
        } else if bypass {
            return;
        }

        let max_inclination = self.config.pids.max_inclination;
        command.pitch = angle_to_rc_command(ctx.rc_adjustment.pitch, max_inclination);
        command.roll = angle_to_rc_command(ctx.rc_adjustment.roll, max_inclination);
    }
}

/// Position reached when decelerating from the current velocity over `deceleration_time` seconds
pub fn stop_position(estimate: &EstimatedState, deceleration_time: f32) -> Vector2<f32> {
    let pos = Vector2::new(estimate.pos.x, estimate.pos.y);
    let vel = Vector2::new(estimate.vel.x, estimate.vel.y);
    pos + vel * deceleration_time
}

mod test {
    #[cfg(test)]
    fn hold_snapshot() -> crate::types::Snapshot {
        use nalgebra::Vector3;

        use crate::types::{EstimatedState, Snapshot};

        let mut snapshot = Snapshot::default();
        snapshot.estimate = EstimatedState::new(Vector3::zeros(), Vector3::zeros(), 0);
        snapshot
    }

    #[test]
    fn test_angle_to_rc_command() {
        use super::angle_to_rc_command;

        assert_eq!(angle_to_rc_command(150, 300), 250);
        assert_eq!(angle_to_rc_command(-450, 300), -500);
        assert_eq!(angle_to_rc_command(100, 0), 0);
    }

    #[test]
    fn test_stop_position() {
        use nalgebra::{Vector2, Vector3};

        use super::stop_position;
        use crate::types::EstimatedState;

        let vel = Vector3::new(100.0, -50.0, 0.0);
        let estimate = EstimatedState::new(Vector3::new(10.0, 20.0, 0.0), vel, 0);
        let stop = stop_position(&estimate, 1.2);
        assert!((stop - Vector2::new(130.0, -40.0)).norm() < 1e-3);
    }

    #[test]
    fn test_velocity_limited_to_max_speed() {
        use super::PositionController;
        use crate::config::Config;
        use crate::navigation::ControllerContext;

        let mut config = Config::default();
        config.mc.pos_response_expo = 0;
        let mut controller = PositionController::new(&config);
        let snapshot = hold_snapshot();
        let mut ctx = ControllerContext::default();
        ctx.desired.pos.x = 3000.0;
        ctx.desired.pos.y = 4000.0;
        controller.update_velocity(&snapshot, &mut ctx, 500.0);
        assert!((ctx.desired.vel.x - 300.0).abs() < 1e-3);
        assert!((ctx.desired.vel.y - 400.0).abs() < 1e-3);
        assert!((controller.output_constrained().norm() - 500.0).abs() < 1e-3);
    }

    #[test]
    fn test_course_hold_velocity() {
        use super::PositionController;
        use crate::config::Config;
        use crate::navigation::ControllerContext;

        let mut controller = PositionController::new(&Config::default());
        let mut snapshot = hold_snapshot();
        snapshot.mode.course_hold = true;
        let mut ctx = ControllerContext::default();
        ctx.cruise.speed = 200.0;
        ctx.cruise.course = 9000;
        controller.update_velocity(&snapshot, &mut ctx, 500.0);
        assert!(ctx.desired.vel.x.abs() < 1e-3);
        assert!((ctx.desired.vel.y - 200.0).abs() < 1e-3);
    }

    #[test]
    fn test_expo_attenuation() {
        use super::PositionController;
        use crate::config::Config;

        let mut config = Config::default();
        config.mc.pos_response_expo = 50;
        let controller = PositionController::new(&config);
        assert_eq!(controller.expo_attenuation(500.0, 500.0), 1.0);
        assert!((controller.expo_attenuation(250.0, 500.0) - 0.625).abs() < 1e-6);
    }

    #[test]
    fn test_heading_attenuation() {
        use super::PositionController;
        use crate::config::Config;
        use crate::navigation::ControllerContext;

        let controller = PositionController::new(&Config::default());
        let mut snapshot = hold_snapshot();
        let mut ctx = ControllerContext::default();
        ctx.desired.yaw = 9000;
        assert_eq!(controller.heading_attenuation(&snapshot, &ctx), 1.0);
        snapshot.mode.auto_wp = true;
        assert_eq!(controller.heading_attenuation(&snapshot, &ctx), 0.05);
        ctx.desired.yaw = 0;
        assert_eq!(controller.heading_attenuation(&snapshot, &ctx), 1.0);
    }

    #[test]
    fn test_unusable_position_passthrough() {
        use super::PositionController;
        use crate::config::Config;
        use crate::navigation::ControllerContext;
        use crate::types::{Quality, RcCommand};

        let mut controller = PositionController::new(&Config::default());
        let mut snapshot = hold_snapshot();
        snapshot.estimate.pos_status = Quality::None;
        let mut ctx = ControllerContext::default();
        ctx.rc_adjustment.roll = 120;
        ctx.rc_adjustment.pitch = -80;
        ctx.flags.horizontal_data_new = true;
        let mut command = RcCommand { roll: 40, pitch: -30, yaw: 0, throttle: 1500 };
        controller.apply(&snapshot, &mut ctx, &mut command);
        assert_eq!((ctx.rc_adjustment.roll, ctx.rc_adjustment.pitch), (0, 0));
        assert_eq!((command.roll, command.pitch), (40, -30));
        assert!(!ctx.flags.horizontal_data_consumed);
    }

    #[test]
    fn test_tilts_towards_target() {
        use fugit::MicrosDurationU64 as Duration;

        use super::PositionController;
        use crate::config::Config;
        use crate::navigation::ControllerContext;
        use crate::types::RcCommand;

        let mut controller = PositionController::new(&Config::default());
        let mut snapshot = hold_snapshot();
        let mut ctx = ControllerContext::default();
        ctx.flags.horizontal_data_new = true;
        let mut command = RcCommand::default();
        // first update only starts the timer
        controller.apply(&snapshot, &mut ctx, &mut command);
        assert_eq!(command.pitch, 0);

        // target north of the craft, heading north
        ctx.desired.pos.x = 1000.0;
        for i in 1..=20 {
            snapshot.now = Duration::millis(i * 10);
            controller.apply(&snapshot, &mut ctx, &mut command);
        }
        assert!(ctx.rc_adjustment.pitch > 0);
        assert_eq!(ctx.rc_adjustment.roll, 0);
        assert!(command.pitch > 0);
        assert!(ctx.telemetry.desired_velocity[0] > 0);
        // acceleration changes no faster than the jerk limit
        assert!(controller.last_accel().x <= 20.0 * 0.01 * 1700.0 + 1e-3);
    }

    #[test]
    fn test_atti_bypass() {
        use fugit::MicrosDurationU64 as Duration;

        use super::PositionController;
        use crate::config::Config;
        use crate::navigation::ControllerContext;
        use crate::types::RcCommand;

        let mut controller = PositionController::new(&Config::default());
        let mut snapshot = hold_snapshot();
        let mut ctx = ControllerContext::default();
        ctx.flags.horizontal_data_new = true;
        ctx.flags.adjusting_position = true;
        ctx.rc_adjustment.pitch = 100;
        let mut command = RcCommand { roll: 0, pitch: 250, yaw: 0, throttle: 1500 };
        snapshot.now = Duration::millis(10);
        controller.apply(&snapshot, &mut ctx, &mut command);
        assert!(ctx.flags.horizontal_data_consumed);
        assert_eq!(command.pitch, 250);
        assert_eq!(ctx.rc_adjustment.pitch, 100);
    }

    #[test]
    fn test_stale_data_resets() {
        use fugit::MicrosDurationU64 as Duration;

        use super::PositionController;
        use crate::config::Config;
        use crate::navigation::ControllerContext;
        use crate::types::RcCommand;

        let mut controller = PositionController::new(&Config::default());
        let mut snapshot = hold_snapshot();
        let mut ctx = ControllerContext::default();
        ctx.flags.horizontal_data_new = true;
        ctx.rc_adjustment.roll = 55;
        let mut command = RcCommand::default();
        snapshot.now = Duration::millis(10);
        controller.apply(&snapshot, &mut ctx, &mut command);
        assert_eq!(ctx.rc_adjustment.roll, 0);
        assert_eq!(command.roll, 0);
        assert_eq!(controller.velocity_pid(0).integrator, 0.0);
    }
}
