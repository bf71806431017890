//! Pilot stick handling while navigation owns an axis.
//!
//! Each function moves the corresponding target and reports whether the pilot is
//! currently adjusting it.

use fugit::MicrosDurationU64 as Duration;

use super::{
    altitude::{AltitudeController, ClimbRateCommand},
    braking::BrakingController,
    position, ControllerContext,
};
use crate::{
    algorithm::{constrain, scale_range},
    config::{Config, UserControlMode},
    types::{Quality, Snapshot},
};

/// Lowest AGL target that engages surface tracking, cm
const MIN_SURFACE_TARGET: f32 = 10.0;
/// Descent while the surface sensor is not trusted, cm/s
const SURFACE_SEARCH_CLIMB_RATE: f32 = -50.0;
/// Cruise speed decrements only apply to stick updates closer than this, ms
const CRUISE_SPEED_UPDATE_WINDOW: u64 = 100;
/// cm/s
const MIN_CRUISE_SPEED: f32 = 10.0;

pub fn apply_deadband(value: i32, deadband: i32) -> i32 {
    if value.abs() < deadband {
        0
    } else if value > 0 {
        value - deadband
    } else {
        value + deadband
    }
}

/// Removes the deadband and stretches the remainder back onto `[min, max]`
pub fn apply_deadband_rescaled(value: i32, deadband: i32, min: i32, max: i32) -> i32 {
    if value.abs() < deadband {
        0
    } else if value > 0 {
        scale_range_i32(value - deadband, 0, max - deadband, 0, max)
    } else {
        scale_range_i32(value + deadband, min + deadband, 0, min, 0)
    }
}

fn scale_range_i32(x: i32, src_min: i32, src_max: i32, dst_min: i32, dst_max: i32) -> i32 {
    let b = src_max - src_min;
    if b == 0 {
        return dst_min;
    }
    (dst_max - dst_min) * (x - src_min) / b + dst_min
}

/// Stick velocity in cm/s for a roll or pitch adjustment
fn stick_velocity(config: &Config, adjustment: i32) -> f32 {
    let max_speed = config.general.max_manual_speed as f32;
    let range = 500.0 - config.rc.pos_hold_deadband as f32;
    if range <= 0.0 {
        return 0.0;
    }
    adjustment as f32 * max_speed / range
}

pub fn adjust_altitude(
    config: &Config,
    snapshot: &Snapshot,
    ctx: &mut ControllerContext,
    altitude: &mut AltitudeController,
) -> bool {
    let estimate = &snapshot.estimate;
    let rc = &config.rc;
    let stick = snapshot.sticks.throttle as f32;

    if ctx.flags.terrain_follow {
        let (idle, max) = (rc.throttle_idle as f32, rc.throttle_max as f32);
        let max_altitude = config.general.max_terrain_follow_altitude as f32;
        let target = scale_range(stick, idle, max, 0.0, max_altitude);
        if estimate.agl_status == Quality::Trusted && target > MIN_SURFACE_TARGET {
            altitude.set_climb_rate(ClimbRateCommand::Reset, estimate);
            altitude.track_surface(target, estimate);
        } else {
            let command = ClimbRateCommand::Constant(SURFACE_SEARCH_CLIMB_RATE);
            altitude.set_climb_rate(command, estimate);
        }
        return true;
    }

    let rc_zero = altitude.throttle_rc_zero() as i32;
    let deadband = rc.alt_hold_deadband as i32;
    let offset = snapshot.sticks.throttle as i32 - rc_zero;
    let adjustment = apply_deadband_rescaled(offset, deadband, -500, 500);
    if adjustment == 0 {
        if ctx.flags.adjusting_altitude {
            altitude.set_climb_rate(ClimbRateCommand::Reset, estimate);
        }
        return false;
    }

    let max_climb_rate = config.general.max_manual_climb_rate as f32;
    let range = match adjustment > 0 {
        true => rc.throttle_max as i32 - rc_zero - deadband,
        false => rc_zero - rc.throttle_idle as i32 - deadband,
    };
    let climb_rate = match range > 0 {
        true => adjustment as f32 * max_climb_rate / range as f32,
        false => 0.0,
    };
    altitude.set_climb_rate(ClimbRateCommand::Constant(climb_rate), estimate);
    true
}

/// Course hold speed change from the pitch stick
fn adjust_cruise_speed(
    config: &Config,
    now: Duration,
    ctx: &mut ControllerContext,
    pitch: i32,
) -> bool {
    let cruise = &mut ctx.cruise;
    let delta = match cruise.last_update.replace(now) {
        Some(last) => now.ticks().saturating_sub(last.ticks()) / 1000,
        None => u64::MAX,
    };

    let velocity = stick_velocity(config, pitch);
    if velocity > cruise.speed {
        cruise.speed = velocity;
    } else if velocity < 0.0 && delta < CRUISE_SPEED_UPDATE_WINDOW {
        cruise.speed += delta as f32 / 1000.0 * velocity / 2.0;
    } else {
        return false;
    }
    let max_speed = config.general.max_manual_speed as f32;
    cruise.speed = constrain(cruise.speed, MIN_CRUISE_SPEED, max_speed);
    true
}

pub fn adjust_position(
    config: &Config,
    snapshot: &Snapshot,
    ctx: &mut ControllerContext,
    braking: &mut BrakingController,
) -> bool {
    let deadband = config.rc.pos_hold_deadband as i32;
    let pitch = apply_deadband(snapshot.sticks.pitch as i32, deadband);
    let roll = apply_deadband(snapshot.sticks.roll as i32, deadband);

    if snapshot.mode.course_hold {
        if pitch != 0 {
            return adjust_cruise_speed(config, snapshot.now, ctx, pitch);
        }
        return false;
    }

    let adjusting = pitch != 0 || roll != 0;
    braking.process(snapshot, ctx, adjusting);

    let estimate = &snapshot.estimate;
    if adjusting {
        let (kp, _, _, _) = config.pids.pos_xy.gains();
        if config.general.user_control_mode == UserControlMode::Cruise && kp > 0.0 {
            let forward = stick_velocity(config, pitch);
            let right = stick_velocity(config, roll);
            let (sin, cos) = (estimate.sin_yaw, estimate.cos_yaw);
            let north = forward * cos - right * sin;
            let east = forward * sin + right * cos;
            ctx.desired.pos.x = estimate.pos.x + north / kp;
            ctx.desired.pos.y = estimate.pos.y + east / kp;
        }
        return true;
    }

    if ctx.flags.adjusting_position {
        let stop = position::stop_position(estimate, config.mc.pos_deceleration_time());
        ctx.desired.pos.x = stop.x;
        ctx.desired.pos.y = stop.y;
    }
    false
}

pub fn adjust_heading(config: &Config, snapshot: &Snapshot, ctx: &mut ControllerContext) -> bool {
    if (snapshot.sticks.yaw as i32).abs() <= config.rc.pos_hold_deadband as i32 {
        return false;
    }
    if !snapshot.mode.course_hold {
        ctx.desired.yaw = snapshot.estimate.yaw;
    }
    true
}

mod test {
    #[cfg(test)]
    fn snapshot() -> crate::types::Snapshot {
        use nalgebra::Vector3;

        use crate::types::{EstimatedState, Snapshot};

        let mut snapshot = Snapshot::default();
        let pos = Vector3::new(100.0, 100.0, 1000.0);
        snapshot.estimate = EstimatedState::new(pos, Vector3::zeros(), 0);
        snapshot.sticks.throttle = 1500;
        snapshot
    }

    #[test]
    fn test_deadband() {
        use super::{apply_deadband, apply_deadband_rescaled};

        assert_eq!(apply_deadband(5, 10), 0);
        assert_eq!(apply_deadband(30, 10), 20);
        assert_eq!(apply_deadband(-30, 10), -20);
        assert_eq!(apply_deadband_rescaled(40, 50, -500, 500), 0);
        assert_eq!(apply_deadband_rescaled(500, 50, -500, 500), 500);
        assert_eq!(apply_deadband_rescaled(-500, 50, -500, 500), -500);
        assert_eq!(apply_deadband_rescaled(275, 50, -500, 500), 250);
    }

    #[test]
    fn test_altitude_stick() {
        use super::adjust_altitude;
        use crate::config::Config;
        use crate::navigation::{altitude::AltitudeController, ControllerContext};

        let config = Config::default();
        let mut altitude = AltitudeController::new(&config);
        let mut ctx = ControllerContext::default();
        let mut snapshot = snapshot();
        assert!(!adjust_altitude(&config, &snapshot, &mut ctx, &mut altitude));
        assert_eq!(altitude.climb_rate(), 0.0);

        // full stick from the 1500 zero point
        snapshot.sticks.throttle = 1850;
        assert!(adjust_altitude(&config, &snapshot, &mut ctx, &mut altitude));
        assert_eq!(altitude.climb_rate(), 222.0);

        snapshot.sticks.throttle = 1150;
        assert!(adjust_altitude(&config, &snapshot, &mut ctx, &mut altitude));
        assert!((altitude.climb_rate() + 222.667).abs() < 1e-2);

        ctx.flags.adjusting_altitude = true;
        snapshot.sticks.throttle = 1520;
        assert!(!adjust_altitude(&config, &snapshot, &mut ctx, &mut altitude));
        assert_eq!(altitude.climb_rate(), 0.0);
    }

    #[test]
    fn test_terrain_follow_without_surface() {
        use super::adjust_altitude;
        use crate::config::Config;
        use crate::navigation::{altitude::AltitudeController, ControllerContext};

        let config = Config::default();
        let mut altitude = AltitudeController::new(&config);
        let mut ctx = ControllerContext::default();
        ctx.flags.terrain_follow = true;
        let snapshot = snapshot();
        assert!(adjust_altitude(&config, &snapshot, &mut ctx, &mut altitude));
        assert_eq!(altitude.climb_rate(), -50.0);
    }

    #[test]
    fn test_cruise_target() {
        use super::adjust_position;
        use crate::config::{Config, UserControlMode};
        use crate::navigation::{braking::BrakingController, ControllerContext};

        let mut config = Config::default();
        config.general.user_control_mode = UserControlMode::Cruise;
        let mut braking = BrakingController::new(&config);
        let mut ctx = ControllerContext::default();
        let mut snapshot = snapshot();
        snapshot.estimate.set_yaw(9000);
        snapshot.sticks.pitch = 500;
        assert!(adjust_position(&config, &snapshot, &mut ctx, &mut braking));
        // full forward stick while heading east
        assert!((ctx.desired.pos.x - 100.0).abs() < 1e-2);
        assert!((ctx.desired.pos.y - (100.0 + 500.0 / 0.65)).abs() < 1e-1);
    }

    #[test]
    fn test_stop_position_on_release() {
        use nalgebra::Vector3;

        use super::adjust_position;
        use crate::config::Config;
        use crate::navigation::{braking::BrakingController, ControllerContext};

        let config = Config::default();
        let mut braking = BrakingController::new(&config);
        let mut ctx = ControllerContext::default();
        let mut snapshot = snapshot();
        snapshot.estimate.set_velocity(Vector3::new(100.0, 0.0, 0.0));
        snapshot.sticks.roll = 5;
        assert!(!adjust_position(&config, &snapshot, &mut ctx, &mut braking));
        assert_eq!(ctx.desired.pos.x, 0.0);

        ctx.flags.adjusting_position = true;
        assert!(!adjust_position(&config, &snapshot, &mut ctx, &mut braking));
        assert!((ctx.desired.pos.x - 220.0).abs() < 1e-3);
        assert!((ctx.desired.pos.y - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_cruise_speed() {
        use fugit::MicrosDurationU64 as Duration;

        use super::adjust_position;
        use crate::config::Config;
        use crate::navigation::{braking::BrakingController, ControllerContext};

        let config = Config::default();
        let mut braking = BrakingController::new(&config);
        let mut ctx = ControllerContext::default();
        let mut snapshot = snapshot();
        snapshot.mode.course_hold = true;
        snapshot.sticks.pitch = 255;
        assert!(adjust_position(&config, &snapshot, &mut ctx, &mut braking));
        assert_eq!(ctx.cruise.speed, 250.0);

        // lower stick does not reduce speed
        snapshot.now = Duration::millis(50);
        snapshot.sticks.pitch = 100;
        assert!(!adjust_position(&config, &snapshot, &mut ctx, &mut braking));

        snapshot.now = Duration::millis(100);
        snapshot.sticks.pitch = -500;
        assert!(adjust_position(&config, &snapshot, &mut ctx, &mut braking));
        assert!((ctx.cruise.speed - 237.5).abs() < 1e-3);
    }

    #[test]
    fn test_heading_stick() {
        use super::adjust_heading;
        use crate::config::Config;
        use crate::navigation::ControllerContext;

        let config = Config::default();
        let mut ctx = ControllerContext::default();
        let mut snapshot = snapshot();
        snapshot.estimate.set_yaw(4500);
        snapshot.sticks.yaw = 10;
        assert!(!adjust_heading(&config, &snapshot, &mut ctx));
        snapshot.sticks.yaw = -100;
        assert!(adjust_heading(&config, &snapshot, &mut ctx));
        assert_eq!(ctx.desired.yaw, 4500);

        snapshot.mode.course_hold = true;
        snapshot.estimate.set_yaw(0);
        assert!(adjust_heading(&config, &snapshot, &mut ctx));
        assert_eq!(ctx.desired.yaw, 4500);
    }
}
