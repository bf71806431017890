//! Vertical cascade: climb rate shaping, position to velocity, velocity to acceleration and
//! acceleration to throttle.
//!
//! All throttle corrections are relative to hover throttle and bounded by
//! `[idle - hover, max - hover]`.

use core::f32::consts::PI;

use pid::Pid;

use super::{
    pid::{Integrator, NavPid},
    saturate_i16, ControllerContext, UpdateTimer,
};
use crate::{
    algorithm::{
        constrain,
        lpf::LPF,
        scale_range,
        shaping::{update_pos_vel_accel, Shaper, ShapingLimits},
        sqrt_controller::{Mode, SqrtController},
    },
    config::{Config, ThrottleType},
    types::{EstimatedState, RcCommand, Snapshot, GRAVITY_CMSS, Z},
};

#[cfg(not(any(test, feature = "std")))]
#[allow(unused_imports)]
use micromath::F32Ext;

/// µs
const THROTTLE_CORRECTION_IMAX: f32 = 800.0;
/// Hz
const THROTTLE_CUTOFF_FREQUENCY: f32 = 4.0;
const OVERSPEED_GAIN_Z: f32 = 2.0;
/// Time constant of the integrator decay before takeoff, seconds
const INTEGRAL_RELAX_TC: f32 = 0.16;
/// cm/s/s
const MAX_DOWNWARD_ACCELERATION: f32 = 750.0;
/// Lowest climb rate commanded while approaching an altitude target, cm/s
pub const MIN_TARGET_CLIMB_RATE: f32 = 100.0;
/// Altitude below which a low throttle stick means the craft is on the ground, cm
const TAKEOFF_ALTITUDE: f32 = 50.0;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ClimbRateCommand {
    /// Stop climbing, the shaped trajectory settles where it is
    Reset,
    /// cm/s
    Constant(f32),
    /// Descend or climb at `rate` cm/s, slowing down to the minimum rate near `altitude`
    Target { rate: f32, altitude: f32 },
}

/// Observable state of the vertical cascade
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct AltitudeState {
    pub pos_target: f32,
    pub vel_desired: f32,
    pub accel_desired: f32,
    pub vel_target: f32,
    pub accel_target: f32,
    pub pos_offset: f32,
    pub vel_offset: f32,
    pub accel_offset: f32,
    pub pos_offset_target: f32,
    pub accel_max: f32,
    pub jerk_max: f32,
    pub vel_max_up: f32,
    pub vel_max_down: f32,
    pub vel_integrator: f32,
    pub accel_integrator: f32,
    pub throttle_filter: f32,
}

pub struct AltitudeController {
    config: Config,
    state: AltitudeState,
    pos_controller: SqrtController,
    shaper: Shaper,
    offset_shaper: Shaper,
    vel_pid: NavPid,
    accel_pid: NavPid,
    surface_pid: Pid<f32>,
    throttle_filter: LPF,
    /// Direction in which the throttle output saturated, zero when unsaturated
    limit: f32,
    climb_rate: f32,
    throttle_rc_zero: u16,
    prepare_for_takeoff: bool,
    timer: UpdateTimer,
    adjusted_throttle: u16,
    /// Confidence that the vertical axis is under control, `[0, 1]`
    vel_z_control_ratio: f32,
}

fn surface_pid(config: &Config) -> Pid<f32> {
    let (kp, ki, kd, _) = config.pids.surface.gains();
    let limit = config.general.max_terrain_follow_altitude as f32;
    Pid::new(kp, ki, kd, limit, limit, limit, limit, 0.0)
}

impl AltitudeController {
    pub fn new(config: &Config) -> Self {
        let pids = &config.pids;
        let mut controller = Self {
            config: *config,
            state: AltitudeState::default(),
            pos_controller: SqrtController::default(),
            shaper: Shaper::new(),
            offset_shaper: Shaper::new(),
            vel_pid: NavPid::new(&pids.vel_z, 0.0, pids.vel_z_dterm_lpf as f32),
            accel_pid: NavPid::new(&pids.accel_z, pids.accel_z_error_lpf as f32, 0.0),
            surface_pid: surface_pid(config),
            throttle_filter: LPF::default(),
            limit: 0.0,
            climb_rate: 0.0,
            throttle_rc_zero: config.rc.throttle_mid,
            prepare_for_takeoff: false,
            timer: UpdateTimer::default(),
            adjusted_throttle: 0,
            vel_z_control_ratio: 1.0,
        };
        let general = &config.general;
        let climb_rate = general.max_manual_climb_rate as f32;
        let accel = general.max_manual_acceleration as f32;
        controller.set_max_speed_accel_z(climb_rate, climb_rate, accel);
        controller
    }

    pub fn reconfigure(&mut self, config: &Config) {
        *self = Self::new(config);
    }

    pub fn state(&self) -> AltitudeState {
        AltitudeState {
            vel_integrator: self.vel_pid.integrator,
            accel_integrator: self.accel_pid.integrator,
            throttle_filter: self.throttle_filter.value(),
            ..self.state
        }
    }

    /// Throttle stick position corresponding to zero climb rate, µs
    pub fn throttle_rc_zero(&self) -> u16 {
        self.throttle_rc_zero
    }

    /// Throttle written by the last `apply`, µs
    pub fn adjusted_throttle(&self) -> u16 {
        self.adjusted_throttle
    }

    /// Records a throttle written on behalf of the altitude controller, µs
    pub fn set_adjusted_throttle(&mut self, throttle: u16) {
        self.adjusted_throttle = throttle;
    }

    pub fn vel_z_control_ratio(&self) -> f32 {
        self.vel_z_control_ratio
    }

    pub fn is_preparing_for_takeoff(&self) -> bool {
        self.prepare_for_takeoff
    }

    pub fn climb_rate(&self) -> f32 {
        self.climb_rate
    }

    pub fn set_max_speed_accel_z(&mut self, speed_down: f32, speed_up: f32, accel: f32) {
        let speed_down = -speed_down.abs();
        let state = &mut self.state;
        if speed_down < 0.0 {
            state.vel_max_down = speed_down;
        }
        if speed_up > 0.0 {
            state.vel_max_up = speed_up;
        }
        if accel > 0.0 {
            state.accel_max = accel;
        }

        // jerk must stay reachable through the acceleration error filter
        state.jerk_max = self.config.general.shaping_jerk_z as f32 * 100.0;
        let error_lpf_hz = self.config.pids.accel_z_error_lpf as f32;
        if error_lpf_hz > 0.0 {
            let filter_limit = GRAVITY_CMSS.min(state.accel_max) * (2.0 * PI * error_lpf_hz) / 5.0;
            state.jerk_max = state.jerk_max.min(filter_limit);
        }
    }

    pub fn set_climb_rate(&mut self, command: ClimbRateCommand, estimate: &EstimatedState) {
        self.climb_rate = match command {
            ClimbRateCommand::Reset => 0.0,
            ClimbRateCommand::Constant(rate) => rate,
            ClimbRateCommand::Target { rate, altitude } => {
                let direction = if rate > 0.0 { 1.0 } else { -1.0 };
                let abs_rate = rate.abs();
                let cutoff = abs_rate * 5.0;
                let error = estimate.pos.z - altitude;
                let scaled =
                    scale_range(error, 0.0, -cutoff * direction, MIN_TARGET_CLIMB_RATE, abs_rate);
                direction * scaled.clamp(MIN_TARGET_CLIMB_RATE.min(abs_rate), abs_rate)
            }
        };
    }

    /// Terrain offset the shaped altitude follows, cm
    pub fn set_pos_offset_target(&mut self, target: f32) {
        self.state.pos_offset_target = target;
    }

    /// Feeds the height-above-ground error through the surface tracking PID and moves the
    /// terrain offset target accordingly
    pub fn track_surface(&mut self, agl_target: f32, estimate: &EstimatedState) {
        self.surface_pid.setpoint = agl_target;
        let correction = self.surface_pid.next_control_output(estimate.agl.z).output;
        self.state.pos_offset_target = self.state.pos_offset + correction;
    }

    /// Chooses the throttle stick position meaning zero climb rate
    pub fn setup(&mut self, snapshot: &Snapshot) {
        let rc = &self.config.rc;
        let stick = snapshot.sticks.throttle;
        let throttle_is_low = rc.throttle_stick_is_low(stick);
        let rc_zero = match self.config.mc.althold_throttle_type {
            ThrottleType::Stick if !throttle_is_low => stick,
            ThrottleType::Hover => snapshot.battery.hover_throttle,
            _ => rc.throttle_mid,
        };
        let min = rc.throttle_idle.saturating_add(rc.alt_hold_deadband).saturating_add(10);
        let max = rc.throttle_max.saturating_sub(rc.alt_hold_deadband).saturating_sub(10);
        self.throttle_rc_zero = rc_zero.min(max).max(min);

        if throttle_is_low && snapshot.estimate.pos.z.abs() <= TAKEOFF_ALTITUDE {
            debug!("Altitude controller preparing for takeoff");
            self.prepare_for_takeoff = true;
        }
    }

    /// Bump-less re-initialisation from the current estimate
    pub fn reset(&mut self, snapshot: &Snapshot, ctx: &mut ControllerContext) {
        self.vel_pid.reset();
        self.surface_pid.reset_integral_term();
        self.climb_rate = 0.0;
        self.vel_z_control_ratio = 1.0;

        let general = self.config.general;
        if snapshot.mode.uses_auto_limits() {
            let climb_rate = general.max_auto_climb_rate as f32;
            let accel = general.max_auto_acceleration as f32;
            self.set_max_speed_accel_z(climb_rate, climb_rate, accel);
        } else {
            let climb_rate = general.max_manual_climb_rate as f32;
            let accel = general.max_manual_acceleration as f32;
            self.set_max_speed_accel_z(climb_rate, climb_rate, accel);
        }

        let state = &self.state;
        let (kp, _, _, _) = self.config.pids.pos_z.gains();
        self.pos_controller =
            SqrtController::new(kp, state.vel_max_down, state.vel_max_up, state.accel_max);

        let hover = snapshot.battery.hover_throttle;
        ctx.rc_adjustment.throttle = hover;
        ctx.desired.vel.z = snapshot.estimate.vel.z;

        self.seed_from_estimate(snapshot);
        self.state.pos_offset_target = 0.0;
        self.limit = 0.0;
    }

    fn seed_from_estimate(&mut self, snapshot: &Snapshot) {
        let estimate = &snapshot.estimate;
        let state = &mut self.state;
        state.pos_target = estimate.pos.z;
        state.vel_desired = estimate.vel.z;
        state.vel_target = estimate.vel.z;
        state.accel_desired = estimate.accel_z.clamp(-state.accel_max, state.accel_max);
        state.accel_target = state.accel_desired;
        state.pos_offset = 0.0;
        state.vel_offset = 0.0;
        state.accel_offset = 0.0;

        self.throttle_filter.reset(0.0);
        self.vel_pid.reset_filters();
        self.vel_pid.integrator = 0.0;
        self.accel_pid.reset();

        // output of the acceleration PID starts at the current throttle
        let stick = snapshot.sticks.throttle as f32;
        let hover = snapshot.battery.hover_throttle as f32;
        let expected_p = self.accel_pid.kp * (state.accel_target - estimate.accel_z);
        self.accel_pid.integrator = (stick - hover) - expected_p;
    }

    /// Re-seeds from the estimate and decays the throttle integrator towards idle
    fn relax(&mut self, snapshot: &Snapshot, dt: f32) {
        self.seed_from_estimate(snapshot);
        self.state.pos_offset_target = 0.0;
        let idle = self.config.rc.throttle_idle as f32;
        let hover = snapshot.battery.hover_throttle as f32;
        self.accel_pid.relax_integrator(idle - hover, dt, INTEGRAL_RELAX_TC);
    }

    fn overspeed_gain(&self) -> f32 {
        let state = &self.state;
        if state.vel_desired < state.vel_max_down && state.vel_max_down != 0.0 {
            return OVERSPEED_GAIN_Z * state.vel_desired / state.vel_max_down;
        }
        if state.vel_desired > state.vel_max_up && state.vel_max_up != 0.0 {
            return OVERSPEED_GAIN_Z * state.vel_desired / state.vel_max_up;
        }
        1.0
    }

    /// Advances the shaped trajectory towards `climb_rate`
    fn input_vel_z(&mut self, climb_rate: f32, dt: f32) {
        let gain = self.overspeed_gain();
        let pos_error = self.pos_controller.error;
        let vel_error = self.vel_pid.error;
        let state = &mut self.state;
        let accel_max = state.accel_max * gain;
        let limits = ShapingLimits {
            vel_min: state.vel_max_down,
            vel_max: state.vel_max_up,
            accel_min: -accel_max.clamp(0.0, MAX_DOWNWARD_ACCELERATION),
            accel_max,
            jerk_max: state.jerk_max * gain,
        };

        let (pos, vel) = update_pos_vel_accel(
            state.pos_target,
            state.vel_desired,
            state.accel_desired,
            dt,
            self.limit,
            pos_error,
            vel_error,
        );
        state.pos_target = pos;
        state.vel_desired = vel;
        state.accel_desired = self.shaper.shape_vel_accel(
            climb_rate,
            0.0,
            state.vel_desired,
            state.accel_desired,
            &limits,
            dt,
            true,
        );
    }

    fn update_pos_offset_z(&mut self, dt: f32) {
        let pos_error = self.pos_controller.error;
        let vel_error = self.vel_pid.error;
        let state = &mut self.state;
        let (pos, vel) = update_pos_vel_accel(
            state.pos_offset,
            state.vel_offset,
            state.accel_offset,
            dt,
            self.limit.min(0.0),
            pos_error,
            vel_error,
        );
        state.pos_offset = pos;
        state.vel_offset = vel;

        let limits = ShapingLimits {
            vel_min: state.vel_max_down,
            vel_max: state.vel_max_up,
            accel_min: -state.accel_max,
            accel_max: state.accel_max,
            jerk_max: state.jerk_max,
        };
        state.accel_offset = self.offset_shaper.shape_pos_vel_accel(
            state.pos_offset_target,
            0.0,
            0.0,
            state.pos_offset,
            state.vel_offset,
            state.accel_offset,
            &limits,
            dt,
            false,
        );
    }

    /// Climb rate shaping in a flat earth frame, terrain offsets re-added afterwards
    fn shape_climb_rate(&mut self, climb_rate: f32, dt: f32) {
        let state = &mut self.state;
        state.pos_target -= state.pos_offset;
        state.vel_desired -= state.vel_offset;
        state.accel_desired -= state.accel_offset;

        self.input_vel_z(climb_rate, dt);
        self.update_pos_offset_z(dt);

        let state = &mut self.state;
        state.pos_target += state.pos_offset;
        state.vel_desired += state.vel_offset;
        state.accel_desired += state.accel_offset;
    }

    /// One step of the cascade with `dt` seconds since the previous vertical estimate
    pub(crate) fn update(&mut self, snapshot: &Snapshot, ctx: &mut ControllerContext, dt: f32) {
        let estimate = &snapshot.estimate;
        let mut climb_rate = self.climb_rate;
        if self.prepare_for_takeoff {
            self.relax(snapshot, dt);
            climb_rate = -(self.config.general.max_manual_climb_rate as f32);
            self.prepare_for_takeoff = false;
        }
        self.shape_climb_rate(climb_rate, dt);

        let state = &mut self.state;
        let mode = Mode::PositionToVelocityZ;
        let vel_correction = self.pos_controller.apply(state.pos_target, estimate.pos.z, mode, dt);
        let general = &self.config.general;
        let vel_max = match ctx.flags.adjusting_altitude {
            true => general.max_manual_climb_rate as f32,
            false => general.max_auto_climb_rate as f32,
        };
        state.vel_target = (vel_correction + state.vel_desired).clamp(-vel_max, vel_max);
        ctx.desired.pos.z = state.pos_target;
        ctx.desired.vel.z = state.vel_target;

        let rc = &self.config.rc;
        let hover = snapshot.battery.hover_throttle as f32;
        let correction_min = rc.throttle_idle as f32 - hover;
        let correction_max = rc.throttle_max as f32 - hover;
        let vel_z = estimate.vel.z;
        let accel = self.vel_pid.apply(
            state.vel_target,
            vel_z,
            dt,
            correction_min,
            correction_max,
            Integrator::Free,
        );
        state.accel_target = accel + state.accel_desired;

        let imax = THROTTLE_CORRECTION_IMAX.max(correction_max);
        let output = self.accel_pid.apply(
            state.accel_target,
            estimate.accel_z,
            dt,
            correction_min,
            imax,
            Integrator::Limited,
        );
        self.limit = if output >= correction_max {
            1.0
        } else if output <= correction_min {
            -1.0
        } else {
            0.0
        };

        let filtered = self.throttle_filter.filter(output, THROTTLE_CUTOFF_FREQUENCY, dt);
        let correction = constrain(libm::roundf(filtered), correction_min, correction_max);
        let (idle, max) = (rc.throttle_idle as f32, rc.throttle_max as f32);

        if state.vel_max_down != 0.0 {
            let error_ratio = self.vel_pid.error / state.vel_max_down;
            let ratio = self.vel_z_control_ratio + dt * 0.1 * (0.5 - error_ratio);
            self.vel_z_control_ratio = constrain(ratio, 0.0, 1.0);
        }
        let throttle = match snapshot.mode.landing && !ctx.flags.landing_detected {
            true => (1.0 - self.vel_z_control_ratio) * idle + self.vel_z_control_ratio * max,
            false => correction + hover,
        };
        let throttle = constrain(throttle, idle, max);
        ctx.rc_adjustment.throttle = throttle as u16;
        ctx.telemetry.desired_velocity[Z] = saturate_i16(ctx.desired.vel.z);
    }

    pub fn apply(
        &mut self,
        snapshot: &Snapshot,
        ctx: &mut ControllerContext,
        command: &mut RcCommand,
    ) {
        if ctx.flags.vertical_data_new {
            match self.timer.update(snapshot.now) {
                Some(dt) => self.update(snapshot, ctx, dt),
                None => {
                    debug!("Vertical estimate stale, resetting altitude controller");
                    self.reset(snapshot, ctx);
                }
            }
            ctx.flags.vertical_data_consumed = true;
        }

        command.throttle = ctx.rc_adjustment.throttle;
        self.adjusted_throttle = command.throttle;
    }
}

mod test {
    #[cfg(test)]
    fn hover_snapshot() -> crate::types::Snapshot {
        use nalgebra::Vector3;

        use crate::types::{EstimatedState, Snapshot};

        let mut snapshot = Snapshot::default();
        snapshot.estimate = EstimatedState::new(Vector3::zeros(), Vector3::zeros(), 0);
        snapshot.battery.hover_throttle = 1500;
        snapshot.sticks.throttle = 1500;
        snapshot
    }

    #[test]
    fn test_limits() {
        use super::AltitudeController;
        use crate::config::Config;
        use crate::navigation::ControllerContext;

        let mut controller = AltitudeController::new(&Config::default());
        let mut snapshot = hover_snapshot();
        let mut ctx = ControllerContext::default();
        controller.reset(&snapshot, &mut ctx);
        let state = controller.state();
        assert_eq!(state.vel_max_down, -200.0);
        assert_eq!(state.vel_max_up, 200.0);
        assert_eq!(state.accel_max, 250.0);
        assert_eq!(state.jerk_max, 500.0);

        snapshot.mode.rth = true;
        controller.reset(&snapshot, &mut ctx);
        let state = controller.state();
        assert_eq!(state.vel_max_down, -500.0);
        assert_eq!(state.vel_max_up, 500.0);
    }

    #[test]
    fn test_reset_idempotent() {
        use nalgebra::Vector3;

        use super::AltitudeController;
        use crate::config::Config;
        use crate::navigation::ControllerContext;

        let mut controller = AltitudeController::new(&Config::default());
        let mut snapshot = hover_snapshot();
        snapshot.estimate.pos = Vector3::new(0.0, 0.0, 1234.0);
        snapshot.estimate.vel = Vector3::new(0.0, 0.0, -80.0);
        snapshot.estimate.accel_z = 400.0;
        snapshot.sticks.throttle = 1420;
        let mut ctx = ControllerContext::default();
        controller.reset(&snapshot, &mut ctx);
        let first = controller.state();
        controller.reset(&snapshot, &mut ctx);
        assert_eq!(controller.state(), first);

        assert_eq!(first.pos_target, 1234.0);
        assert_eq!(first.vel_desired, -80.0);
        // measured acceleration is bounded by the acceleration limit
        assert_eq!(first.accel_desired, 250.0);
        assert_eq!(first.accel_integrator, (1420.0 - 1500.0) - 0.5 * (250.0 - 400.0));
        assert_eq!(ctx.rc_adjustment.throttle, 1500);
    }

    #[test]
    fn test_setup_throttle_zero() {
        use super::AltitudeController;
        use crate::config::{Config, ThrottleType};

        let mut config = Config::default();
        let mut snapshot = hover_snapshot();
        let mut controller = AltitudeController::new(&config);
        snapshot.sticks.throttle = 1600;
        controller.setup(&snapshot);
        assert_eq!(controller.throttle_rc_zero(), 1600);
        assert!(!controller.is_preparing_for_takeoff());

        snapshot.sticks.throttle = 1840;
        controller.setup(&snapshot);
        assert_eq!(controller.throttle_rc_zero(), 1850 - 50 - 10);

        snapshot.sticks.throttle = 1000;
        controller.setup(&snapshot);
        assert_eq!(controller.throttle_rc_zero(), 1500);
        assert!(controller.is_preparing_for_takeoff());

        config.mc.althold_throttle_type = ThrottleType::Hover;
        let mut controller = AltitudeController::new(&config);
        snapshot.battery.hover_throttle = 1450;
        snapshot.sticks.throttle = 1700;
        controller.setup(&snapshot);
        assert_eq!(controller.throttle_rc_zero(), 1450);

        // deadband wider than the throttle range
        config.rc.alt_hold_deadband = 65000;
        let mut controller = AltitudeController::new(&config);
        controller.setup(&snapshot);
        assert_eq!(controller.throttle_rc_zero(), u16::MAX);
    }

    #[test]
    fn test_target_climb_rate() {
        use nalgebra::Vector3;

        use super::{AltitudeController, ClimbRateCommand};
        use crate::config::Config;
        use crate::types::EstimatedState;

        let mut controller = AltitudeController::new(&Config::default());
        let command = ClimbRateCommand::Target { rate: -500.0, altitude: 500.0 };
        let high = EstimatedState::new(Vector3::new(0.0, 0.0, 5000.0), Vector3::zeros(), 0);
        controller.set_climb_rate(command, &high);
        assert_eq!(controller.climb_rate(), -500.0);
        let low = EstimatedState::new(Vector3::new(0.0, 0.0, 400.0), Vector3::zeros(), 0);
        controller.set_climb_rate(command, &low);
        assert_eq!(controller.climb_rate(), -100.0);
        let middle = EstimatedState::new(Vector3::new(0.0, 0.0, 1750.0), Vector3::zeros(), 0);
        controller.set_climb_rate(command, &middle);
        assert!((controller.climb_rate() + 300.0).abs() < 1e-3);

        controller.set_climb_rate(ClimbRateCommand::Constant(120.0), &low);
        assert_eq!(controller.climb_rate(), 120.0);
        controller.set_climb_rate(ClimbRateCommand::Reset, &low);
        assert_eq!(controller.climb_rate(), 0.0);
    }

    #[test]
    fn test_stale_data_resets() {
        use fugit::MicrosDurationU64 as Duration;
        use nalgebra::Vector3;

        use super::AltitudeController;
        use crate::config::Config;
        use crate::navigation::ControllerContext;
        use crate::types::RcCommand;

        let mut controller = AltitudeController::new(&Config::default());
        let mut snapshot = hover_snapshot();
        let mut ctx = ControllerContext::default();
        let mut command = RcCommand::default();

        ctx.flags.vertical_data_new = true;
        controller.apply(&snapshot, &mut ctx, &mut command);
        assert!(ctx.flags.vertical_data_consumed);
        assert_eq!(command.throttle, 1500);
        assert_eq!(controller.adjusted_throttle(), 1500);

        snapshot.now = Duration::millis(500);
        snapshot.estimate.pos = Vector3::new(0.0, 0.0, 300.0);
        controller.apply(&snapshot, &mut ctx, &mut command);
        assert_eq!(controller.state().pos_target, 300.0);
    }

    #[test]
    fn test_climb_follows_command() {
        use fugit::MicrosDurationU64 as Duration;

        use super::{AltitudeController, ClimbRateCommand};
        use crate::config::Config;
        use crate::navigation::ControllerContext;
        use crate::types::RcCommand;

        let mut controller = AltitudeController::new(&Config::default());
        let mut snapshot = hover_snapshot();
        let mut ctx = ControllerContext::default();
        let mut command = RcCommand::default();
        ctx.flags.vertical_data_new = true;
        controller.apply(&snapshot, &mut ctx, &mut command);

        controller.set_climb_rate(ClimbRateCommand::Constant(150.0), &snapshot.estimate);
        let mut previous = controller.state().pos_target;
        for i in 1..=100 {
            snapshot.now = Duration::millis(i * 10);
            controller.apply(&snapshot, &mut ctx, &mut command);
            let state = controller.state();
            assert!(state.pos_target >= previous);
            previous = state.pos_target;
        }
        // craft does not move, so the throttle rises above hover
        assert!(command.throttle > 1500);
        assert!(ctx.desired.vel.z > 0.0);
        assert!(ctx.telemetry.desired_velocity[2] > 0);
    }

    #[test]
    fn test_landing_control_ratio() {
        use fugit::MicrosDurationU64 as Duration;
        use nalgebra::Vector3;

        use super::AltitudeController;
        use crate::config::Config;
        use crate::navigation::ControllerContext;
        use crate::types::RcCommand;

        let mut controller = AltitudeController::new(&Config::default());
        let mut snapshot = hover_snapshot();
        snapshot.mode.landing = true;
        let mut ctx = ControllerContext::default();
        let mut command = RcCommand::default();
        ctx.flags.vertical_data_new = true;
        controller.apply(&snapshot, &mut ctx, &mut command);

        // vertical axis under control, the blend sits at maximum throttle
        snapshot.now = Duration::millis(10);
        controller.apply(&snapshot, &mut ctx, &mut command);
        assert_eq!(controller.vel_z_control_ratio(), 1.0);
        assert_eq!(command.throttle, 1850);

        // climbing away from the target erodes the confidence
        snapshot.estimate.set_velocity(Vector3::new(0.0, 0.0, 300.0));
        for i in 2..=101 {
            snapshot.now = Duration::millis(i * 10);
            controller.apply(&snapshot, &mut ctx, &mut command);
        }
        let ratio = controller.vel_z_control_ratio();
        assert!(ratio > 0.85 && ratio < 0.95);
        assert!(command.throttle < 1850 && command.throttle > 1700);

        let mut controller = AltitudeController::new(&Config::default());
        let mut snapshot = hover_snapshot();
        snapshot.mode.landing = true;
        ctx.flags.landing_detected = true;
        controller.apply(&snapshot, &mut ctx, &mut command);
        snapshot.now = Duration::millis(10);
        controller.apply(&snapshot, &mut ctx, &mut command);
        assert_eq!(command.throttle, 1500);
    }

    #[test]
    fn test_terrain_offset_follows_surface() {
        use fugit::MicrosDurationU64 as Duration;

        use super::AltitudeController;
        use crate::config::Config;
        use crate::navigation::ControllerContext;
        use crate::types::RcCommand;

        let mut controller = AltitudeController::new(&Config::default());
        let mut snapshot = hover_snapshot();
        snapshot.estimate.agl.z = 100.0;
        let mut ctx = ControllerContext::default();
        let mut command = RcCommand::default();
        ctx.flags.vertical_data_new = true;
        controller.apply(&snapshot, &mut ctx, &mut command);

        controller.track_surface(200.0, &snapshot.estimate);
        let target = controller.state().pos_offset_target;
        assert!((target - 51.0).abs() < 1e-3);

        for i in 1..=300 {
            snapshot.now = Duration::millis(i * 10);
            controller.apply(&snapshot, &mut ctx, &mut command);
        }
        let state = controller.state();
        assert_eq!(state.pos_offset_target, target);
        assert!(state.pos_offset > 25.0 && state.pos_offset < target * 1.2);
        // flat trajectory holds still, the offset carries the target
        assert!((state.pos_target - state.pos_offset).abs() < 1e-3);
        assert_eq!(ctx.desired.pos.z, state.pos_target);
    }

    #[test]
    fn test_prepare_for_takeoff() {
        use fugit::MicrosDurationU64 as Duration;

        use super::AltitudeController;
        use crate::config::Config;
        use crate::navigation::ControllerContext;
        use crate::types::RcCommand;

        let mut controller = AltitudeController::new(&Config::default());
        let mut snapshot = hover_snapshot();
        snapshot.sticks.throttle = 1000;
        let mut ctx = ControllerContext::default();
        let mut command = RcCommand::default();
        controller.setup(&snapshot);
        assert!(controller.is_preparing_for_takeoff());

        ctx.flags.vertical_data_new = true;
        controller.apply(&snapshot, &mut ctx, &mut command);
        assert!(controller.is_preparing_for_takeoff());

        snapshot.now = Duration::millis(10);
        controller.apply(&snapshot, &mut ctx, &mut command);
        assert!(!controller.is_preparing_for_takeoff());
        let state = controller.state();
        // one cycle shaped towards the maximum descent rate
        assert!(state.accel_desired < 0.0);
        // integrator pulled towards idle and held at the correction floor
        assert!((state.accel_integrator - (1150.0 - 1500.0)).abs() < 1.0);
        assert!(command.throttle < 1500);
    }
}
