//! Cruise braking: holds the position where the pilot released the sticks at speed and
//! lets the position controller decelerate with a raised jerk and bank angle limit.

use fugit::MicrosDurationU64 as Duration;

use super::{ControllerContext, Flags};
use crate::{
    config::{Braking, Config, UserControlMode},
    types::Snapshot,
};

pub struct BrakingController {
    config: Braking,
    user_control_mode: UserControlMode,
    disengage_at: Duration,
    boost_disengage_at: Duration,
}

impl BrakingController {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.mc.braking,
            user_control_mode: config.general.user_control_mode,
            disengage_at: Duration::from_ticks(0),
            boost_disengage_at: Duration::from_ticks(0),
        }
    }

    pub fn reset(&mut self, flags: &mut Flags) {
        flags.braking = false;
        flags.braking_boost = false;
        flags.braking_locked = false;
    }

    fn latch_position(snapshot: &Snapshot, ctx: &mut ControllerContext) {
        ctx.desired.pos.x = snapshot.estimate.pos.x;
        ctx.desired.pos.y = snapshot.estimate.pos.y;
    }

    /// Advances the braking state with `adjusting` set while the pilot deflects roll or pitch
    pub fn process(&mut self, snapshot: &Snapshot, ctx: &mut ControllerContext, adjusting: bool) {
        if !snapshot.mode.nav_idle_or_hold {
            self.reset(&mut ctx.flags);
            return;
        }

        let config = &self.config;
        let now = snapshot.now;
        let vel_xy = snapshot.estimate.vel_xy;
        let threshold = config.speed_threshold as f32;
        let flags = &ctx.flags;
        if snapshot.mode.braking_armed
            && !flags.braking_locked
            && config.speed_threshold > 0
            && vel_xy > threshold
            && !adjusting
            && self.user_control_mode == UserControlMode::Cruise
        {
            Self::latch_position(snapshot, ctx);
            ctx.flags.braking_locked = true;
            ctx.flags.braking = true;
            self.disengage_at = now + Duration::millis(config.timeout as u64);
            debug!("Braking engaged at {} cm/s", vel_xy);

            if vel_xy > config.boost_speed_threshold as f32 {
                ctx.flags.braking_boost = true;
                self.boost_disengage_at = now + Duration::millis(config.boost_timeout as u64);
                debug!("Braking boost engaged");
            }
        }

        let flags = &mut ctx.flags;
        if flags.braking_locked && adjusting {
            flags.braking_locked = false;
        }

        let boost_expired = self.boost_disengage_at < now;
        if flags.braking_boost
            && (vel_xy <= config.boost_disengage_speed as f32 || boost_expired)
        {
            flags.braking_boost = false;
            debug!("Braking boost disengaged");
        }

        let expired = self.disengage_at < now;
        if flags.braking && (vel_xy <= config.disengage_speed as f32 || adjusting || expired) {
            flags.braking = false;
            flags.braking_boost = false;
            Self::latch_position(snapshot, ctx);
            debug!("Braking disengaged");
        }
    }
}

mod test {
    #[cfg(test)]
    fn cruise_config() -> crate::config::Config {
        use crate::config::{Config, UserControlMode};

        let mut config = Config::default();
        config.general.user_control_mode = UserControlMode::Cruise;
        config
    }

    #[cfg(test)]
    fn moving_snapshot(speed: f32) -> crate::types::Snapshot {
        use nalgebra::Vector3;

        use crate::types::{EstimatedState, Snapshot};

        let mut snapshot = Snapshot::default();
        let vel = Vector3::new(speed, 0.0, 0.0);
        snapshot.estimate = EstimatedState::new(Vector3::new(100.0, 200.0, 0.0), vel, 0);
        snapshot.mode.braking_armed = true;
        snapshot.mode.nav_idle_or_hold = true;
        snapshot
    }

    #[test]
    fn test_engage_with_boost() {
        use super::BrakingController;
        use crate::navigation::ControllerContext;

        let mut braking = BrakingController::new(&cruise_config());
        let snapshot = moving_snapshot(300.0);
        let mut ctx = ControllerContext::default();
        braking.process(&snapshot, &mut ctx, false);
        let flags = ctx.flags;
        assert!(flags.braking && flags.braking_boost && flags.braking_locked);
        assert_eq!((ctx.desired.pos.x, ctx.desired.pos.y), (100.0, 200.0));
    }

    #[test]
    fn test_not_engaged() {
        use super::BrakingController;
        use crate::navigation::ControllerContext;

        // attitude passthrough mode
        let mut braking = BrakingController::new(&crate::config::Config::default());
        let mut ctx = ControllerContext::default();
        braking.process(&moving_snapshot(300.0), &mut ctx, false);
        assert!(!ctx.flags.braking);

        let mut config = cruise_config();
        config.mc.braking.speed_threshold = 0;
        let mut braking = BrakingController::new(&config);
        braking.process(&moving_snapshot(300.0), &mut ctx, false);
        assert!(!ctx.flags.braking);

        let mut braking = BrakingController::new(&cruise_config());
        braking.process(&moving_snapshot(80.0), &mut ctx, false);
        assert!(!ctx.flags.braking);
        braking.process(&moving_snapshot(300.0), &mut ctx, true);
        assert!(!ctx.flags.braking);
    }

    #[test]
    fn test_disengage() {
        use fugit::MicrosDurationU64 as Duration;

        use super::BrakingController;
        use crate::navigation::ControllerContext;

        let mut braking = BrakingController::new(&cruise_config());
        let mut snapshot = moving_snapshot(300.0);
        let mut ctx = ControllerContext::default();
        braking.process(&snapshot, &mut ctx, false);

        // boost ends below its disengage speed, braking continues
        snapshot.now = Duration::millis(100);
        snapshot.estimate.set_velocity(nalgebra::Vector3::new(90.0, 0.0, 0.0));
        snapshot.estimate.pos.x = 150.0;
        braking.process(&snapshot, &mut ctx, false);
        assert!(ctx.flags.braking && !ctx.flags.braking_boost);
        assert_eq!(ctx.desired.pos.x, 100.0);

        // braking ends below its disengage speed and re-latches the position
        snapshot.now = Duration::millis(200);
        snapshot.estimate.set_velocity(nalgebra::Vector3::new(70.0, 0.0, 0.0));
        snapshot.estimate.pos.x = 160.0;
        braking.process(&snapshot, &mut ctx, false);
        assert!(!ctx.flags.braking);
        assert!(ctx.flags.braking_locked);
        assert_eq!(ctx.desired.pos.x, 160.0);

        // locked until the pilot moves the sticks again
        snapshot.estimate.set_velocity(nalgebra::Vector3::new(300.0, 0.0, 0.0));
        braking.process(&snapshot, &mut ctx, false);
        assert!(!ctx.flags.braking);
        braking.process(&snapshot, &mut ctx, true);
        assert!(!ctx.flags.braking_locked);
    }

    #[test]
    fn test_timeout() {
        use fugit::MicrosDurationU64 as Duration;

        use super::BrakingController;
        use crate::navigation::ControllerContext;

        let mut braking = BrakingController::new(&cruise_config());
        let mut snapshot = moving_snapshot(300.0);
        let mut ctx = ControllerContext::default();
        braking.process(&snapshot, &mut ctx, false);

        snapshot.now = Duration::millis(751);
        braking.process(&snapshot, &mut ctx, false);
        assert!(ctx.flags.braking && !ctx.flags.braking_boost);

        snapshot.now = Duration::millis(2001);
        braking.process(&snapshot, &mut ctx, false);
        assert!(!ctx.flags.braking);
    }

    #[test]
    fn test_reset_outside_hold() {
        use super::BrakingController;
        use crate::navigation::ControllerContext;

        let mut braking = BrakingController::new(&cruise_config());
        let mut snapshot = moving_snapshot(300.0);
        let mut ctx = ControllerContext::default();
        braking.process(&snapshot, &mut ctx, false);
        snapshot.mode.nav_idle_or_hold = false;
        braking.process(&snapshot, &mut ctx, false);
        let flags = ctx.flags;
        assert!(!flags.braking && !flags.braking_boost && !flags.braking_locked);
    }
}
