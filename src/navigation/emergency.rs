use super::{
    altitude::{AltitudeController, ClimbRateCommand},
    position::PositionController,
    ControllerContext, UpdateTimer,
};
use crate::{
    algorithm::constrain,
    config::{Config, FailsafeProcedure},
    types::{Quality, RcCommand, Snapshot},
};

/// Altitude at which the descent slows down to the minimum rate, cm
const SLOWDOWN_ALTITUDE: f32 = 500.0;

/// Level descent at the emergency rate, holding position when possible
pub struct EmergencyController {
    config: Config,
    timer: UpdateTimer,
    blind: bool,
}

impl EmergencyController {
    pub fn new(config: &Config) -> Self {
        Self { config: *config, timer: UpdateTimer::default(), blind: false }
    }

    /// Throttle used while no altitude estimate is available, µs
    fn blind_throttle(&self, snapshot: &Snapshot) -> u16 {
        let rc = &self.config.rc;
        match self.config.failsafe.procedure {
            FailsafeProcedure::Drop => rc.throttle_idle,
            FailsafeProcedure::Land => {
                snapshot.battery.failsafe_throttle.min(rc.throttle_max).max(rc.throttle_idle)
            }
        }
    }

    pub fn apply(
        &mut self,
        snapshot: &Snapshot,
        ctx: &mut ControllerContext,
        altitude: &mut AltitudeController,
        position: &mut PositionController,
        command: &mut RcCommand,
    ) {
        command.yaw = 0;
        command.roll = 0;
        command.pitch = 0;

        let estimate = &snapshot.estimate;
        if estimate.alt_status < Quality::Usable {
            if !self.blind {
                warn!("Emergency landing without altitude estimate");
                self.blind = true;
            }
            command.throttle = self.blind_throttle(snapshot);
            altitude.set_adjusted_throttle(command.throttle);
            return;
        }
        self.blind = false;

        if ctx.flags.vertical_data_new {
            match self.timer.update(snapshot.now) {
                Some(dt) => {
                    let rate = -(self.config.general.emerg_descent_rate as f32);
                    let target = ClimbRateCommand::Target { rate, altitude: SLOWDOWN_ALTITUDE };
                    altitude.set_climb_rate(target, estimate);
                    altitude.update(snapshot, ctx, dt);
                }
                None => {
                    debug!("Vertical estimate stale, resetting altitude controller");
                    altitude.reset(snapshot, ctx);
                }
            }
            ctx.flags.vertical_data_consumed = true;
        }

        let (idle, max) = (self.config.rc.throttle_idle as f32, self.config.rc.throttle_max as f32);
        command.throttle = constrain(ctx.rc_adjustment.throttle as f32, idle, max) as u16;
        altitude.set_adjusted_throttle(command.throttle);

        if estimate.pos_status >= Quality::Usable {
            position.apply(snapshot, ctx, command);
        }
    }
}

mod test {
    #[test]
    fn test_blind_throttle() {
        use super::EmergencyController;
        use crate::config::{Config, FailsafeProcedure};
        use crate::navigation::{
            altitude::AltitudeController, position::PositionController, ControllerContext,
        };
        use crate::types::{Quality, RcCommand, Snapshot};

        let mut config = Config::default();
        let mut snapshot = Snapshot::default();
        snapshot.estimate.alt_status = Quality::None;
        snapshot.battery.failsafe_throttle = 1000;
        let mut ctx = ControllerContext::default();
        let mut altitude = AltitudeController::new(&config);
        let mut position = PositionController::new(&config);
        let mut command = RcCommand { roll: 100, pitch: -100, yaw: 50, throttle: 1700 };

        let mut emergency = EmergencyController::new(&config);
        emergency.apply(&snapshot, &mut ctx, &mut altitude, &mut position, &mut command);
        assert_eq!(command, RcCommand { roll: 0, pitch: 0, yaw: 0, throttle: 1150 });
        assert_eq!(altitude.adjusted_throttle(), 1150);

        snapshot.battery.failsafe_throttle = 1300;
        emergency.apply(&snapshot, &mut ctx, &mut altitude, &mut position, &mut command);
        assert_eq!(command.throttle, 1300);

        config.failsafe.procedure = FailsafeProcedure::Drop;
        let mut emergency = EmergencyController::new(&config);
        emergency.apply(&snapshot, &mut ctx, &mut altitude, &mut position, &mut command);
        assert_eq!(command.throttle, 1150);
    }

    #[test]
    fn test_controlled_descent() {
        use fugit::MicrosDurationU64 as Duration;
        use nalgebra::Vector3;

        use super::EmergencyController;
        use crate::config::Config;
        use crate::navigation::{
            altitude::AltitudeController, position::PositionController, ControllerContext,
        };
        use crate::types::{EstimatedState, RcCommand, Snapshot};

        let config = Config::default();
        let mut snapshot = Snapshot::default();
        let pos = Vector3::new(0.0, 0.0, 3000.0);
        snapshot.estimate = EstimatedState::new(pos, Vector3::zeros(), 0);
        snapshot.sticks.throttle = 1500;
        let mut ctx = ControllerContext::default();
        let mut altitude = AltitudeController::new(&config);
        let mut position = PositionController::new(&config);
        let mut emergency = EmergencyController::new(&config);
        let mut command = RcCommand { roll: 100, pitch: -100, yaw: 50, throttle: 1500 };

        ctx.flags.vertical_data_new = true;
        ctx.flags.horizontal_data_new = true;
        for i in 0..50 {
            snapshot.now = Duration::millis(i * 10);
            emergency.apply(&snapshot, &mut ctx, &mut altitude, &mut position, &mut command);
        }
        assert!(ctx.flags.vertical_data_consumed);
        assert!(ctx.flags.horizontal_data_consumed);
        assert_eq!(altitude.climb_rate(), -500.0);
        // craft does not descend, so the throttle drops below hover
        assert!(command.throttle < 1500);
        assert_eq!(altitude.adjusted_throttle(), command.throttle);
        assert_eq!(command.yaw, 0);
        assert_eq!((command.roll, command.pitch), (0, 0));
    }
}
