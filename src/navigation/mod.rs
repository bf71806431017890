pub mod altitude;
pub mod braking;
pub mod emergency;
pub mod heading;
pub mod landing;
pub mod out;
pub mod pid;
pub mod position;
pub mod rc;

use fugit::MicrosDurationU64 as Duration;
use serde::Serialize;

use crate::{
    config::Config,
    types::{DesiredState, RcAdjustment, RcCommand, Snapshot},
};

use altitude::{AltitudeController, ClimbRateCommand};
use braking::BrakingController;
use emergency::EmergencyController;
use heading::HeadingController;
use landing::LandingDetector;
pub use out::Telemetry;
use position::PositionController;

/// Estimates older than this reset the consuming pipeline, µs
pub const MAX_POSITION_UPDATE_INTERVAL_US: u64 = 200_000;

pub(crate) fn saturate_i16(value: f32) -> i16 {
    libm::roundf(value).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Interval between consecutive estimator updates consumed by one pipeline
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct UpdateTimer {
    previous: Option<Duration>,
}

impl UpdateTimer {
    /// Seconds since the previous update, `None` on first use or when the estimate is stale
    pub fn update(&mut self, now: Duration) -> Option<f32> {
        let previous = self.previous.replace(now)?;
        let delta = now.ticks().saturating_sub(previous.ticks());
        if delta >= MAX_POSITION_UPDATE_INTERVAL_US {
            return None;
        }
        Some(delta as f32 / 1_000_000.0)
    }
}

/// State latches, each written by exactly one component
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct Flags {
    pub braking: bool,
    pub braking_boost: bool,
    pub braking_locked: bool,
    pub landing_detected: bool,
    pub adjusting_position: bool,
    pub adjusting_altitude: bool,
    pub adjusting_heading: bool,
    pub terrain_follow: bool,
    pub reset_landing_detector: bool,
    pub vertical_data_new: bool,
    pub vertical_data_consumed: bool,
    pub horizontal_data_new: bool,
    pub horizontal_data_consumed: bool,
}

/// Course hold state
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Cruise {
    /// cm/s
    pub speed: f32,
    /// centidegrees
    pub course: i32,
    pub(crate) last_update: Option<Duration>,
}

/// State shared between the pipelines for the lifetime of a flight mode
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ControllerContext {
    pub desired: DesiredState,
    pub flags: Flags,
    pub rc_adjustment: RcAdjustment,
    pub cruise: Cruise,
    pub telemetry: Telemetry,
}

/// Pipelines requested by the flight mode logic for the current cycle
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ControlFlags {
    pub altitude: bool,
    pub position: bool,
    pub heading: bool,
    pub emergency: bool,
    /// Pilot sticks may adjust the altitude target
    pub rc_altitude: bool,
    /// Pilot sticks may adjust the position target
    pub rc_position: bool,
    /// Pilot sticks may adjust the heading target
    pub rc_heading: bool,
}

pub struct MulticopterNavigation {
    config: Config,
    ctx: ControllerContext,
    altitude: AltitudeController,
    position: PositionController,
    braking: BrakingController,
    heading: HeadingController,
    landing: LandingDetector,
    emergency: EmergencyController,
}

impl MulticopterNavigation {
    pub fn new(config: &Config) -> Self {
        Self {
            config: *config,
            ctx: ControllerContext::default(),
            altitude: AltitudeController::new(config),
            position: PositionController::new(config),
            braking: BrakingController::new(config),
            heading: HeadingController::default(),
            landing: LandingDetector::new(config),
            emergency: EmergencyController::new(config),
        }
    }

    pub fn reconfigure(&mut self, config: &Config) {
        info!("Reconfiguring multicopter navigation");
        let ctx = self.ctx;
        *self = Self::new(config);
        self.ctx = ctx;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn context(&self) -> &ControllerContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut ControllerContext {
        &mut self.ctx
    }

    pub fn altitude(&self) -> &AltitudeController {
        &self.altitude
    }

    pub fn position(&self) -> &PositionController {
        &self.position
    }

    pub fn telemetry(&self) -> Telemetry {
        self.ctx.telemetry
    }

    /// Degrees
    pub fn heading_hold_target(&self) -> i16 {
        self.heading.hold_target()
    }

    /// Signals fresh estimator output, clearing data already consumed by the pipelines
    pub fn publish_estimate(&mut self, vertical: bool, horizontal: bool) {
        let flags = &mut self.ctx.flags;
        if flags.vertical_data_consumed {
            flags.vertical_data_new = false;
            flags.vertical_data_consumed = false;
        }
        if flags.horizontal_data_consumed {
            flags.horizontal_data_new = false;
            flags.horizontal_data_consumed = false;
        }
        if vertical {
            flags.vertical_data_new = true;
        }
        if horizontal {
            flags.horizontal_data_new = true;
        }
    }

    pub fn setup_altitude(&mut self, snapshot: &Snapshot) {
        self.altitude.setup(snapshot);
    }

    pub fn reset_altitude(&mut self, snapshot: &Snapshot) {
        self.altitude.reset(snapshot, &mut self.ctx);
    }

    pub fn reset_position(&mut self) {
        self.position.reset(&mut self.ctx);
    }

    pub fn reset_heading(&mut self, snapshot: &Snapshot) {
        self.heading.reset(&snapshot.estimate);
    }

    pub fn reset_braking(&mut self) {
        self.braking.reset(&mut self.ctx.flags);
    }

    /// The next landing detection starts from scratch
    pub fn reset_landing_detector(&mut self) {
        self.ctx.flags.reset_landing_detector = true;
    }

    /// Loiter point reached when decelerating from the current velocity
    pub fn set_stop_position(&mut self, snapshot: &Snapshot) {
        self.position.set_stop_position(&snapshot.estimate, &mut self.ctx);
    }

    /// Translates pilot sticks into target adjustments
    pub fn process_rc_adjustments(&mut self, snapshot: &Snapshot, control: ControlFlags) {
        let failsafe = snapshot.mode.failsafe;
        let ctx = &mut self.ctx;
        ctx.flags.terrain_follow = snapshot.mode.terrain_follow;

        ctx.flags.adjusting_altitude = match control.rc_altitude && !failsafe {
            true => rc::adjust_altitude(&self.config, snapshot, ctx, &mut self.altitude),
            false => {
                if ctx.flags.adjusting_altitude {
                    let estimate = &snapshot.estimate;
                    self.altitude.set_climb_rate(ClimbRateCommand::Reset, estimate);
                }
                false
            }
        };

        if control.rc_position {
            let adjusting = rc::adjust_position(&self.config, snapshot, ctx, &mut self.braking);
            ctx.flags.adjusting_position = adjusting && !failsafe;
            if failsafe {
                self.braking.reset(&mut ctx.flags);
            }
        } else {
            ctx.flags.adjusting_position = false;
        }

        ctx.flags.adjusting_heading = match control.rc_heading && !failsafe {
            true => rc::adjust_heading(&self.config, snapshot, ctx),
            false => false,
        };
    }

    /// Runs one control cycle, `command` holds the pilot input on entry
    pub fn apply(&mut self, snapshot: &Snapshot, control: ControlFlags, command: &mut RcCommand) {
        self.process_rc_adjustments(snapshot, control);

        if control.emergency {
            let (altitude, position) = (&mut self.altitude, &mut self.position);
            self.emergency.apply(snapshot, &mut self.ctx, altitude, position, command);
            return;
        }

        if control.altitude {
            self.altitude.apply(snapshot, &mut self.ctx, command);
        }
        if control.position {
            self.position.apply(snapshot, &mut self.ctx, command);
        }
        if control.heading {
            self.heading.apply(snapshot, &self.ctx, command);
        }
    }

    /// Debounced touchdown detection, latches `landing_detected`
    pub fn detect_landing(&mut self, snapshot: &Snapshot) -> bool {
        let throttle = self.altitude.adjusted_throttle();
        let detected = self.landing.update(snapshot, &mut self.ctx.flags, throttle);
        if detected && !self.ctx.flags.landing_detected {
            info!("Landing detected");
        }
        self.ctx.flags.landing_detected = detected;
        detected
    }

    pub fn is_landing_detected(&self) -> bool {
        self.ctx.flags.landing_detected
    }

    pub fn is_flying(&self, snapshot: &Snapshot, throttle: u16) -> bool {
        landing::is_flying(snapshot, throttle)
    }
}

mod test {
    #[test]
    fn test_update_timer() {
        use fugit::MicrosDurationU64 as Duration;

        use super::UpdateTimer;

        let mut timer = UpdateTimer::default();
        assert_eq!(timer.update(Duration::millis(0)), None);
        assert_eq!(timer.update(Duration::millis(10)), Some(0.01));
        assert_eq!(timer.update(Duration::millis(210)), None);
        assert_eq!(timer.update(Duration::millis(220)), Some(0.01));
    }

    #[test]
    fn test_saturate_i16() {
        use super::saturate_i16;

        assert_eq!(saturate_i16(12.6), 13);
        assert_eq!(saturate_i16(-40000.0), i16::MIN);
        assert_eq!(saturate_i16(40000.0), i16::MAX);
    }

    #[test]
    fn test_publish_estimate() {
        use super::MulticopterNavigation;
        use crate::config::Config;

        let mut nav = MulticopterNavigation::new(&Config::default());
        nav.publish_estimate(true, false);
        let flags = nav.context().flags;
        assert!(flags.vertical_data_new && !flags.horizontal_data_new);

        nav.context_mut().flags.vertical_data_consumed = true;
        nav.publish_estimate(false, true);
        let flags = nav.context().flags;
        assert!(!flags.vertical_data_new && !flags.vertical_data_consumed);
        assert!(flags.horizontal_data_new);
    }

    #[test]
    fn test_climb_rate_released_without_rc_altitude() {
        use nalgebra::Vector3;

        use super::{ControlFlags, MulticopterNavigation};
        use crate::config::Config;
        use crate::types::{EstimatedState, Snapshot};

        let mut nav = MulticopterNavigation::new(&Config::default());
        let mut snapshot = Snapshot::default();
        let pos = Vector3::new(0.0, 0.0, 1000.0);
        snapshot.estimate = EstimatedState::new(pos, Vector3::zeros(), 0);
        snapshot.sticks.throttle = 1500;
        nav.setup_altitude(&snapshot);
        nav.reset_altitude(&snapshot);
        let control = ControlFlags { rc_altitude: true, ..Default::default() };

        snapshot.sticks.throttle = 1850;
        nav.process_rc_adjustments(&snapshot, control);
        assert!(nav.context().flags.adjusting_altitude);
        assert!(nav.altitude().climb_rate() > 0.0);

        // failsafe with the stick centred
        snapshot.mode.failsafe = true;
        snapshot.sticks.throttle = 1500;
        nav.process_rc_adjustments(&snapshot, control);
        assert!(!nav.context().flags.adjusting_altitude);
        assert_eq!(nav.altitude().climb_rate(), 0.0);

        snapshot.mode.failsafe = false;
        snapshot.sticks.throttle = 1850;
        nav.process_rc_adjustments(&snapshot, control);
        assert!(nav.altitude().climb_rate() > 0.0);
        nav.process_rc_adjustments(&snapshot, ControlFlags::default());
        assert_eq!(nav.altitude().climb_rate(), 0.0);

        nav.process_rc_adjustments(&snapshot, control);
        assert!(nav.altitude().climb_rate() > 0.0);
        nav.reset_altitude(&snapshot);
        assert_eq!(nav.altitude().climb_rate(), 0.0);
    }
}
