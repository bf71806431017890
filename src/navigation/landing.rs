//! Touchdown detection from low velocities, low body rates and a dropping throttle, debounced
//! over a safety delay. An optional G-bump detector flags hard touchdowns immediately.

use fugit::MicrosDurationU64 as Duration;

use super::Flags;
use crate::{
    config::Config,
    types::{Quality, Snapshot},
};

#[cfg(not(any(test, feature = "std")))]
#[allow(unused_imports)]
use micromath::F32Ext;

/// cm/s
const CHECK_VEL_XY_MOVING: f32 = 100.0;
/// cm/s
const CHECK_VEL_Z_MOVING: f32 = 100.0;
/// deg/s
const CHECK_GYRO_MOVING: f32 = 4.0;
/// Body rate above which the craft is considered airborne, deg/s
const FLYING_GYRO_RATE: f32 = 7.0;
/// ms
const THROTTLE_STABILISE_DELAY: u64 = 1000;
/// Drop below the average descent throttle at touchdown, µs
const DESCEND_THROTTLE: i32 = 40;
/// cm
const SAFE_SURFACE: f32 = 5.0;
/// ms
const SAFETY_DELAY: u64 = 1000;
/// Used when the altitude estimate is unavailable, ms
const SAFETY_DELAY_WITHOUT_ALTITUDE: u64 = 5000;
/// ms
const G_BUMP_WINDOW: u64 = 100;

pub fn is_flying(snapshot: &Snapshot, throttle: u16) -> bool {
    throttle > snapshot.battery.hover_throttle && snapshot.sensors.gyro_rate > FLYING_GYRO_RATE
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LandingDetector {
    config: Config,
    started_at: Option<Duration>,
    throttle_sum: i32,
    throttle_samples: i32,
    /// Last barometric climb rate, cm/s
    baro_rate: f32,
    spike_at: Option<Duration>,
}

impl LandingDetector {
    pub fn new(config: &Config) -> Self {
        Self {
            config: *config,
            started_at: None,
            throttle_sum: 0,
            throttle_samples: 0,
            baro_rate: 0.0,
            spike_at: None,
        }
    }

    pub fn baro_rate(&self) -> f32 {
        self.baro_rate
    }

    fn g_bump_detected(&mut self, snapshot: &Snapshot, throttle: u16) -> bool {
        let now = snapshot.now;
        let accel_z = snapshot.sensors.accel_z;
        let spike_at = match self.spike_at {
            None => {
                if accel_z > 2.0 && self.baro_rate < 0.0 {
                    trace!("G spike at touchdown candidate");
                    self.spike_at = Some(now);
                }
                return false;
            }
            Some(spike_at) => spike_at,
        };

        if now < spike_at + Duration::millis(G_BUMP_WINDOW) {
            if accel_z < 1.0 && self.baro_rate < -200.0 {
                let idle = self.config.rc.throttle_idle as f32;
                let hover = snapshot.battery.hover_throttle as f32;
                let ratio = if snapshot.mode.automatic_throttle { 0.8 } else { 0.5 };
                return (throttle as f32) < idle + ratio * (hover - idle);
            }
        } else if accel_z <= 1.0 {
            self.spike_at = None;
        }
        false
    }

    fn start_condition(&self, snapshot: &Snapshot) -> bool {
        let mode = &snapshot.mode;
        let stick = snapshot.sticks.throttle as f32;
        let idle = self.config.rc.throttle_idle as f32;
        let below_mid_hover = stick < 0.5 * (snapshot.battery.hover_throttle as f32 + idle);
        let stick_is_low = self.config.rc.throttle_stick_is_low(snapshot.sticks.throttle);
        mode.landing
            || mode.emergency_landing
            || (mode.failsafe && !mode.wp_mode && below_mid_hover)
            || (!mode.autonomous && stick_is_low)
    }

    /// Runs one detection step, `adjusted_throttle` is the throttle written by the altitude
    /// controller
    pub fn update(
        &mut self,
        snapshot: &Snapshot,
        flags: &mut Flags,
        adjusted_throttle: u16,
    ) -> bool {
        if let Some(rate) = snapshot.sensors.baro_rate {
            self.baro_rate = rate;
        }

        let general = self.config.general;
        if snapshot.sensors.has_baro && general.landing_bump_detection {
            let throttle = match snapshot.mode.automatic_throttle {
                true => adjusted_throttle,
                false => snapshot.sticks.throttle,
            };
            if self.g_bump_detected(snapshot, throttle) {
                debug!("Landing G-bump detected");
                return true;
            }
        }

        if !self.start_condition(snapshot) || flags.reset_landing_detector {
            self.started_at = None;
            flags.reset_landing_detector = false;
            return false;
        }

        let now = snapshot.now;
        let estimate = &snapshot.estimate;
        let sensitivity = general.land_detect_sensitivity as f32 / 5.0;
        let vel_condition = estimate.vel.z.abs() < CHECK_VEL_Z_MOVING * sensitivity
            && estimate.vel_xy < CHECK_VEL_XY_MOVING * sensitivity;
        let gyro_condition = snapshot.sensors.gyro_rate < CHECK_GYRO_MOVING * sensitivity;

        let mut possible = if snapshot.mode.landing {
            let started_at = match self.started_at {
                Some(started_at) => started_at,
                None => {
                    self.throttle_sum = 0;
                    self.throttle_samples = 0;
                    self.started_at = Some(now);
                    now
                }
            };
            if self.throttle_samples == 0 {
                if now < started_at + Duration::millis(THROTTLE_STABILISE_DELAY) {
                    return false;
                }
                self.started_at = Some(now);
            }
            self.throttle_samples += 1;
            self.throttle_sum += adjusted_throttle as i32;
            let average = self.throttle_sum / self.throttle_samples;
            let minimal_thrust = (adjusted_throttle as i32) < average - DESCEND_THROTTLE;
            minimal_thrust && vel_condition
        } else {
            if self.started_at.is_none() {
                self.started_at = Some(now);
                return false;
            }
            vel_condition && gyro_condition
        };

        if estimate.agl_status == Quality::Trusted && estimate.agl.z >= 0.0 {
            possible = possible && estimate.agl.z <= estimate.surface_min + SAFE_SURFACE;
        }

        if !possible {
            self.started_at = Some(now);
            return false;
        }

        let safety_delay = match estimate.alt_status {
            Quality::None => SAFETY_DELAY_WITHOUT_ALTITUDE,
            _ => SAFETY_DELAY,
        };
        let delay = Duration::millis(safety_delay + general.auto_disarm_delay as u64);
        match self.started_at {
            Some(started_at) => now > started_at + delay,
            None => false,
        }
    }
}

mod test {
    #[cfg(test)]
    fn landed_snapshot() -> crate::types::Snapshot {
        use nalgebra::Vector3;

        use crate::types::{EstimatedState, Snapshot};

        let mut snapshot = Snapshot::default();
        snapshot.estimate = EstimatedState::new(Vector3::zeros(), Vector3::zeros(), 0);
        snapshot.sticks.throttle = 1000;
        snapshot
    }

    #[test]
    fn test_debounce() {
        use fugit::MicrosDurationU64 as Duration;

        use super::LandingDetector;
        use crate::config::Config;
        use crate::navigation::Flags;

        let mut detector = LandingDetector::new(&Config::default());
        let mut flags = Flags::default();
        let mut snapshot = landed_snapshot();
        // 1000 ms safety delay plus 1000 ms auto disarm delay
        assert!(!detector.update(&snapshot, &mut flags, 1000));
        snapshot.now = Duration::millis(2000);
        assert!(!detector.update(&snapshot, &mut flags, 1000));
        snapshot.now = Duration::millis(2001);
        assert!(detector.update(&snapshot, &mut flags, 1000));

        // a single moving sample restarts the persistence window
        snapshot.now = Duration::millis(2100);
        snapshot.sensors.gyro_rate = 30.0;
        assert!(!detector.update(&snapshot, &mut flags, 1000));
        snapshot.sensors.gyro_rate = 0.0;
        snapshot.now = Duration::millis(4100);
        assert!(!detector.update(&snapshot, &mut flags, 1000));
        snapshot.now = Duration::millis(4101);
        assert!(detector.update(&snapshot, &mut flags, 1000));
    }

    #[test]
    fn test_reset_request() {
        use fugit::MicrosDurationU64 as Duration;

        use super::LandingDetector;
        use crate::config::Config;
        use crate::navigation::Flags;

        let mut detector = LandingDetector::new(&Config::default());
        let mut flags = Flags::default();
        let mut snapshot = landed_snapshot();
        detector.update(&snapshot, &mut flags, 1000);
        snapshot.now = Duration::millis(1500);
        flags.reset_landing_detector = true;
        assert!(!detector.update(&snapshot, &mut flags, 1000));
        assert!(!flags.reset_landing_detector);

        snapshot.now = Duration::millis(2500);
        assert!(!detector.update(&snapshot, &mut flags, 1000));
        snapshot.now = Duration::millis(4501);
        assert!(detector.update(&snapshot, &mut flags, 1000));
    }

    #[test]
    fn test_not_started_with_throttle_up() {
        use fugit::MicrosDurationU64 as Duration;

        use super::LandingDetector;
        use crate::config::Config;
        use crate::navigation::Flags;

        let mut detector = LandingDetector::new(&Config::default());
        let mut flags = Flags::default();
        let mut snapshot = landed_snapshot();
        snapshot.sticks.throttle = 1500;
        for i in 0..50 {
            snapshot.now = Duration::millis(i * 100);
            assert!(!detector.update(&snapshot, &mut flags, 1500));
        }
    }

    #[test]
    fn test_surface_gate() {
        use fugit::MicrosDurationU64 as Duration;

        use super::LandingDetector;
        use crate::config::Config;
        use crate::navigation::Flags;
        use crate::types::Quality;

        let mut detector = LandingDetector::new(&Config::default());
        let mut flags = Flags::default();
        let mut snapshot = landed_snapshot();
        snapshot.estimate.agl_status = Quality::Trusted;
        snapshot.estimate.agl.z = 30.0;
        snapshot.estimate.surface_min = 10.0;
        detector.update(&snapshot, &mut flags, 1000);
        snapshot.now = Duration::millis(5000);
        assert!(!detector.update(&snapshot, &mut flags, 1000));

        snapshot.estimate.agl.z = 12.0;
        snapshot.now = Duration::millis(7001);
        assert!(detector.update(&snapshot, &mut flags, 1000));
    }

    #[test]
    fn test_autonomous_landing_throttle_drop() {
        use fugit::MicrosDurationU64 as Duration;

        use super::LandingDetector;
        use crate::config::Config;
        use crate::navigation::Flags;

        let mut detector = LandingDetector::new(&Config::default());
        let mut flags = Flags::default();
        let mut snapshot = landed_snapshot();
        snapshot.mode.landing = true;
        snapshot.mode.autonomous = true;
        snapshot.sticks.throttle = 1500;

        // throttle stabilisation
        assert!(!detector.update(&snapshot, &mut flags, 1400));
        snapshot.now = Duration::millis(999);
        assert!(!detector.update(&snapshot, &mut flags, 1400));

        // averaging starts, steady descent throttle is not a touchdown
        for i in 0..10 {
            snapshot.now = Duration::millis(1000 + i * 100);
            assert!(!detector.update(&snapshot, &mut flags, 1400));
        }

        // throttle drops well below the average
        for i in 0..20 {
            snapshot.now = Duration::millis(2000 + i * 100);
            assert!(!detector.update(&snapshot, &mut flags, 1000));
        }
        snapshot.now = Duration::millis(4000);
        assert!(detector.update(&snapshot, &mut flags, 1000));
    }

    #[test]
    fn test_g_bump() {
        use fugit::MicrosDurationU64 as Duration;

        use super::LandingDetector;
        use crate::config::Config;
        use crate::navigation::Flags;

        let mut config = Config::default();
        config.general.landing_bump_detection = true;
        let mut detector = LandingDetector::new(&config);
        let mut flags = Flags::default();
        let mut snapshot = landed_snapshot();
        snapshot.sticks.throttle = 1200;
        snapshot.mode.autonomous = true;
        snapshot.sensors.has_baro = true;
        snapshot.sensors.baro_rate = Some(-300.0);

        snapshot.sensors.accel_z = 2.5;
        assert!(!detector.update(&snapshot, &mut flags, 1200));
        assert_eq!(detector.baro_rate(), -300.0);

        snapshot.now = Duration::millis(50);
        snapshot.sensors.accel_z = 0.8;
        snapshot.sensors.baro_rate = None;
        assert!(detector.update(&snapshot, &mut flags, 1200));

        // window expired
        snapshot.now = Duration::millis(150);
        assert!(!detector.update(&snapshot, &mut flags, 1200));
    }

    #[test]
    fn test_is_flying() {
        use super::is_flying;

        let mut snapshot = landed_snapshot();
        snapshot.sensors.gyro_rate = 10.0;
        assert!(is_flying(&snapshot, 1600));
        assert!(!is_flying(&snapshot, 1500));
        snapshot.sensors.gyro_rate = 5.0;
        assert!(!is_flying(&snapshot, 1600));
    }
}
