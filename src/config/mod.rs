pub mod failsafe;
pub mod multicopter;
pub mod navigation;
pub mod pathset;
pub mod pid;
pub mod rc;

use serde::{Deserialize, Serialize};

pub use failsafe::{Failsafe, Procedure as FailsafeProcedure};
pub use multicopter::{Braking, Multicopter, ThrottleType};
pub use navigation::{General, UserControlMode};
use pathset::{Error, Path, PathSet, Value};
pub use pid::{Attenuation, PIDs, PID};
pub use rc::RC;

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub general: General,
    pub mc: Multicopter,
    pub pids: PIDs,
    pub rc: RC,
    pub failsafe: Failsafe,
}

impl Config {
    /// Rejects combinations the control pipelines cannot operate with
    pub fn validate(&self) -> Result<(), Error> {
        let rc = &self.rc;
        if rc.throttle_idle >= rc.throttle_max {
            return Err(Error::OutOfRange("rc.throttle-idle"));
        }
        if rc.throttle_mid <= rc.throttle_idle || rc.throttle_mid >= rc.throttle_max {
            return Err(Error::OutOfRange("rc.throttle-mid"));
        }
        let range = rc.throttle_max - rc.throttle_idle;
        if 2 * (rc.alt_hold_deadband as u32 + 10) >= range as u32 {
            return Err(Error::OutOfRange("rc.alt-hold-deadband"));
        }
        if rc.pos_hold_deadband >= 500 {
            return Err(Error::OutOfRange("rc.pos-hold-deadband"));
        }
        let (pos_xy_kp, _, _, _) = self.pids.pos_xy.gains();
        if pos_xy_kp <= 0.0 {
            return Err(Error::OutOfRange("pids.pos-xy.kp"));
        }
        let (pos_z_kp, _, _, _) = self.pids.pos_z.gains();
        if pos_z_kp <= 0.0 {
            return Err(Error::OutOfRange("pids.pos-z.kp"));
        }
        if self.pids.max_inclination == 0 {
            return Err(Error::OutOfRange("pids.max-inclination"));
        }
        let attenuation = &self.pids.vel_xy_dterm_attenuation;
        if attenuation.start > attenuation.end || attenuation.end > 100 {
            return Err(Error::OutOfRange("pids.vel-xy-dterm-attenuation"));
        }
        if attenuation.factor > 100 {
            return Err(Error::OutOfRange("pids.vel-xy-dterm-attenuation.factor"));
        }
        let general = &self.general;
        if general.max_manual_speed == 0 || general.max_auto_speed == 0 {
            return Err(Error::OutOfRange("general.max-speed"));
        }
        if general.max_manual_climb_rate == 0 || general.max_auto_climb_rate == 0 {
            return Err(Error::OutOfRange("general.max-climb-rate"));
        }
        if general.land_detect_sensitivity == 0 {
            return Err(Error::OutOfRange("general.land-detect-sensitivity"));
        }
        let braking = &self.mc.braking;
        if braking.speed_threshold > 0 && braking.disengage_speed > braking.speed_threshold {
            return Err(Error::OutOfRange("mc.braking.disengage-speed"));
        }
        if braking.boost_disengage_speed > braking.boost_speed_threshold {
            return Err(Error::OutOfRange("mc.braking.boost-disengage-speed"));
        }
        Ok(())
    }
}

impl PathSet for Config {
    fn set(&mut self, mut path: Path, value: Value) -> Result<(), Error> {
        match path.str()? {
            "general" => self.general.set(path, value),
            "mc" => self.mc.set(path, value),
            "pids" => self.pids.set(path, value),
            "rc" => self.rc.set(path, value),
            "failsafe" => self.failsafe.set(path, value),
            _ => Err(Error::UnknownPath),
        }
    }
}

mod test {
    #[test]
    fn test_default_config_is_valid() {
        use super::Config;

        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn test_set_config_by_path() {
        use super::pathset::{Path, PathSet, Value};
        use super::{Config, FailsafeProcedure, ThrottleType, UserControlMode};

        let mut config = Config::default();
        config.set(Path::from("mc.braking.speed-threshold"), Value::of("120")).unwrap();
        config.set(Path::from("mc.althold-throttle-type"), Value::of("hover")).unwrap();
        config.set(Path::from("general.user-control-mode"), Value::of("cruise")).unwrap();
        config.set(Path::from("general.landing-bump-detection"), Value(None)).unwrap();
        config.set(Path::from("pids.vel-xy.kd"), Value::of("0.5")).unwrap();
        config.set(Path::from("failsafe.procedure"), Value::of("drop")).unwrap();

        assert_eq!(config.mc.braking.speed_threshold, 120);
        assert_eq!(config.mc.althold_throttle_type, ThrottleType::Hover);
        assert_eq!(config.general.user_control_mode, UserControlMode::Cruise);
        assert!(config.general.landing_bump_detection);
        assert_eq!(config.pids.vel_xy.gains().2, 0.5);
        assert_eq!(config.failsafe.procedure, FailsafeProcedure::Drop);
    }

    #[test]
    fn test_set_config_errors() {
        use super::pathset::{Error, Path, PathSet, Value};
        use super::Config;

        let mut config = Config::default();
        let result = config.set(Path::from("mc.unknown"), Value::of("1"));
        assert_eq!(result, Err(Error::UnknownPath));
        let result = config.set(Path::from("rc.throttle-idle"), Value::of("low"));
        assert_eq!(result, Err(Error::InvalidValue));
        let result = config.set(Path::from("rc.throttle-idle"), Value(None));
        assert_eq!(result, Err(Error::ExpectValue));
        let result = config.set(Path::from("general"), Value::of("1"));
        assert_eq!(result, Err(Error::UnknownPath));
    }

    #[test]
    fn test_validate() {
        use super::pathset::Error;
        use super::Config;

        let mut config = Config::default();
        config.rc.throttle_idle = 1900;
        assert_eq!(config.validate(), Err(Error::OutOfRange("rc.throttle-idle")));

        let mut config = Config::default();
        config.pids.pos_xy.kp = fixed_point::fixed!(0.0);
        assert_eq!(config.validate(), Err(Error::OutOfRange("pids.pos-xy.kp")));

        let mut config = Config::default();
        config.pids.vel_xy_dterm_attenuation.start = 70;
        let expected = Err(Error::OutOfRange("pids.vel-xy-dterm-attenuation"));
        assert_eq!(config.validate(), expected);
    }

    #[test]
    fn test_serde_config() {
        use super::{Config, General};

        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"max-manual-speed\":500"));
        assert!(json.contains("\"althold-throttle-type\":\"stick\""));
        assert!(json.contains("\"procedure\":\"land\""));

        let json = serde_json::to_string(&config.general).unwrap();
        let decoded: General = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, config.general);
    }
}
