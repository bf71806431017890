use core::str::FromStr;

use serde::{Deserialize, Serialize};

use super::pathset::{Error, Path, PathSet, Value};

/// How pilot sticks drive the horizontal position controller
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UserControlMode {
    /// Sticks are passed through to the attitude controller while deflected
    Atti,
    /// Sticks move the position target at a velocity proportional to deflection
    Cruise,
}

impl FromStr for UserControlMode {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, ()> {
        match string {
            "atti" => Ok(Self::Atti),
            "cruise" => Ok(Self::Cruise),
            _ => Err(()),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct General {
    /// cm/s
    pub max_manual_speed: u16,
    /// cm/s
    pub max_auto_speed: u16,
    /// cm/s
    pub max_manual_climb_rate: u16,
    /// cm/s
    pub max_auto_climb_rate: u16,
    /// cm/s/s
    pub max_manual_acceleration: u16,
    /// cm/s/s
    pub max_auto_acceleration: u16,
    /// m/s/s/s
    pub shaping_jerk_z: u8,
    /// cm
    pub max_terrain_follow_altitude: u16,
    /// cm/s
    pub emerg_descent_rate: u16,
    pub land_detect_sensitivity: u8,
    /// ms
    pub auto_disarm_delay: u16,
    pub landing_bump_detection: bool,
    pub user_control_mode: UserControlMode,
}

impl Default for General {
    fn default() -> Self {
        Self {
            max_manual_speed: 500,
            max_auto_speed: 300,
            max_manual_climb_rate: 200,
            max_auto_climb_rate: 500,
            max_manual_acceleration: 250,
            max_auto_acceleration: 250,
            shaping_jerk_z: 5,
            max_terrain_follow_altitude: 500,
            emerg_descent_rate: 500,
            land_detect_sensitivity: 5,
            auto_disarm_delay: 1000,
            landing_bump_detection: false,
            user_control_mode: UserControlMode::Atti,
        }
    }
}

impl PathSet for General {
    fn set(&mut self, mut path: Path, value: Value) -> Result<(), Error> {
        match path.str()? {
            "max-manual-speed" => self.max_manual_speed = value.parse()?,
            "max-auto-speed" => self.max_auto_speed = value.parse()?,
            "max-manual-climb-rate" => self.max_manual_climb_rate = value.parse()?,
            "max-auto-climb-rate" => self.max_auto_climb_rate = value.parse()?,
            "max-manual-acceleration" => self.max_manual_acceleration = value.parse()?,
            "max-auto-acceleration" => self.max_auto_acceleration = value.parse()?,
            "shaping-jerk-z" => self.shaping_jerk_z = value.parse()?,
            "max-terrain-follow-altitude" => self.max_terrain_follow_altitude = value.parse()?,
            "emerg-descent-rate" => self.emerg_descent_rate = value.parse()?,
            "land-detect-sensitivity" => self.land_detect_sensitivity = value.parse()?,
            "auto-disarm-delay" => self.auto_disarm_delay = value.parse()?,
            "landing-bump-detection" => self.landing_bump_detection = value.parse_or(true)?,
            "user-control-mode" => self.user_control_mode = value.parse()?,
            _ => return Err(Error::UnknownPath),
        }
        Ok(())
    }
}
