use core::str::FromStr;

use serde::{Deserialize, Serialize};

use super::pathset::{Error, Path, PathSet, Value};

/// Source of the throttle stick position that maps to zero climb rate
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThrottleType {
    /// Stick position at the moment altitude hold engages
    Stick,
    /// Throttle curve mid point
    MidStick,
    /// Hover throttle
    Hover,
}

impl FromStr for ThrottleType {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, ()> {
        match string {
            "stick" => Ok(Self::Stick),
            "mid-stick" => Ok(Self::MidStick),
            "hover" => Ok(Self::Hover),
            _ => Err(()),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Braking {
    /// cm/s, zero disables braking
    pub speed_threshold: u16,
    /// cm/s
    pub disengage_speed: u16,
    /// ms
    pub timeout: u16,
    /// percent
    pub boost_factor: u8,
    /// ms
    pub boost_timeout: u16,
    /// cm/s
    pub boost_speed_threshold: u16,
    /// cm/s
    pub boost_disengage_speed: u16,
    /// degree
    pub bank_angle: u8,
}

impl Default for Braking {
    fn default() -> Self {
        Self {
            speed_threshold: 100,
            disengage_speed: 75,
            timeout: 2000,
            boost_factor: 100,
            boost_timeout: 750,
            boost_speed_threshold: 150,
            boost_disengage_speed: 100,
            bank_angle: 40,
        }
    }
}

impl PathSet for Braking {
    fn set(&mut self, mut path: Path, value: Value) -> Result<(), Error> {
        match path.str()? {
            "speed-threshold" => self.speed_threshold = value.parse()?,
            "disengage-speed" => self.disengage_speed = value.parse()?,
            "timeout" => self.timeout = value.parse()?,
            "boost-factor" => self.boost_factor = value.parse()?,
            "boost-timeout" => self.boost_timeout = value.parse()?,
            "boost-speed-threshold" => self.boost_speed_threshold = value.parse()?,
            "boost-disengage-speed" => self.boost_disengage_speed = value.parse()?,
            "bank-angle" => self.bank_angle = value.parse()?,
            _ => return Err(Error::UnknownPath),
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Multicopter {
    /// degree
    pub max_bank_angle: u8,
    pub althold_throttle_type: ThrottleType,
    pub slow_down_for_turning: bool,
    /// centisecond
    pub pos_deceleration_time: u8,
    /// percent
    pub pos_response_expo: u8,
    pub braking: Braking,
}

impl Default for Multicopter {
    fn default() -> Self {
        Self {
            max_bank_angle: 30,
            althold_throttle_type: ThrottleType::Stick,
            slow_down_for_turning: true,
            pos_deceleration_time: 120,
            pos_response_expo: 10,
            braking: Braking::default(),
        }
    }
}

impl Multicopter {
    pub fn pos_deceleration_time(&self) -> f32 {
        self.pos_deceleration_time as f32 / 100.0
    }

    pub fn pos_response_expo(&self) -> f32 {
        (self.pos_response_expo as f32 / 100.0).clamp(0.0, 1.0)
    }
}

impl PathSet for Multicopter {
    fn set(&mut self, mut path: Path, value: Value) -> Result<(), Error> {
        match path.str()? {
            "max-bank-angle" => self.max_bank_angle = value.parse()?,
            "althold-throttle-type" => self.althold_throttle_type = value.parse()?,
            "slow-down-for-turning" => self.slow_down_for_turning = value.parse_or(true)?,
            "pos-deceleration-time" => self.pos_deceleration_time = value.parse()?,
            "pos-response-expo" => self.pos_response_expo = value.parse()?,
            "braking" => return self.braking.set(path, value),
            _ => return Err(Error::UnknownPath),
        }
        Ok(())
    }
}
