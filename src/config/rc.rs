use serde::{Deserialize, Serialize};

use super::pathset::{Error, Path, PathSet, Value};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RC {
    /// Throttle stick deadband around the altitude hold zero point, µs
    pub alt_hold_deadband: u16,
    /// Roll/pitch/yaw stick deadband in position hold, stick units
    pub pos_hold_deadband: u16,
    /// Motor output at idle, µs
    pub throttle_idle: u16,
    /// Motor output at full throttle, µs
    pub throttle_max: u16,
    /// Throttle curve mid point, µs
    pub throttle_mid: u16,
    /// Below this the throttle stick is considered low, µs
    pub min_check: u16,
}

impl Default for RC {
    fn default() -> Self {
        Self {
            alt_hold_deadband: 50,
            pos_hold_deadband: 10,
            throttle_idle: 1150,
            throttle_max: 1850,
            throttle_mid: 1500,
            min_check: 1100,
        }
    }
}

impl RC {
    pub fn throttle_stick_is_low(&self, throttle: u16) -> bool {
        throttle < self.min_check
    }
}

impl PathSet for RC {
    fn set(&mut self, mut path: Path, value: Value) -> Result<(), Error> {
        match path.str()? {
            "alt-hold-deadband" => self.alt_hold_deadband = value.parse()?,
            "pos-hold-deadband" => self.pos_hold_deadband = value.parse()?,
            "throttle-idle" => self.throttle_idle = value.parse()?,
            "throttle-max" => self.throttle_max = value.parse()?,
            "throttle-mid" => self.throttle_mid = value.parse()?,
            "min-check" => self.min_check = value.parse()?,
            _ => return Err(Error::UnknownPath),
        }
        Ok(())
    }
}
