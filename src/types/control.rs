use core::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Eq, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Axis {
    Roll = 0,
    Pitch,
    Yaw,
    Throttle,
}

impl FromStr for Axis {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, ()> {
        match string {
            "roll" => Ok(Self::Roll),
            "pitch" => Ok(Self::Pitch),
            "yaw" => Ok(Self::Yaw),
            "throttle" => Ok(Self::Throttle),
            _ => Err(()),
        }
    }
}

/// Stick positions, roll/pitch/yaw in `[-500, 500]`, throttle in µs
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RcCommand {
    pub roll: i16,
    pub pitch: i16,
    pub yaw: i16,
    pub throttle: u16,
}

impl RcCommand {
    pub fn get(&self, axis: Axis) -> i32 {
        match axis {
            Axis::Roll => self.roll as i32,
            Axis::Pitch => self.pitch as i32,
            Axis::Yaw => self.yaw as i32,
            Axis::Throttle => self.throttle as i32,
        }
    }
}

/// Corrections computed by the navigation pipelines.
///
/// Roll and pitch are decidegrees, throttle is µs. A value is only rewritten while the
/// owning pipeline runs.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RcAdjustment {
    pub roll: i16,
    pub pitch: i16,
    pub yaw: i16,
    pub throttle: u16,
}

impl RcAdjustment {
    pub fn get(&self, axis: Axis) -> i32 {
        match axis {
            Axis::Roll => self.roll as i32,
            Axis::Pitch => self.pitch as i32,
            Axis::Yaw => self.yaw as i32,
            Axis::Throttle => self.throttle as i32,
        }
    }
}

mod test {
    #[test]
    fn test_axis_lookup() {
        use super::{Axis, RcCommand};

        let command = RcCommand { roll: -20, pitch: 30, yaw: 0, throttle: 1500 };
        assert_eq!(command.get(Axis::Roll), -20);
        assert_eq!(command.get(Axis::Throttle), 1500);
        assert_eq!("pitch".parse(), Ok(Axis::Pitch));
    }
}
