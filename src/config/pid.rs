use fixed_point::FixedPoint;
use serde::{Deserialize, Serialize};

use super::pathset::{Error, Path, PathSet, Value};

#[derive(Copy, Clone, Default, Debug, PartialEq, Serialize, Deserialize)]
pub struct PID {
    pub kp: FixedPoint<u16, 2>,
    pub ki: FixedPoint<u16, 2>,
    pub kd: FixedPoint<u16, 2>,
    pub kff: FixedPoint<u16, 2>,
}

impl PID {
    pub fn gains(&self) -> (f32, f32, f32, f32) {
        (self.kp.into(), self.ki.into(), self.kd.into(), self.kff.into())
    }
}

impl PathSet for PID {
    fn set(&mut self, mut path: Path, value: Value) -> Result<(), Error> {
        match path.str()? {
            "kp" => self.kp = value.parse()?,
            "ki" => self.ki = value.parse()?,
            "kd" => self.kd = value.parse()?,
            "kff" => self.kff = value.parse()?,
            _ => return Err(Error::UnknownPath),
        }
        Ok(())
    }
}

/// D-term attenuation of the horizontal velocity controller, all values in percent
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attenuation {
    pub factor: u8,
    pub start: u8,
    pub end: u8,
}

impl Default for Attenuation {
    fn default() -> Self {
        Self { factor: 90, start: 10, end: 60 }
    }
}

impl PathSet for Attenuation {
    fn set(&mut self, mut path: Path, value: Value) -> Result<(), Error> {
        match path.str()? {
            "factor" => self.factor = value.parse()?,
            "start" => self.start = value.parse()?,
            "end" => self.end = value.parse()?,
            _ => return Err(Error::UnknownPath),
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PIDs {
    pub pos_xy: PID,
    pub pos_z: PID,
    pub vel_xy: PID,
    pub vel_z: PID,
    pub accel_z: PID,
    pub surface: PID,
    /// Hz
    pub vel_xy_dterm_lpf: u8,
    /// Hz
    pub vel_z_dterm_lpf: u8,
    /// Hz
    pub accel_z_error_lpf: u8,
    pub vel_xy_dterm_attenuation: Attenuation,
    /// decidegree
    pub max_inclination: u16,
}

impl Default for PIDs {
    fn default() -> Self {
        let zero: FixedPoint<u16, 2> = fixed_point::fixed!(0.0);
        Self {
            pos_xy: PID { kp: fixed_point::fixed!(0.65), ki: zero, kd: zero, kff: zero },
            pos_z: PID { kp: fixed_point::fixed!(0.5), ki: zero, kd: zero, kff: zero },
            vel_xy: PID {
                kp: fixed_point::fixed!(2.0),
                ki: fixed_point::fixed!(0.15),
                kd: fixed_point::fixed!(1.0),
                kff: fixed_point::fixed!(0.4),
            },
            vel_z: PID { kp: fixed_point::fixed!(5.0), ki: zero, kd: zero, kff: zero },
            accel_z: PID {
                kp: fixed_point::fixed!(0.5),
                ki: fixed_point::fixed!(1.0),
                kd: zero,
                kff: zero,
            },
            surface: PID {
                kp: fixed_point::fixed!(0.5),
                ki: fixed_point::fixed!(0.01),
                kd: zero,
                kff: zero,
            },
            vel_xy_dterm_lpf: 10,
            vel_z_dterm_lpf: 5,
            accel_z_error_lpf: 20,
            vel_xy_dterm_attenuation: Attenuation::default(),
            max_inclination: 300,
        }
    }
}

impl PathSet for PIDs {
    fn set(&mut self, mut path: Path, value: Value) -> Result<(), Error> {
        match path.str()? {
            "pos-xy" => return self.pos_xy.set(path, value),
            "pos-z" => return self.pos_z.set(path, value),
            "vel-xy" => return self.vel_xy.set(path, value),
            "vel-z" => return self.vel_z.set(path, value),
            "accel-z" => return self.accel_z.set(path, value),
            "surface" => return self.surface.set(path, value),
            "vel-xy-dterm-attenuation" => return self.vel_xy_dterm_attenuation.set(path, value),
            "vel-xy-dterm-lpf" => self.vel_xy_dterm_lpf = value.parse()?,
            "vel-z-dterm-lpf" => self.vel_z_dterm_lpf = value.parse()?,
            "accel-z-error-lpf" => self.accel_z_error_lpf = value.parse()?,
            "max-inclination" => self.max_inclination = value.parse()?,
            _ => return Err(Error::UnknownPath),
        }
        Ok(())
    }
}
