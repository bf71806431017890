use core::f32::consts::PI;
use core::str::FromStr;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Estimator confidence of a state component
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    None,
    Usable,
    Trusted,
}

impl Default for Quality {
    fn default() -> Self {
        Self::None
    }
}

impl FromStr for Quality {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, ()> {
        match string {
            "none" => Ok(Self::None),
            "usable" => Ok(Self::Usable),
            "trusted" => Ok(Self::Trusted),
            _ => Err(()),
        }
    }
}

/// Height above ground from a ranging sensor
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Agl {
    /// cm
    pub z: f32,
    /// cm/s
    pub vel_z: f32,
}

pub fn centidegrees_to_radians(centidegrees: f32) -> f32 {
    centidegrees * PI / 18000.0
}

/// Position estimate in an earth fixed north-east-up frame, read only to the controllers
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct EstimatedState {
    /// cm
    pub pos: Vector3<f32>,
    /// cm/s
    pub vel: Vector3<f32>,
    /// centidegrees
    pub yaw: i32,
    pub sin_yaw: f32,
    pub cos_yaw: f32,
    /// Horizontal speed, cm/s
    pub vel_xy: f32,
    pub agl: Agl,
    /// Lowest surface distance seen since arming, cm
    pub surface_min: f32,
    /// Vertical acceleration with gravity removed, cm/s/s
    pub accel_z: f32,
    pub pos_status: Quality,
    pub alt_status: Quality,
    pub agl_status: Quality,
}

impl Default for EstimatedState {
    fn default() -> Self {
        Self {
            pos: Vector3::zeros(),
            vel: Vector3::zeros(),
            yaw: 0,
            sin_yaw: 0.0,
            cos_yaw: 1.0,
            vel_xy: 0.0,
            agl: Agl::default(),
            surface_min: 0.0,
            accel_z: 0.0,
            pos_status: Quality::None,
            alt_status: Quality::None,
            agl_status: Quality::None,
        }
    }
}

impl EstimatedState {
    /// Trusted position and altitude, no surface sensor
    pub fn new(pos: Vector3<f32>, vel: Vector3<f32>, yaw: i32) -> Self {
        let mut state = Self {
            pos,
            vel,
            pos_status: Quality::Trusted,
            alt_status: Quality::Trusted,
            ..Default::default()
        };
        state.set_yaw(yaw);
        state.vel_xy = libm::hypotf(vel.x, vel.y);
        state
    }

    pub fn set_yaw(&mut self, yaw: i32) {
        let radians = centidegrees_to_radians(yaw as f32);
        self.yaw = yaw;
        self.sin_yaw = libm::sinf(radians);
        self.cos_yaw = libm::cosf(radians);
    }

    pub fn set_velocity(&mut self, vel: Vector3<f32>) {
        self.vel = vel;
        self.vel_xy = libm::hypotf(vel.x, vel.y);
    }
}

/// Targets produced by the pipelines and the stick adjustment layer
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct DesiredState {
    /// cm
    pub pos: Vector3<f32>,
    /// cm/s
    pub vel: Vector3<f32>,
    /// centidegrees
    pub yaw: i32,
}

impl Default for DesiredState {
    fn default() -> Self {
        Self { pos: Vector3::zeros(), vel: Vector3::zeros(), yaw: 0 }
    }
}

mod test {
    #[test]
    fn test_quality_order() {
        use super::Quality;

        assert!(Quality::None < Quality::Usable);
        assert!(Quality::Usable < Quality::Trusted);
        assert_eq!("usable".parse(), Ok(Quality::Usable));
    }

    #[test]
    fn test_estimated_state_cache() {
        use nalgebra::Vector3;

        use super::EstimatedState;

        let state = EstimatedState::new(Vector3::zeros(), Vector3::new(300.0, 400.0, 0.0), 9000);
        assert!((state.vel_xy - 500.0).abs() < 1e-3);
        assert!((state.sin_yaw - 1.0).abs() < 1e-6);
        assert!(state.cos_yaw.abs() < 1e-6);
    }
}
