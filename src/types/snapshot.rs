use fugit::MicrosDurationU64 as Duration;
use serde::Serialize;

use super::{control::RcCommand, state::EstimatedState};

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct Sensors {
    /// Vertical specific force, g
    pub accel_z: f32,
    /// Mean absolute body rate, deg/s
    pub gyro_rate: f32,
    /// Barometric climb rate sampled this cycle, cm/s
    pub baro_rate: Option<f32>,
    pub has_baro: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Battery {
    /// µs
    pub hover_throttle: u16,
    /// µs
    pub failsafe_throttle: u16,
}

impl Default for Battery {
    fn default() -> Self {
        Self { hover_throttle: 1500, failsafe_throttle: 1000 }
    }
}

/// Flight mode context supplied by the mode selection logic
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct ModeContext {
    pub failsafe: bool,
    pub wp_mode: bool,
    pub rth: bool,
    /// Waypoint mission leg in progress
    pub auto_wp: bool,
    pub rth_trackback: bool,
    /// Holding at a waypoint
    pub hold_position: bool,
    pub course_hold: bool,
    /// Autonomous landing in progress
    pub landing: bool,
    pub emergency_landing: bool,
    pub autonomous: bool,
    pub automatic_throttle: bool,
    pub terrain_follow: bool,
    /// Braking switch engaged by the pilot
    pub braking_armed: bool,
    /// Navigation idle or in an unbounded position hold
    pub nav_idle_or_hold: bool,
}

impl ModeContext {
    /// Automatic flight modes use the auto speed and climb rate limits
    pub fn uses_auto_limits(&self) -> bool {
        self.failsafe || self.rth || self.wp_mode || self.emergency_landing
    }
}

/// Everything the controllers read during one cycle
#[derive(Copy, Clone, Debug, Serialize)]
pub struct Snapshot {
    #[serde(skip)]
    pub now: Duration,
    pub estimate: EstimatedState,
    pub sensors: Sensors,
    pub battery: Battery,
    pub sticks: RcCommand,
    pub mode: ModeContext,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            now: Duration::from_ticks(0),
            estimate: EstimatedState::default(),
            sensors: Sensors::default(),
            battery: Battery::default(),
            sticks: RcCommand::default(),
            mode: ModeContext::default(),
        }
    }
}
