pub mod control;
pub mod snapshot;
pub mod state;

pub use control::{Axis, RcAdjustment, RcCommand};
pub use snapshot::{Battery, ModeContext, Sensors, Snapshot};
pub use state::{Agl, DesiredState, EstimatedState, Quality};

pub const X: usize = 0;
pub const Y: usize = 1;
pub const Z: usize = 2;

/// cm/s/s
pub const GRAVITY_CMSS: f32 = 980.665;
