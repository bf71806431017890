use super::ControllerContext;
use crate::types::{EstimatedState, RcCommand, Snapshot};

/// Heading hold target handed to the attitude controller
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct HeadingController {
    /// degree
    hold_target: i16,
}

impl HeadingController {
    pub fn hold_target(&self) -> i16 {
        self.hold_target
    }

    pub fn reset(&mut self, estimate: &EstimatedState) {
        self.hold_target = (estimate.yaw / 100) as i16;
    }

    pub fn apply(&mut self, snapshot: &Snapshot, ctx: &ControllerContext, command: &mut RcCommand) {
        // course hold turns through the course, not the yaw stick
        if snapshot.mode.course_hold {
            command.yaw = 0;
        }
        self.hold_target = (ctx.desired.yaw / 100) as i16;
    }
}

mod test {
    #[test]
    fn test_heading_hold() {
        use super::HeadingController;
        use crate::navigation::ControllerContext;
        use crate::types::{RcCommand, Snapshot};

        let mut heading = HeadingController::default();
        let mut snapshot = Snapshot::default();
        snapshot.estimate.set_yaw(-4550);
        heading.reset(&snapshot.estimate);
        assert_eq!(heading.hold_target(), -45);

        let mut ctx = ControllerContext::default();
        ctx.desired.yaw = 27000;
        let mut command = RcCommand { roll: 0, pitch: 0, yaw: 120, throttle: 1500 };
        heading.apply(&snapshot, &ctx, &mut command);
        assert_eq!(heading.hold_target(), 270);
        assert_eq!(command.yaw, 120);

        snapshot.mode.course_hold = true;
        heading.apply(&snapshot, &ctx, &mut command);
        assert_eq!(command.yaw, 0);
    }
}
