use fugit::MicrosDurationU64 as Duration;
use nalgebra::Vector3;

use mc_nav::config::{Config, UserControlMode};
use mc_nav::navigation::{ControlFlags, MulticopterNavigation};
use mc_nav::types::{EstimatedState, Quality, RcCommand, Snapshot};

fn position_hold() -> ControlFlags {
    ControlFlags {
        altitude: true,
        position: true,
        heading: true,
        emergency: false,
        rc_altitude: true,
        rc_position: true,
        rc_heading: true,
    }
}

fn hover_snapshot() -> Snapshot {
    let mut snapshot = Snapshot::default();
    let pos = Vector3::new(0.0, 0.0, 1000.0);
    snapshot.estimate = EstimatedState::new(pos, Vector3::zeros(), 0);
    snapshot.battery.hover_throttle = 1500;
    snapshot.sticks.throttle = 1500;
    snapshot.mode.nav_idle_or_hold = true;
    snapshot
}

fn engage(nav: &mut MulticopterNavigation, snapshot: &Snapshot) {
    nav.setup_altitude(snapshot);
    nav.reset_altitude(snapshot);
    nav.reset_position();
    nav.reset_heading(snapshot);
    nav.set_stop_position(snapshot);
}

#[test]
fn test_hover_holds_altitude_and_throttle() {
    let mut nav = MulticopterNavigation::new(&Config::default());
    let mut snapshot = hover_snapshot();
    engage(&mut nav, &snapshot);

    let mut command = snapshot.sticks;
    for i in 0..200 {
        snapshot.now = Duration::millis(i * 10);
        nav.publish_estimate(true, true);
        nav.apply(&snapshot, position_hold(), &mut command);
    }

    assert_eq!(command.throttle, 1500);
    assert_eq!((command.roll, command.pitch), (0, 0));
    let state = nav.altitude().state();
    assert!((state.pos_target - 1000.0).abs() < 1.0);
    assert!(!nav.context().flags.adjusting_altitude);
    assert_eq!(nav.telemetry().desired_velocity, [0, 0, 0]);
}

#[test]
fn test_braking_latches_position() {
    let mut config = Config::default();
    config.general.user_control_mode = UserControlMode::Cruise;
    let mut nav = MulticopterNavigation::new(&config);
    let mut snapshot = hover_snapshot();
    snapshot.estimate.pos = Vector3::new(500.0, -200.0, 1000.0);
    snapshot.mode.braking_armed = true;
    engage(&mut nav, &snapshot);

    let mut command = snapshot.sticks;
    for i in 0..3 {
        snapshot.now = Duration::millis(i * 10);
        nav.publish_estimate(true, true);
        nav.apply(&snapshot, position_hold(), &mut command);
    }
    assert!(!nav.context().flags.braking);

    snapshot.now = Duration::millis(30);
    snapshot.estimate.pos = Vector3::new(520.0, -200.0, 1000.0);
    snapshot.estimate.set_velocity(Vector3::new(300.0, 0.0, 0.0));
    nav.publish_estimate(true, true);
    nav.apply(&snapshot, position_hold(), &mut command);

    let ctx = nav.context();
    assert!(ctx.flags.braking && ctx.flags.braking_boost && ctx.flags.braking_locked);
    assert_eq!((ctx.desired.pos.x, ctx.desired.pos.y), (520.0, -200.0));

    for i in 4..8 {
        snapshot.now = Duration::millis(i * 10);
        nav.publish_estimate(true, true);
        nav.apply(&snapshot, position_hold(), &mut command);
    }
    // decelerating while flying north
    assert!(nav.context().rc_adjustment.pitch < 0);
    assert!(command.pitch < 0);
}

#[test]
fn test_position_quality_drop_passes_sticks_through() {
    let mut nav = MulticopterNavigation::new(&Config::default());
    let mut snapshot = hover_snapshot();
    engage(&mut nav, &snapshot);
    nav.context_mut().rc_adjustment.pitch = 150;

    snapshot.estimate.pos_status = Quality::None;
    snapshot.sticks.roll = 120;
    snapshot.sticks.pitch = -80;
    nav.publish_estimate(true, true);
    let mut command = snapshot.sticks;
    nav.apply(&snapshot, position_hold(), &mut command);

    assert_eq!((command.roll, command.pitch), (120, -80));
    let adjustment = nav.context().rc_adjustment;
    assert_eq!((adjustment.roll, adjustment.pitch), (0, 0));
}

#[test]
fn test_reset_is_idempotent() {
    let mut nav = MulticopterNavigation::new(&Config::default());
    let mut snapshot = hover_snapshot();
    snapshot.estimate.set_velocity(Vector3::new(40.0, -20.0, 30.0));
    snapshot.estimate.accel_z = 120.0;
    engage(&mut nav, &snapshot);
    let altitude = nav.altitude().state();
    let ctx = *nav.context();

    engage(&mut nav, &snapshot);
    assert_eq!(nav.altitude().state(), altitude);
    assert_eq!(*nav.context(), ctx);
}

#[test]
fn test_landing_debounce() {
    let mut nav = MulticopterNavigation::new(&Config::default());
    let mut snapshot = hover_snapshot();
    snapshot.estimate.pos = Vector3::zeros();
    snapshot.sticks.throttle = 1000;

    assert!(!nav.detect_landing(&snapshot));
    snapshot.now = Duration::millis(1000);
    assert!(!nav.detect_landing(&snapshot));
    // vertical speed above the moving threshold restarts the window
    snapshot.estimate.set_velocity(Vector3::new(0.0, 0.0, -150.0));
    snapshot.now = Duration::millis(1500);
    assert!(!nav.detect_landing(&snapshot));

    snapshot.estimate.set_velocity(Vector3::zeros());
    snapshot.now = Duration::millis(3500);
    assert!(!nav.detect_landing(&snapshot));
    assert!(!nav.is_landing_detected());
    snapshot.now = Duration::millis(3501);
    assert!(nav.detect_landing(&snapshot));
    assert!(nav.is_landing_detected());

    nav.reset_landing_detector();
    assert!(!nav.detect_landing(&snapshot));
    assert!(!nav.context().flags.reset_landing_detector);
}

#[test]
fn test_emergency_landing_levels_and_descends() {
    let mut nav = MulticopterNavigation::new(&Config::default());
    let mut snapshot = hover_snapshot();
    snapshot.mode.emergency_landing = true;
    engage(&mut nav, &snapshot);
    let control = ControlFlags { emergency: true, ..Default::default() };

    let mut command = RcCommand { roll: 200, pitch: -200, yaw: 100, throttle: 1500 };
    for i in 0..50 {
        snapshot.now = Duration::millis(i * 10);
        nav.publish_estimate(true, true);
        nav.apply(&snapshot, control, &mut command);
    }
    assert_eq!((command.roll, command.pitch, command.yaw), (0, 0, 0));
    assert!(command.throttle < 1500);
    assert!(nav.context().desired.vel.z < 0.0);
}

#[test]
fn test_emergency_throttle_feeds_landing_detection() {
    let mut config = Config::default();
    config.general.landing_bump_detection = true;
    let mut nav = MulticopterNavigation::new(&config);
    let mut snapshot = hover_snapshot();
    engage(&mut nav, &snapshot);

    let mut command = snapshot.sticks;
    nav.publish_estimate(true, true);
    nav.apply(&snapshot, position_hold(), &mut command);
    assert_eq!(nav.altitude().adjusted_throttle(), 1500);

    snapshot.mode.emergency_landing = true;
    snapshot.mode.automatic_throttle = true;
    snapshot.estimate.alt_status = Quality::None;
    snapshot.battery.failsafe_throttle = 1000;
    let control = ControlFlags { emergency: true, ..Default::default() };
    snapshot.now = Duration::millis(10);
    nav.publish_estimate(true, true);
    nav.apply(&snapshot, control, &mut command);
    assert_eq!(command.throttle, 1150);
    assert_eq!(nav.altitude().adjusted_throttle(), 1150);

    snapshot.sensors.has_baro = true;
    snapshot.sensors.baro_rate = Some(-300.0);
    snapshot.sensors.accel_z = 2.5;
    assert!(!nav.detect_landing(&snapshot));
    snapshot.now = Duration::millis(50);
    snapshot.sensors.accel_z = 0.5;
    assert!(nav.detect_landing(&snapshot));
}
