pub mod lpf;
pub mod shaping;
pub mod sqrt_controller;

/// Linearly maps `x` from `[src_min, src_max]` onto `[dst_min, dst_max]`, unclamped
pub fn scale_range(x: f32, src_min: f32, src_max: f32, dst_min: f32, dst_max: f32) -> f32 {
    let a = (dst_max - dst_min) * (x - src_min);
    let b = src_max - src_min;
    if b == 0.0 {
        return dst_min;
    }
    a / b + dst_min
}

/// Bounds `value` to `[min, max]`, `min` wins when the bounds are inverted
pub fn constrain(value: f32, min: f32, max: f32) -> f32 {
    value.min(max).max(min)
}

/// Wraps centidegrees into `(-18000, 18000]`
pub fn wrap_18000(angle: i32) -> i32 {
    let mut angle = angle % 36000;
    if angle > 18000 {
        angle -= 36000;
    }
    if angle <= -18000 {
        angle += 36000;
    }
    angle
}

mod test {
    #[test]
    fn test_scale_range() {
        use super::scale_range;

        assert_eq!(scale_range(5.0, 0.0, 10.0, 0.0, 1.0), 0.5);
        assert_eq!(scale_range(15.0, 10.0, 20.0, 100.0, 0.0), 50.0);
        assert_eq!(scale_range(1.0, 3.0, 3.0, 7.0, 9.0), 7.0);
    }

    #[test]
    fn test_constrain() {
        use super::constrain;

        assert_eq!(constrain(5.0, 0.0, 10.0), 5.0);
        assert_eq!(constrain(-5.0, 0.0, 10.0), 0.0);
        assert_eq!(constrain(15.0, 0.0, 10.0), 10.0);
        assert_eq!(constrain(5.0, 10.0, 0.0), 10.0);
    }

    #[test]
    fn test_wrap_18000() {
        use super::wrap_18000;

        assert_eq!(wrap_18000(27000), -9000);
        assert_eq!(wrap_18000(-27000), 9000);
        assert_eq!(wrap_18000(18000), 18000);
        assert_eq!(wrap_18000(-18000), 18000);
        assert_eq!(wrap_18000(100), 100);
    }
}
