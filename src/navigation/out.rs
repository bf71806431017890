use serde::Serialize;

/// Navigation values exposed for logging
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct Telemetry {
    /// North, east and up, cm/s
    pub desired_velocity: [i16; 3],
}

mod test {
    #[test]
    fn test_serialize_telemetry() {
        use super::Telemetry;

        let telemetry = Telemetry { desired_velocity: [120, -35, 0] };
        let json = serde_json::to_string(&telemetry).unwrap();
        assert_eq!(json, r#"{"desired_velocity":[120,-35,0]}"#);
    }
}
