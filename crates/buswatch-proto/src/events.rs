//! Inbound client events.
//!
//! Driver devices and rider apps both speak the `{"event", "data"}` envelope.
//! The event name selects the variant; the data shape is variant-specific.
//! Coordinates are `f64` fields with no default, so a sample that omits them
//! or sends them as strings fails to decode and never reaches the relay.

use serde::{Deserialize, Serialize};

use crate::{DriverId, ProtocolError};

/// A driver id as clients actually send it.
///
/// Fielded apps variously send `42`, `"42"`, and `{"driverId": 42}` (and the
/// object form nests either of the first two). [`DriverIdArg::coerce`]
/// flattens all of them to a validated [`DriverId`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DriverIdArg {
    /// Bare JSON number.
    Id(i64),
    /// Numeric string.
    Text(String),
    /// Object wrapper, `{"driverId": ...}`.
    Tagged {
        /// The wrapped id, itself in either bare form.
        #[serde(rename = "driverId")]
        driver_id: Box<DriverIdArg>,
    },
}

impl DriverIdArg {
    /// Coerce to a positive driver id.
    ///
    /// Returns `None` for zero, negative values, and non-numeric strings.
    #[must_use]
    pub fn coerce(&self) -> Option<DriverId> {
        match self {
            Self::Id(n) => (*n > 0).then_some(*n as DriverId),
            Self::Text(s) => {
                let n: i64 = s.trim().parse().ok()?;
                (n > 0).then_some(n as DriverId)
            },
            Self::Tagged { driver_id } => driver_id.coerce(),
        }
    }
}

impl From<DriverId> for DriverIdArg {
    fn from(id: DriverId) -> Self {
        Self::Id(id as i64)
    }
}

/// One GPS sample as pushed by a driver device.
///
/// Transient: validated, enriched, broadcast, and forgotten. The receipt
/// timestamp is implicit; the relay never stores samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    /// Sender's driver id, in any of the client shapes.
    pub driver_id: DriverIdArg,
    /// Latitude in decimal degrees. Required and numeric.
    pub latitude: f64,
    /// Longitude in decimal degrees. Required and numeric.
    pub longitude: f64,
    /// Speed in km/h. Devices without a speed fix omit it; defaults to 0.
    #[serde(default)]
    pub speed: f64,
}

/// Every event a client connection can emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Driver ingress identifies itself and joins its own topic.
    DriverConnected(DriverIdArg),

    /// Driver ingress pushes a GPS sample.
    LocationUpdate(LocationSample),

    /// Subscriber connection asks for one driver's stream.
    SubscribeToDriver(DriverIdArg),

    /// Subscriber connection drops one driver's stream.
    UnsubscribeFromDriver(DriverIdArg),
}

impl ClientEvent {
    /// Decode an event from a JSON text frame.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_driver_connected_with_bare_id() {
        let event = ClientEvent::from_json(r#"{"event":"driverConnected","data":7}"#).unwrap();
        let ClientEvent::DriverConnected(arg) = event else {
            panic!("wrong variant");
        };
        assert_eq!(arg.coerce(), Some(7));
    }

    #[test]
    fn decodes_location_update() {
        let text = r#"{"event":"locationUpdate","data":{"driverId":42,"latitude":12.9,"longitude":77.6,"speed":30}}"#;
        let event = ClientEvent::from_json(text).unwrap();
        let ClientEvent::LocationUpdate(sample) = event else {
            panic!("wrong variant");
        };
        assert_eq!(sample.driver_id.coerce(), Some(42));
        assert!((sample.latitude - 12.9).abs() < f64::EPSILON);
        assert!((sample.longitude - 77.6).abs() < f64::EPSILON);
        assert!((sample.speed - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn speed_defaults_to_zero() {
        let text = r#"{"event":"locationUpdate","data":{"driverId":"42","latitude":1.0,"longitude":2.0}}"#;
        let ClientEvent::LocationUpdate(sample) = ClientEvent::from_json(text).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(sample.speed, 0.0);
    }

    #[test]
    fn missing_latitude_fails_decode() {
        let text = r#"{"event":"locationUpdate","data":{"driverId":42,"longitude":77.6}}"#;
        assert!(ClientEvent::from_json(text).is_err());
    }

    #[test]
    fn string_latitude_fails_decode() {
        let text =
            r#"{"event":"locationUpdate","data":{"driverId":42,"latitude":"12.9","longitude":77.6}}"#;
        assert!(ClientEvent::from_json(text).is_err());
    }

    #[test]
    fn unknown_event_name_fails_decode() {
        assert!(ClientEvent::from_json(r#"{"event":"ping","data":null}"#).is_err());
    }

    #[test]
    fn subscribe_accepts_object_form() {
        let text = r#"{"event":"subscribeToDriver","data":{"driverId":"9"}}"#;
        let ClientEvent::SubscribeToDriver(arg) = ClientEvent::from_json(text).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(arg.coerce(), Some(9));
    }

    #[test]
    fn coerce_rejects_zero_negative_and_garbage() {
        assert_eq!(DriverIdArg::Id(0).coerce(), None);
        assert_eq!(DriverIdArg::Id(-3).coerce(), None);
        assert_eq!(DriverIdArg::Text("abc".into()).coerce(), None);
        assert_eq!(DriverIdArg::Text("".into()).coerce(), None);
        assert_eq!(DriverIdArg::Text(" 15 ".into()).coerce(), Some(15));
    }

    #[test]
    fn coerce_unwraps_nested_object() {
        let arg =
            DriverIdArg::Tagged { driver_id: Box::new(DriverIdArg::Text("21".into())) };
        assert_eq!(arg.coerce(), Some(21));
    }
}
