//! Outbound broadcast payloads.
//!
//! One [`LocationBroadcast`] is built per accepted sample and delivered
//! verbatim to the driver's topic subscribers and to the admin-observer
//! channel. Field names are part of the wire contract consumed by the rider
//! and admin map UIs; do not rename.

use serde::{Deserialize, Serialize};

use crate::{DriverId, ProtocolError};

/// Static driver metadata embedded in every broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverInfo {
    /// Driver id, already coerced to its canonical numeric form.
    pub id: DriverId,
    /// Display name.
    pub name: String,
    /// Contact phone number.
    pub phone: String,
    /// Assigned vehicle label; `"N/A"` when the driver has no assignment.
    pub bus_number: String,
}

/// The single wire payload broadcast for one location update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationBroadcast {
    /// Directory metadata current at delivery time.
    pub driver_info: DriverInfo,
    /// Latitude from the sample, unmodified.
    pub latitude: f64,
    /// Longitude from the sample, unmodified.
    pub longitude: f64,
    /// Speed from the sample (0 when the device sent none).
    pub speed: f64,
    /// Human-readable place string from the resolver (fresh, cached, or
    /// the sentinel).
    pub place_name: String,
}

/// Every event the relay emits to subscriber and admin connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// An enriched location update.
    LocationUpdate(LocationBroadcast),
}

impl ServerEvent {
    /// Encode to the JSON text frame sent to clients.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample_broadcast() -> LocationBroadcast {
        LocationBroadcast {
            driver_info: DriverInfo {
                id: 42,
                name: "A".into(),
                phone: "555".into(),
                bus_number: "BUS-7".into(),
            },
            latitude: 12.9,
            longitude: 77.6,
            speed: 30.0,
            place_name: "MG Road".into(),
        }
    }

    #[test]
    fn broadcast_uses_camel_case_wire_names() {
        let value = serde_json::to_value(sample_broadcast()).unwrap();
        assert_eq!(
            value,
            json!({
                "driverInfo": {"id": 42, "name": "A", "phone": "555", "busNumber": "BUS-7"},
                "latitude": 12.9,
                "longitude": 77.6,
                "speed": 30.0,
                "placeName": "MG Road",
            })
        );
    }

    #[test]
    fn server_event_envelope_shape() {
        let text = ServerEvent::LocationUpdate(sample_broadcast()).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["event"], "locationUpdate");
        assert_eq!(value["data"]["driverInfo"]["busNumber"], "BUS-7");
    }

    #[test]
    fn broadcast_round_trips() {
        let original = sample_broadcast();
        let text = serde_json::to_string(&original).unwrap();
        let decoded: LocationBroadcast = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded, original);
    }
}
