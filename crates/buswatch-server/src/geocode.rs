//! Reverse geocoding over HTTP.
//!
//! One GET per sample against a Nominatim-style `/reverse` endpoint. The
//! request timeout bounds how long a sample can stall on geocoding; every
//! failure mode maps to a [`GeocodeError`] variant that the core resolver
//! absorbs into its fallback chain. The client identifies itself with a
//! configurable `User-Agent`, which public Nominatim instances require.

use std::time::Duration;

use async_trait::async_trait;
use buswatch_core::{GeocodeError, Geocoder};

use crate::error::ServerError;

/// Geocoder configuration.
#[derive(Debug, Clone)]
pub struct GeocoderConfig {
    /// Reverse-geocoding endpoint.
    pub endpoint: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Identifying client tag sent as `User-Agent`.
    pub client_tag: String,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://nominatim.openstreetmap.org/reverse".to_string(),
            timeout: Duration::from_secs(5),
            client_tag: format!("buswatch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Production [`Geocoder`] backed by an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpGeocoder {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpGeocoder {
    /// Build the geocoder and its HTTP client.
    pub fn new(config: GeocoderConfig) -> Result<Self, ServerError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.client_tag.as_str())
            .build()
            .map_err(|e| ServerError::Config(format!("geocoder client init failed: {e}")))?;

        Ok(Self { client, endpoint: config.endpoint, timeout: config.timeout })
    }
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<String, GeocodeError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("format", "jsonv2"),
                ("lat", latitude.to_string().as_str()),
                ("lon", longitude.to_string().as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GeocodeError::Timeout(self.timeout)
                } else {
                    GeocodeError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Status(status.as_u16()));
        }

        let body: serde_json::Value =
            response.json().await.map_err(|e| GeocodeError::Body(e.to_string()))?;

        parse_display_name(&body)
    }
}

/// Extract the display string from a reverse-geocoding response body.
fn parse_display_name(body: &serde_json::Value) -> Result<String, GeocodeError> {
    body.get("display_name")
        .and_then(serde_json::Value::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| GeocodeError::Body("missing display_name".to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_display_name() {
        let body = json!({"display_name": "MG Road, Bengaluru", "place_id": 1});
        assert_eq!(parse_display_name(&body).unwrap(), "MG Road, Bengaluru");
    }

    #[test]
    fn missing_display_name_is_a_body_error() {
        let body = json!({"error": "Unable to geocode"});
        assert!(matches!(parse_display_name(&body), Err(GeocodeError::Body(_))));
    }

    #[test]
    fn empty_display_name_is_a_body_error() {
        let body = json!({"display_name": ""});
        assert!(matches!(parse_display_name(&body), Err(GeocodeError::Body(_))));
    }

    #[test]
    fn non_string_display_name_is_a_body_error() {
        let body = json!({"display_name": 42});
        assert!(matches!(parse_display_name(&body), Err(GeocodeError::Body(_))));
    }

    #[test]
    fn default_config_has_bounded_timeout_and_client_tag() {
        let config = GeocoderConfig::default();
        assert!(config.timeout <= Duration::from_secs(10));
        assert!(config.client_tag.starts_with("buswatch/"));
    }
}
