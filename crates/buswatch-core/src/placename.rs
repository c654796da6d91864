//! Place-name resolution with last-known-good fallback.
//!
//! Reverse geocoding sits on the hot path of every location sample and the
//! upstream service is the least reliable collaborator the relay has, so
//! failure is the expected case here, not the exceptional one. The resolver
//! never fails outward: a fresh result updates the per-driver entry, any
//! failure falls back to the last good entry, and a driver with no history
//! yet gets the sentinel. There is no retry - the next sample is the retry.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use buswatch_proto::DriverId;

/// Placeholder place name when no real data is available.
pub const UNKNOWN_LOCATION: &str = "Unknown Location";

/// Errors from one reverse-geocoding attempt.
///
/// All variants are absorbed by [`PlaceNameResolver::resolve`]; they exist
/// for logging and for geocoder unit tests.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GeocodeError {
    /// Request could not be sent or the connection failed mid-flight.
    #[error("geocoding request failed: {0}")]
    Request(String),

    /// The bounded per-request timeout elapsed.
    #[error("geocoding timed out after {0:?}")]
    Timeout(Duration),

    /// Upstream answered with a non-success status.
    #[error("geocoder returned status {0}")]
    Status(u16),

    /// The response body did not contain a usable place name.
    #[error("geocoder response malformed: {0}")]
    Body(String),
}

/// Reverse-geocoding collaborator: coordinates in, display string out.
#[async_trait]
pub trait Geocoder: Send + Sync + 'static {
    /// Resolve one coordinate pair to a human-readable place string.
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<String, GeocodeError>;
}

/// Per-driver place-name resolver. Infallible outward.
#[derive(Debug)]
pub struct PlaceNameResolver<G> {
    geocoder: G,
    /// Last successfully resolved string per driver. Last-writer-wins;
    /// grows for the driver's session, cleared on disconnect.
    last_good: Mutex<HashMap<DriverId, String>>,
}

impl<G: Geocoder> PlaceNameResolver<G> {
    /// Create a resolver around the given geocoder.
    pub fn new(geocoder: G) -> Self {
        Self { geocoder, last_good: Mutex::new(HashMap::new()) }
    }

    /// Resolve a place name for one sample.
    ///
    /// Always returns a usable string: fresh on success, the driver's last
    /// good value on failure, the [`UNKNOWN_LOCATION`] sentinel when there
    /// is no history.
    ///
    /// # Panics
    ///
    /// Panics if the history mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub async fn resolve(&self, driver_id: DriverId, latitude: f64, longitude: f64) -> String {
        match self.geocoder.reverse(latitude, longitude).await {
            Ok(place) => {
                self.last_good
                    .lock()
                    .expect("place-name mutex poisoned")
                    .insert(driver_id, place.clone());
                place
            },
            Err(err) => {
                tracing::debug!(driver_id, %err, "geocoding failed, using fallback");
                self.last_good
                    .lock()
                    .expect("place-name mutex poisoned")
                    .get(&driver_id)
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_LOCATION.to_string())
            },
        }
    }

    /// Drop a driver's place-name history.
    ///
    /// Called when the driver's last ingress connection closes.
    ///
    /// # Panics
    ///
    /// Panics if the history mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn forget(&self, driver_id: DriverId) {
        self.last_good.lock().expect("place-name mutex poisoned").remove(&driver_id);
    }

    /// Last good value for a driver, if any.
    ///
    /// # Panics
    ///
    /// Panics if the history mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn last_known(&self, driver_id: DriverId) -> Option<String> {
        self.last_good.lock().expect("place-name mutex poisoned").get(&driver_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use super::*;

    /// Geocoder double that replays a scripted sequence of outcomes.
    struct ScriptedGeocoder {
        script: Mutex<VecDeque<Result<String, GeocodeError>>>,
    }

    impl ScriptedGeocoder {
        fn new(script: Vec<Result<String, GeocodeError>>) -> Self {
            Self { script: Mutex::new(script.into_iter().collect()) }
        }
    }

    #[async_trait]
    impl Geocoder for ScriptedGeocoder {
        async fn reverse(&self, _: f64, _: f64) -> Result<String, GeocodeError> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(GeocodeError::Request("script exhausted".into())))
        }
    }

    #[tokio::test]
    async fn success_updates_history_and_returns_fresh() {
        let resolver =
            PlaceNameResolver::new(ScriptedGeocoder::new(vec![Ok("MG Road".into())]));

        assert_eq!(resolver.resolve(42, 12.9, 77.6).await, "MG Road");
        assert_eq!(resolver.last_known(42), Some("MG Road".into()));
    }

    #[tokio::test]
    async fn failure_without_history_returns_sentinel() {
        let resolver = PlaceNameResolver::new(ScriptedGeocoder::new(vec![Err(
            GeocodeError::Timeout(Duration::from_secs(5)),
        )]));

        assert_eq!(resolver.resolve(42, 12.9, 77.6).await, UNKNOWN_LOCATION);
        assert_eq!(resolver.last_known(42), None);
    }

    #[tokio::test]
    async fn failure_with_history_returns_last_good() {
        let resolver = PlaceNameResolver::new(ScriptedGeocoder::new(vec![
            Ok("Park St".into()),
            Err(GeocodeError::Status(502)),
        ]));

        assert_eq!(resolver.resolve(42, 1.0, 2.0).await, "Park St");
        assert_eq!(resolver.resolve(42, 1.1, 2.1).await, "Park St");
    }

    #[tokio::test]
    async fn history_is_per_driver() {
        let resolver = PlaceNameResolver::new(ScriptedGeocoder::new(vec![
            Ok("MG Road".into()),
            Err(GeocodeError::Status(502)),
        ]));

        assert_eq!(resolver.resolve(1, 1.0, 2.0).await, "MG Road");
        // Driver 2 has no history of its own.
        assert_eq!(resolver.resolve(2, 1.0, 2.0).await, UNKNOWN_LOCATION);
    }

    #[tokio::test]
    async fn forget_clears_history() {
        let resolver = PlaceNameResolver::new(ScriptedGeocoder::new(vec![
            Ok("MG Road".into()),
            Err(GeocodeError::Status(502)),
        ]));

        resolver.resolve(42, 1.0, 2.0).await;
        resolver.forget(42);

        assert_eq!(resolver.last_known(42), None);
        assert_eq!(resolver.resolve(42, 1.0, 2.0).await, UNKNOWN_LOCATION);
    }
}
