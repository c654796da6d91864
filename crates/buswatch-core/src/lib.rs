//! Transport-independent relay logic.
//!
//! The relay accepts GPS samples from driver connections, enriches each one
//! with directory metadata and a human-readable place name, and fans the
//! resulting payload out to the driver's topic subscribers and the
//! admin-observer channel.
//!
//! # Architecture
//!
//! The crate follows the action pattern: the runtime feeds [`RelayEvent`]s
//! into [`RelayEngine::handle_event`] and executes the returned
//! [`RelayAction`]s against real connections. The engine never touches a
//! socket; everything it needs from the outside world comes through two
//! async seams, [`DriverStore`] (durable driver records) and [`Geocoder`]
//! (reverse geocoding), so tests drive the full pipeline with scripted
//! doubles.
//!
//! # Components
//!
//! - [`TopicRegistry`]: which connections hear about which drivers
//! - [`DriverDirectory`]: memoized driver metadata, evicted on disconnect
//! - [`PlaceNameResolver`]: last-known-good place strings, never fails
//! - [`RelayEngine`]: the orchestrator tying the above together

mod directory;
pub mod env;
mod ingress;
mod placename;
mod registry;
mod relay;

pub use directory::{
    DirectoryError, DriverDirectory, DriverProfile, DriverStore, MemoryDriverStore, StoreError,
};
pub use ingress::IngressState;
pub use placename::{GeocodeError, Geocoder, PlaceNameResolver, UNKNOWN_LOCATION};
pub use registry::{Channel, SessionEnd, SessionId, TopicRegistry};
pub use relay::{RelayAction, RelayConfig, RelayEngine, RelayError, RelayEvent};
