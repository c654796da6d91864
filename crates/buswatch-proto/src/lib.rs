//! Wire-format types for the buswatch location relay.
//!
//! Messages travel as JSON text frames in a `{"event": ..., "data": ...}`
//! envelope. Inbound events are deliberately lenient about how a driver id is
//! written (bare number, numeric string, or `{"driverId": ...}` object)
//! because the fielded driver and rider apps disagree on the shape; outbound
//! payloads have exactly one canonical form.
//!
//! # Invariants
//!
//! - Decoding an event with a missing or non-numeric latitude/longitude MUST
//!   fail; coordinate validity is enforced at the type level, not downstream.
//! - [`LocationBroadcast`] serializes to the same camelCase field names for
//!   every recipient; there is no per-recipient variation.

mod events;
mod payload;

pub use events::{ClientEvent, DriverIdArg, LocationSample};
pub use payload::{DriverInfo, LocationBroadcast, ServerEvent};

/// Stable driver identifier. Valid ids are strictly positive.
pub type DriverId = u64;

/// Errors from encoding or decoding wire messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Inbound JSON did not parse as a known event envelope.
    #[error("malformed event: {0}")]
    Malformed(serde_json::Error),

    /// An outbound message could not be serialized. Indicates a bug rather
    /// than bad input; payload types always serialize.
    #[error("failed to encode event: {0}")]
    Encode(serde_json::Error),
}
