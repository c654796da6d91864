//! Server error types.

use buswatch_core::{RelayError, StoreError};

/// Errors that can occur in the server runtime.
///
/// Sample-level failures never reach this type - the relay absorbs them per
/// its drop semantics. These are connection- or process-level conditions.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration error (invalid bind address, bad geocoder endpoint).
    /// Fatal at startup; fix configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport/network error. May be transient (peer reset) or fatal
    /// (bind address in use); check the message.
    #[error("transport error: {0}")]
    Transport(String),

    /// Relay engine rejected an event. Indicates a runtime bug (duplicate
    /// session ids, events for unknown sessions), not bad client input.
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    /// Driver store failed to open or read.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use buswatch_core::RelayError;

    use super::*;

    #[test]
    fn server_error_display() {
        let err = ServerError::Config("bad bind address".to_string());
        assert_eq!(err.to_string(), "configuration error: bad bind address");

        let err = ServerError::from(RelayError::SessionNotFound(42));
        assert_eq!(err.to_string(), "relay error: session not found: 42");
    }
}
