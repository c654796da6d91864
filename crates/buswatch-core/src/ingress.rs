//! Driver ingress lifecycle state machine.
//!
//! Pure state transitions, no I/O and no timers; WebSocket keepalive is the
//! transport's job. The relay consults this machine to decide whether a
//! sample from a connection is attributable yet.
//!
//! # State Machine
//!
//! ```text
//! ┌───────────┐ driverConnected ┌────────────┐  sample   ┌───────────┐
//! │ Connected │────────────────>│ Identified │──────────>│ Streaming │
//! └───────────┘                 └────────────┘           └───────────┘
//!       │                             │                        │
//!       │ close                       │ close                  │ close
//!       ↓                             ↓                        ↓
//! ┌──────────────┐             ┌──────────────┐         ┌──────────────┐
//! │ Disconnected │             │ Disconnected │         │ Disconnected │
//! └──────────────┘             └──────────────┘         └──────────────┘
//! ```

use buswatch_proto::DriverId;

/// Lifecycle of one driver ingress connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngressState {
    /// Open but anonymous; samples are not attributable and are dropped.
    #[default]
    Connected,
    /// Announced its driver id; ready to stream.
    Identified(DriverId),
    /// At least one sample accepted since identification.
    Streaming(DriverId),
    /// Terminal.
    Disconnected,
}

impl IngressState {
    /// Fresh connection, not yet identified.
    pub fn new() -> Self {
        Self::Connected
    }

    /// Record the `driverConnected` announcement.
    ///
    /// Re-identification is allowed (the device reconnect path re-sends the
    /// announcement) and resets a streaming connection to `Identified`.
    /// Returns `false` only on a closed connection.
    pub fn identify(&mut self, driver_id: DriverId) -> bool {
        match self {
            Self::Disconnected => false,
            _ => {
                *self = Self::Identified(driver_id);
                true
            },
        }
    }

    /// Record an inbound sample.
    ///
    /// Returns the bound driver id when the connection may stream, `None`
    /// when the sample must be dropped (not identified or closed). The
    /// first accepted sample moves `Identified` to `Streaming`.
    pub fn on_sample(&mut self) -> Option<DriverId> {
        match *self {
            Self::Identified(driver_id) => {
                *self = Self::Streaming(driver_id);
                Some(driver_id)
            },
            Self::Streaming(driver_id) => Some(driver_id),
            Self::Connected | Self::Disconnected => None,
        }
    }

    /// Terminal transition.
    pub fn close(&mut self) {
        *self = Self::Disconnected;
    }

    /// Driver id this connection announced, if any.
    pub fn driver_id(&self) -> Option<DriverId> {
        match *self {
            Self::Identified(driver_id) | Self::Streaming(driver_id) => Some(driver_id),
            Self::Connected | Self::Disconnected => None,
        }
    }
}
