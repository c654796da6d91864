//! Location relay engine.
//!
//! Ties together the topic registry, driver directory, and place-name
//! resolver. The runtime feeds connection-level events in; the engine hands
//! delivery actions back. Unlike the registry, the engine is async: per
//! sample it awaits the directory store and the geocoder, and neither await
//! holds the registry lock, so one driver's slow lookup never stalls the
//! others.
//!
//! Failure semantics per sample: validation and directory failures drop the
//! sample (logged, nothing sent back to the device); place-name resolution
//! never fails; delivery is fire-and-forget.

use std::collections::HashMap;

use buswatch_proto::{
    ClientEvent, DriverId, DriverIdArg, DriverInfo, LocationBroadcast, LocationSample,
};
use tokio::sync::RwLock;

use crate::{
    directory::{DirectoryError, DriverDirectory, DriverProfile, DriverStore},
    ingress::IngressState,
    placename::{Geocoder, PlaceNameResolver},
    registry::{Channel, SessionId, TopicRegistry},
};

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Maximum concurrent connections across all channels.
    pub max_connections: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { max_connections: 10_000 }
    }
}

/// Events that the relay engine processes.
///
/// Produced by the runtime (production transport or tests).
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// A new connection was accepted on one of the channels.
    ConnectionAccepted {
        /// Unique connection id assigned by the runtime.
        session_id: SessionId,
        /// Channel the connection arrived on.
        channel: Channel,
    },

    /// A decoded event arrived from a connection.
    EventReceived {
        /// Connection that sent the event.
        session_id: SessionId,
        /// The decoded event.
        event: ClientEvent,
    },

    /// A connection was closed (by peer or error).
    ConnectionClosed {
        /// Connection that was closed.
        session_id: SessionId,
        /// Reason for closure.
        reason: String,
    },
}

/// Actions the relay engine produces for the runtime to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayAction {
    /// Deliver the payload to every current subscriber of the driver's
    /// topic. The executor snapshots the subscriber set at delivery time.
    Broadcast {
        /// Topic to publish to.
        driver_id: DriverId,
        /// The canonical payload for this update.
        payload: LocationBroadcast,
    },

    /// Deliver the same payload to every admin-observer session.
    BroadcastAdmin {
        /// The canonical payload for this update.
        payload: LocationBroadcast,
    },

    /// Close a connection that was never registered (capacity).
    RefuseConnection {
        /// Connection to close.
        session_id: SessionId,
        /// Reason to log/convey on close.
        reason: String,
    },
}

/// Errors from relay event processing.
///
/// Sample-level failures are NOT errors - they are logged drops. These
/// variants indicate runtime bugs (double registration, events for unknown
/// sessions) rather than bad client input.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Event referenced a session the engine does not know.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// Runtime registered the same session id twice.
    #[error("session already registered: {0}")]
    SessionAlreadyExists(SessionId),
}

/// Engine state behind one lock: held briefly, never across an await.
#[derive(Debug, Default)]
struct EngineState {
    registry: TopicRegistry,
    /// Lifecycle per driver-channel session.
    ingress: HashMap<SessionId, IngressState>,
}

/// The relay orchestrator.
///
/// Shared by all connection tasks (`Arc`). The registry sits behind an
/// async `RwLock`; the directory and resolver synchronize internally.
pub struct RelayEngine<S, G> {
    state: RwLock<EngineState>,
    directory: DriverDirectory<S>,
    places: PlaceNameResolver<G>,
    config: RelayConfig,
}

impl<S, G> RelayEngine<S, G>
where
    S: DriverStore,
    G: Geocoder,
{
    /// Create a new engine over the given collaborators.
    pub fn new(store: S, geocoder: G, config: RelayConfig) -> Self {
        Self {
            state: RwLock::new(EngineState::default()),
            directory: DriverDirectory::new(store),
            places: PlaceNameResolver::new(geocoder),
            config,
        }
    }

    /// Process one relay event and return actions to execute.
    ///
    /// This is the main entry point. Events from one connection must be fed
    /// sequentially to preserve per-driver publish order; events from
    /// different connections may be processed concurrently.
    pub async fn handle_event(&self, event: RelayEvent) -> Result<Vec<RelayAction>, RelayError> {
        match event {
            RelayEvent::ConnectionAccepted { session_id, channel } => {
                self.handle_connection_accepted(session_id, channel).await
            },
            RelayEvent::EventReceived { session_id, event } => {
                self.handle_client_event(session_id, event).await
            },
            RelayEvent::ConnectionClosed { session_id, reason } => {
                self.handle_connection_closed(session_id, &reason).await
            },
        }
    }

    /// Sessions currently subscribed to a driver's topic.
    pub async fn subscribers(&self, driver_id: DriverId) -> Vec<SessionId> {
        self.state.read().await.registry.subscribers(driver_id).collect()
    }

    /// Sessions on the admin-observer channel.
    pub async fn admin_sessions(&self) -> Vec<SessionId> {
        self.state.read().await.registry.admin_sessions().collect()
    }

    /// Number of registered connections.
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.registry.session_count()
    }

    /// Whether a session is subscribed to a driver's topic.
    pub async fn is_subscribed(
        &self,
        session_id: SessionId,
        driver_id: DriverId,
    ) -> bool {
        self.state.read().await.registry.is_subscribed(session_id, driver_id)
    }

    /// The driver directory (diagnostics and tests).
    pub fn directory(&self) -> &DriverDirectory<S> {
        &self.directory
    }

    /// The place-name resolver (diagnostics and tests).
    pub fn places(&self) -> &PlaceNameResolver<G> {
        &self.places
    }

    async fn handle_connection_accepted(
        &self,
        session_id: SessionId,
        channel: Channel,
    ) -> Result<Vec<RelayAction>, RelayError> {
        let mut state = self.state.write().await;

        if state.registry.session_count() >= self.config.max_connections {
            return Ok(vec![RelayAction::RefuseConnection {
                session_id,
                reason: "max connections exceeded".to_string(),
            }]);
        }

        if !state.registry.register_session(session_id, channel) {
            return Err(RelayError::SessionAlreadyExists(session_id));
        }
        if channel == Channel::Driver {
            state.ingress.insert(session_id, IngressState::new());
        }

        tracing::debug!(session_id, ?channel, "connection accepted");
        Ok(Vec::new())
    }

    async fn handle_client_event(
        &self,
        session_id: SessionId,
        event: ClientEvent,
    ) -> Result<Vec<RelayAction>, RelayError> {
        let channel = {
            let state = self.state.read().await;
            state.registry.channel(session_id).ok_or(RelayError::SessionNotFound(session_id))?
        };

        match (channel, event) {
            (Channel::Driver, ClientEvent::DriverConnected(arg)) => {
                self.handle_driver_connected(session_id, &arg).await
            },
            (Channel::Driver, ClientEvent::LocationUpdate(sample)) => {
                self.handle_location_update(session_id, sample).await
            },
            (Channel::User, ClientEvent::SubscribeToDriver(arg)) => {
                self.handle_subscribe(session_id, &arg).await
            },
            (Channel::User, ClientEvent::UnsubscribeFromDriver(arg)) => {
                self.handle_unsubscribe(session_id, &arg).await
            },
            (channel, event) => {
                tracing::warn!(
                    session_id,
                    ?channel,
                    event = event_name(&event),
                    "event not valid on this channel, ignoring"
                );
                Ok(Vec::new())
            },
        }
    }

    async fn handle_driver_connected(
        &self,
        session_id: SessionId,
        arg: &DriverIdArg,
    ) -> Result<Vec<RelayAction>, RelayError> {
        let Some(driver_id) = arg.coerce() else {
            tracing::warn!(session_id, "driverConnected with invalid driver id, ignoring");
            return Ok(Vec::new());
        };

        let mut state = self.state.write().await;
        let identified = state
            .ingress
            .get_mut(&session_id)
            .is_some_and(|ingress| ingress.identify(driver_id));
        if identified {
            state.registry.join_as_driver(session_id, driver_id);
            tracing::info!(session_id, driver_id, "driver identified");
        }

        Ok(Vec::new())
    }

    /// Per-sample pipeline: validate, resolve metadata, resolve place name,
    /// build one payload, publish to topic and admin channel.
    async fn handle_location_update(
        &self,
        session_id: SessionId,
        sample: LocationSample,
    ) -> Result<Vec<RelayAction>, RelayError> {
        // Gate on identification, then validate the sample's own driver id.
        // Both locks are released before any await below.
        {
            let mut state = self.state.write().await;
            let Some(ingress) = state.ingress.get_mut(&session_id) else {
                tracing::warn!(session_id, "location update from non-driver session, dropping");
                return Ok(Vec::new());
            };
            if ingress.on_sample().is_none() {
                tracing::warn!(session_id, "location update before identification, dropping");
                return Ok(Vec::new());
            }
        }

        let Some(driver_id) = sample.driver_id.coerce() else {
            tracing::warn!(session_id, "location update with invalid driver id, dropping");
            return Ok(Vec::new());
        };

        let profile = match self.directory.resolve(driver_id).await {
            Ok(profile) => profile,
            Err(DirectoryError::NotFound(_)) => {
                tracing::warn!(session_id, driver_id, "unknown driver, dropping sample");
                return Ok(Vec::new());
            },
            Err(DirectoryError::Store(err)) => {
                tracing::error!(session_id, driver_id, %err, "driver store failed, dropping sample");
                return Ok(Vec::new());
            },
        };

        let place_name =
            self.places.resolve(driver_id, sample.latitude, sample.longitude).await;

        let payload = build_broadcast(&profile, &sample, place_name);

        Ok(vec![
            RelayAction::Broadcast { driver_id, payload: payload.clone() },
            RelayAction::BroadcastAdmin { payload },
        ])
    }

    async fn handle_subscribe(
        &self,
        session_id: SessionId,
        arg: &DriverIdArg,
    ) -> Result<Vec<RelayAction>, RelayError> {
        let Some(driver_id) = arg.coerce() else {
            tracing::warn!(session_id, "subscribe with invalid driver id, ignoring");
            return Ok(Vec::new());
        };

        let mut state = self.state.write().await;
        if state.registry.subscribe(session_id, driver_id) {
            tracing::debug!(session_id, driver_id, "subscribed");
        }
        Ok(Vec::new())
    }

    async fn handle_unsubscribe(
        &self,
        session_id: SessionId,
        arg: &DriverIdArg,
    ) -> Result<Vec<RelayAction>, RelayError> {
        let Some(driver_id) = arg.coerce() else {
            tracing::warn!(session_id, "unsubscribe with invalid driver id, ignoring");
            return Ok(Vec::new());
        };

        let mut state = self.state.write().await;
        if state.registry.unsubscribe(session_id, driver_id) {
            tracing::debug!(session_id, driver_id, "unsubscribed");
        }
        Ok(Vec::new())
    }

    async fn handle_connection_closed(
        &self,
        session_id: SessionId,
        reason: &str,
    ) -> Result<Vec<RelayAction>, RelayError> {
        let end = {
            let mut state = self.state.write().await;
            if let Some(mut ingress) = state.ingress.remove(&session_id) {
                ingress.close();
            }
            state.registry.unregister_session(session_id)
        };

        if let Some(end) = end {
            if let Some(driver_id) = end.released_driver {
                self.directory.invalidate(driver_id);
                self.places.forget(driver_id);
            }
            tracing::info!(
                session_id,
                reason,
                topics = end.topics.len(),
                "connection closed"
            );
        }

        Ok(Vec::new())
    }
}

impl<S, G> std::fmt::Debug for RelayEngine<S, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayEngine").finish_non_exhaustive()
    }
}

/// Assemble the single canonical payload for one update.
fn build_broadcast(
    profile: &DriverProfile,
    sample: &LocationSample,
    place_name: String,
) -> LocationBroadcast {
    LocationBroadcast {
        driver_info: DriverInfo {
            id: profile.id,
            name: profile.display_name.clone(),
            phone: profile.phone_number.clone(),
            bus_number: profile
                .assigned_vehicle_label
                .clone()
                .unwrap_or_else(|| "N/A".to_string()),
        },
        latitude: sample.latitude,
        longitude: sample.longitude,
        speed: sample.speed,
        place_name,
    }
}

/// Short event name for logs.
fn event_name(event: &ClientEvent) -> &'static str {
    match event {
        ClientEvent::DriverConnected(_) => "driverConnected",
        ClientEvent::LocationUpdate(_) => "locationUpdate",
        ClientEvent::SubscribeToDriver(_) => "subscribeToDriver",
        ClientEvent::UnsubscribeFromDriver(_) => "unsubscribeFromDriver",
    }
}
