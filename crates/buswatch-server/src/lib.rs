//! Buswatch production server.
//!
//! Production runtime for the location relay: WebSocket transport over
//! Tokio, redb-backed driver records, and HTTP reverse geocoding.
//!
//! # Architecture
//!
//! This crate is glue around [`buswatch_core`]'s action-based engine. Each
//! accepted connection gets its own task that upgrades, authenticates,
//! registers with the [`RelayEngine`], and then feeds decoded events in
//! sequentially - per-connection sequencing is what preserves a driver's
//! publish order. Returned actions are executed here: the subscriber set is
//! snapshotted, the payload serialized once, and the text frame pushed to
//! each session's outbound queue, fire-and-forget.
//!
//! # Components
//!
//! - [`Server`]: accept loop and per-connection lifecycle
//! - [`WsTransport`]: WebSocket listener with path-based channel routing
//! - [`HttpGeocoder`]: bounded-timeout reverse geocoding
//! - [`RedbDriverStore`]: durable driver records
//! - [`HmacTokenVerifier`]: connection gate for all three channels
//! - [`SystemEnv`]: real time and OS RNG

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod auth;
mod error;
mod geocode;
mod store;
mod system_env;
mod transport;

use std::{collections::HashMap, path::PathBuf, sync::Arc};

pub use auth::{AuthError, Claims, HmacTokenVerifier, TokenVerifier};
use buswatch_core::{
    Channel, RelayAction, RelayConfig, RelayEngine, RelayEvent, SessionId, env::Environment,
};
use buswatch_proto::{ClientEvent, LocationBroadcast, ServerEvent};
pub use error::ServerError;
use futures_util::{SinkExt, StreamExt};
pub use geocode::{GeocoderConfig, HttpGeocoder};
pub use store::RedbDriverStore;
pub use system_env::SystemEnv;
use tokio::{
    net::TcpStream,
    sync::{RwLock, mpsc},
};
use tokio_tungstenite::tungstenite::Message;
pub use transport::{WsConnection, WsTransport};

/// The engine instantiation the production server runs.
pub type ProductionEngine = RelayEngine<RedbDriverStore, HttpGeocoder>;

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:3000")
    pub bind_address: String,
    /// Path to the redb driver store.
    pub store_path: PathBuf,
    /// Shared secret for token verification.
    pub auth_secret: String,
    /// Reverse-geocoding configuration.
    pub geocoder: GeocoderConfig,
    /// Relay engine configuration (connection limits).
    pub relay: RelayConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            store_path: PathBuf::from("buswatch.redb"),
            auth_secret: "insecure-dev-secret".to_string(),
            geocoder: GeocoderConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

/// Shared per-session outbound queues.
///
/// All messages to a client go through its single unbounded sender,
/// ensuring ordering; the writer task drains the queue into the socket.
struct SharedState {
    senders: RwLock<HashMap<SessionId, mpsc::UnboundedSender<Message>>>,
}

/// Production buswatch server.
///
/// Wraps the relay engine with WebSocket transport and system environment.
pub struct Server {
    engine: Arc<ProductionEngine>,
    transport: WsTransport,
    verifier: Arc<HmacTokenVerifier>,
    env: SystemEnv,
}

impl Server {
    /// Create and bind a new server.
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let store = RedbDriverStore::open(&config.store_path)?;
        let geocoder = HttpGeocoder::new(config.geocoder.clone())?;
        let engine = Arc::new(RelayEngine::new(store, geocoder, config.relay.clone()));
        let verifier = Arc::new(HmacTokenVerifier::new(config.auth_secret.into_bytes()));
        let transport = WsTransport::bind(&config.bind_address).await?;

        Ok(Self { engine, transport, verifier, env: SystemEnv::new() })
    }

    /// Run the server, accepting connections and relaying updates.
    ///
    /// This method runs until the process is shut down or an accept-level
    /// error occurs.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Relay listening on {}", self.transport.local_addr()?);

        let shared = Arc::new(SharedState { senders: RwLock::new(HashMap::new()) });

        loop {
            match self.transport.accept().await {
                Ok((stream, peer)) => {
                    let engine = Arc::clone(&self.engine);
                    let shared = Arc::clone(&shared);
                    let verifier = Arc::clone(&self.verifier);
                    let env = self.env.clone();

                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_connection(stream, peer, engine, shared, verifier, env).await
                        {
                            tracing::error!("Connection error: {}", e);
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                },
            }
        }
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.transport.local_addr()
    }
}

/// Handle a single client connection from upgrade to close.
async fn handle_connection(
    stream: TcpStream,
    peer: std::net::SocketAddr,
    engine: Arc<ProductionEngine>,
    shared: Arc<SharedState>,
    verifier: Arc<HmacTokenVerifier>,
    env: SystemEnv,
) -> Result<(), ServerError> {
    let conn = transport::upgrade(stream, peer).await?;
    let channel = conn.channel;
    let mut socket = conn.socket;

    let claims = match authorize(verifier.as_ref(), channel, conn.token.as_deref()).await {
        Ok(claims) => claims,
        Err(err) => {
            tracing::warn!(%peer, ?channel, %err, "rejecting connection");
            let _ = socket.close(None).await;
            return Ok(());
        },
    };

    let session_id = env.random_u64();
    let started = env.now();
    tracing::debug!(session_id, %peer, ?channel, subject = claims.subject, "connection open");

    let actions = engine
        .handle_event(RelayEvent::ConnectionAccepted { session_id, channel })
        .await?;
    if actions.iter().any(|a| matches!(a, RelayAction::RefuseConnection { .. })) {
        tracing::warn!(session_id, %peer, "refusing connection: server at capacity");
        let _ = socket.close(None).await;
        return Ok(());
    }

    let (mut sink, mut reader) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    shared.senders.write().await.insert(session_id, tx);

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    // Events from one connection are processed to completion in arrival
    // order; a driver's samples publish in receipt order.
    while let Some(message) = reader.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let event = match ClientEvent::from_json(&text) {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(session_id, %err, "dropping malformed event");
                        continue;
                    },
                };

                match engine
                    .handle_event(RelayEvent::EventReceived { session_id, event })
                    .await
                {
                    Ok(actions) => execute_actions(&engine, &shared, actions).await,
                    Err(err) => {
                        tracing::warn!(session_id, %err, "event processing error");
                    },
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}, // ping/pong/binary: transport-level, nothing to relay
            Err(err) => {
                tracing::debug!(session_id, %err, "read error");
                break;
            },
        }
    }

    shared.senders.write().await.remove(&session_id);
    writer.abort();

    engine
        .handle_event(RelayEvent::ConnectionClosed {
            session_id,
            reason: "connection closed".to_string(),
        })
        .await?;

    tracing::info!(session_id, %peer, elapsed = ?(env.now() - started), "connection finished");
    Ok(())
}

/// Gate a connection on its presented token.
///
/// All three channels require a valid token; the admin-observer channel
/// additionally requires the `admin` role.
async fn authorize(
    verifier: &HmacTokenVerifier,
    channel: Channel,
    token: Option<&str>,
) -> Result<Claims, AuthError> {
    let token = token.ok_or(AuthError::Missing)?;
    let claims = verifier.verify(token).await?;

    if channel == Channel::Admin && claims.role != "admin" {
        return Err(AuthError::WrongRole(claims.role));
    }

    Ok(claims)
}

/// Execute relay actions against live connections.
async fn execute_actions(
    engine: &ProductionEngine,
    shared: &SharedState,
    actions: Vec<RelayAction>,
) {
    for action in actions {
        match action {
            RelayAction::Broadcast { driver_id, payload } => {
                let targets = engine.subscribers(driver_id).await;
                deliver(shared, &targets, payload).await;
            },

            RelayAction::BroadcastAdmin { payload } => {
                let targets = engine.admin_sessions().await;
                deliver(shared, &targets, payload).await;
            },

            RelayAction::RefuseConnection { session_id, reason } => {
                // Refusals are produced before a session registers, so they
                // are handled at accept time; seeing one here is a bug.
                tracing::warn!(session_id, %reason, "unexpected refusal action");
            },
        }
    }
}

/// Serialize once, deliver to every target, fire-and-forget.
///
/// A send failure means the target is mid-disconnect; it just misses this
/// update (at-most-once delivery).
async fn deliver(shared: &SharedState, targets: &[SessionId], payload: LocationBroadcast) {
    if targets.is_empty() {
        return;
    }

    let text = match ServerEvent::LocationUpdate(payload).to_json() {
        Ok(text) => text,
        Err(err) => {
            tracing::error!(%err, "failed to encode broadcast");
            return;
        },
    };

    let senders = shared.senders.read().await;
    for session_id in targets {
        if let Some(sender) = senders.get(session_id) {
            if sender.send(Message::text(text.clone())).is_err() {
                tracing::warn!(session_id = *session_id, "delivery to closing session skipped");
            }
        }
    }
}
