//! Topic registry for session and subscription tracking.
//!
//! The registry maintains bidirectional mappings: topic → sessions (for
//! publish) and session → topics (for cleanup on disconnect). This enables
//! O(1) lookups in both directions.
//!
//! Topics are identified by driver id and spring into existence on first
//! subscribe; a publish to a topic nobody subscribed to is valid and simply
//! delivers to no one. All state is in-memory for the lifetime of the
//! connection - after a reconnect, clients re-subscribe from scratch.

use std::collections::{HashMap, HashSet};

use buswatch_proto::DriverId;

/// Unique handle for one open connection, assigned by the runtime.
pub type SessionId = u64;

/// Which logical channel a connection belongs to.
///
/// Mirrors the three connection endpoints: drivers push samples, users
/// subscribe per driver, admins observe everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Driver ingress: pushes location samples.
    Driver,
    /// User subscriber: receives per-driver streams it asked for.
    User,
    /// Admin observer: receives every valid update.
    Admin,
}

/// What a session left behind when it was unregistered.
#[derive(Debug, Clone)]
pub struct SessionEnd {
    /// Channel the session was registered on.
    pub channel: Channel,
    /// Topics the session was subscribed to.
    pub topics: HashSet<DriverId>,
    /// Driver whose LAST ingress connection this was, if any. The caller
    /// releases that driver's cached metadata and place-name history.
    pub released_driver: Option<DriverId>,
}

/// Registry for tracking sessions, topic subscriptions, and ingress bindings.
///
/// Maintains bidirectional mappings for efficient lookups:
/// - Get all subscribers of a driver's topic (for publish)
/// - Get all topics a session is in (for cleanup)
/// - Get the ingress sessions of a driver (for cache release on disconnect)
#[derive(Debug, Default)]
pub struct TopicRegistry {
    /// Session ID → channel
    sessions: HashMap<SessionId, Channel>,
    /// Driver ID → set of subscribed session IDs
    topic_subscribers: HashMap<DriverId, HashSet<SessionId>>,
    /// Session ID → set of subscribed driver IDs
    session_topics: HashMap<SessionId, HashSet<DriverId>>,
    /// Driver ID → ingress sessions currently bound to it. Normally one,
    /// but a driver running the app on two devices is tolerated.
    ingress_sessions: HashMap<DriverId, HashSet<SessionId>>,
    /// Session ID → driver it is bound to as ingress (reverse index)
    session_ingress: HashMap<SessionId, DriverId>,
    /// Admin-observer sessions
    admin_sessions: HashSet<SessionId>,
}

impl TopicRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session on a channel.
    ///
    /// Returns `false` if the session id is already registered.
    pub fn register_session(&mut self, session_id: SessionId, channel: Channel) -> bool {
        if self.sessions.contains_key(&session_id) {
            return false;
        }

        self.sessions.insert(session_id, channel);
        self.session_topics.insert(session_id, HashSet::new());
        if channel == Channel::Admin {
            self.admin_sessions.insert(session_id);
        }
        true
    }

    /// Bind a driver ingress connection to its own topic.
    ///
    /// The binding is what lets disconnect release that driver's cached
    /// state; the ingress is the publisher, not a subscriber, so this does
    /// NOT add the session to the topic's subscriber set. Re-identifying
    /// with a different id moves the binding.
    ///
    /// Returns `false` if the session is not registered.
    pub fn join_as_driver(&mut self, session_id: SessionId, driver_id: DriverId) -> bool {
        if !self.sessions.contains_key(&session_id) {
            return false;
        }

        if let Some(previous) = self.session_ingress.insert(session_id, driver_id) {
            if previous != driver_id {
                self.remove_ingress(session_id, previous);
            }
        }
        self.ingress_sessions.entry(driver_id).or_default().insert(session_id);
        true
    }

    /// Driver a session is bound to as ingress, if any.
    pub fn ingress_driver(&self, session_id: SessionId) -> Option<DriverId> {
        self.session_ingress.get(&session_id).copied()
    }

    /// Subscribe a session to a driver's topic. Idempotent.
    ///
    /// Returns `false` if the session is not registered.
    pub fn subscribe(&mut self, session_id: SessionId, driver_id: DriverId) -> bool {
        if !self.sessions.contains_key(&session_id) {
            return false;
        }

        self.topic_subscribers.entry(driver_id).or_default().insert(session_id);
        self.session_topics.entry(session_id).or_default().insert(driver_id);
        true
    }

    /// Unsubscribe a session from a driver's topic. Idempotent; a no-op
    /// when the session never subscribed.
    ///
    /// Returns `true` if the session was subscribed and is now unsubscribed.
    pub fn unsubscribe(&mut self, session_id: SessionId, driver_id: DriverId) -> bool {
        let removed_from_topic =
            self.topic_subscribers.get_mut(&driver_id).is_some_and(|s| s.remove(&session_id));

        let removed_from_session =
            self.session_topics.get_mut(&session_id).is_some_and(|t| t.remove(&driver_id));

        if self.topic_subscribers.get(&driver_id).is_some_and(HashSet::is_empty) {
            self.topic_subscribers.remove(&driver_id);
        }

        removed_from_topic && removed_from_session
    }

    /// Check if a session is subscribed to a driver's topic.
    pub fn is_subscribed(&self, session_id: SessionId, driver_id: DriverId) -> bool {
        self.topic_subscribers.get(&driver_id).is_some_and(|s| s.contains(&session_id))
    }

    /// All sessions subscribed to a driver's topic.
    ///
    /// An unknown or empty topic yields an empty iterator, never an error.
    pub fn subscribers(&self, driver_id: DriverId) -> impl Iterator<Item = SessionId> + '_ {
        self.topic_subscribers.get(&driver_id).into_iter().flat_map(|s| s.iter().copied())
    }

    /// All admin-observer sessions.
    pub fn admin_sessions(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.admin_sessions.iter().copied()
    }

    /// All topics a session is subscribed to.
    pub fn topics_for_session(&self, session_id: SessionId) -> impl Iterator<Item = DriverId> + '_ {
        self.session_topics.get(&session_id).into_iter().flat_map(|t| t.iter().copied())
    }

    /// Channel a session was registered on. `None` if unknown.
    pub fn channel(&self, session_id: SessionId) -> Option<Channel> {
        self.sessions.get(&session_id).copied()
    }

    /// Check if a session is registered.
    pub fn has_session(&self, session_id: SessionId) -> bool {
        self.sessions.contains_key(&session_id)
    }

    /// Unregister a session and remove it from every topic it is a member
    /// of, in either role.
    ///
    /// Returns what the session left behind, or `None` if it was unknown.
    pub fn unregister_session(&mut self, session_id: SessionId) -> Option<SessionEnd> {
        let channel = self.sessions.remove(&session_id)?;
        let topics = self.session_topics.remove(&session_id).unwrap_or_default();

        for driver_id in &topics {
            if let Some(subscribers) = self.topic_subscribers.get_mut(driver_id) {
                subscribers.remove(&session_id);
                if subscribers.is_empty() {
                    self.topic_subscribers.remove(driver_id);
                }
            }
        }

        self.admin_sessions.remove(&session_id);

        let released_driver = self
            .session_ingress
            .remove(&session_id)
            .filter(|driver_id| self.remove_ingress(session_id, *driver_id));

        Some(SessionEnd { channel, topics, released_driver })
    }

    /// Total number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of sessions subscribed to a driver's topic.
    pub fn subscriber_count(&self, driver_id: DriverId) -> usize {
        self.topic_subscribers.get(&driver_id).map_or(0, HashSet::len)
    }

    /// Remove one ingress binding; `true` if it was the driver's last.
    fn remove_ingress(&mut self, session_id: SessionId, driver_id: DriverId) -> bool {
        let Some(sessions) = self.ingress_sessions.get_mut(&driver_id) else {
            return false;
        };
        sessions.remove(&session_id);
        if sessions.is_empty() {
            self.ingress_sessions.remove(&driver_id);
            return true;
        }
        false
    }
}
