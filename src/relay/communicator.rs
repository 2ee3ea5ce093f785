//! Broadcast registry shared by all sessions.
//!
//! The communicator maps network identifiers to the outbound endpoint of
//! every session currently joined to its channel. Relaying a line from
//! one session delivers it to all the others.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::{debug, trace, warn};

use super::transport::Transport;
use crate::irc::Command;
use crate::Result;

/// Outbound endpoint of a joined session.
#[derive(Clone)]
pub struct SessionHandle {
    identifier: String,
    channel: String,
    outbound: bool,
    transport: Arc<dyn Transport>,
}

impl SessionHandle {
    /// Create a handle for `channel` on the given transport.
    ///
    /// When `outbound` is false every channel message is dropped.
    pub fn new(
        identifier: impl Into<String>,
        channel: impl Into<String>,
        outbound: bool,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            channel: channel.into(),
            outbound,
            transport,
        }
    }

    /// Get the network identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Get the channel name.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Send `message` to the channel, unless outbound traffic is disabled.
    pub fn say_to_channel(&self, message: &str) -> Result<()> {
        if !self.outbound {
            trace!(network = %self.identifier, "Read-only network, dropping outbound message");
            return Ok(());
        }
        self.transport
            .send(Command::privmsg(self.channel.as_str(), message))
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("identifier", &self.identifier)
            .field("channel", &self.channel)
            .field("outbound", &self.outbound)
            .finish_non_exhaustive()
    }
}

/// Registry of joined sessions.
///
/// Shared across runner tasks; the lock is only held for map access,
/// never while sending.
#[derive(Default)]
pub struct Communicator {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl Communicator {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, replacing any entry with the same identifier.
    ///
    /// Returns true if an earlier entry was replaced.
    pub fn register(&self, handle: SessionHandle) -> bool {
        let identifier = handle.identifier.clone();
        let replaced = self
            .sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(identifier.clone(), handle)
            .is_some();
        debug!(network = %identifier, replaced, "Registered with communicator");
        replaced
    }

    /// Remove a session.
    ///
    /// Returns false if it was not registered; that is not an error.
    pub fn unregister(&self, identifier: &str) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(identifier)
            .is_some();
        if removed {
            debug!(network = %identifier, "Unregistered from communicator");
        } else {
            debug!(network = %identifier, "No session registered with this identifier");
        }
        removed
    }

    /// Check if a session is registered.
    pub fn is_registered(&self, identifier: &str) -> bool {
        self.read().contains_key(identifier)
    }

    /// Get the number of registered sessions.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Check if no session is registered.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Get the registered identifiers, sorted.
    pub fn identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Deliver `message` to every registered session except `source`.
    ///
    /// A failed delivery is logged and does not stop the others.
    /// Returns the number of successful deliveries.
    pub fn relay(&self, source: &str, message: &str) -> usize {
        let targets: Vec<SessionHandle> = self
            .read()
            .values()
            .filter(|h| h.identifier != source)
            .cloned()
            .collect();

        let mut delivered = 0;
        for target in targets {
            match target.say_to_channel(message) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(network = %target.identifier, source = %source, "Relay delivery failed: {}", e);
                }
            }
        }
        delivered
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, SessionHandle>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::testing::RecordingTransport;
    use crate::RelayError;

    struct BrokenTransport;

    impl Transport for BrokenTransport {
        fn send(&self, _command: Command) -> Result<()> {
            Err(RelayError::ChannelClosed("broken".to_string()))
        }
    }

    fn handle(id: &str, transport: &Arc<RecordingTransport>) -> SessionHandle {
        SessionHandle::new(id, "#x", true, transport.clone())
    }

    #[test]
    fn test_communicator_new() {
        let communicator = Communicator::new();
        assert!(communicator.is_empty());
        assert_eq!(communicator.len(), 0);
    }

    #[test]
    fn test_relay_skips_source() {
        let communicator = Communicator::new();
        let a = Arc::new(RecordingTransport::default());
        let b = Arc::new(RecordingTransport::default());
        let c = Arc::new(RecordingTransport::default());
        communicator.register(handle("a", &a));
        communicator.register(handle("b", &b));
        communicator.register(handle("c", &c));

        let delivered = communicator.relay("a", "[alice] hi");

        assert_eq!(delivered, 2);
        assert!(a.sent().is_empty());
        assert_eq!(b.sent(), vec![Command::privmsg("#x", "[alice] hi")]);
        assert_eq!(c.sent(), vec![Command::privmsg("#x", "[alice] hi")]);
    }

    #[test]
    fn test_unregister_absent_is_noop() {
        let communicator = Communicator::new();
        assert!(!communicator.unregister("missing"));

        let a = Arc::new(RecordingTransport::default());
        communicator.register(handle("a", &a));
        assert!(communicator.unregister("a"));
        assert!(!communicator.unregister("a"));
        assert!(communicator.is_empty());
    }

    #[test]
    fn test_register_replaces_entry() {
        let communicator = Communicator::new();
        let old = Arc::new(RecordingTransport::default());
        let new = Arc::new(RecordingTransport::default());
        let other = Arc::new(RecordingTransport::default());

        assert!(!communicator.register(handle("a", &old)));
        assert!(communicator.register(handle("a", &new)));
        communicator.register(handle("b", &other));

        assert_eq!(communicator.len(), 2);
        assert_eq!(communicator.identifiers(), vec!["a", "b"]);

        communicator.relay("b", "hello");
        assert!(old.sent().is_empty());
        assert_eq!(new.sent().len(), 1);
    }

    #[test]
    fn test_relay_isolates_failures() {
        let communicator = Communicator::new();
        let ok = Arc::new(RecordingTransport::default());
        communicator.register(SessionHandle::new("broken", "#x", true, Arc::new(BrokenTransport)));
        communicator.register(handle("ok", &ok));

        let delivered = communicator.relay("source", "msg");

        assert_eq!(delivered, 1);
        assert_eq!(ok.sent(), vec![Command::privmsg("#x", "msg")]);
    }

    #[test]
    fn test_read_only_handle_drops_message() {
        let transport = Arc::new(RecordingTransport::default());
        let handle = SessionHandle::new("ro", "#x", false, transport.clone());

        assert!(handle.say_to_channel("anything").is_ok());
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_relay_with_single_session() {
        let communicator = Communicator::new();
        let a = Arc::new(RecordingTransport::default());
        communicator.register(handle("a", &a));

        assert_eq!(communicator.relay("a", "alone"), 0);
        assert!(a.sent().is_empty());
    }
}
