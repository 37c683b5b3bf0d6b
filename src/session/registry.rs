//! # Session Registry & Broadcast Groups
//!
//! Process-wide mapping from session identifier to its live state: buffer,
//! accumulator, lifecycle metadata, and the session's broadcast group. The
//! registry is an explicit, lifecycle-scoped object owned by the dispatcher
//! rather than a global map, with `create`/`get`/`remove` as the only
//! mutation surface.
//!
//! ## Concurrency:
//! The registry map uses an `RwLock` for map operations only (no await
//! while held). Per-session mutable state sits behind a `tokio::Mutex` on
//! the handle; a handler holds that lock across its awaits, which is what
//! serializes inbound events per session. Handlers for different sessions
//! share nothing mutable and run fully concurrently.

use crate::audio::BoundedAudioBuffer;
use crate::events::ServerEvent;
use crate::transcript::TranscriptAccumulator;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, Mutex};
use tracing::debug;
use uuid::Uuid;

use super::{AudioSource, Session};

/// Mutable per-session state, guarded by the handle's mutex.
#[derive(Debug)]
pub struct SessionState {
    pub session: Session,
    pub buffer: BoundedAudioBuffer,
    pub accumulator: TranscriptAccumulator,
}

/// One registry entry: broadcast group plus the serialized session state.
#[derive(Debug)]
pub struct SessionHandle {
    /// Session identifier (duplicated here so subscribers never need the
    /// state lock just to know which session they joined).
    pub session_id: String,

    /// Per-session multicast group. Every connection viewing this session
    /// holds a receiver.
    events: broadcast::Sender<ServerEvent>,

    /// Serialized mutable state. Held across awaits by event handlers.
    pub state: Mutex<SessionState>,
}

impl SessionHandle {
    /// Subscribe a connection to this session's outbound events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Fan an event out to all subscribers. A session with no remaining
    /// receivers is not an error; the event is simply dropped.
    pub fn emit(&self, event: ServerEvent) {
        if self.events.send(event).is_err() {
            debug!("session {}: no subscribers for event", self.session_id);
        }
    }

    /// Number of currently subscribed connections.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }
}

/// Registry of all active sessions. Exactly one entry per active session
/// identifier; a removed entry cannot be reused.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
    max_concurrent_sessions: usize,
    buffer_ceiling_bytes: usize,
    broadcast_capacity: usize,
}

impl SessionRegistry {
    pub fn new(
        max_concurrent_sessions: usize,
        buffer_ceiling_bytes: usize,
        broadcast_capacity: usize,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_concurrent_sessions,
            buffer_ceiling_bytes,
            broadcast_capacity,
        }
    }

    /// Create a new session with a fresh server-generated identifier, an
    /// empty buffer/accumulator pair, and a fresh broadcast group.
    pub fn create(&self, user_id: String, source: AudioSource) -> Result<Arc<SessionHandle>, String> {
        let mut sessions = self.sessions.write().unwrap();

        if sessions.len() >= self.max_concurrent_sessions {
            return Err(format!(
                "Maximum concurrent sessions ({}) reached",
                self.max_concurrent_sessions
            ));
        }

        let session_id = Uuid::new_v4().to_string();
        if sessions.contains_key(&session_id) {
            return Err(format!("Session ID '{}' already exists", session_id));
        }

        let (events, _) = broadcast::channel(self.broadcast_capacity);
        let handle = Arc::new(SessionHandle {
            session_id: session_id.clone(),
            events,
            state: Mutex::new(SessionState {
                session: Session::new(session_id.clone(), user_id, source),
                buffer: BoundedAudioBuffer::new(self.buffer_ceiling_bytes),
                accumulator: TranscriptAccumulator::new(),
            }),
        });

        sessions.insert(session_id, Arc::clone(&handle));
        Ok(handle)
    }

    /// Look up an active session.
    pub fn get(&self, session_id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.read().unwrap().get(session_id).cloned()
    }

    /// Tear down a session's registry entry. The buffer and accumulator are
    /// discarded with the last handle reference.
    pub fn remove(&self, session_id: &str) -> bool {
        self.sessions.write().unwrap().remove(session_id).is_some()
    }

    /// Number of active sessions.
    pub fn active_count(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    /// Identifiers of all active sessions.
    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.read().unwrap().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStatus;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(4, 1024, 16)
    }

    #[tokio::test]
    async fn test_create_get_remove() {
        let registry = registry();
        let handle = registry.create("u1".into(), AudioSource::Microphone).unwrap();
        let id = handle.session_id.clone();

        assert_eq!(registry.active_count(), 1);
        let looked_up = registry.get(&id).unwrap();
        assert_eq!(looked_up.session_id, id);
        {
            let state = looked_up.state.lock().await;
            assert_eq!(state.session.status(), SessionStatus::Idle);
            assert!(state.buffer.is_empty());
            assert!(state.accumulator.is_empty());
        }

        assert!(registry.remove(&id));
        assert!(registry.get(&id).is_none());
        assert!(!registry.remove(&id));
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn test_session_limit_enforced() {
        let registry = SessionRegistry::new(2, 1024, 16);
        registry.create("u1".into(), AudioSource::Microphone).unwrap();
        registry.create("u2".into(), AudioSource::Tab).unwrap();

        let err = registry.create("u3".into(), AudioSource::Tab).unwrap_err();
        assert!(err.contains("Maximum concurrent sessions"));
        assert_eq!(registry.active_count(), 2);
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = registry();
        let a = registry.create("u1".into(), AudioSource::Microphone).unwrap();
        let b = registry.create("u1".into(), AudioSource::Microphone).unwrap();
        assert_ne!(a.session_id, b.session_id);
        assert_eq!(registry.session_ids().len(), 2);
    }

    #[tokio::test]
    async fn test_broadcast_fans_out_to_all_subscribers() {
        let registry = registry();
        let handle = registry.create("u1".into(), AudioSource::Tab).unwrap();

        let mut viewer_a = handle.subscribe();
        let mut viewer_b = handle.subscribe();
        assert_eq!(handle.subscriber_count(), 2);

        handle.emit(ServerEvent::StatusUpdate {
            session_id: handle.session_id.clone(),
            status: SessionStatus::Recording,
        });

        for viewer in [&mut viewer_a, &mut viewer_b] {
            match viewer.recv().await.unwrap() {
                ServerEvent::StatusUpdate { status, .. } => {
                    assert_eq!(status, SessionStatus::Recording);
                }
                other => panic!("wrong event: {:?}", other),
            }
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_not_an_error() {
        let registry = registry();
        let handle = registry.create("u1".into(), AudioSource::Tab).unwrap();
        handle.emit(ServerEvent::SessionCreated {
            session_id: handle.session_id.clone(),
        });
    }
}
