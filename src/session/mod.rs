//! # Session Lifecycle
//!
//! One session is one continuous recording-to-summary unit of work. The
//! in-memory representation exists only while the session is active; the
//! persisted record (see `storage`) is a superset that outlives it.
//!
//! ## Lifecycle:
//! `IDLE → RECORDING ⇄ PAUSED → PROCESSING → COMPLETED`, with `ERROR`
//! reachable from any non-terminal state. Transitions are owned exclusively
//! by the event dispatcher; a session reaches a terminal state at most once.

pub mod registry;

pub use registry::{SessionHandle, SessionRegistry, SessionState};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current lifecycle state of a session. Wire representation is the
/// uppercase name (`status-update` events and persisted records).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    /// Created but not yet recording.
    Idle,
    /// Actively receiving audio.
    Recording,
    /// Recording paused, can be resumed.
    Paused,
    /// Stopped; transcript/summary post-processing in flight.
    Processing,
    /// Finished successfully. Terminal.
    Completed,
    /// Failed. Terminal.
    Error,
}

impl SessionStatus {
    /// Status string for events and persisted records.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "IDLE",
            SessionStatus::Recording => "RECORDING",
            SessionStatus::Paused => "PAUSED",
            SessionStatus::Processing => "PROCESSING",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Error => "ERROR",
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Error)
    }
}

/// Where the client captures audio from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioSource {
    Microphone,
    Tab,
}

impl AudioSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioSource::Microphone => "microphone",
            AudioSource::Tab => "tab",
        }
    }
}

/// In-memory session metadata. Buffer and accumulator live alongside it in
/// [`registry::SessionState`].
#[derive(Debug, Clone)]
pub struct Session {
    /// Opaque server-generated identifier.
    pub session_id: String,

    /// Owner identifier as supplied at `start-recording`.
    pub user_id: String,

    /// Audio source tag.
    pub source: AudioSource,

    /// Current lifecycle state.
    status: SessionStatus,

    /// When the session was created.
    pub created_at: DateTime<Utc>,

    /// Accumulated duration in seconds, derived from chunk timestamps while
    /// recording; a client-supplied value at stop wins over it.
    pub duration_secs: u64,
}

impl Session {
    pub fn new(session_id: String, user_id: String, source: AudioSource) -> Self {
        Self {
            session_id,
            user_id,
            source,
            status: SessionStatus::Idle,
            created_at: Utc::now(),
            duration_secs: 0,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// IDLE → RECORDING.
    pub fn begin_recording(&mut self) -> Result<(), String> {
        match self.status {
            SessionStatus::Idle => {
                self.status = SessionStatus::Recording;
                Ok(())
            }
            other => Err(format!("Cannot begin recording from status {}", other.as_str())),
        }
    }

    /// RECORDING → PAUSED.
    pub fn pause(&mut self) -> Result<(), String> {
        match self.status {
            SessionStatus::Recording => {
                self.status = SessionStatus::Paused;
                Ok(())
            }
            other => Err(format!("Cannot pause from status {}", other.as_str())),
        }
    }

    /// PAUSED → RECORDING.
    pub fn resume(&mut self) -> Result<(), String> {
        match self.status {
            SessionStatus::Paused => {
                self.status = SessionStatus::Recording;
                Ok(())
            }
            other => Err(format!("Cannot resume from status {}", other.as_str())),
        }
    }

    /// Any non-terminal state → PROCESSING. This is the single entry into
    /// post-processing; it can succeed at most once per session.
    pub fn begin_processing(&mut self) -> Result<(), String> {
        if self.status.is_terminal() || self.status == SessionStatus::Processing {
            return Err(format!(
                "Cannot begin processing from status {}",
                self.status.as_str()
            ));
        }
        self.status = SessionStatus::Processing;
        Ok(())
    }

    /// PROCESSING → COMPLETED.
    pub fn complete(&mut self) -> Result<(), String> {
        match self.status {
            SessionStatus::Processing => {
                self.status = SessionStatus::Completed;
                Ok(())
            }
            other => Err(format!("Cannot complete from status {}", other.as_str())),
        }
    }

    /// Any non-terminal state → ERROR. Idempotent on already-failed
    /// sessions so error paths can mark unconditionally.
    pub fn fail(&mut self) {
        if !self.status.is_terminal() {
            self.status = SessionStatus::Error;
        }
    }
}
