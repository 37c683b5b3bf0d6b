//! # Protocol Events
//!
//! Wire types for the bidirectional event channel. Frames are tagged JSON:
//! a kebab-case `type` discriminator with camelCase payload fields.
//!
//! Audio bytes travel base64-encoded inside `audio-chunk` frames so the
//! whole protocol stays on text frames; chunk size is bounded by the
//! transport maximum (10 MB per message), enforced before dispatch.

use crate::session::{AudioSource, SessionStatus};
use crate::transcript::TranscriptFragment;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Inbound events from the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Create a session and start recording.
    #[serde(rename = "start-recording", rename_all = "camelCase")]
    StartRecording {
        user_id: String,
        audio_source: AudioSource,
    },

    /// One audio fragment. `chunk` is base64-encoded raw bytes;
    /// `timestamp` is milliseconds since session start.
    #[serde(rename = "audio-chunk", rename_all = "camelCase")]
    AudioChunk {
        session_id: String,
        chunk: String,
        timestamp: u64,
    },

    #[serde(rename = "pause-recording", rename_all = "camelCase")]
    PauseRecording { session_id: String },

    #[serde(rename = "resume-recording", rename_all = "camelCase")]
    ResumeRecording { session_id: String },

    /// Stop and post-process. `client_transcript` is the browser-side
    /// speech-recognition fallback; `duration` (seconds) overrides the
    /// server-accumulated duration when present.
    #[serde(rename = "stop-recording", rename_all = "camelCase")]
    StopRecording {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_transcript: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<u64>,
    },

    /// Subscribe this connection to an existing session's broadcast group
    /// (additional viewers of a session in progress).
    #[serde(rename = "join-session", rename_all = "camelCase")]
    JoinSession { session_id: String },
}

/// Outbound events to clients. Session-scoped variants fan out to every
/// subscriber of the session's broadcast group; `Error` is always
/// connection-scoped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session-created", rename_all = "camelCase")]
    SessionCreated { session_id: String },

    #[serde(rename = "transcription-update", rename_all = "camelCase")]
    TranscriptionUpdate {
        session_id: String,
        chunk: TranscriptFragment,
    },

    #[serde(rename = "status-update", rename_all = "camelCase")]
    StatusUpdate {
        session_id: String,
        status: SessionStatus,
    },

    #[serde(rename = "processing-complete", rename_all = "camelCase")]
    ProcessingComplete {
        session_id: String,
        download_url: String,
    },

    #[serde(rename = "error", rename_all = "camelCase")]
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>, code: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
            code: Some(code.into()),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Decode a base64 `chunk` payload into raw bytes.
pub fn decode_chunk(chunk: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(chunk)
}

/// Encode raw bytes for an `audio-chunk` payload.
pub fn encode_chunk(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
