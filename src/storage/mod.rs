//! # Persistence Collaborator
//!
//! Key-value-ish record store for Session/Transcript/Summary records, keyed
//! by session identifier. Assumed durable and strongly consistent by the
//! dispatcher. The trait is the seam; `MemoryStore` is the in-process
//! implementation, and durable backends plug in behind the same trait.

use crate::ai::Summary;
use crate::session::{AudioSource, SessionStatus};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Durable representation of a session. Superset of the in-memory session:
/// carries a title and the final duration, and outlives the registry entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: String,
    pub title: String,
    pub audio_source: AudioSource,
    pub status: SessionStatus,
    pub duration_secs: u64,
    pub created_at: DateTime<Utc>,
}

/// Flattened transcript text for one session, written once at stop time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptRecord {
    pub session_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Structured summary for one session. At most one; immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRecord {
    pub session_id: String,
    pub summary: Summary,
    pub created_at: DateTime<Utc>,
}

/// CRUD seam over the record store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, record: SessionRecord) -> Result<()>;
    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>>;
    async fn update_status(&self, session_id: &str, status: SessionStatus) -> Result<()>;
    async fn update_duration(&self, session_id: &str, duration_secs: u64) -> Result<()>;

    async fn save_transcript(&self, record: TranscriptRecord) -> Result<()>;
    async fn get_transcript(&self, session_id: &str) -> Result<Option<TranscriptRecord>>;

    async fn save_summary(&self, record: SummaryRecord) -> Result<()>;
    async fn get_summary(&self, session_id: &str) -> Result<Option<SummaryRecord>>;
}

/// In-process store backed by hash maps.
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
    transcripts: RwLock<HashMap<String, TranscriptRecord>>,
    summaries: RwLock<HashMap<String, SummaryRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, record: SessionRecord) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&record.session_id) {
            return Err(anyhow!("Session record '{}' already exists", record.session_id));
        }
        sessions.insert(record.session_id.clone(), record);
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn update_status(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(session_id)
            .ok_or_else(|| anyhow!("Session record '{}' not found", session_id))?;
        record.status = status;
        Ok(())
    }

    async fn update_duration(&self, session_id: &str, duration_secs: u64) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(session_id)
            .ok_or_else(|| anyhow!("Session record '{}' not found", session_id))?;
        record.duration_secs = duration_secs;
        Ok(())
    }

    async fn save_transcript(&self, record: TranscriptRecord) -> Result<()> {
        self.transcripts
            .write()
            .await
            .insert(record.session_id.clone(), record);
        Ok(())
    }

    async fn get_transcript(&self, session_id: &str) -> Result<Option<TranscriptRecord>> {
        Ok(self.transcripts.read().await.get(session_id).cloned())
    }

    async fn save_summary(&self, record: SummaryRecord) -> Result<()> {
        self.summaries
            .write()
            .await
            .insert(record.session_id.clone(), record);
        Ok(())
    }

    async fn get_summary(&self, session_id: &str) -> Result<Option<SummaryRecord>> {
        Ok(self.summaries.read().await.get(session_id).cloned())
    }
}
