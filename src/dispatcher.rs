//! # Event Dispatcher
//!
//! Single entry point translating inbound protocol events into registry,
//! buffer, and accumulator operations, external collaborator calls,
//! persistence writes, and outbound events. Side effects are observable
//! only through emitted events, persisted records, and registry state.
//!
//! ## Containment:
//! Every handler failure is converted into a [`DispatchError`] that the
//! connection layer sends to the originating connection only — never
//! broadcast. A failure in one session's handling cannot touch another
//! session's registry entry, buffer, or accumulator, and a single failed
//! operation (one bad transcription, one rejected write) must not corrupt
//! its session.
//!
//! ## Ordering:
//! Each handler locks the session's state mutex and holds it across its
//! awaits. Inbound events for one session therefore process strictly in
//! arrival order, transcription calls are serialized per session, and the
//! accumulator's append order is chronological. Different sessions share no
//! mutable state and run fully concurrently.

use crate::ai::{Summarizer, Transcriber, DEGRADED_PLACEHOLDER};
use crate::events::ServerEvent;
use crate::session::{AudioSource, SessionHandle, SessionRegistry, SessionState, SessionStatus};
use crate::storage::{SessionRecord, SessionStore, SummaryRecord, TranscriptRecord};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Transcript content persisted when a session ends with no usable
/// server-side transcript and no client fallback.
pub const NO_TRANSCRIPT_FALLBACK: &str = "No transcript available";

/// Failure of one inbound-event handler. Carried back to the originating
/// connection as an `error` event with a stable machine-readable code.
#[derive(Debug)]
pub enum DispatchError {
    /// Inbound event referenced an unknown session identifier.
    SessionNotFound(String),

    /// The session exists but its lifecycle state forbids the operation.
    InvalidState(String),

    /// The event payload itself is unusable (bad encoding, oversized chunk).
    InvalidPayload(String),

    /// The registry refused to create a session (capacity).
    Capacity(String),

    /// A persistence write failed before any state advanced.
    Storage(String),

    /// Stop-time post-processing failed after the session had already
    /// advanced to PROCESSING; the session was marked ERROR.
    Processing(String),
}

impl DispatchError {
    /// Stable code for the outbound `error` event.
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::SessionNotFound(_) => "session_not_found",
            DispatchError::InvalidState(_) => "invalid_state",
            DispatchError::InvalidPayload(_) => "invalid_payload",
            DispatchError::Capacity(_) => "too_many_sessions",
            DispatchError::Storage(_) => "storage_error",
            DispatchError::Processing(_) => "processing_failed",
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::SessionNotFound(id) => write!(f, "Session not found: {}", id),
            DispatchError::InvalidState(msg) => write!(f, "{}", msg),
            DispatchError::InvalidPayload(msg) => write!(f, "Invalid payload: {}", msg),
            DispatchError::Capacity(msg) => write!(f, "{}", msg),
            DispatchError::Storage(msg) => write!(f, "Storage error: {}", msg),
            DispatchError::Processing(msg) => write!(f, "Processing failed: {}", msg),
        }
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Owns the registry and the collaborator seams; one handler per inbound
/// protocol event.
pub struct EventDispatcher {
    registry: Arc<SessionRegistry>,
    transcriber: Arc<dyn Transcriber>,
    summarizer: Arc<dyn Summarizer>,
    store: Arc<dyn SessionStore>,
}

impl EventDispatcher {
    pub fn new(
        registry: Arc<SessionRegistry>,
        transcriber: Arc<dyn Transcriber>,
        summarizer: Arc<dyn Summarizer>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            registry,
            transcriber,
            summarizer,
            store,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    fn lookup(&self, session_id: &str) -> DispatchResult<Arc<SessionHandle>> {
        self.registry
            .get(session_id)
            .ok_or_else(|| DispatchError::SessionNotFound(session_id.to_string()))
    }

    /// `start-recording`: create the registry entry, persist the durable
    /// session record, and hand the caller the session handle so its
    /// connection can subscribe and send `session-created`.
    ///
    /// Persistence failure here is fatal to the operation: the registry
    /// entry is removed and no session exists afterwards.
    pub async fn handle_start(
        &self,
        user_id: String,
        source: AudioSource,
    ) -> DispatchResult<Arc<SessionHandle>> {
        let handle = self
            .registry
            .create(user_id.clone(), source)
            .map_err(DispatchError::Capacity)?;

        {
            let mut state = handle.state.lock().await;
            if let Err(msg) = state.session.begin_recording() {
                self.registry.remove(&handle.session_id);
                return Err(DispatchError::InvalidState(msg));
            }

            let record = SessionRecord {
                session_id: handle.session_id.clone(),
                user_id,
                title: format!("Recording {}", state.session.created_at.format("%Y-%m-%d %H:%M")),
                audio_source: source,
                status: SessionStatus::Recording,
                duration_secs: 0,
                created_at: state.session.created_at,
            };

            if let Err(err) = self.store.create_session(record).await {
                self.registry.remove(&handle.session_id);
                return Err(DispatchError::Storage(err.to_string()));
            }
        }

        info!("Session {} started ({})", handle.session_id, source.as_str());
        Ok(handle)
    }

    /// `join-session`: resolve the handle so the caller's connection can
    /// subscribe to the session's broadcast group.
    pub fn handle_join(&self, session_id: &str) -> DispatchResult<Arc<SessionHandle>> {
        self.lookup(session_id)
    }

    /// `audio-chunk`: buffer the fragment, transcribe it, append the result,
    /// persist the running duration, and broadcast `transcription-update`.
    ///
    /// Chunks arriving while PAUSED are accepted but dropped — recording is
    /// suspended, so they are neither buffered nor transcribed. A failed
    /// transcription still appends (a placeholder fragment); the session
    /// continues.
    pub async fn handle_audio_chunk(
        &self,
        session_id: &str,
        bytes: Vec<u8>,
        timestamp_ms: u64,
    ) -> DispatchResult<()> {
        let handle = self.lookup(session_id)?;
        let mut state = handle.state.lock().await;

        match state.session.status() {
            SessionStatus::Recording => {}
            SessionStatus::Paused => {
                debug!("Session {}: dropping audio chunk received while paused", session_id);
                return Ok(());
            }
            other => {
                return Err(DispatchError::InvalidState(format!(
                    "Cannot accept audio in status {}",
                    other.as_str()
                )));
            }
        }

        if bytes.len() > state.buffer.ceiling_bytes() {
            return Err(DispatchError::InvalidPayload(format!(
                "Audio chunk of {} bytes exceeds the {} byte buffer ceiling",
                bytes.len(),
                state.buffer.ceiling_bytes()
            )));
        }

        let fragment = self.transcriber.transcribe(&bytes, timestamp_ms).await;
        state.buffer.add_fragment(bytes);
        state.accumulator.append(fragment.clone());

        let running_duration = state.session.duration_secs.max(timestamp_ms / 1000);
        state.session.duration_secs = running_duration;
        if let Err(err) = self.store.update_duration(session_id, running_duration).await {
            warn!("Session {}: failed to persist running duration: {:#}", session_id, err);
        }

        handle.emit(ServerEvent::TranscriptionUpdate {
            session_id: session_id.to_string(),
            chunk: fragment,
        });

        Ok(())
    }

    /// `pause-recording`: RECORDING → PAUSED, persist, broadcast.
    pub async fn handle_pause(&self, session_id: &str) -> DispatchResult<()> {
        self.transition_status(session_id, |state| state.session.pause()).await
    }

    /// `resume-recording`: PAUSED → RECORDING, persist, broadcast. Leaves
    /// accumulated fragments untouched.
    pub async fn handle_resume(&self, session_id: &str) -> DispatchResult<()> {
        self.transition_status(session_id, |state| state.session.resume()).await
    }

    async fn transition_status(
        &self,
        session_id: &str,
        transition: impl FnOnce(&mut SessionState) -> Result<(), String>,
    ) -> DispatchResult<()> {
        let handle = self.lookup(session_id)?;
        let mut state = handle.state.lock().await;

        transition(&mut state).map_err(DispatchError::InvalidState)?;
        let status = state.session.status();

        // Mid-session status persistence is best-effort; the in-memory
        // state machine remains authoritative while the session is live.
        if let Err(err) = self.store.update_status(session_id, status).await {
            warn!("Session {}: failed to persist status {}: {:#}", session_id, status.as_str(), err);
        }

        handle.emit(ServerEvent::StatusUpdate {
            session_id: session_id.to_string(),
            status,
        });

        info!("Session {} is now {}", session_id, status.as_str());
        Ok(())
    }

    /// `stop-recording`: drive the session through PROCESSING into
    /// COMPLETED (or ERROR), exactly once.
    ///
    /// ## Stop Sequence:
    /// 1. transition to PROCESSING, persist it, broadcast it
    /// 2. flatten the accumulator; substitute the client fallback when the
    ///    flattened text is empty or contains the degraded placeholder
    /// 3. persist the transcript record
    /// 4. summarize — failure is non-fatal, the session completes without a
    ///    summary
    /// 5. persist final duration (client-supplied value wins) and COMPLETED
    /// 6. tear down the registry entry, then broadcast
    ///    `processing-complete` and the final `status-update`
    ///
    /// Any persistence failure after step 1 marks the session ERROR
    /// (best-effort) and tears the registry entry down regardless, so a
    /// failed stop cannot leak a stuck session.
    pub async fn handle_stop(
        &self,
        session_id: &str,
        client_transcript: Option<String>,
        duration_override: Option<u64>,
    ) -> DispatchResult<()> {
        let handle = self.lookup(session_id)?;
        let mut state = handle.state.lock().await;

        state
            .session
            .begin_processing()
            .map_err(DispatchError::InvalidState)?;

        if let Err(err) = self.store.update_status(session_id, SessionStatus::Processing).await {
            return Err(self.fail_stop(&handle, &mut state, err.to_string()).await);
        }
        handle.emit(ServerEvent::StatusUpdate {
            session_id: session_id.to_string(),
            status: SessionStatus::Processing,
        });

        let content = resolve_transcript(state.accumulator.flatten(), client_transcript);

        if let Err(err) = self
            .store
            .save_transcript(TranscriptRecord {
                session_id: session_id.to_string(),
                content: content.clone(),
                created_at: Utc::now(),
            })
            .await
        {
            return Err(self.fail_stop(&handle, &mut state, err.to_string()).await);
        }

        match self.summarizer.summarize(&content).await {
            Ok(summary) => {
                let record = SummaryRecord {
                    session_id: session_id.to_string(),
                    summary,
                    created_at: Utc::now(),
                };
                if let Err(err) = self.store.save_summary(record).await {
                    warn!("Session {}: failed to persist summary: {:#}", session_id, err);
                }
            }
            Err(err) => {
                warn!("Session {}: summarization failed, completing without summary: {:#}", session_id, err);
            }
        }

        let final_duration = duration_override.unwrap_or(state.session.duration_secs);
        state.session.duration_secs = final_duration;
        if let Err(err) = self.store.update_duration(session_id, final_duration).await {
            return Err(self.fail_stop(&handle, &mut state, err.to_string()).await);
        }
        if let Err(err) = self.store.update_status(session_id, SessionStatus::Completed).await {
            return Err(self.fail_stop(&handle, &mut state, err.to_string()).await);
        }

        if let Err(err) = state.session.complete() {
            return Err(self.fail_stop(&handle, &mut state, err).await);
        }

        drop(state);
        self.registry.remove(session_id);

        handle.emit(ServerEvent::ProcessingComplete {
            session_id: session_id.to_string(),
            download_url: format!("/sessions/{}/download", session_id),
        });
        handle.emit(ServerEvent::StatusUpdate {
            session_id: session_id.to_string(),
            status: SessionStatus::Completed,
        });

        info!("Session {} completed ({}s)", session_id, final_duration);
        Ok(())
    }

    /// Stop-time failure path: mark the session ERROR, best-effort persist
    /// it, broadcast the terminal status, and clear the registry entry so
    /// the failure cannot leak a stuck session.
    async fn fail_stop(
        &self,
        handle: &SessionHandle,
        state: &mut SessionState,
        message: String,
    ) -> DispatchError {
        let session_id = handle.session_id.clone();
        error!("Session {}: stop processing failed: {}", session_id, message);

        state.session.fail();
        if let Err(err) = self.store.update_status(&session_id, SessionStatus::Error).await {
            error!("Session {}: could not persist ERROR status: {:#}", session_id, err);
        }

        handle.emit(ServerEvent::StatusUpdate {
            session_id: session_id.clone(),
            status: SessionStatus::Error,
        });
        self.registry.remove(&session_id);

        DispatchError::Processing(message)
    }
}

/// Apply the transcript resolution rule: the client-side fallback replaces
/// the flattened text wholesale when the server-side path produced nothing
/// usable (empty, or containing the degraded placeholder marker); an empty
/// result falls back to [`NO_TRANSCRIPT_FALLBACK`].
fn resolve_transcript(flattened: String, client_transcript: Option<String>) -> String {
    let unusable = flattened.is_empty() || flattened.contains(DEGRADED_PLACEHOLDER);

    let content = match client_transcript {
        Some(fallback) if unusable && !fallback.is_empty() => fallback,
        _ => flattened,
    };

    if content.trim().is_empty() {
        NO_TRANSCRIPT_FALLBACK.to_string()
    } else {
        content
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{MockTranscriber, Summary};
    use crate::events::ServerEvent;
    use crate::storage::MemoryStore;
    use crate::transcript::TranscriptFragment;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tokio::sync::broadcast::Receiver;

    /// Transcriber that replays a scripted list of (text, speaker) pairs.
    struct ScriptedTranscriber {
        script: Mutex<VecDeque<(String, Option<String>)>>,
    }

    impl ScriptedTranscriber {
        fn new(script: Vec<(&str, Option<&str>)>) -> Self {
            Self {
                script: Mutex::new(
                    script
                        .into_iter()
                        .map(|(t, s)| (t.to_string(), s.map(str::to_string)))
                        .collect(),
                ),
            }
        }
    }

    #[async_trait]
    impl Transcriber for ScriptedTranscriber {
        async fn transcribe(&self, _audio: &[u8], timestamp_ms: u64) -> TranscriptFragment {
            let (text, speaker) = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or((DEGRADED_PLACEHOLDER.to_string(), None));
            TranscriptFragment { timestamp_ms, text, speaker }
        }
    }

    struct FixedSummarizer;

    #[async_trait]
    impl Summarizer for FixedSummarizer {
        async fn summarize(&self, _transcript: &str) -> anyhow::Result<Summary> {
            Ok(Summary {
                content: "overview".into(),
                key_points: vec!["point".into()],
                action_items: vec![],
                decisions: vec![],
            })
        }
    }

    struct FailingSummarizer;

    #[async_trait]
    impl Summarizer for FailingSummarizer {
        async fn summarize(&self, _transcript: &str) -> anyhow::Result<Summary> {
            Err(anyhow!("model overloaded"))
        }
    }

    /// Store with switchable failure injection, delegating to MemoryStore.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_create: AtomicBool,
        fail_save_transcript: AtomicBool,
    }

    #[async_trait]
    impl SessionStore for FlakyStore {
        async fn create_session(&self, record: SessionRecord) -> anyhow::Result<()> {
            if self.fail_create.load(Ordering::SeqCst) {
                return Err(anyhow!("database unavailable"));
            }
            self.inner.create_session(record).await
        }

        async fn get_session(&self, session_id: &str) -> anyhow::Result<Option<SessionRecord>> {
            self.inner.get_session(session_id).await
        }

        async fn update_status(&self, session_id: &str, status: SessionStatus) -> anyhow::Result<()> {
            self.inner.update_status(session_id, status).await
        }

        async fn update_duration(&self, session_id: &str, duration_secs: u64) -> anyhow::Result<()> {
            self.inner.update_duration(session_id, duration_secs).await
        }

        async fn save_transcript(&self, record: TranscriptRecord) -> anyhow::Result<()> {
            if self.fail_save_transcript.load(Ordering::SeqCst) {
                return Err(anyhow!("disk full"));
            }
            self.inner.save_transcript(record).await
        }

        async fn get_transcript(&self, session_id: &str) -> anyhow::Result<Option<TranscriptRecord>> {
            self.inner.get_transcript(session_id).await
        }

        async fn save_summary(&self, record: SummaryRecord) -> anyhow::Result<()> {
            self.inner.save_summary(record).await
        }

        async fn get_summary(&self, session_id: &str) -> anyhow::Result<Option<SummaryRecord>> {
            self.inner.get_summary(session_id).await
        }
    }

    struct Fixture {
        dispatcher: EventDispatcher,
        store: Arc<FlakyStore>,
    }

    fn fixture(transcriber: Arc<dyn Transcriber>, summarizer: Arc<dyn Summarizer>) -> Fixture {
        let store = Arc::new(FlakyStore::default());
        let registry = Arc::new(SessionRegistry::new(8, 1024 * 1024, 64));
        Fixture {
            dispatcher: EventDispatcher::new(
                registry,
                transcriber,
                summarizer,
                Arc::clone(&store) as Arc<dyn SessionStore>,
            ),
            store,
        }
    }

    fn default_fixture() -> Fixture {
        fixture(Arc::new(MockTranscriber), Arc::new(FixedSummarizer))
    }

    fn collect_events(rx: &mut Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_start_creates_registry_entry_and_record() {
        let f = default_fixture();
        let handle = f
            .dispatcher
            .handle_start("u1".into(), AudioSource::Microphone)
            .await
            .unwrap();

        assert_eq!(f.dispatcher.registry().active_count(), 1);
        let state = handle.state.lock().await;
        assert_eq!(state.session.status(), SessionStatus::Recording);

        let record = f.store.get_session(&handle.session_id).await.unwrap().unwrap();
        assert_eq!(record.status, SessionStatus::Recording);
        assert_eq!(record.user_id, "u1");
        assert_eq!(record.audio_source, AudioSource::Microphone);
    }

    #[tokio::test]
    async fn test_start_with_failing_store_creates_nothing() {
        let f = default_fixture();
        f.store.fail_create.store(true, Ordering::SeqCst);

        let err = f
            .dispatcher
            .handle_start("u1".into(), AudioSource::Tab)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "storage_error");
        assert_eq!(f.dispatcher.registry().active_count(), 0);
    }

    #[tokio::test]
    async fn test_audio_chunks_accumulate_and_broadcast() {
        let f = fixture(
            Arc::new(ScriptedTranscriber::new(vec![
                ("hello", Some("Speaker 1")),
                ("world", None),
            ])),
            Arc::new(FixedSummarizer),
        );
        let handle = f
            .dispatcher
            .handle_start("u1".into(), AudioSource::Microphone)
            .await
            .unwrap();
        let id = handle.session_id.clone();
        let mut rx = handle.subscribe();

        f.dispatcher.handle_audio_chunk(&id, vec![1; 16], 1000).await.unwrap();
        f.dispatcher.handle_audio_chunk(&id, vec![2; 16], 2500).await.unwrap();

        {
            let state = handle.state.lock().await;
            assert_eq!(state.buffer.fragment_count(), 2);
            assert_eq!(state.accumulator.flatten(), "Speaker 1: hello\nworld");
        }

        // Running duration persisted from the latest chunk timestamp.
        let record = f.store.get_session(&id).await.unwrap().unwrap();
        assert_eq!(record.duration_secs, 2);

        let updates = collect_events(&mut rx);
        let texts: Vec<String> = updates
            .iter()
            .filter_map(|e| match e {
                ServerEvent::TranscriptionUpdate { chunk, .. } => Some(chunk.text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["hello", "world"]);
    }

    #[tokio::test]
    async fn test_chunk_for_unknown_session_is_an_error() {
        let f = default_fixture();
        let err = f
            .dispatcher
            .handle_audio_chunk("nope", vec![0; 4], 0)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "session_not_found");
    }

    #[tokio::test]
    async fn test_paused_chunks_are_dropped_silently() {
        let f = default_fixture();
        let handle = f
            .dispatcher
            .handle_start("u1".into(), AudioSource::Microphone)
            .await
            .unwrap();
        let id = handle.session_id.clone();

        f.dispatcher.handle_pause(&id).await.unwrap();
        f.dispatcher.handle_audio_chunk(&id, vec![0; 8], 500).await.unwrap();

        let state = handle.state.lock().await;
        assert_eq!(state.buffer.fragment_count(), 0);
        assert!(state.accumulator.is_empty());
    }

    #[tokio::test]
    async fn test_pause_resume_round_trip_preserves_fragments() {
        let f = fixture(
            Arc::new(ScriptedTranscriber::new(vec![("before pause", None)])),
            Arc::new(FixedSummarizer),
        );
        let handle = f
            .dispatcher
            .handle_start("u1".into(), AudioSource::Microphone)
            .await
            .unwrap();
        let id = handle.session_id.clone();
        let mut rx = handle.subscribe();

        f.dispatcher.handle_audio_chunk(&id, vec![0; 8], 900).await.unwrap();
        f.dispatcher.handle_pause(&id).await.unwrap();
        f.dispatcher.handle_resume(&id).await.unwrap();

        {
            let state = handle.state.lock().await;
            assert_eq!(state.session.status(), SessionStatus::Recording);
            assert_eq!(state.accumulator.len(), 1);
            assert_eq!(state.accumulator.flatten(), "before pause");
        }

        let record = f.store.get_session(&id).await.unwrap().unwrap();
        assert_eq!(record.status, SessionStatus::Recording);

        let statuses: Vec<SessionStatus> = collect_events(&mut rx)
            .iter()
            .filter_map(|e| match e {
                ServerEvent::StatusUpdate { status, .. } => Some(*status),
                _ => None,
            })
            .collect();
        assert_eq!(statuses, vec![SessionStatus::Paused, SessionStatus::Recording]);
    }

    #[tokio::test]
    async fn test_resume_without_pause_is_invalid() {
        let f = default_fixture();
        let handle = f
            .dispatcher
            .handle_start("u1".into(), AudioSource::Tab)
            .await
            .unwrap();

        let err = f.dispatcher.handle_resume(&handle.session_id).await.unwrap_err();
        assert_eq!(err.code(), "invalid_state");
    }

    #[tokio::test]
    async fn test_start_then_immediate_stop_completes_with_fallback_text() {
        let f = default_fixture();
        let handle = f
            .dispatcher
            .handle_start("u1".into(), AudioSource::Microphone)
            .await
            .unwrap();
        let id = handle.session_id.clone();
        let mut rx = handle.subscribe();

        f.dispatcher.handle_stop(&id, None, None).await.unwrap();

        let record = f.store.get_session(&id).await.unwrap().unwrap();
        assert_eq!(record.status, SessionStatus::Completed);
        let transcript = f.store.get_transcript(&id).await.unwrap().unwrap();
        assert_eq!(transcript.content, NO_TRANSCRIPT_FALLBACK);

        // Registry entry is gone and cannot be reused.
        assert!(f.dispatcher.registry().get(&id).is_none());
        let err = f.dispatcher.handle_stop(&id, None, None).await.unwrap_err();
        assert_eq!(err.code(), "session_not_found");

        let events = collect_events(&mut rx);
        let shapes: Vec<&str> = events
            .iter()
            .map(|e| match e {
                ServerEvent::StatusUpdate { status: SessionStatus::Processing, .. } => "processing",
                ServerEvent::StatusUpdate { status: SessionStatus::Completed, .. } => "completed",
                ServerEvent::ProcessingComplete { .. } => "processing-complete",
                _ => "other",
            })
            .collect();
        assert_eq!(shapes, vec!["processing", "processing-complete", "completed"]);

        match &events[1] {
            ServerEvent::ProcessingComplete { download_url, .. } => {
                assert_eq!(download_url, &format!("/sessions/{}/download", id));
            }
            other => panic!("wrong event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_transcript_replaces_placeholder_output() {
        // MockTranscriber only ever produces the degraded placeholder, so
        // the client-side transcript must win at stop time.
        let f = default_fixture();
        let handle = f
            .dispatcher
            .handle_start("u1".into(), AudioSource::Microphone)
            .await
            .unwrap();
        let id = handle.session_id.clone();

        f.dispatcher.handle_audio_chunk(&id, vec![0; 8], 100).await.unwrap();
        f.dispatcher
            .handle_stop(&id, Some("browser heard this".into()), None)
            .await
            .unwrap();

        let transcript = f.store.get_transcript(&id).await.unwrap().unwrap();
        assert_eq!(transcript.content, "browser heard this");
    }

    #[tokio::test]
    async fn test_client_transcript_ignored_when_server_output_is_usable() {
        let f = fixture(
            Arc::new(ScriptedTranscriber::new(vec![("real words", None)])),
            Arc::new(FixedSummarizer),
        );
        let handle = f
            .dispatcher
            .handle_start("u1".into(), AudioSource::Microphone)
            .await
            .unwrap();
        let id = handle.session_id.clone();

        f.dispatcher.handle_audio_chunk(&id, vec![0; 8], 100).await.unwrap();
        f.dispatcher
            .handle_stop(&id, Some("browser heard this".into()), None)
            .await
            .unwrap();

        let transcript = f.store.get_transcript(&id).await.unwrap().unwrap();
        assert_eq!(transcript.content, "real words");
    }

    #[tokio::test]
    async fn test_summary_persisted_on_success() {
        let f = fixture(
            Arc::new(ScriptedTranscriber::new(vec![("words", None)])),
            Arc::new(FixedSummarizer),
        );
        let handle = f
            .dispatcher
            .handle_start("u1".into(), AudioSource::Tab)
            .await
            .unwrap();
        let id = handle.session_id.clone();

        f.dispatcher.handle_audio_chunk(&id, vec![0; 8], 100).await.unwrap();
        f.dispatcher.handle_stop(&id, None, None).await.unwrap();

        let summary = f.store.get_summary(&id).await.unwrap().unwrap();
        assert_eq!(summary.summary.content, "overview");
    }

    #[tokio::test]
    async fn test_summarization_failure_is_non_fatal() {
        let f = fixture(
            Arc::new(ScriptedTranscriber::new(vec![("words", None)])),
            Arc::new(FailingSummarizer),
        );
        let handle = f
            .dispatcher
            .handle_start("u1".into(), AudioSource::Tab)
            .await
            .unwrap();
        let id = handle.session_id.clone();

        f.dispatcher.handle_audio_chunk(&id, vec![0; 8], 100).await.unwrap();
        f.dispatcher.handle_stop(&id, None, None).await.unwrap();

        let record = f.store.get_session(&id).await.unwrap().unwrap();
        assert_eq!(record.status, SessionStatus::Completed);
        assert!(f.store.get_summary(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stop_failure_marks_error_and_clears_registry() {
        let f = default_fixture();
        let handle = f
            .dispatcher
            .handle_start("u1".into(), AudioSource::Microphone)
            .await
            .unwrap();
        let id = handle.session_id.clone();
        f.store.fail_save_transcript.store(true, Ordering::SeqCst);

        let err = f.dispatcher.handle_stop(&id, None, None).await.unwrap_err();
        assert_eq!(err.code(), "processing_failed");

        let record = f.store.get_session(&id).await.unwrap().unwrap();
        assert_eq!(record.status, SessionStatus::Error);
        assert!(f.dispatcher.registry().get(&id).is_none());
    }

    #[tokio::test]
    async fn test_client_duration_overrides_accumulated() {
        let f = default_fixture();
        let handle = f
            .dispatcher
            .handle_start("u1".into(), AudioSource::Microphone)
            .await
            .unwrap();
        let id = handle.session_id.clone();

        f.dispatcher.handle_audio_chunk(&id, vec![0; 8], 9_000).await.unwrap();
        f.dispatcher.handle_stop(&id, None, Some(120)).await.unwrap();

        let record = f.store.get_session(&id).await.unwrap().unwrap();
        assert_eq!(record.duration_secs, 120);
    }

    #[tokio::test]
    async fn test_two_subscribers_both_receive_session_events() {
        let f = fixture(
            Arc::new(ScriptedTranscriber::new(vec![("shared", None)])),
            Arc::new(FixedSummarizer),
        );
        let handle = f
            .dispatcher
            .handle_start("u1".into(), AudioSource::Tab)
            .await
            .unwrap();
        let id = handle.session_id.clone();

        let mut creator = handle.subscribe();
        let viewer_handle = f.dispatcher.handle_join(&id).unwrap();
        let mut viewer = viewer_handle.subscribe();

        f.dispatcher.handle_audio_chunk(&id, vec![0; 8], 100).await.unwrap();
        f.dispatcher.handle_pause(&id).await.unwrap();

        for rx in [&mut creator, &mut viewer] {
            let events = collect_events(rx);
            assert_eq!(events.len(), 2);
            assert!(matches!(events[0], ServerEvent::TranscriptionUpdate { .. }));
            assert!(matches!(
                events[1],
                ServerEvent::StatusUpdate { status: SessionStatus::Paused, .. }
            ));
        }
    }

    #[tokio::test]
    async fn test_failure_in_one_session_leaves_others_untouched() {
        let f = default_fixture();
        let healthy = f
            .dispatcher
            .handle_start("u1".into(), AudioSource::Microphone)
            .await
            .unwrap();
        let doomed = f
            .dispatcher
            .handle_start("u2".into(), AudioSource::Tab)
            .await
            .unwrap();

        f.store.fail_save_transcript.store(true, Ordering::SeqCst);
        let _ = f.dispatcher.handle_stop(&doomed.session_id, None, None).await;

        assert!(f.dispatcher.registry().get(&healthy.session_id).is_some());
        let state = healthy.state.lock().await;
        assert_eq!(state.session.status(), SessionStatus::Recording);
    }

    #[test]
    fn test_resolve_transcript_rules() {
        // Usable server output stands.
        assert_eq!(resolve_transcript("hi".into(), Some("fb".into())), "hi");
        // Empty output, client fallback wins verbatim.
        assert_eq!(resolve_transcript(String::new(), Some("fb".into())), "fb");
        // Placeholder output, client fallback wins.
        let degraded = format!("{}\nmore", DEGRADED_PLACEHOLDER);
        assert_eq!(resolve_transcript(degraded, Some("fb".into())), "fb");
        // Nothing usable at all.
        assert_eq!(resolve_transcript(String::new(), None), NO_TRANSCRIPT_FALLBACK);
        assert_eq!(resolve_transcript(String::new(), Some(String::new())), NO_TRANSCRIPT_FALLBACK);
    }
}
