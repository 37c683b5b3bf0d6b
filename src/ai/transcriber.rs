//! Transcription collaborator: audio bytes in, one transcript fragment out.

use crate::config::AiConfig;
use crate::transcript::TranscriptFragment;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// Marker text emitted when no usable transcription was produced, either by
/// the mock backend or by the HTTP backend's failure path. The stop handler
/// treats a flattened transcript containing this marker as unusable, which
/// is what lets the client-side fallback transcript take over.
pub const DEGRADED_PLACEHOLDER: &str = "[transcription unavailable]";

/// Transcription seam. Implementations must not fail to the caller; the
/// degraded-result contract is what keeps a single bad chunk non-fatal to
/// its session.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe one audio fragment captured at `timestamp_ms` (ms since
    /// session start).
    async fn transcribe(&self, audio: &[u8], timestamp_ms: u64) -> TranscriptFragment;
}

fn degraded_fragment(timestamp_ms: u64) -> TranscriptFragment {
    TranscriptFragment {
        timestamp_ms,
        text: DEGRADED_PLACEHOLDER.to_string(),
        speaker: None,
    }
}

/// OpenAI-compatible audio transcription backend
/// (`POST {base_url}/v1/audio/transcriptions`, multipart).
pub struct HttpTranscriber {
    config: AiConfig,
    http: reqwest::Client,
}

impl HttpTranscriber {
    pub fn new(config: AiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client for transcription")?;
        Ok(Self { config, http })
    }

    async fn request(&self, audio: &[u8]) -> Result<String> {
        let url = format!("{}/v1/audio/transcriptions", self.config.base_url);

        let file_part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name("chunk.webm")
            .mime_str("application/octet-stream")
            .context("Invalid multipart MIME type")?;
        let form = reqwest::multipart::Form::new()
            .text("model", self.config.transcription_model.clone())
            .part("file", file_part);

        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .multipart(form)
            .send()
            .await
            .context("Transcription request failed")?
            .error_for_status()
            .context("Transcription request rejected")?;

        let body: serde_json::Value = resp
            .json()
            .await
            .context("Invalid transcription response body")?;
        let text = body
            .get("text")
            .and_then(|v| v.as_str())
            .context("Transcription response missing 'text'")?;

        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio: &[u8], timestamp_ms: u64) -> TranscriptFragment {
        match self.request(audio).await {
            Ok(text) if !text.is_empty() => {
                debug!("Transcribed {} bytes into {} chars", audio.len(), text.len());
                TranscriptFragment {
                    timestamp_ms,
                    text,
                    speaker: None,
                }
            }
            Ok(_) => {
                debug!("Transcription returned empty text for {} bytes", audio.len());
                degraded_fragment(timestamp_ms)
            }
            Err(err) => {
                warn!("Transcription failed, substituting placeholder: {:#}", err);
                degraded_fragment(timestamp_ms)
            }
        }
    }
}

/// Mock backend for local development and tests. Always produces the
/// placeholder marker so the client-fallback path stays reachable.
pub struct MockTranscriber;

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, audio: &[u8], timestamp_ms: u64) -> TranscriptFragment {
        debug!("Mock transcription of {} bytes", audio.len());
        degraded_fragment(timestamp_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_emits_placeholder_marker() {
        let fragment = MockTranscriber.transcribe(&[1, 2, 3], 250).await;
        assert!(fragment.text.contains(DEGRADED_PLACEHOLDER));
        assert_eq!(fragment.timestamp_ms, 250);
        assert!(fragment.speaker.is_none());
    }
}
