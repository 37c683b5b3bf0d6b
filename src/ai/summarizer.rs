//! Summarization collaborator: flattened transcript text in, one structured
//! summary out. Produced once per session at stop time; failure here is
//! non-fatal to session completion.

use crate::config::AiConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Structured summary of one session. Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Free-text overview.
    pub content: String,
    pub key_points: Vec<String>,
    pub action_items: Vec<String>,
    pub decisions: Vec<String>,
}

/// Summarization seam. May fail; callers proceed without a summary.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, transcript: &str) -> Result<Summary>;
}

const SUMMARY_PROMPT: &str = "Summarize the following meeting transcript. \
Respond with JSON only, using exactly these keys: \
\"content\" (a short free-text overview), \"keyPoints\" (array of strings), \
\"actionItems\" (array of strings), \"decisions\" (array of strings).";

/// OpenAI-compatible chat-completions backend
/// (`POST {base_url}/v1/chat/completions`).
pub struct HttpSummarizer {
    config: AiConfig,
    http: reqwest::Client,
}

impl HttpSummarizer {
    pub fn new(config: AiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client for summarization")?;
        Ok(Self { config, http })
    }
}

#[async_trait]
impl Summarizer for HttpSummarizer {
    async fn summarize(&self, transcript: &str) -> Result<Summary> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);

        let body = serde_json::json!({
            "model": self.config.summary_model,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SUMMARY_PROMPT },
                { "role": "user", "content": transcript },
            ],
        });

        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Summarization request failed")?
            .error_for_status()
            .context("Summarization request rejected")?;

        let body: serde_json::Value = resp
            .json()
            .await
            .context("Invalid summarization response body")?;
        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .context("Summarization response missing message content")?;

        let summary: Summary =
            serde_json::from_str(content).context("Summary content is not the expected JSON shape")?;

        debug!(
            "Summarized {} chars into {} key points",
            transcript.len(),
            summary.key_points.len()
        );
        Ok(summary)
    }
}

/// Mock backend for local development: a deterministic trivial summary so
/// the full stop flow (including summary persistence) stays exercisable
/// without an API key.
pub struct MockSummarizer;

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(&self, transcript: &str) -> Result<Summary> {
        let first_line = transcript.lines().next().unwrap_or("").to_string();
        Ok(Summary {
            content: format!("Mock summary of a {}-character transcript", transcript.len()),
            key_points: if first_line.is_empty() { vec![] } else { vec![first_line] },
            action_items: vec![],
            decisions: vec![],
        })
    }
}
