//! # Generative-AI Collaborators
//!
//! Thin seams around the external transcription and summarization API.
//! Each seam is an async trait with an HTTP backend (OpenAI-compatible
//! endpoints) and a mock backend used when no API key is configured and in
//! tests.
//!
//! ## Failure Contracts:
//! - [`Transcriber`] never fails to the caller: a failed or degraded call
//!   yields a placeholder fragment instead, so one bad transcription attempt
//!   never aborts a session.
//! - [`Summarizer`] returns `Result`; callers treat failure as "no summary"
//!   and proceed.

pub mod summarizer;
pub mod transcriber;

pub use summarizer::{HttpSummarizer, MockSummarizer, Summarizer, Summary};
pub use transcriber::{HttpTranscriber, MockTranscriber, Transcriber, DEGRADED_PLACEHOLDER};

use crate::config::AiConfig;
use anyhow::Result;
use std::sync::Arc;
use tracing::warn;

/// Build the transcription/summarization pair from configuration. Without
/// an API key the mock backends are used, which keeps the full session flow
/// exercisable in local development.
pub fn build_collaborators(config: &AiConfig) -> Result<(Arc<dyn Transcriber>, Arc<dyn Summarizer>)> {
    if config.api_key.trim().is_empty() {
        warn!("No AI API key configured; using mock transcription/summarization backends");
        return Ok((Arc::new(MockTranscriber), Arc::new(MockSummarizer)));
    }

    Ok((
        Arc::new(HttpTranscriber::new(config.clone())?),
        Arc::new(HttpSummarizer::new(config.clone())?),
    ))
}
