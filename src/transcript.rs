//! # Transcript Accumulation
//!
//! Per-session ordered list of transcribed fragments. Append order is
//! arrival order; the dispatcher serializes transcription per session, so
//! arrival order is also chronological order. Fragments are never mutated
//! after creation — at stop time they are either flattened as-is or replaced
//! wholesale by the client-side fallback transcript.

use serde::{Deserialize, Serialize};

/// One transcribed unit of audio, as returned by the transcription
/// collaborator and pushed to clients in `transcription-update` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptFragment {
    /// Milliseconds since session start.
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,

    /// Transcribed text for this fragment.
    pub text: String,

    /// Optional speaker label (e.g. "Speaker 1") when diarization is
    /// available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

impl TranscriptFragment {
    /// Render this fragment as one transcript line:
    /// `"{speaker}: {text}"` when a speaker label is present, else the text.
    pub fn render_line(&self) -> String {
        match &self.speaker {
            Some(speaker) => format!("{}: {}", speaker, self.text),
            None => self.text.clone(),
        }
    }
}

/// Append-only fragment list for one session.
#[derive(Debug, Default)]
pub struct TranscriptAccumulator {
    fragments: Vec<TranscriptFragment>,
}

impl TranscriptAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment. Accumulation is monotonic while the session is
    /// non-terminal; nothing removes or reorders fragments.
    pub fn append(&mut self, fragment: TranscriptFragment) {
        self.fragments.push(fragment);
    }

    /// All fragments in append order.
    pub fn fragments(&self) -> &[TranscriptFragment] {
        &self.fragments
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Flatten the accumulated fragments into one contiguous text block:
    /// one rendered line per fragment, joined with newlines, in append
    /// order.
    pub fn flatten(&self) -> String {
        self.fragments
            .iter()
            .map(TranscriptFragment::render_line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
