//! # Audio Handling
//!
//! Buffering for raw audio fragments streamed in over the WebSocket channel.
//! Raw audio is not the durable artifact here (the transcript is), so the
//! buffer trades old audio for bounded memory on long sessions.

pub mod buffer;

pub use buffer::{merge_fragments, AudioFragment, BoundedAudioBuffer, DEFAULT_CEILING_BYTES};
