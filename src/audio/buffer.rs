//! # Bounded Audio Buffer
//!
//! Per-session ordered store of raw audio fragments with a hard byte-size
//! ceiling. When an append would push the running total over the ceiling,
//! the oldest half of the buffered fragments (by count) is evicted first.
//! Recent audio is what matters for near-real-time transcription continuity;
//! audio that has already been transcribed is expendable.
//!
//! ## Concurrency Contract:
//! Single writer per session. The event dispatcher serializes all inbound
//! audio events for a given session, so the buffer itself holds no lock.

use std::collections::VecDeque;

/// Default byte ceiling per session: 10 MiB.
pub const DEFAULT_CEILING_BYTES: usize = 10 * 1024 * 1024;

/// One opaque unit of raw audio, ordered by arrival.
///
/// Owned exclusively by the buffer of its session; never shared across
/// sessions; discarded on eviction or session teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFragment {
    /// Arrival-order position within the session (monotonic, never reused).
    pub position: u64,

    /// Raw payload bytes as delivered by the client.
    pub bytes: Vec<u8>,
}

impl AudioFragment {
    /// Byte length of the payload.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Ordered fragment store with a hard byte ceiling and oldest-half eviction.
///
/// ## Memory Management:
/// - Tracked byte total is ≤ the ceiling after every mutation returns
/// - Overflow evicts, it never blocks or rejects the producer
/// - A 1+ hour session stays within one ceiling's worth of raw audio
#[derive(Debug)]
pub struct BoundedAudioBuffer {
    /// Buffered fragments in arrival order (front = oldest).
    fragments: VecDeque<AudioFragment>,

    /// Running total of buffered payload bytes.
    total_bytes: usize,

    /// Hard ceiling for `total_bytes`.
    ceiling_bytes: usize,

    /// Next arrival-order position to assign.
    next_position: u64,
}

impl BoundedAudioBuffer {
    /// Create a buffer with an explicit byte ceiling.
    pub fn new(ceiling_bytes: usize) -> Self {
        Self {
            fragments: VecDeque::new(),
            total_bytes: 0,
            ceiling_bytes,
            next_position: 0,
        }
    }

    /// Append a fragment, evicting the oldest half first if the running
    /// total would exceed the ceiling.
    ///
    /// ## Eviction Policy:
    /// When the append would overflow, exactly ⌊n/2⌋ of the oldest fragments
    /// are dropped (n = fragment count before the append). If a pathological
    /// fragment still does not fit, eviction continues oldest-first.
    ///
    /// ## Returns:
    /// Whether the fragment was accepted. Eviction, not rejection, is the
    /// overflow response, so this is true for any fragment that can fit in
    /// the ceiling at all. A single fragment larger than the entire ceiling
    /// is rejected — the one case where accepting would break the ceiling
    /// invariant. The transport caps messages at the ceiling size, so that
    /// path is unreachable in normal operation.
    pub fn add_fragment(&mut self, bytes: Vec<u8>) -> bool {
        if bytes.len() > self.ceiling_bytes {
            return false;
        }

        if self.total_bytes + bytes.len() > self.ceiling_bytes {
            self.evict_oldest_half();

            while self.total_bytes + bytes.len() > self.ceiling_bytes {
                match self.fragments.pop_front() {
                    Some(old) => self.total_bytes -= old.len(),
                    None => break,
                }
            }
        }

        self.total_bytes += bytes.len();
        let position = self.next_position;
        self.next_position += 1;
        self.fragments.push_back(AudioFragment { position, bytes });

        true
    }

    /// Drop the oldest ⌊n/2⌋ buffered fragments.
    fn evict_oldest_half(&mut self) {
        let evict_count = self.fragments.len() / 2;
        for _ in 0..evict_count {
            if let Some(old) = self.fragments.pop_front() {
                self.total_bytes -= old.len();
            }
        }
    }

    /// Return the full ordered fragment sequence and atomically clear the
    /// buffer. Part of the contract for batch re-processing, even though the
    /// incremental transcription flow does not exercise it.
    pub fn drain_all(&mut self) -> Vec<AudioFragment> {
        self.total_bytes = 0;
        self.fragments.drain(..).collect()
    }

    /// Discard all fragments and reset the byte counter.
    pub fn clear(&mut self) {
        self.fragments.clear();
        self.total_bytes = 0;
    }

    /// Current tracked payload byte total.
    pub fn size_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Number of buffered fragments.
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Configured byte ceiling.
    pub fn ceiling_bytes(&self) -> usize {
        self.ceiling_bytes
    }

    /// Arrival-order position of the oldest buffered fragment, if any.
    pub fn oldest_position(&self) -> Option<u64> {
        self.fragments.front().map(|f| f.position)
    }
}

/// Concatenate an ordered list of fragments into one contiguous payload,
/// preserving order. Pure function, no buffer state.
pub fn merge_fragments(fragments: &[AudioFragment]) -> Vec<u8> {
    let total: usize = fragments.iter().map(AudioFragment::len).sum();
    let mut merged = Vec::with_capacity(total);
    for fragment in fragments {
        merged.extend_from_slice(&fragment.bytes);
    }
    merged
}
