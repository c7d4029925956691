//! Cuts an incrementally delivered reply into speech chunks.
//!
//! The cut is greedy and final: text is appended to a pending buffer, and the
//! buffer is emitted as soon as it is long enough and ends on a phrase
//! boundary, or once it reaches the hard maximum regardless of punctuation.

/// Characters that close a sentence or clause.
pub const TERMINATORS: [char; 5] = ['.', '!', '?', ':', ','];

pub const DEFAULT_MIN_CHARS: usize = 15;
pub const DEFAULT_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPolicy {
    min_chars: usize,
    max_chars: usize,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            min_chars: DEFAULT_MIN_CHARS,
            max_chars: DEFAULT_MAX_CHARS,
        }
    }
}

impl ChunkPolicy {
    /// `max_chars` is raised to `min_chars` when given smaller.
    pub fn new(min_chars: usize, max_chars: usize) -> Self {
        Self {
            min_chars,
            max_chars: max_chars.max(min_chars),
        }
    }

    pub fn min_chars(&self) -> usize {
        self.min_chars
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// `len` is the character count of `pending`.
    pub fn should_cut(&self, pending: &str, len: usize) -> bool {
        if len >= self.max_chars {
            return true;
        }
        len >= self.min_chars && pending.ends_with(TERMINATORS)
    }
}

#[derive(Debug, Default)]
pub struct Chunker {
    policy: ChunkPolicy,
    pending: String,
    pending_chars: usize,
}

impl Chunker {
    pub fn new(policy: ChunkPolicy) -> Self {
        Self {
            policy,
            pending: String::new(),
            pending_chars: 0,
        }
    }

    /// Appends a fragment and returns a chunk if the buffer should be cut now.
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        if fragment.is_empty() {
            return None;
        }
        self.pending.push_str(fragment);
        self.pending_chars += fragment.chars().count();

        if self.policy.should_cut(&self.pending, self.pending_chars) {
            self.cut()
        } else {
            None
        }
    }

    /// Flushes whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        self.cut()
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }

    fn cut(&mut self) -> Option<String> {
        self.pending_chars = 0;
        let chunk = std::mem::take(&mut self.pending);
        if chunk.trim().is_empty() {
            if !chunk.is_empty() {
                tracing::trace!("dropping whitespace-only chunk ({} bytes)", chunk.len());
            }
            return None;
        }
        Some(chunk)
    }
}
