//! Bounded history of transcription chunks.

use std::collections::VecDeque;

use crate::protocol::{ChunkKind, TranscriptionChunk};

/// Default number of chunks retained per session.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Ring buffer of recent chunks; the oldest chunk is evicted first.
///
/// Interim chunks are provisional, so a new chunk from the same engine
/// replaces a trailing interim one instead of piling up behind it.
#[derive(Debug, Clone)]
pub struct ChunkHistory {
    chunks: VecDeque<TranscriptionChunk>,
    limit: usize,
}

impl Default for ChunkHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl ChunkHistory {
    /// Create a history holding at most `limit` chunks.
    pub fn new(limit: usize) -> Self {
        Self {
            chunks: VecDeque::with_capacity(limit.min(1024)),
            limit,
        }
    }

    /// Record a chunk, returning the chunk evicted to make room, if any.
    pub fn push(&mut self, chunk: TranscriptionChunk) -> Option<TranscriptionChunk> {
        if self.limit == 0 {
            return Some(chunk);
        }

        if let Some(last) = self.chunks.back_mut()
            && last.kind == ChunkKind::Interim
            && last.engine == chunk.engine
        {
            *last = chunk;
            return None;
        }

        let evicted = if self.chunks.len() == self.limit {
            self.chunks.pop_front()
        } else {
            None
        };
        self.chunks.push_back(chunk);
        evicted
    }

    /// Chunks from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &TranscriptionChunk> {
        self.chunks.iter()
    }

    /// Number of retained chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether no chunks are retained.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Maximum number of retained chunks.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Drop every retained chunk.
    pub fn clear(&mut self) {
        self.chunks.clear();
    }
}
