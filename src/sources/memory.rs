//! In-memory byte source

use std::collections::VecDeque;
use tracing::debug;

use crate::Result;
use crate::source::ByteSource;

/// Source that replays bytes already held in memory.
#[derive(Debug)]
pub struct MemorySource {
    name: String,
    chunks: VecDeque<Vec<u8>>,
    block_size: Option<u32>,
}

impl MemorySource {
    /// Split `data` into chunks of at most `chunk_size` bytes (`0` = one chunk).
    pub fn new(name: impl Into<String>, data: Vec<u8>, chunk_size: usize) -> Self {
        let chunks = if chunk_size == 0 || data.len() <= chunk_size {
            VecDeque::from([data])
        } else {
            data.chunks(chunk_size).map(<[u8]>::to_vec).collect()
        };
        Self::from_chunks(name, chunks)
    }

    /// Yield the given chunks as-is, in order.
    pub fn from_chunks(name: impl Into<String>, chunks: impl IntoIterator<Item = Vec<u8>>) -> Self {
        let chunks = chunks.into_iter().filter(|chunk| !chunk.is_empty()).collect();
        Self { name: name.into(), chunks, block_size: None }
    }

    /// Advertise a block size hint to the worker.
    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = Some(block_size);
        self
    }

    /// Chunks not yet yielded.
    pub fn remaining(&self) -> usize {
        self.chunks.len()
    }
}

#[async_trait::async_trait]
impl ByteSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn block_size(&self) -> Option<u32> {
        self.block_size
    }

    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.chunks.pop_front())
    }

    fn destroy(&mut self) {
        if !self.chunks.is_empty() {
            debug!("{}: discarding {} unread chunks", self.name, self.chunks.len());
        }
        self.chunks.clear();
    }
}
