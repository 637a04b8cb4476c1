//! Append-only packet buffer owned by the decode worker
//!
//! Packets are stored as they arrive, one allocation per packet, and read back as a
//! single contiguous byte stream. This is the byte source behind the custom AVIO
//! context in [`crate::codec`]: FFmpeg reads through a cursor that may cross any
//! number of packet boundaries and may seek anywhere inside the appended bytes.
//!
//! ## Memory
//!
//! Every appended byte stays resident until the session releases the buffer, since
//! demuxers are free to seek backwards. The `limit` caps that total.

use std::collections::VecDeque;
use tracing::trace;

use crate::{DecoderError, Result};

/// Default read granularity when the caller gives no usable block size hint.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Ordered store of packet payloads with a read cursor.
#[derive(Debug)]
pub struct PacketBuffer {
    chunks: VecDeque<Vec<u8>>,
    /// Stream offset one past the last appended byte
    total_size: u64,
    read_position: u64,
    block_size: usize,
    /// True when the caller supplied its own block size
    block_size_hinted: bool,
    limit: usize,
}

impl PacketBuffer {
    /// Create a buffer holding at most `limit` bytes.
    ///
    /// `block_size` below 2 falls back to [`DEFAULT_BLOCK_SIZE`].
    pub fn new(block_size: usize, limit: usize) -> Self {
        let block_size_hinted = block_size > 1;
        let block_size = if block_size_hinted { block_size } else { DEFAULT_BLOCK_SIZE };
        Self {
            chunks: VecDeque::new(),
            total_size: 0,
            read_position: 0,
            block_size,
            block_size_hinted,
            limit,
        }
    }

    /// Append a packet payload at the end of the stream.
    ///
    /// Fails without modifying the buffer when the payload would push retained bytes
    /// past the limit.
    pub fn append(&mut self, bytes: Vec<u8>) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }

        let buffered = self.buffered_bytes();
        if buffered.saturating_add(bytes.len()) > self.limit {
            return Err(DecoderError::resource_exhausted(bytes.len(), buffered, self.limit));
        }

        self.total_size += bytes.len() as u64;
        trace!(len = bytes.len(), total = self.total_size, "Appended packet");
        self.chunks.push_back(bytes);
        Ok(())
    }

    /// Read granularity handed to the AVIO context.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Whether [`block_size`](Self::block_size) came from the caller.
    pub fn block_size_hinted(&self) -> bool {
        self.block_size_hinted
    }

    /// Total bytes appended over the buffer's lifetime.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Bytes currently held in memory.
    pub fn buffered_bytes(&self) -> usize {
        self.total_size as usize
    }

    /// Stream offset of the read cursor.
    pub fn read_position(&self) -> u64 {
        self.read_position
    }

    /// Bytes between the read cursor and the end of the stream.
    pub fn available(&self) -> usize {
        (self.total_size - self.read_position) as usize
    }

    /// Copy up to `buf.len()` bytes from the cursor, advancing it.
    ///
    /// Returns the number of bytes copied; zero means the cursor is at the end.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let copied = self.copy_at(self.read_position, buf);
        self.read_position += copied as u64;
        copied
    }

    /// Move the cursor to an absolute stream offset. Offsets past the end fail.
    pub fn seek(&mut self, offset: u64) -> Option<u64> {
        if offset > self.total_size {
            return None;
        }
        self.read_position = offset;
        Some(offset)
    }

    /// Move the cursor back to the start of the stream.
    pub fn rewind(&mut self) {
        self.read_position = 0;
    }

    /// Chunk index and in-chunk offset of stream position `pos`.
    fn locate(&self, pos: u64) -> Option<(usize, usize)> {
        if pos >= self.total_size {
            return None;
        }
        let mut chunk_start = 0;
        for (index, chunk) in self.chunks.iter().enumerate() {
            let chunk_end = chunk_start + chunk.len() as u64;
            if pos < chunk_end {
                return Some((index, (pos - chunk_start) as usize));
            }
            chunk_start = chunk_end;
        }
        None
    }

    fn copy_at(&self, pos: u64, buf: &mut [u8]) -> usize {
        let Some((mut index, mut start)) = self.locate(pos) else {
            return 0;
        };

        let mut copied = 0;
        while copied < buf.len() {
            let Some(chunk) = self.chunks.get(index) else {
                break;
            };
            let count = (chunk.len() - start).min(buf.len() - copied);
            buf[copied..copied + count].copy_from_slice(&chunk[start..start + count]);
            copied += count;
            index += 1;
            start = 0;
        }
        copied
    }
}
