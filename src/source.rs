//! Byte source trait for compressed video input

use crate::Result;

/// Trait for producers of a compressed byte stream
///
/// Sources abstract over where the bytes come from (memory, a file, a network
/// download feeding a channel). Chunks are yielded in stream order and may be
/// split anywhere; the decoder never assumes they align with container records.
#[async_trait::async_trait]
pub trait ByteSource: Send + 'static {
    /// Human-readable name passed to the worker on initialization
    fn name(&self) -> &str;

    /// Preferred read granularity, if the source knows one
    fn block_size(&self) -> Option<u32> {
        None
    }

    /// Get the next chunk
    ///
    /// Returns:
    /// - `Ok(Some(chunk))` - More data
    /// - `Ok(None)` - Stream ended (normal termination)
    /// - `Err(e)` - The source failed; the pipeline aborts
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>>;

    /// Release the source. Later `next_chunk` calls return `Ok(None)`.
    fn destroy(&mut self);
}
