//! Channel-fed byte source for network producers

use tokio::sync::mpsc;
use tracing::debug;

use crate::Result;
use crate::source::ByteSource;

/// Source fed by a producer task through a bounded channel.
///
/// The producer sends `Ok(chunk)` for data and `Err(e)` to abort the stream;
/// dropping the sender ends it normally.
#[derive(Debug)]
pub struct ChannelSource {
    name: String,
    receiver: mpsc::Receiver<Result<Vec<u8>>>,
    block_size: Option<u32>,
}

impl ChannelSource {
    /// Create the source and the sender its producer writes to.
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, mpsc::Sender<Result<Vec<u8>>>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { name: name.into(), receiver, block_size: None }, sender)
    }

    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = Some(block_size);
        self
    }
}

#[async_trait::async_trait]
impl ByteSource for ChannelSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn block_size(&self) -> Option<u32> {
        self.block_size
    }

    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        match self.receiver.recv().await {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    fn destroy(&mut self) {
        debug!("{}: closing source channel", self.name);
        self.receiver.close();
        while self.receiver.try_recv().is_ok() {}
    }
}
