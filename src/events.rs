//! Worker-to-caller event channel
//!
//! Two event kinds flow from the decode worker to any number of subscribers:
//! stream metadata (once per opened video) and decoded frames (once per successful
//! decode step). Both are broadcast, so subscribers see events in emission order
//! and each receives a shared handle to the same frame buffer.

use tokio::sync::broadcast;
use tracing::trace;

use crate::stream::EventStream;
use crate::types::{DecodedFrame, StreamMetadata};

/// Sender side of the metadata and frame events.
#[derive(Debug, Clone)]
pub struct EventChannel {
    metadata: broadcast::Sender<StreamMetadata>,
    frames: broadcast::Sender<DecodedFrame>,
}

impl EventChannel {
    /// Create a channel buffering up to `capacity` events per kind.
    ///
    /// `capacity` must be non-zero.
    pub fn new(capacity: usize) -> Self {
        let (metadata, _) = broadcast::channel(capacity);
        let (frames, _) = broadcast::channel(capacity);
        Self { metadata, frames }
    }

    /// Publish stream metadata. Returns the number of subscribers reached.
    pub fn emit_metadata(&self, metadata: StreamMetadata) -> usize {
        match self.metadata.send(metadata) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!("Metadata emitted with no subscribers");
                0
            }
        }
    }

    /// Publish a decoded frame. Returns the number of subscribers reached.
    pub fn emit_frame(&self, frame: DecodedFrame) -> usize {
        let index = frame.index;
        match self.frames.send(frame) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!(index, "Frame emitted with no subscribers");
                0
            }
        }
    }

    pub fn subscribe_metadata(&self) -> EventStream<StreamMetadata> {
        EventStream::new(self.metadata.subscribe(), "metadata")
    }

    pub fn subscribe_frames(&self) -> EventStream<DecodedFrame> {
        EventStream::new(self.frames.subscribe(), "frame")
    }
}
