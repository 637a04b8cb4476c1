//! Worker-isolated streaming video decoder.
//!
//! Streamdec turns a compressed byte stream that arrives in arbitrary chunks into
//! fixed-size RGBA8 frames. Decoding runs in an isolated worker task that owns all
//! decoder state; callers move packets in and receive metadata and frames as events.
//!
//! # Features
//!
//! - **Isolation**: the decoder session lives only inside the worker task
//! - **Backpressure**: every packet submission is acknowledged before the next
//! - **Incremental**: the container is demuxed as data arrives, across any chunking
//! - **Bounded output**: frames are downscaled to a configurable maximum dimension
//!
//! Demuxing, decoding and RGBA conversion go through FFmpeg (`ffmpeg-next`), reading
//! the worker's packet buffer through a custom AVIO context. Any container and codec
//! the linked libavformat and libavcodec support can be decoded.
//!
//! ## Example (worker protocol)
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use streamdec::{DecoderConfig, StreamDecoder};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> streamdec::Result<()> {
//!     let mut worker = StreamDecoder::spawn(&DecoderConfig::default());
//!     let mut frames = worker.on_frame_available();
//!
//!     worker.initialize("clip.y4m", 4096, 256).await?;
//!     worker.submit(std::fs::read("clip.y4m")?.into()).await?;
//!     if worker.open_video().await? {
//!         while worker.decode().await? {
//!             let frame = frames.next().await.expect("frame event");
//!             println!("frame {}: {}x{}", frame.index, frame.width, frame.height);
//!         }
//!     }
//!     worker.close_video().await?;
//!     worker.terminate().await;
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Decoding
pub mod buffer;
pub mod codec;
pub mod session;

// Worker and events
pub mod config;
pub mod events;
pub mod stream;
pub mod worker;

// Sources and the pipeline driver
pub mod pipeline;
pub mod source;
pub mod sources;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use config::{DecoderConfig, PipelineConfig};
pub use pipeline::{FrameConsumer, Pipeline, PipelineReport, SceneCounter};
pub use source::ByteSource;
pub use sources::{ChannelSource, FileSource, MemorySource};
pub use stream::EventStream;
pub use worker::{Worker, WorkerHandle};

use tracing_subscriber::EnvFilter;

/// Install a `tracing` fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter`. Does nothing if a global subscriber is already set.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Unified entry point for decoding.
///
/// # Examples
///
/// ## Decode a file
/// ```rust,no_run
/// use streamdec::{PipelineConfig, SceneCounter, StreamDecoder};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> streamdec::Result<()> {
///     let mut scenes = SceneCounter::new();
///     let report =
///         StreamDecoder::decode_file("clip.y4m", PipelineConfig::default(), &mut scenes).await?;
///     println!("{} scenes", report.frames_processed());
///     Ok(())
/// }
/// ```
pub struct StreamDecoder;

impl StreamDecoder {
    /// Spawn a decode worker on the current runtime.
    pub fn spawn(config: &DecoderConfig) -> WorkerHandle {
        Worker::spawn(config)
    }

    /// Decode up to `config.target_frames` frames from any byte source.
    pub async fn decode_source<S, C>(
        source: S,
        config: PipelineConfig,
        consumer: &mut C,
    ) -> Result<PipelineReport>
    where
        S: ByteSource,
        C: FrameConsumer,
    {
        Pipeline::new(config)?.run(source, consumer).await
    }

    /// Decode up to `config.target_frames` frames from a video file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file does not exist or is not readable
    /// - FFmpeg cannot demux or decode the file
    /// - The consumer rejects a frame
    pub async fn decode_file<P, C>(
        path: P,
        config: PipelineConfig,
        consumer: &mut C,
    ) -> Result<PipelineReport>
    where
        P: AsRef<std::path::Path>,
        C: FrameConsumer,
    {
        let source = FileSource::open(path)?;
        Self::decode_source(source, config, consumer).await
    }
}
