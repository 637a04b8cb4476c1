//! Error types for the streaming decoder.
//!
//! All errors implement `std::error::Error` and carry structured context about
//! the lifecycle step that failed.
//!
//! ## Error Categories
//!
//! - **Protocol violations**: a call that is not valid in the current session state
//!   (e.g. `decode()` before `open_video()`, a second `initialize()`)
//! - **Resource exhaustion**: the worker's packet buffer cap would be exceeded
//! - **Container errors**: unrecognized or malformed container data
//! - **Codec errors**: an FFmpeg demux, decode or scale call failed
//! - **Source errors**: the external byte source failed or could not be opened
//! - **Pipeline errors**: timeouts, frame/metadata mismatches, unmet frame targets
//!
//! Insufficient data is not an error. `open_video()` and `decode()` report it as
//! `Ok(false)`.
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use streamdec::DecoderError;
//!
//! let error = DecoderError::resource_exhausted(4096, 1 << 20, 1 << 20);
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::LifecycleState;

/// Result type alias for decoder operations.
pub type Result<T, E = DecoderError> = std::result::Result<T, E>;

/// Main error type for decoder operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DecoderError {
    #[error("Protocol violation: {operation} is not valid in state {state}")]
    Protocol { operation: &'static str, state: LifecycleState },

    #[error("Invalid packet range: offset {offset} + length {length} exceeds buffer of {buffer_len} bytes")]
    InvalidPacket { offset: usize, length: usize, buffer_len: usize },

    #[error("Packet buffer exhausted: {requested} more bytes on top of {buffered} exceeds limit {limit}")]
    ResourceExhausted { requested: usize, buffered: usize, limit: usize },

    #[error("Malformed container in {context}: {details}")]
    Container { context: String, details: String },

    #[error("Invalid frame dimensions {width}x{height} (max decoded dimension {max})")]
    Dimensions { width: u32, height: u32, max: u32 },

    #[error("FFmpeg {operation} failed: {source}")]
    Codec {
        operation: &'static str,
        #[source]
        source: ffmpeg_next::Error,
    },

    #[error("Byte source failed: {reason}")]
    Source {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Source file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {details}")]
    Config { details: String },

    #[error("{operation} timed out after {duration:?}")]
    Timeout { operation: &'static str, duration: Duration },

    #[error("Frame does not match stream metadata: {details}")]
    FrameMismatch { details: String },

    #[error("Processed {actual} frames, expected {expected}")]
    FrameTarget { expected: usize, actual: usize },

    #[error("Frame consumer failed on scene {scene_id}")]
    Consumer {
        scene_id: u64,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Decode worker has terminated")]
    WorkerTerminated,
}

impl DecoderError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            DecoderError::ResourceExhausted { .. } => true,
            DecoderError::Timeout { .. } => true,
            DecoderError::Source { .. } => true,
            DecoderError::Protocol { .. } => false,
            DecoderError::InvalidPacket { .. } => false,
            DecoderError::Container { .. } => false,
            DecoderError::Dimensions { .. } => false,
            DecoderError::Codec { .. } => false,
            DecoderError::File { .. } => false,
            DecoderError::Config { .. } => false,
            DecoderError::FrameMismatch { .. } => false,
            DecoderError::FrameTarget { .. } => false,
            DecoderError::Consumer { .. } => false,
            DecoderError::WorkerTerminated => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            DecoderError::Protocol { .. } => vec![
                "Call initialize() once before submitting packets",
                "Call open_video() successfully before decode()",
                "Do not use a session after close_video()",
            ],
            DecoderError::InvalidPacket { .. } => vec![
                "Check packet offset and length against the buffer size",
                "Submit the chunk as received from the source",
            ],
            DecoderError::ResourceExhausted { .. } => vec![
                "Decode buffered frames before submitting more data",
                "Raise max_buffered_bytes in the decoder configuration",
                "Reduce the feed rate of the byte source",
            ],
            DecoderError::Container { .. } => vec![
                "Verify the source is a video container FFmpeg can demux",
                "Check that chunks were submitted in arrival order without gaps",
            ],
            DecoderError::Dimensions { .. } => vec![
                "Check the stream header width and height",
                "Raise max_decoded_dimension or set it to 0 to disable the cap",
            ],
            DecoderError::Codec { .. } => vec![
                "Check that the FFmpeg build includes a decoder for this codec",
                "Verify the stream is not truncated or corrupted mid-record",
            ],
            DecoderError::Source { .. } => vec![
                "Check connectivity to the byte source",
                "Retry the download",
            ],
            DecoderError::File { .. } => vec![
                "Check the file exists and is readable",
                "Check file permissions",
            ],
            DecoderError::Config { .. } => vec![
                "Check the configuration file syntax",
                "Compare field names against the documented defaults",
            ],
            DecoderError::Timeout { .. } => vec![
                "Increase the timeout in the pipeline configuration",
                "Check that the worker is still running",
            ],
            DecoderError::FrameMismatch { .. } => vec![
                "Subscribe to events before opening the video",
                "Verify the decoder emitted metadata for this session",
            ],
            DecoderError::FrameTarget { .. } => vec![
                "Stream more of the source before decoding",
                "Lower target_frames or disable require_target_frames",
            ],
            DecoderError::Consumer { .. } => vec!["Inspect the consumer error source"],
            DecoderError::WorkerTerminated => {
                vec!["Spawn a new worker; a terminated worker cannot be reused"]
            }
        }
    }

    /// Helper constructor for protocol violations.
    pub fn protocol(operation: &'static str, state: LifecycleState) -> Self {
        DecoderError::Protocol { operation, state }
    }

    /// Helper constructor for container parse errors.
    pub fn container(context: impl Into<String>, details: impl Into<String>) -> Self {
        DecoderError::Container { context: context.into(), details: details.into() }
    }

    /// Helper constructor for failed FFmpeg calls.
    pub fn codec(operation: &'static str, source: ffmpeg_next::Error) -> Self {
        DecoderError::Codec { operation, source }
    }

    /// Helper constructor for buffer cap violations.
    pub fn resource_exhausted(requested: usize, buffered: usize, limit: usize) -> Self {
        DecoderError::ResourceExhausted { requested, buffered, limit }
    }

    /// Helper constructor for source failures.
    pub fn source_failed(reason: impl Into<String>) -> Self {
        DecoderError::Source { reason: reason.into(), source: None }
    }

    /// Helper constructor for source failures with an underlying cause.
    pub fn source_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        DecoderError::Source { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        DecoderError::File { path, source }
    }

    /// Helper constructor for configuration errors.
    pub fn config(details: impl Into<String>) -> Self {
        DecoderError::Config { details: details.into() }
    }

    /// Helper constructor for consumer failures.
    pub fn consumer(scene_id: u64, source: anyhow::Error) -> Self {
        DecoderError::Consumer { scene_id, source: source.into() }
    }
}

impl From<std::io::Error> for DecoderError {
    fn from(err: std::io::Error) -> Self {
        DecoderError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}

impl From<serde_yaml_ng::Error> for DecoderError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        DecoderError::Config { details: err.to_string() }
    }
}
