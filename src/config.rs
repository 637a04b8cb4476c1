//! Decoder and pipeline configuration
//!
//! Both structs deserialize from YAML with every field optional; missing fields take
//! the defaults below.
//!
//! ```yaml
//! target_frames: 10
//! stream_timeout_ms: 60000
//! decoder:
//!   max_decoded_dimension: 256
//!   max_buffered_bytes: 536870912
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::{DecoderError, Result};

/// Worker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Overrides the byte source's own name when set
    pub source_name: Option<String>,
    /// Read granularity used when the source gives no hint; `0` means 4096
    pub block_size: u32,
    /// Cap on decoded width and height; `0` disables downscaling
    pub max_decoded_dimension: u32,
    /// Cap on bytes held by the worker's packet buffer
    pub max_buffered_bytes: usize,
    /// Pending commands before `submit` and friends wait
    pub command_capacity: usize,
    /// Events retained per kind for slow subscribers
    pub event_capacity: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            source_name: None,
            block_size: 0,
            max_decoded_dimension: 256,
            max_buffered_bytes: 512 * 1024 * 1024,
            command_capacity: 16,
            event_capacity: 64,
        }
    }
}

impl DecoderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_buffered_bytes == 0 {
            return Err(DecoderError::config("max_buffered_bytes must be greater than 0"));
        }
        if self.command_capacity == 0 {
            return Err(DecoderError::config("command_capacity must be greater than 0"));
        }
        if self.event_capacity == 0 {
            return Err(DecoderError::config("event_capacity must be greater than 0"));
        }
        Ok(())
    }
}

/// End-to-end pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub decoder: DecoderConfig,
    /// Frames to decode per run
    pub target_frames: usize,
    /// Upper bound on draining the byte source
    pub stream_timeout_ms: u64,
    /// Upper bound on waiting for a frame or metadata event
    pub frame_timeout_ms: u64,
    /// Treat fewer than `target_frames` decoded frames as an error
    pub require_target_frames: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            decoder: DecoderConfig::default(),
            target_frames: 10,
            stream_timeout_ms: 60_000,
            frame_timeout_ms: 10_000,
            require_target_frames: false,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| DecoderError::file_error(path.to_path_buf(), e))?;
        debug!("Loaded pipeline config from {}", path.display());
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<()> {
        self.decoder.validate()?;
        if self.stream_timeout_ms == 0 {
            return Err(DecoderError::config("stream_timeout_ms must be greater than 0"));
        }
        if self.frame_timeout_ms == 0 {
            return Err(DecoderError::config("frame_timeout_ms must be greater than 0"));
        }
        Ok(())
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_timeout_ms)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }
}
