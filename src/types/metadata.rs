//! Stream metadata emitted once per opened video

use std::fmt;

use serde::{Deserialize, Serialize};

use super::frame_len;
use crate::{DecoderError, Result};

/// Average frame rate of the video stream as a ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRate {
    pub numerator: u32,
    pub denominator: u32,
}

impl FrameRate {
    /// `None` unless both terms are positive.
    pub fn from_ratio(numerator: i32, denominator: i32) -> Option<Self> {
        if numerator <= 0 || denominator <= 0 {
            return None;
        }
        Some(Self { numerator: numerator as u32, denominator: denominator as u32 })
    }

    pub fn fps(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Output geometry and source properties of an opened video.
///
/// `frame_width`/`frame_height` describe the decoded (possibly downscaled) frames;
/// the `source_*` fields keep what the codec reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetadata {
    pub frame_width: u32,
    pub frame_height: u32,
    /// Byte length of one decoded frame
    pub frame_size: usize,
    pub source_width: u32,
    pub source_height: u32,
    pub frame_rate: Option<FrameRate>,
    /// FFmpeg codec name, e.g. `rawvideo` or `h264`
    pub codec: String,
    /// Source pixel format before conversion to RGBA
    pub pixel_format: String,
}

impl StreamMetadata {
    /// Build metadata for `frame_width` × `frame_height` RGBA output.
    ///
    /// Fails with [`DecoderError::Dimensions`] when either output side is zero or
    /// the frame size does not fit in memory.
    pub fn new(
        frame_width: u32,
        frame_height: u32,
        source_width: u32,
        source_height: u32,
    ) -> Result<Self> {
        let frame_size = frame_len(frame_width, frame_height)
            .filter(|&len| len > 0)
            .ok_or(DecoderError::Dimensions { width: source_width, height: source_height, max: 0 })?;
        Ok(Self {
            frame_width,
            frame_height,
            frame_size,
            source_width,
            source_height,
            frame_rate: None,
            codec: String::new(),
            pixel_format: String::new(),
        })
    }

    pub fn with_frame_rate(mut self, frame_rate: Option<FrameRate>) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn with_format(mut self, codec: impl Into<String>, pixel_format: impl Into<String>) -> Self {
        self.codec = codec.into();
        self.pixel_format = pixel_format.into();
        self
    }

    /// True when the worker reduces frames below their source size.
    pub fn is_downscaled(&self) -> bool {
        self.frame_width != self.source_width || self.frame_height != self.source_height
    }
}
