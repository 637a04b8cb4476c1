//! FFmpeg decode engine: custom AVIO, demuxing, decoding and RGBA scaling
//!
//! The container and codec are whatever libavformat and libavcodec recognize in the
//! submitted bytes. Frames leave as packed RGBA8 at a size chosen by
//! [`fit_dimensions`].

mod avio;
mod decoder;
mod scale;

pub use decoder::{OpenOutcome, FORMAT_SCAN_SIZE, VideoDecoder};
pub use scale::{FrameScaler, fit_dimensions};

use crate::{DecoderError, Result};

/// Register FFmpeg components. Safe to call more than once.
pub fn init() -> Result<()> {
    ffmpeg_next::init().map_err(|e| DecoderError::codec("init", e))
}
