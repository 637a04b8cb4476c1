//! Output size selection and RGBA conversion through swscale

use ffmpeg_next::format::Pixel;
use ffmpeg_next::frame;
use ffmpeg_next::software::scaling;

use crate::types::{BYTES_PER_PIXEL, frame_len};
use crate::{DecoderError, Result};

/// Halve both axes until the larger one fits within `max_dimension`.
///
/// Returns the output `(width, height)`. `max_dimension == 0` disables the cap.
/// Frames are never upscaled, and sizes whose RGBA buffer would not fit in
/// `usize` are rejected.
pub fn fit_dimensions(width: u32, height: u32, max_dimension: u32) -> Result<(u32, u32)> {
    let (mut w, mut h) = (width, height);
    if max_dimension > 0 {
        while w.max(h) > max_dimension {
            w /= 2;
            h /= 2;
        }
    }

    if w == 0 || h == 0 || frame_len(w, h).is_none() {
        return Err(DecoderError::Dimensions { width, height, max: max_dimension });
    }
    Ok((w, h))
}

/// Converts decoded frames of one source geometry to packed RGBA8.
pub struct FrameScaler {
    context: scaling::Context,
    source: (Pixel, u32, u32),
    rgba: frame::Video,
}

impl FrameScaler {
    pub fn new(source: &frame::Video, width: u32, height: u32) -> Result<Self> {
        let context = scaling::Context::get(
            source.format(),
            source.width(),
            source.height(),
            Pixel::RGBA,
            width,
            height,
            scaling::Flags::BILINEAR,
        )
        .map_err(|e| DecoderError::codec("sws_getContext", e))?;

        Ok(Self {
            context,
            source: (source.format(), source.width(), source.height()),
            rgba: frame::Video::new(Pixel::RGBA, width, height),
        })
    }

    /// Whether `frame` has the geometry this scaler was built for.
    pub fn accepts(&self, frame: &frame::Video) -> bool {
        self.source == (frame.format(), frame.width(), frame.height())
    }

    /// Scale `frame` and copy the result into a buffer without row padding.
    pub fn run(&mut self, frame: &frame::Video) -> Result<Vec<u8>> {
        self.context.run(frame, &mut self.rgba).map_err(|e| DecoderError::codec("sws_scale", e))?;

        let row = self.rgba.width() as usize * BYTES_PER_PIXEL;
        let stride = self.rgba.stride(0);
        let data = self.rgba.data(0);
        let mut out = Vec::with_capacity(row * self.rgba.height() as usize);
        for y in 0..self.rgba.height() as usize {
            out.extend_from_slice(&data[y * stride..y * stride + row]);
        }
        Ok(out)
    }
}

// SwsContext and AVFrame are only touched by the thread that owns the decoder.
unsafe impl Send for FrameScaler {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_by_halving() {
        assert_eq!(fit_dimensions(64, 64, 256).unwrap(), (64, 64));
        assert_eq!(fit_dimensions(640, 480, 256).unwrap(), (160, 120));
        assert_eq!(fit_dimensions(1920, 1080, 256).unwrap(), (240, 135));
        assert_eq!(fit_dimensions(257, 10, 256).unwrap(), (128, 5));
        assert_eq!(fit_dimensions(4000, 3000, 0).unwrap(), (4000, 3000));
    }

    #[test]
    fn degenerate_aspect_fails() {
        assert!(matches!(
            fit_dimensions(1024, 1, 256),
            Err(DecoderError::Dimensions { width: 1024, height: 1, max: 256 })
        ));
    }

    #[test]
    fn huge_uncapped_sizes_fail_instead_of_overflowing() {
        if usize::BITS == 64 {
            assert!(matches!(
                fit_dimensions(u32::MAX, u32::MAX, 0),
                Err(DecoderError::Dimensions { max: 0, .. })
            ));
        }
        assert_eq!(fit_dimensions(u32::MAX, u32::MAX, 256).unwrap(), (255, 255));
    }

    #[test]
    fn scaler_packs_rows_and_tracks_geometry() {
        ffmpeg_next::init().unwrap();
        let mut source = frame::Video::new(Pixel::GRAY8, 8, 6);
        let stride = source.stride(0);
        for y in 0..6 {
            source.data_mut(0)[y * stride..y * stride + 8].fill(200);
        }

        let mut scaler = FrameScaler::new(&source, 4, 3).unwrap();
        assert!(scaler.accepts(&source));
        assert!(!scaler.accepts(&frame::Video::new(Pixel::GRAY8, 16, 6)));

        let rgba = scaler.run(&source).unwrap();
        assert_eq!(rgba.len(), 4 * 3 * BYTES_PER_PIXEL);
        assert!(rgba.chunks(4).all(|px| px[3] == 255 && px[0] == px[1] && px[1] == px[2]));
    }
}
