//! Decoded frame payloads

use std::sync::Arc;

/// Bytes per decoded pixel (RGBA8).
pub const BYTES_PER_PIXEL: usize = 4;

/// Byte length of a `width` × `height` RGBA8 frame, `None` if it overflows `usize`.
pub fn frame_len(width: u32, height: u32) -> Option<usize> {
    (width as usize).checked_mul(height as usize)?.checked_mul(BYTES_PER_PIXEL)
}

/// One decoded frame in RGBA8 layout, rows top to bottom, no padding.
///
/// The pixel buffer is shared through `Arc` so every event subscriber can read it
/// without a copy; the worker keeps no handle once the frame is emitted.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// Zero-based position in decode order
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
}

impl DecodedFrame {
    pub fn new(index: u64, width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(Some(data.len()), frame_len(width, height));
        Self { index, width, height, data: data.into() }
    }

    /// True when the buffer holds exactly `width` × `height` pixels.
    pub fn is_complete(&self) -> bool {
        frame_len(self.width, self.height) == Some(self.data.len())
    }

    /// Row stride in bytes.
    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// RGBA value at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let start = y as usize * self.stride() + x as usize * BYTES_PER_PIXEL;
        let px = self.data.get(start..start + BYTES_PER_PIXEL)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}
