//! Test utilities for building synthetic Y4M streams
//!
//! Used by unit tests and the decode benchmark so neither depends on fixture files.
//! libavformat demuxes YUV4MPEG2 natively, which makes it a convenient raw fixture.

#![cfg(any(test, feature = "benchmark"))]

use std::fmt;

/// Chroma layouts the synthetic streams can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chroma {
    /// 4:2:0, full-range chroma siting
    C420Jpeg,
    C444,
    Mono,
}

impl Chroma {
    /// Chroma plane size for a `width` × `height` frame, `None` for monochrome.
    fn plane_dimensions(self, width: u32, height: u32) -> Option<(usize, usize)> {
        match self {
            Chroma::C420Jpeg => Some((width.div_ceil(2) as usize, height.div_ceil(2) as usize)),
            Chroma::C444 => Some((width as usize, height as usize)),
            Chroma::Mono => None,
        }
    }

    /// Byte length of one frame payload.
    pub fn frame_len(self, width: u32, height: u32) -> usize {
        let luma = width as usize * height as usize;
        luma + self.plane_dimensions(width, height).map_or(0, |(cw, ch)| 2 * cw * ch)
    }
}

impl fmt::Display for Chroma {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Chroma::C420Jpeg => "420jpeg",
            Chroma::C444 => "444",
            Chroma::Mono => "mono",
        })
    }
}

/// Luma value of pixel `(x, y)` in frame `index` of a synthetic stream.
///
/// Stays inside the limited range (16..=235) and shifts with the frame index so
/// consecutive frames differ.
pub fn luma_at(x: u32, y: u32, index: usize) -> u8 {
    16 + ((x as usize + y as usize * 3 + index * 7) % 220) as u8
}

/// Stream header line for a synthetic stream, including the trailing newline.
pub fn y4m_header(width: u32, height: u32, chroma: Chroma) -> Vec<u8> {
    format!("YUV4MPEG2 W{width} H{height} F25:1 Ip A1:1 C{chroma}\n").into_bytes()
}

/// Payload of one synthetic frame: a luma gradient over neutral chroma.
pub fn y4m_frame_payload(width: u32, height: u32, chroma: Chroma, index: usize) -> Vec<u8> {
    let mut payload = Vec::with_capacity(chroma.frame_len(width, height));
    for y in 0..height {
        for x in 0..width {
            payload.push(luma_at(x, y, index));
        }
    }
    if let Some((cw, ch)) = chroma.plane_dimensions(width, height) {
        payload.resize(payload.len() + 2 * cw * ch, 128);
    }
    payload
}

/// A complete stream with `frames` frame records.
pub fn synthetic_y4m(width: u32, height: u32, frames: usize, chroma: Chroma) -> Vec<u8> {
    let mut stream = y4m_header(width, height, chroma);
    for index in 0..frames {
        stream.extend_from_slice(b"FRAME\n");
        stream.extend_from_slice(&y4m_frame_payload(width, height, chroma, index));
    }
    stream
}

/// Bytes that no FFmpeg demuxer recognizes, `len` long.
pub fn unrecognized_bytes(len: usize) -> Vec<u8> {
    vec![0x07; len]
}

/// Split `data` into chunks of `chunk_size` bytes (the last may be shorter).
pub fn chunk_bytes(data: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
    data.chunks(chunk_size.max(1)).map(<[u8]>::to_vec).collect()
}
