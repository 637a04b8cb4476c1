//! Custom AVIO context reading from a [`PacketBuffer`]
//!
//! libavformat pulls bytes through two callbacks: `read_packet` copies from the
//! buffer cursor and `seek_packet` moves it. Both receive a pointer to a
//! [`StreamIo`] that lives on the heap for as long as the AVIO context does.

use std::ffi::{c_int, c_void};
use std::mem::ManuallyDrop;
use std::ptr::{self, NonNull};
use std::slice;

use ffmpeg_next::ffi;
use tracing::trace;

use crate::buffer::PacketBuffer;
use crate::{DecoderError, Result};

const SEEK_SET: c_int = 0;
const SEEK_CUR: c_int = 1;
const SEEK_END: c_int = 2;
/// `whence` flag asking for the stream size instead of a seek
const AVSEEK_SIZE: c_int = 0x10000;
const AVSEEK_FORCE: c_int = 0x20000;

/// State shared with the AVIO callbacks.
#[derive(Debug)]
struct StreamIo {
    buffer: PacketBuffer,
    /// Set when a read found the cursor at the end of the buffered bytes
    exhausted: bool,
}

/// Heap slot whose address is the AVIO `opaque` pointer.
///
/// Rust code only touches the slot between FFmpeg calls, never while a callback
/// may be running.
#[derive(Debug)]
pub struct SharedBuffer {
    io: NonNull<StreamIo>,
}

impl SharedBuffer {
    pub fn new(buffer: PacketBuffer) -> Self {
        let io = Box::new(StreamIo { buffer, exhausted: false });
        Self { io: NonNull::from(Box::leak(io)) }
    }

    pub fn buffer(&self) -> &PacketBuffer {
        // SAFETY: the slot is live until drop and no callback runs during `&self`
        unsafe { &self.io.as_ref().buffer }
    }

    pub fn buffer_mut(&mut self) -> &mut PacketBuffer {
        // SAFETY: as above, with exclusive access through `&mut self`
        unsafe { &mut self.io.as_mut().buffer }
    }

    /// Whether a read hit the end of the buffered bytes since the last reset.
    pub fn exhausted(&self) -> bool {
        // SAFETY: see `buffer`
        unsafe { self.io.as_ref().exhausted }
    }

    pub fn reset_exhausted(&mut self) {
        // SAFETY: see `buffer_mut`
        unsafe { self.io.as_mut().exhausted = false }
    }

    /// Give the buffer back with its cursor at the start of the stream.
    ///
    /// Every AVIO context built on this slot must already be dropped.
    pub fn into_buffer(self) -> PacketBuffer {
        let this = ManuallyDrop::new(self);
        // SAFETY: the pointer came from `Box::leak` and is reclaimed exactly once
        let io = unsafe { Box::from_raw(this.io.as_ptr()) };
        let mut buffer = io.buffer;
        buffer.rewind();
        buffer
    }

    fn opaque(&self) -> *mut c_void {
        self.io.as_ptr().cast()
    }
}

impl Drop for SharedBuffer {
    fn drop(&mut self) {
        // SAFETY: the pointer came from `Box::leak` and is reclaimed exactly once
        drop(unsafe { Box::from_raw(self.io.as_ptr()) });
    }
}

/// Owned `AVIOContext` whose callbacks read a [`SharedBuffer`].
///
/// Must be dropped before the `SharedBuffer` it was built on, and after any
/// format context that uses it.
#[derive(Debug)]
pub struct AvioReader {
    ctx: *mut ffi::AVIOContext,
}

impl AvioReader {
    pub fn new(io: &SharedBuffer) -> Result<Self> {
        let size = io.buffer().block_size();
        let buf_size = c_int::try_from(size)
            .map_err(|_| DecoderError::container("avio", format!("block size {size} too large")))?;

        unsafe {
            let buffer = ffi::av_malloc(size) as *mut u8;
            if buffer.is_null() {
                return Err(DecoderError::codec("av_malloc", ffmpeg_next::Error::Bug));
            }

            let ctx = ffi::avio_alloc_context(
                buffer,
                buf_size,
                0,
                io.opaque(),
                Some(read_packet),
                None,
                Some(seek_packet),
            );
            if ctx.is_null() {
                ffi::av_free(buffer.cast());
                return Err(DecoderError::codec("avio_alloc_context", ffmpeg_next::Error::Bug));
            }
            if io.buffer().block_size_hinted() {
                (*ctx).max_packet_size = buf_size;
            }
            Ok(Self { ctx })
        }
    }

    pub fn as_mut_ptr(&mut self) -> *mut ffi::AVIOContext {
        self.ctx
    }

    /// Forget a previous end of data so reads reach the callback again.
    pub fn clear_eof(&mut self) {
        unsafe { (*self.ctx).eof_reached = 0 }
    }

    /// Current logical stream position.
    pub fn position(&mut self) -> Result<i64> {
        let pos = unsafe { ffi::avio_seek(self.ctx, 0, SEEK_CUR) };
        if pos < 0 {
            return Err(DecoderError::codec("avio_tell", ffmpeg_next::Error::from(pos as c_int)));
        }
        Ok(pos)
    }

    /// Return to `pos`, previously obtained from [`position`](Self::position).
    pub fn seek_to(&mut self, pos: i64) -> Result<()> {
        let ret = unsafe { ffi::avio_seek(self.ctx, pos, SEEK_SET) };
        if ret < 0 {
            return Err(DecoderError::codec("avio_seek", ffmpeg_next::Error::from(ret as c_int)));
        }
        self.clear_eof();
        Ok(())
    }
}

impl Drop for AvioReader {
    fn drop(&mut self) {
        if self.ctx.is_null() {
            return;
        }
        // The internal buffer may have been reallocated, so free what the context
        // points at now, not what was passed in.
        unsafe {
            ffi::av_freep(ptr::addr_of_mut!((*self.ctx).buffer).cast());
            ffi::avio_context_free(&mut self.ctx);
        }
    }
}

unsafe extern "C" fn read_packet(opaque: *mut c_void, buf: *mut u8, buf_size: c_int) -> c_int {
    if opaque.is_null() || buf.is_null() || buf_size <= 0 {
        return ffi::AVERROR_EOF;
    }
    let io = unsafe { &mut *(opaque as *mut StreamIo) };
    let out = unsafe { slice::from_raw_parts_mut(buf, buf_size as usize) };

    let len = out.len().min(io.buffer.block_size());
    let copied = io.buffer.read(&mut out[..len]);
    if copied == 0 {
        io.exhausted = true;
        trace!(position = io.buffer.read_position(), "AVIO read at end of buffered data");
        return ffi::AVERROR_EOF;
    }
    copied as c_int
}

unsafe extern "C" fn seek_packet(opaque: *mut c_void, offset: i64, whence: c_int) -> i64 {
    if opaque.is_null() {
        return -1;
    }
    let buffer = unsafe { &mut (*(opaque as *mut StreamIo)).buffer };

    if whence & AVSEEK_SIZE != 0 {
        return buffer.total_size() as i64;
    }
    let base = match whence & !AVSEEK_FORCE {
        SEEK_SET => 0,
        SEEK_CUR => buffer.read_position() as i64,
        SEEK_END => buffer.total_size() as i64,
        _ => return -1,
    };
    match base.checked_add(offset) {
        Some(target) if target >= 0 => buffer.seek(target as u64).map_or(-1, |pos| pos as i64),
        _ => -1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared(chunks: &[&[u8]]) -> SharedBuffer {
        let mut buffer = PacketBuffer::new(4, usize::MAX);
        for chunk in chunks {
            buffer.append(chunk.to_vec()).unwrap();
        }
        SharedBuffer::new(buffer)
    }

    #[test]
    fn read_callback_honors_block_size_and_flags_the_end() {
        let io = shared(&[b"abcdef"]);
        let mut out = [0u8; 16];
        unsafe {
            assert_eq!(read_packet(io.opaque(), out.as_mut_ptr(), 16), 4);
            assert_eq!(read_packet(io.opaque(), out.as_mut_ptr(), 16), 2);
            assert!(!io.exhausted());
            assert_eq!(read_packet(io.opaque(), out.as_mut_ptr(), 16), ffi::AVERROR_EOF);
        }
        assert_eq!(&out[..2], b"ef");
        assert!(io.exhausted());
    }

    #[test]
    fn seek_callback_covers_every_origin() {
        let io = shared(&[b"0123", b"4567"]);
        unsafe {
            assert_eq!(seek_packet(io.opaque(), 0, AVSEEK_SIZE), 8);
            assert_eq!(seek_packet(io.opaque(), 3, SEEK_SET), 3);
            assert_eq!(seek_packet(io.opaque(), 2, SEEK_CUR), 5);
            assert_eq!(seek_packet(io.opaque(), -1, SEEK_END | AVSEEK_FORCE), 7);
            assert_eq!(seek_packet(io.opaque(), 9, SEEK_SET), -1);
            assert_eq!(seek_packet(io.opaque(), -9, SEEK_CUR), -1);
        }
        assert_eq!(io.buffer().read_position(), 7);
    }

    #[test]
    fn into_buffer_rewinds() {
        let mut io = shared(&[b"xyz"]);
        let mut out = [0u8; 2];
        io.buffer_mut().read(&mut out);
        let buffer = io.into_buffer();
        assert_eq!(buffer.read_position(), 0);
        assert_eq!(buffer.available(), 3);
    }
}
