//! Demux and decode one video stream out of a packet buffer

use std::ffi::c_int;
use std::ptr;

use ffmpeg_next::{Packet, ffi, format, frame, media};
use tracing::{debug, trace};

use super::avio::{AvioReader, SharedBuffer};
use super::scale::{FrameScaler, fit_dimensions};
use crate::buffer::PacketBuffer;
use crate::types::{FrameRate, StreamMetadata};
use crate::{DecoderError, Result};

/// Upper bound on bytes libavformat inspects to identify the container.
pub const FORMAT_SCAN_SIZE: u32 = 1 << 20;

/// Result of an open attempt.
pub enum OpenOutcome {
    Opened(Box<VideoDecoder>),
    /// The container could not be identified yet; the buffer comes back rewound
    NeedMoreData(PacketBuffer),
}

enum OpenFailure {
    Incomplete,
    Failed(DecoderError),
}

impl From<DecoderError> for OpenFailure {
    fn from(err: DecoderError) -> Self {
        OpenFailure::Failed(err)
    }
}

/// Demuxer, codec and scaler for the first video stream of a container.
pub struct VideoDecoder {
    // Field order is drop order: the scaler and codec, then the format context,
    // then its AVIO context, then the bytes both read from.
    scaler: Option<FrameScaler>,
    decoder: ffmpeg_next::codec::decoder::Video,
    input: format::context::Input,
    avio: AvioReader,
    io: SharedBuffer,
    stream_index: usize,
    decoded: frame::Video,
    metadata: StreamMetadata,
}

// Every FFmpeg object here is owned by the decoder and used by one thread at a time.
unsafe impl Send for VideoDecoder {}

impl VideoDecoder {
    /// Identify the container in `buffer` and open its first video stream.
    ///
    /// Returns [`OpenOutcome::NeedMoreData`] when the buffer is empty, when the
    /// container cannot be identified from fewer than [`FORMAT_SCAN_SIZE`] bytes, or
    /// when the header ends inside the buffered data.
    pub fn open(buffer: PacketBuffer, max_dimension: u32) -> Result<OpenOutcome> {
        if buffer.total_size() == 0 {
            return Ok(OpenOutcome::NeedMoreData(buffer));
        }
        super::init()?;

        let mut io = SharedBuffer::new(buffer);
        let mut avio = AvioReader::new(&io)?;
        let input = match open_input(&mut io, &mut avio) {
            Ok(input) => input,
            Err(OpenFailure::Incomplete) => {
                drop(avio);
                return Ok(OpenOutcome::NeedMoreData(io.into_buffer()));
            }
            Err(OpenFailure::Failed(err)) => return Err(err),
        };

        let (stream_index, frame_rate, decoder) = {
            let stream = input.streams().best(media::Type::Video).ok_or_else(|| {
                DecoderError::container("stream selection", "no video stream in container")
            })?;
            let frame_rate = FrameRate::from_ratio(
                stream.avg_frame_rate().numerator(),
                stream.avg_frame_rate().denominator(),
            );

            let mut decoder_ctx = ffmpeg_next::codec::Context::new();
            decoder_ctx
                .set_parameters(stream.parameters())
                .map_err(|e| DecoderError::codec("set codec parameters", e))?;
            let decoder =
                decoder_ctx.decoder().video().map_err(|e| DecoderError::codec("open decoder", e))?;
            (stream.index(), frame_rate, decoder)
        };

        if decoder.format() == format::Pixel::None || decoder.width() == 0 || decoder.height() == 0
        {
            return Err(DecoderError::Dimensions {
                width: decoder.width(),
                height: decoder.height(),
                max: max_dimension,
            });
        }

        let (width, height) = fit_dimensions(decoder.width(), decoder.height(), max_dimension)?;
        let metadata = StreamMetadata::new(width, height, decoder.width(), decoder.height())?
            .with_frame_rate(frame_rate)
            .with_format(
                format!("{:?}", decoder.id()).to_lowercase(),
                format!("{:?}", decoder.format()).to_lowercase(),
            );
        debug!(
            stream_index,
            codec = %metadata.codec,
            pixel_format = %metadata.pixel_format,
            "Selected video stream"
        );

        Ok(OpenOutcome::Opened(Box::new(Self {
            scaler: None,
            decoder,
            input,
            avio,
            io,
            stream_index,
            decoded: frame::Video::empty(),
            metadata,
        })))
    }

    pub fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    pub fn buffer(&self) -> &PacketBuffer {
        self.io.buffer()
    }

    /// Append more stream bytes behind the ones already demuxed.
    pub fn append(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.io.buffer_mut().append(bytes)
    }

    /// Decode the next frame into packed RGBA8 at the metadata size.
    ///
    /// Returns `Ok(None)` when the buffered data ends before another frame; the
    /// read position is kept so a later call resumes after more bytes arrive.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            match self.decoder.receive_frame(&mut self.decoded) {
                Ok(()) => return self.scale().map(Some),
                Err(ffmpeg_next::Error::Other { errno })
                    if errno == ffmpeg_next::util::error::EAGAIN => {}
                Err(ffmpeg_next::Error::Eof) => return Ok(None),
                Err(e) => return Err(DecoderError::codec("receive frame", e)),
            }

            let Some(packet) = self.read_packet()? else {
                return Ok(None);
            };
            self.decoder.send_packet(&packet).map_err(|e| DecoderError::codec("send packet", e))?;
        }
    }

    /// Read the next packet of the selected stream.
    ///
    /// A read that runs out of buffered bytes is undone so the partial record is
    /// demuxed again once the rest has been submitted.
    fn read_packet(&mut self) -> Result<Option<Packet>> {
        loop {
            self.avio.clear_eof();
            self.io.reset_exhausted();
            let start = self.avio.position()?;

            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {}
                Err(e) if matches!(e, ffmpeg_next::Error::Eof) || self.io.exhausted() => {
                    trace!(position = start, error = %e, "Buffered data ends inside a packet");
                    self.avio.seek_to(start)?;
                    return Ok(None);
                }
                Err(e) => return Err(DecoderError::codec("read packet", e)),
            }

            if packet.stream() == self.stream_index {
                return Ok(Some(packet));
            }
            trace!(stream = packet.stream(), "Skipping packet from another stream");
        }
    }

    fn scale(&mut self) -> Result<Vec<u8>> {
        let mut scaler = match self.scaler.take() {
            Some(scaler) if scaler.accepts(&self.decoded) => scaler,
            _ => FrameScaler::new(
                &self.decoded,
                self.metadata.frame_width,
                self.metadata.frame_height,
            )?,
        };
        let pixels = scaler.run(&self.decoded);
        self.scaler = Some(scaler);
        pixels
    }
}

/// Detect and open the container behind `avio`, then read its stream info.
fn open_input(
    io: &mut SharedBuffer,
    avio: &mut AvioReader,
) -> std::result::Result<format::context::Input, OpenFailure> {
    io.reset_exhausted();
    unsafe {
        let mut ctx = ffi::avformat_alloc_context();
        if ctx.is_null() {
            return Err(DecoderError::codec("avformat_alloc_context", ffmpeg_next::Error::Bug).into());
        }
        (*ctx).pb = avio.as_mut_ptr();
        (*ctx).flags |= ffi::AVFMT_FLAG_CUSTOM_IO as c_int;
        (*ctx).probesize = FORMAT_SCAN_SIZE as i64;

        let mut input_format: *const ffi::AVInputFormat = ptr::null();
        let score = ffi::av_probe_input_buffer2(
            avio.as_mut_ptr(),
            &mut input_format,
            ptr::null(),
            ptr::null_mut(),
            0,
            FORMAT_SCAN_SIZE,
        );
        if score < 0 || input_format.is_null() {
            ffi::avformat_free_context(ctx);
            let buffered = io.buffer().total_size();
            if io.exhausted() && buffered < FORMAT_SCAN_SIZE as u64 {
                debug!(buffered, "Container not identified yet");
                return Err(OpenFailure::Incomplete);
            }
            return Err(DecoderError::container(
                "format detection",
                format!("no demuxer recognizes the first {buffered} bytes"),
            )
            .into());
        }

        // On failure this frees `ctx` but leaves the custom AVIO context alone.
        let ret = ffi::avformat_open_input(&mut ctx, ptr::null(), input_format, ptr::null_mut());
        if ret < 0 {
            return Err(classify_open_error("open input", ret));
        }
        let input = format::context::Input::wrap(ctx);

        // Stream info analysis reads ahead and may swallow a partial record, so it
        // only runs when the header alone does not describe the video stream.
        if !video_parameters_known(ctx) {
            let ret = ffi::avformat_find_stream_info(ctx, ptr::null_mut());
            if ret < 0 {
                return Err(classify_open_error("find stream info", ret));
            }
        }
        Ok(input)
    }
}

/// True when some stream already carries video size and pixel format.
unsafe fn video_parameters_known(ctx: *const ffi::AVFormatContext) -> bool {
    let streams = unsafe { (*ctx).streams };
    let count = unsafe { (*ctx).nb_streams } as usize;
    (0..count).any(|i| {
        let par = unsafe { (**streams.add(i)).codecpar };
        !par.is_null()
            && unsafe {
                (*par).codec_type == ffi::AVMediaType::AVMEDIA_TYPE_VIDEO
                    && (*par).width > 0
                    && (*par).height > 0
                    && (*par).format >= 0
            }
    })
}

fn classify_open_error(operation: &'static str, code: c_int) -> OpenFailure {
    if code == ffi::AVERROR_EOF {
        debug!(operation, "Container header is not fully buffered");
        return OpenFailure::Incomplete;
    }
    OpenFailure::Failed(DecoderError::codec(operation, ffmpeg_next::Error::from(code)))
}
