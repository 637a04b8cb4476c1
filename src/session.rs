//! Decoder session state machine
//!
//! [`DecoderSession`] is the synchronous core owned by the decode worker. It holds
//! the packet buffer until the stream opens, then the FFmpeg decoder built on it,
//! and enforces the lifecycle:
//!
//! ```text
//! Uninitialized --initialize--> Initialized --open_video--> Opened --decode--> Decoding
//!                                     |                       |                  |
//!                                     +------ close_video ----+------------------+--> Closed
//! ```
//!
//! Any container or codec failure moves the session to `Failed` and releases its
//! resources. Insufficient data is never an error: `open_video` and `decode` return
//! `Ok(None)` and may be retried after more packets are submitted.

use tracing::{debug, error, info, trace, warn};

use crate::buffer::PacketBuffer;
use crate::codec::{OpenOutcome, VideoDecoder};
use crate::types::{DecodedFrame, LifecycleState, Packet, SessionStatus, StreamMetadata};
use crate::{DecoderError, Result};

/// Aggregate decoder state for one worker.
///
/// Packets collect in a [`PacketBuffer`] until `open_video` hands it to the
/// [`VideoDecoder`], which owns it from then on.
pub struct DecoderSession {
    state: LifecycleState,
    source_name: String,
    max_decoded_dimension: u32,
    max_buffered_bytes: usize,
    decoder: Option<Box<VideoDecoder>>,
    buffer: Option<PacketBuffer>,
    metadata: Option<StreamMetadata>,
    decoded_frame_count: u64,
    total_bytes: u64,
}

impl DecoderSession {
    /// Create an uninitialized session whose packet buffer holds at most
    /// `max_buffered_bytes`.
    pub fn new(max_buffered_bytes: usize) -> Self {
        Self {
            state: LifecycleState::Uninitialized,
            source_name: String::new(),
            max_decoded_dimension: 0,
            max_buffered_bytes,
            decoder: None,
            buffer: None,
            metadata: None,
            decoded_frame_count: 0,
            total_bytes: 0,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Metadata derived by a successful `open_video`.
    pub fn metadata(&self) -> Option<&StreamMetadata> {
        self.metadata.as_ref()
    }

    /// Prepare the session for packets.
    ///
    /// `block_size` is the AVIO read size (values below 2 use the default);
    /// `max_decoded_dimension` caps output width and height, `0` disables the cap.
    pub fn initialize(
        &mut self,
        source_name: &str,
        block_size: u32,
        max_decoded_dimension: u32,
    ) -> Result<()> {
        if self.state != LifecycleState::Uninitialized {
            return Err(self.reject("initialize"));
        }

        self.source_name = source_name.to_string();
        self.max_decoded_dimension = max_decoded_dimension;
        self.buffer = Some(PacketBuffer::new(block_size as usize, self.max_buffered_bytes));
        self.state = LifecycleState::Initialized;

        info!(
            source = source_name,
            block_size, max_decoded_dimension, "Decoder session initialized"
        );
        Ok(())
    }

    /// Append a packet to the stream. Returns the acknowledged payload length.
    pub fn submit(&mut self, packet: Packet) -> Result<usize> {
        if !self.state.accepts_packets() {
            return Err(self.reject("submit"));
        }

        let len = packet.len();
        let appended = match (self.decoder.as_mut(), self.buffer.as_mut()) {
            (Some(decoder), _) => decoder.append(packet.into_bytes()),
            (None, Some(buffer)) => buffer.append(packet.into_bytes()),
            (None, None) => return Err(self.reject("submit")),
        };
        appended?;
        self.total_bytes += len as u64;
        trace!(len, total = self.total_bytes, "Packet acknowledged");
        Ok(len)
    }

    /// Identify the container, open the video stream and derive output metadata.
    ///
    /// Returns `Ok(None)` while the buffered bytes are not enough to do so; the
    /// state stays `Initialized` so the call can be retried.
    pub fn open_video(&mut self) -> Result<Option<StreamMetadata>> {
        if self.state != LifecycleState::Initialized {
            return Err(self.reject("open_video"));
        }
        let Some(buffer) = self.buffer.take() else {
            return Err(self.reject("open_video"));
        };

        let decoder = match VideoDecoder::open(buffer, self.max_decoded_dimension) {
            Ok(OpenOutcome::Opened(decoder)) => decoder,
            Ok(OpenOutcome::NeedMoreData(buffer)) => {
                debug!(buffered = buffer.buffered_bytes(), "Not enough data to open video");
                self.buffer = Some(buffer);
                return Ok(None);
            }
            Err(e) => return Err(self.fail(e)),
        };

        let metadata = decoder.metadata().clone();
        info!(
            "Opened {}: {} {}x{} -> {}x{} ({})",
            self.source_name,
            metadata.codec,
            metadata.source_width,
            metadata.source_height,
            metadata.frame_width,
            metadata.frame_height,
            metadata.pixel_format
        );

        self.decoder = Some(decoder);
        self.metadata = Some(metadata.clone());
        self.state = LifecycleState::Opened;
        Ok(Some(metadata))
    }

    /// Decode exactly one frame.
    ///
    /// Returns `Ok(None)` when the buffered bytes hold no further frame.
    pub fn decode(&mut self) -> Result<Option<DecodedFrame>> {
        if !self.state.can_decode() {
            return Err(self.reject("decode"));
        }
        let (Some(decoder), Some(metadata)) = (self.decoder.as_mut(), self.metadata.as_ref())
        else {
            return Err(self.reject("decode"));
        };
        let (width, height) = (metadata.frame_width, metadata.frame_height);
        self.state = LifecycleState::Decoding;

        let pixels = match decoder.next_frame() {
            Ok(Some(pixels)) => pixels,
            Ok(None) => {
                debug!(decoded = self.decoded_frame_count, "No complete frame buffered");
                return Ok(None);
            }
            Err(e) => return Err(self.fail(e)),
        };

        let frame = DecodedFrame::new(self.decoded_frame_count, width, height, pixels);
        self.decoded_frame_count += 1;
        trace!(index = frame.index, "Decoded frame");
        Ok(Some(frame))
    }

    /// Release all decode resources. Terminal.
    pub fn close_video(&mut self) -> Result<()> {
        if matches!(self.state, LifecycleState::Uninitialized | LifecycleState::Closed) {
            return Err(self.reject("close_video"));
        }
        self.release();
        self.state = LifecycleState::Closed;
        info!(
            source = %self.source_name,
            frames = self.decoded_frame_count,
            bytes = self.total_bytes,
            "Decoder session closed"
        );
        Ok(())
    }

    /// Snapshot of the session aggregate.
    pub fn status(&self) -> SessionStatus {
        let buffered_bytes = match (&self.decoder, &self.buffer) {
            (Some(decoder), _) => decoder.buffer().buffered_bytes(),
            (None, Some(buffer)) => buffer.buffered_bytes(),
            (None, None) => 0,
        };
        SessionStatus {
            state: self.state,
            buffered_bytes,
            total_bytes: self.total_bytes,
            frame_width: self.metadata.as_ref().map_or(0, |m| m.frame_width),
            frame_height: self.metadata.as_ref().map_or(0, |m| m.frame_height),
            decoded_frame_count: self.decoded_frame_count,
        }
    }

    fn reject(&self, operation: &'static str) -> DecoderError {
        warn!("Rejected {} in state {}", operation, self.state);
        DecoderError::protocol(operation, self.state)
    }

    fn fail(&mut self, err: DecoderError) -> DecoderError {
        error!("Decoder session failed: {}", err);
        self.release();
        self.state = LifecycleState::Failed;
        err
    }

    fn release(&mut self) {
        self.decoder = None;
        self.buffer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FORMAT_SCAN_SIZE;
    use crate::test_utils::{Chroma, synthetic_y4m, unrecognized_bytes};
    use crate::types::BYTES_PER_PIXEL;

    fn opened_session(width: u32, height: u32, frames: usize, max: u32) -> DecoderSession {
        let mut session = DecoderSession::new(usize::MAX);
        session.initialize("clip.y4m", 0, max).unwrap();
        session.submit(synthetic_y4m(width, height, frames, Chroma::C420Jpeg).into()).unwrap();
        session.open_video().unwrap().expect("header should parse");
        session
    }

    #[test]
    fn full_lifecycle() {
        let mut session = opened_session(64, 64, 3, 256);
        assert_eq!(session.state(), LifecycleState::Opened);

        for expected in 0..3 {
            let frame = session.decode().unwrap().expect("frame");
            assert_eq!(frame.index, expected);
            assert_eq!(frame.data.len(), 64 * 64 * BYTES_PER_PIXEL);
        }
        assert!(session.decode().unwrap().is_none());
        assert_eq!(session.state(), LifecycleState::Decoding);

        session.close_video().unwrap();
        let status = session.status();
        assert_eq!(status.state, LifecycleState::Closed);
        assert_eq!(status.decoded_frame_count, 3);
        assert_eq!(status.buffered_bytes, 0);
    }

    #[test]
    fn protocol_violations_are_rejected() {
        let mut session = DecoderSession::new(usize::MAX);
        assert!(matches!(session.submit(vec![1].into()), Err(DecoderError::Protocol { .. })));
        assert!(matches!(session.open_video(), Err(DecoderError::Protocol { .. })));
        assert!(matches!(session.close_video(), Err(DecoderError::Protocol { .. })));

        session.initialize("a", 0, 0).unwrap();
        assert!(matches!(
            session.initialize("a", 0, 0),
            Err(DecoderError::Protocol { operation: "initialize", .. })
        ));
        assert!(matches!(
            session.decode(),
            Err(DecoderError::Protocol { operation: "decode", state: LifecycleState::Initialized })
        ));
    }

    #[test]
    fn open_without_data_returns_none_and_can_retry() {
        let mut session = DecoderSession::new(usize::MAX);
        session.initialize("empty", 0, 256).unwrap();
        assert!(session.open_video().unwrap().is_none());
        assert_eq!(session.state(), LifecycleState::Initialized);
        assert!(session.metadata().is_none());

        session.submit(b"YUV4MP".to_vec().into()).unwrap();
        assert!(session.open_video().unwrap().is_none());
        assert_eq!(session.status().buffered_bytes, 6);

        session.submit(b"EG2 W8 H8 Cmono\n".to_vec().into()).unwrap();
        let metadata = session.open_video().unwrap().unwrap();
        assert_eq!((metadata.frame_width, metadata.frame_height), (8, 8));
        assert_eq!(metadata.pixel_format, "gray8");
        assert!(matches!(session.open_video(), Err(DecoderError::Protocol { .. })));
    }

    #[test]
    fn decode_resumes_when_the_rest_of_a_frame_arrives() {
        let stream = synthetic_y4m(16, 8, 3, Chroma::C420Jpeg);
        let (head, tail) = stream.split_at(stream.len() - 50);

        let mut session = DecoderSession::new(usize::MAX);
        session.initialize("split", 0, 0).unwrap();
        session.submit(head.to_vec().into()).unwrap();
        session.open_video().unwrap().unwrap();
        assert!(session.decode().unwrap().is_some());
        assert!(session.decode().unwrap().is_some());
        assert!(session.decode().unwrap().is_none());

        session.submit(tail.to_vec().into()).unwrap();
        assert_eq!(session.decode().unwrap().unwrap().index, 2);
        assert!(session.decode().unwrap().is_none());
    }

    #[test]
    fn downscales_to_max_dimension() {
        let mut session = opened_session(640, 480, 1, 256);
        let metadata = session.metadata().unwrap().clone();
        assert_eq!((metadata.frame_width, metadata.frame_height), (160, 120));
        assert_eq!(metadata.frame_size, 160 * 120 * 4);
        assert!(metadata.is_downscaled());

        let frame = session.decode().unwrap().unwrap();
        assert_eq!(frame.data.len(), metadata.frame_size);
    }

    #[test]
    fn closed_session_rejects_everything() {
        let mut session = opened_session(16, 16, 2, 0);
        session.close_video().unwrap();
        assert!(matches!(session.decode(), Err(DecoderError::Protocol { .. })));
        assert!(matches!(session.submit(vec![0].into()), Err(DecoderError::Protocol { .. })));
        assert!(matches!(session.close_video(), Err(DecoderError::Protocol { .. })));
    }

    #[test]
    fn malformed_header_fails_session() {
        let mut session = DecoderSession::new(usize::MAX);
        session.initialize("bad", 0, 0).unwrap();
        session.submit(b"YUV4MPEG2 H8 Cmono\n".to_vec().into()).unwrap();
        assert!(matches!(session.open_video(), Err(DecoderError::Codec { .. })));
        assert_eq!(session.state(), LifecycleState::Failed);
        assert!(matches!(session.submit(vec![0].into()), Err(DecoderError::Protocol { .. })));
        session.close_video().unwrap();
        assert_eq!(session.state(), LifecycleState::Closed);
    }

    #[test]
    fn oversized_header_dimensions_fail_the_session() {
        let mut session = DecoderSession::new(usize::MAX);
        session.initialize("huge", 0, 0).unwrap();
        session.submit(b"YUV4MPEG2 W4294967295 H4294967295 C420jpeg\n".to_vec().into()).unwrap();

        let result = session.open_video();
        assert!(
            matches!(result, Err(DecoderError::Codec { .. } | DecoderError::Dimensions { .. })),
            "{result:?}"
        );
        assert_eq!(session.state(), LifecycleState::Failed);
        assert_eq!(session.status().buffered_bytes, 0);
    }

    #[test]
    fn unrecognized_stream_fails_once_the_scan_size_is_buffered() {
        let mut session = DecoderSession::new(usize::MAX);
        session.initialize("noise", 0, 0).unwrap();
        session.submit(unrecognized_bytes(1024).into()).unwrap();
        assert!(session.open_video().unwrap().is_none());

        session.submit(unrecognized_bytes(FORMAT_SCAN_SIZE as usize).into()).unwrap();
        assert!(session.open_video().is_err());
        assert_eq!(session.state(), LifecycleState::Failed);
    }

    #[test]
    fn buffer_cap_rejects_but_keeps_session() {
        let mut session = DecoderSession::new(16);
        session.initialize("capped", 0, 0).unwrap();
        session.submit(vec![b'Y'; 10].into()).unwrap();
        assert!(matches!(
            session.submit(vec![0; 10].into()),
            Err(DecoderError::ResourceExhausted { .. })
        ));
        assert_eq!(session.state(), LifecycleState::Initialized);
        assert_eq!(session.status().total_bytes, 10);
    }
}
