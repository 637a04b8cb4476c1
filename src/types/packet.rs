//! Compressed byte fragments handed to the decode worker

use crate::{DecoderError, Result};

/// A contiguous fragment of the source byte stream.
///
/// A packet is a `{offset, length}` window over a caller-owned buffer. Submitting a
/// packet moves the buffer into the worker, so the caller cannot touch the bytes
/// while the worker reads them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    buffer: Vec<u8>,
    offset: usize,
    length: usize,
}

impl Packet {
    /// Create a packet over `buffer[offset..offset + length]`.
    pub fn new(buffer: Vec<u8>, offset: usize, length: usize) -> Result<Self> {
        let end = offset.checked_add(length).ok_or(DecoderError::InvalidPacket {
            offset,
            length,
            buffer_len: buffer.len(),
        })?;

        if end > buffer.len() {
            return Err(DecoderError::InvalidPacket { offset, length, buffer_len: buffer.len() });
        }

        Ok(Self { buffer, offset, length })
    }

    /// Offset of the first payload byte within the backing buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of payload bytes.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Borrow the payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[self.offset..self.offset + self.length]
    }

    /// Consume the packet, returning only the payload.
    ///
    /// Reuses the backing allocation; a full-range packet is returned as-is.
    pub fn into_bytes(self) -> Vec<u8> {
        let Self { mut buffer, offset, length } = self;
        buffer.truncate(offset + length);
        if offset > 0 {
            buffer.drain(..offset);
        }
        buffer
    }
}

impl From<Vec<u8>> for Packet {
    fn from(buffer: Vec<u8>) -> Self {
        let length = buffer.len();
        Self { buffer, offset: 0, length }
    }
}

impl From<&[u8]> for Packet {
    fn from(bytes: &[u8]) -> Self {
        Self::from(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_validated() {
        assert!(Packet::new(vec![0; 8], 2, 6).is_ok());
        assert!(Packet::new(vec![0; 8], 8, 0).is_ok());

        let err = Packet::new(vec![0; 8], 4, 5).unwrap_err();
        assert!(matches!(err, DecoderError::InvalidPacket { offset: 4, length: 5, buffer_len: 8 }));

        let err = Packet::new(vec![0; 8], usize::MAX, 2).unwrap_err();
        assert!(matches!(err, DecoderError::InvalidPacket { .. }));
    }

    #[test]
    fn into_bytes_keeps_only_the_window() {
        let packet = Packet::new(b"xxhelloyy".to_vec(), 2, 5).unwrap();
        assert_eq!(packet.as_bytes(), b"hello");
        assert_eq!(packet.len(), 5);
        assert_eq!(packet.into_bytes(), b"hello");

        let whole = Packet::from(b"abc".as_slice());
        assert_eq!(whole.offset(), 0);
        assert_eq!(whole.into_bytes(), b"abc");
    }
}
