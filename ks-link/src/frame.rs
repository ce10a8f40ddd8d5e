//! Variable-length delimited frame codec
//!
//! Wire layout:
//!
//! ```text
//! off  size  field
//! 0    1     start delimiter 0x68
//! 1    1     length L (bytes Ctrl..Payload)
//! 2    1     length L repeated
//! 3    1     start delimiter 0x68
//! 4    1     Ctrl
//! 5    6     terminal address
//! 11   1     function code
//! 12   L-8   payload
//! *    1     checksum (additive mod 256 over Ctrl..Payload)
//! *    1     end delimiter 0x16
//! ```
//!
//! Bytes travel low-order first: multi-byte values inside payloads are
//! little-endian unless a field says otherwise.

use crate::checksum::checksum;
use bytes::{BufMut, BytesMut};
use ks_core::{KsError, KsResult, NodeId};
use std::fmt;

/// Start delimiter
pub const FRAME_START: u8 = 0x68;

/// End delimiter
pub const FRAME_END: u8 = 0x16;

/// Smallest legal frame: empty payload
pub const MIN_FRAME_LEN: usize = 14;

/// Upper bound on any legal device frame, with margin
pub const MAX_FRAME_LEN: usize = 512;

/// Largest payload the single length byte can describe
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize - 8;

/// One complete unit of the wire protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub ctrl: u8,
    pub address: NodeId,
    pub function: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(ctrl: u8, address: NodeId, function: u8, payload: Vec<u8>) -> Self {
        Self {
            ctrl,
            address,
            function,
            payload,
        }
    }

    /// Decode a frame from raw bytes
    ///
    /// # Errors
    /// - `KsError::FrameFormat` for short input, wrong delimiters, or
    ///   length bytes that disagree with each other or with the actual
    ///   Ctrl..Payload length
    /// - `KsError::Checksum` when the additive checksum does not match
    pub fn parse(packet: &[u8]) -> KsResult<Self> {
        let len = packet.len();
        if len < MIN_FRAME_LEN {
            return Err(KsError::FrameFormat(format!(
                "packet length expected >= {}, got {}",
                MIN_FRAME_LEN, len
            )));
        }

        if packet[0] != FRAME_START || packet[3] != FRAME_START || packet[len - 1] != FRAME_END {
            return Err(KsError::FrameFormat("bad frame delimiters".to_string()));
        }

        if packet[1] != packet[2] {
            return Err(KsError::FrameFormat(format!(
                "length bytes disagree: 0x{:02X} vs 0x{:02X}",
                packet[1], packet[2]
            )));
        }

        let body_len = len - 6;
        if usize::from(packet[1]) != body_len {
            return Err(KsError::FrameFormat(format!(
                "length byte 0x{:02X} does not match body length {}",
                packet[1], body_len
            )));
        }

        let body = &packet[4..len - 2];
        let expected = packet[len - 2];
        let actual = checksum(body);
        if expected != actual {
            return Err(KsError::Checksum { expected, actual });
        }

        Ok(Self {
            ctrl: packet[4],
            address: NodeId::from_slice(&packet[5..11])?,
            function: packet[11],
            payload: packet[12..len - 2].to_vec(),
        })
    }

    /// Encode the frame to its wire form
    ///
    /// # Errors
    /// `KsError::FrameFormat` when the payload exceeds what the length
    /// byte can describe.
    pub fn to_bytes(&self) -> KsResult<Vec<u8>> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(KsError::FrameFormat(format!(
                "payload of {} bytes exceeds the {}-byte maximum",
                self.payload.len(),
                MAX_PAYLOAD_LEN
            )));
        }
        let body_len = 8 + self.payload.len();
        let mut buf = BytesMut::with_capacity(body_len + 6);

        buf.put_u8(FRAME_START);
        buf.put_u8(body_len as u8);
        buf.put_u8(body_len as u8);
        buf.put_u8(FRAME_START);
        buf.put_u8(self.ctrl);
        buf.put_slice(self.address.as_bytes());
        buf.put_u8(self.function);
        buf.put_slice(&self.payload);

        let cs = checksum(&buf[4..]);
        buf.put_u8(cs);
        buf.put_u8(FRAME_END);
        Ok(buf.to_vec())
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame: ctrl=0x{:02X}, addr={}, fn=0x{:02X}, len={}",
            self.ctrl,
            self.address,
            self.function,
            self.payload.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> Frame {
        Frame::new(
            0x80,
            NodeId::new([0x18, 0x21, 0x06, 0x23, 0x00, 0x96]),
            0x8D,
            vec![0x18, 0x21, 0x06, 0x23, 0x00, 0x96, 0x71, 0x00],
        )
    }

    #[test]
    fn test_round_trip() {
        let frame = sample_frame();
        let decoded = Frame::parse(&frame.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_to_bytes_rejects_oversized_payload() {
        let mut frame = sample_frame();
        frame.payload = vec![0u8; MAX_PAYLOAD_LEN + 1];
        assert!(matches!(frame.to_bytes(), Err(KsError::FrameFormat(_))));
        frame.payload.truncate(MAX_PAYLOAD_LEN);
        assert!(frame.to_bytes().is_ok());
    }

    #[test]
    fn test_parse_registration_capture() {
        // Registration packet from the protocol annex
        let raw = [
            0x68, 0x10, 0x10, 0x68, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x8B, 0x18, 0x21, 0x06, 0x23, 0x00, 0x96, 0x71, 0x00, 0x74, 0x16,
        ];
        let frame = Frame::parse(&raw).unwrap();
        assert_eq!(frame.ctrl, 0x80);
        assert_eq!(frame.function, 0x8B);
        assert!(frame.address.is_null());
        assert_eq!(
            frame.payload,
            vec![0x18, 0x21, 0x06, 0x23, 0x00, 0x96, 0x71, 0x00]
        );
        assert_eq!(frame.to_bytes().unwrap(), raw);
    }

    #[test]
    fn test_parse_rejects_short_packet() {
        assert!(matches!(
            Frame::parse(&[0x68, 0x01, 0x01, 0x68]),
            Err(KsError::FrameFormat(_))
        ));
    }

    #[test]
    fn test_parse_rejects_bad_delimiters() {
        let mut raw = sample_frame().to_bytes().unwrap();
        raw[0] = 0x67;
        assert!(matches!(Frame::parse(&raw), Err(KsError::FrameFormat(_))));

        let mut raw = sample_frame().to_bytes().unwrap();
        let end = raw.len() - 1;
        raw[end] = 0x17;
        assert!(matches!(Frame::parse(&raw), Err(KsError::FrameFormat(_))));
    }

    #[test]
    fn test_length_tamper_detected_as_format_error() {
        // The checksum does not cover the length bytes, so a tampered
        // length must still surface as a format error.
        for index in [1usize, 2] {
            let mut raw = sample_frame().to_bytes().unwrap();
            raw[index] = raw[index].wrapping_add(1);
            assert!(matches!(Frame::parse(&raw), Err(KsError::FrameFormat(_))));
        }
    }

    #[test]
    fn test_checksum_sensitive_to_every_body_byte() {
        let raw = sample_frame().to_bytes().unwrap();
        for index in 4..raw.len() - 2 {
            let mut tampered = raw.clone();
            tampered[index] ^= 0x01;
            assert!(
                matches!(Frame::parse(&tampered), Err(KsError::Checksum { .. })),
                "byte {} flip not caught",
                index
            );
        }
    }
}
