use crate::error::{KsError, KsResult};
use std::fmt;
use std::str::FromStr;

/// 6-byte terminal address used for both concentrators and sub-node breakers
///
/// The textual form is the uppercase hex rendering of each byte, e.g.
/// `18 21 06 23 00 96` reads as `"182106230096"`. Addresses are BCD on the
/// wire, so the textual form is also the decimal serial number printed on
/// the device label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    bytes: [u8; 6],
}

impl NodeId {
    /// Create a node id from raw wire bytes
    pub fn new(bytes: [u8; 6]) -> Self {
        Self { bytes }
    }

    /// Create a node id from a payload slice
    ///
    /// # Errors
    /// Returns `KsError::FrameFormat` if the slice is shorter than 6 bytes.
    pub fn from_slice(data: &[u8]) -> KsResult<Self> {
        if data.len() < 6 {
            return Err(KsError::FrameFormat(format!(
                "node id expects 6 bytes, got {}",
                data.len()
            )));
        }
        let mut bytes = [0u8; 6];
        bytes.copy_from_slice(&data[..6]);
        Ok(Self { bytes })
    }

    /// Get the address as a byte array
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.bytes
    }

    /// Broadcast address `FFFFFFFFFFFF`
    pub fn is_broadcast(&self) -> bool {
        self.bytes == [0xFF; 6]
    }

    /// Null address `000000000000`, invalid as a terminal address
    pub fn is_null(&self) -> bool {
        self.bytes == [0x00; 6]
    }

    /// Breaker model selected by the first two digits of the serial number
    ///
    /// Returns `None` for an unknown prefix.
    pub fn line_model(&self) -> Option<&'static str> {
        let model = match self.bytes[0] {
            0x04 => "4P_L",
            0x07 => "2P_L",
            0x08 => "1P",
            0x10 => "2P",
            0x11 => "3P",
            0x12 => "4P",
            _ => return None,
        };
        Some(model)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.bytes {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

impl FromStr for NodeId {
    type Err = KsError;

    /// Parse the 12-digit serial number, packing each digit pair as BCD
    fn from_str(s: &str) -> KsResult<Self> {
        if s.len() != 12 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(KsError::Parameter(format!(
                "invalid serial number: expected 12 decimal digits, got {:?}",
                s
            )));
        }
        let mut bytes = [0u8; 6];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hi = chunk[0] - b'0';
            let lo = chunk[1] - b'0';
            bytes[i] = (hi << 4) | lo;
        }
        Ok(Self { bytes })
    }
}
