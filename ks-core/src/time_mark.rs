use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime};
use std::fmt;

/// 7-byte protocol time mark
///
/// Layout: little-endian u16 seconds, then minute, hour, day, month and a
/// year offset byte. The offset is resolved against the current century —
/// a deliberately narrow conversion; the devices only report contemporary
/// timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeMark {
    bytes: [u8; 7],
}

impl TimeMark {
    pub fn new(bytes: [u8; 7]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(data: &[u8]) -> Option<Self> {
        if data.len() < 7 {
            return None;
        }
        let mut bytes = [0u8; 7];
        bytes.copy_from_slice(&data[..7]);
        Some(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; 7] {
        &self.bytes
    }

    /// Seconds component, may exceed 59 and carries into the minute
    pub fn seconds(&self) -> u16 {
        u16::from_le_bytes([self.bytes[0], self.bytes[1]])
    }

    /// Convert to a calendar timestamp, `None` for out-of-range fields
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        let century = (Local::now().year() / 100) * 100;
        let year = century + i32::from(self.bytes[6]);
        let date = NaiveDate::from_ymd_opt(
            year,
            u32::from(self.bytes[5]),
            u32::from(self.bytes[4]),
        )?;
        let base = date.and_hms_opt(u32::from(self.bytes[3]), u32::from(self.bytes[2]), 0)?;
        Some(base + Duration::seconds(i64::from(self.seconds())))
    }
}

impl fmt::Display for TimeMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(ts) => write!(f, "{}", ts),
            None => write!(f, "invalid time mark {:02X?}", self.bytes),
        }
    }
}
