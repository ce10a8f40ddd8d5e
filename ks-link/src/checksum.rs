//! Additive frame checksum

/// 8-bit additive checksum over a byte range
///
/// Running 16-bit arithmetic sum truncated to the low byte, i.e.
/// `sum mod 256` with the overflow discarded.
pub fn checksum(data: &[u8]) -> u8 {
    let mut sum: u16 = 0;
    for &byte in data {
        sum = sum.wrapping_add(u16::from(byte));
    }
    (sum % 256) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_sums_mod_256() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[0x01, 0x02, 0x03]), 0x06);
        assert_eq!(checksum(&[0xFF, 0x01]), 0x00);
        assert_eq!(checksum(&[0xFF, 0xFF, 0x03]), 0x01);
    }

    #[test]
    fn test_checksum_registration_example() {
        // CS byte from a captured registration frame
        let body = [
            0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x8B, 0x18, 0x21, 0x06,
            0x23, 0x00, 0x96, 0x71, 0x00,
        ];
        assert_eq!(checksum(&body), 0x74);
    }
}
