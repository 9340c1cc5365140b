// crc.rs -- 16-bit CCITT CRC (polynomial 0x1021) used to fingerprint map sources
// Delegates to the `crc` crate (CRC-16/IBM-3740 == CRC-16/CCITT-FALSE).

use crc::{Crc, CRC_16_IBM_3740};

const CRC_CALC: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Compute CRC for an entire block of data.
pub fn crc_block(data: &[u8]) -> u16 {
    CRC_CALC.checksum(data)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc_empty() {
        assert_eq!(crc_block(&[]), 0xffff);
    }

    #[test]
    fn test_crc_check_value() {
        // The standard check value for CRC-16/CCITT-FALSE over "123456789".
        assert_eq!(crc_block(b"123456789"), 0x29B1);
    }
}
