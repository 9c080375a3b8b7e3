//! Modbus CRC-16 at the field boundary
//!
//! CRC lives exclusively on the field side of the gateway: broker-side code
//! never computes it, field-side code appends it before transmit and checks
//! it after receive. Polynomial 0xA001 (reflected), initial value 0xFFFF,
//! appended low byte first.

use crc::{Crc, CRC_16_MODBUS};

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// CRC-16 over a frame
#[inline]
pub fn checksum(frame: &[u8]) -> u16 {
    CRC16.checksum(frame)
}

/// Append the CRC to a frame, low byte first
pub fn append(frame: &mut Vec<u8>) {
    let crc = checksum(frame);
    frame.extend_from_slice(&crc.to_le_bytes());
}

/// Verify a received frame that carries its CRC in the trailing two bytes.
///
/// A frame concatenated with its correct CRC checksums to zero.
pub fn verify(frame: &[u8]) -> bool {
    frame.len() > 2 && checksum(frame) == 0
}
