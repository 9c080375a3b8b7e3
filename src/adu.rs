//! # Modbus Bufferiser
//!
//! Serialises abstract frames into byte ADUs using a fixed-size stack buffer
//! to avoid heap allocation on the hot path. All multi-byte fields are
//! big-endian; coil payloads are bit-packed LSB-first. The CRC is not
//! appended here: it belongs to the field agent at the serial boundary.
//!
//! | Frame | Layout |
//! |-------|--------|
//! | Read | id(1), fn(1), addr(2), count(2) |
//! | Write registers | id(1), fn(1), addr(2), count(2), byteCount(1)=2·count, values(2·count) |
//! | Write coils | id(1), fn(1), addr(2), count(2), byteCount(1)=⌈count/8⌉, bitfield |
//! | Diagnostic | id(1), fn(1), subfn(2), data(2)=0x0000 |
//! | Raw | id(1), packet verbatim |

use tracing::debug;

use crate::constants::MAX_ADU_SIZE;
use crate::error::{GatewayError, GatewayResult};
use crate::protocol::{Frame, ModbusFunction};

/// Byte ADU with stack-allocated fixed storage
#[derive(Debug, Clone)]
pub struct ModbusAdu {
    /// Fixed-size buffer (stack)
    data: [u8; MAX_ADU_SIZE],
    /// Actual data length
    len: usize,
}

impl ModbusAdu {
    /// Create an empty ADU
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0; MAX_ADU_SIZE],
            len: 0,
        }
    }

    /// Create an ADU from a byte slice
    pub fn from_slice(data: &[u8]) -> GatewayResult<Self> {
        if data.len() > MAX_ADU_SIZE {
            return Err(GatewayError::protocol(format!(
                "ADU too large: {} bytes (max {})",
                data.len(),
                MAX_ADU_SIZE
            )));
        }

        let mut adu = Self::new();
        adu.data[..data.len()].copy_from_slice(data);
        adu.len = data.len();
        Ok(adu)
    }

    /// Push a single byte
    #[inline]
    pub fn push(&mut self, byte: u8) -> GatewayResult<()> {
        if self.len >= MAX_ADU_SIZE {
            return Err(GatewayError::protocol("ADU buffer full"));
        }
        self.data[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    /// Push u16 in big-endian
    #[inline]
    pub fn push_u16(&mut self, value: u16) -> GatewayResult<()> {
        self.push((value >> 8) as u8)?;
        self.push((value & 0xFF) as u8)?;
        Ok(())
    }

    /// Extend with a byte slice
    pub fn extend(&mut self, data: &[u8]) -> GatewayResult<()> {
        if self.len + data.len() > MAX_ADU_SIZE {
            return Err(GatewayError::protocol(format!(
                "ADU would exceed max size: {} + {} > {}",
                self.len,
                data.len(),
                MAX_ADU_SIZE
            )));
        }
        self.data[self.len..self.len + data.len()].copy_from_slice(data);
        self.len += data.len();
        Ok(())
    }

    /// Get immutable data slice
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Get current length
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Unit id (first byte)
    #[inline]
    pub fn unit_id(&self) -> Option<u8> {
        self.as_slice().first().copied()
    }

    /// Function code (second byte)
    #[inline]
    pub fn function_code(&self) -> Option<u8> {
        self.as_slice().get(1).copied()
    }

    /// Copy out as an owned vector for publishing
    #[inline]
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }
}

impl Default for ModbusAdu {
    fn default() -> Self {
        Self::new()
    }
}

/// Pack coil states into bytes, LSB-first within each byte
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    bytes
}

/// Extract `count` coil states from bytes, LSB-first within each byte
pub fn unpack_bits(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count)
        .map(|i| {
            bytes
                .get(i / 8)
                .is_some_and(|byte| byte & (1 << (i % 8)) != 0)
        })
        .collect()
}

/// Serialise one abstract frame into its byte ADU
pub fn bufferise(frame: &Frame) -> GatewayResult<ModbusAdu> {
    let mut adu = ModbusAdu::new();

    match frame {
        Frame::Read {
            unit_id,
            function,
            address,
            quantity,
        } => {
            adu.push(*unit_id)?;
            adu.push(function.to_u8())?;
            adu.push_u16(*address)?;
            adu.push_u16(*quantity)?;
        }

        Frame::WriteCoils {
            unit_id,
            address,
            coils,
        } => {
            let packed = pack_bits(coils);
            adu.push(*unit_id)?;
            adu.push(ModbusFunction::WriteMultipleCoils.to_u8())?;
            adu.push_u16(*address)?;
            adu.push_u16(coils.len() as u16)?;
            adu.push(packed.len() as u8)?;
            adu.extend(&packed)?;
        }

        Frame::WriteRegisters {
            unit_id,
            address,
            registers,
        } => {
            adu.push(*unit_id)?;
            adu.push(ModbusFunction::WriteMultipleRegisters.to_u8())?;
            adu.push_u16(*address)?;
            adu.push_u16(registers.len() as u16)?;
            adu.push((registers.len() * 2) as u8)?;
            for register in registers {
                adu.push_u16(*register)?;
            }
        }

        Frame::Diagnostic {
            unit_id,
            subfunction,
        } => {
            adu.push(*unit_id)?;
            adu.push(ModbusFunction::Diagnostics.to_u8())?;
            adu.push_u16(*subfunction)?;
            adu.push_u16(0x0000)?;
        }

        Frame::Raw { unit_id, packet } => {
            adu.push(*unit_id)?;
            adu.extend(packet)?;
        }
    }

    debug!(
        unit_id = frame.unit_id(),
        len = adu.len(),
        "Frame bufferised"
    );

    Ok(adu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ModbusFunction;

    #[test]
    fn test_adu_basic_operations() {
        let mut adu = ModbusAdu::new();
        assert_eq!(adu.len(), 0);
        assert!(adu.is_empty());

        adu.push(0x07).unwrap();
        adu.push(0x04).unwrap();
        adu.push_u16(0x0010).unwrap();
        adu.push_u16(0x000A).unwrap();

        assert_eq!(adu.as_slice(), &[0x07, 0x04, 0x00, 0x10, 0x00, 0x0A]);
        assert_eq!(adu.unit_id(), Some(0x07));
        assert_eq!(adu.function_code(), Some(0x04));
    }

    #[test]
    fn test_adu_overflow_rejected() {
        let mut adu = ModbusAdu::new();
        adu.extend(&[0u8; MAX_ADU_SIZE]).unwrap();
        assert!(adu.push(0).is_err());
        assert!(adu.extend(&[0]).is_err());
        assert!(ModbusAdu::from_slice(&[0u8; MAX_ADU_SIZE + 1]).is_err());
    }

    #[test]
    fn test_read_layout() {
        // Scenario: {"id":7,"fn":"r","dt":"ni","rg":[16,25]} -> 07 04 00 10 00 0A
        let frame = Frame::Read {
            unit_id: 7,
            function: ModbusFunction::ReadInputRegisters,
            address: 16,
            quantity: 10,
        };
        let adu = bufferise(&frame).unwrap();
        assert_eq!(adu.as_slice(), &[0x07, 0x04, 0x00, 0x10, 0x00, 0x0A]);
    }

    #[test]
    fn test_read_coils_layout() {
        let frame = Frame::Read {
            unit_id: 1,
            function: ModbusFunction::ReadDiscreteInputs,
            address: 0,
            quantity: 2,
        };
        let adu = bufferise(&frame).unwrap();
        assert_eq!(adu.as_slice(), &[0x01, 0x02, 0x00, 0x00, 0x00, 0x02]);
    }

    #[test]
    fn test_write_registers_layout() {
        let frame = Frame::WriteRegisters {
            unit_id: 1,
            address: 0x0001,
            registers: vec![0x000A, 0x0102],
        };
        let adu = bufferise(&frame).unwrap();
        assert_eq!(
            adu.as_slice(),
            &[0x01, 0x10, 0x00, 0x01, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02]
        );
    }

    #[test]
    fn test_write_coils_bitfield_lsb_first() {
        let frame = Frame::WriteCoils {
            unit_id: 1,
            address: 0,
            coils: vec![true, false, true, true],
        };
        let adu = bufferise(&frame).unwrap();
        // count=4, byteCount=1, bits 1011 packed LSB-first = 0x0D
        assert_eq!(adu.as_slice(), &[0x01, 0x0F, 0x00, 0x00, 0x00, 0x04, 0x01, 0x0D]);
    }

    #[test]
    fn test_write_nine_coils_spills_into_second_byte() {
        // Boundary: 9 coils -> byteCount=2, bit 8 lands in byte two, LSB-first
        let mut coils = vec![false; 9];
        coils[8] = true;
        let frame = Frame::WriteCoils {
            unit_id: 1,
            address: 0,
            coils,
        };
        let adu = bufferise(&frame).unwrap();
        assert_eq!(adu.as_slice(), &[0x01, 0x0F, 0x00, 0x00, 0x00, 0x09, 0x02, 0x00, 0x01]);
    }

    #[test]
    fn test_diagnostic_layout() {
        // Scenario: {"id":22,"fn":"d","sf":"rqdt"} -> 16 08 00 00 00 00
        let frame = Frame::Diagnostic {
            unit_id: 22,
            subfunction: 0x0000,
        };
        let adu = bufferise(&frame).unwrap();
        assert_eq!(adu.as_slice(), &[0x16, 0x08, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_raw_layout() {
        let frame = Frame::Raw {
            unit_id: 9,
            packet: vec![0x03, 0x00, 0x01, 0x00, 0x02],
        };
        let adu = bufferise(&frame).unwrap();
        assert_eq!(adu.as_slice(), &[0x09, 0x03, 0x00, 0x01, 0x00, 0x02]);
    }

    #[test]
    fn test_bit_pack_round_trip() {
        let bits = vec![true, false, true, true, false, false, true, false, true, true];
        let packed = pack_bits(&bits);
        assert_eq!(packed.len(), 2);
        assert_eq!(unpack_bits(&packed, bits.len()), bits);
    }
}
