//! Modbus protocol definitions for the gateway
//!
//! This module contains the protocol-level vocabulary: operations and
//! datatypes as the clients name them, Modbus function codes, and the
//! abstract frame that sits between the encoder and the bufferiser.
//! Per-family behaviour is table-driven; each frame kind knows how many
//! header bytes its response must echo.

use std::fmt;

use crate::error::{GatewayError, GatewayResult};

/// Modbus slave/unit identifier (1-247)
pub type UnitId = u8;

/// High-level operation requested by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Read coils, discrete inputs, or registers
    Read,
    /// Write coils or holding registers
    Write,
    /// Serial-line diagnostics (FC08)
    Diagnosis,
    /// Raw Modbus passthrough: the client supplies the PDU bytes
    Raw,
}

impl Operation {
    /// Parse from the terse canonical token
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "r" => Some(Operation::Read),
            "u" => Some(Operation::Write),
            "d" => Some(Operation::Diagnosis),
            "m" => Some(Operation::Raw),
            _ => None,
        }
    }

    /// Terse canonical token
    pub fn token(self) -> &'static str {
        match self {
            Operation::Read => "r",
            Operation::Write => "u",
            Operation::Diagnosis => "d",
            Operation::Raw => "m",
        }
    }
}

/// Address space addressed by a read or write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datatype {
    /// Discrete inputs (read-only bits)
    BooleanInput,
    /// Coils (read/write bits)
    BooleanOutput,
    /// Input registers (read-only words)
    NumericInput,
    /// Holding registers (read/write words)
    NumericOutput,
}

impl Datatype {
    /// Parse from the terse canonical token
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "bi" => Some(Datatype::BooleanInput),
            "bo" => Some(Datatype::BooleanOutput),
            "ni" => Some(Datatype::NumericInput),
            "no" => Some(Datatype::NumericOutput),
            _ => None,
        }
    }

    /// Terse canonical token
    pub fn token(self) -> &'static str {
        match self {
            Datatype::BooleanInput => "bi",
            Datatype::BooleanOutput => "bo",
            Datatype::NumericInput => "ni",
            Datatype::NumericOutput => "no",
        }
    }

    /// True for the bit-addressed spaces
    pub fn is_boolean(self) -> bool {
        matches!(self, Datatype::BooleanInput | Datatype::BooleanOutput)
    }
}

/// Modbus function codes emitted by this gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ModbusFunction {
    /// Read Coils (0x01)
    ReadCoils = 0x01,
    /// Read Discrete Inputs (0x02)
    ReadDiscreteInputs = 0x02,
    /// Read Holding Registers (0x03)
    ReadHoldingRegisters = 0x03,
    /// Read Input Registers (0x04)
    ReadInputRegisters = 0x04,
    /// Diagnostics (0x08)
    Diagnostics = 0x08,
    /// Write Multiple Coils (0x0F)
    WriteMultipleCoils = 0x0F,
    /// Write Multiple Registers (0x10)
    WriteMultipleRegisters = 0x10,
}

impl ModbusFunction {
    /// Convert from u8 to ModbusFunction
    pub fn from_u8(value: u8) -> GatewayResult<Self> {
        match value {
            0x01 => Ok(ModbusFunction::ReadCoils),
            0x02 => Ok(ModbusFunction::ReadDiscreteInputs),
            0x03 => Ok(ModbusFunction::ReadHoldingRegisters),
            0x04 => Ok(ModbusFunction::ReadInputRegisters),
            0x08 => Ok(ModbusFunction::Diagnostics),
            0x0F => Ok(ModbusFunction::WriteMultipleCoils),
            0x10 => Ok(ModbusFunction::WriteMultipleRegisters),
            _ => Err(GatewayError::invalid_function(value)),
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Check if this is a read function
    pub fn is_read_function(self) -> bool {
        matches!(
            self,
            ModbusFunction::ReadCoils
                | ModbusFunction::ReadDiscreteInputs
                | ModbusFunction::ReadHoldingRegisters
                | ModbusFunction::ReadInputRegisters
        )
    }
}

impl fmt::Display for ModbusFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModbusFunction::ReadCoils => "Read Coils",
            ModbusFunction::ReadDiscreteInputs => "Read Discrete Inputs",
            ModbusFunction::ReadHoldingRegisters => "Read Holding Registers",
            ModbusFunction::ReadInputRegisters => "Read Input Registers",
            ModbusFunction::Diagnostics => "Diagnostics",
            ModbusFunction::WriteMultipleCoils => "Write Multiple Coils",
            ModbusFunction::WriteMultipleRegisters => "Write Multiple Registers",
        };
        write!(f, "{} (0x{:02X})", name, *self as u8)
    }
}

/// Derive the Modbus function code from (operation, datatype)
///
/// | operation + datatype | code |
/// |---|---|
/// | read + bo | 0x01 |
/// | read + bi | 0x02 |
/// | read + no | 0x03 |
/// | read + ni | 0x04 |
/// | write + bo | 0x0F |
/// | write + no | 0x10 |
pub fn function_for(operation: Operation, datatype: Datatype) -> GatewayResult<ModbusFunction> {
    match (operation, datatype) {
        (Operation::Read, Datatype::BooleanOutput) => Ok(ModbusFunction::ReadCoils),
        (Operation::Read, Datatype::BooleanInput) => Ok(ModbusFunction::ReadDiscreteInputs),
        (Operation::Read, Datatype::NumericOutput) => Ok(ModbusFunction::ReadHoldingRegisters),
        (Operation::Read, Datatype::NumericInput) => Ok(ModbusFunction::ReadInputRegisters),
        (Operation::Write, Datatype::BooleanOutput) => Ok(ModbusFunction::WriteMultipleCoils),
        (Operation::Write, Datatype::NumericOutput) => Ok(ModbusFunction::WriteMultipleRegisters),
        _ => Err(GatewayError::protocol(format!(
            "No Modbus function for operation '{}' on datatype '{}'",
            operation.token(),
            datatype.token()
        ))),
    }
}

/// Abstract frame: one Modbus exchange, before byte serialisation
///
/// Frames are produced by the encoder and consumed by the bufferiser and the
/// decoder. Write payloads stay typed here; bit-packing and endianness are
/// the bufferiser's business.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// FC01/02/03/04: read `quantity` items starting at `address`
    Read {
        unit_id: UnitId,
        function: ModbusFunction,
        address: u16,
        quantity: u16,
    },
    /// FC15: write a run of coils starting at `address`
    WriteCoils {
        unit_id: UnitId,
        address: u16,
        coils: Vec<bool>,
    },
    /// FC16: write a run of holding registers starting at `address`
    WriteRegisters {
        unit_id: UnitId,
        address: u16,
        registers: Vec<u16>,
    },
    /// FC08: one diagnostic subfunction, data field 0x0000
    Diagnostic { unit_id: UnitId, subfunction: u16 },
    /// Raw passthrough: `packet` is the PDU supplied by the client
    Raw { unit_id: UnitId, packet: Vec<u8> },
}

impl Frame {
    /// Target unit id (always the first ADU byte)
    pub fn unit_id(&self) -> UnitId {
        match self {
            Frame::Read { unit_id, .. }
            | Frame::WriteCoils { unit_id, .. }
            | Frame::WriteRegisters { unit_id, .. }
            | Frame::Diagnostic { unit_id, .. }
            | Frame::Raw { unit_id, .. } => *unit_id,
        }
    }

    /// Number of leading ADU bytes the response must echo verbatim.
    ///
    /// Writes and diagnostics echo unit, function, and the 16-bit
    /// address/subfunction; reads and raw frames echo unit and function only.
    pub fn echoed_header_len(&self) -> usize {
        match self {
            Frame::WriteCoils { .. } | Frame::WriteRegisters { .. } | Frame::Diagnostic { .. } => 4,
            Frame::Read { .. } | Frame::Raw { .. } => 2,
        }
    }

    /// Number of addressed items (coils or registers) this frame covers
    pub fn quantity(&self) -> u16 {
        match self {
            Frame::Read { quantity, .. } => *quantity,
            Frame::WriteCoils { coils, .. } => coils.len() as u16,
            Frame::WriteRegisters { registers, .. } => registers.len() as u16,
            Frame::Diagnostic { .. } | Frame::Raw { .. } => 0,
        }
    }

    /// Starting address, where the frame has one
    pub fn address(&self) -> Option<u16> {
        match self {
            Frame::Read { address, .. }
            | Frame::WriteCoils { address, .. }
            | Frame::WriteRegisters { address, .. } => Some(*address),
            Frame::Diagnostic { .. } | Frame::Raw { .. } => None,
        }
    }
}
