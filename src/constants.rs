//! Protocol constants for the gateway, based on the official Modbus specification
//!
//! These constants are derived from the official Modbus specification:
//! - Maximum ADU size: 253 bytes before CRC (inherited from the RS485 limit of 256 bytes)
//! - Register/coil limits are calculated to fit within the ADU size constraint

// ============================================================================
// Frame Size Constants
// ============================================================================

/// Maximum ADU (Application Data Unit) size handled by the gateway, CRC excluded
///
/// This is the fundamental limit inherited from the RS485 wire format:
/// RS485 frame (256 bytes) - CRC (2 bytes) - Slave Address (1 byte) = 253 bytes
/// of PDU; the gateway carries address + PDU, CRC is appended at the field side.
pub const MAX_ADU_SIZE: usize = 253;

/// Receive buffer size for RTU frames on the field side
///
/// Theoretical max frame is 256 bytes (ADU + CRC); 265 leaves headroom for
/// line noise ahead of a frame.
pub const RTU_RESPONSE_BUFFER_SIZE: usize = 265;

// ============================================================================
// Register Operation Limits
// ============================================================================

/// Maximum number of registers for FC03/FC04 (Read Holding/Input Registers)
///
/// Response PDU: 1 (function) + 1 (byte count) + N × 2 ≤ 253 → N ≤ 125
pub const MAX_READ_REGISTERS: u16 = 125;

/// Maximum number of registers for FC16 (Write Multiple Registers)
///
/// Request PDU: 1 + 2 + 2 + 1 + N × 2 ≤ 253 → N ≤ 123
pub const MAX_WRITE_REGISTERS: u16 = 123;

/// Maximum number of coils for FC01/FC02 (Read Coils/Discrete Inputs)
pub const MAX_READ_COILS: u16 = 2000;

/// Maximum number of coils for FC15 (Write Multiple Coils)
pub const MAX_WRITE_COILS: u16 = 1968;

// ============================================================================
// Modbus Function Codes
// ============================================================================

/// Read Coils (FC01)
pub const FC_READ_COILS: u8 = 0x01;

/// Read Discrete Inputs (FC02)
pub const FC_READ_DISCRETE_INPUTS: u8 = 0x02;

/// Read Holding Registers (FC03)
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Read Input Registers (FC04)
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;

/// Diagnostics (FC08)
pub const FC_DIAGNOSTICS: u8 = 0x08;

/// Write Multiple Coils (FC15)
pub const FC_WRITE_MULTIPLE_COILS: u8 = 0x0F;

/// Write Multiple Registers (FC16)
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

// ============================================================================
// Unit Identifiers
// ============================================================================

/// Lowest addressable slave/unit id on an RTU bus
pub const MIN_UNIT_ID: u8 = 1;

/// Highest addressable slave/unit id on an RTU bus
pub const MAX_UNIT_ID: u8 = 247;

// ============================================================================
// Wire Tags and Sentinels (gateway <-> field contract)
// ============================================================================

/// First byte of every mbnet payload published by the broker half
pub const TAG_BROKER_ORIGIN: u8 = 0x00;

/// First byte of every mbnet payload published by the field half
pub const TAG_FIELD_ORIGIN: u8 = 0x01;

/// In-band body signalling a failed field-side exchange (timeout or bad CRC)
pub const NULL_SENTINEL: &[u8; 4] = b"Null";

// ============================================================================
// Timeouts
// ============================================================================

/// Default broker-side wait for one ADU's response (milliseconds)
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 3000;

/// Upper bound for the broker-side per-ADU wait (milliseconds)
pub const MAX_REQUEST_TIMEOUT_MS: u64 = 15_000;

/// Field-side wait for the first response byte (milliseconds)
pub const DEFAULT_FIRST_BYTE_TIMEOUT_MS: u64 = 500;

/// Settle time after transmit before the RS-485 driver releases the bus (milliseconds)
pub const RS485_TURNAROUND_MS: u64 = 5;

// ============================================================================
// Queue
// ============================================================================

/// Admission cap per device lane; requests beyond this are dropped
pub const QUEUE_CAPACITY: usize = 256;
