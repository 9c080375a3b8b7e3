//! # Modbus Debufferiser and Decoder
//!
//! Inverts the bufferiser, driven by the originating frame: register reads
//! consume two big-endian bytes per register, boolean reads extract bits
//! LSB-first, data-fetching diagnostics carry one trailing 16-bit datum.
//! Every reply must echo its request header (unit and function for reads and
//! raw frames; unit, function, and address/subfunction for writes and
//! diagnostics). A single undecodable reply fails the whole response.
//!
//! The decoder then reassembles the client-facing record: a clone of the
//! canonical request (so echo fields survive projection) plus status,
//! fetched data, and an optional message.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::adu::unpack_bits;
use crate::keywords::{field_name, subfunction_by_code, Field, Format};
use crate::protocol::{Frame, Operation};
use crate::request::ClientRequest;

/// Error message for a field-side failure or an undecodable reply
pub const MSG_RETRIEVAL_ERROR: &str = "Error Retrieving Data";

/// Error message when an ADU's reply never arrived
pub const MSG_TIMED_OUT: &str = "Timed Out";

/// Decoded payload of a single reply
#[derive(Debug, Clone, PartialEq)]
enum Reply {
    Bits(Vec<bool>),
    Registers(Vec<u16>),
    WriteAck,
    Diagnostic(Option<u16>),
    Raw(Vec<u8>),
}

/// Decode one reply against the frame and ADU that produced it.
///
/// Returns `None` on any header mismatch or parse error.
fn debufferise(frame: &Frame, adu: &[u8], response: &[u8]) -> Option<Reply> {
    // Header echo check: position-matched prefix of the outgoing ADU
    let header_len = frame.echoed_header_len();
    if response.len() < header_len || response[..header_len] != adu[..header_len] {
        warn!(
            unit_id = frame.unit_id(),
            "Reply header does not match request"
        );
        return None;
    }

    match frame {
        Frame::Read { quantity, .. } => {
            let byte_count = *response.get(2)? as usize;
            let data = response.get(3..3 + byte_count)?;
            if is_boolean_read(frame) {
                if byte_count < (*quantity as usize).div_ceil(8) {
                    return None;
                }
                Some(Reply::Bits(unpack_bits(data, *quantity as usize)))
            } else {
                if byte_count != *quantity as usize * 2 {
                    return None;
                }
                let registers = data
                    .chunks(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                Some(Reply::Registers(registers))
            }
        }

        Frame::WriteCoils { .. } | Frame::WriteRegisters { .. } => Some(Reply::WriteAck),

        Frame::Diagnostic { subfunction, .. } => {
            let fetches = subfunction_by_code(*subfunction).is_some_and(|sf| sf.fetches_data);
            if fetches {
                let datum = response.get(4..6)?;
                Some(Reply::Diagnostic(Some(u16::from_be_bytes([
                    datum[0], datum[1],
                ]))))
            } else {
                Some(Reply::Diagnostic(None))
            }
        }

        Frame::Raw { .. } => Some(Reply::Raw(response.to_vec())),
    }
}

fn is_boolean_read(frame: &Frame) -> bool {
    matches!(
        frame,
        Frame::Read {
            function: crate::protocol::ModbusFunction::ReadCoils
                | crate::protocol::ModbusFunction::ReadDiscreteInputs,
            ..
        }
    )
}

/// Finalise a completed (or failed) request into its terse response record.
///
/// Exactly one of three outcomes: a timed-out error, a retrieval error (field
/// failure, short collection, or undecodable reply), or a success record with
/// fetched data where the operation yields any.
pub fn finalise(request: &ClientRequest, timed_out: bool) -> Map<String, Value> {
    if timed_out {
        return error_record(&request.canonical, MSG_TIMED_OUT);
    }

    if !request.is_complete() || request.has_field_failure() {
        return error_record(&request.canonical, MSG_RETRIEVAL_ERROR);
    }

    match decode_all(request) {
        Some(fetched) => success_record(request, fetched),
        None => error_record(&request.canonical, MSG_RETRIEVAL_ERROR),
    }
}

/// Decode every reply and assemble the fetched-data value.
///
/// Returns `None` if any reply fails to decode. Operations without fetched
/// data (writes, non-fetching diagnostics) yield `Some(None)`.
fn decode_all(request: &ClientRequest) -> Option<Option<Value>> {
    let mut replies = Vec::with_capacity(request.frames.len());
    for (i, frame) in request.frames.iter().enumerate() {
        let reply = debufferise(frame, &request.adus[i], &request.responses[i])?;
        replies.push(reply);
    }

    debug!(
        device = %request.device,
        frames = replies.len(),
        "All replies decoded"
    );

    match request.request.operation {
        Operation::Read => Some(Some(assemble_read(request, &replies)?)),
        Operation::Write => Some(None),
        Operation::Diagnosis => match replies.first()? {
            Reply::Diagnostic(Some(datum)) => Some(Some(Value::Array(vec![(*datum).into()]))),
            Reply::Diagnostic(None) => Some(None),
            _ => None,
        },
        Operation::Raw => match replies.first()? {
            Reply::Raw(bytes) => Some(Some(Value::Array(
                bytes.iter().map(|b| Value::from(*b)).collect(),
            ))),
            _ => None,
        },
    }
}

/// Reassemble read values: address order for ranges, the caller's original
/// list order for lists.
fn assemble_read(request: &ClientRequest, replies: &[Reply]) -> Option<Value> {
    // Pair every covered address with its decoded value
    let mut value_at = std::collections::HashMap::new();
    for (frame, reply) in request.frames.iter().zip(replies) {
        let start = frame.address()?;
        match reply {
            Reply::Bits(bits) => {
                for (offset, bit) in bits.iter().enumerate() {
                    value_at.insert(start + offset as u16, Value::Bool(*bit));
                }
            }
            Reply::Registers(registers) => {
                for (offset, register) in registers.iter().enumerate() {
                    value_at.insert(start + offset as u16, Value::from(*register));
                }
            }
            _ => return None,
        }
    }

    let ordered_addresses: Vec<u16> = match (&request.request.range, &request.request.list) {
        (Some((lo, hi)), None) => (*lo..=*hi).collect(),
        (None, Some(list)) => list.clone(),
        _ => return None,
    };

    let values: Option<Vec<Value>> = ordered_addresses
        .iter()
        .map(|addr| value_at.get(addr).cloned())
        .collect();

    values.map(Value::Array)
}

fn success_record(request: &ClientRequest, fetched: Option<Value>) -> Map<String, Value> {
    let mut record = request.canonical.clone();
    if let Some(data) = fetched {
        record.insert(field_name(Field::FetchedData, Format::Terse).to_string(), data);
    }
    record.insert(
        field_name(Field::Status, Format::Terse).to_string(),
        Value::Bool(true),
    );
    record
}

/// Build an error record echoing the canonical request with `status=false`
pub fn error_record(canonical: &Map<String, Value>, message: &str) -> Map<String, Value> {
    let mut record = canonical.clone();
    record.insert(
        field_name(Field::Status, Format::Terse).to_string(),
        Value::Bool(false),
    );
    record.insert(
        field_name(Field::Message, Format::Terse).to_string(),
        Value::String(message.to_string()),
    );
    record
}
