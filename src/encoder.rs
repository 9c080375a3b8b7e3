//! # Modbus Encoder
//!
//! Translates a validated canonical request into abstract frames. Address
//! lists are coalesced into the minimum number of maximal contiguous runs:
//! the emitted frames cover exactly the distinct requested addresses, in
//! ascending order, so reads never over-fetch and writes never touch a gap.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{GatewayError, GatewayResult};
use crate::keywords;
use crate::protocol::{function_for, Datatype, Frame, Operation};
use crate::request::CanonicalRequest;

/// Compile a canonical request into its ordered list of abstract frames
pub fn encode(request: &CanonicalRequest) -> GatewayResult<Vec<Frame>> {
    let frames = match request.operation {
        Operation::Read => encode_read(request)?,
        Operation::Write => encode_write(request)?,
        Operation::Diagnosis => vec![encode_diagnosis(request)?],
        Operation::Raw => vec![encode_raw(request)?],
    };

    debug!(
        unit_id = request.unit_id,
        operation = request.operation.token(),
        frame_count = frames.len(),
        "Request encoded"
    );

    Ok(frames)
}

/// Split sorted, deduplicated addresses into maximal contiguous runs.
///
/// Returns `(start, count)` pairs in ascending address order. The union of
/// the runs equals the input set; no run bridges a gap.
pub fn contiguous_runs(addresses: &[u16]) -> Vec<(u16, u16)> {
    let mut runs = Vec::new();
    let mut iter = addresses.iter().copied();

    let Some(first) = iter.next() else {
        return runs;
    };

    let mut start = first;
    let mut prev = first;

    for addr in iter {
        if addr == prev + 1 {
            prev = addr;
        } else {
            runs.push((start, prev - start + 1));
            start = addr;
            prev = addr;
        }
    }
    runs.push((start, prev - start + 1));

    runs
}

fn sorted_distinct(list: &[u16]) -> Vec<u16> {
    let mut sorted = list.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted
}

fn datatype_of(request: &CanonicalRequest) -> GatewayResult<Datatype> {
    request
        .datatype
        .ok_or_else(|| GatewayError::invalid_request("Missing datatype"))
}

fn encode_read(request: &CanonicalRequest) -> GatewayResult<Vec<Frame>> {
    let function = function_for(Operation::Read, datatype_of(request)?)?;

    let runs = match (&request.range, &request.list) {
        (Some((lo, hi)), None) => vec![(*lo, hi - lo + 1)],
        (None, Some(list)) => contiguous_runs(&sorted_distinct(list)),
        _ => {
            return Err(GatewayError::invalid_request(
                "Read requires exactly one of range or list",
            ))
        }
    };

    Ok(runs
        .into_iter()
        .map(|(address, quantity)| Frame::Read {
            unit_id: request.unit_id,
            function,
            address,
            quantity,
        })
        .collect())
}

fn encode_write(request: &CanonicalRequest) -> GatewayResult<Vec<Frame>> {
    let datatype = datatype_of(request)?;
    // Derivation doubles as the write-to-input guard
    function_for(Operation::Write, datatype)?;

    let values = request
        .values
        .as_ref()
        .ok_or_else(|| GatewayError::invalid_request("Write requires values"))?;

    // Pair each target address with its value, preserving the caller's
    // list[i] <-> values[i] mapping, then emit per-run slices.
    let (runs, value_at): (Vec<(u16, u16)>, HashMap<u16, u16>) =
        match (&request.range, &request.list) {
            (Some((lo, hi)), None) => {
                let addresses: Vec<u16> = (*lo..=*hi).collect();
                if addresses.len() != values.len() {
                    return Err(GatewayError::invalid_request(
                        "Value count does not match range size",
                    ));
                }
                let map = addresses.iter().copied().zip(values.iter().copied()).collect();
                (vec![(*lo, hi - lo + 1)], map)
            }
            (None, Some(list)) => {
                if list.len() != values.len() {
                    return Err(GatewayError::invalid_request(
                        "Value count does not match list length",
                    ));
                }
                let map = list.iter().copied().zip(values.iter().copied()).collect();
                (contiguous_runs(&sorted_distinct(list)), map)
            }
            _ => {
                return Err(GatewayError::invalid_request(
                    "Write requires exactly one of range or list",
                ))
            }
        };

    runs.into_iter()
        .map(|(address, quantity)| {
            let run_values: Vec<u16> = (address..address + quantity)
                .map(|addr| value_at.get(&addr).copied().unwrap_or_default())
                .collect();

            Ok(match datatype {
                Datatype::BooleanOutput => Frame::WriteCoils {
                    unit_id: request.unit_id,
                    address,
                    coils: run_values.into_iter().map(|v| v != 0).collect(),
                },
                Datatype::NumericOutput => Frame::WriteRegisters {
                    unit_id: request.unit_id,
                    address,
                    registers: run_values,
                },
                _ => return Err(GatewayError::protocol("Input datatypes are not writable")),
            })
        })
        .collect()
}

fn encode_diagnosis(request: &CanonicalRequest) -> GatewayResult<Frame> {
    let token = request
        .subfunction
        .as_deref()
        .ok_or_else(|| GatewayError::invalid_request("Diagnosis requires a subfunction"))?;

    let subfunction = keywords::subfunction(token)
        .ok_or_else(|| GatewayError::invalid_request(format!("Unknown subfunction '{}'", token)))?;

    Ok(Frame::Diagnostic {
        unit_id: request.unit_id,
        subfunction: subfunction.code,
    })
}

fn encode_raw(request: &CanonicalRequest) -> GatewayResult<Frame> {
    let packet = request
        .packet
        .as_ref()
        .ok_or_else(|| GatewayError::invalid_request("Raw modbus requires packet bytes"))?;

    Ok(Frame::Raw {
        unit_id: request.unit_id,
        packet: packet.clone(),
    })
}
