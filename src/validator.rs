//! # Request Validator
//!
//! Structural and semantic validation of inbound records, applied to the
//! canonical (terse) form so a single rule set covers both dialects. The
//! validator is deterministic, never mutates its input, and reports the
//! first violation only. Field names inside messages and the allowed-values
//! listing are rendered in the caller's own dialect.

use serde_json::{Map, Value};

use crate::constants::{
    MAX_READ_COILS, MAX_READ_REGISTERS, MAX_UNIT_ID, MAX_WRITE_COILS, MAX_WRITE_REGISTERS,
    MIN_UNIT_ID,
};
use crate::format::allowed_values_for;
use crate::keywords::{field_name, subfunction, Field, Format};
use crate::protocol::{Datatype, Operation};

/// A single validation failure
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Human-readable description of the first violation found
    pub message: String,
    /// For enumeration violations, the acceptable tokens in the caller's dialect
    pub allowed_values: Option<Vec<String>>,
}

impl ValidationError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            allowed_values: None,
        }
    }

    fn with_allowed(message: impl Into<String>, allowed: Vec<String>) -> Self {
        Self {
            message: message.into(),
            allowed_values: Some(allowed),
        }
    }
}

/// Validate a canonical record detected as `format`.
///
/// Returns `Ok(())` when the record satisfies every structural and
/// cross-field rule, otherwise the first failure encountered.
pub fn validate(record: &Map<String, Value>, format: Format) -> Result<(), ValidationError> {
    check_unit_id(record, format)?;
    let operation = check_operation(record, format)?;

    check_range_shape(record, format)?;
    check_list_shape(record, format)?;
    check_values_shape(record, format)?;
    check_packet_shape(record, format)?;

    match operation {
        Operation::Read => check_read(record, format),
        Operation::Write => check_write(record, format),
        Operation::Diagnosis => check_diagnosis(record, format),
        Operation::Raw => check_raw(record, format),
    }
}

fn key(field: Field, format: Format) -> &'static str {
    field_name(field, format)
}

fn is_u16(value: &Value) -> bool {
    value.as_u64().is_some_and(|v| v <= u16::MAX as u64)
}

fn check_unit_id(record: &Map<String, Value>, format: Format) -> Result<(), ValidationError> {
    let name = key(Field::UnitId, format);
    let value = record
        .get("id")
        .ok_or_else(|| ValidationError::new(format!("Missing required field '{}'", name)))?;

    match value.as_u64() {
        Some(id) if (MIN_UNIT_ID as u64..=MAX_UNIT_ID as u64).contains(&id) => Ok(()),
        _ => Err(ValidationError::new(format!(
            "Invalid '{}': expected an integer between {} and {}",
            name, MIN_UNIT_ID, MAX_UNIT_ID
        ))),
    }
}

fn check_operation(record: &Map<String, Value>, format: Format) -> Result<Operation, ValidationError> {
    let name = key(Field::Operation, format);
    let value = record
        .get("fn")
        .ok_or_else(|| ValidationError::new(format!("Missing required field '{}'", name)))?;

    value
        .as_str()
        .and_then(Operation::from_token)
        .ok_or_else(|| {
            ValidationError::with_allowed(
                format!("Invalid '{}': unknown operation", name),
                allowed_values_for(Field::Operation, format),
            )
        })
}

fn check_datatype(record: &Map<String, Value>, format: Format) -> Result<Datatype, ValidationError> {
    let name = key(Field::Datatype, format);
    let value = record
        .get("dt")
        .ok_or_else(|| ValidationError::new(format!("Missing required field '{}'", name)))?;

    value
        .as_str()
        .and_then(Datatype::from_token)
        .ok_or_else(|| {
            ValidationError::with_allowed(
                format!("Invalid '{}': unknown datatype", name),
                allowed_values_for(Field::Datatype, format),
            )
        })
}

fn check_range_shape(record: &Map<String, Value>, format: Format) -> Result<(), ValidationError> {
    let name = key(Field::Range, format);
    let Some(value) = record.get("rg") else {
        return Ok(());
    };

    let err = || {
        ValidationError::new(format!(
            "Invalid '{}': expected two strictly ascending integers",
            name
        ))
    };

    let pair = value.as_array().ok_or_else(err)?;
    if pair.len() != 2 || !pair.iter().all(is_u16) {
        return Err(err());
    }

    let lo = pair[0].as_u64().unwrap_or_default();
    let hi = pair[1].as_u64().unwrap_or_default();
    if lo >= hi {
        return Err(err());
    }

    Ok(())
}

fn check_list_shape(record: &Map<String, Value>, format: Format) -> Result<(), ValidationError> {
    let name = key(Field::List, format);
    let Some(value) = record.get("ls") else {
        return Ok(());
    };

    let items = value.as_array().ok_or_else(|| {
        ValidationError::new(format!("Invalid '{}': expected an array of addresses", name))
    })?;

    if items.is_empty() || !items.iter().all(is_u16) {
        return Err(ValidationError::new(format!(
            "Invalid '{}': expected a non-empty array of integers in 0..=65535",
            name
        )));
    }

    let mut seen = std::collections::HashSet::new();
    for item in items {
        if !seen.insert(item.as_u64().unwrap_or_default()) {
            return Err(ValidationError::new(format!(
                "Invalid '{}': addresses must be unique",
                name
            )));
        }
    }

    Ok(())
}

fn check_values_shape(record: &Map<String, Value>, format: Format) -> Result<(), ValidationError> {
    let name = key(Field::Values, format);
    let Some(value) = record.get("dv") else {
        return Ok(());
    };

    let items = value.as_array().ok_or_else(|| {
        ValidationError::new(format!("Invalid '{}': expected an array of integers", name))
    })?;

    if items.is_empty() || !items.iter().all(is_u16) {
        return Err(ValidationError::new(format!(
            "Invalid '{}': expected a non-empty array of integers in 0..=65535",
            name
        )));
    }

    Ok(())
}

fn check_packet_shape(record: &Map<String, Value>, format: Format) -> Result<(), ValidationError> {
    let name = key(Field::Packet, format);
    let Some(value) = record.get("pk") else {
        return Ok(());
    };

    let items = value.as_array().ok_or_else(|| {
        ValidationError::new(format!("Invalid '{}': expected an array of bytes", name))
    })?;

    let is_byte = |v: &Value| v.as_u64().is_some_and(|b| b <= u8::MAX as u64);
    if items.is_empty() || !items.iter().all(is_byte) {
        return Err(ValidationError::new(format!(
            "Invalid '{}': expected a non-empty array of bytes in 0..=255",
            name
        )));
    }

    Ok(())
}

fn require_absent(
    record: &Map<String, Value>,
    terse: &str,
    field: Field,
    operation: &str,
    format: Format,
) -> Result<(), ValidationError> {
    if record.contains_key(terse) {
        return Err(ValidationError::new(format!(
            "Field '{}' is not allowed for {} requests",
            key(field, format),
            operation
        )));
    }
    Ok(())
}

/// Addressing summary for the cross-field rules
struct Addressing {
    /// Items targeted (range span or list length)
    count: usize,
    /// Longest contiguous run a single frame will carry
    longest_run: usize,
}

/// Exactly one of rg/ls, summarising the addressed items
fn check_addressing(record: &Map<String, Value>, format: Format) -> Result<Addressing, ValidationError> {
    let has_range = record.contains_key("rg");
    let has_list = record.contains_key("ls");

    if has_range == has_list {
        return Err(ValidationError::new(format!(
            "Exactly one of '{}' or '{}' is required",
            key(Field::Range, format),
            key(Field::List, format)
        )));
    }

    if has_range {
        let (lo, hi) = match record.get("rg").and_then(Value::as_array) {
            Some(pair) if pair.len() == 2 => (
                pair[0].as_u64().unwrap_or_default(),
                pair[1].as_u64().unwrap_or_default(),
            ),
            _ => (0, 0),
        };
        let span = hi.saturating_sub(lo) as usize + 1;
        Ok(Addressing {
            count: span,
            longest_run: span,
        })
    } else {
        let mut addresses: Vec<u16> = record
            .get("ls")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_u64)
                    .map(|v| v as u16)
                    .collect()
            })
            .unwrap_or_default();
        let count = addresses.len();
        addresses.sort_unstable();
        addresses.dedup();
        let longest_run = crate::encoder::contiguous_runs(&addresses)
            .into_iter()
            .map(|(_, len)| len as usize)
            .max()
            .unwrap_or(0);
        Ok(Addressing { count, longest_run })
    }
}

fn run_limit(operation: Operation, datatype: Datatype) -> usize {
    match (operation, datatype.is_boolean()) {
        (Operation::Read, true) => MAX_READ_COILS as usize,
        (Operation::Read, false) => MAX_READ_REGISTERS as usize,
        (_, true) => MAX_WRITE_COILS as usize,
        (_, false) => MAX_WRITE_REGISTERS as usize,
    }
}

fn check_read(record: &Map<String, Value>, format: Format) -> Result<(), ValidationError> {
    let datatype = check_datatype(record, format)?;
    let addressing = check_addressing(record, format)?;

    require_absent(record, "dv", Field::Values, "read", format)?;
    require_absent(record, "sf", Field::Subfunction, "read", format)?;
    require_absent(record, "pk", Field::Packet, "read", format)?;

    let limit = run_limit(Operation::Read, datatype);
    if addressing.longest_run > limit {
        return Err(ValidationError::new(format!(
            "A contiguous run of {} items exceeds the {} that fit one read",
            addressing.longest_run, limit
        )));
    }

    Ok(())
}

fn check_write(record: &Map<String, Value>, format: Format) -> Result<(), ValidationError> {
    let datatype = check_datatype(record, format)?;
    if !matches!(datatype, Datatype::BooleanOutput | Datatype::NumericOutput) {
        return Err(ValidationError::with_allowed(
            format!(
                "Invalid '{}': only output datatypes are writable",
                key(Field::Datatype, format)
            ),
            vec![
                crate::keywords::project_value("bo", format).unwrap_or("bo").to_string(),
                crate::keywords::project_value("no", format).unwrap_or("no").to_string(),
            ],
        ));
    }

    let addressing = check_addressing(record, format)?;

    require_absent(record, "sf", Field::Subfunction, "write", format)?;
    require_absent(record, "pk", Field::Packet, "write", format)?;

    let values = record.get("dv").ok_or_else(|| {
        ValidationError::new(format!(
            "Missing required field '{}'",
            key(Field::Values, format)
        ))
    })?;

    let value_count = values.as_array().map_or(0, Vec::len);
    if value_count != addressing.count {
        return Err(ValidationError::new(format!(
            "Field '{}' carries {} values but {} addresses are targeted",
            key(Field::Values, format),
            value_count,
            addressing.count
        )));
    }

    if datatype.is_boolean() {
        let all_bits = values
            .as_array()
            .map_or(false, |items| {
                items.iter().all(|v| matches!(v.as_u64(), Some(0) | Some(1)))
            });
        if !all_bits {
            return Err(ValidationError::new(format!(
                "Field '{}' must contain only 0 or 1 for coil writes",
                key(Field::Values, format)
            )));
        }
    }

    let limit = run_limit(Operation::Write, datatype);
    if addressing.longest_run > limit {
        return Err(ValidationError::new(format!(
            "A contiguous run of {} items exceeds the {} that fit one write",
            addressing.longest_run, limit
        )));
    }

    Ok(())
}

fn check_diagnosis(record: &Map<String, Value>, format: Format) -> Result<(), ValidationError> {
    let name = key(Field::Subfunction, format);
    let value = record
        .get("sf")
        .ok_or_else(|| ValidationError::new(format!("Missing required field '{}'", name)))?;

    let known = value.as_str().and_then(subfunction).is_some();
    if !known {
        return Err(ValidationError::with_allowed(
            format!("Invalid '{}': unknown diagnostic subfunction", name),
            allowed_values_for(Field::Subfunction, format),
        ));
    }

    require_absent(record, "dt", Field::Datatype, "diagnosis", format)?;
    require_absent(record, "rg", Field::Range, "diagnosis", format)?;
    require_absent(record, "ls", Field::List, "diagnosis", format)?;
    require_absent(record, "dv", Field::Values, "diagnosis", format)?;
    require_absent(record, "pk", Field::Packet, "diagnosis", format)?;

    Ok(())
}

fn check_raw(record: &Map<String, Value>, format: Format) -> Result<(), ValidationError> {
    if !record.contains_key("pk") {
        return Err(ValidationError::new(format!(
            "Missing required field '{}'",
            key(Field::Packet, format)
        )));
    }

    require_absent(record, "dt", Field::Datatype, "raw modbus", format)?;
    require_absent(record, "rg", Field::Range, "raw modbus", format)?;
    require_absent(record, "ls", Field::List, "raw modbus", format)?;
    require_absent(record, "dv", Field::Values, "raw modbus", format)?;
    require_absent(record, "sf", Field::Subfunction, "raw modbus", format)?;

    // One ADU on the wire: unit id + packet must stay under the frame limit
    let len = record
        .get("pk")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    if 1 + len > crate::constants::MAX_ADU_SIZE {
        return Err(ValidationError::new(format!(
            "Field '{}' exceeds the {}-byte frame limit",
            key(Field::Packet, format),
            crate::constants::MAX_ADU_SIZE
        )));
    }

    Ok(())
}
