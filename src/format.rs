//! # Request Formatter
//!
//! Clients speak one of two dialects (terse or verbose); every internal
//! component consumes only the terse canonical form. This module detects the
//! dialect, normalises inbound records, and projects outbound records back
//! into the caller's vocabulary so responses echo the request exactly as it
//! was written.

use serde_json::{Map, Value};

use crate::error::{GatewayError, GatewayResult};
use crate::keywords::{
    self, canonical_value, field_for_name, field_name, project_value, Field, Format,
    REQUEST_FIELDS,
};

/// Detect the record's dialect from the discriminator field.
///
/// Presence of `id` implies terse, presence of `identifier` implies verbose.
pub fn detect_format(record: &Map<String, Value>) -> GatewayResult<Format> {
    if record.contains_key(field_name(Field::UnitId, Format::Terse)) {
        Ok(Format::Terse)
    } else if record.contains_key(field_name(Field::UnitId, Format::Verbose)) {
        Ok(Format::Verbose)
    } else {
        Err(GatewayError::invalid_request(
            "Request carries neither 'id' nor 'identifier'",
        ))
    }
}

/// Normalise a record of either dialect into the terse canonical form.
///
/// Walks the eight request fields; a string value that is a registered enum
/// token is substituted with its terse form, anything else is kept verbatim.
/// The input record is left untouched.
pub fn canonicalise(record: &Map<String, Value>, format: Format) -> Map<String, Value> {
    let mut canonical = Map::new();

    for field in REQUEST_FIELDS {
        let key = field_name(field, format);
        if let Some(value) = record.get(key) {
            canonical.insert(
                field_name(field, Format::Terse).to_string(),
                canonicalise_value(value),
            );
        }
    }

    canonical
}

fn canonicalise_value(value: &Value) -> Value {
    match value {
        Value::String(token) => match canonical_value(token) {
            Some(terse) => Value::String(terse.to_string()),
            None => value.clone(),
        },
        other => other.clone(),
    }
}

/// Project a terse response record into the caller's vocabulary.
///
/// For each key of `response`, the projected key name is looked up in the
/// registry; if the original request carried a value under that key, the
/// original value is echoed unchanged (preserving the caller's exact casing
/// and tokens), otherwise the new value is emitted with its tokens projected.
pub fn project(
    response: &Map<String, Value>,
    original: &Map<String, Value>,
    format: Format,
) -> Map<String, Value> {
    let mut projected = Map::new();

    for (terse_key, value) in response {
        let key = match field_for_name(terse_key) {
            Some(field) => field_name(field, format).to_string(),
            None => terse_key.clone(),
        };

        let value = match original.get(&key) {
            Some(original_value) => original_value.clone(),
            None => project_response_value(value, format),
        };

        projected.insert(key, value);
    }

    projected
}

fn project_response_value(value: &Value, format: Format) -> Value {
    match value {
        Value::String(terse) => match project_value(terse, format) {
            Some(token) => Value::String(token.to_string()),
            None => value.clone(),
        },
        other => other.clone(),
    }
}

/// Allowed-values listing for an enumerated field, in the caller's dialect
pub fn allowed_values_for(field: Field, format: Format) -> Vec<String> {
    let tokens = match field {
        Field::Operation => keywords::operation_tokens(format),
        Field::Datatype => keywords::datatype_tokens(format),
        Field::Subfunction => keywords::subfunction_tokens(format),
        _ => Vec::new(),
    };
    tokens.into_iter().map(str::to_string).collect()
}
