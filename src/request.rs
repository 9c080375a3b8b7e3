//! Canonical request model and the per-request unit of work
//!
//! [`CanonicalRequest`] is the typed form of a validated terse record; it is
//! what the encoder consumes. [`ClientRequest`] aggregates everything the
//! queue needs to execute one request end to end: the records in both forms,
//! the compiled ADUs, and the response buffers as they arrive from the field.

use serde_json::{Map, Value};

use crate::constants::NULL_SENTINEL;
use crate::error::{GatewayError, GatewayResult};
use crate::keywords::Format;
use crate::protocol::{Datatype, Operation, UnitId};

/// Typed canonical request, produced from a validated terse record
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRequest {
    pub unit_id: UnitId,
    pub operation: Operation,
    pub datatype: Option<Datatype>,
    /// Inclusive address range `[lo, hi]`, mutually exclusive with `list`
    pub range: Option<(u16, u16)>,
    /// Explicit address list, caller's order preserved
    pub list: Option<Vec<u16>>,
    /// Write payload, positionally paired with `list` (or `lo..=hi` order)
    pub values: Option<Vec<u16>>,
    /// Terse diagnostic subfunction token
    pub subfunction: Option<String>,
    /// Raw PDU bytes for passthrough requests
    pub packet: Option<Vec<u8>>,
}

impl CanonicalRequest {
    /// Build the typed request from an already-validated canonical record.
    ///
    /// Field shapes were checked by the validator; errors here guard against
    /// callers skipping that step.
    pub fn from_record(record: &Map<String, Value>) -> GatewayResult<Self> {
        let unit_id = record
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| GatewayError::invalid_request("Missing unit id"))?
            as UnitId;

        let operation = record
            .get("fn")
            .and_then(Value::as_str)
            .and_then(Operation::from_token)
            .ok_or_else(|| GatewayError::invalid_request("Missing or unknown operation"))?;

        let datatype = record
            .get("dt")
            .and_then(Value::as_str)
            .and_then(Datatype::from_token);

        let range = match record.get("rg").and_then(Value::as_array) {
            Some(pair) if pair.len() == 2 => {
                let lo = pair[0].as_u64().unwrap_or_default() as u16;
                let hi = pair[1].as_u64().unwrap_or_default() as u16;
                Some((lo, hi))
            }
            _ => None,
        };

        let list = record
            .get("ls")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_u64).map(|v| v as u16).collect());

        let values = record
            .get("dv")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_u64).map(|v| v as u16).collect());

        let subfunction = record
            .get("sf")
            .and_then(Value::as_str)
            .map(str::to_string);

        let packet = record
            .get("pk")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_u64).map(|v| v as u8).collect());

        Ok(Self {
            unit_id,
            operation,
            datatype,
            range,
            list,
            values,
            subfunction,
            packet,
        })
    }
}

/// One accepted request travelling through the per-device queue
#[derive(Debug)]
pub struct ClientRequest {
    /// First topic segment: the publishing client's name
    pub client: String,
    /// Second topic segment: the target device (field agent) name
    pub device: String,
    /// Dialect the caller spoke, for response projection
    pub format: Format,
    /// The caller's record verbatim, for echoing
    pub original: Map<String, Value>,
    /// Terse canonical record, cloned into the response
    pub canonical: Map<String, Value>,
    /// Typed request driving encode and decode
    pub request: CanonicalRequest,
    /// Abstract frames, one per Modbus exchange, in send order
    pub frames: Vec<crate::protocol::Frame>,
    /// Serialised ADUs, positionally matching `frames`
    pub adus: Vec<Vec<u8>>,
    /// Response buffers as collected from the field, in send order
    pub responses: Vec<Vec<u8>>,
}

impl ClientRequest {
    /// Topic the field agent listens on for this device
    pub fn mbnet_topic(&self) -> String {
        format!("{}/{}/mbnet", self.client, self.device)
    }

    /// Topic the caller listens on for the response
    pub fn response_topic(&self) -> String {
        format!("{}/{}/response", self.client, self.device)
    }

    /// True once every sent ADU has a collected response
    pub fn is_complete(&self) -> bool {
        self.responses.len() == self.adus.len()
    }

    /// True if any collected response is the field-failure sentinel.
    ///
    /// A response whose first four bytes are `"Null"` marks the whole
    /// exchange failed irrespective of the other buffers.
    pub fn has_field_failure(&self) -> bool {
        self.responses
            .iter()
            .any(|buf| buf.len() >= NULL_SENTINEL.len() && &buf[..NULL_SENTINEL.len()] == NULL_SENTINEL)
    }
}
