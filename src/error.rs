//! Core error types and result handling
//!
//! A single crate-wide error enum covers both halves of the gateway: the
//! broker-side pipeline (parsing, encoding, queueing) and the field-side
//! RTU exchange. Helper constructors keep call sites terse.

use thiserror::Error;

/// Result type used throughout the gateway
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway error enumeration
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Request record violates the schema or a cross-field rule
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Malformed or oversized protocol data
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Frame-level failure (framing, CRC, header mismatch)
    #[error("Frame error: {message}")]
    Frame { message: String },

    /// Operation exceeded its deadline
    #[error("Timeout during {operation} after {millis}ms")]
    Timeout { operation: String, millis: u64 },

    /// Broker or serial connection failure
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Unknown or unsupported Modbus function code
    #[error("Invalid function code: 0x{code:02X}")]
    InvalidFunction { code: u8 },

    /// Underlying I/O failure
    #[error("I/O error: {message}")]
    Io { message: String },
}

impl GatewayError {
    /// Create an invalid-request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a frame error
    pub fn frame(message: impl Into<String>) -> Self {
        Self::Frame {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, millis: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            millis,
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid-function error
    pub fn invalid_function(code: u8) -> Self {
        Self::InvalidFunction { code }
    }

    /// Create an I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::io(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::invalid_request(format!("Malformed JSON payload: {}", err))
    }
}
