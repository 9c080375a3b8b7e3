//! # mbnet-gateway - MQTT to Modbus RTU Protocol-Translation Gateway
//!
//! **Author:** Evan Liu <liuyifanz.1996@gmail.com>
//! **License:** MIT
//!
//! A gateway that lets clients operate Modbus RTU field devices through MQTT
//! using structured JSON records. The broker half validates a high-level
//! read/write/diagnostic request, compiles it into one or more Modbus ADUs,
//! serialises access per device, and answers on the response topic in the
//! caller's own vocabulary. The field half owns the RS-485 port: it appends
//! the CRC, performs the half-duplex RTU exchange with inter-symbol timing,
//! and relays tagged raw replies back over MQTT.
//!
//! ## Topics
//!
//! | Topic | Direction | Payload |
//! |-------|-----------|---------|
//! | `<client>/<device>/request` | client → broker | JSON request, terse or verbose |
//! | `<client>/<device>/response` | broker → client | JSON response in the caller's dialect |
//! | `<client>/<device>/mbnet` | broker ↔ field | tagged binary ADU (`0x00` broker-origin, `0x01` field-origin) |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mbnet_gateway::{BrokerLink, Gateway, QueueSettings};
//!
//! # async fn example(link: Arc<dyn BrokerLink>) {
//! let gateway = Gateway::new(link, QueueSettings::default());
//!
//! // Wire the broker dispatch callback:
//! gateway
//!     .on_message("alice/bridge1/request", br#"{"id":7,"fn":"r","dt":"ni","rg":[16,25]}"#)
//!     .await;
//! # }
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Core error types and result handling
pub mod error;

/// Protocol constants based on the official Modbus specification
pub mod constants;

/// Keyword registry: terse/verbose wire vocabulary
pub mod keywords;

/// Request formatter: dialect detection, canonicalisation, projection
pub mod format;

/// Request validator
pub mod validator;

/// Modbus protocol definitions: functions and abstract frames
pub mod protocol;

/// Encoder: canonical request to abstract frames
pub mod encoder;

/// Bufferiser: abstract frames to byte ADUs
pub mod adu;

/// Debufferiser and decoder: replies back to structured records
pub mod decoder;

/// Canonical request model and the per-request unit of work
pub mod request;

/// Per-device request queue
pub mod queue;

/// Gateway glue: broker events to pipeline
pub mod gateway;

/// Broker-interface adapters
pub mod broker;

/// Settings for both halves
pub mod config;

/// Modbus CRC-16 (field boundary)
pub mod crc;

// ============================================================================
// Field half (serial side)
// ============================================================================

/// RTU framer over the serial port
#[cfg(feature = "field")]
pub mod rtu;

/// Field agent: MQTT client plus RTU framer
#[cfg(feature = "field")]
pub mod agent;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Async runtime (users can use mbnet_gateway::tokio) ===
pub use tokio;

// === Gateway API ===
pub use broker::{BrokerLink, Channel, MqttLink, Topic};
pub use gateway::Gateway;
pub use queue::{QueueSettings, RequestQueue};

// === Error handling ===
pub use error::{GatewayError, GatewayResult};

// === Core types ===
pub use keywords::{Field, Format};
pub use protocol::{Datatype, Frame, ModbusFunction, Operation, UnitId};
pub use request::{CanonicalRequest, ClientRequest};

// === Pipeline stages (advanced usage) ===
pub use adu::{bufferise, ModbusAdu};
pub use decoder::finalise;
pub use encoder::encode;
pub use validator::{validate, ValidationError};

// === Settings ===
pub use config::{AgentSettings, GatewaySettings, MqttSettings, SerialSettings};

// === Field half ===
#[cfg(feature = "field")]
pub use agent::FieldAgent;

#[cfg(feature = "field")]
pub use rtu::RtuPort;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
