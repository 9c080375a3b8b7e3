//! Settings for both gateway halves
//!
//! Settings deserialise from a TOML file; every field has a default so a
//! minimal file (or none at all) works out of the box. The common MQTT
//! fields can also be overridden from the environment, which is how the
//! containerised deployments inject credentials.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::constants::{
    DEFAULT_FIRST_BYTE_TIMEOUT_MS, DEFAULT_REQUEST_TIMEOUT_MS, QUEUE_CAPACITY,
};
use crate::error::{GatewayError, GatewayResult};

/// MQTT connection settings shared by both halves
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttSettings {
    /// Broker host
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Username; doubles as the client topic prefix on the client side
    pub username: String,
    /// Password
    pub password: String,
    /// Keep-alive interval in seconds
    pub keep_alive_secs: u64,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: String::new(),
            password: String::new(),
            keep_alive_secs: 120,
        }
    }
}

impl MqttSettings {
    /// Apply `MBNET_MQTT_HOST` / `_PORT` / `_USERNAME` / `_PASSWORD` overrides
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("MBNET_MQTT_HOST") {
            self.host = host;
        }
        if let Some(port) = std::env::var("MBNET_MQTT_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.port = port;
        }
        if let Ok(username) = std::env::var("MBNET_MQTT_USERNAME") {
            self.username = username;
        }
        if let Ok(password) = std::env::var("MBNET_MQTT_PASSWORD") {
            self.password = password;
        }
    }
}

/// Broker-half settings
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GatewaySettings {
    pub mqtt: MqttSettings,
    pub queue: QueueTuning,
}

/// Queue tuning, kept separate so the TOML reads naturally
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueTuning {
    /// Admission cap per device lane
    pub capacity: usize,
    /// Per-ADU reply wait in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for QueueTuning {
    fn default() -> Self {
        Self {
            capacity: QUEUE_CAPACITY,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl From<QueueTuning> for crate::queue::QueueSettings {
    fn from(tuning: QueueTuning) -> Self {
        crate::queue::QueueSettings {
            capacity: tuning.capacity,
            request_timeout: Duration::from_millis(tuning.request_timeout_ms),
        }
        .clamped()
    }
}

/// Serial port settings for the field half
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Port path, e.g. `/dev/ttyUSB0`
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (7 or 8)
    pub data_bits: u8,
    /// Parity: "none", "even", or "odd"
    pub parity: String,
    /// Stop bits (1 or 2)
    pub stop_bits: u8,
    /// Wait for the first reply byte, in milliseconds
    pub first_byte_timeout_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            data_bits: 8,
            parity: "none".to_string(),
            stop_bits: 1,
            first_byte_timeout_ms: DEFAULT_FIRST_BYTE_TIMEOUT_MS,
        }
    }
}

impl SerialSettings {
    /// Bits added to every symbol by parity, if enabled
    pub fn parity_bits(&self) -> u8 {
        if self.parity.eq_ignore_ascii_case("none") {
            0
        } else {
            1
        }
    }
}

/// Field-half settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub mqtt: MqttSettings,
    /// Device name: the agent's MQTT identity and its topic segment
    pub device: String,
    pub serial: SerialSettings,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            mqtt: MqttSettings::default(),
            device: "mbnet-bridge".to_string(),
            serial: SerialSettings::default(),
        }
    }
}

/// Load a settings struct from a TOML file
pub fn load<T>(path: &Path) -> GatewayResult<T>
where
    T: for<'de> Deserialize<'de>,
{
    let text = std::fs::read_to_string(path).map_err(|e| {
        GatewayError::configuration(format!("Cannot read {}: {}", path.display(), e))
    })?;
    toml::from_str(&text)
        .map_err(|e| GatewayError::configuration(format!("Cannot parse {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = GatewaySettings::default();
        assert_eq!(settings.mqtt.port, 1883);
        assert_eq!(settings.queue.capacity, QUEUE_CAPACITY);
        assert_eq!(settings.queue.request_timeout_ms, 3000);

        let agent = AgentSettings::default();
        assert_eq!(agent.serial.baud_rate, 115_200);
        assert_eq!(agent.serial.parity_bits(), 0);
    }

    #[test]
    fn test_partial_toml() {
        let settings: GatewaySettings = toml::from_str(
            r#"
            [mqtt]
            host = "broker.example"
            username = "gateway"

            [queue]
            request_timeout_ms = 5000
            "#,
        )
        .unwrap();

        assert_eq!(settings.mqtt.host, "broker.example");
        assert_eq!(settings.mqtt.port, 1883);
        assert_eq!(settings.queue.request_timeout_ms, 5000);
        assert_eq!(settings.queue.capacity, QUEUE_CAPACITY);
    }

    #[test]
    fn test_agent_toml() {
        let settings: AgentSettings = toml::from_str(
            r#"
            device = "esp1@usp"

            [serial]
            port = "/dev/ttyS1"
            baud_rate = 9600
            parity = "even"
            "#,
        )
        .unwrap();

        assert_eq!(settings.device, "esp1@usp");
        assert_eq!(settings.serial.baud_rate, 9600);
        assert_eq!(settings.serial.parity_bits(), 1);
    }

    #[test]
    fn test_queue_settings_conversion_clamps() {
        let tuning = QueueTuning {
            capacity: 16,
            request_timeout_ms: 60_000,
        };
        let settings: crate::queue::QueueSettings = tuning.into();
        assert_eq!(settings.request_timeout, Duration::from_millis(15_000));
    }
}
