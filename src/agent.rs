//! # Field Agent
//!
//! The physical-side half of the gateway: an MQTT client that owns the
//! RS-485 port. It listens on `+/<device>/mbnet`, performs one RTU exchange
//! per broker-origin message, and republishes the reply on the same topic
//! tagged as field-origin. A failed exchange (no reply, or bad CRC) is
//! answered with the in-band `"Null"` sentinel so the broker half can fail
//! the request deterministically.
//!
//! Strictly single-threaded: the event loop delivers one message at a time
//! and the UART exchange blocks the handler, which is exactly the
//! half-duplex discipline the bus needs.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tracing::{error, info, warn};

use crate::config::AgentSettings;
use crate::constants::{NULL_SENTINEL, TAG_BROKER_ORIGIN, TAG_FIELD_ORIGIN};
use crate::error::{GatewayError, GatewayResult};
use crate::rtu::RtuPort;

/// Field agent: MQTT client plus RTU framer
pub struct FieldAgent {
    settings: AgentSettings,
    port: RtuPort,
}

impl FieldAgent {
    /// Open the serial port and prepare the agent
    pub fn new(settings: AgentSettings) -> GatewayResult<Self> {
        let port = RtuPort::open(&settings.serial)?;
        Ok(Self { settings, port })
    }

    /// Connect to the broker and serve exchanges until the connection dies
    pub async fn run(mut self) -> GatewayResult<()> {
        let mqtt = &self.settings.mqtt;
        let mut options = MqttOptions::new(&self.settings.device, &mqtt.host, mqtt.port);
        options.set_keep_alive(Duration::from_secs(mqtt.keep_alive_secs));
        if !mqtt.username.is_empty() {
            options.set_credentials(&mqtt.username, &mqtt.password);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 10);

        let topic_filter = format!("+/{}/mbnet", self.settings.device);
        client
            .subscribe(topic_filter.as_str(), QoS::ExactlyOnce)
            .await
            .map_err(|e| GatewayError::connection(format!("MQTT subscribe failed: {}", e)))?;
        info!(topic = %topic_filter, "Field agent subscribed");

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.handle_frame(&client, &publish.topic, &publish.payload)
                        .await;
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "MQTT connection error");
                    return Err(GatewayError::connection(format!(
                        "MQTT event loop failed: {}",
                        e
                    )));
                }
            }
        }
    }

    /// One broker-origin frame: exchange on the bus, republish the reply.
    async fn handle_frame(&mut self, client: &AsyncClient, topic: &str, payload: &[u8]) {
        // Everything not broker-tagged is our own echo or foreign traffic
        let Some((&tag, adu)) = payload.split_first() else {
            return;
        };
        if tag != TAG_BROKER_ORIGIN {
            return;
        }
        if adu.is_empty() {
            warn!("Broker frame carries no ADU");
            return;
        }

        let reply = match self.port.exchange(adu).await {
            Ok(frame) => {
                let mut tagged = Vec::with_capacity(frame.len() + 1);
                tagged.push(TAG_FIELD_ORIGIN);
                tagged.extend_from_slice(&frame);
                tagged
            }
            Err(e) => {
                warn!(error = %e, "RTU exchange failed, answering with sentinel");
                let mut tagged = Vec::with_capacity(NULL_SENTINEL.len() + 1);
                tagged.push(TAG_FIELD_ORIGIN);
                tagged.extend_from_slice(NULL_SENTINEL);
                tagged
            }
        };

        if let Err(e) = client
            .publish(topic, QoS::ExactlyOnce, false, reply)
            .await
        {
            error!(error = %e, "Failed to publish field reply");
        }
    }
}
