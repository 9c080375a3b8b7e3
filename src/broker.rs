//! Broker-interface adapters
//!
//! The MQTT substrate is opaque to the core pipeline: everything behind the
//! [`BrokerLink`] seam. The gateway only ever calls `publish`; inbound
//! traffic reaches it through [`crate::gateway::Gateway::on_message`]. This
//! module also owns the three-segment topic grammar shared by both halves.

use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};

use crate::error::{GatewayError, GatewayResult};

/// Publishing side of the broker contract consumed by the core.
///
/// Implementations must be cheap to clone behind an `Arc`; the queue holds
/// one for the lifetime of its lanes.
#[async_trait]
pub trait BrokerLink: Send + Sync {
    /// Publish a payload to a topic. Object payloads are serialised to JSON
    /// by the caller; binary payloads carry their origin tag byte already.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> GatewayResult<()>;
}

/// Channel discriminator: the third topic segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// `<client>/<device>/request` — inbound JSON request
    Request,
    /// `<client>/<device>/response` — outbound JSON response
    Response,
    /// `<client>/<device>/mbnet` — binary ADU traffic, tagged by origin
    Mbnet,
}

/// Parsed gateway topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic<'a> {
    pub client: &'a str,
    pub device: &'a str,
    pub channel: Channel,
}

impl<'a> Topic<'a> {
    /// Parse a `<client>/<device>/<channel>` topic.
    ///
    /// Returns `None` for any other shape; foreign topics are simply not the
    /// gateway's business.
    pub fn parse(topic: &'a str) -> Option<Self> {
        let mut segments = topic.split('/');
        let client = segments.next().filter(|s| !s.is_empty())?;
        let device = segments.next().filter(|s| !s.is_empty())?;
        let channel = match segments.next()? {
            "request" => Channel::Request,
            "response" => Channel::Response,
            "mbnet" => Channel::Mbnet,
            _ => return None,
        };
        if segments.next().is_some() {
            return None;
        }
        Some(Self {
            client,
            device,
            channel,
        })
    }
}

/// [`BrokerLink`] over a rumqttc client.
///
/// All gateway traffic is QoS 2; positional reply matching cannot tolerate
/// lost or duplicated messages.
#[derive(Clone)]
pub struct MqttLink {
    client: AsyncClient,
}

impl MqttLink {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BrokerLink for MqttLink {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> GatewayResult<()> {
        self.client
            .publish(topic, QoS::ExactlyOnce, false, payload)
            .await
            .map_err(|e| GatewayError::connection(format!("MQTT publish failed: {}", e)))
    }
}
