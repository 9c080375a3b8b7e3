//! # Gateway Glue
//!
//! Binds broker inbound events to the pipeline: requests are detected,
//! canonicalised, validated, compiled to ADUs and enqueued; field frames are
//! routed to the in-flight collector of their device; validator failures are
//! answered immediately on the response topic, projected into the caller's
//! dialect. Every error path funnels through the same response-publish step,
//! so a client receives exactly one response per accepted request.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::adu::bufferise;
use crate::broker::{BrokerLink, Channel, Topic};
use crate::constants::TAG_FIELD_ORIGIN;
use crate::decoder;
use crate::encoder::encode;
use crate::error::GatewayResult;
use crate::format::{canonicalise, detect_format, project};
use crate::keywords::{field_name, Field, Format};
use crate::queue::{QueueSettings, RequestQueue};
use crate::request::{CanonicalRequest, ClientRequest};
use crate::validator::{validate, ValidationError};

/// Wires broker callbacks to validator, formatter, encoder, and queue
pub struct Gateway {
    link: Arc<dyn BrokerLink>,
    queue: Arc<RequestQueue>,
}

impl Gateway {
    pub fn new(link: Arc<dyn BrokerLink>, settings: QueueSettings) -> Self {
        let queue = RequestQueue::new(Arc::clone(&link), settings);
        Self { link, queue }
    }

    /// Broker dispatch callback: one inbound packet.
    ///
    /// Non-blocking apart from schema validation; queue processing happens on
    /// the device lanes.
    pub async fn on_message(&self, topic: &str, payload: &[u8]) {
        let Some(parsed) = Topic::parse(topic) else {
            return;
        };

        match parsed.channel {
            Channel::Request => self.handle_request(&parsed, payload).await,
            Channel::Mbnet => self.handle_field_frame(&parsed, payload),
            // Client-bound; the gateway published it itself
            Channel::Response => {}
        }
    }

    async fn handle_request(&self, topic: &Topic<'_>, payload: &[u8]) {
        let record: Map<String, Value> = match serde_json::from_slice(payload) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                warn!(client = %topic.client, "Request payload is not a JSON object");
                return;
            }
            Err(e) => {
                warn!(client = %topic.client, error = %e, "Request payload is not valid JSON");
                return;
            }
        };

        // Undetectable format falls back to terse so the id rule can report
        let format = detect_format(&record).unwrap_or(Format::Terse);
        let canonical = canonicalise(&record, format);

        if let Err(failure) = validate(&canonical, format) {
            info!(
                client = %topic.client,
                device = %topic.device,
                message = %failure.message,
                "Request rejected"
            );
            self.publish_rejection(topic, &record, &canonical, format, failure)
                .await;
            return;
        }

        match build_client_request(topic, format, &record, &canonical) {
            Ok(request) => {
                debug!(
                    client = %request.client,
                    device = %request.device,
                    adus = request.adus.len(),
                    "Request accepted"
                );
                self.queue.enqueue(request);
            }
            Err(e) => {
                // Validation should have caught everything; compilation
                // failures still get answered rather than dropped.
                warn!(client = %topic.client, error = %e, "Request failed to compile");
                let failure = ValidationError {
                    message: e.to_string(),
                    allowed_values: None,
                };
                self.publish_rejection(topic, &record, &canonical, format, failure)
                    .await;
            }
        }
    }

    fn handle_field_frame(&self, topic: &Topic<'_>, payload: &[u8]) {
        // Only field-origin frames feed the collector; everything else on
        // mbnet is our own traffic or foreign noise.
        let Some((&tag, body)) = payload.split_first() else {
            return;
        };
        if tag != TAG_FIELD_ORIGIN {
            return;
        }

        debug!(device = %topic.device, len = body.len(), "Field reply received");
        self.queue.deliver_reply(topic.device, body.to_vec());
    }

    async fn publish_rejection(
        &self,
        topic: &Topic<'_>,
        original: &Map<String, Value>,
        canonical: &Map<String, Value>,
        format: Format,
        failure: ValidationError,
    ) {
        let mut record = decoder::error_record(canonical, &failure.message);
        if let Some(allowed) = failure.allowed_values {
            record.insert(
                field_name(Field::AllowedValues, Format::Terse).to_string(),
                Value::Array(allowed.into_iter().map(Value::String).collect()),
            );
        }

        let projected = project(&record, original, format);
        let response_topic = format!("{}/{}/response", topic.client, topic.device);

        match serde_json::to_vec(&Value::Object(projected)) {
            Ok(payload) => {
                if let Err(e) = self.link.publish(&response_topic, payload).await {
                    warn!(error = %e, "Failed to publish rejection");
                }
            }
            Err(e) => warn!(error = %e, "Rejection record not serialisable"),
        }
    }
}

/// Compile an accepted request into its unit of work
fn build_client_request(
    topic: &Topic<'_>,
    format: Format,
    original: &Map<String, Value>,
    canonical: &Map<String, Value>,
) -> GatewayResult<ClientRequest> {
    let request = CanonicalRequest::from_record(canonical)?;
    let frames = encode(&request)?;
    let adus = frames
        .iter()
        .map(|frame| bufferise(frame).map(|adu| adu.to_vec()))
        .collect::<GatewayResult<Vec<_>>>()?;

    Ok(ClientRequest {
        client: topic.client.to_string(),
        device: topic.device.to_string(),
        format,
        original: original.clone(),
        canonical: canonical.clone(),
        request,
        frames,
        adus,
        responses: vec![],
    })
}
