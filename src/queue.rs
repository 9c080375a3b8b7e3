//! # Per-Device Request Queue
//!
//! One lane per device, each a FIFO with a single in-flight request. A lane
//! posts the request's ADUs one at a time, waits for the matching reply with
//! a bounded timeout, and finalises exactly one response per accepted
//! request, in enqueue order. Modbus RTU carries no transaction id, so reply
//! matching is purely positional within the serialised lane; this is why
//! per-device serialisation is an invariant, not an optimisation.
//!
//! Enqueue is synchronous and never blocks the broker dispatch callback;
//! admission past the capacity cap drops the request with a warning.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::broker::BrokerLink;
use crate::constants::{
    DEFAULT_REQUEST_TIMEOUT_MS, MAX_REQUEST_TIMEOUT_MS, QUEUE_CAPACITY, TAG_BROKER_ORIGIN,
};
use crate::decoder;
use crate::format;
use crate::request::ClientRequest;

/// Queue tuning knobs
#[derive(Debug, Clone, Copy)]
pub struct QueueSettings {
    /// Admission cap per lane
    pub capacity: usize,
    /// Wait for one ADU's reply
    pub request_timeout: Duration,
}

impl QueueSettings {
    /// Clamp the per-ADU wait to the protocol's upper bound
    pub fn clamped(mut self) -> Self {
        let max = Duration::from_millis(MAX_REQUEST_TIMEOUT_MS);
        if self.request_timeout > max {
            self.request_timeout = max;
        }
        self
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            capacity: QUEUE_CAPACITY,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

struct Lane {
    requests: mpsc::Sender<ClientRequest>,
    replies: mpsc::UnboundedSender<Vec<u8>>,
}

/// FIFO-serialised executor, one lane per device
pub struct RequestQueue {
    link: Arc<dyn BrokerLink>,
    settings: QueueSettings,
    lanes: Mutex<HashMap<String, Lane>>,
}

impl RequestQueue {
    pub fn new(link: Arc<dyn BrokerLink>, settings: QueueSettings) -> Arc<Self> {
        Arc::new(Self {
            link,
            settings: settings.clamped(),
            lanes: Mutex::new(HashMap::new()),
        })
    }

    /// Enqueue an accepted request on its device's lane.
    ///
    /// Non-blocking; a full lane drops the request silently apart from a
    /// warning log (a dropped request was never accepted, so the
    /// one-response-per-accepted-request property is preserved).
    pub fn enqueue(&self, request: ClientRequest) {
        let device = request.device.clone();
        let mut lanes = self.lanes.lock().expect("lane map poisoned");

        let lane = lanes.entry(device.clone()).or_insert_with(|| {
            let (requests_tx, requests_rx) = mpsc::channel(self.settings.capacity);
            let (replies_tx, replies_rx) = mpsc::unbounded_channel();
            let link = Arc::clone(&self.link);
            let settings = self.settings;

            info!(device = %device, "Opening device lane");
            tokio::spawn(run_lane(device.clone(), requests_rx, replies_rx, link, settings));

            Lane {
                requests: requests_tx,
                replies: replies_tx,
            }
        });

        if let Err(err) = lane.requests.try_send(request) {
            match err {
                mpsc::error::TrySendError::Full(dropped) => warn!(
                    device = %dropped.device,
                    client = %dropped.client,
                    "Lane full, request dropped"
                ),
                mpsc::error::TrySendError::Closed(dropped) => warn!(
                    device = %dropped.device,
                    "Lane closed, request dropped"
                ),
            }
        }
    }

    /// Route a field reply (tag already stripped) to its device's lane.
    ///
    /// Replies for devices with no open lane are stray and dropped.
    pub fn deliver_reply(&self, device: &str, payload: Vec<u8>) {
        let lanes = self.lanes.lock().expect("lane map poisoned");
        match lanes.get(device) {
            Some(lane) => {
                let _ = lane.replies.send(payload);
            }
            None => debug!(device = %device, "Stray field reply, no lane open"),
        }
    }
}

async fn run_lane(
    device: String,
    mut requests: mpsc::Receiver<ClientRequest>,
    mut replies: mpsc::UnboundedReceiver<Vec<u8>>,
    link: Arc<dyn BrokerLink>,
    settings: QueueSettings,
) {
    while let Some(mut request) = requests.recv().await {
        // Replies stranded by a previous timed-out exchange must not be
        // matched against this request.
        while replies.try_recv().is_ok() {}

        let mut timed_out = false;

        for index in 0..request.adus.len() {
            let mut payload = Vec::with_capacity(request.adus[index].len() + 1);
            payload.push(TAG_BROKER_ORIGIN);
            payload.extend_from_slice(&request.adus[index]);

            if let Err(e) = link.publish(&request.mbnet_topic(), payload).await {
                error!(device = %device, error = %e, "Failed to post ADU to field");
                break;
            }

            debug!(
                device = %device,
                adu = index,
                of = request.adus.len(),
                "ADU posted, awaiting reply"
            );

            match timeout(settings.request_timeout, replies.recv()).await {
                Ok(Some(buffer)) => request.responses.push(buffer),
                Ok(None) => return,
                Err(_) => {
                    warn!(device = %device, adu = index, "Reply wait timed out");
                    timed_out = true;
                    break;
                }
            }
        }

        publish_response(&link, &request, timed_out).await;
    }
}

async fn publish_response(link: &Arc<dyn BrokerLink>, request: &ClientRequest, timed_out: bool) {
    let record = decoder::finalise(request, timed_out);
    let projected = format::project(&record, &request.original, request.format);

    match serde_json::to_vec(&Value::Object(projected)) {
        Ok(payload) => {
            if let Err(e) = link.publish(&request.response_topic(), payload).await {
                error!(
                    client = %request.client,
                    device = %request.device,
                    error = %e,
                    "Failed to publish response"
                );
            }
        }
        Err(e) => error!(error = %e, "Response record not serialisable"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adu::bufferise;
    use crate::encoder::encode;
    use crate::keywords::Format;
    use crate::request::CanonicalRequest;
    use async_trait::async_trait;
    use serde_json::json;

    /// Captures every publish for inspection
    struct CapturingLink {
        published: mpsc::UnboundedSender<(String, Vec<u8>)>,
    }

    #[async_trait]
    impl BrokerLink for CapturingLink {
        async fn publish(&self, topic: &str, payload: Vec<u8>) -> crate::error::GatewayResult<()> {
            let _ = self.published.send((topic.to_string(), payload));
            Ok(())
        }
    }

    fn make_request(device: &str, canonical: serde_json::Value) -> ClientRequest {
        let canonical = match canonical {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        };
        let request = CanonicalRequest::from_record(&canonical).unwrap();
        let frames = encode(&request).unwrap();
        let adus = frames.iter().map(|f| bufferise(f).unwrap().to_vec()).collect();

        ClientRequest {
            client: "tester".into(),
            device: device.into(),
            format: Format::Terse,
            original: canonical.clone(),
            canonical,
            request,
            frames,
            adus,
            responses: vec![],
        }
    }

    fn capture_channel() -> (Arc<CapturingLink>, mpsc::UnboundedReceiver<(String, Vec<u8>)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(CapturingLink { published: tx }), rx)
    }

    #[tokio::test]
    async fn test_single_request_happy_path() {
        let (link, mut published) = capture_channel();
        let queue = RequestQueue::new(link, QueueSettings::default());

        queue.enqueue(make_request("dev1", json!({"id": 7, "fn": "r", "dt": "ni", "rg": [16, 17]})));

        // First publish is the tagged ADU on mbnet
        let (topic, payload) = published.recv().await.unwrap();
        assert_eq!(topic, "tester/dev1/mbnet");
        assert_eq!(payload[0], TAG_BROKER_ORIGIN);
        assert_eq!(&payload[1..], &[0x07, 0x04, 0x00, 0x10, 0x00, 0x02]);

        // Feed the reply
        queue.deliver_reply("dev1", vec![0x07, 0x04, 0x04, 0x00, 0x01, 0x00, 0x02]);

        let (topic, payload) = published.recv().await.unwrap();
        assert_eq!(topic, "tester/dev1/response");
        let record: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(record["st"], json!(true));
        assert_eq!(record["fd"], json!([1, 2]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_publishes_timed_out_response() {
        let (link, mut published) = capture_channel();
        let queue = RequestQueue::new(link, QueueSettings::default());

        queue.enqueue(make_request("dev1", json!({"id": 1, "fn": "r", "dt": "bi", "ls": [0, 5]})));

        // Two frames compiled; the first ADU goes out, no reply ever comes
        let (topic, _) = published.recv().await.unwrap();
        assert_eq!(topic, "tester/dev1/mbnet");

        // Paused time fast-forwards through the 3s wait
        let (topic, payload) = published.recv().await.unwrap();
        assert_eq!(topic, "tester/dev1/response");
        let record: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(record["st"], json!(false));
        assert_eq!(record["msg"], json!(decoder::MSG_TIMED_OUT));
        // Remaining ADUs were skipped: no second mbnet publish before the response
    }

    #[tokio::test]
    async fn test_responses_in_enqueue_order() {
        let (link, mut published) = capture_channel();
        let queue = RequestQueue::new(link, QueueSettings::default());

        queue.enqueue(make_request("dev1", json!({"id": 1, "fn": "r", "dt": "no", "rg": [0, 1]})));
        queue.enqueue(make_request("dev1", json!({"id": 1, "fn": "r", "dt": "no", "rg": [4, 5]})));

        // Serve both exchanges in order
        for expected_addr in [0u8, 4u8] {
            let (topic, payload) = published.recv().await.unwrap();
            assert_eq!(topic, "tester/dev1/mbnet");
            assert_eq!(payload[4], expected_addr);
            queue.deliver_reply("dev1", vec![0x01, 0x03, 0x04, 0x00, 0x01, 0x00, 0x02]);

            let (topic, payload) = published.recv().await.unwrap();
            assert_eq!(topic, "tester/dev1/response");
            let record: serde_json::Value = serde_json::from_slice(&payload).unwrap();
            assert_eq!(record["st"], json!(true));
        }
    }

    #[tokio::test]
    async fn test_null_sentinel_fails_request() {
        let (link, mut published) = capture_channel();
        let queue = RequestQueue::new(link, QueueSettings::default());

        queue.enqueue(make_request("dev1", json!({"id": 7, "fn": "r", "dt": "ni", "rg": [16, 17]})));
        let _ = published.recv().await.unwrap();
        queue.deliver_reply("dev1", b"Null".to_vec());

        let (_, payload) = published.recv().await.unwrap();
        let record: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(record["st"], json!(false));
        assert_eq!(record["msg"], json!(decoder::MSG_RETRIEVAL_ERROR));
    }

    #[tokio::test]
    async fn test_lanes_are_independent_per_device() {
        let (link, mut published) = capture_channel();
        let queue = RequestQueue::new(link, QueueSettings::default());

        queue.enqueue(make_request("devA", json!({"id": 1, "fn": "r", "dt": "no", "rg": [0, 1]})));
        queue.enqueue(make_request("devB", json!({"id": 2, "fn": "r", "dt": "no", "rg": [0, 1]})));

        // Both ADUs go out without waiting on each other
        let mut mbnet_topics = Vec::new();
        for _ in 0..2 {
            let (topic, _) = published.recv().await.unwrap();
            mbnet_topics.push(topic);
        }
        mbnet_topics.sort();
        assert_eq!(mbnet_topics, vec!["tester/devA/mbnet", "tester/devB/mbnet"]);
    }

    #[test]
    fn test_settings_clamp() {
        let settings = QueueSettings {
            capacity: 10,
            request_timeout: Duration::from_secs(60),
        }
        .clamped();
        assert_eq!(settings.request_timeout, Duration::from_millis(MAX_REQUEST_TIMEOUT_MS));
    }
}
