//! End-to-end pipeline tests through a mock broker link
//!
//! Each test plays both the client and the field agent: requests go in via
//! `Gateway::on_message` on the request topic, outbound ADUs are captured
//! from the mbnet topic, field replies are injected back on mbnet with the
//! field-origin tag, and the final JSON response is read off the response
//! topic.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use mbnet_gateway::{BrokerLink, Gateway, GatewayResult, QueueSettings};

const TAG_BROKER: u8 = 0x00;
const TAG_FIELD: u8 = 0x01;

struct CapturingLink {
    published: mpsc::UnboundedSender<(String, Vec<u8>)>,
}

#[async_trait]
impl BrokerLink for CapturingLink {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> GatewayResult<()> {
        let _ = self.published.send((topic.to_string(), payload));
        Ok(())
    }
}

struct Harness {
    gateway: Gateway,
    published: mpsc::UnboundedReceiver<(String, Vec<u8>)>,
}

impl Harness {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let link = Arc::new(CapturingLink { published: tx });
        Self {
            gateway: Gateway::new(link, QueueSettings::default()),
            published: rx,
        }
    }

    async fn send_request(&self, topic: &str, request: &Value) {
        self.gateway
            .on_message(topic, &serde_json::to_vec(request).unwrap())
            .await;
    }

    /// Next captured publish; panics if none arrives
    async fn next_publish(&mut self) -> (String, Vec<u8>) {
        self.published.recv().await.expect("expected a publish")
    }

    /// Capture one ADU from mbnet and answer it through the field path
    async fn serve_exchange(&mut self, expect_adu: &[u8], reply_body: &[u8]) {
        let (topic, payload) = self.next_publish().await;
        assert!(topic.ends_with("/mbnet"), "expected mbnet publish, got {}", topic);
        assert_eq!(payload[0], TAG_BROKER);
        assert_eq!(&payload[1..], expect_adu, "unexpected outbound ADU");

        let mut reply = vec![TAG_FIELD];
        reply.extend_from_slice(reply_body);
        self.gateway.on_message(&topic, &reply).await;
    }

    async fn next_response(&mut self) -> Value {
        let (topic, payload) = self.next_publish().await;
        assert!(topic.ends_with("/response"), "expected response publish, got {}", topic);
        serde_json::from_slice(&payload).unwrap()
    }
}

#[tokio::test]
async fn scenario_read_holding_registers_range() {
    let mut h = Harness::new();

    h.send_request(
        "hadler.usp/esp1@usp/request",
        &json!({"id": 7, "fn": "r", "dt": "ni", "rg": [16, 25]}),
    )
    .await;

    // Expected outbound ADU (pre-CRC): 07 04 00 10 00 0A
    let mut reply = vec![0x07, 0x04, 0x14];
    for v in 1u16..=10 {
        reply.extend_from_slice(&v.to_be_bytes());
    }
    h.serve_exchange(&[0x07, 0x04, 0x00, 0x10, 0x00, 0x0A], &reply).await;

    let response = h.next_response().await;
    assert_eq!(response["st"], json!(true));
    assert_eq!(response["fd"], json!([1, 2, 3, 4, 5, 6, 7, 8, 9, 10]));
    assert_eq!(response["id"], json!(7));
    assert_eq!(response["rg"], json!([16, 25]));
}

#[tokio::test]
async fn scenario_read_discrete_inputs_list() {
    let mut h = Harness::new();

    h.send_request(
        "hadler.usp/esp1@usp/request",
        &json!({"id": 1, "fn": "r", "dt": "bi", "ls": [0, 1, 5, 7, 8, 9, 15]}),
    )
    .await;

    // Maximal contiguous runs over {0,1,5,7,8,9,15}: [0,2], [5,1], [7,3], [15,1]
    // Inputs: 0=1, 1=0, 5=1, 7=1, 8=0, 9=1, 15=0
    h.serve_exchange(&[0x01, 0x02, 0x00, 0x00, 0x00, 0x02], &[0x01, 0x02, 0x01, 0b01]).await;
    h.serve_exchange(&[0x01, 0x02, 0x00, 0x05, 0x00, 0x01], &[0x01, 0x02, 0x01, 0b1]).await;
    h.serve_exchange(&[0x01, 0x02, 0x00, 0x07, 0x00, 0x03], &[0x01, 0x02, 0x01, 0b101]).await;
    h.serve_exchange(&[0x01, 0x02, 0x00, 0x0F, 0x00, 0x01], &[0x01, 0x02, 0x01, 0b0]).await;

    let response = h.next_response().await;
    assert_eq!(response["st"], json!(true));
    // Seven booleans in the caller's list order
    assert_eq!(
        response["fd"],
        json!([true, false, true, true, false, true, false])
    );
}

#[tokio::test]
async fn scenario_write_coils_list_rejected_unit_id() {
    let mut h = Harness::new();

    h.send_request(
        "hadler.usp/esp1@usp/request",
        &json!({
            "id": 500, "fn": "u", "dt": "bo",
            "ls": [1, 2, 3, 4, 10, 11], "dv": [1, 0, 1, 0, 1, 0]
        }),
    )
    .await;

    // Rejected synchronously: nothing reaches the field
    let response = h.next_response().await;
    assert_eq!(response["st"], json!(false));
    assert!(response["msg"].as_str().unwrap().contains("'id'"));
    // Numeric range error: allowed-values omitted
    assert!(response.get("av").is_none());
    assert!(h.published.try_recv().is_err());
}

#[tokio::test]
async fn scenario_write_registers_verbose_list() {
    let mut h = Harness::new();

    h.send_request(
        "hadler.usp/esp1@usp/request",
        &json!({
            "identifier": 5,
            "function": "write",
            "datatype": "numeric-output",
            "list":   [4, 2, 6, 3, 8, 9, 10, 22, 21, 23],
            "values": [2, 1, 0, 15, 33, 2, 102, 7, 11, 7]
        }),
    )
    .await;

    // Sorted runs 2..4, 6, 8..10, 21..23 with counts 3,1,3,3; each value
    // follows its source address.
    let exchanges: [(&[u8], &[u8]); 4] = [
        (
            // addr 2: values 1, 15, 2
            &[0x05, 0x10, 0x00, 0x02, 0x00, 0x03, 0x06, 0x00, 0x01, 0x00, 0x0F, 0x00, 0x02],
            &[0x05, 0x10, 0x00, 0x02, 0x00, 0x03],
        ),
        (
            // addr 6: value 0
            &[0x05, 0x10, 0x00, 0x06, 0x00, 0x01, 0x02, 0x00, 0x00],
            &[0x05, 0x10, 0x00, 0x06, 0x00, 0x01],
        ),
        (
            // addr 8: values 33, 2, 102
            &[0x05, 0x10, 0x00, 0x08, 0x00, 0x03, 0x06, 0x00, 0x21, 0x00, 0x02, 0x00, 0x66],
            &[0x05, 0x10, 0x00, 0x08, 0x00, 0x03],
        ),
        (
            // addr 21: values 11, 7, 7
            &[0x05, 0x10, 0x00, 0x15, 0x00, 0x03, 0x06, 0x00, 0x0B, 0x00, 0x07, 0x00, 0x07],
            &[0x05, 0x10, 0x00, 0x15, 0x00, 0x03],
        ),
    ];

    for (adu, echo) in exchanges {
        h.serve_exchange(adu, echo).await;
    }

    let response = h.next_response().await;
    // Projected back into the verbose vocabulary, echoing the original record
    assert_eq!(response["status"], json!(true));
    assert_eq!(response["identifier"], json!(5));
    assert_eq!(response["function"], json!("write"));
    assert_eq!(response["list"], json!([4, 2, 6, 3, 8, 9, 10, 22, 21, 23]));
    assert_eq!(response["values"], json!([2, 1, 0, 15, 33, 2, 102, 7, 11, 7]));
    assert!(response.get("st").is_none());
    assert!(response.get("fetched-data").is_none());
}

#[tokio::test]
async fn scenario_diagnosis_return_query_data() {
    let mut h = Harness::new();

    h.send_request(
        "hadler.usp/esp1@usp/request",
        &json!({"id": 22, "fn": "d", "sf": "rqdt"}),
    )
    .await;

    // Emitted ADU: 16 08 00 00 00 00; the slave echoes the query data
    h.serve_exchange(
        &[0x16, 0x08, 0x00, 0x00, 0x00, 0x00],
        &[0x16, 0x08, 0x00, 0x00, 0x00, 0x00],
    )
    .await;

    let response = h.next_response().await;
    assert_eq!(response["st"], json!(true));
    // Data-fetching subfunction: fetched-data of length 1
    assert_eq!(response["fd"].as_array().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn scenario_timeout() {
    let mut h = Harness::new();

    h.send_request(
        "hadler.usp/esp1@usp/request",
        &json!({"id": 7, "fn": "r", "dt": "ni", "rg": [16, 25]}),
    )
    .await;

    // The ADU goes out but no field reply ever arrives; paused time runs
    // through the 3000 ms wait.
    let (topic, _) = h.next_publish().await;
    assert_eq!(topic, "hadler.usp/esp1@usp/mbnet");

    let response = h.next_response().await;
    assert_eq!(response["st"], json!(false));
    assert_eq!(response["msg"], json!("Timed Out"));
    assert!(response.get("fd").is_none());
}

#[tokio::test]
async fn field_failure_sentinel_fails_the_request() {
    let mut h = Harness::new();

    h.send_request(
        "hadler.usp/esp1@usp/request",
        &json!({"id": 7, "fn": "r", "dt": "ni", "rg": [16, 25]}),
    )
    .await;

    h.serve_exchange(&[0x07, 0x04, 0x00, 0x10, 0x00, 0x0A], b"Null").await;

    let response = h.next_response().await;
    assert_eq!(response["st"], json!(false));
    assert_eq!(response["msg"], json!("Error Retrieving Data"));
}

#[tokio::test]
async fn raw_modbus_passthrough() {
    let mut h = Harness::new();

    h.send_request(
        "hadler.usp/esp1@usp/request",
        &json!({"id": 9, "fn": "m", "pk": [3, 0, 1, 0, 2]}),
    )
    .await;

    h.serve_exchange(
        &[0x09, 0x03, 0x00, 0x01, 0x00, 0x02],
        &[0x09, 0x03, 0x04, 0x12, 0x34, 0x56, 0x78],
    )
    .await;

    let response = h.next_response().await;
    assert_eq!(response["st"], json!(true));
    assert_eq!(response["fd"], json!([0x09, 0x03, 0x04, 0x12, 0x34, 0x56, 0x78]));
}

#[tokio::test]
async fn one_response_per_accepted_request_in_order() {
    let mut h = Harness::new();

    for lo in [0u16, 10, 20] {
        h.send_request(
            "hadler.usp/esp1@usp/request",
            &json!({"id": 1, "fn": "r", "dt": "no", "rg": [lo, lo + 1]}),
        )
        .await;
    }

    // Lane serialises: each exchange completes before the next ADU appears
    for lo in [0u8, 10, 20] {
        h.serve_exchange(
            &[0x01, 0x03, 0x00, lo, 0x00, 0x02],
            &[0x01, 0x03, 0x04, 0x00, 0x01, 0x00, 0x02],
        )
        .await;

        let response = h.next_response().await;
        assert_eq!(response["st"], json!(true));
        assert_eq!(response["rg"], json!([lo, lo + 1]));
    }

    assert!(h.published.try_recv().is_err());
}
