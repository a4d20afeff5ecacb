//! Frame types for `eth_subscribe` log subscriptions. The listener owns the
//! socket; this module owns the request shape and the parsing, so both are
//! testable without a connection.

use serde::Deserialize;
use serde_json::json;

use titan_core::types::{parse_quantity, RawLogEvent};

/// `eth_subscribe` request for logs emitted by the watched address set.
pub fn subscribe_logs_request(id: u64, addresses: &[String]) -> serde_json::Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "eth_subscribe",
        "params": ["logs", {"address": addresses}],
    })
}

pub fn unsubscribe_request(id: u64, subscription_id: &str) -> serde_json::Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "eth_unsubscribe",
        "params": [subscription_id],
    })
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionResponse {
    pub result: Option<String>,
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionNotification {
    pub params: Option<SubscriptionParams>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionParams {
    pub result: LogEntry,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub transaction_hash: String,
    pub log_index: Option<String>,
    pub block_number: Option<String>,
    #[serde(default)]
    pub removed: bool,
}

impl LogEntry {
    pub fn into_raw_event(self, chain: &str) -> RawLogEvent {
        RawLogEvent {
            chain: chain.to_string(),
            address: self.address.to_lowercase(),
            topics: self.topics.into_iter().map(|t| t.to_lowercase()).collect(),
            data: self.data,
            block_number: self.block_number.as_deref().and_then(parse_quantity),
            tx_hash: self.transaction_hash.to_lowercase(),
            log_index: self.log_index.as_deref().and_then(parse_quantity).unwrap_or(0),
        }
    }
}

/// Classifies one text frame from the socket.
pub enum WsFrame {
    SubscriptionAck(SubscriptionResponse),
    Log(LogEntry),
    Other,
}

pub fn parse_frame(text: &str) -> WsFrame {
    if let Ok(notification) = serde_json::from_str::<SubscriptionNotification>(text) {
        if let Some(params) = notification.params {
            return WsFrame::Log(params.result);
        }
    }
    if let Ok(response) = serde_json::from_str::<SubscriptionResponse>(text) {
        if response.result.is_some() || response.error.is_some() {
            return WsFrame::SubscriptionAck(response);
        }
    }
    WsFrame::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_request_shape() {
        let req = subscribe_logs_request(7, &["0xabc".into()]);
        assert_eq!(req["method"], "eth_subscribe");
        assert_eq!(req["params"][0], "logs");
        assert_eq!(req["params"][1]["address"][0], "0xabc");
    }

    #[test]
    fn log_notification_parses_into_raw_event() {
        let frame = r#"{
            "jsonrpc": "2.0",
            "method": "eth_subscription",
            "params": {
                "subscription": "0xcd0c3e8af590364c09d0fa6a1210faf5",
                "result": {
                    "address": "0xB4e16d0168e52d35CaCD2c6185b44281Ec28C9Dc",
                    "topics": ["0xD78AD95F"],
                    "data": "0x00",
                    "transactionHash": "0xDEAD",
                    "logIndex": "0x2",
                    "blockNumber": "0x10d4f"
                }
            }
        }"#;
        match parse_frame(frame) {
            WsFrame::Log(entry) => {
                assert!(!entry.removed);
                let event = entry.into_raw_event("ethereum");
                assert_eq!(event.address, "0xb4e16d0168e52d35cacd2c6185b44281ec28c9dc");
                assert_eq!(event.log_index, 2);
                assert_eq!(event.block_number, Some(0x10d4f));
                assert_eq!(event.tx_hash, "0xdead");
                assert_eq!(event.topics, vec!["0xd78ad95f"]);
            }
            _ => panic!("expected log frame"),
        }
    }

    #[test]
    fn subscription_ack_parses() {
        let frame = r#"{"jsonrpc":"2.0","id":1,"result":"0xsub"}"#;
        match parse_frame(frame) {
            WsFrame::SubscriptionAck(ack) => assert_eq!(ack.result.as_deref(), Some("0xsub")),
            _ => panic!("expected ack frame"),
        }
    }

    #[test]
    fn junk_frames_classify_as_other() {
        assert!(matches!(parse_frame("{}"), WsFrame::Other));
        assert!(matches!(parse_frame("not json"), WsFrame::Other));
    }
}
