//! Light-push wire protocol
//!
//! One request/response exchange per pushed message, JSON-encoded by the
//! libp2p request-response codec.

use crate::message::MessageEnvelope;
use serde::{Deserialize, Serialize};

/// Stream protocol negotiated for light-push
pub const LIGHTPUSH_PROTOCOL: &str = "/vac/waku/lightpush/2.0.0-beta1";

/// Pubsub topic messages are pushed onto unless configured otherwise
pub const DEFAULT_PUBSUB_TOPIC: &str = "/waku/2/default-waku/proto";

/// Ask a service peer to forward a message into the overlay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushRequest {
    /// Unique request ID
    pub request_id: String,
    pub pubsub_topic: String,
    pub message: MessageEnvelope,
}

impl PushRequest {
    pub fn new(pubsub_topic: impl Into<String>, message: MessageEnvelope) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            pubsub_topic: pubsub_topic.into(),
            message,
        }
    }
}

/// Service peer verdict on a [`PushRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResponse {
    pub request_id: String,
    pub is_success: bool,
    /// Failure reason when `is_success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl PushResponse {
    pub fn accepted(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            is_success: true,
            info: None,
        }
    }

    pub fn rejected(request_id: impl Into<String>, info: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            is_success: false,
            info: Some(info.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ContentTopic;

    #[test]
    fn test_request_ids_are_unique() {
        let topic = ContentTopic::agora("proof").unwrap();
        let msg = MessageEnvelope::new("Hello World", 1, &topic);
        let a = PushRequest::new(DEFAULT_PUBSUB_TOPIC, msg.clone());
        let b = PushRequest::new(DEFAULT_PUBSUB_TOPIC, msg);
        assert_ne!(a.request_id, b.request_id);
        assert_eq!(a.message, b.message);
    }

    #[test]
    fn test_request_json_shape() {
        let topic = ContentTopic::agora("proof").unwrap();
        let req = PushRequest::new(DEFAULT_PUBSUB_TOPIC, MessageEnvelope::new("hi", 1, &topic));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["pubsub_topic"], DEFAULT_PUBSUB_TOPIC);
        assert_eq!(json["message"]["content_topic"], "/agora/1/proof/proto");
        assert_eq!(json["message"]["version"], 1);

        let decoded: PushRequest = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_response_info_only_on_rejection() {
        let ok = serde_json::to_value(PushResponse::accepted("r1")).unwrap();
        assert!(ok.get("info").is_none());

        let rejected: PushResponse =
            serde_json::from_str(r#"{"request_id":"r2","is_success":false,"info":"rate limited"}"#)
                .unwrap();
        assert_eq!(rejected, PushResponse::rejected("r2", "rate limited"));
    }
}
