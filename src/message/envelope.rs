//! Message envelope — the unit handed to the light-push protocol

use super::topic::ContentTopic;
use crate::identity::{self, IdentityError, SigningIdentity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Deterministic message identifier (SHA-256 over the envelope content)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId([u8; 32]);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Signature attached by a publisher holding a [`SigningIdentity`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeSignature {
    /// Protobuf-encoded libp2p public key
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Payload plus the metadata the overlay needs to route it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub payload: Vec<u8>,
    pub version: u32,
    pub content_topic: String,
    /// Nanoseconds since the Unix epoch
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<EnvelopeSignature>,
}

impl MessageEnvelope {
    /// Build an envelope stamped with the current wall-clock time
    pub fn new(payload: impl Into<Vec<u8>>, version: u32, topic: &ContentTopic) -> Self {
        Self {
            payload: payload.into(),
            version,
            content_topic: topic.to_string(),
            timestamp: unix_nanos(Utc::now()),
            signature: None,
        }
    }

    /// Identifier of this message on the given pubsub topic.
    ///
    /// Only payload, content topic and timestamp contribute, so the id is the
    /// same whether or not the envelope is signed.
    pub fn message_id(&self, pubsub_topic: &str) -> MessageId {
        let mut hasher = Sha256::new();
        hasher.update(pubsub_topic.as_bytes());
        hasher.update(&self.payload);
        hasher.update(self.content_topic.as_bytes());
        hasher.update(self.timestamp.to_be_bytes());
        MessageId(hasher.finalize().into())
    }

    /// Bytes covered by the envelope signature
    pub fn signing_digest(&self) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(&self.payload);
        hasher.update(self.version.to_be_bytes());
        hasher.update(self.content_topic.as_bytes());
        hasher.update(self.timestamp.to_be_bytes());
        hasher.finalize().to_vec()
    }

    pub fn sign(&mut self, signer: &SigningIdentity) -> Result<(), IdentityError> {
        let signature = signer.sign(&self.signing_digest())?;
        self.signature = Some(EnvelopeSignature {
            public_key: signer.public_key().encode_protobuf(),
            signature,
        });
        Ok(())
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// False when unsigned or when the signature does not match the content
    pub fn verify_signature(&self) -> bool {
        match &self.signature {
            Some(sig) => identity::verify(&sig.public_key, &self.signing_digest(), &sig.signature),
            None => false,
        }
    }

    pub fn timestamp_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.timestamp)
    }
}

fn unix_nanos(now: DateTime<Utc>) -> i64 {
    // Saturates past the year 2262
    now.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::DEFAULT_PUBSUB_TOPIC;

    fn proof_topic() -> ContentTopic {
        ContentTopic::agora("proof").unwrap()
    }

    #[test]
    fn test_build_envelope() {
        let before = unix_nanos(Utc::now());
        let env = MessageEnvelope::new("Hello World", 1, &proof_topic());
        let after = unix_nanos(Utc::now());

        assert_eq!(env.payload, b"Hello World");
        assert_eq!(env.version, 1);
        assert_eq!(env.content_topic, "/agora/1/proof/proto");
        assert!(env.timestamp >= before && env.timestamp <= after);
        assert!(!env.is_signed());
    }

    #[test]
    fn test_deterministic_except_timestamp() {
        let a = MessageEnvelope::new("Hello World", 1, &proof_topic());
        let mut b = MessageEnvelope::new("Hello World", 1, &proof_topic());
        assert_eq!(a.payload, b.payload);
        assert_eq!(a.content_topic, b.content_topic);

        b.timestamp = a.timestamp;
        assert_eq!(a, b);
        assert_eq!(a.message_id(DEFAULT_PUBSUB_TOPIC), b.message_id(DEFAULT_PUBSUB_TOPIC));
    }

    #[test]
    fn test_message_id_depends_on_content() {
        let env = MessageEnvelope::new("Hello World", 1, &proof_topic());
        let mut other = env.clone();
        other.payload = b"Hello There".to_vec();

        let id = env.message_id(DEFAULT_PUBSUB_TOPIC);
        assert_ne!(id, other.message_id(DEFAULT_PUBSUB_TOPIC));
        assert_ne!(id, env.message_id("/waku/2/other/proto"));

        let rendered = id.to_string();
        assert!(rendered.starts_with("0x"));
        assert_eq!(rendered.len(), 66);
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = SigningIdentity::generate();
        let mut env = MessageEnvelope::new("Hello World", 1, &proof_topic());
        let id = env.message_id(DEFAULT_PUBSUB_TOPIC);

        env.sign(&signer).unwrap();
        assert!(env.is_signed());
        assert!(env.verify_signature());
        assert_eq!(env.message_id(DEFAULT_PUBSUB_TOPIC), id);

        env.payload = b"tampered".to_vec();
        assert!(!env.verify_signature());
    }

    #[test]
    fn test_unsigned_wire_form_has_no_signature_field() {
        let env = MessageEnvelope::new("Hello World", 1, &proof_topic());
        let json = serde_json::to_value(&env).unwrap();
        assert!(json.get("signature").is_none());
        assert_eq!(json["content_topic"], "/agora/1/proof/proto");
        assert_eq!(env.timestamp_utc().timestamp_nanos_opt(), Some(env.timestamp));
    }
}
