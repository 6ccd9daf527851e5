//! Message module — what gets published
//!
//! Content topics name the stream a message belongs to, payload sources
//! produce its bytes and the envelope binds both together with a timestamp.

pub mod envelope;
pub mod payload;
pub mod topic;

pub use envelope::{EnvelopeSignature, MessageEnvelope, MessageId};
pub use payload::{PayloadError, PayloadSource, ProofPayload};
pub use topic::{ContentTopic, TopicError, TopicField};
