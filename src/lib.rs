//! agora-broadcast — one-shot light-push publisher
//!
//! Joins the overlay as a push-only node, builds a content topic and an
//! envelope for a single message, and hands it to a connected service peer.

pub mod config;
pub mod context;
pub mod identity;
pub mod logging;
pub mod message;
pub mod network;
pub mod publisher;

pub use context::{Context, ContextError};
pub use identity::SigningIdentity;
pub use message::{ContentTopic, MessageEnvelope, MessageId, PayloadSource};
pub use network::{NodeConfig, OverlayNode, PublishError};
pub use publisher::{PublishOutcome, Publisher, PublisherError};
