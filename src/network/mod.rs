//! Network module — the publisher's presence in the overlay
//!
//! Uses libp2p to join the overlay as a light-push client: the node dials
//! service peers and hands them messages to forward, without relaying
//! anything itself.

mod lightpush;
mod node;
mod protocol;
mod swarm;

#[cfg(test)]
pub(crate) mod test_support;

pub use lightpush::{LightPush, PublishError};
pub use node::{Capabilities, NodeConfig, NodeError, NodeState, OverlayNode, StartError};
pub use protocol::{PushRequest, PushResponse, DEFAULT_PUBSUB_TOPIC, LIGHTPUSH_PROTOCOL};
