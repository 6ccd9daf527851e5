//! Light-push client
//!
//! Hands a single envelope to one connected service peer and waits for its
//! verdict. No retries: a failed push is reported to the caller as-is.

use super::node::{NodeState, OverlayNode};
use super::protocol::PushRequest;
use super::swarm::SwarmCommand;
use crate::context::{Context, ContextError};
use crate::identity::IdentityError;
use crate::message::{MessageEnvelope, MessageId};
use libp2p::PeerId;
use log::{debug, info};
use rand::seq::SliceRandom;
use tokio::sync::oneshot;

/// Light-push errors. None of them is fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("node is {0}, not running")]
    NodeNotRunning(NodeState),

    #[error("no suitable peers available for light-push")]
    NoPeers,

    #[error("failed to sign message: {0}")]
    Signing(#[from] IdentityError),

    #[error("push to {peer} failed: {reason}")]
    Transport { peer: PeerId, reason: String },

    #[error("push rejected by {peer}: {info}")]
    Rejected { peer: PeerId, info: String },

    #[error("publish interrupted: {0}")]
    Cancelled(#[from] ContextError),

    #[error("node stopped while publishing")]
    NodeStopped,
}

/// Light-push capability of an [`OverlayNode`]
pub struct LightPush<'a> {
    node: &'a OverlayNode,
}

impl<'a> LightPush<'a> {
    pub(crate) fn new(node: &'a OverlayNode) -> Self {
        Self { node }
    }

    /// Push `envelope` to one eligible peer.
    ///
    /// The returned id is computed locally; success means a service peer
    /// accepted the message, not that it reached any subscriber.
    pub async fn publish(
        &self,
        ctx: &Context,
        envelope: &MessageEnvelope,
    ) -> Result<MessageId, PublishError> {
        let cmd_tx = self.node.command_sender()?;

        let mut message = envelope.clone();
        if let Some(signer) = self.node.signer() {
            if !message.is_signed() {
                message.sign(signer)?;
            }
        }
        let pubsub_topic = self.node.pubsub_topic();
        let message_id = message.message_id(pubsub_topic);

        let (reply, rx) = oneshot::channel();
        cmd_tx
            .send(SwarmCommand::LightpushPeers { reply })
            .await
            .map_err(|_| PublishError::NodeStopped)?;
        let peers = ctx.run(rx).await?.map_err(|_| PublishError::NodeStopped)?;
        let peer = *peers
            .choose(&mut rand::thread_rng())
            .ok_or(PublishError::NoPeers)?;

        let request = PushRequest::new(pubsub_topic, message);
        debug!(
            "Publishing {} on {} via {} (request {})",
            message_id, pubsub_topic, peer, request.request_id
        );
        let (reply, rx) = oneshot::channel();
        cmd_tx
            .send(SwarmCommand::Push { peer, request, reply })
            .await
            .map_err(|_| PublishError::NodeStopped)?;
        let response = ctx
            .run(rx)
            .await?
            .map_err(|_| PublishError::NodeStopped)?
            .map_err(|reason| PublishError::Transport { peer, reason })?;

        if !response.is_success {
            return Err(PublishError::Rejected {
                peer,
                info: response.info.unwrap_or_else(|| "unknown reason".to_string()),
            });
        }
        info!("Message {} accepted by {}", message_id, peer);
        Ok(message_id)
    }
}
