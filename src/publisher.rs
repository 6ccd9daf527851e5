//! Publisher — one node, one topic, one message
//!
//! Drives `Init → NodeStarting → TopicReady → Publishing → Done`. Node,
//! start and topic failures abort the run; a publish failure is logged and
//! the run still completes. The node is stopped on every path once it has
//! been created.

use crate::config::{ConfigError, PublishFailurePolicy, PublisherConfig};
use crate::context::Context;
use crate::message::{ContentTopic, MessageEnvelope, MessageId, TopicError};
use crate::network::{NodeError, OverlayNode, PublishError, StartError};
use log::{debug, error, info};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherState {
    Init,
    NodeStarting,
    TopicReady,
    Publishing,
    Done,
}

impl fmt::Display for PublisherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PublisherState::Init => "init",
            PublisherState::NodeStarting => "node-starting",
            PublisherState::TopicReady => "topic-ready",
            PublisherState::Publishing => "publishing",
            PublisherState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Fatal publisher errors; each one exits the process with status 1
#[derive(Debug, thiserror::Error)]
pub enum PublisherError {
    #[error("error while creating overlay node: {0}")]
    Node(#[from] NodeError),

    #[error("error while starting overlay node: {0}")]
    Start(#[from] StartError),

    #[error("invalid content topic: {0}")]
    Topic(#[from] TopicError),
}

impl PublisherError {
    /// State the run was in when it failed
    pub fn state(&self) -> PublisherState {
        match self {
            PublisherError::Node(_) => PublisherState::Init,
            PublisherError::Start(_) => PublisherState::NodeStarting,
            PublisherError::Topic(_) => PublisherState::TopicReady,
        }
    }

    pub fn exit_code(&self) -> u8 {
        1
    }
}

/// Result of a run that reached `Done`
#[derive(Debug)]
pub struct PublishOutcome {
    pub content_topic: ContentTopic,
    pub message_id: Option<MessageId>,
    pub error: Option<PublishError>,
    pub policy: PublishFailurePolicy,
}

impl PublishOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn exit_code(&self) -> u8 {
        match (&self.error, self.policy) {
            (Some(_), PublishFailurePolicy::Fail) => 1,
            _ => 0,
        }
    }

    /// The stdout line: the message id, or empty when publishing failed
    pub fn report_line(&self) -> String {
        self.message_id.map(|id| id.to_string()).unwrap_or_default()
    }
}

pub struct Publisher {
    config: PublisherConfig,
    payload: Vec<u8>,
}

impl Publisher {
    /// Validate the configuration and load the payload
    pub fn new(config: PublisherConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let payload = config.payload.resolve().map_err(ConfigError::Payload)?;
        Ok(Self { config, payload })
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub async fn run(&self, ctx: &Context) -> Result<PublishOutcome, PublisherError> {
        let mut node = OverlayNode::create(self.config.node.clone()).map_err(|e| {
            error!(err:% = e; "Exiting: error while loading new overlay node");
            PublisherError::from(e)
        })?;

        let result = self.drive(ctx, &mut node).await;
        node.stop().await;

        if let Err(e) = &result {
            error!(err:% = e, state:% = e.state(); "Exiting: publisher failed");
        }
        result
    }

    async fn drive(
        &self,
        ctx: &Context,
        node: &mut OverlayNode,
    ) -> Result<PublishOutcome, PublisherError> {
        enter(PublisherState::NodeStarting);
        node.start(ctx).await?;

        let topic_config = &self.config.topic;
        let topic = ContentTopic::new(
            topic_config.application.as_str(),
            topic_config.version.as_str(),
            topic_config.function.as_str(),
            topic_config.encoding.as_str(),
        )?;
        enter(PublisherState::TopicReady);

        let envelope =
            MessageEnvelope::new(self.payload.clone(), self.config.protocol_version, &topic);
        enter(PublisherState::Publishing);

        let (message_id, publish_error) = match node.lightpush().publish(ctx, &envelope).await {
            Ok(id) => {
                info!(message_id:% = id, content_topic:% = topic; "Message published");
                (Some(id), None)
            }
            Err(e) => {
                error!(err:% = e, content_topic:% = topic; "Error while pushing message");
                (None, Some(e))
            }
        };
        enter(PublisherState::Done);

        Ok(PublishOutcome {
            content_topic: topic,
            message_id,
            error: publish_error,
            policy: self.config.on_publish_error,
        })
    }
}

fn enter(state: PublisherState) {
    debug!("Publisher entering {}", state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TopicConfig;
    use crate::message::PayloadSource;
    use crate::network::test_support::{spawn_service_peer, ServiceBehaviour};
    use crate::network::{Capabilities, NodeConfig};
    use std::time::Duration;

    fn ctx() -> Context {
        Context::with_timeout(Duration::from_secs(20))
    }

    #[tokio::test]
    async fn test_no_peers_completes_with_exit_zero() {
        let publisher = Publisher::new(PublisherConfig::default()).unwrap();
        let outcome = publisher.run(&ctx()).await.unwrap();

        assert_eq!(outcome.content_topic.to_string(), "/agora/1/proof/proto");
        assert!(matches!(outcome.error, Some(PublishError::NoPeers)));
        assert!(outcome.message_id.is_none());
        assert_eq!(outcome.report_line(), "");
        assert_eq!(outcome.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_fail_policy_turns_publish_error_into_exit_one() {
        let config = PublisherConfig {
            on_publish_error: PublishFailurePolicy::Fail,
            ..Default::default()
        };
        let outcome = Publisher::new(config).unwrap().run(&ctx()).await.unwrap();
        assert!(!outcome.is_success());
        assert_eq!(outcome.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_publish_through_service_peer() {
        let mut service = spawn_service_peer(ServiceBehaviour::Accept).await;
        let config = PublisherConfig {
            node: NodeConfig {
                bootstrap: vec![service.address.to_string()],
                ..NodeConfig::default()
            },
            ..Default::default()
        };
        let outcome = Publisher::new(config).unwrap().run(&ctx()).await.unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.exit_code(), 0);
        let id = outcome.message_id.unwrap();
        assert_eq!(outcome.report_line(), id.to_string());

        let request = service.next_request().await.unwrap();
        assert_eq!(request.message.payload, b"Hello World");
        assert_eq!(request.message.content_topic, "/agora/1/proof/proto");
        assert_eq!(request.message.message_id(&request.pubsub_topic), id);
    }

    #[tokio::test]
    async fn test_invalid_capabilities_abort_before_topic() {
        let config = PublisherConfig {
            node: NodeConfig {
                capabilities: Capabilities { lightpush: false, ..Capabilities::default() },
                ..NodeConfig::default()
            },
            ..Default::default()
        };
        let err = Publisher::new(config).unwrap().run(&ctx()).await.unwrap_err();
        assert!(matches!(err, PublisherError::Node(NodeError::LightpushDisabled)));
        assert_eq!(err.state(), PublisherState::Init);
        assert_eq!(err.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_bootstrap_fails_while_starting() {
        let closed = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = PublisherConfig {
            node: NodeConfig {
                bootstrap: vec![format!(
                    "/ip4/127.0.0.1/tcp/{}/p2p/{}",
                    closed,
                    libp2p::PeerId::random()
                )],
                ..NodeConfig::default()
            },
            ..Default::default()
        };
        let err = Publisher::new(config).unwrap().run(&ctx()).await.unwrap_err();
        assert!(matches!(err, PublisherError::Start(StartError::BootstrapUnreachable { .. })));
        assert_eq!(err.state(), PublisherState::NodeStarting);
        assert_eq!(err.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_invalid_topic_is_fatal() {
        let config = PublisherConfig {
            topic: TopicConfig { function: String::new(), ..TopicConfig::default() },
            ..Default::default()
        };
        let err = Publisher::new(config).unwrap().run(&ctx()).await.unwrap_err();
        assert!(matches!(err, PublisherError::Topic(TopicError::Empty { .. })));
        assert_eq!(err.state(), PublisherState::TopicReady);
    }

    #[tokio::test]
    async fn test_proof_payload_is_encoded() {
        let config = PublisherConfig {
            payload: PayloadSource::Proof("zk-proof".into()),
            ..Default::default()
        };
        let publisher = Publisher::new(config).unwrap();
        assert_eq!(publisher.payload()[0], 0x0a);
        assert_eq!(&publisher.payload()[2..], b"zk-proof");
    }

    #[test]
    fn test_missing_payload_file_is_config_error() {
        let config = PublisherConfig {
            payload: PayloadSource::File("/nonexistent/payload.bin".into()),
            ..Default::default()
        };
        assert!(matches!(Publisher::new(config), Err(ConfigError::Payload(_))));
    }
}
