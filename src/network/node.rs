//! OverlayNode — the publisher's handle into the overlay
//!
//! Lifecycle: `create` (identity, swarm, listen socket) → `start` (event
//! loop, bootstrap dials) → publish through [`OverlayNode::lightpush`] →
//! `stop`. The node only ever acts as a light-push client.

use super::lightpush::{LightPush, PublishError};
use super::protocol::DEFAULT_PUBSUB_TOPIC;
use super::swarm::{build_swarm, EventLoop, PublisherBehaviour, SwarmCommand, SwarmTimeouts};
use crate::context::{Context, ContextError};
use crate::identity::{IdentityError, SigningIdentity};
use libp2p::multiaddr::Protocol;
use libp2p::swarm::dial_opts::DialOpts;
use libp2p::{identity::Keypair, Multiaddr, PeerId, Swarm};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Protocols the node takes part in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub lightpush: bool,
    pub relay: bool,
    pub store: bool,
    pub filter: bool,
}

impl Capabilities {
    /// Push-only: no relay, store or filter participation
    pub fn lightpush_only() -> Self {
        Self {
            lightpush: true,
            relay: false,
            store: false,
            filter: false,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::lightpush_only()
    }
}

/// Configuration for an overlay node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub capabilities: Capabilities,
    /// Port to listen on (0 = random)
    pub listen_port: u16,
    /// Service peers as multiaddrs ending in `/p2p/<peer-id>`
    pub bootstrap: Vec<String>,
    pub pubsub_topic: String,
    /// Hex-encoded ed25519 secret; absent means unsigned messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    pub request_timeout_secs: u64,
    pub idle_connection_timeout_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            capabilities: Capabilities::default(),
            listen_port: 0,
            bootstrap: Vec::new(),
            pubsub_topic: DEFAULT_PUBSUB_TOPIC.to_string(),
            private_key: None,
            request_timeout_secs: 10,
            idle_connection_timeout_secs: 60,
        }
    }
}

/// Node construction errors
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("light-push capability must be enabled")]
    LightpushDisabled,

    #[error("{0} capability is not supported by a publish-only node")]
    UnsupportedCapability(&'static str),

    #[error("invalid bootstrap address '{addr}': {reason}")]
    InvalidBootstrap { addr: String, reason: String },

    #[error("pubsub topic must not be empty")]
    EmptyPubsubTopic,

    #[error("invalid private key: {0}")]
    Identity(#[from] IdentityError),

    #[error("failed to build swarm: {0}")]
    Swarm(String),

    #[error("failed to listen on {addr}: {reason}")]
    Listen { addr: String, reason: String },
}

/// Node start errors
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("node cannot be started from state {0}")]
    InvalidState(NodeState),

    #[error("none of the {configured} bootstrap peers could be reached")]
    BootstrapUnreachable { configured: usize },

    #[error("start interrupted: {0}")]
    Cancelled(#[from] ContextError),

    #[error("swarm task exited during start")]
    SwarmExited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Unstarted,
    Running,
    Stopped,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeState::Unstarted => "unstarted",
            NodeState::Running => "running",
            NodeState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// A publish-only node in the overlay
pub struct OverlayNode {
    config: NodeConfig,
    state: NodeState,
    peer_id: PeerId,
    signer: Option<SigningIdentity>,
    bootstrap: Vec<(PeerId, Multiaddr)>,
    /// Held between create and start
    swarm: Option<Swarm<PublisherBehaviour>>,
    cmd_tx: Option<mpsc::Sender<SwarmCommand>>,
    task: Option<JoinHandle<()>>,
}

impl OverlayNode {
    /// Validate the configuration, build the swarm and bind the listen socket.
    ///
    /// Must be called from within a tokio runtime.
    pub fn create(config: NodeConfig) -> Result<Self, NodeError> {
        validate_capabilities(&config.capabilities)?;
        if config.pubsub_topic.is_empty() {
            return Err(NodeError::EmptyPubsubTopic);
        }
        let bootstrap = config
            .bootstrap
            .iter()
            .map(|addr| parse_bootstrap(addr))
            .collect::<Result<Vec<_>, _>>()?;

        let signer = config
            .private_key
            .as_deref()
            .map(SigningIdentity::from_secret_hex)
            .transpose()?;
        let keypair = match &signer {
            Some(identity) => identity.keypair().clone(),
            None => Keypair::generate_ed25519(),
        };

        let timeouts = SwarmTimeouts {
            request: Duration::from_secs(config.request_timeout_secs),
            idle_connection: Duration::from_secs(config.idle_connection_timeout_secs),
        };
        let mut swarm = build_swarm(keypair, timeouts).map_err(NodeError::Swarm)?;

        let listen_addr = format!("/ip4/0.0.0.0/tcp/{}", config.listen_port);
        let listen: Multiaddr = listen_addr.parse().map_err(|e: libp2p::multiaddr::Error| {
            NodeError::Listen {
                addr: listen_addr.clone(),
                reason: e.to_string(),
            }
        })?;
        swarm.listen_on(listen).map_err(|e| NodeError::Listen {
            addr: listen_addr.clone(),
            reason: e.to_string(),
        })?;

        let peer_id = *swarm.local_peer_id();
        info!(
            "Created overlay node peer_id={} signed={} bootstrap={}",
            peer_id,
            signer.is_some(),
            bootstrap.len()
        );

        Ok(Self {
            config,
            state: NodeState::Unstarted,
            peer_id,
            signer,
            bootstrap,
            swarm: Some(swarm),
            cmd_tx: None,
            task: None,
        })
    }

    /// Spawn the event loop and dial bootstrap peers.
    ///
    /// With bootstrap peers configured, waits until at least one connects.
    pub async fn start(&mut self, ctx: &Context) -> Result<(), StartError> {
        if self.state != NodeState::Unstarted {
            return Err(StartError::InvalidState(self.state));
        }
        let mut swarm = self.swarm.take().ok_or(StartError::InvalidState(self.state))?;

        // One dial per peer: the swarm tries every address and reports a
        // single outcome for the peer.
        let service_peers: HashSet<PeerId> = self.bootstrap.iter().map(|(p, _)| *p).collect();
        let mut dialing = HashSet::new();
        for (peer, addrs) in group_by_peer(&self.bootstrap) {
            let opts = DialOpts::peer_id(peer).addresses(addrs).build();
            match swarm.dial(opts) {
                Ok(()) => {
                    dialing.insert(peer);
                }
                Err(e) => warn!("Could not dial bootstrap peer {}: {}", peer, e),
            }
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let event_loop = EventLoop::new(swarm, cmd_rx, service_peers, dialing);
        self.task = Some(tokio::spawn(event_loop.run()));
        self.cmd_tx = Some(cmd_tx.clone());
        self.state = NodeState::Running;

        if self.bootstrap.is_empty() {
            info!("Node {} started without bootstrap peers", self.peer_id);
            return Ok(());
        }

        match await_bootstrap(ctx, &cmd_tx).await {
            Ok(status) if status.reached > 0 => {
                info!(
                    "Node {} started, reached {}/{} bootstrap peers",
                    self.peer_id, status.reached, status.configured
                );
                Ok(())
            }
            Ok(status) => {
                self.stop().await;
                Err(StartError::BootstrapUnreachable {
                    configured: status.configured,
                })
            }
            Err(e) => {
                self.stop().await;
                Err(e)
            }
        }
    }

    /// Shut the event loop down and release the swarm. Safe to call more
    /// than once.
    pub async fn stop(&mut self) {
        match self.state {
            NodeState::Stopped => return,
            NodeState::Unstarted => {
                self.swarm = None;
            }
            NodeState::Running => {
                if let Some(cmd_tx) = self.cmd_tx.take() {
                    let _ = cmd_tx.send(SwarmCommand::Shutdown).await;
                }
                if let Some(task) = self.task.take() {
                    if let Err(e) = task.await {
                        warn!("Swarm task ended abnormally: {}", e);
                    }
                }
            }
        }
        self.state = NodeState::Stopped;
        info!("Node {} stopped", self.peer_id);
    }

    /// The light-push client of this node
    pub fn lightpush(&self) -> LightPush<'_> {
        LightPush::new(self)
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn pubsub_topic(&self) -> &str {
        &self.config.pubsub_topic
    }

    pub fn signer(&self) -> Option<&SigningIdentity> {
        self.signer.as_ref()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Command channel into the running swarm
    pub(crate) fn command_sender(&self) -> Result<&mpsc::Sender<SwarmCommand>, PublishError> {
        match (&self.state, &self.cmd_tx) {
            (NodeState::Running, Some(tx)) => Ok(tx),
            _ => Err(PublishError::NodeNotRunning(self.state)),
        }
    }
}

impl Drop for OverlayNode {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl fmt::Debug for OverlayNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayNode")
            .field("peer_id", &self.peer_id)
            .field("state", &self.state)
            .field("bootstrap", &self.bootstrap.len())
            .finish()
    }
}

async fn await_bootstrap(
    ctx: &Context,
    cmd_tx: &mpsc::Sender<SwarmCommand>,
) -> Result<super::swarm::BootstrapStatus, StartError> {
    let (reply, rx) = oneshot::channel();
    cmd_tx
        .send(SwarmCommand::AwaitBootstrap { reply })
        .await
        .map_err(|_| StartError::SwarmExited)?;
    ctx.run(rx).await?.map_err(|_| StartError::SwarmExited)
}

fn validate_capabilities(caps: &Capabilities) -> Result<(), NodeError> {
    if !caps.lightpush {
        return Err(NodeError::LightpushDisabled);
    }
    if caps.relay {
        return Err(NodeError::UnsupportedCapability("relay"));
    }
    if caps.store {
        return Err(NodeError::UnsupportedCapability("store"));
    }
    if caps.filter {
        return Err(NodeError::UnsupportedCapability("filter"));
    }
    Ok(())
}

/// Parse a bootstrap multiaddr and extract its trailing peer id
fn parse_bootstrap(addr: &str) -> Result<(PeerId, Multiaddr), NodeError> {
    let invalid = |reason: String| NodeError::InvalidBootstrap {
        addr: addr.to_string(),
        reason,
    };
    let multiaddr: Multiaddr = addr
        .parse()
        .map_err(|e: libp2p::multiaddr::Error| invalid(e.to_string()))?;
    match multiaddr.iter().last() {
        Some(Protocol::P2p(peer_id)) => Ok((peer_id, multiaddr)),
        _ => Err(invalid("missing trailing /p2p/<peer-id>".to_string())),
    }
}

/// Collect the addresses of each bootstrap peer, keeping first-seen order
fn group_by_peer(bootstrap: &[(PeerId, Multiaddr)]) -> Vec<(PeerId, Vec<Multiaddr>)> {
    let mut grouped: Vec<(PeerId, Vec<Multiaddr>)> = Vec::new();
    for (peer, addr) in bootstrap {
        match grouped.iter_mut().find(|(p, _)| p == peer) {
            Some((_, addrs)) => addrs.push(addr.clone()),
            None => grouped.push((*peer, vec![addr.clone()])),
        }
    }
    grouped
}
