//! libp2p swarm and its event loop
//!
//! The swarm is built once by the node handle and then moved into a tokio
//! task that:
//! - Tracks which bootstrap peers were reached
//! - Tracks connected peers that can accept light-push requests
//! - Sends push requests and routes their responses back to callers

use super::protocol::{PushRequest, PushResponse, LIGHTPUSH_PROTOCOL};
use futures::StreamExt;
use libp2p::{
    identify, identity::Keypair, noise, request_response, swarm::SwarmEvent, tcp, yamux, PeerId,
    StreamProtocol, Swarm,
};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Identify protocol version announced to peers
const IDENTIFY_PROTOCOL: &str = "/agora-broadcast/1.0.0";

/// Combined behaviour: request-response for light-push + identify for
/// learning which peers serve it
#[derive(libp2p::swarm::NetworkBehaviour)]
pub struct PublisherBehaviour {
    pub lightpush: request_response::json::Behaviour<PushRequest, PushResponse>,
    pub identify: identify::Behaviour,
}

/// Timeouts applied to the swarm
#[derive(Debug, Clone, Copy)]
pub struct SwarmTimeouts {
    pub request: Duration,
    pub idle_connection: Duration,
}

/// Build the swarm with the given identity. Light-push is outbound only:
/// this node never serves pushes for others.
pub fn build_swarm(
    keypair: Keypair,
    timeouts: SwarmTimeouts,
) -> Result<Swarm<PublisherBehaviour>, String> {
    let swarm = libp2p::SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_tcp(
            tcp::Config::default(),
            noise::Config::new,
            yamux::Config::default,
        )
        .map_err(|e| e.to_string())?
        .with_behaviour(|key| {
            let lightpush = request_response::json::Behaviour::new(
                [(
                    StreamProtocol::new(LIGHTPUSH_PROTOCOL),
                    request_response::ProtocolSupport::Outbound,
                )],
                request_response::Config::default().with_request_timeout(timeouts.request),
            );
            let identify = identify::Behaviour::new(identify::Config::new(
                IDENTIFY_PROTOCOL.to_string(),
                key.public(),
            ));
            PublisherBehaviour { lightpush, identify }
        })
        .map_err(|e| e.to_string())?
        .with_swarm_config(|c| c.with_idle_connection_timeout(timeouts.idle_connection))
        .build();
    Ok(swarm)
}

/// Result of waiting for bootstrap dials to settle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapStatus {
    pub configured: usize,
    pub reached: usize,
}

type PushReply = oneshot::Sender<Result<PushResponse, String>>;

/// Commands that can be sent to the swarm task
#[derive(Debug)]
pub enum SwarmCommand {
    /// Reply once a bootstrap peer connected or every dial failed
    AwaitBootstrap {
        reply: oneshot::Sender<BootstrapStatus>,
    },
    /// Connected peers able to take a push request
    LightpushPeers { reply: oneshot::Sender<Vec<PeerId>> },
    /// Send a push request to a peer
    Push {
        peer: PeerId,
        request: PushRequest,
        reply: PushReply,
    },
    /// Stop the swarm
    Shutdown,
}

pub struct EventLoop {
    swarm: Swarm<PublisherBehaviour>,
    cmd_rx: mpsc::Receiver<SwarmCommand>,
    /// Configured bootstrap peers, trusted to serve light-push
    service_peers: HashSet<PeerId>,
    /// Peers that advertised light-push through identify
    advertised: HashSet<PeerId>,
    connected: HashSet<PeerId>,
    pending_bootstrap: HashSet<PeerId>,
    reached_bootstrap: usize,
    bootstrap_waiters: Vec<oneshot::Sender<BootstrapStatus>>,
    pending_pushes: HashMap<request_response::OutboundRequestId, PushReply>,
}

impl EventLoop {
    /// `dialing` holds the bootstrap peers whose dial was accepted by the swarm.
    pub fn new(
        swarm: Swarm<PublisherBehaviour>,
        cmd_rx: mpsc::Receiver<SwarmCommand>,
        service_peers: HashSet<PeerId>,
        dialing: HashSet<PeerId>,
    ) -> Self {
        Self {
            swarm,
            cmd_rx,
            service_peers,
            advertised: HashSet::new(),
            connected: HashSet::new(),
            pending_bootstrap: dialing,
            reached_bootstrap: 0,
            bootstrap_waiters: Vec::new(),
            pending_pushes: HashMap::new(),
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(SwarmCommand::Shutdown) | None => {
                        info!("Swarm shutting down");
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd),
                },
                event = self.swarm.select_next_some() => self.handle_event(event),
            }
        }
        // Dropping the senders fails outstanding waiters with a closed channel
        self.pending_pushes.clear();
        self.bootstrap_waiters.clear();
    }

    fn handle_command(&mut self, cmd: SwarmCommand) {
        match cmd {
            SwarmCommand::AwaitBootstrap { reply } => {
                self.bootstrap_waiters.push(reply);
                self.resolve_bootstrap();
            }
            SwarmCommand::LightpushPeers { reply } => {
                let _ = reply.send(self.lightpush_peers());
            }
            SwarmCommand::Push { peer, request, reply } => {
                debug!("Pushing request {} to {}", request.request_id, peer);
                let id = self
                    .swarm
                    .behaviour_mut()
                    .lightpush
                    .send_request(&peer, request);
                self.pending_pushes.insert(id, reply);
            }
            SwarmCommand::Shutdown => {}
        }
    }

    fn handle_event(&mut self, event: SwarmEvent<PublisherBehaviourEvent>) {
        match event {
            SwarmEvent::Behaviour(PublisherBehaviourEvent::Lightpush(
                request_response::Event::Message {
                    peer,
                    message: request_response::Message::Response { request_id, response },
                    ..
                },
            )) => {
                debug!("Push response from {}: success={}", peer, response.is_success);
                if let Some(reply) = self.pending_pushes.remove(&request_id) {
                    let _ = reply.send(Ok(response));
                }
            }
            SwarmEvent::Behaviour(PublisherBehaviourEvent::Lightpush(
                request_response::Event::OutboundFailure {
                    peer,
                    request_id,
                    error,
                    ..
                },
            )) => {
                warn!("Push to {} failed: {}", peer, error);
                if let Some(reply) = self.pending_pushes.remove(&request_id) {
                    let _ = reply.send(Err(error.to_string()));
                }
            }
            SwarmEvent::Behaviour(PublisherBehaviourEvent::Identify(identify::Event::Received {
                peer_id,
                info,
                ..
            })) => {
                let lightpush = StreamProtocol::new(LIGHTPUSH_PROTOCOL);
                if info.protocols.contains(&lightpush) {
                    debug!("Peer {} advertises light-push", peer_id);
                    self.advertised.insert(peer_id);
                }
            }
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                info!("Connected to peer {}", peer_id);
                self.connected.insert(peer_id);
                if self.pending_bootstrap.remove(&peer_id) {
                    self.reached_bootstrap += 1;
                }
                self.resolve_bootstrap();
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                ..
            } => {
                if num_established == 0 {
                    info!("Disconnected from peer {}", peer_id);
                    self.connected.remove(&peer_id);
                }
            }
            SwarmEvent::OutgoingConnectionError {
                peer_id: Some(peer_id),
                error,
                ..
            } => {
                warn!("Dial to {} failed: {}", peer_id, error);
                if self.pending_bootstrap.remove(&peer_id) {
                    self.resolve_bootstrap();
                }
            }
            SwarmEvent::NewListenAddr { address, .. } => {
                info!("Listening on {}", address);
            }
            _ => {}
        }
    }

    fn lightpush_peers(&self) -> Vec<PeerId> {
        self.connected
            .iter()
            .filter(|p| self.service_peers.contains(p) || self.advertised.contains(p))
            .copied()
            .collect()
    }

    fn resolve_bootstrap(&mut self) {
        if self.reached_bootstrap == 0 && !self.pending_bootstrap.is_empty() {
            return;
        }
        let status = BootstrapStatus {
            configured: self.service_peers.len(),
            reached: self.reached_bootstrap,
        };
        for waiter in self.bootstrap_waiters.drain(..) {
            let _ = waiter.send(status);
        }
    }
}
