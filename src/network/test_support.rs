//! In-process light-push service peer for tests

use super::protocol::{PushRequest, PushResponse, LIGHTPUSH_PROTOCOL};
use futures::StreamExt;
use libp2p::{
    identify, multiaddr::Protocol, noise, request_response, swarm::NetworkBehaviour,
    swarm::SwarmEvent, tcp, yamux, Multiaddr, StreamProtocol, Swarm,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy)]
pub enum ServiceBehaviour {
    Accept,
    Reject(&'static str),
    /// Keep the request open and never answer
    Silent,
}

/// A peer that answers push requests and records what it received
pub struct ServicePeer {
    /// Dialable address including `/p2p/<peer-id>`
    pub address: Multiaddr,
    requests: mpsc::Receiver<PushRequest>,
    task: JoinHandle<()>,
}

impl ServicePeer {
    pub async fn next_request(&mut self) -> Option<PushRequest> {
        tokio::time::timeout(Duration::from_secs(10), self.requests.recv())
            .await
            .ok()
            .flatten()
    }
}

impl Drop for ServicePeer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub async fn spawn_service_peer(behaviour: ServiceBehaviour) -> ServicePeer {
    let mut swarm = libp2p::SwarmBuilder::with_new_identity()
        .with_tokio()
        .with_tcp(
            tcp::Config::default(),
            noise::Config::new,
            yamux::Config::default,
        )
        .unwrap()
        .with_behaviour(|_| {
            request_response::json::Behaviour::<PushRequest, PushResponse>::new(
                [(
                    StreamProtocol::new(LIGHTPUSH_PROTOCOL),
                    request_response::ProtocolSupport::Inbound,
                )],
                request_response::Config::default(),
            )
        })
        .unwrap()
        .with_swarm_config(|c| c.with_idle_connection_timeout(Duration::from_secs(60)))
        .build();
    let address = listen(&mut swarm).await;

    let (tx, requests) = mpsc::channel(16);
    let task = tokio::spawn(async move {
        let mut unanswered = Vec::new();
        loop {
            if let SwarmEvent::Behaviour(request_response::Event::Message {
                message: request_response::Message::Request { request, channel, .. },
                ..
            }) = swarm.select_next_some().await
            {
                let response = match behaviour {
                    ServiceBehaviour::Accept => Some(PushResponse::accepted(&request.request_id)),
                    ServiceBehaviour::Reject(info) => {
                        Some(PushResponse::rejected(&request.request_id, info))
                    }
                    ServiceBehaviour::Silent => None,
                };
                match response {
                    Some(response) => {
                        let _ = swarm.behaviour_mut().send_response(channel, response);
                    }
                    // Dropping the channel would close the stream
                    None => unanswered.push(channel),
                }
                let _ = tx.send(request).await;
            }
        }
    });

    ServicePeer {
        address,
        requests,
        task,
    }
}

/// A peer that accepts connections but does not speak light-push
pub async fn spawn_plain_peer() -> ServicePeer {
    let mut swarm = libp2p::SwarmBuilder::with_new_identity()
        .with_tokio()
        .with_tcp(
            tcp::Config::default(),
            noise::Config::new,
            yamux::Config::default,
        )
        .unwrap()
        .with_behaviour(|key| {
            identify::Behaviour::new(identify::Config::new(
                "/plain/1.0.0".to_string(),
                key.public(),
            ))
        })
        .unwrap()
        .with_swarm_config(|c| c.with_idle_connection_timeout(Duration::from_secs(60)))
        .build();
    let address = listen(&mut swarm).await;

    let (_tx, requests) = mpsc::channel(1);
    let task = tokio::spawn(async move {
        loop {
            swarm.select_next_some().await;
        }
    });

    ServicePeer {
        address,
        requests,
        task,
    }
}

/// Listen on a random loopback port and return the full `/p2p` address
async fn listen<B: NetworkBehaviour>(swarm: &mut Swarm<B>) -> Multiaddr {
    swarm
        .listen_on("/ip4/127.0.0.1/tcp/0".parse().unwrap())
        .unwrap();
    let listen_addr = loop {
        if let SwarmEvent::NewListenAddr { address, .. } = swarm.select_next_some().await {
            break address;
        }
    };
    listen_addr.with(Protocol::P2p(*swarm.local_peer_id()))
}
