//! LAN discovery over UDP broadcast
//!
//! One round: send `MAIWARE_SERVER_DISCOVERY` to the broadcast address,
//! collect replies for a short window. Non-empty rounds are cached for a
//! while so repeated resolutions do not flood the LAN.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;

use super::EndpointResolver;
use crate::constants::{
    BROADCAST_CACHE_TTL, BROADCAST_LISTEN_WINDOW, BROADCAST_PORT, DISCOVERY_MESSAGE, DISCOVERY_SERVICE_NAME,
};

const RECV_BUFFER: usize = 2048;

/// One discovery round, returning collector base URLs
#[async_trait]
pub trait DiscoveryTransport: Send + Sync {
    async fn discover(&self) -> Vec<String>;
}

#[derive(Debug, Deserialize)]
struct DiscoveryReply {
    service: String,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    ips: Vec<String>,
}

/// Base URLs advertised by one reply datagram. Anything unexpected yields none.
pub fn parse_discovery_reply(datagram: &[u8]) -> Vec<String> {
    let Ok(reply) = serde_json::from_slice::<DiscoveryReply>(datagram) else {
        return Vec::new();
    };

    match reply.port {
        Some(port) if port != 0 && reply.service == DISCOVERY_SERVICE_NAME => reply
            .ips
            .iter()
            .map(|ip| format!("http://{}:{}", ip, port))
            .collect(),
        _ => Vec::new(),
    }
}

/// Real UDP transport
#[derive(Debug, Clone)]
pub struct UdpDiscovery {
    target: SocketAddr,
    listen_window: Duration,
}

impl Default for UdpDiscovery {
    fn default() -> Self {
        Self {
            target: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, BROADCAST_PORT)),
            listen_window: BROADCAST_LISTEN_WINDOW,
        }
    }
}

impl UdpDiscovery {
    pub fn new(target: SocketAddr, listen_window: Duration) -> Self {
        Self { target, listen_window }
    }

    async fn round(&self) -> std::io::Result<Vec<String>> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_broadcast(true)?;
        socket.send_to(DISCOVERY_MESSAGE.as_bytes(), self.target).await?;

        let deadline = Instant::now() + self.listen_window;
        let mut buf = [0u8; RECV_BUFFER];
        let mut discovered = Vec::new();

        loop {
            match tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
                Ok(Ok((n, _from))) => discovered.extend(parse_discovery_reply(&buf[..n])),
                Ok(Err(e)) => {
                    log::debug!("[Broadcast] Receive error: {}", e);
                    break;
                }
                Err(_) => break,
            }
        }

        Ok(discovered)
    }
}

#[async_trait]
impl DiscoveryTransport for UdpDiscovery {
    async fn discover(&self) -> Vec<String> {
        match self.round().await {
            Ok(found) => found,
            Err(e) => {
                log::debug!("[Broadcast] Discovery failed: {}", e);
                Vec::new()
            }
        }
    }
}

struct CachedRound {
    servers: Vec<String>,
    expires_at: Instant,
}

pub struct BroadcastResolver {
    transport: Box<dyn DiscoveryTransport>,
    ttl: Duration,
    cache: Mutex<Option<CachedRound>>,
}

impl BroadcastResolver {
    pub fn new(transport: Box<dyn DiscoveryTransport>) -> Self {
        Self::with_ttl(transport, BROADCAST_CACHE_TTL)
    }

    pub fn with_ttl(transport: Box<dyn DiscoveryTransport>, ttl: Duration) -> Self {
        Self {
            transport,
            ttl,
            cache: Mutex::new(None),
        }
    }

    fn cached(&self) -> Option<Vec<String>> {
        let cache = self.cache.lock();
        let round = cache.as_ref()?;
        let now = Instant::now();
        if round.servers.is_empty() || now >= round.expires_at {
            return None;
        }

        log::info!(
            "[Broadcast] Using cached discovery: {} server(s) ({}s remaining)",
            round.servers.len(),
            (round.expires_at - now).as_secs()
        );
        Some(round.servers.clone())
    }
}

#[async_trait]
impl EndpointResolver for BroadcastResolver {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    async fn candidates(&self) -> Vec<String> {
        if let Some(servers) = self.cached() {
            return servers;
        }

        log::info!("[Server] Broadcasting for mAIware servers on LAN...");
        let discovered = self.transport.discover().await;

        if discovered.is_empty() {
            log::info!("[Broadcast] No servers found via broadcast");
        } else {
            log::info!(
                "[Broadcast] Discovered {} server(s), caching for {}s",
                discovered.len(),
                self.ttl.as_secs()
            );
            *self.cache.lock() = Some(CachedRound {
                servers: discovered.clone(),
                expires_at: Instant::now() + self.ttl,
            });
        }

        discovered
    }
}
