//! Agent Identity
//!
//! Who this agent is on the wire: id, hostname and primary IPv4.
//! Resolved once at startup; env overrides win.

use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use crate::constants;

const LOOPBACK_FALLBACK: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// Routable public address used only to select the outbound interface.
/// Nothing is sent.
const ROUTE_PROBE_ADDR: &str = "8.8.8.8:80";

/// `systemInfo` block attached to uploads and heartbeats
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemInfo {
    pub hostname: String,
    pub ip: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub agent_id: String,
    pub hostname: String,
    pub ip: String,
}

impl AgentIdentity {
    /// Build from environment overrides, falling back to host facts.
    pub fn detect() -> Self {
        let hostname = local_hostname();
        let agent_id = constants::get_agent_id().unwrap_or_else(|| hostname.clone());
        let ip = constants::get_agent_ip().unwrap_or_else(|| primary_ipv4().to_string());

        log::info!("[Identity] agent={} host={} ip={}", agent_id, hostname, ip);

        Self { agent_id, hostname, ip }
    }

    pub fn system_info(&self) -> SystemInfo {
        SystemInfo {
            hostname: self.hostname.clone(),
            ip: self.ip.clone(),
        }
    }

    /// Agent's own IPv4, if it parses as one
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        self.ip.parse().ok()
    }
}

/// Local host name, or "unknown-host" when the OS refuses to tell.
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .map(|h| h.to_string_lossy().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown-host".to_string())
}

/// First non-loopback IPv4 of the outbound interface, else 127.0.0.1.
pub fn primary_ipv4() -> Ipv4Addr {
    outbound_ipv4().unwrap_or(LOOPBACK_FALLBACK)
}

fn outbound_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect(ROUTE_PROBE_ADDR).ok()?;

    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}
