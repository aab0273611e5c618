//! Static collector candidates: explicit config, local names, /24 sweep

use async_trait::async_trait;
use std::collections::HashSet;
use std::net::Ipv4Addr;

use super::EndpointResolver;
use crate::constants::{DOCKER_HOST_CANDIDATE, GATEWAY_SUFFIXES};

#[derive(Debug, Clone, Default)]
pub struct StaticCandidates {
    pub server_url: Option<String>,
    pub server_host: Option<String>,
    pub port: u16,
    pub hostname: Option<String>,
    pub agent_ip: Option<Ipv4Addr>,
}

impl StaticCandidates {
    /// Candidates in probe order, duplicates removed.
    pub fn list(&self) -> Vec<String> {
        let port = self.port;
        let mut all = Vec::new();

        all.extend(self.server_url.clone());
        all.extend(self.server_host.as_ref().map(|host| format!("http://{}:{}", host, port)));
        all.push(format!("http://localhost:{}", port));
        all.push(format!("http://127.0.0.1:{}", port));
        all.extend(self.hostname.as_ref().map(|host| format!("http://{}:{}", host, port)));
        all.push(DOCKER_HOST_CANDIDATE.to_string());
        if let Some(ip) = self.agent_ip {
            all.extend(gateway_candidates(ip, port));
        }

        unique(all)
    }
}

/// Common host addresses on the agent's /24
pub fn gateway_candidates(ip: Ipv4Addr, port: u16) -> Vec<String> {
    let [a, b, c, _] = ip.octets();
    GATEWAY_SUFFIXES
        .iter()
        .map(|last| format!("http://{}.{}.{}.{}:{}", a, b, c, last, port))
        .collect()
}

/// Drop empties and repeats, keeping first occurrence order
fn unique(list: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    list.into_iter()
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

pub struct StaticCandidatesResolver {
    candidates: StaticCandidates,
}

impl StaticCandidatesResolver {
    pub fn new(candidates: StaticCandidates) -> Self {
        Self { candidates }
    }
}

#[async_trait]
impl EndpointResolver for StaticCandidatesResolver {
    fn name(&self) -> &'static str {
        "candidate sweep"
    }

    async fn candidates(&self) -> Vec<String> {
        let list = self.candidates.list();
        log::info!("[Server] Probing {} candidate endpoints...", list.len());
        list
    }
}
