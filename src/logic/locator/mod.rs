//! Server Locator
//!
//! Finds a reachable collector. Resolution order:
//! 1. Cached in-process resolution
//! 2. Last known good server (`~/.maiware-server.json`)
//! 3. UDP broadcast discovery
//! 4. Static candidates (env, local names, /24 sweep)
//! 5. `http://localhost:{port}` without probing
//!
//! Steps 2-4 only adopt a URL whose `/api/health` answers 2xx.

pub mod broadcast;
pub mod candidates;
pub mod last_known;

pub use broadcast::{BroadcastResolver, DiscoveryTransport, UdpDiscovery};
pub use candidates::{StaticCandidates, StaticCandidatesResolver};
pub use last_known::{LastKnownResolver, LastKnownStore};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::config::AgentConfig;
use super::identity::AgentIdentity;
use crate::constants::HEALTH_PROBE_TIMEOUT;

/// Source of candidate collector base URLs
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    fn name(&self) -> &'static str;

    async fn candidates(&self) -> Vec<String>;
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn is_healthy(&self, base_url: &str) -> bool;
}

/// `GET {base}/api/health` with a short timeout
#[derive(Debug, Clone, Default)]
pub struct HttpHealthProbe {
    http_client: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn is_healthy(&self, base_url: &str) -> bool {
        let url = format!("{}/api/health", strip_trailing_slash(base_url));

        match self.http_client.get(&url).timeout(HEALTH_PROBE_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                log::debug!("[Server] Probe {} failed: {}", url, e);
                false
            }
        }
    }
}

pub fn strip_trailing_slash(url: &str) -> &str {
    url.strip_suffix('/').unwrap_or(url)
}

pub struct ServerLocator {
    resolved: Mutex<Option<String>>,
    last_known: LastKnownStore,
    resolvers: Vec<Box<dyn EndpointResolver>>,
    probe: Box<dyn HealthProbe>,
    fallback_url: String,
}

impl ServerLocator {
    /// Production wiring: last known → broadcast → static candidates
    pub fn new(config: &AgentConfig, identity: &AgentIdentity, http_client: reqwest::Client) -> Self {
        let last_known = LastKnownStore::new(config.last_known_path.clone());

        let statics = StaticCandidates {
            server_url: config.server_url.clone(),
            server_host: config.server_host.clone(),
            port: config.server_port,
            hostname: Some(identity.hostname.clone()),
            agent_ip: identity.ipv4(),
        };

        let resolvers: Vec<Box<dyn EndpointResolver>> = vec![
            Box::new(LastKnownResolver::new(last_known.clone())),
            Box::new(BroadcastResolver::new(Box::new(UdpDiscovery::default()))),
            Box::new(StaticCandidatesResolver::new(statics)),
        ];

        Self::with_parts(
            last_known,
            resolvers,
            Box::new(HttpHealthProbe::new(http_client)),
            config.default_base_url(),
        )
    }

    pub fn with_parts(
        last_known: LastKnownStore,
        resolvers: Vec<Box<dyn EndpointResolver>>,
        probe: Box<dyn HealthProbe>,
        fallback_url: String,
    ) -> Self {
        Self {
            resolved: Mutex::new(None),
            last_known,
            resolvers,
            probe,
            fallback_url,
        }
    }

    /// Current in-process resolution, if any
    pub fn cached(&self) -> Option<String> {
        self.resolved.lock().clone()
    }

    /// Forget the in-process resolution so the next call re-probes.
    pub fn invalidate(&self) {
        if self.resolved.lock().take().is_some() {
            log::debug!("[Server] Cached endpoint invalidated");
        }
    }

    /// Base URL of a collector. Never fails; falls back to localhost.
    pub async fn resolve_base_url(&self) -> String {
        if let Some(url) = self.cached() {
            return url;
        }

        for resolver in &self.resolvers {
            for candidate in resolver.candidates().await {
                if self.probe.is_healthy(&candidate).await {
                    let url = strip_trailing_slash(&candidate).to_string();
                    log::info!("[Server] Selected endpoint {} (via {})", url, resolver.name());
                    self.adopt(&url);
                    self.last_known.save(&url);
                    return url;
                }
            }
        }

        log::warn!("[Server] No collector answered, falling back to {}", self.fallback_url);
        self.adopt(&self.fallback_url);
        self.fallback_url.clone()
    }

    fn adopt(&self, url: &str) {
        *self.resolved.lock() = Some(url.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedResolver {
        name: &'static str,
        list: Vec<String>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EndpointResolver for FixedResolver {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn candidates(&self) -> Vec<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.list.clone()
        }
    }

    struct SetProbe {
        healthy: HashSet<String>,
        probes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl HealthProbe for SetProbe {
        async fn is_healthy(&self, base_url: &str) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst);
            self.healthy.contains(strip_trailing_slash(base_url))
        }
    }

    fn fixed(name: &'static str, list: &[&str]) -> (Box<dyn EndpointResolver>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = FixedResolver {
            name,
            list: list.iter().map(|s| s.to_string()).collect(),
            calls: calls.clone(),
        };
        (Box::new(resolver), calls)
    }

    fn probe(healthy: &[&str]) -> (Box<dyn HealthProbe>, Arc<AtomicUsize>) {
        let probes = Arc::new(AtomicUsize::new(0));
        let probe = SetProbe {
            healthy: healthy.iter().map(|s| s.to_string()).collect(),
            probes: probes.clone(),
        };
        (Box::new(probe), probes)
    }

    #[tokio::test]
    async fn test_first_healthy_candidate_wins_and_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = LastKnownStore::new(Some(dir.path().join("last.json")));
        let (broadcast, _) = fixed("broadcast", &["http://10.0.0.9:3000"]);
        let (statics, _) = fixed("static", &["http://localhost:3000", "http://10.0.0.20:3000/"]);
        let (probe, _) = probe(&["http://10.0.0.20:3000"]);

        let locator = ServerLocator::with_parts(store.clone(), vec![broadcast, statics], probe, "http://localhost:3000".into());

        assert_eq!(locator.resolve_base_url().await, "http://10.0.0.20:3000");
        assert_eq!(store.load().as_deref(), Some("http://10.0.0.20:3000"));
    }

    #[tokio::test]
    async fn test_cached_resolution_skips_probing_until_invalidated() {
        let (statics, calls) = fixed("static", &["http://a:3000"]);
        let (probe, probes) = probe(&["http://a:3000"]);
        let locator = ServerLocator::with_parts(LastKnownStore::disabled(), vec![statics], probe, "http://localhost:3000".into());

        locator.resolve_base_url().await;
        locator.resolve_base_url().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(probes.load(Ordering::SeqCst), 1);

        locator.invalidate();
        assert_eq!(locator.cached(), None);
        locator.resolve_base_url().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_earlier_strategy_short_circuits_later_ones() {
        let (first, _) = fixed("last known", &["http://known:3000"]);
        let (second, second_calls) = fixed("broadcast", &["http://other:3000"]);
        let (probe, _) = probe(&["http://known:3000", "http://other:3000"]);
        let locator = ServerLocator::with_parts(LastKnownStore::disabled(), vec![first, second], probe, "http://localhost:3000".into());

        assert_eq!(locator.resolve_base_url().await, "http://known:3000");
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fallback_is_cached_but_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = LastKnownStore::new(Some(dir.path().join("last.json")));
        let (statics, _) = fixed("static", &["http://a:3000", "http://b:3000"]);
        let (probe, probes) = probe(&[]);
        let locator = ServerLocator::with_parts(store.clone(), vec![statics], probe, "http://localhost:4000".into());

        assert_eq!(locator.resolve_base_url().await, "http://localhost:4000");
        assert_eq!(locator.cached().as_deref(), Some("http://localhost:4000"));
        assert_eq!(probes.load(Ordering::SeqCst), 2);
        assert_eq!(store.load(), None);
    }

    #[tokio::test]
    async fn test_http_probe_against_mock_collector() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let probe = HttpHealthProbe::default();
        assert!(probe.is_healthy(&format!("{}/", server.uri())).await);
    }

    #[tokio::test]
    async fn test_http_probe_rejects_non_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let probe = HttpHealthProbe::default();
        assert!(!probe.is_healthy(&server.uri()).await);
        assert!(!probe.is_healthy("http://127.0.0.1:1").await);
    }

    struct CountingDiscovery {
        servers: Vec<String>,
        rounds: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DiscoveryTransport for CountingDiscovery {
        async fn discover(&self) -> Vec<String> {
            self.rounds.fetch_add(1, Ordering::SeqCst);
            self.servers.clone()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_re_resolution_within_ttl_reuses_broadcast_round() {
        let rounds = Arc::new(AtomicUsize::new(0));
        let discovery = CountingDiscovery {
            servers: vec!["http://10.0.0.7:3000".to_string()],
            rounds: rounds.clone(),
        };
        let broadcast = BroadcastResolver::with_ttl(Box::new(discovery), Duration::from_secs(60));
        let (probe, probes) = probe(&["http://10.0.0.7:3000"]);
        let locator = ServerLocator::with_parts(
            LastKnownStore::disabled(),
            vec![Box::new(broadcast)],
            probe,
            "http://localhost:3000".into(),
        );

        assert_eq!(locator.resolve_base_url().await, "http://10.0.0.7:3000");
        locator.invalidate();
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(locator.resolve_base_url().await, "http://10.0.0.7:3000");

        assert_eq!(rounds.load(Ordering::SeqCst), 1);
        assert_eq!(probes.load(Ordering::SeqCst), 2);

        locator.invalidate();
        tokio::time::advance(Duration::from_secs(31)).await;
        locator.resolve_base_url().await;
        assert_eq!(rounds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_strip_trailing_slash() {
        assert_eq!(strip_trailing_slash("http://a:1/"), "http://a:1");
        assert_eq!(strip_trailing_slash("http://a:1"), "http://a:1");
    }
}
