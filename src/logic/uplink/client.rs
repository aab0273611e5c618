//! Collector API Client
//!
//! Ships scan results and presence heartbeats to the collector the
//! [`ServerLocator`] resolves. Upload failures never reach the caller; an
//! [`UploadOutcome`] says what happened.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::constants::{HEARTBEAT_TIMEOUT, UPLOAD_RETRIES, UPLOAD_TIMEOUT};
use crate::logic::identity::{AgentIdentity, SystemInfo};
use crate::logic::locator::ServerLocator;
use crate::logic::types::ScanResult;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Could not encode request: {0}")]
    Encode(String),
}

/// JSON POST capability. Returns the HTTP status of a completed exchange.
#[async_trait]
pub trait CollectorTransport: Send + Sync {
    async fn post_json(&self, url: &str, body: &serde_json::Value, timeout: Duration) -> Result<u16, TransportError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl CollectorTransport for ReqwestTransport {
    async fn post_json(&self, url: &str, body: &serde_json::Value, timeout: Duration) -> Result<u16, TransportError> {
        let response = self
            .http_client
            .post(url)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Network(e.to_string())
                }
            })?;

        Ok(response.status().as_u16())
    }
}

// Request types

#[derive(Debug, Serialize)]
struct SubmitScanRequest<'a> {
    #[serde(flatten)]
    result: &'a ScanResult,
    agent_id: &'a str,
    #[serde(rename = "systemInfo")]
    system_info: SystemInfo,
}

#[derive(Debug, Serialize)]
struct HeartbeatRequest<'a> {
    agent_id: &'a str,
    #[serde(rename = "systemInfo")]
    system_info: SystemInfo,
    reason: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Delivered { attempts: u32 },
    /// 4xx: the collector refused the payload, not retried
    Rejected { status: u16, attempts: u32 },
    Exhausted { attempts: u32 },
    Unencodable,
}

/// Upload and heartbeat client
pub struct CollectorClient {
    transport: Arc<dyn CollectorTransport>,
    locator: Arc<ServerLocator>,
    identity: AgentIdentity,
    retries: u32,
}

impl CollectorClient {
    pub fn new(transport: Arc<dyn CollectorTransport>, locator: Arc<ServerLocator>, identity: AgentIdentity) -> Self {
        Self {
            transport,
            locator,
            identity,
            retries: UPLOAD_RETRIES,
        }
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    pub fn locator(&self) -> &Arc<ServerLocator> {
        &self.locator
    }

    /// Submit a scan result with bounded retries.
    ///
    /// 2xx stops. 4xx stops without retry. Anything else invalidates the
    /// cached endpoint and backs off `2^attempt` seconds before retrying.
    pub async fn submit_result(&self, result: &ScanResult) -> UploadOutcome {
        let request = SubmitScanRequest {
            result,
            agent_id: &self.identity.agent_id,
            system_info: self.identity.system_info(),
        };

        let body = match serde_json::to_value(&request) {
            Ok(body) => body,
            Err(e) => {
                log::error!("[Server] {}", TransportError::Encode(e.to_string()));
                return UploadOutcome::Unencodable;
            }
        };

        for attempt in 0..self.retries {
            let base_url = self.locator.resolve_base_url().await;
            let endpoint = format!("{}/api/submit-scan", base_url);

            log::info!(
                "[Server] Uploading scan to {} as {} (attempt {}/{})",
                endpoint,
                self.identity.agent_id,
                attempt + 1,
                self.retries
            );

            match self.transport.post_json(&endpoint, &body, UPLOAD_TIMEOUT).await {
                Ok(status) if (200..300).contains(&status) => {
                    log::info!("[Server] Scan result uploaded successfully");
                    return UploadOutcome::Delivered { attempts: attempt + 1 };
                }
                Ok(status) if (400..500).contains(&status) => {
                    log::warn!("[Server] Upload rejected: {}", status);
                    return UploadOutcome::Rejected {
                        status,
                        attempts: attempt + 1,
                    };
                }
                Ok(status) => log::warn!("[Server] Upload failed: {}", status),
                Err(e) => log::warn!("[Server] Failed to upload: {}", e),
            }

            self.locator.invalidate();

            if attempt + 1 < self.retries {
                let backoff = Duration::from_secs(1u64 << attempt);
                log::info!("[Server] Retrying in {}ms...", backoff.as_millis());
                tokio::time::sleep(backoff).await;
            }
        }

        log::error!("[Server] All upload attempts failed. Scan result will be lost.");
        UploadOutcome::Exhausted { attempts: self.retries }
    }

    /// Single best-effort presence update. Returns whether it was accepted.
    pub async fn send_heartbeat(&self, reason: &str) -> bool {
        let request = HeartbeatRequest {
            agent_id: &self.identity.agent_id,
            system_info: self.identity.system_info(),
            reason,
        };

        let body = match serde_json::to_value(&request) {
            Ok(body) => body,
            Err(e) => {
                log::error!("[Heartbeat] {}", TransportError::Encode(e.to_string()));
                return false;
            }
        };

        let base_url = self.locator.resolve_base_url().await;
        let endpoint = format!("{}/api/clients/heartbeat", base_url);

        match self.transport.post_json(&endpoint, &body, HEARTBEAT_TIMEOUT).await {
            Ok(status) if (200..300).contains(&status) => {
                log::info!("[Heartbeat] Client presence updated ({})", reason);
                true
            }
            Ok(status) => {
                log::warn!("[Heartbeat] Failed ({})", status);
                false
            }
            Err(e) => {
                log::warn!("[Heartbeat] Error: {}", e);
                false
            }
        }
    }
}
