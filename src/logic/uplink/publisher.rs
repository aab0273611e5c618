//! Dashboard Event Publisher
//!
//! Optional: forwards every agent event to a dashboard endpoint in
//! batches. A batch goes out when it reaches the batch size or when the
//! flush interval elapses. Failed batches go back to the front of the
//! queue and are retried on the next flush.

use chrono::Utc;
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::constants::{DASHBOARD_BATCH_SIZE, DASHBOARD_FLUSH_INTERVAL, DASHBOARD_TIMEOUT};
use crate::logic::events::AgentEvent;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardEvent {
    pub id: String,
    pub channel: String,
    pub payload: serde_json::Value,
    pub timestamp: String,
    #[serde(rename = "agentId")]
    pub agent_id: String,
}

impl DashboardEvent {
    pub fn from_agent_event(event: &AgentEvent, agent_id: &str) -> Self {
        let payload = match serde_json::to_value(event) {
            Ok(mut value) => value.get_mut("payload").map(serde_json::Value::take).unwrap_or_default(),
            Err(e) => serde_json::json!({ "error": "Unserializable payload", "message": e.to_string() }),
        };

        Self {
            id: Uuid::new_v4().to_string(),
            channel: event.channel().to_string(),
            payload,
            timestamp: Utc::now().to_rfc3339(),
            agent_id: agent_id.to_string(),
        }
    }
}

#[derive(Serialize)]
struct PublishRequest<'a> {
    events: &'a [DashboardEvent],
}

pub struct DashboardPublisher {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    agent_id: String,
    batch_size: usize,
    queue: VecDeque<DashboardEvent>,
}

impl DashboardPublisher {
    pub fn new(http_client: reqwest::Client, endpoint: String, api_key: Option<String>, agent_id: String) -> Self {
        Self {
            http_client,
            endpoint: endpoint.trim().to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            agent_id,
            batch_size: DASHBOARD_BATCH_SIZE,
            queue: VecDeque::new(),
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn enqueue(&mut self, event: &AgentEvent) {
        self.queue.push_back(DashboardEvent::from_agent_event(event, &self.agent_id));
    }

    /// Send everything queued as one batch. On failure the batch is
    /// restored ahead of anything queued meanwhile.
    pub async fn flush(&mut self) -> bool {
        if self.queue.is_empty() {
            return true;
        }

        let batch: Vec<DashboardEvent> = self.queue.drain(..).collect();

        match self.post(&batch).await {
            Ok(()) => {
                log::debug!("[Dashboard] Published {} event(s)", batch.len());
                true
            }
            Err(e) => {
                log::error!("[Dashboard] Failed to publish events: {}", e);
                for event in batch.into_iter().rev() {
                    self.queue.push_front(event);
                }
                false
            }
        }
    }

    async fn post(&self, batch: &[DashboardEvent]) -> Result<(), String> {
        let mut request = self
            .http_client
            .post(&self.endpoint)
            .json(&PublishRequest { events: batch })
            .timeout(DASHBOARD_TIMEOUT);

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("status {}", response.status()))
        }
    }

    /// Consume the event bus until it closes or `ShutdownComplete` passes,
    /// then flush once more.
    pub async fn run(mut self, mut events: broadcast::Receiver<AgentEvent>) {
        log::info!("[Dashboard] Publishing events to {}", self.endpoint);

        let mut ticker = interval_at(Instant::now() + DASHBOARD_FLUSH_INTERVAL, DASHBOARD_FLUSH_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => {
                        let last = matches!(event, AgentEvent::ShutdownComplete);
                        self.enqueue(&event);
                        if last {
                            break;
                        }
                        if self.queue.len() >= self.batch_size {
                            self.flush().await;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("[Dashboard] Dropped {} event(s), publisher lagging", skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = ticker.tick() => {
                    self.flush().await;
                }
            }
        }

        self.flush().await;
        log::info!("[Dashboard] Publisher closed");
    }
}
