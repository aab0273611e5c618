//! Event Emitter - Agent → host notifications
//!
//! The agent publishes typed events on a broadcast bus. Any number of
//! listeners (host UI bridge, dashboard publisher, tests) subscribe.

use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::broadcast;

use super::types::{DisassemblyLine, DisassemblyMeta, ScanResult};

/// Default bus capacity
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Everything the agent reports to its host.
///
/// Serializes as `{ "channel": ..., "payload": ... }` using the channel
/// names the desktop shell listens on.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "channel", content = "payload", rename_all = "kebab-case")]
pub enum AgentEvent {
    Ready {
        #[serde(rename = "downloadPath")]
        watch_dir: PathBuf,
    },
    ScanStarted {
        filename: String,
        #[serde(rename = "fullPath")]
        full_path: PathBuf,
        manual: bool,
    },
    #[serde(rename = "scan-disassembly")]
    Disassembly {
        filename: String,
        instructions: Vec<DisassemblyLine>,
        meta: DisassemblyMeta,
    },
    ScanResult(ScanResult),
    ShutdownComplete,
}

impl AgentEvent {
    pub fn channel(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::ScanStarted { .. } => "scan-started",
            Self::Disassembly { .. } => "scan-disassembly",
            Self::ScanResult(_) => "scan-result",
            Self::ShutdownComplete => "shutdown-complete",
        }
    }
}

/// Cloneable handle to the broadcast bus
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AgentEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }

    /// Emit event to all listeners. Having no listener is not an error.
    pub fn emit(&self, event: AgentEvent) {
        let channel = event.channel();
        if self.tx.send(event).is_err() {
            log::debug!("No listeners, event '{}' dropped", channel);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_BUS_CAPACITY)
    }
}
