//! Heartbeat Loop
//!
//! Background task: "startup" heartbeat immediately, then "interval" on a
//! fixed period until stopped.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::client::CollectorClient;

pub struct HeartbeatHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    /// Signal the loop and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            log::warn!("[Heartbeat] Loop ended abnormally: {}", e);
        }
    }
}

/// Start the heartbeat background loop
pub fn spawn_heartbeat_loop(client: Arc<CollectorClient>, period: Duration) -> HeartbeatHandle {
    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(run_heartbeat_loop(client, period, stop_rx));
    HeartbeatHandle { stop_tx, task }
}

async fn run_heartbeat_loop(client: Arc<CollectorClient>, period: Duration, mut stop_rx: watch::Receiver<bool>) {
    log::info!("[Heartbeat] Starting loop (every {}s)", period.as_secs());

    client.send_heartbeat("startup").await;

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                client.send_heartbeat("interval").await;
            }
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }

    log::info!("[Heartbeat] Loop stopped");
}
