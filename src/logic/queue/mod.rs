//! Scan Task Queue
//!
//! The agent's single event loop. Owns the FIFO of scan tasks and runs
//! them strictly one at a time through the [`ScanPipeline`], while still
//! accepting commands (new detections, manual scans, flush, shutdown).
//!
//! ```text
//! Detected → Enqueued → Processing → Completed
//! ```
//!
//! Commands arriving while a task is processing only append to the queue.
//! Once shutdown is requested no further task is started; the loop waits
//! (bounded) for the in-flight task, then tears down the heartbeat and
//! watcher and emits `ShutdownComplete`.

#[cfg(test)]
mod tests;

use std::collections::VecDeque;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use super::events::{AgentEvent, EventBus};
use super::pipeline::ScanPipeline;
use super::types::ScanTask;
use super::uplink::HeartbeatHandle;
use super::watcher::DirectoryWatcher;
use crate::constants::SHUTDOWN_WAIT;

const COMMAND_BUFFER: usize = 64;
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

type InFlight = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Debug)]
pub enum AgentCommand {
    /// Watcher saw a new, settled file
    FileDetected(PathBuf),
    /// User asked for a scan
    ScanPath(PathBuf),
    /// Start the next queued task if nothing is processing
    FlushQueue,
    Shutdown { reply: oneshot::Sender<()> },
}

#[derive(Debug, thiserror::Error)]
#[error("Scan agent is no longer running")]
pub struct AgentGone;

/// Cloneable request side of the agent
#[derive(Debug, Clone)]
pub struct AgentHandle {
    tx: mpsc::Sender<AgentCommand>,
}

impl AgentHandle {
    pub fn sender(&self) -> mpsc::Sender<AgentCommand> {
        self.tx.clone()
    }

    pub async fn scan_path(&self, path: impl Into<PathBuf>) -> Result<(), AgentGone> {
        self.tx.send(AgentCommand::ScanPath(path.into())).await.map_err(|_| AgentGone)
    }

    pub async fn flush(&self) -> Result<(), AgentGone> {
        self.tx.send(AgentCommand::FlushQueue).await.map_err(|_| AgentGone)
    }

    /// Request graceful shutdown and wait until it has completed.
    pub async fn shutdown(&self) -> Result<(), AgentGone> {
        let (reply, done) = oneshot::channel();
        self.tx.send(AgentCommand::Shutdown { reply }).await.map_err(|_| AgentGone)?;
        done.await.map_err(|_| AgentGone)
    }
}

struct PendingShutdown {
    deadline: Instant,
    replies: Vec<oneshot::Sender<()>>,
}

pub struct ScanAgent {
    queue: VecDeque<ScanTask>,
    in_flight: Option<InFlight>,
    shutdown: Option<PendingShutdown>,
    shutdown_wait: Duration,
    pipeline: Arc<ScanPipeline>,
    events: EventBus,
    commands: mpsc::Receiver<AgentCommand>,
    watcher: Option<DirectoryWatcher>,
    heartbeat: Option<HeartbeatHandle>,
}

impl ScanAgent {
    pub fn new(pipeline: Arc<ScanPipeline>, events: EventBus) -> (Self, AgentHandle) {
        let (tx, commands) = mpsc::channel(COMMAND_BUFFER);

        let agent = Self {
            queue: VecDeque::new(),
            in_flight: None,
            shutdown: None,
            shutdown_wait: SHUTDOWN_WAIT,
            pipeline,
            events,
            commands,
            watcher: None,
            heartbeat: None,
        };

        (agent, AgentHandle { tx })
    }

    pub fn attach_watcher(&mut self, watcher: DirectoryWatcher) {
        self.watcher = Some(watcher);
    }

    pub fn attach_heartbeat(&mut self, heartbeat: HeartbeatHandle) {
        self.heartbeat = Some(heartbeat);
    }

    pub fn set_shutdown_wait(&mut self, wait: Duration) {
        self.shutdown_wait = wait;
    }

    fn is_processing(&self) -> bool {
        self.in_flight.is_some()
    }

    fn is_idle(&self) -> bool {
        self.queue.is_empty() && !self.is_processing()
    }

    /// Run until shutdown completes or every handle is dropped.
    pub async fn run(mut self) {
        if let Some(watcher) = &self.watcher {
            self.events.emit(AgentEvent::Ready {
                watch_dir: watcher.dir().to_path_buf(),
            });
        }

        let mut commands_closed = false;

        loop {
            if self.shutdown.is_none() {
                self.start_next();
            }

            if let Some(pending) = &self.shutdown {
                if self.is_idle() || Instant::now() >= pending.deadline {
                    break;
                }
            }

            let polling = self.shutdown.is_some();

            tokio::select! {
                _ = poll_in_flight(&mut self.in_flight) => {
                    self.in_flight = None;
                }
                command = self.commands.recv(), if !commands_closed => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        commands_closed = true;
                        log::info!("[Monitor] All agent handles dropped, shutting down.");
                        self.request_shutdown(None);
                    }
                },
                _ = tokio::time::sleep(SHUTDOWN_POLL), if polling => {}
            }
        }

        self.finish_shutdown().await;
    }

    fn handle_command(&mut self, command: AgentCommand) {
        match command {
            AgentCommand::FileDetected(path) => {
                log::info!("[Monitor] Detected new file: {}", path.display());
                self.enqueue(ScanTask::new(path, false));
            }
            AgentCommand::ScanPath(path) => {
                let path = absolute(&path);
                log::info!("[Monitor] Manually queued file: {}", path.display());
                self.enqueue(ScanTask::new(path, true));
            }
            AgentCommand::FlushQueue => {
                if self.shutdown.is_some() {
                    log::debug!("[Monitor] Flush ignored, shutdown in progress ({} queued)", self.queue.len());
                } else {
                    log::debug!("[Monitor] Flush requested ({} queued)", self.queue.len());
                    self.start_next();
                }
            }
            AgentCommand::Shutdown { reply } => self.request_shutdown(Some(reply)),
        }
    }

    fn enqueue(&mut self, task: ScanTask) {
        self.events.emit(AgentEvent::ScanStarted {
            filename: task.detected_filename.clone(),
            full_path: task.path.clone(),
            manual: task.manual,
        });
        self.queue.push_back(task);
    }

    fn start_next(&mut self) {
        if self.is_processing() {
            return;
        }

        if let Some(task) = self.queue.pop_front() {
            let pipeline = self.pipeline.clone();
            self.in_flight = Some(Box::pin(async move {
                pipeline.process(&task).await;
            }));
        }
    }

    fn request_shutdown(&mut self, reply: Option<oneshot::Sender<()>>) {
        match &mut self.shutdown {
            Some(pending) => pending.replies.extend(reply),
            None => {
                log::info!("[Monitor] Shutdown requested.");
                self.shutdown = Some(PendingShutdown {
                    deadline: Instant::now() + self.shutdown_wait,
                    replies: reply.into_iter().collect(),
                });
            }
        }
    }

    async fn finish_shutdown(mut self) {
        if !self.is_idle() {
            log::error!(
                "[Monitor] Shutdown timed out with pending work remaining ({} queued, processing: {}).",
                self.queue.len(),
                self.is_processing()
            );
        }
        self.in_flight = None;

        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.stop().await;
        }

        if let Some(watcher) = self.watcher.take() {
            watcher.close();
        }

        self.events.emit(AgentEvent::ShutdownComplete);

        if let Some(pending) = self.shutdown.take() {
            for reply in pending.replies {
                let _ = reply.send(());
            }
        }
    }
}

async fn poll_in_flight(in_flight: &mut Option<InFlight>) {
    match in_flight {
        Some(task) => task.await,
        None => std::future::pending().await,
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
