//! Directory Watcher
//!
//! Non-recursive watch on the download directory. New regular files are
//! reported to the agent once their size has stopped changing, so a
//! browser still writing a download is not scanned half-written.

use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::queue::AgentCommand;
use crate::constants::{WRITE_STABILITY_POLL, WRITE_STABILITY_THRESHOLD};

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Watch directory does not exist: {0}")]
    MissingDirectory(PathBuf),

    #[error("Watcher error: {0}")]
    Notify(#[from] notify::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct WriteStability {
    pub threshold: Duration,
    pub poll: Duration,
}

impl Default for WriteStability {
    fn default() -> Self {
        Self {
            threshold: WRITE_STABILITY_THRESHOLD,
            poll: WRITE_STABILITY_POLL,
        }
    }
}

/// Dotfiles and partial downloads are never scanned.
pub fn is_ignored(path: &Path) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_lowercase()) else {
        return true;
    };

    name.starts_with('.') || name.ends_with(".tmp") || name.ends_with(".crdownload")
}

/// Path a notify event introduces into the directory, if any
fn arrived_path(event: &Event) -> Option<&PathBuf> {
    match event.kind {
        EventKind::Create(CreateKind::File | CreateKind::Any) => event.paths.first(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both | RenameMode::Any)) => event.paths.last(),
        _ => None,
    }
}

/// Wait until `path` is a regular file whose size held still for the
/// threshold. Returns false if it disappears or stops being a file.
pub async fn wait_for_write_finish(path: &Path, stability: WriteStability) -> bool {
    let mut last_size: Option<u64> = None;
    let mut stable_since = Instant::now();

    loop {
        let size = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => return false,
        };

        if last_size != Some(size) {
            last_size = Some(size);
            stable_since = Instant::now();
        } else if stable_since.elapsed() >= stability.threshold {
            return true;
        }

        tokio::time::sleep(stability.poll).await;
    }
}

pub struct DirectoryWatcher {
    dir: PathBuf,
    watcher: RecommendedWatcher,
    dispatcher: JoinHandle<()>,
}

impl DirectoryWatcher {
    pub fn start(dir: &Path, commands: mpsc::Sender<AgentCommand>, stability: WriteStability) -> Result<Self, WatchError> {
        if !dir.is_dir() {
            return Err(WatchError::MissingDirectory(dir.to_path_buf()));
        }

        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = raw_tx.send(res);
            },
            Config::default(),
        )?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        let dispatcher = tokio::spawn(dispatch_events(raw_rx, commands, stability));

        log::info!("[Monitor] Watching for new files in: {}", dir.display());

        Ok(Self {
            dir: dir.to_path_buf(),
            watcher,
            dispatcher,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stop watching. Files still settling are abandoned.
    pub fn close(mut self) {
        if let Err(e) = self.watcher.unwatch(&self.dir) {
            log::warn!("[Monitor] Failed to close watcher: {}", e);
        }
        self.dispatcher.abort();
        log::info!("[Monitor] File watcher stopped.");
    }
}

async fn dispatch_events(
    mut raw_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    commands: mpsc::Sender<AgentCommand>,
    stability: WriteStability,
) {
    let pending: Arc<Mutex<HashSet<PathBuf>>> = Arc::new(Mutex::new(HashSet::new()));
    let mut settling = tokio::task::JoinSet::new();

    while let Some(res) = raw_rx.recv().await {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                log::warn!("[Monitor] Watch error: {}", e);
                continue;
            }
        };

        let Some(path) = arrived_path(&event).cloned() else {
            continue;
        };

        if is_ignored(&path) || !pending.lock().insert(path.clone()) {
            continue;
        }

        let pending = pending.clone();
        let commands = commands.clone();
        settling.spawn(async move {
            let finished = wait_for_write_finish(&path, stability).await;
            pending.lock().remove(&path);

            if finished && commands.send(AgentCommand::FileDetected(path)).await.is_err() {
                log::debug!("[Monitor] Agent gone, dropping detection");
            }
        });

        while settling.try_join_next().is_some() {}
    }
}
