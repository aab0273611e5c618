//! Per-file scan pipeline
//!
//! One task = auxiliary push and scan subtask side by side:
//! delay → hashes → PE probe → (PE) disassembly + classification →
//! emit result → upload to collector.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::classifier::ClassificationDispatcher;
use super::events::{AgentEvent, EventBus};
use super::hashing::compute_file_hashes;
use super::pe::{disassemble_entry_point, is_pe_file, DisassemblySnippet, InstructionDecoder};
use super::types::{FileHashes, ScanResult, ScanTask};
use super::uplink::{AuxPush, CollectorClient};
use crate::constants::FILE_SIZE_THRESHOLD;

pub struct ScanPipeline {
    events: EventBus,
    dispatcher: ClassificationDispatcher,
    decoder: Arc<dyn InstructionDecoder>,
    collector: Arc<CollectorClient>,
    aux_push: AuxPush,
    scan_delay: Duration,
}

impl ScanPipeline {
    pub fn new(
        events: EventBus,
        dispatcher: ClassificationDispatcher,
        decoder: Arc<dyn InstructionDecoder>,
        collector: Arc<CollectorClient>,
        aux_push: AuxPush,
        scan_delay: Duration,
    ) -> Self {
        Self {
            events,
            dispatcher,
            decoder,
            collector,
            aux_push,
            scan_delay,
        }
    }

    /// Run one task to completion. `None` when the file could not be
    /// scanned at all (vanished, or too large).
    pub async fn process(&self, task: &ScanTask) -> Option<ScanResult> {
        log::info!("[Monitor] Processing: {}", task.detected_filename);

        let metadata = match tokio::fs::metadata(&task.path).await {
            Ok(m) => m,
            Err(e) => {
                log::error!("[Monitor] Error processing {}: {}", task.path.display(), e);
                return None;
            }
        };

        if metadata.len() >= FILE_SIZE_THRESHOLD {
            log::info!("[Monitor] File {} is large, skipping server push.", task.detected_filename);
            return None;
        }

        let (_, result) = tokio::join!(
            self.aux_push.push_file(&task.path, &task.detected_filename),
            self.scan(task),
        );

        Some(result)
    }

    async fn scan(&self, task: &ScanTask) -> ScanResult {
        let filename = task.detected_filename.as_str();
        log::info!("[Scan] Scanning for {}...", filename);

        if !self.scan_delay.is_zero() {
            tokio::time::sleep(self.scan_delay).await;
        }

        let hashes = hash_file(&task.path).await;
        let is_pe = probe_pe(&task.path).await;
        log::info!(
            "[PE Detection] {} is {}",
            filename,
            if is_pe { "a PE file" } else { "not a PE file" }
        );

        let result = if is_pe {
            self.scan_pe(&task.path, filename, hashes.as_ref()).await
        } else {
            ScanResult::non_pe(filename, hashes.unwrap_or_default())
        };

        log::info!("[Scan] Scan completed. (Triggered by {})", filename);
        self.events.emit(AgentEvent::ScanResult(result.clone()));

        self.collector.submit_result(&result).await;
        result
    }

    async fn scan_pe(&self, path: &Path, filename: &str, hashes: Option<&FileHashes>) -> ScanResult {
        let snippet = self.disassemble(path).await.filter(|s| !s.instructions.is_empty());

        if let Some(snippet) = &snippet {
            self.events.emit(AgentEvent::Disassembly {
                filename: filename.to_string(),
                instructions: snippet.instructions.clone(),
                meta: snippet.event_meta(),
            });
        }

        log::info!("[AI] Calling AI model for {}...", filename);
        let mut result = self.dispatcher.classify(path, hashes).await;
        result.is_pe = true;

        match snippet {
            Some(snippet) => {
                log::info!("[Disasm] Captured {} instructions from entry point", snippet.instructions.len());
                result.disassembly_meta = Some(snippet.result_meta());
                result.disassembly = Some(snippet.instructions);
            }
            None => log::info!("[Disasm] No disassembly available (empty result)"),
        }

        result
    }

    async fn disassemble(&self, path: &Path) -> Option<DisassemblySnippet> {
        let decoder = self.decoder.clone();
        let path = path.to_path_buf();

        tokio::task::spawn_blocking(move || disassemble_entry_point(&path, decoder.as_ref()))
            .await
            .unwrap_or_else(|e| {
                log::error!("[Disasm] Worker failed: {}", e);
                None
            })
    }
}

async fn hash_file(path: &Path) -> Option<FileHashes> {
    let owned: PathBuf = path.to_path_buf();

    match tokio::task::spawn_blocking(move || compute_file_hashes(&owned)).await {
        Ok(Ok(hashes)) => Some(hashes),
        Ok(Err(e)) => {
            log::error!("[Hash] {}", e);
            None
        }
        Err(e) => {
            log::error!("[Hash] Worker failed: {}", e);
            None
        }
    }
}

/// PE probe. Any failure reads as "not a PE".
async fn probe_pe(path: &Path) -> bool {
    let owned: PathBuf = path.to_path_buf();

    match tokio::task::spawn_blocking(move || is_pe_file(&owned)).await {
        Ok(Ok(is_pe)) => is_pe,
        Ok(Err(e)) => {
            log::warn!("[PE Detection] Failed for {}: {}", path.display(), e);
            false
        }
        Err(e) => {
            log::warn!("[PE Detection] Worker failed: {}", e);
            false
        }
    }
}
