//! Last-known-good collector record (`~/.maiware-server.json`)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::EndpointResolver;

#[derive(Debug, Serialize, Deserialize)]
struct LastKnownRecord {
    #[serde(rename = "baseUrl")]
    base_url: String,
}

/// JSON file holding the last collector that answered a health probe.
/// Read and write failures are never fatal.
#[derive(Debug, Clone)]
pub struct LastKnownStore {
    file_path: Option<PathBuf>,
}

impl LastKnownStore {
    pub fn new(file_path: Option<PathBuf>) -> Self {
        Self { file_path }
    }

    /// Store that never remembers anything
    pub fn disabled() -> Self {
        Self { file_path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn load(&self) -> Option<String> {
        let path = self.file_path.as_ref()?;
        let content = fs::read_to_string(path).ok()?;

        match serde_json::from_str::<LastKnownRecord>(&content) {
            Ok(record) if !record.base_url.is_empty() => Some(record.base_url),
            Ok(_) => None,
            Err(e) => {
                log::debug!("[Server] Ignoring unreadable {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn save(&self, base_url: &str) {
        let Some(path) = &self.file_path else {
            return;
        };

        let record = LastKnownRecord {
            base_url: base_url.to_string(),
        };

        let result = serde_json::to_string(&record)
            .map_err(|e| e.to_string())
            .and_then(|json| fs::write(path, json).map_err(|e| e.to_string()));

        if let Err(e) = result {
            log::warn!("[Server] Could not persist last known server: {}", e);
        }
    }
}

/// Offers the persisted record as the single candidate
pub struct LastKnownResolver {
    store: LastKnownStore,
}

impl LastKnownResolver {
    pub fn new(store: LastKnownStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EndpointResolver for LastKnownResolver {
    fn name(&self) -> &'static str {
        "last known"
    }

    async fn candidates(&self) -> Vec<String> {
        self.store.load().into_iter().collect()
    }
}
