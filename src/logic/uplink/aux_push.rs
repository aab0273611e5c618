//! Raw file push to the local AI app (`POST /scan`, multipart field `file`)
//!
//! Runs beside the scan of the same file and never influences its result.

use reqwest::multipart::{Form, Part};
use std::path::Path;

use crate::constants::AUX_PUSH_TIMEOUT;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Skipped,
    Sent { status: u16 },
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct AuxPush {
    http_client: reqwest::Client,
    endpoint: String,
    enabled: bool,
}

impl AuxPush {
    pub fn new(http_client: reqwest::Client, endpoint: impl Into<String>, enabled: bool) -> Self {
        Self {
            http_client,
            endpoint: endpoint.into(),
            enabled,
        }
    }

    pub async fn push_file(&self, path: &Path, filename: &str) -> PushOutcome {
        if !self.enabled {
            log::info!("[Push] Skipping upload for {} (MAIWARE_SKIP_UPLOAD).", filename);
            return PushOutcome::Skipped;
        }

        log::info!("[Push] Starting upload for {}...", filename);

        match self.send(path, filename).await {
            Ok((status, body)) => {
                log::info!("[Push] AI App Response: {} {}", status, body.trim());
                PushOutcome::Sent { status }
            }
            Err(e) => {
                log::error!("[Push] AI app push failed: {}", e);
                PushOutcome::Failed(e)
            }
        }
    }

    async fn send(&self, path: &Path, filename: &str) -> Result<(u16, String), String> {
        let file = tokio::fs::File::open(path).await.map_err(|e| e.to_string())?;
        let length = file.metadata().await.map_err(|e| e.to_string())?.len();

        let part = Part::stream_with_length(file, length).file_name(filename.to_string());
        let form = Form::new().part("file", part);

        let response = self
            .http_client
            .post(&self.endpoint)
            .multipart(form)
            .timeout(AUX_PUSH_TIMEOUT)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_success() {
            Ok((status.as_u16(), body))
        } else {
            Err(format!("{} {}", status.as_u16(), body.trim()))
        }
    }
}
