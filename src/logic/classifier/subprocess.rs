//! Model backend invoked as a child process
//!
//! Runs `<program> [args...] <file>` and reads one JSON document from
//! stdout. By default that is `python predict_single.py <file>` inside the
//! model directory.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::normalize::{build_scan_result, parse_backend_output};
use super::{Classifier, ClassifierError};
use crate::constants::CLASSIFIER_TIMEOUT;
use crate::logic::types::{FileHashes, ScanResult};

const PREDICT_SCRIPT: &str = "predict_single.py";

#[derive(Debug, Clone)]
pub struct SubprocessClassifier {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl SubprocessClassifier {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
            timeout: CLASSIFIER_TIMEOUT,
        }
    }

    /// `python predict_single.py` in `model_dir`
    pub fn python_model(python: impl Into<String>, model_dir: impl Into<PathBuf>) -> Self {
        let model_dir = model_dir.into();
        let script = model_dir.join(PREDICT_SCRIPT).to_string_lossy().to_string();
        Self::new(python, vec![script]).with_working_dir(model_dir)
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, path: &Path) -> Result<String, ClassifierError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let child = command
            .spawn()
            .map_err(|e| ClassifierError::Unavailable(format!("{}: {}", self.program, e)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ClassifierError::Timeout(self.timeout))?
            .map_err(|e| ClassifierError::Unavailable(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            log::error!("[AI] Model process error ({}): {}", output.status, stderr.trim());
            return Err(ClassifierError::ExitStatus(output.status.code()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl Classifier for SubprocessClassifier {
    fn name(&self) -> &'static str {
        "model"
    }

    async fn classify(&self, path: &Path, hashes: Option<&FileHashes>) -> Result<ScanResult, ClassifierError> {
        let stdout = self.run(path).await?;

        let response = parse_backend_output(&stdout).map_err(|e| {
            log::debug!("[AI] Raw backend output: {}", stdout.trim());
            e
        })?;

        Ok(build_scan_result(path, hashes, response))
    }
}
