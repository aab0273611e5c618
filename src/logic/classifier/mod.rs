//! Classification Dispatcher
//!
//! A model backend classifies PE files; when it cannot, the dispatcher
//! substitutes a demonstration result so the user never sees an empty
//! classification.
//!
//! # Components
//! - `subprocess.rs`: model backend spawned as a child process
//! - `demo.rs`: deterministic-shape demo generator
//! - `normalize.rs`: backend JSON → ScanResult
//! - `catalog.rs`: vendor/signature/sample tables

pub mod catalog;
pub mod demo;
pub mod normalize;
pub mod subprocess;

pub use demo::{random_demo_result, DemoClassifier};
pub use subprocess::SubprocessClassifier;

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use super::types::{file_name_of, Classification, FileHashes, ScanResult};

/// Confidence reported by a fallback outcome
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("AI model not available: {0}")]
    Unavailable(String),

    #[error("AI model execution failed (exit code {0:?})")]
    ExitStatus(Option<i32>),

    #[error("AI model timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid AI response format: {0}")]
    InvalidResponse(String),

    #[error("AI model error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Short label for logs
    fn name(&self) -> &'static str;

    async fn classify(&self, path: &Path, hashes: Option<&FileHashes>) -> Result<ScanResult, ClassifierError>;
}

/// Normalized outcome of asking the primary classifier
#[derive(Debug, Clone, PartialEq)]
pub enum BackendOutcome {
    Classified(ScanResult),
    Fallback {
        classification: Classification,
        confidence_score: f64,
        error: String,
    },
}

impl BackendOutcome {
    fn from_error(error: &ClassifierError) -> Self {
        Self::Fallback {
            classification: Classification::Suspicious,
            confidence_score: FALLBACK_CONFIDENCE,
            error: error.to_string(),
        }
    }
}

/// Primary classifier with a demo fallback
pub struct ClassificationDispatcher {
    primary: Box<dyn Classifier>,
    fallback: Box<dyn Classifier>,
}

impl ClassificationDispatcher {
    pub fn new(primary: Box<dyn Classifier>) -> Self {
        Self::with_fallback(primary, Box::new(DemoClassifier))
    }

    pub fn with_fallback(primary: Box<dyn Classifier>, fallback: Box<dyn Classifier>) -> Self {
        Self { primary, fallback }
    }

    /// Ask the primary classifier, never surfacing its failure.
    pub async fn consult_backend(&self, path: &Path, hashes: Option<&FileHashes>) -> BackendOutcome {
        match self.primary.classify(path, hashes).await {
            Ok(result) => BackendOutcome::Classified(result),
            Err(e) => BackendOutcome::from_error(&e),
        }
    }

    /// Always produces a classified PE result.
    pub async fn classify(&self, path: &Path, hashes: Option<&FileHashes>) -> ScanResult {
        let filename = file_name_of(path);

        let mut result = match self.consult_backend(path, hashes).await {
            BackendOutcome::Classified(result) => {
                log::info!(
                    "[AI] Classification: {} ({:?})",
                    result.classification,
                    result.confidence_score
                );
                result
            }
            BackendOutcome::Fallback { error, .. } => {
                log::warn!("[AI] AI failed ({}), using {} data", error, self.fallback.name());
                let mut demo = match self.fallback.classify(path, hashes).await {
                    Ok(demo) => demo,
                    Err(e) => {
                        log::error!("[AI] Fallback classifier failed: {}", e);
                        random_demo_result(&filename, hashes, true)
                    }
                };
                demo.fallback = true;
                demo.error = Some(error);
                demo
            }
        };

        result.is_pe = true;
        result
    }
}
