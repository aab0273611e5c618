//! Shared scan types
//!
//! Wire shapes follow what the collector and the desktop UI already consume,
//! so field names stay snake_case except where noted.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

/// Treat an explicit `null` like a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// CLASSIFICATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    Benign,
    Suspicious,
    Malware,
}

impl Classification {
    /// Parse a backend label. Unknown labels are treated as Suspicious.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "benign" => Self::Benign,
            "malware" | "malicious" => Self::Malware,
            _ => Self::Suspicious,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Benign => "Benign",
            Self::Suspicious => "Suspicious",
            Self::Malware => "Malware",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// RESULT COMPONENTS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHashes {
    pub sha256: String,
    pub md5: String,
}

impl FileHashes {
    pub fn is_complete(&self) -> bool {
        !self.sha256.is_empty() && !self.md5.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vendor {
    pub name: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub icon: String,
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionEntropy {
    pub name: String,
    pub entropy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyFindings {
    pub file_type: String,
    pub packer_detected: String,
    pub signature: Signature,
    #[serde(default)]
    pub section_entropy: Vec<SectionEntropy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api_imports: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_strings: Vec<String>,
}

/// Ensemble vote split reported by the model backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiVoting {
    pub benign: u32,
    pub malware: u32,
    pub total_models: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeMetadata {
    #[serde(default, deserialize_with = "null_as_default")]
    pub file_size: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub entropy_total: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub number_of_sections: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_dlls: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_resources: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_packed: bool,
}

/// One decoded instruction as shipped to listeners and the collector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisassemblyLine {
    /// `0x`-prefixed lowercase hex
    pub address: String,
    pub mnemonic: String,
    pub op_str: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisassemblyMeta {
    pub arch: String,
    #[serde(rename = "entryRva")]
    pub entry_rva: u32,
    #[serde(rename = "is64", default, skip_serializing_if = "Option::is_none")]
    pub is64: Option<bool>,
}

// ============================================================================
// SCAN RESULT
// ============================================================================

/// Terminal record of one scan task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub detected_filename: String,
    pub file_hashes: FileHashes,
    pub classification: Classification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub malware_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<Vendor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_findings: Option<KeyFindings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub votes_benign: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub votes_malware: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_voting: Option<AiVoting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ensemble_label: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ensemble_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ensemble_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ensemble_class_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pe_metadata: Option<PeMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cfg_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disassembly: Option<Vec<DisassemblyLine>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disassembly_meta: Option<DisassemblyMeta>,
    pub is_pe: bool,
    /// Set when the model backend was unavailable and demo data was substituted
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanResult {
    /// Bare result carrying only identity and a label
    pub fn new(detected_filename: &str, file_hashes: FileHashes, classification: Classification) -> Self {
        Self {
            detected_filename: detected_filename.to_string(),
            file_hashes,
            classification,
            confidence_score: None,
            malware_family: None,
            vendor: None,
            key_findings: None,
            votes_benign: None,
            votes_malware: None,
            ai_voting: None,
            ensemble_label: None,
            ensemble_score: None,
            ensemble_class: None,
            ensemble_class_id: None,
            pe_metadata: None,
            cfg_image: None,
            disassembly: None,
            disassembly_meta: None,
            is_pe: false,
            fallback: false,
            error: None,
        }
    }

    /// Minimal result for anything that is not a PE image
    pub fn non_pe(detected_filename: &str, file_hashes: FileHashes) -> Self {
        Self::new(detected_filename, file_hashes, Classification::Benign)
    }
}

// ============================================================================
// SCAN TASK
// ============================================================================

/// One queued unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTask {
    pub path: PathBuf,
    pub detected_filename: String,
    pub manual: bool,
}

impl ScanTask {
    pub fn new(path: impl Into<PathBuf>, manual: bool) -> Self {
        let path = path.into();
        let detected_filename = file_name_of(&path);
        Self { path, detected_filename, manual }
    }
}

/// Last path component, or the whole path when there is none
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_labels() {
        assert_eq!(Classification::from_label("benign"), Classification::Benign);
        assert_eq!(Classification::from_label("MALWARE"), Classification::Malware);
        assert_eq!(Classification::from_label("suspicious"), Classification::Suspicious);
        assert_eq!(Classification::from_label("weird"), Classification::Suspicious);
    }

    #[test]
    fn test_non_pe_wire_shape() {
        let result = ScanResult::non_pe("notes.txt", FileHashes::default());
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["classification"], "Benign");
        assert_eq!(json["is_pe"], false);
        assert!(json.get("disassembly").is_none());
        assert!(json.get("fallback").is_none());
        assert!(json.get("confidence_score").is_none());
    }

    #[test]
    fn test_scan_task_filename() {
        let task = ScanTask::new("/tmp/downloads/setup.exe", true);
        assert_eq!(task.detected_filename, "setup.exe");
        assert!(task.manual);
    }
}
