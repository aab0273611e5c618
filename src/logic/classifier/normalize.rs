//! Backend response → canonical ScanResult mapping

use reqwest::Url;
use serde::Deserialize;
use std::path::Path;

use super::catalog::{signature, vendor};
use super::ClassifierError;
use crate::logic::types::{
    file_name_of, null_as_default, AiVoting, Classification, FileHashes, KeyFindings, PeMetadata, ScanResult, SectionEntropy,
};

/// Successful model output (see predict_single.py)
#[derive(Debug, Clone, Deserialize)]
pub struct BackendResponse {
    pub classification: String,
    pub confidence_score: f64,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub packer_detected: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub section_entropy: Vec<SectionEntropy>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub api_imports: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub key_strings: Vec<String>,
    #[serde(default)]
    pub votes_benign: Option<u32>,
    #[serde(default)]
    pub votes_malware: Option<u32>,
    #[serde(default)]
    pub ensemble_label: Option<i64>,
    #[serde(default)]
    pub ensemble_score: Option<f64>,
    #[serde(default)]
    pub ensemble_class: Option<String>,
    #[serde(default)]
    pub ensemble_class_id: Option<i64>,
    #[serde(default)]
    pub pe_features: Option<PeMetadata>,
    #[serde(default)]
    pub cfg_image: Option<String>,
}

/// Parse raw backend stdout. An `error` field wins over everything else.
pub fn parse_backend_output(stdout: &str) -> Result<BackendResponse, ClassifierError> {
    let value: serde_json::Value =
        serde_json::from_str(stdout.trim()).map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;

    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        let message = error.as_str().map(str::to_string).unwrap_or_else(|| error.to_string());
        return Err(ClassifierError::Backend(message));
    }

    serde_json::from_value(value).map_err(|e| ClassifierError::InvalidResponse(e.to_string()))
}

/// Display vendor index for a label.
///
/// Cosmetic only: keyed on the label, not on any evidence in the file.
fn vendor_index(classification: Classification) -> usize {
    match classification {
        Classification::Malware => 6,
        Classification::Benign => 2,
        Classification::Suspicious => 15,
    }
}

/// Display signature index for a label. Cosmetic, like [`vendor_index`].
fn signature_index(classification: Classification) -> usize {
    match classification {
        Classification::Malware => 3,
        Classification::Benign | Classification::Suspicious => 4,
    }
}

/// Turn an image reference into something the UI can load directly.
pub fn normalize_cfg_image(image: Option<&str>) -> Option<String> {
    let image = image.filter(|s| !s.is_empty())?;

    if image.starts_with("file://") {
        return Some(image.to_string());
    }

    let path = Path::new(image);
    if path.exists() {
        let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        match Url::from_file_path(&absolute) {
            Ok(url) => return Some(url.to_string()),
            Err(()) => log::warn!("[AI] Unable to normalize CFG image path: {}", absolute.display()),
        }
    }

    Some(image.to_string())
}

/// Build the canonical result from a successful backend response.
pub fn build_scan_result(path: &Path, hashes: Option<&FileHashes>, response: BackendResponse) -> ScanResult {
    let classification = Classification::from_label(&response.classification);

    let mut result = ScanResult::new(&file_name_of(path), hashes.cloned().unwrap_or_default(), classification);
    result.confidence_score = Some(response.confidence_score);
    result.is_pe = true;
    result.vendor = Some(vendor(vendor_index(classification)));
    result.key_findings = Some(KeyFindings {
        file_type: response.file_type.unwrap_or_else(|| "PE Executable".to_string()),
        packer_detected: response.packer_detected.unwrap_or_else(|| "Unknown".to_string()),
        signature: signature(signature_index(classification)),
        section_entropy: response.section_entropy,
        api_imports: response.api_imports,
        key_strings: response.key_strings,
    });

    if let (Some(benign), Some(malware)) = (response.votes_benign, response.votes_malware) {
        result.votes_benign = Some(benign);
        result.votes_malware = Some(malware);
        result.ai_voting = Some(AiVoting {
            benign,
            malware,
            total_models: benign + malware,
        });
    }

    result.ensemble_label = response.ensemble_label;
    result.ensemble_score = response.ensemble_score;
    result.ensemble_class = response.ensemble_class;
    result.ensemble_class_id = response.ensemble_class_id;
    result.pe_metadata = response.pe_features;
    result.cfg_image = normalize_cfg_image(response.cfg_image.as_deref());

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_RESPONSE: &str = r#"{
        "classification": "Malware",
        "confidence_score": 0.91,
        "votes_benign": 2,
        "votes_malware": 11,
        "ensemble_label": 1,
        "ensemble_score": 0.91,
        "ensemble_class": "malware",
        "ensemble_class_id": 2,
        "file_type": "PE32+ executable",
        "packer_detected": "UPX",
        "section_entropy": [{"name": "UPX0", "entropy": 7.9, "size": 4096}],
        "api_imports": ["kernel32.dll!VirtualAlloc"],
        "key_strings": ["http://evil"],
        "pe_features": {
            "file_size": 12345,
            "entropy_total": 7.2,
            "number_of_sections": 3,
            "total_dlls": 4,
            "total_resources": 1,
            "is_packed": true
        }
    }"#;

    #[test]
    fn test_full_response_mapping() {
        let response = parse_backend_output(FULL_RESPONSE).unwrap();
        let hashes = FileHashes { sha256: "s".to_string(), md5: "m".to_string() };
        let result = build_scan_result(Path::new("/tmp/evil.exe"), Some(&hashes), response);

        assert_eq!(result.detected_filename, "evil.exe");
        assert_eq!(result.classification, Classification::Malware);
        assert_eq!(result.confidence_score, Some(0.91));
        assert_eq!(result.vendor.as_ref().unwrap().name, "McAfee");
        assert_eq!(result.ai_voting.unwrap().total_models, 13);
        assert_eq!(result.ensemble_class_id, Some(2));
        assert!(result.pe_metadata.as_ref().unwrap().is_packed);

        let findings = result.key_findings.unwrap();
        assert_eq!(findings.signature.name, "Verified (Unknown Publisher)");
        assert_eq!(findings.packer_detected, "UPX");
        assert_eq!(findings.section_entropy[0].size, Some(4096));
        assert!(result.is_pe);
        assert!(!result.fallback);
    }

    #[test]
    fn test_minimal_response_defaults() {
        let response = parse_backend_output(r#"{"classification": "benign", "confidence_score": 0.2}"#).unwrap();
        let result = build_scan_result(Path::new("ok.exe"), None, response);

        assert_eq!(result.classification, Classification::Benign);
        assert_eq!(result.vendor.unwrap().name, "Microsoft");
        assert!(result.ai_voting.is_none());
        let findings = result.key_findings.unwrap();
        assert_eq!(findings.file_type, "PE Executable");
        assert_eq!(findings.packer_detected, "Unknown");
        assert_eq!(findings.signature.name, "Not Signed");
    }

    #[test]
    fn test_null_fields_are_tolerated() {
        let response = parse_backend_output(
            r#"{
                "classification": "Suspicious",
                "confidence_score": 0.6,
                "section_entropy": null,
                "key_strings": null,
                "pe_features": {"file_size": 2048, "entropy_total": null, "number_of_sections": null, "is_packed": null}
            }"#,
        )
        .unwrap();
        let result = build_scan_result(Path::new("odd.exe"), None, response);

        let metadata = result.pe_metadata.unwrap();
        assert_eq!(metadata.file_size, 2048);
        assert_eq!(metadata.entropy_total, 0.0);
        assert_eq!(metadata.number_of_sections, 0);
        assert!(!metadata.is_packed);
        assert!(result.key_findings.unwrap().key_strings.is_empty());
        assert!(!result.fallback);
    }

    #[test]
    fn test_error_field_is_backend_error() {
        let err = parse_backend_output(r#"{"error": "Failed to extract features", "classification": "Suspicious", "confidence_score": 0.5}"#)
            .unwrap_err();
        assert!(matches!(err, ClassifierError::Backend(ref m) if m == "Failed to extract features"));
    }

    #[test]
    fn test_garbage_is_invalid_response() {
        assert!(matches!(parse_backend_output("Traceback (most recent call last)"), Err(ClassifierError::InvalidResponse(_))));
        assert!(matches!(parse_backend_output(r#"{"confidence_score": 0.5}"#), Err(ClassifierError::InvalidResponse(_))));
    }

    #[test]
    fn test_cfg_image_normalization() {
        assert_eq!(normalize_cfg_image(None), None);
        assert_eq!(normalize_cfg_image(Some("")), None);
        assert_eq!(normalize_cfg_image(Some("file:///tmp/cfg.png")).as_deref(), Some("file:///tmp/cfg.png"));
        assert_eq!(normalize_cfg_image(Some("no/such/cfg.png")).as_deref(), Some("no/such/cfg.png"));

        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("cfg.png");
        std::fs::write(&image, b"png").unwrap();
        let normalized = normalize_cfg_image(image.to_str()).unwrap();
        assert!(normalized.starts_with("file://"));
        assert!(normalized.ends_with("cfg.png"));
    }
}
