//! Demonstration result generator
//!
//! Produces a well-formed ScanResult from a fixed set of sample
//! definitions. Used when the model backend is unavailable so the user
//! always sees a classification.

use async_trait::async_trait;
use rand::Rng;
use std::path::Path;

use super::catalog::{
    signature, vendor, API_SETS, BENIGN_STRINGS, ENTROPY_SECTIONS, FILE_TYPES, MALWARE_FAMILIES, PACKERS,
    SUSPICIOUS_STRINGS,
};
use super::{Classifier, ClassifierError};
use crate::logic::hashing::hash_bytes;
use crate::logic::types::{file_name_of, Classification, FileHashes, KeyFindings, ScanResult, SectionEntropy};
use crate::logic::types::Classification::{Benign, Malware, Suspicious};

/// Index-based sample definition into the catalog tables
struct RawSample {
    name: &'static str,
    class: Classification,
    file_type: usize,
    vendor: usize,
    packer: usize,
    signature: usize,
    api_set: usize,
    strings: &'static [usize],
    family: Option<usize>,
    entropy: &'static [(usize, f64)],
}

const RAW_SAMPLES: &[RawSample] = &[
    // benign
    RawSample { name: "vcredist_x64.exe", class: Benign, file_type: 0, vendor: 2, packer: 0, signature: 0, api_set: 1, strings: &[0], family: None, entropy: &[(0, 6.51), (1, 2.12), (2, 5.89)] },
    RawSample { name: "Notepad++.exe", class: Benign, file_type: 0, vendor: 1, packer: 0, signature: 2, api_set: 0, strings: &[1, 2], family: None, entropy: &[(0, 6.82), (1, 4.15), (2, 5.11)] },
    RawSample { name: "calc.exe", class: Benign, file_type: 0, vendor: 2, packer: 0, signature: 0, api_set: 1, strings: &[3], family: None, entropy: &[(0, 6.01), (1, 1.99), (2, 3.44)] },
    RawSample { name: "kernel32.dll", class: Benign, file_type: 2, vendor: 2, packer: 0, signature: 0, api_set: 0, strings: &[4, 5, 6], family: None, entropy: &[(0, 6.19), (1, 2.78)] },
    RawSample { name: "chrome_installer.exe", class: Benign, file_type: 0, vendor: 0, packer: 0, signature: 1, api_set: 2, strings: &[], family: None, entropy: &[(0, 6.7), (1, 3.5), (2, 4.9)] },
    RawSample { name: "putty.exe", class: Benign, file_type: 0, vendor: 10, packer: 0, signature: 3, api_set: 2, strings: &[7], family: None, entropy: &[(0, 6.2), (1, 2.1)] },
    RawSample { name: "AcroRead.exe", class: Benign, file_type: 0, vendor: 16, packer: 0, signature: 3, api_set: 0, strings: &[], family: None, entropy: &[(0, 6.5), (1, 4.5), (2, 5.5)] },
    RawSample { name: "datasheet.pdf", class: Benign, file_type: 4, vendor: 4, packer: 0, signature: 3, api_set: 0, strings: &[], family: None, entropy: &[] },
    // suspicious
    RawSample { name: "legit_tool_packed.exe", class: Suspicious, file_type: 1, vendor: 3, packer: 1, signature: 4, api_set: 3, strings: &[20, 21], family: None, entropy: &[(3, 7.98), (4, 7.95)] },
    RawSample { name: "downloader_obf.exe", class: Suspicious, file_type: 1, vendor: 14, packer: 5, signature: 4, api_set: 5, strings: &[11, 12], family: None, entropy: &[(0, 7.89), (1, 2.0)] },
    RawSample { name: "patcher.exe", class: Suspicious, file_type: 0, vendor: 8, packer: 0, signature: 4, api_set: 4, strings: &[13, 14, 15], family: None, entropy: &[(0, 6.4), (1, 5.1), (5, 7.2)] },
    RawSample { name: "installer.msi", class: Suspicious, file_type: 3, vendor: 17, packer: 0, signature: 3, api_set: 6, strings: &[16, 17, 18], family: None, entropy: &[] },
    RawSample { name: "license_keygen.exe", class: Suspicious, file_type: 1, vendor: 19, packer: 2, signature: 6, api_set: 4, strings: &[13, 14], family: None, entropy: &[(0, 7.6), (1, 7.5)] },
    RawSample { name: "setup_with_adware.exe", class: Suspicious, file_type: 0, vendor: 11, packer: 0, signature: 3, api_set: 6, strings: &[18], family: None, entropy: &[(0, 6.3), (2, 5.8)] },
    // malware
    RawSample { name: "invoice_8374.exe", class: Malware, file_type: 0, vendor: 5, packer: 0, signature: 4, api_set: 5, strings: &[0, 1], family: Some(0), entropy: &[(0, 6.95), (1, 7.1)] },
    RawSample { name: "svchost.exe", class: Malware, file_type: 1, vendor: 6, packer: 0, signature: 4, api_set: 7, strings: &[2, 3], family: Some(1), entropy: &[(0, 6.88), (1, 4.0)] },
    RawSample { name: "document.dll", class: Malware, file_type: 2, vendor: 7, packer: 0, signature: 4, api_set: 8, strings: &[4, 5, 6, 7], family: Some(2), entropy: &[(0, 7.01), (2, 5.1)] },
    RawSample { name: "update.exe", class: Malware, file_type: 0, vendor: 9, packer: 0, signature: 4, api_set: 6, strings: &[8, 9, 10], family: Some(3), entropy: &[(0, 6.75), (1, 3.1)] },
    RawSample { name: "javaupdate.exe", class: Malware, file_type: 1, vendor: 12, packer: 3, signature: 5, api_set: 9, strings: &[2, 19, 20], family: Some(4), entropy: &[(0, 7.5), (1, 7.4)] },
    RawSample { name: "report.pdf.exe", class: Malware, file_type: 0, vendor: 13, packer: 0, signature: 4, api_set: 10, strings: &[0, 11, 12], family: Some(7), entropy: &[(0, 6.8), (1, 7.2)] },
];

/// Sample used for non-PE demo output (benign document, no sections)
const NON_PE_SAMPLE: usize = 7;

/// Hashes for reports where the real fingerprint could not be computed
fn fake_hashes(filename: &str) -> FileHashes {
    let seed = format!("{}{}", filename, chrono::Utc::now().timestamp_millis());
    hash_bytes(seed.as_bytes())
}

fn build_from_sample(sample: &RawSample, detected_filename: &str, hashes: Option<&FileHashes>, confidence: f64) -> ScanResult {
    let file_hashes = match hashes {
        Some(h) if h.is_complete() => h.clone(),
        _ => fake_hashes(detected_filename),
    };

    let string_table = if sample.class == Benign { BENIGN_STRINGS } else { SUSPICIOUS_STRINGS };
    let key_strings = sample
        .strings
        .iter()
        .filter_map(|&i| string_table.get(i))
        .map(|s| s.to_string())
        .collect();

    let api_imports = API_SETS
        .get(sample.api_set)
        .map(|set| set.iter().map(|s| s.to_string()).collect())
        .unwrap_or_default();

    let section_entropy = sample
        .entropy
        .iter()
        .map(|&(section, value)| SectionEntropy {
            name: ENTROPY_SECTIONS.get(section).unwrap_or(&".text").to_string(),
            entropy: value,
            size: None,
        })
        .collect();

    let mut result = ScanResult::new(detected_filename, file_hashes, sample.class);
    result.malware_family = sample.family.and_then(|i| MALWARE_FAMILIES.get(i)).map(|s| s.to_string());
    result.confidence_score = Some(confidence);
    result.vendor = Some(vendor(sample.vendor));
    result.key_findings = Some(KeyFindings {
        file_type: FILE_TYPES.get(sample.file_type).unwrap_or(&FILE_TYPES[0]).to_string(),
        packer_detected: PACKERS.get(sample.packer).unwrap_or(&PACKERS[0]).to_string(),
        signature: signature(sample.signature),
        section_entropy,
        api_imports,
        key_strings,
    });
    result
}

/// Random confidence in [0.55, 0.99), two decimals
fn random_confidence<R: Rng>(rng: &mut R) -> f64 {
    let raw: f64 = rng.gen_range(0.55..0.99);
    (raw * 100.0).round() / 100.0
}

/// Pick a random demo report for `detected_filename`.
pub fn random_demo_result(detected_filename: &str, hashes: Option<&FileHashes>, is_pe: bool) -> ScanResult {
    let mut rng = rand::thread_rng();
    let sample = if is_pe {
        &RAW_SAMPLES[rng.gen_range(0..RAW_SAMPLES.len())]
    } else {
        &RAW_SAMPLES[NON_PE_SAMPLE]
    };
    let confidence = random_confidence(&mut rng);
    log::debug!("[AI] Demo sample '{}' for {}", sample.name, detected_filename);

    let mut result = build_from_sample(sample, detected_filename, hashes, confidence);
    result.is_pe = is_pe;
    result
}

/// Classifier that never consults a model
#[derive(Debug, Default, Clone, Copy)]
pub struct DemoClassifier;

#[async_trait]
impl Classifier for DemoClassifier {
    fn name(&self) -> &'static str {
        "demo"
    }

    async fn classify(&self, path: &Path, hashes: Option<&FileHashes>) -> Result<ScanResult, ClassifierError> {
        Ok(random_demo_result(&file_name_of(path), hashes, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_sample_builds() {
        let hashes = FileHashes { sha256: "aa".to_string(), md5: "bb".to_string() };
        for sample in RAW_SAMPLES {
            let result = build_from_sample(sample, "x.exe", Some(&hashes), 0.7);
            assert_eq!(result.classification, sample.class);
            assert_eq!(result.file_hashes, hashes);
            assert_eq!(result.malware_family.is_some(), sample.class == Malware);
            assert!(result.key_findings.is_some());
        }
    }

    #[test]
    fn test_random_result_is_well_formed() {
        for _ in 0..50 {
            let result = random_demo_result("payload.exe", None, true);
            let confidence = result.confidence_score.unwrap();
            assert!((0.55..=0.99).contains(&confidence));
            assert!(result.is_pe);
            assert_eq!(result.detected_filename, "payload.exe");
            assert_eq!(result.file_hashes.sha256.len(), 64);
            assert_eq!(result.file_hashes.md5.len(), 32);
        }
    }

    #[test]
    fn test_non_pe_sample_is_benign_document() {
        let result = random_demo_result("doc.pdf", None, false);
        assert_eq!(result.classification, Classification::Benign);
        assert!(!result.is_pe);
        let findings = result.key_findings.unwrap();
        assert_eq!(findings.file_type, "PDF Document");
        assert!(findings.section_entropy.is_empty());
    }
}
