//! Last-resort recovery of readable text from arbitrary bytes.
//!
//! Legacy Office files keep most of their text as plain ASCII or UTF-16LE
//! runs, so scanning for both recovers a usable preview without parsing the
//! compound-file structure.

use std::collections::HashSet;
use regex::bytes::Regex;

use crate::cascade::{DocumentInput, ExtractionStrategy, SCAN_THRESHOLD};
use crate::config::PreviewConfig;
use crate::error::PreviewError;
use crate::types::{ExtractionMethod, ExtractionResult};

/// Text recovered by one scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanOutput {
    pub text: String,
    pub run_count: usize,
}

/// Scanner for printable runs in binary data.
#[derive(Debug, Clone)]
pub struct BinaryTextScanner {
    ascii_run: Regex,
    utf16_run: Regex,
    max_chars: usize,
}

impl Default for BinaryTextScanner {
    fn default() -> Self {
        Self::new(&PreviewConfig::default())
    }
}

impl BinaryTextScanner {
    pub fn new(config: &PreviewConfig) -> Self {
        let min = config.min_run_length.max(2);
        // Built from an integer, so always valid
        let ascii_run = Regex::new(&format!(r"(?-u)[\x20-\x7E\t]{{{},}}", min))
            .expect("ascii run pattern");
        let utf16_run = Regex::new(&format!(r"(?-u)(?:[\x20-\x7E]\x00){{{},}}", min))
            .expect("utf-16 run pattern");
        Self {
            ascii_run,
            utf16_run,
            max_chars: config.max_text_chars,
        }
    }

    /// Recover readable runs in file order, dropping noise and duplicates.
    pub fn scan(&self, bytes: &[u8]) -> ScanOutput {
        let mut runs: Vec<(usize, String)> = Vec::new();

        for m in self.ascii_run.find_iter(bytes) {
            runs.push((m.start(), String::from_utf8_lossy(m.as_bytes()).into_owned()));
        }
        for m in self.utf16_run.find_iter(bytes) {
            let units: Vec<u16> = m
                .as_bytes()
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            runs.push((m.start(), String::from_utf16_lossy(&units)));
        }
        runs.sort_by_key(|(offset, _)| *offset);

        let mut seen = HashSet::new();
        let mut lines = Vec::new();
        let mut total_chars = 0;
        for (_, run) in runs {
            let normalized = run.split_whitespace().collect::<Vec<_>>().join(" ");
            if !looks_like_text(&normalized) || !seen.insert(normalized.clone()) {
                continue;
            }
            total_chars += normalized.chars().count() + 1;
            lines.push(normalized);
            if total_chars >= self.max_chars {
                log::debug!("Binary scan stopped at {} characters", total_chars);
                break;
            }
        }

        ScanOutput {
            run_count: lines.len(),
            text: lines.join("\n"),
        }
    }
}

/// Last strategy of every cascade.
pub struct BinaryScanStrategy;

impl ExtractionStrategy for BinaryScanStrategy {
    fn name(&self) -> &'static str {
        "binary_scan"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::BinaryScan
    }

    fn threshold(&self) -> usize {
        SCAN_THRESHOLD
    }

    fn extract(&self, input: &DocumentInput, config: &PreviewConfig) -> Result<ExtractionResult, PreviewError> {
        let output = BinaryTextScanner::new(config).scan(&input.bytes);
        log::debug!("Recovered {} text runs from {}", output.run_count, input.file_name);
        let mut result = ExtractionResult::text(output.text, self.method());
        if output.run_count > 0 {
            result.warnings.push(
                "Text was recovered from raw bytes; formatting and order may be lost".to_string(),
            );
        }
        Ok(result)
    }
}

/// Reject runs that are mostly punctuation, digits or markup noise.
fn looks_like_text(run: &str) -> bool {
    let total = run.chars().count();
    if total == 0 {
        return false;
    }
    let letters = run.chars().filter(|c| c.is_alphabetic()).count();
    let readable = run.chars().filter(|c| c.is_alphanumeric() || *c == ' ').count();
    letters >= 3 && readable * 10 >= total * 7
}
