use std::time::Duration;
use serde::{Deserialize, Serialize};

/// Tunables for one [`crate::Previewer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Time budget for strategies that only touch the container and XML parts
    pub strategy_timeout: Duration,
    /// Time budget for strategies that hand the bytes to a third-party library
    pub backend_timeout: Duration,
    /// Number of leading bytes the validator inspects
    pub validation_prefix_len: usize,
    pub encrypted_entropy_threshold: f64,
    pub encrypted_printable_threshold: f64,
    pub text_printable_threshold: f64,
    /// Shortest printable run the binary scanner keeps
    pub min_run_length: usize,
    /// Maximum characters of scanned or decoded plain text kept in a result
    pub max_text_chars: usize,
    /// Maximum inflated size of a single ZIP entry
    pub max_entry_size: u64,
    pub max_images: usize,
    pub max_image_size: u64,
    pub max_sheet_rows: usize,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            strategy_timeout: Duration::from_secs(15),
            backend_timeout: Duration::from_secs(30),
            validation_prefix_len: 1000,
            encrypted_entropy_threshold: 7.0,
            encrypted_printable_threshold: 0.3,
            text_printable_threshold: 0.8,
            min_run_length: 4,
            max_text_chars: 200_000,
            max_entry_size: 50 * 1024 * 1024,
            max_images: 50,
            max_image_size: 10 * 1024 * 1024,
            max_sheet_rows: 1000,
        }
    }
}

impl PreviewConfig {
    /// Start from the defaults and apply `OFFICE_PREVIEW_*` overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ms) = parse_override::<u64>(&lookup, "OFFICE_PREVIEW_STRATEGY_TIMEOUT_MS") {
            self.strategy_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_override::<u64>(&lookup, "OFFICE_PREVIEW_BACKEND_TIMEOUT_MS") {
            self.backend_timeout = Duration::from_millis(ms);
        }
        if let Some(chars) = parse_override(&lookup, "OFFICE_PREVIEW_MAX_TEXT_CHARS") {
            self.max_text_chars = chars;
        }
        if let Some(bytes) = parse_override(&lookup, "OFFICE_PREVIEW_MAX_ENTRY_SIZE") {
            self.max_entry_size = bytes;
        }
        if let Some(count) = parse_override(&lookup, "OFFICE_PREVIEW_MAX_IMAGES") {
            self.max_images = count;
        }
        if let Some(rows) = parse_override(&lookup, "OFFICE_PREVIEW_MAX_SHEET_ROWS") {
            self.max_sheet_rows = rows;
        }
    }
}

fn parse_override<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring invalid value {:?} for {}", raw, key);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = PreviewConfig::default();
        assert_eq!(config.validation_prefix_len, 1000);
        assert_eq!(config.encrypted_entropy_threshold, 7.0);
        assert_eq!(config.min_run_length, 4);
    }

    #[test]
    fn test_overrides_apply_and_ignore_garbage() {
        let vars: HashMap<&str, &str> = [
            ("OFFICE_PREVIEW_STRATEGY_TIMEOUT_MS", "250"),
            ("OFFICE_PREVIEW_MAX_IMAGES", "not-a-number"),
            ("OFFICE_PREVIEW_MAX_SHEET_ROWS", " 20 "),
        ]
        .into_iter()
        .collect();

        let mut config = PreviewConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.strategy_timeout, Duration::from_millis(250));
        assert_eq!(config.max_images, PreviewConfig::default().max_images);
        assert_eq!(config.max_sheet_rows, 20);
    }
}
