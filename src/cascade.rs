//! Ordered extraction strategies with a guaranteed terminal fallback.
//!
//! Every category owns a fixed list of strategies, highest fidelity first.
//! Each attempt runs on the blocking pool under its own time budget; an
//! error, a panic, a timeout or a result under the strategy's threshold all
//! just advance to the next strategy. When nothing is good enough, a
//! deterministic informational result describes the file instead.

use std::sync::Arc;
use std::time::Duration;

use crate::binary_scanner::BinaryScanStrategy;
use crate::config::PreviewConfig;
use crate::document_parser::{DocxConversionStrategy, OoxmlDocumentStrategy};
use crate::error::PreviewError;
use crate::fast_pdf_extractor::{PdfEngine, PdfEngineStrategy};
use crate::plain_text::PlainTextStrategy;
use crate::powerpoint_parser::{PresentationXmlStrategy, SlideTextRunsStrategy};
use crate::shared_utils::format_file_size;
use crate::spreadsheet_parser::{WorkbookLibraryStrategy, WorksheetXmlStrategy};
use crate::types::{DocumentCategory, ExtractionMethod, ExtractionResult, file_extension};

/// Rich conversion libraries must beat this many characters.
pub const RICH_THRESHOLD: usize = 50;
/// Container and text-run scanning.
pub const RAW_THRESHOLD: usize = 20;
/// Byte scanning of anything at all.
pub const SCAN_THRESHOLD: usize = 10;

/// The bytes being previewed and what the caller said about them.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
}

impl DocumentInput {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            bytes,
            file_name: file_name.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn extension(&self) -> String {
        file_extension(&self.file_name)
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// One way of turning bytes into previewable content.
///
/// Implementations are synchronous and may be slow or panic on hostile
/// input; the cascade isolates them.
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn method(&self) -> ExtractionMethod;

    /// Trimmed characters the content must exceed to be accepted.
    fn threshold(&self) -> usize;

    fn time_budget(&self, config: &PreviewConfig) -> Duration {
        config.strategy_timeout
    }

    fn extract(&self, input: &DocumentInput, config: &PreviewConfig) -> Result<ExtractionResult, PreviewError>;
}

/// What a single attempt came to.
#[derive(Debug)]
pub enum StrategyOutcome {
    Success(ExtractionResult),
    Insufficient { length: usize, threshold: usize },
    Failed(PreviewError),
}

/// Which optional backends the cascades may use, and in what order.
///
/// Constructed by the caller and handed to the previewer; nothing about
/// backend availability is process-wide.
#[derive(Debug, Clone)]
pub struct BackendSet {
    pub docx_conversion: bool,
    pub spreadsheet_library: bool,
    pub pdf_engines: Vec<PdfEngine>,
}

impl Default for BackendSet {
    fn default() -> Self {
        Self {
            docx_conversion: true,
            spreadsheet_library: true,
            pdf_engines: PdfEngine::preferred_order(),
        }
    }
}

impl BackendSet {
    /// Only the built-in container and byte scanners.
    pub fn builtin_only() -> Self {
        Self {
            docx_conversion: false,
            spreadsheet_library: false,
            pdf_engines: Vec::new(),
        }
    }
}

pub struct ExtractionStrategyCascade {
    category: DocumentCategory,
    strategies: Vec<Arc<dyn ExtractionStrategy>>,
}

impl ExtractionStrategyCascade {
    pub fn new(category: DocumentCategory, strategies: Vec<Arc<dyn ExtractionStrategy>>) -> Self {
        Self { category, strategies }
    }

    /// The fixed strategy order for a category.
    pub fn for_category(category: DocumentCategory, backends: &BackendSet) -> Self {
        let mut strategies: Vec<Arc<dyn ExtractionStrategy>> = Vec::new();
        match category {
            DocumentCategory::Word => {
                if backends.docx_conversion {
                    strategies.push(Arc::new(DocxConversionStrategy));
                }
                strategies.push(Arc::new(OoxmlDocumentStrategy));
            }
            DocumentCategory::Sheet => {
                if backends.spreadsheet_library {
                    strategies.push(Arc::new(WorkbookLibraryStrategy));
                }
                strategies.push(Arc::new(WorksheetXmlStrategy));
            }
            DocumentCategory::Slide => {
                strategies.push(Arc::new(PresentationXmlStrategy));
                strategies.push(Arc::new(SlideTextRunsStrategy));
            }
            DocumentCategory::Pdf => {
                for engine in &backends.pdf_engines {
                    strategies.push(Arc::new(PdfEngineStrategy::new(*engine)));
                }
            }
            DocumentCategory::Text => strategies.push(Arc::new(PlainTextStrategy)),
            DocumentCategory::Generic => {}
        }
        strategies.push(Arc::new(BinaryScanStrategy));
        Self::new(category, strategies)
    }

    pub fn category(&self) -> DocumentCategory {
        self.category
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Try each strategy in order; the first acceptable result wins.
    pub async fn run(&self, input: Arc<DocumentInput>, config: Arc<PreviewConfig>) -> ExtractionResult {
        let mut notes = Vec::new();

        for strategy in &self.strategies {
            let name = strategy.name();
            log::debug!("Trying {} for {}", name, input.file_name);

            match attempt(strategy.clone(), input.clone(), config.clone()).await {
                StrategyOutcome::Success(result) => {
                    log::info!(
                        "Extracted {} with {} ({} characters)",
                        input.file_name,
                        name,
                        result.meaningful_len()
                    );
                    return result;
                }
                StrategyOutcome::Insufficient { length, threshold } => {
                    log::debug!("{} produced {} characters, needs more than {}", name, length, threshold);
                    notes.push(format!("{}: only {} characters recovered", name, length));
                }
                StrategyOutcome::Failed(e) => {
                    log::warn!("{} failed for {}: {}", name, input.file_name, e);
                    notes.push(format!("{}: {}", name, e));
                }
            }
        }

        let exhausted = PreviewError::StrategyExhausted {
            attempted: self.strategies.len(),
        };
        log::info!("{}: {}", input.file_name, exhausted);
        info_display(&input, self.category, notes)
    }
}

/// Run one strategy under its time budget and judge the result.
pub async fn attempt(
    strategy: Arc<dyn ExtractionStrategy>,
    input: Arc<DocumentInput>,
    config: Arc<PreviewConfig>,
) -> StrategyOutcome {
    let name = strategy.name();
    let threshold = strategy.threshold();
    let budget = strategy.time_budget(&config);

    let task = tokio::task::spawn_blocking(move || strategy.extract(&input, &config));
    let result = match tokio::time::timeout(budget, task).await {
        Err(_) => {
            return StrategyOutcome::Failed(PreviewError::BackendTimeout { strategy: name, budget });
        }
        Ok(Err(join_error)) => {
            return StrategyOutcome::Failed(PreviewError::Backend {
                backend: name,
                message: format!("aborted: {}", join_error),
            });
        }
        Ok(Ok(Err(e))) => return StrategyOutcome::Failed(e),
        Ok(Ok(Ok(result))) => result,
    };

    let length = result.meaningful_len();
    if result.success && length > threshold {
        StrategyOutcome::Success(result)
    } else {
        StrategyOutcome::Insufficient { length, threshold }
    }
}

/// Terminal fallback: describe the file instead of showing it.
pub fn info_display(input: &DocumentInput, category: DocumentCategory, warnings: Vec<String>) -> ExtractionResult {
    let content = format!(
        "{}\n\n{} ({})\n\nA preview of this file's content is not available. \
         Open it in {} to view it.",
        input.file_name,
        category.description(),
        format_file_size(input.size()),
        category.suggested_viewer()
    );
    ExtractionResult::text(content, ExtractionMethod::InfoDisplay).with_warnings(warnings)
}

/// Explanatory result for input the validator judged encrypted.
pub fn encrypted_notice(input: &DocumentInput, category: DocumentCategory, reason: &str) -> ExtractionResult {
    let content = format!(
        "{}\n\nThis {} appears to be password-protected or encrypted, so its content \
         cannot be previewed. Open it in {} and enter the password to view it.",
        input.file_name,
        category.description().to_lowercase(),
        category.suggested_viewer()
    );
    ExtractionResult::text(content, ExtractionMethod::EncryptedNotice)
        .with_warnings(vec![format!("Likely encrypted: {}", reason)])
}

/// Minimal result when extraction itself broke down.
pub fn download_only(file_name: &str, size: u64) -> ExtractionResult {
    let content = format!(
        "{} ({}) could not be previewed. The file is available for download.",
        file_name,
        format_file_size(size)
    );
    ExtractionResult::text(content, ExtractionMethod::DownloadOnly)
}
