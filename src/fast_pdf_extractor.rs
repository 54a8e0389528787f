use anyhow::{Context, anyhow};

use crate::cascade::{DocumentInput, ExtractionStrategy, RAW_THRESHOLD, RICH_THRESHOLD};
use crate::config::PreviewConfig;
use crate::error::{PreviewError, Result};
use crate::fragment::SectionWriter;
use crate::metadata::DocumentProperties;
use crate::shared_utils::html_to_text;
use crate::types::{ExtractionMethod, ExtractionResult};

/// PDF text backends, each tried as its own cascade step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfEngine {
    /// Whole-document text with layout heuristics
    PdfExtract,
    /// Page-by-page content stream text
    Lopdf,
}

impl PdfEngine {
    /// Richest engine first.
    pub fn preferred_order() -> Vec<PdfEngine> {
        vec![PdfEngine::PdfExtract, PdfEngine::Lopdf]
    }

    fn backend_name(&self) -> &'static str {
        match self {
            PdfEngine::PdfExtract => "pdf-extract",
            PdfEngine::Lopdf => "lopdf",
        }
    }

    fn page_texts(&self, bytes: &[u8]) -> anyhow::Result<Vec<String>> {
        match self {
            PdfEngine::PdfExtract => {
                let text = pdf_extract::extract_text_from_mem(bytes)
                    .with_context(|| "Failed to extract text from bytes with pdf-extract")?;
                Ok(split_pages(&text))
            }
            PdfEngine::Lopdf => {
                let document = lopdf::Document::load_mem(bytes).context("Failed to load PDF with lopdf")?;
                if document.is_encrypted() {
                    return Err(anyhow!("document is encrypted"));
                }
                let mut pages = Vec::new();
                for page_number in document.get_pages().keys() {
                    match document.extract_text(&[*page_number]) {
                        Ok(text) => pages.push(text),
                        Err(e) => {
                            log::debug!("No text on PDF page {}: {}", page_number, e);
                            pages.push(String::new());
                        }
                    }
                }
                Ok(pages)
            }
        }
    }
}

/// Pages of pdf-extract output, which separates pages with form feeds.
pub fn split_pages(text: &str) -> Vec<String> {
    let mut pages: Vec<String> = text.split('\x0C').map(str::to_string).collect();
    if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }
    pages
}

pub struct PdfEngineStrategy {
    engine: PdfEngine,
}

impl PdfEngineStrategy {
    pub fn new(engine: PdfEngine) -> Self {
        Self { engine }
    }
}

impl ExtractionStrategy for PdfEngineStrategy {
    fn name(&self) -> &'static str {
        match self.engine {
            PdfEngine::PdfExtract => "pdf_extract",
            PdfEngine::Lopdf => "pdf_page_text",
        }
    }

    fn method(&self) -> ExtractionMethod {
        match self.engine {
            PdfEngine::PdfExtract => ExtractionMethod::PdfLibrary,
            PdfEngine::Lopdf => ExtractionMethod::PdfPageText,
        }
    }

    fn threshold(&self) -> usize {
        match self.engine {
            PdfEngine::PdfExtract => RICH_THRESHOLD,
            PdfEngine::Lopdf => RAW_THRESHOLD,
        }
    }

    fn time_budget(&self, config: &PreviewConfig) -> std::time::Duration {
        config.backend_timeout
    }

    fn extract(&self, input: &DocumentInput, config: &PreviewConfig) -> Result<ExtractionResult> {
        let pages = self
            .engine
            .page_texts(&input.bytes)
            .map_err(|e| PreviewError::backend(self.engine.backend_name(), e))?;
        log::debug!("{:?} read {} pages from {}", self.engine, pages.len(), input.file_name);

        let mut writer = SectionWriter::new(Vec::new());
        let mut total_chars = 0;
        let mut truncated = false;
        for (index, page) in pages.iter().enumerate() {
            if index > 0 {
                writer.break_section();
            }
            if truncated {
                continue;
            }
            for paragraph in page_paragraphs(page) {
                total_chars += paragraph.chars().count();
                if total_chars > config.max_text_chars {
                    truncated = true;
                    break;
                }
                writer.paragraph(&paragraph);
            }
        }

        let (html, document) = writer.finish(Some("data-page"), true, DocumentProperties::default());
        let mut warnings = Vec::new();
        if truncated {
            warnings.push(format!(
                "Text was truncated after {} characters",
                config.max_text_chars
            ));
        }
        let plain = html_to_text(&html);
        Ok(ExtractionResult::html(html, plain, self.method())
            .with_document(document)
            .with_warnings(warnings))
    }
}

/// Blank-line separated paragraphs with their internal line wraps joined.
fn page_paragraphs(page: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in page.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }
    paragraphs
}
