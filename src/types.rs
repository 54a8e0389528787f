//! Render-agnostic data model handed to the presentation layer.

use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::metadata::DocumentProperties;

/// Broad document family; decides which strategy cascade runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    Word,
    Sheet,
    Slide,
    Pdf,
    Text,
    Generic,
}

/// MIME types that say nothing about the payload; the extension decides instead.
const GENERIC_MIME_TYPES: &[&str] = &[
    "",
    "application/octet-stream",
    "application/zip",
    "application/x-zip-compressed",
    "binary/octet-stream",
];

impl DocumentCategory {
    /// Resolve the category from the declared MIME type, falling back to the
    /// file extension when the MIME type is generic or unknown.
    pub fn detect(mime_type: &str, file_name: &str) -> Self {
        let mime = normalize_mime(mime_type);
        if !is_generic_mime(&mime) {
            if let Some(category) = Self::from_mime(&mime) {
                return category;
            }
        }
        Self::from_extension(&file_extension(file_name))
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        let category = match mime {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            | "application/vnd.openxmlformats-officedocument.wordprocessingml.template"
            | "application/vnd.ms-word.document.macroenabled.12"
            | "application/msword" => DocumentCategory::Word,
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            | "application/vnd.openxmlformats-officedocument.spreadsheetml.template"
            | "application/vnd.ms-excel.sheet.macroenabled.12"
            | "application/vnd.ms-excel"
            | "application/vnd.oasis.opendocument.spreadsheet" => DocumentCategory::Sheet,
            "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            | "application/vnd.openxmlformats-officedocument.presentationml.slideshow"
            | "application/vnd.ms-powerpoint.presentation.macroenabled.12"
            | "application/vnd.ms-powerpoint" => DocumentCategory::Slide,
            "application/pdf" | "application/x-pdf" => DocumentCategory::Pdf,
            m if m.starts_with("text/") => DocumentCategory::Text,
            "application/json" | "application/xml" | "application/x-yaml" => DocumentCategory::Text,
            _ => return None,
        };
        Some(category)
    }

    pub fn from_extension(extension: &str) -> Self {
        match extension {
            "docx" | "docm" | "dotx" | "dotm" | "doc" | "dot" => DocumentCategory::Word,
            "xlsx" | "xlsm" | "xltx" | "xltm" | "xls" | "xlsb" | "ods" => DocumentCategory::Sheet,
            "pptx" | "pptm" | "potx" | "ppsx" | "ppt" | "pps" => DocumentCategory::Slide,
            "pdf" => DocumentCategory::Pdf,
            "txt" | "text" | "md" | "markdown" | "csv" | "tsv" | "log" | "json" | "xml"
            | "yaml" | "yml" | "ini" | "cfg" | "toml" => DocumentCategory::Text,
            _ => DocumentCategory::Generic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentCategory::Word => "word",
            DocumentCategory::Sheet => "sheet",
            DocumentCategory::Slide => "slide",
            DocumentCategory::Pdf => "pdf",
            DocumentCategory::Text => "text",
            DocumentCategory::Generic => "generic",
        }
    }

    /// Human description used by the informational fallback.
    pub fn description(&self) -> &'static str {
        match self {
            DocumentCategory::Word => "Word processing document",
            DocumentCategory::Sheet => "Spreadsheet",
            DocumentCategory::Slide => "Presentation",
            DocumentCategory::Pdf => "PDF document",
            DocumentCategory::Text => "Text file",
            DocumentCategory::Generic => "File",
        }
    }

    pub fn suggested_viewer(&self) -> &'static str {
        match self {
            DocumentCategory::Word => "Microsoft Word or LibreOffice Writer",
            DocumentCategory::Sheet => "Microsoft Excel or LibreOffice Calc",
            DocumentCategory::Slide => "Microsoft PowerPoint or LibreOffice Impress",
            DocumentCategory::Pdf => "a PDF reader",
            DocumentCategory::Text => "a text editor",
            DocumentCategory::Generic => "an application that supports this file type",
        }
    }
}

/// Lowercased MIME type without parameters (`text/plain; charset=utf-8` -> `text/plain`).
/// True when the MIME type is absent or names no particular format.
pub fn is_generic_mime(mime_type: &str) -> bool {
    GENERIC_MIME_TYPES.contains(&normalize_mime(mime_type).as_str())
}

pub fn normalize_mime(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

/// Lowercased extension of a file name, empty when there is none.
pub fn file_extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default()
}

/// Which strategy produced a result; lets the UI convey fidelity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// docx-rs conversion
    DocxConversion,
    /// calamine workbook reader
    SpreadsheetLibrary,
    /// pdf-extract
    PdfLibrary,
    /// lopdf page-by-page text
    PdfPageText,
    /// Container + XML scanning with structure
    OoxmlStructured,
    /// Bare text runs from XML parts
    TextRuns,
    PlainText,
    BinaryScan,
    InfoDisplay,
    EncryptedNotice,
    DownloadOnly,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::DocxConversion => "docx_conversion",
            ExtractionMethod::SpreadsheetLibrary => "spreadsheet_library",
            ExtractionMethod::PdfLibrary => "pdf_library",
            ExtractionMethod::PdfPageText => "pdf_page_text",
            ExtractionMethod::OoxmlStructured => "ooxml_structured",
            ExtractionMethod::TextRuns => "text_runs",
            ExtractionMethod::PlainText => "plain_text",
            ExtractionMethod::BinaryScan => "binary_scan",
            ExtractionMethod::InfoDisplay => "info_display",
            ExtractionMethod::EncryptedNotice => "encrypted_notice",
            ExtractionMethod::DownloadOnly => "download_only",
        }
    }

    pub fn fidelity(&self) -> &'static str {
        match self {
            ExtractionMethod::DocxConversion
            | ExtractionMethod::SpreadsheetLibrary
            | ExtractionMethod::PdfLibrary
            | ExtractionMethod::OoxmlStructured
            | ExtractionMethod::PlainText => "full",
            ExtractionMethod::PdfPageText
            | ExtractionMethod::TextRuns
            | ExtractionMethod::BinaryScan => "partial",
            ExtractionMethod::InfoDisplay
            | ExtractionMethod::EncryptedNotice
            | ExtractionMethod::DownloadOnly => "info-only",
        }
    }
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one extraction attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub content: String,
    pub method: ExtractionMethod,
    pub success: bool,
    pub is_html: bool,
    pub plain_text: Option<String>,
    pub word_count: Option<usize>,
    pub warnings: Vec<String>,
    /// Page/slide/sheet enumeration when the strategy recovered structure
    pub document: Option<StructuredDocument>,
}

impl ExtractionResult {
    /// Plain-text result.
    pub fn text(content: String, method: ExtractionMethod) -> Self {
        let word_count = content.split_whitespace().count();
        Self {
            content,
            method,
            success: true,
            is_html: false,
            plain_text: None,
            word_count: Some(word_count),
            warnings: Vec::new(),
            document: None,
        }
    }

    /// HTML fragment result with its text-only form.
    pub fn html(content: String, plain_text: String, method: ExtractionMethod) -> Self {
        let word_count = plain_text.split_whitespace().count();
        Self {
            content,
            method,
            success: true,
            is_html: true,
            plain_text: Some(plain_text),
            word_count: Some(word_count),
            warnings: Vec::new(),
            document: None,
        }
    }

    pub fn with_document(mut self, document: StructuredDocument) -> Self {
        self.document = Some(document);
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    /// The text a reader sees, with markup removed.
    pub fn text_content(&self) -> &str {
        match (&self.plain_text, self.is_html) {
            (Some(plain), true) => plain,
            _ => &self.content,
        }
    }

    /// Length of the trimmed content, counted in characters.
    pub fn meaningful_len(&self) -> usize {
        self.text_content().trim().chars().count()
    }
}

/// A table recovered from a document part or workbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub row_count: usize,
    /// Length of the longest row; shorter rows are not padded in `cells`
    pub column_count: usize,
    pub cells: Vec<Vec<String>>,
    pub has_header_row: bool,
}

impl Table {
    pub fn new(cells: Vec<Vec<String>>, has_header_row: bool) -> Self {
        let column_count = cells.iter().map(Vec::len).max().unwrap_or(0);
        Self {
            row_count: cells.len(),
            column_count,
            cells,
            has_header_row,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|row| row.iter().all(|cell| cell.trim().is_empty()))
    }
}

/// An embedded image, base64-encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub id: String,
    pub original_name: String,
    pub mime_hint: String,
    pub base64_payload: String,
    /// Best-effort page/slide association (1-based)
    pub associated_page_index: Option<usize>,
}

/// One logical page, slide or sheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentSection {
    pub index: usize,
    pub title: String,
    pub content: String,
    pub bullets: Vec<String>,
    pub tables: Vec<Table>,
    pub images: Vec<ImageAsset>,
    pub notes: String,
    pub layout_kind: String,
}

/// Structure recovered alongside the flat content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredDocument {
    pub sections: Vec<DocumentSection>,
    /// Images no section could be associated with
    pub unplaced_images: Vec<ImageAsset>,
    pub properties: DocumentProperties,
}

impl StructuredDocument {
    pub fn table_count(&self) -> usize {
        self.sections.iter().map(|s| s.tables.len()).sum()
    }

    pub fn image_count(&self) -> usize {
        self.sections.iter().map(|s| s.images.len()).sum::<usize>() + self.unplaced_images.len()
    }
}

/// Statistics derived from an [`ExtractionResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub word_count: usize,
    pub page_count: usize,
    pub section_count: usize,
    pub table_count: usize,
    pub image_count: usize,
    pub extraction_method: ExtractionMethod,
    pub file_size_bytes: u64,
}

/// Reason attached to content that is readable text rather than a container.
pub const NOT_A_CONTAINER: &str = "not a container";

/// Verdict on the raw bytes, computed before any parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub is_valid_container: bool,
    pub is_likely_encrypted: bool,
    pub reason: Option<String>,
}

impl ValidationVerdict {
    pub fn valid() -> Self {
        Self {
            is_valid_container: true,
            is_likely_encrypted: false,
            reason: None,
        }
    }

    /// For inputs that have no container format to check against.
    pub fn not_applicable() -> Self {
        Self {
            is_valid_container: true,
            is_likely_encrypted: false,
            reason: Some("no container validation for this file type".to_string()),
        }
    }

    pub fn encrypted(reason: impl Into<String>) -> Self {
        Self {
            is_valid_container: false,
            is_likely_encrypted: true,
            reason: Some(reason.into()),
        }
    }

    pub fn plain_text() -> Self {
        Self::invalid(NOT_A_CONTAINER)
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid_container: false,
            is_likely_encrypted: false,
            reason: Some(reason.into()),
        }
    }

    pub fn is_plain_text(&self) -> bool {
        !self.is_valid_container && self.reason.as_deref() == Some(NOT_A_CONTAINER)
    }
}

/// Everything the presentation layer receives for one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentPreview {
    pub file_name: String,
    pub mime_type: String,
    pub category: DocumentCategory,
    pub handler: Option<String>,
    pub verdict: ValidationVerdict,
    pub result: ExtractionResult,
    pub metadata: DocumentMetadata,
}
