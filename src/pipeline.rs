//! The public entry point: select a handler, validate, extract, count.

use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

use futures::FutureExt;

use crate::cascade::{BackendSet, DocumentInput, ExtractionStrategyCascade, download_only, encrypted_notice, info_display};
use crate::config::PreviewConfig;
use crate::content_validator::{ContainerKind, ContentValidator};
use crate::dispatcher::HandlerRegistry;
use crate::error::Result;
use crate::statistics;
use crate::types::{DocumentCategory, DocumentPreview, ExtractionResult, ValidationVerdict, file_extension};

/// MIME type conventionally served for an extension.
pub fn mime_from_extension(extension: &str) -> &'static str {
    match extension {
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "doc" => "application/msword",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xls" => "application/vnd.ms-excel",
        "ods" => "application/vnd.oasis.opendocument.spreadsheet",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "ppt" => "application/vnd.ms-powerpoint",
        "pdf" => "application/pdf",
        "txt" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "json" => "application/json",
        "xml" => "application/xml",
        "yaml" | "yml" => "application/x-yaml",
        _ => "application/octet-stream",
    }
}

/// Previews documents. Cheap to clone; every call is independent.
#[derive(Clone)]
pub struct Previewer {
    config: Arc<PreviewConfig>,
    registry: HandlerRegistry,
    backends: BackendSet,
    validator: ContentValidator,
}

impl Default for Previewer {
    fn default() -> Self {
        Self::new(PreviewConfig::default(), HandlerRegistry::with_defaults(), BackendSet::default())
    }
}

impl Previewer {
    pub fn new(config: PreviewConfig, registry: HandlerRegistry, backends: BackendSet) -> Self {
        let validator = ContentValidator::new(&config);
        Self {
            config: Arc::new(config),
            registry,
            backends,
            validator,
        }
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Preview raw bytes. Always yields a renderable preview.
    pub async fn preview(&self, bytes: Vec<u8>, mime_type: &str, file_name: &str) -> DocumentPreview {
        let size = bytes.len() as u64;
        let input = Arc::new(DocumentInput::new(bytes, mime_type, file_name));

        match AssertUnwindSafe(self.run(input)).catch_unwind().await {
            Ok(preview) => preview,
            Err(_) => {
                log::error!("Preview of {} panicked; offering download only", file_name);
                let category = DocumentCategory::detect(mime_type, file_name);
                let result = download_only(file_name, size);
                let metadata = statistics::compute(&result, size);
                DocumentPreview {
                    file_name: file_name.to_string(),
                    mime_type: mime_type.to_string(),
                    category,
                    handler: None,
                    verdict: ValidationVerdict::not_applicable(),
                    result,
                    metadata,
                }
            }
        }
    }

    /// Read a file and preview it, taking the MIME type from its extension.
    pub async fn preview_file(&self, path: impl AsRef<Path>) -> Result<DocumentPreview> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mime_type = mime_from_extension(&file_extension(&file_name));
        Ok(self.preview(bytes, mime_type, &file_name).await)
    }

    async fn run(&self, input: Arc<DocumentInput>) -> DocumentPreview {
        let handler = self.registry.select_handler(&input.mime_type, &input.file_name);
        let category = match &handler {
            Some(handler) => handler.category(),
            None => DocumentCategory::detect(&input.mime_type, &input.file_name),
        };
        let handler_name = handler.map(|h| h.descriptor().name.clone());
        log::debug!(
            "Previewing {} as {} (handler {:?})",
            input.file_name,
            category.as_str(),
            handler_name
        );

        let verdict = match ContainerKind::expected(category, &input.file_name) {
            Some(kind) => self.validator.validate_as(&input.bytes, kind, &input.file_name),
            None => ValidationVerdict::not_applicable(),
        };

        let result = self.extract(input.clone(), category, &verdict).await;
        let metadata = statistics::compute(&result, input.size());
        DocumentPreview {
            file_name: input.file_name.clone(),
            mime_type: input.mime_type.clone(),
            category,
            handler: handler_name,
            verdict,
            result,
            metadata,
        }
    }

    async fn extract(
        &self,
        input: Arc<DocumentInput>,
        category: DocumentCategory,
        verdict: &ValidationVerdict,
    ) -> ExtractionResult {
        if verdict.is_likely_encrypted {
            let reason = verdict.reason.as_deref().unwrap_or("encrypted content");
            log::info!("{} looks encrypted: {}", input.file_name, reason);
            return encrypted_notice(&input, category, reason);
        }

        if verdict.is_plain_text() {
            log::info!("{} is plain text under a {} name", input.file_name, category.as_str());
            let cascade = ExtractionStrategyCascade::for_category(DocumentCategory::Text, &self.backends);
            let mut result = cascade.run(input, self.config.clone()).await;
            result
                .warnings
                .insert(0, format!("Not a {} container; shown as plain text", category.as_str()));
            return result;
        }

        if !verdict.is_valid_container {
            let reason = verdict
                .reason
                .clone()
                .unwrap_or_else(|| "file is not in the expected format".to_string());
            log::info!("{} rejected: {}", input.file_name, reason);
            return info_display(&input, category, vec![reason]);
        }

        ExtractionStrategyCascade::for_category(category, &self.backends)
            .run(input, self.config.clone())
            .await
    }
}
