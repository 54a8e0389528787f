//! Handler registry used by the rendering layer to pick an extractor.
//!
//! Eligibility is declarative: a handler matches on MIME type, and on file
//! extension only when the MIME type is generic or no handler accepts it.
//! Handlers never look at the bytes. Content inspection happens only after a
//! handler is chosen.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{DocumentCategory, file_extension, is_generic_mime, normalize_mime};

/// What a handler declares about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerDescriptor {
    pub name: String,
    pub priority: i32,
    /// Exact types, `type/*` families, or `*` for anything
    pub supported_mime_types: Vec<String>,
    /// Lower-case extensions without the dot, or `*` for anything
    pub supported_extensions: Vec<String>,
}

impl HandlerDescriptor {
    pub fn new(name: &str, priority: i32, mime_types: &[&str], extensions: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            priority,
            supported_mime_types: mime_types.iter().map(|m| m.to_string()).collect(),
            supported_extensions: extensions.iter().map(|e| e.to_string()).collect(),
        }
    }

    pub fn matches_mime(&self, mime_type: &str) -> bool {
        let mime = normalize_mime(mime_type);
        if mime.is_empty() {
            return false;
        }
        self.supported_mime_types.iter().any(|supported| {
            supported == "*"
                || *supported == mime
                || supported
                    .strip_suffix("/*")
                    .is_some_and(|family| mime.split('/').next() == Some(family))
        })
    }

    pub fn matches_extension(&self, file_name: &str) -> bool {
        let extension = file_extension(file_name);
        self.supported_extensions
            .iter()
            .any(|supported| supported == "*" || (!extension.is_empty() && *supported == extension))
    }
}

pub trait PreviewHandler: Send + Sync {
    fn descriptor(&self) -> &HandlerDescriptor;

    /// Which extraction cascade runs once this handler is selected.
    fn category(&self) -> DocumentCategory;

    /// A specific MIME type is authoritative; the extension only breaks the
    /// tie when the MIME type is generic or absent.
    fn can_handle(&self, mime_type: &str, file_name: &str) -> bool {
        let descriptor = self.descriptor();
        if is_generic_mime(mime_type) {
            descriptor.matches_mime(mime_type) || descriptor.matches_extension(file_name)
        } else {
            descriptor.matches_mime(mime_type)
        }
    }
}

/// A handler that routes to one of the built-in cascades.
#[derive(Debug, Clone)]
pub struct CategoryHandler {
    descriptor: HandlerDescriptor,
    category: DocumentCategory,
}

impl CategoryHandler {
    pub fn new(descriptor: HandlerDescriptor, category: DocumentCategory) -> Self {
        Self { descriptor, category }
    }
}

impl PreviewHandler for CategoryHandler {
    fn descriptor(&self) -> &HandlerDescriptor {
        &self.descriptor
    }

    fn category(&self) -> DocumentCategory {
        self.category
    }
}

#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn PreviewHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One handler per built-in category.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CategoryHandler::new(
            HandlerDescriptor::new(
                "word",
                100,
                &[
                    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                    "application/vnd.openxmlformats-officedocument.wordprocessingml.template",
                    "application/vnd.ms-word.document.macroenabled.12",
                    "application/msword",
                ],
                &["docx", "docm", "dotx", "dotm", "doc", "dot"],
            ),
            DocumentCategory::Word,
        )));
        registry.register(Arc::new(CategoryHandler::new(
            HandlerDescriptor::new(
                "sheet",
                100,
                &[
                    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                    "application/vnd.openxmlformats-officedocument.spreadsheetml.template",
                    "application/vnd.ms-excel.sheet.macroenabled.12",
                    "application/vnd.ms-excel",
                    "application/vnd.oasis.opendocument.spreadsheet",
                ],
                &["xlsx", "xlsm", "xltx", "xltm", "xls", "xlsb", "ods"],
            ),
            DocumentCategory::Sheet,
        )));
        registry.register(Arc::new(CategoryHandler::new(
            HandlerDescriptor::new(
                "slide",
                100,
                &[
                    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
                    "application/vnd.openxmlformats-officedocument.presentationml.slideshow",
                    "application/vnd.ms-powerpoint.presentation.macroenabled.12",
                    "application/vnd.ms-powerpoint",
                ],
                &["pptx", "pptm", "potx", "ppsx", "ppt", "pps"],
            ),
            DocumentCategory::Slide,
        )));
        registry.register(Arc::new(CategoryHandler::new(
            HandlerDescriptor::new("pdf", 100, &["application/pdf", "application/x-pdf"], &["pdf"]),
            DocumentCategory::Pdf,
        )));
        registry.register(Arc::new(CategoryHandler::new(
            HandlerDescriptor::new(
                "text",
                50,
                &["text/*", "application/json", "application/xml", "application/x-yaml"],
                &[
                    "txt", "md", "markdown", "csv", "tsv", "log", "json", "xml", "yaml", "yml", "ini", "cfg", "toml",
                ],
            ),
            DocumentCategory::Text,
        )));
        registry.register(Arc::new(CategoryHandler::new(
            HandlerDescriptor::new("generic", 0, &["*"], &["*"]),
            DocumentCategory::Generic,
        )));
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn PreviewHandler>) {
        log::debug!(
            "Registered preview handler {} (priority {})",
            handler.descriptor().name,
            handler.descriptor().priority
        );
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// The highest-priority capable handler; the earliest registered wins a tie.
    /// When no handler accepts the MIME type the extension alone decides.
    pub fn select_handler(&self, mime_type: &str, file_name: &str) -> Option<Arc<dyn PreviewHandler>> {
        self.best_where(|handler| handler.can_handle(mime_type, file_name))
            .or_else(|| self.best_where(|handler| handler.descriptor().matches_extension(file_name)))
    }

    fn best_where(&self, accepts: impl Fn(&dyn PreviewHandler) -> bool) -> Option<Arc<dyn PreviewHandler>> {
        let mut best: Option<&Arc<dyn PreviewHandler>> = None;
        for handler in &self.handlers {
            if !accepts(handler.as_ref()) {
                continue;
            }
            let better = best.is_none_or(|b| handler.descriptor().priority > b.descriptor().priority);
            if better {
                best = Some(handler);
            }
        }
        best.cloned()
    }
}
