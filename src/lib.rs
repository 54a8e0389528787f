/// Office Preview - content extraction for document previews
/// Turns Word, Excel, PowerPoint, PDF and text files into render-agnostic
/// text, HTML fragments, tables, images and statistics, falling back through
/// ordered strategies so every input yields something to show.

pub mod binary_scanner;
pub mod cascade;
pub mod config;
pub mod container;
pub mod content_validator;
pub mod dispatcher;
pub mod document_parser;
pub mod error;
pub mod fast_pdf_extractor;
mod fragment;
pub mod media;
pub mod metadata;
pub mod pipeline;
pub mod plain_text;
pub mod powerpoint_parser;
pub mod shared_utils;
pub mod spreadsheet_parser;
pub mod statistics;
pub mod types;
pub mod xml_text;

/// Re-export the previewer for direct usage
pub use pipeline::{Previewer, mime_from_extension};

/// Re-export configuration and errors
pub use config::PreviewConfig;
pub use error::{PreviewError, Result};

/// Re-export the data model
pub use types::{
    DocumentCategory,
    DocumentMetadata,
    DocumentPreview,
    DocumentSection,
    ExtractionMethod,
    ExtractionResult,
    ImageAsset,
    StructuredDocument,
    Table,
    ValidationVerdict,
};
pub use metadata::DocumentProperties;

/// Re-export the pipeline components
pub use binary_scanner::{BinaryScanStrategy, BinaryTextScanner};
pub use cascade::{BackendSet, DocumentInput, ExtractionStrategy, ExtractionStrategyCascade, StrategyOutcome};
pub use container::{ContainerEntry, OoxmlContainer};
pub use content_validator::{ContainerKind, ContentValidator};
pub use dispatcher::{CategoryHandler, HandlerDescriptor, HandlerRegistry, PreviewHandler};
pub use fast_pdf_extractor::{PdfEngine, PdfEngineStrategy};
pub use media::MediaExtractor;
