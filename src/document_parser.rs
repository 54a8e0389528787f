use anyhow::anyhow;
use docx_rs::{
    Break, BreakType, DocumentChild, InsertChild, MoveToChild, ParagraphChild, RunChild, TableCellContent, TableChild,
    TableRowChild,
};

use crate::cascade::{DocumentInput, ExtractionStrategy, RAW_THRESHOLD, RICH_THRESHOLD};
use crate::config::PreviewConfig;
use crate::container::{OoxmlContainer, parse_relationships, relationships_path};
use crate::error::{PreviewError, Result};
use crate::fragment::SectionWriter;
use crate::media::{MediaExtractor, PageRelationships};
use crate::metadata::{DocumentProperties, read_properties};
use crate::shared_utils::html_to_text;
use crate::types::{ExtractionMethod, ExtractionResult, ImageAsset, Table};
use crate::xml_text::{Block, heading_level, scan_part};

pub const DOCUMENT_PART: &str = "word/document.xml";

/// Images, properties and warnings gathered from the container around the
/// main document part.
struct Surroundings {
    images: Vec<ImageAsset>,
    properties: DocumentProperties,
    relationships_xml: String,
    warnings: Vec<String>,
}

fn read_surroundings(container: &mut OoxmlContainer<'_>, config: &PreviewConfig) -> Surroundings {
    let relationships_xml = container
        .read_optional_text(&relationships_path(DOCUMENT_PART))
        .unwrap_or_default();
    let pages = [PageRelationships {
        page_index: 1,
        rels_xml: relationships_xml.clone(),
    }];
    let media = MediaExtractor::new(config).extract(container, &pages);
    Surroundings {
        images: media.images,
        properties: read_properties(container),
        relationships_xml,
        warnings: media.warnings,
    }
}

/// Rich conversion through docx-rs.
pub struct DocxConversionStrategy;

impl ExtractionStrategy for DocxConversionStrategy {
    fn name(&self) -> &'static str {
        "docx_conversion"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::DocxConversion
    }

    fn threshold(&self) -> usize {
        RICH_THRESHOLD
    }

    fn time_budget(&self, config: &PreviewConfig) -> std::time::Duration {
        config.backend_timeout
    }

    fn extract(&self, input: &DocumentInput, config: &PreviewConfig) -> Result<ExtractionResult> {
        let docx = docx_rs::read_docx(&input.bytes)
            .map_err(|e| anyhow!("Failed to parse DOCX content: {}", e))
            .map_err(|e| PreviewError::backend("docx-rs", e))?;

        let surroundings = match OoxmlContainer::open(&input.bytes, config.max_entry_size) {
            Ok(mut container) => read_surroundings(&mut container, config),
            Err(e) => {
                log::warn!("Could not reopen {} for media and properties: {}", input.file_name, e);
                Surroundings {
                    images: Vec::new(),
                    properties: DocumentProperties::default(),
                    relationships_xml: String::new(),
                    warnings: Vec::new(),
                }
            }
        };

        let mut writer = SectionWriter::new(surroundings.images);
        let mut page_breaks = 0;
        for child in &docx.document.children {
            match child {
                DocumentChild::Paragraph(paragraph) => page_breaks += write_paragraph(&mut writer, paragraph),
                DocumentChild::Table(table) => {
                    let mut tables = Vec::new();
                    collect_tables(table, &mut tables);
                    for table in tables {
                        writer.table(table);
                    }
                }
                _ => {}
            }
        }

        let attribute = if page_breaks > 0 { Some("data-page") } else { None };
        let (html, document) = writer.finish(attribute, false, surroundings.properties);
        let plain = html_to_text(&html);
        Ok(ExtractionResult::html(html, plain, self.method())
            .with_document(document)
            .with_warnings(surroundings.warnings))
    }
}

/// Write one paragraph, starting a new section at every page break inside
/// it. Returns the number of page breaks seen.
fn write_paragraph(writer: &mut SectionWriter, paragraph: &docx_rs::Paragraph) -> usize {
    let pieces = paragraph_pieces(paragraph);
    let heading = paragraph
        .property
        .style
        .as_ref()
        .and_then(|style| heading_level(&style.val));

    for (i, text) in pieces.iter().enumerate() {
        if i > 0 {
            writer.break_section();
            writer.paragraph(text);
            continue;
        }
        match heading {
            Some(level) => writer.heading(level, text),
            None if paragraph.property.numbering_property.is_some() => writer.bullet(text),
            None => writer.paragraph(text),
        }
    }
    pieces.len() - 1
}

/// Paragraph text split at page breaks; never empty.
fn paragraph_pieces(paragraph: &docx_rs::Paragraph) -> Vec<String> {
    let mut pieces = vec![String::new()];
    push_children(&paragraph.children, &mut pieces);
    pieces
}

fn push_children(children: &[ParagraphChild], pieces: &mut Vec<String>) {
    for child in children {
        match child {
            ParagraphChild::Run(run) => push_run(run, pieces),
            ParagraphChild::Hyperlink(link) => push_children(&link.children, pieces),
            ParagraphChild::Insert(insert) => {
                for inserted in &insert.children {
                    if let InsertChild::Run(run) = inserted {
                        push_run(run, pieces);
                    }
                }
            }
            ParagraphChild::MoveTo(moved) => {
                for inserted in &moved.children {
                    if let MoveToChild::Run(run) = inserted {
                        push_run(run, pieces);
                    }
                }
            }
            _ => {}
        }
    }
}

fn push_run(run: &docx_rs::Run, pieces: &mut Vec<String>) {
    for run_child in &run.children {
        match run_child {
            RunChild::Break(br) if *br == Break::new(BreakType::Page) => pieces.push(String::new()),
            other => {
                let Some(text) = pieces.last_mut() else {
                    continue;
                };
                match other {
                    RunChild::Text(t) => text.push_str(&t.text),
                    RunChild::Tab(_) => text.push('\t'),
                    RunChild::Break(_) => text.push('\n'),
                    _ => {}
                }
            }
        }
    }
}

fn paragraph_text(paragraph: &docx_rs::Paragraph) -> String {
    paragraph_pieces(paragraph).join("\n")
}

/// Flatten a table and, after it, every table nested in its cells.
fn collect_tables(table: &docx_rs::Table, out: &mut Vec<Table>) {
    let mut rows = Vec::new();
    let mut nested = Vec::new();

    for row_child in &table.rows {
        let TableChild::TableRow(row) = row_child else {
            continue;
        };
        let mut cells = Vec::new();
        for cell_child in &row.cells {
            let TableRowChild::TableCell(cell) = cell_child else {
                continue;
            };
            let mut lines = Vec::new();
            for content in &cell.children {
                match content {
                    TableCellContent::Paragraph(paragraph) => {
                        let text = paragraph_text(paragraph);
                        if !text.trim().is_empty() {
                            lines.push(text.trim().to_string());
                        }
                    }
                    TableCellContent::Table(inner) => nested.push(inner),
                    _ => {}
                }
            }
            cells.push(lines.join("\n"));
        }
        rows.push(cells);
    }

    out.push(Table::new(rows, false));
    for inner in nested {
        collect_tables(inner, out);
    }
}

/// Container and document XML scanning with structure.
pub struct OoxmlDocumentStrategy;

impl ExtractionStrategy for OoxmlDocumentStrategy {
    fn name(&self) -> &'static str {
        "ooxml_document"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::OoxmlStructured
    }

    fn threshold(&self) -> usize {
        RAW_THRESHOLD
    }

    fn extract(&self, input: &DocumentInput, config: &PreviewConfig) -> Result<ExtractionResult> {
        let mut container = OoxmlContainer::open(&input.bytes, config.max_entry_size)?;
        let xml = container.read_text(DOCUMENT_PART)?;
        let surroundings = read_surroundings(&mut container, config);
        let relationships = parse_relationships(&surroundings.relationships_xml);

        let part = scan_part(DOCUMENT_PART, &xml);
        let mut warnings = surroundings.warnings;
        warnings.extend(part.error_warning(DOCUMENT_PART));

        let mut writer = SectionWriter::new(surroundings.images);
        let mut page_breaks = 0;
        for block in part.blocks {
            match block {
                Block::Paragraph(p) => match (p.heading, p.bullet) {
                    (Some(level), _) => writer.heading(level, &p.text),
                    (None, true) => writer.bullet(&p.text),
                    (None, false) => writer.paragraph(&p.text),
                },
                Block::Table(table) => writer.table(table),
                Block::PageBreak => {
                    writer.break_section();
                    page_breaks += 1;
                }
                Block::Image(rel_id) => {
                    if let Some(rel) = relationships.iter().find(|r| r.id == rel_id && !r.external) {
                        let name = rel.target.rsplit('/').next().unwrap_or(&rel.target);
                        writer.image(name);
                    }
                }
            }
        }

        let attribute = if page_breaks > 0 { Some("data-page") } else { None };
        let (html, document) = writer.finish(attribute, false, surroundings.properties);
        log::debug!(
            "{}: {} sections, {} tables from {}",
            input.file_name,
            document.sections.len(),
            document.table_count(),
            DOCUMENT_PART
        );
        let plain = html_to_text(&html);
        Ok(ExtractionResult::html(html, plain, self.method())
            .with_document(document)
            .with_warnings(warnings))
    }
}
