//! Tag-scoped text recovery from OOXML parts.
//!
//! This is not a schema-aware parser. Elements are matched by local name so
//! `w:p` and `a:p` are both paragraphs and prefix variations do not matter,
//! and only the handful of elements that carry text or structure are looked
//! at. Malformed XML ends the scan early but keeps what was recovered so far.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;

use crate::error::PreviewError;
use crate::shared_utils::{decode_entities, first_number, resolve_entity};
use crate::types::Table;

lazy_static::lazy_static! {
    static ref TEXT_RUN: Regex =
        Regex::new(r"<(?:[A-Za-z][\w.-]*:)?t(?:\s[^>]*)?>([^<]*)</(?:[A-Za-z][\w.-]*:)?t>").unwrap();
    static ref PARAGRAPH_END: Regex = Regex::new(r"</(?:[A-Za-z][\w.-]*:)?p>").unwrap();
}

/// One paragraph of running text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Paragraph {
    pub text: String,
    pub bullet: bool,
    /// Heading level from the paragraph style or outline level
    pub heading: Option<u8>,
    /// Index into [`ScannedPart::shapes`] for slide text
    pub shape: Option<usize>,
}

/// A drawing shape on a slide.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shape {
    pub name: String,
    /// Placeholder type (`title`, `ctrTitle`, `body`, `sldNum`, ...)
    pub placeholder: Option<String>,
}

impl Shape {
    pub fn is_title(&self) -> bool {
        matches!(self.placeholder.as_deref(), Some("title") | Some("ctrTitle"))
            || self.name.to_lowercase().starts_with("title")
    }
}

/// Structural pieces of a part, in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Paragraph(Paragraph),
    Table(Table),
    /// Explicit page break (`w:br w:type="page"`)
    PageBreak,
    /// Embedded picture, by relationship id
    Image(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScannedPart {
    pub blocks: Vec<Block>,
    pub shapes: Vec<Shape>,
    /// Set when the scan stopped at malformed markup
    pub error: Option<String>,
}

impl ScannedPart {
    pub fn paragraphs(&self) -> impl Iterator<Item = &Paragraph> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Paragraph(p) => Some(p),
            _ => None,
        })
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Table(t) => Some(t),
            _ => None,
        })
    }

    /// Warning for a part whose scan stopped at malformed markup.
    pub fn error_warning(&self, part_name: &str) -> Option<String> {
        self.error.as_ref().map(|message| {
            let error = PreviewError::Xml {
                part: part_name.to_string(),
                message: message.clone(),
            };
            format!("{}; content after it was skipped", error)
        })
    }
}

#[derive(Debug, Default)]
struct TableFrame {
    rows: Vec<Vec<String>>,
    row: Option<Vec<String>>,
    cell: Option<String>,
    has_header: bool,
    /// Block position reserved when the table opened
    slot: usize,
}

#[derive(Debug, Default)]
struct PartScanner {
    blocks: Vec<Block>,
    shapes: Vec<Shape>,
    paragraphs: Vec<Paragraph>,
    tables: Vec<TableFrame>,
    current_shape: Option<usize>,
    in_text: bool,
    ppr_depth: usize,
    /// Depth inside `mc:Fallback`, whose content duplicates `mc:Choice`
    skip_depth: usize,
}

/// Scan a document, slide or notes part for paragraphs, tables, breaks and pictures.
pub fn scan_part(part_name: &str, xml: &str) -> ScannedPart {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().check_end_names = false;

    let mut scanner = PartScanner::default();
    let mut error = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => scanner.start(e),
            Ok(Event::Empty(ref e)) => scanner.empty(e),
            Ok(Event::End(ref e)) => scanner.end(e.local_name().as_ref()),
            Ok(Event::Text(ref e)) => {
                if scanner.collecting_text() {
                    scanner.push_text(&String::from_utf8_lossy(e));
                }
            }
            Ok(Event::GeneralRef(ref e)) => {
                if scanner.collecting_text() {
                    let name = String::from_utf8_lossy(e);
                    match resolve_entity(&name) {
                        Some(ch) => scanner.push_text(ch.encode_utf8(&mut [0u8; 4])),
                        None => scanner.push_text(&format!("&{};", name)),
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                log::warn!("Error parsing {}: {}", part_name, e);
                error = Some(e.to_string());
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    scanner.finish(error)
}

impl PartScanner {
    fn collecting_text(&self) -> bool {
        self.in_text && self.skip_depth == 0
    }

    fn start(&mut self, e: &BytesStart) {
        if self.skip_depth > 0 {
            self.skip_depth += 1;
            return;
        }
        match e.local_name().as_ref() {
            b"Fallback" => self.skip_depth = 1,
            b"p" => self.paragraphs.push(Paragraph {
                shape: self.current_shape,
                ..Paragraph::default()
            }),
            b"pPr" => self.ppr_depth += 1,
            b"t" => self.in_text = true,
            b"tbl" => self.tables.push(TableFrame {
                slot: self.blocks.len(),
                ..TableFrame::default()
            }),
            b"tr" => {
                if let Some(table) = self.tables.last_mut() {
                    table.row = Some(Vec::new());
                }
            }
            b"tc" => {
                if let Some(table) = self.tables.last_mut() {
                    table.cell = Some(String::new());
                }
            }
            b"sp" => {
                self.shapes.push(Shape::default());
                self.current_shape = Some(self.shapes.len() - 1);
            }
            _ => self.element(e),
        }
    }

    fn empty(&mut self, e: &BytesStart) {
        if self.skip_depth > 0 {
            return;
        }
        match e.local_name().as_ref() {
            // An empty paragraph still separates its neighbours
            b"p" => {
                self.paragraphs.push(Paragraph {
                    shape: self.current_shape,
                    ..Paragraph::default()
                });
                self.end_paragraph();
            }
            b"tc" => {
                if let Some(row) = self.tables.last_mut().and_then(|t| t.row.as_mut()) {
                    row.push(String::new());
                }
            }
            // Self-closing text element: present, just empty
            b"t" => {}
            _ => self.element(e),
        }
    }

    fn end(&mut self, name: &[u8]) {
        if self.skip_depth > 0 {
            self.skip_depth -= 1;
            return;
        }
        match name {
            b"p" => self.end_paragraph(),
            b"pPr" => self.ppr_depth = self.ppr_depth.saturating_sub(1),
            b"t" => self.in_text = false,
            b"tc" => {
                if let Some(table) = self.tables.last_mut() {
                    let cell = table.cell.take().unwrap_or_default();
                    table.row.get_or_insert_with(Vec::new).push(cell.trim().to_string());
                }
            }
            b"tr" => {
                if let Some(table) = self.tables.last_mut() {
                    if let Some(row) = table.row.take() {
                        table.rows.push(row);
                    }
                }
            }
            b"tbl" => self.end_table(),
            b"sp" => self.current_shape = None,
            _ => {}
        }
    }

    /// Elements that matter whether written as start tags or self-closing.
    fn element(&mut self, e: &BytesStart) {
        match e.local_name().as_ref() {
            b"pStyle" => {
                if let (Some(style), Some(paragraph)) = (attr(e, b"val"), self.paragraphs.last_mut()) {
                    paragraph.heading = heading_level(&style).or(paragraph.heading);
                }
            }
            b"outlineLvl" => {
                let level = attr(e, b"val").and_then(|v| v.parse::<u8>().ok());
                if let (Some(level), Some(paragraph)) = (level, self.paragraphs.last_mut()) {
                    // Level 9 is body text
                    if level < 9 {
                        paragraph.heading = Some(level + 1);
                    }
                }
            }
            b"numPr" | b"buChar" | b"buAutoNum" => {
                if self.ppr_depth > 0 {
                    if let Some(paragraph) = self.paragraphs.last_mut() {
                        paragraph.bullet = true;
                    }
                }
            }
            b"buNone" => {
                if let Some(paragraph) = self.paragraphs.last_mut() {
                    paragraph.bullet = false;
                }
            }
            b"ph" => {
                if let Some(shape) = self.current_shape.and_then(|i| self.shapes.get_mut(i)) {
                    shape.placeholder = Some(attr(e, b"type").unwrap_or_else(|| "body".to_string()));
                }
            }
            b"cNvPr" => {
                if let Some(shape) = self.current_shape.and_then(|i| self.shapes.get_mut(i)) {
                    if shape.name.is_empty() {
                        shape.name = attr(e, b"name").unwrap_or_default();
                    }
                }
            }
            b"tblHeader" => {
                if let Some(table) = self.tables.last_mut() {
                    if table.rows.is_empty() {
                        table.has_header = true;
                    }
                }
            }
            b"tblPr" => {
                if attr(e, b"firstRow").as_deref() == Some("1") {
                    if let Some(table) = self.tables.last_mut() {
                        table.has_header = true;
                    }
                }
            }
            b"blip" => {
                if let Some(id) = attr(e, b"embed") {
                    self.blocks.push(Block::Image(id));
                }
            }
            b"imagedata" => {
                if let Some(id) = attr(e, b"id") {
                    self.blocks.push(Block::Image(id));
                }
            }
            b"br" if self.ppr_depth == 0 => {
                if attr(e, b"type").as_deref() == Some("page") {
                    self.page_break();
                } else {
                    self.push_text("\n");
                }
            }
            b"cr" if self.ppr_depth == 0 => self.push_text("\n"),
            b"tab" if self.ppr_depth == 0 => self.push_text("\t"),
            _ => {}
        }
    }

    fn push_text(&mut self, text: &str) {
        if let Some(paragraph) = self.paragraphs.last_mut() {
            paragraph.text.push_str(text);
        } else if let Some(cell) = self.tables.last_mut().and_then(|t| t.cell.as_mut()) {
            cell.push_str(text);
        }
    }

    fn in_cell(&self) -> bool {
        self.tables.last().is_some_and(|t| t.cell.is_some())
    }

    fn end_paragraph(&mut self) {
        let Some(mut paragraph) = self.paragraphs.pop() else {
            return;
        };
        paragraph.text = paragraph.text.trim().to_string();

        // Paragraphs nested in a text box are their own paragraphs, but a
        // paragraph inside a cell belongs to the cell
        if self.paragraphs.is_empty() && self.in_cell() {
            if let Some(cell) = self.tables.last_mut().and_then(|t| t.cell.as_mut()) {
                if !paragraph.text.is_empty() {
                    if !cell.is_empty() {
                        cell.push('\n');
                    }
                    cell.push_str(&paragraph.text);
                }
            }
            return;
        }
        self.blocks.push(Block::Paragraph(paragraph));
    }

    /// Close the text accumulated so far and record the break between pages.
    fn page_break(&mut self) {
        if self.in_cell() {
            return;
        }
        if let Some(paragraph) = self.paragraphs.last_mut() {
            let head = Paragraph {
                text: std::mem::take(&mut paragraph.text).trim().to_string(),
                ..paragraph.clone()
            };
            if !head.text.is_empty() {
                self.blocks.push(Block::Paragraph(head));
            }
        }
        self.blocks.push(Block::PageBreak);
    }

    fn end_table(&mut self) {
        let Some(mut frame) = self.tables.pop() else {
            return;
        };
        if let Some(cell) = frame.cell.take() {
            frame.row.get_or_insert_with(Vec::new).push(cell.trim().to_string());
        }
        if let Some(row) = frame.row.take() {
            frame.rows.push(row);
        }
        let table = Table::new(frame.rows, frame.has_header);
        // Nested tables land right after their parent, never inside it
        let slot = frame.slot.min(self.blocks.len());
        self.blocks.insert(slot, Block::Table(table));
    }

    fn finish(mut self, error: Option<String>) -> ScannedPart {
        while !self.paragraphs.is_empty() {
            self.end_paragraph();
        }
        while !self.tables.is_empty() {
            self.end_table();
        }
        ScannedPart {
            blocks: self.blocks,
            shapes: self.shapes,
            error,
        }
    }
}

/// Attribute value by local name, entity-decoded.
pub(crate) fn attr(e: &BytesStart, local: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == local)
        .map(|a| decode_entities(&String::from_utf8_lossy(&a.value)))
}

/// Heading level implied by a paragraph style id.
pub(crate) fn heading_level(style: &str) -> Option<u8> {
    let lower = style.to_lowercase();
    if lower.starts_with("heading") {
        let level = first_number(&lower).unwrap_or(1).clamp(1, 6);
        return Some(level as u8);
    }
    match lower.as_str() {
        "title" => Some(1),
        "subtitle" => Some(2),
        _ => None,
    }
}

/// Raw text runs grouped by paragraph, found with non-greedy tag matching.
///
/// Cheaper and more forgiving than [`scan_part`]; no structure survives.
pub fn text_runs(xml: &str) -> Vec<String> {
    PARAGRAPH_END
        .split(xml)
        .map(|chunk| {
            TEXT_RUN
                .captures_iter(chunk)
                .map(|caps| decode_entities(&caps[1]))
                .collect::<String>()
        })
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Overview</w:t></w:r></w:p>
    <w:p><w:r><w:t xml:space="preserve">Tom &amp; Jerry </w:t></w:r><w:r><w:t>went home.</w:t></w:r></w:p>
    <w:p><w:pPr><w:numPr><w:ilvl w:val="0"/><w:numId w:val="1"/></w:numPr></w:pPr><w:r><w:t>First point</w:t></w:r></w:p>
    <w:tbl>
      <w:tr><w:trPr><w:tblHeader/></w:trPr><w:tc><w:p><w:r><w:t>Name</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>Score</w:t></w:r></w:p></w:tc></w:tr>
      <w:tr><w:tc><w:p><w:r><w:t>Ada</w:t></w:r></w:p></w:tc></w:tr>
    </w:tbl>
    <w:p><w:r><w:t>Before</w:t></w:r><w:r><w:br w:type="page"/><w:t>After</w:t></w:r></w:p>
    <w:p><w:r><w:t/></w:r></w:p>
  </w:body>
</w:document>"#;

    #[test]
    fn test_document_paragraphs_headings_and_bullets() {
        let part = scan_part("word/document.xml", DOCUMENT);
        assert!(part.error.is_none());
        let paragraphs: Vec<&Paragraph> = part.paragraphs().collect();
        assert_eq!(paragraphs[0].text, "Overview");
        assert_eq!(paragraphs[0].heading, Some(1));
        assert_eq!(paragraphs[1].text, "Tom & Jerry went home.");
        assert!(paragraphs[2].bullet);
        assert!(!paragraphs[1].bullet);
    }

    #[test]
    fn test_ragged_table_structure() {
        let part = scan_part("word/document.xml", DOCUMENT);
        let tables: Vec<&Table> = part.tables().collect();
        assert_eq!(tables.len(), 1);
        let table = tables[0];
        assert_eq!(table.row_count, 2);
        assert_eq!(table.column_count, 2);
        assert_eq!(table.cells[0], vec!["Name", "Score"]);
        assert_eq!(table.cells[1], vec!["Ada"]);
        assert!(table.has_header_row);
        // Cell text never leaks into body paragraphs
        assert!(part.paragraphs().all(|p| p.text != "Ada"));
    }

    #[test]
    fn test_page_break_splits_paragraph() {
        let part = scan_part("word/document.xml", DOCUMENT);
        let position = part.blocks.iter().position(|b| *b == Block::PageBreak).unwrap();
        match (&part.blocks[position - 1], &part.blocks[position + 1]) {
            (Block::Paragraph(before), Block::Paragraph(after)) => {
                assert_eq!(before.text, "Before");
                assert_eq!(after.text, "After");
            }
            other => panic!("unexpected blocks around break: {:?}", other),
        }
    }

    #[test]
    fn test_self_closing_text_is_an_empty_paragraph() {
        let part = scan_part("word/document.xml", DOCUMENT);
        let last = part.paragraphs().last().unwrap();
        assert_eq!(last.text, "");
    }

    #[test]
    fn test_nested_tables_are_extracted_independently() {
        let xml = r#"<w:body xmlns:w="w">
            <w:tbl><w:tr>
              <w:tc><w:p><w:r><w:t>outer</w:t></w:r></w:p>
                <w:tbl><w:tr><w:tc><w:p><w:r><w:t>inner</w:t></w:r></w:p></w:tc></w:tr></w:tbl>
              </w:tc>
              <w:tc><w:p><w:r><w:t>right</w:t></w:r></w:p></w:tc>
            </w:tr></w:tbl></w:body>"#;
        let part = scan_part("word/document.xml", xml);
        let tables: Vec<&Table> = part.tables().collect();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].cells, vec![vec!["outer".to_string(), "right".to_string()]]);
        assert_eq!(tables[1].cells, vec![vec!["inner".to_string()]]);
    }

    #[test]
    fn test_slide_shapes_placeholders_and_bullets() {
        let xml = r#"<p:sld xmlns:p="p" xmlns:a="a"><p:cSld><p:spTree>
            <p:sp><p:nvSpPr><p:cNvPr id="2" name="Title 1"/><p:cNvSpPr/><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr>
              <p:txBody><a:p><a:r><a:t>Roadmap</a:t></a:r></a:p></p:txBody></p:sp>
            <p:sp><p:nvSpPr><p:cNvPr id="3" name="Content 2"/><p:nvPr><p:ph idx="1"/></p:nvPr></p:nvSpPr>
              <p:txBody><a:p><a:pPr><a:buChar char="•"/></a:pPr><a:r><a:t>Ship it</a:t></a:r></a:p>
              <a:p><a:r><a:t>Line one</a:t></a:r><a:br/><a:r><a:t>line two</a:t></a:r></a:p></p:txBody></p:sp>
            <p:pic><p:blipFill><a:blip r:embed="rId2" xmlns:r="r"/></p:blipFill></p:pic>
        </p:spTree></p:cSld></p:sld>"#;
        let part = scan_part("ppt/slides/slide1.xml", xml);
        assert_eq!(part.shapes.len(), 2);
        assert!(part.shapes[0].is_title());
        assert_eq!(part.shapes[1].placeholder.as_deref(), Some("body"));

        let paragraphs: Vec<&Paragraph> = part.paragraphs().collect();
        assert_eq!(paragraphs[0].shape, Some(0));
        assert!(paragraphs[1].bullet);
        assert_eq!(paragraphs[2].text, "Line one\nline two");
        assert!(part.blocks.contains(&Block::Image("rId2".to_string())));
    }

    #[test]
    fn test_fallback_content_is_not_duplicated() {
        let xml = r#"<w:p xmlns:w="w" xmlns:mc="mc"><w:r><mc:AlternateContent>
            <mc:Choice><w:t>box text</w:t></mc:Choice>
            <mc:Fallback><w:pict><w:t>box text</w:t></w:pict></mc:Fallback>
        </mc:AlternateContent></w:r></w:p>"#;
        let part = scan_part("word/document.xml", xml);
        let paragraphs: Vec<&Paragraph> = part.paragraphs().collect();
        assert_eq!(paragraphs.len(), 1);
        assert_eq!(paragraphs[0].text, "box text");
    }

    #[test]
    fn test_malformed_xml_keeps_partial_content() {
        let xml = r#"<w:body><w:p><w:r><w:t>kept</w:t></w:r></w:p><w:p><w:r><w:t>broken</w:r"#;
        let part = scan_part("word/document.xml", xml);
        assert!(part.paragraphs().any(|p| p.text == "kept"));
    }

    #[test]
    fn test_text_runs_groups_by_paragraph() {
        let xml = r#"<a:p><a:r><a:t>Hello</a:t></a:r><a:r><a:t xml:space="preserve"> world</a:t></a:r></a:p>
                     <a:p><a:r><a:t>R&amp;D</a:t></a:r><a:t/></a:p><a:p></a:p>"#;
        assert_eq!(text_runs(xml), vec!["Hello world", "R&D"]);
    }

    #[test]
    fn test_heading_level_from_style() {
        assert_eq!(heading_level("Heading2"), Some(2));
        assert_eq!(heading_level("heading 3"), Some(3));
        assert_eq!(heading_level("Title"), Some(1));
        assert_eq!(heading_level("Normal"), None);
    }
}
