//! Workbooks: calamine first, then the worksheet XML itself.
//!
//! Both strategies emit one `<section data-sheet="n">` per sheet with the
//! sheet name as its heading and the used range as a table. Rows past
//! `max_sheet_rows` are dropped with a warning.

use std::io::Cursor;

use anyhow::Context;
use calamine::{Data, Reader, open_workbook_auto_from_rs};
use quick_xml::Reader as XmlReader;
use quick_xml::events::Event;
use regex::Regex;

use crate::cascade::{DocumentInput, ExtractionStrategy, RAW_THRESHOLD, RICH_THRESHOLD};
use crate::config::PreviewConfig;
use crate::container::{OoxmlContainer, parse_relationships, relationships_path, resolve_target};
use crate::error::{PreviewError, Result};
use crate::fragment::SectionWriter;
use crate::media::{MediaExtractor, PageRelationships};
use crate::metadata::{DocumentProperties, read_properties};
use crate::shared_utils::{html_to_text, resolve_entity};
use crate::types::{ExtractionMethod, ExtractionResult, ImageAsset, Table};
use crate::xml_text::attr;

const WORKBOOK_PART: &str = "xl/workbook.xml";

lazy_static::lazy_static! {
    static ref WORKSHEET_PART: Regex = Regex::new(r"^xl/worksheets/sheet(\d+)\.xml$").unwrap();
}

/// A sheet as declared by the workbook part.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRef {
    pub name: String,
    pub path: String,
}

/// Sheets in workbook order, resolved through the workbook relationships.
///
/// Without a usable workbook part, falls back to the worksheet parts in
/// numeric order named `Sheet1`, `Sheet2`, ...
pub fn workbook_sheets(container: &mut OoxmlContainer<'_>) -> Vec<SheetRef> {
    let declared = container
        .read_optional_text(WORKBOOK_PART)
        .map(|xml| declared_sheets(&xml))
        .unwrap_or_default();
    let relationships = container
        .read_optional_text(&relationships_path(WORKBOOK_PART))
        .map(|xml| parse_relationships(&xml))
        .unwrap_or_default();

    let sheets: Vec<SheetRef> = declared
        .into_iter()
        .filter_map(|(name, rel_id)| {
            let rel = relationships.iter().find(|r| r.id == rel_id)?;
            Some(SheetRef {
                name,
                path: resolve_target(WORKBOOK_PART, &rel.target),
            })
        })
        .filter(|sheet| container.contains(&sheet.path))
        .collect();
    if !sheets.is_empty() {
        return sheets;
    }

    let mut numbered: Vec<(usize, String)> = container
        .entries_under("xl/worksheets/")
        .into_iter()
        .filter_map(|path| {
            let number = WORKSHEET_PART.captures(&path)?.get(1)?.as_str().parse().ok()?;
            Some((number, path))
        })
        .collect();
    numbered.sort_by_key(|(number, _)| *number);
    numbered
        .into_iter()
        .map(|(number, path)| SheetRef {
            name: format!("Sheet{}", number),
            path,
        })
        .collect()
}

/// `(name, relationship id)` of every `<sheet>` in the workbook part.
fn declared_sheets(xml: &str) -> Vec<(String, String)> {
    let mut reader = XmlReader::from_str(xml);
    let mut sheets = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"sheet" => {
                if let (Some(name), Some(id)) = (attr(e, b"name"), attr(e, b"id")) {
                    sheets.push((name, id));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                log::warn!("Error parsing {}: {}", WORKBOOK_PART, e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }
    sheets
}

/// The shared string table; phonetic runs (`rPh`) are left out.
pub fn parse_shared_strings(xml: &str) -> Vec<String> {
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().check_end_names = false;
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    let mut phonetic_depth = 0usize;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"rPh" => phonetic_depth += 1,
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"si" => {
                    if let Some(text) = current.take() {
                        strings.push(text);
                    }
                }
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Text(ref e)) if in_text && phonetic_depth == 0 => {
                if let Some(text) = current.as_mut() {
                    text.push_str(&String::from_utf8_lossy(e));
                }
            }
            Ok(Event::GeneralRef(ref e)) if in_text && phonetic_depth == 0 => {
                if let (Some(text), Some(ch)) = (current.as_mut(), resolve_entity(&String::from_utf8_lossy(e))) {
                    text.push(ch);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                log::warn!("Error parsing shared strings: {}", e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }
    strings
}

/// Columns in a worksheet; the last one is `XFD`.
pub const MAX_COLUMNS: usize = 16_384;

/// Zero-based column of a cell reference (`A1` -> 0, `AB7` -> 27).
///
/// References past `XFD` are rejected.
pub fn column_index(reference: &str) -> Option<usize> {
    let mut number = 0usize;
    for c in reference.chars().take_while(|c| c.is_ascii_alphabetic()) {
        let digit = c.to_ascii_uppercase() as usize - 'A' as usize + 1;
        number = number.checked_mul(26)?.checked_add(digit)?;
        if number > MAX_COLUMNS {
            return None;
        }
    }
    number.checked_sub(1)
}

/// Cell under construction.
#[derive(Default)]
struct CellState {
    column: usize,
    kind: Option<String>,
    value: String,
    in_value: bool,
}

/// Rows of a worksheet part, at most `max_rows` non-empty ones.
///
/// Returns the rows and whether more were left unread.
pub fn parse_worksheet(xml: &str, shared_strings: &[String], max_rows: usize) -> (Vec<Vec<String>>, bool) {
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().check_end_names = false;
    let mut rows = Vec::new();
    let mut row: Option<Vec<String>> = None;
    let mut cell: Option<CellState> = None;
    let mut truncated = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"row" => {
                    if rows.len() >= max_rows {
                        truncated = true;
                        break;
                    }
                    row = Some(Vec::new());
                }
                b"c" => {
                    let next_column = row.as_ref().map_or(0, Vec::len);
                    cell = Some(CellState {
                        column: attr(e, b"r").and_then(|r| column_index(&r)).unwrap_or(next_column),
                        kind: attr(e, b"t"),
                        ..CellState::default()
                    });
                }
                b"v" | b"t" => {
                    if let Some(cell) = cell.as_mut() {
                        cell.in_value = true;
                    }
                }
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"v" | b"t" => {
                    if let Some(cell) = cell.as_mut() {
                        cell.in_value = false;
                    }
                }
                b"c" => {
                    if let (Some(done), Some(row)) = (cell.take(), row.as_mut()) {
                        if done.column >= MAX_COLUMNS {
                            log::debug!("Skipping cell beyond column XFD");
                        } else {
                            let value = cell_value(&done, shared_strings);
                            if row.len() <= done.column {
                                row.resize(done.column + 1, String::new());
                            }
                            row[done.column] = value;
                        }
                    }
                }
                b"row" => {
                    if let Some(mut done) = row.take() {
                        while done.last().is_some_and(|v| v.is_empty()) {
                            done.pop();
                        }
                        if !done.is_empty() {
                            rows.push(done);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                if let Some(cell) = cell.as_mut().filter(|c| c.in_value) {
                    cell.value.push_str(&String::from_utf8_lossy(e));
                }
            }
            Ok(Event::GeneralRef(ref e)) => {
                if let Some(cell) = cell.as_mut().filter(|c| c.in_value) {
                    if let Some(ch) = resolve_entity(&String::from_utf8_lossy(e)) {
                        cell.value.push(ch);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                log::warn!("Error parsing worksheet: {}", e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }
    (rows, truncated)
}

fn cell_value(cell: &CellState, shared_strings: &[String]) -> String {
    let raw = cell.value.trim();
    match cell.kind.as_deref() {
        Some("s") => raw
            .parse::<usize>()
            .ok()
            .and_then(|i| shared_strings.get(i))
            .cloned()
            .unwrap_or_default(),
        Some("b") => match raw {
            "1" => "TRUE".to_string(),
            "0" => "FALSE".to_string(),
            other => other.to_string(),
        },
        _ => raw.to_string(),
    }
}

/// Relationship text a sheet's pictures are reachable from: the sheet's own
/// relationships plus those of its drawings.
fn sheet_relationships(container: &mut OoxmlContainer<'_>, sheet_path: &str) -> String {
    let mut text = container
        .read_optional_text(&relationships_path(sheet_path))
        .unwrap_or_default();
    let drawings: Vec<String> = parse_relationships(&text)
        .into_iter()
        .filter(|r| r.kind == "drawing" && !r.external)
        .map(|r| resolve_target(sheet_path, &r.target))
        .collect();
    for drawing in drawings {
        if let Some(rels) = container.read_optional_text(&relationships_path(&drawing)) {
            text.push('\n');
            text.push_str(&rels);
        }
    }
    text
}

/// Images and properties read straight from the package, when it is one.
struct PackageExtras {
    images: Vec<ImageAsset>,
    properties: DocumentProperties,
    warnings: Vec<String>,
}

fn package_extras(container: &mut OoxmlContainer<'_>, sheets: &[SheetRef], config: &PreviewConfig) -> PackageExtras {
    let pages: Vec<PageRelationships> = sheets
        .iter()
        .enumerate()
        .map(|(position, sheet)| PageRelationships {
            page_index: position + 1,
            rels_xml: sheet_relationships(container, &sheet.path),
        })
        .collect();
    let media = MediaExtractor::new(config).extract(container, &pages);
    PackageExtras {
        images: media.images,
        properties: read_properties(container),
        warnings: media.warnings,
    }
}

fn truncation_warning(sheet: &str, max_rows: usize) -> String {
    format!("Sheet '{}' was truncated to its first {} rows", sheet, max_rows)
}

fn finish_workbook(
    sheets: Vec<(String, Vec<Vec<String>>)>,
    extras: PackageExtras,
    method: ExtractionMethod,
    mut warnings: Vec<String>,
) -> ExtractionResult {
    let mut writer = SectionWriter::new(extras.images);
    for (position, (name, rows)) in sheets.into_iter().enumerate() {
        if position > 0 {
            writer.break_section();
        }
        writer.heading(2, &name);
        writer.table(Table::new(rows, false));
    }
    let (html, document) = writer.finish(Some("data-sheet"), true, extras.properties);
    warnings.extend(extras.warnings);
    let plain = html_to_text(&html);
    ExtractionResult::html(html, plain, method)
        .with_document(document)
        .with_warnings(warnings)
}

fn data_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// Any workbook calamine can open: xlsx, xlsm, xlsb, xls and ods.
pub struct WorkbookLibraryStrategy;

impl ExtractionStrategy for WorkbookLibraryStrategy {
    fn name(&self) -> &'static str {
        "spreadsheet_library"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::SpreadsheetLibrary
    }

    fn threshold(&self) -> usize {
        RICH_THRESHOLD
    }

    fn time_budget(&self, config: &PreviewConfig) -> std::time::Duration {
        config.backend_timeout
    }

    fn extract(&self, input: &DocumentInput, config: &PreviewConfig) -> Result<ExtractionResult> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(input.bytes.clone()))
            .with_context(|| format!("Failed to open workbook: {}", input.file_name))
            .map_err(|e| PreviewError::backend("calamine", e))?;

        let mut warnings = Vec::new();
        let mut sheets = Vec::new();
        for name in workbook.sheet_names().to_owned() {
            let range = match workbook.worksheet_range(&name) {
                Ok(range) => range,
                Err(e) => {
                    log::warn!("Skipping sheet '{}' of {}: {}", name, input.file_name, e);
                    warnings.push(format!("Sheet '{}' could not be read", name));
                    continue;
                }
            };
            let mut rows: Vec<Vec<String>> = range
                .rows()
                .map(|row| row.iter().map(data_to_string).collect::<Vec<_>>())
                .filter(|row| row.iter().any(|cell| !cell.is_empty()))
                .collect();
            if rows.len() > config.max_sheet_rows {
                rows.truncate(config.max_sheet_rows);
                warnings.push(truncation_warning(&name, config.max_sheet_rows));
            }
            sheets.push((name, rows));
        }

        // Legacy .xls and .ods are not OOXML packages and carry no extras here
        let extras = match OoxmlContainer::open(&input.bytes, config.max_entry_size) {
            Ok(mut container) => {
                let refs = workbook_sheets(&mut container);
                package_extras(&mut container, &refs, config)
            }
            Err(_) => PackageExtras {
                images: Vec::new(),
                properties: DocumentProperties::default(),
                warnings: Vec::new(),
            },
        };

        log::debug!("calamine read {} sheets from {}", sheets.len(), input.file_name);
        Ok(finish_workbook(sheets, extras, self.method(), warnings))
    }
}

/// Worksheet parts read directly, for packages calamine rejects.
pub struct WorksheetXmlStrategy;

impl ExtractionStrategy for WorksheetXmlStrategy {
    fn name(&self) -> &'static str {
        "ooxml_worksheets"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::OoxmlStructured
    }

    fn threshold(&self) -> usize {
        RAW_THRESHOLD
    }

    fn extract(&self, input: &DocumentInput, config: &PreviewConfig) -> Result<ExtractionResult> {
        let mut container = OoxmlContainer::open(&input.bytes, config.max_entry_size)?;
        let refs = workbook_sheets(&mut container);
        if refs.is_empty() {
            return Err(PreviewError::EntryNotFound(WORKBOOK_PART.to_string()));
        }

        let shared_strings = container
            .read_optional_text("xl/sharedStrings.xml")
            .map(|xml| parse_shared_strings(&xml))
            .unwrap_or_default();

        let mut warnings = Vec::new();
        let mut sheets = Vec::with_capacity(refs.len());
        for sheet in &refs {
            let rows = match container.read_text(&sheet.path) {
                Ok(xml) => {
                    let (rows, truncated) = parse_worksheet(&xml, &shared_strings, config.max_sheet_rows);
                    if truncated {
                        warnings.push(truncation_warning(&sheet.name, config.max_sheet_rows));
                    }
                    rows
                }
                Err(e) => {
                    log::warn!("Skipping worksheet {}: {}", sheet.path, e);
                    warnings.push(format!("Sheet '{}' could not be read", sheet.name));
                    Vec::new()
                }
            };
            sheets.push((sheet.name.clone(), rows));
        }

        let extras = package_extras(&mut container, &refs, config);
        Ok(finish_workbook(sheets, extras, self.method(), warnings))
    }
}
