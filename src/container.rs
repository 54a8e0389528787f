//! ZIP-structured document access.
//!
//! Opening a container only reads the central directory; entries are inflated
//! one at a time when asked for, and never beyond the configured size cap.

use std::io::{Cursor, Read};

use quick_xml::Reader;
use quick_xml::events::Event;
use zip::ZipArchive;

use crate::error::{PreviewError, Result};
use crate::shared_utils::natural_cmp;
use crate::xml_text::attr;

/// A named part read out of a container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerEntry {
    pub path: String,
    pub bytes: Vec<u8>,
}

impl ContainerEntry {
    /// Decode the part as UTF-8 text, dropping a byte-order mark.
    pub fn text(&self) -> String {
        let bytes = self.bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(&self.bytes);
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// An open OOXML (or any ZIP) container borrowed from the caller's bytes.
pub struct OoxmlContainer<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
    names: Vec<String>,
    max_entry_size: u64,
}

impl<'a> OoxmlContainer<'a> {
    /// Index the central directory of `bytes`.
    pub fn open(bytes: &'a [u8], max_entry_size: u64) -> Result<Self> {
        let archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| PreviewError::MalformedContainer(e.to_string()))?;
        let names = archive.file_names().map(str::to_string).collect();
        Ok(Self {
            archive,
            names,
            max_entry_size,
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.names.iter().any(|name| name == path)
    }

    /// Entry paths starting with `prefix`, in natural-numeric order.
    pub fn entries_under(&self, prefix: &str) -> Vec<String> {
        let mut matching: Vec<String> = self
            .names
            .iter()
            .filter(|name| name.starts_with(prefix) && !name.ends_with('/'))
            .cloned()
            .collect();
        matching.sort_by(|a, b| natural_cmp(a, b));
        matching
    }

    pub fn read_entry(&mut self, path: &str) -> Result<ContainerEntry> {
        let bytes = self.read_binary(path)?;
        Ok(ContainerEntry {
            path: path.to_string(),
            bytes,
        })
    }

    pub fn read_binary(&mut self, path: &str) -> Result<Vec<u8>> {
        let file = match self.archive.by_name(path) {
            Ok(file) => file,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(PreviewError::EntryNotFound(path.to_string()));
            }
            Err(e) => return Err(PreviewError::MalformedContainer(format!("{}: {}", path, e))),
        };
        if file.size() > self.max_entry_size {
            return Err(PreviewError::MalformedContainer(format!(
                "{} inflates to {} bytes, above the {} byte limit",
                path,
                file.size(),
                self.max_entry_size
            )));
        }

        // The declared size can lie; cap what is actually inflated as well
        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.take(self.max_entry_size + 1).read_to_end(&mut bytes)?;
        if bytes.len() as u64 > self.max_entry_size {
            return Err(PreviewError::MalformedContainer(format!(
                "{} exceeds the {} byte limit",
                path, self.max_entry_size
            )));
        }
        Ok(bytes)
    }

    pub fn read_text(&mut self, path: &str) -> Result<String> {
        Ok(self.read_entry(path)?.text())
    }

    /// Read a part that may legitimately be absent.
    pub fn read_optional_text(&mut self, path: &str) -> Option<String> {
        match self.read_text(path) {
            Ok(text) => Some(text),
            Err(PreviewError::EntryNotFound(_)) => None,
            Err(e) => {
                log::warn!("Skipping unreadable part {}: {}", path, e);
                None
            }
        }
    }
}

/// Path of the relationship part belonging to `part`
/// (`ppt/slides/slide3.xml` -> `ppt/slides/_rels/slide3.xml.rels`).
pub fn relationships_path(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// Resolve a relationship target relative to the part that declares it.
pub fn resolve_target(part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = match part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    for segment in target.split('/') {
        match segment {
            "." | "" => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// One `<Relationship>` of a `.rels` part.
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub id: String,
    /// Last segment of the relationship type URI (`image`, `notesSlide`, ...)
    pub kind: String,
    pub target: String,
    pub external: bool,
}

/// Parse a relationship part; malformed markup yields what was read so far.
pub fn parse_relationships(xml: &str) -> Vec<Relationship> {
    let mut reader = Reader::from_str(xml);
    let mut relationships = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if let (Some(id), Some(target)) = (attr(e, b"Id"), attr(e, b"Target")) {
                    let kind = attr(e, b"Type")
                        .and_then(|t| t.rsplit('/').next().map(str::to_string))
                        .unwrap_or_default();
                    relationships.push(Relationship {
                        id,
                        kind,
                        target,
                        external: attr(e, b"TargetMode").as_deref() == Some("External"),
                    });
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                log::warn!("Error parsing relationships: {}", e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }
    relationships
}
