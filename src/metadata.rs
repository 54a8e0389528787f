//! Document properties from `docProps/core.xml` and `docProps/app.xml`.

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::container::OoxmlContainer;
use crate::shared_utils::decode_entities;

const CORE_PROPERTIES: &str = "docProps/core.xml";
const APP_PROPERTIES: &str = "docProps/app.xml";

lazy_static::lazy_static! {
    static ref PROPERTY: Regex =
        Regex::new(r"(?s)<(?:[A-Za-z][\w.-]*:)?([A-Za-z]+)(?:\s[^>]*)?>([^<]*)</(?:[A-Za-z][\w.-]*:)?([A-Za-z]+)>").unwrap();
}

/// Author-declared properties. Absent parts leave every field empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentProperties {
    pub title: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub keywords: Option<String>,
    pub description: Option<String>,
    pub last_modified_by: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub application: Option<String>,
    pub company: Option<String>,
    pub declared_pages: Option<usize>,
    pub declared_words: Option<usize>,
    pub declared_slides: Option<usize>,
}

impl DocumentProperties {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Read both property parts from an open container.
pub fn read_properties(container: &mut OoxmlContainer<'_>) -> DocumentProperties {
    let mut properties = DocumentProperties::default();
    if let Some(core) = container.read_optional_text(CORE_PROPERTIES) {
        apply_core(&mut properties, &core);
    }
    if let Some(app) = container.read_optional_text(APP_PROPERTIES) {
        apply_app(&mut properties, &app);
    }
    properties
}

/// Simple `name -> value` pairs of a flat properties part.
fn properties_of(xml: &str) -> Vec<(String, String)> {
    PROPERTY
        .captures_iter(xml)
        .filter(|caps| caps[1] == caps[3])
        .map(|caps| (caps[1].to_string(), decode_entities(caps[2].trim())))
        .filter(|(_, value)| !value.is_empty())
        .collect()
}

fn apply_core(properties: &mut DocumentProperties, xml: &str) {
    for (name, value) in properties_of(xml) {
        match name.as_str() {
            "title" => properties.title = Some(value),
            "subject" => properties.subject = Some(value),
            "creator" => properties.creator = Some(value),
            "keywords" => properties.keywords = Some(value),
            "description" => properties.description = Some(value),
            "lastModifiedBy" => properties.last_modified_by = Some(value),
            "created" => properties.created = parse_timestamp(&value),
            "modified" => properties.modified = parse_timestamp(&value),
            _ => {}
        }
    }
}

fn apply_app(properties: &mut DocumentProperties, xml: &str) {
    for (name, value) in properties_of(xml) {
        match name.as_str() {
            "Application" => properties.application = Some(value),
            "Company" => properties.company = Some(value),
            "Pages" => properties.declared_pages = value.parse().ok(),
            "Words" => properties.declared_words = value.parse().ok(),
            "Slides" => properties.declared_slides = value.parse().ok(),
            _ => {}
        }
    }
}

/// W3CDTF timestamps; a missing zone is taken as UTC.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    match NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        Ok(naive) => Some(naive.and_utc()),
        Err(e) => {
            log::debug!("Ignoring unparseable timestamp {:?}: {}", value, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::test_support::build_zip;
    use chrono::Datelike;

    const CORE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties"
    xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/"
    xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <dc:title>Budget &amp; Plan</dc:title>
  <dc:creator>J. Smith</dc:creator>
  <cp:lastModifiedBy>A. Jones</cp:lastModifiedBy>
  <cp:keywords></cp:keywords>
  <dcterms:created xsi:type="dcterms:W3CDTF">2023-04-05T10:20:30Z</dcterms:created>
  <dcterms:modified xsi:type="dcterms:W3CDTF">2024-01-02T03:04:05</dcterms:modified>
</cp:coreProperties>"#;

    const APP: &str = r#"<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties">
  <Application>Microsoft Office Word</Application><Pages>3</Pages><Words>812</Words>
  <Company>Acme</Company>
</Properties>"#;

    #[test]
    fn test_reads_core_and_app_properties() {
        let bytes = build_zip(&[
            (CORE_PROPERTIES, CORE.as_bytes()),
            (APP_PROPERTIES, APP.as_bytes()),
        ]);
        let mut container = OoxmlContainer::open(&bytes, 1 << 20).unwrap();
        let properties = read_properties(&mut container);

        assert_eq!(properties.title.as_deref(), Some("Budget & Plan"));
        assert_eq!(properties.creator.as_deref(), Some("J. Smith"));
        assert_eq!(properties.last_modified_by.as_deref(), Some("A. Jones"));
        assert_eq!(properties.keywords, None);
        assert_eq!(properties.created.map(|d| d.year()), Some(2023));
        assert_eq!(properties.modified.map(|d| d.month()), Some(1));
        assert_eq!(properties.application.as_deref(), Some("Microsoft Office Word"));
        assert_eq!(properties.company.as_deref(), Some("Acme"));
        assert_eq!(properties.declared_pages, Some(3));
        assert_eq!(properties.declared_words, Some(812));
        assert_eq!(properties.declared_slides, None);
    }

    #[test]
    fn test_missing_parts_yield_defaults() {
        let bytes = build_zip(&[("word/document.xml", b"<w:document/>")]);
        let mut container = OoxmlContainer::open(&bytes, 1 << 20).unwrap();
        assert!(read_properties(&mut container).is_empty());
    }

    #[test]
    fn test_bad_timestamp_is_dropped() {
        assert_eq!(parse_timestamp("yesterday"), None);
        assert!(parse_timestamp("2020-02-29T00:00:00+02:00").is_some());
    }
}
