use regex::Regex;

use crate::cascade::{DocumentInput, ExtractionStrategy, RAW_THRESHOLD};
use crate::config::PreviewConfig;
use crate::container::{OoxmlContainer, Relationship, parse_relationships, relationships_path, resolve_target};
use crate::error::{PreviewError, Result};
use crate::fragment::SectionWriter;
use crate::media::{MediaExtractor, PageRelationships};
use crate::metadata::read_properties;
use crate::shared_utils::html_to_text;
use crate::types::{DocumentSection, ExtractionMethod, ExtractionResult, StructuredDocument};
use crate::xml_text::{Block, Paragraph, ScannedPart, scan_part, text_runs};

lazy_static::lazy_static! {
    static ref SLIDE_PART: Regex = Regex::new(r"^ppt/slides/slide(\d+)\.xml$").unwrap();
    static ref LAYOUT_NAME: Regex = Regex::new(r#"<(?:\w+:)?cSld\b[^>]*\bname="([^"]*)""#).unwrap();
    static ref LAYOUT_TYPE: Regex = Regex::new(r#"<(?:\w+:)?sldLayout\b[^>]*\btype="([^"]*)""#).unwrap();
}

/// Placeholders on a notes page that are not the speaker's notes.
const NOTES_CHROME: [&str; 5] = ["sldImg", "sldNum", "hdr", "ftr", "dt"];

/// Slide parts ordered by slide number, never lexicographically.
pub fn slide_parts(container: &OoxmlContainer<'_>) -> Vec<(usize, String)> {
    let mut slides: Vec<(usize, String)> = container
        .entries_under("ppt/slides/")
        .into_iter()
        .filter_map(|name| {
            let number = SLIDE_PART.captures(&name)?.get(1)?.as_str().parse().ok()?;
            Some((number, name))
        })
        .collect();
    slides.sort_by_key(|(number, _)| *number);
    slides
}

fn no_slides() -> PreviewError {
    PreviewError::EntryNotFound("ppt/slides/slide1.xml".to_string())
}

/// Everything recovered for one slide before it is written out.
struct SlideData {
    part: ScannedPart,
    relationships: Vec<Relationship>,
    notes: String,
    layout: String,
}

fn read_slide(container: &mut OoxmlContainer<'_>, slide_path: &str, rels_xml: &str) -> SlideData {
    let part = match container.read_text(slide_path) {
        Ok(xml) => scan_part(slide_path, &xml),
        Err(e) => {
            log::warn!("Skipping unreadable slide {}: {}", slide_path, e);
            ScannedPart::default()
        }
    };
    let relationships = parse_relationships(rels_xml);

    let notes = relationships
        .iter()
        .find(|r| r.kind == "notesSlide")
        .and_then(|r| container.read_optional_text(&resolve_target(slide_path, &r.target)))
        .map(|xml| notes_text(&xml))
        .unwrap_or_default();

    let layout = relationships
        .iter()
        .find(|r| r.kind == "slideLayout")
        .and_then(|r| container.read_optional_text(&resolve_target(slide_path, &r.target)))
        .map(|xml| layout_kind(&xml))
        .unwrap_or_default();

    SlideData {
        part,
        relationships,
        notes,
        layout,
    }
}

/// Speaker notes without the slide thumbnail, number and footer placeholders.
fn notes_text(xml: &str) -> String {
    let part = scan_part("notesSlide", xml);
    part.paragraphs()
        .filter(|p| {
            let placeholder = p
                .shape
                .and_then(|i| part.shapes.get(i))
                .and_then(|s| s.placeholder.as_deref());
            !placeholder.is_some_and(|kind| NOTES_CHROME.contains(&kind))
        })
        .map(|p| p.text.as_str())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn layout_kind(xml: &str) -> String {
    LAYOUT_NAME
        .captures(xml)
        .or_else(|| LAYOUT_TYPE.captures(xml))
        .map(|caps| caps[1].to_string())
        .unwrap_or_default()
}

/// Pick the slide title: a title placeholder, else the first text, else "Slide n".
///
/// Returns the title and, when the title came from the first paragraph,
/// that paragraph's position so it is not repeated in the body.
fn slide_title(part: &ScannedPart, number: usize) -> (String, Option<usize>) {
    let placeholder_title = part
        .paragraphs()
        .filter(|p| is_title_paragraph(part, p))
        .map(|p| p.text.as_str())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if !placeholder_title.is_empty() {
        return (placeholder_title, None);
    }
    match part.paragraphs().position(|p| !p.text.is_empty()) {
        Some(position) => {
            let first = part.paragraphs().nth(position).map(|p| p.text.clone()).unwrap_or_default();
            (first, Some(position))
        }
        None => (format!("Slide {}", number), None),
    }
}

fn is_title_paragraph(part: &ScannedPart, paragraph: &Paragraph) -> bool {
    paragraph
        .shape
        .and_then(|i| part.shapes.get(i))
        .is_some_and(|shape| shape.is_title())
}

/// Slides with titles, bullets, tables, pictures, notes and layout names.
pub struct PresentationXmlStrategy;

impl ExtractionStrategy for PresentationXmlStrategy {
    fn name(&self) -> &'static str {
        "ooxml_presentation"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::OoxmlStructured
    }

    fn threshold(&self) -> usize {
        RAW_THRESHOLD
    }

    fn extract(&self, input: &DocumentInput, config: &PreviewConfig) -> Result<ExtractionResult> {
        let mut container = OoxmlContainer::open(&input.bytes, config.max_entry_size)?;
        let slides = slide_parts(&container);
        if slides.is_empty() {
            return Err(no_slides());
        }

        let mut pages = Vec::with_capacity(slides.len());
        let mut slide_data = Vec::with_capacity(slides.len());
        let mut warnings = Vec::new();
        for (position, (_, path)) in slides.iter().enumerate() {
            let rels_xml = container
                .read_optional_text(&relationships_path(path))
                .unwrap_or_default();
            let data = read_slide(&mut container, path, &rels_xml);
            warnings.extend(data.part.error_warning(path));
            slide_data.push(data);
            pages.push(PageRelationships {
                page_index: position + 1,
                rels_xml,
            });
        }

        let media = MediaExtractor::new(config).extract(&mut container, &pages);
        warnings.extend(media.warnings);
        let properties = read_properties(&mut container);

        let mut writer = SectionWriter::new(media.images);
        for (position, slide) in slide_data.into_iter().enumerate() {
            if position > 0 {
                writer.break_section();
            }
            write_slide(&mut writer, slide);
        }

        let (html, document) = writer.finish(Some("data-slide"), true, properties);
        log::debug!("{}: {} slides", input.file_name, document.sections.len());
        let plain = html_to_text(&html);
        Ok(ExtractionResult::html(html, plain, self.method())
            .with_document(document)
            .with_warnings(warnings))
    }
}

fn write_slide(writer: &mut SectionWriter, slide: SlideData) {
    let number = writer.current_index();
    let (title, title_position) = slide_title(&slide.part, number);
    writer.heading(2, &title);

    let mut paragraph_position = 0;
    for block in &slide.part.blocks {
        match block {
            Block::Paragraph(paragraph) => {
                let position = paragraph_position;
                paragraph_position += 1;
                if Some(position) == title_position || is_title_paragraph(&slide.part, paragraph) {
                    continue;
                }
                if paragraph.bullet {
                    writer.bullet(&paragraph.text);
                } else {
                    writer.paragraph(&paragraph.text);
                }
            }
            Block::Table(table) => writer.table(table.clone()),
            Block::Image(rel_id) => {
                if let Some(rel) = slide.relationships.iter().find(|r| &r.id == rel_id && !r.external) {
                    let name = rel.target.rsplit('/').next().unwrap_or(&rel.target);
                    writer.image(name);
                }
            }
            Block::PageBreak => {}
        }
    }

    let section = writer.current_mut();
    section.notes = slide.notes;
    section.layout_kind = slide.layout;
}

/// Bare text runs per slide, for decks the structured scan cannot follow.
pub struct SlideTextRunsStrategy;

impl ExtractionStrategy for SlideTextRunsStrategy {
    fn name(&self) -> &'static str {
        "slide_text_runs"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::TextRuns
    }

    fn threshold(&self) -> usize {
        RAW_THRESHOLD
    }

    fn extract(&self, input: &DocumentInput, config: &PreviewConfig) -> Result<ExtractionResult> {
        let mut container = OoxmlContainer::open(&input.bytes, config.max_entry_size)?;
        let slides = slide_parts(&container);
        if slides.is_empty() {
            return Err(no_slides());
        }

        let mut all_text = String::new();
        let mut document = StructuredDocument::default();
        for (position, (_, path)) in slides.iter().enumerate() {
            let slide_number = position + 1;
            let lines = match container.read_text(path) {
                Ok(xml) => text_runs(&xml),
                Err(e) => {
                    log::warn!("Skipping unreadable slide {}: {}", path, e);
                    Vec::new()
                }
            };
            let slide_text = lines.join("\n");
            if !slide_text.trim().is_empty() {
                all_text.push_str(&format!("Slide {}\n\n{}\n\n", slide_number, slide_text));
            }
            document.sections.push(DocumentSection {
                index: slide_number,
                title: lines.first().cloned().unwrap_or_else(|| format!("Slide {}", slide_number)),
                content: slide_text,
                ..DocumentSection::default()
            });
        }
        document.properties = read_properties(&mut container);

        Ok(ExtractionResult::text(all_text.trim_end().to_string(), self.method()).with_document(document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::test_support::build_zip;

    fn slide_xml(shapes: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"
  xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"
  xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:spTree>{}</p:spTree></p:cSld></p:sld>"#,
            shapes
        )
    }

    fn title_shape(text: &str) -> String {
        format!(
            r#"<p:sp><p:nvSpPr><p:cNvPr id="2" name="Title 1"/><p:cNvSpPr/><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr><p:txBody><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp>"#,
            text
        )
    }

    fn body_shape(paragraphs: &[&str]) -> String {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<a:p><a:pPr><a:buChar char=\"•\"/></a:pPr><a:r><a:t>{}</a:t></a:r></a:p>", p))
            .collect();
        format!(
            r#"<p:sp><p:nvSpPr><p:cNvPr id="3" name="Content 2"/><p:cNvSpPr/><p:nvPr><p:ph idx="1"/></p:nvPr></p:nvSpPr><p:txBody>{}</p:txBody></p:sp>"#,
            body
        )
    }

    fn input(entries: Vec<(String, Vec<u8>)>) -> DocumentInput {
        let borrowed: Vec<(&str, &[u8])> = entries.iter().map(|(n, b)| (n.as_str(), b.as_slice())).collect();
        DocumentInput::new(
            build_zip(&borrowed),
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            "deck.pptx",
        )
    }

    #[test]
    fn test_slides_follow_numeric_order() {
        let mut entries = Vec::new();
        for n in [1, 10, 2, 3, 4, 5, 6, 7, 8, 9] {
            entries.push((
                format!("ppt/slides/slide{}.xml", n),
                slide_xml(&title_shape(&format!("Topic number {}", n))).into_bytes(),
            ));
        }
        let input = input(entries);
        let result = PresentationXmlStrategy.extract(&input, &PreviewConfig::default()).unwrap();
        let document = result.document.unwrap();
        let titles: Vec<&str> = document.sections.iter().map(|s| s.title.as_str()).collect();
        let expected: Vec<String> = (1..=10).map(|n| format!("Topic number {}", n)).collect();
        assert_eq!(titles, expected);
        assert_eq!(result.content.matches("data-slide=").count(), 10);
    }

    #[test]
    fn test_title_fallbacks() {
        let untitled = slide_xml(&body_shape(&["First bullet becomes the title", "Second bullet"]));
        let empty = slide_xml("");
        let input = input(vec![
            ("ppt/slides/slide1.xml".to_string(), untitled.into_bytes()),
            ("ppt/slides/slide2.xml".to_string(), empty.into_bytes()),
        ]);
        let result = PresentationXmlStrategy.extract(&input, &PreviewConfig::default()).unwrap();
        let document = result.document.unwrap();
        assert_eq!(document.sections[0].title, "First bullet becomes the title");
        assert_eq!(document.sections[0].bullets, vec!["Second bullet"]);
        assert_eq!(document.sections[1].title, "Slide 2");
    }

    #[test]
    fn test_notes_layout_and_images() {
        let slide = slide_xml(&format!(
            "{}{}<p:pic><p:blipFill><a:blip r:embed=\"rId3\"/></p:blipFill></p:pic>",
            title_shape("Roadmap"),
            body_shape(&["Ship the beta", "Collect feedback"])
        ));
        let rels = r#"<Relationships>
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout" Target="../slideLayouts/slideLayout2.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/notesSlide" Target="../notesSlides/notesSlide1.xml"/>
  <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="../media/image1.png"/>
</Relationships>"#;
        let notes = r#"<p:notes xmlns:a="a" xmlns:p="p"><p:cSld><p:spTree>
  <p:sp><p:nvSpPr><p:cNvPr id="2" name="Slide Image Placeholder 1"/><p:nvPr><p:ph type="sldImg"/></p:nvPr></p:nvSpPr></p:sp>
  <p:sp><p:nvSpPr><p:cNvPr id="3" name="Notes Placeholder 2"/><p:nvPr><p:ph type="body" idx="1"/></p:nvPr></p:nvSpPr>
    <p:txBody><a:p><a:r><a:t>Mention the launch date.</a:t></a:r></a:p></p:txBody></p:sp>
  <p:sp><p:nvSpPr><p:cNvPr id="4" name="Slide Number Placeholder 3"/><p:nvPr><p:ph type="sldNum"/></p:nvPr></p:nvSpPr>
    <p:txBody><a:p><a:r><a:t>1</a:t></a:r></a:p></p:txBody></p:sp>
</p:spTree></p:cSld></p:notes>"#;
        let layout = r#"<p:sldLayout xmlns:p="p" type="obj"><p:cSld name="Title and Content"/></p:sldLayout>"#;
        let input = input(vec![
            ("ppt/slides/slide1.xml".to_string(), slide.into_bytes()),
            ("ppt/slides/_rels/slide1.xml.rels".to_string(), rels.as_bytes().to_vec()),
            ("ppt/notesSlides/notesSlide1.xml".to_string(), notes.as_bytes().to_vec()),
            ("ppt/slideLayouts/slideLayout2.xml".to_string(), layout.as_bytes().to_vec()),
            ("ppt/media/image1.png".to_string(), vec![0x89, b'P', b'N', b'G']),
        ]);

        let result = PresentationXmlStrategy.extract(&input, &PreviewConfig::default()).unwrap();
        let document = result.document.unwrap();
        let slide = &document.sections[0];
        assert_eq!(slide.title, "Roadmap");
        assert_eq!(slide.bullets, vec!["Ship the beta", "Collect feedback"]);
        assert_eq!(slide.notes, "Mention the launch date.");
        assert_eq!(slide.layout_kind, "Title and Content");
        assert_eq!(slide.images.len(), 1);
        assert_eq!(slide.images[0].associated_page_index, Some(1));
        assert!(result.content.contains("<h2>Roadmap</h2>"));
        assert!(result.content.contains("data-asset=\"img1\""));
    }

    #[test]
    fn test_text_runs_strategy() {
        let input = input(vec![
            (
                "ppt/slides/slide2.xml".to_string(),
                slide_xml(&title_shape("Second slide words")).into_bytes(),
            ),
            (
                "ppt/slides/slide1.xml".to_string(),
                slide_xml(&body_shape(&["Opening line", "More detail"])).into_bytes(),
            ),
        ]);
        let result = SlideTextRunsStrategy.extract(&input, &PreviewConfig::default()).unwrap();
        assert_eq!(result.method, ExtractionMethod::TextRuns);
        assert_eq!(
            result.content,
            "Slide 1\n\nOpening line\nMore detail\n\nSlide 2\n\nSecond slide words"
        );
        let document = result.document.unwrap();
        assert_eq!(document.sections[1].title, "Second slide words");
    }

    #[test]
    fn test_container_without_slides_is_entry_not_found() {
        let input = input(vec![("ppt/presentation.xml".to_string(), b"<p:presentation/>".to_vec())]);
        assert!(matches!(
            PresentationXmlStrategy.extract(&input, &PreviewConfig::default()),
            Err(PreviewError::EntryNotFound(_))
        ));
        assert!(matches!(
            SlideTextRunsStrategy.extract(&input, &PreviewConfig::default()),
            Err(PreviewError::EntryNotFound(_))
        ));
    }

    #[test]
    fn test_layout_kind_falls_back_to_type() {
        assert_eq!(layout_kind(r#"<p:sldLayout type="title"><p:cSld/></p:sldLayout>"#), "title");
        assert_eq!(layout_kind("<p:sldLayout/>"), "");
    }
}
