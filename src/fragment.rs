//! Builds the minimal semantic HTML fragment and the matching section list.
//!
//! Strategies feed headings, paragraphs, list items, tables and pictures in
//! document order and cut sections at page or slide boundaries. The writer
//! keeps the flat HTML and the structured sections in step.

use std::collections::HashSet;

use crate::media::place_images;
use crate::metadata::DocumentProperties;
use crate::shared_utils::escape_html;
use crate::types::{DocumentSection, ImageAsset, StructuredDocument, Table};

pub(crate) struct SectionWriter {
    done: Vec<(DocumentSection, String)>,
    current: DocumentSection,
    body: String,
    list_open: bool,
    images: Vec<ImageAsset>,
    inline: HashSet<String>,
}

impl SectionWriter {
    pub fn new(images: Vec<ImageAsset>) -> Self {
        Self {
            done: Vec::new(),
            current: DocumentSection {
                index: 1,
                ..DocumentSection::default()
            },
            body: String::new(),
            list_open: false,
            images,
            inline: HashSet::new(),
        }
    }

    pub fn current_index(&self) -> usize {
        self.current.index
    }

    pub fn current_mut(&mut self) -> &mut DocumentSection {
        &mut self.current
    }

    pub fn heading(&mut self, level: u8, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.close_list();
        let level = level.clamp(1, 6);
        self.body.push_str(&format!("<h{0}>{1}</h{0}>", level, escape_html(text)));
        if self.current.title.is_empty() {
            self.current.title = text.to_string();
        }
        self.push_content(text);
    }

    pub fn paragraph(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.close_list();
        self.body.push_str(&format!("<p>{}</p>", escape_text(text)));
        self.push_content(text);
    }

    pub fn bullet(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if !self.list_open {
            self.body.push_str("<ul>");
            self.list_open = true;
        }
        self.body.push_str(&format!("<li>{}</li>", escape_text(text)));
        self.current.bullets.push(text.to_string());
        self.push_content(text);
    }

    pub fn table(&mut self, table: Table) {
        if table.is_empty() {
            return;
        }
        self.close_list();
        self.body.push_str(&table_html(&table));
        self.current.tables.push(table);
    }

    /// Inline picture by media file name; unknown names are ignored.
    pub fn image(&mut self, original_name: &str) {
        let index = self.current.index;
        let Some(asset) = self.images.iter_mut().find(|a| a.original_name == original_name) else {
            return;
        };
        let id = asset.id.clone();
        if !self.inline.insert(id.clone()) {
            return;
        }
        asset.associated_page_index = Some(index);
        self.close_list();
        self.body.push_str(&image_html(&id, original_name));
    }

    /// Close the current section and open the next one.
    pub fn break_section(&mut self) {
        self.close_list();
        let next = DocumentSection {
            index: self.current.index + 1,
            ..DocumentSection::default()
        };
        let finished = std::mem::replace(&mut self.current, next);
        let body = std::mem::take(&mut self.body);
        self.done.push((finished, body));
    }

    /// Finish every section. `page_attribute` names the attribute that marks
    /// physical pages (`data-page`, `data-slide`); without one the sections
    /// are logical only.
    pub fn finish(
        mut self,
        page_attribute: Option<&str>,
        keep_empty: bool,
        properties: DocumentProperties,
    ) -> (String, StructuredDocument) {
        self.close_list();
        let last = (std::mem::take(&mut self.current), std::mem::take(&mut self.body));
        self.done.push(last);

        let mut bodies = Vec::new();
        let mut document = StructuredDocument {
            properties,
            ..StructuredDocument::default()
        };
        let total = self.done.len();
        for (position, (section, body)) in self.done.into_iter().enumerate() {
            let blank = body.is_empty() && section.tables.is_empty();
            let is_last = position + 1 == total;
            if blank && !keep_empty && !(is_last && document.sections.is_empty()) {
                continue;
            }
            bodies.push(body);
            document.sections.push(section);
        }

        place_images(&mut document, self.images);

        for (section, body) in document.sections.iter().zip(bodies.iter_mut()) {
            for image in &section.images {
                if !self.inline.contains(&image.id) {
                    body.push_str(&image_html(&image.id, &image.original_name));
                }
            }
        }
        if let Some(body) = bodies.last_mut() {
            for image in &document.unplaced_images {
                body.push_str(&image_html(&image.id, &image.original_name));
            }
        }

        let html = document
            .sections
            .iter()
            .zip(bodies)
            .map(|(section, body)| match page_attribute {
                Some(attribute) => format!("<section {}=\"{}\">{}</section>", attribute, section.index, body),
                None => format!("<section>{}</section>", body),
            })
            .collect::<Vec<_>>()
            .join("\n");
        (html, document)
    }

    fn push_content(&mut self, text: &str) {
        if !self.current.content.is_empty() {
            self.current.content.push_str("\n\n");
        }
        self.current.content.push_str(text);
    }

    fn close_list(&mut self) {
        if self.list_open {
            self.body.push_str("</ul>");
            self.list_open = false;
        }
    }
}

/// Escape text and keep explicit line breaks.
fn escape_text(text: &str) -> String {
    escape_html(text).replace('\n', "<br>")
}

fn image_html(id: &str, original_name: &str) -> String {
    format!(
        "<img data-asset=\"{}\" alt=\"{}\">",
        escape_html(id),
        escape_html(original_name)
    )
}

pub(crate) fn table_html(table: &Table) -> String {
    let mut html = String::from("<table>");
    for (row_index, row) in table.cells.iter().enumerate() {
        let tag = if row_index == 0 && table.has_header_row { "th" } else { "td" };
        html.push_str("<tr>");
        for cell in row {
            html.push_str(&format!("<{0}>{1}</{0}>", tag, escape_text(cell)));
        }
        html.push_str("</tr>");
    }
    html.push_str("</table>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(id: &str, name: &str, page: Option<usize>) -> ImageAsset {
        ImageAsset {
            id: id.to_string(),
            original_name: name.to_string(),
            mime_hint: "image/png".to_string(),
            base64_payload: String::new(),
            associated_page_index: page,
        }
    }

    #[test]
    fn test_sections_follow_breaks() {
        let mut writer = SectionWriter::new(Vec::new());
        writer.heading(1, "Intro");
        writer.paragraph("First <page> & more");
        writer.break_section();
        writer.bullet("one");
        writer.bullet("two");
        writer.paragraph("after list");
        let (html, document) = writer.finish(Some("data-page"), false, DocumentProperties::default());

        assert_eq!(document.sections.len(), 2);
        assert_eq!(document.sections[0].title, "Intro");
        assert_eq!(document.sections[0].content, "Intro\n\nFirst <page> & more");
        assert_eq!(document.sections[1].index, 2);
        assert_eq!(document.sections[1].bullets, vec!["one", "two"]);
        assert!(html.contains("<p>First &lt;page&gt; &amp; more</p>"));
        assert!(html.contains("<ul><li>one</li><li>two</li></ul><p>after list</p>"));
        assert!(html.contains("<section data-page=\"2\">"));
    }

    #[test]
    fn test_blank_sections_are_dropped_unless_kept() {
        let mut writer = SectionWriter::new(Vec::new());
        writer.paragraph("text");
        writer.break_section();
        let (_, document) = writer.finish(Some("data-page"), false, DocumentProperties::default());
        assert_eq!(document.sections.len(), 1);

        let mut slides = SectionWriter::new(Vec::new());
        slides.break_section();
        let (_, document) = slides.finish(Some("data-slide"), true, DocumentProperties::default());
        assert_eq!(document.sections.len(), 2);

        let empty = SectionWriter::new(Vec::new());
        let (_, document) = empty.finish(None, false, DocumentProperties::default());
        assert_eq!(document.sections.len(), 1);
    }

    #[test]
    fn test_images_inline_associated_and_unplaced() {
        let mut writer = SectionWriter::new(vec![
            asset("img1", "image1.png", Some(1)),
            asset("img2", "image2.png", None),
            asset("img3", "image3.png", None),
        ]);
        writer.paragraph("page one");
        writer.break_section();
        writer.paragraph("page two");
        writer.image("image2.png");
        let (html, document) = writer.finish(Some("data-page"), false, DocumentProperties::default());

        assert_eq!(document.sections[0].images[0].id, "img1");
        assert_eq!(document.sections[1].images[0].id, "img2");
        assert_eq!(document.unplaced_images[0].id, "img3");
        assert_eq!(html.matches("<img").count(), 3);
        assert_eq!(html.matches("data-asset=\"img2\"").count(), 1);
    }

    #[test]
    fn test_table_html_header_row() {
        let table = Table::new(vec![vec!["A".into(), "B".into()], vec!["1".into()]], true);
        assert_eq!(
            table_html(&table),
            "<table><tr><th>A</th><th>B</th></tr><tr><td>1</td></tr></table>"
        );
    }
}
