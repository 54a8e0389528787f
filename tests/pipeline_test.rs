use std::io::{Cursor, Write};

use office_preview::{
    BackendSet, DocumentCategory, ExtractionMethod, HandlerRegistry, PreviewConfig, PreviewError, Previewer,
};
use zip::write::SimpleFileOptions;

fn build_zip(entries: &[(&str, String)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (path, contents) in entries {
        writer.start_file(*path, SimpleFileOptions::default()).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn paragraph(text: &str) -> String {
    format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", text)
}

fn cell(text: &str) -> String {
    format!("<w:tc><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:tc>", text)
}

fn word_package() -> Vec<u8> {
    let table = format!(
        "<w:tbl><w:tr>{}{}{}</w:tr><w:tr>{}{}{}</w:tr></w:tbl>",
        cell("Region"),
        cell("Quarter"),
        cell("Revenue"),
        cell("North"),
        cell("Q1"),
        cell("1200")
    );
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}{}{}{}<w:sectPr/></w:body></w:document>"#,
        paragraph("The first paragraph introduces the quarterly report for the board."),
        paragraph("The second paragraph summarises revenue across every region we serve."),
        paragraph("The third paragraph explains the figures in the table below."),
        table
    );
    build_zip(&[
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#.to_string(),
        ),
        (
            "_rels/.rels",
            r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#.to_string(),
        ),
        ("word/document.xml", document),
    ])
}

fn slide(number: usize) -> String {
    format!(
        r#"<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:spTree>
<p:sp><p:nvSpPr><p:cNvPr id="2" name="Title 1"/><p:cNvSpPr/><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr><p:txBody><a:p><a:r><a:t>Agenda item {}</a:t></a:r></a:p></p:txBody></p:sp>
</p:spTree></p:cSld></p:sld>"#,
        number
    )
}

fn words(count: usize) -> Vec<u8> {
    vec!["word"; count].join(" ").into_bytes()
}

#[tokio::test]
async fn test_word_document_with_table() {
    let preview = Previewer::default().preview(word_package(), "", "report.docx").await;

    assert_eq!(preview.category, DocumentCategory::Word);
    assert!(preview.verdict.is_valid_container);
    assert!(matches!(
        preview.result.method,
        ExtractionMethod::DocxConversion | ExtractionMethod::OoxmlStructured
    ));
    assert_eq!(preview.metadata.table_count, 1);
    assert!(preview.metadata.section_count >= 1);

    let document = preview.result.document.expect("structured document");
    assert_eq!(document.table_count(), 1);
    let table = &document.sections.iter().flat_map(|s| s.tables.iter()).next().unwrap();
    assert_eq!(table.row_count, 2);
    assert_eq!(table.column_count, 3);
    assert_eq!(
        table.cells,
        vec![
            vec!["Region".to_string(), "Quarter".to_string(), "Revenue".to_string()],
            vec!["North".to_string(), "Q1".to_string(), "1200".to_string()],
        ]
    );
}

#[tokio::test]
async fn test_word_document_without_rich_backend() {
    let previewer = Previewer::new(
        PreviewConfig::default(),
        HandlerRegistry::with_defaults(),
        BackendSet::builtin_only(),
    );
    let preview = previewer.preview(word_package(), "", "report.docx").await;
    assert_eq!(preview.result.method, ExtractionMethod::OoxmlStructured);
    assert_eq!(preview.metadata.table_count, 1);
    assert!(preview.result.content.contains("<td>Revenue</td>"));
}

#[tokio::test]
async fn test_slides_in_natural_order() {
    let mut entries = Vec::new();
    for number in [1, 10, 2, 3, 4, 5, 6, 7, 8, 9] {
        entries.push((format!("ppt/slides/slide{}.xml", number), slide(number)));
    }
    let borrowed: Vec<(&str, String)> = entries.iter().map(|(p, c)| (p.as_str(), c.clone())).collect();
    let preview = Previewer::default()
        .preview(
            build_zip(&borrowed),
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            "agenda.pptx",
        )
        .await;

    assert_eq!(preview.result.method, ExtractionMethod::OoxmlStructured);
    assert_eq!(preview.metadata.page_count, 10);
    let document = preview.result.document.unwrap();
    let indexes: Vec<usize> = document.sections.iter().map(|s| s.index).collect();
    assert_eq!(indexes, (1..=10).collect::<Vec<_>>());
    for section in &document.sections {
        assert_eq!(section.title, format!("Agenda item {}", section.index));
    }
}

#[tokio::test]
async fn test_zero_bytes_fall_back_to_info_display() {
    let preview = Previewer::default()
        .preview(vec![0u8; 10], "application/vnd.openxmlformats-officedocument.wordprocessingml.document", "zeros.docx")
        .await;
    assert!(!preview.verdict.is_valid_container);
    assert!(!preview.verdict.is_likely_encrypted);
    assert_eq!(preview.result.method, ExtractionMethod::InfoDisplay);
    assert!(preview.result.content.contains("zeros.docx"));
}

#[tokio::test]
async fn test_encrypted_office_package_gets_notice() {
    let mut bytes = vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
    bytes.extend(vec![0u8; 64]);
    bytes.extend("EncryptedPackage".encode_utf16().flat_map(|u| u.to_le_bytes()));
    let preview = Previewer::default().preview(bytes, "", "locked.xlsx").await;
    assert!(preview.verdict.is_likely_encrypted);
    assert_eq!(preview.result.method, ExtractionMethod::EncryptedNotice);
}

#[tokio::test]
async fn test_every_input_yields_success() {
    let mut noise = Vec::with_capacity(2048);
    let mut state: u32 = 0x1234_5678;
    for _ in 0..2048 {
        state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        noise.push((state >> 16) as u8);
    }

    let inputs: Vec<(Vec<u8>, &str)> = vec![
        (Vec::new(), "empty.docx"),
        (noise, "random.xlsx"),
        (b"PK\x03\x04garbage".to_vec(), "truncated.pptx"),
        (b"%PDF-1.4 not really a pdf at all".to_vec(), "broken.pdf"),
        (b"plain words in a text file".to_vec(), "notes.txt"),
        (vec![0xFF; 32], "mystery"),
    ];
    let previewer = Previewer::default();
    for (bytes, name) in inputs {
        let preview = previewer.preview(bytes, "", name).await;
        assert!(preview.result.success, "{} did not succeed", name);
        assert!(!preview.result.content.trim().is_empty(), "{} has no content", name);
        assert!(preview.metadata.page_count >= 1);
        assert!(preview.metadata.section_count >= 1);
    }
}

#[tokio::test]
async fn test_preview_is_idempotent() {
    let previewer = Previewer::default();
    let first = previewer.preview(word_package(), "", "report.docx").await;
    let second = previewer.preview(word_package(), "", "report.docx").await;
    assert_eq!(first.result.method, second.result.method);
    assert_eq!(first.metadata, second.metadata);
    assert_eq!(first.result.content, second.result.content);
}

#[tokio::test]
async fn test_page_count_boundaries() {
    let previewer = Previewer::default();
    for (count, pages) in [(99, 1), (100, 1), (2000, 4), (2001, 4)] {
        let preview = previewer.preview(words(count), "text/plain", "words.txt").await;
        assert_eq!(preview.result.method, ExtractionMethod::PlainText);
        assert_eq!(preview.metadata.word_count, count);
        assert_eq!(preview.metadata.page_count, pages, "{} words", count);
    }
}

#[tokio::test]
async fn test_preview_file_from_disk() {
    let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    file.write_all(b"Shopping list\n\nmilk, bread and a large jar of honey").unwrap();

    let preview = Previewer::default().preview_file(file.path()).await.unwrap();
    assert_eq!(preview.mime_type, "text/plain");
    assert_eq!(preview.category, DocumentCategory::Text);
    assert_eq!(preview.handler.as_deref(), Some("text"));
    assert_eq!(preview.metadata.section_count, 2);
    assert!(preview.result.content.starts_with("Shopping list"));
}

#[tokio::test]
async fn test_preview_file_missing() {
    let dir = tempfile::tempdir().unwrap();
    let result = Previewer::default().preview_file(dir.path().join("absent.docx")).await;
    assert!(matches!(result, Err(PreviewError::Io(_))));
}
