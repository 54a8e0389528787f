//! Counts derived from an extraction result for the presentation layer.

use regex::Regex;

use crate::shared_utils::html_to_text;
use crate::types::{DocumentMetadata, ExtractionResult};

lazy_static::lazy_static! {
    static ref HEADING: Regex = Regex::new(r"(?i)<h[1-6][\s>]").unwrap();
    static ref TABLE: Regex = Regex::new(r"(?i)<table[\s>]").unwrap();
    static ref IMAGE: Regex = Regex::new(r"(?i)<img[\s>/]").unwrap();
    static ref PAGE_SECTION: Regex = Regex::new(r#"data-(?:slide|page)="\d+""#).unwrap();
    static ref BLANK_LINE: Regex = Regex::new(r"\n[ \t]*\n").unwrap();
}

/// Estimated page count from a word count.
///
/// Short documents are one page; longer ones use roughly 500 words per page,
/// and 600 once past 2000 words.
pub fn estimate_pages(word_count: usize) -> usize {
    if word_count < 100 {
        1
    } else if word_count < 2000 {
        word_count.div_ceil(500)
    } else {
        word_count.div_ceil(600)
    }
}

/// Whitespace-delimited tokens in the text form of `content`.
pub fn count_words(content: &str, is_html: bool) -> usize {
    if is_html {
        html_to_text(content).split_whitespace().count()
    } else {
        content.split_whitespace().count()
    }
}

/// Derive document statistics from a finished extraction.
pub fn compute(result: &ExtractionResult, file_size_bytes: u64) -> DocumentMetadata {
    let word_count = match (&result.plain_text, result.is_html) {
        (Some(plain), true) => plain.split_whitespace().count(),
        _ => count_words(&result.content, result.is_html),
    };

    let (page_count, section_count, table_count, image_count) = if result.is_html {
        let declared_pages = PAGE_SECTION.find_iter(&result.content).count();
        let headings = HEADING.find_iter(&result.content).count();
        let sections = if headings > 0 {
            headings
        } else {
            paragraph_breaks(result.text_content()) + 1
        };
        (
            if declared_pages > 0 { declared_pages } else { estimate_pages(word_count) },
            sections,
            TABLE.find_iter(&result.content).count(),
            IMAGE.find_iter(&result.content).count(),
        )
    } else {
        (
            estimate_pages(word_count),
            paragraph_breaks(&result.content) + 1,
            0,
            0,
        )
    };

    DocumentMetadata {
        word_count,
        page_count,
        section_count: section_count.max(1),
        table_count,
        image_count,
        extraction_method: result.method,
        file_size_bytes,
    }
}

fn paragraph_breaks(text: &str) -> usize {
    BLANK_LINE.find_iter(text.trim()).count()
}
