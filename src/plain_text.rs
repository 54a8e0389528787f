//! Text files, decoded by byte-order mark with a Windows-1252 fallback.

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};

use crate::cascade::{DocumentInput, ExtractionStrategy};
use crate::config::PreviewConfig;
use crate::error::PreviewError;
use crate::shared_utils::cap_text;
use crate::types::{ExtractionMethod, ExtractionResult};

/// Decoded text and the encoding it was read as.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedText {
    pub text: String,
    pub encoding: &'static str,
    pub had_errors: bool,
}

pub fn decode_text(bytes: &[u8]) -> DecodedText {
    let (encoding, body): (&'static Encoding, &[u8]) = match Encoding::for_bom(bytes) {
        Some((encoding, bom_len)) => (encoding, &bytes[bom_len..]),
        None if std::str::from_utf8(bytes).is_ok() => (UTF_8, bytes),
        None => (WINDOWS_1252, bytes),
    };
    let (text, had_errors) = encoding.decode_without_bom_handling(body);
    DecodedText {
        text: text.into_owned(),
        encoding: encoding.name(),
        had_errors,
    }
}

pub struct PlainTextStrategy;

impl ExtractionStrategy for PlainTextStrategy {
    fn name(&self) -> &'static str {
        "plain_text"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::PlainText
    }

    /// Any non-blank text is worth showing as-is.
    fn threshold(&self) -> usize {
        0
    }

    fn extract(&self, input: &DocumentInput, config: &PreviewConfig) -> Result<ExtractionResult, PreviewError> {
        let decoded = decode_text(&input.bytes);
        log::debug!("Decoded {} as {}", input.file_name, decoded.encoding);

        let mut warnings = Vec::new();
        if decoded.had_errors {
            warnings.push(format!("Some characters could not be decoded as {}", decoded.encoding));
        }
        let text = cap_text(decoded.text.replace("\r\n", "\n"), config.max_text_chars, &mut warnings);
        Ok(ExtractionResult::text(text, self.method()).with_warnings(warnings))
    }
}
