//! Pre-extraction inspection of raw bytes.
//!
//! Decides whether a payload is the container its extension promises, plain
//! text under a container name, or something encrypted or corrupted. Pure
//! functions over byte slices; nothing here allocates more than a histogram.

use crate::config::PreviewConfig;
use crate::types::{DocumentCategory, ValidationVerdict, file_extension};

pub const ZIP_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
pub const OLE_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const PDF_SIGNATURE: &[u8] = b"%PDF-";
/// PDF readers accept the header anywhere in the first kilobyte.
const PDF_HEADER_WINDOW: usize = 1024;

lazy_static::lazy_static! {
    /// `/Encrypt` as a trailer or xref-stream key: an indirect reference or an
    /// inline dictionary must follow.
    static ref PDF_ENCRYPT_KEY: regex::bytes::Regex =
        regex::bytes::Regex::new(r"/Encrypt\s*(?:\d+\s+\d+\s+R\b|<<)").unwrap();
}

/// Container format a file claims to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// ZIP-based Office Open XML
    Ooxml,
    /// Legacy compound binary (.doc, .xls, .ppt)
    Ole,
    Pdf,
}

impl ContainerKind {
    /// Which container to expect for a category and file name, if any.
    pub fn expected(category: DocumentCategory, file_name: &str) -> Option<Self> {
        let ext = file_extension(file_name);
        match category {
            DocumentCategory::Word | DocumentCategory::Sheet | DocumentCategory::Slide => {
                match ext.as_str() {
                    "doc" | "dot" | "xls" | "ppt" | "pps" => Some(ContainerKind::Ole),
                    _ => Some(ContainerKind::Ooxml),
                }
            }
            DocumentCategory::Pdf => Some(ContainerKind::Pdf),
            DocumentCategory::Text | DocumentCategory::Generic => None,
        }
    }
}

/// Byte-level checks run before any parser sees the input.
#[derive(Debug, Clone)]
pub struct ContentValidator {
    prefix_len: usize,
    encrypted_entropy: f64,
    encrypted_printable: f64,
    text_printable: f64,
}

impl Default for ContentValidator {
    fn default() -> Self {
        Self::new(&PreviewConfig::default())
    }
}

impl ContentValidator {
    pub fn new(config: &PreviewConfig) -> Self {
        Self {
            prefix_len: config.validation_prefix_len.max(1),
            encrypted_entropy: config.encrypted_entropy_threshold,
            encrypted_printable: config.encrypted_printable_threshold,
            text_printable: config.text_printable_threshold,
        }
    }

    /// Validate bytes expected to be a ZIP-backed container.
    pub fn validate(&self, bytes: &[u8]) -> ValidationVerdict {
        if bytes.starts_with(&ZIP_SIGNATURE) {
            return ValidationVerdict::valid();
        }
        self.classify_foreign(bytes)
    }

    /// Validate bytes against the container a file claims to be.
    pub fn validate_as(&self, bytes: &[u8], kind: ContainerKind, file_name: &str) -> ValidationVerdict {
        match kind {
            ContainerKind::Ooxml => {
                if bytes.starts_with(&OLE_SIGNATURE) {
                    // Password-protected OOXML is wrapped in a compound file
                    if contains_utf16le(bytes, "EncryptedPackage") {
                        return ValidationVerdict::encrypted(
                            "password-protected Office document (EncryptedPackage stream)",
                        );
                    }
                    log::debug!("{} carries a legacy compound-file signature", file_name);
                    return ValidationVerdict::valid();
                }
                self.validate(bytes)
            }
            ContainerKind::Ole => {
                if bytes.starts_with(&OLE_SIGNATURE) || bytes.starts_with(&ZIP_SIGNATURE) {
                    return ValidationVerdict::valid();
                }
                self.classify_foreign(bytes)
            }
            ContainerKind::Pdf => {
                let window = &bytes[..bytes.len().min(PDF_HEADER_WINDOW)];
                if find_subslice(window, PDF_SIGNATURE).is_some() {
                    if PDF_ENCRYPT_KEY.is_match(bytes) {
                        return ValidationVerdict::encrypted("PDF declares an /Encrypt dictionary");
                    }
                    return ValidationVerdict::valid();
                }
                self.classify_foreign(bytes)
            }
        }
    }

    /// Classify bytes that do not carry the expected signature.
    fn classify_foreign(&self, bytes: &[u8]) -> ValidationVerdict {
        if bytes.is_empty() {
            return ValidationVerdict::invalid("empty file");
        }
        let prefix = &bytes[..bytes.len().min(self.prefix_len)];
        let entropy = shannon_entropy(prefix);
        let printable = printable_ratio(prefix);
        log::debug!(
            "Signature missing: entropy {:.2} bits/byte, printable ratio {:.2}",
            entropy,
            printable
        );

        if entropy > self.encrypted_entropy && printable < self.encrypted_printable {
            ValidationVerdict::encrypted(format!(
                "high entropy ({:.2} bits/byte) with few printable bytes ({:.0}%)",
                entropy,
                printable * 100.0
            ))
        } else if printable > self.text_printable {
            ValidationVerdict::plain_text()
        } else {
            ValidationVerdict::invalid("file is corrupted or not in the expected format")
        }
    }
}

/// Shannon entropy in bits per byte over the byte-value histogram.
pub fn shannon_entropy(bytes: &[u8]) -> f64 {
    if bytes.is_empty() {
        return 0.0;
    }
    let mut histogram = [0usize; 256];
    for &b in bytes {
        histogram[b as usize] += 1;
    }
    let total = bytes.len() as f64;
    histogram
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// Fraction of bytes that are printable ASCII, CR, LF or tab.
pub fn printable_ratio(bytes: &[u8]) -> f64 {
    if bytes.is_empty() {
        return 0.0;
    }
    let printable = bytes
        .iter()
        .filter(|&&b| (0x20..=0x7E).contains(&b) || b == b'\r' || b == b'\n' || b == b'\t')
        .count();
    printable as f64 / bytes.len() as f64
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

fn contains_utf16le(haystack: &[u8], needle: &str) -> bool {
    let encoded: Vec<u8> = needle.encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect();
    find_subslice(haystack, &encoded).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every non-printable byte value in turn: high entropy, nothing readable.
    fn scrambled_bytes(len: usize) -> Vec<u8> {
        let non_printable: Vec<u8> = (0..=255u8)
            .filter(|b| !(0x20..=0x7E).contains(b) && !matches!(*b, b'\r' | b'\n' | b'\t'))
            .collect();
        non_printable.into_iter().cycle().take(len).collect()
    }

    #[test]
    fn test_zip_signature_is_valid_regardless_of_statistics() {
        let validator = ContentValidator::default();
        let mut bytes = ZIP_SIGNATURE.to_vec();
        bytes.extend(scrambled_bytes(2000));
        assert_eq!(validator.validate(&bytes), ValidationVerdict::valid());

        let mut texty = ZIP_SIGNATURE.to_vec();
        texty.extend(b"hello world, this is text".repeat(20));
        assert!(validator.validate(&texty).is_valid_container);
    }

    #[test]
    fn test_high_entropy_low_printable_is_encrypted() {
        let validator = ContentValidator::default();
        let bytes = scrambled_bytes(4000);
        let prefix = &bytes[..1000];
        assert!(shannon_entropy(prefix) > 7.0, "entropy {}", shannon_entropy(prefix));
        assert!(printable_ratio(prefix) < 0.3);

        let verdict = validator.validate(&bytes);
        assert!(verdict.is_likely_encrypted);
        assert!(!verdict.is_valid_container);
    }

    #[test]
    fn test_plain_text_is_not_a_container() {
        let validator = ContentValidator::default();
        let verdict = validator.validate(b"Dear team,\nplease find the minutes attached.\n");
        assert!(verdict.is_plain_text());
        assert!(!verdict.is_likely_encrypted);
    }

    #[test]
    fn test_zero_bytes_are_invalid_not_encrypted() {
        let validator = ContentValidator::default();
        let verdict = validator.validate(&[0u8; 10]);
        assert!(!verdict.is_valid_container);
        assert!(!verdict.is_likely_encrypted);
        assert!(!verdict.is_plain_text());
        assert_eq!(shannon_entropy(&[0u8; 10]), 0.0);
        assert_eq!(printable_ratio(&[0u8; 10]), 0.0);
    }

    #[test]
    fn test_empty_input_is_invalid() {
        let verdict = ContentValidator::default().validate(&[]);
        assert_eq!(verdict.reason.as_deref(), Some("empty file"));
    }

    #[test]
    fn test_encrypted_ooxml_in_compound_file() {
        let validator = ContentValidator::default();
        let mut bytes = OLE_SIGNATURE.to_vec();
        bytes.extend(vec![0u8; 64]);
        bytes.extend("EncryptedPackage".encode_utf16().flat_map(|u| u.to_le_bytes()));
        let verdict = validator.validate_as(&bytes, ContainerKind::Ooxml, "secret.docx");
        assert!(verdict.is_likely_encrypted);

        let legacy = OLE_SIGNATURE.to_vec();
        assert!(validator.validate_as(&legacy, ContainerKind::Ooxml, "old.docx").is_valid_container);
        assert!(validator.validate_as(&legacy, ContainerKind::Ole, "old.doc").is_valid_container);
    }

    #[test]
    fn test_pdf_signature_and_encryption() {
        let validator = ContentValidator::default();
        let plain = b"%PDF-1.7\n1 0 obj << /Type /Catalog >> endobj".to_vec();
        assert!(validator.validate_as(&plain, ContainerKind::Pdf, "a.pdf").is_valid_container);

        let encrypted = b"%PDF-1.4\ntrailer << /Encrypt 5 0 R >>".to_vec();
        assert!(validator.validate_as(&encrypted, ContainerKind::Pdf, "a.pdf").is_likely_encrypted);

        let inline = b"%PDF-1.4\ntrailer << /Encrypt << /Filter /Standard /V 2 >> >>".to_vec();
        assert!(validator.validate_as(&inline, ContainerKind::Pdf, "a.pdf").is_likely_encrypted);
    }

    #[test]
    fn test_pdf_mentioning_encrypt_in_text_is_valid() {
        let validator = ContentValidator::default();
        let bytes = b"%PDF-1.7\n4 0 obj << /Length 44 >> stream\nBT (Set /Encrypt in the trailer) Tj ET\nendstream endobj\ntrailer << /Root 1 0 R >>".to_vec();
        let verdict = validator.validate_as(&bytes, ContainerKind::Pdf, "guide.pdf");
        assert!(verdict.is_valid_container);
        assert!(!verdict.is_likely_encrypted);
    }

    #[test]
    fn test_expected_container_kind() {
        assert_eq!(
            ContainerKind::expected(DocumentCategory::Word, "a.docx"),
            Some(ContainerKind::Ooxml)
        );
        assert_eq!(
            ContainerKind::expected(DocumentCategory::Slide, "a.ppt"),
            Some(ContainerKind::Ole)
        );
        assert_eq!(ContainerKind::expected(DocumentCategory::Text, "a.txt"), None);
    }

    #[test]
    fn test_entropy_bounds() {
        let all_values: Vec<u8> = (0..=255u8).collect();
        assert!((shannon_entropy(&all_values) - 8.0).abs() < 1e-9);
        assert!((shannon_entropy(b"abab") - 1.0).abs() < 1e-9);
    }
}
