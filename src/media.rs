//! Embedded pictures from the media folders of an OOXML container.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::config::PreviewConfig;
use crate::container::OoxmlContainer;
use crate::error::PreviewError;
use crate::types::{ImageAsset, StructuredDocument, file_extension};

const MEDIA_FOLDERS: [&str; 3] = ["word/media/", "ppt/media/", "xl/media/"];

/// Image extensions worth previewing, with the MIME type to hint.
fn mime_hint(extension: &str) -> Option<&'static str> {
    let mime = match extension {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "svg" => "image/svg+xml",
        "emf" => "image/emf",
        "wmf" => "image/wmf",
        "webp" => "image/webp",
        _ => return None,
    };
    Some(mime)
}

/// Relationship text of one page, slide or sheet (1-based index).
#[derive(Debug, Clone)]
pub struct PageRelationships {
    pub page_index: usize,
    pub rels_xml: String,
}

#[derive(Debug, Default)]
pub struct MediaOutcome {
    pub images: Vec<ImageAsset>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MediaExtractor {
    max_images: usize,
    max_image_size: u64,
}

impl Default for MediaExtractor {
    fn default() -> Self {
        Self::new(&PreviewConfig::default())
    }
}

impl MediaExtractor {
    pub fn new(config: &PreviewConfig) -> Self {
        Self {
            max_images: config.max_images,
            max_image_size: config.max_image_size,
        }
    }

    /// Collect images in entry order and associate each with the first page
    /// whose relationships mention its file name.
    pub fn extract(&self, container: &mut OoxmlContainer<'_>, pages: &[PageRelationships]) -> MediaOutcome {
        let mut outcome = MediaOutcome::default();

        let candidates: Vec<String> = MEDIA_FOLDERS
            .iter()
            .flat_map(|folder| container.entries_under(folder))
            .filter(|path| mime_hint(&file_extension(path)).is_some())
            .collect();

        for path in candidates {
            if outcome.images.len() >= self.max_images {
                outcome.warnings.push(format!(
                    "Only the first {} images were extracted",
                    self.max_images
                ));
                break;
            }

            let bytes = match container.read_binary(&path) {
                Ok(bytes) => bytes,
                Err(PreviewError::EntryNotFound(_)) => continue,
                Err(e) => {
                    log::warn!("Skipping image {}: {}", path, e);
                    outcome.warnings.push(format!("Image {} could not be read", path));
                    continue;
                }
            };
            if bytes.len() as u64 > self.max_image_size {
                outcome.warnings.push(format!(
                    "Image {} skipped: {} bytes exceeds the {} byte limit",
                    path,
                    bytes.len(),
                    self.max_image_size
                ));
                continue;
            }

            let original_name = path.rsplit('/').next().unwrap_or(&path).to_string();
            let extension = file_extension(&original_name);
            let associated_page_index = pages
                .iter()
                .find(|page| page.rels_xml.contains(original_name.as_str()))
                .map(|page| page.page_index);

            outcome.images.push(ImageAsset {
                id: format!("img{}", outcome.images.len() + 1),
                mime_hint: mime_hint(&extension).unwrap_or("application/octet-stream").to_string(),
                base64_payload: STANDARD.encode(&bytes),
                original_name,
                associated_page_index,
            });
        }

        log::debug!("Extracted {} embedded images", outcome.images.len());
        outcome
    }
}

/// Move each image into the section it belongs to; the rest stay unplaced.
pub fn place_images(document: &mut StructuredDocument, images: Vec<ImageAsset>) {
    for image in images {
        let section = image
            .associated_page_index
            .and_then(|index| document.sections.iter_mut().find(|s| s.index == index));
        match section {
            Some(section) => section.images.push(image),
            None => document.unplaced_images.push(image),
        }
    }
}
