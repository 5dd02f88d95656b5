//! Page extraction: text plus embedded images for each page of a range.
//!
//! Images are written to the image directory as they are found, named from a
//! counter that spans page boundaries. The counter is an input and an output
//! of [`extract_pages`] so a caller extracting several ranges into the same
//! directory can continue numbering where the previous call stopped.

use crate::error::Pdf2AudioError;
use crate::pipeline::chapters::PageRange;
use crate::pipeline::source::PageSource;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Matches the names written by [`image_file_name`].
pub static RE_IMAGE_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^image_(\d{3,})\.([A-Za-z0-9]+)$").unwrap());

/// Text of one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-indexed page number in the document.
    pub page_number: usize,
    pub text: String,
}

/// One extracted image and where it was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAsset {
    /// Global 1-indexed number; also the number in the file name and the
    /// placeholder token.
    pub image_number: usize,
    /// 1-indexed host page.
    pub page_number: usize,
    pub file: PathBuf,
    /// `Figure X.Y` label found on the host page, if any.
    pub figure_label: Option<String>,
}

/// Result of extracting a page range.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// One entry per page, in page order.
    pub pages: Vec<PageText>,
    /// Images in page order, then in discovery order within a page.
    pub images: Vec<ImageAsset>,
    /// The number the next extracted image would receive.
    pub next_image_number: usize,
}

/// File name for image `number`: `image_001.png`.
pub fn image_file_name(number: usize, extension: &str) -> String {
    format!("image_{number:03}.{extension}")
}

/// Delete `image_<NNN>.<ext>` files left in `images_dir` by an earlier run,
/// so a stale `image_002.jpg` cannot shadow a fresh `image_002.png`.
///
/// Returns the number of files removed. A missing directory is not an error.
pub fn remove_previous_images(images_dir: &Path) -> Result<usize, Pdf2AudioError> {
    let entries = match std::fs::read_dir(images_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(Pdf2AudioError::ReadFailed {
                path: images_dir.to_path_buf(),
                source: e,
            })
        }
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        if !RE_IMAGE_FILE.is_match(&entry.file_name().to_string_lossy()) {
            continue;
        }
        std::fs::remove_file(entry.path()).map_err(|e| Pdf2AudioError::WriteFailed {
            path: entry.path(),
            source: e,
        })?;
        removed += 1;
    }
    if removed > 0 {
        debug!("Removed {} images from a previous run", removed);
    }
    Ok(removed)
}

/// Extract every page of `range` and write its images into `images_dir`.
///
/// Blocking: reads from the document and writes image files synchronously.
pub fn extract_pages(
    source: &dyn PageSource,
    range: PageRange,
    images_dir: &Path,
    first_image_number: usize,
) -> Result<Extraction, Pdf2AudioError> {
    let mut next_image_number = first_image_number.max(1);
    let mut pages = Vec::with_capacity(range.len());
    let mut images = Vec::new();
    let mut dir_ready = false;

    for index in range.indices() {
        let page_number = index + 1;
        let text = source.page_text(index)?;
        let embedded = source.page_images(index)?;
        debug!(
            "Page {}: {} chars, {} images",
            page_number,
            text.len(),
            embedded.len()
        );

        for image in embedded {
            if !dir_ready {
                std::fs::create_dir_all(images_dir).map_err(|e| Pdf2AudioError::WriteFailed {
                    path: images_dir.to_path_buf(),
                    source: e,
                })?;
                dir_ready = true;
            }
            let file = images_dir.join(image_file_name(next_image_number, image.extension()));
            std::fs::write(&file, &image.bytes).map_err(|e| Pdf2AudioError::WriteFailed {
                path: file.clone(),
                source: e,
            })?;
            images.push(ImageAsset {
                image_number: next_image_number,
                page_number,
                file,
                figure_label: None,
            });
            next_image_number += 1;
        }

        pages.push(PageText { page_number, text });
    }

    info!(
        "Extracted {} pages, {} images",
        pages.len(),
        images.len()
    );
    Ok(Extraction {
        pages,
        images,
        next_image_number,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::source::{EmbeddedImage, InMemoryDocument};
    use image::ImageFormat;

    fn png(tag: u8) -> EmbeddedImage {
        EmbeddedImage::new(vec![0x89, b'P', b'N', b'G', tag], ImageFormat::Png)
    }

    #[test]
    fn counter_spans_pages() {
        let doc = InMemoryDocument::new()
            .with_image_page("one", vec![png(1), png(2)])
            .with_page("two")
            .with_image_page(
                "three",
                vec![EmbeddedImage::new(vec![0xFF, 0xD8], ImageFormat::Jpeg)],
            );
        let dir = tempfile::tempdir().unwrap();
        let out = extract_pages(&doc, PageRange { start: 0, end: 2 }, dir.path(), 1).unwrap();

        assert_eq!(out.pages.len(), 3);
        assert_eq!(out.pages[1].page_number, 2);
        let numbers: Vec<_> = out.images.iter().map(|i| i.image_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(out.images[2].page_number, 3);
        assert_eq!(out.next_image_number, 4);
        assert!(dir.path().join("image_001.png").is_file());
        assert!(dir.path().join("image_003.jpg").is_file());
        assert_eq!(
            std::fs::read(dir.path().join("image_002.png")).unwrap(),
            vec![0x89, b'P', b'N', b'G', 2]
        );
    }

    #[test]
    fn numbering_continues_from_caller_value() {
        let doc = InMemoryDocument::new().with_image_page("p", vec![png(9)]);
        let dir = tempfile::tempdir().unwrap();
        let out = extract_pages(&doc, PageRange { start: 0, end: 0 }, dir.path(), 12).unwrap();
        assert_eq!(out.images[0].image_number, 12);
        assert!(out.images[0].file.ends_with("image_012.png"));
        assert_eq!(out.next_image_number, 13);
    }

    #[test]
    fn sub_range_keeps_document_page_numbers() {
        let doc = InMemoryDocument::new()
            .with_page("a")
            .with_page("b")
            .with_page("c");
        let dir = tempfile::tempdir().unwrap();
        let out = extract_pages(&doc, PageRange { start: 1, end: 2 }, dir.path(), 1).unwrap();
        let numbers: Vec<_> = out.pages.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![2, 3]);
        assert!(out.images.is_empty());
    }

    #[test]
    fn previous_images_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("image_001.jpg"), b"old").unwrap();
        std::fs::write(dir.path().join("image_014.png"), b"old").unwrap();
        std::fs::write(dir.path().join("cover.png"), b"keep").unwrap();
        assert_eq!(remove_previous_images(dir.path()).unwrap(), 2);
        assert!(dir.path().join("cover.png").exists());
        assert_eq!(remove_previous_images(&dir.path().join("absent")).unwrap(), 0);
    }

    #[test]
    fn file_name_is_zero_padded() {
        assert_eq!(image_file_name(7, "png"), "image_007.png");
        assert_eq!(image_file_name(1234, "jpg"), "image_1234.jpg");
    }
}
