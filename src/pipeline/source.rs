//! Read-only access to a paginated document.
//!
//! Every stage that needs the document goes through [`PageSource`], which
//! exposes exactly what the pipeline consumes: a page count, an optional
//! outline, per-page text, and per-page embedded images. Two implementations
//! exist: [`PdfiumSource`] wraps a document loaded by pdfium, and
//! [`InMemoryDocument`] holds pages built in code (tests, callers that
//! already have text).
//!
//! ## Why a closure for pdfium?
//!
//! A pdfium document borrows the library bindings it was loaded with, so it
//! cannot outlive the function that bound them. [`with_pdf_document`] binds,
//! loads, and hands the caller a borrowed [`PdfiumSource`] for the duration
//! of a closure. The caller runs it inside `spawn_blocking` because pdfium is
//! CPU-bound and not async-safe.

use crate::error::Pdf2AudioError;
use image::{DynamicImage, ImageFormat};
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One entry of the document outline (table of contents).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineEntry {
    /// Nesting depth; 1 is top level.
    pub level: usize,
    pub title: String,
    /// Zero-indexed page the entry points at.
    pub page_index: usize,
}

impl OutlineEntry {
    pub fn new(level: usize, title: impl Into<String>, page_index: usize) -> Self {
        Self {
            level,
            title: title.into(),
            page_index,
        }
    }
}

/// An embedded raster image: encoded bytes plus their encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

impl EmbeddedImage {
    pub fn new(bytes: Vec<u8>, format: ImageFormat) -> Self {
        Self { bytes, format }
    }

    /// File extension for this encoding (`png`, `jpg`, …).
    pub fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("bin")
    }
}

/// Read-only view of a paginated document.
pub trait PageSource {
    fn page_count(&self) -> usize;

    /// Outline entries in document order; empty when the document has none.
    fn outline(&self) -> Vec<OutlineEntry>;

    /// Plain text of a zero-indexed page.
    fn page_text(&self, index: usize) -> Result<String, Pdf2AudioError>;

    /// Embedded raster images of a zero-indexed page, in discovery order.
    fn page_images(&self, index: usize) -> Result<Vec<EmbeddedImage>, Pdf2AudioError>;
}

// ── In-memory documents ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct InMemoryPage {
    text: String,
    images: Vec<EmbeddedImage>,
}

/// A document assembled in code.
///
/// ```rust
/// use pdf2audio::pipeline::source::{InMemoryDocument, OutlineEntry, PageSource};
///
/// let doc = InMemoryDocument::new()
///     .with_page("Chapter 1\nIntroduction")
///     .with_page("More text")
///     .with_outline(vec![OutlineEntry::new(1, "Introduction", 0)]);
/// assert_eq!(doc.page_count(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocument {
    pages: Vec<InMemoryPage>,
    outline: Vec<OutlineEntry>,
}

impl InMemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text-only page.
    pub fn with_page(mut self, text: impl Into<String>) -> Self {
        self.pages.push(InMemoryPage {
            text: text.into(),
            images: Vec::new(),
        });
        self
    }

    /// Append a page with embedded images.
    pub fn with_image_page(mut self, text: impl Into<String>, images: Vec<EmbeddedImage>) -> Self {
        self.pages.push(InMemoryPage {
            text: text.into(),
            images,
        });
        self
    }

    pub fn with_outline(mut self, outline: Vec<OutlineEntry>) -> Self {
        self.outline = outline;
        self
    }

    fn page(&self, index: usize) -> Result<&InMemoryPage, Pdf2AudioError> {
        self.pages
            .get(index)
            .ok_or_else(|| Pdf2AudioError::ExtractionFailed {
                page: index + 1,
                detail: format!("document has {} pages", self.pages.len()),
            })
    }
}

impl PageSource for InMemoryDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn outline(&self) -> Vec<OutlineEntry> {
        self.outline.clone()
    }

    fn page_text(&self, index: usize) -> Result<String, Pdf2AudioError> {
        Ok(self.page(index)?.text.clone())
    }

    fn page_images(&self, index: usize) -> Result<Vec<EmbeddedImage>, Pdf2AudioError> {
        Ok(self.page(index)?.images.clone())
    }
}

// ── pdfium ───────────────────────────────────────────────────────────────

/// A document loaded through pdfium.
pub struct PdfiumSource<'a> {
    document: PdfDocument<'a>,
}

/// Bind to the pdfium shared library.
///
/// Lookup order: `PDFIUM_LIB_PATH`, the current directory, the system
/// library path.
pub fn bind_pdfium() -> Result<Pdfium, Pdf2AudioError> {
    let bindings = match std::env::var_os("PDFIUM_LIB_PATH") {
        Some(path) => Pdfium::bind_to_library(PathBuf::from(path)),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| Pdf2AudioError::PdfiumBindingFailed(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

/// Load `pdf_path` and run `f` against it.
///
/// Blocking: call from `spawn_blocking` in async contexts.
pub fn with_pdf_document<T>(
    pdf_path: &Path,
    password: Option<&str>,
    f: impl FnOnce(&PdfiumSource<'_>) -> Result<T, Pdf2AudioError>,
) -> Result<T, Pdf2AudioError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                Pdf2AudioError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                Pdf2AudioError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            Pdf2AudioError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })?;

    let source = PdfiumSource { document };
    info!("PDF loaded: {} pages", source.page_count());
    f(&source)
}

impl<'a> PdfiumSource<'a> {
    fn page(&self, index: usize) -> Result<PdfPage<'a>, Pdf2AudioError> {
        self.document
            .pages()
            .get(index as u16)
            .map_err(|e| Pdf2AudioError::ExtractionFailed {
                page: index + 1,
                detail: format!("{:?}", e),
            })
    }
}

impl PageSource for PdfiumSource<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn outline(&self) -> Vec<OutlineEntry> {
        let bookmarks = self.document.bookmarks();
        let mut entries = Vec::new();
        let Some(first) = bookmarks.root() else {
            return entries;
        };

        let siblings: Vec<PdfBookmark<'_>> = first.iter_siblings().collect();
        for bookmark in std::iter::once(first).chain(siblings) {
            let Some(entry) = outline_entry(1, &bookmark) else {
                continue;
            };
            // Some pdfium builds include the starting bookmark among its siblings.
            if entries
                .iter()
                .rev()
                .find(|e: &&OutlineEntry| e.level == 1)
                .is_some_and(|last| *last == entry)
            {
                continue;
            }
            entries.push(entry);
            for child in bookmark.iter_direct_children() {
                if let Some(entry) = outline_entry(2, &child) {
                    entries.push(entry);
                }
            }
        }
        debug!("Outline has {} entries", entries.len());
        entries
    }

    fn page_text(&self, index: usize) -> Result<String, Pdf2AudioError> {
        let page = self.page(index)?;
        let text = page.text().map_err(|e| Pdf2AudioError::ExtractionFailed {
            page: index + 1,
            detail: format!("{:?}", e),
        })?;
        Ok(text.all())
    }

    fn page_images(&self, index: usize) -> Result<Vec<EmbeddedImage>, Pdf2AudioError> {
        let page = self.page(index)?;
        let mut images = Vec::new();
        for object in page.objects().iter() {
            let Some(image_object) = object.as_image_object() else {
                continue;
            };
            match image_object.get_raw_image() {
                Ok(raw) => match encode_png(&raw) {
                    Ok(bytes) => images.push(EmbeddedImage::new(bytes, ImageFormat::Png)),
                    Err(e) => warn!("Page {}: image encoding failed: {}", index + 1, e),
                },
                Err(e) => warn!("Page {}: unreadable image object: {:?}", index + 1, e),
            }
        }
        Ok(images)
    }
}

fn outline_entry(level: usize, bookmark: &PdfBookmark<'_>) -> Option<OutlineEntry> {
    let page_index = bookmark.destination()?.page_index().ok()? as usize;
    Some(OutlineEntry {
        level,
        title: bookmark.title().unwrap_or_default().trim().to_string(),
        page_index,
    })
}

/// Re-encode a decoded pdfium image losslessly.
///
/// pdfium hands back decoded pixels, not the original stream, so PNG keeps
/// every pixel without re-compression artefacts.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn in_memory_document_pages() {
        let doc = InMemoryDocument::new()
            .with_page("one")
            .with_image_page("two", vec![EmbeddedImage::new(vec![1, 2], ImageFormat::Jpeg)]);
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.page_text(1).unwrap(), "two");
        assert_eq!(doc.page_images(1).unwrap().len(), 1);
        assert!(doc.page_images(0).unwrap().is_empty());
        assert!(matches!(
            doc.page_text(5),
            Err(Pdf2AudioError::ExtractionFailed { page: 6, .. })
        ));
    }

    #[test]
    fn extension_follows_format() {
        assert_eq!(EmbeddedImage::new(vec![], ImageFormat::Png).extension(), "png");
        assert_eq!(EmbeddedImage::new(vec![], ImageFormat::Jpeg).extension(), "jpg");
    }

    #[test]
    fn encode_png_produces_png_signature() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 128, 255, 255])));
        let bytes = encode_png(&img).expect("encode");
        assert_eq!(&bytes[1..4], b"PNG");
    }
}
