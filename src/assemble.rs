//! Script stage: PDF and chapter selection in, annotated script out.
//!
//! pdfium is CPU-bound and not async-safe, so everything that touches the
//! document runs inside one `spawn_blocking` task. Only the final write of
//! the script happens back on the async side.

use crate::config::{ChapterSelector, TextProcessingSettings};
use crate::error::Pdf2AudioError;
use crate::output::{write_atomic, DocumentSummary, ScriptStats};
use crate::pipeline::chapters::{list_chapters, resolve_range, PageRange};
use crate::pipeline::extract::{extract_pages, remove_previous_images, ImageAsset};
use crate::pipeline::labels::assign_figure_labels;
use crate::pipeline::script::{assemble_script, ScriptDocument};
use crate::pipeline::source::{with_pdf_document, PageSource};
use crate::pipeline::input;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// Inputs of the script stage.
#[derive(Debug, Clone)]
pub struct ScriptRequest {
    pub pdf: PathBuf,
    pub selector: ChapterSelector,
    /// Where the script is written.
    pub output: PathBuf,
    /// Image directory. Default: `<output-stem>_images` next to the script.
    pub images_dir: Option<PathBuf>,
    pub password: Option<String>,
}

impl ScriptRequest {
    pub fn images_dir(&self) -> PathBuf {
        self.images_dir
            .clone()
            .unwrap_or_else(|| input::default_image_dir(&self.output))
    }
}

/// Everything the script stage produced, before it is written out.
#[derive(Debug, Clone)]
pub struct AssembledScript {
    pub script: ScriptDocument,
    pub range: PageRange,
    pub document_pages: usize,
    pub images: Vec<ImageAsset>,
}

/// Resolve the selection, extract, label and assemble, from any source.
///
/// Blocking. Images from an earlier run in `images_dir` are removed first.
pub fn assemble_from_source(
    source: &dyn PageSource,
    selector: &ChapterSelector,
    images_dir: &Path,
    settings: &TextProcessingSettings,
) -> Result<AssembledScript, Pdf2AudioError> {
    let range = resolve_range(source, selector)?;
    remove_previous_images(images_dir)?;
    let mut extraction = extract_pages(source, range, images_dir, 1)?;
    assign_figure_labels(&mut extraction.images, &extraction.pages);
    let script = assemble_script(&extraction.pages, &extraction.images, settings);
    Ok(AssembledScript {
        script,
        range,
        document_pages: source.page_count(),
        images: extraction.images,
    })
}

/// Run the script stage against a PDF on disk.
///
/// # Errors
/// Fatal only: missing or unreadable PDF, bad password, chapter or range
/// not found, failure to write the script or an image.
pub async fn build_script(
    request: &ScriptRequest,
    settings: &TextProcessingSettings,
) -> Result<ScriptStats, Pdf2AudioError> {
    let start = Instant::now();
    let pdf = input::require_pdf(&request.pdf)?;
    let images_dir = request.images_dir();
    info!("Building script for {} ({})", pdf.display(), request.selector);

    let assembled = {
        let selector = request.selector.clone();
        let password = request.password.clone();
        let images_dir = images_dir.clone();
        let settings = settings.clone();
        tokio::task::spawn_blocking(move || {
            with_pdf_document(&pdf, password.as_deref(), |source| {
                assemble_from_source(source, &selector, &images_dir, &settings)
            })
        })
        .await
        .map_err(|e| Pdf2AudioError::Internal(format!("Script task panicked: {e}")))??
    };

    write_atomic(&request.output, &assembled.script.text)?;

    let stats = ScriptStats {
        script_path: request.output.clone(),
        images_dir,
        document_pages: assembled.document_pages,
        first_page: assembled.range.start + 1,
        last_page: assembled.range.end + 1,
        pages: assembled.script.page_count,
        images: assembled.images.len(),
        labelled_images: assembled
            .images
            .iter()
            .filter(|i| i.figure_label.is_some())
            .count(),
        summarized_pages: assembled.script.summarized_pages.clone(),
        tables_announced: assembled.script.tables_announced,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        "Script written to {} ({} pages, {} images, {}ms)",
        request.output.display(),
        stats.pages,
        stats.images,
        stats.duration_ms
    );
    Ok(stats)
}

/// Page count and chapters of any source.
pub fn summarize_source(source: &dyn PageSource) -> Result<DocumentSummary, Pdf2AudioError> {
    Ok(DocumentSummary {
        page_count: source.page_count(),
        chapters: list_chapters(source)?,
    })
}

/// Page count and chapters of a PDF, without extracting anything.
///
/// Needs no credential and no external tool besides pdfium.
pub async fn inspect(
    pdf: impl AsRef<Path>,
    password: Option<&str>,
) -> Result<DocumentSummary, Pdf2AudioError> {
    let pdf = input::require_pdf(pdf.as_ref())?;
    let password = password.map(str::to_string);
    tokio::task::spawn_blocking(move || {
        with_pdf_document(&pdf, password.as_deref(), |source| summarize_source(source))
    })
    .await
    .map_err(|e| Pdf2AudioError::Internal(format!("Inspect task panicked: {e}")))?
}
