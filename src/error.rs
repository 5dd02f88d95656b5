//! Error types for the pdf2audio library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2AudioError`] — **Fatal**: the stage cannot proceed at all
//!   (missing input, bad chapter selection, no credential, missing external
//!   tool). Returned as `Err(Pdf2AudioError)` from the stage entry points in
//!   [`crate::assemble`], [`crate::describe`] and [`crate::narrate`].
//!
//! * [`UnitError`] — **Non-fatal**: one image or one narration unit failed
//!   but every other unit is fine. Stored in the stage results so callers can
//!   inspect partial success instead of losing a whole chapter to one bad
//!   sentence.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2audio library.
///
/// Unit-level failures use [`UnitError`] and never propagate here.
#[derive(Debug, Error)]
pub enum Pdf2AudioError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// A required input (document, script, image directory) does not exist.
    #[error("{kind} not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { kind: &'static str, path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium returned an error while reading a specific page.
    #[error("Extraction failed for page {page}: {detail}")]
    ExtractionFailed { page: usize, detail: String },

    // ── Selection errors ──────────────────────────────────────────────────
    /// The requested chapter number exceeds the chapters that could be found.
    #[error(
        "Chapter {requested} not found ({available} chapters detected).\n\
Run with --list-chapters to see them, or select pages with --pages START-END."
    )]
    ChapterNotFound { requested: usize, available: usize },

    /// A page range was unparsable, inverted, or outside the document.
    #[error("Invalid page range '{input}': {reason}\nUse --pages START-END (1-indexed) or --all.")]
    InvalidRange { input: String, reason: String },

    // ── Description service errors ────────────────────────────────────────
    /// No API key was found in the settings file or the environment.
    #[error("No credential for the description service.\n{hint}")]
    MissingCredential { hint: String },

    /// The provider could not be constructed.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Audio errors ──────────────────────────────────────────────────────
    /// A required external program could not be started.
    #[error("Required tool '{tool}' is not available.\n{hint}")]
    MissingExternalTool { tool: String, hint: String },

    /// The transcoder ran but failed; no output file was produced.
    #[error("Audio concatenation failed: {detail}")]
    ConcatenationFailed { detail: String },

    /// The script contains no speakable text after normalisation.
    #[error("Script '{path}' contains no narratable text")]
    NothingToNarrate { path: PathBuf },

    /// Every narration unit failed; output would be empty.
    #[error("All {total} narration units failed to synthesize.\nFirst error: {first_error}")]
    AllUnitsFailed { total: usize, first_error: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not read an input file.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write an output file.
    #[error("Failed to write '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// The settings file exists but could not be read or parsed.
    #[error("Failed to load settings from '{path}': {detail}")]
    ConfigRead { path: PathBuf, detail: String },

    /// Settings validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium from https://github.com/bblanchon/pdfium-binaries and either\n\
  • place it next to the binary or in the current directory, or\n\
  • set PDFIUM_LIB_PATH=/path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single image or narration unit.
///
/// The owning stage logs it, records it in its statistics, and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum UnitError {
    /// No `image_<NNN>.*` file exists for the placeholder.
    #[error("Image {image}: no image file found")]
    ImageMissing { image: usize },

    /// The description service failed after all retries.
    #[error("Image {image}: description failed after {retries} retries: {detail}")]
    ImageResolutionFailed {
        image: usize,
        retries: u32,
        detail: String,
    },

    /// The description call exceeded its deadline.
    #[error("Image {image}: description timed out after {secs}s")]
    DescriptionTimeout { image: usize, secs: u64 },

    /// The speech engine failed or produced no audio.
    #[error("Unit {index}: synthesis failed: {detail}")]
    SynthesisUnitFailed { index: usize, detail: String },

    /// The speech engine exceeded its deadline.
    #[error("Unit {index}: synthesis timed out after {secs}s")]
    SynthesisTimeout { index: usize, secs: u64 },
}
