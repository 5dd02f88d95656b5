//! # pdf2audio
//!
//! Turn a chapter of a PDF textbook into narrated audio, figures included.
//!
//! ## Why this crate?
//!
//! Plain text-to-speech over extracted PDF text skips every figure, reads
//! page furniture aloud and stumbles over long citations. This crate builds
//! an editable narration *script* first: page text in reading order with a
//! placeholder for every embedded image. A vision model then replaces each
//! placeholder with a spoken description, and only the cleaned-up script is
//! handed to a local speech engine.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Script      chapter → pages → text + images → annotated script file
//!  ├─ 2. Describe    placeholders → vision model → description blocks (resumable)
//!  └─ 3. Synthesize  normalize → units → speech engine → ffmpeg → one audio file
//! ```
//!
//! Each stage reads and writes files, so a stage can be re-run on its own
//! and the script can be edited by hand between stages.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2audio::{build_script, describe_script, narrate_script};
//! use pdf2audio::{ChapterSelector, ScriptRequest, Settings};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::load_or_default(None)?;
//!     let request = ScriptRequest {
//!         pdf: "biology.pdf".into(),
//!         selector: ChapterSelector::Chapter(3),
//!         output: "chapter3.txt".into(),
//!         images_dir: None,
//!         password: None,
//!     };
//!     build_script(&request, &settings.text_processing).await?;
//!     let described = describe_script(Path::new("chapter3.txt"), None, &settings, None).await?;
//!     eprintln!("{} placeholders left", described.remaining());
//!     narrate_script(Path::new("chapter3.txt"), Path::new("chapter3.mp3"), &settings, None).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2audio` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ## External programs
//!
//! | Stage | Needs |
//! |-------|-------|
//! | script | a pdfium shared library |
//! | describe | `ANTHROPIC_API_KEY` or `api.anthropic_api_key` |
//! | synthesize | `piper` or `espeak-ng`, and `ffmpeg` |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assemble;
pub mod config;
pub mod describe;
pub mod error;
pub mod narrate;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assemble::{build_script, inspect, ScriptRequest};
pub use config::{
    AudioFormat, AudioQuality, ChapterSelector, DescriptionStyle, Segmentation, Settings,
    SpeechBackend, TableHandling,
};
pub use describe::{describe_script, resolve_script_file};
pub use error::{Pdf2AudioError, UnitError};
pub use narrate::{narrate_script, synthesize_script_file};
pub use output::{DocumentSummary, ResolveStats, ScriptStats, SynthesisStats};
pub use pipeline::chapters::Chapter;
pub use pipeline::speech::SpeechEngine;
pub use pipeline::vision::DescriptionService;
pub use progress::{NoopProgress, ProgressObserver, SharedObserver, Stage};
