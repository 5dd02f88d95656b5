//! Pipeline components for PDF-to-audio narration.
//!
//! Each submodule implements exactly one transformation step, so each is
//! testable on its own and the stage entry points ([`crate::assemble`],
//! [`crate::describe`], [`crate::narrate`]) stay thin.
//!
//! ## Data Flow
//!
//! ```text
//! chapters ──▶ extract ──▶ labels ──▶ script        (script stage)
//!                                        │
//!                          vision ◀── resolve       (describe stage)
//!                                        │
//! normalize ──▶ segment ──▶ speech ──▶ audio         (synthesize stage)
//! ```
//!
//! 1. [`source`]   — read-only document access (pdfium or in-memory)
//! 2. [`input`]    — fail-fast validation of stage inputs
//! 3. [`chapters`] — chapter / page-range selection
//! 4. [`extract`]  — page text and embedded images; runs in `spawn_blocking`
//! 5. [`labels`]   — `Figure X` labels for images
//! 6. [`script`]   — script assembly and the script's token formats
//! 7. [`vision`]   — the description service, with timeout and retry
//! 8. [`resolve`]  — idempotent placeholder substitution
//! 9. [`normalize`] — strip markup, tidy whitespace
//! 10. [`segment`] — sentence / paragraph units
//! 11. [`speech`]  — per-unit synthesis with failure isolation
//! 12. [`audio`]   — ffmpeg concatenation with atomic output

pub mod audio;
pub mod chapters;
pub mod extract;
pub mod input;
pub mod labels;
pub mod normalize;
pub mod resolve;
pub mod script;
pub mod segment;
pub mod source;
pub mod speech;
pub mod vision;
