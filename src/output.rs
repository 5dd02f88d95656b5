//! Per-stage result statistics.
//!
//! Each stage entry point returns one of these on success. They are
//! `Serialize` so the CLI can print them with `--json` and a host
//! application can store them alongside the script.

use crate::error::{Pdf2AudioError, UnitError};
use crate::pipeline::chapters::Chapter;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Result of the script stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptStats {
    pub script_path: PathBuf,
    pub images_dir: PathBuf,
    /// Total pages in the document.
    pub document_pages: usize,
    /// 1-indexed first and last page of the selected range.
    pub first_page: usize,
    pub last_page: usize,
    pub pages: usize,
    pub images: usize,
    /// Images that received a `Figure X` label rather than `Image N`.
    pub labelled_images: usize,
    pub summarized_pages: Vec<usize>,
    pub tables_announced: usize,
    pub duration_ms: u64,
}

/// Result of the describe stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolveStats {
    /// Placeholders found by the scan.
    pub placeholders_found: usize,
    /// Image numbers resolved in this run, in script order.
    pub resolved: Vec<usize>,
    /// Images skipped in this run; their placeholders remain.
    pub failures: Vec<UnitError>,
    pub duration_ms: u64,
}

impl ResolveStats {
    /// Placeholders still pending after this run.
    pub fn remaining(&self) -> usize {
        self.placeholders_found - self.resolved.len()
    }
}

/// Result of the synthesize stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynthesisStats {
    pub output_path: PathBuf,
    pub units: usize,
    pub synthesized: usize,
    pub failures: Vec<UnitError>,
    /// Characters of narration after normalisation.
    pub narrated_chars: usize,
    pub duration_ms: u64,
}

/// Page count and chapter list of a document, for `--list-chapters`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub page_count: usize,
    pub chapters: Vec<Chapter>,
}

/// Write `contents` to `path` atomically: temp file, then rename.
///
/// Readers of `path` see either the previous file or the complete new one,
/// never a partial write. The script is rewritten after every resolved
/// image, so an interrupted describe run leaves a valid checkpoint.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), Pdf2AudioError> {
    let write_err = |source| Pdf2AudioError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let mut tmp_name = path.file_name().map(OsString::from).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, contents).map_err(write_err)?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        write_err(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_counts_unresolved() {
        let stats = ResolveStats {
            placeholders_found: 5,
            resolved: vec![1, 2, 4],
            failures: vec![UnitError::ImageMissing { image: 3 }],
            duration_ms: 0,
        };
        assert_eq!(stats.remaining(), 2);
    }

    #[test]
    fn atomic_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("chapter.txt");
        write_atomic(&path, "first").unwrap();
        write_atomic(&path, "second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        assert!(!dir.path().join("nested").join("chapter.txt.tmp").exists());
    }

    #[test]
    fn stats_serialise_to_json() {
        let stats = SynthesisStats {
            units: 3,
            synthesized: 2,
            failures: vec![UnitError::SynthesisTimeout { index: 1, secs: 5 }],
            ..SynthesisStats::default()
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["synthesized"], 2);
        assert!(json["failures"][0].get("SynthesisTimeout").is_some());
    }
}
