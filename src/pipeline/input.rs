//! Input validation: fail fast, before any work starts, when a stage input
//! is missing or unreadable.
//!
//! The PDF check also verifies the magic bytes (`%PDF`) so callers get a
//! meaningful error rather than a pdfium parse failure.

use crate::error::Pdf2AudioError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate that `path` is a readable PDF.
pub fn require_pdf(path: &Path) -> Result<PathBuf, Pdf2AudioError> {
    let path = require_file(path, "Document")?;
    let mut file = open(&path, "Document")?;
    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
        return Err(Pdf2AudioError::NotAPdf { path, magic });
    }
    debug!("Resolved PDF: {}", path.display());
    Ok(path)
}

/// Validate that the script file exists and is readable.
pub fn require_script(path: &Path) -> Result<PathBuf, Pdf2AudioError> {
    let path = require_file(path, "Script")?;
    open(&path, "Script")?;
    Ok(path)
}

/// Validate that the image directory exists.
pub fn require_image_dir(path: &Path) -> Result<PathBuf, Pdf2AudioError> {
    if !path.is_dir() {
        return Err(Pdf2AudioError::InputNotFound {
            kind: "Image directory",
            path: path.to_path_buf(),
        });
    }
    Ok(path.to_path_buf())
}

/// Image directory that sits next to a script: `<dir>/<stem>_images`.
pub fn default_image_dir(script_path: &Path) -> PathBuf {
    let stem = script_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "script".to_string());
    script_path
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(format!("{stem}_images"))
}

fn require_file(path: &Path, kind: &'static str) -> Result<PathBuf, Pdf2AudioError> {
    if !path.is_file() {
        return Err(Pdf2AudioError::InputNotFound {
            kind,
            path: path.to_path_buf(),
        });
    }
    Ok(path.to_path_buf())
}

fn open(path: &Path, kind: &'static str) -> Result<std::fs::File, Pdf2AudioError> {
    std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => Pdf2AudioError::PermissionDenied {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::NotFound => Pdf2AudioError::InputNotFound {
            kind,
            path: path.to_path_buf(),
        },
        _ => Pdf2AudioError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_pdf_is_input_not_found() {
        let err = require_pdf(Path::new("/definitely/not/a/real/file.pdf")).unwrap_err();
        assert!(matches!(
            err,
            Pdf2AudioError::InputNotFound {
                kind: "Document",
                ..
            }
        ));
    }

    #[test]
    fn non_pdf_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.pdf");
        std::fs::write(&path, b"hello world").unwrap();
        assert!(matches!(
            require_pdf(&path),
            Err(Pdf2AudioError::NotAPdf { magic, .. }) if &magic == b"hell"
        ));
    }

    #[test]
    fn pdf_magic_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.pdf");
        std::fs::write(&path, b"%PDF-1.7\n").unwrap();
        assert_eq!(require_pdf(&path).unwrap(), path);
    }

    #[test]
    fn image_dir_must_be_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(require_image_dir(dir.path()).is_ok());
        assert!(matches!(
            require_image_dir(&dir.path().join("missing")),
            Err(Pdf2AudioError::InputNotFound { .. })
        ));
    }

    #[test]
    fn default_image_dir_is_colocated() {
        assert_eq!(
            default_image_dir(Path::new("out/chapter_03.txt")),
            PathBuf::from("out/chapter_03_images")
        );
    }
}
