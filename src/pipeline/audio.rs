//! Audio assembly: concatenate fragments into one file with ffmpeg.
//!
//! ffmpeg's concat demuxer reads a list file of inputs and re-encodes them
//! into the configured container. The output is produced at a hidden
//! temporary path next to the destination and renamed into place only after
//! ffmpeg exits successfully, so a failed run never leaves a truncated file
//! at the requested path.

use crate::config::{AudioFormat, AudioQuality};
use crate::error::Pdf2AudioError;
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

const FFMPEG_HINT: &str =
    "Install ffmpeg (https://ffmpeg.org/download.html) or set tts.ffmpeg_path.";

/// Fail with [`Pdf2AudioError::MissingExternalTool`] unless `ffmpeg` runs.
pub async fn ensure_ffmpeg(ffmpeg: &Path) -> Result<(), Pdf2AudioError> {
    Command::new(ffmpeg)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| missing_ffmpeg(ffmpeg, &e))?;
    debug!("ffmpeg is available at {}", ffmpeg.display());
    Ok(())
}

/// Concatenate `fragments`, in order, into `output`.
pub async fn concatenate_fragments(
    fragments: &[&Path],
    output: &Path,
    format: AudioFormat,
    quality: AudioQuality,
    ffmpeg: &Path,
) -> Result<(), Pdf2AudioError> {
    if fragments.is_empty() {
        return Err(Pdf2AudioError::ConcatenationFailed {
            detail: "no audio fragments to concatenate".into(),
        });
    }

    let scratch = tempfile::tempdir().map_err(|e| Pdf2AudioError::Internal(format!("tempdir: {e}")))?;
    let list_path = scratch.path().join("concat.txt");
    write_concat_list(&list_path, fragments)?;

    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|e| Pdf2AudioError::WriteFailed {
        path: parent.to_path_buf(),
        source: e,
    })?;
    let partial = tempfile::Builder::new()
        .prefix(".pdf2audio-")
        .suffix(&format!(".{}", format.extension()))
        .tempfile_in(parent)
        .map_err(|e| Pdf2AudioError::WriteFailed {
            path: output.to_path_buf(),
            source: e,
        })?;

    let mut cmd = Command::new(ffmpeg);
    cmd.args(["-hide_banner", "-loglevel", "error", "-y", "-f", "concat", "-safe", "0", "-i"])
        .arg(&list_path)
        .args(codec_args(format, quality))
        .arg(partial.path())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    debug!("Running ffmpeg on {} fragments", fragments.len());
    let out = cmd.output().await.map_err(|e| missing_ffmpeg(ffmpeg, &e))?;
    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(3).collect();
        return Err(Pdf2AudioError::ConcatenationFailed {
            detail: format!(
                "ffmpeg exited with {}: {}",
                out.status,
                tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
            ),
        });
    }

    partial.persist(output).map_err(|e| Pdf2AudioError::WriteFailed {
        path: output.to_path_buf(),
        source: e.error,
    })?;
    info!("Wrote {}", output.display());
    Ok(())
}

/// Encoder and container arguments for `format`.
fn codec_args(format: AudioFormat, quality: AudioQuality) -> Vec<String> {
    let mut args: Vec<String> = match format {
        AudioFormat::Mp3 => vec!["-c:a".into(), "libmp3lame".into(), "-b:a".into(), quality.bitrate().into()],
        AudioFormat::Ogg => vec!["-c:a".into(), "libvorbis".into(), "-b:a".into(), quality.bitrate().into()],
        AudioFormat::Flac => vec!["-c:a".into(), "flac".into()],
        AudioFormat::Wav => vec!["-c:a".into(), "pcm_s16le".into()],
    };
    args.push("-f".into());
    args.push(format.extension().into());
    args
}

/// One `file '<path>'` line per fragment, single quotes escaped.
fn write_concat_list(list_path: &Path, fragments: &[&Path]) -> Result<(), Pdf2AudioError> {
    let write_err = |e| Pdf2AudioError::WriteFailed {
        path: list_path.to_path_buf(),
        source: e,
    };
    let mut file = std::fs::File::create(list_path).map_err(write_err)?;
    for fragment in fragments {
        let absolute = std::path::absolute(fragment).map_err(write_err)?;
        let escaped = absolute.to_string_lossy().replace('\'', r"'\''");
        writeln!(file, "file '{escaped}'").map_err(write_err)?;
    }
    Ok(())
}

fn missing_ffmpeg(ffmpeg: &Path, e: &std::io::Error) -> Pdf2AudioError {
    if e.kind() == std::io::ErrorKind::NotFound {
        Pdf2AudioError::MissingExternalTool {
            tool: ffmpeg.to_string_lossy().into_owned(),
            hint: FFMPEG_HINT.into(),
        }
    } else {
        Pdf2AudioError::ConcatenationFailed {
            detail: format!("failed to start {}: {e}", ffmpeg.display()),
        }
    }
}
