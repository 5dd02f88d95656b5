//! Speech synthesis: one external engine invocation per narration unit.
//!
//! Units are synthesized one at a time, in order, into a working directory
//! owned by the caller. A unit that fails (spawn error, non-zero exit,
//! deadline, empty output) is recorded and skipped; the batch always runs to
//! the end. The surviving fragments keep their original relative order.

use crate::config::{SpeechBackend, TtsSettings};
use crate::error::{Pdf2AudioError, UnitError};
use crate::pipeline::segment::NarrationUnit;
use crate::progress::{ProgressObserver, Stage};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

/// espeak-ng words per minute at `speaking_rate: 1.0`.
const ESPEAK_BASE_WPM: f32 = 175.0;

/// An external text-to-speech engine.
#[allow(async_fn_in_trait)]
pub trait SpeechEngine {
    /// Fail with [`Pdf2AudioError::MissingExternalTool`] when the engine
    /// cannot be started at all.
    async fn ensure_available(&self) -> Result<(), Pdf2AudioError>;

    /// Write the spoken `text` to `dest` as a WAV file.
    async fn synthesize(&self, text: &str, dest: &Path) -> Result<(), String>;
}

/// Outcome of one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFragment {
    pub sequence_index: usize,
    pub outcome: Result<PathBuf, UnitError>,
}

/// Every unit's outcome, in sequence order.
#[derive(Debug, Clone, Default)]
pub struct SynthesisOutcome {
    pub fragments: Vec<AudioFragment>,
}

impl SynthesisOutcome {
    /// Audio files of the successful units, in order.
    pub fn successful_paths(&self) -> Vec<&Path> {
        self.fragments
            .iter()
            .filter_map(|f| f.outcome.as_ref().ok().map(PathBuf::as_path))
            .collect()
    }

    pub fn failures(&self) -> Vec<UnitError> {
        self.fragments
            .iter()
            .filter_map(|f| f.outcome.as_ref().err().cloned())
            .collect()
    }
}

/// Synthesize `units` into `work_dir`, one at a time.
pub async fn synthesize_units<E: SpeechEngine + ?Sized>(
    engine: &E,
    units: &[NarrationUnit],
    work_dir: &Path,
    timeout_secs: u64,
    observer: &dyn ProgressObserver,
) -> SynthesisOutcome {
    let total = units.len();
    let deadline = Duration::from_secs(timeout_secs);
    observer.on_stage_start(Stage::Synthesize, total);

    let mut fragments = Vec::with_capacity(total);
    for unit in units {
        let index = unit.sequence_index;
        observer.on_unit_start(Stage::Synthesize, index, total);
        let dest = work_dir.join(format!("unit_{index:06}.wav"));

        let outcome = match timeout(deadline, engine.synthesize(&unit.text, &dest)).await {
            Ok(Ok(())) => match tokio::fs::metadata(&dest).await {
                Ok(meta) if meta.len() > 0 => Ok(dest),
                _ => Err(UnitError::SynthesisUnitFailed {
                    index,
                    detail: "engine produced no audio".into(),
                }),
            },
            Ok(Err(detail)) => Err(UnitError::SynthesisUnitFailed { index, detail }),
            Err(_) => Err(UnitError::SynthesisTimeout {
                index,
                secs: timeout_secs,
            }),
        };

        match &outcome {
            Ok(_) => {
                debug!("Unit {}/{} synthesized", index + 1, total);
                observer.on_unit_complete(Stage::Synthesize, index, total);
            }
            Err(err) => {
                warn!("{} ({:?})", err, truncate(&unit.text, 60));
                let _ = tokio::fs::remove_file(work_dir.join(format!("unit_{index:06}.wav"))).await;
                observer.on_unit_error(Stage::Synthesize, index, total, &err.to_string());
            }
        }
        fragments.push(AudioFragment {
            sequence_index: index,
            outcome,
        });
    }

    let result = SynthesisOutcome { fragments };
    let ok = result.successful_paths().len();
    observer.on_stage_complete(Stage::Synthesize, total, ok);
    info!("Synthesized {}/{} units", ok, total);
    result
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((i, _)) => format!("{}…", &text[..i]),
        None => text.to_string(),
    }
}

// ── Command-line engines ─────────────────────────────────────────────────

/// Piper or espeak-ng run as a child process.
#[derive(Debug, Clone)]
pub struct CommandSpeechEngine {
    backend: SpeechBackend,
    binary: PathBuf,
    voice: String,
    rate: f32,
}

impl CommandSpeechEngine {
    pub fn from_settings(tts: &TtsSettings) -> Self {
        Self {
            backend: tts.engine,
            binary: tts
                .engine_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(tts.engine.default_binary())),
            voice: tts.voice_model.clone(),
            rate: tts.speaking_rate,
        }
    }

    /// Arguments for one unit. Both engines read the text from stdin, so
    /// text starting with `-` is never taken for an option.
    fn args(&self, dest: &Path) -> Vec<String> {
        let dest = dest.to_string_lossy().into_owned();
        match self.backend {
            SpeechBackend::Piper => vec![
                "--model".into(),
                self.voice.clone(),
                "--output_file".into(),
                dest,
                "--length_scale".into(),
                format!("{:.3}", 1.0 / self.rate),
            ],
            SpeechBackend::EspeakNg => vec![
                "--stdin".into(),
                "-v".into(),
                self.voice.clone(),
                "-s".into(),
                format!("{}", (ESPEAK_BASE_WPM * self.rate) as u32),
                "-w".into(),
                dest,
            ],
        }
    }

    fn tool_name(&self) -> String {
        self.binary.to_string_lossy().into_owned()
    }
}

impl SpeechEngine for CommandSpeechEngine {
    async fn ensure_available(&self) -> Result<(), Pdf2AudioError> {
        let probe = match self.backend {
            SpeechBackend::Piper => "--help",
            SpeechBackend::EspeakNg => "--version",
        };
        Command::new(&self.binary)
            .arg(probe)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| Pdf2AudioError::MissingExternalTool {
                tool: self.tool_name(),
                hint: match (e.kind(), self.backend) {
                    (std::io::ErrorKind::NotFound, SpeechBackend::Piper) => {
                        "Install piper (https://github.com/rhasspy/piper) or set tts.engine_path.".into()
                    }
                    (std::io::ErrorKind::NotFound, SpeechBackend::EspeakNg) => {
                        "Install espeak-ng (e.g. apt install espeak-ng) or set tts.engine_path.".into()
                    }
                    _ => format!("Failed to start: {e}"),
                },
            })?;
        debug!("Speech engine '{}' is available", self.tool_name());
        Ok(())
    }

    async fn synthesize(&self, text: &str, dest: &Path) -> Result<(), String> {
        let mut child = Command::new(&self.binary)
            .args(self.args(dest))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("failed to start {}: {e}", self.tool_name()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| format!("failed to send text: {e}"))?;
        }
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| format!("{} failed: {e}", self.tool_name()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last = stderr.lines().last().unwrap_or("").trim();
            return Err(format!("{} exited with {}: {}", self.tool_name(), output.status, last));
        }
        Ok(())
    }
}
