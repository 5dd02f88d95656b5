//! Synthesize stage: script file in, one audio file out.
//!
//! ```text
//! script ──▶ normalize ──▶ segment ──▶ speech (per unit) ──▶ audio (ffmpeg)
//! ```
//!
//! Per-unit audio lives in a temporary working directory that is removed
//! when this stage returns, on success and on every error path alike.

use crate::config::Settings;
use crate::error::Pdf2AudioError;
use crate::output::SynthesisStats;
use crate::pipeline::audio::{concatenate_fragments, ensure_ffmpeg};
use crate::pipeline::input;
use crate::pipeline::normalize::normalize_for_narration;
use crate::pipeline::segment::{segment, NarrationUnit};
use crate::pipeline::speech::{synthesize_units, CommandSpeechEngine, SpeechEngine};
use crate::progress::{or_noop, SharedObserver};
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Read `script` and reduce it to narration units.
///
/// Fails with [`Pdf2AudioError::NothingToNarrate`] when no speakable text
/// remains after normalisation.
pub async fn load_units(
    script: &Path,
    settings: &Settings,
) -> Result<(String, Vec<NarrationUnit>), Pdf2AudioError> {
    let path = input::require_script(script)?;
    let raw = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| Pdf2AudioError::ReadFailed {
            path: path.clone(),
            source: e,
        })?;
    let text = normalize_for_narration(&raw, &settings.text_processing);
    let units: Vec<NarrationUnit> = segment(&text, settings.tts.segmentation).collect();
    if units.is_empty() {
        return Err(Pdf2AudioError::NothingToNarrate { path });
    }
    Ok((text, units))
}

/// Run the synthesize stage with a caller-supplied speech engine.
///
/// # Errors
/// Fatal only: missing script, nothing to narrate, engine or ffmpeg not
/// available, every unit failed, concatenation failed. A single failed
/// unit is recorded in [`SynthesisStats::failures`] and left out.
pub async fn synthesize_script_file<E: SpeechEngine + ?Sized>(
    script: &Path,
    output: &Path,
    engine: &E,
    settings: &Settings,
    observer: Option<&SharedObserver>,
) -> Result<SynthesisStats, Pdf2AudioError> {
    let start = Instant::now();
    let (text, units) = load_units(script, settings).await?;
    info!("{} narration units ({} chars)", units.len(), text.len());

    // ── Preflight: both tools before the first unit ──────────────────────
    engine.ensure_available().await?;
    ensure_ffmpeg(&settings.tts.ffmpeg_path).await?;

    let mut builder = tempfile::Builder::new();
    builder.prefix("pdf2audio-");
    let work_dir = match &settings.tts.work_dir {
        Some(parent) => builder.tempdir_in(parent),
        None => builder.tempdir(),
    }
    .map_err(|e| Pdf2AudioError::Internal(format!("tempdir: {e}")))?;

    let observer = or_noop(observer);
    let outcome = synthesize_units(
        engine,
        &units,
        work_dir.path(),
        settings.tts.timeout_secs,
        &*observer,
    )
    .await;

    let failures = outcome.failures();
    let fragments = outcome.successful_paths();
    if fragments.is_empty() {
        return Err(Pdf2AudioError::AllUnitsFailed {
            total: units.len(),
            first_error: failures
                .first()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
        });
    }

    concatenate_fragments(
        &fragments,
        output,
        settings.tts.output_format,
        settings.tts.audio_quality,
        &settings.tts.ffmpeg_path,
    )
    .await?;

    let stats = SynthesisStats {
        output_path: output.to_path_buf(),
        units: units.len(),
        synthesized: fragments.len(),
        failures,
        narrated_chars: text.chars().count(),
        duration_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        "Synthesis complete: {}/{} units, {}ms",
        stats.synthesized, stats.units, stats.duration_ms
    );
    Ok(stats)
}

/// Run the synthesize stage with the engine named in the settings.
pub async fn narrate_script(
    script: &Path,
    output: &Path,
    settings: &Settings,
    observer: Option<&SharedObserver>,
) -> Result<SynthesisStats, Pdf2AudioError> {
    let engine = CommandSpeechEngine::from_settings(&settings.tts);
    synthesize_script_file(script, output, &engine, settings, observer).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn markup_only_script_has_nothing_to_narrate() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("empty.txt");
        std::fs::write(
            &script,
            "[PAGE 1]\n\n{{IMAGE_PLACEHOLDER_001}}\n[Image 1, page 1]\n\
[IMAGE DESCRIPTION PENDING - run the describe stage]\n",
        )
        .unwrap();
        let err = load_units(&script, &Settings::default()).await.unwrap_err();
        assert!(matches!(err, Pdf2AudioError::NothingToNarrate { .. }));
    }

    #[tokio::test]
    async fn units_follow_segmentation_setting() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("s.txt");
        std::fs::write(&script, "[PAGE 1]\n\nOne. Two.\n\nThree.\n").unwrap();

        let mut settings = Settings::default();
        let (_, units) = load_units(&script, &settings).await.unwrap();
        assert_eq!(units.len(), 3);

        settings.tts.segmentation = crate::config::Segmentation::Paragraph;
        let (_, units) = load_units(&script, &settings).await.unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].text, "One. Two.");
    }

    #[tokio::test]
    async fn missing_engine_fails_before_any_unit() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("s.txt");
        std::fs::write(&script, "Hello there.").unwrap();
        let output = dir.path().join("out.mp3");
        let mut settings = Settings::default();
        settings.tts.engine_path = Some(PathBuf::from("/nonexistent/piper-xyz"));

        let err = narrate_script(&script, &output, &settings, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2AudioError::MissingExternalTool { .. }));
        assert!(!output.exists());
    }
}
