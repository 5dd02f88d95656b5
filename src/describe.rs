//! Describe stage: resolve the image placeholders of a script file.
//!
//! The script on disk is the checkpoint. It is rewritten atomically after
//! every successful substitution, so stopping the process at any point
//! leaves a valid script, and running the stage again only retries the
//! placeholders that are still pending.

use crate::config::{CredentialSource, ImageAnalysisSettings, Settings, API_KEY_ENV};
use crate::error::Pdf2AudioError;
use crate::output::{write_atomic, ResolveStats};
use crate::pipeline::input;
use crate::pipeline::resolve::{find_placeholders, resolve_placeholders, scan_image_dir};
use crate::pipeline::vision::{anthropic_provider, DescriptionService, LlmDescriber};
use crate::progress::{or_noop, SharedObserver};
use std::path::{Path, PathBuf};
use tracing::info;

/// A script loaded from disk, with its pending placeholder count.
struct LoadedScript {
    path: PathBuf,
    text: String,
    images_dir: PathBuf,
    pending: usize,
}

/// Validate inputs and read the script. The image directory is only
/// required when there is something to resolve.
async fn load(script: &Path, images_dir: Option<&Path>) -> Result<LoadedScript, Pdf2AudioError> {
    let path = input::require_script(script)?;
    let images_dir = images_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| input::default_image_dir(&path));
    let text = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| Pdf2AudioError::ReadFailed {
            path: path.clone(),
            source: e,
        })?;
    let pending = find_placeholders(&text).len();
    if pending > 0 {
        input::require_image_dir(&images_dir)?;
    }
    Ok(LoadedScript {
        path,
        text,
        images_dir,
        pending,
    })
}

async fn run<S: DescriptionService + ?Sized>(
    mut loaded: LoadedScript,
    service: &S,
    settings: &ImageAnalysisSettings,
    observer: Option<&SharedObserver>,
) -> Result<ResolveStats, Pdf2AudioError> {
    if loaded.pending == 0 {
        info!("{}: no pending placeholders", loaded.path.display());
        return Ok(ResolveStats::default());
    }
    let images = scan_image_dir(&loaded.images_dir)?;
    let observer = or_noop(observer);
    let path = loaded.path.clone();
    resolve_placeholders(
        &mut loaded.text,
        &images,
        service,
        settings,
        &*observer,
        |text| write_atomic(&path, text),
    )
    .await
}

/// Resolve the placeholders of `script` with a caller-supplied service.
///
/// `images_dir` defaults to `<script-stem>_images` next to the script.
pub async fn resolve_script_file<S: DescriptionService + ?Sized>(
    script: &Path,
    images_dir: Option<&Path>,
    service: &S,
    settings: &ImageAnalysisSettings,
    observer: Option<&SharedObserver>,
) -> Result<ResolveStats, Pdf2AudioError> {
    let loaded = load(script, images_dir).await?;
    run(loaded, service, settings, observer).await
}

/// Resolve the placeholders of `script` with the configured vision model.
///
/// The provider reads its key from `ANTHROPIC_API_KEY`. A key that only
/// exists in the settings file must be exported with
/// [`Settings::export_credential`] before the async runtime starts, as the
/// CLI does.
///
/// # Errors
/// Fatal only: missing script or image directory, no usable credential,
/// provider construction failure, failure to rewrite the script. A failed
/// image is recorded in [`ResolveStats::failures`] and left pending.
pub async fn describe_script(
    script: &Path,
    images_dir: Option<&Path>,
    settings: &Settings,
    observer: Option<&SharedObserver>,
) -> Result<ResolveStats, Pdf2AudioError> {
    let loaded = load(script, images_dir).await?;
    if loaded.pending == 0 {
        info!("{}: no pending placeholders", loaded.path.display());
        return Ok(ResolveStats::default());
    }

    let credential = settings.credential()?;
    if credential.source() == CredentialSource::SettingsFile
        && std::env::var_os(API_KEY_ENV).is_none()
    {
        return Err(Pdf2AudioError::MissingCredential {
            hint: format!(
                "The key in the settings file was not exported; call \
Settings::export_credential before starting the runtime, or set {API_KEY_ENV}."
            ),
        });
    }
    info!(
        "Describing {} images with {} (key from {:?})",
        loaded.pending,
        settings.image_analysis.model,
        credential.source()
    );
    let provider = anthropic_provider(&settings.image_analysis.model)?;
    let describer = LlmDescriber::new(provider, &settings.image_analysis);
    run(loaded, &describer, &settings.image_analysis, observer).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::vision::DescriptionRequest;

    struct Fixed;

    impl DescriptionService for Fixed {
        async fn describe(&self, request: &DescriptionRequest) -> Result<String, String> {
            Ok(format!("Figure number {} explained.", request.image_number))
        }
    }

    const SCRIPT: &str = "[PAGE 1]\n\n{{IMAGE_PLACEHOLDER_001}}\n[Image 1, page 1]\n\
[IMAGE DESCRIPTION PENDING - run the describe stage]\n\nText.\n";

    #[tokio::test]
    async fn rewrites_script_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("ch1.txt");
        std::fs::write(&script, SCRIPT).unwrap();
        std::fs::create_dir(dir.path().join("ch1_images")).unwrap();
        std::fs::write(dir.path().join("ch1_images/image_001.png"), b"png").unwrap();

        let stats = resolve_script_file(&script, None, &Fixed, &ImageAnalysisSettings::default(), None)
            .await
            .unwrap();
        assert_eq!(stats.resolved, vec![1]);
        let on_disk = std::fs::read_to_string(&script).unwrap();
        assert!(on_disk.contains("Figure number 1 explained."));
        assert!(on_disk.contains("The following describes Image 1 on page 1."));
    }

    #[tokio::test]
    async fn missing_image_dir_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("ch1.txt");
        std::fs::write(&script, SCRIPT).unwrap();
        let err = resolve_script_file(&script, None, &Fixed, &ImageAnalysisSettings::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Pdf2AudioError::InputNotFound {
                kind: "Image directory",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn resolved_script_needs_no_credential() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("done.txt");
        std::fs::write(&script, "[PAGE 1]\n\nAll text.\n").unwrap();
        let mut settings = Settings::default();
        settings.api.anthropic_api_key = None;
        let stats = describe_script(&script, None, &settings, None).await.unwrap();
        assert_eq!(stats.placeholders_found, 0);
    }

    #[tokio::test]
    async fn missing_script_is_fatal() {
        let err = describe_script(Path::new("/no/such/script.txt"), None, &Settings::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2AudioError::InputNotFound { kind: "Script", .. }));
    }
}
