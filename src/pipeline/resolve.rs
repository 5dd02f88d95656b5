//! Placeholder resolution: splice image descriptions into the script.
//!
//! ## Rewrite rule
//!
//! For image `N` the rule matches the first `{{IMAGE_PLACEHOLDER_N}}` token
//! together with everything up to and including the first pending notice
//! after it, and replaces that span with an `[Image Description]` block. The
//! replacement contains no placeholder token, so a region is never matched
//! twice and a second run over a fully resolved script is a no-op. A token
//! whose pending notice is missing, or lies beyond the next token, is not
//! rewritten: replacing that span would swallow another image's block.
//!
//! Token positions and context are taken from the text as it was loaded.
//! Substitutions shift byte offsets, so each rewrite locates its token again
//! in the current text rather than reusing a stored offset.

use crate::config::ImageAnalysisSettings;
use crate::error::{Pdf2AudioError, UnitError};
use crate::output::ResolveStats;
use crate::pipeline::extract::RE_IMAGE_FILE;
use crate::pipeline::script::{description_block, placeholder_token, PENDING_NOTICE};
use crate::pipeline::vision::{
    describe_with_retry, mime_for_extension, DescriptionRequest, DescriptionService,
};
use crate::progress::{ProgressObserver, Stage};
use crate::prompts::description_prompt;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Bytes of original text examined on each side of a token for context.
pub const CONTEXT_WINDOW: usize = 300;

static RE_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{IMAGE_PLACEHOLDER_(\d{3,})\}\}").unwrap());

static RE_ANNOTATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\[\]\n]+), page (\d+)\]").unwrap());

static RE_PAGE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[PAGE (\d+)\]").unwrap());

/// A placeholder token found in the script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceholderRef {
    pub image_number: usize,
    /// Byte offset of the token in the scanned text.
    pub offset: usize,
    pub len: usize,
}

/// A description ready to be spliced in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDescription {
    pub image_number: usize,
    pub context: Option<String>,
    pub description: String,
}

/// Every placeholder token in `text`, in order. A repeated number is
/// reported once, at its first position.
pub fn find_placeholders(text: &str) -> Vec<PlaceholderRef> {
    let mut seen = std::collections::HashSet::new();
    RE_PLACEHOLDER
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let image_number: usize = caps[1].parse().ok()?;
            seen.insert(image_number).then_some(PlaceholderRef {
                image_number,
                offset: whole.start(),
                len: whole.len(),
            })
        })
        .collect()
}

/// Map image number to file for every `image_<NNN>.<ext>` in `dir`.
///
/// When several files share a number, a `.png` (what extraction writes for
/// PDF images) wins, then the lowest file name.
pub fn scan_image_dir(dir: &Path) -> Result<BTreeMap<usize, PathBuf>, Pdf2AudioError> {
    let entries = std::fs::read_dir(dir).map_err(|e| Pdf2AudioError::ReadFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let mut candidates: Vec<(usize, bool, String)> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let (number, not_png) = {
                let caps = RE_IMAGE_FILE.captures(&name)?;
                (
                    caps[1].parse::<usize>().ok()?,
                    !caps[2].eq_ignore_ascii_case("png"),
                )
            };
            Some((number, not_png, name))
        })
        .collect();
    candidates.sort();

    let mut files = BTreeMap::new();
    for (number, _, name) in candidates {
        files.entry(number).or_insert_with(|| dir.join(name));
    }
    debug!("{} image files in {}", files.len(), dir.display());
    Ok(files)
}

/// Context sentence for the token at `placeholder`, from the label annotation
/// nearest after it (or, failing that, nearest before it) inside the window.
/// Without an annotation the page comes from the last `[PAGE n]` marker
/// before the token.
pub fn context_for(original: &str, placeholder: &PlaceholderRef) -> Option<String> {
    let token_end = placeholder.offset + placeholder.len;
    let lo = floor_char_boundary(original, placeholder.offset.saturating_sub(CONTEXT_WINDOW));
    let hi = ceil_char_boundary(original, token_end + CONTEXT_WINDOW);

    let after = RE_ANNOTATION.captures(&original[token_end..hi]);
    if let Some(caps) =
        after.or_else(|| RE_ANNOTATION.captures_iter(&original[lo..placeholder.offset]).last())
    {
        return Some(format!(
            "The following describes {} on page {}.",
            caps[1].trim(),
            &caps[2]
        ));
    }

    let page = RE_PAGE_MARKER
        .captures_iter(&original[..placeholder.offset])
        .last()?;
    Some(format!("This image appears on page {}.", &page[1]))
}

/// Apply the rewrite rule for `image_number`. `None` when the block is
/// absent or malformed.
pub fn apply_description(script: &str, resolved: &ResolvedDescription) -> Option<String> {
    let (start, end) = block_span(script, resolved.image_number)?;
    let block = description_block(resolved.context.as_deref(), &resolved.description);
    let mut out = String::with_capacity(script.len() + block.len());
    out.push_str(&script[..start]);
    out.push_str(&block);
    out.push_str(&script[end..]);
    Some(out)
}

/// Byte span from the token through its pending notice.
fn block_span(script: &str, image_number: usize) -> Option<(usize, usize)> {
    let token = placeholder_token(image_number);
    let start = script.find(&token)?;
    let rest = &script[start + token.len()..];
    let sentinel = rest.find(PENDING_NOTICE)?;
    if RE_PLACEHOLDER.find(rest).is_some_and(|m| m.start() < sentinel) {
        return None;
    }
    Some((start, start + token.len() + sentinel + PENDING_NOTICE.len()))
}

/// Resolve every placeholder in `script` in place.
///
/// `persist` is called with the updated text after each successful
/// substitution. Failed images are recorded in the returned stats and their
/// placeholders stay in the script for a later run.
pub async fn resolve_placeholders<S, F>(
    script: &mut String,
    images: &BTreeMap<usize, PathBuf>,
    service: &S,
    settings: &ImageAnalysisSettings,
    observer: &dyn ProgressObserver,
    mut persist: F,
) -> Result<ResolveStats, Pdf2AudioError>
where
    S: DescriptionService + ?Sized,
    F: FnMut(&str) -> Result<(), Pdf2AudioError>,
{
    let start = Instant::now();
    let original = script.clone();
    let placeholders = find_placeholders(&original);
    let total = placeholders.len();
    info!("Found {} placeholders", total);
    observer.on_stage_start(Stage::Describe, total);

    let mut stats = ResolveStats {
        placeholders_found: total,
        ..ResolveStats::default()
    };

    for placeholder in &placeholders {
        let n = placeholder.image_number;
        observer.on_unit_start(Stage::Describe, n, total);

        match describe_one(script, &original, placeholder, images, service, settings).await {
            Ok(updated) => {
                *script = updated;
                persist(script)?;
                stats.resolved.push(n);
                observer.on_unit_complete(Stage::Describe, n, total);
            }
            Err(err) => {
                warn!("{}", err);
                observer.on_unit_error(Stage::Describe, n, total, &err.to_string());
                stats.failures.push(err);
            }
        }
    }

    stats.duration_ms = start.elapsed().as_millis() as u64;
    observer.on_stage_complete(Stage::Describe, total, stats.resolved.len());
    info!(
        "Resolved {}/{} placeholders in {}ms",
        stats.resolved.len(),
        total,
        stats.duration_ms
    );
    Ok(stats)
}

/// Describe one image and return the rewritten script.
async fn describe_one<S: DescriptionService + ?Sized>(
    script: &str,
    original: &str,
    placeholder: &PlaceholderRef,
    images: &BTreeMap<usize, PathBuf>,
    service: &S,
    settings: &ImageAnalysisSettings,
) -> Result<String, UnitError> {
    let n = placeholder.image_number;
    let path = images.get(&n).ok_or(UnitError::ImageMissing { image: n })?;

    if block_span(script, n).is_none() {
        return Err(UnitError::ImageResolutionFailed {
            image: n,
            retries: 0,
            detail: "placeholder block has no pending notice".into(),
        });
    }

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| UnitError::ImageResolutionFailed {
            image: n,
            retries: 0,
            detail: format!("cannot read {}: {e}", path.display()),
        })?;
    let mime_type = path
        .extension()
        .and_then(|e| mime_for_extension(&e.to_string_lossy()))
        .or_else(|| image::guess_format(&bytes).ok().map(|f| f.to_mime_type()))
        .unwrap_or("image/png")
        .to_string();

    let context = context_for(original, placeholder);
    let request = DescriptionRequest {
        image_number: n,
        image: bytes,
        mime_type,
        prompt: description_prompt(settings, context.as_deref()),
    };
    let description = describe_with_retry(service, &request, settings).await?;

    let resolved = ResolvedDescription {
        image_number: n,
        context,
        description,
    };
    apply_description(script, &resolved).ok_or(UnitError::ImageResolutionFailed {
        image: n,
        retries: 0,
        detail: "placeholder block disappeared".into(),
    })
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    i = i.min(s.len());
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(s: &str, mut i: usize) -> usize {
    i = i.min(s.len());
    while !s.is_char_boundary(i) {
        i += 1;
    }
    i
}
