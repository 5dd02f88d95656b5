//! Vision description service: one image in, one spoken description out.
//!
//! [`DescriptionService`] is a single attempt against some backend.
//! [`describe_with_retry`] wraps it with the per-call deadline and the retry
//! schedule, so every backend (the LLM provider, a test double) gets the same
//! failure handling.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 529 responses from hosted vision APIs are transient.
//! Exponential backoff (`retry_backoff_ms * 2^attempt`) with 500 ms base and
//! 2 retries waits 500 ms → 1 s before giving up on an image. A timed-out
//! attempt counts as a failed attempt; the image stays unresolved and the
//! next run of the stage retries it.

use crate::config::ImageAnalysisSettings;
use crate::error::{Pdf2AudioError, UnitError};
use crate::prompts::SYSTEM_PROMPT;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Provider name passed to the LLM factory.
pub const PROVIDER_NAME: &str = "anthropic";

/// Everything the service needs to describe one image.
#[derive(Debug, Clone)]
pub struct DescriptionRequest {
    pub image_number: usize,
    pub image: Vec<u8>,
    /// e.g. `image/png`
    pub mime_type: String,
    pub prompt: String,
}

/// A backend that turns an image into prose.
#[allow(async_fn_in_trait)]
pub trait DescriptionService {
    /// One attempt. Retries and deadlines are applied by the caller.
    async fn describe(&self, request: &DescriptionRequest) -> Result<String, String>;
}

/// MIME type for an image file extension; `None` when unrecognised.
pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    image::ImageFormat::from_extension(extension).map(|f| f.to_mime_type())
}

/// Run `service` with a deadline per attempt and exponential backoff between
/// attempts.
pub async fn describe_with_retry<S: DescriptionService + ?Sized>(
    service: &S,
    request: &DescriptionRequest,
    settings: &ImageAnalysisSettings,
) -> Result<String, UnitError> {
    let image = request.image_number;
    let deadline = Duration::from_secs(settings.timeout_secs);
    let start = Instant::now();
    let mut last_err: Option<UnitError> = None;

    for attempt in 0..=settings.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(settings.retry_backoff_ms, attempt);
            warn!(
                "Image {}: retry {}/{} after {}ms",
                image, attempt, settings.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(deadline, service.describe(request)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => {
                debug!("Image {}: described in {:?}", image, start.elapsed());
                return Ok(text.trim().to_string());
            }
            Ok(Ok(_)) => {
                warn!("Image {}: attempt {} returned nothing", image, attempt + 1);
                last_err = Some(UnitError::ImageResolutionFailed {
                    image,
                    retries: settings.max_retries,
                    detail: "empty description".into(),
                });
            }
            Ok(Err(detail)) => {
                warn!("Image {}: attempt {} failed: {}", image, attempt + 1, detail);
                last_err = Some(UnitError::ImageResolutionFailed {
                    image,
                    retries: settings.max_retries,
                    detail,
                });
            }
            Err(_) => {
                warn!(
                    "Image {}: attempt {} timed out after {}s",
                    image,
                    attempt + 1,
                    settings.timeout_secs
                );
                last_err = Some(UnitError::DescriptionTimeout {
                    image,
                    secs: settings.timeout_secs,
                });
            }
        }
    }

    Err(last_err.unwrap_or(UnitError::ImageResolutionFailed {
        image,
        retries: settings.max_retries,
        detail: "Unknown error".into(),
    }))
}

/// Delay before retry `attempt` (1-based): `base`, doubling per attempt,
/// saturating instead of overflowing.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

// ── LLM-backed service ───────────────────────────────────────────────────

/// Description service backed by an `edgequake-llm` vision provider.
pub struct LlmDescriber {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmDescriber {
    pub fn new(provider: Arc<dyn LLMProvider>, settings: &ImageAnalysisSettings) -> Self {
        Self {
            provider,
            options: build_options(settings),
        }
    }

    /// Build the request for `image` and attach the system prompt.
    fn messages(&self, request: &DescriptionRequest) -> Vec<ChatMessage> {
        let image = ImageData::new(STANDARD.encode(&request.image), request.mime_type.clone());
        vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user_with_images(request.prompt.clone(), vec![image]),
        ]
    }
}

impl DescriptionService for LlmDescriber {
    async fn describe(&self, request: &DescriptionRequest) -> Result<String, String> {
        let messages = self.messages(request);
        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| e.to_string())?;
        debug!(
            "Image {}: {} input tokens, {} output tokens",
            request.image_number, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

/// Build `CompletionOptions` from the image-analysis settings.
fn build_options(settings: &ImageAnalysisSettings) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(settings.temperature),
        max_tokens: Some(settings.max_tokens),
        ..Default::default()
    }
}

/// Instantiate the Anthropic provider for `model`.
///
/// The factory reads `ANTHROPIC_API_KEY` from the process environment, so the
/// credential must be resolved (and exported) before this is called.
pub fn anthropic_provider(model: &str) -> Result<Arc<dyn LLMProvider>, Pdf2AudioError> {
    ProviderFactory::create_llm_provider(PROVIDER_NAME, model).map_err(|e| {
        Pdf2AudioError::ProviderNotConfigured {
            provider: PROVIDER_NAME.to_string(),
            hint: format!("{e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Flaky {
        calls: AtomicUsize,
        fail_first: usize,
    }

    impl DescriptionService for Flaky {
        async fn describe(&self, _request: &DescriptionRequest) -> Result<String, String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err("overloaded".into())
            } else {
                Ok("  A labelled diagram of a cell.  ".into())
            }
        }
    }

    struct Stalls;

    impl DescriptionService for Stalls {
        async fn describe(&self, _request: &DescriptionRequest) -> Result<String, String> {
            sleep(Duration::from_secs(3600)).await;
            Ok("too late".into())
        }
    }

    fn request() -> DescriptionRequest {
        DescriptionRequest {
            image_number: 4,
            image: vec![1, 2, 3],
            mime_type: "image/png".into(),
            prompt: "Describe".into(),
        }
    }

    fn fast_settings() -> ImageAnalysisSettings {
        ImageAnalysisSettings {
            retry_backoff_ms: 1,
            timeout_secs: 1,
            ..ImageAnalysisSettings::default()
        }
    }

    #[test]
    fn build_options_follow_settings() {
        let opts = build_options(&ImageAnalysisSettings::default());
        assert_eq!(opts.temperature, Some(0.2));
        assert_eq!(opts.max_tokens, Some(1024));
    }

    #[test]
    fn mime_types() {
        assert_eq!(mime_for_extension("png"), Some("image/png"));
        assert_eq!(mime_for_extension("jpg"), Some("image/jpeg"));
        assert_eq!(mime_for_extension("xyz"), None);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let svc = Flaky {
            calls: AtomicUsize::new(0),
            fail_first: 2,
        };
        let out = describe_with_retry(&svc, &request(), &fast_settings())
            .await
            .unwrap();
        assert_eq!(out, "A labelled diagram of a cell.");
        assert_eq!(svc.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let svc = Flaky {
            calls: AtomicUsize::new(0),
            fail_first: usize::MAX,
        };
        let err = describe_with_retry(&svc, &request(), &fast_settings())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UnitError::ImageResolutionFailed { image: 4, retries: 2, .. }
        ));
        assert_eq!(svc.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        assert_eq!(backoff_ms(500, 1), 500);
        assert_eq!(backoff_ms(500, 3), 2000);
        assert_eq!(backoff_ms(500, 64), u64::MAX);
        assert_eq!(backoff_ms(500, u32::MAX), u64::MAX);
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let settings = ImageAnalysisSettings {
            max_retries: 0,
            ..fast_settings()
        };
        let err = describe_with_retry(&Stalls, &request(), &settings)
            .await
            .unwrap_err();
        assert_eq!(err, UnitError::DescriptionTimeout { image: 4, secs: 1 });
    }
}
