//! Settings for the three pipeline stages.
//!
//! All tunable behaviour is read from one YAML settings document with four
//! option groups (`api`, `image_analysis`, `text_processing`, `tts`). Every
//! field has a default, so an empty file, or no file at all, yields a working
//! configuration. Keeping every knob in one struct makes it trivial to log the
//! effective settings of a run and diff two runs.
//!
//! ```yaml
//! api:
//!   anthropic_api_key: sk-ant-...
//! image_analysis:
//!   model: claude-sonnet-4-20250514
//!   description_style: very_detailed
//! text_processing:
//!   summarize_sections: [bibliography, references, index]
//! tts:
//!   engine: piper
//!   voice_model: voices/en_US-lessac-medium.onnx
//!   output_format: mp3
//! ```

use crate::error::Pdf2AudioError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable that overrides `api.anthropic_api_key`.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Settings file looked up in the working directory when none is given.
pub const DEFAULT_SETTINGS_FILE: &str = "config.yaml";

/// Upper bound for `image_analysis.max_retries`.
pub const MAX_DESCRIPTION_RETRIES: u32 = 10;

/// The complete settings document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub image_analysis: ImageAnalysisSettings,
    pub text_processing: TextProcessingSettings,
    pub tts: TtsSettings,
}

/// Credentials for the description service.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Anthropic API key. `ANTHROPIC_API_KEY` takes precedence when set.
    pub anthropic_api_key: Option<String>,
}

impl fmt::Debug for ApiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiSettings")
            .field(
                "anthropic_api_key",
                &self.anthropic_api_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// How image descriptions are requested from the vision model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageAnalysisSettings {
    /// Vision model identifier. Default: `claude-sonnet-4-20250514`.
    pub model: String,

    /// Maximum tokens the model may generate per image. Default: 1024.
    ///
    /// A very detailed description of a dense diagram runs to roughly 500
    /// tokens; the default leaves headroom without letting one figure dominate
    /// the narration.
    pub max_tokens: usize,

    /// Length and depth of each description. Default: [`DescriptionStyle::Detailed`].
    pub description_style: DescriptionStyle,

    /// Ask the model to read out axis labels, values and equations. Default: true.
    pub include_technical_details: bool,

    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,

    /// Deadline for one description call in seconds. Default: 120.
    ///
    /// A call that exceeds it counts as a failed attempt; once retries are
    /// exhausted the placeholder stays unresolved for a later run.
    pub timeout_secs: u64,

    /// Retries after a failed description call. Default: 2. At most 10.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled after each attempt. Default: 500.
    pub retry_backoff_ms: u64,
}

impl Default for ImageAnalysisSettings {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 1024,
            description_style: DescriptionStyle::default(),
            include_technical_details: true,
            temperature: 0.2,
            timeout_secs: 120,
            max_retries: 2,
            retry_backoff_ms: 500,
        }
    }
}

/// Script assembly and narration clean-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextProcessingSettings {
    /// Pages whose text contains any of these keywords (case-insensitive) are
    /// summarized instead of narrated.
    pub summarize_sections: Vec<String>,

    /// Parenthetical citations longer than this many characters are dropped
    /// from the narration. 0 disables the rule. Default: 100.
    pub citation_length_threshold: usize,

    /// What to do with pages carrying a table caption. Default: [`TableHandling::Read`].
    pub table_handling: TableHandling,
}

impl Default for TextProcessingSettings {
    fn default() -> Self {
        Self {
            summarize_sections: ["bibliography", "references", "index", "appendix"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            citation_length_threshold: 100,
            table_handling: TableHandling::default(),
        }
    }
}

/// Speech synthesis and audio output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsSettings {
    /// External speech engine. Default: [`SpeechBackend::Piper`].
    pub engine: SpeechBackend,

    /// Explicit path to the engine binary. Default: looked up on `PATH`.
    pub engine_path: Option<PathBuf>,

    /// Piper: path to the `.onnx` voice. espeak-ng: voice name (e.g. `en-us`).
    pub voice_model: String,

    /// Relative speaking rate; 1.0 is the voice's natural pace. Range: 0.25–4.0.
    pub speaking_rate: f32,

    /// Output bitrate tier. Default: [`AudioQuality::High`].
    pub audio_quality: AudioQuality,

    /// Output container/codec. Default: [`AudioFormat::Mp3`].
    pub output_format: AudioFormat,

    /// Granularity of narration units. Default: [`Segmentation::Sentence`].
    pub segmentation: Segmentation,

    /// Deadline for synthesizing one unit in seconds. Default: 120.
    pub timeout_secs: u64,

    /// Transcoder binary. Default: `ffmpeg`.
    pub ffmpeg_path: PathBuf,

    /// Parent of the per-run scratch directory holding unit audio.
    /// Default: the system temporary directory.
    pub work_dir: Option<PathBuf>,
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            engine: SpeechBackend::default(),
            engine_path: None,
            voice_model: "en_US-lessac-medium.onnx".to_string(),
            speaking_rate: 1.0,
            audio_quality: AudioQuality::default(),
            output_format: AudioFormat::default(),
            segmentation: Segmentation::default(),
            timeout_secs: 120,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            work_dir: None,
        }
    }
}

impl Settings {
    /// Parse settings from a YAML string. An empty document yields defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
    }

    /// Load and validate settings from `path`.
    pub fn load(path: &Path) -> Result<Self, Pdf2AudioError> {
        let raw = std::fs::read_to_string(path).map_err(|e| Pdf2AudioError::ConfigRead {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let settings = Self::from_yaml_str(&raw).map_err(|e| Pdf2AudioError::ConfigRead {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        settings.validate()?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Load `path` if given, else `./config.yaml` if present, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, Pdf2AudioError> {
        if let Some(p) = path {
            return Self::load(p);
        }
        let fallback = Path::new(DEFAULT_SETTINGS_FILE);
        if fallback.exists() {
            return Self::load(fallback);
        }
        debug!("No settings file; using defaults");
        Ok(Self::default())
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), Pdf2AudioError> {
        let ia = &self.image_analysis;
        if ia.model.trim().is_empty() {
            return Err(Pdf2AudioError::InvalidConfig(
                "image_analysis.model must not be empty".into(),
            ));
        }
        if ia.max_tokens == 0 {
            return Err(Pdf2AudioError::InvalidConfig(
                "image_analysis.max_tokens must be ≥ 1".into(),
            ));
        }
        if ia.max_retries > MAX_DESCRIPTION_RETRIES {
            return Err(Pdf2AudioError::InvalidConfig(format!(
                "image_analysis.max_retries must be ≤ {MAX_DESCRIPTION_RETRIES}, got {}",
                ia.max_retries
            )));
        }
        if ia.timeout_secs == 0 || self.tts.timeout_secs == 0 {
            return Err(Pdf2AudioError::InvalidConfig(
                "timeout_secs must be ≥ 1".into(),
            ));
        }
        let rate = self.tts.speaking_rate;
        if !(0.25..=4.0).contains(&rate) {
            return Err(Pdf2AudioError::InvalidConfig(format!(
                "tts.speaking_rate must be 0.25–4.0, got {rate}"
            )));
        }
        if self.tts.voice_model.trim().is_empty() {
            return Err(Pdf2AudioError::InvalidConfig(
                "tts.voice_model must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the description-service credential from the process environment
    /// and this settings document.
    pub fn credential(&self) -> Result<Credential, Pdf2AudioError> {
        resolve_credential(&self.api, std::env::var(API_KEY_ENV).ok())
    }

    /// Resolve the credential and, when it came from the settings file, make
    /// it visible to the LLM provider factory through `ANTHROPIC_API_KEY`.
    ///
    /// Mutates the process environment: call it from `main` before any
    /// other thread (including an async runtime) is started.
    pub fn export_credential(&self) -> Result<Credential, Pdf2AudioError> {
        let credential = self.credential()?;
        if credential.source() == CredentialSource::SettingsFile {
            std::env::set_var(API_KEY_ENV, credential.key());
            debug!("Exported settings-file credential to {}", API_KEY_ENV);
        }
        Ok(credential)
    }
}

// ── Credentials ──────────────────────────────────────────────────────────

/// Where a credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Environment,
    SettingsFile,
}

/// A resolved API key. `Debug` never prints the key.
#[derive(Clone)]
pub struct Credential {
    key: String,
    source: CredentialSource,
}

impl Credential {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("key", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Pick the credential: a non-empty environment value wins, then the
/// settings file. Template values such as `your-api-key-here` count as absent.
pub fn resolve_credential(
    api: &ApiSettings,
    env_value: Option<String>,
) -> Result<Credential, Pdf2AudioError> {
    if let Some(key) = env_value.filter(|k| is_usable_key(k)) {
        return Ok(Credential {
            key: key.trim().to_string(),
            source: CredentialSource::Environment,
        });
    }
    if let Some(key) = api.anthropic_api_key.as_deref().filter(|k| is_usable_key(k)) {
        return Ok(Credential {
            key: key.trim().to_string(),
            source: CredentialSource::SettingsFile,
        });
    }
    Err(Pdf2AudioError::MissingCredential {
        hint: format!(
            "Set {API_KEY_ENV} or api.anthropic_api_key in the settings file."
        ),
    })
}

fn is_usable_key(key: &str) -> bool {
    let k = key.trim().to_ascii_lowercase();
    !(k.is_empty() || k.starts_with("your") || k.contains("api-key-here") || k.starts_with('<'))
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Depth of the generated image descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptionStyle {
    /// One or two sentences.
    Concise,
    /// A short paragraph. (default)
    #[default]
    Detailed,
    /// Everything a listener needs to picture the figure.
    VeryDetailed,
}

/// Treatment of pages that carry a table caption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableHandling {
    /// Narrate the extracted text as-is. (default)
    #[default]
    Read,
    /// Announce the table before the page's prose.
    Announce,
}

/// External speech engine invoked once per narration unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpeechBackend {
    /// [Piper](https://github.com/rhasspy/piper) neural TTS. (default)
    #[default]
    #[serde(rename = "piper")]
    Piper,
    /// eSpeak NG formant synthesizer.
    #[serde(rename = "espeak-ng", alias = "espeak_ng", alias = "espeak")]
    EspeakNg,
}

impl SpeechBackend {
    /// Binary name looked up on `PATH`.
    pub fn default_binary(self) -> &'static str {
        match self {
            SpeechBackend::Piper => "piper",
            SpeechBackend::EspeakNg => "espeak-ng",
        }
    }
}

/// Output bitrate tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioQuality {
    Low,
    Medium,
    /// (default)
    #[default]
    High,
}

impl AudioQuality {
    /// Bitrate argument for lossy codecs.
    pub fn bitrate(self) -> &'static str {
        match self {
            AudioQuality::Low => "64k",
            AudioQuality::Medium => "128k",
            AudioQuality::High => "192k",
        }
    }
}

/// Output container and codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    /// MP3 via libmp3lame. (default)
    #[default]
    Mp3,
    /// Ogg Vorbis.
    Ogg,
    /// Lossless FLAC; bitrate is ignored.
    Flac,
    /// 16-bit PCM WAV; bitrate is ignored.
    Wav,
}

impl AudioFormat {
    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "wav",
        }
    }
}

/// Granularity of narration units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segmentation {
    /// One unit per sentence: fine-grained progress and failure isolation. (default)
    #[default]
    Sentence,
    /// One unit per paragraph: fewer engine invocations.
    Paragraph,
}

/// Which part of the document a script covers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChapterSelector {
    /// The whole document (default).
    #[default]
    All,
    /// A chapter by number (1-indexed), found via the outline or a text scan.
    Chapter(usize),
    /// An explicit page range (1-indexed, inclusive).
    Range { start: usize, end: usize },
}

impl ChapterSelector {
    /// Parse a `"start-end"` page-range token.
    ///
    /// Bounds against the document are checked later by
    /// [`crate::pipeline::chapters::resolve_range`].
    pub fn parse_range(input: &str) -> Result<Self, Pdf2AudioError> {
        let invalid = |reason: &str| Pdf2AudioError::InvalidRange {
            input: input.to_string(),
            reason: reason.to_string(),
        };
        let (start, end) = input
            .trim()
            .split_once('-')
            .ok_or_else(|| invalid("expected START-END"))?;
        let start: usize = start
            .trim()
            .parse()
            .map_err(|_| invalid("start page is not a number"))?;
        let end: usize = end
            .trim()
            .parse()
            .map_err(|_| invalid("end page is not a number"))?;
        if start > end {
            return Err(invalid("start is after end"));
        }
        Ok(ChapterSelector::Range { start, end })
    }
}

impl fmt::Display for ChapterSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChapterSelector::All => write!(f, "all pages"),
            ChapterSelector::Chapter(n) => write!(f, "chapter {n}"),
            ChapterSelector::Range { start, end } => write!(f, "pages {start}-{end}"),
        }
    }
}
