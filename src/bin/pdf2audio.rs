//! CLI binary for pdf2audio.
//!
//! A thin shim over the library crate: one subcommand per pipeline stage,
//! each mapping its flags onto [`Settings`] and printing a summary.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdf2audio::{
    build_script, describe_script, inspect, narrate_script, AudioFormat, ChapterSelector,
    ProgressObserver, ScriptRequest, Segmentation, Settings, SharedObserver, SpeechBackend, Stage,
};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress observer using indicatif ────────────────────────────────────

/// Terminal progress: a bar for the stage plus one log line per failed unit.
struct CliProgress {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    fn unit_name(stage: Stage) -> &'static str {
        match stage {
            Stage::Describe => "images",
            Stage::Synthesize => "units",
        }
    }
}

impl ProgressObserver for CliProgress {
    fn on_stage_start(&self, stage: Stage, total: usize) {
        let style = ProgressStyle::with_template(&format!(
            "{{spinner:.cyan}} {{prefix:.bold}}  [{{bar:42.green/238}}] {{pos:>3}}/{{len}} {}  \
             ⏱ {{elapsed_precise}}  ETA {{eta_precise}}",
            Self::unit_name(stage)
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix(match stage {
            Stage::Describe => "Describing",
            Stage::Synthesize => "Narrating",
        });
        self.bar.reset_eta();
    }

    fn on_unit_start(&self, stage: Stage, index: usize, _total: usize) {
        let what = match stage {
            Stage::Describe => "image",
            Stage::Synthesize => "unit",
        };
        self.bar.set_message(format!("{what} {index}"));
    }

    fn on_unit_complete(&self, _stage: Stage, _index: usize, _total: usize) {
        self.bar.inc(1);
    }

    fn on_unit_error(&self, _stage: Stage, _index: usize, _total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 100 {
            let mut short: String = error.chars().take(99).collect();
            short.push('\u{2026}');
            short
        } else {
            error.to_string()
        };
        self.bar.println(format!("  {} {}", red("✗"), red(&msg)));
        self.bar.inc(1);
    }

    fn on_stage_complete(&self, stage: Stage, total: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total.saturating_sub(success_count);
        let mark = if failed == 0 {
            green("✔")
        } else if success_count == 0 {
            red("✘")
        } else {
            cyan("⚠")
        };
        eprintln!(
            "{mark} {}/{} {} done ({} failed)",
            bold(&success_count.to_string()),
            total,
            Self::unit_name(stage),
            failed
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # List the chapters the outline or a heading scan can find
  pdf2audio script biology.pdf --list-chapters

  # Build the script for chapter 3 (writes biology_chapter3.txt + biology_chapter3_images/)
  pdf2audio script biology.pdf --chapter 3

  # Or an explicit page range
  pdf2audio script biology.pdf --pages 40-58 -o cells.txt

  # Describe every figure with the vision model (resumable)
  pdf2audio describe biology_chapter3.txt

  # Narrate the script
  pdf2audio synthesize biology_chapter3.txt -o chapter3.mp3

SETTINGS:
  Every option lives in a YAML settings file (default: ./config.yaml).
  Flags below override the matching setting for one run.

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY   API key for the describe stage (overrides api.anthropic_api_key)
  PDFIUM_LIB_PATH     Path to a libpdfium shared library
  RUST_LOG            tracing filter, e.g. pdf2audio=debug

EXTERNAL PROGRAMS:
  script      libpdfium
  describe    network access to the vision model
  synthesize  piper or espeak-ng, and ffmpeg
"#;

/// Turn PDF textbook chapters into narrated audio.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2audio",
    version,
    about = "Turn PDF textbook chapters into narrated audio",
    long_about = "Three independent stages: `script` extracts a chapter into an editable \
narration script with image placeholders, `describe` replaces each placeholder with a \
description written by a vision model, and `synthesize` narrates the script with a local \
speech engine and ffmpeg.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Settings file (YAML). Default: ./config.yaml when present.
    #[arg(long, global = true, env = "PDF2AUDIO_CONFIG")]
    config: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2AUDIO_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF2AUDIO_QUIET")]
    quiet: bool,

    /// Print the stage result as JSON on stdout.
    #[arg(long, global = true, env = "PDF2AUDIO_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "PDF2AUDIO_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract a chapter or page range into a narration script.
    Script(ScriptArgs),
    /// Replace image placeholders in a script with vision-model descriptions.
    Describe(DescribeArgs),
    /// Narrate a script into a single audio file.
    Synthesize(SynthesizeArgs),
}

#[derive(Args, Debug)]
struct ScriptArgs {
    /// PDF file.
    pdf: PathBuf,

    /// Chapter number (1-indexed).
    #[arg(long, conflicts_with_all = ["pages", "all"])]
    chapter: Option<usize>,

    /// Page range START-END (1-indexed, inclusive).
    #[arg(long, conflicts_with = "all")]
    pages: Option<String>,

    /// The whole document (default when no selection is given).
    #[arg(long)]
    all: bool,

    /// Script path. Default: <pdf-stem>_<selection>.txt
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Image directory. Default: <script-stem>_images next to the script.
    #[arg(long)]
    images_dir: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2AUDIO_PASSWORD")]
    password: Option<String>,

    /// Print the page count and detected chapters, then exit.
    #[arg(long)]
    list_chapters: bool,
}

#[derive(Args, Debug)]
struct DescribeArgs {
    /// Script produced by `script`.
    script: PathBuf,

    /// Image directory. Default: <script-stem>_images next to the script.
    #[arg(long)]
    images_dir: Option<PathBuf>,

    /// Vision model ID (overrides image_analysis.model).
    #[arg(long)]
    model: Option<String>,
}

#[derive(Args, Debug)]
struct SynthesizeArgs {
    /// Script to narrate.
    script: PathBuf,

    /// Audio path. Default: the script path with the output format's extension.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Speech engine (overrides tts.engine).
    #[arg(long, value_enum)]
    engine: Option<EngineArg>,

    /// Voice model or voice name (overrides tts.voice_model).
    #[arg(long)]
    voice: Option<String>,

    /// Speaking rate, 0.25–4.0 (overrides tts.speaking_rate).
    #[arg(long)]
    rate: Option<f32>,

    /// Output format (overrides tts.output_format).
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Narration unit granularity (overrides tts.segmentation).
    #[arg(long, value_enum)]
    segmentation: Option<SegmentationArg>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum EngineArg {
    Piper,
    EspeakNg,
}

impl From<EngineArg> for SpeechBackend {
    fn from(v: EngineArg) -> Self {
        match v {
            EngineArg::Piper => SpeechBackend::Piper,
            EngineArg::EspeakNg => SpeechBackend::EspeakNg,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Mp3,
    Ogg,
    Flac,
    Wav,
}

impl From<FormatArg> for AudioFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Mp3 => AudioFormat::Mp3,
            FormatArg::Ogg => AudioFormat::Ogg,
            FormatArg::Flac => AudioFormat::Flac,
            FormatArg::Wav => AudioFormat::Wav,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum SegmentationArg {
    Sentence,
    Paragraph,
}

impl From<SegmentationArg> for Segmentation {
    fn from(v: SegmentationArg) -> Self {
        match v {
            SegmentationArg::Sentence => Segmentation::Sentence,
            SegmentationArg::Paragraph => Segmentation::Paragraph,
        }
    }
}

fn main() -> Result<()> {
    let Cli { global, command } = Cli::parse();
    let g = &global;

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar is the feedback while it is shown; library INFO logs
    // would tear through it.
    let show_progress = !g.quiet && !g.no_progress && !g.json;
    let filter = if g.verbose {
        "debug"
    } else if g.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let mut settings =
        Settings::load_or_default(g.config.as_deref()).context("Failed to load settings")?;

    // The provider factory reads the key from the environment. Exporting it
    // mutates process state, so it happens before the runtime starts threads.
    if let Command::Describe(args) = &command {
        if let Some(model) = &args.model {
            settings.image_analysis.model = model.clone();
        }
        if describe_needs_credential(&args.script) {
            settings
                .export_credential()
                .context("No credential for the describe stage")?;
        }
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let observer: Option<SharedObserver> = if show_progress {
        Some(CliProgress::new() as SharedObserver)
    } else {
        None
    };

    runtime.block_on(async {
        match command {
            Command::Script(args) => run_script(args, &settings, g).await,
            Command::Describe(args) => run_describe(args, &settings, g, observer).await,
            Command::Synthesize(args) => run_synthesize(args, settings, g, observer).await,
        }
    })
}

/// Only a script that still has placeholders needs a key. Unreadable
/// scripts are reported by the stage itself.
fn describe_needs_credential(script: &Path) -> bool {
    std::fs::read_to_string(script)
        .map(|text| !pdf2audio::pipeline::resolve::find_placeholders(&text).is_empty())
        .unwrap_or(false)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialise output")?
    );
    Ok(())
}

fn selector_of(args: &ScriptArgs) -> Result<ChapterSelector> {
    if args.all {
        return Ok(ChapterSelector::All);
    }
    if let Some(n) = args.chapter {
        return Ok(ChapterSelector::Chapter(n));
    }
    if let Some(pages) = &args.pages {
        return ChapterSelector::parse_range(pages).context("Invalid --pages");
    }
    Ok(ChapterSelector::All)
}

/// `<pdf-stem>_chapter3.txt`, `<pdf-stem>_pages40-58.txt` or `<pdf-stem>.txt`.
fn default_script_path(pdf: &Path, selector: &ChapterSelector) -> PathBuf {
    let stem = pdf
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "script".to_string());
    let name = match selector {
        ChapterSelector::All => format!("{stem}.txt"),
        ChapterSelector::Chapter(n) => format!("{stem}_chapter{n}.txt"),
        ChapterSelector::Range { start, end } => format!("{stem}_pages{start}-{end}.txt"),
    };
    pdf.with_file_name(name)
}

async fn run_script(args: ScriptArgs, settings: &Settings, g: &GlobalArgs) -> Result<()> {
    if args.list_chapters {
        let summary = inspect(&args.pdf, args.password.as_deref())
            .await
            .context("Failed to inspect PDF")?;
        if g.json {
            return print_json(&summary);
        }
        println!("File:      {}", args.pdf.display());
        println!("Pages:     {}", summary.page_count);
        if summary.chapters.is_empty() {
            println!("Chapters:  none detected (use --pages START-END)");
        }
        for ch in &summary.chapters {
            println!(
                "  {:>3}  {:<48} {}",
                ch.number,
                ch.title,
                dim(&format!("pages {}-{}", ch.start_page, ch.end_page))
            );
        }
        return Ok(());
    }

    let selector = selector_of(&args)?;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_script_path(&args.pdf, &selector));
    let request = ScriptRequest {
        pdf: args.pdf,
        selector,
        output,
        images_dir: args.images_dir,
        password: args.password,
    };

    let spinner = (!g.quiet && !g.no_progress && !g.json).then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Extracting");
        bar.set_message(request.selector.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    });
    let result = build_script(&request, &settings.text_processing).await;
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }
    let stats = result.context("Script stage failed")?;

    if g.json {
        return print_json(&stats);
    }
    if !g.quiet {
        eprintln!(
            "{}  pages {}-{} of {}  {} images ({} labelled)  {}ms  →  {}",
            green("✔"),
            stats.first_page,
            stats.last_page,
            stats.document_pages,
            stats.images,
            stats.labelled_images,
            stats.duration_ms,
            bold(&stats.script_path.display().to_string()),
        );
        if !stats.summarized_pages.is_empty() {
            eprintln!(
                "   {}",
                dim(&format!("summarized pages: {:?}", stats.summarized_pages))
            );
        }
        if stats.images > 0 {
            eprintln!(
                "   {} {}",
                dim("next:"),
                cyan(&format!("pdf2audio describe {}", stats.script_path.display()))
            );
        }
    }
    Ok(())
}

async fn run_describe(
    args: DescribeArgs,
    settings: &Settings,
    g: &GlobalArgs,
    observer: Option<SharedObserver>,
) -> Result<()> {
    let stats = describe_script(
        &args.script,
        args.images_dir.as_deref(),
        settings,
        observer.as_ref(),
    )
    .await
    .context("Describe stage failed")?;

    if g.json {
        return print_json(&stats);
    }
    if !g.quiet {
        let mark = if stats.remaining() == 0 {
            green("✔")
        } else {
            cyan("⚠")
        };
        eprintln!(
            "{mark}  {} resolved, {} remaining  {}ms  →  {}",
            stats.resolved.len(),
            stats.remaining(),
            stats.duration_ms,
            bold(&args.script.display().to_string()),
        );
        for failure in &stats.failures {
            eprintln!("   {} {}", red("✗"), failure);
        }
        if stats.remaining() > 0 {
            eprintln!("   {}", dim("Run describe again to retry the remaining images."));
        }
    }
    Ok(())
}

async fn run_synthesize(
    args: SynthesizeArgs,
    mut settings: Settings,
    g: &GlobalArgs,
    observer: Option<SharedObserver>,
) -> Result<()> {
    let tts = &mut settings.tts;
    if let Some(engine) = args.engine {
        tts.engine = engine.into();
    }
    if let Some(voice) = args.voice {
        tts.voice_model = voice;
    }
    if let Some(rate) = args.rate {
        tts.speaking_rate = rate;
    }
    if let Some(format) = args.format {
        tts.output_format = format.into();
    }
    if let Some(seg) = args.segmentation {
        tts.segmentation = seg.into();
    }
    settings.validate().context("Invalid settings")?;

    let output = args
        .output
        .unwrap_or_else(|| args.script.with_extension(settings.tts.output_format.extension()));
    let stats = narrate_script(&args.script, &output, &settings, observer.as_ref())
        .await
        .context("Synthesize stage failed")?;

    if g.json {
        return print_json(&stats);
    }
    if !g.quiet {
        eprintln!(
            "{}  {}/{} units  {} chars  {}ms  →  {}",
            if stats.failures.is_empty() {
                green("✔")
            } else {
                cyan("⚠")
            },
            stats.synthesized,
            stats.units,
            stats.narrated_chars,
            stats.duration_ms,
            bold(&stats.output_path.display().to_string()),
        );
        for failure in &stats.failures {
            eprintln!("   {} {}", red("✗"), failure);
        }
    }
    Ok(())
}
