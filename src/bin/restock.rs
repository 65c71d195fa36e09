//! CLI binary for restock-extract.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig` and prints the outbound JSON shapes on stdout.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use restock_extract::pipeline::input;
use restock_extract::{
    extract, inspect, ExtractError, ExtractionConfig, ExtractionOutput, ExtractionProgressCallback,
    ExtractionStage, ProgressCallback,
};
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner on stderr that follows the orchestrator from tier to tier.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading report…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, size_bytes: usize, has_text_layer: bool) {
        let layer = if has_text_layer {
            "text layer found"
        } else {
            "no text layer"
        };
        self.bar.println(format!(
            "{} {}  {}",
            cyan("◆"),
            bold(&format!("{size_bytes} bytes")),
            dim(layer)
        ));
    }

    fn on_stage_start(&self, stage: ExtractionStage) {
        self.bar.set_prefix(format!("{stage} tier"));
        self.bar.set_message("waiting for the model…");
    }

    fn on_stage_complete(&self, stage: ExtractionStage, item_count: usize) {
        let mark = if item_count > 0 { green("✓") } else { dim("·") };
        self.bar
            .println(format!("  {mark} {stage:<6} {item_count} item(s)"));
    }

    fn on_fallback(&self, from: ExtractionStage, reason: &str) {
        self.bar
            .println(format!("  {} {from} tier gave up: {}", cyan("↳"), dim(reason)));
    }

    fn on_extraction_complete(&self, stage: ExtractionStage, item_count: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} items via the {stage} tier",
            green("✔"),
            bold(&item_count.to_string())
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Photo of a printed report
  restock report.jpg

  # Exported PDF, pretty JSON to a file
  restock report.pdf --pretty -o items.json

  # Include tier and token statistics
  restock report.pdf --stats

  # See what the text tier would send (no API key needed)
  restock --inspect-only report.pdf

  # Separate vision model
  restock --model gpt-4o-mini --vision-model gpt-4o scan.pdf

  # Skip pdfium and send the PDF itself to the vision model
  restock --no-rasterize scan.pdf

OUTPUT:
  success  {"items":[{"id":"item-1","supplier":"acme","product":"widget a","quantity":6}]}
  failure  {"error":"file_too_large","message":"..."}   (exit code 1)

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium used to rasterise PDFs for vision
"#;

/// Extract restock items from stock sales reports.
#[derive(Parser, Debug)]
#[command(
    name = "restock",
    version,
    about = "Extract {supplier, product, quantity} restock items from stock sales reports",
    long_about = "Read a stock sales report (exported PDF, scan or phone photo) and print the \
restock items as JSON. PDFs with a text layer go to a text model first; everything else, and \
any text pass that finds nothing, goes to a vision model.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file path or HTTP/HTTPS URL (PDF or image).
    input: String,

    /// Write JSON to this file instead of stdout.
    #[arg(short, long, env = "RESTOCK_OUTPUT")]
    output: Option<PathBuf>,

    /// Declared media type; detected from content when omitted.
    #[arg(long, env = "RESTOCK_MEDIA_TYPE")]
    media_type: Option<String>,

    /// Model for the text tier (and vision, unless --vision-model is set).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Model for the vision tier.
    #[arg(long, env = "RESTOCK_VISION_MODEL")]
    vision_model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Transport retries per completion on transient failures.
    #[arg(long, env = "RESTOCK_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "RESTOCK_API_TIMEOUT", default_value_t = 90)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "RESTOCK_DOWNLOAD_TIMEOUT", default_value_t = 60)]
    download_timeout: u64,

    /// Max LLM output tokens per completion.
    #[arg(long, env = "RESTOCK_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "RESTOCK_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Send PDFs to the vision model as-is instead of rasterising pages.
    #[arg(long, env = "RESTOCK_NO_RASTERIZE")]
    no_rasterize: bool,

    /// Pages rasterised for the vision tier.
    #[arg(long, env = "RESTOCK_MAX_VISION_PAGES", default_value_t = 4)]
    max_vision_pages: usize,

    /// Print `{items, stats}` instead of `{items}`.
    #[arg(long, env = "RESTOCK_STATS")]
    stats: bool,

    /// Pretty-print JSON.
    #[arg(long, env = "RESTOCK_PRETTY")]
    pretty: bool,

    /// Report text layer and blocks only; no provider call.
    #[arg(long)]
    inspect_only: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "RESTOCK_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "RESTOCK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "RESTOCK_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives the feedback that matters; keep library logs quiet
    // while it is showing unless --verbose asks for them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
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

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    let document = match input::resolve_input(
        &cli.input,
        cli.media_type.as_deref(),
        config.max_payload_bytes,
        config.download_timeout_secs,
    )
    .await
    {
        Ok(doc) => doc,
        Err(e) => return fail(&cli, &e),
    };

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        return match inspect(&document, &config).await {
            Ok(report) => {
                emit(&cli, &report)?;
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => fail(&cli, &e),
        };
    }

    // ── Run extraction ───────────────────────────────────────────────────
    match extract(&document, &config).await {
        Ok(output) => {
            if cli.stats {
                emit(&cli, &output)?;
            } else {
                emit(&cli, &output.body())?;
            }
            if !cli.quiet && !show_progress {
                summarise(&output);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => fail(&cli, &e),
    }
}

/// Print the failure shape on stdout and exit non-zero.
fn fail(cli: &Cli, err: &ExtractError) -> Result<ExitCode> {
    if !cli.quiet {
        eprintln!("{} {}", red("✘"), err);
    }
    emit(cli, &err.to_body())?;
    Ok(ExitCode::FAILURE)
}

fn summarise(output: &ExtractionOutput) {
    let s = &output.stats;
    eprintln!(
        "Extracted {} items via the {} tier in {}ms",
        output.items.len(),
        s.stage,
        s.total_duration_ms
    );
    eprintln!(
        "   {} tokens in  /  {} tokens out",
        dim(&s.total_input_tokens.to_string()),
        dim(&s.total_output_tokens.to_string()),
    );
}

/// Serialise `value` to stdout or `--output`.
fn emit<T: Serialize>(cli: &Cli, value: &T) -> Result<()> {
    let mut json = if cli.pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .context("Failed to serialise output")?;
    json.push('\n');

    match cli.output {
        Some(ref path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if !cli.quiet {
                eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string()));
            }
        }
        None => {
            io::stdout()
                .lock()
                .write_all(json.as_bytes())
                .context("Failed to write to stdout")?;
        }
    }
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .rasterize_pdf(!cli.no_rasterize)
        .max_vision_pages(cli.max_vision_pages);

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref model) = cli.vision_model {
        builder = builder.vision_model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
