//! CLI binary for edgequake-paperfig.
//!
//! A thin shim over the library crate that maps CLI flags and the
//! credentials file to `ExtractionConfig` / `AnalysisConfig` and prints
//! results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use edgequake_paperfig::config::{MINERU_API_KEY, VISION_API_KEY};
use edgequake_paperfig::{
    analyze_paper_dir, parse_paper, AnalysisConfig, AnalysisProgressCallback, Credentials,
    ExtractionConfig, PaperFigError, ProgressCallback, VisionModel,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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

fn spinner(prefix: &str, message: &str) -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS),
    );
    bar.set_prefix(prefix.to_string());
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per figure.
struct CliProgressCallback {
    bar: ProgressBar,
    image_started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bar: spinner("Preparing", "Resolving figures…"),
            image_started: Mutex::new(None),
        })
    }

    fn elapsed(&self) -> String {
        let secs = self
            .image_started
            .lock()
            .unwrap()
            .take()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        dim(&format!("{secs:.1}s"))
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_images: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} figures  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_images as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Analysing");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Analysing {total_images} figures…"))
        ));
    }

    fn on_image_start(&self, _index: usize, _total: usize, name: &str) {
        *self.image_started.lock().unwrap() = Some(Instant::now());
        self.bar.set_message(name.to_string());
    }

    fn on_image_analyzed(&self, index: usize, total: usize, name: &str, analysis_len: usize) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {:<40} {:<12} {}",
            green("✓"),
            index,
            total,
            name,
            dim(&format!("{analysis_len:>6} chars")),
            self.elapsed(),
        ));
        self.bar.inc(1);
    }

    fn on_image_skipped(&self, index: usize, total: usize, name: &str) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {:<40} {}",
            dim("–"),
            index,
            total,
            name,
            dim("no reference in text"),
        ));
        let _ = self.elapsed();
        self.bar.inc(1);
    }

    fn on_image_failed(&self, index: usize, total: usize, name: &str, error: &str) {
        // Keep the log tidy; the full message is in the manifest.
        let msg = match error.char_indices().nth(80) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error.to_string(),
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {:<40} {}  {}",
            red("✗"),
            index,
            total,
            name,
            red(&msg),
            self.elapsed(),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, analyzed: usize, skipped: usize, failed: usize) {
        self.bar.finish_and_clear();
        let mark = if failed == 0 { green("✔") } else { cyan("⚠") };
        eprintln!(
            "{} {} analysed, {} skipped, {} failed",
            mark,
            bold(&analyzed.to_string()),
            skipped,
            if failed == 0 {
                failed.to_string()
            } else {
                red(&failed.to_string())
            },
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Parse a paper; backup lands in backup/<paper_id>/
  paperfig parse https://arxiv.org/pdf/2602.12852v1

  # Parse and also copy paper.md + images/ into ./papers/attention
  paperfig parse https://arxiv.org/pdf/1706.03762 papers/attention

  # Analyse every referenced figure with the default model (qwen)
  paperfig analyze --paper-dir papers/attention --output analysis/attention.json

  # Use kimi and a wider context window
  paperfig analyze --paper-dir papers/attention --output out.json --model kimi --context-lines 20

MODELS:
  Name            Upstream id               Sampling
  ─────────────   ────────────────────────  ─────────────────────────────────
  qwen (default)  qwen/qwen3.5-397b-a17b    T 0.6, top_p 0.95, top_k 20
  kimi            moonshotai/kimi-k2.5      T 0.3, top_p 1.0

CREDENTIALS (.env file, environment, or flags):
  MINERU_API_KEY   extraction service token (required for `parse`)
  NVIDIA_API_KEY   vision service token (without it every figure is recorded as failed)
"#;

/// Parse scientific papers and analyse their figures with a Vision LLM.
#[derive(Parser, Debug)]
#[command(
    name = "paperfig",
    version,
    about = "Parse scientific papers and analyse their figures with a Vision LLM",
    long_about = "Submit a paper PDF to the MinerU extraction service, archive the resulting \
Markdown and images under a content-addressed backup directory, then send every referenced \
figure together with its surrounding text to a Vision Language Model.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Credentials file in KEY=value format.
    #[arg(long, global = true, env = "PAPERFIG_ENV_FILE", default_value = ".env")]
    env_file: PathBuf,

    /// MinerU API key (overrides the credentials file).
    #[arg(long, global = true, env = "MINERU_API_KEY", hide_env_values = true)]
    mineru_api_key: Option<String>,

    /// Vision API key (overrides the credentials file).
    #[arg(long, global = true, env = "NVIDIA_API_KEY", hide_env_values = true)]
    vision_api_key: Option<String>,

    /// Disable progress output.
    #[arg(long, global = true, env = "PAPERFIG_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PAPERFIG_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PAPERFIG_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a paper and print the backup record as JSON.
    Parse {
        /// Publicly reachable URL of the PDF.
        url: String,

        /// Also copy paper.md and images/ into this directory.
        output_dir: Option<PathBuf>,

        /// Root of the content-addressed backup store.
        #[arg(long, env = "PAPERFIG_BACKUP_ROOT", default_value = "backup")]
        backup_root: PathBuf,

        /// Seconds between task status queries.
        #[arg(long, env = "PAPERFIG_POLL_INTERVAL", default_value_t = 30)]
        poll_interval: u64,

        /// Give up after this many status queries (default: never).
        #[arg(long, env = "PAPERFIG_MAX_POLLS")]
        max_polls: Option<u32>,

        /// Give up after this many seconds of polling (default: never).
        #[arg(long, env = "PAPERFIG_POLL_TIMEOUT")]
        poll_timeout: Option<u64>,

        /// Extraction service base URL.
        #[arg(long, env = "PAPERFIG_MINERU_BASE_URL")]
        api_base_url: Option<String>,
    },

    /// Analyse every referenced figure of a parsed paper directory.
    Analyze {
        /// Directory containing paper.md (or another .md) and images/.
        #[arg(long)]
        paper_dir: PathBuf,

        /// Manifest JSON file, rewritten after every figure.
        #[arg(long)]
        output: PathBuf,

        /// Vision model profile.
        #[arg(long, value_enum, default_value = "qwen")]
        model: ModelArg,

        /// Lines of context before and after each figure reference.
        #[arg(long, default_value_t = 10)]
        context_lines: usize,

        /// Per-figure model call timeout in seconds.
        #[arg(long, env = "PAPERFIG_API_TIMEOUT", default_value_t = 600)]
        api_timeout: u64,

        /// Max output tokens per figure (includes the reasoning trace).
        #[arg(long, env = "PAPERFIG_MAX_TOKENS", default_value_t = 16384)]
        max_tokens: usize,
    },
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum ModelArg {
    Kimi,
    Qwen,
}

impl From<ModelArg> for VisionModel {
    fn from(v: ModelArg) -> Self {
        match v {
            ModelArg::Kimi => VisionModel::Kimi,
            ModelArg::Qwen => VisionModel::Qwen,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress;
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

    let credentials = Credentials::from_env_file(&cli.env_file)
        .context("Failed to load credentials")?
        .with_overrides(cli.mineru_api_key.clone(), cli.vision_api_key.clone());

    match cli.command {
        Command::Parse {
            ref url,
            ref output_dir,
            ref backup_root,
            poll_interval,
            max_polls,
            poll_timeout,
            ref api_base_url,
        } => {
            let api_key = credentials.mineru_api_key.clone().ok_or_else(|| {
                PaperFigError::MissingCredential {
                    key: MINERU_API_KEY.to_string(),
                    hint: cli.env_file.display().to_string(),
                }
            })?;

            let mut builder = ExtractionConfig::builder()
                .api_key(api_key)
                .backup_root(backup_root.clone())
                .poll_interval_secs(poll_interval);
            if let Some(n) = max_polls {
                builder = builder.max_poll_attempts(n);
            }
            if let Some(secs) = poll_timeout {
                builder = builder.poll_deadline(Duration::from_secs(secs));
            }
            if let Some(base) = api_base_url {
                builder = builder.api_base_url(base.clone());
            }
            let config = builder.build().context("Invalid configuration")?;

            let bar = show_progress.then(|| spinner("Parsing", url));
            let result = parse_paper(url, &config, output_dir.as_deref()).await;
            if let Some(bar) = bar {
                bar.finish_and_clear();
            }
            let record = result.context("Extraction failed")?;

            println!(
                "{}",
                serde_json::to_string_pretty(&record).context("Failed to serialise output")?
            );
            if !cli.quiet {
                eprintln!(
                    "{}  paper {}  {} images  →  {}",
                    green("✔"),
                    record.paper_id,
                    record.image_files.len(),
                    bold(&record.backup_dir.display().to_string()),
                );
            }
        }

        Command::Analyze {
            ref paper_dir,
            ref output,
            ref model,
            context_lines,
            api_timeout,
            max_tokens,
        } => {
            if credentials.vision_api_key.is_none() && !cli.quiet {
                eprintln!(
                    "{} {} not configured: every figure will be recorded as failed",
                    cyan("⚠"),
                    VISION_API_KEY
                );
            }

            let progress_cb: Option<ProgressCallback> = if show_progress {
                Some(CliProgressCallback::new() as Arc<dyn AnalysisProgressCallback>)
            } else {
                None
            };

            let mut builder = AnalysisConfig::builder()
                .model(model.clone().into())
                .api_key(credentials.vision_api_key.clone())
                .context_lines(context_lines)
                .api_timeout_secs(api_timeout)
                .max_tokens(max_tokens);
            if let Some(cb) = progress_cb {
                builder = builder.progress_callback(cb);
            }
            let config = builder.build().context("Invalid configuration")?;

            let manifest = analyze_paper_dir(paper_dir, output, config)
                .await
                .with_context(|| format!("Analysis of {} failed", paper_dir.display()))?;

            if !cli.quiet {
                print_manifest_summary(
                    output,
                    manifest.analyzed_images,
                    manifest.skipped_images,
                    manifest.failed_images,
                    show_progress,
                );
            }
        }
    }

    Ok(())
}

fn print_manifest_summary(
    path: &Path,
    analyzed: usize,
    skipped: usize,
    failed: usize,
    progress_shown: bool,
) {
    // The progress callback already printed the counters.
    if !progress_shown {
        eprintln!(
            "Analysed {analyzed} figures ({skipped} skipped, {failed} failed)"
        );
    }
    eprintln!("   manifest  →  {}", bold(&path.display().to_string()));
}
