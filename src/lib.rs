//! # edgequake-paperfig
//!
//! Parse scientific papers with a remote extraction service and analyse
//! every figure with a Vision Language Model (VLM), using the text around
//! each figure's reference as context.
//!
//! ## Why this crate?
//!
//! A figure on its own is hard to interpret: the axes are abbreviated, the
//! legend names methods defined three pages earlier, and the claim it is
//! meant to support lives in the prose. This crate keeps the two together.
//! It archives the paper's Markdown and images, finds where the text talks
//! about each image, and sends the image with that passage to a VLM.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF URL
//!  │
//!  ├─ 1. Submit   extraction task on the remote parser (MinerU API)
//!  ├─ 2. Poll     fixed interval until done / failed / configured limit
//!  ├─ 3. Archive  stream bundle → unpack → backup/<paper_id>/{paper.md,images/}
//!  ├─ 4. Order    images in the order the Markdown references them
//!  ├─ 5. Locate   first reference + surrounding lines for each image
//!  ├─ 6. Analyse  one VLM call per image (kimi / qwen profiles)
//!  └─ 7. Manifest JSON checkpoint after every image
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_paperfig::{analyze_paper_dir, parse_paper, AnalysisConfig, ExtractionConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let extraction = ExtractionConfig::builder()
//!         .api_key(std::env::var("MINERU_API_KEY")?)
//!         .build()?;
//!     let record = parse_paper("https://arxiv.org/pdf/2602.12852v1", &extraction, None).await?;
//!
//!     let analysis = AnalysisConfig::builder()
//!         .api_key(std::env::var("NVIDIA_API_KEY").ok())
//!         .build()?;
//!     let manifest = analyze_paper_dir(
//!         &record.backup_dir,
//!         Path::new("analysis/figures.json"),
//!         analysis,
//!     )
//!     .await?;
//!     eprintln!(
//!         "{} analysed, {} skipped, {} failed",
//!         manifest.analyzed_images, manifest.skipped_images, manifest.failed_images
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `paperfig` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-paperfig = { version = "0.1", default-features = false }
//! ```
//!
//! ## Choosing a Model
//!
//! | Model | Upstream id | Sampling |
//! |-------|-------------|----------|
//! | `qwen` (default) | `qwen/qwen3.5-397b-a17b` | T 0.6, top_p 0.95, top_k 20, thinking on |
//! | `kimi` | `moonshotai/kimi-k2.5` | T 0.3, top_p 1.0, thinking on |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod paper_id;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{analyze_paper_dir, BatchAnalysisRunner, PaperDir};
pub use config::{
    AnalysisConfig, AnalysisConfigBuilder, Credentials, ExtractionConfig,
    ExtractionConfigBuilder, SamplingProfile, VisionModel,
};
pub use error::{PaperFigError, VisionError};
pub use extract::parse_paper;
pub use output::{
    AnalysisOutcome, AnalysisResult, BackupRecord, JobStatus, Manifest, MirrorCopy, Progress,
};
pub use paper_id::PaperId;
pub use pipeline::locate::{ContextWindow, ReferenceLocator, SubstringLocator};
pub use pipeline::order::resolve_image_order;
pub use pipeline::task::{RemoteTaskClient, TaskResult};
pub use pipeline::vision::{ChatCompletionsVisionClient, VisionClient, VisionRequest};
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback};
