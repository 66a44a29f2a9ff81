//! Output types: the backup record produced by extraction and the
//! checkpointed manifest produced by figure analysis.

use crate::config::VisionModel;
use crate::paper_id::PaperId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ── Extraction ───────────────────────────────────────────────────────────

/// Everything an extraction run produced, returned to callers so later stages
/// can work from memory instead of re-reading the backup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Content-addressed key of this paper.
    pub paper_id: PaperId,
    /// `<backup_root>/<paper_id>`.
    pub backup_dir: PathBuf,
    /// `<backup_dir>/paper.md`.
    pub markdown_file: PathBuf,
    /// `<backup_dir>/images`.
    pub images_dir: PathBuf,
    /// Every image under `images_dir`, sorted by path.
    pub image_files: Vec<PathBuf>,
    /// The rendered text itself.
    pub markdown: String,
    /// Second copy written to a caller-supplied directory, if one was given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror: Option<MirrorCopy>,
}

/// Paths of the optional destination-directory copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorCopy {
    pub markdown_file: PathBuf,
    pub images_dir: PathBuf,
    pub image_files: Vec<PathBuf>,
}

// ── Analysis ─────────────────────────────────────────────────────────────

/// 1-based position of an image within its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

/// What happened to one image. Exactly one variant applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    /// The model produced an analysis.
    Succeeded { analysis: String },
    /// No textual reference was found, so the model was not called.
    Skipped { reason: String },
    /// The image could not be analysed.
    Failed { error: String },
}

/// Reason recorded for images without a textual reference.
pub const CONTEXT_NOT_FOUND: &str = "No reference to this image was found in the Markdown";

/// Per-image entry of the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub image_name: String,
    pub image_path: PathBuf,
    /// Rendered context window, truncated for readability.
    pub context_preview: String,
    pub context_found: bool,
    #[serde(flatten)]
    pub outcome: AnalysisOutcome,
    pub progress: Progress,
}

impl AnalysisResult {
    pub fn is_succeeded(&self) -> bool {
        matches!(self.outcome, AnalysisOutcome::Succeeded { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, AnalysisOutcome::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, AnalysisOutcome::Failed { .. })
    }
}

/// Lifecycle of a batch job as recorded in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Empty manifest written, no image processed yet.
    #[default]
    Initialized,
    /// At least one image has been checkpointed.
    Processing,
    /// Every image has been attempted.
    Completed,
}

/// Durable, incrementally checkpointed record of a figure-analysis batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub model: VisionModel,
    pub model_full_name: String,
    pub status: JobStatus,
    pub total_images: usize,
    pub analyzed_images: usize,
    pub skipped_images: usize,
    pub failed_images: usize,
    pub results: Vec<AnalysisResult>,
}

impl Manifest {
    /// An empty manifest for a batch of `total_images`.
    pub fn new(model: VisionModel, total_images: usize) -> Self {
        Self {
            model,
            model_full_name: model.full_name().to_string(),
            status: JobStatus::Initialized,
            total_images,
            analyzed_images: 0,
            skipped_images: 0,
            failed_images: 0,
            results: Vec::with_capacity(total_images),
        }
    }

    /// Count and append one classified result.
    pub fn record(&mut self, result: AnalysisResult) {
        match result.outcome {
            AnalysisOutcome::Succeeded { .. } => self.analyzed_images += 1,
            AnalysisOutcome::Skipped { .. } => self.skipped_images += 1,
            AnalysisOutcome::Failed { .. } => self.failed_images += 1,
        }
        self.status = JobStatus::Processing;
        self.results.push(result);
    }

    /// Mark every image as attempted.
    pub fn complete(&mut self) {
        self.status = JobStatus::Completed;
    }

    /// Number of images checkpointed so far.
    pub fn processed(&self) -> usize {
        self.results.len()
    }
}

/// Truncate a rendered context to `max_chars`, appending `...` when cut.
pub fn context_preview(context: &str, max_chars: usize) -> String {
    match context.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &context[..cut]),
        None => context.to_string(),
    }
}
