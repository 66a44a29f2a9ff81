//! Figure-analysis entry points: the checkpointed batch runner and the
//! paper-directory convenience wrapper.
//!
//! ## Why persist after every image?
//!
//! A batch of thirty figures against a thinking model can run for an hour.
//! Writing the manifest after each image means a crash, a `Ctrl-C`, or a
//! dead network loses at most the image in flight, and the file on disk
//! always describes exactly the images processed so far.
//!
//! ## Why sequential?
//!
//! Each vision call already saturates the provider's per-key rate limit, and
//! a strictly ordered manifest is easier to resume by hand. Every `.await`
//! finishes before the next request starts.

use crate::config::{AnalysisConfig, VISION_API_KEY};
use crate::error::{PaperFigError, VisionError};
use crate::output::{
    context_preview, AnalysisOutcome, AnalysisResult, Manifest, Progress, CONTEXT_NOT_FOUND,
};
use crate::pipeline::archive::{IMAGES_DIR, MARKDOWN_FILE};
use crate::pipeline::locate::{ReferenceLocator, SubstringLocator};
use crate::pipeline::order::resolve_image_order;
use crate::pipeline::vision::{ChatCompletionsVisionClient, VisionClient, VisionRequest};
use crate::prompts::figure_analysis_prompt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

// ── Paper directory ──────────────────────────────────────────────────────

/// A prepared paper directory: one Markdown file and an image directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperDir {
    pub markdown_file: PathBuf,
    pub images_dir: PathBuf,
}

impl PaperDir {
    /// Locate `paper.md` (else the first `*.md` by name) and `images/`
    /// (or the nested `images/images/` left by bundle archival).
    pub fn discover(dir: &Path) -> Result<Self, PaperFigError> {
        let markdown_file = find_paper_markdown(dir).ok_or_else(|| PaperFigError::MarkdownNotFound {
            dir: dir.to_path_buf(),
        })?;

        let images = dir.join(IMAGES_DIR);
        let nested = images.join(IMAGES_DIR);
        let images_dir = if nested.is_dir() { nested } else { images };
        if !images_dir.is_dir() {
            return Err(PaperFigError::ImagesDirNotFound { path: images_dir });
        }

        debug!(
            "Paper dir: markdown={}, images={}",
            markdown_file.display(),
            images_dir.display()
        );
        Ok(Self {
            markdown_file,
            images_dir,
        })
    }

    pub async fn read_markdown(&self) -> Result<String, PaperFigError> {
        tokio::fs::read_to_string(&self.markdown_file)
            .await
            .map_err(|source| PaperFigError::ReadFailed {
                path: self.markdown_file.clone(),
                source,
            })
    }
}

fn find_paper_markdown(dir: &Path) -> Option<PathBuf> {
    let preferred = dir.join(MARKDOWN_FILE);
    if preferred.is_file() {
        return Some(preferred);
    }
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("md"))
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

// ── Batch runner ─────────────────────────────────────────────────────────

/// Runs a batch of figures through the vision model, checkpointing the
/// manifest after each one.
pub struct BatchAnalysisRunner {
    config: AnalysisConfig,
    vision: Option<Arc<dyn VisionClient>>,
    locator: Arc<dyn ReferenceLocator>,
}

impl BatchAnalysisRunner {
    /// `vision = None` means no credential: every image is recorded as a
    /// failure without calling anything.
    pub fn new(config: AnalysisConfig, vision: Option<Arc<dyn VisionClient>>) -> Self {
        Self {
            config,
            vision,
            locator: Arc::new(SubstringLocator),
        }
    }

    /// Build the default chat-completions client when `config.api_key` is set.
    pub fn from_config(config: AnalysisConfig) -> Result<Self, PaperFigError> {
        let vision = match config.api_key.as_deref() {
            Some(key) => {
                let client = ChatCompletionsVisionClient::new(&config, key)
                    .map_err(|e| PaperFigError::Internal(e.to_string()))?;
                Some(Arc::new(client) as Arc<dyn VisionClient>)
            }
            None => {
                warn!("{} not configured; every image will be recorded as failed", VISION_API_KEY);
                None
            }
        };
        Ok(Self::new(config, vision))
    }

    /// Replace the reference-location strategy.
    pub fn with_locator(mut self, locator: Arc<dyn ReferenceLocator>) -> Self {
        self.locator = locator;
        self
    }

    /// Analyse `images` in order against `markdown`, persisting the manifest
    /// to `manifest_path` before the first image, after every image, and once
    /// more when the batch is complete.
    ///
    /// # Errors
    /// Only manifest persistence failures are returned. Per-image problems
    /// end up in the manifest.
    pub async fn run(
        &self,
        images: &[PathBuf],
        markdown: &str,
        manifest_path: &Path,
    ) -> Result<Manifest, PaperFigError> {
        let started = Instant::now();
        let total = images.len();
        let callback = self.config.progress_callback.as_ref();

        if let Some(parent) = manifest_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PaperFigError::ManifestWriteFailed {
                    path: manifest_path.to_path_buf(),
                    detail: e.to_string(),
                })?;
        }

        let mut manifest = Manifest::new(self.config.model, total);
        persist(&manifest, manifest_path).await?;
        info!(
            "Analysing {} images with {} → {}",
            total,
            self.config.model.full_name(),
            manifest_path.display()
        );
        if let Some(cb) = callback {
            cb.on_batch_start(total);
        }

        for (i, path) in images.iter().enumerate() {
            let index = i + 1;
            let name = image_name(path);
            if let Some(cb) = callback {
                cb.on_image_start(index, total, &name);
            }

            let result = self.analyze_one(index, total, path, &name, markdown).await;
            let outcome = result.outcome.clone();
            manifest.record(result);
            persist(&manifest, manifest_path).await?;

            match &outcome {
                AnalysisOutcome::Succeeded { analysis } => {
                    info!("[{}/{}] {}: analysed ({} chars)", index, total, name, analysis.len());
                    if let Some(cb) = callback {
                        cb.on_image_analyzed(index, total, &name, analysis.len());
                    }
                }
                AnalysisOutcome::Skipped { .. } => {
                    info!("[{}/{}] {}: no reference in text, skipped", index, total, name);
                    if let Some(cb) = callback {
                        cb.on_image_skipped(index, total, &name);
                    }
                }
                AnalysisOutcome::Failed { error } => {
                    warn!("[{}/{}] {}: {}", index, total, name, error);
                    if let Some(cb) = callback {
                        cb.on_image_failed(index, total, &name, error);
                    }
                }
            }
        }

        manifest.complete();
        persist(&manifest, manifest_path).await?;
        info!(
            "Batch complete in {:.1}s: {} analysed, {} skipped, {} failed",
            started.elapsed().as_secs_f64(),
            manifest.analyzed_images,
            manifest.skipped_images,
            manifest.failed_images
        );
        if let Some(cb) = callback {
            cb.on_batch_complete(
                manifest.analyzed_images,
                manifest.skipped_images,
                manifest.failed_images,
            );
        }
        Ok(manifest)
    }

    /// Classify one image. Never fails: every error becomes the outcome.
    async fn analyze_one(
        &self,
        index: usize,
        total: usize,
        path: &Path,
        name: &str,
        markdown: &str,
    ) -> AnalysisResult {
        let mut result = AnalysisResult {
            image_name: name.to_string(),
            image_path: path.to_path_buf(),
            context_preview: String::new(),
            context_found: false,
            outcome: AnalysisOutcome::Skipped {
                reason: CONTEXT_NOT_FOUND.to_string(),
            },
            progress: Progress {
                current: index,
                total,
            },
        };

        let Some(vision) = self.vision.as_ref() else {
            let err = VisionError::MissingCredential {
                key: VISION_API_KEY.to_string(),
            };
            result.outcome = AnalysisOutcome::Failed {
                error: err.to_string(),
            };
            return result;
        };

        let Some(window) = self
            .locator
            .locate(name, markdown, self.config.context_lines)
        else {
            return result;
        };

        let context = window.render();
        result.context_found = true;
        result.context_preview = context_preview(&context, self.config.preview_chars);
        debug!("{}: reference at line {}", name, window.match_line);

        result.outcome = match self.call_vision(vision.as_ref(), path, &context).await {
            Ok(analysis) => AnalysisOutcome::Succeeded { analysis },
            Err(e) => AnalysisOutcome::Failed {
                error: e.to_string(),
            },
        };
        result
    }

    async fn call_vision(
        &self,
        vision: &dyn VisionClient,
        path: &Path,
        context: &str,
    ) -> Result<String, VisionError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| VisionError::ImageRead {
                path: path.display().to_string(),
                detail: e.to_string(),
            })?;
        let prompt = figure_analysis_prompt(context);
        vision
            .analyze(VisionRequest {
                image_path: path,
                image_bytes: &bytes,
                prompt: &prompt,
            })
            .await
    }
}

fn image_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Atomic write: pretty JSON to a sibling temp file, then rename.
async fn persist(manifest: &Manifest, path: &Path) -> Result<(), PaperFigError> {
    let write_err = |detail: String| PaperFigError::ManifestWriteFailed {
        path: path.to_path_buf(),
        detail,
    };

    let json = serde_json::to_string_pretty(manifest).map_err(|e| write_err(e.to_string()))?;
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json)
        .await
        .map_err(|e| write_err(e.to_string()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| write_err(e.to_string()))?;
    debug!(
        "Manifest checkpoint: {}/{} images",
        manifest.processed(),
        manifest.total_images
    );
    Ok(())
}

// ── Convenience ──────────────────────────────────────────────────────────

/// Analyse every referenced figure of a prepared paper directory.
///
/// Images are taken in the order the Markdown references them; images the
/// text never mentions are not analysed.
///
/// # Errors
/// Fatal when the directory has no Markdown or image directory, when no
/// image survives ordering, or when the manifest cannot be written.
pub async fn analyze_paper_dir(
    paper_dir: &Path,
    manifest_path: &Path,
    config: AnalysisConfig,
) -> Result<Manifest, PaperFigError> {
    let dir = PaperDir::discover(paper_dir)?;
    let markdown = dir.read_markdown().await?;

    let images = resolve_image_order(Some(&markdown), &dir.images_dir)?;
    if images.is_empty() {
        return Err(PaperFigError::NoImagesFound {
            path: dir.images_dir,
        });
    }

    BatchAnalysisRunner::from_config(config)?
        .run(&images, &markdown, manifest_path)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::fs;

    struct EchoVision;

    #[async_trait]
    impl VisionClient for EchoVision {
        async fn analyze(&self, request: VisionRequest<'_>) -> Result<String, VisionError> {
            Ok(format!("{} bytes", request.image_bytes.len()))
        }
    }

    #[test]
    fn discover_prefers_paper_md_and_nested_images() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "a").unwrap();
        fs::write(dir.path().join("paper.md"), "p").unwrap();
        fs::create_dir_all(dir.path().join("images/images")).unwrap();

        let pd = PaperDir::discover(dir.path()).unwrap();
        assert_eq!(pd.markdown_file, dir.path().join("paper.md"));
        assert_eq!(pd.images_dir, dir.path().join("images/images"));
    }

    #[test]
    fn discover_falls_back_to_first_md() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("z.md"), "z").unwrap();
        fs::write(dir.path().join("b.md"), "b").unwrap();
        fs::create_dir_all(dir.path().join("images")).unwrap();

        let pd = PaperDir::discover(dir.path()).unwrap();
        assert_eq!(pd.markdown_file, dir.path().join("b.md"));
        assert_eq!(pd.images_dir, dir.path().join("images"));
    }

    #[test]
    fn discover_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            PaperDir::discover(dir.path()),
            Err(PaperFigError::MarkdownNotFound { .. })
        ));
        fs::write(dir.path().join("paper.md"), "p").unwrap();
        assert!(matches!(
            PaperDir::discover(dir.path()),
            Err(PaperFigError::ImagesDirNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn unreadable_image_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("out/manifest.json");
        let runner = BatchAnalysisRunner::new(
            AnalysisConfig::default(),
            Some(Arc::new(EchoVision) as Arc<dyn VisionClient>),
        );

        let missing = dir.path().join("gone.png");
        let m = runner
            .run(&[missing], "see gone.png here", &manifest_path)
            .await
            .unwrap();
        assert_eq!(m.failed_images, 1);
        assert!(m.results[0].context_found);
        match &m.results[0].outcome {
            AnalysisOutcome::Failed { error } => assert!(error.contains("gone.png"), "got: {error}"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn preview_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("fig.png");
        fs::write(&img, b"png").unwrap();
        let markdown = format!("{}\nfig.png\n", "x".repeat(800));

        let config = AnalysisConfig::builder().preview_chars(50).build().unwrap();
        let runner =
            BatchAnalysisRunner::new(config, Some(Arc::new(EchoVision) as Arc<dyn VisionClient>));
        let m = runner
            .run(&[img], &markdown, &dir.path().join("m.json"))
            .await
            .unwrap();

        let preview = &m.results[0].context_preview;
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 53);
        assert!(m.results[0].is_succeeded());
    }

    #[tokio::test]
    async fn empty_batch_still_writes_completed_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        let runner = BatchAnalysisRunner::new(AnalysisConfig::default(), None);
        let m = runner.run(&[], "", &path).await.unwrap();
        assert_eq!(m.total_images, 0);

        let on_disk: Manifest = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.status, crate::output::JobStatus::Completed);
        assert!(!dir.path().join("m.json.tmp").exists());
    }
}
