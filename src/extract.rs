//! Paper extraction entry point: submit → poll → archive.

use crate::config::ExtractionConfig;
use crate::error::PaperFigError;
use crate::output::BackupRecord;
use crate::pipeline::archive::ArchiveExtractor;
use crate::pipeline::task::RemoteTaskClient;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Parse a paper through the remote extraction service and archive the
/// result under `config.backup_root`.
///
/// # Arguments
/// * `document_url`: publicly reachable URL of the PDF
/// * `config`: extraction configuration (API key, poll policy, backup root)
/// * `output_dir`: optional directory that receives a second copy of
///   `paper.md` and `images/`
///
/// # Errors
/// Every failure here is fatal: submit rejected, task failed, poll limit
/// reached, bundle unusable, or the backup could not be written.
pub async fn parse_paper(
    document_url: &str,
    config: &ExtractionConfig,
    output_dir: Option<&Path>,
) -> Result<BackupRecord, PaperFigError> {
    let started = Instant::now();
    info!("Starting extraction: {}", document_url);

    // ── Step 1: Submit ───────────────────────────────────────────────────
    let tasks = RemoteTaskClient::new(config)?;
    let task_id = tasks.submit(document_url).await?;

    // ── Step 2: Wait for the parser ──────────────────────────────────────
    let result = tasks.poll_until_terminal(&task_id).await?;

    // ── Step 3: Archive the bundle ───────────────────────────────────────
    let archive = ArchiveExtractor::new(config)?;
    let record = archive
        .extract(&result.full_zip_url, Some(document_url), output_dir)
        .await?;

    info!(
        "Extracted paper {} ({} images) in {:.1}s",
        record.paper_id,
        record.image_files.len(),
        started.elapsed().as_secs_f64()
    );
    Ok(record)
}
