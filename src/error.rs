//! Error types for the edgequake-paperfig library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PaperFigError`]: **Fatal**: the run cannot proceed at all (missing
//!   credential, bundle without Markdown, remote task failed, images
//!   directory missing). Returned as `Err(PaperFigError)` from the top-level
//!   entry points and turned into a non-zero exit by the CLI.
//!
//! * [`VisionError`]: **Non-fatal**: a single figure failed (timeout, API
//!   error, unreadable file) but every other figure is fine. Stored inside
//!   [`crate::output::AnalysisOutcome::Failed`] so one bad image never loses
//!   the results already computed for the others.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-paperfig library.
///
/// Per-figure failures use [`VisionError`] and end up in the manifest
/// rather than being propagated here.
#[derive(Debug, Error)]
pub enum PaperFigError {
    // ── Credential / config errors ────────────────────────────────────────
    /// A required API key is absent from both the CLI and the credentials file.
    #[error("{key} is not configured.\nAdd it to {hint} or pass it on the command line.")]
    MissingCredential { key: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The credentials file exists but could not be parsed.
    #[error("Failed to read credentials from '{path}': {detail}")]
    CredentialsFile { path: PathBuf, detail: String },

    // ── Extraction service errors ─────────────────────────────────────────
    /// Submitting the extraction task failed at the transport or HTTP level.
    #[error("Failed to submit extraction task for '{url}': {reason}")]
    SubmitFailed { url: String, reason: String },

    /// The submit response carried no task identifier in either accepted shape.
    #[error("task_id not found in extraction service response: {body}")]
    MissingTaskId { body: String },

    /// The remote task reached the `failed` terminal state.
    #[error("Extraction task {task_id} failed: {message}")]
    TaskFailed { task_id: String, message: String },

    /// The remote task finished but did not report a bundle location.
    #[error("Extraction task {task_id} finished without a full_zip_url")]
    MissingBundleUrl { task_id: String },

    /// A configured poll limit (attempts or deadline) was reached.
    #[error("Gave up polling task {task_id} after {attempts} attempts ({elapsed_secs}s)")]
    PollLimitExceeded {
        task_id: String,
        attempts: u32,
        elapsed_secs: u64,
    },

    // ── Bundle errors ─────────────────────────────────────────────────────
    /// Bundle download failed (transport error or non-success status).
    #[error("Failed to download bundle '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// The downloaded bundle is not a readable zip archive.
    #[error("Bundle '{url}' could not be unpacked: {detail}")]
    CorruptBundle { url: String, detail: String },

    /// The bundle contained no rendered-text (`.md`) file.
    #[error("No Markdown file found in bundle '{url}'")]
    MarkdownNotInBundle { url: String },

    // ── Paper directory errors ────────────────────────────────────────────
    /// A prepared paper directory has no Markdown file.
    #[error("No paper.md (or other .md file) found in '{dir}'")]
    MarkdownNotFound { dir: PathBuf },

    /// A prepared paper directory or image path does not exist.
    #[error("Images directory not found: '{path}'")]
    ImagesDirNotFound { path: PathBuf },

    /// No analysable image survived discovery and ordering.
    #[error("No image files found in '{path}'")]
    NoImagesFound { path: PathBuf },

    /// A single file was given where an image was expected.
    #[error("Not a supported image type: '{path}'\nSupported: png, jpg, jpeg, gif, bmp, tiff, webp")]
    UnsupportedImageType { path: PathBuf },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Backup or mirror directory could not be written.
    #[error("Failed to write '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file that should exist could not be read.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The manifest checkpoint could not be written.
    #[error("Failed to write manifest '{path}': {detail}")]
    ManifestWriteFailed { path: PathBuf, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single figure.
///
/// Stored in the manifest as the figure's failure payload; the batch
/// continues with the next image.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum VisionError {
    /// No vision API key was available for this run.
    #[error("Vision API key ({key}) not configured")]
    MissingCredential { key: String },

    /// The image file could not be read from disk.
    #[error("Failed to read image '{path}': {detail}")]
    ImageRead { path: String, detail: String },

    /// The vision call exceeded the configured timeout.
    #[error("Vision model call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Transport-level failure talking to the vision service.
    #[error("Vision request failed: {detail}")]
    Http { detail: String },

    /// The vision service answered with a non-success status.
    #[error("Vision API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// The response had no `choices[0].message.content`.
    #[error("Vision API response contained no message content")]
    EmptyResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_display() {
        let e = PaperFigError::MissingCredential {
            key: "MINERU_API_KEY".into(),
            hint: ".env".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("MINERU_API_KEY"), "got: {msg}");
        assert!(msg.contains(".env"), "got: {msg}");
    }

    #[test]
    fn poll_limit_display() {
        let e = PaperFigError::PollLimitExceeded {
            task_id: "t-42".into(),
            attempts: 7,
            elapsed_secs: 210,
        };
        assert!(e.to_string().contains("t-42"));
        assert!(e.to_string().contains("7 attempts"));
    }

    #[test]
    fn task_failed_display() {
        let e = PaperFigError::TaskFailed {
            task_id: "abc".into(),
            message: "file too large".into(),
        };
        assert!(e.to_string().contains("file too large"));
    }

    #[test]
    fn vision_timeout_display() {
        let e = VisionError::Timeout { secs: 600 };
        assert!(e.to_string().contains("600s"));
    }

    #[test]
    fn vision_api_display() {
        let e = VisionError::Api {
            status: 429,
            body: "rate limited".into(),
        };
        assert!(e.to_string().contains("429"));
        assert!(e.to_string().contains("rate limited"));
    }
}
