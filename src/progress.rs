//! Progress-callback trait for per-figure analysis events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to receive
//! events as the batch runner works through the figures.
//!
//! Every `on_image_*` completion event fires **after** the manifest
//! checkpoint for that image has been written, so a callback that reads the
//! manifest file always sees the image it is being told about.
//!
//! # Example
//!
//! ```rust
//! use edgequake_paperfig::{AnalysisConfig, AnalysisProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     analysed: Arc<AtomicUsize>,
//! }
//!
//! impl AnalysisProgressCallback for CountingCallback {
//!     fn on_image_analyzed(&self, index: usize, total: usize, name: &str, analysis_len: usize) {
//!         self.analysed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("[{index}/{total}] {name}: {analysis_len} chars");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     analysed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = AnalysisConfig::builder()
//!     .progress_callback(counter as Arc<dyn AnalysisProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch runner as it processes each figure.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Indices are 1-based.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Called once, after the empty manifest has been written.
    fn on_batch_start(&self, total_images: usize) {
        let _ = total_images;
    }

    /// Called before context lookup for an image.
    fn on_image_start(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// Called when the model returned an analysis for an image.
    fn on_image_analyzed(&self, index: usize, total: usize, name: &str, analysis_len: usize) {
        let _ = (index, total, name, analysis_len);
    }

    /// Called when no textual reference was found and the model was not called.
    fn on_image_skipped(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// Called when the image failed (missing key, read error, model error).
    fn on_image_failed(&self, index: usize, total: usize, name: &str, error: &str) {
        let _ = (index, total, name, error);
    }

    /// Called once after every image has been attempted.
    fn on_batch_complete(&self, analyzed: usize, skipped: usize, failed: usize) {
        let _ = (analyzed, skipped, failed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;
