//! End-to-end integration tests for edgequake-paperfig.
//!
//! These tests parse a real arXiv paper through the MinerU API and send its
//! figures to the live vision endpoint. They are gated behind the
//! `E2E_ENABLED` environment variable so they do not run in CI unless
//! explicitly requested, and they need `MINERU_API_KEY` / `NVIDIA_API_KEY`
//! in the environment or in `.env`.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture
//!
//! To restrict to a specific test:
//!   E2E_ENABLED=1 cargo test --test e2e test_parse_arxiv -- --nocapture

use edgequake_paperfig::{
    analyze_paper_dir, parse_paper, AnalysisConfig, BackupRecord, Credentials, ExtractionConfig,
    JobStatus, Manifest, PaperId, VisionModel,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// "Attention Is All You Need": short, figure-heavy, and stable on arXiv.
const PAPER_URL: &str = "https://arxiv.org/pdf/1706.03762v7";

// ── Test helpers ─────────────────────────────────────────────────────────────

fn output_dir() -> PathBuf {
    let d = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/output");
    std::fs::create_dir_all(&d).ok();
    d
}

fn credentials() -> Credentials {
    let file = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(".env");
    Credentials::from_env_file(&file)
        .unwrap_or_default()
        .with_overrides(
            std::env::var("MINERU_API_KEY").ok(),
            std::env::var("NVIDIA_API_KEY").ok(),
        )
}

/// Skip this test unless E2E_ENABLED is set *and* the named key is available.
macro_rules! e2e_skip_unless_ready {
    ($key:expr, $value:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        match $value {
            Some(v) => v,
            None => {
                println!("SKIP: {} not configured", $key);
                return;
            }
        }
    }};
}

async fn parse_attention_paper(api_key: String) -> BackupRecord {
    let config = ExtractionConfig::builder()
        .api_key(api_key)
        .backup_root(output_dir().join("backup"))
        .poll_interval_secs(10)
        .poll_deadline(Duration::from_secs(20 * 60))
        .build()
        .expect("valid config");

    parse_paper(PAPER_URL, &config, Some(&output_dir().join("attention")))
        .await
        .expect("parse_paper() should succeed")
}

fn assert_manifest_consistent(m: &Manifest, context: &str) {
    assert_eq!(m.status, JobStatus::Completed, "[{context}] not completed");
    assert_eq!(m.results.len(), m.total_images, "[{context}] missing results");
    assert_eq!(
        m.analyzed_images + m.skipped_images + m.failed_images,
        m.total_images,
        "[{context}] counters do not add up"
    );
    for (i, r) in m.results.iter().enumerate() {
        assert_eq!(r.progress.current, i + 1, "[{context}] progress out of order");
    }
    println!(
        "[{context}] ✓  {} analysed, {} skipped, {} failed",
        m.analyzed_images, m.skipped_images, m.failed_images
    );
}

// ── Extraction ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_parse_arxiv_paper() {
    let key = e2e_skip_unless_ready!("MINERU_API_KEY", credentials().mineru_api_key);

    let record = parse_attention_paper(key).await;

    assert_eq!(record.paper_id, PaperId::from_locator(PAPER_URL));
    assert!(record.markdown.contains("Attention"), "title missing from Markdown");
    assert!(!record.image_files.is_empty(), "paper has figures");
    assert!(record.markdown_file.is_file());
    assert!(record.image_files.iter().all(|p| p.is_file()));

    let mirror = record.mirror.as_ref().expect("mirror requested");
    assert_eq!(mirror.image_files.len(), record.image_files.len());

    println!(
        "Parsed {} → {} ({} images, {} bytes of Markdown)",
        PAPER_URL,
        record.backup_dir.display(),
        record.image_files.len(),
        record.markdown.len()
    );
}

// ── Analysis ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_parse_then_analyze_qwen() {
    let creds = credentials();
    let mineru = e2e_skip_unless_ready!("MINERU_API_KEY", creds.mineru_api_key.clone());
    let vision = e2e_skip_unless_ready!("NVIDIA_API_KEY", creds.vision_api_key.clone());

    let record = parse_attention_paper(mineru).await;

    let config = AnalysisConfig::builder()
        .model(VisionModel::Qwen)
        .api_key(Some(vision))
        .context_lines(5)
        .build()
        .expect("valid config");
    let manifest_path = output_dir().join("attention_qwen.json");

    let manifest = analyze_paper_dir(&record.backup_dir, &manifest_path, config)
        .await
        .expect("analyze_paper_dir() should succeed");

    assert_manifest_consistent(&manifest, "qwen");
    assert!(manifest.analyzed_images >= 1, "at least one figure analysed");
    assert!(Path::new(&manifest_path).is_file());
}

#[tokio::test]
async fn test_analyze_without_vision_key_records_failures() {
    let key = e2e_skip_unless_ready!("MINERU_API_KEY", credentials().mineru_api_key);

    let record = parse_attention_paper(key).await;
    let manifest_path = output_dir().join("attention_nokey.json");

    let manifest = analyze_paper_dir(&record.backup_dir, &manifest_path, AnalysisConfig::default())
        .await
        .expect("missing vision key is not fatal");

    assert_manifest_consistent(&manifest, "no-key");
    assert_eq!(manifest.failed_images, manifest.total_images);
}
