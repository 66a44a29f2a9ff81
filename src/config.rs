//! Configuration types for paper extraction and figure analysis.
//!
//! Every knob lives in an explicit value handed to the component that needs
//! it: [`ExtractionConfig`] for the remote parser and backup store,
//! [`AnalysisConfig`] for the vision model and batch runner. Library code
//! never reads environment variables; the CLI resolves flags, env vars and
//! the credentials file into these structs once, up front.

use crate::error::PaperFigError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Credentials-file key holding the extraction service token.
pub const MINERU_API_KEY: &str = "MINERU_API_KEY";

/// Credentials-file key holding the vision service token.
pub const VISION_API_KEY: &str = "NVIDIA_API_KEY";

/// Default extraction service base URL (MinerU v4 API).
pub const DEFAULT_EXTRACTION_BASE_URL: &str = "https://mineru.net/api/v4";

/// Default OpenAI-compatible chat-completions endpoint for the vision model.
pub const DEFAULT_VISION_ENDPOINT: &str = "https://integrate.api.nvidia.com/v1/chat/completions";

// ── Extraction ───────────────────────────────────────────────────────────

/// Configuration for submitting a paper to the extraction service and
/// archiving the resulting bundle.
///
/// # Example
/// ```rust
/// use edgequake_paperfig::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .api_key("sk-mineru")
///     .poll_interval_secs(10)
///     .max_poll_attempts(60)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_poll_attempts, Some(60));
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Base URL of the extraction API. Default: [`DEFAULT_EXTRACTION_BASE_URL`].
    pub api_base_url: String,

    /// Bearer token for the extraction API. Required.
    pub api_key: String,

    /// Parser model requested from the service. Default: `"vlm"`.
    pub model_version: String,

    /// Root of the content-addressed backup store. Default: `backup`.
    pub backup_root: PathBuf,

    /// Fixed delay between status queries. Default: 30 s.
    ///
    /// There is no exponential backoff: the service reports progress in
    /// coarse steps and a steady cadence keeps the log readable.
    pub poll_interval: Duration,

    /// Give up after this many status queries. Default: `None` (poll forever).
    ///
    /// With both limits unset an unreachable service keeps the job waiting
    /// until the process is killed.
    pub max_poll_attempts: Option<u32>,

    /// Give up once this much wall-clock time has passed. Default: `None`.
    pub poll_deadline: Option<Duration>,

    /// Timeout for submit and status requests in seconds. Default: 300.
    pub request_timeout_secs: u64,

    /// Timeout for the bundle download in seconds. Default: 600.
    pub download_timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_EXTRACTION_BASE_URL.to_string(),
            api_key: String::new(),
            model_version: "vlm".to_string(),
            backup_root: PathBuf::from("backup"),
            poll_interval: Duration::from_secs(30),
            max_poll_attempts: None,
            poll_deadline: None,
            request_timeout_secs: 300,
            download_timeout_secs: 600,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("api_base_url", &self.api_base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model_version", &self.model_version)
            .field("backup_root", &self.backup_root)
            .field("poll_interval", &self.poll_interval)
            .field("max_poll_attempts", &self.max_poll_attempts)
            .field("poll_deadline", &self.poll_deadline)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn model_version(mut self, version: impl Into<String>) -> Self {
        self.config.model_version = version.into();
        self
    }

    pub fn backup_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.backup_root = root.into();
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn poll_interval_secs(self, secs: u64) -> Self {
        self.poll_interval(Duration::from_secs(secs))
    }

    pub fn max_poll_attempts(mut self, n: u32) -> Self {
        self.config.max_poll_attempts = Some(n);
        self
    }

    pub fn poll_deadline(mut self, deadline: Duration) -> Self {
        self.config.poll_deadline = Some(deadline);
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, PaperFigError> {
        let c = &self.config;
        if c.api_key.trim().is_empty() {
            return Err(PaperFigError::MissingCredential {
                key: MINERU_API_KEY.to_string(),
                hint: "the credentials file".to_string(),
            });
        }
        if c.poll_interval.is_zero() {
            return Err(PaperFigError::InvalidConfig(
                "poll_interval must be greater than zero".into(),
            ));
        }
        if c.max_poll_attempts == Some(0) {
            return Err(PaperFigError::InvalidConfig(
                "max_poll_attempts must be ≥ 1".into(),
            ));
        }
        if c.api_base_url.is_empty() {
            return Err(PaperFigError::InvalidConfig(
                "api_base_url must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Analysis ─────────────────────────────────────────────────────────────

/// Configuration for the per-figure vision analysis batch.
///
/// `api_key = None` is a valid configuration: the batch still runs, records
/// a failure for every image, and writes the manifest.
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Vision model profile. Default: [`VisionModel::Qwen`].
    pub model: VisionModel,

    /// Chat-completions endpoint. Default: [`DEFAULT_VISION_ENDPOINT`].
    pub endpoint: String,

    /// Bearer token for the vision service.
    pub api_key: Option<String>,

    /// Lines of context taken before and after a figure reference. Default: 10.
    pub context_lines: usize,

    /// Maximum tokens the model may generate per figure. Default: 16384.
    ///
    /// Both profiles run with thinking enabled, and the reasoning trace counts
    /// against this budget.
    pub max_tokens: usize,

    /// Per-figure vision call timeout in seconds. Default: 600.
    pub api_timeout_secs: u64,

    /// Characters of context kept in each result's preview. Default: 500.
    pub preview_chars: usize,

    /// Optional per-image progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: VisionModel::default(),
            endpoint: DEFAULT_VISION_ENDPOINT.to_string(),
            api_key: None,
            context_lines: 10,
            max_tokens: 16384,
            api_timeout_secs: 600,
            preview_chars: 500,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_deref().map(redact))
            .field("context_lines", &self.context_lines)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("preview_chars", &self.preview_chars)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn AnalysisProgressCallback>"),
            )
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn model(mut self, model: VisionModel) -> Self {
        self.config.model = model;
        self
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = url.into();
        self
    }

    /// Set the vision API key. Empty strings count as "not configured".
    pub fn api_key(mut self, key: Option<String>) -> Self {
        self.config.api_key = key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn context_lines(mut self, n: usize) -> Self {
        self.config.context_lines = n;
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn preview_chars(mut self, n: usize) -> Self {
        self.config.preview_chars = n;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, PaperFigError> {
        let c = &self.config;
        if c.api_timeout_secs == 0 {
            return Err(PaperFigError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(PaperFigError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.endpoint.is_empty() {
            return Err(PaperFigError::InvalidConfig(
                "vision endpoint must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Vision model profiles ────────────────────────────────────────────────

/// The two supported vision models. They share the request shape and differ
/// only in their sampling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisionModel {
    /// `moonshotai/kimi-k2.5`
    Kimi,
    /// `qwen/qwen3.5-397b-a17b` (default)
    #[default]
    Qwen,
}

impl VisionModel {
    /// Short name used on the command line and in the manifest.
    pub fn name(&self) -> &'static str {
        match self {
            VisionModel::Kimi => "kimi",
            VisionModel::Qwen => "qwen",
        }
    }

    /// Upstream model identifier sent in the request body.
    pub fn full_name(&self) -> &'static str {
        match self {
            VisionModel::Kimi => "moonshotai/kimi-k2.5",
            VisionModel::Qwen => "qwen/qwen3.5-397b-a17b",
        }
    }

    /// Sampling parameters for this model.
    pub fn profile(&self) -> SamplingProfile {
        match self {
            VisionModel::Kimi => SamplingProfile {
                temperature: 0.3,
                top_p: 1.0,
                top_k: None,
                presence_penalty: None,
                repetition_penalty: None,
                chat_template_kwargs: json!({ "thinking": true }),
            },
            VisionModel::Qwen => SamplingProfile {
                temperature: 0.6,
                top_p: 0.95,
                top_k: Some(20),
                presence_penalty: Some(0.0),
                repetition_penalty: Some(1.0),
                chat_template_kwargs: json!({ "enable_thinking": true }),
            },
        }
    }
}

impl fmt::Display for VisionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VisionModel {
    type Err = PaperFigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kimi" => Ok(VisionModel::Kimi),
            "qwen" => Ok(VisionModel::Qwen),
            other => Err(PaperFigError::InvalidConfig(format!(
                "unsupported model '{other}', expected one of: kimi, qwen"
            ))),
        }
    }
}

/// Model-specific sampling parameters merged into the chat request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplingProfile {
    pub temperature: f32,
    pub top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f32>,
    pub chat_template_kwargs: serde_json::Value,
}

// ── Credentials ──────────────────────────────────────────────────────────

/// API keys read from a local `.env`-style file.
///
/// The file is parsed without touching the process environment.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub mineru_api_key: Option<String>,
    pub vision_api_key: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("mineru_api_key", &self.mineru_api_key.as_deref().map(redact))
            .field("vision_api_key", &self.vision_api_key.as_deref().map(redact))
            .finish()
    }
}

impl Credentials {
    /// Load credentials from `path`. A missing file yields empty credentials.
    pub fn from_env_file(path: &Path) -> Result<Self, PaperFigError> {
        let iter = match dotenvy::from_path_iter(path) {
            Ok(iter) => iter,
            Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No credentials file at {}", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(PaperFigError::CredentialsFile {
                    path: path.to_path_buf(),
                    detail: e.to_string(),
                })
            }
        };

        let mut creds = Self::default();
        for item in iter {
            let (key, value) = item.map_err(|e| PaperFigError::CredentialsFile {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;
            let value = value.trim().to_string();
            if value.is_empty() {
                continue;
            }
            match key.as_str() {
                MINERU_API_KEY => creds.mineru_api_key = Some(value),
                VISION_API_KEY => creds.vision_api_key = Some(value),
                _ => {}
            }
        }
        Ok(creds)
    }

    /// Prefer explicitly supplied keys over the ones from the file.
    pub fn with_overrides(self, mineru: Option<String>, vision: Option<String>) -> Self {
        Self {
            mineru_api_key: mineru.or(self.mineru_api_key),
            vision_api_key: vision.or(self.vision_api_key),
        }
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_requires_api_key() {
        let err = ExtractionConfig::builder().build().unwrap_err();
        assert!(matches!(err, PaperFigError::MissingCredential { .. }));
    }

    #[test]
    fn extraction_defaults_poll_forever() {
        let c = ExtractionConfig::builder().api_key("k").build().unwrap();
        assert_eq!(c.poll_interval, Duration::from_secs(30));
        assert_eq!(c.max_poll_attempts, None);
        assert_eq!(c.poll_deadline, None);
        assert_eq!(c.model_version, "vlm");
    }

    #[test]
    fn extraction_rejects_zero_attempts() {
        let err = ExtractionConfig::builder()
            .api_key("k")
            .max_poll_attempts(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, PaperFigError::InvalidConfig(_)));
    }

    #[test]
    fn extraction_rejects_zero_poll_interval() {
        let err = ExtractionConfig::builder()
            .api_key("k")
            .poll_interval(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, PaperFigError::InvalidConfig(_)));

        let err = ExtractionConfig::builder()
            .api_key("k")
            .poll_interval_secs(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, PaperFigError::InvalidConfig(_)));
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let c = ExtractionConfig::builder()
            .api_key("k")
            .api_base_url("http://localhost:9000/api/v4/")
            .build()
            .unwrap();
        assert_eq!(c.api_base_url, "http://localhost:9000/api/v4");
    }

    #[test]
    fn debug_redacts_keys() {
        let c = ExtractionConfig::builder().api_key("super-secret").build().unwrap();
        let s = format!("{c:?}");
        assert!(!s.contains("super-secret"));

        let a = AnalysisConfig::builder()
            .api_key(Some("vision-secret".into()))
            .build()
            .unwrap();
        assert!(!format!("{a:?}").contains("vision-secret"));
    }

    #[test]
    fn empty_vision_key_is_unset() {
        let a = AnalysisConfig::builder().api_key(Some("  ".into())).build().unwrap();
        assert!(a.api_key.is_none());
    }

    #[test]
    fn analysis_defaults() {
        let a = AnalysisConfig::default();
        assert_eq!(a.model, VisionModel::Qwen);
        assert_eq!(a.context_lines, 10);
        assert_eq!(a.max_tokens, 16384);
        assert_eq!(a.api_timeout_secs, 600);
        assert_eq!(a.preview_chars, 500);
    }

    #[test]
    fn model_parsing() {
        assert_eq!("kimi".parse::<VisionModel>().unwrap(), VisionModel::Kimi);
        assert_eq!(" QWEN ".parse::<VisionModel>().unwrap(), VisionModel::Qwen);
        assert!("gpt".parse::<VisionModel>().is_err());
    }

    #[test]
    fn profiles_differ_only_in_sampling() {
        let kimi = VisionModel::Kimi.profile();
        let qwen = VisionModel::Qwen.profile();
        assert_eq!(kimi.temperature, 0.3);
        assert_eq!(kimi.top_k, None);
        assert_eq!(kimi.chat_template_kwargs, json!({ "thinking": true }));
        assert_eq!(qwen.top_k, Some(20));
        assert_eq!(qwen.chat_template_kwargs, json!({ "enable_thinking": true }));
    }

    #[test]
    fn credentials_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "# keys\nMINERU_API_KEY=\"mineru-123\"\nNVIDIA_API_KEY='nv-456'\nOTHER=1\n",
        )
        .unwrap();

        let creds = Credentials::from_env_file(&path).unwrap();
        assert_eq!(creds.mineru_api_key.as_deref(), Some("mineru-123"));
        assert_eq!(creds.vision_api_key.as_deref(), Some("nv-456"));
    }

    #[test]
    fn credentials_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let creds = Credentials::from_env_file(&dir.path().join("nope.env")).unwrap();
        assert_eq!(creds, Credentials::default());
    }

    #[test]
    fn credentials_overrides_win() {
        let creds = Credentials {
            mineru_api_key: Some("file".into()),
            vision_api_key: None,
        }
        .with_overrides(Some("flag".into()), Some("nv".into()));
        assert_eq!(creds.mineru_api_key.as_deref(), Some("flag"));
        assert_eq!(creds.vision_api_key.as_deref(), Some("nv"));
    }
}
