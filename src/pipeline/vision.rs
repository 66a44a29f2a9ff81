//! Vision-model client: one figure plus its context in, one analysis out.
//!
//! ## Why a trait?
//!
//! The batch runner only needs "analyse this image with this prompt". Putting
//! that behind [`VisionClient`] lets tests drive the runner with scripted
//! outcomes and lets other OpenAI-compatible providers plug in without
//! touching the checkpoint loop.
//!
//! ## Why not a generic LLM SDK?
//!
//! Both supported models need sampling knobs (`top_k`, `repetition_penalty`,
//! `chat_template_kwargs`) that typed provider SDKs do not expose. The
//! request is a plain OpenAI chat-completions body, so a small `reqwest`
//! client built on serde structs covers it.

use crate::config::{AnalysisConfig, SamplingProfile};
use crate::error::VisionError;
use crate::pipeline::encode::{mime_type, to_data_uri};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// One figure to analyse.
#[derive(Debug, Clone, Copy)]
pub struct VisionRequest<'a> {
    pub image_path: &'a Path,
    pub image_bytes: &'a [u8],
    pub prompt: &'a str,
}

/// Anything that can turn a figure and a prompt into text.
#[async_trait]
pub trait VisionClient: Send + Sync {
    async fn analyze(&self, request: VisionRequest<'_>) -> Result<String, VisionError>;
}

// ── OpenAI-compatible wire format ────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: usize,
    #[serde(flatten)]
    sampling: &'a SamplingProfile,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

// ── Client ───────────────────────────────────────────────────────────────

/// Default [`VisionClient`] speaking the chat-completions protocol.
#[derive(Clone, Debug)]
pub struct ChatCompletionsVisionClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: &'static str,
    sampling: SamplingProfile,
    max_tokens: usize,
    timeout_secs: u64,
}

impl ChatCompletionsVisionClient {
    /// Build a client for `config.model`. `api_key` must be present.
    pub fn new(config: &AnalysisConfig, api_key: impl Into<String>) -> Result<Self, VisionError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| VisionError::Http {
                detail: e.to_string(),
            })?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key: api_key.into(),
            model: config.model.full_name(),
            sampling: config.model.profile(),
            max_tokens: config.max_tokens,
            timeout_secs: config.api_timeout_secs,
        })
    }

    fn request_body<'a>(&'a self, request: &VisionRequest<'_>) -> ChatRequest<'a> {
        let uri = to_data_uri(request.image_bytes, mime_type(request.image_path));
        ChatRequest {
            model: self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: request.prompt.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: uri },
                    },
                ],
            }],
            max_tokens: self.max_tokens,
            sampling: &self.sampling,
            stream: false,
        }
    }
}

#[async_trait]
impl VisionClient for ChatCompletionsVisionClient {
    async fn analyze(&self, request: VisionRequest<'_>) -> Result<String, VisionError> {
        let body = self.request_body(&request);
        debug!(
            "Calling {} for {} ({} bytes)",
            self.model,
            request.image_path.display(),
            request.image_bytes.len()
        );

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VisionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| self.transport_error(e))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(VisionError::EmptyResponse)
    }
}

impl ChatCompletionsVisionClient {
    fn transport_error(&self, e: reqwest::Error) -> VisionError {
        if e.is_timeout() {
            VisionError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            VisionError::Http {
                detail: e.to_string(),
            }
        }
    }
}
