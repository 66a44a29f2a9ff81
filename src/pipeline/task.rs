//! Remote extraction task: submit a document URL, then poll until the
//! service reports a terminal state.
//!
//! ## Why fixed-interval polling?
//!
//! Parsing a paper takes minutes and the service exposes no push channel.
//! The status endpoint is cheap, so a steady cadence is enough; errors while
//! polling are treated as transient and simply retried on the next tick.
//! Only the service saying `failed`, or a configured limit, ends the wait.

use crate::config::ExtractionConfig;
use crate::error::PaperFigError;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Where the finished bundle can be downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub task_id: String,
    pub full_zip_url: String,
}

/// Status reported by one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// Not terminal yet (`pending`, `running`, `converting`, …).
    InProgress(String),
    Done { full_zip_url: Option<String> },
    Failed { message: String },
}

impl TaskState {
    /// Interpret a status body in either the `{data: {...}}` or the
    /// top-level shape.
    pub fn from_body(body: &Value) -> Option<Self> {
        let data = body.get("data").filter(|d| d.is_object()).unwrap_or(body);
        let state = data.get("state")?.as_str()?;
        Some(match state {
            "done" => TaskState::Done {
                full_zip_url: data
                    .get("full_zip_url")
                    .and_then(Value::as_str)
                    .filter(|u| !u.is_empty())
                    .map(str::to_string),
            },
            "failed" => TaskState::Failed {
                message: ["err_msg", "error"]
                    .iter()
                    .filter_map(|k| data.get(*k).and_then(Value::as_str))
                    .find(|m| !m.is_empty())
                    .unwrap_or("Unknown error")
                    .to_string(),
            },
            other => TaskState::InProgress(other.to_string()),
        })
    }
}

/// Extract the task id from a submit response in either accepted shape.
pub fn task_id_from_body(body: &Value) -> Option<String> {
    let id = body
        .get("data")
        .and_then(|d| d.get("task_id"))
        .or_else(|| body.get("task_id"))?;
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Client for the extraction service's task API.
pub struct RemoteTaskClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model_version: String,
    poll_interval: Duration,
    max_poll_attempts: Option<u32>,
    poll_deadline: Option<Duration>,
}

impl RemoteTaskClient {
    pub fn new(config: &ExtractionConfig) -> Result<Self, PaperFigError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PaperFigError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.api_base_url.clone(),
            api_key: config.api_key.clone(),
            model_version: config.model_version.clone(),
            poll_interval: config.poll_interval,
            max_poll_attempts: config.max_poll_attempts,
            poll_deadline: config.poll_deadline,
        })
    }

    fn task_url(&self) -> String {
        format!("{}/extract/task", self.base_url)
    }

    /// Submit `document_url` for extraction and return the task id.
    pub async fn submit(&self, document_url: &str) -> Result<String, PaperFigError> {
        let submit_err = |reason: String| PaperFigError::SubmitFailed {
            url: document_url.to_string(),
            reason,
        };

        info!("Submitting extraction task for {}", document_url);
        let response = self
            .http
            .post(self.task_url())
            .bearer_auth(&self.api_key)
            .json(&json!({
                "url": document_url,
                "model_version": self.model_version,
            }))
            .send()
            .await
            .map_err(|e| submit_err(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| submit_err(e.to_string()))?;
        if !status.is_success() {
            return Err(submit_err(format!("HTTP {status}: {text}")));
        }

        let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        let task_id = task_id_from_body(&body).ok_or(PaperFigError::MissingTaskId { body: text })?;
        info!("Extraction task submitted: {}", task_id);
        Ok(task_id)
    }

    /// One status query. Every error here is transient for the poll loop.
    pub async fn query_status(&self, task_id: &str) -> Result<TaskState, String> {
        let response = self
            .http
            .get(format!("{}/{}", self.task_url(), task_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }
        let body: Value = response.json().await.map_err(|e| e.to_string())?;
        TaskState::from_body(&body).ok_or_else(|| format!("no state in status body: {body}"))
    }

    /// Poll until the task is `done` or `failed`, sleeping the configured
    /// interval between queries.
    ///
    /// Without `max_poll_attempts` or `poll_deadline` this never gives up on
    /// its own.
    pub async fn poll_until_terminal(&self, task_id: &str) -> Result<TaskResult, PaperFigError> {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts = attempts.saturating_add(1);
            match self.query_status(task_id).await {
                Ok(TaskState::Done {
                    full_zip_url: Some(url),
                }) => {
                    info!("Task {} done after {} polls", task_id, attempts);
                    return Ok(TaskResult {
                        task_id: task_id.to_string(),
                        full_zip_url: url,
                    });
                }
                Ok(TaskState::Done { full_zip_url: None }) => {
                    return Err(PaperFigError::MissingBundleUrl {
                        task_id: task_id.to_string(),
                    });
                }
                Ok(TaskState::Failed { message }) => {
                    return Err(PaperFigError::TaskFailed {
                        task_id: task_id.to_string(),
                        message,
                    });
                }
                Ok(TaskState::InProgress(state)) => {
                    info!("Task {} state: {}", task_id, state);
                }
                Err(reason) => {
                    warn!("Poll {} for task {} failed: {}", attempts, task_id, reason);
                }
            }

            let elapsed = started.elapsed();
            let attempts_spent = self.max_poll_attempts.is_some_and(|max| attempts >= max);
            let deadline_passed = self.poll_deadline.is_some_and(|d| elapsed >= d);
            if attempts_spent || deadline_passed {
                return Err(PaperFigError::PollLimitExceeded {
                    task_id: task_id.to_string(),
                    attempts,
                    elapsed_secs: elapsed.as_secs(),
                });
            }

            debug!("Sleeping {:?} before next poll", self.poll_interval);
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
