//! AI reasoning service client.
//!
//! The service is treated as an unreliable, higher-latency oracle: every call
//! carries a timeout, a malformed or absent confidence is read as 0.5 by the
//! caller, and any error is "lane unavailable" — never an ingestion failure.
//! `LaneState` tracks availability explicitly so fusion logic branches
//! deterministically between "both lanes" and "pattern-only".

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AiConfig;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("cannot reach reasoning service at {0}")]
    Connection(String),

    #[error("reasoning request timed out after {0}s")]
    Timeout(u64),

    #[error("reasoning service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("malformed reasoning response: {0}")]
    MalformedResponse(String),
}

impl From<ReasoningError> for crate::error::EngineError {
    fn from(error: ReasoningError) -> Self {
        crate::error::EngineError::TransientExternal(error.to_string())
    }
}

// ---------------------------------------------------------------------------
// Request/response model
// ---------------------------------------------------------------------------

/// The task sent alongside an excerpt.
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    pub instruction: String,
}

impl TaskDescriptor {
    /// Category-classification task for violation detection.
    pub fn violation_classification() -> Self {
        Self {
            instruction: "Identify procedural, constitutional, due-process, CPS-specific, or \
                          custody violations in the excerpt. For each finding report the \
                          category label, the exact quote it rests on, a confidence between \
                          0 and 1, and a one-sentence rationale."
                .into(),
        }
    }
}

/// One finding in the service's structured judgment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningFinding {
    pub label: String,
    #[serde(default)]
    pub quote: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub rationale: Option<String>,
}

/// The structured judgment returned for one excerpt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasoningJudgment {
    #[serde(default)]
    pub findings: Vec<ReasoningFinding>,
}

/// Parse the model's raw text output into a judgment.
pub fn parse_judgment(raw: &str) -> Result<ReasoningJudgment, ReasoningError> {
    serde_json::from_str(raw.trim())
        .map_err(|e| ReasoningError::MalformedResponse(format!("{e}: {}", truncate(raw, 120))))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ---------------------------------------------------------------------------
// Service trait
// ---------------------------------------------------------------------------

/// Seam between the detection engine and the reasoning backend; tests plug
/// in a scripted implementation here.
pub trait ReasoningService: Send + Sync {
    fn classify(
        &self,
        excerpt: &str,
        task: &TaskDescriptor,
    ) -> Result<ReasoningJudgment, ReasoningError>;
}

// ---------------------------------------------------------------------------
// HTTP client (Ollama-compatible)
// ---------------------------------------------------------------------------

const SYSTEM_PROMPT: &str = "You are a legal analyst specializing in identifying procedural \
violations and constitutional issues in family court and child welfare cases. Respond with a \
single JSON object: {\"findings\": [{\"label\": ..., \"quote\": ..., \"confidence\": ..., \
\"rationale\": ...}]}. Valid labels: constitutional, due-process, procedural, cps-specific, \
custody. Report nothing else.";

/// Blocking HTTP client for a local Ollama-compatible reasoning service.
pub struct HttpReasoningClient {
    base_url: String,
    model: String,
    timeout_secs: u64,
    client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    format: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl HttpReasoningClient {
    pub fn new(config: &AiConfig) -> Result<Self, ReasoningError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ReasoningError::Connection(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl ReasoningService for HttpReasoningClient {
    fn classify(
        &self,
        excerpt: &str,
        task: &TaskDescriptor,
    ) -> Result<ReasoningJudgment, ReasoningError> {
        let url = format!("{}/api/generate", self.base_url);
        let prompt = format!("{}\n\nDocument excerpt:\n{excerpt}", task.instruction);
        let body = GenerateRequest {
            model: &self.model,
            prompt: &prompt,
            system: SYSTEM_PROMPT,
            stream: false,
            format: "json",
        };

        let response = self.client.post(&url).json(&body).send().map_err(|e| {
            if e.is_connect() {
                ReasoningError::Connection(self.base_url.clone())
            } else if e.is_timeout() {
                ReasoningError::Timeout(self.timeout_secs)
            } else {
                ReasoningError::Connection(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ReasoningError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| ReasoningError::MalformedResponse(e.to_string()))?;

        parse_judgment(&parsed.response)
    }
}

// ---------------------------------------------------------------------------
// LaneState
// ---------------------------------------------------------------------------

/// Circuit-breaker state for the AI-assisted lane.
#[derive(Debug, Clone)]
pub struct LaneState {
    enabled: bool,
    consecutive_failures: u32,
    failure_threshold: u32,
}

impl LaneState {
    pub fn new(enabled: bool, failure_threshold: u32) -> Self {
        Self {
            enabled,
            consecutive_failures: 0,
            failure_threshold: failure_threshold.max(1),
        }
    }

    /// Whether the lane should be attempted at all.
    pub fn available(&self) -> bool {
        self.enabled && self.consecutive_failures < self.failure_threshold
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if !self.available() && self.enabled {
            tracing::warn!(
                failures = self.consecutive_failures,
                "AI lane circuit opened; detection degrades to pattern-only"
            );
        }
    }
}
