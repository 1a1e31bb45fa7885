//! LLM interaction: text completion backends and the retry loop.
//!
//! The notes agent only needs "prompt in, text out". This module hides how
//! that text is obtained behind [`CompletionBackend`]:
//!
//! * [`VertexBackend`] calls Vertex AI `generateContent` directly so it can
//!   send per-request safety settings and force a JSON response MIME type,
//!   neither of which the generic provider interface exposes.
//! * [`EdgequakeBackend`] wraps any `edgequake-llm` provider (OpenAI, Gemini
//!   API, Mistral, Anthropic, Ollama, ...) selected by name.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent under
//! concurrent load. Exponential backoff (`retry_backoff_ms * 2^attempt`)
//! avoids thundering-herd: with 500 ms base and 3 retries the wait sequence
//! is 500 ms → 1 s → 2 s. A single wait never exceeds [`MAX_BACKOFF`].

use crate::config::NotesAgentConfig;
use crate::error::ClassifierError;
use crate::pipeline::credentials::{ServiceAccountTokenProvider, TokenSource};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

const VERTEX_TIMEOUT: Duration = Duration::from_secs(300);

/// Ceiling for one retry wait.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Why a completion attempt failed.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Transport(String),

    #[error("LLM API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("LLM authentication failed: {0}")]
    Auth(String),

    #[error("LLM response blocked: {0}")]
    Blocked(String),

    #[error("LLM response contained no text")]
    EmptyResponse,

    #[error("LLM provider error: {0}")]
    Provider(String),
}

/// Prompt in, raw model text out.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Build the backend named by `notes_agent.provider`.
pub fn create_backend(
    config: &NotesAgentConfig,
) -> Result<Arc<dyn CompletionBackend>, ClassifierError> {
    if config.is_vertex() {
        Ok(Arc::new(VertexBackend::from_config(config)?))
    } else {
        Ok(Arc::new(EdgequakeBackend::from_config(config)?))
    }
}

/// Wait before retry number `attempt` (1-based), capped at [`MAX_BACKOFF`].
pub fn retry_delay(retry_backoff_ms: u64, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(retry_backoff_ms.saturating_mul(factor)).min(MAX_BACKOFF)
}

/// Call `backend` with up to `max_retries` additional attempts.
///
/// Returns the last error once every attempt has failed.
pub async fn complete_with_retry(
    backend: &dyn CompletionBackend,
    prompt: &str,
    max_retries: u32,
    retry_backoff_ms: u64,
) -> Result<String, LlmError> {
    let start = Instant::now();
    let mut last_err: Option<LlmError> = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let backoff = retry_delay(retry_backoff_ms, attempt);
            warn!(
                "{}: retry {}/{} after {}ms",
                backend.name(),
                attempt,
                max_retries,
                backoff.as_millis()
            );
            sleep(backoff).await;
        }

        match backend.complete(prompt).await {
            Ok(text) => {
                debug!(
                    "{}: {} chars in {:?} ({} retries)",
                    backend.name(),
                    text.len(),
                    start.elapsed(),
                    attempt
                );
                return Ok(text);
            }
            Err(e) => {
                warn!("{}: attempt {} failed: {}", backend.name(), attempt + 1, e);
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or(LlmError::EmptyResponse))
}

// ── Vertex AI ────────────────────────────────────────────────────────────

/// Categories switched to `BLOCK_NONE`. Clinical documents routinely trip
/// the default filters.
const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: usize,
    response_mime_type: &'static str,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate.
    fn into_text(self) -> Result<String, LlmError> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(LlmError::Blocked(reason));
        }
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse)?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            let reason = candidate.finish_reason.unwrap_or_default();
            if matches!(reason.as_str(), "SAFETY" | "BLOCKLIST" | "PROHIBITED_CONTENT") {
                return Err(LlmError::Blocked(reason));
            }
            return Err(LlmError::EmptyResponse);
        }
        Ok(text)
    }
}

/// `generateContent` URL for a publisher model. The `global` region has no
/// regional host prefix.
pub fn vertex_endpoint(project: &str, region: &str, model: &str) -> String {
    let host = if region == "global" {
        "aiplatform.googleapis.com".to_string()
    } else {
        format!("{region}-aiplatform.googleapis.com")
    };
    format!(
        "https://{host}/v1/projects/{project}/locations/{region}/publishers/google/models/{model}:generateContent"
    )
}

/// Gemini on Vertex AI, authenticated with a service account.
pub struct VertexBackend {
    client: reqwest::Client,
    endpoint: String,
    temperature: f32,
    max_tokens: usize,
    tokens: Arc<dyn TokenSource>,
}

impl VertexBackend {
    pub fn new(
        endpoint: impl Into<String>,
        temperature: f32,
        max_tokens: usize,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(VERTEX_TIMEOUT)
            .build()
            .map_err(|e| ClassifierError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            temperature,
            max_tokens,
            tokens,
        })
    }

    /// Load credentials eagerly and derive the endpoint from settings.
    pub fn from_config(config: &NotesAgentConfig) -> Result<Self, ClassifierError> {
        let missing = |key: &str| ClassifierError::InvalidConfig(format!("notes_agent.{key} is required for vertex"));
        let project = config.gcp_project_id.as_deref().ok_or_else(|| missing("gcp_project_id"))?;
        let region = config.gcp_region.as_deref().ok_or_else(|| missing("gcp_region"))?;
        let credentials = config
            .gcp_credentials_path
            .as_deref()
            .ok_or_else(|| missing("gcp_credentials_path"))?;

        let tokens = ServiceAccountTokenProvider::from_file(credentials)?;
        Self::new(
            vertex_endpoint(project, region, &config.model),
            config.temperature,
            config.max_tokens,
            Arc::new(tokens),
        )
    }

    fn request<'a>(&self, prompt: &'a str) -> GenerateContentRequest<'a> {
        GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![TextPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_tokens,
                response_mime_type: "application/json",
            },
            safety_settings: SAFETY_CATEGORIES
                .into_iter()
                .map(|category| SafetySetting {
                    category,
                    threshold: "BLOCK_NONE",
                })
                .collect(),
        }
    }
}

#[async_trait]
impl CompletionBackend for VertexBackend {
    fn name(&self) -> &str {
        "vertex"
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&self.request(prompt))
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => LlmError::Auth(format!("HTTP {status}: {body}")),
                code => LlmError::Api { status: code, body },
            });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(format!("malformed response: {e}")))?;
        parsed.into_text()
    }
}

// ── edgequake-llm providers ──────────────────────────────────────────────

/// Any provider `edgequake-llm` can construct by name.
pub struct EdgequakeBackend {
    provider: Arc<dyn LLMProvider>,
    label: String,
    temperature: f32,
    max_tokens: usize,
}

impl EdgequakeBackend {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        label: impl Into<String>,
        temperature: f32,
        max_tokens: usize,
    ) -> Self {
        Self {
            provider,
            label: label.into(),
            temperature,
            max_tokens,
        }
    }

    /// Provider API keys are read from the environment by the factory
    /// (`OPENAI_API_KEY`, `GEMINI_API_KEY`, ...).
    pub fn from_config(config: &NotesAgentConfig) -> Result<Self, ClassifierError> {
        let provider = ProviderFactory::create_llm_provider(&config.provider, &config.model)
            .map_err(|e| ClassifierError::ProviderNotConfigured {
                provider: config.provider.clone(),
                hint: format!("{e}"),
            })?;
        let label = format!("{}/{}", config.provider, config.model);
        Ok(Self::new(provider, label, config.temperature, config.max_tokens))
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl CompletionBackend for EdgequakeBackend {
    fn name(&self) -> &str {
        &self.label
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let messages = vec![ChatMessage::user(prompt)];
        let response = self
            .provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| LlmError::Provider(e.to_string()))?;
        debug!(
            "{}: {} input tokens, {} output tokens",
            self.label, response.prompt_tokens, response.completion_tokens
        );
        if response.content.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(response.content)
    }
}
