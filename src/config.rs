//! Configuration types for the classification service.
//!
//! All runtime behaviour is controlled through [`Settings`], read from a TOML
//! file exactly once at process start. Every section is a typed struct with
//! documented defaults; [`Settings::validate`] enumerates the required fields
//! and rejects missing or malformed values before any service is built, so a
//! bad deployment fails at boot rather than on the first request.
//!
//! [`NotesAgentConfig`] additionally has a builder, because it is the one
//! section library callers commonly construct in code (tests, embedding the
//! agent in another service).

use crate::error::ClassifierError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default config file looked up when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Complete service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub domain_predictor: DomainPredictorConfig,
    #[serde(default)]
    pub notes_agent: NotesAgentConfig,
}

impl Settings {
    /// Read, parse, apply environment overrides and validate a TOML file.
    ///
    /// Relative artifact and credential paths are resolved against the
    /// config file's directory.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ClassifierError> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            ClassifierError::InvalidConfig(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let mut settings = Self::from_toml_str(&contents)?;
        if let Some(base_dir) = path.parent() {
            settings.resolve_paths(base_dir);
        }
        let settings = settings.with_env_overrides();
        settings.validate()?;

        debug!("Loaded settings from {}: {:?}", path.display(), settings);
        Ok(settings)
    }

    /// Parse TOML without touching the environment or file system.
    pub fn from_toml_str(contents: &str) -> Result<Self, ClassifierError> {
        toml::from_str(contents)
            .map_err(|e| ClassifierError::InvalidConfig(format!("Failed to parse TOML config: {}", e)))
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `MISTRAL_API_KEY`: OCR API key
    /// - `DOCU_CLASSIFIER_HOST`: bind address
    /// - `DOCU_CLASSIFIER_PORT`: bind port
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("MISTRAL_API_KEY") {
            if !key.is_empty() {
                self.ocr.api_key = Some(key);
            }
        }
        if let Ok(host) = std::env::var("DOCU_CLASSIFIER_HOST") {
            if !host.is_empty() {
                self.server.host = host;
            }
        }
        if let Ok(port) = std::env::var("DOCU_CLASSIFIER_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        self
    }

    /// Make relative paths absolute with respect to `base_dir`.
    pub fn resolve_paths(&mut self, base_dir: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() && !p.as_os_str().is_empty() {
                *p = base_dir.join(&*p);
            }
        };
        resolve(&mut self.domain_predictor.model_path);
        resolve(&mut self.domain_predictor.vectorizer_path);
        if let Some(ref mut creds) = self.notes_agent.gcp_credentials_path {
            resolve(creds);
        }
    }

    /// Check every required field, failing on the first problem found.
    pub fn validate(&self) -> Result<(), ClassifierError> {
        self.server.validate()?;
        self.ocr.validate()?;
        self.domain_predictor.validate()?;
        self.notes_agent.validate()
    }
}

// ── [server] ─────────────────────────────────────────────────────────────

/// HTTP listener and request handling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address. Default: `0.0.0.0`.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port. Default: 8000.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted request body in bytes. Default: 50 MiB.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// How many documents are sent to the OCR provider at once. Default: 8.
    #[serde(default = "default_ocr_concurrency")]
    pub ocr_concurrency: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_ocr_concurrency() -> usize {
    8
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
            ocr_concurrency: default_ocr_concurrency(),
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<(), ClassifierError> {
        if self.host.trim().is_empty() {
            return Err(ClassifierError::InvalidConfig("server.host must not be empty".into()));
        }
        if self.ocr_concurrency == 0 {
            return Err(ClassifierError::InvalidConfig(
                "server.ocr_concurrency must be ≥ 1".into(),
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err(ClassifierError::InvalidConfig(
                "server.max_upload_bytes must be ≥ 1".into(),
            ));
        }
        Ok(())
    }
}

// ── [ocr] ────────────────────────────────────────────────────────────────

/// Mistral OCR client settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OcrConfig {
    /// API key. Required; `MISTRAL_API_KEY` overrides the file value.
    #[serde(default)]
    pub api_key: Option<String>,

    /// OCR-capable model. Default: `mistral-ocr-latest`.
    #[serde(default = "default_ocr_model")]
    pub model: String,

    /// API root. Default: `https://api.mistral.ai`.
    #[serde(default = "default_ocr_base_url")]
    pub base_url: String,

    /// Per-call HTTP timeout in seconds. Default: 120.
    #[serde(default = "default_ocr_timeout_secs")]
    pub timeout_secs: u64,

    /// Lifetime of the signed URL handed to the OCR model. Default: 24.
    #[serde(default = "default_signed_url_expiry_hours")]
    pub signed_url_expiry_hours: u32,
}

fn default_ocr_model() -> String {
    "mistral-ocr-latest".to_string()
}

fn default_ocr_base_url() -> String {
    "https://api.mistral.ai".to_string()
}

fn default_ocr_timeout_secs() -> u64 {
    120
}

fn default_signed_url_expiry_hours() -> u32 {
    24
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_ocr_model(),
            base_url: default_ocr_base_url(),
            timeout_secs: default_ocr_timeout_secs(),
            signed_url_expiry_hours: default_signed_url_expiry_hours(),
        }
    }
}

impl fmt::Debug for OcrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("signed_url_expiry_hours", &self.signed_url_expiry_hours)
            .finish()
    }
}

impl OcrConfig {
    fn validate(&self) -> Result<(), ClassifierError> {
        match self.api_key.as_deref() {
            Some(k) if !k.trim().is_empty() => {}
            _ => {
                return Err(ClassifierError::InvalidConfig(
                    "ocr.api_key is required (or set MISTRAL_API_KEY)".into(),
                ))
            }
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ClassifierError::InvalidConfig(format!(
                "ocr.base_url must be an HTTP(S) URL, got '{}'",
                self.base_url
            )));
        }
        if self.model.trim().is_empty() {
            return Err(ClassifierError::InvalidConfig("ocr.model must not be empty".into()));
        }
        if self.timeout_secs == 0 {
            return Err(ClassifierError::InvalidConfig("ocr.timeout_secs must be ≥ 1".into()));
        }
        Ok(())
    }
}

// ── [domain_predictor] ───────────────────────────────────────────────────

/// Paths to the serialized vectorizer and classifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DomainPredictorConfig {
    #[serde(default)]
    pub model_path: PathBuf,
    #[serde(default)]
    pub vectorizer_path: PathBuf,
}

impl DomainPredictorConfig {
    fn validate(&self) -> Result<(), ClassifierError> {
        require_file(&self.model_path, "domain_predictor.model_path")?;
        require_file(&self.vectorizer_path, "domain_predictor.vectorizer_path")
    }
}

// ── [notes_agent] ────────────────────────────────────────────────────────

/// LLM settings for note segmentation.
///
/// Built via [`NotesAgentConfig::builder()`] or deserialized from the
/// `[notes_agent]` table.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotesAgentConfig {
    /// `"vertex"` for Vertex AI Gemini, anything else is handed to
    /// edgequake-llm's provider factory. Default: `vertex`.
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier, e.g. `gemini-1.5-pro`. Required.
    #[serde(default)]
    pub model: String,

    /// Sampling temperature. Range 0.0–2.0. Default: 0.0.
    #[serde(default)]
    pub temperature: f32,

    /// Extra attempts after a failed LLM call. Range 0–10. Default: 3.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Output token cap per call. Default: 8192.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Google Cloud project (Vertex only).
    #[serde(default)]
    pub gcp_project_id: Option<String>,

    /// Google Cloud region, e.g. `us-central1` (Vertex only).
    #[serde(default)]
    pub gcp_region: Option<String>,

    /// Service-account JSON key file (Vertex only).
    #[serde(default)]
    pub gcp_credentials_path: Option<PathBuf>,

    /// Prompt with a `{clinical_text}` placeholder. If None, uses the
    /// built-in default from [`crate::prompts`].
    #[serde(default)]
    pub prompt_template: Option<String>,
}

/// Name of the built-in Vertex AI backend.
pub const VERTEX_PROVIDER: &str = "vertex";

fn default_provider() -> String {
    VERTEX_PROVIDER.to_string()
}

/// Upper bound accepted for `notes_agent.max_retries`.
pub const MAX_RETRIES_LIMIT: u32 = 10;

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_max_tokens() -> usize {
    8192
}

impl Default for NotesAgentConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: String::new(),
            temperature: 0.0,
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_tokens: default_max_tokens(),
            gcp_project_id: None,
            gcp_region: None,
            gcp_credentials_path: None,
            prompt_template: None,
        }
    }
}

impl fmt::Debug for NotesAgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotesAgentConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("max_tokens", &self.max_tokens)
            .field("gcp_project_id", &self.gcp_project_id)
            .field("gcp_region", &self.gcp_region)
            .field("gcp_credentials_path", &self.gcp_credentials_path)
            .field(
                "prompt_template",
                &self.prompt_template.as_ref().map(|t| format!("<{} chars>", t.len())),
            )
            .finish()
    }
}

impl NotesAgentConfig {
    /// Create a new builder for `NotesAgentConfig`.
    pub fn builder() -> NotesAgentConfigBuilder {
        NotesAgentConfigBuilder {
            config: Self::default(),
        }
    }

    /// Whether this config targets the built-in Vertex AI backend.
    pub fn is_vertex(&self) -> bool {
        self.provider.eq_ignore_ascii_case(VERTEX_PROVIDER)
    }

    fn validate(&self) -> Result<(), ClassifierError> {
        if self.provider.trim().is_empty() {
            return Err(ClassifierError::InvalidConfig(
                "notes_agent.provider must not be empty".into(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(ClassifierError::InvalidConfig("notes_agent.model is required".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ClassifierError::InvalidConfig(format!(
                "notes_agent.temperature must be 0.0–2.0, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(ClassifierError::InvalidConfig(
                "notes_agent.max_tokens must be ≥ 1".into(),
            ));
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(ClassifierError::InvalidConfig(format!(
                "notes_agent.max_retries must be ≤ {MAX_RETRIES_LIMIT}, got {}",
                self.max_retries
            )));
        }
        if let Some(ref template) = self.prompt_template {
            if !template.contains("{clinical_text}") {
                return Err(ClassifierError::InvalidConfig(
                    "notes_agent.prompt_template must contain a {clinical_text} placeholder".into(),
                ));
            }
        }
        if self.is_vertex() {
            require_value(&self.gcp_project_id, "notes_agent.gcp_project_id")?;
            require_value(&self.gcp_region, "notes_agent.gcp_region")?;
            match self.gcp_credentials_path {
                Some(ref p) => require_file(p, "notes_agent.gcp_credentials_path")?,
                None => {
                    return Err(ClassifierError::InvalidConfig(
                        "notes_agent.gcp_credentials_path is required for the vertex provider"
                            .into(),
                    ))
                }
            }
        }
        Ok(())
    }
}

/// Builder for [`NotesAgentConfig`].
#[derive(Debug)]
pub struct NotesAgentConfigBuilder {
    config: NotesAgentConfig,
}

impl NotesAgentConfigBuilder {
    pub fn provider(mut self, name: impl Into<String>) -> Self {
        self.config.provider = name.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn gcp_project_id(mut self, id: impl Into<String>) -> Self {
        self.config.gcp_project_id = Some(id.into());
        self
    }

    pub fn gcp_region(mut self, region: impl Into<String>) -> Self {
        self.config.gcp_region = Some(region.into());
        self
    }

    pub fn gcp_credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.gcp_credentials_path = Some(path.into());
        self
    }

    pub fn prompt_template(mut self, template: impl Into<String>) -> Self {
        self.config.prompt_template = Some(template.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<NotesAgentConfig, ClassifierError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn require_value(value: &Option<String>, key: &str) -> Result<(), ClassifierError> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(ClassifierError::InvalidConfig(format!("{key} is required"))),
    }
}

fn require_file(path: &Path, key: &str) -> Result<(), ClassifierError> {
    if path.as_os_str().is_empty() {
        return Err(ClassifierError::InvalidConfig(format!("{key} is required")));
    }
    if !path.is_file() {
        return Err(ClassifierError::InvalidConfig(format!(
            "{key} '{}' does not exist or is not a file",
            path.display()
        )));
    }
    Ok(())
}
