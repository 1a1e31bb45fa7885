//! Notes agent: split OCR text into clinical notes, each with a domain.
//!
//! One LLM call per document. The sanitized text is rendered into the prompt
//! template, the format instructions are appended, and the reply is parsed
//! as a `{"notes": [{"text", "domain"}, ...]}` object.
//!
//! ## Failure policy
//!
//! [`NoteSegmenter::segment_and_classify_notes`] never returns an error. Any
//! failure (backend exhausted its retries, reply was not the expected JSON)
//! is logged at `error!` and reported as `None`; the caller decides what a
//! missing segmentation means for the request. Backend errors are retried
//! with backoff, a malformed reply is not: the same prompt at the same
//! temperature tends to produce the same malformed reply.

use crate::config::NotesAgentConfig;
use crate::error::ClassifierError;
use crate::pipeline::llm::{complete_with_retry, create_backend, CompletionBackend, LlmError};
use crate::prompts::{render_notes_prompt, DEFAULT_PROMPT_TEMPLATE};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info};

/// One clinical note found in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicalNote {
    pub text: String,
    /// Domain the LLM assigned. Informational only: the final label comes
    /// from the local domain classifier.
    pub domain: String,
}

/// The structured reply the prompt asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notes {
    pub notes: Vec<ClinicalNote>,
}

/// Why segmentation produced nothing.
#[derive(Debug, Error)]
pub enum NotesError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Could not parse notes from LLM reply: {0}")]
    Parse(String),
}

/// Segments a document's text into labelled notes.
#[async_trait]
pub trait NoteSegmenter: Send + Sync {
    async fn segment_and_classify_notes(&self, clinical_text: &str) -> Option<Vec<ClinicalNote>>;
}

/// LLM-backed [`NoteSegmenter`].
pub struct NotesAgent {
    backend: Arc<dyn CompletionBackend>,
    prompt_template: String,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl std::fmt::Debug for NotesAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotesAgent")
            .field("backend", &self.backend.name())
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl NotesAgent {
    /// Build the configured backend and wrap it.
    pub fn new(config: &NotesAgentConfig) -> Result<Self, ClassifierError> {
        let backend = create_backend(config)?;
        info!("Notes agent using {}", backend.name());
        Ok(Self::with_backend(backend, config))
    }

    pub fn with_backend(backend: Arc<dyn CompletionBackend>, config: &NotesAgentConfig) -> Self {
        Self {
            backend,
            prompt_template: config
                .prompt_template
                .clone()
                .unwrap_or_else(|| DEFAULT_PROMPT_TEMPLATE.to_string()),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    /// Segmentation with the failure cause kept.
    pub async fn try_segment(&self, clinical_text: &str) -> Result<Notes, NotesError> {
        let start = Instant::now();
        let prompt = render_notes_prompt(&self.prompt_template, clinical_text);
        let reply = complete_with_retry(
            self.backend.as_ref(),
            &prompt,
            self.max_retries,
            self.retry_backoff_ms,
        )
        .await?;
        let notes = parse_notes(&reply)?;
        debug!(
            "Segmented {} chars into {} notes in {:?}",
            clinical_text.len(),
            notes.notes.len(),
            start.elapsed()
        );
        Ok(notes)
    }
}

#[async_trait]
impl NoteSegmenter for NotesAgent {
    async fn segment_and_classify_notes(&self, clinical_text: &str) -> Option<Vec<ClinicalNote>> {
        match self.try_segment(clinical_text).await {
            Ok(notes) => Some(notes.notes),
            Err(e) => {
                error!("Note segmentation failed: {e}");
                None
            }
        }
    }
}

// ── Reply parsing ────────────────────────────────────────────────────────

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*\n?(.*?)\n?\s*```\s*$").unwrap());

/// Parse an LLM reply into [`Notes`].
///
/// Accepts a bare object, a fenced ```` ```json ```` block, or an object
/// surrounded by prose. Unknown fields are ignored; missing `text`/`domain`
/// or a missing `notes` array are errors.
pub fn parse_notes(reply: &str) -> Result<Notes, NotesError> {
    let unfenced = match RE_JSON_FENCE.captures(reply) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
        None => reply,
    };

    let start = unfenced
        .find('{')
        .ok_or_else(|| NotesError::Parse("no JSON object in reply".into()))?;
    let end = unfenced
        .rfind('}')
        .filter(|&end| end > start)
        .ok_or_else(|| NotesError::Parse("unterminated JSON object in reply".into()))?;

    serde_json::from_str(&unfenced[start..=end]).map_err(|e| NotesError::Parse(e.to_string()))
}
