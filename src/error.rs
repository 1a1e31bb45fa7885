//! Error types for the docu-classifier library.
//!
//! Two distinct error types reflect two distinct failure scopes:
//!
//! * [`ClassifierError`]: **Request-fatal**: the request cannot produce its
//!   all-or-nothing response (no files uploaded, a document failed while the
//!   caller asked for every document, configuration or artifacts unusable).
//!   Returned as `Err(ClassifierError)` from the orchestration entry points
//!   and mapped to an HTTP status by [`ClassifierError::status_code`].
//!
//! * [`DocumentError`]: **Document-scoped**: one document could not be
//!   processed (OCR upstream failure, the notes agent produced nothing, the
//!   classifier rejected a note). Stored inside
//!   [`crate::output::DocumentOutcome`] by the detailed endpoint so callers
//!   keep the documents that did succeed.

use axum::http::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// All request-fatal errors returned by the docu-classifier library.
///
/// Document-level failures use [`DocumentError`] and are wrapped in
/// [`ClassifierError::Document`] only when the caller asked for
/// all-or-nothing semantics.
#[derive(Debug, Error)]
pub enum ClassifierError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The request carried no file parts.
    #[error("No documents uploaded: expected one or more multipart file parts")]
    NoDocuments,

    /// The multipart body could not be read.
    #[error("Invalid upload: {reason}")]
    InvalidUpload { reason: String },

    // ── Document errors ───────────────────────────────────────────────────
    /// A single document failed and aborted the whole request.
    #[error("Document {index} ('{filename}') failed: {source}")]
    Document {
        index: usize,
        filename: String,
        #[source]
        source: DocumentError,
    },

    // ── Artifact errors ───────────────────────────────────────────────────
    /// A serialized model artifact is missing or malformed.
    #[error("Model artifact '{path}' is unusable: {detail}")]
    Artifact { path: PathBuf, detail: String },

    /// Credentials for the LLM provider could not be loaded.
    #[error("Credentials '{path}' are unusable: {detail}")]
    Credentials { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Settings validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configured LLM provider could not be initialised.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClassifierError {
    /// HTTP status for this error when it ends a request.
    ///
    /// | Failure | Status |
    /// |---------|--------|
    /// | malformed input | 400 |
    /// | upstream OCR provider | 502 |
    /// | notes agent produced nothing | 500 |
    /// | artifacts, config, internal | 500 |
    pub fn status_code(&self) -> StatusCode {
        match self {
            ClassifierError::NoDocuments | ClassifierError::InvalidUpload { .. } => {
                StatusCode::BAD_REQUEST
            }
            ClassifierError::Document { source, .. } => source.status_code(),
            ClassifierError::Artifact { .. }
            | ClassifierError::Credentials { .. }
            | ClassifierError::InvalidConfig(_)
            | ClassifierError::ProviderNotConfigured { .. }
            | ClassifierError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A failure confined to one document.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum DocumentError {
    /// The OCR provider rejected or failed a call.
    #[error("OCR {stage} failed: {detail}")]
    Ocr { stage: OcrStage, detail: String },

    /// The notes agent could not segment the text.
    #[error("Note segmentation returned no result")]
    Segmentation,

    /// The domain classifier could not label a note.
    #[error("Domain prediction failed: {detail}")]
    Prediction { detail: String },
}

impl DocumentError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DocumentError::Ocr { .. } => StatusCode::BAD_GATEWAY,
            DocumentError::Segmentation | DocumentError::Prediction { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Which of the three OCR provider calls failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrStage {
    Upload,
    SignedUrl,
    Process,
}

impl std::fmt::Display for OcrStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OcrStage::Upload => "upload",
            OcrStage::SignedUrl => "signed URL",
            OcrStage::Process => "processing",
        })
    }
}
