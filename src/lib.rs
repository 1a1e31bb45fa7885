//! # docu-classifier
//!
//! Classify uploaded clinical PDF documents by medical domain.
//!
//! ## Why this crate?
//!
//! A single scanned upload often bundles several unrelated clinical notes: a
//! radiology report, a neurology letter, a discharge summary. Labelling the
//! whole file with one domain loses that. This crate OCRs each document,
//! asks an LLM to split the text into individual notes, and labels every
//! note with a locally loaded classifier, so one document can carry several
//! domains.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF upload
//!  │
//!  ├─ 1. OCR       Mistral OCR: upload, signed URL, page markdown
//!  ├─ 2. Sanitize  drop invalid backslash escapes, escape line breaks
//!  ├─ 3. Segment   one LLM call splits the text into notes
//!  ├─ 4. Predict   TF-IDF + linear model labels each note
//!  └─ 5. Output    deduplicated label set per document
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docu_classifier::{classify_documents, Services, Settings, UploadedDocument};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::load("config.toml").await?;
//!     let services = Services::from_settings(&settings)?;
//!     let upload = UploadedDocument::new(0, Some("scan.pdf"), std::fs::read("scan.pdf")?);
//!     for p in classify_documents(&services, &[upload]).await? {
//!         println!("{:?}", p.prediction);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docu-classifier` server binary (clap + anyhow + tracing-subscriber + dotenvy) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod classify;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use classify::{classify_documents, classify_documents_detailed, Services};
pub use config::{NotesAgentConfig, NotesAgentConfigBuilder, Settings};
pub use error::{ClassifierError, DocumentError, OcrStage};
pub use output::{DocumentOutcome, OutcomeStatus, Prediction};
pub use pipeline::input::UploadedDocument;
pub use pipeline::notes::{ClinicalNote, NoteSegmenter, NotesAgent};
pub use pipeline::ocr::{MistralOcrClient, TextExtractor};
pub use pipeline::predict::{DomainClassifier, DomainPredictor};
pub use server::{create_router, AppState};
