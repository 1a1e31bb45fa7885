//! Pipeline stages for document classification.
//!
//! Each submodule implements exactly one step, behind a trait where the step
//! talks to something external, so the orchestration in [`crate::classify`]
//! can run against fakes.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ ocr ──▶ sanitize ──▶ notes ──▶ predict
//! (upload)  (Mistral) (escapes)  (LLM)    (TF-IDF + linear)
//! ```
//!
//! 1. [`input`]: buffered multipart upload (filename plus bytes)
//! 2. [`ocr`]: upload, sign and OCR the document; the text of every
//!    non-empty page joined by spaces
//! 3. [`sanitize`]: drop invalid backslash escapes, escape line breaks
//! 4. [`notes`]: one LLM call that splits the text into notes; backends
//!    and retry live in [`llm`], Vertex auth in [`credentials`]
//! 5. [`predict`]: deterministic local domain label per note

pub mod credentials;
pub mod input;
pub mod llm;
pub mod notes;
pub mod ocr;
pub mod predict;
pub mod sanitize;
