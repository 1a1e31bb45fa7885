//! Classification orchestration, independent of HTTP.
//!
//! ## Two entry points
//!
//! * [`classify_documents`]: all-or-nothing. The first failing document
//!   aborts the request with [`ClassifierError::Document`].
//! * [`classify_documents_detailed`]: partial success. Every document
//!   yields its own [`DocumentOutcome`]; one failure never hides another
//!   document's labels.
//!
//! ## Flow per request
//!
//! ```text
//! uploads ──▶ OCR (concurrent, order kept) ──▶ for each text, in order:
//!                 sanitize ──▶ notes agent ──▶ predict each note ──▶ label set
//! ```
//!
//! OCR is the slow, network-bound step and documents are independent, so it
//! fans out with `buffered(ocr_concurrency)`. `buffered` (not
//! `buffer_unordered`) keeps results in upload order, so response element
//! *i* always belongs to upload *i*. Segmentation and prediction then run
//! sequentially.

use crate::config::Settings;
use crate::error::{ClassifierError, DocumentError};
use crate::output::{DocumentOutcome, Prediction};
use crate::pipeline::input::UploadedDocument;
use crate::pipeline::notes::{NoteSegmenter, NotesAgent};
use crate::pipeline::ocr::{MistralOcrClient, TextExtractor};
use crate::pipeline::predict::{DomainClassifier, DomainPredictor};
use crate::pipeline::sanitize::sanitize;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The three pipeline components, shared by every request.
#[derive(Clone)]
pub struct Services {
    pub ocr: Arc<dyn TextExtractor>,
    pub notes: Arc<dyn NoteSegmenter>,
    pub predictor: Arc<dyn DomainClassifier>,
    /// Upper bound on concurrent OCR calls per request.
    pub ocr_concurrency: usize,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("ocr_concurrency", &self.ocr_concurrency)
            .finish_non_exhaustive()
    }
}

impl Services {
    pub fn new(
        ocr: Arc<dyn TextExtractor>,
        notes: Arc<dyn NoteSegmenter>,
        predictor: Arc<dyn DomainClassifier>,
    ) -> Self {
        Self {
            ocr,
            notes,
            predictor,
            ocr_concurrency: 1,
        }
    }

    pub fn with_ocr_concurrency(mut self, n: usize) -> Self {
        self.ocr_concurrency = n.max(1);
        self
    }

    /// Construct the production components. Fails fast on unreadable
    /// artifacts, credentials or provider configuration.
    pub fn from_settings(settings: &Settings) -> Result<Self, ClassifierError> {
        let predictor = DomainPredictor::load(
            &settings.domain_predictor.model_path,
            &settings.domain_predictor.vectorizer_path,
        )?;
        let ocr = MistralOcrClient::new(&settings.ocr)?;
        let notes = NotesAgent::new(&settings.notes_agent)?;

        Ok(Self::new(Arc::new(ocr), Arc::new(notes), Arc::new(predictor))
            .with_ocr_concurrency(settings.server.ocr_concurrency))
    }
}

/// Classify every upload; any document failure fails the whole request.
///
/// Returns one [`Prediction`] per upload, in upload order.
pub async fn classify_documents(
    services: &Services,
    documents: &[UploadedDocument],
) -> Result<Vec<Prediction>, ClassifierError> {
    if documents.is_empty() {
        return Err(ClassifierError::NoDocuments);
    }
    let start = Instant::now();
    info!("Classifying {} documents", documents.len());

    let ocr_calls: Vec<_> = documents
        .iter()
        .enumerate()
        .map(|(index, doc)| {
            let ocr = Arc::clone(&services.ocr);
            async move {
                ocr.extract_text_from_pdf(doc)
                    .await
                    .map_err(|source| document_failure(index, doc, source))
            }
        })
        .collect();
    let texts: Vec<String> = stream::iter(ocr_calls)
        .buffered(services.ocr_concurrency.max(1))
        .try_collect()
        .await?;

    let mut predictions = Vec::with_capacity(documents.len());
    for (index, (doc, text)) in documents.iter().zip(&texts).enumerate() {
        let prediction = label_text(services, doc, text)
            .await
            .map_err(|source| document_failure(index, doc, source))?;
        predictions.push(prediction);
    }

    info!(
        "Classified {} documents in {}ms",
        documents.len(),
        start.elapsed().as_millis()
    );
    Ok(predictions)
}

/// Classify every upload independently.
///
/// Never fails as a whole except for an empty request; each element
/// reports success or the document's own error.
pub async fn classify_documents_detailed(
    services: &Services,
    documents: &[UploadedDocument],
) -> Result<Vec<DocumentOutcome>, ClassifierError> {
    if documents.is_empty() {
        return Err(ClassifierError::NoDocuments);
    }
    let start = Instant::now();

    let ocr_calls: Vec<_> = documents
        .iter()
        .map(|doc| {
            let ocr = Arc::clone(&services.ocr);
            async move { ocr.extract_text_from_pdf(doc).await }
        })
        .collect();
    let texts: Vec<Result<String, DocumentError>> = stream::iter(ocr_calls)
        .buffered(services.ocr_concurrency.max(1))
        .collect()
        .await;

    let mut outcomes = Vec::with_capacity(documents.len());
    for (doc, text) in documents.iter().zip(texts) {
        let result = match text {
            Ok(text) => label_text(services, doc, &text).await,
            Err(e) => Err(e),
        };
        outcomes.push(match result {
            Ok(prediction) => DocumentOutcome::ok(&doc.filename, prediction),
            Err(e) => {
                warn!("Document '{}' failed: {e}", doc.filename);
                DocumentOutcome::failed(&doc.filename, e)
            }
        });
    }

    let succeeded = outcomes.iter().filter(|o| o.is_ok()).count();
    info!(
        "Classified {}/{} documents in {}ms",
        succeeded,
        outcomes.len(),
        start.elapsed().as_millis()
    );
    Ok(outcomes)
}

/// Sanitize, segment, and predict one document's OCR text.
async fn label_text(
    services: &Services,
    doc: &UploadedDocument,
    text: &str,
) -> Result<Prediction, DocumentError> {
    let clean = sanitize(text);
    let notes = services
        .notes
        .segment_and_classify_notes(&clean)
        .await
        .ok_or(DocumentError::Segmentation)?;

    let labels = notes
        .iter()
        .map(|note| services.predictor.predict(&note.text))
        .collect::<Result<Vec<_>, _>>()?;
    let prediction: Prediction = labels.into_iter().collect();

    debug!(
        "'{}': {} notes → {:?}",
        doc.filename,
        notes.len(),
        prediction.prediction
    );
    Ok(prediction)
}

fn document_failure(index: usize, doc: &UploadedDocument, source: DocumentError) -> ClassifierError {
    ClassifierError::Document {
        index,
        filename: doc.filename.clone(),
        source,
    }
}
