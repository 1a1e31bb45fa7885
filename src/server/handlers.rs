//! Request handlers.

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::AppState;
use crate::classify::{classify_documents, classify_documents_detailed};
use crate::error::ClassifierError;
use crate::output::{DocumentOutcome, Prediction};
use crate::pipeline::input::UploadedDocument;

/// Multipart field name the upload form uses.
const FILES_FIELD: &str = "files";

pub async fn landing() -> Json<Value> {
    Json(json!({ "message": "LANDING PAGE" }))
}

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn docu_predict(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Vec<Prediction>>, ClassifierError> {
    let documents = read_uploads(multipart).await?;
    info!("POST docu_predict: {} files", documents.len());
    let predictions = classify_documents(&state.services, &documents).await?;
    Ok(Json(predictions))
}

pub async fn docu_predict_detailed(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Vec<DocumentOutcome>>, ClassifierError> {
    let documents = read_uploads(multipart).await?;
    info!("POST docu_predict/detailed: {} files", documents.len());
    let outcomes = classify_documents_detailed(&state.services, &documents).await?;
    Ok(Json(outcomes))
}

/// Buffer every file part. A part counts as a file when it carries a
/// filename or is named `files`; other form fields are skipped.
async fn read_uploads(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Vec<UploadedDocument>, ClassifierError> {
    let mut multipart = multipart.map_err(|e| ClassifierError::InvalidUpload {
        reason: e.body_text(),
    })?;

    let mut documents = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(invalid_upload)? {
        let filename = field.file_name().map(str::to_string);
        if filename.is_none() && field.name() != Some(FILES_FIELD) {
            debug!("Skipping non-file form field {:?}", field.name());
            continue;
        }
        let content = field.bytes().await.map_err(invalid_upload)?;
        documents.push(UploadedDocument::new(
            documents.len(),
            filename.as_deref(),
            content.to_vec(),
        ));
    }

    if documents.is_empty() {
        return Err(ClassifierError::NoDocuments);
    }
    Ok(documents)
}

fn invalid_upload(e: axum::extract::multipart::MultipartError) -> ClassifierError {
    ClassifierError::InvalidUpload {
        reason: e.body_text(),
    }
}
