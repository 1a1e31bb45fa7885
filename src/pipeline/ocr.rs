//! OCR client: Mistral document OCR over its REST API.
//!
//! ## Call sequence
//!
//! ```text
//! POST /v1/files            (multipart, purpose=ocr)  → { id }
//! GET  /v1/files/{id}/url   (?expiry=hours)           → { url }
//! POST /v1/ocr              (document_url = url)      → { pages: [{ markdown }] }
//! ```
//!
//! The OCR model reads the document through a time-limited signed URL rather
//! than an inline payload, so the upload happens once and the processing
//! request stays small. Each call is independent: no state is shared between
//! documents and nothing is retried here; any failure surfaces as a
//! [`DocumentError::Ocr`] naming the stage that failed.

use crate::config::OcrConfig;
use crate::error::{ClassifierError, DocumentError, OcrStage};
use crate::pipeline::input::UploadedDocument;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Extracts the full text of one uploaded document.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text_from_pdf(&self, document: &UploadedDocument)
        -> Result<String, DocumentError>;
}

/// Mistral OCR API client.
pub struct MistralOcrClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    signed_url_expiry_hours: u32,
}

impl std::fmt::Debug for MistralOcrClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MistralOcrClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct UploadedFile {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SignedUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct OcrRequest<'a> {
    model: &'a str,
    document: DocumentUrl<'a>,
}

#[derive(Debug, Serialize)]
struct DocumentUrl<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    document_url: &'a str,
}

/// Body of a `/v1/ocr` response. Only the page text is consumed.
#[derive(Debug, Default, Deserialize)]
pub struct OcrResponse {
    #[serde(default)]
    pub pages: Option<Vec<OcrPage>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OcrPage {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub markdown: Option<String>,
}

impl OcrResponse {
    /// Non-empty page markdown joined by a single space; `""` when the
    /// response carries no page structure.
    pub fn full_text(&self) -> String {
        match self.pages {
            Some(ref pages) => pages
                .iter()
                .filter_map(|p| p.markdown.as_deref())
                .filter(|md| !md.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
            None => String::new(),
        }
    }
}

// ── Client ───────────────────────────────────────────────────────────────

impl MistralOcrClient {
    /// Create a client from validated settings.
    pub fn new(config: &OcrConfig) -> Result<Self, ClassifierError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ClassifierError::InvalidConfig("ocr.api_key is required".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ClassifierError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            signed_url_expiry_hours: config.signed_url_expiry_hours,
        })
    }

    async fn upload(&self, document: &UploadedDocument) -> Result<String, DocumentError> {
        let part = Part::bytes(document.content.clone())
            .file_name(document.filename.clone())
            .mime_str("application/pdf")
            .map_err(|e| ocr_error(OcrStage::Upload, e))?;
        let form = Form::new().text("purpose", "ocr").part("file", part);

        let response = self
            .client
            .post(format!("{}/v1/files", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ocr_error(OcrStage::Upload, e))?;

        let uploaded: UploadedFile = read_json(response, OcrStage::Upload).await?;
        debug!("Uploaded '{}' as file {}", document.filename, uploaded.id);
        Ok(uploaded.id)
    }

    async fn signed_url(&self, file_id: &str) -> Result<String, DocumentError> {
        let response = self
            .client
            .get(format!("{}/v1/files/{}/url", self.base_url, file_id))
            .query(&[("expiry", self.signed_url_expiry_hours)])
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ocr_error(OcrStage::SignedUrl, e))?;

        let signed: SignedUrl = read_json(response, OcrStage::SignedUrl).await?;
        Ok(signed.url)
    }

    async fn process(&self, document_url: &str) -> Result<OcrResponse, DocumentError> {
        let request = OcrRequest {
            model: &self.model,
            document: DocumentUrl {
                kind: "document_url",
                document_url,
            },
        };

        let response = self
            .client
            .post(format!("{}/v1/ocr", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ocr_error(OcrStage::Process, e))?;

        read_json(response, OcrStage::Process).await
    }
}

#[async_trait]
impl TextExtractor for MistralOcrClient {
    async fn extract_text_from_pdf(
        &self,
        document: &UploadedDocument,
    ) -> Result<String, DocumentError> {
        let start = Instant::now();
        let file_id = self.upload(document).await?;
        let url = self.signed_url(&file_id).await?;
        let ocr = self.process(&url).await?;
        let text = ocr.full_text();

        info!(
            "OCR '{}': {} pages, {} chars in {}ms",
            document.filename,
            ocr.pages.as_ref().map_or(0, Vec::len),
            text.len(),
            start.elapsed().as_millis()
        );
        Ok(text)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn ocr_error(stage: OcrStage, e: impl std::fmt::Display) -> DocumentError {
    DocumentError::Ocr {
        stage,
        detail: e.to_string(),
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    stage: OcrStage,
) -> Result<T, DocumentError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ocr_error(stage, format!("HTTP {status}: {body}")));
    }
    response.json().await.map_err(|e| ocr_error(stage, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Multipart, Path, Query};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn joins_non_empty_pages_with_space() {
        let resp: OcrResponse = serde_json::from_value(json!({
            "pages": [
                {"index": 0, "markdown": "Hello"},
                {"index": 1, "markdown": ""},
                {"index": 2, "markdown": "World"}
            ]
        }))
        .unwrap();
        assert_eq!(resp.full_text(), "Hello World");
    }

    #[test]
    fn missing_pages_yields_empty_text() {
        let resp: OcrResponse = serde_json::from_value(json!({"model": "mistral-ocr-latest"})).unwrap();
        assert_eq!(resp.full_text(), "");
    }

    #[test]
    fn request_body_shape() {
        let req = OcrRequest {
            model: "mistral-ocr-latest",
            document: DocumentUrl {
                kind: "document_url",
                document_url: "https://signed/abc",
            },
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "model": "mistral-ocr-latest",
                "document": {"type": "document_url", "document_url": "https://signed/abc"}
            })
        );
    }

    #[test]
    fn new_requires_api_key() {
        let err = MistralOcrClient::new(&OcrConfig::default()).unwrap_err();
        assert!(err.to_string().contains("api_key"), "got: {err}");
    }

    /// Serve a minimal imitation of the three Mistral endpoints.
    async fn fake_mistral(ocr_status: u16) -> String {
        async fn upload(mut multipart: Multipart) -> Json<serde_json::Value> {
            let mut purpose = String::new();
            let mut filename = String::new();
            while let Some(field) = multipart.next_field().await.unwrap() {
                match field.name() {
                    Some("purpose") => purpose = field.text().await.unwrap(),
                    Some("file") => {
                        filename = field.file_name().unwrap_or_default().to_string();
                        let _ = field.bytes().await.unwrap();
                    }
                    _ => {}
                }
            }
            assert_eq!(purpose, "ocr");
            Json(json!({"id": format!("file-{filename}")}))
        }

        async fn signed(
            Path(id): Path<String>,
            Query(q): Query<HashMap<String, String>>,
        ) -> Json<serde_json::Value> {
            assert_eq!(q.get("expiry").map(String::as_str), Some("24"));
            Json(json!({"url": format!("https://signed.example/{id}")}))
        }

        let ocr = move |Json(body): Json<serde_json::Value>| async move {
            let code = axum::http::StatusCode::from_u16(ocr_status).unwrap();
            if !code.is_success() {
                return (code, Json(json!({"message": "quota exceeded"})));
            }
            assert_eq!(body["model"], "mistral-ocr-latest");
            let url = body["document"]["document_url"].as_str().unwrap().to_string();
            (
                code,
                Json(json!({"pages": [
                    {"index": 0, "markdown": format!("Read from {url}")},
                    {"index": 1, "markdown": ""},
                    {"index": 2, "markdown": "Impression: normal."}
                ]})),
            )
        };

        let app = Router::new()
            .route("/v1/files", post(upload))
            .route("/v1/files/:id/url", get(signed))
            .route("/v1/ocr", post(ocr));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client_for(base_url: String) -> MistralOcrClient {
        MistralOcrClient::new(&OcrConfig {
            api_key: Some("test-key".into()),
            base_url,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn extracts_text_through_all_three_calls() {
        let client = client_for(fake_mistral(200).await);
        let doc = UploadedDocument::new(0, Some("scan.pdf"), b"%PDF-1.7 body".to_vec());
        let text = client.extract_text_from_pdf(&doc).await.expect("OCR should succeed");
        assert_eq!(
            text,
            "Read from https://signed.example/file-scan.pdf Impression: normal."
        );
    }

    #[tokio::test]
    async fn provider_error_names_the_stage() {
        let client = client_for(fake_mistral(429).await);
        let doc = UploadedDocument::new(0, Some("scan.pdf"), b"%PDF-1.7".to_vec());
        let err = client.extract_text_from_pdf(&doc).await.unwrap_err();
        match err {
            DocumentError::Ocr { stage, detail } => {
                assert_eq!(stage, OcrStage::Process);
                assert!(detail.contains("429"), "got: {detail}");
                assert!(detail.contains("quota exceeded"), "got: {detail}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
