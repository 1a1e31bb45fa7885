//! HTTP-level tests: the axum router driven with `oneshot` against fake
//! pipeline components. No network access.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use docu_classifier::{
    create_router, AppState, ClinicalNote, DocumentError, DomainClassifier, NoteSegmenter,
    OcrStage, Services, TextExtractor, UploadedDocument,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

// ── Fakes ────────────────────────────────────────────────────────────────────

/// The uploaded bytes are the "OCR text". Files named `broken*` fail upstream.
struct EchoOcr;

#[async_trait]
impl TextExtractor for EchoOcr {
    async fn extract_text_from_pdf(
        &self,
        document: &UploadedDocument,
    ) -> Result<String, DocumentError> {
        if document.filename.starts_with("broken") {
            return Err(DocumentError::Ocr {
                stage: OcrStage::Upload,
                detail: "HTTP 503: service unavailable".into(),
            });
        }
        Ok(String::from_utf8_lossy(&document.content).into_owned())
    }
}

/// One note per `|`-separated segment; gives up on text containing `FAIL`.
struct SplitNotes;

#[async_trait]
impl NoteSegmenter for SplitNotes {
    async fn segment_and_classify_notes(&self, text: &str) -> Option<Vec<ClinicalNote>> {
        if text.contains("FAIL") {
            return None;
        }
        Some(
            text.split('|')
                .map(|t| ClinicalNote {
                    text: t.trim().to_string(),
                    domain: String::new(),
                })
                .collect(),
        )
    }
}

/// Labels a note by its first word.
struct KeywordPredictor;

impl DomainClassifier for KeywordPredictor {
    fn predict(&self, text: &str) -> Result<String, DocumentError> {
        let label = match text.split_whitespace().next().map(str::to_lowercase).as_deref() {
            Some("mri") | Some("ct") => "Radiology",
            Some("seizure") => "Neurology",
            Some("colonoscopy") => "Gastroenterology",
            _ => "General",
        };
        Ok(label.to_string())
    }
}

fn app_with_limit(max_upload_bytes: usize) -> Router {
    let services = Services::new(Arc::new(EchoOcr), Arc::new(SplitNotes), Arc::new(KeywordPredictor))
        .with_ocr_concurrency(4);
    create_router(AppState {
        services,
        max_upload_bytes,
    })
}

fn app() -> Router {
    app_with_limit(1024 * 1024)
}

// ── Request helpers ──────────────────────────────────────────────────────────

const BOUNDARY: &str = "docu-classifier-test-boundary";

enum Part<'a> {
    File(&'a str, &'a str),
    Text(&'a str, &'a str),
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::File(filename, content) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"files\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/pdf\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(content.as_bytes());
            }
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = tokio_test::assert_ok!(to_bytes(response.into_body(), usize::MAX).await);
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

const PREDICT: &str = "/classifier/docu_predict/";
const DETAILED: &str = "/classifier/docu_predict/detailed/";

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn landing_page() {
    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let (status, body) = send(app(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "LANDING PAGE"}));
}

#[tokio::test]
async fn health_check() {
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, _) = send(app(), request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn predictions_in_submission_order() {
    let request = upload(
        PREDICT,
        &[
            Part::File("first.pdf", "seizure clinic letter"),
            Part::File("second.pdf", "MRI lumbar spine"),
        ],
    );
    let (status, body) = send(app(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([
            {"prediction": ["Neurology"]},
            {"prediction": ["Radiology"]}
        ])
    );
}

#[tokio::test]
async fn labels_are_deduplicated_per_document() {
    let request = upload(
        PREDICT,
        &[Part::File("scan.pdf", "MRI brain | CT head | seizure log")],
    );
    let (status, body) = send(app(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{"prediction": ["Neurology", "Radiology"]}]));
}

#[tokio::test]
async fn path_without_trailing_slash_is_served() {
    let request = upload(
        "/classifier/docu_predict",
        &[Part::File("scan.pdf", "colonoscopy")],
    );
    let (status, body) = send(app(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{"prediction": ["Gastroenterology"]}]));
}

#[tokio::test]
async fn segmentation_failure_is_500_with_detail() {
    let request = upload(
        PREDICT,
        &[
            Part::File("ok.pdf", "MRI"),
            Part::File("bad.pdf", "FAIL to segment"),
        ],
    );
    let (status, body) = send(app(), request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.contains("bad.pdf"), "got: {detail}");
    assert!(detail.contains("segmentation"), "got: {detail}");
}

#[tokio::test]
async fn ocr_failure_is_502() {
    let request = upload(PREDICT, &[Part::File("broken.pdf", "MRI")]);
    let (status, body) = send(app(), request).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["detail"].as_str().unwrap().contains("OCR upload failed"));
}

#[tokio::test]
async fn detailed_endpoint_reports_partial_success() {
    let request = upload(
        DETAILED,
        &[
            Part::File("a.pdf", "MRI knee"),
            Part::File("broken.pdf", "CT"),
            Part::File("c.pdf", "FAIL"),
            Part::File("d.pdf", "seizure"),
        ],
    );
    let (status, body) = send(app(), request).await;
    assert_eq!(status, StatusCode::OK);

    let outcomes = body.as_array().unwrap();
    assert_eq!(outcomes.len(), 4);
    assert_eq!(
        outcomes[0],
        json!({"filename": "a.pdf", "status": "ok", "prediction": ["Radiology"]})
    );
    assert_eq!(outcomes[1]["status"], "error");
    assert!(outcomes[1]["detail"].as_str().unwrap().contains("503"));
    assert_eq!(outcomes[2]["status"], "error");
    assert_eq!(outcomes[3]["prediction"], json!(["Neurology"]));
}

#[tokio::test]
async fn request_without_files_is_400() {
    let request = upload(PREDICT, &[Part::Text("comment", "no attachments")]);
    let (status, body) = send(app(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("No documents"));
}

#[tokio::test]
async fn non_multipart_body_is_400() {
    let request = Request::builder()
        .method(Method::POST)
        .uri(PREDICT)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"files": []}"#))
        .unwrap();
    let (status, body) = send(app(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().starts_with("Invalid upload"));
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let big = "MRI ".repeat(1024);
    let request = upload(PREDICT, &[Part::File("big.pdf", &big)]);
    let (status, body) = send(app_with_limit(512), request).await;
    assert!(status.is_client_error(), "got {status}");
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn cors_preflight_allows_any_origin_with_credentials() {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri(PREDICT)
        .header(header::ORIGIN, "https://frontend.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = app().oneshot(request).await.unwrap();
    let headers = response.headers();
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://frontend.example"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
}
