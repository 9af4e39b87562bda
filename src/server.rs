//! HTTP front-end: the `convertDocx` endpoint used by the CMS editor.
//!
//! ```text
//! POST /api/convertDocx   { "docx": "<base64>", "contentType"?: "…" }
//!   200 { success: true, markdown, title, imageCount, messages }
//!   4xx/5xx { success: false, error, code }
//! GET  /health
//! ```
//!
//! Per-image problems never fail the request; they come back in `messages`.
//! Only fatal [`Docx2MdError`]s produce an error status:
//!
//! | Error kind | Status |
//! |------------|--------|
//! | input (bad base64, not a .docx) | 400 |
//! | sink unavailable | 503 |
//! | other configuration / internal | 500 |

use crate::config::ConversionConfig;
use crate::convert::convert_base64;
use crate::error::{Docx2MdError, ErrorKind};
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Request body limit; base64 inflates a 35 MB document to about 47 MB.
pub const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Shared, read-only handler state.
pub type SharedConfig = Arc<ConversionConfig>;

/// Request body of `POST /api/convertDocx`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertRequest {
    /// Base64 document bytes, optionally as a `data:` URL.
    pub docx: Option<String>,
    pub content_type: Option<String>,
}

/// Successful response body.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    pub success: bool,
    pub markdown: String,
    pub title: String,
    pub image_count: usize,
    pub messages: Vec<String>,
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

/// Handler-level error: a conversion failure or a malformed request.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Conversion(Docx2MdError),
}

impl From<Docx2MdError> for ApiError {
    fn from(err: Docx2MdError) -> Self {
        ApiError::Conversion(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, error) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            ApiError::Conversion(e) => (status_for(e), e.code(), e.to_string()),
        };
        if status.is_server_error() {
            warn!("convertDocx failed ({}): {}", code, error);
        } else {
            info!("convertDocx rejected ({}): {}", code, error);
        }

        let body = ErrorResponse {
            success: false,
            error,
            code: code.to_string(),
        };
        with_cors((status, Json(body)).into_response())
    }
}

/// HTTP status for a fatal conversion error.
pub fn status_for(err: &Docx2MdError) -> StatusCode {
    match (err.kind(), err) {
        (_, Docx2MdError::SinkUnavailable { .. }) => StatusCode::SERVICE_UNAVAILABLE,
        (ErrorKind::Input, _) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Build the service router.
pub fn router(config: SharedConfig) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/convertDocx", post(convert_docx))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(config)
}

async fn health() -> Response {
    with_cors(Json(serde_json::json!({ "status": "ok" })).into_response())
}

async fn convert_docx(
    State(config): State<SharedConfig>,
    payload: Result<Json<ConvertRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let docx = request
        .docx
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("No document provided".to_string()))?;

    info!("convertDocx: received {} base64 chars", docx.len());
    let output = convert_base64(&docx, request.content_type.as_deref(), &config).await?;

    let messages = output.messages();
    let body = ConvertResponse {
        success: true,
        markdown: output.markdown,
        title: output.title,
        image_count: output.image_count,
        messages,
    };
    Ok(with_cors(Json(body).into_response()))
}

fn with_cors(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let input = Docx2MdError::InvalidDocumentFormat { detail: "x".into() };
        assert_eq!(status_for(&input), StatusCode::BAD_REQUEST);
        let b64 = Docx2MdError::InvalidBase64 { detail: "x".into() };
        assert_eq!(status_for(&b64), StatusCode::BAD_REQUEST);
        let sink = Docx2MdError::SinkUnavailable {
            sink: "azure-blob".into(),
            hint: "down".into(),
        };
        assert_eq!(status_for(&sink), StatusCode::SERVICE_UNAVAILABLE);
        let internal = Docx2MdError::Internal("boom".into());
        assert_eq!(status_for(&internal), StatusCode::INTERNAL_SERVER_ERROR);
        let config = Docx2MdError::InvalidConfig("bad".into());
        assert_eq!(status_for(&config), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn response_uses_camel_case() {
        let body = ConvertResponse {
            success: true,
            markdown: "x".into(),
            title: String::new(),
            image_count: 2,
            messages: vec![],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["imageCount"], 2);
        assert!(json.get("image_count").is_none());
    }

    #[test]
    fn request_accepts_missing_fields() {
        let req: ConvertRequest = serde_json::from_str("{}").unwrap();
        assert!(req.docx.is_none());
        let req: ConvertRequest =
            serde_json::from_str(r#"{"docx":"UEs=","contentType":"application/msword"}"#).unwrap();
        assert_eq!(req.content_type.as_deref(), Some("application/msword"));
    }
}
