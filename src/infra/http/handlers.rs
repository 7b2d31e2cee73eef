use axum::{
    Json,
    body::Body,
    extract::{State, rejection::BytesRejection},
    http::{
        HeaderValue, StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::Response,
};
use bytes::Bytes;
use serde_json::Value;
use stampa_api_types::{ConvertRequest, ServiceStatus};

use crate::application::document::{CoverImage, DocumentSource};

use super::{HttpState, error::ApiError};

pub(crate) const PDF_CONTENT_TYPE: &str = "application/pdf";
pub(crate) const PDF_CONTENT_DISPOSITION: &str = "attachment; filename=\"documento.pdf\"";

pub(super) async fn service_status(State(state): State<HttpState>) -> Json<ServiceStatus> {
    Json(ServiceStatus {
        status: "online".to_string(),
        service: state.service.name.clone(),
        version: state.service.version.clone(),
        platform: state.service.platform.clone(),
        endpoint: "POST / or POST /api with {\"html_final\": \"<html>...\"} or {\"texto_markdown\": \"...\", \"imagem_capa_base64\": \"...\"}".to_string(),
    })
}

pub(super) async fn convert_document(
    State(state): State<HttpState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let body = body.map_err(ApiError::body_rejected)?;
    let source = parse_convert_request(&body)?;

    // Detached so the session is still released when the client disconnects
    // and this handler future is dropped.
    let converter = state.converter.clone();
    let page = state.page;
    let pdf = tokio::spawn(async move { converter.convert(&source, &page).await })
        .await
        .map_err(|err| ApiError::conversion_aborted(format!("conversion task failed: {err}")))??;
    Ok(pdf_response(pdf))
}

pub(super) async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed()
}

pub(super) async fn not_found() -> ApiError {
    ApiError::not_found()
}

/// Decode a conversion request body into a document source.
///
/// `html_final` wins over `texto_markdown`; blank strings count as absent.
pub fn parse_convert_request(body: &[u8]) -> Result<DocumentSource, ApiError> {
    let value: Value = serde_json::from_slice(body).map_err(|err| {
        ApiError::bad_request(
            "Invalid JSON",
            format!("Request body must be valid JSON: {err}"),
        )
    })?;
    let Value::Object(fields) = value else {
        return Err(ApiError::bad_request(
            "Invalid JSON",
            "Request body must be a JSON object",
        ));
    };
    let received: Vec<String> = fields.keys().cloned().collect();

    let request: ConvertRequest = serde_json::from_value(Value::Object(fields))
        .map_err(|err| ApiError::bad_request("Invalid data", err.to_string()))?;

    if let Some(html) = non_blank(request.html_final) {
        return Ok(DocumentSource::html(html));
    }

    if let Some(text) = non_blank(request.texto_markdown) {
        let cover = non_blank(request.imagem_capa_base64)
            .map(|encoded| CoverImage::from_base64(&encoded))
            .transpose()?;
        return Ok(DocumentSource::markdown(text, cover));
    }

    Err(ApiError::invalid_request(
        StatusCode::BAD_REQUEST,
        "Invalid data",
        "The \"html_final\" field (or \"texto_markdown\") is required",
        Some(received),
    ))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

fn pdf_response(pdf: Bytes) -> Response {
    let length = pdf.len();
    let mut response = Response::new(Body::from(pdf));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(PDF_CONTENT_TYPE));
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_static(PDF_CONTENT_DISPOSITION),
    );
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    response
}
