//! Wire types for the Stampa HTTP API.
//!
//! Field names follow the JSON contract consumed by existing clients, which is why
//! the conversion request uses Portuguese keys.

use serde::{Deserialize, Serialize};

/// File name advertised in the `Content-Disposition` header of rendered documents.
pub const PDF_FILENAME: &str = "documento.pdf";

/// Body of `POST /` and `POST /api`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertRequest {
    /// Fully formed HTML document to render.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_final: Option<String>,
    /// Markdown text (with LaTeX math) to assemble into a document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texto_markdown: Option<String>,
    /// Optional cover image, raw base64 or a `data:` URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imagem_capa_base64: Option<String>,
}

impl ConvertRequest {
    pub fn html(html: impl Into<String>) -> Self {
        Self {
            html_final: Some(html.into()),
            ..Self::default()
        }
    }

    pub fn markdown(text: impl Into<String>, cover_base64: Option<String>) -> Self {
        Self {
            texto_markdown: Some(text.into()),
            imagem_capa_base64: cover_base64,
            ..Self::default()
        }
    }
}

/// Body of `GET /` and `GET /api`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub status: String,
    pub service: String,
    pub version: String,
    pub platform: String,
    pub endpoint: String,
}

/// Error body for rejected requests (4xx).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestErrorBody {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received: Option<Vec<String>>,
}

/// Error body for conversions that failed after the request was accepted (5xx).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureBody {
    pub error: String,
    pub details: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_deserialize_as_none() {
        let request: ConvertRequest = serde_json::from_str("{}").expect("empty object");
        assert_eq!(request, ConvertRequest::default());
    }

    #[test]
    fn received_is_omitted_when_absent() {
        let body = RequestErrorBody {
            error: "Invalid JSON".to_string(),
            message: "body must be a JSON object".to_string(),
            received: None,
        };
        let json = serde_json::to_value(&body).expect("serialize");
        assert!(json.get("received").is_none());
        assert_eq!(json["error"], "Invalid JSON");
    }
}
