use axum::Json;
use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use stampa_api_types::{FailureBody, RequestErrorBody};

use crate::application::{convert::ConversionError, document::AssemblyError, error::ErrorReport};

#[derive(Debug)]
enum ApiErrorBody {
    Request(RequestErrorBody),
    Failure(FailureBody),
}

/// Error response of the conversion API: `{error, message}` for rejected requests,
/// `{error, details}` for failed conversions.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    source: &'static str,
    body: ApiErrorBody,
}

impl ApiError {
    pub fn invalid_request(
        status: StatusCode,
        error: &'static str,
        message: impl Into<String>,
        received: Option<Vec<String>>,
    ) -> Self {
        Self {
            status,
            source: "infra::http::request",
            body: ApiErrorBody::Request(RequestErrorBody {
                error: error.to_string(),
                message: message.into(),
                received,
            }),
        }
    }

    pub fn bad_request(error: &'static str, message: impl Into<String>) -> Self {
        Self::invalid_request(StatusCode::BAD_REQUEST, error, message, None)
    }

    pub fn method_not_allowed() -> Self {
        Self::invalid_request(
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed",
            "Use POST to generate PDFs",
            None,
        )
    }

    pub fn not_found() -> Self {
        Self::invalid_request(
            StatusCode::NOT_FOUND,
            "Not found",
            "Use POST / or POST /api to generate PDFs",
            None,
        )
    }

    /// Body extraction failed before the request could be parsed; an oversized
    /// body yields 413.
    pub fn body_rejected(rejection: BytesRejection) -> Self {
        let status = rejection.status();
        let error = if status == StatusCode::PAYLOAD_TOO_LARGE {
            "Payload too large"
        } else {
            "Invalid body"
        };
        Self::invalid_request(status, error, rejection.body_text(), None)
    }

    /// The conversion task ended without producing a result.
    pub fn conversion_aborted(details: impl Into<String>) -> Self {
        Self::failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to generate PDF",
            details.into(),
        )
    }

    fn failure(status: StatusCode, error: &'static str, details: String) -> Self {
        Self {
            status,
            source: "infra::http::convert",
            body: ApiErrorBody::Failure(FailureBody {
                error: error.to_string(),
                details,
            }),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ConversionError> for ApiError {
    fn from(error: ConversionError) -> Self {
        let details = error.to_string();
        match error {
            ConversionError::InvalidSource => ApiError::bad_request("Invalid document", details),
            ConversionError::EngineUnavailable(_) => ApiError::failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to start the rendering engine",
                details,
            ),
            ConversionError::LoadTimeout(_) | ConversionError::RenderTimeout(_) => {
                ApiError::failure(
                    StatusCode::GATEWAY_TIMEOUT,
                    "Timed out rendering the content",
                    details,
                )
            }
            ConversionError::RenderFailure(_) => ApiError::failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to generate PDF",
                details,
            ),
        }
    }
}

impl From<AssemblyError> for ApiError {
    fn from(error: AssemblyError) -> Self {
        match error {
            AssemblyError::InvalidCoverImage(_) => {
                ApiError::bad_request("Invalid cover image", error.to_string())
            }
            other => ConversionError::from(other).into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let detail = match &self.body {
            ApiErrorBody::Request(body) => format!("{}: {}", body.error, body.message),
            ApiErrorBody::Failure(body) => format!("{}: {}", body.error, body.details),
        };
        let mut response = match self.body {
            ApiErrorBody::Request(body) => (self.status, Json(body)).into_response(),
            ApiErrorBody::Failure(body) => (self.status, Json(body)).into_response(),
        };
        // Attach a structured report so shared logging middleware can emit rich diagnostics.
        ErrorReport::from_message(self.source, self.status, detail).attach(&mut response);
        response
    }
}
