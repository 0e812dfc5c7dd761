use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use survey_mailer::MailError;
use survey_store::StoreError;

/// Failure of any surface operation. Every variant maps to one status code,
/// so handlers never fall through to a framework error page.
#[derive(Debug)]
pub enum SurveyError {
    Validation(String),
    Unauthorized,
    NotFound,
    Configuration(String),
    Storage(StoreError),
    Delivery(MailError),
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    ok: bool,
    error: String,
    code: &'static str,
}

impl SurveyError {
    pub fn status(&self) -> StatusCode {
        match self {
            SurveyError::Validation(_) | SurveyError::Configuration(_) => StatusCode::BAD_REQUEST,
            SurveyError::Unauthorized => StatusCode::UNAUTHORIZED,
            SurveyError::NotFound => StatusCode::NOT_FOUND,
            SurveyError::Storage(_) | SurveyError::Delivery(_) | SurveyError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            SurveyError::Validation(_) => "ERR_VALIDATION",
            SurveyError::Unauthorized => "ERR_UNAUTHORIZED",
            SurveyError::NotFound => "ERR_NOT_FOUND",
            SurveyError::Configuration(_) => "ERR_CONFIGURATION",
            SurveyError::Storage(_) => "ERR_STORAGE",
            SurveyError::Delivery(_) => "ERR_DELIVERY",
            SurveyError::Internal(_) => "ERR_INTERNAL",
        }
    }

    /// Message safe to return to the caller. Storage and internal detail stays in the logs.
    pub fn client_message(&self) -> String {
        match self {
            SurveyError::Validation(msg) | SurveyError::Configuration(msg) => msg.clone(),
            SurveyError::Unauthorized => "unauthorized".to_string(),
            SurveyError::NotFound => "not found".to_string(),
            SurveyError::Storage(_) => "storage failure".to_string(),
            SurveyError::Delivery(err) => format!("delivery failed: {}", err),
            SurveyError::Internal(_) => "internal error".to_string(),
        }
    }

    pub fn log(&self) {
        if self.status().is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::info!(code = self.code(), error = %self, "request rejected");
        }
    }

    pub fn into_text_response(self) -> Response {
        (
            self.status(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.client_message(),
        )
            .into_response()
    }
}

impl std::fmt::Display for SurveyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurveyError::Validation(msg) => write!(f, "validation error: {}", msg),
            SurveyError::Unauthorized => write!(f, "unauthorized"),
            SurveyError::NotFound => write!(f, "not found"),
            SurveyError::Configuration(msg) => write!(f, "configuration error: {}", msg),
            SurveyError::Storage(err) => write!(f, "{}", err),
            SurveyError::Delivery(err) => write!(f, "{}", err),
            SurveyError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for SurveyError {}

impl From<StoreError> for SurveyError {
    fn from(value: StoreError) -> Self {
        SurveyError::Storage(value)
    }
}

impl From<MailError> for SurveyError {
    fn from(value: MailError) -> Self {
        match value {
            MailError::InvalidAddress(addr) => {
                SurveyError::Validation(format!("invalid email address: {}", addr))
            }
            other => SurveyError::Delivery(other),
        }
    }
}

impl IntoResponse for SurveyError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(ErrorBody {
                ok: false,
                error: self.client_message(),
                code: self.code(),
            }),
        )
            .into_response()
    }
}
