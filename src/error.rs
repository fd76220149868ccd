use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use opentelemetry::trace::TraceContextExt;
use serde_json::json;
use thiserror::Error;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::assessment::ValidationIssue;
use crate::llm::GenerationError;

const GENERATION_MESSAGE: &str =
    "We experienced a delay generating your reports. Please try again with shorter responses.";
const SERVER_MESSAGE: &str = "Failed to generate reports. Please try again shortly.";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        issues: Vec<ValidationIssue>,
    },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(issues: Vec<ValidationIssue>) -> Self {
        AppError::Validation {
            message: "Validation failed".to_string(),
            issues,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Generation(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Render(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Unparseable or mistyped bodies are client errors, never 422 or 500.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

fn get_trace_id() -> Option<String> {
    let span = Span::current();
    let context = span.context();
    let span_ref = context.span();
    let span_context = span_ref.span_context();

    if span_context.is_valid() {
        Some(span_context.trace_id().to_string())
    } else {
        None
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let mut body = match &self {
            AppError::Validation { message, issues } => json!({
                "error": message,
                "issues": issues,
                "status": status.as_u16(),
            }),
            AppError::BadRequest(msg) => json!({
                "error": msg,
                "status": status.as_u16(),
            }),
            AppError::Generation(e) => {
                tracing::error!(error = %e, "Report generation failed");
                json!({
                    "error": GENERATION_MESSAGE,
                    "status": status.as_u16(),
                })
            }
            AppError::Render(msg) => {
                tracing::error!(error = %msg, "Render error");
                json!({
                    "error": SERVER_MESSAGE,
                    "status": status.as_u16(),
                })
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                json!({
                    "error": SERVER_MESSAGE,
                    "status": status.as_u16(),
                })
            }
        };

        if let Some(trace_id) = get_trace_id() {
            body["trace_id"] = json!(trace_id);
        }

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_bad_request_error() {
        let error = AppError::BadRequest("Missing required fields".to_string());
        assert_eq!(error.to_string(), "Bad request: Missing required fields");
    }

    #[test]
    fn test_generation_error_display() {
        let error = AppError::from(GenerationError::Timeout { attempts: 2 });
        assert_eq!(
            error.to_string(),
            "Generation error: generation timed out after 2 attempt(s)"
        );
    }

    #[test]
    fn test_error_status_codes() {
        let test_cases = vec![
            (AppError::validation(vec![]), StatusCode::BAD_REQUEST),
            (
                AppError::BadRequest("test".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::Generation(GenerationError::Timeout { attempts: 2 }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::Generation(GenerationError::Failed("boom".to_string())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::Render("test".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AppError::Internal("test".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected_status) in test_cases {
            assert_eq!(error.status_code(), expected_status, "{error}");
        }
    }

    #[tokio::test]
    async fn test_validation_body_carries_issues() {
        let error = AppError::validation(vec![ValidationIssue::new(
            "ques2",
            "custom",
            "Required",
        )]);
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Validation failed");
        assert_eq!(body["status"], 400);
        assert_eq!(body["issues"][0]["path"][0], "ques2");
    }

    #[tokio::test]
    async fn test_generation_body_hides_internal_detail() {
        let response =
            AppError::Generation(GenerationError::Failed("upstream 502".to_string()))
                .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = body_json(response).await;
        assert_eq!(body["error"], GENERATION_MESSAGE);
        assert_eq!(body["status"], 503);
        assert!(!body.to_string().contains("upstream 502"));
    }
}
