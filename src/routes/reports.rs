use axum::{Json, extract::State, extract::rejection::JsonRejection};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::AppState;
use crate::assessment::{self, AssessmentAnswers, AssessmentForm, sanitize_input};
use crate::email::{ReportDelivery, spawn_delivery};
use crate::error::{AppError, AppResult};
use crate::pipeline::normalize::{client_from_value, practitioner_from_value};
use crate::pipeline::{
    ClientReport, PractitionerReport, ReportSettings, ReportsResult, generate_reports as run_pipeline,
};
use crate::render::{self, DocumentMeta, RenderError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderReportsBody {
    pub first_name: Option<String>,
    #[serde(default)]
    pub answers: Vec<String>,
    pub client_content: Option<Value>,
    pub practitioner_content: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedDocuments {
    pub client_pdf_base64: String,
    pub practitioner_pdf_base64: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentResponse {
    pub first_name: String,
    pub client_pdf_base64: String,
    pub practitioner_pdf_base64: String,
    pub email_queued: bool,
}

fn settings(state: &AppState) -> ReportSettings<'_> {
    ReportSettings {
        model: &state.config.llm_model,
        top_k: state.config.retrieval_top_k,
    }
}

/// Field rules and the registry lookup run before any external call.
fn intake(state: &AppState, body: &Value) -> AppResult<AssessmentAnswers> {
    assessment::validate(AssessmentForm::from_json(body), &state.practitioners).map_err(|issues| {
        tracing::warn!(issues = issues.len(), "Assessment rejected");
        AppError::validation(issues)
    })
}

pub async fn generate_reports(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<Json<ReportsResult>> {
    let Json(body) = payload?;
    let answers = intake(&state, &body)?;

    let result = run_pipeline(&state.llm_client, &state.retriever, settings(&state), &answers).await?;
    Ok(Json(result))
}

/// Renders previously generated content. Content that does not normalize
/// renders from the fallback structure.
pub async fn render_reports(
    payload: Result<Json<RenderReportsBody>, JsonRejection>,
) -> AppResult<Json<RenderedDocuments>> {
    let Json(body) = payload?;
    let first_name = body
        .first_name
        .as_deref()
        .map(sanitize_input)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing required fields".to_string()))?;

    let client = body
        .client_content
        .as_ref()
        .and_then(client_from_value)
        .unwrap_or_else(|| {
            tracing::warn!("Client content missing or unreadable, rendering fallback");
            ClientReport::fallback()
        });
    let practitioner = body
        .practitioner_content
        .as_ref()
        .and_then(practitioner_from_value)
        .unwrap_or_else(|| {
            tracing::warn!("Practitioner content missing or unreadable, rendering fallback");
            PractitionerReport::fallback()
        });
    let answers = body.answers.iter().map(|a| sanitize_input(a)).collect();

    let (client_pdf, practitioner_pdf) =
        render_documents(client, practitioner, answers, first_name).await?;

    Ok(Json(RenderedDocuments {
        client_pdf_base64: STANDARD.encode(client_pdf),
        practitioner_pdf_base64: STANDARD.encode(practitioner_pdf),
    }))
}

/// Full submission: validate, generate, render both documents and queue
/// delivery. Responds once the documents exist; mail goes out afterwards.
pub async fn submit_assessment(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<Json<AssessmentResponse>> {
    let Json(body) = payload?;
    let answers = intake(&state, &body)?;

    let result = run_pipeline(&state.llm_client, &state.retriever, settings(&state), &answers).await?;
    let (client_pdf, practitioner_pdf) = render_documents(
        result.client_content,
        result.practitioner_content,
        answers.answers.to_vec(),
        answers.first_name.clone(),
    )
    .await?;

    let response = AssessmentResponse {
        first_name: result.first_name,
        client_pdf_base64: STANDARD.encode(&client_pdf),
        practitioner_pdf_base64: STANDARD.encode(&practitioner_pdf),
        email_queued: true,
    };

    let practitioner_email = state
        .practitioners
        .lookup(&answers.practitioner_code)
        .map(|p| p.email.clone())
        .unwrap_or_else(|| answers.practitioner_email.clone());

    spawn_delivery(
        state.mailer.clone(),
        ReportDelivery {
            client_name: answers.first_name.clone(),
            practitioner_email: Some(practitioner_email),
            user_email: Some(answers.email.clone()),
            admin_address: state.config.email.admin_address.clone(),
            contact_address: state.config.email.contact_address.clone(),
            practitioner_pdf,
            client_pdf,
        },
    );

    Ok(Json(response))
}

/// Both documents on the blocking pool, concurrently. Returns
/// `(client, practitioner)` bytes.
async fn render_documents(
    client: ClientReport,
    practitioner: PractitionerReport,
    answers: Vec<String>,
    first_name: String,
) -> AppResult<(Vec<u8>, Vec<u8>)> {
    let generated_on = Utc::now().date_naive();
    let client_name = first_name.clone();

    let span = tracing::Span::current();
    let client_span = span.clone();
    let client_task = tokio::task::spawn_blocking(move || {
        client_span.in_scope(|| {
            render::render_client_pdf(&client, &answers, &DocumentMeta::new(&client_name, generated_on))
        })
    });
    let practitioner_task = tokio::task::spawn_blocking(move || {
        span.in_scope(|| {
            render::render_practitioner_pdf(
                &practitioner,
                &DocumentMeta::new(&first_name, generated_on),
            )
        })
    });

    tokio::try_join!(joined(client_task), joined(practitioner_task))
}

async fn joined(task: JoinHandle<Result<Vec<u8>, RenderError>>) -> AppResult<Vec<u8>> {
    task.await
        .map_err(|e| AppError::Internal(format!("render task failed: {e}")))?
        .map_err(|e| AppError::Render(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::assessment::tests::form_json;
    use crate::email::tests::RecordingMailer;
    use crate::llm::client::tests::{Scripted, ScriptedProvider};
    use crate::pipeline::normalize::tests::CLIENT_OUTPUT;
    use crate::pipeline::orchestrator::tests::{PRACTITIONER_OUTPUT, StageProvider};
    use crate::routes::tests::{post_json, post_raw, send, state, wait_for_emails};

    fn working_app(mailer: Arc<RecordingMailer>) -> axum::Router {
        let provider = Arc::new(StageProvider::new(Some(CLIENT_OUTPUT), Some(PRACTITIONER_OUTPUT)));
        crate::app(state(provider, mailer))
    }

    fn decode_pdf(value: &Value) -> Vec<u8> {
        STANDARD.decode(value.as_str().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_generate_reports_echoes_first_name() {
        let app = working_app(Arc::new(RecordingMailer::default()));
        let (status, body) = send(app, post_json("/api/generate-reports", &form_json())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["firstName"], "Maya Lin");
        assert_eq!(body["clientContent"]["questionSection"].as_array().unwrap().len(), 3);
        assert_eq!(body["practitionerContent"]["sections"][0]["type"], "itemized");
    }

    #[tokio::test]
    async fn test_duplicate_answers_are_rejected_before_generation() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let app = crate::app(state(provider.clone(), Arc::new(RecordingMailer::default())));
        let mut form = form_json();
        form["ques2"] = json!("  I FEEL LOST ");

        let (status, body) = send(app, post_json("/api/generate-reports", &form)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Validation failed");
        assert_eq!(body["issues"][0]["path"][0], "duplicateResponses");
        assert_eq!(provider.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_body_is_a_bad_request() {
        let app = working_app(Arc::new(RecordingMailer::default()));
        let (status, body) = send(app, post_raw("/api/generate-reports", "{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], 400);
    }

    #[tokio::test]
    async fn test_stalled_model_is_service_unavailable() {
        let provider = Arc::new(ScriptedProvider::new(vec![Scripted::Hang]));
        let app = crate::app(state(provider, Arc::new(RecordingMailer::default())));

        let (status, body) = send(app, post_json("/api/generate-reports", &form_json())).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], 503);
        assert!(body["error"].as_str().unwrap().contains("shorter responses"));
    }

    #[tokio::test]
    async fn test_render_reports_accepts_generated_content() {
        let app = working_app(Arc::new(RecordingMailer::default()));
        let (_, generated) = send(app.clone(), post_json("/api/generate-reports", &form_json())).await;

        let body = json!({
            "firstName": "Maya Lin",
            "answers": ["I feel lost", "lost", "Not enough", "A hike", "Procrastinating"],
            "clientContent": generated["clientContent"],
            "practitionerContent": generated["practitionerContent"],
        });
        let (status, rendered) = send(app, post_json("/api/render-reports", &body)).await;

        assert_eq!(status, StatusCode::OK);
        assert!(decode_pdf(&rendered["clientPdfBase64"]).starts_with(b"%PDF"));
        assert!(decode_pdf(&rendered["practitionerPdfBase64"]).starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_render_reports_falls_back_on_unreadable_content() {
        let app = working_app(Arc::new(RecordingMailer::default()));
        let body = json!({
            "firstName": "Maya",
            "clientContent": "not an object",
            "practitionerContent": null,
        });
        let (status, rendered) = send(app, post_json("/api/render-reports", &body)).await;

        assert_eq!(status, StatusCode::OK);
        assert!(decode_pdf(&rendered["clientPdfBase64"]).starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_render_reports_requires_first_name() {
        let app = working_app(Arc::new(RecordingMailer::default()));
        let (status, body) = send(app, post_json("/api/render-reports", &json!({"firstName": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing required fields");
    }

    #[tokio::test]
    async fn test_assessment_returns_documents_and_queues_delivery() {
        let mailer = Arc::new(RecordingMailer::default());
        let app = working_app(mailer.clone());

        let (status, body) = send(app, post_json("/api/assessments", &form_json())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["firstName"], "Maya Lin");
        assert_eq!(body["emailQueued"], true);
        assert!(decode_pdf(&body["clientPdfBase64"]).starts_with(b"%PDF"));

        let recipients = wait_for_emails(&mailer, 3).await;
        assert_eq!(
            recipients,
            vec!["coach@example.com", "maya@example.com", "admin@dreamscapeai.com"]
        );
    }
}
