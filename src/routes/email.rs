use axum::{Json, extract::State, extract::rejection::JsonRejection};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::Deserialize;

use crate::AppState;
use crate::email::{DeliveryOutcome, ReportDelivery, spawn_delivery};
use crate::error::{AppError, AppResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReportsBody {
    pub practitioner_email: Option<String>,
    pub first_name: Option<String>,
    pub practitioner_pdf_base64: Option<String>,
    pub client_pdf_base64: Option<String>,
    pub user_email: Option<String>,
}

fn required(value: &Option<String>) -> AppResult<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing required fields".to_string()))
}

fn decode_pdf(field: &str, encoded: &str) -> AppResult<Vec<u8>> {
    STANDARD.decode(encoded).map_err(|e| {
        tracing::warn!(field, error = %e, "Attachment is not valid base64");
        AppError::BadRequest(format!("{field} is not valid base64"))
    })
}

/// Accepts already rendered documents and answers before any mail is sent.
/// The reported outcome is optimistic; actual failures are only logged.
pub async fn send_practitioner_email(
    State(state): State<AppState>,
    payload: Result<Json<SendReportsBody>, JsonRejection>,
) -> AppResult<Json<DeliveryOutcome>> {
    let Json(body) = payload?;

    let first_name = required(&body.first_name)?.to_string();
    let practitioner_pdf = decode_pdf(
        "practitionerPdfBase64",
        required(&body.practitioner_pdf_base64)?,
    )?;
    let client_pdf = decode_pdf("clientPdfBase64", required(&body.client_pdf_base64)?)?;

    spawn_delivery(
        state.mailer.clone(),
        ReportDelivery {
            client_name: first_name,
            practitioner_email: body.practitioner_email,
            user_email: body.user_email,
            admin_address: state.config.email.admin_address.clone(),
            contact_address: state.config.email.contact_address.clone(),
            practitioner_pdf,
            client_pdf,
        },
    );

    Ok(Json(DeliveryOutcome {
        success: true,
        user_email_sent: true,
    }))
}
