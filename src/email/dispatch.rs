use std::sync::Arc;

use opentelemetry::KeyValue;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::{EmailAttachment, Mailer, OutgoingEmail};
use crate::telemetry::metrics::{EMAIL_FAILED_COUNT, EMAIL_SENT_COUNT};

pub const PRACTITIONER_FILENAME: &str = "Neuro_Change_Method_Practitioner_Report.pdf";
pub const CLIENT_FILENAME: &str = "Neuro_Change_Method_Client_Assessment_Report.pdf";

const USER_SUBJECT: &str = "Your Dreamscape AI Assessment Report";
const EMAIL_STYLE: &str = "font-family: Arial, sans-serif; max-width: 600px; margin: 0; text-align: left;";

/// Everything needed to deliver one submission's documents.
#[derive(Debug, Clone)]
pub struct ReportDelivery {
    pub client_name: String,
    pub practitioner_email: Option<String>,
    pub user_email: Option<String>,
    pub admin_address: String,
    pub contact_address: String,
    pub practitioner_pdf: Vec<u8>,
    pub client_pdf: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryOutcome {
    pub success: bool,
    pub user_email_sent: bool,
}

#[derive(Debug, Clone, Copy)]
enum Recipient {
    Practitioner,
    User,
    Admin,
}

impl Recipient {
    fn as_str(self) -> &'static str {
        match self {
            Recipient::Practitioner => "practitioner",
            Recipient::User => "user",
            Recipient::Admin => "admin",
        }
    }
}

impl ReportDelivery {
    fn both_documents(&self) -> Vec<EmailAttachment> {
        vec![
            EmailAttachment::pdf(PRACTITIONER_FILENAME, &self.practitioner_pdf),
            EmailAttachment::pdf(CLIENT_FILENAME, &self.client_pdf),
        ]
    }

    fn contact_paragraph(&self) -> String {
        let contact = escape_html(&self.contact_address);
        format!(
            "<p>Please send a message to <a href=\"mailto:{contact}\" style=\"color: blue;\">{contact}</a> if you need any further information.</p>"
        )
    }

    fn practitioner_message(&self, to: &str) -> OutgoingEmail {
        let name = &self.client_name;
        OutgoingEmail {
            to: to.to_string(),
            subject: format!("DSAI Assessment Reports for {name}"),
            text: format!(
                "Dear Practitioner,\n\nAttached are the assessment reports for {name}, submitted under you."
            ),
            html: format!(
                "<div style=\"{EMAIL_STYLE}\"><p>Dear Practitioner,</p><p>Attached are the assessment reports for {}, submitted under you.</p>{}</div>",
                escape_html(name),
                self.contact_paragraph()
            ),
            attachments: self.both_documents(),
        }
    }

    fn user_message(&self, to: &str) -> OutgoingEmail {
        let name = &self.client_name;
        let thanks = "Thank you for submitting your responses through the Dreamscape AI website. \
            We're excited to share that your personalized client assessment report is attached to this email.";
        OutgoingEmail {
            to: to.to_string(),
            subject: USER_SUBJECT.to_string(),
            text: format!("Dear {name},\n\n{thanks}"),
            html: format!(
                "<div style=\"{EMAIL_STYLE}\"><p>Dear {}</p><p>{thanks}</p>\
                <p>If you have any questions or would like further support, please feel free to reach out to the certified Neuro Change Practitioner who introduced you to Dreamscape AI.</p>\
                <p>Welcome aboard - we look forward to supporting your journey!</p>\
                <p style=\"margin-top: 20px;\">Warm regards,</p></div>",
                escape_html(&format!("{name},"))
            ),
            attachments: vec![EmailAttachment::pdf(CLIENT_FILENAME, &self.client_pdf)],
        }
    }

    fn admin_message(&self) -> OutgoingEmail {
        let name = &self.client_name;
        let submitted_under = non_blank(&self.practitioner_email).unwrap_or("no practitioner");
        OutgoingEmail {
            to: self.admin_address.clone(),
            subject: format!("DSAI Assessment Reports for {name} - {submitted_under}"),
            text: format!(
                "Dear Admin,\n\nAttached are the assessment reports for {name}, submitted under {submitted_under}."
            ),
            html: format!(
                "<div style=\"{EMAIL_STYLE}\"><p>Dear Admin,</p><p>Attached are the assessment reports for {}, submitted under {}.</p>{}</div>",
                escape_html(name),
                escape_html(submitted_under),
                self.contact_paragraph()
            ),
            attachments: self.both_documents(),
        }
    }
}

/// Sends the practitioner copy, the user copy and the admin copy in that
/// order. `success` turns false when the practitioner or admin send fails;
/// the user send only affects `user_email_sent`.
#[tracing::instrument(name = "email delivery", skip_all, fields(email.recipients))]
pub async fn send_reports(mailer: &dyn Mailer, delivery: &ReportDelivery) -> DeliveryOutcome {
    let mut success = true;
    let mut user_email_sent = true;
    let mut recipients = 0;

    if let Some(to) = non_blank(&delivery.practitioner_email) {
        recipients += 1;
        if !deliver(mailer, Recipient::Practitioner, delivery.practitioner_message(to)).await {
            success = false;
        }
    }

    if let Some(to) = non_blank(&delivery.user_email) {
        recipients += 1;
        user_email_sent = deliver(mailer, Recipient::User, delivery.user_message(to)).await;
    }

    recipients += 1;
    if !deliver(mailer, Recipient::Admin, delivery.admin_message()).await {
        success = false;
    }

    tracing::Span::current().record("email.recipients", recipients);
    DeliveryOutcome {
        success,
        user_email_sent,
    }
}

/// Detaches delivery from the request. The outcome is logged here; callers
/// may drop the handle.
pub fn spawn_delivery(mailer: Arc<dyn Mailer>, delivery: ReportDelivery) -> JoinHandle<DeliveryOutcome> {
    let span = tracing::info_span!("email background");
    tokio::spawn(
        async move {
            let outcome = send_reports(&*mailer, &delivery).await;
            if outcome.success && outcome.user_email_sent {
                tracing::info!("Report delivery complete");
            } else {
                tracing::error!(
                    email.success = outcome.success,
                    email.user_sent = outcome.user_email_sent,
                    "Report delivery incomplete"
                );
            }
            outcome
        }
        .instrument(span),
    )
}

async fn deliver(mailer: &dyn Mailer, recipient: Recipient, email: OutgoingEmail) -> bool {
    let attachments = email.attachments.len();
    let ok = mailer.send(email).await;
    let attrs = [KeyValue::new("email.recipient", recipient.as_str())];
    if ok {
        EMAIL_SENT_COUNT.add(1, &attrs);
        tracing::info!(email.recipient = recipient.as_str(), email.attachments = attachments, "Email sent");
    } else {
        EMAIL_FAILED_COUNT.add(1, &attrs);
        tracing::error!(email.recipient = recipient.as_str(), "Email send failed");
    }
    ok
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
