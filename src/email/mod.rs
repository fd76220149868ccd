//! Outbound mail. Delivery is best effort: a `Mailer` reports success as a
//! boolean and never returns an error to its caller.

pub mod dispatch;
pub mod smtp;

pub use dispatch::{DeliveryOutcome, ReportDelivery, send_reports, spawn_delivery};
pub use smtp::SmtpMailer;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Debug, Clone, PartialEq)]
pub struct EmailAttachment {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl EmailAttachment {
    pub fn pdf(filename: &str, bytes: &[u8]) -> Self {
        Self {
            filename: filename.to_string(),
            content_type: PDF_CONTENT_TYPE,
            bytes: bytes.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
    pub attachments: Vec<EmailAttachment>,
}

#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    /// `true` once the relay accepted the message.
    async fn send(&self, email: OutgoingEmail) -> bool;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Records every message; sends to addresses in `failing` report failure.
    #[derive(Default)]
    pub(crate) struct RecordingMailer {
        pub sent: Mutex<Vec<OutgoingEmail>>,
        pub failing: HashSet<String>,
    }

    impl RecordingMailer {
        pub(crate) fn failing_for(addresses: &[&str]) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                failing: addresses.iter().map(|a| a.to_string()).collect(),
            }
        }

        pub(crate) fn recipients(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|email| email.to.clone())
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: OutgoingEmail) -> bool {
            let ok = !self.failing.contains(&email.to);
            self.sent.lock().unwrap().push(email);
            ok
        }
    }

    #[test]
    fn test_pdf_attachment() {
        let attachment = EmailAttachment::pdf("Report.pdf", b"%PDF-1.3");
        assert_eq!(attachment.content_type, "application/pdf");
        assert_eq!(attachment.bytes, b"%PDF-1.3");
    }
}
