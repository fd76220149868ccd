//! PDF documents for both audiences. Each template builds a `Layout` first;
//! `pdf::paint` only turns finished pages into bytes.

pub mod client;
pub mod fonts;
pub mod layout;
pub mod pdf;
pub mod practitioner;
pub mod sanitize;

use std::time::Instant;

use chrono::NaiveDate;
use opentelemetry::KeyValue;
use thiserror::Error;

use crate::pipeline::{ClientReport, PractitionerReport};
use crate::telemetry::metrics::{PDF_PAGES, PDF_RENDER_DURATION};

use layout::Layout;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("font unavailable: {0}")]
    Font(String),

    #[error("failed to encode PDF: {0}")]
    Encode(String),
}

/// Per-document values that are not part of the report itself.
#[derive(Debug, Clone, Copy)]
pub struct DocumentMeta<'a> {
    pub first_name: &'a str,
    pub generated_on: NaiveDate,
}

impl<'a> DocumentMeta<'a> {
    pub fn new(first_name: &'a str, generated_on: NaiveDate) -> Self {
        Self {
            first_name,
            generated_on,
        }
    }

    /// First word of the name; the whole string when it has no spaces.
    pub fn display_name(&self) -> &'a str {
        self.first_name
            .split_whitespace()
            .next()
            .unwrap_or(self.first_name)
    }

    pub fn generated_line(&self) -> String {
        format!("Generated on {}", self.generated_on.format("%B %-d, %Y"))
    }
}

#[tracing::instrument(
    name = "pipeline_stage render",
    skip_all,
    fields(render.document = "client", render.pages)
)]
pub fn render_client_pdf(
    report: &ClientReport,
    answers: &[String],
    meta: &DocumentMeta<'_>,
) -> Result<Vec<u8>, RenderError> {
    let start = Instant::now();
    let layout = client::layout(report, answers, meta);
    finish("client", &layout, start)
}

#[tracing::instrument(
    name = "pipeline_stage render",
    skip_all,
    fields(render.document = "practitioner", render.pages)
)]
pub fn render_practitioner_pdf(
    report: &PractitionerReport,
    meta: &DocumentMeta<'_>,
) -> Result<Vec<u8>, RenderError> {
    let start = Instant::now();
    let layout = practitioner::layout(report, meta);
    finish("practitioner", &layout, start)
}

fn finish(document: &'static str, layout: &Layout, start: Instant) -> Result<Vec<u8>, RenderError> {
    let bytes = pdf::paint(layout)?;

    let attrs = [KeyValue::new("render.document", document)];
    PDF_RENDER_DURATION.record(start.elapsed().as_secs_f64(), &attrs);
    PDF_PAGES.record(layout.page_count() as f64, &attrs);
    tracing::Span::current().record("render.pages", layout.page_count());

    tracing::info!(
        render.document = document,
        render.pages = layout.page_count(),
        render.bytes = bytes.len(),
        "Document rendered"
    );
    Ok(bytes)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn meta() -> DocumentMeta<'static> {
        DocumentMeta::new(
            "Maya Lin",
            NaiveDate::from_ymd_opt(2025, 3, 7).unwrap_or_default(),
        )
    }

    #[test]
    fn test_display_name_is_first_word() {
        assert_eq!(meta().display_name(), "Maya");
        let single = DocumentMeta::new("Maya", meta().generated_on);
        assert_eq!(single.display_name(), "Maya");
        let blank = DocumentMeta::new("   ", meta().generated_on);
        assert_eq!(blank.display_name(), "   ");
    }

    #[test]
    fn test_generated_line() {
        assert_eq!(meta().generated_line(), "Generated on March 7, 2025");
    }

    #[test]
    fn test_client_pdf_bytes() {
        let answers: Vec<String> = ["a", "b", "c", "d", "e"].map(String::from).to_vec();
        let bytes = render_client_pdf(&ClientReport::fallback(), &answers, &meta()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_practitioner_pdf_bytes() {
        let bytes = render_practitioner_pdf(&PractitionerReport::fallback(), &meta()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}
