use super::DocumentMeta;
use super::fonts::FontStyle;
use super::layout::{Layout, LayoutBuilder, Run};
use crate::assessment::QUESTIONS;
use crate::pipeline::report::{ClientReport, HighlightPoint, QuestionInsight};

pub const TITLE: &str = "Neuro Change Method\u{2122} Client Assessment Report";
const MIN_QUESTION_BLOCKS: usize = 5;
const RESPONSE_MISSING: &str = "Response not available";
const INSIGHT_PENDING: &str = "Analysis in progress...";
const HIGHLIGHT_INTRO: &str = "Under the care of a Certified Neuro Change Practitioner, you'll be guided through a precision-based, science-backed transformation that uses:";

const BODY: f32 = 11.0;

/// Client document: opening, one block per question, the highlight callout
/// and the fixed closing appeal.
pub fn layout(report: &ClientReport, answers: &[String], meta: &DocumentMeta<'_>) -> Layout {
    let name = meta.display_name();
    let mut doc = LayoutBuilder::new("Client Assessment Report");

    doc.heading(TITLE, 20.0);
    doc.paragraph(&[Run::italic("Prepared by DreamScape AI")], 12.0, 0.0);
    doc.paragraph(&[Run::regular(&meta.generated_line())], 10.0, 0.0);
    doc.space(10.0);
    doc.paragraph(
        &[Run::italic(&format!(
            "{name}, what you're about to read isn't just a reflection\u{2014}it's a revelation. \
            This assessment draws on evidence-based psychological frameworks and cutting-edge insight \
            tools to uncover the hidden architecture of your mindset, motivations, and identity with \
            stunning clarity."
        ))],
        BODY,
        0.0,
    );
    doc.separator();

    let blocks = question_blocks(&report.question_section, answers);
    for (i, block) in blocks.iter().enumerate() {
        question_block(&mut doc, block);
        if i + 1 < blocks.len() {
            doc.separator();
        }
    }
    doc.separator();

    let highlight = &report.highlight_section;
    highlight_callout(
        &mut doc,
        &highlight.title,
        &highlight.content,
        &highlight.points,
        &highlight.closing_statement,
    );
    doc.separator();

    closing_appeal(&mut doc, name);
    doc.finish()
}

/// A question block ready to draw; every field is filled.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionBlock {
    pub title: String,
    pub response: String,
    pub insights: Vec<String>,
}

/// At least five blocks. Missing model entries fall back to the fixed
/// question, the submitted answer and a pending note.
pub fn question_blocks(entries: &[QuestionInsight], answers: &[String]) -> Vec<QuestionBlock> {
    let count = entries.len().max(MIN_QUESTION_BLOCKS);
    (0..count)
        .map(|i| {
            let entry = entries.get(i);
            let title = entry
                .and_then(|e| e.title.clone())
                .or_else(|| QUESTIONS.get(i).map(|q| q.to_string()))
                .unwrap_or_else(|| format!("Question {}", i + 1));
            let response = entry
                .and_then(|e| e.client_response.clone())
                .or_else(|| answers.get(i).filter(|a| !a.trim().is_empty()).cloned())
                .unwrap_or_else(|| RESPONSE_MISSING.to_string());
            let insights = match entry {
                Some(e) if !e.ai_insights.is_empty() => e.ai_insights.clone(),
                _ => vec![INSIGHT_PENDING.to_string()],
            };
            QuestionBlock {
                title,
                response,
                insights,
            }
        })
        .collect()
}

fn question_block(doc: &mut LayoutBuilder, block: &QuestionBlock) {
    doc.heading(&block.title, 13.0);
    doc.paragraph(&[Run::bold("Client Response:")], BODY, 0.0);
    doc.space(3.0);
    doc.text_block(&block.response, FontStyle::Italic, BODY);
    doc.space(6.0);
    doc.paragraph(&[Run::bold("DreamScape AI Reflection:")], BODY, 0.0);
    doc.space(3.0);
    for insight in &block.insights {
        doc.text_block(insight, FontStyle::Regular, BODY);
        doc.space(6.0);
    }
}

/// Shared by both documents: title, optional lead-in, labelled points and
/// the closing line.
pub(super) fn highlight_callout(
    doc: &mut LayoutBuilder,
    title: &str,
    content: &str,
    points: &[HighlightPoint],
    closing: &str,
) {
    doc.heading(title, 14.0);
    if !content.trim().is_empty() {
        doc.text_block(content, FontStyle::Italic, BODY);
    }

    doc.space(4.0);
    doc.paragraph(&[Run::regular(HIGHLIGHT_INTRO)], BODY, 0.0);
    doc.space(4.0);
    for point in points {
        if point.label.is_empty() {
            doc.bullet(&[Run::regular(&point.text)], BODY, 10.0);
        } else {
            let label = format!("{}: ", point.label);
            doc.bullet(&[Run::bold(&label), Run::regular(&point.text)], BODY, 10.0);
        }
    }

    if !closing.trim().is_empty() {
        doc.space(6.0);
        doc.text_block(closing, FontStyle::Italic, BODY);
    }
}

fn closing_appeal(doc: &mut LayoutBuilder, name: &str) {
    doc.heading("Why Now, Why You, and Why a Neuro Change Practitioner?", 14.0);

    let paragraphs = [
        format!(
            "{name}, you're standing at a powerful crossroads\u{2014}between where you've been and the \
            future you're ready to claim. You don't need more inspiration\u{2014}you need integration. \
            You don't need more information\u{2014}you need implementation."
        ),
        "And that's where our Accredited Neuro Change Practitioners come in.".to_string(),
        "The Neuro Change Method\u{2122} is not coaching. It's not motivational speaking. It is a \
        scientifically grounded, evidence-based transformation framework\u{2014}built on the latest \
        research in neuroscience, cognitive psychology, and behavioral change theory."
            .to_string(),
        "Unlike traditional life coaches, our practitioners undergo rigorous training, accreditation, \
        and ongoing mentorship. Their work is backed by our professional practice guidelines and \
        validated through our Neuro Change Method\u{2122} White Paper, ensuring that every tool, every \
        session, and every insight you receive is rooted in measurable, real-world efficacy."
            .to_string(),
        "What makes this different is the precision and personalization. Working with a Neuro Change \
        Practitioner means working with someone who is:"
            .to_string(),
    ];
    for paragraph in &paragraphs {
        doc.paragraph(&[Run::regular(paragraph)], BODY, 0.0);
        doc.space(6.0);
    }

    let bullets = [
        "Highly trained in neuroplasticity, mindset reframing, belief engineering, and subconscious integration.",
        "Supported by a powerful AI-enhanced framework that helps uncover the hidden dimensions of your \
        transformation\u{2014}your unconscious thought patterns, internal conflicts, and suppressed potential.",
        "Focused solely on you\u{2014}your identity, your values, and your outcomes.",
    ];
    for bullet in bullets {
        doc.bullet(&[Run::regular(bullet)], BODY, 15.0);
    }
    doc.space(6.0);

    let closing = [
        "This isn't generic advice. It's scientific strategy tailored to your deepest aspirations. And \
        it's delivered with professional care, confidentiality, and compassion.",
        "Booking a time to speak with one of our accredited practitioners isn't just a step \
        forward\u{2014}it's a strategic move toward the most aligned, empowered, and unstoppable version \
        of yourself.",
        "Are you ready to stop waiting for permission\u{2014}and start building the reality that reflects \
        who you already are?",
    ];
    for paragraph in closing {
        doc.paragraph(&[Run::regular(paragraph)], BODY, 0.0);
        doc.space(6.0);
    }

    doc.paragraph(
        &[Run::bold(
            "Book your complimentary 20 minute discovery session with an Accredited Neuro Change \
            Practitioner today. Your next breakthrough isn't in the future. It's in your decision to act now.",
        )],
        BODY,
        0.0,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::normalize::normalize_client;
    use crate::pipeline::normalize::tests::CLIENT_OUTPUT;
    use crate::render::tests::meta;

    fn answers() -> Vec<String> {
        ["Stuck", "A calm life", "Not enough", "Last spring", "Procrastination"]
            .map(String::from)
            .to_vec()
    }

    #[test]
    fn test_short_question_section_is_padded_to_five() {
        let entries = vec![QuestionInsight {
            ai_insights: vec!["Insight one.".into()],
            ..Default::default()
        }];
        let blocks = question_blocks(&entries, &answers());

        assert_eq!(blocks.len(), 5);
        assert_eq!(blocks[0].title, QUESTIONS[0]);
        assert_eq!(blocks[0].response, "Stuck");
        assert_eq!(blocks[0].insights, vec!["Insight one."]);
        assert_eq!(blocks[4].response, "Procrastination");
        assert_eq!(blocks[4].insights, vec![INSIGHT_PENDING]);
    }

    #[test]
    fn test_missing_answers_use_placeholder() {
        let blocks = question_blocks(&[], &[]);
        assert_eq!(blocks.len(), 5);
        assert!(blocks.iter().all(|b| b.response == RESPONSE_MISSING));
    }

    #[test]
    fn test_fallback_report_still_renders_every_section() {
        let layout = layout(&ClientReport::fallback(), &answers(), &meta());
        let text = layout.text();

        assert!(text.contains("Client Assessment Report"));
        assert!(text.contains("Maya, what you're about to read"));
        assert!(text.contains("Analysis in progress..."));
        assert!(text.contains("What the Neuro Change Method"));
        assert!(text.contains("Your journey begins now."));
        assert!(text.contains("Why Now, Why You"));
        assert!(text.contains("Book your complimentary"));
    }

    #[test]
    fn test_placeholder_point_labels_are_not_shown() {
        let report = normalize_client(CLIENT_OUTPUT).report;
        let text = layout(&report, &answers(), &meta()).text();

        assert!(text.contains("Belief Engineering:"));
        assert!(text.contains("Turns scattered effort into focus"));
        assert!(!text.contains("item2"));
        assert!(!text.contains("Point 4"));
    }

    #[test]
    fn test_output_text_is_ascii() {
        let report = normalize_client(CLIENT_OUTPUT).report;
        let layout = layout(&report, &answers(), &meta());
        assert!(layout.text().is_ascii());
    }
}
