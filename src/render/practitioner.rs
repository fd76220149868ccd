use super::DocumentMeta;
use super::client::highlight_callout;
use super::fonts::FontStyle;
use super::layout::{Layout, LayoutBuilder, Run};
use crate::pipeline::report::{
    Phase, PractitionerNotes, PractitionerReport, PractitionerSection,
};

pub const TITLE: &str = "Neuro Change Method\u{2122} Practitioner Report";
const BODY: f32 = 11.0;

/// Practitioner document. Summaries and highlights come first, then the
/// remaining sections, then each phase journey on a page of its own,
/// followed by milestones, outcomes, the closing statement and notes.
pub fn layout(report: &PractitionerReport, meta: &DocumentMeta<'_>) -> Layout {
    let name = meta.display_name();
    let mut doc = LayoutBuilder::new("Practitioner Report");

    doc.heading(TITLE, 20.0);
    doc.paragraph(&[Run::regular(&meta.generated_line())], 10.0, 0.0);
    doc.space(8.0);

    for section in &report.sections {
        match section {
            PractitionerSection::ProfileSummary {
                title,
                content,
                primary_objective,
            } => {
                profile_summary(&mut doc, title, content, primary_objective.as_deref());
                doc.separator();
            }
            PractitionerSection::Highlight {
                title,
                content,
                points,
            } => {
                highlight_callout(
                    &mut doc,
                    title,
                    content.as_deref().unwrap_or_default(),
                    points,
                    "",
                );
                doc.separator();
            }
            _ => {}
        }
    }

    let others: Vec<&PractitionerSection> = report
        .sections
        .iter()
        .filter(|s| {
            matches!(
                s,
                PractitionerSection::Itemized { .. } | PractitionerSection::Content { .. }
            )
        })
        .collect();
    for (i, section) in others.iter().enumerate() {
        generic_section(&mut doc, section);
        if i + 1 < others.len() {
            doc.separator();
        }
    }

    for section in &report.sections {
        match section {
            PractitionerSection::PhaseJourney { title, phases } => {
                doc.page_break();
                phase_journey(&mut doc, title, phases);
                doc.separator();
            }
            PractitionerSection::Unsupported { title, tag } => {
                tracing::debug!(
                    section.title = title.as_deref().unwrap_or_default(),
                    section.tag = tag.as_deref().unwrap_or_default(),
                    "Skipping unsupported practitioner section"
                );
            }
            _ => {}
        }
    }

    if !report.milestones.is_empty() {
        doc.space(8.0);
        doc.heading("12-Week Milestone Map", 14.0);
        let rows: Vec<[String; 3]> = report
            .milestones
            .iter()
            .map(|m| {
                [
                    m.milestone.clone(),
                    m.target_week.clone(),
                    m.tools_and_focus.clone(),
                ]
            })
            .collect();
        doc.table(
            ["Milestone", "Target Week", "Tools & Focus"],
            [0.4, 0.2, 0.4],
            &rows,
            10.0,
        );
        doc.separator();
    }

    if !report.projected_transformation_outcomes.is_empty() {
        doc.heading("Projected Transformation Outcomes", 14.0);
        doc.paragraph(
            &[Run::regular(&format!(
                "If {name} fully embraces this transformation journey, expect:"
            ))],
            BODY,
            0.0,
        );
        doc.space(4.0);
        for outcome in &report.projected_transformation_outcomes {
            doc.bullet(&[Run::regular(outcome)], BODY, 10.0);
        }
        doc.space(6.0);
    }

    if let Some(closing) = &report.closing_statement {
        doc.text_block(closing, FontStyle::Italic, BODY);
        doc.separator();
    }

    if let Some(notes) = &report.practitioner_notes {
        practitioner_notes(&mut doc, notes);
    }

    doc.finish()
}

fn profile_summary(doc: &mut LayoutBuilder, title: &str, content: &str, objective: Option<&str>) {
    doc.heading(title, 14.0);
    doc.text_block(content, FontStyle::Regular, BODY);
    if let Some(objective) = objective {
        doc.space(8.0);
        doc.paragraph(&[Run::bold("Primary Objective:")], 12.0, 0.0);
        doc.text_block(objective, FontStyle::Regular, BODY);
    }
}

fn generic_section(doc: &mut LayoutBuilder, section: &PractitionerSection) {
    match section {
        PractitionerSection::Itemized {
            title,
            content,
            items,
        } => {
            doc.heading(title, 14.0);
            if let Some(content) = content {
                doc.text_block(content, FontStyle::Regular, BODY);
                doc.space(4.0);
            }
            for item in items {
                doc.bullet(&[Run::regular(item)], BODY, 10.0);
            }
        }
        PractitionerSection::Content {
            title,
            content,
            sub_title,
            reason,
        } => {
            doc.heading(title, 14.0);
            if let Some(content) = content {
                doc.text_block(content, FontStyle::Regular, BODY);
            }
            if let Some(sub_title) = sub_title {
                doc.space(4.0);
                doc.paragraph(&[Run::bold(sub_title)], BODY, 0.0);
                doc.space(4.0);
            }
            if let Some(reason) = reason {
                doc.text_block(reason, FontStyle::Regular, BODY);
            }
        }
        _ => {}
    }
}

fn phase_journey(doc: &mut LayoutBuilder, title: &str, phases: &[Phase]) {
    doc.heading(title, 15.0);
    for phase in phases {
        doc.space(4.0);
        doc.heading(&phase.title, 12.0);
        for (label, value) in [
            ("Focus: ", &phase.focus),
            ("Tools: ", &phase.tools),
            ("Goal: ", &phase.goal),
        ] {
            if let Some(value) = value {
                doc.bullet(&[Run::bold_italic(label), Run::regular(value)], BODY, 15.0);
            }
        }
    }
}

fn practitioner_notes(doc: &mut LayoutBuilder, notes: &PractitionerNotes) {
    doc.heading("Practitioner Notes", 14.0);
    if let Some(temperament) = &notes.temperament {
        doc.paragraph(&[Run::bold("Client Temperament:")], 12.0, 0.0);
        doc.text_block(temperament, FontStyle::Regular, BODY);
        doc.space(8.0);
    }
    if !notes.best_practices.is_empty() {
        doc.paragraph(&[Run::bold("Best Practices for This Client:")], 12.0, 0.0);
        for practice in &notes.best_practices {
            doc.bullet(&[Run::regular(practice)], BODY, 10.0);
        }
    }
}
