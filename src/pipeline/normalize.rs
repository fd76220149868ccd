//! Reads model output back into the canonical report types. Nothing here
//! fails: unparseable text becomes the fallback report, unknown shapes are
//! tolerated field by field.

use opentelemetry::KeyValue;
use serde_json::{Map, Value};

use super::report::{
    ClientReport, DEFAULT_HIGHLIGHT_TITLE, HighlightPoint, HighlightSection, Milestone, Phase,
    PractitionerNotes, PractitionerReport, PractitionerSection, QuestionInsight,
};
use crate::telemetry::metrics::REPORT_FALLBACK_COUNT;

const PROFILE_SUMMARY_TITLE: &str = "Client Profile Summary";

#[derive(Debug, Clone)]
pub struct Normalized<T> {
    pub report: T,
    /// True when the raw text could not be read and the fallback was used.
    pub fallback: bool,
}

/// Parses both raw model outputs. Malformed output is replaced by the
/// fallback report and counted, never returned as an error.
#[tracing::instrument(
    name = "pipeline_stage normalize",
    skip_all,
    fields(
        pipeline.stage = "normalize",
        report.client_fallback,
        report.practitioner_fallback,
        report.question_blocks,
        report.sections,
    )
)]
pub fn validate(raw_client: &str, raw_practitioner: &str) -> (ClientReport, PractitionerReport) {
    let client = normalize_client(raw_client);
    let practitioner = normalize_practitioner(raw_practitioner);

    for (audience, fell_back) in [
        ("client", client.fallback),
        ("practitioner", practitioner.fallback),
    ] {
        if fell_back {
            tracing::warn!(audience, "Model output was not valid JSON, using fallback report");
            REPORT_FALLBACK_COUNT.add(1, &[KeyValue::new("report.audience", audience)]);
        }
    }

    let span = tracing::Span::current();
    span.record("report.client_fallback", client.fallback);
    span.record("report.practitioner_fallback", practitioner.fallback);
    span.record("report.question_blocks", client.report.question_section.len());
    span.record("report.sections", practitioner.report.sections.len());

    let kinds: Vec<&str> = practitioner.report.sections.iter().map(|s| s.kind()).collect();
    tracing::debug!(sections = ?kinds, "Practitioner sections classified");

    (client.report, practitioner.report)
}

pub fn normalize_client(raw: &str) -> Normalized<ClientReport> {
    match parse_object(raw).as_ref().and_then(client_from_value) {
        Some(report) => Normalized {
            report,
            fallback: false,
        },
        None => Normalized {
            report: ClientReport::fallback(),
            fallback: true,
        },
    }
}

pub fn normalize_practitioner(raw: &str) -> Normalized<PractitionerReport> {
    match parse_object(raw).as_ref().and_then(practitioner_from_value) {
        Some(report) => Normalized {
            report,
            fallback: false,
        },
        None => Normalized {
            report: PractitionerReport::fallback(),
            fallback: true,
        },
    }
}

fn parse_object(raw: &str) -> Option<Value> {
    let json = extract_json(raw);
    match serde_json::from_str::<Value>(&json) {
        Ok(value) if value.is_object() => Some(value),
        Ok(_) => None,
        Err(err) => {
            tracing::debug!(error = %err, chars = raw.len(), "Model output did not parse");
            None
        }
    }
}

pub(crate) fn extract_json(content: &str) -> String {
    if let Some(start) = content.find("```json")
        && let Some(end) = content[start + 7..].find("```")
    {
        return content[start + 7..start + 7 + end].trim().to_string();
    }
    if let Some(start) = content.find("```")
        && let Some(end) = content[start + 3..].find("```")
    {
        let inner = content[start + 3..start + 3 + end].trim();
        if inner.starts_with('{') {
            return inner.to_string();
        }
    }
    if let Some(start) = content.find('{')
        && let Some(end) = content.rfind('}')
        && start < end
    {
        return content[start..=end].to_string();
    }
    content.to_string()
}

/// Client report from a parsed value, wrapped or bare. `None` only when the
/// value is not an object at all.
pub fn client_from_value(value: &Value) -> Option<ClientReport> {
    let root = value.get("clientReport").unwrap_or(value).as_object()?;

    let question_section = field(root, &["questionSection", "question-section"])
        .and_then(Value::as_array)
        .map(|items| items.iter().map(question_from_value).collect())
        .unwrap_or_default();

    let highlight_section = match field(root, &["highlightSection", "highlight-section"])
        .and_then(Value::as_object)
    {
        Some(obj) => highlight_from_object(obj),
        None => {
            tracing::debug!("Client report has no highlight section, using default");
            HighlightSection::fallback()
        }
    };

    Some(ClientReport {
        question_section,
        highlight_section,
    })
}

fn question_from_value(value: &Value) -> QuestionInsight {
    let Some(obj) = value.as_object() else {
        return QuestionInsight {
            ai_insights: string_list(Some(value)),
            ..Default::default()
        };
    };

    let mut ai_insights = string_list(field(obj, &["aiInsights", "ai-insights"]));
    if ai_insights.is_empty() {
        ai_insights = string_list(field(obj, &["aiInsight", "ai-insight", "insight"]));
    }

    QuestionInsight {
        title: text(obj, &["title"]),
        client_response: text(obj, &["clientResponse", "client-response"]),
        ai_insights,
    }
}

fn highlight_from_object(obj: &Map<String, Value>) -> HighlightSection {
    let mut points = points_from_value(obj.get("points"));
    if points.is_empty() {
        points = unlabeled_points(obj.get("items"));
    }

    HighlightSection {
        title: text(obj, &["title"]).unwrap_or_else(|| DEFAULT_HIGHLIGHT_TITLE.to_string()),
        content: text_block(obj.get("content")).unwrap_or_default(),
        points,
        closing_statement: text(obj, &["closingStatement", "closing-statement"])
            .unwrap_or_default(),
    }
}

/// Points keep the order the model wrote them in.
fn points_from_value(value: Option<&Value>) -> Vec<HighlightPoint> {
    match value {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(key, value)| {
                Some(HighlightPoint {
                    label: clean_label(key),
                    text: scalar_text(value)?,
                })
            })
            .collect(),
        Some(Value::Array(items)) => items.iter().filter_map(point_from_item).collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![HighlightPoint {
            label: String::new(),
            text: s.trim().to_string(),
        }],
        _ => Vec::new(),
    }
}

fn point_from_item(item: &Value) -> Option<HighlightPoint> {
    match item {
        Value::Object(obj) => {
            if let Some(effect) = text(obj, &["text", "effect", "description"]) {
                let label = text_field(obj, &["label", "name", "tool"]).unwrap_or_default();
                return Some(HighlightPoint {
                    label: clean_label(&label),
                    text: effect,
                });
            }
            // single-entry map such as {"Belief Engineering": "..."}
            let (key, value) = obj.iter().next()?;
            Some(HighlightPoint {
                label: clean_label(key),
                text: scalar_text(value)?,
            })
        }
        other => Some(HighlightPoint {
            label: String::new(),
            text: scalar_text(other)?,
        }),
    }
}

fn unlabeled_points(value: Option<&Value>) -> Vec<HighlightPoint> {
    string_list(value)
        .into_iter()
        .map(|text| HighlightPoint {
            label: String::new(),
            text,
        })
        .collect()
}

/// Display label for a highlight key: bullets and trailing colons dropped,
/// camelCase split into Title Case, placeholders such as `item3` emptied.
pub fn clean_label(raw: &str) -> String {
    let trimmed = raw
        .trim()
        .trim_start_matches(['\u{2022}', '-', '*'])
        .trim()
        .trim_end_matches(':')
        .trim();

    if is_placeholder_label(trimmed) {
        return String::new();
    }
    format_tool_name(trimmed)
}

/// `item1`, `point 2`, `Point_4` and the like carry no meaning for a reader.
pub fn is_placeholder_label(label: &str) -> bool {
    let lower = label.trim().to_ascii_lowercase();
    let rest = lower
        .strip_prefix("item")
        .or_else(|| lower.strip_prefix("point"));

    match rest {
        Some(rest) => {
            let digits = rest.trim_start_matches([' ', '_', '-']);
            !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

fn format_tool_name(label: &str) -> String {
    let mut spaced = String::with_capacity(label.len() + 8);
    let mut prev: Option<char> = None;
    for c in label.chars() {
        let c = if c == '_' { ' ' } else { c };
        if c.is_uppercase() && prev.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit()) {
            spaced.push(' ');
        }
        spaced.push(c);
        prev = Some(c);
    }

    spaced
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Practitioner report from a parsed value, wrapped or bare.
pub fn practitioner_from_value(value: &Value) -> Option<PractitionerReport> {
    let root = value
        .get("practitionerReport")
        .unwrap_or(value)
        .as_object()?;

    let sections = root
        .get("sections")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(classify_section).collect())
        .unwrap_or_default();

    let milestones = root
        .get("milestones")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(milestone_from_value).collect())
        .unwrap_or_default();

    let practitioner_notes = field(root, &["practitionerNotes", "practitioner-notes"])
        .and_then(Value::as_object)
        .and_then(|notes| {
            let parsed = PractitionerNotes {
                temperament: text(notes, &["temperament"]),
                best_practices: string_list(field(notes, &["best-practices", "bestPractices"])),
            };
            (parsed.temperament.is_some() || !parsed.best_practices.is_empty()).then_some(parsed)
        });

    Some(PractitionerReport {
        sections,
        milestones,
        projected_transformation_outcomes: string_list(field(
            root,
            &[
                "projectedTransformationOutcomes",
                "projected-transformation-outcomes",
            ],
        )),
        closing_statement: text(root, &["closingStatement", "closing-statement"]),
        practitioner_notes,
    })
}

/// Explicit tag first, then shape, then the titles older outputs relied on.
pub fn classify_section(value: &Value) -> PractitionerSection {
    let Some(obj) = value.as_object() else {
        return PractitionerSection::Unsupported {
            title: None,
            tag: None,
        };
    };

    let tag = text_field(obj, &["type"]).map(|t| t.to_ascii_lowercase());
    let title = text(obj, &["title"]);

    let by_tag = match tag.as_deref() {
        Some("profile-summary" | "summary") => Some(profile_summary(obj)),
        Some("itemized" | "list") => Some(itemized(obj, title.clone())),
        Some("content" | "theme") => Some(content(obj, title.clone())),
        Some("highlight") => Some(highlight(obj, title.clone())),
        Some("phase-journey" | "phases") => Some(phase_journey(obj, title.clone())),
        _ => None,
    };
    if let Some(section) = by_tag {
        return section;
    }

    let title_lower = title.as_deref().map(str::to_lowercase).unwrap_or_default();

    if obj.get("phases").is_some_and(Value::is_array) {
        phase_journey(obj, title)
    } else if field(obj, &["primaryObjective", "primary-objective"]).is_some()
        || title_lower == "client profile summary"
        || title_lower == "client summary"
    {
        profile_summary(obj)
    } else if title_lower.contains("highlight") || obj.get("points").is_some() {
        highlight(obj, title)
    } else if obj.get("items").is_some() {
        itemized(obj, title)
    } else if ["content", "sub-title", "subTitle", "reason"]
        .iter()
        .any(|key| obj.contains_key(*key))
    {
        content(obj, title)
    } else {
        PractitionerSection::Unsupported { title, tag }
    }
}

fn profile_summary(obj: &Map<String, Value>) -> PractitionerSection {
    PractitionerSection::ProfileSummary {
        title: PROFILE_SUMMARY_TITLE.to_string(),
        content: text_block(obj.get("content")).unwrap_or_default(),
        primary_objective: text(obj, &["primaryObjective", "primary-objective"]),
    }
}

fn itemized(obj: &Map<String, Value>, title: Option<String>) -> PractitionerSection {
    PractitionerSection::Itemized {
        title: title.unwrap_or_default(),
        content: text_block(obj.get("content")),
        items: item_list(obj.get("items")),
    }
}

fn content(obj: &Map<String, Value>, title: Option<String>) -> PractitionerSection {
    PractitionerSection::Content {
        title: title.unwrap_or_default(),
        content: text_block(obj.get("content")),
        sub_title: text(obj, &["sub-title", "subTitle"]),
        reason: text_block(obj.get("reason")),
    }
}

fn highlight(obj: &Map<String, Value>, title: Option<String>) -> PractitionerSection {
    let mut points = points_from_value(obj.get("points"));
    if points.is_empty() {
        points = unlabeled_points(obj.get("items"));
    }

    PractitionerSection::Highlight {
        title: title.unwrap_or_default(),
        content: text_block(obj.get("content")),
        points,
    }
}

fn phase_journey(obj: &Map<String, Value>, title: Option<String>) -> PractitionerSection {
    let phases = obj
        .get("phases")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(phase_from_value).collect())
        .unwrap_or_default();

    PractitionerSection::PhaseJourney {
        title: title.unwrap_or_default(),
        phases,
    }
}

fn phase_from_value(value: &Value) -> Option<Phase> {
    let obj = value.as_object()?;
    let details = obj.get("items").and_then(Value::as_object).unwrap_or(obj);

    let phase = Phase {
        title: text(obj, &["title"]).unwrap_or_default(),
        focus: joined(details.get("focus"), " + "),
        tools: joined(details.get("tools"), " | "),
        goal: text_block(details.get("goal")),
    };

    let empty = phase.title.is_empty()
        && phase.focus.is_none()
        && phase.tools.is_none()
        && phase.goal.is_none();
    (!empty).then_some(phase)
}

fn milestone_from_value(value: &Value) -> Option<Milestone> {
    let obj = value.as_object()?;
    let milestone = Milestone {
        milestone: text(obj, &["milestone", "title"]).unwrap_or_default(),
        target_week: text(obj, &["targetWeek", "target-week", "week"]).unwrap_or_default(),
        tools_and_focus: text(obj, &["toolsAndFocus", "tools-and-focus", "tools"])
            .unwrap_or_default(),
    };

    let empty = milestone.milestone.is_empty()
        && milestone.target_week.is_empty()
        && milestone.tools_and_focus.is_empty();
    (!empty).then_some(milestone)
}

fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| obj.get(*key))
}

/// First non-empty text value among `keys`; arrays are joined as paragraphs.
fn text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| text_block(obj.get(*key)))
}

fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| obj.get(*key).and_then(scalar_text))
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn text_block(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Array(_) => {
            let parts = string_list(value);
            (!parts.is_empty()).then(|| parts.join("\n\n"))
        }
        other => scalar_text(other),
    }
}

fn joined(value: Option<&Value>, separator: &str) -> Option<String> {
    match value? {
        Value::Array(_) => {
            let parts = string_list(value);
            (!parts.is_empty()).then(|| parts.join(separator))
        }
        other => scalar_text(other),
    }
}

/// A string becomes a one-element list; non-text entries are dropped.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
        Some(other) => scalar_text(other).into_iter().collect(),
        None => Vec::new(),
    }
}

/// Like `string_list`, but object entries are flattened to "key: value".
fn item_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(obj) => {
                    let parts: Vec<String> = obj.values().filter_map(scalar_text).collect();
                    (!parts.is_empty()).then(|| parts.join(": "))
                }
                other => scalar_text(other),
            })
            .collect(),
        other => string_list(other),
    }
}
