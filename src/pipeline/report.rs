//! Canonical report structures. Whatever shape the model returns, the
//! normalizer reduces it to these types before anything is rendered.

use serde::{Deserialize, Serialize};

pub const DEFAULT_HIGHLIGHT_TITLE: &str = "What the Neuro Change Method\u{2122} Can Do for You";
pub const DEFAULT_CLOSING: &str = "Your journey begins now.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientReport {
    pub question_section: Vec<QuestionInsight>,
    pub highlight_section: HighlightSection,
}

impl ClientReport {
    pub fn fallback() -> Self {
        Self {
            question_section: Vec::new(),
            highlight_section: HighlightSection::fallback(),
        }
    }
}

/// One reflection block, matched to a question by position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionInsight {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_response: Option<String>,
    pub ai_insights: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightSection {
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    pub points: Vec<HighlightPoint>,
    pub closing_statement: String,
}

impl HighlightSection {
    pub fn fallback() -> Self {
        Self {
            title: DEFAULT_HIGHLIGHT_TITLE.to_string(),
            content: String::new(),
            points: Vec::new(),
            closing_statement: DEFAULT_CLOSING.to_string(),
        }
    }
}

/// A named tool and its effect. An empty label renders the text alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HighlightPoint {
    pub label: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PractitionerReport {
    pub sections: Vec<PractitionerSection>,
    pub milestones: Vec<Milestone>,
    pub projected_transformation_outcomes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closing_statement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub practitioner_notes: Option<PractitionerNotes>,
}

impl PractitionerReport {
    pub fn fallback() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PractitionerSection {
    #[serde(rename_all = "camelCase")]
    ProfileSummary {
        title: String,
        content: String,
        primary_objective: Option<String>,
    },
    Itemized {
        title: String,
        content: Option<String>,
        items: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Content {
        title: String,
        content: Option<String>,
        sub_title: Option<String>,
        reason: Option<String>,
    },
    Highlight {
        title: String,
        content: Option<String>,
        points: Vec<HighlightPoint>,
    },
    PhaseJourney {
        title: String,
        phases: Vec<Phase>,
    },
    /// A section whose shape was not recognised; kept for logging, never drawn.
    Unsupported {
        title: Option<String>,
        tag: Option<String>,
    },
}

impl PractitionerSection {
    pub fn kind(&self) -> &'static str {
        match self {
            PractitionerSection::ProfileSummary { .. } => "profile-summary",
            PractitionerSection::Itemized { .. } => "itemized",
            PractitionerSection::Content { .. } => "content",
            PractitionerSection::Highlight { .. } => "highlight",
            PractitionerSection::PhaseJourney { .. } => "phase-journey",
            PractitionerSection::Unsupported { .. } => "unsupported",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub title: String,
    pub focus: Option<String>,
    pub tools: Option<String>,
    pub goal: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub milestone: String,
    pub target_week: String,
    pub tools_and_focus: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PractitionerNotes {
    pub temperament: Option<String>,
    #[serde(rename = "best-practices", default)]
    pub best_practices: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_fallback_shape() {
        let value = serde_json::to_value(ClientReport::fallback()).unwrap();
        assert_eq!(
            value,
            json!({
                "questionSection": [],
                "highlightSection": {
                    "title": "What the Neuro Change Method\u{2122} Can Do for You",
                    "points": [],
                    "closingStatement": "Your journey begins now."
                }
            })
        );
    }

    #[test]
    fn test_practitioner_fallback_is_empty() {
        let value = serde_json::to_value(PractitionerReport::fallback()).unwrap();
        assert_eq!(
            value,
            json!({"sections": [], "milestones": [], "projectedTransformationOutcomes": []})
        );
    }

    #[test]
    fn test_sections_serialize_with_type_tag() {
        let section = PractitionerSection::ProfileSummary {
            title: "Client Profile Summary".into(),
            content: "Overview".into(),
            primary_objective: Some("Rebuild confidence".into()),
        };
        let value = serde_json::to_value(&section).unwrap();
        assert_eq!(value["type"], "profile-summary");
        assert_eq!(value["primaryObjective"], "Rebuild confidence");
        assert_eq!(section.kind(), "profile-summary");
    }
}
