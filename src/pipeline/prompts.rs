//! System and user prompts for the two reports. The JSON shapes demanded here
//! are the ones `normalize` reads back, tag for tag.

use crate::assessment::{AssessmentAnswers, questions};

const BASE_PERSONA: &str = "\
You are DreamScape AI, an advanced personal transformation assistant trained in the Neuro Change Method\u{2122}.
Your responses must be science-backed, evidence-based, and written with empathy.

When analyzing responses, look for limiting beliefs, identity conflicts, emotional patterns, and mindset gaps.
Frame insights using tools like: self-concordance mapping, belief engineering, flow state activation,
implementation intentions, belief realignment, identity-based habit formation, emotional rewiring,
strategy bridging, and purpose mapping.

Speak directly to the client using \"you\" and highlight strengths and growth areas.";

const CLIENT_SYSTEM: &str = "\
You will return a JSON object containing a personalized client report.

You have access to retrieved context, including transformation journeys, challenges, and evidence-based \
approaches matching the client's situation. Use it to deliver personalized insights, reference proven \
methods, ground recommendations in real-world success, and identify patterns linked to known pathways.";

const PRACTITIONER_SYSTEM: &str = "\
You will return a JSON object containing a comprehensive practitioner report.

You have access to retrieved context, including clinical patterns, outcomes data, proven intervention \
strategies, best practices based on client temperament, and effective tools for similar cases. Use it to \
create a precise treatment plan, realistic milestones, and personalized practitioner notes.";

const CLIENT_CONTRACT: &str = r#"Return a JSON object with this structure:
{
  "clientReport": {
    "questionSection": [
      {
        "type": "question-insight",
        "aiInsights": [
          "First paragraph analyzing the response (150 words)",
          "Second paragraph with additional insights (150 words)"
        ]
      }
    ],
    "highlightSection": {
      "type": "highlight",
      "title": "What the Neuro Change Method™ Can Do for You",
      "points": {
        "ToolName": "6-8 word description of the effect of this tool on the client"
      },
      "closingStatement": "Motivational closing statement"
    }
  }
}

REQUIREMENTS:
1. "questionSection" MUST contain exactly 5 insight objects, one per question, in question order.
2. "points" MUST contain 6-7 entries. Each key is the actual name of a tool chosen for this client,
   written in Title Case, never a placeholder such as "item1" or "point1"."#;

const PRACTITIONER_CONTRACT: &str = r#"Return a JSON object with this structure:
{
  "practitionerReport": {
    "sections": [
      {
        "type": "profile-summary",
        "title": "Client Profile Summary",
        "content": "Two paragraphs: 1) general overview (100 words) 2) comprehensive overview (200-300 words)",
        "primaryObjective": "Clear goal statement based on the assessment"
      },
      {
        "type": "itemized",
        "title": "Key Barriers:",
        "items": ["Specific psychological obstacle 1", "... 4-5 more obstacles"]
      },
      {
        "type": "content",
        "title": "Transformation Theme:",
        "sub-title": "One-line statement capturing the essence of the journey",
        "reason": "Paragraph on how the theme aligns with the journey"
      },
      {
        "type": "phase-journey",
        "title": "Neuro Change Method™: Your 4-Phase Transformation Journey",
        "phases": [
          {
            "type": "phase",
            "title": "Phase 1: Consciousness",
            "items": {
              "focus": "Key Word One + Key Word Two + Key Word Three",
              "tools": "Tool One | Tool Two | Tool Three",
              "goal": "Two line goal showing the change from current to future state"
            }
          }
        ]
      }
    ],
    "milestones": [
      {
        "milestone": "Milestone description",
        "targetWeek": "Week X-Y",
        "toolsAndFocus": "Tools and techniques"
      }
    ],
    "projectedTransformationOutcomes": ["Specific measurable outcome 1", "... 4-5 more outcomes"],
    "closingStatement": "Motivational closing statement",
    "practitionerNotes": {
      "temperament": "Client temperament assessment",
      "best-practices": ["Best practice 1 for the practitioner", "... 3-4 more best practices"]
    }
  }
}

FORMATTING REQUIREMENTS:
1. "phases" MUST contain exactly 4 phases: Consciousness, Mindset, Subconscious, Integration.
2. "milestones" MUST contain exactly 6 milestones covering weeks 1-12. Use different tools each
   week where possible; when a tool is reused, vary its name or description.
3. In "focus", capitalize every key word or phrase ("Self Awareness", not "self-awareness") and join
   2-3 of them with a plus sign surrounded by spaces ("Self Awareness + Rest + Presence").
4. In "tools", join tool names with a pipe surrounded by spaces
   ("Self Concordance Mapping | Belief Engineering")."#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Clone)]
pub struct ComposedPrompts {
    pub client: PromptPair,
    pub practitioner: PromptPair,
}

/// Builds both prompt pairs around the already formatted retrieval context.
#[tracing::instrument(
    name = "pipeline_stage compose",
    skip_all,
    fields(pipeline.stage = "compose", prompt.context_chars = context.len())
)]
pub fn compose(answers: &AssessmentAnswers, context: &str) -> ComposedPrompts {
    let input = format_user_input(answers);

    ComposedPrompts {
        client: PromptPair {
            system: system_prompt(CLIENT_SYSTEM, context),
            user: format!("{input}\n\n{CLIENT_CONTRACT}"),
        },
        practitioner: PromptPair {
            system: system_prompt(PRACTITIONER_SYSTEM, context),
            user: format!("{input}\n\n{PRACTITIONER_CONTRACT}"),
        },
    }
}

fn system_prompt(audience: &str, context: &str) -> String {
    format!(
        "{BASE_PERSONA}\n\n{audience}\n\n\
        The following context from our knowledge base is relevant to this client:\n{context}"
    )
}

/// Name and numbered answers. The e-mail address and practitioner details
/// stay out of the prompt.
fn format_user_input(answers: &AssessmentAnswers) -> String {
    let mut out = format!("**User Input:**\n- First Name: {}\n", answers.first_name);
    for (i, answer) in answers.answers.iter().enumerate() {
        out.push_str(&format!(
            "- Q{}: {} {}\n",
            i + 1,
            questions::question_text(i),
            answer
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::tests::{form_json, registry};
    use crate::assessment::{AssessmentForm, validate};
    use crate::retrieval::NO_CONTEXT;

    fn answers() -> AssessmentAnswers {
        validate(AssessmentForm::from_json(&form_json()), &registry()).unwrap()
    }

    #[test]
    fn test_context_lands_in_both_system_prompts() {
        let prompts = compose(&answers(), "CONTEXT ITEM 1:\nsleep matters");
        for pair in [&prompts.client, &prompts.practitioner] {
            assert!(pair.system.starts_with("You are DreamScape AI"));
            assert!(pair.system.ends_with(
                "relevant to this client:\nCONTEXT ITEM 1:\nsleep matters"
            ));
        }
    }

    #[test]
    fn test_placeholder_context_is_passed_verbatim() {
        let prompts = compose(&answers(), NO_CONTEXT);
        assert!(prompts.client.system.contains(NO_CONTEXT));
        assert!(prompts.practitioner.system.contains(NO_CONTEXT));
    }

    #[test]
    fn test_user_prompt_lists_answers_without_contact_details() {
        let prompts = compose(&answers(), NO_CONTEXT);
        let user = &prompts.client.user;
        assert!(user.contains("- First Name: Maya Lin"));
        assert!(user.contains("- Q1: Where are you right now"));
        assert!(user.contains("I feel lost"));
        assert!(user.contains("- Q5: If you could reprogram"));
        assert!(!user.contains("maya@example.com"));
        assert!(!user.contains("coach@example.com"));
    }

    #[test]
    fn test_contracts_name_the_tags_the_normalizer_reads() {
        let prompts = compose(&answers(), NO_CONTEXT);
        assert!(prompts.client.user.contains("\"clientReport\""));
        assert!(prompts.client.user.contains("\"question-insight\""));
        assert!(prompts.client.user.contains("exactly 5 insight objects"));
        for tag in ["profile-summary", "itemized", "\"content\"", "phase-journey"] {
            assert!(prompts.practitioner.user.contains(tag), "missing {tag}");
        }
        assert!(prompts.practitioner.user.contains("exactly 6 milestones"));
        assert!(prompts.practitioner.user.contains(" + "));
        assert!(prompts.practitioner.user.contains(" | "));
    }
}
