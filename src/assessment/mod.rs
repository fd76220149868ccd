//! Intake of the assessment form: sanitization, field rules and the
//! practitioner lookup that every submission passes before any external call.

pub mod practitioners;
pub mod questions;

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;

pub use practitioners::{Practitioner, PractitionerRegistry};
pub use questions::QUESTIONS;

const DUPLICATE_MESSAGE: &str =
    "Try to provide unique answers for each question - It helps us better understand";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub path: Vec<String>,
    pub code: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: &str, code: &str, message: &str) -> Self {
        Self {
            path: vec![path.to_string()],
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

/// Raw form fields after sanitization; absent or non-string values are empty.
#[derive(Debug, Clone, Default)]
pub struct AssessmentForm {
    pub first_name: String,
    pub email: String,
    pub practitioner_code: String,
    pub practitioner_email: String,
    pub answers: [String; 5],
}

impl AssessmentForm {
    /// Keeps only string values, trimmed and stripped of markup.
    pub fn from_json(value: &Value) -> Self {
        let field = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .map(sanitize_input)
                .unwrap_or_default()
        };

        Self {
            first_name: field("firstName"),
            email: field("email"),
            practitioner_code: field("practitionerCode"),
            practitioner_email: field("practitionerEmail"),
            answers: std::array::from_fn(|i| field(&format!("ques{}", i + 1))),
        }
    }
}

/// A submission that passed every field and business rule.
#[derive(Debug, Clone)]
pub struct AssessmentAnswers {
    pub first_name: String,
    pub email: String,
    pub practitioner_code: String,
    pub practitioner_email: String,
    pub answers: [String; 5],
}

pub fn validate(
    form: AssessmentForm,
    registry: &PractitionerRegistry,
) -> Result<AssessmentAnswers, Vec<ValidationIssue>> {
    let mut issues = Vec::new();

    let required = [
        ("firstName", &form.first_name, "First name is required"),
        ("email", &form.email, "Email is required"),
        (
            "practitionerCode",
            &form.practitioner_code,
            "Practitioner code is required",
        ),
        (
            "practitionerEmail",
            &form.practitioner_email,
            "Practitioner email is required",
        ),
    ];
    for (path, value, message) in required {
        if value.is_empty() {
            issues.push(ValidationIssue::new(path, "too_small", message));
        }
    }

    for (i, answer) in form.answers.iter().enumerate() {
        if answer.is_empty() {
            issues.push(ValidationIssue::new(
                &format!("ques{}", i + 1),
                "too_small",
                "Please answer this question",
            ));
        }
    }

    if !form.email.is_empty() && !looks_like_email(&form.email) {
        issues.push(ValidationIssue::new(
            "email",
            "invalid_string",
            "Please enter a valid email address",
        ));
    }
    if !form.practitioner_email.is_empty() && !looks_like_email(&form.practitioner_email) {
        issues.push(ValidationIssue::new(
            "practitionerEmail",
            "invalid_string",
            "Please enter a valid practitioner email address",
        ));
    }

    if has_duplicate_answers(&form.answers) {
        issues.push(ValidationIssue::new(
            "duplicateResponses",
            "custom",
            DUPLICATE_MESSAGE,
        ));
    }

    if !form.practitioner_code.is_empty() {
        match registry.lookup(&form.practitioner_code) {
            None => issues.push(ValidationIssue::new(
                "practitionerCode",
                "custom",
                "Invalid practitioner code",
            )),
            Some(practitioner) => {
                if !form.practitioner_email.is_empty()
                    && !practitioner
                        .email
                        .eq_ignore_ascii_case(&form.practitioner_email)
                {
                    issues.push(ValidationIssue::new(
                        "practitionerEmail",
                        "custom",
                        "Practitioner email does not match the practitioner code",
                    ));
                }
            }
        }
    }

    if !issues.is_empty() {
        return Err(issues);
    }

    Ok(AssessmentAnswers {
        first_name: form.first_name,
        email: form.email,
        practitioner_code: form.practitioner_code,
        practitioner_email: form.practitioner_email,
        answers: form.answers,
    })
}

/// Empty answers are reported on their own field and are not compared here.
fn has_duplicate_answers(answers: &[String; 5]) -> bool {
    let mut seen = HashSet::new();
    answers
        .iter()
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty())
        .any(|a| !seen.insert(a))
}

fn looks_like_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|part| !part.is_empty())
}

const RAW_TEXT_ELEMENTS: [&str; 2] = ["script", "style"];

/// Trims and drops markup tags; a `<` that does not open a tag is kept.
/// Script and style elements are dropped together with their contents.
pub fn sanitize_input(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(c) = rest.chars().next() {
        let after = &rest[c.len_utf8()..];
        let opens_tag = c == '<'
            && after
                .chars()
                .next()
                .is_some_and(|n| n.is_ascii_alphabetic() || n == '/' || n == '!');
        if !opens_tag {
            out.push(c);
            rest = after;
            continue;
        }

        let (tag, remainder) = match after.find('>') {
            Some(end) => (&after[..end], &after[end + 1..]),
            None => (after, ""),
        };
        rest = match raw_text_element(tag) {
            Some(name) => skip_past_closing(remainder, name),
            None => remainder,
        };
    }

    out.trim().to_string()
}

fn raw_text_element(tag: &str) -> Option<&'static str> {
    if tag.trim_end().ends_with('/') {
        return None;
    }
    let name: String = tag
        .chars()
        .take_while(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_lowercase();
    RAW_TEXT_ELEMENTS.into_iter().find(|element| *element == name)
}

/// Everything after the closing tag of `name`, or nothing when it never closes.
fn skip_past_closing<'a>(text: &'a str, name: &str) -> &'a str {
    let closing = format!("</{name}");
    let Some(start) = text.to_ascii_lowercase().find(&closing) else {
        return "";
    };
    match text[start..].find('>') {
        Some(end) => &text[start + end + 1..],
        None => "",
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    pub(crate) fn registry() -> PractitionerRegistry {
        PractitionerRegistry::from_entries(vec![Practitioner {
            code: "NCM-1001".to_string(),
            email: "coach@example.com".to_string(),
            label: "Coach".to_string(),
        }])
        .unwrap()
    }

    pub(crate) fn form_json() -> Value {
        json!({
            "firstName": "Maya Lin",
            "email": "maya@example.com",
            "practitionerCode": "NCM-1001",
            "practitionerEmail": "coach@example.com",
            "ques1": "I feel lost",
            "ques2": "lost",
            "ques3": "I keep thinking I'm not enough",
            "ques4": "On a hike last spring",
            "ques5": "My habit of procrastinating",
        })
    }

    fn paths(issues: &[ValidationIssue]) -> Vec<&str> {
        issues.iter().map(|i| i.path[0].as_str()).collect()
    }

    #[test]
    fn test_valid_submission_passes() {
        let answers = validate(AssessmentForm::from_json(&form_json()), &registry()).unwrap();
        assert_eq!(answers.first_name, "Maya Lin");
        assert_eq!(answers.answers[1], "lost");
    }

    #[test]
    fn test_answers_differing_by_leading_text_are_distinct() {
        let mut value = form_json();
        value["ques1"] = json!("I feel lost");
        value["ques2"] = json!("lost");
        assert!(validate(AssessmentForm::from_json(&value), &registry()).is_ok());
    }

    #[test]
    fn test_duplicates_ignore_case_and_whitespace() {
        let mut value = form_json();
        value["ques4"] = json!("  I FEEL LOST ");
        let issues = validate(AssessmentForm::from_json(&value), &registry()).unwrap_err();
        assert_eq!(paths(&issues), vec!["duplicateResponses"]);
        assert_eq!(issues[0].message, DUPLICATE_MESSAGE);
    }

    #[test]
    fn test_missing_and_non_string_fields_are_reported() {
        let mut value = form_json();
        value["ques3"] = json!(42);
        value.as_object_mut().unwrap().remove("email");
        let issues = validate(AssessmentForm::from_json(&value), &registry()).unwrap_err();
        assert_eq!(paths(&issues), vec!["email", "ques3"]);
    }

    #[test]
    fn test_whitespace_only_answer_is_empty() {
        let mut value = form_json();
        value["ques5"] = json!("   ");
        let issues = validate(AssessmentForm::from_json(&value), &registry()).unwrap_err();
        assert_eq!(paths(&issues), vec!["ques5"]);
    }

    #[test]
    fn test_unknown_practitioner_code() {
        let mut value = form_json();
        value["practitionerCode"] = json!("NOPE");
        let issues = validate(AssessmentForm::from_json(&value), &registry()).unwrap_err();
        assert_eq!(paths(&issues), vec!["practitionerCode"]);
    }

    #[test]
    fn test_practitioner_email_must_match_code() {
        let mut value = form_json();
        value["practitionerEmail"] = json!("someone.else@example.com");
        let issues = validate(AssessmentForm::from_json(&value), &registry()).unwrap_err();
        assert_eq!(paths(&issues), vec!["practitionerEmail"]);

        value["practitionerEmail"] = json!("COACH@example.com");
        assert!(validate(AssessmentForm::from_json(&value), &registry()).is_ok());
    }

    #[test]
    fn test_invalid_email_format() {
        let mut value = form_json();
        value["email"] = json!("maya at example");
        let issues = validate(AssessmentForm::from_json(&value), &registry()).unwrap_err();
        assert_eq!(issues[0].code, "invalid_string");
    }

    #[test]
    fn test_sanitize_input_strips_markup() {
        assert_eq!(sanitize_input("  <b>bold</b> move "), "bold move");
        assert_eq!(sanitize_input("3 < 5 and 6 > 4"), "3 < 5 and 6 > 4");
    }

    #[test]
    fn test_sanitize_input_drops_script_and_style_bodies() {
        assert_eq!(sanitize_input("<script>alert(1)</script>ok"), "ok");
        assert_eq!(
            sanitize_input("before <STYLE type=\"text/css\">p { color: red }</Style > after"),
            "before  after"
        );
        assert_eq!(sanitize_input("keep <script src=x.js>never closed"), "keep");
        assert_eq!(sanitize_input("<scripted>text</scripted>"), "text");
        assert_eq!(sanitize_input("<b>caf\u{e9}</b> <script/>fine"), "caf\u{e9} fine");
    }

    proptest! {
        #[test]
        fn distinct_answers_are_never_duplicates(
            words in prop::collection::hash_set("[a-z]{1,12}", 5),
            pad in " {0,3}",
        ) {
            let answers: Vec<String> = words.into_iter().map(|w| format!("{pad}{w}")).collect();
            let answers: [String; 5] = answers.try_into().unwrap();
            prop_assert!(!has_duplicate_answers(&answers));
        }

        #[test]
        fn case_and_padding_variants_are_duplicates(
            words in prop::collection::hash_set("[a-z]{1,12}", 5),
            (from, to) in (0..5usize, 0..5usize).prop_filter("different slots", |(a, b)| a != b),
            pad in "[ \t]{0,3}",
            shout in any::<bool>(),
        ) {
            let mut answers: Vec<String> = words.into_iter().collect();
            let copied = if shout {
                answers[from].to_uppercase()
            } else {
                answers[from].clone()
            };
            answers[to] = format!("{pad}{copied}{pad}");
            let answers: [String; 5] = answers.try_into().unwrap();
            prop_assert!(has_duplicate_answers(&answers));
        }
    }

    #[test]
    fn test_email_shapes() {
        assert!(looks_like_email("a@b.co"));
        assert!(!looks_like_email("a@b"));
        assert!(!looks_like_email("@b.co"));
        assert!(!looks_like_email("a@@b.co"));
        assert!(!looks_like_email("a b@c.co"));
    }
}
