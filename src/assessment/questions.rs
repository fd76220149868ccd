/// The five fixed assessment questions, numbered as they appear in reports.
pub const QUESTIONS: [&str; 5] = [
    "1. Where are you right now in your life, emotionally and mentally?",
    "2. What is something you deeply want\u{2014}but haven't yet achieved?",
    "3. What recurring thoughts, fears, or beliefs do you find yourself struggling with?",
    "4. When was the last time you felt truly aligned\u{2014}with yourself, your goals, or your life?",
    "5. If you could reprogram one part of your mind\u{2014}one habit, belief, or emotional pattern\u{2014}what would it be, and why?",
];

/// Question text without its leading "N. " numbering.
pub fn question_text(index: usize) -> &'static str {
    let question = QUESTIONS[index];
    question
        .split_once(". ")
        .map(|(_, text)| text)
        .unwrap_or(question)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_text_strips_numbering() {
        assert_eq!(
            question_text(0),
            "Where are you right now in your life, emotionally and mentally?"
        );
        for (i, q) in QUESTIONS.iter().enumerate() {
            assert!(q.starts_with(&format!("{}. ", i + 1)));
            assert!(!question_text(i).starts_with(char::is_numeric));
        }
    }
}
