use crate::error::ParseError;

/// Base prompt plus a feedback block quoting the exact failure.
///
/// Built from the *base* prompt every time, so feedback from earlier attempts
/// never piles up; each distinct error yields a distinct prompt.
pub fn build_feedback_prompt(base_prompt: &str, error: &ParseError) -> String {
    format!(
        r#"{}

--- FEEDBACK ---
Your previous response was not valid. Error: {}
Review the required JSON structure, correct the error, and reply with only the valid JSON object. No markdown, no code fences, no explanations."#,
        base_prompt, error
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feedback_quotes_error_verbatim() {
        let error = ParseError::Schema {
            schema: "spatial_extraction",
            message: "missing field `spatial_features` at line 1 column 2".to_string(),
        };
        let prompt = build_feedback_prompt("Extract features.", &error);

        assert!(prompt.starts_with("Extract features.\n\n--- FEEDBACK ---"));
        assert!(prompt.contains("missing field `spatial_features` at line 1 column 2"));
    }

    #[test]
    fn test_distinct_errors_distinct_prompts() {
        let a = build_feedback_prompt("P", &ParseError::NoJson);
        let b = build_feedback_prompt(
            "P",
            &ParseError::Invalid {
                schema: "s",
                message: "confidence_score must be between 0.0 and 1.0, got 2".to_string(),
            },
        );
        assert_ne!(a, b);
        assert_eq!(a.matches("--- FEEDBACK ---").count(), 1);
    }
}
