//! Recovery of a [`ResearchResult`] from free-form model text.
//!
//! The final answer is supposed to be a JSON object, but models wrap it in
//! prose or code fences, or emit stray braces before it. Recovery scans the
//! text for balanced top-level `{...}` spans (brace counting that skips
//! string literals and escapes) and tries each in order. When none parses,
//! the span from the first `{` to the last `}` is tried as a last resort.
//!
//! A candidate is accepted only if it is a JSON object carrying at least one
//! research-result key, so an unrelated object in the prose cannot win.

use serde_json::Value;
use tracing::{debug, trace};

use crate::result::{ResearchResult, RESULT_KEYS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery {
    Parsed(ResearchResult),
    /// `raw_text` is the input, unmodified.
    Failed { raw_text: String, reason: String },
}

pub fn recover(text: &str) -> Recovery {
    let mut last_error = None;

    let spans = balanced_spans(text);
    trace!(spans = spans.len(), "Scanning for research result");
    for span in &spans {
        match parse_candidate(span) {
            Ok(result) => return Recovery::Parsed(result),
            Err(e) => last_error = Some(e),
        }
    }

    if let Some(span) = outer_span(text) {
        if !spans.contains(&span) {
            match parse_candidate(span) {
                Ok(result) => {
                    debug!("Recovered research result from outer brace span");
                    return Recovery::Parsed(result);
                }
                Err(e) => last_error = Some(e),
            }
        }
    }

    Recovery::Failed {
        raw_text: text.to_string(),
        reason: last_error.unwrap_or_else(|| "no JSON object found in response".to_string()),
    }
}

fn parse_candidate(span: &str) -> Result<ResearchResult, String> {
    let value: Value = serde_json::from_str(span).map_err(|e| e.to_string())?;
    let Value::Object(map) = &value else {
        return Err("JSON value is not an object".to_string());
    };
    if !RESULT_KEYS.iter().any(|key| map.contains_key(*key)) {
        return Err("JSON object has none of the research result fields".to_string());
    }
    serde_json::from_value(value).map_err(|e| e.to_string())
}

/// Top-level `{...}` spans whose braces balance outside string literals.
pub fn balanced_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if depth == 0 {
            if ch == '{' {
                depth = 1;
                start = i;
                in_string = false;
                escaped = false;
            }
            continue;
        }

        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    spans.push(&text[start..=i]);
                }
            }
            _ => {}
        }
    }

    spans
}

/// From the first `{` to the last `}`, if they are in that order.
fn outer_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::Source;

    fn parsed(text: &str) -> ResearchResult {
        match recover(text) {
            Recovery::Parsed(result) => result,
            Recovery::Failed { reason, .. } => panic!("expected parse, got failure: {}", reason),
        }
    }

    #[test]
    fn test_embedded_object() {
        let text = r#"Here is the result: {"topic":"X","summary":"Y","key_points":[],"sources":[],"tools_used":[]} thanks"#;
        let result = parsed(text);
        assert_eq!(result.topic, "X");
        assert_eq!(result.summary, "Y");
    }

    #[test]
    fn test_no_braces_preserves_text() {
        let text = "I could not find anything useful.\n  Sorry!  ";
        match recover(text) {
            Recovery::Failed { raw_text, .. } => assert_eq!(raw_text, text),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_json_preserves_text() {
        let text = "{topic: X, summary: Y}";
        match recover(text) {
            Recovery::Failed { raw_text, reason } => {
                assert_eq!(raw_text, text);
                assert!(!reason.is_empty());
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_idempotent() {
        let result = ResearchResult {
            topic: "Rust ownership".to_string(),
            summary: "Ownership rules with \"quotes\" and {braces}.".to_string(),
            key_points: vec!["Moves".to_string(), "Borrows".to_string()],
            sources: vec![Source::new("The Book", "https://doc.rust-lang.org/book/")],
            tools_used: vec!["search_web".to_string()],
        };
        let text = serde_json::to_string_pretty(&result).unwrap();
        let once = parsed(&text);
        assert_eq!(once, result);
        let twice = parsed(&serde_json::to_string(&once).unwrap());
        assert_eq!(twice, once);
    }

    #[test]
    fn test_code_fence_and_prose_braces() {
        let text = "Sets like {a, b} aside, here you go:\n```json\n{\"topic\": \"T\", \"summary\": \"S\"}\n```";
        assert_eq!(parsed(text).topic, "T");
    }

    #[test]
    fn test_unrelated_object_is_skipped() {
        let text = r#"I called {"input": "rust"} first. Final: {"topic": "Rust", "key_points": ["fast"]}"#;
        let result = parsed(text);
        assert_eq!(result.topic, "Rust");
        assert_eq!(result.key_points, vec!["fast"]);
    }

    #[test]
    fn test_balanced_spans_respect_strings() {
        let text = r#"x {"a": "} \" {"} y {"b": {"c": 1}} z }"#;
        assert_eq!(
            balanced_spans(text),
            vec![r#"{"a": "} \" {"}"#, r#"{"b": {"c": 1}}"#]
        );
    }

    #[test]
    fn test_unbalanced_tail_is_ignored() {
        assert!(balanced_spans(r#"{"topic": "X""#).is_empty());
        assert!(matches!(recover(r#"{"topic": "X""#), Recovery::Failed { .. }));
    }

    #[test]
    fn test_outer_span() {
        assert_eq!(outer_span("a {b} c {d} e"), Some("{b} c {d}"));
        assert_eq!(outer_span("} before {"), None);
        assert_eq!(outer_span("none"), None);
    }
}
