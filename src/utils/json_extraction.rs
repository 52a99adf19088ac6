//! JSON extraction utilities for parsing LLM responses.
//!
//! Models asked for a JSON object often wrap it in a markdown fence or put
//! reasoning text around it. The extraction tries, in order:
//! 1. A ```json fenced block
//! 2. Any other fenced block containing an object
//! 3. The content itself when it starts with '{'
//! 4. The largest valid object anywhere in the content (later wins ties)
//!
//! # Example
//!
//! ```
//! use debate_forge::utils::json_extraction::extract_json_object;
//!
//! let response = "Sure!\n```json\n{\"position\": \"yes\"}\n```";
//! assert_eq!(extract_json_object(response).unwrap(), "{\"position\": \"yes\"}");
//! ```

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Error type for JSON extraction failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JsonExtractionError {
    #[error("JSON appears truncated: {unclosed_braces} unclosed braces. Partial: {partial_preview}...")]
    Truncated {
        partial_preview: String,
        unclosed_braces: usize,
    },
    #[error("No JSON object found in response. Content starts with: '{content_preview}'")]
    NotFound { content_preview: String },
    #[error("JSON object does not match the expected shape: {0}")]
    Invalid(String),
}

fn json_fence() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```json\s*\n?([\s\S]*?)\n?```").ok())
        .as_ref()
}

fn any_fence() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```(?:\w+)?\s*\n?([\s\S]*?)\n?```").ok())
        .as_ref()
}

/// Extracts the JSON object an LLM response most likely intends as its answer.
///
/// # Errors
///
/// Returns `JsonExtractionError::Truncated` when an object starts but never
/// closes, and `JsonExtractionError::NotFound` when there is no object at all.
pub fn extract_json_object(content: &str) -> Result<String, JsonExtractionError> {
    let trimmed = content.trim();

    for fence in [json_fence(), any_fence()].into_iter().flatten() {
        for caps in fence.captures_iter(trimmed) {
            if let Some(block) = caps.get(1) {
                if let Some(json) = first_valid_object(block.as_str().trim()) {
                    return Ok(json);
                }
            }
        }
    }

    if trimmed.starts_with('{') {
        if let Some(end) = find_matching_brace(trimmed) {
            let candidate = &trimmed[..=end];
            if is_valid_json(candidate) {
                return Ok(candidate.to_string());
            }
        }
    }

    if let Some(json) = largest_valid_object(trimmed) {
        return Ok(json);
    }

    if let Some(start) = trimmed.find('{') {
        let unclosed_braces = unclosed_braces(&trimmed[start..]);
        if unclosed_braces > 0 {
            return Err(JsonExtractionError::Truncated {
                partial_preview: preview(&trimmed[start..], 100),
                unclosed_braces,
            });
        }
    }

    Err(JsonExtractionError::NotFound {
        content_preview: preview(trimmed, 50),
    })
}

/// Extracts and deserializes the JSON object in an LLM response.
pub fn parse_json_response<T: DeserializeOwned>(content: &str) -> Result<T, JsonExtractionError> {
    let json = extract_json_object(content)?;
    serde_json::from_str(&json).map_err(|e| JsonExtractionError::Invalid(e.to_string()))
}

/// Finds the index of the '}' closing the object that starts at `s[0]`.
///
/// Braces inside string literals (including escaped quotes) are ignored.
pub fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

fn is_valid_json(candidate: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(candidate).is_ok()
}

fn first_valid_object(block: &str) -> Option<String> {
    let start = block.find('{')?;
    let end = find_matching_brace(&block[start..])?;
    let candidate = &block[start..=start + end];
    is_valid_json(candidate).then(|| candidate.to_string())
}

/// Largest valid object in `content`; among equal sizes the later one wins.
fn largest_valid_object(content: &str) -> Option<String> {
    content
        .char_indices()
        .filter(|(_, c)| *c == '{')
        .filter_map(|(start, _)| {
            let end = find_matching_brace(&content[start..])?;
            let candidate = &content[start..=start + end];
            is_valid_json(candidate).then_some((start, candidate))
        })
        .max_by(|(pos_a, a), (pos_b, b)| a.len().cmp(&b.len()).then(pos_a.cmp(pos_b)))
        .map(|(_, json)| json.to_string())
}

fn unclosed_braces(s: &str) -> usize {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for c in s.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    depth
}

fn preview(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_json() {
        let input = r#"{"key": "value"}"#;
        assert_eq!(extract_json_object(input).unwrap(), input);
    }

    #[test]
    fn test_json_code_block() {
        let input = "Here you go:\n```json\n{\"position\": \"adopt\", \"confidence\": 0.7}\n```\nThanks";
        let json = extract_json_object(input).unwrap();
        assert!(json.contains("adopt"));
    }

    #[test]
    fn test_generic_code_block() {
        let input = "```\n{\"a\": 1}\n```";
        assert_eq!(extract_json_object(input).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn test_reasoning_before_json_prefers_largest_object() {
        let input = r#"I considered {"x": 1} but settled on {"position": "no", "reasoning": "costly"}"#;
        let json = extract_json_object(input).unwrap();
        assert!(json.contains("costly"));
    }

    #[test]
    fn test_braces_inside_strings() {
        let input = r#"{"position": "use {braces} freely", "n": 2}"#;
        assert_eq!(extract_json_object(input).unwrap(), input);
    }

    #[test]
    fn test_truncated_json() {
        let err = extract_json_object(r#"{"position": "yes", "reasoning": "because"#).unwrap_err();
        assert!(matches!(err, JsonExtractionError::Truncated { unclosed_braces: 1, .. }));
    }

    #[test]
    fn test_not_found() {
        let err = extract_json_object("I refuse to answer in JSON.").unwrap_err();
        assert!(matches!(err, JsonExtractionError::NotFound { .. }));
    }

    #[test]
    fn test_parse_json_response_shape_mismatch() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Verdict {
            agreement_level: f64,
        }

        let parsed: Verdict = parse_json_response(r#"{"agreement_level": 0.5}"#).unwrap();
        assert!((parsed.agreement_level - 0.5).abs() < f64::EPSILON);

        let err = parse_json_response::<Verdict>(r#"{"level": "high"}"#).unwrap_err();
        assert!(matches!(err, JsonExtractionError::Invalid(_)));
    }
}
