//! Resilient extraction of a JSON value from free-form LLM output.
//!
//! Model responses routinely wrap the JSON payload in explanatory prose,
//! fenced code blocks, `<think>` reasoning traces, or even concatenate
//! several `{"claims": [...]}` objects back to back. [`extract`] tries a
//! sequence of increasingly permissive strategies and returns the first
//! one that parses.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::error::{JsonExtractError, JsonExtractResult};

lazy_static! {
    static ref FENCED_BLOCK: Regex =
        Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap();
    static ref THINK_BLOCK: Regex = Regex::new(r"(?s)</think>\s*(\{.*\})").unwrap();
    static ref CLAIMS_OBJECT: Regex = Regex::new(r#"(?s)(\{"claims":\s*\[.*?\]\s*\})"#).unwrap();
    static ref TAXONOMY_PATTERN: Regex =
        Regex::new(r#"(?s)(\{"taxonomy".*?\}\s*\]?\s*\})"#).unwrap();
    static ref CLAIMS_PATTERN: Regex = Regex::new(r#"(?s)(\{"claims":\s*\[.*?\]\s*\})"#).unwrap();
    static ref PROSE_PREFIX: Regex =
        Regex::new(r"(?is)(?:output|result|JSON|taxonomy|claims):\s*(\{.*?\})").unwrap();
}

/// Strips `//` line comments that occur outside of string literals,
/// tracking quote state and backslash escapes. Lines that are empty after
/// stripping are dropped entirely.
pub fn strip_line_comments(input: &str) -> String {
    let mut out_lines = Vec::new();
    for line in input.lines() {
        let mut in_string = false;
        let mut escape_next = false;
        let mut comment_at: Option<usize> = None;
        let chars: Vec<char> = line.chars().collect();
        for (i, &c) in chars.iter().enumerate() {
            if escape_next {
                escape_next = false;
                continue;
            }
            if c == '\\' {
                escape_next = true;
                continue;
            }
            if c == '"' {
                in_string = !in_string;
                continue;
            }
            if !in_string && c == '/' && i + 1 < chars.len() && chars[i + 1] == '/' {
                comment_at = Some(i);
                break;
            }
        }
        let cleaned = match comment_at {
            Some(pos) => chars[..pos].iter().collect::<String>(),
            None => line.to_string(),
        };
        let trimmed_end = cleaned.trim_end();
        if !trimmed_end.trim().is_empty() {
            out_lines.push(trimmed_end.to_string());
        }
    }
    out_lines.join("\n")
}

fn try_parse(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok()
}

fn try_parse_with_comment_fallback(text: &str) -> Option<Value> {
    try_parse(text).or_else(|| try_parse(&strip_line_comments(text)))
}

/// Walks brace depth across `content`, splitting out each top-level
/// `{"claims": ...}`-shaped object and merging their `claims` arrays.
/// Returns `None` if fewer than two such objects are found.
fn merge_multiple_claims_objects(content: &str) -> Option<Value> {
    let mut objects = Vec::new();
    let bytes: Vec<char> = content.chars().collect();
    let mut i = 0;
    while let Some(rel) = content[byte_index(&bytes, i)..].find("{\"claims\"") {
        let start = byte_index(&bytes, i) + rel;
        let start_char_idx = content[..start].chars().count();
        let mut depth = 0i32;
        let mut end_char_idx = None;
        for (offset, &c) in bytes[start_char_idx..].iter().enumerate() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        end_char_idx = Some(start_char_idx + offset);
                        break;
                    }
                }
                _ => {}
            }
        }
        match end_char_idx {
            Some(end) => {
                let obj_str: String = bytes[start_char_idx..=end].iter().collect();
                if let Some(v) = try_parse_with_comment_fallback(&obj_str) {
                    objects.push(v);
                }
                i = end + 1;
            }
            None => break,
        }
        if i >= bytes.len() {
            break;
        }
    }
    if objects.len() < 2 {
        return None;
    }
    let mut all_claims = Vec::new();
    for obj in objects {
        if let Some(Value::Array(arr)) = obj.get("claims").cloned() {
            all_claims.extend(arr);
        }
    }
    if all_claims.is_empty() {
        None
    } else {
        Some(serde_json::json!({ "claims": all_claims }))
    }
}

fn byte_index(chars: &[char], char_idx: usize) -> usize {
    chars[..char_idx].iter().map(|c| c.len_utf8()).sum()
}

/// Find all non-overlapping matches of `CLAIMS_OBJECT` and, if there is
/// more than one, concatenate their `claims` arrays into one object.
fn multiple_claims_objects_regex(content: &str) -> Option<Value> {
    let matches: Vec<&str> = CLAIMS_OBJECT
        .find_iter(content)
        .map(|m| m.as_str())
        .collect();
    if matches.len() < 2 {
        return None;
    }
    let mut all_claims = Vec::new();
    for m in matches {
        if let Some(v) = try_parse(m) {
            if let Some(Value::Array(arr)) = v.get("claims").cloned() {
                all_claims.extend(arr);
            }
        }
    }
    if all_claims.is_empty() {
        None
    } else {
        Some(serde_json::json!({ "claims": all_claims }))
    }
}

fn bracket_scan_repair(content: &str) -> Option<Value> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }
    let slice = &content[start..=end];
    if slice.matches("{\"claims\"").count() > 1 {
        if let Some(v) = merge_multiple_claims_objects(slice) {
            return Some(v);
        }
    }
    try_parse_with_comment_fallback(slice)
}

/// Extract a JSON value from possibly-noisy LLM output text, trying each
/// strategy in order and returning the first success.
pub fn extract(text: &str) -> JsonExtractResult<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(JsonExtractError::Exhausted(String::new()));
    }

    // 1. Whole-string parse.
    if let Some(v) = try_parse(trimmed) {
        return Ok(v);
    }

    // 2. Whole-string with comments stripped.
    let stripped = strip_line_comments(trimmed);
    if let Some(v) = try_parse(&stripped) {
        return Ok(v);
    }

    // 3. Fenced code block.
    if let Some(caps) = FENCED_BLOCK.captures(trimmed) {
        let candidate = caps.get(1).unwrap().as_str();
        if let Some(v) = try_parse_with_comment_fallback(candidate) {
            return Ok(v);
        }
    }

    // 4. Post-thinking block.
    if let Some(caps) = THINK_BLOCK.captures(trimmed) {
        let candidate = caps.get(1).unwrap().as_str();
        if let Some(v) = try_parse_with_comment_fallback(candidate) {
            return Ok(v);
        }
    }

    // 5. Multiple {"claims": [...]} objects via regex scan.
    if let Some(v) = multiple_claims_objects_regex(trimmed) {
        return Ok(v);
    }

    // 6. Named-object patterns by field.
    if let Some(caps) = TAXONOMY_PATTERN.captures(trimmed) {
        let mut candidate = caps.get(1).unwrap().as_str().to_string();
        if !candidate.ends_with('}') {
            candidate.push('}');
        }
        if let Some(v) = try_parse_with_comment_fallback(&candidate) {
            return Ok(v);
        }
    }
    if let Some(caps) = CLAIMS_PATTERN.captures(trimmed) {
        let candidate = caps.get(1).unwrap().as_str();
        if let Some(v) = try_parse_with_comment_fallback(candidate) {
            return Ok(v);
        }
    }

    // 7. Introductory prose.
    if let Some(caps) = PROSE_PREFIX.captures(trimmed) {
        let candidate = caps.get(1).unwrap().as_str();
        if let Some(v) = try_parse(candidate) {
            return Ok(v);
        }
    }

    // 8. Bracket-scan repair.
    if let Some(v) = bracket_scan_repair(trimmed) {
        return Ok(v);
    }

    let preview: String = trimmed.chars().take(200).collect();
    Err(JsonExtractError::Exhausted(preview))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_string_parse() {
        let v = extract(r#"{"taxonomy": [{"topicName": "Test"}]}"#).unwrap();
        assert_eq!(v["taxonomy"][0]["topicName"], "Test");
    }

    #[test]
    fn strips_line_comments() {
        let text = "{\n  \"a\": 1, // a comment\n  \"b\": \"http://x\" // another\n}";
        let v = extract(text).unwrap();
        assert_eq!(v["a"], 1);
        assert_eq!(v["b"], "http://x");
    }

    #[test]
    fn comment_marker_inside_string_is_preserved() {
        let text = r#"{"url": "http://example.com"}"#;
        let v = extract(text).unwrap();
        assert_eq!(v["url"], "http://example.com");
    }

    #[test]
    fn fenced_code_block() {
        let text = "Here you go:\n```json\n{\"claims\": [{\"claim\": \"test\"}]}\n```\nthanks";
        let v = extract(text).unwrap();
        assert_eq!(v["claims"][0]["claim"], "test");
    }

    #[test]
    fn fenced_block_without_json_tag() {
        let text = "```\n{\"taxonomy\": []}\n```";
        let v = extract(text).unwrap();
        assert_eq!(v["taxonomy"], serde_json::json!([]));
    }

    #[test]
    fn post_thinking_block() {
        let text = "reasoning reasoning </think>\n{\"taxonomy\": []}";
        let v = extract(text).unwrap();
        assert_eq!(v["taxonomy"], serde_json::json!([]));
    }

    #[test]
    fn multiple_claims_objects_concatenated() {
        let text = r#"{"claims": [{"claim":"a"}]} {"claims": [{"claim":"b"}]}"#;
        let v = extract(text).unwrap();
        let arr = v["claims"].as_array().unwrap();
        assert_eq!(arr.len(), 2);
    }

    #[test]
    fn introductory_prose() {
        let text = "Here is the result: {\"taxonomy\": []}";
        let v = extract(text).unwrap();
        assert_eq!(v["taxonomy"], serde_json::json!([]));
    }

    #[test]
    fn taxonomy_missing_trailing_brace_is_repaired() {
        let text = r#"Output: {"taxonomy": [{"topicName": "Pets", "topicShortDescription": "d", "subtopics": []}]"#;
        let v = extract(text).unwrap();
        assert_eq!(v["taxonomy"][0]["topicName"], "Pets");
    }

    #[test]
    fn bracket_scan_repair_with_multiple_claims() {
        let text = "garbage {\"claims\": [{\"claim\":\"a\"}]} noise {\"claims\": [{\"claim\":\"b\"}]} trailing garbage without closing braces matching";
        let v = extract(text).unwrap();
        let arr = v["claims"].as_array().unwrap();
        assert_eq!(arr.len(), 2);
    }

    #[test]
    fn exhausted_includes_first_200_chars() {
        let garbage = "x".repeat(300);
        let err = extract(&garbage).unwrap_err();
        match err {
            JsonExtractError::Exhausted(s) => assert_eq!(s.len(), 200),
        }
    }

    #[test]
    fn round_trip_law_for_valid_object() {
        let j = serde_json::json!({"taxonomy": [{"topicName": "X", "topicShortDescription": "y", "subtopics": []}]});
        let s = serde_json::to_string(&j).unwrap();
        let back = extract(&s).unwrap();
        assert_eq!(back, j);
    }

    #[test]
    fn round_trip_law_for_fenced_block() {
        let j = serde_json::json!({"claims": [{"claim": "x"}]});
        let s = format!(
            "prefix\n```json\n{}\n```\nsuffix",
            serde_json::to_string(&j).unwrap()
        );
        let back = extract(&s).unwrap();
        assert_eq!(back, j);
    }

    #[test]
    fn round_trip_law_for_concatenated_claims() {
        let a = serde_json::json!([{"claim": "a1"}, {"claim": "a2"}]);
        let b = serde_json::json!([{"claim": "b1"}]);
        let s = format!(
            "{} {}",
            serde_json::to_string(&serde_json::json!({"claims": a})).unwrap(),
            serde_json::to_string(&serde_json::json!({"claims": b})).unwrap()
        );
        let back = extract(&s).unwrap();
        let arr = back["claims"].as_array().unwrap();
        assert_eq!(arr.len(), 3);
    }
}
