//! Turns free-form model answers into entity maps.
//!
//! Models are asked for a bare JSON object but regularly wrap it in code
//! fences, add a sentence before or after it, or answer with prose only.
//! Parsing never fails: the worst case keeps the raw answer under
//! `raw_text` and reports the result as degraded.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::models::document::DocumentType;
use crate::models::record::EntityMap;

/// Key used for the raw answer when no JSON could be recovered.
pub const RAW_TEXT_KEY: &str = "raw_text";

/// Key used to wrap a top-level array.
pub const ITEMS_KEY: &str = "items";

/// How the entity map was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    /// The answer contained a JSON object.
    Structured,
    /// The answer was a top-level JSON array, wrapped under `items`.
    Wrapped,
    /// No JSON was found; the raw answer is kept under `raw_text`.
    Degraded,
}

/// Parser output.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub entities: EntityMap,
    pub status: ParseStatus,
    pub warnings: Vec<String>,
}

/// Tolerant JSON recovery for model answers.
pub struct ResponseParser;

impl ResponseParser {
    /// Parse a raw answer for a document of `doc_type`.
    pub fn parse(raw: &str, doc_type: DocumentType) -> ParsedResponse {
        let body = strip_code_fences(raw);

        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(entities)) => {
                debug!(document_type = %doc_type, keys = entities.len(), "Parsed JSON answer");
                return ParsedResponse {
                    entities,
                    status: ParseStatus::Structured,
                    warnings: Vec::new(),
                };
            }
            Ok(Value::Array(items)) => {
                debug!(document_type = %doc_type, items = items.len(), "Wrapped JSON array answer");
                let mut entities = Map::new();
                entities.insert(ITEMS_KEY.to_string(), Value::Array(items));
                return ParsedResponse {
                    entities,
                    status: ParseStatus::Wrapped,
                    warnings: vec![format!(
                        "model answered with a JSON array; wrapped under `{ITEMS_KEY}`"
                    )],
                };
            }
            _ => {}
        }

        let candidates = embedded_objects(body);
        if let Some(entities) = candidates.iter().max_by_key(|(len, _)| *len).map(|(_, map)| map.clone()) {
            debug!(
                document_type = %doc_type,
                candidates = candidates.len(),
                keys = entities.len(),
                "Recovered JSON object from surrounding text"
            );
            let mut warnings = vec!["JSON object recovered from surrounding text".to_string()];
            if candidates.len() > 1 {
                warnings.push(format!(
                    "{} separate JSON objects found; kept the largest",
                    candidates.len()
                ));
            }
            return ParsedResponse {
                entities,
                status: ParseStatus::Structured,
                warnings,
            };
        }

        debug!(document_type = %doc_type, "No JSON in answer, keeping raw text");
        let mut entities = Map::new();
        entities.insert(RAW_TEXT_KEY.to_string(), Value::String(raw.to_string()));
        ParsedResponse {
            entities,
            status: ParseStatus::Degraded,
            warnings: vec!["no JSON object found in the answer; raw text kept".to_string()],
        }
    }
}

/// Remove a surrounding markdown code fence, if any.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (```json) on the opening line.
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// All top-level `{...}` spans in `text` that parse as JSON objects.
///
/// Spans nested inside an accepted span are not reported separately.
/// Returns `(byte length, object)` pairs in order of appearance.
fn embedded_objects(text: &str) -> Vec<(usize, EntityMap)> {
    let mut found = Vec::new();
    let mut covered_until = 0;

    // Outer spans sort before the spans they enclose.
    for (open, close) in brace_spans(text.as_bytes()) {
        if open < covered_until {
            continue;
        }
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&text[open..=close]) {
            found.push((close + 1 - open, map));
            covered_until = close + 1;
        }
    }

    found
}

/// Every balanced `{...}` pair in `bytes`, ordered by opening offset.
///
/// String literals are only tracked inside braces, so quotes in surrounding
/// prose do not hide an object. Unclosed braces produce no span.
fn brace_spans(bytes: &[u8]) -> Vec<(usize, usize)> {
    let mut open_braces = Vec::new();
    let mut spans = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match b {
            b'"' if !open_braces.is_empty() => in_string = true,
            b'{' => open_braces.push(i),
            b'}' => {
                if let Some(open) = open_braces.pop() {
                    spans.push((open, i));
                }
            }
            _ => {}
        }
    }

    spans.sort_unstable();
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn parse(raw: &str) -> ParsedResponse {
        ResponseParser::parse(raw, DocumentType::Invoice)
    }

    #[test]
    fn test_plain_object() {
        let parsed = parse(r#"{"invoice_number": "INV-001", "total": "100.00"}"#);
        assert_eq!(parsed.status, ParseStatus::Structured);
        assert_eq!(Value::Object(parsed.entities), json!({"invoice_number": "INV-001", "total": "100.00"}));
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_code_fence() {
        let parsed = parse("```json\n{\"total\": 12.5, \"tax\": null}\n```");
        assert_eq!(parsed.status, ParseStatus::Structured);
        assert_eq!(Value::Object(parsed.entities), json!({"total": 12.5, "tax": null}));
    }

    #[test]
    fn test_embedded_object_is_recovered_exactly() {
        let raw = "Here is the data you asked for:\n{\"vendor\": \"ACME {Ltd}\", \"line_items\": [{\"qty\": 2}]}\nLet me know!";
        let parsed = parse(raw);
        assert_eq!(parsed.status, ParseStatus::Structured);
        assert_eq!(
            Value::Object(parsed.entities),
            json!({"vendor": "ACME {Ltd}", "line_items": [{"qty": 2}]})
        );
    }

    #[test]
    fn test_largest_object_wins() {
        let raw = r#"Draft: {"a": 1} Final: {"a": 1, "b": {"c": "\"}"}}"#;
        let parsed = parse(raw);
        assert_eq!(Value::Object(parsed.entities), json!({"a": 1, "b": {"c": "\"}"}}));
        assert_eq!(parsed.warnings.len(), 2);
    }

    #[test]
    fn test_broken_outer_object_falls_back_to_inner() {
        let raw = r#"{"outer": oops, "inner": {"total": 5}}"#;
        let parsed = parse(raw);
        assert_eq!(parsed.status, ParseStatus::Structured);
        assert_eq!(Value::Object(parsed.entities), json!({"total": 5}));
    }

    #[test]
    fn test_top_level_array_is_wrapped() {
        let parsed = parse(r#"[{"description": "Coffee"}]"#);
        assert_eq!(parsed.status, ParseStatus::Wrapped);
        assert_eq!(Value::Object(parsed.entities), json!({"items": [{"description": "Coffee"}]}));
    }

    #[test]
    fn test_scalar_array_is_wrapped_not_degraded() {
        let parsed = parse("[1, 2]");
        assert_eq!(parsed.status, ParseStatus::Wrapped);
        assert_eq!(Value::Object(parsed.entities), json!({"items": [1, 2]}));
    }

    #[test]
    fn test_prose_degrades_to_raw_text() {
        let raw = "  I could not read this document.  ";
        let parsed = parse(raw);
        assert_eq!(parsed.status, ParseStatus::Degraded);
        assert_eq!(Value::Object(parsed.entities), json!({"raw_text": raw}));
    }

    #[test]
    fn test_unbalanced_braces_degrade() {
        let parsed = parse("{\"total\": \"10\"");
        assert_eq!(parsed.status, ParseStatus::Degraded);
    }

    #[test]
    fn test_empty_object_is_valid() {
        let parsed = parse("{}");
        assert_eq!(parsed.status, ParseStatus::Structured);
        assert!(parsed.entities.is_empty());
    }

    #[test]
    fn test_duplicate_key_keeps_last_value() {
        let parsed = parse(r#"{"total":"1","total":"2"}"#);
        assert_eq!(parsed.status, ParseStatus::Structured);
        assert_eq!(Value::Object(parsed.entities), json!({"total": "2"}));
    }

    #[test]
    fn test_quotes_in_prose_do_not_hide_object() {
        let parsed = parse(r#"The "total" is below: {"total": 7}"#);
        assert_eq!(parsed.status, ParseStatus::Structured);
        assert_eq!(Value::Object(parsed.entities), json!({"total": 7}));
    }

    #[test]
    fn test_many_unclosed_braces_degrade_quickly() {
        let raw = "{".repeat(200_000);
        let started = std::time::Instant::now();
        let parsed = parse(&raw);
        assert_eq!(parsed.status, ParseStatus::Degraded);
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn test_brace_spans() {
        assert_eq!(brace_spans(b"{a{b}c}"), vec![(0, 6), (2, 4)]);
        assert_eq!(brace_spans(br#"{"}"} {"#), vec![(0, 4)]);
        assert_eq!(brace_spans(b"}{"), Vec::<(usize, usize)>::new());
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {}  "), "{}");
        assert_eq!(strip_code_fences("```json\n[1]```"), "[1]");
    }
}
