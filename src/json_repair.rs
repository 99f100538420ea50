//! Tolerant extraction of JSON from model output.
//!
//! Stages run in order and stop at the first success:
//! fence strip, envelope locate, string-aware repair, partial salvage of a
//! `processed_data` / `data` array. Every stage after the envelope reports
//! what it did in `issues`.

use crate::error::{AssistantError, Result};
use log::warn;
use serde::Serialize;
use serde_json::{Map, Value};

const SALVAGE_KEYS: [&str; 2] = ["processed_data", "data"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStage {
    Direct,
    Envelope,
    Repaired,
    Salvaged,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedJson {
    pub value: Value,
    pub stage: ExtractionStage,
    pub issues: Vec<String>,
}

impl ExtractedJson {
    /// Canonical JSON text of the extracted value.
    pub fn text(&self) -> String {
        self.value.to_string()
    }

    pub fn is_partial(&self) -> bool {
        self.stage == ExtractionStage::Salvaged
    }
}

pub fn extract_json(raw: &str) -> Result<ExtractedJson> {
    let stripped = strip_fences(raw);

    // A bare scalar is never a usable reply; let the later stages look for
    // an object inside it.
    if let Ok(value @ (Value::Object(_) | Value::Array(_))) =
        serde_json::from_str::<Value>(stripped)
    {
        return Ok(ExtractedJson {
            value,
            stage: ExtractionStage::Direct,
            issues: Vec::new(),
        });
    }

    let Some(open) = stripped.find('{') else {
        return Err(AssistantError::ProviderFormat {
            message: "No JSON object found in model output".to_string(),
            position: None,
        });
    };
    let tail = &stripped[open..];
    let envelope = match stripped.rfind('}') {
        Some(close) if close > open => &stripped[open..=close],
        _ => tail,
    };

    let first_error = match serde_json::from_str::<Value>(envelope) {
        Ok(value) => {
            return Ok(ExtractedJson {
                value,
                stage: ExtractionStage::Envelope,
                issues: Vec::new(),
            })
        }
        Err(e) => e,
    };

    for candidate in [envelope, tail] {
        let (repaired, closed_brackets) = repair_reporting(candidate);
        // Closing brackets on a slice shorter than the tail would drop content.
        if closed_brackets && candidate.len() != tail.len() {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<Value>(&repaired) {
            warn!("Model output required JSON repair");
            return Ok(ExtractedJson {
                value,
                stage: ExtractionStage::Repaired,
                issues: vec!["Malformed JSON was repaired before parsing".to_string()],
            });
        }
    }

    if let Some((value, issues)) = salvage(tail) {
        warn!("Model output was only partially recovered: {}", issues.join("; "));
        return Ok(ExtractedJson {
            value,
            stage: ExtractionStage::Salvaged,
            issues,
        });
    }

    let position = open + byte_offset(envelope, first_error.line(), first_error.column());
    Err(AssistantError::ProviderFormat {
        message: format!(
            "Unparseable JSON at line {} column {}: {}",
            first_error.line(),
            first_error.column(),
            first_error
        ),
        position: Some(position),
    })
}

/// Removes a leading ```` ```json ```` / ```` ``` ```` fence and its closing fence.
pub fn strip_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
        };
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

fn byte_offset(text: &str, line: usize, column: usize) -> usize {
    let mut offset = 0;
    for (idx, current) in text.split_inclusive('\n').enumerate() {
        if idx + 1 == line {
            return offset + column.saturating_sub(1).min(current.len());
        }
        offset += current.len();
    }
    offset
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Last {
    Nothing,
    Open,
    Comma,
    Colon,
    ValueEnd,
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-' | '_')
}

fn drop_trailing_comma(out: &mut String) {
    let trimmed_len = out.trim_end().len();
    if out[..trimmed_len].ends_with(',') {
        out.truncate(trimmed_len - 1);
    }
}

/// Single string-aware pass. Outside string literals it inserts missing
/// commas between adjacent values, drops trailing commas, and closes
/// unbalanced brackets; inside literals it collapses raw CR/LF/TAB runs to a
/// space. An unterminated literal gets its closing quote.
pub fn repair(input: &str) -> String {
    repair_reporting(input).0
}

/// Like [`repair`], also telling whether unbalanced brackets were closed.
fn repair_reporting(input: &str) -> (String, bool) {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 16);
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut last = Last::Nothing;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if in_string {
            if escaped {
                out.push(c);
                escaped = false;
            } else {
                match c {
                    '\\' => {
                        out.push(c);
                        escaped = true;
                    }
                    '"' => {
                        out.push(c);
                        in_string = false;
                        last = Last::ValueEnd;
                    }
                    '\r' | '\n' | '\t' => {
                        while i + 1 < chars.len() && matches!(chars[i + 1], '\r' | '\n' | '\t') {
                            i += 1;
                        }
                        out.push(' ');
                    }
                    _ => out.push(c),
                }
            }
            i += 1;
            continue;
        }

        match c {
            '"' => {
                if last == Last::ValueEnd {
                    out.push(',');
                }
                out.push(c);
                in_string = true;
            }
            '{' | '[' => {
                if last == Last::ValueEnd {
                    out.push(',');
                }
                out.push(c);
                stack.push(c);
                last = Last::Open;
            }
            '}' | ']' => {
                drop_trailing_comma(&mut out);
                out.push(c);
                stack.pop();
                last = Last::ValueEnd;
            }
            ',' => {
                out.push(c);
                last = Last::Comma;
            }
            ':' => {
                out.push(c);
                last = Last::Colon;
            }
            c if c.is_whitespace() => out.push(c),
            c if is_token_char(c) => {
                let start = i;
                while i < chars.len() && is_token_char(chars[i]) {
                    i += 1;
                }
                let token: String = chars[start..i].iter().collect();
                if last == Last::ValueEnd {
                    out.push(',');
                }
                out.push_str(match token.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    other => other,
                });
                last = Last::ValueEnd;
                continue;
            }
            other => out.push(other),
        }
        i += 1;
    }

    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    drop_trailing_comma(&mut out);
    let closed_brackets = !stack.is_empty();
    while let Some(open) = stack.pop() {
        drop_trailing_comma(&mut out);
        out.push(if open == '{' { '}' } else { ']' });
    }
    (out, closed_brackets)
}

/// Reads a string literal starting at `start` (which must be `"`), returning
/// its raw content and the index just past the closing quote.
fn read_string(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut content = String::new();
    let mut escaped = false;
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if escaped {
            escaped = false;
            content.push(c);
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            return Some((content, i + 1));
        } else {
            content.push(c);
        }
        i += 1;
    }
    None
}

fn skip_whitespace(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}

/// Index of the opener (`[` or `{`) that follows `"key":` outside any other
/// string literal.
fn find_key_opener(chars: &[char], key: &str, opener: char) -> Option<usize> {
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '"' {
            let (content, after) = read_string(chars, i)?;
            if content == key {
                let colon = skip_whitespace(chars, after);
                if chars.get(colon) == Some(&':') {
                    let value = skip_whitespace(chars, colon + 1);
                    if chars.get(value) == Some(&opener) {
                        return Some(value);
                    }
                }
            }
            i = after;
        } else {
            i += 1;
        }
    }
    None
}

/// Index of the bracket closing the one at `start`, honouring strings.
fn matching_close(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, &c) in chars.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_fragment(fragment: &str) -> Option<Value> {
    serde_json::from_str(fragment)
        .ok()
        .or_else(|| serde_json::from_str(&repair(fragment)).ok())
}

fn salvage_array(chars: &[char], opener: usize, issues: &mut Vec<String>) -> Vec<Value> {
    let mut elements = Vec::new();
    let mut discarded = 0usize;
    let mut i = opener + 1;

    loop {
        while i < chars.len() && (chars[i].is_whitespace() || chars[i] == ',') {
            i += 1;
        }
        let Some(&c) = chars.get(i) else {
            issues.push("Array was truncated; incomplete tail discarded".to_string());
            break;
        };
        match c {
            ']' => break,
            '{' | '[' => match matching_close(chars, i) {
                Some(close) => {
                    let fragment: String = chars[i..=close].iter().collect();
                    match parse_fragment(&fragment) {
                        Some(value) => elements.push(value),
                        None => discarded += 1,
                    }
                    i = close + 1;
                }
                None => {
                    issues.push("Array was truncated; incomplete tail discarded".to_string());
                    break;
                }
            },
            _ => {
                let start = i;
                let mut in_string = false;
                let mut escaped = false;
                while i < chars.len() {
                    let ch = chars[i];
                    if in_string {
                        if escaped {
                            escaped = false;
                        } else if ch == '\\' {
                            escaped = true;
                        } else if ch == '"' {
                            in_string = false;
                        }
                    } else if ch == '"' {
                        in_string = true;
                    } else if ch == ',' || ch == ']' {
                        break;
                    }
                    i += 1;
                }
                let fragment: String = chars[start..i].iter().collect();
                match serde_json::from_str::<Value>(fragment.trim()) {
                    Ok(value) => elements.push(value),
                    Err(_) => discarded += 1,
                }
            }
        }
    }

    if discarded > 0 {
        issues.push(format!("{} malformed element(s) discarded", discarded));
    }
    elements
}

/// Recovers the well-formed elements of a `processed_data` / `data` array
/// plus a `summary` object when the document as a whole cannot be parsed.
fn salvage(text: &str) -> Option<(Value, Vec<String>)> {
    let chars: Vec<char> = text.chars().collect();
    let mut issues = Vec::new();
    let mut recovered = Map::new();

    for key in SALVAGE_KEYS {
        if let Some(opener) = find_key_opener(&chars, key, '[') {
            let elements = salvage_array(&chars, opener, &mut issues);
            issues.insert(
                0,
                format!(
                    "Partial salvage: recovered {} element(s) from \"{}\"",
                    elements.len(),
                    key
                ),
            );
            recovered.insert(key.to_string(), Value::Array(elements));
            break;
        }
    }

    if let Some(opener) = find_key_opener(&chars, "summary", '{') {
        let summary = matching_close(&chars, opener).and_then(|close| {
            let fragment: String = chars[opener..=close].iter().collect();
            parse_fragment(&fragment)
        });
        match summary {
            Some(value) => {
                recovered.insert("summary".to_string(), value);
            }
            None => issues.push("Summary object could not be recovered".to_string()),
        }
    }

    if recovered.is_empty() {
        return None;
    }
    Some((Value::Object(recovered), issues))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_well_formed_is_direct() {
        let out = extract_json(r#"{"a": 1, "b": [true, null]}"#).unwrap();
        assert_eq!(out.stage, ExtractionStage::Direct);
        assert_eq!(out.value, json!({"a": 1, "b": [true, null]}));
        assert!(out.issues.is_empty());
    }

    #[test]
    fn test_scalar_reply_is_not_accepted() {
        let err = extract_json("42").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ProviderFormat);
        assert!(extract_json(r#""sem dados""#).is_err());

        let list = extract_json(r#"[{"a": 1}]"#).unwrap();
        assert_eq!(list.stage, ExtractionStage::Direct);
        assert_eq!(list.value, json!([{"a": 1}]));
    }

    #[test]
    fn test_fences_are_stripped() {
        let out = extract_json("```json\n{\"intent\": \"consulta\"}\n```").unwrap();
        assert_eq!(out.value, json!({"intent": "consulta"}));

        let bare = extract_json("```\n{\"x\": 2}\n```").unwrap();
        assert_eq!(bare.value, json!({"x": 2}));
    }

    #[test]
    fn test_envelope_ignores_surrounding_prose() {
        let out = extract_json("Claro! Aqui está:\n{\"x\": 1}\nEspero ter ajudado.").unwrap();
        assert_eq!(out.stage, ExtractionStage::Envelope);
        assert_eq!(out.value, json!({"x": 1}));
    }

    #[test]
    fn test_repairs_raw_newlines_inside_strings() {
        let raw = "{\"description\": \"linha um\r\n\tlinha dois\", \"n\": 1}";
        let out = extract_json(raw).unwrap();
        assert_eq!(out.stage, ExtractionStage::Repaired);
        assert_eq!(out.value["description"], "linha um linha dois");
        assert!(!out.issues.is_empty());
    }

    #[test]
    fn test_repairs_missing_and_trailing_commas() {
        let raw = r#"{"rows": [{"a": 1} {"a": 2},], "b": "x" "c": 3,}"#;
        let out = extract_json(raw).unwrap();
        assert_eq!(out.value, json!({"rows": [{"a": 1}, {"a": 2}], "b": "x", "c": 3}));
    }

    #[test]
    fn test_repair_never_touches_brackets_inside_strings() {
        let raw = r#"{"text": "a}, ]b", "list": [1, 2,],}"#;
        let out = extract_json(raw).unwrap();
        assert_eq!(out.value["text"], "a}, ]b");
        assert_eq!(out.value["list"], json!([1, 2]));
    }

    #[test]
    fn test_escaped_quotes_keep_string_state() {
        let raw = "{\"a\": \"diz \\\"oi\\\"\n\", \"b\": 1,}";
        let out = extract_json(raw).unwrap();
        assert_eq!(out.value["a"], "diz \"oi\" ");
        assert_eq!(out.value["b"], 1);
    }

    #[test]
    fn test_odd_quote_count_is_closed() {
        let out = extract_json(r#"{"a": 1, "b": "sem fim"#).unwrap();
        assert_eq!(out.value, json!({"a": 1, "b": "sem fim"}));
    }

    #[test]
    fn test_python_literals_are_normalized() {
        let out = extract_json(r#"{"enabled": True, "x": None,}"#).unwrap();
        assert_eq!(out.value, json!({"enabled": true, "x": null}));
    }

    #[test]
    fn test_salvages_truncated_array() {
        let raw = r#"{"processed_data": [
            {"original_row": 1, "value": 10},
            {"original_row": 2, "value": 20},
            {"original_row": 3, "description": "cortado", "value": "#;
        let out = extract_json(raw).unwrap();
        assert_eq!(out.stage, ExtractionStage::Salvaged);
        assert!(out.is_partial());
        let rows = out.value["processed_data"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["value"], 20);
        assert!(out.issues.iter().any(|i| i.contains("Partial salvage")));
    }

    #[test]
    fn test_salvage_discards_malformed_elements_and_keeps_summary() {
        let raw = r#"{"summary": {"total": 2}, "data": [{"a": 1}, {"a": : 2}, {"a": 3}], "x": ]]"#;
        let out = extract_json(raw).unwrap();
        assert_eq!(out.stage, ExtractionStage::Salvaged);
        assert_eq!(out.value["data"], json!([{"a": 1}, {"a": 3}]));
        assert_eq!(out.value["summary"], json!({"total": 2}));
        assert!(out.issues.iter().any(|i| i.contains("discarded")));
    }

    #[test]
    fn test_hopeless_input_reports_position() {
        let err = extract_json("{: :: }").unwrap_err();
        match err {
            AssistantError::ProviderFormat { position, .. } => assert!(position.is_some()),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(extract_json("sem json aqui").is_err());
    }

    #[test]
    fn test_extraction_is_idempotent_on_well_formed_json() {
        for raw in [
            r#"{"a": {"b": [1, 2.5, "c}"]}, "d": false}"#,
            "```json\n{\"x\": \"y\"}\n```",
            "{\"n\": -3, \"s\": \"\\u00e7\"}",
        ] {
            let once = extract_json(raw).unwrap();
            let twice = extract_json(&once.text()).unwrap();
            assert_eq!(once.value, twice.value);
        }
    }
}
