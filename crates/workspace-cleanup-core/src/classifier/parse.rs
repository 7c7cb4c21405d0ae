use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::llm::LlmError;

const EMAIL_KEYS: [&str; 4] = ["email", "useremail", "emailaddress", "user"];
const LABEL_KEYS: [&str; 6] = [
    "classification",
    "disposition",
    "category",
    "action",
    "recommendation",
    "status",
];
const RATIONALE_KEYS: [&str; 5] = ["rationale", "reason", "reasoning", "justification", "notes"];
const WRAPPER_KEYS: [&str; 4] = ["users", "classifications", "results", "data"];

/// One per-user line of a model answer, before it is matched against the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEntry {
    pub email: String,
    pub label: String,
    pub rationale: Option<String>,
}

/// Turn a model answer into per-user entries.
///
/// JSON (strict, then JSON5) is preferred; a CSV table with an email column is accepted
/// as a fallback. Anything else is a malformed response for the whole batch.
pub fn parse_response(raw: &str) -> Result<Vec<ParsedEntry>, LlmError> {
    let payload = extract_payload(raw);
    if payload.is_empty() {
        return Err(LlmError::EmptyResponse);
    }

    if let Some(value) = parse_json(&payload) {
        return entries_from_value(value);
    }

    if looks_like_csv(&payload) {
        return entries_from_csv(&payload);
    }

    debug!(raw = %raw, "unparseable model answer");
    Err(LlmError::Malformed(format!(
        "expected a JSON array or CSV table, got `{}`",
        crate::llm::truncate(&payload, 80)
    )))
}

fn parse_json(payload: &str) -> Option<Value> {
    let candidate = if payload.starts_with('[') || payload.starts_with('{') {
        payload
    } else {
        let start = payload.find('[')?;
        let end = payload.rfind(']')?;
        if end <= start {
            return None;
        }
        &payload[start..=end]
    };
    match serde_json::from_str::<Value>(candidate) {
        Ok(value) => Some(value),
        Err(strict_err) => {
            trace!(error = %strict_err, "strict JSON parse failed; trying JSON5");
            json5::from_str::<Value>(candidate).ok()
        }
    }
}

fn entries_from_value(value: Value) -> Result<Vec<ParsedEntry>, LlmError> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => match unwrap_object(map) {
            Ok(items) => items,
            Err(map) => vec![Value::Object(map)],
        },
        other => {
            return Err(LlmError::Malformed(format!(
                "expected JSON array of classifications, got {}",
                json_kind(&other)
            )))
        }
    };

    let total = items.len();
    let entries: Vec<ParsedEntry> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => entry_from_object(&map),
            _ => None,
        })
        .collect();

    if total > 0 && entries.is_empty() {
        return Err(LlmError::Malformed(
            "no entry carried both an email and a classification".into(),
        ));
    }
    Ok(entries)
}

/// Models sometimes wrap the array in an object such as `{"users": [...]}`.
fn unwrap_object(mut map: Map<String, Value>) -> Result<Vec<Value>, Map<String, Value>> {
    let key = map
        .iter()
        .find(|(key, value)| WRAPPER_KEYS.contains(&normalize_key(key).as_str()) && value.is_array())
        .map(|(key, _)| key.clone());
    match key.and_then(|key| map.remove(&key)) {
        Some(Value::Array(items)) => Ok(items),
        _ => Err(map),
    }
}

/// Keys are tried in the order listed, so `classification` beats an echoed `category`.
fn entry_from_object(map: &Map<String, Value>) -> Option<ParsedEntry> {
    let field = |keys: &[&str]| {
        keys.iter().find_map(|wanted| {
            map.iter()
                .filter(|(key, _)| normalize_key(key) == *wanted)
                .find_map(|(_, value)| match value {
                    Value::String(text) => Some(text.trim().to_string()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .filter(|text| !text.is_empty())
        })
    };
    Some(ParsedEntry {
        email: field(&EMAIL_KEYS)?,
        label: field(&LABEL_KEYS)?,
        rationale: field(&RATIONALE_KEYS),
    })
}

fn looks_like_csv(payload: &str) -> bool {
    payload
        .lines()
        .find(|line| !line.trim().is_empty())
        .map(|header| header.contains(',') && header.to_ascii_lowercase().contains("email"))
        .unwrap_or(false)
}

fn entries_from_csv(payload: &str) -> Result<Vec<ParsedEntry>, LlmError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(payload.as_bytes());
    let headers = reader
        .headers()
        .map_err(|err| LlmError::Malformed(format!("unreadable CSV header: {err}")))?
        .clone();
    let column = |keys: &[&str]| {
        keys.iter().find_map(|wanted| {
            headers
                .iter()
                .position(|header| normalize_key(header) == *wanted)
        })
    };
    let (Some(email_col), Some(label_col)) = (column(&EMAIL_KEYS), column(&LABEL_KEYS)) else {
        return Err(LlmError::Malformed(
            "CSV response lacks Email or Classification column".into(),
        ));
    };
    let rationale_col = column(&RATIONALE_KEYS);

    let mut entries = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|err| LlmError::Malformed(format!("unreadable CSV row: {err}")))?;
        let cell = |idx: usize| record.get(idx).map(str::trim).filter(|v| !v.is_empty());
        let (Some(email), Some(label)) = (cell(email_col), cell(label_col)) else {
            continue;
        };
        entries.push(ParsedEntry {
            email: email.to_string(),
            label: label.to_string(),
            rationale: rationale_col.and_then(cell).map(str::to_string),
        });
    }
    Ok(entries)
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn extract_payload(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(stripped) = strip_code_fence(trimmed) {
        return stripped;
    }
    trimmed.to_string()
}

fn strip_code_fence(input: &str) -> Option<String> {
    let start = input.find("```")?;
    let mut rest = &input[start + 3..];
    let info_end = rest.find('\n').unwrap_or(rest.len());
    let info = rest[..info_end].trim();
    if info.chars().all(|c| c.is_ascii_alphanumeric()) {
        rest = &rest[info_end..];
    }
    let end = rest.find("```").unwrap_or(rest.len());
    Some(rest[..end].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(email: &str, label: &str, rationale: Option<&str>) -> ParsedEntry {
        ParsedEntry {
            email: email.into(),
            label: label.into(),
            rationale: rationale.map(Into::into),
        }
    }

    #[test]
    fn parses_plain_json_array() {
        let raw = r#"[{"email":"a@example.com","classification":"SafeToKeep","rationale":"active"}]"#;
        assert_eq!(
            parse_response(raw).unwrap(),
            vec![entry("a@example.com", "SafeToKeep", Some("active"))]
        );
    }

    #[test]
    fn strips_markdown_fences_and_chatter() {
        let raw = "Here is the plan:\n```json\n[{\"Email\": \"a@example.com\", \"Classification\": \"LikelyInactive\"}]\n```\nLet me know!";
        assert_eq!(
            parse_response(raw).unwrap(),
            vec![entry("a@example.com", "LikelyInactive", None)]
        );
    }

    #[test]
    fn accepts_wrapped_object() {
        let raw = r#"{"users": [{"email": "b@example.com", "action": "keep", "reason": "daily login"}]}"#;
        assert_eq!(
            parse_response(raw).unwrap(),
            vec![entry("b@example.com", "keep", Some("daily login"))]
        );
    }

    #[test]
    fn relaxed_json_is_accepted() {
        let raw = "[{email: 'c@example.com', classification: 'NeedsManagerConfirmation',},]";
        assert_eq!(
            parse_response(raw).unwrap(),
            vec![entry("c@example.com", "NeedsManagerConfirmation", None)]
        );
    }

    #[test]
    fn csv_answers_are_supported() {
        let raw = "```csv\nName,Email,Classification,Rationale\nAda,a@example.com,Safe to keep,Recent login\nBo,b@example.com,Likely inactive,\n```";
        assert_eq!(
            parse_response(raw).unwrap(),
            vec![
                entry("a@example.com", "Safe to keep", Some("Recent login")),
                entry("b@example.com", "Likely inactive", None),
            ]
        );
    }

    #[test]
    fn empty_array_is_valid_but_empty() {
        assert!(parse_response("[]").unwrap().is_empty());
    }

    #[test]
    fn entries_without_required_keys_are_malformed() {
        let err = parse_response(r#"[{"name": "Ada"}]"#).unwrap_err();
        assert!(matches!(err, LlmError::Malformed(_)));
    }

    #[test]
    fn prose_is_malformed() {
        let err = parse_response("I cannot help with that request.").unwrap_err();
        assert!(matches!(err, LlmError::Malformed(_)));
    }

    #[test]
    fn blank_answer_is_empty() {
        assert!(matches!(
            parse_response("   ").unwrap_err(),
            LlmError::EmptyResponse
        ));
    }

    #[test]
    fn classification_key_wins_over_echoed_category() {
        let raw = r#"[{"email":"a@example.com","category":"High","action":"review","classification":"SafeToKeep"}]"#;
        let entries = parse_response(raw).unwrap();
        assert_eq!(entries, vec![entry("a@example.com", "SafeToKeep", None)]);
    }

    #[test]
    fn email_key_wins_over_user_name() {
        let raw = r#"[{"user":"Ada Lovelace","email":"ada@example.com","classification":"Likely inactive"}]"#;
        let entries = parse_response(raw).unwrap();
        assert_eq!(entries[0].email, "ada@example.com");
    }

    #[test]
    fn csv_columns_follow_key_priority() {
        let raw = "Category,Email,Classification\nHigh,a@example.com,Needs manager confirmation\n";
        let entries = parse_response(raw).unwrap();
        assert_eq!(entries[0].label, "Needs manager confirmation");
    }
}
