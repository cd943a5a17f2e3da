use serde_json::{Map, Value};

/// Outcome of reading a structured answer out of free-form model text.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Structured(Map<String, Value>),
    Unparseable(String),
}

impl Payload {
    pub fn into_structured(self) -> Result<Map<String, Value>, String> {
        match self {
            Self::Structured(map) => Ok(map),
            Self::Unparseable(reason) => Err(reason),
        }
    }
}

pub fn extract_payload(text: &str) -> Payload {
    let candidate = strip_code_fence(text);
    if candidate.is_empty() {
        return Payload::Unparseable("empty response".to_owned());
    }

    let first_error = match serde_json::from_str::<Value>(&candidate) {
        Ok(Value::Object(map)) => return Payload::Structured(map),
        Ok(other) => format!("expected JSON object, found {}", json_kind(&other)),
        Err(err) => format!("json parse error: {err}"),
    };

    if let Some(span) = outermost_object_span(&candidate)
        && span.len() < candidate.len()
        && let Ok(Value::Object(map)) = serde_json::from_str::<Value>(span)
    {
        return Payload::Structured(map);
    }

    Payload::Unparseable(first_error)
}

/// Removes a surrounding markdown code fence, with or without a language tag.
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();

    if !trimmed.starts_with("```") {
        return trimmed.to_owned();
    }

    let mut lines = trimmed.lines();
    let _fence_line = lines.next();

    let mut body: Vec<&str> = lines.collect();
    if body.last().is_some_and(|line| line.trim() == "```") {
        body.pop();
    }

    body.join("\n").trim().to_owned()
}

/// First non-blank string among `keys`, trimmed.
pub fn text_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_owned)
}

fn outermost_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
