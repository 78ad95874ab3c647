use crate::core::error::ParseFailure;
use crate::core::model::{ParsedBatch, ScriptVariation};
use crate::core::schema::SectionSchema;
use serde_json::{Map, Value};

/// What the caller expects the model reply to contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedShape {
    Array { count: usize, schema: SectionSchema },
    Object { schema: SectionSchema },
    PlainString,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedResponse {
    Batch(ParsedBatch),
    Variation(ScriptVariation),
    Text(String),
}

impl ParsedResponse {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Batch(_) => "a batch",
            Self::Variation(_) => "a variation",
            Self::Text(_) => "plain text",
        }
    }
}

/// Turns raw model text into the expected structure, or fails as a whole.
///
/// Missing keys default to `""`; a wrong array length or a non-object
/// element is fatal.
pub fn parse_response(raw: &str, shape: &ExpectedShape) -> Result<ParsedResponse, ParseFailure> {
    match shape {
        ExpectedShape::Array { count, schema } => parse_batch(raw, *count, schema).map(ParsedResponse::Batch),
        ExpectedShape::Object { schema } => parse_variation(raw, schema).map(ParsedResponse::Variation),
        ExpectedShape::PlainString => Ok(ParsedResponse::Text(parse_text(raw))),
    }
}

pub fn parse_batch(raw: &str, count: usize, schema: &SectionSchema) -> Result<ParsedBatch, ParseFailure> {
    let value = parse_json(&strip_code_blocks(raw), raw)?;
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(ParseFailure::new(
                format!("expected a JSON array, got {}", kind_of(&other)),
                raw,
            ))
        }
    };
    if items.len() != count {
        return Err(ParseFailure::new(
            format!("expected {} variations, got {}", count, items.len()),
            raw,
        ));
    }

    let variations = items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(fields) => Ok(read_variation(fields, schema)),
            other => Err(ParseFailure::new(
                format!("variation {} is {}, not an object", i + 1, kind_of(other)),
                raw,
            )),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ParsedBatch::new(schema.clone(), variations))
}

pub fn parse_variation(raw: &str, schema: &SectionSchema) -> Result<ScriptVariation, ParseFailure> {
    match parse_json(&strip_code_blocks(raw), raw)? {
        Value::Object(fields) => Ok(read_variation(&fields, schema)),
        other => Err(ParseFailure::new(
            format!("expected a JSON object, got {}", kind_of(&other)),
            raw,
        )),
    }
}

/// The reply as bare text; never parsed as JSON, so it cannot fail.
pub fn parse_text(raw: &str) -> String {
    strip_code_blocks(raw)
}

fn parse_json(clean: &str, raw: &str) -> Result<Value, ParseFailure> {
    serde_json::from_str(clean).map_err(|e| ParseFailure::new(format!("invalid JSON: {}", e), raw))
}

fn read_variation(fields: &Map<String, Value>, schema: &SectionSchema) -> ScriptVariation {
    ScriptVariation::from_schema(schema, |section| match fields.get(section) {
        Some(Value::String(text)) => text.clone(),
        None | Some(Value::Null) => String::new(),
        Some(other) => other.to_string(),
    })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

const LANGUAGE_TAGS: &[&str] = &["json", "json5", "text", "txt", "plaintext", "markdown", "md"];

/// Removes Markdown code fences and surrounding whitespace.
///
/// Everything between the first opening fence and the last closing fence is
/// kept, so commentary around the fence is dropped while backticks inside
/// the copy survive.
pub fn strip_code_blocks(s: &str) -> String {
    let s = s.trim();
    let Some(open) = s.find("```") else {
        return s.to_string();
    };

    let mut body = &s[open + 3..];
    // Language tag, e.g. ```json
    let tag_len = body.find(char::is_whitespace).unwrap_or(body.len());
    if tag_len > 0
        && tag_len < body.len()
        && LANGUAGE_TAGS.iter().any(|tag| body[..tag_len].eq_ignore_ascii_case(tag))
    {
        body = &body[tag_len..];
    }

    match body.rfind("```") {
        Some(close) => body[..close].trim().to_string(),
        None => body.trim().to_string(),
    }
}
