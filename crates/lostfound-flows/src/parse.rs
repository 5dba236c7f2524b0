use lostfound_core::{Payload, Shape, ShapeError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OutputError {
    #[error("reply contains no JSON object")]
    NoJson,
    #[error("reply is not valid JSON: {0}")]
    Unparsable(String),
    #[error("reply does not match the output shape: {0}")]
    Shape(#[from] ShapeError),
    #[error("reply signalled no result, but this flow requires one")]
    UnexpectedSentinel,
}

/// Result of coercing a reply that may carry the no-match sentinel.
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    Payload(Payload),
    Sentinel,
}

/// Parse raw model output and validate it against `shape`.
pub fn coerce(raw: &str, shape: &Shape) -> Result<Payload, OutputError> {
    let value = parse_object(raw)?;
    Ok(shape.validate(&value)?)
}

/// Like [`coerce`], but a reply whose `field` is explicitly empty is the
/// sentinel rather than a failure. The field has to be present: leaving it out
/// is still a shape violation.
pub fn coerce_with_sentinel(raw: &str, shape: &Shape, field: &str) -> Result<Coerced, OutputError> {
    let value = parse_object(raw)?;
    if value.get(field).is_some_and(is_sentinel) {
        return Ok(Coerced::Sentinel);
    }
    Ok(Coerced::Payload(shape.validate(&value)?))
}

/// `null`, a blank string, or the string "null".
fn is_sentinel(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => {
            let s = s.trim();
            s.is_empty() || s == "null"
        }
        _ => false,
    }
}

fn parse_object(raw: &str) -> Result<serde_json::Value, OutputError> {
    let json_str = extract_json_object(raw).ok_or(OutputError::NoJson)?;
    serde_json::from_str(json_str).map_err(|e| OutputError::Unparsable(e.to_string()))
}

/// Extract the outermost JSON object from raw LLM output (code fences, chatter).
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&raw[start..=end])
}
