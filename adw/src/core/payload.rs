//! Extraction of one structured (JSON) payload from free-form model text.
//!
//! Every consumer of judgment output goes through [`parse_payload`] or
//! [`parse_validated_payload`], so the extraction grammar lives here only:
//!
//! 1. the first fenced block tagged `json` (tag matched case-insensitively),
//! 2. otherwise the first fenced block of any kind, minus its info string,
//! 3. otherwise the whole text, trimmed.
//!
//! An unterminated fence runs to the end of the text.

use std::sync::LazyLock;

use jsonschema::Draft;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

const EXCERPT_CHARS: usize = 200;

static TAGGED_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)```[ \t]*json\b(.*?)(?:```|\z)").expect("tagged fence regex")
});

static ANY_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(.*?)(?:```|\z)").expect("fence regex"));

/// Judgment output could not be turned into the expected payload.
#[derive(Debug, Error)]
pub enum EvaluationParseError {
    #[error("malformed payload: {source} (payload starts with {excerpt:?})")]
    Malformed {
        #[source]
        source: serde_json::Error,
        excerpt: String,
    },
    #[error("payload violates schema:\n- {}", .0.join("\n- "))]
    Schema(Vec<String>),
    #[error("invalid payload schema: {0}")]
    InvalidSchema(String),
    #[error("judgment call failed: {0}")]
    Judge(#[from] crate::error::JudgeError),
}

/// Select the substring that should hold the payload, per the module precedence.
pub fn extract_payload(text: &str) -> &str {
    if let Some(caps) = TAGGED_FENCE.captures(text)
        && let Some(body) = caps.get(1)
    {
        return body.as_str().trim();
    }
    if let Some(caps) = ANY_FENCE.captures(text)
        && let Some(body) = caps.get(1)
    {
        return strip_info_string(body.as_str()).trim();
    }
    text.trim()
}

/// Extract and deserialize a payload of type `T`.
pub fn parse_payload<T: DeserializeOwned>(text: &str) -> Result<T, EvaluationParseError> {
    let payload = extract_payload(text);
    serde_json::from_str(payload).map_err(|source| malformed(source, payload))
}

/// Extract a payload, check it against `schema` (draft 2020-12), then deserialize it.
pub fn parse_validated_payload<T: DeserializeOwned>(
    text: &str,
    schema: &Value,
) -> Result<T, EvaluationParseError> {
    let payload = extract_payload(text);
    let instance: Value =
        serde_json::from_str(payload).map_err(|source| malformed(source, payload))?;

    let validator = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .map_err(|err| EvaluationParseError::InvalidSchema(err.to_string()))?;
    let messages: Vec<String> = validator
        .iter_errors(&instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(EvaluationParseError::Schema(messages));
    }

    serde_json::from_value(instance).map_err(|source| malformed(source, payload))
}

/// Drop a fence info string (e.g. `yaml`, `text`) when the body starts on the next line.
fn strip_info_string(body: &str) -> &str {
    match body.split_once('\n') {
        Some((first, rest)) if !looks_like_payload(first) => rest,
        _ => body,
    }
}

fn looks_like_payload(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

fn malformed(source: serde_json::Error, payload: &str) -> EvaluationParseError {
    EvaluationParseError::Malformed {
        source,
        excerpt: payload.chars().take(EXCERPT_CHARS).collect(),
    }
}
