use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

use super::raw_candidate::RawCandidate;
use crate::shared::constants::PLACEHOLDER_VALUES;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("response contains no JSON")]
    NoJson,
    #[error("response JSON is invalid: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),
    #[error("item {index} has no `{field}` field")]
    MissingField { index: usize, field: &'static str },
    #[error("item {index} field `{field}` is invalid: {reason}")]
    InvalidField {
        index: usize,
        field: &'static str,
        reason: String,
    },
}

/// What happens when a field is absent or has the wrong type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldFallback {
    /// The whole response is rejected with a `ParseError`.
    Fail,
    /// The field is treated as absent.
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Free text; optional text that is blank or a placeholder counts as absent.
    Text,
    /// A number in [0, 1], also accepted as a numeric string.
    Confidence,
}

impl FieldKind {
    fn label(self, required: bool) -> &'static str {
        match (self, required) {
            (FieldKind::Text, true) => "string",
            (FieldKind::Text, false) => "string or null",
            (FieldKind::Confidence, _) => "number 0.0-1.0",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub fallback: FieldFallback,
    pub description: &'static str,
}

/// Expected shape of one extracted item.
pub const ITEM_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "task",
        kind: FieldKind::Text,
        required: true,
        fallback: FieldFallback::Fail,
        description: "the action to be completed, phrased as an instruction",
    },
    FieldSpec {
        name: "owner",
        kind: FieldKind::Text,
        required: false,
        fallback: FieldFallback::Discard,
        description: "person responsible, exactly as named in the transcript",
    },
    FieldSpec {
        name: "deadline",
        kind: FieldKind::Text,
        required: false,
        fallback: FieldFallback::Discard,
        description: "when it is due, quoted from the transcript",
    },
    FieldSpec {
        name: "confidence",
        kind: FieldKind::Confidence,
        required: false,
        fallback: FieldFallback::Discard,
        description: "how sure you are this is a genuine commitment",
    },
    FieldSpec {
        name: "speaker",
        kind: FieldKind::Text,
        required: false,
        fallback: FieldFallback::Discard,
        description: "who raised the item",
    },
    FieldSpec {
        name: "notes",
        kind: FieldKind::Text,
        required: false,
        fallback: FieldFallback::Discard,
        description: "short supporting context",
    },
];

/// Parser for extractor responses.
///
/// Accepted envelopes: a JSON array of items, an object with an `items` (or
/// `action_items`) array, or a single item object. Surrounding prose and
/// markdown fences are ignored. Each item is read field by field according
/// to [`ITEM_FIELDS`].
pub struct ResponseSchema;

impl ResponseSchema {
    /// Human-readable schema, embedded in extraction prompts.
    pub fn describe() -> String {
        let mut lines = vec!["Respond with a JSON array. Each element is an object with:".to_string()];
        for field in ITEM_FIELDS {
            let presence = if field.required { "required" } else { "optional" };
            lines.push(format!(
                "- \"{}\" ({}, {}): {}",
                field.name,
                field.kind.label(field.required),
                presence,
                field.description
            ));
        }
        lines.push("Return [] when the excerpt contains no action items.".to_string());
        lines.join("\n")
    }

    pub fn parse(response: &str, chunk_index: usize) -> Result<Vec<RawCandidate>, ParseError> {
        parse_with_fields(response, chunk_index, ITEM_FIELDS)
    }
}

fn parse_with_fields(
    response: &str,
    chunk_index: usize,
    fields: &[FieldSpec],
) -> Result<Vec<RawCandidate>, ParseError> {
    let json = locate_json(response).ok_or(ParseError::NoJson)?;
    let value: Value = serde_json::from_str(json).map_err(ParseError::InvalidJson)?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => {
            if let Some(items) = obj.remove("items").or_else(|| obj.remove("action_items")) {
                match items {
                    Value::Array(items) => items,
                    other => {
                        return Err(ParseError::UnexpectedShape(format!(
                            "`items` is {}, expected an array",
                            type_name(&other)
                        )))
                    }
                }
            } else if obj.contains_key("task") {
                vec![Value::Object(obj)]
            } else {
                return Err(ParseError::UnexpectedShape(
                    "object without `items` or `task`".to_string(),
                ));
            }
        }
        other => {
            return Err(ParseError::UnexpectedShape(format!(
                "top-level {}",
                type_name(&other)
            )))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| parse_item(index, item, chunk_index, fields))
        .collect()
}

enum FieldValue {
    Text(String),
    Number(f64),
}

enum FieldProblem {
    Missing,
    Invalid(String),
}

impl fmt::Display for FieldProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldProblem::Missing => write!(f, "missing"),
            FieldProblem::Invalid(reason) => write!(f, "{reason}"),
        }
    }
}

fn parse_item(
    index: usize,
    item: Value,
    chunk_index: usize,
    fields: &[FieldSpec],
) -> Result<RawCandidate, ParseError> {
    let obj = match item {
        Value::Object(obj) => obj,
        other => {
            return Err(ParseError::UnexpectedShape(format!(
                "item {index} is {}",
                type_name(&other)
            )))
        }
    };

    let mut candidate = RawCandidate::new(String::new(), chunk_index);
    for field in fields {
        let value = match read_field(&obj, field) {
            Ok(value) => value,
            Err(problem) => match field.fallback {
                FieldFallback::Fail => {
                    return Err(match problem {
                        FieldProblem::Missing => ParseError::MissingField {
                            index,
                            field: field.name,
                        },
                        FieldProblem::Invalid(reason) => ParseError::InvalidField {
                            index,
                            field: field.name,
                            reason,
                        },
                    })
                }
                FieldFallback::Discard => {
                    log::debug!("Discarding item {index} field `{}`: {problem}", field.name);
                    None
                }
            },
        };
        if let Some(value) = value {
            assign(&mut candidate, field.name, value);
        }
    }
    Ok(candidate)
}

fn read_field(obj: &Map<String, Value>, field: &FieldSpec) -> Result<Option<FieldValue>, FieldProblem> {
    let value = match obj.get(field.name) {
        None | Some(Value::Null) if field.required => return Err(FieldProblem::Missing),
        None | Some(Value::Null) => return Ok(None),
        Some(value) => value,
    };

    match field.kind {
        FieldKind::Text => match value {
            Value::String(s) if field.required => Ok(Some(FieldValue::Text(s.trim().to_string()))),
            Value::String(s) => Ok(optional_text(s).map(FieldValue::Text)),
            other => Err(FieldProblem::Invalid(format!(
                "expected a string, got {}",
                type_name(other)
            ))),
        },
        FieldKind::Confidence => {
            let parsed = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            match parsed {
                Some(c) if (0.0..=1.0).contains(&c) => Ok(Some(FieldValue::Number(c))),
                _ => Err(FieldProblem::Invalid("not a number in [0, 1]".to_string())),
            }
        }
    }
}

/// Collapses whitespace; blanks and placeholders count as absent.
fn optional_text(text: &str) -> Option<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty() && !is_placeholder(&collapsed)).then_some(collapsed)
}

fn assign(candidate: &mut RawCandidate, field: &str, value: FieldValue) {
    match (field, value) {
        ("task", FieldValue::Text(text)) => candidate.task = text,
        ("owner", FieldValue::Text(text)) => candidate.owner = Some(text),
        ("deadline", FieldValue::Text(text)) => candidate.deadline = Some(text),
        ("speaker", FieldValue::Text(text)) => candidate.speaker = Some(text),
        ("notes", FieldValue::Text(text)) => candidate.notes = Some(text),
        ("confidence", FieldValue::Number(c)) => candidate.local_confidence = Some(c),
        _ => {}
    }
}

pub fn is_placeholder(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    PLACEHOLDER_VALUES.contains(&lower.as_str())
}

/// Slice of `text` spanning the outermost JSON array or object.
fn locate_json(text: &str) -> Option<&str> {
    let start = text.find(['[', '{'])?;
    let close = if text[start..].starts_with('[') { ']' } else { '}' };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
