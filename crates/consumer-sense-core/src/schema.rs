//! Schema validator for review documents.
//!
//! The review document schema is fixed and small, so it is described here
//! as Rust data rather than loaded from a file. [`schema_document`] renders
//! the same rules as a Draft-7 JSON Schema for consumers that want the
//! persisted contract.
//!
//! Validation is structural only: types, enums, ranges, required keys, and
//! string formats. Every violation is collected, in schema declaration
//! order, as `"<dot.path>: <message>"` (root-level errors carry no prefix).

use chrono::DateTime;
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::models::{ReviewDocument, ValidatedDocument};

pub const SCHEMA_ID: &str = "review_document.schema.json";

/// Outcome of validating one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

/// A document that failed validation, returned with its report.
#[derive(Debug, Clone, Error)]
#[error("document {} rejected: {}", .document.review_id, .report.errors.join("; "))]
pub struct Rejected {
    pub document: Box<ReviewDocument>,
    pub report: ValidationReport,
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("document failed schema validation: {}", .0.errors.join("; "))]
    Invalid(ValidationReport),
    #[error("document could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JsonType {
    String,
    Number,
    Integer,
    Object,
    Array,
    Null,
}

impl JsonType {
    fn name(self) -> &'static str {
        match self {
            JsonType::String => "string",
            JsonType::Number => "number",
            JsonType::Integer => "integer",
            JsonType::Object => "object",
            JsonType::Array => "array",
            JsonType::Null => "null",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match (self, value) {
            (JsonType::String, Value::String(_)) => true,
            (JsonType::Number, Value::Number(_)) => true,
            (JsonType::Integer, Value::Number(n)) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            (JsonType::Object, Value::Object(_)) => true,
            (JsonType::Array, Value::Array(_)) => true,
            (JsonType::Null, Value::Null) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Format {
    DateTime,
}

#[derive(Debug)]
struct Constraint {
    types: &'static [JsonType],
    /// `None` entries stand for JSON `null`.
    one_of: Option<&'static [Option<&'static str>]>,
    minimum: Option<f64>,
    maximum: Option<f64>,
    min_length: Option<usize>,
    format: Option<Format>,
    items: Option<JsonType>,
}

const ANY: Constraint = Constraint {
    types: &[],
    one_of: None,
    minimum: None,
    maximum: None,
    min_length: None,
    format: None,
    items: None,
};

#[derive(Debug)]
enum Rule {
    Object {
        required: &'static [&'static str],
        properties: &'static [Property],
    },
    Value(Constraint),
}

#[derive(Debug)]
struct Property {
    name: &'static str,
    rule: Rule,
}

const fn prop(name: &'static str, rule: Rule) -> Property {
    Property { name, rule }
}

const fn typed(types: &'static [JsonType]) -> Rule {
    Rule::Value(Constraint { types, ..ANY })
}

const TIMESTAMP: Rule = Rule::Value(Constraint {
    types: &[JsonType::String],
    format: Some(Format::DateTime),
    ..ANY
});

const STRING_LIST: Rule = Rule::Value(Constraint {
    types: &[JsonType::Array],
    items: Some(JsonType::String),
    ..ANY
});

const ANALYSIS_PROPERTIES: &[Property] = &[
    prop(
        "sentiment",
        Rule::Value(Constraint {
            one_of: Some(&[
                Some("positive"),
                Some("neutral"),
                Some("negative"),
                Some("mixed"),
                None,
            ]),
            ..ANY
        }),
    ),
    prop(
        "score",
        Rule::Value(Constraint {
            types: &[JsonType::Number, JsonType::Null],
            minimum: Some(-1.0),
            maximum: Some(1.0),
            ..ANY
        }),
    ),
    prop("themes", STRING_LIST),
    prop("intent", typed(&[JsonType::String, JsonType::Null])),
    prop("action_items", STRING_LIST),
    prop(
        "confidence",
        Rule::Value(Constraint {
            types: &[JsonType::Number, JsonType::Null],
            minimum: Some(0.0),
            maximum: Some(1.0),
            ..ANY
        }),
    ),
];

const METADATA_PROPERTIES: &[Property] = &[
    prop("app_version", typed(&[JsonType::String, JsonType::Null])),
    prop("region", typed(&[JsonType::String, JsonType::Null])),
    prop("upload_method", typed(&[JsonType::String])),
];

const REVIEW_REQUIRED: &[&str] = &[
    "review_id",
    "source",
    "raw_text",
    "extracted_text",
    "analysis",
    "language",
    "model",
    "created_at",
    "processed_at",
    "metadata",
];

const REVIEW_PROPERTIES: &[Property] = &[
    prop(
        "review_id",
        Rule::Value(Constraint {
            types: &[JsonType::String],
            min_length: Some(1),
            ..ANY
        }),
    ),
    prop(
        "source",
        Rule::Value(Constraint {
            types: &[JsonType::String],
            one_of: Some(&[
                Some("mobile_app_screenshot"),
                Some("manual_text"),
                Some("web_scrape"),
            ]),
            ..ANY
        }),
    ),
    prop("user_id_hash", typed(&[JsonType::String, JsonType::Null])),
    prop("raw_text", typed(&[JsonType::String])),
    prop("extracted_text", typed(&[JsonType::String])),
    prop(
        "analysis",
        Rule::Object {
            required: &[],
            properties: ANALYSIS_PROPERTIES,
        },
    ),
    prop("image_gcs_path", typed(&[JsonType::String, JsonType::Null])),
    prop("language", typed(&[JsonType::String])),
    prop("model", typed(&[JsonType::String])),
    prop(
        "processing_latency_ms",
        Rule::Value(Constraint {
            types: &[JsonType::Integer, JsonType::Null],
            minimum: Some(0.0),
            ..ANY
        }),
    ),
    prop("created_at", TIMESTAMP),
    prop("processed_at", TIMESTAMP),
    prop(
        "metadata",
        Rule::Object {
            required: &[],
            properties: METADATA_PROPERTIES,
        },
    ),
];

const REVIEW_SCHEMA: Rule = Rule::Object {
    required: REVIEW_REQUIRED,
    properties: REVIEW_PROPERTIES,
};

/// Validate a document in its JSON form.
///
/// Pure and idempotent: the same input always yields the same report.
pub fn validate_review_doc(doc: &Value) -> ValidationReport {
    let mut errors = Vec::new();
    let mut path = Vec::new();
    check(&REVIEW_SCHEMA, doc, &mut path, &mut errors);
    ValidationReport {
        is_valid: errors.is_empty(),
        errors,
    }
}

/// Validate a typed document, sealing it on success.
pub fn validate_document(doc: ReviewDocument) -> Result<ValidatedDocument, Rejected> {
    let report = validate_review_doc(&doc.to_value());
    if report.is_valid {
        Ok(ValidatedDocument::new(doc))
    } else {
        Err(Rejected {
            document: Box::new(doc),
            report,
        })
    }
}

/// Validate a document read from elsewhere (a file, an HTTP body) and
/// decode it once it passes.
pub fn validate_json(value: &Value) -> Result<ValidatedDocument, ValidationError> {
    let report = validate_review_doc(value);
    if !report.is_valid {
        return Err(ValidationError::Invalid(report));
    }
    let doc: ReviewDocument = serde_json::from_value(value.clone())?;
    Ok(ValidatedDocument::new(doc))
}

fn check(rule: &Rule, value: &Value, path: &mut Vec<String>, errors: &mut Vec<String>) {
    match rule {
        Rule::Object {
            required,
            properties,
        } => {
            let Some(obj) = value.as_object() else {
                push(errors, path, format!("{} is not of type 'object'", value));
                return;
            };
            for name in required.iter() {
                if !obj.contains_key(*name) {
                    push(errors, path, format!("'{}' is a required property", name));
                }
            }
            for property in properties.iter() {
                if let Some(child) = obj.get(property.name) {
                    path.push(property.name.to_string());
                    check(&property.rule, child, path, errors);
                    path.pop();
                }
            }
        }
        Rule::Value(c) => check_constraint(c, value, path, errors),
    }
}

fn check_constraint(c: &Constraint, value: &Value, path: &mut Vec<String>, errors: &mut Vec<String>) {
    if !c.types.is_empty() && !c.types.iter().any(|t| t.matches(value)) {
        let names: Vec<String> = c.types.iter().map(|t| format!("'{}'", t.name())).collect();
        push(
            errors,
            path,
            format!("{} is not of type {}", value, names.join(", ")),
        );
        return;
    }

    if let Some(allowed) = c.one_of {
        let ok = allowed.iter().any(|a| match (a, value) {
            (Some(s), Value::String(v)) => s == v,
            (None, Value::Null) => true,
            _ => false,
        });
        if !ok {
            let rendered: Vec<String> = allowed
                .iter()
                .map(|a| match a {
                    Some(s) => format!("\"{}\"", s),
                    None => "null".to_string(),
                })
                .collect();
            push(
                errors,
                path,
                format!("{} is not one of [{}]", value, rendered.join(", ")),
            );
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = c.minimum {
            if n < min {
                push(
                    errors,
                    path,
                    format!("{} is less than the minimum of {:?}", value, min),
                );
            }
        }
        if let Some(max) = c.maximum {
            if n > max {
                push(
                    errors,
                    path,
                    format!("{} is greater than the maximum of {:?}", value, max),
                );
            }
        }
    }

    if let (Some(min_len), Some(s)) = (c.min_length, value.as_str()) {
        if s.chars().count() < min_len {
            push(errors, path, format!("{} is too short", value));
        }
    }

    if let (Some(Format::DateTime), Some(s)) = (c.format, value.as_str()) {
        if DateTime::parse_from_rfc3339(s).is_err() {
            push(errors, path, format!("{} is not a 'date-time'", value));
        }
    }

    if let (Some(item_type), Some(items)) = (c.items, value.as_array()) {
        for (i, item) in items.iter().enumerate() {
            if !item_type.matches(item) {
                path.push(i.to_string());
                push(
                    errors,
                    path,
                    format!("{} is not of type '{}'", item, item_type.name()),
                );
                path.pop();
            }
        }
    }
}

fn push(errors: &mut Vec<String>, path: &[String], message: String) {
    if path.is_empty() {
        errors.push(message);
    } else {
        errors.push(format!("{}: {}", path.join("."), message));
    }
}

/// The review document schema as a Draft-7 JSON Schema document.
pub fn schema_document() -> Value {
    let mut doc = rule_to_json(&REVIEW_SCHEMA);
    if let Some(obj) = doc.as_object_mut() {
        obj.insert(
            "$schema".to_string(),
            json!("http://json-schema.org/draft-07/schema#"),
        );
        obj.insert("$id".to_string(), json!(SCHEMA_ID));
        obj.insert("title".to_string(), json!("ReviewDocument"));
    }
    doc
}

fn rule_to_json(rule: &Rule) -> Value {
    match rule {
        Rule::Object {
            required,
            properties,
        } => {
            let mut props = Map::new();
            for p in properties.iter() {
                props.insert(p.name.to_string(), rule_to_json(&p.rule));
            }
            json!({
                "type": "object",
                "required": required,
                "properties": props,
            })
        }
        Rule::Value(c) => {
            let mut out = Map::new();
            match c.types {
                [] => {}
                [single] => {
                    out.insert("type".to_string(), json!(single.name()));
                }
                many => {
                    let names: Vec<&str> = many.iter().map(|t| t.name()).collect();
                    out.insert("type".to_string(), json!(names));
                }
            }
            if let Some(allowed) = c.one_of {
                out.insert("enum".to_string(), json!(allowed));
            }
            if let Some(min) = c.minimum {
                out.insert("minimum".to_string(), json!(min));
            }
            if let Some(max) = c.maximum {
                out.insert("maximum".to_string(), json!(max));
            }
            if let Some(len) = c.min_length {
                out.insert("minLength".to_string(), json!(len));
            }
            if let Some(Format::DateTime) = c.format {
                out.insert("format".to_string(), json!("date-time"));
            }
            if let Some(item) = c.items {
                out.insert("items".to_string(), json!({ "type": item.name() }));
            }
            Value::Object(out)
        }
    }
}
