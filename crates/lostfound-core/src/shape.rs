//! Payload shapes.
//!
//! A [`Shape`] is the declared field set of a flow's input or output. Candidate
//! JSON is checked against it with [`Shape::validate`], which either yields a
//! typed [`Payload`] or reports every violated field at once.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};
use thiserror::Error;

use crate::data_uri::{DataUri, DataUriError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    Text,
    TextList,
    ImageDataUri,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FieldKind::Text => "text",
            FieldKind::TextList => "a list of text",
            FieldKind::ImageDataUri => "an image data URI",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    /// Shown to the model in the output schema
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    fields: Vec<FieldSpec>,
}

impl Shape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(self, name: &str, kind: FieldKind, description: &str) -> Self {
        self.with_field(name, kind, true, description)
    }

    pub fn optional(self, name: &str, kind: FieldKind, description: &str) -> Self {
        self.with_field(name, kind, false, description)
    }

    fn with_field(mut self, name: &str, kind: FieldKind, required: bool, description: &str) -> Self {
        let spec = FieldSpec {
            name: name.to_string(),
            kind,
            required,
            description: description.to_string(),
        };
        // Redeclaring a name replaces it in place so field order stays stable.
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(existing) => *existing = spec,
            None => self.fields.push(spec),
        }
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check `candidate` against this shape and coerce it into a [`Payload`].
    ///
    /// Keys not declared by the shape are dropped. `null` counts as absent, so it
    /// satisfies an optional field and violates a required one. Every violation
    /// is collected before returning.
    pub fn validate(&self, candidate: &Json) -> Result<Payload, ShapeError> {
        let Some(object) = candidate.as_object() else {
            return Err(ShapeError {
                violations: vec![Violation::NotAnObject {
                    found: json_type(candidate),
                }],
            });
        };

        let mut values = BTreeMap::new();
        let mut violations = Vec::new();

        for spec in &self.fields {
            match object.get(&spec.name) {
                None | Some(Json::Null) => {
                    if spec.required {
                        violations.push(Violation::Missing {
                            field: spec.name.clone(),
                        });
                    }
                }
                Some(raw) => match coerce_field(spec, raw) {
                    Ok(value) => {
                        values.insert(spec.name.clone(), value);
                    }
                    Err(v) => violations.push(v),
                },
            }
        }

        if violations.is_empty() {
            Ok(Payload { values })
        } else {
            Err(ShapeError { violations })
        }
    }

    /// JSON Schema for this shape, handed to the model as the response format.
    pub fn json_schema(&self) -> Json {
        let mut properties = Map::new();
        for spec in &self.fields {
            let mut prop = match spec.kind {
                FieldKind::Text => json!({ "type": "string" }),
                FieldKind::TextList => json!({ "type": "array", "items": { "type": "string" } }),
                FieldKind::ImageDataUri => json!({ "type": "string", "format": "data-url" }),
            };
            if !spec.description.is_empty() {
                prop["description"] = Json::String(spec.description.clone());
            }
            properties.insert(spec.name.clone(), prop);
        }
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

fn coerce_field(spec: &FieldSpec, raw: &Json) -> Result<Value, Violation> {
    let wrong_kind = |found: &'static str| Violation::WrongKind {
        field: spec.name.clone(),
        expected: spec.kind,
        found,
    };

    match (spec.kind, raw) {
        (FieldKind::Text, Json::String(s)) => Ok(Value::Text(s.clone())),
        (FieldKind::TextList, Json::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .map(Value::TextList)
            .ok_or_else(|| wrong_kind("a list with non-text elements")),
        (FieldKind::ImageDataUri, Json::String(s)) => DataUri::parse_image(s)
            .map(Value::Image)
            .map_err(|source| Violation::MalformedDataUri {
                field: spec.name.clone(),
                source,
            }),
        (_, other) => Err(wrong_kind(json_type(other))),
    }
}

fn json_type(v: &Json) -> &'static str {
    match v {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Violation {
    #[error("payload must be a JSON object, found {found}")]
    NotAnObject { found: &'static str },
    #[error("field '{field}' is required")]
    Missing { field: String },
    #[error("field '{field}' must be {expected}, found {found}")]
    WrongKind {
        field: String,
        expected: FieldKind,
        found: &'static str,
    },
    #[error("field '{field}' is not a valid image data URI: {source}")]
    MalformedDataUri {
        field: String,
        #[source]
        source: DataUriError,
    },
}

impl Violation {
    /// Name of the offending field, if the violation concerns one.
    pub fn field(&self) -> Option<&str> {
        match self {
            Violation::NotAnObject { .. } => None,
            Violation::Missing { field }
            | Violation::WrongKind { field, .. }
            | Violation::MalformedDataUri { field, .. } => Some(field),
        }
    }
}

/// Every violation found while validating one payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeError {
    pub violations: Vec<Violation>,
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.violations.iter().map(|v| v.to_string()).collect();
        f.write_str(&parts.join("; "))
    }
}

impl std::error::Error for ShapeError {}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    TextList(Vec<String>),
    Image(DataUri),
}

impl Value {
    pub fn kind(&self) -> FieldKind {
        match self {
            Value::Text(_) => FieldKind::Text,
            Value::TextList(_) => FieldKind::TextList,
            Value::Image(_) => FieldKind::ImageDataUri,
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            Value::Text(s) => Json::String(s.clone()),
            Value::TextList(items) => json!(items),
            Value::Image(uri) => Json::String(uri.to_string()),
        }
    }
}

/// A validated payload. Only [`Shape::validate`] constructs one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    values: BTreeMap<String, Value>,
}

impl Payload {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(Value::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn text_list(&self, name: &str) -> Option<&[String]> {
        match self.values.get(name) {
            Some(Value::TextList(items)) => Some(items),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_json(&self) -> Json {
        Json::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}
