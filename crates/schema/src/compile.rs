//! Schema compiler: turns a kind's field set into an executable shape.
//!
//! A [`CompiledShape`] conforms incoming documents in strict mode: declared
//! fields are type-checked (null/absent allowed unless required), undeclared
//! fields and the store-owned `_id` are stripped.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

use crate::error::{ShapeError, UnknownTypeError};
use crate::types::{FieldOptions, FieldSet, FieldSpec, PrimitiveType, SchemaDefinition, TypeTag};

/// Executable validator for one record kind.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledShape {
    kind: String,
    fields: Vec<CompiledField>,
}

#[derive(Debug, Clone, PartialEq)]
struct CompiledField {
    name: String,
    rule: FieldRule,
    required: bool,
    allowed: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
enum FieldRule {
    Scalar(PrimitiveType),
    Sequence(PrimitiveType),
    Embedded(Vec<CompiledField>),
}

/// Result of compiling a whole definition. Kinds with an unknown tag are
/// left out of `shapes` and reported in `failures`.
#[derive(Debug, Clone, Default)]
pub struct CompiledSchema {
    pub shapes: HashMap<String, Arc<CompiledShape>>,
    pub failures: Vec<UnknownTypeError>,
}

/// Compile every kind in `def`.
pub fn compile(def: &SchemaDefinition) -> CompiledSchema {
    let mut out = CompiledSchema::default();
    for (kind, fields) in def.iter() {
        match compile_kind(kind, fields) {
            Ok(shape) => {
                out.shapes.insert(kind.to_string(), Arc::new(shape));
            }
            Err(e) => out.failures.push(e),
        }
    }
    out
}

/// Compile one kind's field set.
pub fn compile_kind(kind: &str, fields: &FieldSet) -> Result<CompiledShape, UnknownTypeError> {
    Ok(CompiledShape {
        kind: kind.to_string(),
        fields: compile_fields(kind, "", fields)?,
    })
}

fn compile_fields(
    kind: &str,
    prefix: &str,
    fields: &FieldSet,
) -> Result<Vec<CompiledField>, UnknownTypeError> {
    fields
        .iter()
        .map(|(name, spec)| {
            let path = if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{}.{}", prefix, name)
            };
            let unknown = |tag: &str| UnknownTypeError {
                kind: kind.to_string(),
                field: path.clone(),
                tag: tag.to_string(),
            };
            let (rule, options) = match spec {
                FieldSpec::Primitive {
                    tag: TypeTag::Known(p),
                    options,
                } => (FieldRule::Scalar(*p), options.clone()),
                FieldSpec::ArrayOf {
                    tag: TypeTag::Known(p),
                    options,
                } => (FieldRule::Sequence(*p), options.clone()),
                FieldSpec::Primitive {
                    tag: TypeTag::Unknown(raw),
                    ..
                }
                | FieldSpec::ArrayOf {
                    tag: TypeTag::Unknown(raw),
                    ..
                } => return Err(unknown(raw)),
                FieldSpec::Nested(inner) => (
                    FieldRule::Embedded(compile_fields(kind, &path, inner)?),
                    FieldOptions::default(),
                ),
            };
            Ok(CompiledField {
                name: name.to_string(),
                rule,
                required: options.required,
                allowed: options.allowed,
            })
        })
        .collect()
}

impl CompiledShape {
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Top-level field names in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Check `doc` against the shape and return the conformed document.
    ///
    /// All violations are collected, not just the first.
    pub fn conform(&self, doc: Map<String, Value>) -> Result<Map<String, Value>, ShapeError> {
        let mut violations = Vec::new();
        let out = conform_fields(&self.fields, "", doc, &mut violations);
        if violations.is_empty() {
            Ok(out)
        } else {
            Err(ShapeError {
                kind: self.kind.clone(),
                violations,
            })
        }
    }
}

fn conform_fields(
    fields: &[CompiledField],
    prefix: &str,
    mut doc: Map<String, Value>,
    violations: &mut Vec<String>,
) -> Map<String, Value> {
    let mut out = Map::new();
    for field in fields {
        let path = if prefix.is_empty() {
            field.name.clone()
        } else {
            format!("{}.{}", prefix, field.name)
        };
        match doc.remove(&field.name) {
            None | Some(Value::Null) => {
                if field.required {
                    violations.push(format!("field '{}' is required", path));
                }
            }
            Some(value) => {
                if let Some(v) = conform_value(field, &path, value, violations) {
                    out.insert(field.name.clone(), v);
                }
            }
        }
    }
    out
}

fn conform_value(
    field: &CompiledField,
    path: &str,
    value: Value,
    violations: &mut Vec<String>,
) -> Option<Value> {
    match &field.rule {
        FieldRule::Scalar(p) => {
            check_primitive(*p, path, &value, violations);
            check_allowed(field, path, &value, violations);
            Some(value)
        }
        FieldRule::Sequence(p) => match value {
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    let item_path = format!("{}[{}]", path, i);
                    check_primitive(*p, &item_path, item, violations);
                    check_allowed(field, &item_path, item, violations);
                }
                Some(Value::Array(items))
            }
            other => {
                violations.push(format!(
                    "field '{}': expected array of {}, got {}",
                    path,
                    p,
                    json_type(&other)
                ));
                None
            }
        },
        FieldRule::Embedded(inner) => match value {
            Value::Object(map) => Some(Value::Object(conform_fields(
                inner, path, map, violations,
            ))),
            other => {
                violations.push(format!(
                    "field '{}': expected object, got {}",
                    path,
                    json_type(&other)
                ));
                None
            }
        },
    }
}

fn check_primitive(p: PrimitiveType, path: &str, value: &Value, violations: &mut Vec<String>) {
    let ok = match p {
        PrimitiveType::String => value.is_string(),
        PrimitiveType::Number => value.is_number(),
        PrimitiveType::Boolean => value.is_boolean(),
        PrimitiveType::ObjectId => value.as_str().is_some_and(|s| !s.is_empty()),
        PrimitiveType::Date => is_date(value),
    };
    if !ok {
        violations.push(format!(
            "field '{}': expected {}, got {}",
            path,
            p,
            json_type(value)
        ));
    }
}

fn check_allowed(field: &CompiledField, path: &str, value: &Value, violations: &mut Vec<String>) {
    let (Some(allowed), Some(s)) = (&field.allowed, value.as_str()) else {
        return;
    };
    if !allowed.iter().any(|a| a == s) {
        violations.push(format!(
            "field '{}': '{}' is not one of [{}]",
            path,
            s,
            allowed.join(", ")
        ));
    }
}

/// RFC 3339 timestamps, `YYYY-MM-DD` dates, or epoch milliseconds.
fn is_date(value: &Value) -> bool {
    match value {
        Value::String(s) => {
            OffsetDateTime::parse(s, &Rfc3339).is_ok()
                || Date::parse(s, format_description!("[year]-[month]-[day]")).is_ok()
        }
        Value::Number(n) => n.as_f64().is_some_and(f64::is_finite),
        _ => false,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
