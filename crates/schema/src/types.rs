//! The declarative field-spec model.
//!
//! Field maps are ordered as written in the source; that order is the
//! column order viewers see. Deserialization rejects duplicate names and
//! malformed array/option forms, but keeps unknown type tags as
//! [`TypeTag::Unknown`] so the compiler can report them per kind.

use std::fmt;
use std::marker::PhantomData;

use indexmap::IndexMap;
use serde::de::{self, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// The closed vocabulary of primitive field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    String,
    Number,
    Date,
    Boolean,
    ObjectId,
}

impl PrimitiveType {
    pub const ALL: [PrimitiveType; 5] = [
        PrimitiveType::String,
        PrimitiveType::Number,
        PrimitiveType::Date,
        PrimitiveType::Boolean,
        PrimitiveType::ObjectId,
    ];

    /// Resolve a source tag. Matching is case-insensitive; `Identifier` is
    /// accepted as an alias of `ObjectId`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "string" => Some(PrimitiveType::String),
            "number" => Some(PrimitiveType::Number),
            "date" => Some(PrimitiveType::Date),
            "boolean" => Some(PrimitiveType::Boolean),
            "objectid" | "identifier" => Some(PrimitiveType::ObjectId),
            _ => None,
        }
    }

    /// Canonical tag name, as written back to the wire.
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveType::String => "String",
            PrimitiveType::Number => "Number",
            PrimitiveType::Date => "Date",
            PrimitiveType::Boolean => "Boolean",
            PrimitiveType::ObjectId => "ObjectId",
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A type tag as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeTag {
    Known(PrimitiveType),
    Unknown(String),
}

impl TypeTag {
    pub fn parse(tag: &str) -> Self {
        match PrimitiveType::from_tag(tag) {
            Some(p) => TypeTag::Known(p),
            None => TypeTag::Unknown(tag.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TypeTag::Known(p) => p.name(),
            TypeTag::Unknown(raw) => raw,
        }
    }
}

/// Per-field options from the `{ "type": ..., "required": ..., "enum": [...] }` form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldOptions {
    /// Writes must carry a non-null value.
    pub required: bool,
    /// Permitted string values, if restricted.
    pub allowed: Option<Vec<String>>,
}

impl FieldOptions {
    fn is_default(&self) -> bool {
        !self.required && self.allowed.is_none()
    }
}

/// The declared type of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSpec {
    /// A single-valued field: `"String"`.
    Primitive { tag: TypeTag, options: FieldOptions },
    /// A homogeneous sequence: `["String"]`.
    ArrayOf { tag: TypeTag, options: FieldOptions },
    /// An embedded structure with its own fields.
    Nested(FieldSet),
}

impl FieldSpec {
    pub fn primitive(p: PrimitiveType) -> Self {
        FieldSpec::Primitive {
            tag: TypeTag::Known(p),
            options: FieldOptions::default(),
        }
    }

    pub fn array_of(p: PrimitiveType) -> Self {
        FieldSpec::ArrayOf {
            tag: TypeTag::Known(p),
            options: FieldOptions::default(),
        }
    }
}

/// The ordered field map of one record kind. Field names are unique.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldSet(IndexMap<String, FieldSpec>);

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field. Returns `false` (and leaves the set unchanged) if the
    /// name is already taken.
    pub fn insert(&mut self, name: impl Into<String>, spec: FieldSpec) -> bool {
        let name = name.into();
        if self.0.contains_key(&name) {
            return false;
        }
        self.0.insert(name, spec);
        true
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.0.get(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, FieldSpec)> for FieldSet {
    /// Later duplicates are ignored.
    fn from_iter<I: IntoIterator<Item = (String, FieldSpec)>>(iter: I) -> Self {
        let mut set = FieldSet::new();
        for (name, spec) in iter {
            set.insert(name, spec);
        }
        set
    }
}

/// Field sets for every record kind, swapped as one unit on reload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaDefinition(IndexMap<String, FieldSet>);

impl SchemaDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a schema source document.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn insert(&mut self, kind: impl Into<String>, fields: FieldSet) -> bool {
        let kind = kind.into();
        if self.0.contains_key(&kind) {
            return false;
        }
        self.0.insert(kind, fields);
        true
    }

    /// Swap in `fields` for a kind that is already declared, keeping its
    /// position. Returns `false` for an undeclared kind.
    pub(crate) fn replace(&mut self, kind: &str, fields: FieldSet) -> bool {
        match self.0.get_mut(kind) {
            Some(slot) => {
                *slot = fields;
                true
            }
            None => false,
        }
    }

    pub fn kind(&self, kind: &str) -> Option<&FieldSet> {
        self.0.get(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldSet)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ── Deserialization ─────────────────────────────────────────────────

/// Visitor for a JSON object whose keys must be unique.
struct UniqueMapVisitor<V> {
    what: &'static str,
    marker: PhantomData<V>,
}

impl<'de, V: Deserialize<'de>> Visitor<'de> for UniqueMapVisitor<V> {
    type Value = IndexMap<String, V>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a map of {} names", self.what)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut out = IndexMap::with_capacity(map.size_hint().unwrap_or(0));
        while let Some(key) = map.next_key::<String>()? {
            if out.contains_key(&key) {
                return Err(de::Error::custom(format!(
                    "duplicate {} name '{}'",
                    self.what, key
                )));
            }
            let value = map.next_value::<V>()?;
            out.insert(key, value);
        }
        Ok(out)
    }
}

fn deserialize_unique_map<'de, D, V>(
    deserializer: D,
    what: &'static str,
) -> Result<IndexMap<String, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    deserializer.deserialize_map(UniqueMapVisitor {
        what,
        marker: PhantomData,
    })
}

impl<'de> Deserialize<'de> for SchemaDefinition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_unique_map(deserializer, "record kind").map(SchemaDefinition)
    }
}

impl<'de> Deserialize<'de> for FieldSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_unique_map(deserializer, "field").map(FieldSet)
    }
}

struct FieldSpecVisitor;

impl<'de> Visitor<'de> for FieldSpecVisitor {
    type Value = FieldSpec;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a type tag, a one-element array of a type tag, or an object")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<FieldSpec, E> {
        Ok(FieldSpec::Primitive {
            tag: TypeTag::parse(v),
            options: FieldOptions::default(),
        })
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<FieldSpec, A::Error> {
        let tag = seq
            .next_element::<String>()?
            .ok_or_else(|| de::Error::custom("array field must name exactly one type"))?;
        if seq.next_element::<IgnoredAny>()?.is_some() {
            return Err(de::Error::custom("array field must name exactly one type"));
        }
        Ok(FieldSpec::ArrayOf {
            tag: TypeTag::parse(&tag),
            options: FieldOptions::default(),
        })
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<FieldSpec, A::Error> {
        let entries: IndexMap<String, serde_json::Value> = UniqueMapVisitor {
            what: "field",
            marker: PhantomData,
        }
        .visit_map(map)?;

        match entries.get("type") {
            Some(serde_json::Value::String(_)) | Some(serde_json::Value::Array(_)) => {
                options_form(entries).map_err(de::Error::custom)
            }
            _ => {
                let mut fields = FieldSet::new();
                for (name, value) in entries {
                    let spec = FieldSpec::deserialize(value)
                        .map_err(|e| de::Error::custom(format!("field '{}': {}", name, e)))?;
                    fields.insert(name, spec);
                }
                Ok(FieldSpec::Nested(fields))
            }
        }
    }
}

/// Interpret `{ "type": ..., "required": ..., "enum": [...] }`. Other option
/// keys (storage hints such as `index`) are accepted and ignored.
fn options_form(mut entries: IndexMap<String, serde_json::Value>) -> Result<FieldSpec, String> {
    let type_value = entries.shift_remove("type").unwrap_or_default();
    let base = FieldSpec::deserialize(type_value).map_err(|e| format!("'type': {}", e))?;

    let required = match entries.get("required") {
        None => false,
        Some(serde_json::Value::Bool(b)) => *b,
        Some(other) => return Err(format!("'required' must be a boolean, got {}", other)),
    };

    let allowed = match entries.get("enum") {
        None => None,
        Some(serde_json::Value::Array(values)) => Some(
            values
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| format!("'enum' values must be strings, got {}", v))
                })
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Some(other) => return Err(format!("'enum' must be an array, got {}", other)),
    };

    let options = FieldOptions { required, allowed };
    match base {
        FieldSpec::Primitive { tag, .. } => Ok(FieldSpec::Primitive { tag, options }),
        FieldSpec::ArrayOf { tag, .. } => Ok(FieldSpec::ArrayOf { tag, options }),
        FieldSpec::Nested(_) => Err("'type' must be a type tag or a one-element array".into()),
    }
}

impl<'de> Deserialize<'de> for FieldSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FieldSpecVisitor)
    }
}

// ── Serialization (back to the declarative form) ────────────────────

impl Serialize for TypeTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl Serialize for FieldSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldSpec::Primitive { tag, options } if options.is_default() => tag.serialize(serializer),
            FieldSpec::ArrayOf { tag, options } if options.is_default() => [tag].serialize(serializer),
            FieldSpec::Primitive { tag, options } => {
                serialize_options(serializer, serde_json::json!(tag.as_str()), options)
            }
            FieldSpec::ArrayOf { tag, options } => {
                serialize_options(serializer, serde_json::json!([tag.as_str()]), options)
            }
            FieldSpec::Nested(fields) => fields.serialize(serializer),
        }
    }
}

fn serialize_options<S: Serializer>(
    serializer: S,
    type_value: serde_json::Value,
    options: &FieldOptions,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(None)?;
    map.serialize_entry("type", &type_value)?;
    if options.required {
        map.serialize_entry("required", &true)?;
    }
    if let Some(allowed) = &options.allowed {
        map.serialize_entry("enum", allowed)?;
    }
    map.end()
}

impl Serialize for FieldSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl Serialize for SchemaDefinition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_all_field_forms_in_source_order() {
        let def: SchemaDefinition = serde_json::from_value(json!({
            "TestCase": {
                "name": "String",
                "status": { "type": "String", "enum": ["passed", "failed", "skipped"] },
                "tags": ["String"],
                "duration": "number",
                "owner": { "team": "String", "oncall": ["Identifier"] },
                "createdAt": "Date"
            }
        }))
        .unwrap();

        let fields = def.kind("TestCase").unwrap();
        let keys: Vec<&str> = fields.keys().collect();
        assert_eq!(
            keys,
            vec!["name", "status", "tags", "duration", "owner", "createdAt"]
        );
        assert_eq!(
            fields.get("name"),
            Some(&FieldSpec::primitive(PrimitiveType::String))
        );
        assert_eq!(
            fields.get("tags"),
            Some(&FieldSpec::array_of(PrimitiveType::String))
        );
        assert_eq!(
            fields.get("duration"),
            Some(&FieldSpec::primitive(PrimitiveType::Number))
        );
        match fields.get("status") {
            Some(FieldSpec::Primitive { options, .. }) => {
                assert_eq!(options.allowed.as_ref().map(Vec::len), Some(3));
                assert!(!options.required);
            }
            other => panic!("expected primitive with options, got {:?}", other),
        }
        match fields.get("owner") {
            Some(FieldSpec::Nested(inner)) => {
                assert_eq!(
                    inner.get("oncall"),
                    Some(&FieldSpec::array_of(PrimitiveType::ObjectId))
                );
            }
            other => panic!("expected nested, got {:?}", other),
        }
    }

    #[test]
    fn unknown_tags_are_kept_for_the_compiler() {
        let fields: FieldSet = serde_json::from_value(json!({"x": "Mixed"})).unwrap();
        assert_eq!(
            fields.get("x"),
            Some(&FieldSpec::Primitive {
                tag: TypeTag::Unknown("Mixed".into()),
                options: FieldOptions::default()
            })
        );
    }

    #[test]
    fn duplicate_field_names_are_rejected() {
        let err = SchemaDefinition::from_json_slice(br#"{"K": {"a": "String", "a": "Number"}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("duplicate field name 'a'"), "{}", err);
    }

    #[test]
    fn duplicate_kind_names_are_rejected() {
        let err = SchemaDefinition::from_json_slice(br#"{"K": {}, "K": {}}"#).unwrap_err();
        assert!(err.to_string().contains("duplicate record kind name 'K'"));
    }

    #[test]
    fn malformed_arrays_are_rejected() {
        assert!(serde_json::from_value::<FieldSpec>(json!([])).is_err());
        assert!(serde_json::from_value::<FieldSpec>(json!(["String", "Number"])).is_err());
        assert!(serde_json::from_value::<FieldSpec>(json!([1])).is_err());
        assert!(serde_json::from_value::<FieldSpec>(json!(42)).is_err());
    }

    #[test]
    fn malformed_options_are_rejected() {
        assert!(serde_json::from_value::<FieldSpec>(json!({"type": "String", "required": "yes"}))
            .is_err());
        assert!(serde_json::from_value::<FieldSpec>(json!({"type": "String", "enum": [1]})).is_err());
    }

    #[test]
    fn object_type_member_means_nested_field_named_type() {
        let spec: FieldSpec =
            serde_json::from_value(json!({"type": {"code": "String"}, "note": "String"})).unwrap();
        match spec {
            FieldSpec::Nested(fields) => {
                assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["type", "note"]);
            }
            other => panic!("expected nested, got {:?}", other),
        }
    }

    #[test]
    fn serializes_back_to_declarative_form() {
        let source = json!({
            "name": "String",
            "tags": ["String"],
            "status": {"type": "String", "required": true, "enum": ["passed"]},
            "meta": {"count": "Number"}
        });
        let fields: FieldSet = serde_json::from_value(source.clone()).unwrap();
        assert_eq!(serde_json::to_value(&fields).unwrap(), source);
    }

    #[test]
    fn tag_matching_is_case_insensitive() {
        assert_eq!(PrimitiveType::from_tag("BOOLEAN"), Some(PrimitiveType::Boolean));
        assert_eq!(PrimitiveType::from_tag("objectId"), Some(PrimitiveType::ObjectId));
        assert_eq!(PrimitiveType::from_tag("Mixed"), None);
        for p in PrimitiveType::ALL {
            assert_eq!(PrimitiveType::from_tag(p.name()), Some(p));
        }
    }
}
