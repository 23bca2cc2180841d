use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stored record: a store-assigned `_id` plus the schema's fields.
///
/// Serializes flat, `_id` first, fields in stored order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Record {
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        if field == "_id" {
            return None;
        }
        self.fields.get(field)
    }

    /// The raw `status` value, if it is a string.
    pub fn status(&self) -> Option<&str> {
        self.fields.get("status").and_then(Value::as_str)
    }

    /// The record as one JSON object, `_id` included.
    pub fn to_value(&self) -> Value {
        let mut obj = Map::with_capacity(self.fields.len() + 1);
        obj.insert("_id".to_string(), Value::String(self.id.clone()));
        for (k, v) in &self.fields {
            obj.insert(k.clone(), v.clone());
        }
        Value::Object(obj)
    }
}

/// A record as a viewer receives it.
///
/// Viewers accept any pushed object: `_id` may be any JSON value or absent,
/// and every other key is kept in pushed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl SnapshotRecord {
    pub fn get(&self, field: &str) -> Option<&Value> {
        if field == "_id" {
            return self.id.as_ref();
        }
        self.fields.get(field)
    }

    pub fn status(&self) -> Option<&str> {
        self.fields.get("status").and_then(Value::as_str)
    }

    /// The record as one JSON object, `_id` first when present.
    pub fn to_value(&self) -> Value {
        let mut obj = Map::with_capacity(self.fields.len() + 1);
        if let Some(id) = &self.id {
            obj.insert("_id".to_string(), id.clone());
        }
        for (k, v) in &self.fields {
            obj.insert(k.clone(), v.clone());
        }
        Value::Object(obj)
    }
}

impl From<Record> for SnapshotRecord {
    fn from(record: Record) -> Self {
        SnapshotRecord {
            id: Some(Value::String(record.id)),
            fields: record.fields,
        }
    }
}

/// The closed set of statuses counted by viewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordStatus {
    Passed,
    Failed,
    Skipped,
}

impl RecordStatus {
    /// Exact match against `passed` / `failed` / `skipped`.
    pub fn from_status(s: &str) -> Option<Self> {
        match s {
            "passed" => Some(RecordStatus::Passed),
            "failed" => Some(RecordStatus::Failed),
            "skipped" => Some(RecordStatus::Skipped),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Passed => "passed",
            RecordStatus::Failed => "failed",
            RecordStatus::Skipped => "skipped",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_flat_with_id_first() {
        let record: Record =
            serde_json::from_value(json!({"_id": "1", "name": "login", "status": "passed"}))
                .unwrap();
        assert_eq!(record.id, "1");
        assert_eq!(record.status(), Some("passed"));
        let text = serde_json::to_string(&record).unwrap();
        assert_eq!(text, r#"{"_id":"1","name":"login","status":"passed"}"#);
        assert_eq!(record.to_value(), serde_json::from_str::<Value>(&text).unwrap());
    }

    #[test]
    fn snapshot_records_accept_any_id() {
        let numeric: SnapshotRecord =
            serde_json::from_value(json!({"_id": 1, "status": "passed"})).unwrap();
        assert_eq!(numeric.id, Some(json!(1)));
        assert_eq!(numeric.get("_id"), Some(&json!(1)));
        assert_eq!(numeric.to_value(), json!({"_id": 1, "status": "passed"}));

        let missing: SnapshotRecord = serde_json::from_value(json!({"name": "login"})).unwrap();
        assert_eq!(missing.id, None);
        assert_eq!(
            serde_json::to_string(&missing).unwrap(),
            r#"{"name":"login"}"#
        );
    }

    #[test]
    fn stored_record_converts_with_string_id() {
        let record = Record::new("a1", json!({"status": "failed"}).as_object().cloned().unwrap());
        let pushed = SnapshotRecord::from(record.clone());
        assert_eq!(pushed.to_value(), record.to_value());
    }

    #[test]
    fn status_is_matched_exactly() {
        assert_eq!(RecordStatus::from_status("failed"), Some(RecordStatus::Failed));
        assert_eq!(RecordStatus::from_status("Failed"), None);
        assert_eq!(RecordStatus::from_status("blocked"), None);
    }

    #[test]
    fn non_string_status_is_absent() {
        let record = Record::new("1", json!({"status": 3}).as_object().cloned().unwrap());
        assert_eq!(record.status(), None);
    }
}
