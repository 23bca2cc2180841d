use std::cmp::Ordering;

use serde_json::{Map, Value};
use testboard_interchange::SnapshotRecord;

use crate::render::parse_timestamp;

/// Keys rendered as timestamps and sorted chronologically.
const TIMESTAMP_KEYS: [&str; 2] = ["createdAt", "updatedAt"];

/// How a column's cells are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderHint {
    /// A coloured tag keyed by status.
    Status,
    /// A localized date-time string.
    Timestamp,
    /// The raw value; sequences joined.
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascend,
    Descend,
}

/// Comparison a column offers for sorting rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sorter {
    /// By instant; unparsable or missing values order first.
    Chronological,
}

impl Sorter {
    pub fn compare(self, key: &str, a: &SnapshotRecord, b: &SnapshotRecord) -> Ordering {
        match self {
            Sorter::Chronological => {
                let at = a.get(key).and_then(parse_timestamp);
                let bt = b.get(key).and_then(parse_timestamp);
                at.cmp(&bt)
            }
        }
    }
}

/// Presentation rule for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub key: String,
    pub title: String,
    pub hint: RenderHint,
    pub sorter: Option<Sorter>,
    pub sort_directions: [SortDirection; 2],
}

impl ColumnDescriptor {
    /// Derive the column for `key`. Depends on the key alone.
    pub fn for_key(key: &str) -> Self {
        let (hint, sorter) = if key == "status" {
            (RenderHint::Status, None)
        } else if TIMESTAMP_KEYS.contains(&key) {
            (RenderHint::Timestamp, Some(Sorter::Chronological))
        } else {
            (RenderHint::Plain, None)
        };
        ColumnDescriptor {
            key: key.to_string(),
            title: label_for(key),
            hint,
            sorter,
            sort_directions: [SortDirection::Ascend, SortDirection::Descend],
        }
    }

    pub fn is_sortable(&self) -> bool {
        self.sorter.is_some()
    }
}

/// The key with its first character upper-cased.
pub fn label_for(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// One column per schema key, in declaration order. Only the keys are
/// read, so any entry value is accepted. Without a schema the first
/// record's keys are used, `_id` included; no records means no columns.
pub fn generate_columns(
    schema: Option<&Map<String, Value>>,
    records: &[SnapshotRecord],
) -> Vec<ColumnDescriptor> {
    match (schema, records.first()) {
        (Some(fields), _) => fields.keys().map(|k| ColumnDescriptor::for_key(k)).collect(),
        (None, Some(first)) => first
            .id
            .as_ref()
            .map(|_| "_id")
            .into_iter()
            .chain(first.fields.keys().map(String::as_str))
            .map(ColumnDescriptor::for_key)
            .collect(),
        (None, None) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, value: Value) -> SnapshotRecord {
        let fields: Map<String, Value> = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        SnapshotRecord {
            id: Some(json!(id)),
            fields,
        }
    }

    #[test]
    fn labels_upper_case_only_the_first_character() {
        assert_eq!(label_for("status"), "Status");
        assert_eq!(label_for("createdAt"), "CreatedAt");
        assert_eq!(label_for("_id"), "_id");
        assert_eq!(label_for("x"), "X");
        assert_eq!(label_for(""), "");
    }

    #[test]
    fn one_column_per_schema_field_in_order() {
        let schema = json!({
            "name": "String",
            "status": {"type": "String", "enum": ["passed", "failed"]},
            "tags": ["String"],
            "createdAt": "Date"
        });
        let columns = generate_columns(schema.as_object(), &[]);
        let keys: Vec<&str> = columns.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, ["name", "status", "tags", "createdAt"]);
        assert_eq!(columns[1].hint, RenderHint::Status);
        assert_eq!(columns[3].hint, RenderHint::Timestamp);
        assert!(columns[3].is_sortable());
        assert!(!columns[0].is_sortable());
        assert_eq!(
            columns[0].sort_directions,
            [SortDirection::Ascend, SortDirection::Descend]
        );
    }

    #[test]
    fn falls_back_to_first_record_keys() {
        let records = vec![
            record("1", json!({"status": "passed", "updatedAt": "2024-01-01"})),
            record("2", json!({"other": 1})),
        ];
        let columns = generate_columns(None, &records);
        let titles: Vec<&str> = columns.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, ["_id", "Status", "UpdatedAt"]);
        assert!(generate_columns(None, &[]).is_empty());
    }

    #[test]
    fn fallback_omits_a_missing_id() {
        let records: Vec<SnapshotRecord> =
            serde_json::from_value(json!([{"name": "login", "status": "passed"}])).unwrap();
        let keys: Vec<String> = generate_columns(None, &records)
            .into_iter()
            .map(|c| c.key)
            .collect();
        assert_eq!(keys, ["name", "status"]);
    }

    #[test]
    fn schema_entries_of_any_form_yield_columns() {
        let schema = json!({"status": {"type": "String", "required": "yes"}, "owner": 7});
        let keys: Vec<String> = generate_columns(schema.as_object(), &[])
            .into_iter()
            .map(|c| c.key)
            .collect();
        assert_eq!(keys, ["status", "owner"]);
    }

    #[test]
    fn chronological_sorter_puts_invalid_dates_first() {
        let early = record("a", json!({"createdAt": "2024-01-01T00:00:00Z"}));
        let late = record("b", json!({"createdAt": "2024-03-01T00:00:00Z"}));
        let bad = record("c", json!({"createdAt": "soon"}));
        let sorter = Sorter::Chronological;
        assert_eq!(sorter.compare("createdAt", &early, &late), Ordering::Less);
        assert_eq!(sorter.compare("createdAt", &bad, &early), Ordering::Less);
        assert_eq!(sorter.compare("createdAt", &late, &late), Ordering::Equal);
    }

    #[test]
    fn chronological_sort_is_not_lexical() {
        // 10:00+05:00 is 05:00Z, earlier than 06:00Z despite sorting later as text.
        let shifted = record("a", json!({"createdAt": "2024-01-01T10:00:00+05:00"}));
        let utc = record("b", json!({"createdAt": "2024-01-01T06:00:00Z"}));
        let epoch = record("c", json!({"createdAt": 0}));
        let sorter = Sorter::Chronological;
        assert_eq!(sorter.compare("createdAt", &shifted, &utc), Ordering::Less);
        assert_eq!(sorter.compare("createdAt", &epoch, &shifted), Ordering::Less);
    }
}
