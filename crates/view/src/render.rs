use serde_json::Value;
use testboard_interchange::SnapshotRecord;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};

use crate::columns::{ColumnDescriptor, RenderHint};

/// Text shown for a timestamp that cannot be interpreted.
pub const INVALID_DATE: &str = "Invalid Date";

/// Palette for status tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagColor {
    Green,
    Red,
    Blue,
    Default,
}

impl TagColor {
    /// Colour for a status value; case-insensitive, neutral when unknown.
    pub fn for_status(status: Option<&str>) -> Self {
        match status.map(str::to_lowercase).as_deref() {
            Some("passed") => TagColor::Green,
            Some("failed") => TagColor::Red,
            Some("skipped") => TagColor::Blue,
            _ => TagColor::Default,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TagColor::Green => "green",
            TagColor::Red => "red",
            TagColor::Blue => "blue",
            TagColor::Default => "default",
        }
    }
}

/// A rendered table cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Tag { text: String, color: TagColor },
    Text(String),
}

impl Cell {
    pub fn text(&self) -> &str {
        match self {
            Cell::Tag { text, .. } | Cell::Text(text) => text,
        }
    }
}

/// Renders instants as en-US `M/D/YYYY, h:mm:ss AM` at a fixed offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateFormatter {
    offset: UtcOffset,
}

impl Default for DateFormatter {
    fn default() -> Self {
        Self::local()
    }
}

impl DateFormatter {
    pub fn new(offset: UtcOffset) -> Self {
        DateFormatter { offset }
    }

    /// The process's local offset, or UTC when it cannot be determined.
    pub fn local() -> Self {
        Self::new(UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC))
    }

    pub fn format(&self, value: Option<&Value>) -> String {
        let Some(instant) = value.and_then(parse_timestamp) else {
            return INVALID_DATE.to_string();
        };
        instant
            .to_offset(self.offset)
            .format(format_description!(
                "[month padding:none]/[day padding:none]/[year], [hour repr:12 padding:none]:[minute]:[second] [period]"
            ))
            .unwrap_or_else(|_| INVALID_DATE.to_string())
    }
}

/// Interpret a stored value as an instant: RFC 3339 text, a bare
/// `YYYY-MM-DD` date (midnight UTC), or milliseconds since the epoch.
pub fn parse_timestamp(value: &Value) -> Option<OffsetDateTime> {
    match value {
        Value::String(s) => OffsetDateTime::parse(s, &Rfc3339).ok().or_else(|| {
            Date::parse(s, format_description!("[year]-[month]-[day]"))
                .ok()
                .map(|d| d.midnight().assume_utc())
        }),
        Value::Number(n) => {
            let millis = n.as_f64().filter(|m| m.is_finite())?;
            OffsetDateTime::from_unix_timestamp_nanos((millis * 1_000_000.0) as i128).ok()
        }
        _ => None,
    }
}

/// Render one cell of `record` under `column`.
pub fn render_cell(column: &ColumnDescriptor, record: &SnapshotRecord, dates: &DateFormatter) -> Cell {
    let value = record.get(&column.key);
    match column.hint {
        RenderHint::Status => {
            let status = value.and_then(Value::as_str);
            Cell::Tag {
                text: value.map(display_raw).unwrap_or_default(),
                color: TagColor::for_status(status),
            }
        }
        RenderHint::Timestamp => Cell::Text(dates.format(value)),
        RenderHint::Plain => Cell::Text(value.map(display_raw).unwrap_or_default()),
    }
}

/// Raw display: strings verbatim, sequences joined with `", "`.
fn display_raw(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Array(items) => items
            .iter()
            .map(display_raw)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};
    use time::macros::offset;

    fn record(value: Value) -> SnapshotRecord {
        let fields: Map<String, Value> = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        SnapshotRecord {
            id: Some(json!("r1")),
            fields,
        }
    }

    fn utc() -> DateFormatter {
        DateFormatter::new(UtcOffset::UTC)
    }

    #[test]
    fn status_palette() {
        assert_eq!(TagColor::for_status(Some("passed")), TagColor::Green);
        assert_eq!(TagColor::for_status(Some("failed")), TagColor::Red);
        assert_eq!(TagColor::for_status(Some("skipped")), TagColor::Blue);
        assert_eq!(TagColor::for_status(Some("FAILED")), TagColor::Red);
        assert_eq!(TagColor::for_status(Some("blocked")), TagColor::Default);
        assert_eq!(TagColor::for_status(None), TagColor::Default);
    }

    #[test]
    fn status_cells_are_tags() {
        let column = ColumnDescriptor::for_key("status");
        let cell = render_cell(&column, &record(json!({"status": "failed"})), &utc());
        assert_eq!(
            cell,
            Cell::Tag {
                text: "failed".into(),
                color: TagColor::Red
            }
        );

        let missing = render_cell(&column, &record(json!({})), &utc());
        assert_eq!(
            missing,
            Cell::Tag {
                text: String::new(),
                color: TagColor::Default
            }
        );
    }

    #[test]
    fn timestamps_render_en_us_at_the_configured_offset() {
        let column = ColumnDescriptor::for_key("createdAt");
        let r = record(json!({"createdAt": "2024-03-05T14:07:09Z"}));
        assert_eq!(render_cell(&column, &r, &utc()).text(), "3/5/2024, 2:07:09 PM");

        let east = DateFormatter::new(offset!(+10));
        assert_eq!(render_cell(&column, &r, &east).text(), "3/6/2024, 12:07:09 AM");
    }

    #[test]
    fn timestamps_accept_dates_and_epoch_millis() {
        let column = ColumnDescriptor::for_key("updatedAt");
        let date = record(json!({"updatedAt": "2024-01-02"}));
        assert_eq!(render_cell(&column, &date, &utc()).text(), "1/2/2024, 12:00:00 AM");
        let millis = record(json!({"updatedAt": 86_400_000}));
        assert_eq!(render_cell(&column, &millis, &utc()).text(), "1/2/1970, 12:00:00 AM");
    }

    #[test]
    fn bad_or_missing_timestamps_render_invalid_date() {
        let column = ColumnDescriptor::for_key("createdAt");
        for r in [record(json!({"createdAt": "yesterday"})), record(json!({}))] {
            assert_eq!(render_cell(&column, &r, &utc()).text(), INVALID_DATE);
        }
    }

    #[test]
    fn sequences_are_joined_and_scalars_raw() {
        let r = record(json!({"tags": ["smoke", "ui", 3], "duration": 1.5, "ok": true}));
        let cell = |key: &str| render_cell(&ColumnDescriptor::for_key(key), &r, &utc());
        assert_eq!(cell("tags").text(), "smoke, ui, 3");
        assert_eq!(cell("duration").text(), "1.5");
        assert_eq!(cell("ok").text(), "true");
        assert_eq!(cell("missing").text(), "");
        assert_eq!(cell("_id").text(), "r1");
    }

    #[test]
    fn ids_of_any_type_render_raw() {
        let column = ColumnDescriptor::for_key("_id");
        let numeric: SnapshotRecord = serde_json::from_value(json!({"_id": 1})).unwrap();
        assert_eq!(render_cell(&column, &numeric, &utc()).text(), "1");
        let missing: SnapshotRecord = serde_json::from_value(json!({"status": "passed"})).unwrap();
        assert_eq!(render_cell(&column, &missing, &utc()).text(), "");
    }
}
