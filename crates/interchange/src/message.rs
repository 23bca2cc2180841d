use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::record::{Record, SnapshotRecord};

/// Event name carried by every snapshot frame.
pub const SNAPSHOT_EVENT: &str = "FromAPI";

/// One atomic push: every current record of a kind and the schema entry
/// that describes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMessage {
    pub test_cases: Vec<Record>,
    /// The kind's schema entry as written in the source. Absent when the
    /// kind has no usable entry in the active definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Map<String, Value>>,
}

/// A server-to-viewer WebSocket text frame: `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerFrame {
    #[serde(rename = "FromAPI")]
    Snapshot(SnapshotMessage),
}

impl ServerFrame {
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// A snapshot as a viewer decodes it. Records may carry any `_id`, and a
/// `schema` that is not an object is treated as absent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedSnapshot {
    pub test_cases: Vec<SnapshotRecord>,
    #[serde(default, deserialize_with = "lenient_schema")]
    pub schema: Option<Map<String, Value>>,
}

impl From<SnapshotMessage> for ReceivedSnapshot {
    fn from(msg: SnapshotMessage) -> Self {
        ReceivedSnapshot {
            test_cases: msg.test_cases.into_iter().map(SnapshotRecord::from).collect(),
            schema: msg.schema,
        }
    }
}

fn lenient_schema<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Map<String, Value>>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Object(fields)) => Some(fields),
        _ => None,
    })
}

/// The viewer's decoding of a [`ServerFrame`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ReceivedFrame {
    #[serde(rename = "FromAPI")]
    Snapshot(ReceivedSnapshot),
}

impl ReceivedFrame {
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frame_layout_matches_the_wire_format() {
        let frame: ServerFrame = serde_json::from_value(json!({
            "event": "FromAPI",
            "data": {
                "testCases": [{"_id": "1", "status": "passed"}],
                "schema": {"status": "String"}
            }
        }))
        .unwrap();
        let ServerFrame::Snapshot(msg) = &frame;
        assert_eq!(msg.test_cases.len(), 1);
        assert_eq!(msg.schema.as_ref().map(Map::len), Some(1));

        let text = frame.to_text().unwrap();
        assert!(text.starts_with(r#"{"event":"FromAPI","data":{"testCases":"#));
    }

    #[test]
    fn schema_is_omitted_when_absent() {
        let frame = ServerFrame::Snapshot(SnapshotMessage {
            test_cases: vec![],
            schema: None,
        });
        let text = frame.to_text().unwrap();
        assert_eq!(text, r#"{"event":"FromAPI","data":{"testCases":[]}}"#);
        assert_eq!(ServerFrame::from_text(&text).unwrap(), frame);
    }

    #[test]
    fn event_name_constant_matches_frame_tag() {
        let text = ServerFrame::Snapshot(SnapshotMessage {
            test_cases: vec![],
            schema: None,
        })
        .to_text()
        .unwrap();
        assert!(text.contains(SNAPSHOT_EVENT));
    }

    #[test]
    fn viewer_decodes_arbitrary_pushes() {
        let text = r#"{"event":"FromAPI","data":{"testCases":[{"_id":1,"status":"passed"},{"status":"failed"}],"schema":{"status":{"type":"String","required":"yes"}}}}"#;
        let ReceivedFrame::Snapshot(snapshot) = ReceivedFrame::from_text(text).unwrap();
        assert_eq!(snapshot.test_cases[0].id, Some(json!(1)));
        assert_eq!(snapshot.test_cases[1].id, None);
        let keys: Vec<&String> = snapshot.schema.as_ref().unwrap().keys().collect();
        assert_eq!(keys, ["status"]);

        let odd = r#"{"event":"FromAPI","data":{"testCases":[],"schema":"TestCase"}}"#;
        let ReceivedFrame::Snapshot(snapshot) = ReceivedFrame::from_text(odd).unwrap();
        assert!(snapshot.schema.is_none());
    }

    #[test]
    fn server_frames_decode_on_the_viewer_side() {
        let msg = SnapshotMessage {
            test_cases: vec![Record::new("a1", Map::new())],
            schema: json!({"duration": "number"}).as_object().cloned(),
        };
        let text = ServerFrame::Snapshot(msg.clone()).to_text().unwrap();
        let ReceivedFrame::Snapshot(received) = ReceivedFrame::from_text(&text).unwrap();
        assert_eq!(received, ReceivedSnapshot::from(msg));
    }
}
