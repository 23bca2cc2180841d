use serde_json::{Map, Value};
use testboard_interchange::{ReceivedFrame, ReceivedSnapshot, SnapshotRecord};
use thiserror::Error;

use crate::columns::{generate_columns, ColumnDescriptor, SortDirection};
use crate::render::{render_cell, Cell, DateFormatter};
use crate::summary::SummaryCounts;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("malformed snapshot frame: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The one-shot message shown when a snapshot arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// JSON of the last record, or `undefined` for an empty snapshot.
    pub title: String,
    pub description: String,
}

impl Notice {
    fn for_snapshot(records: &[SnapshotRecord]) -> Self {
        let title = records
            .last()
            .and_then(|r| serde_json::to_string(&r.to_value()).ok())
            .unwrap_or_else(|| "undefined".to_string());
        Notice {
            title,
            description: format!("New data has been added with {} test cases.", records.len()),
        }
    }
}

/// A record and its rendered cells, one per column.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub record: SnapshotRecord,
    pub cells: Vec<Cell>,
}

/// Everything derived from one snapshot. Built in full before it replaces
/// the previous state, so a half-updated view is never observable.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    schema: Option<Map<String, Value>>,
    columns: Vec<ColumnDescriptor>,
    rows: Vec<Row>,
    summary: SummaryCounts,
}

impl ViewState {
    fn build(snapshot: ReceivedSnapshot, dates: &DateFormatter) -> Self {
        let ReceivedSnapshot { test_cases, schema } = snapshot;
        let columns = generate_columns(schema.as_ref(), &test_cases);
        let summary = SummaryCounts::from_records(&test_cases);
        let rows = test_cases
            .into_iter()
            .map(|record| {
                let cells = columns
                    .iter()
                    .map(|column| render_cell(column, &record, dates))
                    .collect();
                Row { record, cells }
            })
            .collect();
        ViewState {
            schema,
            columns,
            rows,
            summary,
        }
    }

    pub fn schema(&self) -> Option<&Map<String, Value>> {
        self.schema.as_ref()
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Rows in the order the store returned them.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn summary(&self) -> SummaryCounts {
        self.summary
    }

    /// Rows ordered by `column`'s sorter. A column that is unknown or not
    /// sortable leaves store order; ties keep store order too.
    pub fn sorted_rows(&self, column: &str, direction: SortDirection) -> Vec<&Row> {
        let mut rows: Vec<&Row> = self.rows.iter().collect();
        let sorter = self
            .columns
            .iter()
            .find(|c| c.key == column)
            .and_then(|c| c.sorter);
        if let Some(sorter) = sorter {
            rows.sort_by(|a, b| {
                let ord = sorter.compare(column, &a.record, &b.record);
                match direction {
                    SortDirection::Ascend => ord,
                    SortDirection::Descend => ord.reverse(),
                }
            });
        }
        rows
    }
}

/// Holds the local view and replaces it wholesale on every snapshot.
#[derive(Debug, Default)]
pub struct Reconciler {
    state: Option<ViewState>,
    dates: DateFormatter,
}

impl Reconciler {
    pub fn new(dates: DateFormatter) -> Self {
        Reconciler { state: None, dates }
    }

    /// True until the first snapshot has been applied.
    pub fn is_loading(&self) -> bool {
        self.state.is_none()
    }

    pub fn state(&self) -> Option<&ViewState> {
        self.state.as_ref()
    }

    /// Replace the view with `snapshot` and return the notice to show.
    pub fn apply(&mut self, snapshot: ReceivedSnapshot) -> Notice {
        let notice = Notice::for_snapshot(&snapshot.test_cases);
        let next = ViewState::build(snapshot, &self.dates);
        tracing::debug!(
            records = next.summary.total,
            columns = next.columns.len(),
            "snapshot reconciled"
        );
        self.state = Some(next);
        notice
    }

    /// Decode a wire frame and apply it. A malformed frame leaves the
    /// current view untouched.
    pub fn apply_frame(&mut self, text: &str) -> Result<Notice, ReconcileError> {
        match ReceivedFrame::from_text(text)? {
            ReceivedFrame::Snapshot(snapshot) => Ok(self.apply(snapshot)),
        }
    }
}
