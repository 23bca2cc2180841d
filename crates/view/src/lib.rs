//! Viewer-side reconciliation of snapshot pushes.
//!
//! A [`Reconciler`] owns the local view. Every snapshot replaces the record
//! set wholesale and recomputes the derived columns and summary counts
//! before the new state becomes visible.

mod columns;
mod reconcile;
mod render;
mod summary;
mod table;

pub use columns::{generate_columns, label_for, ColumnDescriptor, RenderHint, SortDirection, Sorter};
pub use reconcile::{Notice, ReconcileError, Reconciler, Row, ViewState};
pub use render::{parse_timestamp, render_cell, Cell, DateFormatter, TagColor, INVALID_DATE};
pub use summary::SummaryCounts;
pub use table::{render_loading, render_notice, render_summary, render_table, LOADING_INDICATOR};
