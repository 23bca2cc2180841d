//! Plain-text rendering of a [`ViewState`] for terminal viewers.

use crate::reconcile::{Notice, ViewState};
use crate::render::Cell;
use crate::summary::SummaryCounts;

/// Shown until the first snapshot arrives.
pub const LOADING_INDICATOR: &str = "Loading.....";

pub fn render_loading() -> String {
    format!("{}\n", LOADING_INDICATOR)
}

/// `Total : N  Passed : N  Failed : N  Skipped : N`
pub fn render_summary(summary: &SummaryCounts) -> String {
    format!(
        "Total : {}  Passed : {}  Failed : {}  Skipped : {}\n",
        summary.total, summary.passed, summary.failed, summary.skipped
    )
}

pub fn render_notice(notice: &Notice) -> String {
    format!("{}\n  {}\n", notice.title, notice.description)
}

/// Header, rule, then one line per row in store order.
pub fn render_table(state: &ViewState) -> String {
    let headers: Vec<&str> = state.columns().iter().map(|c| c.title.as_str()).collect();
    let body: Vec<Vec<String>> = state
        .rows()
        .iter()
        .map(|row| row.cells.iter().map(cell_text).collect())
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for line in &body {
        for (width, text) in widths.iter_mut().zip(line) {
            *width = (*width).max(text.chars().count());
        }
    }

    let mut out = String::new();
    push_line(&mut out, headers.iter().copied(), &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_line(&mut out, rule.iter().map(String::as_str), &widths);
    for line in &body {
        push_line(&mut out, line.iter().map(String::as_str), &widths);
    }
    out
}

fn cell_text(cell: &Cell) -> String {
    match cell {
        Cell::Tag { text, color } if text.is_empty() => format!("({})", color.name()),
        Cell::Tag { text, color } => format!("{} ({})", text, color.name()),
        Cell::Text(text) => text.clone(),
    }
}

fn push_line<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(text, w)| format!("{:<w$}", text, w = *w))
        .collect();
    out.push_str("  ");
    out.push_str(padded.join("  ").trim_end());
    out.push('\n');
}
