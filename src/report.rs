//! Tabular rendering of observation logs.
//!
//! Consumes ordered [`ProbeAttempt`] sequences and renders them as aligned
//! text tables. The lag column appears only when lag was requested; within
//! it, an uncomputed lag renders as `-` and an unanswerable one as
//! `unknown`; the two are never conflated.

use crate::observation::ProbeAttempt;
use crate::poller::CatchUpReport;
use std::fmt::Write;
use std::time::Duration;

const READ_HEADERS: [&str; 4] = ["attempt", "node", "replica", "found"];
const CATCH_UP_HEADERS: [&str; 4] = ["attempt", "elapsed", "node", "found"];
const LAG_HEADER: &str = "lsn_lag_bytes";

/// Render the read-session table.
///
/// `total` is the planned attempt count, shown as `i/N` per row; for an
/// aborted session it still reflects the plan, so the table shows how far
/// the session got.
pub fn render_read_table(attempts: &[ProbeAttempt], total: u32, want_lag: bool) -> String {
    let mut headers: Vec<&str> = READ_HEADERS.to_vec();
    if want_lag {
        headers.push(LAG_HEADER);
    }

    let rows: Vec<Vec<String>> = attempts
        .iter()
        .map(|attempt| {
            let mut row = vec![
                format!("{}/{}", attempt.sequence, total),
                attempt.observation.node.clone(),
                attempt.observation.role.label().to_string(),
                found_label(attempt.observation.row_visible),
            ];
            if want_lag {
                row.push(lag_cell(attempt));
            }
            row
        })
        .collect();

    render_table(&headers, &rows)
}

/// Render the async catch-up table.
pub fn render_catch_up_table(report: &CatchUpReport, want_lag: bool) -> String {
    let mut headers: Vec<&str> = CATCH_UP_HEADERS.to_vec();
    if want_lag {
        headers.push(LAG_HEADER);
    }

    let rows: Vec<Vec<String>> = report
        .attempts
        .iter()
        .map(|attempt| {
            let mut row = vec![
                attempt.sequence.to_string(),
                format!("{}ms", attempt.elapsed.as_millis()),
                attempt.observation.node.clone(),
                found_label(attempt.observation.row_visible),
            ];
            if want_lag {
                row.push(lag_cell(attempt));
            }
            row
        })
        .collect();

    render_table(&headers, &rows)
}

/// Warning line for a poll that timed out.
pub fn catch_up_warning(budget: Duration) -> String {
    format!(
        "[WARNING] Async replica did not catch up within {}.",
        humantime::format_duration(budget)
    )
}

fn found_label(visible: bool) -> String {
    if visible { "yes" } else { "no" }.to_string()
}

fn lag_cell(attempt: &ProbeAttempt) -> String {
    match attempt.observation.lag {
        Some(lag) => lag.to_string(),
        None => "-".to_string(),
    }
}

/// Pad-and-align renderer; every cell left-aligned to its column width.
fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if cell.len() > widths[i] {
                widths[i] = cell.len();
            }
        }
    }

    let mut out = String::new();
    write_row(&mut out, headers.iter().map(|h| *h), &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    write_row(&mut out, rule.iter().map(String::as_str), &widths);
    for row in rows {
        write_row(&mut out, row.iter().map(String::as_str), &widths);
    }
    out
}

fn write_row<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    for (i, cell) in cells.enumerate() {
        let _ = write!(out, " {:<width$} ", cell, width = widths[i]);
    }
    out.push('\n');
}
