use crate::core::assembler::{AggregateOutcome, ViewModel};
use crate::domain::model::{AggregateRow, GroupKey, RowCount};
use crate::utils::error::Result;
use std::fmt::Write;

pub const EMPTY_MESSAGE: &str = "no data for this filter combination";

pub fn render_json(view: &ViewModel) -> Result<String> {
    Ok(serde_json::to_string_pretty(view)?)
}

/// `{ "rows": [...] }` for a single aggregate.
pub fn rows_response(rows: &[AggregateRow]) -> serde_json::Value {
    serde_json::json!({ "rows": rows })
}

/// The status and body one aggregate answers with. Zero rows is a 200 with
/// an empty list; failures carry their HTTP-equivalent status.
pub fn aggregate_response(result: &Result<Vec<AggregateRow>>) -> (u16, serde_json::Value) {
    match result {
        Ok(rows) => (200, rows_response(rows)),
        Err(e) => (e.status_code(), serde_json::json!({ "error": e.to_string() })),
    }
}

fn row_label(row: &AggregateRow) -> String {
    let key = match &row.key {
        GroupKey::Section(id) | GroupKey::District(id) | GroupKey::Area(id) => id.clone(),
        GroupKey::Gender(g) => g.to_string(),
        GroupKey::Rating(r) => r.to_string(),
        GroupKey::State(s) => s.clone(),
    };
    match &row.name {
        Some(name) => format!("{} ({})", name, key),
        None => key,
    }
}

pub fn render_text(view: &ViewModel) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Filters: {}  [{:?}]", view.filters, view.state);
    if view.empty {
        let _ = writeln!(out, "{}", EMPTY_MESSAGE);
        return out;
    }

    if let Some(total) = view.summary.total_players {
        let _ = writeln!(out, "Players: {}", total);
    }
    if let Some(avg) = view.summary.average_rating {
        let _ = writeln!(out, "Average rating: {:.2}", avg);
    }

    for (kind, outcome) in &view.aggregates {
        let _ = writeln!(out, "\n{}", kind);
        match outcome {
            AggregateOutcome::Data { rows } => {
                for row in rows {
                    match row.count {
                        RowCount::ByGender { male, female } => {
                            let _ = writeln!(out, "  {:<24} male {:>6}  female {:>6}", row_label(row), male, female);
                        }
                        RowCount::Players(n) => {
                            let _ = writeln!(out, "  {:<24} {:>6}", row_label(row), n);
                        }
                    }
                }
            }
            AggregateOutcome::Empty => {
                let _ = writeln!(out, "  {}", EMPTY_MESSAGE);
            }
            AggregateOutcome::Error { error } => {
                let _ = writeln!(out, "  error ({}): {}", error.status, error.message);
            }
        }
    }
    out
}
