use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::KpiTable;

/// Render the finished KPI table as markdown: one section per reporting
/// window, metrics listed down a two-column table. Columns missing from a
/// row render as `-`.
pub fn render_report(generated_at: DateTime<Utc>, table: &KpiTable) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Clinical Monitoring KPI Report");
    let _ = writeln!(
        output,
        "Generated {}",
        generated_at.format("%Y-%m-%d %H:%M UTC")
    );

    if table.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "No reporting windows computed.");
        return output;
    }

    let columns = table.columns();
    for (label, row) in table.rows() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## {label}");
        let _ = writeln!(output);
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "| --- | --- |");
        for column in &columns {
            match row.get(column) {
                Some(value) => {
                    let _ = writeln!(output, "| {column} | {value} |");
                }
                None => {
                    let _ = writeln!(output, "| {column} | - |");
                }
            }
        }
    }

    output
}
