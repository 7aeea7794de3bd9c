//! Human-readable rendering of results for the command line.

use crate::models::{DatabaseMetrics, QueryResult};
use serde_json::Value as JsonValue;
use unicode_width::UnicodeWidthStr;

/// Format a byte count with binary units (1 kB = 1024 bytes).
///
/// ```
/// use sqlbridge::output::format_size;
///
/// assert_eq!(format_size(512), "512 B");
/// assert_eq!(format_size(1024), "1 kB");
/// assert_eq!(format_size(1048576), "1 MB");
/// ```
pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::WINDOWS)
}

fn format_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render a query result as an ASCII table (MySQL CLI style).
pub fn format_table(result: &QueryResult, elapsed_ms: u64) -> String {
    if result.columns.is_empty() {
        return format!(
            "Query OK, {} rows affected ({:.2} sec)\n",
            result.row_count,
            elapsed_ms as f64 / 1000.0
        );
    }

    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.width()).collect();
    for row in &result.rows {
        for (i, col) in result.columns.iter().enumerate() {
            if let Some(value) = row.get(col) {
                widths[i] = widths[i].max(format_value(value).width());
            }
        }
    }

    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    let mut output = String::new();
    output.push_str(&separator);
    for (col, w) in result.columns.iter().zip(&widths) {
        output.push_str(&format!("| {} ", pad(col, *w, false)));
    }
    output.push_str("|\n");
    output.push_str(&separator);

    for row in &result.rows {
        for (col, w) in result.columns.iter().zip(&widths) {
            let value = row.get(col).unwrap_or(&JsonValue::Null);
            let right = matches!(value, JsonValue::Number(_));
            output.push_str(&format!("| {} ", pad(&format_value(value), *w, right)));
        }
        output.push_str("|\n");
    }
    output.push_str(&separator);

    let row_text = if result.rows.len() == 1 { "row" } else { "rows" };
    output.push_str(&format!(
        "{} {} in set ({:.2} sec)\n",
        result.rows.len(),
        row_text,
        elapsed_ms as f64 / 1000.0
    ));
    output
}

// `format!` width counts chars, not display columns
fn pad(text: &str, width: usize, right: bool) -> String {
    let fill = " ".repeat(width.saturating_sub(text.width()));
    if right {
        format!("{}{}", fill, text)
    } else {
        format!("{}{}", text, fill)
    }
}

/// Render a metrics snapshot as plain text.
pub fn format_metrics(metrics: &DatabaseMetrics) -> String {
    let mut output = format!(
        "Tables: {}\nSize: {}\nActive connections: {}\n",
        metrics.table_count,
        format_size(metrics.size_bytes),
        metrics.active_connections
    );

    if !metrics.table_types.is_empty() {
        output.push_str("\nBy type:\n");
        for t in &metrics.table_types {
            output.push_str(&format!("  {:<12} {}\n", t.table_type, t.count));
        }
    }

    if !metrics.top_tables.is_empty() {
        output.push_str("\nLargest tables:\n");
        for t in &metrics.top_tables {
            let name = match &t.schema {
                Some(schema) => format!("{}.{}", schema, t.name),
                None => t.name.clone(),
            };
            let rows = t
                .row_count
                .map(|n| format!(" (~{} rows)", n))
                .unwrap_or_default();
            output.push_str(&format!(
                "  {:<32} {:>10}{}\n",
                name,
                format_size(t.size_bytes),
                rows
            ));
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TableSize, TableTypeCount};
    use serde_json::json;

    fn row(pairs: &[(&str, JsonValue)]) -> serde_json::Map<String, JsonValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_format_table() {
        let result = QueryResult::from_rows(
            vec!["id".into(), "name".into()],
            vec![
                row(&[("id", json!(1)), ("name", json!("Alice"))]),
                row(&[("id", json!(22)), ("name", JsonValue::Null)]),
            ],
        );
        let table = format_table(&result, 1500);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "+----+-------+");
        assert_eq!(lines[1], "| id | name  |");
        assert_eq!(lines[3], "|  1 | Alice |");
        assert_eq!(lines[4], "| 22 | NULL  |");
        assert!(table.ends_with("2 rows in set (1.50 sec)\n"));
    }

    #[test]
    fn test_format_table_wide_characters() {
        let result = QueryResult::from_rows(
            vec!["name".into()],
            vec![row(&[("name", json!("日本"))])],
        );
        let table = format_table(&result, 0);
        assert!(table.contains("| 日本 |"));
        assert!(table.contains("1 row in set"));
    }

    #[test]
    fn test_format_table_without_rows() {
        let table = format_table(&QueryResult::affected(3), 20);
        assert_eq!(table, "Query OK, 3 rows affected (0.02 sec)\n");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1536), "1.50 kB");
    }

    #[test]
    fn test_format_metrics() {
        let metrics = DatabaseMetrics {
            table_count: 2,
            size_bytes: 2048,
            active_connections: 1,
            top_tables: vec![TableSize {
                name: "orders".into(),
                schema: Some("public".into()),
                size_bytes: 1024,
                row_count: Some(10),
            }],
            table_types: vec![TableTypeCount {
                table_type: "BASE TABLE".into(),
                count: 2,
            }],
        };
        let text = format_metrics(&metrics);
        assert!(text.starts_with("Tables: 2\nSize: 2 kB\n"));
        assert!(text.contains("public.orders"));
        assert!(text.contains("(~10 rows)"));
    }
}
