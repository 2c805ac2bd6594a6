//! Console rendering of query results.
//!
//! Results are printed as an ASCII grid (like the psql/MySQL CLI) followed by
//! a row count and the execution time. Columns that look monetary have their
//! numeric values shown as `$1,234.56`.

use crate::models::{QueryResult, Row};
use serde_json::Value as JsonValue;
use unicode_width::UnicodeWidthStr;

/// Column name fragments that mark a monetary column.
pub const CURRENCY_KEYWORDS: &[&str] = &["amount", "price", "cost", "revenue", "value"];

/// Column name fragments that rule out a monetary column.
pub const EXCLUDE_KEYWORDS: &[&str] = &["quantity", "qty", "count", "number"];

/// Extra fragments that make a `total` column monetary.
const TOTAL_INDICATORS: &[&str] = &["sales", "income"];

/// Whether values of `column` should be rendered as currency.
pub fn is_currency_column(column: &str) -> bool {
    let lower = column.to_lowercase();

    if EXCLUDE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return false;
    }
    if CURRENCY_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return true;
    }
    lower.contains("total") && TOTAL_INDICATORS.iter().any(|kw| lower.contains(kw))
}

/// Render `amount` as dollars with thousands separators and two decimals.
pub fn format_currency(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("${}{}.{}", sign, grouped, frac_part)
}

/// Numeric value of a cell, for numbers and numeric strings (NUMERIC columns).
fn as_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

pub fn format_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Array(arr) => serde_json::to_string(arr).unwrap_or_default(),
        JsonValue::Object(obj) => serde_json::to_string(obj).unwrap_or_default(),
    }
}

/// Format one cell, applying currency rendering for monetary columns.
pub fn format_cell(column: &str, value: &JsonValue) -> String {
    if is_currency_column(column) {
        if let Some(amount) = as_number(value) {
            return format_currency(amount);
        }
    }
    format_value(value)
}

fn is_right_aligned(column: &str, value: &JsonValue) -> bool {
    matches!(value, JsonValue::Number(_)) || (is_currency_column(column) && as_number(value).is_some())
}

pub fn format_as_table(columns: &[String], rows: &[Row], execution_time_ms: u64) -> String {
    if columns.is_empty() {
        return "Empty set".to_string();
    }

    let cells: Vec<Vec<(String, bool)>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|col| {
                    let value = row.get(col).unwrap_or(&JsonValue::Null);
                    (format_cell(col, value), is_right_aligned(col, value))
                })
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.width()).collect();
    for row in &cells {
        for (i, (text, _)) in row.iter().enumerate() {
            widths[i] = widths[i].max(text.width());
        }
    }

    let mut output = String::new();
    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    output.push_str(&separator);
    let header: String = columns
        .iter()
        .zip(&widths)
        .map(|(col, w)| format!("| {} ", pad_center(col, *w)))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);
    output.push_str(&separator);

    for row in &cells {
        let row_str: String = row
            .iter()
            .zip(&widths)
            .map(|((text, right), w)| {
                if *right {
                    format!("| {} ", pad_left(text, *w))
                } else {
                    format!("| {} ", pad_right(text, *w))
                }
            })
            .collect::<String>()
            + "|\n";
        output.push_str(&row_str);
    }

    output.push_str(&separator);

    let row_count = rows.len();
    let row_text = if row_count == 1 { "row" } else { "rows" };
    output.push_str(&format!(
        "{} {} in set ({:.2} sec)\n",
        row_count,
        row_text,
        execution_time_ms as f64 / 1000.0
    ));

    output
}

/// Render a full query result.
pub fn format_result(result: &QueryResult) -> String {
    if result.is_empty() {
        return format!(
            "Empty set ({:.2} sec)\n",
            result.duration.as_millis() as f64 / 1000.0
        );
    }
    format_as_table(
        &result.columns,
        &result.rows,
        result.duration.as_millis() as u64,
    )
}

// `format!` width specifiers count chars, not display columns
fn pad_right(text: &str, width: usize) -> String {
    format!("{}{}", text, " ".repeat(width.saturating_sub(text.width())))
}

fn pad_left(text: &str, width: usize) -> String {
    format!("{}{}", " ".repeat(width.saturating_sub(text.width())), text)
}

fn pad_center(text: &str, width: usize) -> String {
    let total = width.saturating_sub(text.width());
    let left = total / 2;
    format!("{}{}{}", " ".repeat(left), text, " ".repeat(total - left))
}
