//! Delimited text export (CSV/TSV) for transactions and generic JSON rows

use serde_json::Value;

use crate::types::TransactionRecord;

/// Column headers of the transaction export
pub const TRANSACTION_HEADERS: [&str; 9] = [
    "Order Ref",
    "Security",
    "Symbol",
    "Type",
    "Status",
    "Quantity",
    "Order Value",
    "Order Date",
    "Current Price",
];

/// Quotes a field when it contains the delimiter, a quote or a line break
pub fn escape_field(field: &str, delimiter: char) -> String {
    if field.contains(delimiter) || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Joins a header row and data rows into delimited text
pub fn to_delimited<S: AsRef<str>>(headers: &[S], rows: &[Vec<String>], delimiter: char) -> String {
    let separator = delimiter.to_string();
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(
        headers
            .iter()
            .map(|h| escape_field(h.as_ref(), delimiter))
            .collect::<Vec<_>>()
            .join(&separator),
    );
    for row in rows {
        lines.push(
            row.iter()
                .map(|f| escape_field(f, delimiter))
                .collect::<Vec<_>>()
                .join(&separator),
        );
    }
    lines.join("\n")
}

/// One header row plus one row per transaction
pub fn transactions_to_csv(transactions: &[TransactionRecord]) -> String {
    let rows: Vec<Vec<String>> = transactions
        .iter()
        .map(|t| {
            vec![
                t.order.order_ref_no.clone(),
                t.security_name.clone().unwrap_or_default(),
                t.security_symbol.clone().unwrap_or_default(),
                t.order.transaction_type.to_string(),
                t.order.order_status.to_string(),
                t.order.quantity.to_string(),
                t.order.order_value.to_string(),
                t.order.order_date.to_rfc3339(),
                t.current_price.map(|p| p.to_string()).unwrap_or_default(),
            ]
        })
        .collect();
    to_delimited(&TRANSACTION_HEADERS, &rows, ',')
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        // nested structures are embedded as JSON text
        other => other.to_string(),
    }
}

/// Flattens JSON objects into delimited text using the first object's keys
pub fn json_rows_to_delimited(rows: &[Value], delimiter: char) -> String {
    let Some(Value::Object(first)) = rows.first() else {
        return String::new();
    };
    let headers: Vec<String> = first.keys().cloned().collect();

    let body: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            headers
                .iter()
                .map(|h| row.get(h).map(render_cell).unwrap_or_default())
                .collect()
        })
        .collect();
    to_delimited(&headers, &body, delimiter)
}
