//! Google Visualization (GViz) query responses.
//!
//! The endpoint answers with JavaScript like
//! `/*O_o*/\ngoogle.visualization.Query.setResponse({...});` which is unwrapped to JSON here.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static RE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\s\S]*setResponse\(").expect("gviz prefix regex"));
static RE_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\);?\s*$").expect("gviz suffix regex"));

pub fn unwrap_response(raw: &str) -> Result<Value> {
    let body = RE_PREFIX.replace(raw, "");
    let body = RE_SUFFIX.replace(&body, "");
    serde_json::from_str(&body).context("parsing GViz response JSON")
}

/// Cells of the first result row as strings (`null` cells → `""`).
pub fn first_row_cells(table: &Value) -> Option<Vec<String>> {
    let row = table.pointer("/table/rows/0/c")?.as_array()?;
    Some(row.iter().map(cell_text).collect())
}

fn cell_text(cell: &Value) -> String {
    match cell.get("v") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => match n.as_f64() {
            // Sheets reports every number as a double; whole numbers print without ".0".
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// GViz string literals are single-quoted; quotes and backslashes are simply removed.
pub fn sanitize_literal(s: &str) -> String {
    s.chars().filter(|c| !matches!(c, '\'' | '"' | '\\')).collect()
}
