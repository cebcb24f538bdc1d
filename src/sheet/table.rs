//! Sheet CSV export → header-addressable rows.

use std::collections::HashMap;

use anyhow::{Context, Result};

/// One data row addressable by the exact header text and by its lowercase form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetRow {
    cells: HashMap<String, String>,
}

impl SheetRow {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut cells = HashMap::new();
        for (k, v) in pairs {
            let k: String = k.into();
            let v: String = v.into();
            cells.insert(k.to_lowercase(), v.clone());
            cells.insert(k, v);
        }
        Self { cells }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.cells.get(key).map(String::as_str)
    }

    /// First alias whose value is non-empty, trying the exact key then its lowercase form.
    pub fn pick(&self, aliases: &[&str]) -> &str {
        for alias in aliases {
            if let Some(v) = self.get(alias).filter(|v| !v.is_empty()) {
                return v;
            }
            let lower = alias.to_lowercase();
            if let Some(v) = self.get(&lower).filter(|v| !v.is_empty()) {
                return v;
            }
        }
        ""
    }
}

/// Parse a CSV export. The first record is the header row (trimmed); short rows are padded
/// with empty cells, extra cells without a header are dropped.
pub fn parse_rows(text: &str) -> Result<Vec<SheetRow>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = reader.records();
    let headers: Vec<String> = match records.next() {
        Some(first) => first
            .context("reading CSV header row")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect(),
        None => return Ok(Vec::new()),
    };

    let mut rows = Vec::new();
    for (idx, rec) in records.enumerate() {
        let rec = rec.with_context(|| format!("reading CSV row {}", idx + 2))?;
        let pairs = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), rec.get(i).unwrap_or("").to_string()));
        rows.push(SheetRow::from_pairs(pairs));
    }
    Ok(rows)
}

/// Case-insensitive `StoreID` match.
pub fn find_store_row<'a>(rows: &'a [SheetRow], store_id: &str) -> Option<&'a SheetRow> {
    let wanted = store_id.trim().to_lowercase();
    rows.iter()
        .find(|r| r.pick(&["StoreID", "storeid"]).trim().to_lowercase() == wanted)
}
