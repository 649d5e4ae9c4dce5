//! Normalization of raw sources into a uniform table list.
//!
//! Both entry points guarantee unique table names: a repeated name continues
//! the earlier table (rows are appended). Cells are passed through without
//! type coercion.

use std::path::Path;

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use log::{debug, info, warn};
use serde_json::Value;

use crate::{
    io_utils,
    model::{Row, Table},
};

/// Merges tables sharing a name, keeping first-seen order.
pub fn normalize(tables: Vec<Table>) -> Vec<Table> {
    let mut merged: Vec<Table> = Vec::with_capacity(tables.len());
    for table in tables {
        match merged.iter_mut().find(|t| t.name == table.name) {
            Some(existing) => {
                debug!(
                    "Merging {} row(s) into repeated table '{}'",
                    table.rows.len(),
                    table.name
                );
                existing.rows.extend(table.rows);
            }
            None => merged.push(table),
        }
    }
    merged
}

/// Accepts a file-processing or live-query result:
///
/// - `[{"table": name, "data": [rows]}, ...]`
/// - the same list wrapped once more (`[[...], ...]`), where only the first
///   inner list is read
/// - a flat list of row objects, read as one table called `default_name`
///
/// Anything else yields no tables.
pub fn from_records(value: &Value, default_name: &str) -> Vec<Table> {
    let Some(items) = value.as_array() else {
        debug!("Raw records are not a list; no tables extracted");
        return Vec::new();
    };
    let items = match items.first() {
        Some(Value::Array(inner)) => inner,
        _ => items,
    };
    if items.is_empty() {
        return Vec::new();
    }

    let tables = if items.iter().all(is_table_entry) {
        items
            .iter()
            .filter_map(|entry| table_from_entry(entry, default_name))
            .collect()
    } else {
        vec![Table::new(default_name, rows_from(items, default_name))]
    };
    normalize(tables)
}

fn is_table_entry(item: &Value) -> bool {
    item.as_object()
        .is_some_and(|obj| obj.contains_key("table") && obj.contains_key("data"))
}

fn table_from_entry(entry: &Value, default_name: &str) -> Option<Table> {
    let obj = entry.as_object()?;
    let name = match obj.get("table") {
        Some(Value::String(name)) if !name.is_empty() => name.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => default_name.to_string(),
    };
    let rows = obj
        .get("data")
        .and_then(Value::as_array)
        .map(|rows| rows_from(rows, &name))
        .unwrap_or_default();
    Some(Table::new(name, rows))
}

/// Non-object rows are kept as `{"value": <row>}`.
fn rows_from(items: &[Value], table_name: &str) -> Vec<Row> {
    let mut wrapped = 0usize;
    let rows = items
        .iter()
        .map(|item| match item {
            Value::Object(obj) => obj.clone(),
            other => {
                wrapped += 1;
                let mut row = Row::new();
                row.insert("value".to_string(), other.clone());
                row
            }
        })
        .collect();
    if wrapped > 0 {
        warn!("Wrapped {wrapped} non-object row(s) in table '{table_name}' under 'value'");
    }
    rows
}

/// Repeated header names get a numeric suffix so no cell is overwritten.
fn unique_headers(raw: Vec<String>) -> Vec<String> {
    let mut headers: Vec<String> = Vec::with_capacity(raw.len());
    for header in raw {
        if headers.contains(&header) {
            let renamed = unused_key(&headers, &header);
            warn!("Repeated header '{header}' renamed to '{renamed}'");
            headers.push(renamed);
        } else {
            headers.push(header);
        }
    }
    headers
}

fn unused_key(taken: &[String], base: &str) -> String {
    if !taken.iter().any(|key| key == base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{base}_{n}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Reads one delimited file as a single table named after the file stem.
/// A header-only file gives a table without rows; an empty file gives none.
/// Cells beyond the header are kept under `column_<n>` keys.
pub fn from_csv_path(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
    default_name: &str,
) -> Result<Vec<Table>> {
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
    let raw_headers = reader
        .byte_headers()
        .with_context(|| format!("Reading headers from {path:?}"))?
        .clone();
    if raw_headers.is_empty() {
        info!("Source {path:?} is empty");
        return Ok(Vec::new());
    }
    let mut headers = unique_headers(io_utils::decode_record(&raw_headers, encoding)?);
    let declared = headers.len();

    let mut rows = Vec::new();
    let mut record = csv::ByteRecord::new();
    while reader
        .read_byte_record(&mut record)
        .with_context(|| format!("Reading row {} from {path:?}", rows.len() + 1))?
    {
        let cells = io_utils::decode_record(&record, encoding)?;
        while headers.len() < cells.len() {
            let extra = unused_key(&headers, &format!("column_{}", headers.len() + 1));
            headers.push(extra);
        }
        let row: Row = headers
            .iter()
            .zip(cells)
            .map(|(header, cell)| (header.clone(), Value::String(cell)))
            .collect();
        rows.push(row);
    }

    if headers.len() > declared {
        warn!(
            "Rows in {path:?} carry {} cell(s) beyond the header; kept as {}",
            headers.len() - declared,
            headers[declared..].join(", ")
        );
    }

    let name = if io_utils::is_dash(path) {
        default_name.to_string()
    } else {
        path.file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .unwrap_or(default_name)
            .to_string()
    };
    info!("Extracted {} row(s) from {path:?} as table '{name}'", rows.len());
    Ok(vec![Table::new(name, rows)])
}
