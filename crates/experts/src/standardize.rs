use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const MISSING_MARKERS: &[&str] = &["", "n/a", "na", "null", "-"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Integer(i64),
    Float(f64),
    Text(String),
    Empty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanedRow {
    pub row_id: String,
    /// One cell per column, in column order
    pub cells: Vec<Cell>,
    pub quality: f64,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub completeness: f64,
    pub average_row_quality: f64,
    pub consistency: f64,
    pub overall: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardizedTable {
    pub table_id: String,
    pub table_name: String,
    pub raw_text: String,
    pub original_columns: Vec<String>,
    pub columns: Vec<String>,
    pub column_types: Vec<ColumnType>,
    pub rows: Vec<CleanedRow>,
    pub quality: QualityMetrics,
}

impl StandardizedTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }
}

/// A table as the model reported it, before cleaning.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub table_name: Option<String>,
    /// Non-string headers arrive as `None`
    pub columns: Vec<Option<String>>,
    pub rows: Vec<Map<String, Value>>,
    pub raw_text: String,
}

/// Clean one raw table. Tables with no columns or no rows are dropped.
pub fn standardize_table(raw: &RawTable, table_id: &str) -> Option<StandardizedTable> {
    if raw.columns.is_empty() || raw.rows.is_empty() {
        return None;
    }

    let original_columns: Vec<String> = raw
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| c.clone().unwrap_or_else(|| format!("Column_{}", i + 1)))
        .collect();
    let columns = clean_column_names(&raw.columns);

    // Rows are keyed by the names the model used, not the cleaned ones.
    // Missing markers do not vote on the column type.
    let column_types: Vec<ColumnType> = original_columns
        .iter()
        .map(|name| {
            let samples: Vec<String> = raw
                .rows
                .iter()
                .take(10)
                .filter_map(|row| row.get(name))
                .filter(|v| !v.is_null())
                .map(|v| cell_text(v).trim().to_string())
                .filter(|s| !is_missing(s))
                .collect();
            infer_column_type(&samples)
        })
        .collect();

    let rows: Vec<CleanedRow> = raw
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut quality = 1.0;
            let mut notes = Vec::new();
            let cells = original_columns
                .iter()
                .zip(&column_types)
                .map(|(name, column_type)| {
                    let (cell, penalty, note) = clean_value(row.get(name), *column_type);
                    quality -= penalty;
                    if let Some(note) = note {
                        notes.push(format!("{}: {}", name, note));
                    }
                    cell
                })
                .collect();

            CleanedRow {
                row_id: format!("row_{}", i + 1),
                cells,
                quality: f64::clamp(quality, 0.0, 1.0),
                notes,
            }
        })
        .collect();

    let quality = quality_metrics(&rows, columns.len());

    Some(StandardizedTable {
        table_id: table_id.to_string(),
        table_name: raw
            .table_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("Table {}", table_id)),
        raw_text: raw.raw_text.clone(),
        original_columns,
        columns,
        column_types,
        rows,
        quality,
    })
}

/// Keep word characters, whitespace, `-` and `.`; whitespace runs become `_`.
pub fn clean_column_names(columns: &[Option<String>]) -> Vec<String> {
    columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let kept: String = column
                .as_deref()
                .unwrap_or_default()
                .chars()
                .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace() || *c == '-' || *c == '.')
                .collect();
            let cleaned = kept.split_whitespace().collect::<Vec<_>>().join("_");

            if cleaned.is_empty() {
                format!("Column_{}", i + 1)
            } else {
                cleaned
            }
        })
        .collect()
}

/// Numeric when more than 70% of samples parse; integer if all of those are whole.
pub fn infer_column_type(samples: &[String]) -> ColumnType {
    if samples.is_empty() {
        return ColumnType::String;
    }

    let numeric: Vec<f64> = samples.iter().filter_map(|s| parse_number(s)).collect();
    if numeric.len() as f64 / samples.len() as f64 <= 0.7 {
        return ColumnType::String;
    }

    if numeric.iter().all(|n| n.fract() == 0.0) {
        ColumnType::Integer
    } else {
        ColumnType::Float
    }
}

fn parse_number(text: &str) -> Option<f64> {
    if is_missing(text) {
        return None;
    }
    let compact: String = text.chars().filter(|c| *c != ',' && *c != ' ').collect();
    compact.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn is_missing(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    MISSING_MARKERS.contains(&lower.as_str())
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Cleaned cell, quality penalty, and an optional note.
pub fn clean_value(value: Option<&Value>, column_type: ColumnType) -> (Cell, f64, Option<&'static str>) {
    let raw = match value {
        None | Some(Value::Null) => return (Cell::Empty, 0.1, None),
        Some(v) => cell_text(v),
    };

    if is_missing(&raw) {
        return (Cell::Empty, 0.1, Some("empty_value"));
    }

    match column_type {
        ColumnType::Float => match parse_number(&raw) {
            Some(n) => (Cell::Float(n), 0.0, None),
            None => (Cell::Text(raw.trim().to_string()), 0.3, Some("numeric_conversion_failed")),
        },
        ColumnType::Integer => match parse_number(&raw) {
            Some(n) => (Cell::Integer(n.trunc() as i64), 0.0, None),
            None => (Cell::Text(raw.trim().to_string()), 0.3, Some("integer_conversion_failed")),
        },
        ColumnType::String => {
            let trimmed = raw.trim();
            if trimmed.len() != raw.len() {
                (Cell::Text(trimmed.to_string()), 0.05, Some("whitespace_trimmed"))
            } else {
                (Cell::Text(raw), 0.0, None)
            }
        }
    }
}

pub fn quality_metrics(rows: &[CleanedRow], column_count: usize) -> QualityMetrics {
    if rows.is_empty() || column_count == 0 {
        return QualityMetrics::default();
    }

    let total_cells = rows.len() * column_count;
    let filled = rows
        .iter()
        .flat_map(|r| r.cells.iter())
        .filter(|c| **c != Cell::Empty)
        .count();

    let completeness = filled as f64 / total_cells as f64;
    let average_row_quality = rows.iter().map(|r| r.quality).sum::<f64>() / rows.len() as f64;
    let consistency = f64::min(1.0, average_row_quality + 0.1);

    QualityMetrics {
        completeness,
        average_row_quality,
        consistency,
        overall: (completeness + average_row_quality + consistency) / 3.0,
    }
}
