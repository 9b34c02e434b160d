//! Delimited table files for dataset partitions.
//!
//! Header row followed by one record per line. Cells containing the
//! delimiter, a quote or a line break are quoted with doubled inner quotes.
//! An empty cell is a missing value; numbers and booleans are typed back on
//! read.

use crate::data::batch::RecordBatch;
use insurprice_core::persistence::atomic_write;
use serde_json::Value;
use std::borrow::Cow;
use std::io;
use std::path::Path;

const DELIMITER: char = ',';

/// Write a batch as a delimited file (atomic).
pub fn write_table(path: &Path, batch: &RecordBatch) -> io::Result<()> {
    let mut out = String::new();
    push_record(&mut out, batch.columns.iter().map(|c| (c.as_str().into(), false)));
    for row in &batch.rows {
        push_record(&mut out, row.iter().map(render_cell));
    }
    atomic_write(path, out.as_bytes())
}

/// Read a delimited file written by [`write_table`].
pub fn read_table(path: &Path) -> io::Result<RecordBatch> {
    let content = std::fs::read_to_string(path)?;
    parse_table(&content)
}

/// Parse delimited text into a batch.
pub fn parse_table(content: &str) -> io::Result<RecordBatch> {
    let mut records = split_records(content)?.into_iter();
    let columns: Vec<String> = records
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "empty table file"))?
        .into_iter()
        .map(|field| field.text)
        .collect();

    let mut rows = Vec::new();
    for (line, record) in records.enumerate() {
        if record.len() != columns.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "record {} has {} fields, header has {}",
                    line + 1,
                    record.len(),
                    columns.len()
                ),
            ));
        }
        rows.push(record.into_iter().map(parse_cell).collect());
    }

    Ok(RecordBatch { columns, rows })
}

struct Field {
    text: String,
    quoted: bool,
}

fn push_record<'a>(out: &mut String, cells: impl Iterator<Item = (Cow<'a, str>, bool)>) {
    for (i, (cell, force_quote)) in cells.enumerate() {
        if i > 0 {
            out.push(DELIMITER);
        }
        if force_quote || cell.contains([DELIMITER, '"', '\n', '\r']) {
            out.push('"');
            out.push_str(&cell.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(&cell);
        }
    }
    out.push('\n');
}

/// Render a cell, quoting text that would otherwise be typed differently on read.
fn render_cell(value: &Value) -> (Cow<'_, str>, bool) {
    match value {
        Value::Null => ("".into(), false),
        Value::String(s) => {
            let retyped = !matches!(
                parse_cell(Field {
                    text: s.clone(),
                    quoted: false,
                }),
                Value::String(ref t) if t == s
            );
            (s.as_str().into(), retyped)
        }
        Value::Number(n) => (n.to_string().into(), false),
        Value::Bool(b) => (b.to_string().into(), false),
        other => (other.to_string().into(), true),
    }
}

/// Type a raw cell back into a JSON value.
fn parse_cell(field: Field) -> Value {
    if field.quoted {
        return Value::String(field.text);
    }
    let s = field.text.trim();
    if s.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = s.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    match s {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(s.to_string()),
    }
}

fn split_records(content: &str) -> io::Result<Vec<Vec<Field>>> {
    let mut records = Vec::new();
    let mut record: Vec<Field> = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => {
                in_quotes = true;
                quoted = true;
            }
            DELIMITER => {
                record.push(Field {
                    text: std::mem::take(&mut field),
                    quoted,
                });
                quoted = false;
            }
            '\r' => {}
            '\n' => {
                record.push(Field {
                    text: std::mem::take(&mut field),
                    quoted,
                });
                quoted = false;
                if !(record.len() == 1 && record[0].text.is_empty() && !record[0].quoted) {
                    records.push(std::mem::take(&mut record));
                } else {
                    record.clear();
                }
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "unterminated quoted field",
        ));
    }
    if !field.is_empty() || quoted || !record.is_empty() {
        record.push(Field { text: field, quoted });
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample() -> RecordBatch {
        RecordBatch::new(
            vec!["age".into(), "sex".into(), "bmi".into(), "expenses".into()],
            vec![
                vec![json!(19), json!("female"), json!(27.9), json!(16884.92)],
                vec![json!(18), json!("male"), json!(33.77), json!(1725.55)],
            ],
        )
    }

    #[test]
    fn test_write_then_read_preserves_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Train").join("train.csv");
        let batch = sample();
        write_table(&path, &batch).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("age,sex,bmi,expenses\n19,female,27.9,16884.92\n"));

        let loaded = read_table(&path).unwrap();
        assert_eq!(loaded, batch);
    }

    #[test]
    fn test_quoted_cells() {
        let batch = RecordBatch::new(
            vec!["region".into(), "note".into()],
            vec![vec![json!("south, east"), json!("says \"hi\"")]],
        );
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("q.csv");
        write_table(&path, &batch).unwrap();
        let loaded = read_table(&path).unwrap();
        assert_eq!(loaded, batch);
    }

    #[test]
    fn test_quoted_numeric_text_stays_string() {
        let loaded = parse_table("code\n\"42\"\n42\n").unwrap();
        assert_eq!(loaded.rows[0][0], json!("42"));
        assert_eq!(loaded.rows[1][0], json!(42));
    }

    #[test]
    fn test_numeric_looking_text_survives_roundtrip() {
        let batch = RecordBatch::new(
            vec!["code".into(), "flag".into(), "blank".into()],
            vec![vec![json!("007"), json!("true"), json!("")]],
        );
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("codes.csv");
        write_table(&path, &batch).unwrap();
        assert_eq!(read_table(&path).unwrap(), batch);
    }

    #[test]
    fn test_empty_cell_is_missing() {
        let loaded = parse_table("age,bmi\n19,\n").unwrap();
        assert_eq!(loaded.rows[0][1], Value::Null);
    }

    #[test]
    fn test_ragged_record_rejected() {
        let err = parse_table("age,bmi\n19\n").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_empty_file_rejected() {
        assert!(parse_table("").is_err());
    }
}
