//! In-memory tabular record set.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Document-store internal identifier, never part of the dataset.
pub const DOCUMENT_ID_FIELD: &str = "_id";

/// Ordered rows of named fields.
///
/// A missing field is represented as `Value::Null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// A document that is not a JSON object cannot become a row.
#[derive(Debug, thiserror::Error)]
#[error("document {index} is not an object")]
pub struct NotAnObject {
    pub index: usize,
}

impl RecordBatch {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Build a batch from JSON documents.
    ///
    /// Columns are the union of all document keys in first-seen order, with
    /// the store's `_id` field dropped. Keys absent from a document become
    /// missing values.
    pub fn from_documents(documents: &[Value]) -> Result<Self, NotAnObject> {
        let mut columns: Vec<String> = Vec::new();
        for (index, doc) in documents.iter().enumerate() {
            let map = doc.as_object().ok_or(NotAnObject { index })?;
            for key in map.keys() {
                if key != DOCUMENT_ID_FIELD && !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = documents
            .iter()
            .map(|doc| {
                columns
                    .iter()
                    .map(|col| doc.get(col).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Ok(Self { columns, rows })
    }

    /// Append every named column the batch lacks, filled with missing values.
    ///
    /// A declared field that no document carries is then seen as missing in
    /// each row rather than as an absent column.
    pub fn ensure_columns<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) -> usize {
        let mut added = 0;
        for name in names {
            if self.column_index(name).is_none() {
                self.columns.push(name.to_string());
                for row in &mut self.rows {
                    row.push(Value::Null);
                }
                added += 1;
            }
        }
        added
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column, top to bottom.
    pub fn column_values(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).unwrap_or(&Value::Null))
                .collect(),
        )
    }

    /// Remove every row that has a missing field. Returns how many were dropped.
    pub fn drop_incomplete(&mut self) -> usize {
        let width = self.columns.len();
        let before = self.rows.len();
        self.rows
            .retain(|row| row.len() == width && row.iter().all(|v| !v.is_null()));
        before - self.rows.len()
    }

    /// New batch with the rows at `indices`, in that order.
    pub fn take_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        }
    }

    /// Remove a column, returning its values if it was present.
    pub fn remove_column(&mut self, name: &str) -> Option<Vec<Value>> {
        let idx = self.column_index(name)?;
        self.columns.remove(idx);
        Some(
            self.rows
                .iter_mut()
                .map(|row| {
                    if idx < row.len() {
                        row.remove(idx)
                    } else {
                        Value::Null
                    }
                })
                .collect(),
        )
    }
}
