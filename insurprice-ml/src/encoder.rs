//! Fitted feature encoder: one-hot categorical blocks followed by
//! standardized numerical columns.

use crate::data::RecordBatch;
use insurprice_core::Schema;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("column `{0}` is missing from the input")]
    MissingColumn(String),

    #[error("column `{column}` row {row} has a missing value")]
    MissingValue { column: String, row: usize },

    #[error("column `{column}` row {row}: {value} is not numeric")]
    NotNumeric {
        column: String,
        row: usize,
        value: String,
    },

    #[error("cannot fit an encoder on zero rows")]
    Empty,
}

/// One categorical column expanded into indicator columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHotBlock {
    pub column: String,
    /// Categories seen during fit, sorted.
    pub categories: Vec<String>,
}

/// One numerical column standardized as `(x - mean) / scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaledColumn {
    pub column: String,
    pub mean: f64,
    /// Population standard deviation, or 1.0 for a constant column.
    pub scale: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEncoder {
    pub categorical: Vec<OneHotBlock>,
    pub numerical: Vec<ScaledColumn>,
}

impl FeatureEncoder {
    /// Learn categories and scaling parameters from the training partition.
    pub fn fit(batch: &RecordBatch, schema: &Schema) -> Result<Self, EncodeError> {
        if batch.is_empty() {
            return Err(EncodeError::Empty);
        }

        let mut categorical = Vec::with_capacity(schema.categorical_columns.len());
        for column in &schema.categorical_columns {
            let values = batch
                .column_values(column)
                .ok_or_else(|| EncodeError::MissingColumn(column.clone()))?;
            let mut seen = BTreeSet::new();
            for (row, value) in values.into_iter().enumerate() {
                let label = category_label(value).ok_or_else(|| EncodeError::MissingValue {
                    column: column.clone(),
                    row,
                })?;
                seen.insert(label);
            }
            categorical.push(OneHotBlock {
                column: column.clone(),
                categories: seen.into_iter().collect(),
            });
        }

        let mut numerical = Vec::with_capacity(schema.numerical_columns.len());
        for column in &schema.numerical_columns {
            let values = numeric_column(batch, column)?;
            let n = values.len() as f64;
            let mean = values.sum() / n;
            let variance = values.mapv(|v| (v - mean) * (v - mean)).sum() / n;
            let std = variance.sqrt();
            let scale = if std > 0.0 && std.is_finite() { std } else { 1.0 };
            numerical.push(ScaledColumn {
                column: column.clone(),
                mean,
                scale,
            });
        }

        Ok(Self {
            categorical,
            numerical,
        })
    }

    /// Encode a batch. Categories not seen during fit encode as all zeros.
    pub fn transform(&self, batch: &RecordBatch) -> Result<Array2<f64>, EncodeError> {
        let mut out = Array2::zeros((batch.row_count(), self.n_features_out()));
        let mut offset = 0;

        for block in &self.categorical {
            let values = batch
                .column_values(&block.column)
                .ok_or_else(|| EncodeError::MissingColumn(block.column.clone()))?;
            for (row, value) in values.into_iter().enumerate() {
                let label = category_label(value).ok_or_else(|| EncodeError::MissingValue {
                    column: block.column.clone(),
                    row,
                })?;
                if let Ok(pos) = block.categories.binary_search(&label) {
                    out[[row, offset + pos]] = 1.0;
                }
            }
            offset += block.categories.len();
        }

        for scaled in &self.numerical {
            let values = numeric_column(batch, &scaled.column)?;
            for (row, v) in values.iter().enumerate() {
                out[[row, offset]] = (v - scaled.mean) / scaled.scale;
            }
            offset += 1;
        }

        Ok(out)
    }

    pub fn n_features_out(&self) -> usize {
        self.categorical
            .iter()
            .map(|b| b.categories.len())
            .sum::<usize>()
            + self.numerical.len()
    }

    /// Output column names, e.g. `smoker_yes` or `bmi`.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.n_features_out());
        for block in &self.categorical {
            for category in &block.categories {
                names.push(format!("{}_{}", block.column, category));
            }
        }
        names.extend(self.numerical.iter().map(|s| s.column.clone()));
        names
    }
}

/// Category label of a scalar, `None` for a missing value.
pub fn category_label(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Read a column as numbers. Numeric text is accepted, anything else fails.
pub fn numeric_column(batch: &RecordBatch, column: &str) -> Result<Array1<f64>, EncodeError> {
    let values = batch
        .column_values(column)
        .ok_or_else(|| EncodeError::MissingColumn(column.to_string()))?;
    values
        .into_iter()
        .enumerate()
        .map(|(row, value)| match value {
            Value::Null => Err(EncodeError::MissingValue {
                column: column.to_string(),
                row,
            }),
            Value::Number(n) => n.as_f64().ok_or_else(|| EncodeError::NotNumeric {
                column: column.to_string(),
                row,
                value: n.to_string(),
            }),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .ok_or_else(|| EncodeError::NotNumeric {
                    column: column.to_string(),
                    row,
                    value: format!("{s:?}"),
                }),
            other => Err(EncodeError::NotNumeric {
                column: column.to_string(),
                row,
                value: other.to_string(),
            }),
        })
        .collect()
}
