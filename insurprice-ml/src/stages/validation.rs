//! Validation: schema conformance of both partitions plus train/test drift.

use crate::artifacts::{ArtifactLayout, IngestionArtifact, ValidationArtifact};
use crate::data::{RecordBatch, read_table};
use crate::drift::{ColumnDrift, DriftReport};
use crate::encoder::numeric_column;
use insurprice_core::config::ValidationConfig;
use insurprice_core::{ColumnType, PipelineError, Result, Schema};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{info, warn};

/// Whether a raw value has the declared basic type.
///
/// Integers may arrive as whole-valued floats; any scalar can be read as a
/// string.
pub fn value_matches(dtype: ColumnType, value: &Value) -> bool {
    match (dtype, value) {
        (ColumnType::Integer, Value::Number(n)) => {
            n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
        }
        (ColumnType::Float, Value::Number(_)) => true,
        (ColumnType::String, Value::String(_) | Value::Number(_) | Value::Bool(_)) => true,
        (ColumnType::Boolean, Value::Bool(_)) => true,
        _ => false,
    }
}

/// Everything about `batch` that disagrees with `schema`.
pub fn schema_issues(batch: &RecordBatch, schema: &Schema, partition: &str) -> Vec<String> {
    let mut issues = Vec::new();
    let declared: HashSet<&str> = schema.column_names().collect();
    let present: HashSet<&str> = batch.columns.iter().map(String::as_str).collect();

    for name in schema.column_names() {
        if !present.contains(name) {
            issues.push(format!("{partition}: missing column `{name}`"));
        }
    }
    for name in &batch.columns {
        if !declared.contains(name.as_str()) {
            issues.push(format!("{partition}: unexpected column `{name}`"));
        }
    }

    for spec in &schema.columns {
        let Some(values) = batch.column_values(&spec.name) else {
            continue;
        };
        if let Some((row, value)) = values
            .iter()
            .enumerate()
            .find(|(_, v)| !value_matches(spec.dtype, v))
        {
            issues.push(format!(
                "{partition}: column `{}` row {row} expected {}, found {value}",
                spec.name, spec.dtype
            ));
        }
    }
    issues
}

/// Run the validation stage.
///
/// Schema mismatch fails with `SchemaValidation` after the report is written.
/// Drift only lowers the status, unless `halt_on_drift` is set, in which case
/// the run fails with `DataDrift` after the report is written.
pub fn validate(
    ingestion: &IngestionArtifact,
    schema: &Schema,
    config: &ValidationConfig,
    layout: &ArtifactLayout,
) -> Result<ValidationArtifact> {
    let train = read_table(&ingestion.train_file_path)
        .map_err(|e| PipelineError::data_access("reading train partition", e))?;
    let test = read_table(&ingestion.test_file_path)
        .map_err(|e| PipelineError::data_access("reading test partition", e))?;

    let mut issues = schema_issues(&train, schema, "train");
    issues.extend(schema_issues(&test, schema, "test"));

    let threshold = config.drift_p_value_threshold;
    let mut columns = Vec::new();
    if issues.is_empty() {
        for spec in schema.columns.iter().filter(|c| c.dtype.is_numeric()) {
            let reference = numeric_column(&train, &spec.name)
                .map_err(|e| PipelineError::schema(e.to_string()))?;
            let current = numeric_column(&test, &spec.name)
                .map_err(|e| PipelineError::schema(e.to_string()))?;
            if let Some(drift) = ColumnDrift::compute(&spec.name, &reference, &current, threshold) {
                if drift.drift_detected {
                    warn!(
                        column = %drift.column,
                        statistic = drift.statistic,
                        p_value = drift.p_value,
                        "Drift detected"
                    );
                }
                columns.push(drift);
            }
        }
    }

    let report = DriftReport::new(threshold, issues, columns);
    let drift_report_path = layout.drift_report_file();
    report
        .save(&drift_report_path)
        .map_err(|e| PipelineError::data_access("writing drift report", e))?;

    if !report.schema_matches {
        return Err(PipelineError::schema(report.schema_issues.join("; ")));
    }
    if !report.validation_status && config.halt_on_drift {
        let columns = report
            .columns
            .iter()
            .filter(|c| c.drift_detected)
            .map(|c| c.column.clone())
            .collect();
        return Err(PipelineError::DataDrift { columns, threshold });
    }

    info!(
        status = report.validation_status,
        drifted_columns = report.drifted_columns,
        report = %drift_report_path.display(),
        "Validation complete"
    );

    Ok(ValidationArtifact {
        drift_report_path,
        validation_status: report.validation_status,
        report,
    })
}
