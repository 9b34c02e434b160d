//! Transformation: fit the feature encoder on train, encode both partitions.

use crate::artifacts::{ArtifactLayout, IngestionArtifact, TransformationArtifact};
use crate::data::{RecordBatch, read_table};
use crate::encoder::{FeatureEncoder, numeric_column};
use insurprice_core::persistence::write_binary;
use insurprice_core::{Cause, PipelineError, Result, Schema};
use ndarray::{Array2, Axis, concatenate};
use tracing::info;

/// Encode `batch` and append its raw target as the last column.
pub fn encode_with_target(
    encoder: &FeatureEncoder,
    batch: &RecordBatch,
    target_column: &str,
) -> Result<Array2<f64>> {
    let features = encoder
        .transform(batch)
        .map_err(|e| PipelineError::transformation("encoding features", e))?;
    let target = numeric_column(batch, target_column)
        .map_err(|e| PipelineError::transformation("reading target column", e))?;
    concatenate(Axis(1), &[features.view(), target.view().insert_axis(Axis(1))])
        .map_err(|e| PipelineError::transformation("appending target column", e))
}

pub fn transform(
    ingestion: &IngestionArtifact,
    schema: &Schema,
    layout: &ArtifactLayout,
) -> Result<TransformationArtifact> {
    let train = read_table(&ingestion.train_file_path)
        .map_err(|e| PipelineError::transformation("reading train partition", e))?;
    let test = read_table(&ingestion.test_file_path)
        .map_err(|e| PipelineError::transformation("reading test partition", e))?;

    let target = &schema.target_column;
    for (name, batch) in [("train", &train), ("test", &test)] {
        if batch.column_index(target).is_none() {
            return Err(PipelineError::transformation(
                format!("preparing {name} partition"),
                Cause::new(format!("target column `{target}` is absent")),
            ));
        }
    }

    let encoder = FeatureEncoder::fit(&train, schema)
        .map_err(|e| PipelineError::transformation("fitting encoder", e))?;
    let train_arr = encode_with_target(&encoder, &train, target)?;
    let test_arr = encode_with_target(&encoder, &test, target)?;

    let preprocessor_path = layout.preprocessor_file();
    let transformed_train_path = layout.transformed_train_file();
    let transformed_test_path = layout.transformed_test_file();
    write_binary(&preprocessor_path, &encoder)
        .map_err(|e| PipelineError::transformation("saving encoder", e))?;
    write_binary(&transformed_train_path, &train_arr)
        .map_err(|e| PipelineError::transformation("saving encoded train array", e))?;
    write_binary(&transformed_test_path, &test_arr)
        .map_err(|e| PipelineError::transformation("saving encoded test array", e))?;

    info!(
        features = encoder.n_features_out(),
        train_shape = ?train_arr.dim(),
        test_shape = ?test_arr.dim(),
        "Transformation complete"
    );

    Ok(TransformationArtifact {
        preprocessor_path,
        transformed_train_path,
        transformed_test_path,
        n_features: encoder.n_features_out(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::write_table;
    use insurprice_core::ErrorKind;
    use insurprice_core::persistence::read_binary;
    use serde_json::json;
    use tempfile::TempDir;

    fn schema() -> Schema {
        Schema::from_yaml_str(
            r#"
columns:
  - { name: age, dtype: integer }
  - { name: region, dtype: string }
  - { name: expenses, dtype: float }
numerical_columns: [age]
categorical_columns: [region]
target_column: expenses
"#,
        )
        .unwrap()
    }

    fn setup(
        dir: &TempDir,
        test_region: &str,
        with_target: bool,
    ) -> (ArtifactLayout, IngestionArtifact) {
        let layout = ArtifactLayout::new(dir.path().join("run"));
        let train = RecordBatch::new(
            vec!["age".into(), "region".into(), "expenses".into()],
            vec![
                vec![json!(19), json!("southwest"), json!(16884.92)],
                vec![json!(33), json!("northwest"), json!(21984.47)],
                vec![json!(46), json!("southeast"), json!(8240.59)],
            ],
        );
        let mut test = RecordBatch::new(
            vec!["age".into(), "region".into(), "expenses".into()],
            vec![vec![json!(31), json!(test_region), json!(3756.62)]],
        );
        if !with_target {
            test.remove_column("expenses");
        }
        write_table(&layout.train_file(), &train).unwrap();
        write_table(&layout.test_file(), &test).unwrap();
        let ingestion = IngestionArtifact {
            train_file_path: layout.train_file(),
            test_file_path: layout.test_file(),
            train_rows: 3,
            test_rows: 1,
            dropped_rows: 0,
        };
        (layout, ingestion)
    }

    #[test]
    fn test_arrays_share_width_and_end_with_target() {
        let dir = TempDir::new().unwrap();
        let (layout, ingestion) = setup(&dir, "northeast", true);
        let artifact = transform(&ingestion, &schema(), &layout).unwrap();
        assert_eq!(artifact.n_features, 4);

        let train: Array2<f64> = read_binary(&artifact.transformed_train_path).unwrap();
        let test: Array2<f64> = read_binary(&artifact.transformed_test_path).unwrap();
        assert_eq!(train.ncols(), test.ncols());
        assert_eq!(train.ncols(), artifact.n_features + 1);
        assert_eq!(train.column(4).to_vec(), vec![16884.92, 21984.47, 8240.59]);
        assert_eq!(test[[0, 4]], 3756.62);
        // Unseen region encodes to zeros.
        assert_eq!(&test.row(0).to_vec()[..3], &[0.0, 0.0, 0.0][..]);

        let encoder: FeatureEncoder = read_binary(&artifact.preprocessor_path).unwrap();
        assert_eq!(encoder.n_features_out(), 4);
    }

    #[test]
    fn test_missing_target_is_transformation_error() {
        let dir = TempDir::new().unwrap();
        let (layout, ingestion) = setup(&dir, "northeast", false);
        let err = transform(&ingestion, &schema(), &layout).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transformation);
        assert!(err.report().contains("target column `expenses` is absent"));
    }
}
