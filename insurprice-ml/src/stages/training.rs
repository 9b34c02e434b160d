//! Training: fit the regressor on the encoded train array.

use crate::artifacts::{ArtifactLayout, ModelArtifact, TransformationArtifact};
use crate::encoder::FeatureEncoder;
use crate::model::{InsurancePriceModel, LinearRegression, RegressionMetrics};
use insurprice_core::persistence::{hash_file, read_binary};
use insurprice_core::{Cause, Hyperparameters, PipelineError, Result};
use ndarray::{Array2, s};
use tracing::info;

/// Fit on every column but the last against the last, then persist the
/// encoder and regressor together as one model file.
pub fn train(
    transformation: &TransformationArtifact,
    target_column: &str,
    params: &Hyperparameters,
    layout: &ArtifactLayout,
) -> Result<ModelArtifact> {
    let encoder: FeatureEncoder = read_binary(&transformation.preprocessor_path)
        .map_err(|e| PipelineError::training("loading encoder", e))?;
    let data: Array2<f64> = read_binary(&transformation.transformed_train_path)
        .map_err(|e| PipelineError::training("loading encoded train array", e))?;

    let width = data.ncols();
    if width != encoder.n_features_out() + 1 {
        return Err(PipelineError::training(
            "checking encoded train array",
            Cause::new(format!(
                "array has {width} columns, encoder produces {} features plus the target",
                encoder.n_features_out()
            )),
        ));
    }
    let x = data.slice(s![.., ..width - 1]).to_owned();
    let y = data.column(width - 1).to_owned();

    let regressor = LinearRegression::fit(&x, &y, params)
        .map_err(|e| PipelineError::training("fitting linear regression", e))?;
    let fitted = regressor
        .predict(&x)
        .map_err(|e| PipelineError::training("scoring train array", e))?;
    let train_metrics = RegressionMetrics::compute(&y, &fitted).ok_or_else(|| {
        PipelineError::training("scoring train array", Cause::new("no rows to score"))
    })?;

    let model = InsurancePriceModel::new(encoder, regressor, target_column.to_string());
    let model_path = layout.model_file();
    model
        .save(&model_path)
        .map_err(|e| PipelineError::training("saving model", e))?;
    let model_digest =
        hash_file(&model_path).map_err(|e| PipelineError::training("hashing model file", e))?;

    info!(
        rows = x.nrows(),
        features = x.ncols(),
        train_r2 = train_metrics.r_squared,
        train_rmse = train_metrics.rmse,
        model = %model_path.display(),
        "Training complete"
    );

    Ok(ModelArtifact {
        model_path,
        model_digest,
        train_metrics,
    })
}
