//! Evaluation: score the new model and the published one on the raw test
//! partition, then decide acceptance.

use crate::artifacts::{ArtifactLayout, EvaluationResult, IngestionArtifact, ModelArtifact};
use crate::data::read_table;
use crate::model::InsurancePriceModel;
use crate::remote::ModelStore;
use insurprice_core::config::RemoteStoreConfig;
use insurprice_core::persistence::atomic_write_json;
use insurprice_core::{AcceptancePolicy, PipelineError, Result};
use tracing::info;

/// Build the result from the two scores. A missing baseline counts as 0.
pub fn decide(
    trained_model_score: f64,
    baseline_model_score: Option<f64>,
    policy: AcceptancePolicy,
) -> EvaluationResult {
    let baseline = baseline_model_score.unwrap_or(0.0);
    EvaluationResult {
        trained_model_score,
        baseline_model_score,
        is_model_accepted: policy.accepts(trained_model_score, baseline),
        score_delta: trained_model_score - baseline,
    }
}

pub async fn evaluate(
    model: &ModelArtifact,
    ingestion: &IngestionArtifact,
    store: &dyn ModelStore,
    remote: &RemoteStoreConfig,
    policy: AcceptancePolicy,
    layout: &ArtifactLayout,
) -> Result<EvaluationResult> {
    let test = read_table(&ingestion.test_file_path)
        .map_err(|e| PipelineError::evaluation("reading test partition", e))?;

    let trained = InsurancePriceModel::load(&model.model_path)
        .map_err(|e| PipelineError::evaluation("loading trained model", e))?;
    let trained_score = trained
        .score(&test)
        .map_err(|e| PipelineError::evaluation("scoring trained model", e))?;

    let (bucket, key) = (&remote.bucket, &remote.model_key);
    let published = store
        .exists(bucket, key)
        .await
        .map_err(|e| PipelineError::evaluation("checking for a published model", e))?;
    let baseline_score = if published {
        let path = store
            .download(key, bucket, &layout.baseline_dir())
            .await
            .map_err(|e| PipelineError::evaluation("downloading published model", e))?;
        let baseline = InsurancePriceModel::load(&path)
            .map_err(|e| PipelineError::evaluation("loading published model", e))?;
        let score = baseline
            .score(&test)
            .map_err(|e| PipelineError::evaluation("scoring published model", e))?;
        Some(score)
    } else {
        info!(bucket = %bucket, key = %key, "No published model, baseline score is 0");
        None
    };

    let result = decide(trained_score, baseline_score, policy);
    atomic_write_json(&layout.evaluation_file(), &result)
        .map_err(|e| PipelineError::evaluation("writing evaluation result", e))?;

    info!(
        trained_score = result.trained_model_score,
        baseline_score = ?result.baseline_model_score,
        delta = result.score_delta,
        accepted = result.is_model_accepted,
        "Evaluation complete"
    );
    Ok(result)
}
