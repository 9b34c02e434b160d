//! Training pipeline orchestrator.
//!
//! Runs the stages strictly in order, threading each artifact to the stages
//! that consume it. The first failure moves the pipeline to
//! [`PipelineState::Failed`] and is returned unchanged.

use crate::artifacts::{
    ArtifactLayout, EvaluationResult, IngestionArtifact, ModelArtifact, PublishArtifact,
    TransformationArtifact, ValidationArtifact,
};
use crate::data::{DocumentSource, build_document_source};
use crate::remote::{ModelStore, build_model_store};
use crate::stages;
use insurprice_core::{ConfigError, PipelineConfig, PipelineError, Result, Schema};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Ingesting,
    Validating,
    Transforming,
    Training,
    Evaluating,
    Publishing,
    Done,
    Failed,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Ingesting => "ingesting",
            Self::Validating => "validating",
            Self::Transforming => "transforming",
            Self::Training => "training",
            Self::Evaluating => "evaluating",
            Self::Publishing => "publishing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_dir: PathBuf,
    pub ingestion: IngestionArtifact,
    pub validation: ValidationArtifact,
    pub transformation: TransformationArtifact,
    pub model: ModelArtifact,
    pub evaluation: EvaluationResult,
    /// `None` when the model was not accepted.
    pub publish: Option<PublishArtifact>,
    pub final_state: PipelineState,
}

/// One training run. A pipeline runs once; build a new one for the next run.
pub struct TrainPipeline {
    config: Arc<PipelineConfig>,
    schema: Arc<Schema>,
    source: Arc<dyn DocumentSource>,
    store: Arc<dyn ModelStore>,
    run_dir: Option<PathBuf>,
    state: PipelineState,
}

impl TrainPipeline {
    pub fn new(
        config: Arc<PipelineConfig>,
        schema: Arc<Schema>,
        source: Arc<dyn DocumentSource>,
        store: Arc<dyn ModelStore>,
    ) -> Self {
        Self {
            config,
            schema,
            source,
            store,
            run_dir: None,
            state: PipelineState::Idle,
        }
    }

    /// Build the schema, document source and model store from configuration.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let schema = Schema::from_file(&config.schema_path)?;
        let source = build_document_source(&config.data_source);
        let store = build_model_store(&config.remote);
        Ok(Self::new(Arc::new(config), Arc::new(schema), source, store))
    }

    /// Use a fixed run directory instead of a timestamped one under the
    /// artifacts root.
    pub fn with_run_dir(mut self, run_dir: impl Into<PathBuf>) -> Self {
        self.run_dir = Some(run_dir.into());
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn enter(&mut self, next: PipelineState) {
        info!(from = %self.state, to = %next, "Pipeline state change");
        self.state = next;
    }

    pub async fn run(&mut self) -> Result<PipelineRun> {
        if self.state != PipelineState::Idle {
            return Err(PipelineError::Config(ConfigError::invalid(format!(
                "pipeline already ran (state: {})",
                self.state
            ))));
        }

        let layout = match &self.run_dir {
            Some(dir) => ArtifactLayout::new(dir.clone()),
            None => ArtifactLayout::for_run(&self.config.artifacts.root_dir),
        };
        info!(run_dir = %layout.run_dir.display(), "Starting training pipeline");

        match self.execute(&layout).await {
            Ok(run) => Ok(run),
            Err(e) => {
                error!(
                    stage = %self.state,
                    kind = %e.kind(),
                    error = %e.report(),
                    "Pipeline failed"
                );
                self.enter(PipelineState::Failed);
                Err(e)
            }
        }
    }

    async fn execute(&mut self, layout: &ArtifactLayout) -> Result<PipelineRun> {
        let config = Arc::clone(&self.config);
        let schema = Arc::clone(&self.schema);
        let source = Arc::clone(&self.source);
        let store = Arc::clone(&self.store);

        self.enter(PipelineState::Ingesting);
        let ingestion = stages::ingest(
            source.as_ref(),
            &schema,
            &config.data_source,
            &config.ingestion,
            layout,
        )
        .await?;

        self.enter(PipelineState::Validating);
        let validation = {
            let (ingestion, schema, config, layout) = (
                ingestion.clone(),
                Arc::clone(&schema),
                Arc::clone(&config),
                layout.clone(),
            );
            run_blocking(
                move || stages::validate(&ingestion, &schema, &config.validation, &layout),
                |e| PipelineError::data_access("running validation", e),
            )
            .await?
        };

        self.enter(PipelineState::Transforming);
        let transformation = {
            let (ingestion, schema, layout) =
                (ingestion.clone(), Arc::clone(&schema), layout.clone());
            run_blocking(
                move || stages::transform(&ingestion, &schema, &layout),
                |e| PipelineError::transformation("running transformation", e),
            )
            .await?
        };

        self.enter(PipelineState::Training);
        let model = {
            let (transformation, schema, config, layout) = (
                transformation.clone(),
                Arc::clone(&schema),
                Arc::clone(&config),
                layout.clone(),
            );
            run_blocking(
                move || {
                    stages::train(
                        &transformation,
                        &schema.target_column,
                        &config.training,
                        &layout,
                    )
                },
                |e| PipelineError::training("running training", e),
            )
            .await?
        };

        self.enter(PipelineState::Evaluating);
        let evaluation = stages::evaluate(
            &model,
            &ingestion,
            store.as_ref(),
            &config.remote,
            config.evaluation.acceptance_policy,
            layout,
        )
        .await?;

        self.enter(PipelineState::Publishing);
        let publish = stages::publish(&model, &evaluation, store.as_ref(), &config.remote).await?;

        self.enter(PipelineState::Done);
        Ok(PipelineRun {
            run_dir: layout.run_dir.clone(),
            ingestion,
            validation,
            transformation,
            model,
            evaluation,
            publish,
            final_state: PipelineState::Done,
        })
    }
}

/// Run synchronous stage work (file I/O, fitting) on the blocking pool.
///
/// A panicked or cancelled task is reported through `lost`.
async fn run_blocking<T, F>(work: F, lost: fn(JoinError) -> PipelineError) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(lost)?
}
