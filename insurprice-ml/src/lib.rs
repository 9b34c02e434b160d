//! # insurprice-ml: insurance cost training pipeline
//!
//! Ingests raw insurance records from a document store, validates them against
//! the dataset schema, encodes features, fits a regression model, evaluates it
//! against the currently published model and publishes accepted models to a
//! remote object store. The published model backs single-record prediction,
//! over HTTP or from the command line.

// Data
pub mod data;
pub mod drift;
pub mod encoder;

// Modelling
pub mod model;
pub mod remote;

// Pipeline
pub mod artifacts;
pub mod pipeline;
pub mod stages;

// Serving
pub mod predictor;
pub mod serving;

pub use artifacts::{
    ArtifactLayout, EvaluationResult, IngestionArtifact, ModelArtifact, PublishArtifact,
    TransformationArtifact, ValidationArtifact,
};
pub use data::{DocumentSource, RecordBatch, build_document_source};
pub use drift::{ColumnDrift, DriftReport};
pub use encoder::FeatureEncoder;
pub use model::{InsurancePriceModel, LinearRegression, RegressionMetrics, r2_score};
pub use pipeline::{PipelineRun, PipelineState, TrainPipeline};
pub use predictor::{CostPredictor, InsuranceData};
pub use remote::{ModelStore, build_model_store};
pub use serving::{AppState, SharedState, router};
