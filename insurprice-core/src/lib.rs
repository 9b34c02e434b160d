//! # insurprice-core
//!
//! Foundation for the insurprice training pipeline: layered configuration,
//! the typed dataset schema, the pipeline error taxonomy, and the persistence
//! primitives every stage writes its artifacts through.

pub mod config;
pub mod error;
pub mod persistence;
pub mod schema;

pub use config::{
    AcceptancePolicy, DataSourceKind, Hyperparameters, PipelineConfig, RemoteStoreKind,
    load_config, load_config_file, load_workspace_config,
};
pub use error::{BoxError, Cause, ConfigError, ErrorKind, PipelineError, Result};
pub use schema::{ColumnSpec, ColumnType, Schema};
