//! Error types for the insurprice pipeline.
//!
//! Every stage failure is reported as a [`PipelineError`]. Cause-carrying
//! variants keep the original error as their `source()` together with a short
//! description of what the stage was doing, so the chain survives all the way
//! up to the invocation surface.

use std::path::PathBuf;

/// Boxed cause attached to a pipeline failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Data access error while {context}: {source}")]
    DataAccess {
        context: String,
        #[source]
        source: BoxError,
    },

    #[error(
        "Empty dataset: {complete} complete rows remain after dropping {dropped} incomplete rows (need at least {required})"
    )]
    EmptyDataset {
        complete: usize,
        dropped: usize,
        required: usize,
    },

    #[error("Schema validation error: {message}")]
    SchemaValidation { message: String },

    /// Raised only when the run is configured to halt on drift.
    #[error(
        "Data drift error: {} drifted (p-value below {threshold})",
        columns.join(", ")
    )]
    DataDrift {
        columns: Vec<String>,
        threshold: f64,
    },

    #[error("Transformation error while {context}: {source}")]
    Transformation {
        context: String,
        #[source]
        source: BoxError,
    },

    #[error("Training error while {context}: {source}")]
    Training {
        context: String,
        #[source]
        source: BoxError,
    },

    #[error("Evaluation error while {context}: {source}")]
    Evaluation {
        context: String,
        #[source]
        source: BoxError,
    },

    #[error("Publish error while {context}: {source}")]
    Publish {
        context: String,
        #[source]
        source: BoxError,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Category of a [`PipelineError`], for matching without destructuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DataAccess,
    EmptyDataset,
    SchemaValidation,
    DataDrift,
    Transformation,
    Training,
    Evaluation,
    Publish,
    Config,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::DataAccess => "DataAccessError",
            Self::EmptyDataset => "EmptyDatasetError",
            Self::SchemaValidation => "SchemaValidationError",
            Self::DataDrift => "DataDriftError",
            Self::Transformation => "TransformationError",
            Self::Training => "TrainingError",
            Self::Evaluation => "EvaluationError",
            Self::Publish => "PublishError",
            Self::Config => "ConfigError",
        };
        f.write_str(name)
    }
}

/// Message-only cause, used when a failure has no underlying error value.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct Cause(pub String);

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DataAccess { .. } => ErrorKind::DataAccess,
            Self::EmptyDataset { .. } => ErrorKind::EmptyDataset,
            Self::SchemaValidation { .. } => ErrorKind::SchemaValidation,
            Self::DataDrift { .. } => ErrorKind::DataDrift,
            Self::Transformation { .. } => ErrorKind::Transformation,
            Self::Training { .. } => ErrorKind::Training,
            Self::Evaluation { .. } => ErrorKind::Evaluation,
            Self::Publish { .. } => ErrorKind::Publish,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    pub fn data_access(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::DataAccess {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::SchemaValidation {
            message: message.into(),
        }
    }

    pub fn transformation(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Transformation {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn training(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Training {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn evaluation(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Evaluation {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn publish(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Publish {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Render the error followed by its full `source()` chain on one line.
    pub fn report(&self) -> String {
        let mut out = self.to_string();
        let mut current = std::error::Error::source(self);
        // The first source is already part of the Display output.
        if let Some(first) = current {
            current = first.source();
        }
        while let Some(cause) = current {
            out.push_str(": ");
            out.push_str(&cause.to_string());
            current = cause.source();
        }
        out
    }
}

impl Cause {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors from loading or validating configuration and schema files.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to load configuration: {0}")]
    Figment(#[from] Box<figment::Error>),
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_empty_dataset() {
        let err = PipelineError::EmptyDataset {
            complete: 0,
            dropped: 10,
            required: 2,
        };
        assert_eq!(
            err.to_string(),
            "Empty dataset: 0 complete rows remain after dropping 10 incomplete rows (need at least 2)"
        );
        assert_eq!(err.kind(), ErrorKind::EmptyDataset);
    }

    #[test]
    fn test_error_keeps_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = PipelineError::data_access("reading collection insurance_data", io_err);
        assert_eq!(err.kind(), ErrorKind::DataAccess);
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "no such file");
        assert!(source.downcast_ref::<std::io::Error>().is_some());
    }

    #[test]
    fn test_message_cause() {
        let err = PipelineError::training("solving normal equations", Cause::new("singular"));
        assert_eq!(
            err.to_string(),
            "Training error while solving normal equations: singular"
        );
    }

    #[test]
    fn test_report_walks_nested_chain() {
        let inner = PipelineError::publish("uploading model", Cause::new("403 forbidden"));
        let outer = PipelineError::evaluation("wrapping", inner);
        let report = outer.report();
        assert!(report.starts_with("Evaluation error while wrapping: Publish error"));
        assert!(report.ends_with("403 forbidden"));
    }

    #[test]
    fn test_config_error_converts() {
        let err: PipelineError = ConfigError::MissingField {
            field: "schema.target_column".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(
            err.to_string(),
            "Configuration error: Missing required field: schema.target_column"
        );
    }

    #[test]
    fn test_drift_error_names_columns() {
        let err = PipelineError::DataDrift {
            columns: vec!["age".into(), "expenses".into()],
            threshold: 0.05,
        };
        assert_eq!(err.kind(), ErrorKind::DataDrift);
        assert_eq!(
            err.to_string(),
            "Data drift error: age, expenses drifted (p-value below 0.05)"
        );
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::Publish.to_string(), "PublishError");
        assert_eq!(ErrorKind::EmptyDataset.to_string(), "EmptyDatasetError");
        assert_eq!(ErrorKind::DataDrift.to_string(), "DataDriftError");
    }
}
