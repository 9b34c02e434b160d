//! The six pipeline stages. Each consumes the artifacts of earlier stages and
//! produces exactly one new artifact value.

pub mod evaluation;
pub mod ingestion;
pub mod publishing;
pub mod training;
pub mod transformation;
pub mod validation;

pub use evaluation::evaluate;
pub use ingestion::{ingest, split_train_test};
pub use publishing::publish;
pub use training::train;
pub use transformation::transform;
pub use validation::validate;
