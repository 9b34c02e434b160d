//! Ingestion: fetch raw records, drop incomplete rows, split and persist.

use crate::artifacts::{ArtifactLayout, IngestionArtifact};
use crate::data::{DocumentSource, write_table};
use insurprice_core::config::{DataSourceConfig, IngestionConfig};
use insurprice_core::{PipelineError, Result, Schema};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{info, warn};

/// Both partitions must be non-empty.
pub const MIN_COMPLETE_ROWS: usize = 2;

/// Shuffle `0..n` with `seed` and split it into train and test indices.
///
/// The test partition gets `ceil((1 - train_ratio) * n)` rows, clamped so
/// that neither side is empty when `n >= 2`.
pub fn split_train_test(n: usize, train_ratio: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let raw = ((1.0 - train_ratio) * n as f64 - 1e-9).ceil().max(0.0) as usize;
    let test_count = if n >= MIN_COMPLETE_ROWS {
        raw.clamp(1, n - 1)
    } else {
        raw.min(n)
    };
    let test = indices.split_off(n - test_count);
    (indices, test)
}

/// Run the ingestion stage.
///
/// Every column declared in `schema` is present in the fetched batch, so a
/// field no document carries makes each row incomplete. Nothing is written unless at least [`MIN_COMPLETE_ROWS`] complete rows
/// remain, so a failed ingestion leaves no artifacts behind.
pub async fn ingest(
    source: &dyn DocumentSource,
    schema: &Schema,
    source_config: &DataSourceConfig,
    config: &IngestionConfig,
    layout: &ArtifactLayout,
) -> Result<IngestionArtifact> {
    let database = &source_config.database;
    let collection = &source_config.collection;
    info!(
        source = %source.source_info().source_type,
        database = %database,
        collection = %collection,
        "Fetching raw records"
    );

    let mut batch = source
        .fetch_all(database, collection)
        .await
        .map_err(|e| {
            PipelineError::data_access(format!("fetching {database}.{collection}"), e)
        })?;
    let fetched = batch.row_count();
    let absent = batch.ensure_columns(schema.column_names());
    if absent > 0 && fetched > 0 {
        warn!(absent, "Declared columns missing from every record");
    }

    let dropped = batch.drop_incomplete();
    let complete = batch.row_count();
    if dropped > 0 {
        warn!(dropped, complete, "Dropped rows with missing fields");
    }
    if complete < MIN_COMPLETE_ROWS {
        return Err(PipelineError::EmptyDataset {
            complete,
            dropped,
            required: MIN_COMPLETE_ROWS,
        });
    }

    let seed = config.seed.unwrap_or_else(rand::random);
    let (train_idx, test_idx) = split_train_test(complete, config.split_ratio, seed);
    let train = batch.take_rows(&train_idx);
    let test = batch.take_rows(&test_idx);

    let train_file_path = layout.train_file();
    let test_file_path = layout.test_file();
    write_table(&train_file_path, &train)
        .map_err(|e| PipelineError::data_access("writing train partition", e))?;
    write_table(&test_file_path, &test)
        .map_err(|e| PipelineError::data_access("writing test partition", e))?;

    info!(
        fetched,
        train_rows = train.row_count(),
        test_rows = test.row_count(),
        seed,
        dir = %layout.ingestion_dir().display(),
        "Ingestion complete"
    );

    Ok(IngestionArtifact {
        train_file_path,
        test_file_path,
        train_rows: train.row_count(),
        test_rows: test.row_count(),
        dropped_rows: dropped,
    })
}
