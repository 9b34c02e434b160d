//! Data layer: record batches, document-store clients and partition files.

pub mod batch;
pub mod source;
pub mod table;

pub use batch::{DOCUMENT_ID_FIELD, NotAnObject, RecordBatch};
pub use source::{
    DataSourceInfo, DocumentSource, HttpDocumentSource, JsonDirSource, MemorySource, SourceError,
    SqliteSource, build_document_source,
};
pub use table::{parse_table, read_table, write_table};
