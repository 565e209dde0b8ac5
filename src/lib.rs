// ABOUTME: Library root for pg-batch-loader
// ABOUTME: Batch writes with conflict policies and SCD2, paginated insert-from-select, extraction

pub mod commands;
pub mod config;
pub mod digest;
pub mod error;
pub mod exec;
pub mod extract;
pub mod loader;
pub mod postgres;
pub mod record;
pub mod schema;
pub mod transfer;
pub mod utils;
pub mod value;
pub mod writer;

pub use digest::content_digest;
pub use error::{LoaderError, LoaderResult};
pub use exec::execute_statement;
pub use extract::{extract_all, RecordCursor};
pub use loader::{LoadOptions, SelectLoader};
pub use record::Record;
pub use schema::{describe, sync_columns, TableDescriptor, TableRef};
pub use transfer::{transfer, TransferOptions};
pub use value::Value;
pub use writer::{BatchResult, BatchWriter, ConflictPolicy, Scd2Mode, WriteOptions};
