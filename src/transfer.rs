// ABOUTME: Copies the result of a source query into a destination table
// ABOUTME: Streams through a cursor or materializes, then writes with the BatchWriter

use crate::error::LoaderResult;
use crate::extract::{extract_all, RecordCursor, DEFAULT_FETCH_SIZE};
use crate::schema::TableRef;
use crate::writer::{BatchResult, BatchWriter, ConflictPolicy, WriteOptions};
use tokio_postgres::Client;

#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub write: WriteOptions,
    /// Pull rows through a cursor instead of loading them all first
    pub streaming: bool,
    pub fetch_size: usize,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            write: WriteOptions::default(),
            streaming: false,
            fetch_size: DEFAULT_FETCH_SIZE,
        }
    }
}

/// Extract `query` from `source` and write the rows into `table` on
/// `destination` in one destination transaction.
pub async fn transfer(
    source: &mut Client,
    destination: &mut Client,
    query: &str,
    table: &TableRef,
    policy: ConflictPolicy,
    options: &TransferOptions,
) -> LoaderResult<BatchResult> {
    let mut writer = BatchWriter::new(destination);

    if options.streaming {
        tracing::info!(
            "Streaming query results into {} ({} rows per fetch)",
            table,
            options.fetch_size
        );
        let cursor = RecordCursor::open(source, query, options.fetch_size).await?;
        writer
            .write_stream(cursor.into_stream(), table, policy, &options.write)
            .await
    } else {
        let records = extract_all(&*source, query).await?;
        tracing::info!("Extracted {} rows for {}", records.len(), table);
        writer.write(records, table, policy, &options.write).await
    }
}
