// ABOUTME: Reads query results as records, fully materialized or through a server-side cursor
// ABOUTME: The cursor holds a read-only transaction that is rolled back if the cursor is dropped early

use crate::error::{LoaderError, LoaderResult, StatementContext};
use crate::record::Record;
use futures::Stream;
use std::collections::VecDeque;
use tokio_postgres::{Client, GenericClient, Portal, Row, Transaction};

pub const DEFAULT_FETCH_SIZE: usize = 1000;

fn decode_rows(rows: &[Row]) -> LoaderResult<Vec<Record>> {
    rows.iter()
        .map(|row| Record::from_row(row).statement_context(|| "failed to decode result row".to_string()))
        .collect()
}

/// Run `query` and return every row.
pub async fn extract_all<C>(client: &C, query: &str) -> LoaderResult<Vec<Record>>
where
    C: GenericClient,
{
    let rows = client
        .query(query, &[])
        .await
        .statement_context(|| "failed to run extract query".to_string())?;
    tracing::debug!("Extracted {} rows", rows.len());
    decode_rows(&rows)
}

/// Lazily fetches the rows of one query, `fetch_size` rows per round trip.
///
/// A cursor is finite and cannot be restarted; open a new one to re-run the
/// query.
pub struct RecordCursor<'a> {
    portal: Portal,
    tx: Option<Transaction<'a>>,
    fetch_size: i32,
    buffer: VecDeque<Record>,
    exhausted: bool,
    fetched: u64,
}

impl<'a> RecordCursor<'a> {
    /// Start a read-only transaction and bind `query` to a portal.
    pub async fn open(client: &'a mut Client, query: &str, fetch_size: usize) -> LoaderResult<Self> {
        let fetch_size = i32::try_from(fetch_size)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                LoaderError::InvalidArgument(format!("invalid fetch_size {}", fetch_size))
            })?;

        let tx = client
            .build_transaction()
            .read_only(true)
            .start()
            .await
            .statement_context(|| "failed to begin extract transaction".to_string())?;
        let portal = tx
            .bind(query, &[])
            .await
            .statement_context(|| "failed to open cursor for extract query".to_string())?;

        Ok(Self {
            portal,
            tx: Some(tx),
            fetch_size,
            buffer: VecDeque::new(),
            exhausted: false,
            fetched: 0,
        })
    }

    async fn fill(&mut self) -> LoaderResult<()> {
        if self.exhausted {
            return Ok(());
        }
        let Some(tx) = &self.tx else {
            self.exhausted = true;
            return Ok(());
        };

        let rows = tx
            .query_portal(&self.portal, self.fetch_size)
            .await
            .statement_context(|| "failed to fetch from cursor".to_string())?;
        if rows.len() < self.fetch_size as usize {
            self.exhausted = true;
        }
        self.fetched += rows.len() as u64;
        self.buffer.extend(decode_rows(&rows)?);
        Ok(())
    }

    /// Next record, or `None` once the query is exhausted.
    pub async fn next(&mut self) -> LoaderResult<Option<Record>> {
        if self.buffer.is_empty() {
            self.fill().await?;
        }
        Ok(self.buffer.pop_front())
    }

    /// Up to `fetch_size` records, or `None` once the query is exhausted.
    pub async fn next_batch(&mut self) -> LoaderResult<Option<Vec<Record>>> {
        if self.buffer.is_empty() {
            self.fill().await?;
        }
        if self.buffer.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.buffer.drain(..).collect()))
    }

    /// End the cursor's transaction.
    pub async fn close(mut self) -> LoaderResult<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit()
                .await
                .statement_context(|| "failed to close extract transaction".to_string())?;
        }
        tracing::debug!("Cursor closed after {} rows", self.fetched);
        Ok(())
    }

    /// Yield records as a stream. The cursor closes when the stream ends.
    pub fn into_stream(self) -> impl Stream<Item = LoaderResult<Record>> + 'a {
        futures::stream::try_unfold(self, |mut cursor| async move {
            match cursor.next().await? {
                Some(record) => Ok::<_, LoaderError>(Some((record, cursor))),
                None => {
                    cursor.close().await?;
                    Ok(None)
                }
            }
        })
    }
}
