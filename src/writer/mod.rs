// ABOUTME: BatchWriter: writes records into a destination table under a conflict policy
// ABOUTME: One transaction per call, chunked multi-row inserts, SCD2 delegated to the versioner

pub mod scd2;
pub(crate) mod statement;

pub use scd2::{apply_scd2, Scd2Mode};

use crate::digest::content_digest;
use crate::error::{LoaderError, LoaderResult, StatementContext};
use crate::record::Record;
use crate::schema::{describe, set_local_work_mem, ConflictTarget, TableDescriptor, TableRef};
use crate::value::Value;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::Serialize;
use statement::{
    build_insert, build_select_existing, rows_per_statement, ConflictClause, MAX_BIND_PARAMETERS,
};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Transaction};

pub const DEFAULT_BATCH_SIZE: usize = 80_000;

/// How a write treats rows that collide with existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictPolicy {
    /// Plain insert; collisions fail the call
    NoCheck,
    /// Keep the existing row
    Ignore,
    /// Overwrite every non-key column of the existing row
    Update,
    /// Overwrite only the incoming non-key columns
    PartialUpdate,
    /// Versioned history (also accepted as `append`)
    Scd2,
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::NoCheck => "no_check",
            ConflictPolicy::Ignore => "ignore",
            ConflictPolicy::Update => "update",
            ConflictPolicy::PartialUpdate => "partial_update",
            ConflictPolicy::Scd2 => "scd2",
        }
    }

    /// Whether the policy needs a unique constraint, primary key or override.
    pub fn requires_constraint(&self) -> bool {
        matches!(
            self,
            ConflictPolicy::Ignore | ConflictPolicy::Update | ConflictPolicy::PartialUpdate
        )
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "no_check" => Ok(ConflictPolicy::NoCheck),
            "ignore" => Ok(ConflictPolicy::Ignore),
            "update" => Ok(ConflictPolicy::Update),
            "partial_update" => Ok(ConflictPolicy::PartialUpdate),
            "scd2" | "append" => Ok(ConflictPolicy::Scd2),
            _ => Err(LoaderError::InvalidArgument(format!(
                "unknown conflict policy '{}' (expected no_check, ignore, update, partial_update, scd2 or append)",
                s
            ))),
        }
    }
}

/// Options for one write call.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Maximum rows per chunk (must be positive)
    pub batch_size: usize,
    /// Conflict columns used instead of the table's own constraints
    pub conflict_columns: Option<Vec<String>>,
    pub scd2_mode: Scd2Mode,
    /// For update/partial_update: drop rows identical to the stored ones
    pub skip_unchanged: bool,
    /// `SET LOCAL work_mem` for the call's transaction
    pub work_mem: Option<String>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            conflict_columns: None,
            scd2_mode: Scd2Mode::Standard,
            skip_unchanged: false,
            work_mem: None,
        }
    }
}

/// Outcome of a write or load call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub affected_rows: u64,
    /// Columns actually inserted, after autoincrement stripping and SCD2 stamping
    pub columns: Vec<String>,
}

/// Fail if any record's column set differs from the first record's.
pub(crate) fn validate_key_sets(records: &[Record], first_index: usize) -> LoaderResult<()> {
    let Some(first) = records.first() else {
        return Ok(());
    };
    let expected = first.key_set();
    for (offset, record) in records.iter().enumerate().skip(1) {
        if record.key_set() != expected {
            return Err(LoaderError::invalid_record(
                first_index + offset,
                format!(
                    "columns {:?} differ from the first record's {:?}",
                    record.key_set(),
                    expected
                ),
            ));
        }
    }
    Ok(())
}

/// Insert `rows` in statements of at most `batch_size` rows (capped by the
/// bind parameter limit). Returns the affected row count.
pub(crate) async fn insert_rows(
    tx: &Transaction<'_>,
    table: &TableRef,
    columns: &[String],
    rows: &[Record],
    conflict: &ConflictClause,
    batch_size: usize,
) -> LoaderResult<u64> {
    if rows.is_empty() {
        return Ok(0);
    }

    let per_statement = rows_per_statement(batch_size, columns.len());
    let mut affected = 0u64;

    for chunk in rows.chunks(per_statement) {
        let query = build_insert(table, columns, chunk.len(), conflict);
        let params: Vec<&(dyn ToSql + Sync)> = chunk
            .iter()
            .flat_map(|row| row.values_for(columns).map(|v| v as &(dyn ToSql + Sync)))
            .collect();

        affected += tx
            .execute(query.as_str(), &params)
            .await
            .statement_context(|| format!("failed to insert {} rows into {}", chunk.len(), table))?;
    }

    Ok(affected)
}

/// Statement shape fixed by the first chunk of a call.
#[derive(Debug)]
struct WritePlan {
    columns: Vec<String>,
    expected_keys: BTreeSet<String>,
    conflict: ConflictClause,
}

/// Build the conflict clause for `policy` given the incoming insert columns.
fn conflict_clause(
    descriptor: &TableDescriptor,
    policy: ConflictPolicy,
    target: Option<ConflictTarget>,
    columns: &[String],
) -> LoaderResult<ConflictClause> {
    if !policy.requires_constraint() {
        return Ok(ConflictClause::None);
    }
    let target = target.ok_or_else(|| LoaderError::ConstraintRequired {
        policy: policy.to_string(),
        table: descriptor.table.to_string(),
    })?;
    let clause = match policy {
        ConflictPolicy::Ignore => ConflictClause::DoNothing(Some(target)),
        ConflictPolicy::Update => {
            let set_columns = descriptor
                .columns
                .iter()
                .filter(|c| !c.autoincrement)
                .filter(|c| !target.columns().contains(&c.name))
                .map(|c| c.name.clone())
                .collect();
            ConflictClause::DoUpdate {
                target,
                set_columns,
            }
        }
        ConflictPolicy::PartialUpdate => {
            let set_columns = columns
                .iter()
                .filter(|c| !target.columns().contains(c))
                .cloned()
                .collect();
            ConflictClause::DoUpdate {
                target,
                set_columns,
            }
        }
        ConflictPolicy::NoCheck | ConflictPolicy::Scd2 => ConflictClause::None,
    };
    Ok(clause)
}

/// Writes record batches into PostgreSQL.
///
/// Every call runs in its own transaction: the table is described inside it,
/// all chunks are written, and the transaction commits once. On any error it
/// is rolled back and nothing from the call remains.
pub struct BatchWriter<'a> {
    client: &'a mut Client,
}

impl<'a> BatchWriter<'a> {
    pub fn new(client: &'a mut Client) -> Self {
        Self { client }
    }

    /// Write a materialized batch.
    ///
    /// Column sets are checked across all records before the transaction opens.
    pub async fn write(
        &mut self,
        records: Vec<Record>,
        table: &TableRef,
        policy: ConflictPolicy,
        options: &WriteOptions,
    ) -> LoaderResult<BatchResult> {
        validate_options(options)?;
        validate_key_sets(&records, 0)?;
        let stream = futures::stream::iter(records.into_iter().map(Ok));
        self.write_stream(stream, table, policy, options).await
    }

    /// Write records pulled lazily from `records`, one chunk at a time.
    ///
    /// The whole stream is written in one transaction. An error item from the
    /// stream aborts the call like a statement failure.
    pub async fn write_stream<S>(
        &mut self,
        records: S,
        table: &TableRef,
        policy: ConflictPolicy,
        options: &WriteOptions,
    ) -> LoaderResult<BatchResult>
    where
        S: Stream<Item = LoaderResult<Record>>,
    {
        validate_options(options)?;

        let chunks = records.chunks(options.batch_size);
        futures::pin_mut!(chunks);

        let first = match chunks.next().await {
            Some(chunk) => chunk,
            None => {
                tracing::info!("No records to write into {}", table);
                return Ok(BatchResult::default());
            }
        };

        let tx = self
            .client
            .transaction()
            .await
            .statement_context(|| format!("failed to begin transaction on {}", table))?;

        let result = write_chunks(&tx, first, &mut chunks, table, policy, options).await;

        match result {
            Ok(result) => {
                tx.commit()
                    .await
                    .statement_context(|| format!("failed to commit write into {}", table))?;
                tracing::info!(
                    "Wrote {} rows into {} (policy {})",
                    result.affected_rows,
                    table,
                    policy
                );
                Ok(result)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!("Rollback of write into {} failed: {}", table, rollback_err);
                }
                Err(e)
            }
        }
    }
}

fn validate_options(options: &WriteOptions) -> LoaderResult<()> {
    if options.batch_size == 0 {
        return Err(LoaderError::InvalidArgument(
            "batch_size must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

async fn load_time(tx: &Transaction<'_>) -> LoaderResult<DateTime<Utc>> {
    let row = tx
        .query_one("SELECT now()", &[])
        .await
        .statement_context(|| "failed to read transaction timestamp".to_string())?;
    Ok(row.get(0))
}

fn collect_chunk(chunk: Vec<LoaderResult<Record>>) -> LoaderResult<Vec<Record>> {
    chunk.into_iter().collect()
}

async fn write_chunks<S>(
    tx: &Transaction<'_>,
    first: Vec<LoaderResult<Record>>,
    rest: &mut S,
    table: &TableRef,
    policy: ConflictPolicy,
    options: &WriteOptions,
) -> LoaderResult<BatchResult>
where
    S: Stream<Item = Vec<LoaderResult<Record>>> + Unpin,
{
    if let Some(work_mem) = &options.work_mem {
        set_local_work_mem(tx, work_mem).await?;
    }

    let descriptor = describe(tx, table).await?;
    let target = descriptor.resolve_conflict_target(options.conflict_columns.as_deref())?;
    if policy.requires_constraint() && target.is_none() {
        return Err(LoaderError::ConstraintRequired {
            policy: policy.to_string(),
            table: table.to_string(),
        });
    }
    if policy == ConflictPolicy::Scd2 {
        scd2::ensure_scd2_columns(&descriptor)?;
    }

    let first = collect_chunk(first)?;
    let plan = plan_write(&descriptor, policy, target.clone(), &first)?;
    let load_time = load_time(tx).await?;

    let mut affected = 0u64;
    let mut offset = 0usize;
    let mut chunk_count = 0usize;
    let mut pending = Some(first);

    loop {
        let records = match pending.take() {
            Some(records) => records,
            None => match rest.next().await {
                Some(chunk) => collect_chunk(chunk)?,
                None => break,
            },
        };

        let len = records.len();
        let written = write_chunk(
            tx,
            &descriptor,
            &plan,
            target.as_ref(),
            records,
            policy,
            options,
            load_time,
            offset,
        )
        .await?;
        tracing::debug!(
            "Chunk {} ({} records) into {}: {} rows affected",
            chunk_count + 1,
            len,
            table,
            written
        );

        affected += written;
        offset += len;
        chunk_count += 1;
    }

    let columns = match policy {
        ConflictPolicy::Scd2 => scd2::scd2_columns(&plan.columns),
        _ => plan.columns,
    };
    Ok(BatchResult {
        affected_rows: affected,
        columns,
    })
}

fn plan_write(
    descriptor: &TableDescriptor,
    policy: ConflictPolicy,
    target: Option<ConflictTarget>,
    first: &[Record],
) -> LoaderResult<WritePlan> {
    let Some(template) = first.first() else {
        return Err(LoaderError::InvalidArgument("empty chunk".to_string()));
    };

    descriptor.ensure_columns(template.columns())?;

    let columns: Vec<String> = template
        .columns()
        .iter()
        .filter(|c| !descriptor.is_autoincrement(c))
        .cloned()
        .collect();
    let stripped = template.len() - columns.len();
    if stripped > 0 {
        tracing::debug!(
            "Stripping {} autoincrement column(s) from records for {}",
            stripped,
            descriptor.table
        );
    }

    let conflict = conflict_clause(descriptor, policy, target, &columns)?;

    Ok(WritePlan {
        expected_keys: template.columns().iter().cloned().collect(),
        columns,
        conflict,
    })
}

#[allow(clippy::too_many_arguments)]
async fn write_chunk(
    tx: &Transaction<'_>,
    descriptor: &TableDescriptor,
    plan: &WritePlan,
    target: Option<&ConflictTarget>,
    mut records: Vec<Record>,
    policy: ConflictPolicy,
    options: &WriteOptions,
    load_time: DateTime<Utc>,
    offset: usize,
) -> LoaderResult<u64> {
    let keys: BTreeSet<&str> = plan.expected_keys.iter().map(String::as_str).collect();
    for (i, record) in records.iter().enumerate() {
        if record.key_set() != keys {
            return Err(LoaderError::invalid_record(
                offset + i,
                format!(
                    "columns {:?} differ from the first record's {:?}",
                    record.key_set(),
                    keys
                ),
            ));
        }
    }

    match policy {
        ConflictPolicy::Scd2 => {
            scd2::apply_chunk(
                tx,
                descriptor,
                &plan.columns,
                records,
                options.scd2_mode,
                load_time,
                offset,
                options.batch_size,
            )
            .await
        }
        _ => {
            if options.skip_unchanged
                && matches!(policy, ConflictPolicy::Update | ConflictPolicy::PartialUpdate)
            {
                if let Some(target) = target {
                    records = drop_unchanged(tx, descriptor, target, &plan.columns, records).await?;
                }
            }
            insert_rows(
                tx,
                &descriptor.table,
                &plan.columns,
                &records,
                &plan.conflict,
                options.batch_size,
            )
            .await
        }
    }
}

fn key_of(record: &Record, key_columns: &[String]) -> Vec<Option<String>> {
    record
        .values_for(key_columns)
        .map(Value::canonical_text)
        .collect()
}

/// Remove records whose content over `columns` equals the stored row with the
/// same conflict key.
async fn drop_unchanged(
    tx: &Transaction<'_>,
    descriptor: &TableDescriptor,
    target: &ConflictTarget,
    columns: &[String],
    records: Vec<Record>,
) -> LoaderResult<Vec<Record>> {
    let key_columns = target.columns();
    if let Some(missing) = key_columns.iter().find(|k| !columns.contains(k)) {
        return Err(LoaderError::InvalidArgument(format!(
            "skip_unchanged needs the conflict column '{}' in every record",
            missing
        )));
    }

    let keys_per_statement = std::cmp::max(1, MAX_BIND_PARAMETERS / key_columns.len().max(1));
    let mut stored: HashMap<Vec<Option<String>>, String> = HashMap::new();

    for chunk in records.chunks(keys_per_statement) {
        let query = build_select_existing(&descriptor.table, key_columns, columns, chunk.len());
        let params: Vec<&(dyn ToSql + Sync)> = chunk
            .iter()
            .flat_map(|row| row.values_for(key_columns).map(|v| v as &(dyn ToSql + Sync)))
            .collect();
        let rows = tx
            .query(query.as_str(), &params)
            .await
            .statement_context(|| format!("failed to read existing rows from {}", descriptor.table))?;
        for row in &rows {
            let existing = Record::from_row(row)
                .statement_context(|| format!("failed to decode row from {}", descriptor.table))?;
            stored.insert(key_of(&existing, key_columns), content_digest(&existing, columns));
        }
    }

    let before = records.len();
    let changed: Vec<Record> = records
        .into_iter()
        .filter(|r| {
            stored
                .get(&key_of(r, key_columns))
                .map_or(true, |digest| *digest != content_digest(r, columns))
        })
        .collect();

    if changed.len() < before {
        tracing::debug!(
            "Skipping {} unchanged rows for {}",
            before - changed.len(),
            descriptor.table
        );
    }
    Ok(changed)
}
