// ABOUTME: SCD2 versioning: diff incoming rows against current versions by business key
// ABOUTME: Stamps version numbers and validity windows and closes superseded rows

use super::statement::{build_close_current, build_select_current};
use crate::error::{LoaderError, LoaderResult, StatementContext};
use crate::record::Record;
use crate::schema::TableDescriptor;
use crate::value::Value;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio_postgres::types::ToSql;
use tokio_postgres::Transaction;

pub const BUSINESS_KEY: &str = "business_key";
pub const VERSION_HASH: &str = "meta_version_hash";
pub const VERSION_NUMBER: &str = "meta_version_number";
pub const VALID_FROM: &str = "meta_valid_from";
pub const VALID_TO: &str = "meta_valid_to";
pub const IS_CURRENT: &str = "meta_is_current";
/// Source creation time, the backfill fallback for a key's first version
pub const CREATED_AT: &str = "created_at";

/// Columns every SCD2 table must carry.
pub const SCD2_COLUMNS: [&str; 6] = [
    BUSINESS_KEY,
    VERSION_HASH,
    VERSION_NUMBER,
    VALID_FROM,
    VALID_TO,
    IS_CURRENT,
];

/// Columns the versioner stamps onto every inserted row.
pub(crate) const STAMPED_COLUMNS: [&str; 4] = [VERSION_NUMBER, VALID_FROM, VALID_TO, IS_CURRENT];

/// How `meta_valid_from` is assigned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Scd2Mode {
    /// New versions start at the load time, superseded ones end at it.
    #[default]
    Standard,
    /// Historical replay: each new version starts one second after its
    /// predecessor, and the predecessor ends where the successor starts.
    Backfill,
}

/// State of the version a new row would supersede.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CurrentVersion {
    /// Business key as stored, used when binding the close statement
    pub key: Value,
    pub hash: String,
    pub valid_from: Option<DateTime<Utc>>,
    pub version: i64,
}

/// Rows to insert and database rows to close for one chunk.
#[derive(Debug, Default)]
pub(crate) struct Scd2Plan {
    pub rows: Vec<Record>,
    /// Close timestamp with the stored keys closed at it
    pub closes: BTreeMap<DateTime<Utc>, Vec<Value>>,
    pub skipped: usize,
}

struct KeyState {
    hash: String,
    valid_from: Option<DateTime<Utc>>,
    version: i64,
    /// Position in `Scd2Plan::rows` when the current version is part of this chunk
    pending: Option<usize>,
    /// Stored key of a current database row not closed yet
    stored: Option<Value>,
}

/// Fail unless the table carries every SCD2 column.
pub(crate) fn ensure_scd2_columns(descriptor: &TableDescriptor) -> LoaderResult<()> {
    let missing: Vec<&str> = SCD2_COLUMNS
        .iter()
        .copied()
        .filter(|c| !descriptor.has_column(c))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(LoaderError::schema(
            &descriptor.table,
            format!("missing SCD2 columns: {}", missing.join(", ")),
        ))
    }
}

fn key_text(record: &Record, index: usize) -> LoaderResult<(Value, String)> {
    match record.get(BUSINESS_KEY) {
        Some(value) => match value.canonical_text() {
            Some(text) => Ok((value.clone(), text)),
            None => Err(LoaderError::invalid_record(index, "business_key is null")),
        },
        None => Err(LoaderError::invalid_record(index, "missing business_key")),
    }
}

fn hash_text(record: &Record, index: usize) -> LoaderResult<String> {
    record
        .get(VERSION_HASH)
        .and_then(Value::canonical_text)
        .ok_or_else(|| LoaderError::invalid_record(index, "missing meta_version_hash"))
}

/// Check the required fields of every record before anything is read or written.
pub(crate) fn validate_records(records: &[Record], first_index: usize) -> LoaderResult<()> {
    for (offset, record) in records.iter().enumerate() {
        key_text(record, first_index + offset)?;
        hash_text(record, first_index + offset)?;
    }
    Ok(())
}

/// Backfill start of a key's first version: the record's own
/// `meta_valid_from`, else one second after its `created_at`.
fn first_valid_from(record: &Record) -> Option<DateTime<Utc>> {
    record
        .get(VALID_FROM)
        .and_then(Value::as_timestamptz)
        .or_else(|| {
            record
                .get(CREATED_AT)
                .and_then(Value::as_timestamptz)
                .map(|created| created + Duration::seconds(1))
        })
}

/// Decide which records become new versions.
///
/// Records are processed in input order against a running per-key state
/// seeded from `current`, so a key repeated within the chunk is versioned
/// after its earlier occurrence. `current` is keyed by canonical key text.
pub(crate) fn plan_versions(
    records: Vec<Record>,
    current: HashMap<String, CurrentVersion>,
    mode: Scd2Mode,
    load_time: DateTime<Utc>,
    first_index: usize,
) -> LoaderResult<Scd2Plan> {
    let mut states: HashMap<String, KeyState> = current
        .into_iter()
        .map(|(key, version)| {
            let state = KeyState {
                hash: version.hash,
                valid_from: version.valid_from,
                version: version.version,
                pending: None,
                stored: Some(version.key),
            };
            (key, state)
        })
        .collect();

    let mut plan = Scd2Plan::default();

    for (offset, mut record) in records.into_iter().enumerate() {
        let index = first_index + offset;
        let (_, key) = key_text(&record, index)?;
        let hash = hash_text(&record, index)?;

        let previous = states.get_mut(&key);
        if previous.as_ref().is_some_and(|s| s.hash == hash) {
            plan.skipped += 1;
            continue;
        }

        let valid_from = match (mode, previous.as_ref()) {
            (Scd2Mode::Standard, _) => load_time,
            (Scd2Mode::Backfill, Some(state)) => state
                .valid_from
                .map(|from| from + Duration::seconds(1))
                .unwrap_or(load_time),
            (Scd2Mode::Backfill, None) => first_valid_from(&record).unwrap_or(load_time),
        };

        let version = previous.as_ref().map(|s| s.version).unwrap_or(0) + 1;

        if let Some(state) = previous {
            let closed_at = match mode {
                Scd2Mode::Standard => load_time,
                Scd2Mode::Backfill => valid_from,
            };
            if let Some(pos) = state.pending.take() {
                let superseded = &mut plan.rows[pos];
                superseded.insert(VALID_TO, closed_at);
                superseded.insert(IS_CURRENT, false);
            } else if let Some(stored) = state.stored.take() {
                plan.closes.entry(closed_at).or_default().push(stored);
            }
        }

        record.insert(VERSION_NUMBER, version);
        record.insert(VALID_FROM, valid_from);
        record.insert(VALID_TO, Value::Null);
        record.insert(IS_CURRENT, true);
        plan.rows.push(record);

        states.insert(
            key,
            KeyState {
                hash,
                valid_from: Some(valid_from),
                version,
                pending: Some(plan.rows.len() - 1),
                stored: None,
            },
        );
    }

    Ok(plan)
}

/// Read the current versions of the chunk's business keys.
async fn fetch_current(
    tx: &Transaction<'_>,
    descriptor: &TableDescriptor,
    records: &[Record],
) -> LoaderResult<HashMap<String, CurrentVersion>> {
    let mut seen = std::collections::HashSet::new();
    let keys: Vec<Value> = records
        .iter()
        .filter_map(|r| r.get(BUSINESS_KEY))
        .filter(|k| k.canonical_text().is_some_and(|t| seen.insert(t)))
        .cloned()
        .collect();

    let query = build_select_current(&descriptor.table);
    let current_flag = Value::Bool(true);
    let rows = tx
        .query(query.as_str(), &[&current_flag as &(dyn ToSql + Sync), &keys])
        .await
        .statement_context(|| format!("failed to read current versions from {}", descriptor.table))?;

    let mut current: HashMap<String, CurrentVersion> = HashMap::with_capacity(rows.len());
    for row in &rows {
        let key: Value = row.get(0);
        let hash: Value = row.get(1);
        let valid_from: Value = row.get(2);
        let version: Value = row.get(3);

        let Some(key_text) = key.canonical_text() else {
            continue;
        };
        let candidate = CurrentVersion {
            key,
            hash: hash.canonical_text().unwrap_or_default(),
            valid_from: valid_from.as_timestamptz(),
            version: version.as_i64().unwrap_or(0),
        };

        match current.get(&key_text) {
            Some(existing) => {
                tracing::warn!(
                    "{} has several current rows for business_key '{}' (versions {} and {}); \
                     is the partial unique index on business_key missing?",
                    descriptor.table,
                    key_text,
                    existing.version,
                    candidate.version
                );
                if candidate.version > existing.version {
                    current.insert(key_text, candidate);
                }
            }
            None => {
                current.insert(key_text, candidate);
            }
        }
    }
    Ok(current)
}

/// Insert columns for SCD2 rows: the incoming columns plus the stamped ones.
pub(crate) fn scd2_columns(columns: &[String]) -> Vec<String> {
    let mut columns = columns.to_vec();
    for stamped in STAMPED_COLUMNS {
        if !columns.iter().any(|c| c == stamped) {
            columns.push(stamped.to_string());
        }
    }
    columns
}

/// Apply one chunk of SCD2 records inside `tx`. Returns the number of rows
/// inserted; unchanged records are not counted.
pub async fn apply_scd2(
    tx: &Transaction<'_>,
    descriptor: &TableDescriptor,
    records: Vec<Record>,
    mode: Scd2Mode,
    load_time: DateTime<Utc>,
) -> LoaderResult<u64> {
    let columns: Vec<String> = match records.first() {
        Some(first) => first
            .columns()
            .iter()
            .filter(|c| !descriptor.is_autoincrement(c))
            .cloned()
            .collect(),
        None => return Ok(0),
    };
    apply_chunk(tx, descriptor, &columns, records, mode, load_time, 0, usize::MAX).await
}

#[allow(clippy::too_many_arguments)]
pub(crate) async fn apply_chunk(
    tx: &Transaction<'_>,
    descriptor: &TableDescriptor,
    columns: &[String],
    records: Vec<Record>,
    mode: Scd2Mode,
    load_time: DateTime<Utc>,
    first_index: usize,
    batch_size: usize,
) -> LoaderResult<u64> {
    ensure_scd2_columns(descriptor)?;
    validate_records(&records, first_index)?;

    let current = fetch_current(tx, descriptor, &records).await?;
    let plan = plan_versions(records, current, mode, load_time, first_index)?;

    let close_query = build_close_current(&descriptor.table);
    let closed_flag = Value::Bool(false);
    let current_flag = Value::Bool(true);
    for (closed_at, keys) in &plan.closes {
        let closed_at = Value::TimestampTz(*closed_at);
        let closed = tx
            .execute(
                close_query.as_str(),
                &[
                    &closed_flag as &(dyn ToSql + Sync),
                    &closed_at,
                    keys,
                    &current_flag,
                ],
            )
            .await
            .statement_context(|| format!("failed to close superseded rows in {}", descriptor.table))?;
        tracing::debug!("Closed {} superseded rows in {}", closed, descriptor.table);
    }

    if plan.skipped > 0 {
        tracing::debug!(
            "Skipped {} unchanged rows for {}",
            plan.skipped,
            descriptor.table
        );
    }

    let columns = scd2_columns(columns);
    let inserted = super::insert_rows(
        tx,
        &descriptor.table,
        &columns,
        &plan.rows,
        &super::statement::ConflictClause::None,
        batch_size,
    )
    .await?;
    Ok(inserted)
}
