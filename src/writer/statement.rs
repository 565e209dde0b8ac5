// ABOUTME: SQL text builders for batch inserts, conflict clauses and SCD2 bookkeeping
// ABOUTME: Values are always bound as parameters, only identifiers are interpolated

use super::scd2::{BUSINESS_KEY, IS_CURRENT, VALID_FROM, VALID_TO, VERSION_HASH, VERSION_NUMBER};
use crate::schema::{ConflictTarget, TableRef};
use crate::utils::{quote_ident, quote_ident_list};

/// PostgreSQL accepts at most 65535 bind parameters per statement.
pub(crate) const MAX_BIND_PARAMETERS: usize = 65000;

/// Rows per statement: `batch_size`, lowered so one statement stays under the
/// bind parameter limit.
pub(crate) fn rows_per_statement(batch_size: usize, params_per_row: usize) -> usize {
    let cap = std::cmp::max(1, MAX_BIND_PARAMETERS / params_per_row.max(1));
    batch_size.clamp(1, cap)
}

/// What an insert does when it hits an existing row.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ConflictClause {
    None,
    /// `ON CONFLICT [target] DO NOTHING`
    DoNothing(Option<ConflictTarget>),
    DoUpdate {
        target: ConflictTarget,
        set_columns: Vec<String>,
    },
}

impl ConflictClause {
    pub(crate) fn to_sql(&self) -> String {
        match self {
            ConflictClause::None => String::new(),
            ConflictClause::DoNothing(None) => " ON CONFLICT DO NOTHING".to_string(),
            ConflictClause::DoNothing(Some(target)) => {
                format!(" ON CONFLICT {} DO NOTHING", target.to_sql())
            }
            ConflictClause::DoUpdate {
                target,
                set_columns,
            } => {
                // Nothing left to update once the target columns are removed
                if set_columns.is_empty() {
                    return format!(" ON CONFLICT {} DO NOTHING", target.to_sql());
                }
                let assignments: Vec<String> = set_columns
                    .iter()
                    .map(|c| format!("{} = EXCLUDED.{}", quote_ident(c), quote_ident(c)))
                    .collect();
                format!(
                    " ON CONFLICT {} DO UPDATE SET {}",
                    target.to_sql(),
                    assignments.join(", ")
                )
            }
        }
    }
}

/// Build a multi-row insert:
///
/// ```sql
/// INSERT INTO "schema"."table" ("a", "b") VALUES ($1, $2), ($3, $4) ON CONFLICT ...
/// ```
pub(crate) fn build_insert(
    table: &TableRef,
    columns: &[String],
    num_rows: usize,
    conflict: &ConflictClause,
) -> String {
    let num_cols = columns.len();
    let value_rows: Vec<String> = (0..num_rows)
        .map(|row_idx| {
            let placeholders: Vec<String> = (0..num_cols)
                .map(|col_idx| format!("${}", row_idx * num_cols + col_idx + 1))
                .collect();
            format!("({})", placeholders.join(", "))
        })
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES {}{}",
        table.qualified(),
        quote_ident_list(columns),
        value_rows.join(", "),
        conflict.to_sql()
    )
}

/// Build an insert that reads from a rendered query:
///
/// ```sql
/// INSERT INTO "schema"."table" ("a", "b") SELECT "a", "b" FROM (<query>) AS page ON CONFLICT ...
/// ```
pub(crate) fn build_insert_select(
    table: &TableRef,
    columns: &[String],
    query: &str,
    conflict: &ConflictClause,
) -> String {
    let column_list = quote_ident_list(columns);
    format!(
        "INSERT INTO {} ({}) SELECT {} FROM ({}) AS page{}",
        table.qualified(),
        column_list,
        column_list,
        query,
        conflict.to_sql()
    )
}

/// Select existing rows by key tuple.
///
/// Single-column keys use `"k" IN ($1, $2, ...)`, composite keys use
/// `("k1", "k2") IN (($1, $2), ($3, $4), ...)`.
pub(crate) fn build_select_existing(
    table: &TableRef,
    key_columns: &[String],
    select_columns: &[String],
    num_keys: usize,
) -> String {
    let num_key_cols = key_columns.len();
    let (lhs, tuples) = if num_key_cols == 1 {
        let placeholders: Vec<String> = (1..=num_keys).map(|i| format!("${}", i)).collect();
        (quote_ident(&key_columns[0]), placeholders.join(", "))
    } else {
        let tuples: Vec<String> = (0..num_keys)
            .map(|row_idx| {
                let placeholders: Vec<String> = (0..num_key_cols)
                    .map(|col_idx| format!("${}", row_idx * num_key_cols + col_idx + 1))
                    .collect();
                format!("({})", placeholders.join(", "))
            })
            .collect();
        (format!("({})", quote_ident_list(key_columns)), tuples.join(", "))
    };

    format!(
        "SELECT {} FROM {} WHERE {} IN ({})",
        quote_ident_list(select_columns),
        table.qualified(),
        lhs,
        tuples
    )
}

/// Current SCD2 rows for a set of business keys.
///
/// `$1` is the current flag (TRUE), `$2` the key array.
pub(crate) fn build_select_current(table: &TableRef) -> String {
    format!(
        "SELECT {}, {}, {}, {} FROM {} WHERE {} = $1 AND {} = ANY($2)",
        quote_ident(BUSINESS_KEY),
        quote_ident(VERSION_HASH),
        quote_ident(VALID_FROM),
        quote_ident(VERSION_NUMBER),
        table.qualified(),
        quote_ident(IS_CURRENT),
        quote_ident(BUSINESS_KEY)
    )
}

/// Close current SCD2 rows.
///
/// `$1` is the closed flag (FALSE), `$2` the close timestamp, `$3` the key
/// array and `$4` the current flag (TRUE). The flags are bound so the column
/// may be boolean or a 0/1 integer.
pub(crate) fn build_close_current(table: &TableRef) -> String {
    format!(
        "UPDATE {} SET {} = $1, {} = $2 WHERE {} = ANY($3) AND {} = $4",
        table.qualified(),
        quote_ident(IS_CURRENT),
        quote_ident(VALID_TO),
        quote_ident(BUSINESS_KEY),
        quote_ident(IS_CURRENT)
    )
}
