// ABOUTME: Adds columns that exist on a source table but not on the same-named target table
// ABOUTME: Column types are copied verbatim from the source catalog via format_type

use super::{describe, resolve_table, TableRef};
use crate::error::{LoaderError, LoaderResult, StatementContext};
use crate::utils::quote_ident;
use tokio_postgres::{Client, GenericClient};

async fn source_column_types<C>(source: &C, table: &TableRef) -> LoaderResult<Vec<(String, String)>>
where
    C: GenericClient,
{
    let table = &resolve_table(source, table).await?;
    let schema = table.schema.as_deref().unwrap_or_default();
    let rows = source
        .query(
            "SELECT a.attname::text, format_type(a.atttypid, a.atttypmod)
             FROM pg_attribute a
             JOIN pg_class c ON c.oid = a.attrelid
             JOIN pg_namespace n ON n.oid = c.relnamespace
             WHERE n.nspname = $1
               AND c.relname = $2
               AND a.attnum > 0
               AND NOT a.attisdropped
             ORDER BY a.attnum",
            &[&schema, &table.name],
        )
        .await
        .map_err(|e| LoaderError::schema(table, format!("failed to read source columns: {}", e)))?;

    if rows.is_empty() {
        return Err(LoaderError::schema(table, "table does not exist on source"));
    }

    Ok(rows.iter().map(|row| (row.get(0), row.get(1))).collect())
}

pub(crate) fn build_add_column(table: &TableRef, column: &str, data_type: &str) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        table.qualified(),
        quote_ident(column),
        data_type
    )
}

/// Add every column of `table` on `source` that the target table lacks.
///
/// All additions run in one target transaction. Returns the added column
/// names in source order.
pub async fn sync_columns<C>(
    source: &C,
    target: &mut Client,
    table: &TableRef,
) -> LoaderResult<Vec<String>>
where
    C: GenericClient,
{
    let source_columns = source_column_types(source, table).await?;

    let tx = target
        .transaction()
        .await
        .statement_context(|| format!("failed to begin transaction on {}", table))?;
    let descriptor = describe(&tx, table).await?;

    let mut added = Vec::new();
    for (column, data_type) in source_columns {
        if descriptor.has_column(&column) {
            continue;
        }
        let statement = build_add_column(&descriptor.table, &column, &data_type);
        tx.batch_execute(&statement)
            .await
            .statement_context(|| format!("failed to add column '{}' to {}", column, table))?;
        tracing::info!("Added column {} {} to {}", column, data_type, table);
        added.push(column);
    }

    tx.commit()
        .await
        .statement_context(|| format!("failed to commit schema sync of {}", table))?;

    if added.is_empty() {
        tracing::info!("{} already has every source column", table);
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_add_column() {
        let table = TableRef::new(Some("analytics"), "daily_report");
        assert_eq!(
            build_add_column(&table, "clicks", "bigint"),
            "ALTER TABLE \"analytics\".\"daily_report\" ADD COLUMN \"clicks\" bigint"
        );
        assert_eq!(
            build_add_column(&table, "price", "numeric(12,2)"),
            "ALTER TABLE \"analytics\".\"daily_report\" ADD COLUMN \"price\" numeric(12,2)"
        );
    }
}
