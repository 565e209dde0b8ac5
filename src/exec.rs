// ABOUTME: Runs one arbitrary SQL statement in its own transaction
// ABOUTME: Used for DDL and maintenance statements around a load

use crate::error::{LoaderResult, StatementContext};
use tokio_postgres::Client;

/// Execute `sql` and commit. Returns the affected row count.
pub async fn execute_statement(client: &mut Client, sql: &str) -> LoaderResult<u64> {
    let tx = client
        .transaction()
        .await
        .statement_context(|| "failed to begin transaction".to_string())?;
    let affected = tx
        .execute(sql, &[])
        .await
        .statement_context(|| "failed to execute statement".to_string())?;
    tx.commit()
        .await
        .statement_context(|| "failed to commit statement".to_string())?;
    tracing::info!("Statement affected {} rows", affected);
    Ok(affected)
}
