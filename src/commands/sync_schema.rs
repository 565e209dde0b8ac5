// ABOUTME: `sync-schema` command: add source columns missing from the target table

use crate::config::LoaderConfig;
use crate::postgres;
use crate::schema::{sync_columns, TableRef};
use anyhow::{Context, Result};

pub async fn run(source: &str, target: &str, table: &TableRef, config: &LoaderConfig) -> Result<()> {
    let connect = config.connect_options();
    let source_client = postgres::connect_with_retry(source, &connect)
        .await
        .context("Failed to connect to source database")?;
    let mut target_client = postgres::connect_with_retry(target, &connect)
        .await
        .context("Failed to connect to target database")?;

    let added = sync_columns(&source_client, &mut target_client, table)
        .await
        .with_context(|| format!("Failed to sync columns of {}", table))?;

    if added.is_empty() {
        println!("{} is up to date", table);
    } else {
        println!("Added {} column(s) to {}: {}", added.len(), table, added.join(", "));
    }
    Ok(())
}
