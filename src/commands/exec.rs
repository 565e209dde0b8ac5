// ABOUTME: `exec` command: run one SQL statement against the target

use crate::config::LoaderConfig;
use crate::exec::execute_statement;
use crate::postgres;
use anyhow::{Context, Result};

pub async fn run(target: &str, sql: &str, config: &LoaderConfig) -> Result<()> {
    let mut client = postgres::connect_with_retry(target, &config.connect_options()).await?;
    let affected = execute_statement(&mut client, sql)
        .await
        .context("Statement failed")?;
    println!("{} rows affected", affected);
    Ok(())
}
