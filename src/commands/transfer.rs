// ABOUTME: `transfer` command: copy a source query's rows into a target table
// ABOUTME: Optionally streams through a server-side cursor

use crate::config::LoaderConfig;
use crate::postgres;
use crate::schema::TableRef;
use crate::transfer::{transfer, TransferOptions};
use crate::utils::strip_password_from_url;
use crate::writer::{ConflictPolicy, WriteOptions};
use anyhow::{Context, Result};

pub struct TransferCommandOptions {
    pub source: String,
    pub target: String,
    pub query: String,
    pub table: TableRef,
    pub policy: ConflictPolicy,
    pub conflict_columns: Option<Vec<String>>,
    pub stream: bool,
}

pub async fn run(opts: TransferCommandOptions, config: &LoaderConfig) -> Result<()> {
    tracing::info!(
        "Transferring from {} into {} on {}",
        strip_password_from_url(&opts.source),
        opts.table,
        strip_password_from_url(&opts.target)
    );

    let connect = config.connect_options();
    let mut source = postgres::connect_with_retry(&opts.source, &connect)
        .await
        .context("Failed to connect to source database")?;
    let mut target = postgres::connect_with_retry(&opts.target, &connect)
        .await
        .context("Failed to connect to target database")?;

    let options = TransferOptions {
        write: WriteOptions {
            batch_size: config.load.batch_size,
            conflict_columns: opts.conflict_columns,
            work_mem: config.load.work_mem.clone(),
            ..Default::default()
        },
        streaming: opts.stream,
        fetch_size: config.load.fetch_size,
    };

    let result = transfer(
        &mut source,
        &mut target,
        &opts.query,
        &opts.table,
        opts.policy,
        &options,
    )
    .await
    .with_context(|| format!("Failed to transfer rows into {}", opts.table))?;

    super::print_json(&result)
}
