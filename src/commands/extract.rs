// ABOUTME: `extract` command: print a query's rows as NDJSON on stdout
// ABOUTME: --stream reads through a cursor instead of loading every row first

use crate::config::LoaderConfig;
use crate::extract::{extract_all, RecordCursor};
use crate::postgres;
use anyhow::{Context, Result};
use std::io::Write;

pub struct ExtractCommandOptions {
    pub source: String,
    pub query: String,
    pub stream: bool,
}

pub async fn run(opts: ExtractCommandOptions, config: &LoaderConfig) -> Result<()> {
    let mut client = postgres::connect_with_retry(&opts.source, &config.connect_options())
        .await
        .context("Failed to connect to source database")?;

    let stdout = std::io::stdout();
    let mut out = std::io::BufWriter::new(stdout.lock());
    let mut count = 0u64;

    if opts.stream {
        let mut cursor = RecordCursor::open(&mut client, &opts.query, config.load.fetch_size).await?;
        while let Some(batch) = cursor.next_batch().await? {
            for record in batch {
                writeln!(out, "{}", record.to_json())?;
                count += 1;
            }
        }
        cursor.close().await?;
    } else {
        for record in extract_all(&client, &opts.query).await? {
            writeln!(out, "{}", record.to_json())?;
            count += 1;
        }
    }

    out.flush()?;
    tracing::info!("Extracted {} rows", count);
    Ok(())
}
