// ABOUTME: `describe` command: print a table's descriptor as JSON

use crate::config::LoaderConfig;
use crate::postgres;
use crate::schema::{describe, TableRef};
use anyhow::Result;

pub async fn run(target: &str, table: &TableRef, config: &LoaderConfig) -> Result<()> {
    let client = postgres::connect_with_retry(target, &config.connect_options()).await?;
    let descriptor = describe(&client, table).await?;
    super::print_json(&descriptor)
}
