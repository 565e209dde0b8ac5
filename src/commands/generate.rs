// ABOUTME: `generate` command: page a templated query into a table with INSERT ... SELECT
// ABOUTME: Template parameters come from repeated --param key=value flags

use crate::config::LoaderConfig;
use crate::loader::{LoadOptions, SelectLoader};
use crate::postgres;
use crate::schema::TableRef;
use crate::writer::ConflictPolicy;
use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub struct GenerateCommandOptions {
    pub target: String,
    pub template: PathBuf,
    pub table: TableRef,
    pub params: Vec<String>,
    pub policy: ConflictPolicy,
    pub page_size: Option<usize>,
}

/// Parse `key=value` pairs. Later pairs override earlier ones.
pub fn parse_params(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut params = BTreeMap::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Invalid --param '{}', expected key=value", pair);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid --param '{}', key is empty", pair);
        }
        params.insert(key.to_string(), value.to_string());
    }
    Ok(params)
}

pub async fn run(opts: GenerateCommandOptions, config: &LoaderConfig) -> Result<()> {
    let template = std::fs::read_to_string(&opts.template)
        .with_context(|| format!("Failed to read template {}", opts.template.display()))?;
    let params = parse_params(&opts.params)?;

    let options = LoadOptions {
        page_size: opts.page_size.unwrap_or(config.load.page_size),
        work_mem: config.load.work_mem.clone(),
    };

    let mut client = postgres::connect_with_retry(&opts.target, &config.connect_options()).await?;
    let result = SelectLoader::new(&mut client)
        .load_from_query(&template, &opts.table, &params, opts.policy, &options)
        .await
        .with_context(|| format!("Failed to load query results into {}", opts.table))?;

    super::print_json(&result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_params() {
        let params = parse_params(&[
            "day=2025-09-01".to_string(),
            "filter=a=b".to_string(),
            "day=2025-09-02".to_string(),
        ])
        .unwrap();
        assert_eq!(params.get("day").map(String::as_str), Some("2025-09-02"));
        assert_eq!(params.get("filter").map(String::as_str), Some("a=b"));
    }

    #[test]
    fn test_parse_params_rejects_malformed() {
        assert!(parse_params(&["novalue".to_string()]).is_err());
        assert!(parse_params(&["=x".to_string()]).is_err());
    }
}
