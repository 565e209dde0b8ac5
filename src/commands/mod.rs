// ABOUTME: Command implementations for the pg-batch-loader CLI
// ABOUTME: Shared helpers resolve connection URLs and print results

pub mod describe;
pub mod exec;
pub mod extract;
pub mod generate;
pub mod load;
pub mod sync_schema;
pub mod transfer;

use crate::config::LoaderConfig;
use anyhow::{anyhow, Context, Result};
use serde::Serialize;

/// Target URL from the flag (or its environment variable), else the config file.
pub fn resolve_target_url(flag: Option<String>, config: &LoaderConfig) -> Result<String> {
    flag.or_else(|| config.target_url.clone()).ok_or_else(|| {
        anyhow!(
            "Target database URL not provided. Use `--target`, set PG_BATCH_LOADER_TARGET_URL, \
             or add target_url to the config file."
        )
    })
}

/// Source URL from the flag (or its environment variable), else the config file.
pub fn resolve_source_url(flag: Option<String>, config: &LoaderConfig) -> Result<String> {
    flag.or_else(|| config.source_url.clone()).ok_or_else(|| {
        anyhow!(
            "Source database URL not provided. Use `--source`, set PG_BATCH_LOADER_SOURCE_URL, \
             or add source_url to the config file."
        )
    })
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_wins_over_config() {
        let config = LoaderConfig {
            target_url: Some("postgresql://u@config/db".to_string()),
            ..Default::default()
        };
        let url = resolve_target_url(Some("postgresql://u@flag/db".to_string()), &config).unwrap();
        assert_eq!(url, "postgresql://u@flag/db");
        let url = resolve_target_url(None, &config).unwrap();
        assert_eq!(url, "postgresql://u@config/db");
    }

    #[test]
    fn test_missing_urls_are_reported() {
        let config = LoaderConfig::default();
        let err = resolve_target_url(None, &config).unwrap_err();
        assert!(err.to_string().contains("Target database URL not provided"));
        let err = resolve_source_url(None, &config).unwrap_err();
        assert!(err.to_string().contains("Source database URL not provided"));
    }
}
