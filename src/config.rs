// ABOUTME: TOML configuration for connection URLs, timeouts and load sizes
// ABOUTME: Read from --config, else ~/.pg-batch-loader/config.toml, else defaults

use crate::extract::DEFAULT_FETCH_SIZE;
use crate::loader::DEFAULT_PAGE_SIZE;
use crate::postgres::ConnectOptions;
use crate::writer::DEFAULT_BATCH_SIZE;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR: &str = ".pg-batch-loader";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    pub target_url: Option<String>,
    pub source_url: Option<String>,
    pub connect_timeout_secs: u64,
    pub connect_retries: u32,
    pub load: LoadSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadSection {
    pub batch_size: usize,
    pub page_size: usize,
    pub fetch_size: usize,
    pub work_mem: Option<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            target_url: None,
            source_url: None,
            connect_timeout_secs: 1800,
            connect_retries: 3,
            load: LoadSection::default(),
        }
    }
}

impl Default for LoadSection {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            fetch_size: DEFAULT_FETCH_SIZE,
            work_mem: None,
        }
    }
}

impl LoaderConfig {
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            retries: self.connect_retries,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.load.batch_size == 0 {
            bail!("load.batch_size must be greater than zero");
        }
        if self.load.page_size == 0 {
            bail!("load.page_size must be greater than zero");
        }
        if self.load.fetch_size == 0 {
            bail!("load.fetch_size must be greater than zero");
        }
        Ok(())
    }
}

/// `~/.pg-batch-loader/config.toml`
pub fn default_config_path() -> Result<PathBuf> {
    let home_dir =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
    Ok(home_dir.join(CONFIG_DIR).join(CONFIG_FILE))
}

pub fn parse(contents: &str) -> Result<LoaderConfig> {
    let config: LoaderConfig = toml::from_str(contents).context("Invalid configuration")?;
    config.validate()?;
    Ok(config)
}

pub fn load_from(path: &Path) -> Result<LoaderConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    parse(&contents).with_context(|| format!("Failed to load config file {}", path.display()))
}

/// Load `path` if given (it must exist), else the default file if present,
/// else built-in defaults.
pub fn load(path: Option<&Path>) -> Result<LoaderConfig> {
    if let Some(path) = path {
        return load_from(path);
    }
    let default_path = default_config_path()?;
    if default_path.exists() {
        tracing::debug!("Using config file {}", default_path.display());
        return load_from(&default_path);
    }
    Ok(LoaderConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config, LoaderConfig::default());
        assert_eq!(config.load.batch_size, 80_000);
        assert_eq!(config.load.fetch_size, 1000);
        assert_eq!(
            config.connect_options().connect_timeout,
            Duration::from_secs(1800)
        );
    }

    #[test]
    fn test_full_config() {
        let config = parse(
            r#"
            target_url = "postgresql://loader@db/warehouse"
            connect_retries = 5

            [load]
            batch_size = 1000
            work_mem = "8GB"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.target_url.as_deref(),
            Some("postgresql://loader@db/warehouse")
        );
        assert_eq!(config.connect_retries, 5);
        assert_eq!(config.load.batch_size, 1000);
        assert_eq!(config.load.page_size, 80_000);
        assert_eq!(config.load.work_mem.as_deref(), Some("8GB"));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(parse("target = \"x\"").is_err());
        assert!(parse("[load]\nbatch = 5").is_err());
    }

    #[test]
    fn test_zero_sizes_rejected() {
        assert!(parse("[load]\nbatch_size = 0").is_err());
        assert!(parse("[load]\npage_size = 0").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "source_url = \"postgresql://u@h/src\"\n").unwrap();
        let config = load(Some(&path)).unwrap();
        assert_eq!(config.source_url.as_deref(), Some("postgresql://u@h/src"));

        assert!(load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
