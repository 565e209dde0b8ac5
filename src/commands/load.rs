// ABOUTME: `load` command: write JSON or NDJSON records into a table
// ABOUTME: Stamps meta_version_hash for SCD2 loads when records do not carry one

use crate::config::LoaderConfig;
use crate::digest::stamp_version_hash;
use crate::postgres;
use crate::record::Record;
use crate::schema::TableRef;
use crate::writer::{BatchWriter, ConflictPolicy, Scd2Mode, WriteOptions};
use anyhow::{bail, Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};

pub struct LoadCommandOptions {
    pub target: String,
    pub table: TableRef,
    /// Input file, `-` for stdin
    pub input: PathBuf,
    pub policy: ConflictPolicy,
    pub batch_size: Option<usize>,
    pub conflict_columns: Option<Vec<String>>,
    pub backfill: bool,
    pub skip_unchanged: bool,
    /// Columns hashed into meta_version_hash, default every non-meta column
    pub hash_columns: Option<Vec<String>>,
}

/// Parse a JSON array of objects, or one object per line (NDJSON).
pub fn parse_records(contents: &str) -> Result<Vec<Record>> {
    let trimmed = contents.trim_start();
    if trimmed.starts_with('[') {
        let values: Vec<serde_json::Value> =
            serde_json::from_str(trimmed).context("Input is not a valid JSON array")?;
        return values
            .into_iter()
            .enumerate()
            .map(|(idx, value)| to_record(value).with_context(|| format!("Element {}", idx)))
            .collect();
    }

    let mut records = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(line)
            .with_context(|| format!("Line {} is not valid JSON", idx + 1))?;
        records.push(to_record(value).with_context(|| format!("Line {}", idx + 1))?);
    }
    Ok(records)
}

fn to_record(value: serde_json::Value) -> Result<Record> {
    match value {
        serde_json::Value::Object(map) => Ok(Record::from_json_object(map)),
        other => bail!("expected a JSON object, got {}", other),
    }
}

fn read_input(input: &Path) -> Result<String> {
    if input.as_os_str() == "-" {
        let mut contents = String::new();
        std::io::stdin()
            .read_to_string(&mut contents)
            .context("Failed to read records from stdin")?;
        return Ok(contents);
    }
    std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read input file {}", input.display()))
}

pub async fn run(opts: LoadCommandOptions, config: &LoaderConfig) -> Result<()> {
    let contents = read_input(&opts.input)?;
    let mut records = parse_records(&contents)?;
    tracing::info!(
        "Read {} records from {}",
        records.len(),
        opts.input.display()
    );

    if opts.policy == ConflictPolicy::Scd2 {
        let mut stamped = 0usize;
        for record in records.iter_mut() {
            if stamp_version_hash(record, opts.hash_columns.as_deref()) {
                stamped += 1;
            }
        }
        if stamped > 0 {
            tracing::info!("Computed meta_version_hash for {} records", stamped);
        }
    }

    let options = WriteOptions {
        batch_size: opts.batch_size.unwrap_or(config.load.batch_size),
        conflict_columns: opts.conflict_columns,
        scd2_mode: if opts.backfill {
            Scd2Mode::Backfill
        } else {
            Scd2Mode::Standard
        },
        skip_unchanged: opts.skip_unchanged,
        work_mem: config.load.work_mem.clone(),
    };

    let mut client = postgres::connect_with_retry(&opts.target, &config.connect_options()).await?;
    let result = BatchWriter::new(&mut client)
        .write(records, &opts.table, opts.policy, &options)
        .await
        .with_context(|| format!("Failed to load records into {}", opts.table))?;

    super::print_json(&result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_parse_json_array() {
        let records = parse_records(r#"[{"a": 1}, {"a": 2, "b": "x"}]"#).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("b"), Some(&Value::from("x")));
    }

    #[test]
    fn test_parse_ndjson_skips_blank_lines() {
        let records = parse_records("{\"a\": 1}\n\n{\"a\": 2}\n").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("a"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_parse_rejects_non_objects() {
        let err = parse_records("{\"a\": 1}\n42\n").unwrap_err();
        assert!(format!("{:#}", err).contains("Line 2"));
        assert!(parse_records("[1, 2]").is_err());
        assert!(parse_records("{not json").is_err());
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(parse_records("").unwrap().is_empty());
        assert!(parse_records("[]").unwrap().is_empty());
    }
}
