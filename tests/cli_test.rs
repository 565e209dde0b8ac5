use std::fs;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_help_lists_commands() {
    let bin_path = env!("CARGO_BIN_EXE_pg-batch-loader");

    let output = Command::new(bin_path)
        .arg("--help")
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in [
        "load",
        "transfer",
        "generate",
        "extract",
        "describe",
        "exec",
        "sync-schema",
    ] {
        assert!(stdout.contains(command), "missing {} in help", command);
    }
}

#[test]
fn test_load_without_target_fails() {
    let temp_dir = tempdir().unwrap();
    let home_dir = temp_dir.path();
    let input = home_dir.join("records.json");
    fs::write(&input, r#"[{"a": 1}]"#).unwrap();

    let bin_path = env!("CARGO_BIN_EXE_pg-batch-loader");
    let output = Command::new(bin_path)
        .arg("load")
        .arg("--table")
        .arg("daily_report")
        .arg("--input")
        .arg(&input)
        .env("HOME", home_dir)
        .env_remove("PG_BATCH_LOADER_TARGET_URL")
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Target database URL not provided"));
}

#[test]
fn test_unknown_policy_is_rejected() {
    let temp_dir = tempdir().unwrap();
    let bin_path = env!("CARGO_BIN_EXE_pg-batch-loader");

    let output = Command::new(bin_path)
        .args(["load", "--table", "t", "--input", "x.json", "--policy", "merge"])
        .env("HOME", temp_dir.path())
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown conflict policy"));
}

#[test]
fn test_invalid_config_file_is_reported() {
    let temp_dir = tempdir().unwrap();
    let home_dir = temp_dir.path();
    let config_dir = home_dir.join(".pg-batch-loader");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("config.toml"), "unknown_key = 1\n").unwrap();

    let bin_path = env!("CARGO_BIN_EXE_pg-batch-loader");
    let output = Command::new(bin_path)
        .args(["exec", "--sql", "SELECT 1"])
        .env("HOME", home_dir)
        .env_remove("PG_BATCH_LOADER_TARGET_URL")
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("config.toml"));
}

#[test]
fn test_target_from_config_file_is_used() {
    let temp_dir = tempdir().unwrap();
    let home_dir = temp_dir.path();
    let config_path = home_dir.join("loader.toml");
    // Not a PostgreSQL URL, so the command fails at validation instead of "not provided"
    fs::write(&config_path, "target_url = \"mysql://u@h/db\"\nconnect_retries = 0\n").unwrap();

    let bin_path = env!("CARGO_BIN_EXE_pg-batch-loader");
    let output = Command::new(bin_path)
        .arg("--config")
        .arg(&config_path)
        .args(["exec", "--sql", "SELECT 1"])
        .env("HOME", home_dir)
        .env_remove("PG_BATCH_LOADER_TARGET_URL")
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!stderr.contains("Target database URL not provided"));
    assert!(stderr.contains("Invalid connection string format"));
}
