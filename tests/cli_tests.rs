//! Tests for the `tabledash` binary's startup behaviour.

use std::fs;

use assert_cmd::Command;
use tempfile::TempDir;

#[test]
fn test_unreachable_database_exits_and_logs() {
    let dir = TempDir::new().unwrap();
    let log_dir = dir.path().join("log_data");
    let config_path = dir.path().join("config.toml");
    fs::write(
        &config_path,
        format!(
            "[database]\npath = \"/nonexistent/dir/cnc_data.db\"\n\n[logging]\ndir = {:?}\n",
            log_dir.to_string_lossy()
        ),
    )
    .unwrap();

    Command::cargo_bin("tabledash")
        .unwrap()
        .arg(&config_path)
        .assert()
        .failure()
        .code(1);

    let logs: Vec<_> = fs::read_dir(&log_dir).unwrap().collect();
    assert_eq!(logs.len(), 1);
    let contents = fs::read_to_string(logs[0].as_ref().unwrap().path()).unwrap();
    assert!(contents.contains(" - INFO - Starting tabledash..."));
    assert!(contents.contains(" - ERROR - connection unreachable"));
}

#[test]
fn test_missing_config_file_is_reported() {
    let dir = TempDir::new().unwrap();
    Command::cargo_bin("tabledash")
        .unwrap()
        .arg(dir.path().join("absent.toml"))
        .assert()
        .failure()
        .code(2);
}
