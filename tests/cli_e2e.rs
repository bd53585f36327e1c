//! Black-box checks of the binary's argument surface and fail-fast
//! configuration handling.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn audioloader() -> Command {
    Command::cargo_bin("audioloader").unwrap()
}

#[test]
fn help_lists_every_flag() {
    audioloader()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--store-endpoint"))
        .stdout(predicate::str::contains("--bucket"))
        .stdout(predicate::str::contains("--table"))
        .stdout(predicate::str::contains("--credentials"))
        .stdout(predicate::str::contains("--db"))
        .stdout(predicate::str::contains("--work-dir"));
}

#[test]
fn missing_required_flags_is_a_usage_error() {
    audioloader()
        .arg("https://example.com/downloads")
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn malformed_table_id_fails_before_any_network_use() {
    let dir = TempDir::new().unwrap();
    let credentials = dir.path().join("key.json");
    std::fs::write(&credentials, r#"{"token": "t"}"#).unwrap();

    audioloader()
        .args([
            "https://example.invalid/downloads",
            "--store-endpoint",
            "https://storage.example.invalid",
            "--bucket",
            "audio",
            "--table",
            "only_two.parts",
            "--credentials",
        ])
        .arg(&credentials)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid --table"));
}

#[test]
fn missing_credentials_file_fails_fast() {
    let dir = TempDir::new().unwrap();

    audioloader()
        .args([
            "https://example.invalid/downloads",
            "--store-endpoint",
            "https://storage.example.invalid",
            "--bucket",
            "audio",
            "--table",
            "proj.audio_files.audio_metadata",
            "--credentials",
        ])
        .arg(dir.path().join("absent.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("object store configuration"));
}
