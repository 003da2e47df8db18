//! Integration tests for the DumpDisk CLI
//!
//! These tests verify the CLI behavior without requiring root privileges
//! or actual hardware devices. Regular files stand in for source devices.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// SHA-256 of "abc"
const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

/// SHA-256 of the empty input
const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Get a command for the dumpdisk binary, isolated from any user config
#[allow(deprecated)]
fn dumpdisk() -> Command {
    let mut cmd = Command::cargo_bin("dumpdisk").unwrap();
    cmd.env("DUMPDISK_CONFIG", "/nonexistent/dumpdisk/config.toml");
    cmd
}

/// Create a source file with a recognizable pattern
fn make_source(dir: &TempDir, name: &str, len: usize) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    fs::write(&path, data).unwrap();
    path
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_flag() {
    dumpdisk()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("forensic disk imaging"))
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("image"))
        .stdout(predicate::str::contains("hash"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_flag() {
    dumpdisk()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("dumpdisk"))
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_no_args_shows_help() {
    dumpdisk()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_invalid_subcommand() {
    dumpdisk()
        .arg("burn")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

// ============================================================================
// Subcommand Help Tests
// ============================================================================

#[test]
fn test_image_help() {
    dumpdisk()
        .args(["image", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<SOURCE>"))
        .stdout(predicate::str::contains("<DESTINATION>"))
        .stdout(predicate::str::contains("--no-verify"))
        .stdout(predicate::str::contains("--stream-hash"))
        .stdout(predicate::str::contains("--bad-sector"))
        .stdout(predicate::str::contains("--report"));
}

#[test]
fn test_hash_help() {
    dumpdisk()
        .args(["hash", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SHA-256"))
        .stdout(predicate::str::contains("<PATH>"));
}

#[test]
fn test_list_help() {
    dumpdisk()
        .args(["list", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("List"))
        .stdout(predicate::str::contains("--json"));
}

// ============================================================================
// Image Command Tests
// ============================================================================

#[test]
fn test_image_round_trip() {
    let dir = TempDir::new().unwrap();
    let source = make_source(&dir, "disk.raw", 3 * 1024 * 1024 + 17);
    let dest = dir.path().join("evidence.dd");

    dumpdisk()
        .args(["image", "-y", "-b", "1M"])
        .arg(&source)
        .arg(&dest)
        .assert()
        .success()
        .stdout(predicate::str::contains("Starting : ["))
        .stdout(predicate::str::contains("Image verified"));

    assert_eq!(fs::read(&source).unwrap(), fs::read(&dest).unwrap());
    assert!(!dir.path().join("evidence.dd.partial").exists());
}

#[test]
fn test_image_stream_hash() {
    let dir = TempDir::new().unwrap();
    let source = make_source(&dir, "disk.raw", 100_000);
    let dest = dir.path().join("evidence.dd");

    dumpdisk()
        .args(["image", "-y", "--stream-hash", "-b", "4K"])
        .arg(&source)
        .arg(&dest)
        .assert()
        .success()
        .stdout(predicate::str::contains("Stream:"))
        .stdout(predicate::str::contains("Image verified"));
}

#[test]
fn test_image_no_verify() {
    let dir = TempDir::new().unwrap();
    let source = make_source(&dir, "disk.raw", 10_000);
    let dest = dir.path().join("evidence.dd");

    dumpdisk()
        .args(["image", "-y", "--no-verify"])
        .arg(&source)
        .arg(&dest)
        .assert()
        .success()
        .stdout(predicate::str::contains("Verification skipped"));

    assert_eq!(fs::read(&dest).unwrap().len(), 10_000);
}

#[test]
fn test_image_silent_prints_nothing() {
    let dir = TempDir::new().unwrap();
    let source = make_source(&dir, "disk.raw", 4096);
    let dest = dir.path().join("evidence.dd");

    dumpdisk()
        .arg("--silent")
        .arg("image")
        .arg(&source)
        .arg(&dest)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    assert!(dest.exists());
}

#[test]
fn test_image_refuses_existing_destination() {
    let dir = TempDir::new().unwrap();
    let source = make_source(&dir, "disk.raw", 4096);
    let dest = dir.path().join("evidence.dd");
    fs::write(&dest, b"previous case").unwrap();

    dumpdisk()
        .args(["image", "-y"])
        .arg(&source)
        .arg(&dest)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    assert_eq!(fs::read(&dest).unwrap(), b"previous case");
}

#[test]
fn test_image_force_overwrites() {
    let dir = TempDir::new().unwrap();
    let source = make_source(&dir, "disk.raw", 4096);
    let dest = dir.path().join("evidence.dd");
    fs::write(&dest, b"previous case").unwrap();

    dumpdisk()
        .args(["image", "-y", "--force"])
        .arg(&source)
        .arg(&dest)
        .assert()
        .success();

    assert_eq!(fs::read(&dest).unwrap(), fs::read(&source).unwrap());
}

#[test]
fn test_image_same_source_and_destination() {
    let dir = TempDir::new().unwrap();
    let source = make_source(&dir, "disk.raw", 4096);

    dumpdisk()
        .args(["image", "-y", "--force"])
        .arg(&source)
        .arg(&source)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));

    assert_eq!(fs::read(&source).unwrap().len(), 4096);
}

#[test]
fn test_image_missing_source() {
    let dir = TempDir::new().unwrap();

    dumpdisk()
        .args(["image", "-y", "/nonexistent/disk.raw"])
        .arg(dir.path().join("evidence.dd"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));

    assert!(!dir.path().join("evidence.dd").exists());
}

#[test]
fn test_image_missing_args() {
    dumpdisk()
        .arg("image")
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_image_invalid_block_size() {
    let dir = TempDir::new().unwrap();
    let source = make_source(&dir, "disk.raw", 4096);

    dumpdisk()
        .args(["image", "-y", "-b", "huge"])
        .arg(&source)
        .arg(dir.path().join("evidence.dd"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_image_invalid_bad_sector_policy() {
    let dir = TempDir::new().unwrap();
    let source = make_source(&dir, "disk.raw", 4096);

    dumpdisk()
        .args(["image", "-y", "--bad-sector", "skip"])
        .arg(&source)
        .arg(dir.path().join("evidence.dd"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_image_writes_report() {
    let dir = TempDir::new().unwrap();
    let source = make_source(&dir, "disk.raw", 8192);
    let dest = dir.path().join("evidence.dd");
    let report = dir.path().join("evidence.json");

    dumpdisk()
        .args(["image", "-y", "--report"])
        .arg(&report)
        .arg(&source)
        .arg(&dest)
        .assert()
        .success();

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(json["bytes_copied"], 8192);
    assert_eq!(json["unreadable_sectors"], 0);
    assert_eq!(json["bad_sector_policy"], "zero");
    assert_eq!(json["verification"]["status"], "verified");
    assert_eq!(json["source_digest"], json["destination_digest"]);
}

#[test]
fn test_image_settings_from_config_file() {
    let dir = TempDir::new().unwrap();
    let source = make_source(&dir, "disk.raw", 4096);
    let dest = dir.path().join("evidence.dd");
    let config = dir.path().join("dumpdisk.toml");
    fs::write(&config, "[image]\nverify = false\n").unwrap();

    dumpdisk()
        .arg("--config")
        .arg(&config)
        .args(["image", "-y"])
        .arg(&source)
        .arg(&dest)
        .assert()
        .success()
        .stdout(predicate::str::contains("Verification skipped"));
}

// ============================================================================
// Hash Command Tests
// ============================================================================

#[test]
fn test_hash_known_vector() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("abc.bin");
    fs::write(&path, b"abc").unwrap();

    dumpdisk()
        .arg("hash")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains(ABC_SHA256))
        .stdout(predicate::str::contains(format!("{}  abc.bin", ABC_SHA256)));
}

#[test]
fn test_hash_silent_prints_bare_digest() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("abc.bin");
    fs::write(&path, b"abc").unwrap();

    dumpdisk()
        .args(["--silent", "hash"])
        .arg(&path)
        .assert()
        .success()
        .stdout(format!("{}\n", ABC_SHA256));
}

#[test]
fn test_hash_empty_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.bin");
    fs::write(&path, b"").unwrap();

    dumpdisk()
        .args(["--silent", "hash"])
        .arg(&path)
        .assert()
        .success()
        .stdout(format!("{}\n", EMPTY_SHA256));
}

#[test]
fn test_hash_matches_image_digest() {
    let dir = TempDir::new().unwrap();
    let source = make_source(&dir, "disk.raw", 70_000);
    let dest = dir.path().join("evidence.dd");
    let report = dir.path().join("evidence.json");

    dumpdisk()
        .args(["--silent", "image", "--report"])
        .arg(&report)
        .arg(&source)
        .arg(&dest)
        .assert()
        .success();

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
    let expected = json["destination_digest"].as_str().unwrap().to_string();

    dumpdisk()
        .args(["--silent", "hash", "-b", "8K"])
        .arg(&dest)
        .assert()
        .success()
        .stdout(format!("{}\n", expected));
}

#[test]
fn test_hash_missing_file() {
    dumpdisk()
        .args(["hash", "/nonexistent/disk.raw"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_hash_invalid_mode() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("abc.bin");
    fs::write(&path, b"abc").unwrap();

    dumpdisk()
        .args(["hash", "--mode", "sideways"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid source mode"));
}

// ============================================================================
// List Command Tests
// ============================================================================

#[test]
fn test_list_basic() {
    // Works without root, it just won't show much
    dumpdisk().arg("list").assert().success();
}

#[test]
fn test_list_json() {
    let output = dumpdisk().args(["list", "--json"]).output().unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(json.is_array());
}

// ============================================================================
// Config Command Tests
// ============================================================================

#[test]
fn test_config_path() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("dumpdisk.toml");

    dumpdisk()
        .arg("--config")
        .arg(&config)
        .args(["config", "--path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dumpdisk.toml"));
}

#[test]
fn test_config_init_and_show() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("dumpdisk.toml");

    dumpdisk()
        .arg("--config")
        .arg(&config)
        .args(["config", "--init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created configuration file"));
    assert!(config.exists());

    dumpdisk()
        .arg("--config")
        .arg(&config)
        .args(["config", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"bad_sector\": \"zero\""));
}

// ============================================================================
// Completions and Man Page Tests
// ============================================================================

#[test]
fn test_completions_bash() {
    dumpdisk()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dumpdisk"));
}

#[test]
fn test_mangen() {
    let dir = TempDir::new().unwrap();

    dumpdisk()
        .args(["--silent", "mangen", "--out-dir"])
        .arg(dir.path())
        .assert()
        .success();

    assert!(dir.path().join("dumpdisk.1").exists());
    assert!(dir.path().join("dumpdisk-image.1").exists());
    assert!(!dir.path().join("dumpdisk-completions.1").exists());
}
