//! Command-line tests. These run the built binary against temporary
//! directories and only use `--dry-run` or local failures, so no Redis
//! server or network is required.

use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn crawler_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("dcse-crawler");
    path
}

fn setup_test_env(config: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let repo = root.join("cloned_repo");
    fs::create_dir_all(repo.join("sub")).unwrap();
    fs::write(repo.join("a.py"), "print(1)").unwrap();
    fs::write(repo.join("b.txt"), "hello").unwrap();
    fs::write(repo.join("sub/c.py"), "print(2)").unwrap();
    fs::write(repo.join("Makefile"), "all:\n").unwrap();

    fs::write(root.join("dcse.toml"), config).unwrap();
    (tmp, root)
}

fn run_crawler(root: &Path, args: &[&str]) -> (String, String, i32) {
    let binary = crawler_binary();
    let mut cmd = Command::new(&binary);
    cmd.current_dir(root)
        .arg("--config")
        .arg(root.join("dcse.toml"))
        .args(args);
    for (key, _) in std::env::vars() {
        if key.starts_with("DCSE_") {
            cmd.env_remove(key);
        }
    }
    let output = cmd
        .output()
        .unwrap_or_else(|e| panic!("Failed to run dcse-crawler binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.code().unwrap_or(-1))
}

#[test]
fn test_ingest_dry_run_uses_existing_clone() {
    let (_tmp, root) = setup_test_env("");
    let dest = root.join("cloned_repo");

    let (stdout, stderr, code) = run_crawler(
        &root,
        &[
            "ingest",
            "https://example.invalid/org/demo.git",
            "--dest",
            dest.to_str().unwrap(),
            "--dry-run",
            "--progress",
            "off",
        ],
    );
    assert_eq!(code, 0, "ingest failed: {}", stderr);
    assert!(stdout.starts_with("ingest demo\n"), "stdout: {}", stdout);
    assert!(stdout.contains("  files seen: 3\n"));
    assert!(stdout.contains("  published: 3\n"));
    assert!(stdout.contains("  skipped (read error): 0\n"));
    assert!(stdout.trim_end().ends_with("completed"));
}

#[test]
fn test_ingest_reads_destination_from_config() {
    let config = "[ingest]\nclone_destination = \"cloned_repo\"\nexclude_globs = [\"*.txt\"]\n";
    let (_tmp, root) = setup_test_env(config);

    let (stdout, stderr, code) = run_crawler(
        &root,
        &[
            "ingest",
            "git@github.com:org/demo.git",
            "--dry-run",
            "--progress",
            "off",
        ],
    );
    assert_eq!(code, 0, "ingest failed: {}", stderr);
    assert!(stdout.contains("  published: 2\n"), "stdout: {}", stdout);
}

#[test]
fn test_ingest_json_progress_goes_to_stderr() {
    let (_tmp, root) = setup_test_env("");
    let dest = root.join("cloned_repo");

    let (stdout, stderr, code) = run_crawler(
        &root,
        &[
            "ingest",
            "https://example.invalid/org/demo.git",
            "--dest",
            dest.to_str().unwrap(),
            "--dry-run",
            "--progress",
            "json",
        ],
    );
    assert_eq!(code, 0, "ingest failed: {}", stderr);
    assert!(!stdout.contains("\"event\""));

    let events: Vec<serde_json::Value> = stderr
        .lines()
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect();
    let files = events.iter().filter(|e| e["event"] == "file").count();
    assert_eq!(files, 3);
    let summary = events
        .iter()
        .find(|e| e["event"] == "summary")
        .expect("summary event");
    assert_eq!(summary["summary"]["published"], 3);
    assert_eq!(summary["summary"]["state"], "completed");
}

#[test]
fn test_ingest_clone_failure_exits_nonzero() {
    let (_tmp, root) = setup_test_env("");
    let missing = root.join("no-such-repo");
    let dest = root.join("fresh_clone");

    let (_stdout, stderr, code) = run_crawler(
        &root,
        &[
            "ingest",
            missing.to_str().unwrap(),
            "--dest",
            dest.to_str().unwrap(),
            "--dry-run",
            "--progress",
            "off",
        ],
    );
    assert_eq!(code, 1);
    assert!(stderr.contains("Error:"), "stderr: {}", stderr);
}

#[test]
fn test_ingest_rejects_zero_workers() {
    let (_tmp, root) = setup_test_env("");
    let (_stdout, stderr, code) = run_crawler(
        &root,
        &[
            "ingest",
            "https://example.invalid/org/demo.git",
            "--workers",
            "0",
            "--dry-run",
        ],
    );
    assert_ne!(code, 0);
    assert!(stderr.contains("ingest.workers"), "stderr: {}", stderr);
}

#[test]
fn test_walk_lists_files_with_hashes() {
    let (_tmp, root) = setup_test_env("");
    let dir = root.join("cloned_repo");

    let (stdout, stderr, code) = run_crawler(&root, &["walk", dir.to_str().unwrap()]);
    assert_eq!(code, 0, "walk failed: {}", stderr);
    assert!(stdout.contains("a.py"));
    assert!(stdout.contains("b.txt"));
    assert!(stdout.contains("c.py"));
    assert!(!stdout.contains("Makefile"));
    assert!(stdout.contains(&format!("{:x}", Sha256::digest(b"print(1)"))));
    assert!(stdout.contains("  files: 3\n"));
}

#[test]
fn test_missing_config_file_fails() {
    let tmp = TempDir::new().unwrap();
    let output = Command::new(crawler_binary())
        .current_dir(tmp.path())
        .args(["--config", "does-not-exist.toml", "walk", "."])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Config file not found"), "stderr: {}", stderr);
}

#[test]
fn test_malformed_config_fails() {
    let (_tmp, root) = setup_test_env("[stream\nname = ");
    let (_stdout, stderr, code) = run_crawler(&root, &["walk", "."]);
    assert_ne!(code, 0);
    assert!(stderr.contains("Failed to parse config file"), "stderr: {}", stderr);
}
