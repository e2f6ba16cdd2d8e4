//! Integration tests for the `labctl` binary.
//!
//! These run the CLI as a subprocess against an address where nothing
//! listens, so they cover argument handling and local validation only.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::process::Command;

/// Helper: run labctl with args and return (`exit_code`, stdout, stderr).
fn run(args: &[&str]) -> (i32, String, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_labctl"))
        .args(args)
        .env("SECLAB_ADDR", "http://127.0.0.1:19999")
        .env_remove("SECLAB_TOKEN")
        .env_remove("SECLAB_PASSWORD")
        .output()
        .expect("failed to execute labctl");

    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

// ── Version & help ───────────────────────────────────────────────────

#[test]
fn test_version_flag() {
    let (code, stdout, _) = run(&["--version"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("labctl"), "version output: {stdout}");
}

#[test]
fn test_help_lists_commands() {
    let (code, stdout, _) = run(&["--help"]);
    assert_eq!(code, 0);
    for cmd in ["health", "login", "list", "show", "create", "update", "delete", "export", "import", "users"] {
        assert!(stdout.contains(cmd), "help should list '{cmd}': {stdout}");
    }
    assert!(stdout.contains("SECLAB_ADDR"));
}

#[test]
fn test_subcommand_help() {
    for sub in ["create", "delete", "users"] {
        let (code, stdout, _) = run(&[sub, "--help"]);
        assert_eq!(code, 0, "{sub} --help should exit 0");
        assert!(stdout.contains("Usage"), "{sub} help: {stdout}");
    }
}

// ── Argument errors ──────────────────────────────────────────────────

#[test]
fn test_unknown_kind_is_rejected() {
    let (code, _, stderr) = run(&["create", "chapter", "one", "--title", "One"]);
    assert_eq!(code, 2, "clap usage errors exit 2");
    assert!(stderr.contains("chapter"), "stderr: {stderr}");
}

#[test]
fn test_login_requires_password() {
    let (code, _, stderr) = run(&["login", "--username", "alice"]);
    assert_eq!(code, 2);
    assert!(stderr.contains("--password"), "stderr: {stderr}");
}

#[test]
fn test_admin_commands_need_a_token() {
    let (code, _, stderr) = run(&["delete", "exercise/sqli"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("SECLAB_TOKEN"), "stderr: {stderr}");
}

#[test]
fn test_malformed_key() {
    let (code, _, stderr) = run(&["show", "no-slash"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("kind/slug"), "stderr: {stderr}");
}

#[test]
fn test_update_without_fields() {
    let (code, _, stderr) = run(&["--token", "t", "update", "page/about"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("nothing to update"), "stderr: {stderr}");
}

// ── Local file validation ────────────────────────────────────────────

#[test]
fn test_import_rejects_non_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not-a-snapshot.json");
    fs::write(&path, r#"{"items": []}"#).unwrap();

    let (code, _, stderr) = run(&["import", path.to_str().unwrap()]);
    assert_eq!(code, 1);
    assert!(stderr.contains("content_items"), "stderr: {stderr}");
}

#[test]
fn test_import_missing_file() {
    let (code, _, stderr) = run(&["import", "/nonexistent/seclab.json"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("failed to read"), "stderr: {stderr}");
}

#[test]
fn test_unreachable_server() {
    let (code, _, stderr) = run(&["health"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("request failed"), "stderr: {stderr}");
}
