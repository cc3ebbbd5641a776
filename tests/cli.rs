// SPDX-License-Identifier: MIT OR Apache-2.0

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const HASH_CONFIG: &str = "[embeddings]\nprovider = \"hash\"\ndimension = 128\n";

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, content).expect("write file");
}

fn workspace() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    write_file(&dir.path().join(".stmtragrc.toml"), HASH_CONFIG);
    write_file(
        &dir.path().join("statements/jan.txt"),
        "Opening balance for January 1,200.00\x0cGrocery store purchase 54.20 card payment\x0c",
    );
    write_file(
        &dir.path().join("statements/feb.txt"),
        "Closing balance February total 980.15\x0cSalary credit from employer 2,500.00",
    );
    dir
}

fn stmtrag(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("stmtrag"));
    cmd.current_dir(dir).env("NO_COLOR", "1");
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    let stdout = String::from_utf8(output.stdout.clone()).expect("utf8");
    serde_json::from_str(&stdout).expect("json")
}

fn info(dir: &Path, index: &str) -> Value {
    let assert = stmtrag(dir)
        .args(["--format", "json", "info", "--index", index])
        .assert()
        .success();
    stdout_json(assert.get_output())
}

#[test]
fn build_then_query_returns_best_passage() {
    let dir = workspace();

    stmtrag(dir.path())
        .args(["build", "statements"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Indexed 4 passages from 4 pages"));

    stmtrag(dir.path())
        .args(["query", "closing balance february", "-k", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("feb.txt page 1 chunk 0"))
        .stdout(predicate::str::contains("Closing balance February total 980.15"));
}

#[test]
fn query_json_carries_generation_context() {
    let dir = workspace();
    stmtrag(dir.path()).args(["build", "statements"]).assert().success();

    let assert = stmtrag(dir.path())
        .args(["--format", "json", "query", "salary credit", "-k", "2"])
        .assert()
        .success();
    let json = stdout_json(assert.get_output());

    assert_eq!(json["context"]["query"], "salary credit");
    let passages = json["context"]["passages"].as_array().expect("passages");
    assert_eq!(passages.len(), 2);
    assert_eq!(
        passages[0],
        "(source:feb.txt page:2 chunk:0)\nSalary credit from employer 2,500.00"
    );
    let hits = json["hits"].as_array().expect("hits");
    assert!(hits[0]["score"].as_f64().unwrap() >= hits[1]["score"].as_f64().unwrap());
}

#[test]
fn info_reports_index_metadata() {
    let dir = workspace();
    stmtrag(dir.path()).args(["build", "statements"]).assert().success();

    let json = info(dir.path(), ".stmtrag");
    assert_eq!(json["passages"], 4);
    assert_eq!(json["dimension"], 128);
    assert_eq!(json["model"], "blake3-hash-128");
    assert_eq!(json["generation"], 1);
}

#[test]
fn query_without_index_fails_with_hint() {
    let dir = workspace();
    stmtrag(dir.path())
        .args(["query", "balance"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No index found"));
}

#[test]
fn blank_pages_are_reported_for_ocr() {
    let dir = workspace();
    write_file(
        &dir.path().join("scans/mar.txt"),
        "Interest paid in March\x0c   \n\x0c",
    );

    stmtrag(dir.path())
        .args(["build", "scans"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mar.txt page 2 has no text and needs OCR"));
}

#[test]
fn append_adds_a_generation() {
    let dir = workspace();
    write_file(&dir.path().join("more/mar.txt"), "Overdraft fee charged in March");

    stmtrag(dir.path()).args(["build", "statements"]).assert().success();
    stmtrag(dir.path())
        .args(["build", "more", "--append"])
        .assert()
        .success();

    let json = info(dir.path(), ".stmtrag");
    assert_eq!(json["passages"], 5);
    assert_eq!(json["generation"], 2);

    stmtrag(dir.path())
        .args(["query", "overdraft fee", "-k", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mar.txt"));
}

#[test]
fn build_from_subdirectory_extends_parent_index() {
    let dir = workspace();
    write_file(&dir.path().join("more/mar.txt"), "Overdraft fee charged in March");
    // The subdirectory has no .stmtragrc.toml, so point the user config at the hash provider.
    write_file(
        &dir.path().join("home/.config/stmtrag/config.toml"),
        HASH_CONFIG,
    );

    stmtrag(dir.path()).args(["build", "statements"]).assert().success();
    stmtrag(&dir.path().join("more"))
        .env("HOME", dir.path().join("home"))
        .args(["build", "mar.txt", "--append"])
        .assert()
        .success();

    assert!(!dir.path().join("more/.stmtrag").exists());
    let json = info(dir.path(), ".stmtrag");
    assert_eq!(json["passages"], 5);
    assert_eq!(json["generation"], 2);
}

#[test]
fn failed_append_keeps_previous_generation() {
    let dir = workspace();
    stmtrag(dir.path()).args(["build", "statements"]).assert().success();

    stmtrag(dir.path())
        .args(["build", "statements/jan.txt", "--append"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Duplicate passage"));

    let json = info(dir.path(), ".stmtrag");
    assert_eq!(json["passages"], 4);
    assert_eq!(json["generation"], 1);
}

#[test]
fn rebuild_without_append_replaces_contents() {
    let dir = workspace();
    stmtrag(dir.path()).args(["build", "statements"]).assert().success();
    stmtrag(dir.path())
        .args(["build", "statements/feb.txt"])
        .assert()
        .success();

    let json = info(dir.path(), ".stmtrag");
    assert_eq!(json["passages"], 2);
    assert_eq!(json["generation"], 2);
}

#[test]
fn merge_concatenates_left_then_right() {
    let dir = workspace();
    stmtrag(dir.path())
        .args(["build", "statements/jan.txt", "--index", "left"])
        .assert()
        .success();
    stmtrag(dir.path())
        .args(["build", "statements/feb.txt", "--index", "right"])
        .assert()
        .success();

    stmtrag(dir.path())
        .args(["merge", "left", "right", "--out", "merged"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Merged 2 + 2 passages"));

    assert_eq!(info(dir.path(), "merged")["passages"], 4);

    let assert = stmtrag(dir.path())
        .args(["--format", "json", "query", "employer salary", "--index", "merged", "-k", "1"])
        .assert()
        .success();
    let json = stdout_json(assert.get_output());
    assert_eq!(json["hits"][0]["id"], 3);
    assert_eq!(json["hits"][0]["source"], "feb.txt");
}

#[test]
fn merge_rejects_different_models() {
    let dir = workspace();
    stmtrag(dir.path())
        .args(["build", "statements/jan.txt", "--index", "left"])
        .assert()
        .success();

    let other = TempDir::new().expect("tempdir");
    write_file(
        &other.path().join(".stmtragrc.toml"),
        "[embeddings]\nprovider = \"hash\"\ndimension = 32\n",
    );
    let right = other.path().join("right");
    stmtrag(other.path())
        .args(["build"])
        .arg(dir.path().join("statements/feb.txt"))
        .arg("--index")
        .arg(&right)
        .assert()
        .success();

    stmtrag(dir.path())
        .args(["merge", "left"])
        .arg(&right)
        .args(["--out", "merged"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("mismatch"));
    assert!(!dir.path().join("merged").exists());
}

#[test]
fn invalid_overlap_is_rejected() {
    let dir = workspace();
    stmtrag(dir.path())
        .args(["build", "statements", "--chunk-size", "100", "--overlap", "100"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
    assert!(!dir.path().join(".stmtrag").exists());
}

#[test]
fn interactive_query_reads_until_quit() {
    let dir = workspace();
    stmtrag(dir.path()).args(["build", "statements"]).assert().success();

    let assert = stmtrag(dir.path())
        .args(["--format", "json", "query", "-k", "1"])
        .write_stdin("grocery purchase\n\nopening balance\nquit\nsalary\n")
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    let answers: Vec<Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();

    assert_eq!(answers.len(), 2);
    assert_eq!(answers[0]["context"]["query"], "grocery purchase");
    assert_eq!(answers[0]["hits"][0]["source"], "jan.txt");
    assert_eq!(answers[0]["hits"][0]["page_no"], 2);
    assert_eq!(answers[1]["context"]["query"], "opening balance");
}

#[test]
fn completions_are_generated() {
    let dir = TempDir::new().expect("tempdir");
    stmtrag(dir.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("stmtrag"));
}
