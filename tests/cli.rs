//! Command line behaviour

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const INDEX: &str = r#"
[[recipe]]
reference = "liba/0.1"

[[recipe]]
reference = "libb/0.1"
requires = ["liba/0.1"]

[[recipe]]
reference = "libc/0.1"
requires = ["liba/0.1"]

[[recipe]]
reference = "app/0.1"
requires = ["libb/0.1", "libc/0.1"]

[[recipe]]
reference = "bad/0.1"
requires = ["libb/0.1", "libd/0.1"]

[[recipe]]
reference = "libd/0.1"
requires = ["liba/0.2"]

[[recipe]]
reference = "liba/0.2"

[[binary]]
reference = "liba/0.1"
"#;

fn setup() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let index = dir.path().join("recipes.toml");
    fs::write(&index, INDEX).unwrap();
    (dir, index)
}

fn pkggraph(index: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("pkggraph").unwrap();
    cmd.arg("--no-color").arg("--index").arg(index);
    cmd
}

#[test]
fn test_info_lists_levels() {
    let (_dir, index) = setup();
    pkggraph(&index)
        .args(["info", "app/0.1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Level 0"))
        .stdout(predicate::str::contains("liba/0.1"))
        .stdout(predicate::str::contains("4 nodes"));
}

#[test]
fn test_info_json() {
    let (_dir, index) = setup();
    let output = pkggraph(&index)
        .args(["info", "app/0.1", "--format", "json", "--build", "missing"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["nodes"].as_array().unwrap().len(), 4);
    assert_eq!(json["stats"]["node_count"], 4);
    assert_eq!(json["nodes"][0]["binary"], "Build");
}

#[test]
fn test_build_order_for_target_json() {
    let (_dir, index) = setup();
    pkggraph(&index)
        .args(["build-order", "app/0.1", "--target", "libc", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("libc/0.1"))
        .stdout(predicate::str::contains("libb/0.1").not());
}

#[test]
fn test_build_plan_with_missing_mode() {
    let (_dir, index) = setup();
    pkggraph(&index)
        .args(["build-plan", "app/0.1", "--build", "missing"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Batch 1"))
        .stdout(predicate::str::contains("3 package(s) to build"));
}

#[test]
fn test_build_plan_without_binaries_fails() {
    let (_dir, index) = setup();
    pkggraph(&index)
        .args(["build-plan", "app/0.1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing prebuilt package"));
}

#[test]
fn test_conflict_shows_hint() {
    let (_dir, index) = setup();
    pkggraph(&index)
        .args(["info", "bad/0.1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Conflict in"))
        .stderr(predicate::str::contains("HINT:"));
}

#[test]
fn test_malformed_reference() {
    let (_dir, index) = setup();
    pkggraph(&index)
        .args(["info", "not-a-reference"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Malformed reference"));
}

#[test]
fn test_profile_enables_allow_missing() {
    let (dir, index) = setup();
    let profile = dir.path().join("profile.toml");
    fs::write(&profile, "[resolver]\nallow_missing = true\n").unwrap();

    pkggraph(&index)
        .arg("--profile")
        .arg(&profile)
        .args(["info", "app/0.1", "zlib/1.0"])
        .assert()
        .success()
        .stderr(predicate::str::contains("zlib/1.0"));
}

#[test]
fn test_missing_index_file() {
    let dir = TempDir::new().unwrap();
    pkggraph(&dir.path().join("absent.toml"))
        .args(["info", "app/0.1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read recipe index"));
}
