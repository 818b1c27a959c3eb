use std::process::{Command, Output};

fn sift(dir: &std::path::Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sift"))
        .args(args)
        .current_dir(dir)
        .env_remove("SIFT_LOG")
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn search_before_indexing_reports_not_ready_without_creating_an_index() {
    let dir = tempfile::tempdir().unwrap();

    let output = sift(dir.path(), &["search", "parse config", "--format", "json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["indexReady"], false);
    assert_eq!(json["query"], "parse config");
    assert_eq!(json["results"].as_array().unwrap().len(), 0);
    assert!(!dir.path().join(".sift").exists());
}

#[test]
fn stats_and_clear_without_an_index() {
    let dir = tempfile::tempdir().unwrap();

    let stats = sift(dir.path(), &["stats", "--format", "json"]);
    assert!(stats.status.success());
    let json: serde_json::Value = serde_json::from_slice(&stats.stdout).unwrap();
    assert_eq!(json["indexed"], false);

    let clear = sift(dir.path(), &["clear"]);
    assert!(clear.status.success());
    assert!(String::from_utf8_lossy(&clear.stdout).contains("No index"));
}

#[test]
fn index_fails_fast_when_the_provider_is_unreachable() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(".sift.toml"),
        "[embedding]\nbase_url = \"http://127.0.0.1:9\"\nconnect_timeout_secs = 1\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("lib.rs"), "fn answer() -> u32 {\n    42\n}\n").unwrap();

    let output = sift(dir.path(), &["index"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unavailable"), "unexpected stderr: {stderr}");
}

#[test]
fn unknown_provider_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".sift.toml"), "[embedding]\nprovider = \"carrier-pigeon\"\n").unwrap();

    let output = sift(dir.path(), &["search", "anything"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("configuration error"));
}
