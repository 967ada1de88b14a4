//! File-driven runs of the harness commands.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use serde_json::{Value, json};
use tempfile::TempDir;
use wbind_harness::util::read_json;
use wbind_harness::{Cli, HarnessError, run};

fn write(dir: &TempDir, name: &str, value: &Value) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
}

fn cli(args: &[&str]) -> Cli {
    let mut argv = vec!["wbind-harness"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap()
}

#[test]
fn replay_runs_from_files() {
    let dir = TempDir::new().unwrap();
    let payload = write(
        &dir,
        "payload.json",
        &json!({"id": "ev", "revision": 1, "data": {"title": "x", "sessions": []}}),
    );
    let script = write(
        &dir,
        "script.json",
        &json!([
            {"op": "set", "path": "title", "value": "y"},
            {"op": "append", "path": "sessions", "value": {"name": "Opening"}},
            {"op": "set_reference", "path": "venue", "id": "v1", "revision": 1}
        ]),
    );
    let store = write(
        &dir,
        "store.json",
        &json!([{"id": "v1", "revision": 1, "data": {"city": "Geneva"}}]),
    );

    run(cli(&[
        "replay",
        "--payload",
        payload.to_str().unwrap(),
        "--script",
        script.to_str().unwrap(),
        "--store",
        store.to_str().unwrap(),
        "--json",
    ]))
    .unwrap();
}

#[test]
fn store_file_must_be_an_array() {
    let dir = TempDir::new().unwrap();
    let payload = write(&dir, "p.json", &json!({"id": "a", "revision": 1, "data": {}}));
    let script = write(&dir, "s.json", &json!([]));
    let store = write(&dir, "store.json", &json!({"id": "b"}));

    let err = run(cli(&[
        "replay",
        "--payload",
        payload.to_str().unwrap(),
        "--script",
        script.to_str().unwrap(),
        "--store",
        store.to_str().unwrap(),
    ]))
    .unwrap_err();
    assert!(matches!(err, HarnessError::InvalidArgument { .. }));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn missing_file_is_io_error_naming_path() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.json");
    let err = read_json(&missing).unwrap_err();
    assert!(matches!(err, HarnessError::Io(_)));
    assert!(err.to_string().contains("nope.json"));
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn invalid_json_names_the_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{not json").unwrap();
    let err = run(cli(&["watchize", "--payload", path.to_str().unwrap()])).unwrap_err();
    assert!(matches!(err, HarnessError::Parse { .. }));
    assert!(err.to_string().contains("broken.json"));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn watchize_runs_from_file() {
    let dir = TempDir::new().unwrap();
    let payload = write(&dir, "doc.json", &json!([1, {"a": "b"}]));
    run(cli(&["watchize", "--payload", payload.to_str().unwrap()])).unwrap();
}
