//! End-to-end runs of the canvasync binary against a temporary workspace.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

/// Command rooted in `workspace`, with HOME isolated from the real global config
#[allow(deprecated)]
fn canvasync(workspace: &Path) -> Command {
    let mut cmd = Command::cargo_bin("canvasync").expect("Failed to find canvasync binary");
    cmd.env("HOME", workspace)
        .env_remove("RUST_LOG")
        .env_remove("CANVASYNC_CONFIG")
        .env_remove("CANVASYNC_BACKEND")
        .env_remove("CANVASYNC_DB")
        .env_remove("CANVASYNC_REMOTE_URL")
        .arg("--workspace")
        .arg(workspace)
        .arg("--quiet");
    cmd
}

fn json_output(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("stdout is JSON")
}

#[test]
fn test_init_creates_store_and_config() {
    let temp = TempDir::new().unwrap();

    canvasync(temp.path())
        .args(["init", "--config-file"])
        .assert()
        .success();

    assert!(temp.path().join(".canvasync/canvas.db").exists());
    assert!(temp.path().join(".canvasync/config.toml").exists());
}

#[test]
fn test_seed_then_view_far_corner() {
    let temp = TempDir::new().unwrap();
    let project = uuid::Uuid::new_v4().to_string();

    canvasync(temp.path())
        .args(["seed", "--project", &project, "--count", "200", "--extent", "5000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Seeded 200 nodes and 199 edges"));

    let stats = json_output(
        canvasync(temp.path()).args(["stats", "--project", &project, "--json"]),
    );
    assert_eq!(stats["node_records"], 200);
    assert_eq!(stats["edge_records"], 199);
    assert_eq!(stats["snapshot"]["nodes"], 200);

    let view = json_output(canvasync(temp.path()).args([
        "view", "--project", &project, "--x", "-4000", "--y", "-4000", "--zoom", "1", "--json",
    ]));
    assert_eq!(view["report"]["strategy"], "chunked");
    assert_eq!(view["debug"]["is_small_canvas"], false);
    assert_eq!(view["debug"]["total_nodes"], 200);
    assert!(view["debug"]["loaded_nodes"].as_u64().unwrap() > 0);
}

#[test]
fn test_small_project_view_loads_everything() {
    let temp = TempDir::new().unwrap();
    let project = uuid::Uuid::new_v4().to_string();

    canvasync(temp.path())
        .args(["seed", "--project", &project, "--count", "10", "--no-edges"])
        .assert()
        .success();

    let view = json_output(
        canvasync(temp.path()).args(["view", "--project", &project, "--json"]),
    );
    assert_eq!(view["report"]["strategy"], "small_canvas");
    assert_eq!(view["debug"]["is_small_canvas"], true);
    assert_eq!(view["debug"]["loaded_nodes"], 10);
}

#[test]
fn test_export_import_round_trip() {
    let temp = TempDir::new().unwrap();
    let source = uuid::Uuid::new_v4().to_string();
    let target = uuid::Uuid::new_v4().to_string();
    let file = temp.path().join("canvas.json");

    canvasync(temp.path())
        .args(["seed", "--project", &source, "--count", "5"])
        .assert()
        .success();
    canvasync(temp.path())
        .args(["export", "--project", &source, "--out"])
        .arg(&file)
        .assert()
        .success();

    let exported: Value = serde_json::from_str(&std::fs::read_to_string(&file).unwrap()).unwrap();
    assert_eq!(exported["nodes"].as_array().unwrap().len(), 5);
    assert_eq!(exported["edges"].as_array().unwrap().len(), 4);

    canvasync(temp.path())
        .args(["import", "--project", &target])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 5 nodes and 4 edges"));

    let stats = json_output(
        canvasync(temp.path()).args(["stats", "--project", &target, "--json"]),
    );
    assert_eq!(stats["node_records"], 5);
    assert_eq!(stats["edge_records"], 4);
}

#[test]
fn test_import_normalizes_client_ids() {
    let temp = TempDir::new().unwrap();
    let project = uuid::Uuid::new_v4().to_string();
    let file = temp.path().join("client.json");
    std::fs::write(
        &file,
        r#"{
            "nodes": [
                {"id": "task-1", "type": "task", "position": {"x": 0, "y": 0}, "data": {"title": "A"}},
                {"id": "task-2", "type": "task", "position": {"x": 300, "y": 0}, "data": {"title": "B"}}
            ],
            "edges": [{"id": "edge-1", "source": "task-1", "target": "task-2"}],
            "viewport": {"x": 0, "y": 0, "zoom": 1}
        }"#,
    )
    .unwrap();

    canvasync(temp.path())
        .args(["import", "--project", &project])
        .arg(&file)
        .assert()
        .success();

    let exported = json_output(canvasync(temp.path()).args(["export", "--project", &project]));
    let nodes = exported["nodes"].as_array().unwrap();
    let edge = &exported["edges"][0];
    assert!(nodes.iter().all(|n| n["id"].as_str().unwrap().len() == 36));
    assert!(nodes.iter().any(|n| n["id"] == edge["source"]));
    assert!(nodes.iter().any(|n| n["id"] == edge["target"]));
}

#[test]
fn test_config_set_and_get() {
    let temp = TempDir::new().unwrap();

    canvasync(temp.path())
        .args(["config", "set", "loader.max_chunks", "20"])
        .assert()
        .success();

    canvasync(temp.path())
        .args(["config", "get", "loader.max_chunks"])
        .assert()
        .success()
        .stdout(predicate::str::contains("20"));

    canvasync(temp.path())
        .args(["config", "set", "loader.chunk_size", "0"])
        .assert()
        .failure();
}
