//! End-to-end tests for the `wf` binary

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let wildcards = dir.path().join("wildcards");
        let templates = dir.path().join("templates");
        fs::create_dir(&wildcards).unwrap();
        fs::create_dir(&templates).unwrap();

        fs::write(wildcards.join("animal.txt"), "cat\ndog\n").unwrap();
        fs::write(
            wildcards.join("hat.json"),
            r#"{
                "description": "Headwear",
                "choices": [
                    {"value": "straw hat", "weight": 2, "requires": {"animal": "dog"}, "includes": ["ribbon"]},
                    "beanie"
                ]
            }"#,
        )
        .unwrap();
        fs::write(wildcards.join("ribbon.json"), r#"{"choices": ["with a red ribbon"]}"#).unwrap();
        fs::write(wildcards.join("unused.txt"), "nothing\n").unwrap();
        fs::write(templates.join("portrait.txt"), "a __animal__ wearing a __hat__").unwrap();

        fs::write(
            dir.path().join("wildforge.yml"),
            format!(
                "wildcards:\n  paths:\n    - {}\ntemplates:\n  dir: {}\n",
                wildcards.display(),
                templates.display()
            ),
        )
        .unwrap();

        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn wildcard(&self, file: &str) -> PathBuf {
        self.path().join("wildcards").join(file)
    }

    fn wf(&self) -> Command {
        let mut cmd = Command::cargo_bin("wf").expect("wf binary");
        cmd.current_dir(self.path())
            .env("NO_COLOR", "1")
            .arg("--config")
            .arg(self.path().join("wildforge.yml"));
        cmd
    }
}

#[test]
fn test_expand_is_reproducible() {
    let ws = Workspace::new();
    let first = ws
        .wf()
        .args(["expand", "a __animal__ wearing a __hat__", "--seed", "42"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    ws.wf()
        .args(["expand", "a __animal__ wearing a __hat__", "--seed", "42"])
        .assert()
        .success()
        .stdout(first);
}

#[test]
fn test_expand_missing_wildcard_warns() {
    let ws = Workspace::new();
    ws.wf()
        .args(["expand", "a __nonexistent__ thing", "--seed", "0"])
        .assert()
        .success()
        .stdout("a __nonexistent__ thing\n")
        .stderr(predicate::str::contains("wildcard 'nonexistent' not found"));
}

#[test]
fn test_expand_prints_random_seed() {
    let ws = Workspace::new();
    ws.wf()
        .args(["expand", "__animal__"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Seed:"));
}

#[test]
fn test_expand_swap_and_includes() {
    let ws = Workspace::new();
    ws.wf()
        .args([
            "expand",
            "a __animal__ wearing a __hat__",
            "--seed",
            "1",
            "--swap",
            "animal=dog",
            "--swap",
            "hat=straw hat",
        ])
        .assert()
        .success()
        .stdout("a dog wearing a straw hat with a red ribbon\n");
}

#[test]
fn test_expand_json_and_context_reroll() {
    let ws = Workspace::new();
    let context = ws.path().join("ctx.json");

    let output = ws
        .wf()
        .args(["expand", "a __animal__ wearing a __hat__", "--seed", "5", "--format", "json"])
        .arg("--save-context")
        .arg(&context)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let parsed: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let first = &parsed[0];
    assert_eq!(first["seed"], 5);
    assert!(first["segments"].as_array().unwrap().len() >= 4);
    let animal = first["context"]["resolved"]["animal"]["value"].as_str().unwrap().to_string();

    // Rerolling the hat keeps the animal from the saved context
    ws.wf()
        .args(["expand", "a __animal__ wearing a __hat__", "--seed", "6", "--reroll", "hat", "--reroll-seed", "3"])
        .arg("--context")
        .arg(&context)
        .assert()
        .success()
        .stdout(predicate::str::starts_with(format!("a {} wearing a ", animal)));
}

#[test]
fn test_expand_from_file_with_count() {
    let ws = Workspace::new();
    let output = ws
        .wf()
        .args(["expand", "--file", "templates/portrait.txt", "--seed", "10", "--count", "3"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).unwrap();
    assert_eq!(text.lines().count(), 3);
    assert!(text.lines().all(|l| l.starts_with("a ")));
}

#[test]
fn test_expand_cycle_fails() {
    let ws = Workspace::new();
    fs::write(ws.wildcard("a.json"), r#"{"choices": [{"value": "alpha", "includes": ["b"]}]}"#).unwrap();
    fs::write(ws.wildcard("b.json"), r#"{"choices": [{"value": "beta", "includes": "[a]"}]}"#).unwrap();
    ws.wf()
        .args(["expand", "__a__", "--seed", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Circular include detected: a -> b -> a"));
}

#[test]
fn test_list_flags_broken() {
    let ws = Workspace::new();
    fs::write(ws.wildcard("coat.json"), "{\"choices\": [").unwrap();
    ws.wf()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("hat  Headwear"))
        .stdout(predicate::str::contains("coat  (broken)"));
}

#[test]
fn test_show_definition() {
    let ws = Workspace::new();
    ws.wf()
        .args(["show", "hat"])
        .assert()
        .success()
        .stdout(predicate::str::contains("straw hat  weight=2"))
        .stdout(predicate::str::contains("requires animal in {dog}"))
        .stdout(predicate::str::contains("includes [ribbon]"));

    ws.wf().args(["show", "nope"]).assert().failure();
}

#[test]
fn test_options_use_context() {
    let ws = Workspace::new();
    let context = ws.path().join("cat.json");
    fs::write(&context, r#"{"seed": 1, "resolved": {"animal": {"value": "cat"}}}"#).unwrap();

    ws.wf()
        .args(["options", "hat", "--context"])
        .arg(&context)
        .assert()
        .success()
        .stdout("beanie\n");
}

#[test]
fn test_graph_formats() {
    let ws = Workspace::new();
    ws.wf()
        .args(["graph"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-> animal (requires)"))
        .stdout(predicate::str::contains("<- hat"));

    ws.wf()
        .args(["graph", "--format", "dot"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"hat\" -> \"ribbon\" [style=solid];"));

    let output = ws
        .wf()
        .args(["graph", "--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let parsed: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(parsed["edges"]["hat"]["animal"], "requires");
}

#[test]
fn test_check_all_and_candidate() {
    let ws = Workspace::new();
    ws.wf()
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("No issues found"));

    let candidate = ws.path().join("ribbon.json");
    fs::write(
        &candidate,
        r#"{"choices": [{"value": "bow", "requires": {"hat": "straw hat"}, "includes": ["hat"]}]}"#,
    )
    .unwrap();
    ws.wf()
        .args(["check", "ribbon", "--candidate"])
        .arg(&candidate)
        .assert()
        .failure()
        .stdout(predicate::str::contains("dependency cycle"));
}

#[test]
fn test_used_and_unused() {
    let ws = Workspace::new();
    ws.wf()
        .arg("used")
        .assert()
        .success()
        .stdout(predicate::str::contains("Used (3)"))
        .stdout(predicate::str::contains("ribbon"))
        .stdout(predicate::str::contains("Unused (1)"))
        .stdout(predicate::str::contains("unused"));
}

#[test]
fn test_missing_wildcard_directory_fails() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("wildforge.yml");
    fs::write(&config, "wildcards:\n  paths:\n    - /nonexistent/wildcards\n").unwrap();
    Command::cargo_bin("wf")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No wildcard directory found"));
}
