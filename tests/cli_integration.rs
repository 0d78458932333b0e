//! CLI Integration Tests
//!
//! Tests the command-line interface end-to-end.

use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;

const PROMO_TEMPLATE: &str = r"
name: Promo campaign
tasks:
  - name: 画像A
    stage: 1
    parallel: true
    duration_minutes: 10
    jobs:
      - t2i-fal-imagen4-ultra で画像Aを作る
  - name: 画像B
    stage: 1
    parallel: true
    jobs:
      - 画像Bを作る
  - name: 画像C
    stage: 1
    parallel: true
    jobs:
      - 画像Cを作る
  - name: 動画A
    stage: 2
    parallel: true
    depends_on: [画像A]
    jobs:
      - 動画Aを作る
  - name: 動画B
    stage: 2
    parallel: true
    jobs:
      - 動画Bを作る
";

const HEREDOC_WORKFLOW: &str = r"name: notes
on:
  workflow_dispatch:
jobs:
  write:
    runs-on: ubuntu-latest
    steps:
      - name: Write notes
        run: |
          cat > file.txt << EOF
          hello
          EOF
";

const CLEAN_WORKFLOW: &str = r"name: ok
on:
  workflow_dispatch:
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - run: echo ok
";

/// Get the binary to test, isolated from the caller's config and environment.
fn mediaflow(dir: &assert_fs::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("mediaflow").unwrap();
    cmd.current_dir(dir.path())
        .env("XDG_CONFIG_HOME", dir.path().join(".config"))
        .env_remove("REQUIREMENTS")
        .env_remove("ENHANCED_CONTEXT_FILE")
        .env_remove("CLARITY_SCORE")
        .env_remove("RUST_LOG");
    cmd
}

/// A project with one valid and one broken template in the default location.
fn project() -> assert_fs::TempDir {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("meta/examples/promo.yaml").write_str(PROMO_TEMPLATE).unwrap();
    temp.child("meta/examples/broken.yml").write_str("tasks: [unclosed").unwrap();
    temp.child("meta/examples/notes.txt").write_str("not a template").unwrap();
    temp
}

// ============================================================================
// Help & Version Tests
// ============================================================================

#[test]
fn test_help_flag() {
    let temp = assert_fs::TempDir::new().unwrap();
    mediaflow(&temp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Generate GitHub Actions workflows"));
}

#[test]
fn test_version_flag() {
    let temp = assert_fs::TempDir::new().unwrap();
    mediaflow(&temp)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_missing_subcommand_fails() {
    let temp = assert_fs::TempDir::new().unwrap();
    mediaflow(&temp).assert().failure();
}

// ============================================================================
// Extract Command Tests
// ============================================================================

#[test]
fn test_extract_builds_database() {
    let temp = project();

    mediaflow(&temp)
        .arg("extract")
        .assert()
        .success()
        .stdout(predicate::str::contains("Extracted 5 task nodes from 1 templates"))
        .stdout(predicate::str::contains("text_to_image: 3"))
        .stdout(predicate::str::contains("image_to_video: 2"))
        .stdout(predicate::str::contains("broken.yml"));

    let database = temp.child(".meta/task-nodes.json");
    database.assert(predicate::path::exists());

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(database.path()).unwrap()).unwrap();
    assert_eq!(json["extraction_metadata"]["total_nodes"], 5);
    assert_eq!(json["extraction_metadata"]["keywords_version"], 1);
    assert_eq!(json["task_nodes"].as_object().unwrap().len(), 5);
    assert_eq!(json["capabilities_index"]["text_to_image"].as_array().unwrap().len(), 3);
}

#[test]
fn test_extract_custom_paths() {
    let temp = project();

    mediaflow(&temp)
        .args(["extract", "--templates", "meta/examples", "--output", "cache/nodes.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cache/nodes.json"));

    temp.child("cache/nodes.json").assert(predicate::path::exists());
}

#[test]
fn test_extract_missing_directory_fails() {
    let temp = assert_fs::TempDir::new().unwrap();

    mediaflow(&temp)
        .args(["extract", "--templates", "nowhere"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Template directory not found"));
}

// ============================================================================
// Resolve Command Tests
// ============================================================================

#[test]
fn test_resolve_direct_match() {
    let temp = project();

    mediaflow(&temp)
        .args(["resolve", "-r", "画像生成"])
        .assert()
        .success()
        .stdout(predicate::str::contains("画像生成 -> text_to_image (3 nodes)"))
        .stdout(predicate::str::contains("Total: 3 nodes"));

    // The database is built on first use.
    temp.child(".meta/task-nodes.json").assert(predicate::path::exists());
}

#[test]
fn test_resolve_requirements_from_env_as_json() {
    let temp = project();

    let output = mediaflow(&temp)
        .args(["resolve", "--json"])
        .env("REQUIREMENTS", "画像生成|動画生成")
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["node_ids"].as_array().unwrap().len(), 5);
    assert_eq!(json["matches"][0]["kind"], "direct");
    assert_eq!(json["matches"][1]["capabilities"][0], "image_to_video");
}

#[test]
fn test_resolve_unmatched_is_not_an_error() {
    let temp = project();

    mediaflow(&temp)
        .args(["resolve", "-r", "存在しない機能"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No task nodes matched"));
}

#[test]
fn test_resolve_without_requirements_fails() {
    let temp = project();

    mediaflow(&temp)
        .arg("resolve")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No requirements given"));
}

#[test]
fn test_resolve_rejects_out_of_range_clarity() {
    let temp = project();

    mediaflow(&temp).args(["resolve", "-r", "画像生成", "--clarity", "11"]).assert().failure();
}

// ============================================================================
// Assemble Command Tests
// ============================================================================

#[test]
fn test_assemble_dry_run_prints_workflow() {
    let temp = project();

    mediaflow(&temp)
        .args(["assemble", "-r", "画像生成", "-r", "動画生成", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\non:"))
        .stdout(predicate::str::contains("stage_1_parallel_3"))
        .stdout(predicate::str::contains("stage_2_parallel_2"))
        .stdout(predicate::str::contains("autofix_integration"))
        .stdout(predicate::str::contains("monitor_integration"))
        .stdout(predicate::str::contains("--mcp t2i-fal-imagen4-ultra"));

    temp.child("generated").assert(predicate::path::missing());
}

#[test]
fn test_assemble_writes_and_validates() {
    let temp = project();

    mediaflow(&temp)
        .args(["assemble", "-r", "画像生成", "-r", "動画生成", "--name", "promo flow", "--validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("promo-flow.yml"))
        .stdout(predicate::str::contains("2 stages, 7 jobs"))
        .stdout(predicate::str::contains("is valid"));

    let workflow = temp.child("generated/workflows/staging/promo-flow.yml");
    workflow.assert(predicate::path::exists());
    workflow.assert(predicate::str::contains("<<").not());
}

#[test]
fn test_assemble_dependency_order() {
    let temp = project();

    mediaflow(&temp)
        .args(["assemble", "-r", "画像生成", "-r", "動画生成", "--order", "dependencies"])
        .args(["--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("stage_1_parallel_4"))
        .stdout(predicate::str::contains("stage_2_parallel_1"))
        .stdout(predicate::str::contains("stage_2_parallel_2").not());
}

#[test]
fn test_assemble_unknown_order_fails() {
    let temp = project();

    mediaflow(&temp)
        .args(["assemble", "-r", "画像生成", "--order", "random", "--dry-run"])
        .assert()
        .failure();
}

#[test]
fn test_assemble_without_matches_fails() {
    let temp = project();

    mediaflow(&temp)
        .args(["assemble", "-r", "存在しない機能"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No task nodes matched"));
}

#[test]
fn test_assemble_uses_config_file() {
    let temp = project();
    temp.child(".mediaflow.toml")
        .write_str(
            r#"
[paths]
output_dir = "out"

[emitter]
workflow_name = "from-config"
runner = "self-hosted"
"#,
        )
        .unwrap();

    mediaflow(&temp).args(["assemble", "-r", "画像生成"]).assert().success();

    let workflow = temp.child("out/from-config.yml");
    workflow.assert(predicate::path::exists());
    workflow.assert(predicate::str::contains("runs-on: self-hosted"));
}

// ============================================================================
// Validate Command Tests
// ============================================================================

#[test]
fn test_validate_clean_workflow() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("ok.yml").write_str(CLEAN_WORKFLOW).unwrap();

    mediaflow(&temp)
        .args(["validate", "ok.yml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"));
}

#[test]
fn test_validate_heredoc_fails() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("notes.yml").write_str(HEREDOC_WORKFLOW).unwrap();

    mediaflow(&temp)
        .args(["validate", "notes.yml"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("HEREDOC"));
}

#[test]
fn test_validate_json_and_report() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("notes.yml").write_str(HEREDOC_WORKFLOW).unwrap();

    let output = mediaflow(&temp)
        .args(["validate", "notes.yml", "--json", "--report", "report.json"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["valid"], false);
    assert!(!json["errors"].as_array().unwrap().is_empty());

    temp.child("report.json").assert(predicate::str::contains("\"valid\": false"));
}

#[test]
fn test_validate_fix_repairs_and_backs_up() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("notes.yml").write_str(HEREDOC_WORKFLOW).unwrap();

    mediaflow(&temp)
        .args(["validate", "notes.yml", "--fix"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Converted HEREDOC to echo commands"));

    temp.child("notes.yml.backup").assert(HEREDOC_WORKFLOW);
    temp.child("notes.yml").assert(predicate::str::contains("echo \"hello\" > file.txt"));
}

#[test]
fn test_validate_missing_file_fails() {
    let temp = assert_fs::TempDir::new().unwrap();

    mediaflow(&temp)
        .args(["validate", "missing.yml"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Failed to read file"));
}

// ============================================================================
// Config & Completions Tests
// ============================================================================

#[test]
fn test_config_shows_defaults() {
    let temp = assert_fs::TempDir::new().unwrap();

    mediaflow(&temp)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("[resolver]"))
        .stdout(predicate::str::contains("clarity_threshold = 6"))
        .stdout(predicate::str::contains("order = \"stage\""));
}

#[test]
fn test_config_path() {
    let temp = assert_fs::TempDir::new().unwrap();

    mediaflow(&temp)
        .args(["config", "--path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mediaflow"));
}

#[test]
fn test_invalid_config_file_fails() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("bad.toml").write_str("[resolver]\nclarity_threshold = 42\n").unwrap();

    mediaflow(&temp)
        .args(["--config", "bad.toml", "config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("clarity_threshold"));
}

#[test]
fn test_completions_bash() {
    let temp = assert_fs::TempDir::new().unwrap();

    mediaflow(&temp)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mediaflow"));
}
