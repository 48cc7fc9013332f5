//! Integration tests for the chunkgen CLI
//!
//! Model calls are replayed from `--replay` files so every command runs offline.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const ENV_VARS: &[&str] = &[
    "ENABLE_DATA_COMPRESSION",
    "ENABLE_CHUNKED_OUTPUT",
    "CHUNKGEN_MODEL",
    "MODEL_MAX_INPUT_TOKENS",
    "MODEL_MAX_OUTPUT_TOKENS",
    "TOKEN_SAFE_INPUT_RATIO",
    "TOKEN_SAFE_OUTPUT_RATIO",
    "RUST_LOG",
];

/// Helper to create a chunkgen Command isolated from the caller's environment
fn chunkgen(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("chunkgen");
    cmd.current_dir(dir.path());
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd
}

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

fn write_json(dir: &TempDir, name: &str, value: &Value) -> PathBuf {
    write(dir, name, &serde_json::to_string_pretty(value).unwrap())
}

/// Schema, input and two custom chunks for a small report.
fn report_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(&dir, "schema.json", r#"{"title": "", "findings": [], "plan": ""}"#);
    write_json(
        &dir,
        "input.json",
        &json!({"notes": "61yo male, T2DM, metformin 500mg bid", "hba1c": 7.9}),
    );
    write_json(
        &dir,
        "chunks.json",
        &json!([
            {"name": "header", "fields": ["title"], "max_tokens": 200},
            {"name": "body", "fields": ["findings", "plan"], "max_tokens": 600}
        ]),
    );
    dir
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        let dir = TempDir::new().unwrap();
        chunkgen(&dir).arg("--help").assert().success();
    }

    #[test]
    fn test_version() {
        let dir = TempDir::new().unwrap();
        chunkgen(&dir).arg("--version").assert().success();
    }
}

// =============================================================================
// Capacity and Estimation
// =============================================================================

mod capacity {
    use super::*;

    #[test]
    fn test_capacity_for_known_model() {
        let dir = TempDir::new().unwrap();
        chunkgen(&dir)
            .args(["capacity", "gpt-4"])
            .assert()
            .success()
            .stdout(predicate::str::contains("gpt-4"))
            .stdout(predicate::str::contains("89600"))
            .stdout(predicate::str::contains("3686"));
    }

    #[test]
    fn test_capacity_unknown_model_fails() {
        let dir = TempDir::new().unwrap();
        chunkgen(&dir)
            .args(["capacity", "no-such-model"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown model 'no-such-model'"));
    }

    #[test]
    fn test_capacity_lists_all_models() {
        let dir = TempDir::new().unwrap();
        chunkgen(&dir)
            .arg("capacity")
            .assert()
            .success()
            .stdout(predicate::str::contains("deepseek-chat"))
            .stdout(predicate::str::contains("gemini-3-flash-preview"));
    }

    #[test]
    fn test_capacity_respects_config_override() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "chunkgen.toml",
            "[[models]]\nid = \"local-llama\"\nmax_input_tokens = 10000\nmax_output_tokens = 2000\nsafe_input_ratio = \"50%\"\n",
        );
        chunkgen(&dir)
            .args(["capacity", "local-llama"])
            .assert()
            .success()
            .stdout(predicate::str::contains("5000"))
            .stdout(predicate::str::contains("50%"))
            .stdout(predicate::str::contains("1800"));
    }

    #[test]
    fn test_capacity_respects_env_override() {
        let dir = TempDir::new().unwrap();
        chunkgen(&dir)
            .args(["capacity", "gemini-3-flash-preview"])
            .env("MODEL_MAX_OUTPUT_TOKENS", "1000")
            .assert()
            .success()
            .stdout(predicate::str::contains("900"));
    }

    #[test]
    fn test_estimate_json_and_text() {
        let dir = TempDir::new().unwrap();
        let json_file = write(&dir, "data.json", r#"{"note": "aaaaaaaaaaaaaaaa"}"#);
        chunkgen(&dir)
            .arg("estimate")
            .arg(&json_file)
            .assert()
            .success()
            .stdout(predicate::str::contains("tokens"));

        let text_file = write(&dir, "notes.txt", "plain clinical notes, not JSON");
        chunkgen(&dir)
            .arg("estimate")
            .arg(&text_file)
            .args(["--task-type", "ppt_generation"])
            .assert()
            .success()
            .stdout(predicate::str::contains("predicted output (ppt_generation)"));
    }
}

// =============================================================================
// Planning
// =============================================================================

mod plan {
    use super::*;

    #[test]
    fn test_plan_with_custom_chunks() {
        let dir = report_project();
        chunkgen(&dir)
            .args([
                "plan",
                "--schema",
                "schema.json",
                "--chunks",
                "chunks.json",
                "--model",
                "gpt-4",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("chunked"))
            .stdout(predicate::str::contains("custom"))
            .stdout(predicate::str::contains("header"))
            .stdout(predicate::str::contains("findings, plan"));
    }

    #[test]
    fn test_plan_direct_when_chunking_disabled() {
        let dir = report_project();
        chunkgen(&dir)
            .args(["plan", "--schema", "schema.json", "--chunked", "false"])
            .assert()
            .success()
            .stdout(predicate::str::contains("direct"))
            .stdout(predicate::str::contains("full_document"));
    }

    #[test]
    fn test_plan_forced_by_environment() {
        let dir = report_project();
        chunkgen(&dir)
            .args(["plan", "--schema", "schema.json", "--input", "input.json"])
            .env("ENABLE_CHUNKED_OUTPUT", "true")
            .assert()
            .success()
            .stdout(predicate::str::contains("chunking forced by configuration"))
            .stdout(predicate::str::contains("generic"));
    }

    #[test]
    fn test_plan_rejects_invalid_chunked_mode() {
        let dir = report_project();
        chunkgen(&dir)
            .args(["plan", "--schema", "schema.json", "--chunked", "sometimes"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid chunked output mode"));
    }

    #[test]
    fn test_plan_prose_template_without_fields_fails() {
        let dir = TempDir::new().unwrap();
        write(&dir, "schema.txt", "Write a discharge summary.");
        chunkgen(&dir)
            .args(["plan", "--schema", "schema.txt"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid schema"));
    }
}

// =============================================================================
// Generation
// =============================================================================

mod generate {
    use super::*;

    #[test]
    fn test_generate_chunked_document() {
        let dir = report_project();
        write_json(
            &dir,
            "replay.json",
            &json!([
                r#"{"title": "Diabetes review"}"#,
                r#"{"findings": ["HbA1c 7.9%"], "plan": "continue metformin"}"#
            ]),
        );

        chunkgen(&dir)
            .args([
                "generate",
                "--schema",
                "schema.json",
                "--input",
                "input.json",
                "--chunks",
                "chunks.json",
                "--replay",
                "replay.json",
                "--root-key",
                "report",
                "--output",
                "out.json",
            ])
            .assert()
            .success()
            .stderr(predicate::str::contains("2/2 chunk(s) succeeded"));

        let out: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("out.json")).unwrap()).unwrap();
        assert_eq!(
            out,
            json!({"report": {"title": "Diabetes review", "findings": ["HbA1c 7.9%"], "plan": "continue metformin"}})
        );
    }

    #[test]
    fn test_generate_partial_failure_lists_missing_sections() {
        let dir = report_project();
        write_json(
            &dir,
            "replay.json",
            &json!([r#"{"title": "Diabetes review"}"#, {"error": "model overloaded"}]),
        );

        let output = chunkgen(&dir)
            .args([
                "generate",
                "--schema",
                "schema.json",
                "--input",
                "input.json",
                "--chunks",
                "chunks.json",
                "--replay",
                "replay.json",
                "--report",
            ])
            .assert()
            .success()
            .stderr(predicate::str::contains("Missing sections:"))
            .stderr(predicate::str::contains("body"))
            .get_output()
            .stdout
            .clone();

        let report: Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(report["failed_chunks"], json!(["body"]));
        assert_eq!(report["document"], json!({"title": "Diabetes review"}));
        assert_eq!(report["reports"][1]["error"]["kind"], "model_call");
        assert_eq!(report["chunked"], true);
    }

    #[test]
    fn test_generate_all_chunks_failed() {
        let dir = report_project();
        write_json(&dir, "replay.json", &json!(["not json at all", "{}"]));

        chunkgen(&dir)
            .args([
                "generate",
                "--schema",
                "schema.json",
                "--input",
                "input.json",
                "--chunks",
                "chunks.json",
                "--replay",
                "replay.json",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("All chunks failed"))
            .stderr(predicate::str::contains("header"))
            .stderr(predicate::str::contains("body"));
    }

    #[test]
    fn test_generate_small_task_is_direct() {
        let dir = report_project();
        write_json(
            &dir,
            "replay.json",
            &json!([r#"{"title": "T", "findings": [], "plan": "p"}"#]),
        );

        let output = chunkgen(&dir)
            .args([
                "generate",
                "--schema",
                "schema.json",
                "--input",
                "input.json",
                "--replay",
                "replay.json",
                "--expected-tokens",
                "300",
                "--report",
            ])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let report: Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(report["chunked"], false);
        assert_eq!(report["plan_source"], "direct");
        assert_eq!(report["reports"][0]["name"], "full_document");
    }

    #[test]
    fn test_generate_requires_input() {
        let dir = report_project();
        chunkgen(&dir)
            .args(["generate", "--schema", "schema.json", "--replay", "chunks.json"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("generate requires --input"));
    }

    #[test]
    fn test_generate_unknown_model_fails() {
        let dir = report_project();
        write_json(&dir, "replay.json", &json!([]));
        chunkgen(&dir)
            .args([
                "generate",
                "--schema",
                "schema.json",
                "--input",
                "input.json",
                "--replay",
                "replay.json",
                "--model",
                "mystery-model",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown model 'mystery-model'"));
    }
}

// =============================================================================
// Compression
// =============================================================================

mod compress {
    use super::*;

    #[test]
    fn test_compress_falls_back_to_truncation() {
        let dir = TempDir::new().unwrap();
        let events: Vec<Value> = (0..200)
            .map(|i| json!({"date": format!("2024-01-{:02}", i % 28 + 1), "note": "x".repeat(100)}))
            .collect();
        write_json(&dir, "journey.json", &Value::Array(events));
        write_json(&dir, "replay.json", &json!([{"error": "summarizer offline"}]));

        let output = chunkgen(&dir)
            .args([
                "compress",
                "journey.json",
                "--target",
                "500",
                "--replay",
                "replay.json",
            ])
            .assert()
            .success()
            .stderr(predicate::str::contains("truncated"))
            .get_output()
            .stdout
            .clone();

        let kept: Value = serde_json::from_slice(&output).unwrap();
        let kept = kept.as_array().unwrap();
        assert!(!kept.is_empty());
        assert!(kept.len() < 200);
    }

    #[test]
    fn test_compress_fitting_value_is_unchanged() {
        let dir = TempDir::new().unwrap();
        write(&dir, "small.json", r#"{"a": 1}"#);
        write_json(&dir, "replay.json", &json!([]));

        chunkgen(&dir)
            .args([
                "compress",
                "small.json",
                "--target",
                "100",
                "--replay",
                "replay.json",
                "--output",
                "out.json",
            ])
            .assert()
            .success()
            .stderr(predicate::str::contains("unchanged"));

        let out: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("out.json")).unwrap()).unwrap();
        assert_eq!(out, json!({"a": 1}));
    }
}

// =============================================================================
// Configuration
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_config_init_then_validate() {
        let dir = TempDir::new().unwrap();
        chunkgen(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created chunkgen.toml"));
        assert!(dir.path().join("chunkgen.toml").exists());

        chunkgen(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid."));

        chunkgen(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "chunkgen.toml",
            "[generation]\nauto_detect_margin = 1.5\n\n[model]\ndefault_model = \"ghost\"\n",
        );
        chunkgen(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration warnings:"))
            .stdout(predicate::str::contains("auto_detect_margin"))
            .stdout(predicate::str::contains("ghost"));
    }

    #[test]
    fn test_config_show_effective_values() {
        let dir = TempDir::new().unwrap();
        chunkgen(&dir)
            .args(["config", "show"])
            .env("ENABLE_DATA_COMPRESSION", "true")
            .assert()
            .success()
            .stdout(predicate::str::contains("enable_data_compression = true"))
            .stdout(predicate::str::contains("chunked_output = \"auto\""))
            .stdout(predicate::str::contains("command = \"claude\""));
    }

    #[test]
    fn test_explicit_config_path() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "custom.toml",
            "[generation]\nchunked_output = \"false\"\n",
        );
        chunkgen(&dir)
            .arg("--config")
            .arg(&path)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("chunked_output = \"false\""));
    }

    #[test]
    fn test_malformed_config_fails() {
        let dir = TempDir::new().unwrap();
        write(&dir, "chunkgen.toml", "[generation\n");
        chunkgen(&dir)
            .args(["capacity", "gpt-4"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to parse chunkgen.toml"));
    }
}
