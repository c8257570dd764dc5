// CLI integration tests for the decode/convert workflow and exit codes.
use std::path::Path;
use std::process::Command;

use base64::{Engine as _, engine::general_purpose};
use serde_json::{Value, json};

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_dataflow-pqt");
    Command::new(exe)
}

fn parse_json(output: &[u8]) -> Value {
    let text = std::str::from_utf8(output).expect("utf8");
    serde_json::from_str(text.trim()).expect("valid json")
}

fn seed_export(dir: &Path) {
    let document = json!({
        "definition": {
            "parts": [
                {
                    "path": "mashup.pq",
                    "payload": general_purpose::STANDARD.encode("section Section1;\nshared Sales = 1;"),
                    "payloadType": "InlineBase64"
                },
                {
                    "path": ".platform",
                    "payload": general_purpose::STANDARD.encode(r#"{"config":{"displayName":"Sales"}}"#),
                    "payloadType": "InlineBase64"
                }
            ]
        }
    });
    std::fs::write(
        dir.join("WS__ws__item__Sales__Dataflow.json"),
        document.to_string(),
    )
    .expect("write export");
    std::fs::write(
        dir.join("WS__ws__item2__Notes__Notebook.json"),
        json!({"definition": {"parts": []}}).to_string(),
    )
    .expect("write export");
}

#[test]
fn full_workflow_emits_json_summary() {
    let temp = tempfile::tempdir().expect("tempdir");
    seed_export(temp.path());

    let output = cmd()
        .args(["--all", temp.path().to_str().unwrap(), "--json"])
        .output()
        .expect("run");
    assert!(output.status.success());

    let summary = parse_json(&output.stdout);
    assert_eq!(summary["mode"], "all");
    assert_eq!(summary["success"], true);
    assert_eq!(summary["decode"]["succeeded"], 2);
    assert_eq!(summary["convert"]["candidates"], 1);
    assert_eq!(summary["convert"]["archives_created"], 1);
    assert_eq!(summary["convert"]["remaining"].as_array().unwrap().len(), 1);

    let moved = summary["convert"]["moved"][0].as_str().expect("moved item");
    assert!(
        temp.path()
            .join("with_dataflows")
            .join(moved)
            .join(format!("{moved}.pqt"))
            .is_file()
    );
}

#[test]
fn convert_into_output_directory() {
    let temp = tempfile::tempdir().expect("tempdir");
    let source = temp.path().join("exports");
    std::fs::create_dir_all(&source).expect("mkdir");
    seed_export(&source);

    let decode = cmd()
        .args(["--decode", source.to_str().unwrap()])
        .output()
        .expect("decode");
    assert!(decode.status.success());
    let human = String::from_utf8_lossy(&decode.stdout);
    assert!(human.contains("Operation: Decode only"));

    let out = temp.path().join("out");
    let convert = cmd()
        .args([
            "--convert",
            source.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
            "--json",
        ])
        .output()
        .expect("convert");
    assert!(convert.status.success());
    let summary = parse_json(&convert.stdout);
    assert_eq!(summary["convert"]["in_place"], false);
    assert!(out.join("with_dataflows").join("item_mapping.txt").is_file());
}

#[test]
fn missing_source_exit_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let missing = temp.path().join("missing");

    let output = cmd()
        .args(["--decode", missing.to_str().unwrap()])
        .output()
        .expect("run");
    assert_eq!(output.status.code().unwrap(), 3);
    let err = parse_json(&output.stderr);
    assert_eq!(err["error"]["kind"], "NotFound");
}

#[test]
fn usage_exit_code() {
    let temp = tempfile::tempdir().expect("tempdir");

    let both = cmd()
        .args(["--decode", "--convert", temp.path().to_str().unwrap()])
        .output()
        .expect("run");
    assert_eq!(both.status.code().unwrap(), 2);

    let neither = cmd()
        .args([temp.path().to_str().unwrap()])
        .output()
        .expect("run");
    assert_eq!(neither.status.code().unwrap(), 2);

    let bad_delay = cmd()
        .args([
            "--convert",
            temp.path().to_str().unwrap(),
            "--move-retry-delay",
            "soon",
        ])
        .output()
        .expect("run");
    assert_eq!(bad_delay.status.code().unwrap(), 2);
}

#[test]
fn failed_decode_stops_full_workflow() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = cmd()
        .args(["--all", temp.path().to_str().unwrap(), "--json"])
        .output()
        .expect("run");
    assert_eq!(output.status.code().unwrap(), 1);
    let summary = parse_json(&output.stdout);
    assert_eq!(summary["success"], false);
    assert_eq!(summary["decode"]["processed"], 0);
    assert!(summary.get("convert").is_none());
    assert!(!temp.path().join("with_dataflows").exists());
}
