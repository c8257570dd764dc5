//! Purpose: Render run summaries and errors for the CLI, as JSON or human text.
//! Exports: `summary_json`, `summary_text`, `emit_summary`, `error_json`.
//! Role: Keep stdout/stderr envelope shapes in one place.
//! Invariants: Stable key names for the JSON summary; stage blocks appear only when run.

use std::path::Path;

use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::command_dispatch::WorkflowSummary;
use dataflow_pqt::api::{BatchReport, ConvertReport, Error};

const RULE: &str = "======================================================================";

pub(crate) fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(err.kind().label()));
    inner.insert(
        "message".to_string(),
        json!(err.message().unwrap_or(err.kind().label())),
    );
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(source) = std::error::Error::source(err) {
        inner.insert("cause".to_string(), json!(source.to_string()));
    }
    json!({ "error": Value::Object(inner) })
}

fn path_json(path: &Path) -> Value {
    json!(path.display().to_string())
}

fn decode_json(report: &BatchReport) -> Value {
    let items = report
        .details
        .iter()
        .map(|item| {
            let mut map = Map::new();
            map.insert("item".to_string(), json!(item.item_dir_name));
            map.insert("file".to_string(), json!(item.source_filename));
            match &item.result {
                Ok(definition) => {
                    map.insert("status".to_string(), json!("ok"));
                    map.insert("parts".to_string(), json!(definition.parts_total));
                    map.insert("decoded_parts".to_string(), json!(definition.decoded));
                    map.insert("failed_parts".to_string(), json!(definition.failed.len()));
                }
                Err(err) => {
                    map.insert("status".to_string(), json!("failed"));
                    map.insert("error".to_string(), json!(err.to_string()));
                }
            }
            Value::Object(map)
        })
        .collect::<Vec<_>>();
    json!({
        "processed": report.processed,
        "succeeded": report.succeeded,
        "failed": report.failed,
        "mapping_file": path_json(&report.mapping_file()),
        "items": items,
    })
}

fn convert_json(report: &ConvertReport) -> Value {
    let errors = report
        .item_errors
        .iter()
        .map(|(item, err)| json!({ "item": item, "error": err.to_string() }))
        .collect::<Vec<_>>();
    let partition_errors = report
        .partition_errors
        .iter()
        .map(|err| json!(err.to_string()))
        .collect::<Vec<_>>();
    json!({
        "output_dir": path_json(&report.output_dir),
        "with_dataflows_dir": path_json(&report.with_dataflows_dir()),
        "in_place": report.in_place,
        "candidates": report.candidates.len(),
        "structures_created": report.structures_created,
        "archives_created": report.archives_created,
        "moved": report.moved,
        "failed_moves": report.failed_moves,
        "remaining": report.remaining,
        "errors": errors,
        "partition_errors": partition_errors,
    })
}

pub(crate) fn summary_json(summary: &WorkflowSummary) -> Value {
    let mut map = Map::new();
    map.insert("mode".to_string(), json!(summary.mode.label()));
    map.insert("source".to_string(), path_json(&summary.source));
    if let Some(output) = &summary.output {
        map.insert("output".to_string(), path_json(output));
    }
    if let Some(time) = summary_time_now() {
        map.insert("time".to_string(), json!(time));
    }
    if let Some(decode) = &summary.decode {
        map.insert("decode".to_string(), decode_json(decode));
    }
    if let Some(convert) = &summary.convert {
        map.insert("convert".to_string(), convert_json(convert));
    }
    map.insert("success".to_string(), json!(summary.is_success()));
    Value::Object(map)
}

pub(crate) fn summary_text(summary: &WorkflowSummary) -> String {
    let mut lines = vec![RULE.to_string(), "WORKFLOW SUMMARY".to_string(), RULE.to_string()];
    lines.push(format!("Operation: {}", summary.mode.description()));
    lines.push(format!("Source directory: {}", summary.source.display()));
    if let Some(output) = &summary.output {
        lines.push(format!("Output directory: {}", output.display()));
    }
    if let Some(decode) = &summary.decode {
        lines.push(String::new());
        lines.push("Decode".to_string());
        lines.push(format!("  Successful: {}", decode.succeeded));
        lines.push(format!("  Failed: {}", decode.failed));
        lines.push(format!("  Mapping: {}", decode.mapping_file().display()));
    }
    if summary.stopped_after_decode {
        lines.push("  Workflow stopped before conversion".to_string());
    }
    if let Some(convert) = &summary.convert {
        let total = convert.candidates.len();
        lines.push(String::new());
        lines.push("Convert".to_string());
        lines.push(format!("  Dataflow items: {total}"));
        lines.push(format!(
            "  Template structures created: {}/{total}",
            convert.structures_created
        ));
        lines.push(format!(
            "  .pqt archives created: {}/{total}",
            convert.archives_created
        ));
        lines.push(format!(
            "  Moved to {}: {}",
            convert.with_dataflows_dir().display(),
            convert.moved.len()
        ));
        if !convert.failed_moves.is_empty() {
            lines.push(format!("  Failed moves: {}", convert.failed_moves.join(", ")));
        }
        lines.push(format!("  Items left in output directory: {}", convert.remaining.len()));
        for err in &convert.partition_errors {
            lines.push(format!("  Partition error: {err}"));
        }
    }
    lines.push(String::new());
    if summary.is_success() {
        lines.push("All operations completed successfully".to_string());
    } else {
        lines.push("Some operations failed".to_string());
    }
    lines.join("\n")
}

pub(crate) fn emit_summary(summary: &WorkflowSummary, as_json: bool) {
    if as_json {
        let value = summary_json(summary);
        let text = serde_json::to_string(&value).unwrap_or_else(|_| "{}".to_string());
        println!("{text}");
    } else {
        println!("{}", summary_text(summary));
    }
}

fn summary_time_now() -> Option<String> {
    OffsetDateTime::now_utc().format(&Rfc3339).ok()
}

#[cfg(test)]
mod tests {
    use super::{error_json, summary_json, summary_text};
    use crate::command_dispatch::{Mode, WorkflowSummary};
    use dataflow_pqt::api::{BatchReport, Error, ErrorKind};
    use std::path::PathBuf;

    fn summary(decode: Option<BatchReport>) -> WorkflowSummary {
        WorkflowSummary {
            mode: Mode::Decode,
            source: PathBuf::from("/data/ws"),
            output: None,
            decode,
            convert: None,
            stopped_after_decode: false,
        }
    }

    #[test]
    fn error_json_has_kind_message_and_path() {
        let err = Error::new(ErrorKind::NotFound)
            .with_message("source directory does not exist")
            .with_path("/missing");
        let value = error_json(&err);
        assert_eq!(value["error"]["kind"], "NotFound");
        assert_eq!(value["error"]["message"], "source directory does not exist");
        assert_eq!(value["error"]["path"], "/missing");
        assert!(value["error"].get("hint").is_none());
    }

    #[test]
    fn summary_json_reports_stage_blocks_only_when_run() {
        let report = BatchReport {
            source_dir: PathBuf::from("/data/ws"),
            processed: 2,
            succeeded: 2,
            ..BatchReport::default()
        };
        let value = summary_json(&summary(Some(report)));
        assert_eq!(value["mode"], "decode");
        assert_eq!(value["decode"]["succeeded"], 2);
        assert!(value.get("convert").is_none());
        assert_eq!(value["success"], true);
        assert!(value["time"].is_string());
    }

    #[test]
    fn summary_text_flags_failures() {
        let text = summary_text(&summary(Some(BatchReport::default())));
        assert!(text.contains("Operation: Decode only"));
        assert!(text.ends_with("Some operations failed"));
    }
}
