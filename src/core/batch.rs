//! Purpose: Decode every exported definition file found directly in a source directory.
//! Exports: `ItemOutcome`, `BatchReport`, `item_dir_name`, `decode_directory`.
//! Role: Decode-stage driver; produces numbered item directories and the mapping ledger.
//! Invariants: Items are numbered 1.. in directory-listing order as `item_NNN`.
//! Invariants: A source file is deleted only after its item decoded and was mapped.
//! Invariants: Per-file failures are recorded and the batch continues.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::core::definition::{DefinitionReport, decode_definition_file};
use crate::core::error::{Error, ErrorKind};
use crate::core::identity::parse_source_filename;
use crate::core::mapping::{MAPPING_FILE, MappingEntry, append_entry};

pub const ITEM_DIR_PREFIX: &str = "item_";

#[derive(Debug)]
pub struct ItemOutcome {
    pub index: usize,
    pub item_dir_name: String,
    pub source_filename: String,
    pub result: Result<DefinitionReport, Error>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub source_dir: PathBuf,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub details: Vec<ItemOutcome>,
}

impl BatchReport {
    /// True when at least one file decoded.
    pub fn is_success(&self) -> bool {
        self.succeeded > 0
    }

    pub fn mapping_file(&self) -> PathBuf {
        self.source_dir.join(MAPPING_FILE)
    }
}

pub fn item_dir_name(index: usize) -> String {
    format!("{ITEM_DIR_PREFIX}{index:03}")
}

fn list_source_files(source_dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let entries = fs::read_dir(source_dir)
        .map_err(|err| Error::io(err, "failed to read source directory").with_path(source_dir))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| {
            Error::io(err, "failed to read source directory entry").with_path(source_dir)
        })?;
        let path = entry.path();
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        if is_json && path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

/// Decode every `*.json` file directly inside `source_dir`.
///
/// Fails only when `source_dir` is missing or unreadable; an empty directory returns a
/// report whose `is_success()` is false.
pub fn decode_directory(source_dir: &Path) -> Result<BatchReport, Error> {
    if !source_dir.is_dir() {
        return Err(Error::new(ErrorKind::NotFound)
            .with_message("source directory not found")
            .with_path(source_dir)
            .with_hint("Pass the directory holding the exported WS__*.json files."));
    }

    let files = list_source_files(source_dir)?;
    let mut report = BatchReport {
        source_dir: source_dir.to_path_buf(),
        ..BatchReport::default()
    };
    info!(source = %source_dir.display(), files = files.len(), "decoding dataflow definitions");
    if files.is_empty() {
        warn!(source = %source_dir.display(), "no json files found");
        return Ok(report);
    }

    let mapping_file = report.mapping_file();
    let total = files.len();
    for (offset, file) in files.into_iter().enumerate() {
        let index = offset + 1;
        let item_dir_name = item_dir_name(index);
        let source_filename = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!(index, total, file = %source_filename, "processing");

        let output_dir = source_dir.join(&item_dir_name);
        let result = decode_one(&file, &output_dir, &item_dir_name, &source_filename, &mapping_file);
        report.processed += 1;
        match &result {
            Ok(definition) => {
                report.succeeded += 1;
                info!(
                    item = %item_dir_name,
                    parts = definition.parts_total,
                    failed_parts = definition.failed.len(),
                    "decoded"
                );
            }
            Err(err) => {
                report.failed += 1;
                error!(file = %source_filename, error = %err, "failed to decode item");
            }
        }
        report.details.push(ItemOutcome {
            index,
            item_dir_name,
            source_filename,
            result,
        });
    }

    info!(
        succeeded = report.succeeded,
        failed = report.failed,
        mapping = %mapping_file.display(),
        "batch decode complete"
    );
    Ok(report)
}

fn decode_one(
    file: &Path,
    output_dir: &Path,
    item_dir_name: &str,
    source_filename: &str,
    mapping_file: &Path,
) -> Result<DefinitionReport, Error> {
    let (_, definition) = decode_definition_file(file, output_dir)?;
    let entry = MappingEntry {
        item_dir_name: item_dir_name.to_string(),
        identity: parse_source_filename(source_filename).parsed(),
        source_filename: source_filename.to_string(),
    };
    append_entry(mapping_file, &entry)?;
    fs::remove_file(file)
        .map_err(|err| Error::io(err, "failed to remove decoded source file").with_path(file))?;
    Ok(definition)
}
