//! Purpose: Decode every part of one exported item definition into a directory.
//! Exports: `EncodedDefinition`, `DecodedDefinition`, `DefinitionReport`, `decode_definition_file`.
//! Role: Per-item step of the decode stage, driven by the batch driver.
//! Invariants: Output `parts` has exactly as many entries as the input, in input order.
//! Invariants: Part-level failures never abort the item; only directory/definition I/O does.
//! Invariants: The original source file is copied next to `definition_decoded.json`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::core::error::{Error, ErrorKind};
use crate::core::payload::{DefinitionEntry, PartStatus, PayloadDecoder};

pub const DECODED_DEFINITION_FILE: &str = "definition_decoded.json";

#[derive(Clone, Debug, Default, Deserialize)]
pub struct EncodedDefinition {
    #[serde(default)]
    pub definition: EncodedBody,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct EncodedBody {
    #[serde(default)]
    pub parts: Vec<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DecodedDefinition {
    pub definition: DecodedBody,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DecodedBody {
    pub parts: Vec<DefinitionEntry>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DefinitionReport {
    pub parts_total: usize,
    pub decoded: usize,
    pub passed_through: usize,
    pub failed: Vec<PartStatus>,
}

impl EncodedDefinition {
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path)
            .map_err(|err| Error::io(err, "failed to read definition").with_path(path))?;
        serde_json::from_str(&text).map_err(|err| {
            Error::new(ErrorKind::Decode)
                .with_message("definition is not valid json")
                .with_path(path)
                .with_source(err)
        })
    }

    /// Decode all parts into `output_dir`, returning the rewritten definition.
    pub fn decode_into(&self, output_dir: &Path) -> (DecodedDefinition, DefinitionReport) {
        let decoder = PayloadDecoder::new(output_dir);
        let mut report = DefinitionReport {
            parts_total: self.definition.parts.len(),
            ..DefinitionReport::default()
        };
        let mut parts = Vec::with_capacity(self.definition.parts.len());
        for raw in &self.definition.parts {
            let (entry, status) = decoder.apply(raw);
            match status {
                PartStatus::Decoded => report.decoded += 1,
                PartStatus::PassedThrough => report.passed_through += 1,
                failed @ PartStatus::Failed { .. } => report.failed.push(failed),
            }
            parts.push(entry);
        }
        (
            DecodedDefinition {
                definition: DecodedBody { parts },
            },
            report,
        )
    }
}

impl DecodedDefinition {
    pub fn write_to(&self, output_dir: &Path) -> Result<PathBuf, Error> {
        let target = output_dir.join(DECODED_DEFINITION_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode decoded definition")
                .with_source(err)
        })?;
        fs::write(&target, json)
            .map_err(|err| Error::io(err, "failed to write decoded definition").with_path(&target))?;
        Ok(target)
    }
}

/// Decode `input_file` into `output_dir` (created if absent) and copy the source alongside.
pub fn decode_definition_file(
    input_file: &Path,
    output_dir: &Path,
) -> Result<(DecodedDefinition, DefinitionReport), Error> {
    let encoded = EncodedDefinition::from_file(input_file)?;
    fs::create_dir_all(output_dir)
        .map_err(|err| Error::io(err, "failed to create item directory").with_path(output_dir))?;

    let (decoded, report) = encoded.decode_into(output_dir);
    decoded.write_to(output_dir)?;

    let file_name = input_file.file_name().ok_or_else(|| {
        Error::new(ErrorKind::Usage)
            .with_message("source path has no file name")
            .with_path(input_file)
    })?;
    let copy_target = output_dir.join(file_name);
    fs::copy(input_file, &copy_target)
        .map_err(|err| Error::io(err, "failed to copy source file").with_path(&copy_target))?;

    debug!(
        source = %input_file.display(),
        parts = report.parts_total,
        decoded = report.decoded,
        failed = report.failed.len(),
        "decoded definition"
    );
    Ok((decoded, report))
}
