//! Purpose: Build a `.pqt` template bundle for one decoded item directory.
//! Exports: `TemplateAssembler`, `AssemblyOutcome`, document schemas, file-name constants.
//! Role: Convert-stage worker; the workspace converter runs it per candidate item.
//! Invariants: The query script is mandatory; query metadata and platform docs are optional.
//! Invariants: Archive members are flat and come only from the staging directory.
//! Invariants: Failures are reported in `AssemblyOutcome`, never raised past the item.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::core::error::{Error, ErrorKind};

pub const QUERY_SCRIPT_FILE: &str = "mashup.pq";
pub const QUERY_METADATA_FILE: &str = "queryMetadata.json";
pub const PLATFORM_FILE: &str = ".platform";
pub const STAGING_DIR: &str = "pqtzip";
pub const ARCHIVE_EXTENSION: &str = "pqt";

pub const MASHUP_DOCUMENT_MEMBER: &str = "MashupDocument.pq";
pub const MASHUP_METADATA_MEMBER: &str = "MashupMetadata.json";
pub const METADATA_MEMBER: &str = "Metadata.json";
pub const CONTENT_TYPES_MEMBER: &str = "[Content_Types].xml";

pub const TEMPLATE_VERSION: &str = "1.0.0.0";
pub const DEFAULT_DISPLAY_NAME: &str = "Dataflow";

pub const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="json" ContentType="application/json" />
  <Default Extension="pq" ContentType="application/x-ms-m" />
</Types>"#;

/// `queryMetadata.json`: only `queriesMetadata` is read, in document order.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct QueryMetadataDocument {
    #[serde(rename = "queriesMetadata", default)]
    pub queries_metadata: Map<String, Value>,
}

/// One `queriesMetadata` entry. Unrecognized or malformed entries read as all-absent.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct QueryInfo {
    #[serde(rename = "isHidden", default)]
    pub is_hidden: Option<bool>,
}

/// `.platform`: `config.displayName` is optional, defaulting to `Dataflow`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PlatformDocument {
    #[serde(default)]
    pub config: PlatformConfig,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct PlatformConfig {
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MashupMetadata {
    pub version: String,
    pub queries_metadata: Vec<QueryEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_hidden: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateMetadata {
    pub name: String,
    pub description: String,
    pub version: String,
}

impl MashupMetadata {
    pub fn from_query_metadata(document: &QueryMetadataDocument) -> Self {
        let queries_metadata = document
            .queries_metadata
            .iter()
            .map(|(name, info)| {
                let info = serde_json::from_value::<QueryInfo>(info.clone()).unwrap_or_else(|_| {
                    warn!(query = %name, "unrecognized query metadata entry");
                    QueryInfo::default()
                });
                QueryEntry {
                    name: name.clone(),
                    is_hidden: info.is_hidden,
                }
            })
            .collect();
        Self {
            version: TEMPLATE_VERSION.to_string(),
            queries_metadata,
        }
    }
}

impl TemplateMetadata {
    pub fn from_platform(document: &PlatformDocument) -> Self {
        Self {
            name: document
                .config
                .display_name
                .clone()
                .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string()),
            description: String::new(),
            version: TEMPLATE_VERSION.to_string(),
        }
    }
}

/// Per-item result; structure and archive can diverge when archiving fails late.
#[derive(Debug, Default)]
pub struct AssemblyOutcome {
    pub structure_created: bool,
    pub archive: Option<PathBuf>,
    pub error: Option<Error>,
}

impl AssemblyOutcome {
    pub fn archive_created(&self) -> bool {
        self.archive.is_some()
    }
}

pub struct TemplateAssembler<'a> {
    item_dir: &'a Path,
}

impl<'a> TemplateAssembler<'a> {
    pub fn new(item_dir: &'a Path) -> Self {
        Self { item_dir }
    }

    pub fn is_candidate(item_dir: &Path) -> bool {
        item_dir.join(QUERY_SCRIPT_FILE).is_file()
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.item_dir.join(STAGING_DIR)
    }

    pub fn item_name(&self) -> String {
        self.item_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn archive_path(&self) -> PathBuf {
        self.item_dir
            .join(format!("{}.{ARCHIVE_EXTENSION}", self.item_name()))
    }

    /// Stage the template files, then archive them.
    pub fn assemble(&self) -> AssemblyOutcome {
        let mut outcome = AssemblyOutcome::default();
        if let Err(err) = self.stage() {
            error!(item = %self.item_name(), error = %err, "failed to stage template files");
            outcome.error = Some(err);
            return outcome;
        }
        outcome.structure_created = true;
        match self.archive() {
            Ok(path) => outcome.archive = Some(path),
            Err(err) => {
                error!(item = %self.item_name(), error = %err, "failed to create template archive");
                outcome.error = Some(err);
            }
        }
        outcome
    }

    /// Populate the staging directory with every template member available for this item.
    pub fn stage(&self) -> Result<PathBuf, Error> {
        let script = self.item_dir.join(QUERY_SCRIPT_FILE);
        if !script.is_file() {
            return Err(Error::new(ErrorKind::NotFound)
                .with_message("item has no query script")
                .with_path(&script));
        }
        let staging = self.staging_dir();
        fs::create_dir_all(&staging)
            .map_err(|err| Error::io(err, "failed to create staging directory").with_path(&staging))?;

        let document = staging.join(MASHUP_DOCUMENT_MEMBER);
        fs::copy(&script, &document)
            .map_err(|err| Error::io(err, "failed to copy query script").with_path(&script))?;

        let query_metadata = self.item_dir.join(QUERY_METADATA_FILE);
        if query_metadata.is_file() {
            let source: QueryMetadataDocument = read_json(&query_metadata)?;
            let metadata = MashupMetadata::from_query_metadata(&source);
            write_json(&staging.join(MASHUP_METADATA_MEMBER), &metadata)?;
        }

        let platform = self.item_dir.join(PLATFORM_FILE);
        if platform.is_file() {
            let source: PlatformDocument = read_json(&platform)?;
            let metadata = TemplateMetadata::from_platform(&source);
            write_json(&staging.join(METADATA_MEMBER), &metadata)?;
        }

        let content_types = staging.join(CONTENT_TYPES_MEMBER);
        fs::write(&content_types, CONTENT_TYPES_XML).map_err(|err| {
            Error::io(err, "failed to write content types").with_path(&content_types)
        })?;
        Ok(staging)
    }

    /// Zip every file in the staging directory into `<item>.pqt`, flat and deflated.
    pub fn archive(&self) -> Result<PathBuf, Error> {
        let staging = self.staging_dir();
        if !staging.is_dir() {
            return Err(Error::new(ErrorKind::NotFound)
                .with_message("staging directory does not exist")
                .with_path(&staging));
        }
        let mut members = Vec::new();
        let entries = fs::read_dir(&staging)
            .map_err(|err| Error::io(err, "failed to read staging directory").with_path(&staging))?;
        for entry in entries {
            let entry = entry
                .map_err(|err| Error::io(err, "failed to read staging entry").with_path(&staging))?;
            let path = entry.path();
            if path.is_file() {
                members.push(path);
            }
        }
        members.sort();

        let archive_path = self.archive_path();
        let file = File::create(&archive_path)
            .map_err(|err| Error::io(err, "failed to create archive").with_path(&archive_path))?;
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for member in &members {
            let name = member
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let bytes = fs::read(member)
                .map_err(|err| Error::io(err, "failed to read staged file").with_path(member))?;
            zip.start_file(name.as_str(), options)
                .map_err(|err| archive_error(err, &archive_path))?;
            zip.write_all(&bytes)
                .map_err(|err| Error::io(err, "failed to write archive member").with_path(member))?;
        }
        zip.finish()
            .map_err(|err| archive_error(err, &archive_path))?;
        Ok(archive_path)
    }
}

fn archive_error(err: zip::result::ZipError, archive_path: &Path) -> Error {
    Error::new(ErrorKind::Archive)
        .with_message("failed to write archive")
        .with_path(archive_path)
        .with_source(err)
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, Error> {
    let text = fs::read_to_string(path)
        .map_err(|err| Error::io(err, "failed to read template source").with_path(path))?;
    serde_json::from_str(&text).map_err(|err| {
        Error::new(ErrorKind::Decode)
            .with_message("template source is not valid json")
            .with_path(path)
            .with_source(err)
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), Error> {
    let json = serde_json::to_string_pretty(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode template document")
            .with_source(err)
    })?;
    fs::write(path, json).map_err(|err| Error::io(err, "failed to write template document").with_path(path))
}

#[cfg(test)]
mod tests {
    use super::{
        CONTENT_TYPES_MEMBER, MASHUP_DOCUMENT_MEMBER, MashupMetadata, PlatformDocument,
        QueryMetadataDocument, TemplateAssembler, TemplateMetadata,
    };
    use serde_json::json;
    use std::fs::File;

    #[test]
    fn mashup_metadata_keeps_query_order_and_optional_hidden() {
        let document: QueryMetadataDocument = serde_json::from_value(json!({
            "formatVersion": "202502",
            "queriesMetadata": {
                "Zeta": {"queryId": "1", "isHidden": false},
                "Alpha": {"queryId": "2"},
                "Odd": "not-an-object"
            }
        }))
        .expect("document");
        let metadata = MashupMetadata::from_query_metadata(&document);
        assert_eq!(
            serde_json::to_value(&metadata).expect("encode"),
            json!({
                "Version": "1.0.0.0",
                "QueriesMetadata": [
                    {"Name": "Zeta", "IsHidden": false},
                    {"Name": "Alpha"},
                    {"Name": "Odd"}
                ]
            })
        );
    }

    #[test]
    fn metadata_defaults_display_name() {
        let document: PlatformDocument =
            serde_json::from_value(json!({"metadata": {"type": "Dataflow"}})).expect("document");
        let metadata = TemplateMetadata::from_platform(&document);
        assert_eq!(
            serde_json::to_value(&metadata).expect("encode"),
            json!({"Name": "Dataflow", "Description": "", "Version": "1.0.0.0"})
        );
    }

    #[test]
    fn script_only_item_archives_two_members() {
        let temp = tempfile::tempdir().expect("tempdir");
        let item = temp.path().join("item_007");
        std::fs::create_dir_all(&item).expect("mkdir");
        std::fs::write(item.join("mashup.pq"), "section Section1;").expect("write");

        let outcome = TemplateAssembler::new(&item).assemble();
        assert!(outcome.structure_created);
        let archive_path = outcome.archive.expect("archive");
        assert_eq!(archive_path, item.join("item_007.pqt"));

        let archive = zip::ZipArchive::new(File::open(&archive_path).expect("open")).expect("zip");
        let mut names: Vec<&str> = archive.file_names().collect();
        names.sort();
        assert_eq!(names, [MASHUP_DOCUMENT_MEMBER, CONTENT_TYPES_MEMBER]);
    }

    #[test]
    fn missing_script_fails_without_archive() {
        let temp = tempfile::tempdir().expect("tempdir");
        let item = temp.path().join("item_001");
        std::fs::create_dir_all(&item).expect("mkdir");
        assert!(!TemplateAssembler::is_candidate(&item));

        let outcome = TemplateAssembler::new(&item).assemble();
        assert!(!outcome.structure_created);
        assert!(!outcome.archive_created());
        assert!(outcome.error.is_some());
    }

    #[test]
    fn malformed_platform_fails_the_item() {
        let temp = tempfile::tempdir().expect("tempdir");
        let item = temp.path().join("item_002");
        std::fs::create_dir_all(&item).expect("mkdir");
        std::fs::write(item.join("mashup.pq"), "section Section1;").expect("write");
        std::fs::write(item.join(".platform"), "{oops").expect("write");

        let outcome = TemplateAssembler::new(&item).assemble();
        assert!(!outcome.structure_created);
        assert!(!item.join("item_002.pqt").exists());
    }

    #[test]
    fn archive_failure_keeps_staged_structure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let item = temp.path().join("item_003");
        std::fs::create_dir_all(item.join("item_003.pqt")).expect("mkdir");
        std::fs::write(item.join("mashup.pq"), "section Section1;").expect("write");

        let outcome = TemplateAssembler::new(&item).assemble();
        assert!(outcome.structure_created);
        assert!(!outcome.archive_created());
        assert!(outcome.error.is_some());
        assert!(item.join("pqtzip").join(MASHUP_DOCUMENT_MEMBER).is_file());
    }
}
