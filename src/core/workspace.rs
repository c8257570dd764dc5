//! Purpose: Convert a decoded workspace into `.pqt` bundles and partition its items.
//! Exports: `ConvertOptions`, `ConvertReport`, `WITH_DATAFLOWS_DIR`, `convert_workspace`.
//! Role: Convert-stage driver; runs the template assembler per candidate item.
//! Invariants: Candidates are `item_*` directories holding a query script, sorted by name.
//! Invariants: Copies never overwrite an existing destination item directory.
//! Invariants: Items that fail to move stay in the output location and stay mapped there.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::core::batch::ITEM_DIR_PREFIX;
use crate::core::error::{Error, ErrorKind};
use crate::core::identity::{SOURCE_FILE_PREFIX, parse_source_filename};
use crate::core::mapping::{MAPPING_FILE, MappingEntry, read_legacy_lookup, write_entries};
use crate::core::paths::copy_dir_recursive;
use crate::core::retry::{DirMover, FsMover, RetryPolicy, Sleeper, ThreadSleeper, move_with_retry};
use crate::core::template::TemplateAssembler;

pub const WITH_DATAFLOWS_DIR: &str = "with_dataflows";
const UNKNOWN_SOURCE: &str = "Unknown";

#[derive(Copy, Clone, Debug, Default)]
pub struct ConvertOptions {
    pub retry: RetryPolicy,
}

#[derive(Debug, Default)]
pub struct ConvertReport {
    pub workspace_dir: PathBuf,
    pub output_dir: PathBuf,
    pub in_place: bool,
    pub candidates: Vec<String>,
    pub copy_failures: Vec<String>,
    pub structures_created: usize,
    pub archives_created: usize,
    pub moved: Vec<String>,
    pub failed_moves: Vec<String>,
    pub remaining: Vec<String>,
    pub item_errors: Vec<(String, Error)>,
    /// Failures after per-item work (partition directory, listing, mapping files).
    pub partition_errors: Vec<Error>,
}

impl ConvertReport {
    /// True when at least one structure and one archive were created.
    pub fn is_success(&self) -> bool {
        self.structures_created > 0 && self.archives_created > 0
    }

    pub fn with_dataflows_dir(&self) -> PathBuf {
        self.output_dir.join(WITH_DATAFLOWS_DIR)
    }
}

/// Convert with the real filesystem mover and sleeper.
pub fn convert_workspace(
    workspace_dir: &Path,
    output_dir: Option<&Path>,
    options: ConvertOptions,
) -> Result<ConvertReport, Error> {
    WorkspaceConverter::new(options).convert(workspace_dir, output_dir)
}

pub struct WorkspaceConverter<'a> {
    options: ConvertOptions,
    mover: &'a dyn DirMover,
    sleeper: &'a dyn Sleeper,
}

impl WorkspaceConverter<'static> {
    pub fn new(options: ConvertOptions) -> Self {
        Self {
            options,
            mover: &FsMover,
            sleeper: &ThreadSleeper,
        }
    }
}

impl<'a> WorkspaceConverter<'a> {
    pub fn with_io(options: ConvertOptions, mover: &'a dyn DirMover, sleeper: &'a dyn Sleeper) -> Self {
        Self {
            options,
            mover,
            sleeper,
        }
    }

    pub fn convert(
        &self,
        workspace_dir: &Path,
        output_dir: Option<&Path>,
    ) -> Result<ConvertReport, Error> {
        if !workspace_dir.is_dir() {
            return Err(Error::new(ErrorKind::NotFound)
                .with_message("workspace directory not found")
                .with_path(workspace_dir)
                .with_hint("Run the decode stage first or pass a decoded workspace directory."));
        }
        let workspace_dir = absolutize(workspace_dir)?;
        let output_dir = match output_dir {
            Some(dir) => absolutize(dir)?,
            None => workspace_dir.clone(),
        };
        let in_place = output_dir == workspace_dir;
        let mut report = ConvertReport {
            workspace_dir: workspace_dir.clone(),
            output_dir: output_dir.clone(),
            in_place,
            ..ConvertReport::default()
        };
        info!(
            workspace = %workspace_dir.display(),
            output = %output_dir.display(),
            "converting workspace"
        );

        let candidates = find_candidates(&workspace_dir)?;
        report.candidates = candidates.clone();
        info!(count = candidates.len(), "found dataflow items");
        if candidates.is_empty() {
            warn!(workspace = %workspace_dir.display(), "no dataflow items found");
            return Ok(report);
        }

        let lookup = read_legacy_lookup(&workspace_dir.join(MAPPING_FILE))?;

        let mut items = Vec::with_capacity(candidates.len());
        if in_place {
            items.extend(candidates.iter().map(|name| workspace_dir.join(name)));
        } else {
            fs::create_dir_all(&output_dir).map_err(|err| {
                Error::io(err, "failed to create output directory").with_path(&output_dir)
            })?;
            for name in &candidates {
                let dest = output_dir.join(name);
                if !dest.exists() {
                    if let Err(err) = copy_dir_recursive(&workspace_dir.join(name), &dest) {
                        error!(item = %name, error = %err, "failed to copy item");
                        report.copy_failures.push(name.clone());
                        report.item_errors.push((name.clone(), err));
                        continue;
                    }
                }
                items.push(dest);
            }
        }

        for item in &items {
            let name = dir_name(item);
            let outcome = TemplateAssembler::new(item).assemble();
            if outcome.structure_created {
                report.structures_created += 1;
            }
            if outcome.archive_created() {
                report.archives_created += 1;
                info!(item = %name, "created template archive");
            }
            if let Some(err) = outcome.error {
                report.item_errors.push((name, err));
            }
        }

        let with_dataflows = report.with_dataflows_dir();
        match fs::create_dir_all(&with_dataflows) {
            Ok(()) => self.move_archived(&items, &with_dataflows, &mut report),
            Err(err) => {
                let err = Error::io(err, "failed to create with_dataflows directory")
                    .with_path(&with_dataflows);
                error!(error = %err, "skipping partition; items stay in the output directory");
                report.partition_errors.push(err);
            }
        }

        if !report.moved.is_empty() {
            let entries = mapping_entries(&with_dataflows, &report.moved, &lookup);
            record_partition_error(
                &mut report.partition_errors,
                write_entries(&with_dataflows.join(MAPPING_FILE), &entries),
            );
        }

        match list_item_dirs(&output_dir) {
            Ok(remaining) => report.remaining = remaining,
            Err(err) => {
                error!(error = %err, "failed to list remaining items");
                report.partition_errors.push(err);
            }
        }
        if !report.remaining.is_empty() {
            let entries = mapping_entries(&output_dir, &report.remaining, &lookup);
            record_partition_error(
                &mut report.partition_errors,
                write_entries(&output_dir.join(MAPPING_FILE), &entries),
            );
        }

        info!(
            candidates = report.candidates.len(),
            structures = report.structures_created,
            archives = report.archives_created,
            moved = report.moved.len(),
            remaining = report.remaining.len(),
            "workspace conversion complete"
        );
        Ok(report)
    }

    fn move_archived(&self, items: &[PathBuf], with_dataflows: &Path, report: &mut ConvertReport) {
        for item in items {
            let assembler = TemplateAssembler::new(item);
            if !assembler.archive_path().is_file() {
                continue;
            }
            let name = assembler.item_name();
            let dest = with_dataflows.join(&name);
            match move_with_retry(self.mover, self.sleeper, self.options.retry, item, &dest) {
                Ok(_) => {
                    info!(item = %name, "moved to with_dataflows");
                    report.moved.push(name);
                }
                Err(err) => {
                    error!(item = %name, error = %err, "failed to move item; leaving in place");
                    report.failed_moves.push(name.clone());
                    report.item_errors.push((name, err));
                }
            }
        }
    }
}

fn record_partition_error(errors: &mut Vec<Error>, result: Result<(), Error>) {
    if let Err(err) = result {
        error!(error = %err, "failed to write mapping file");
        errors.push(err);
    }
}

fn absolutize(path: &Path) -> Result<PathBuf, Error> {
    if path.exists() {
        return fs::canonicalize(path)
            .map_err(|err| Error::io(err, "failed to resolve path").with_path(path));
    }
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir()
        .map_err(|err| Error::io(err, "failed to resolve current directory"))?;
    Ok(cwd.join(path))
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Sorted names of `item_*` directories directly inside `dir`.
fn list_item_dirs(dir: &Path) -> Result<Vec<String>, Error> {
    let entries =
        fs::read_dir(dir).map_err(|err| Error::io(err, "failed to read directory").with_path(dir))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|err| Error::io(err, "failed to read directory entry").with_path(dir))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(ITEM_DIR_PREFIX) && entry.path().is_dir() {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

fn find_candidates(workspace_dir: &Path) -> Result<Vec<String>, Error> {
    let names = list_item_dirs(workspace_dir)?;
    Ok(names
        .into_iter()
        .filter(|name| TemplateAssembler::is_candidate(&workspace_dir.join(name)))
        .collect())
}

/// First `WS__*.json` file name inside an item directory, by name.
fn find_source_file(item_dir: &Path) -> Option<String> {
    let mut names: Vec<String> = fs::read_dir(item_dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(SOURCE_FILE_PREFIX) && name.ends_with(".json"))
        .collect();
    names.sort();
    names.into_iter().next()
}

fn mapping_entries(
    parent: &Path,
    items: &[String],
    lookup: &BTreeMap<String, String>,
) -> Vec<MappingEntry> {
    let mut sorted = items.to_vec();
    sorted.sort();
    sorted
        .into_iter()
        .map(|item| {
            let parsed = find_source_file(&parent.join(&item)).and_then(|file| {
                parse_source_filename(&file)
                    .parsed()
                    .map(|identity| (identity, file))
            });
            match parsed {
                Some((identity, file)) => MappingEntry {
                    item_dir_name: item,
                    identity: Some(identity),
                    source_filename: file,
                },
                None => {
                    let source_filename = lookup
                        .get(&item)
                        .cloned()
                        .unwrap_or_else(|| UNKNOWN_SOURCE.to_string());
                    MappingEntry {
                        item_dir_name: item,
                        identity: None,
                        source_filename,
                    }
                }
            }
        })
        .collect()
}
