//! Purpose: Read and write the `item_mapping.txt` traceability ledger.
//! Exports: `MappingEntry`, `append_entry`, `write_entries`, `read_legacy_lookup`.
//! Role: Shared by the decode stage (append) and the convert stage (fresh write + lookup).
//! Invariants: One entry per line; rich form when identity is known, `->` form otherwise.
//! Invariants: Appends never deduplicate; reruns repeat lines for the same item.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::core::error::Error;
use crate::core::identity::ItemIdentity;

pub const MAPPING_FILE: &str = "item_mapping.txt";
const LEGACY_SEPARATOR: &str = " -> ";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MappingEntry {
    pub item_dir_name: String,
    pub identity: Option<ItemIdentity>,
    pub source_filename: String,
}

impl MappingEntry {
    pub fn line(&self) -> String {
        match &self.identity {
            Some(identity) => format!(
                "{} | WorkspaceID: {} | ItemID: {} | Name: {} | Type: {} | File: {}",
                self.item_dir_name,
                identity.workspace_id,
                identity.item_id,
                identity.name,
                identity.item_type,
                self.source_filename
            ),
            None => format!(
                "{}{LEGACY_SEPARATOR}{}",
                self.item_dir_name, self.source_filename
            ),
        }
    }
}

pub fn append_entry(mapping_file: &Path, entry: &MappingEntry) -> Result<(), Error> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(mapping_file)
        .map_err(|err| Error::io(err, "failed to open mapping file").with_path(mapping_file))?;
    writeln!(file, "{}", entry.line())
        .map_err(|err| Error::io(err, "failed to append mapping entry").with_path(mapping_file))
}

/// Replace `mapping_file` with exactly `entries`.
pub fn write_entries(mapping_file: &Path, entries: &[MappingEntry]) -> Result<(), Error> {
    let mut contents = String::new();
    for entry in entries {
        contents.push_str(&entry.line());
        contents.push('\n');
    }
    fs::write(mapping_file, contents)
        .map_err(|err| Error::io(err, "failed to write mapping file").with_path(mapping_file))
}

/// Collect `item -> file` lines; a missing file yields an empty lookup.
pub fn read_legacy_lookup(mapping_file: &Path) -> Result<BTreeMap<String, String>, Error> {
    let text = match fs::read_to_string(mapping_file) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(err) => {
            return Err(Error::io(err, "failed to read mapping file").with_path(mapping_file));
        }
    };
    let mut lookup = BTreeMap::new();
    for line in text.lines().map(str::trim) {
        if let Some((item, file)) = line.split_once(LEGACY_SEPARATOR) {
            lookup.insert(item.trim().to_string(), file.trim().to_string());
        }
    }
    Ok(lookup)
}
