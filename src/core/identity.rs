//! Purpose: Parse the identity tokens carried by exported item filenames.
//! Exports: `ItemIdentity`, `FilenameIdentity`, `parse_source_filename`.
//! Role: Single parser shared by the decode and convert stages.
//! Invariants: Parsing never fails loudly; unparseable names yield `Unparseable`.
//! Invariants: Only tokens 1..=4 are read; extra tokens are ignored.

const DELIMITER: &str = "__";
const LEADING_TOKEN: &str = "WS";
const JSON_SUFFIX: &str = ".json";

/// Filename prefix of exported source items, `WS__`.
pub const SOURCE_FILE_PREFIX: &str = "WS__";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ItemIdentity {
    pub workspace_id: String,
    pub item_id: String,
    pub name: String,
    pub item_type: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FilenameIdentity {
    Parsed(ItemIdentity),
    Unparseable,
}

impl FilenameIdentity {
    pub fn parsed(self) -> Option<ItemIdentity> {
        match self {
            FilenameIdentity::Parsed(identity) => Some(identity),
            FilenameIdentity::Unparseable => None,
        }
    }
}

/// Parse `WS__<workspace-id>__<item-id>__<name>__<type>.json`.
pub fn parse_source_filename(filename: &str) -> FilenameIdentity {
    let stem = filename.strip_suffix(JSON_SUFFIX).unwrap_or(filename);
    let tokens: Vec<&str> = stem.split(DELIMITER).collect();
    if tokens.len() < 5 || tokens[0] != LEADING_TOKEN {
        return FilenameIdentity::Unparseable;
    }
    FilenameIdentity::Parsed(ItemIdentity {
        workspace_id: tokens[1].to_string(),
        item_id: tokens[2].to_string(),
        name: tokens[3].to_string(),
        item_type: tokens[4].to_string(),
    })
}
