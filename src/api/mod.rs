//! Purpose: Define the public Rust API boundary for the dataflow pipeline.
//! Exports: Stage entry points, report types, and document schemas used by the CLI.
//! Role: Additive-only surface; internal helpers stay under `core`.
//! Invariants: The CLI consumes the pipeline only through this module.

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::batch::{BatchReport, ItemOutcome, decode_directory, item_dir_name};
pub use crate::core::definition::{
    DECODED_DEFINITION_FILE, DecodedDefinition, DefinitionReport, EncodedDefinition,
    decode_definition_file,
};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::identity::{FilenameIdentity, ItemIdentity, parse_source_filename};
pub use crate::core::mapping::{MAPPING_FILE, MappingEntry};
pub use crate::core::payload::{
    DecodedPart, DefinitionEntry, Part, PartStatus, PayloadDecoder, PayloadType,
};
pub use crate::core::retry::{DirMover, FsMover, RetryPolicy, Sleeper, ThreadSleeper};
pub use crate::core::template::{AssemblyOutcome, TemplateAssembler};
pub use crate::core::workspace::{
    ConvertOptions, ConvertReport, WITH_DATAFLOWS_DIR, WorkspaceConverter, convert_workspace,
};
