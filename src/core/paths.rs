//! Purpose: Filesystem path helpers shared by the decode and convert stages.
//! Exports: `resolve_part_path`, `copy_dir_recursive`.
//! Role: Keep relative part paths confined to their item directory.
//! Invariants: Resolved paths never escape the base directory.
//! Invariants: Absolute paths, `..` components and empty paths are rejected.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::core::error::{Error, ErrorKind};

/// Join a part-relative path under `base`, refusing anything that escapes it.
pub fn resolve_part_path(base: &Path, relative: &str) -> Result<PathBuf, Error> {
    let candidate = Path::new(relative);
    let mut cleaned = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(value) => cleaned.push(value),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("part path escapes output directory: {relative}"))
                    .with_path(base));
            }
        }
    }
    if cleaned.as_os_str().is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("part path is empty")
            .with_path(base));
    }
    Ok(base.join(cleaned))
}

/// Copy a directory tree; existing files at the destination are overwritten.
pub fn copy_dir_recursive(source: &Path, dest: &Path) -> Result<(), Error> {
    fs::create_dir_all(dest)
        .map_err(|err| Error::io(err, "failed to create directory").with_path(dest))?;
    let entries = fs::read_dir(source)
        .map_err(|err| Error::io(err, "failed to read directory").with_path(source))?;
    for entry in entries {
        let entry =
            entry.map_err(|err| Error::io(err, "failed to read directory entry").with_path(source))?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|err| Error::io(err, "failed to stat entry").with_path(&from))?;
        if file_type.is_dir() {
            copy_dir_recursive(&from, &to)?;
        } else {
            fs::copy(&from, &to)
                .map_err(|err| Error::io(err, "failed to copy file").with_path(&from))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{copy_dir_recursive, resolve_part_path};
    use crate::core::error::ErrorKind;
    use std::path::Path;

    #[test]
    fn nested_relative_paths_are_joined() {
        let base = Path::new("/tmp/out");
        let path = resolve_part_path(base, "./queries/mashup.pq").expect("resolve");
        assert_eq!(path, base.join("queries").join("mashup.pq"));
    }

    #[test]
    fn escaping_paths_are_rejected() {
        let base = Path::new("/tmp/out");
        for bad in ["../secret.json", "a/../../b.pq", "/etc/passwd", "", "."] {
            let err = resolve_part_path(base, bad).expect_err(bad);
            assert_eq!(err.kind(), ErrorKind::Usage);
        }
    }

    #[test]
    fn copy_preserves_tree() {
        let temp = tempfile::tempdir().expect("tempdir");
        let source = temp.path().join("item_001");
        std::fs::create_dir_all(source.join("nested")).expect("mkdir");
        std::fs::write(source.join("mashup.pq"), "section Section1;").expect("write");
        std::fs::write(source.join("nested").join("a.txt"), "a").expect("write");

        let dest = temp.path().join("out").join("item_001");
        copy_dir_recursive(&source, &dest).expect("copy");

        assert_eq!(
            std::fs::read_to_string(dest.join("mashup.pq")).expect("read"),
            "section Section1;"
        );
        assert_eq!(
            std::fs::read_to_string(dest.join("nested").join("a.txt")).expect("read"),
            "a"
        );
    }
}
