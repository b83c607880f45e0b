//! Migration file discovery.
//!
//! Migration files live in a flat directory and are named
//! `<ordinal>_<label>.sql`. Anything else in the directory is ignored.

use std::path::{Path, PathBuf};

use crate::error::{FileNameError, MigrationError};

/// Extension a migration file must carry.
pub const MIGRATION_EXTENSION: &str = ".sql";

/// A migration file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// Leading integer of the file name. Determines application order.
    pub ordinal: i64,
    /// File name without the ordinal prefix and extension.
    pub label: String,
    /// Full file name, e.g. `3_add_triggers.sql`.
    pub file_name: String,
    /// Location of the file.
    pub path: PathBuf,
}

impl MigrationFile {
    /// Reads the raw SQL text of this migration.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::FileRead` if the file cannot be read.
    pub fn read_sql(&self) -> Result<String, MigrationError> {
        std::fs::read_to_string(&self.path).map_err(|source| MigrationError::FileRead {
            path: self.path.clone(),
            source,
        })
    }
}

/// Parses `<ordinal>_<label>.sql` into its ordinal and label.
///
/// The ordinal must be plain ASCII digits (no sign) that fit in an `i64`.
///
/// # Errors
///
/// Returns the reason the name is not a migration file name.
pub fn parse_file_name(file_name: &str) -> Result<(i64, String), FileNameError> {
    let stem = file_name
        .strip_suffix(MIGRATION_EXTENSION)
        .ok_or_else(|| FileNameError::Extension(file_name.to_string()))?;

    let (prefix, label) = stem
        .split_once('_')
        .ok_or_else(|| FileNameError::MissingSeparator(file_name.to_string()))?;

    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FileNameError::InvalidOrdinal(file_name.to_string()));
    }
    let ordinal = prefix
        .parse::<i64>()
        .map_err(|_| FileNameError::InvalidOrdinal(file_name.to_string()))?;

    Ok((ordinal, label.to_string()))
}

/// Lists the migration files in `dir`.
///
/// Directories, non-UTF-8 names, and names that do not follow the
/// `<ordinal>_<label>.sql` convention are skipped. The result is in
/// directory listing order; callers sort it (see [`sort_by_ordinal`]).
///
/// # Errors
///
/// Returns `MigrationError::DirectoryRead` if the directory cannot be listed.
pub fn discover_migrations(dir: &Path) -> Result<Vec<MigrationFile>, MigrationError> {
    let read_err = |source| MigrationError::DirectoryRead {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            tracing::debug!(path = %path.display(), "skipping non-utf8 file name");
            continue;
        };

        match parse_file_name(file_name) {
            Ok((ordinal, label)) => files.push(MigrationFile {
                ordinal,
                label,
                file_name: file_name.to_string(),
                path: path.clone(),
            }),
            Err(reason) => {
                tracing::debug!(file = file_name, %reason, "skipping non-migration file");
            }
        }
    }

    Ok(files)
}

/// Sorts migrations by ascending ordinal.
///
/// The sort is stable, so files sharing an ordinal keep their relative
/// order. Duplicates are logged; both copies are kept.
pub fn sort_by_ordinal(files: &mut [MigrationFile]) {
    files.sort_by_key(|f| f.ordinal);
    for pair in files.windows(2) {
        if pair[0].ordinal == pair[1].ordinal {
            tracing::warn!(
                ordinal = pair[0].ordinal,
                first = %pair[0].file_name,
                second = %pair[1].file_name,
                "duplicate migration ordinal"
            );
        }
    }
}
