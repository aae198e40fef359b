//! File name sanitization and directory listing metadata.

use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::error::StoreError;

/// Timestamp format used in listings.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Reduces `raw` to its final path component.
///
/// Both `/` and `\` count as separators, so no input can name a file outside
/// the owning directory. Empty names and `.`/`..` are rejected.
pub fn basename(raw: &str) -> Result<String, StoreError> {
    let trimmed = raw.trim_end_matches(['/', '\\']);
    let name = trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." || name.contains('\0') {
        return Err(StoreError::BadRequest("No filename specified.".to_string()));
    }
    Ok(name.to_string())
}

/// Whether `filename` ends with `.{extension}` and has a non-empty stem.
pub fn has_extension(filename: &str, extension: &str) -> bool {
    let path = Path::new(filename);
    path.extension().and_then(|e| e.to_str()) == Some(extension)
        && path.file_stem().is_some_and(|s| !s.is_empty())
}

/// File name without its extension.
pub fn stem(filename: &str) -> &str {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
}

/// Size and timestamps of one file, as shown in listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileStat {
    pub size: u64,
    pub created: String,
    pub modified: String,
}

impl FileStat {
    pub fn of(path: &Path) -> Result<FileStat, StoreError> {
        let metadata = std::fs::metadata(path)
            .map_err(StoreError::io(format!("failed to stat {}", path.display())))?;
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let created = metadata.created().unwrap_or(modified);
        Ok(FileStat {
            size: metadata.len(),
            created: format_time(created),
            modified: format_time(modified),
        })
    }
}

pub fn format_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format(TIMESTAMP_FORMAT).to_string()
}

/// Regular files in `dir` with the given extension, sorted by name.
pub fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<String>, StoreError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(dir)
        .map_err(StoreError::io(format!("failed to read {}", dir.display())))?;
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| has_extension(name, extension))
        .collect();
    names.sort();
    Ok(names)
}
