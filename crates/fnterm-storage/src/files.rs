//! File store over the function directory and the configuration file.
//!
//! Every operation takes a client-supplied file name and reduces it to its
//! basename first, so directory traversal is impossible by construction.
//! Creation is exclusive (`create_new`), so of two concurrent writers of the
//! same new name exactly one wins. Appends hold an exclusive file lock for the
//! duration of the write.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::StoreError;
use crate::meta::{basename, files_with_extension, has_extension, stem, FileStat};

/// Listing entry for one function file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileEntry {
    pub filename: String,
    #[serde(flatten)]
    pub stat: FileStat,
}

/// CRUD over a function directory plus one fixed configuration file.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    config_path: PathBuf,
    extension: String,
}

impl FileStore {
    pub fn new(
        dir: impl Into<PathBuf>,
        config_path: impl Into<PathBuf>,
        extension: impl Into<String>,
    ) -> Self {
        FileStore {
            dir: dir.into(),
            config_path: config_path.into(),
            extension: extension.into(),
        }
    }

    /// Creates the function directory if it does not exist yet.
    pub fn ensure_dir(&self) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(StoreError::io(format!("failed to create {}", self.dir.display())))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    fn resolve(&self, raw: &str) -> Result<(String, PathBuf), StoreError> {
        let filename = basename(raw)?;
        let path = self.dir.join(&filename);
        Ok((filename, path))
    }

    fn check_extension(&self, filename: &str) -> Result<(), StoreError> {
        if has_extension(filename, &self.extension) {
            Ok(())
        } else {
            Err(StoreError::InvalidType(format!(
                "Invalid file type. Only .{} files are allowed.",
                self.extension
            )))
        }
    }

    fn require_existing(filename: &str, path: &Path) -> Result<(), StoreError> {
        if path.is_file() {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("File not found: {}", filename)))
        }
    }

    pub fn read(&self, raw: &str) -> Result<Vec<u8>, StoreError> {
        let (filename, path) = self.resolve(raw)?;
        Self::require_existing(&filename, &path)?;
        std::fs::read(&path).map_err(StoreError::io(format!("failed to read {}", filename)))
    }

    /// Creates a new function file; returns the sanitized name.
    ///
    /// `is_registered` reports whether a function with the file's stem
    /// already exists, which is a conflict even when the file name is free.
    pub fn write(
        &self,
        raw: &str,
        content: &[u8],
        is_registered: impl Fn(&str) -> bool,
    ) -> Result<String, StoreError> {
        let (filename, path) = self.resolve(raw)?;
        self.check_extension(&filename)?;

        let function_name = stem(&filename);
        if is_registered(function_name) {
            return Err(StoreError::Conflict(format!(
                "Conflict: A function named '{}' already exists.",
                function_name
            )));
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|err| match err.kind() {
                ErrorKind::AlreadyExists => StoreError::Conflict(format!(
                    "Conflict: A file named '{}' already exists.",
                    filename
                )),
                _ => StoreError::Io {
                    context: format!("Failed to write to file {}", filename),
                    source: err,
                },
            })?;

        if let Err(err) = file.write_all(content) {
            drop(file);
            let _ = std::fs::remove_file(&path);
            return Err(StoreError::Io {
                context: format!("Failed to write to file {}", filename),
                source: err,
            });
        }

        tracing::info!(file = %filename, bytes = content.len(), "function file created");
        Ok(filename)
    }

    /// Replaces the content of an existing file. Never creates.
    pub fn update(&self, raw: &str, content: &[u8]) -> Result<String, StoreError> {
        let (filename, path) = self.resolve(raw)?;
        Self::require_existing(&filename, &path)?;

        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|err| not_found_or_io(err, &filename, "update"))?;
        file.write_all(content).map_err(StoreError::io(format!(
            "Failed to update file {}. Check server permissions.",
            filename
        )))?;

        tracing::info!(file = %filename, bytes = content.len(), "function file updated");
        Ok(filename)
    }

    /// Appends a newline followed by `content`; returns the name and the
    /// number of bytes appended.
    pub fn append(&self, raw: &str, content: &[u8]) -> Result<(String, usize), StoreError> {
        let (filename, path) = self.resolve(raw)?;
        Self::require_existing(&filename, &path)?;

        let mut chunk = Vec::with_capacity(content.len() + 1);
        chunk.push(b'\n');
        chunk.extend_from_slice(content);

        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|err| not_found_or_io(err, &filename, "append to"))?;
        let context = format!("Failed to append to file {}", filename);
        file.lock().map_err(StoreError::io(context.clone()))?;
        let written = file.write_all(&chunk).and_then(|()| file.flush());
        // the lock is released on close as well; unlock explicitly to keep the window short
        let _ = file.unlock();
        written.map_err(StoreError::io(context))?;

        tracing::info!(file = %filename, bytes = chunk.len(), "function file appended");
        Ok((filename, chunk.len()))
    }

    pub fn delete(&self, raw: &str) -> Result<String, StoreError> {
        let (filename, path) = self.resolve(raw)?;
        Self::require_existing(&filename, &path)?;
        std::fs::remove_file(&path).map_err(|err| not_found_or_io(err, &filename, "delete"))?;
        tracing::info!(file = %filename, "function file deleted");
        Ok(filename)
    }

    /// All function files, sorted by name.
    pub fn list(&self) -> Result<Vec<FileEntry>, StoreError> {
        files_with_extension(&self.dir, &self.extension)?
            .into_iter()
            .map(|filename| {
                let stat = FileStat::of(&self.dir.join(&filename))?;
                Ok(FileEntry { filename, stat })
            })
            .collect()
    }

    pub fn read_config(&self) -> Result<Vec<u8>, StoreError> {
        if !self.config_path.is_file() {
            return Err(StoreError::NotFound(
                "Configuration file not found.".to_string(),
            ));
        }
        std::fs::read(&self.config_path).map_err(StoreError::io("failed to read configuration file"))
    }

    /// Overwrites the configuration file, which must already exist and be writable.
    pub fn update_config(&self, content: &[u8]) -> Result<(), StoreError> {
        let not_writable = || {
            StoreError::NotWritable(
                "Configuration file is not writable. Check permissions.".to_string(),
            )
        };

        let metadata = std::fs::metadata(&self.config_path).map_err(|_| not_writable())?;
        if !metadata.is_file() || metadata.permissions().readonly() {
            return Err(not_writable());
        }

        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.config_path)
            .map_err(|err| match err.kind() {
                ErrorKind::PermissionDenied | ErrorKind::NotFound => not_writable(),
                _ => StoreError::Io {
                    context: "Failed to update config file".to_string(),
                    source: err,
                },
            })?;
        file.write_all(content)
            .map_err(StoreError::io("Failed to update config file"))?;

        tracing::info!(path = %self.config_path.display(), "configuration file updated");
        Ok(())
    }

    /// Display name of the configuration file relative to its directory.
    pub fn config_name(&self) -> String {
        let file = self
            .config_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match self
            .config_path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
        {
            Some(parent) => format!("{}/{}", parent, file),
            None => file,
        }
    }
}

/// Maps a file vanishing between the existence check and the open to NotFound.
fn not_found_or_io(err: std::io::Error, filename: &str, action: &str) -> StoreError {
    match err.kind() {
        ErrorKind::NotFound => StoreError::NotFound(format!("File not found: {}", filename)),
        _ => StoreError::Io {
            context: format!("Failed to {} file {}", action, filename),
            source: err,
        },
    }
}
