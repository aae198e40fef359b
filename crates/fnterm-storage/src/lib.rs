//! Storage layer for fnterm.
//!
//! - [`FileStore`]: sanitized CRUD over the function directory and the
//!   configuration file.
//! - [`DatabaseEngine`]: per-call SQLite connections over a directory of
//!   `.sqlite` files, single queries and transactional scripts.

pub mod database;
pub mod error;
pub mod files;
pub mod meta;

pub use database::{
    split_statements, DatabaseEngine, DatabaseEntry, ExecStatus, LogEntry, QueryResult,
    DATABASE_EXTENSION,
};
pub use error::StoreError;
pub use files::{FileEntry, FileStore};
pub use meta::{basename, FileStat};
