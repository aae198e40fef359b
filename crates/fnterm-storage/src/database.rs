//! Database engine over a directory of `.sqlite` files.
//!
//! The engine holds no connections. Every operation opens its own connection
//! and drops it before returning, so nothing outlives a request. Scripts run
//! inside one transaction: the first failing statement stops execution and
//! rolls back everything that ran before it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;

use crate::error::StoreError;
use crate::meta::{basename, files_with_extension, has_extension, FileStat};

/// File extension of database files.
pub const DATABASE_EXTENSION: &str = "sqlite";

/// Leading keywords of statements that return rows.
const READ_KEYWORDS: [&str; 3] = ["SELECT", "PRAGMA", "EXPLAIN"];

/// Leading keywords that would end or nest the transaction around a script.
const TRANSACTION_KEYWORDS: [&str; 4] = ["BEGIN", "COMMIT", "END", "ROLLBACK"];

const TRANSACTION_CONTROL_MESSAGE: &str =
    "Transaction control statements are not allowed in SQL scripts.";

/// Listing entry for one database file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseEntry {
    pub dbname: String,
    #[serde(flatten)]
    pub stat: FileStat,
}

/// Outcome of a single query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Rows as ordered column-to-value maps.
    Rows(Vec<serde_json::Map<String, serde_json::Value>>),
    Changed { rows_affected: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecStatus {
    Success,
    Error,
}

/// One statement of an executed script.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub status: ExecStatus,
    pub sql: String,
    pub message: String,
}

/// Manages the `.sqlite` files of one directory.
#[derive(Debug, Clone)]
pub struct DatabaseEngine {
    dir: PathBuf,
    busy_timeout: Duration,
}

impl DatabaseEngine {
    pub fn new(dir: impl Into<PathBuf>, busy_timeout: Duration) -> Self {
        DatabaseEngine {
            dir: dir.into(),
            busy_timeout,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(StoreError::io(format!("failed to create {}", self.dir.display())))
    }

    /// Sanitizes a client-supplied database name and checks its extension.
    pub fn validate_name(raw: &str) -> Result<String, StoreError> {
        let name = basename(raw)?;
        if !has_extension(&name, DATABASE_EXTENSION) {
            return Err(StoreError::InvalidType(
                "Invalid database file. Only .sqlite files are permitted.".to_string(),
            ));
        }
        Ok(name)
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn list_databases(&self) -> Result<Vec<DatabaseEntry>, StoreError> {
        files_with_extension(&self.dir, DATABASE_EXTENSION)?
            .into_iter()
            .map(|dbname| {
                let stat = FileStat::of(&self.path_of(&dbname))?;
                Ok(DatabaseEntry { dbname, stat })
            })
            .collect()
    }

    /// Copies `source` to a new file `dest`; returns both sanitized names.
    ///
    /// The copy is written to a temporary file in the same directory and then
    /// linked into place, so `dest` either does not exist or is complete, and
    /// an existing `dest` is never overwritten.
    pub fn backup(&self, source: &str, dest: &str) -> Result<(String, String), StoreError> {
        let source = basename(source)?;
        let dest = basename(dest)?;
        if !has_extension(&source, DATABASE_EXTENSION) || !has_extension(&dest, DATABASE_EXTENSION) {
            return Err(StoreError::InvalidType(
                "Invalid file type. Both source and destination must be .sqlite files."
                    .to_string(),
            ));
        }

        let source_path = self.path_of(&source);
        let dest_path = self.path_of(&dest);
        if !source_path.is_file() {
            return Err(StoreError::NotFound(format!(
                "Source database '{}' not found.",
                source
            )));
        }
        let conflict = || {
            StoreError::Conflict(format!(
                "Conflict: Destination file '{}' already exists.",
                dest
            ))
        };
        if dest_path.exists() {
            return Err(conflict());
        }

        let temp_path = self.path_of(&format!(".{}.{}.tmp", dest, uuid::Uuid::new_v4()));
        let failed = "Failed to create backup. Check server permissions.";
        std::fs::copy(&source_path, &temp_path).map_err(StoreError::io(failed))?;

        let placed = match std::fs::hard_link(&temp_path, &dest_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Err(conflict()),
            // filesystems without hard links
            Err(_) if dest_path.exists() => Err(conflict()),
            Err(_) => std::fs::rename(&temp_path, &dest_path).map_err(StoreError::io(failed)),
        };
        if temp_path.exists() {
            let _ = std::fs::remove_file(&temp_path);
        }
        placed?;

        tracing::info!(source = %source, dest = %dest, "database backed up");
        Ok((source, dest))
    }

    /// Deletes a database file. No connection is opened.
    pub fn delete_database(&self, raw: &str) -> Result<String, StoreError> {
        let name = Self::validate_name(raw)?;
        let path = self.path_of(&name);
        if !path.is_file() {
            return Err(StoreError::NotFound(format!("File not found: {}", name)));
        }
        std::fs::remove_file(&path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => StoreError::NotFound(format!("File not found: {}", name)),
            _ => StoreError::Io {
                context: format!("Failed to delete database '{}'. Check server permissions.", name),
                source: err,
            },
        })?;
        tracing::info!(database = %name, "database deleted");
        Ok(name)
    }

    /// Opens a connection to a validated database name.
    ///
    /// Without `create`, a missing file is NotFound rather than silently
    /// creating an empty database.
    pub fn open(&self, name: &str, create: bool) -> Result<Connection, StoreError> {
        let path = self.path_of(name);
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if create {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        } else if !path.is_file() {
            return Err(StoreError::NotFound(format!("Database '{}' not found.", name)));
        }

        let conn = Connection::open_with_flags(&path, flags)?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }

    /// Creates the database if absent, otherwise just connects.
    pub fn start(&self, raw: &str) -> Result<String, StoreError> {
        let name = Self::validate_name(raw)?;
        let conn = self.open(&name, true)?;
        // fails with "file is not a database" for foreign files
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))?;
        tracing::debug!(database = %name, "database session started");
        Ok(name)
    }

    pub fn list_tables(&self, raw: &str) -> Result<Vec<String>, StoreError> {
        self.list_names(
            raw,
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
    }

    pub fn list_views(&self, raw: &str) -> Result<Vec<String>, StoreError> {
        self.list_names(
            raw,
            "SELECT name FROM sqlite_master WHERE type = 'view' ORDER BY name",
        )
    }

    fn list_names(&self, raw: &str, sql: &str) -> Result<Vec<String>, StoreError> {
        let name = Self::validate_name(raw)?;
        let conn = self.open(&name, false)?;
        let mut stmt = conn.prepare(sql)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Executes one query. Queries led by a read keyword return rows; anything
    /// else reports the number of changed rows.
    pub fn execute(&self, raw: &str, query: &str) -> Result<QueryResult, StoreError> {
        let name = Self::validate_name(raw)?;
        let query = query.trim();
        if query.is_empty() {
            return Err(StoreError::BadRequest(
                "Bad Request. A \"query\" is required.".to_string(),
            ));
        }
        let conn = self.open(&name, false)?;
        tracing::debug!(database = %name, sql = query, "executing query");

        if is_read_query(query) {
            let mut stmt = conn.prepare(query)?;
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut map = serde_json::Map::with_capacity(columns.len());
                for (i, column) in columns.iter().enumerate() {
                    map.insert(column.clone(), to_json(row.get_ref(i)?));
                }
                out.push(map);
            }
            Ok(QueryResult::Rows(out))
        } else {
            conn.execute_batch(query)?;
            Ok(QueryResult::Changed {
                rows_affected: conn.changes() as u64,
            })
        }
    }

    /// Runs a multi-statement script inside one transaction.
    ///
    /// Returns the per-statement log. On the first failing statement the
    /// failure is logged, execution stops and the transaction is rolled back;
    /// the partial log is still returned as a success. Busy and locked errors
    /// abort with [`StoreError::Busy`] instead so the client can retry.
    ///
    /// `BEGIN`, `COMMIT`, `END` and `ROLLBACK` are refused as failing
    /// statements: the whole script is the transaction.
    pub fn execute_script(&self, raw: &str, sql: &str) -> Result<Vec<LogEntry>, StoreError> {
        let name = Self::validate_name(raw)?;
        let statements = split_statements(sql);
        let mut conn = self.open(&name, false)?;
        let tx = conn.transaction()?;
        let mut log = Vec::with_capacity(statements.len());

        for statement in statements {
            tracing::debug!(database = %name, sql = %statement, "executing script statement");
            let outcome = if is_transaction_control(&statement) {
                Err(StoreError::BadRequest(TRANSACTION_CONTROL_MESSAGE.to_string()))
            } else {
                run_statement(&tx, &statement)
                    .map_err(StoreError::from)
                    .and_then(|affected| {
                        if tx.is_autocommit() {
                            Err(StoreError::BadRequest(TRANSACTION_CONTROL_MESSAGE.to_string()))
                        } else {
                            Ok(affected)
                        }
                    })
            };
            match outcome {
                Ok(affected) => log.push(LogEntry {
                    status: ExecStatus::Success,
                    sql: statement,
                    message: format!("{} row(s) affected.", affected),
                }),
                Err(err) => {
                    if err.is_retryable() {
                        tracing::warn!(database = %name, "script aborted, database busy");
                        return Err(err);
                    }
                    tracing::warn!(
                        database = %name,
                        executed = log.len(),
                        "script statement failed, rolling back: {}",
                        err
                    );
                    log.push(LogEntry {
                        status: ExecStatus::Error,
                        sql: statement,
                        message: err.to_string(),
                    });
                    if let Err(err) = tx.rollback() {
                        tracing::error!(database = %name, "script rollback failed: {}", err);
                    }
                    return Ok(log);
                }
            }
        }

        tx.commit()?;
        tracing::info!(database = %name, statements = log.len(), "script committed");
        Ok(log)
    }
}

fn leading_keyword(query: &str) -> String {
    query
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect()
}

fn is_read_query(query: &str) -> bool {
    let keyword = leading_keyword(query);
    READ_KEYWORDS
        .iter()
        .any(|k| k.eq_ignore_ascii_case(&keyword))
}

fn is_transaction_control(statement: &str) -> bool {
    let keyword = leading_keyword(statement);
    TRANSACTION_KEYWORDS
        .iter()
        .any(|k| k.eq_ignore_ascii_case(&keyword))
}

/// Runs one statement and returns the rows it changed. Row-returning
/// statements are drained and count as zero.
fn run_statement(conn: &Connection, sql: &str) -> Result<u64, rusqlite::Error> {
    let mut stmt = conn.prepare(sql)?;
    if stmt.column_count() > 0 {
        let mut rows = stmt.query([])?;
        while rows.next()?.is_some() {}
        return Ok(0);
    }
    Ok(stmt.execute([])? as u64)
}

fn to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// Splits a script into statements on `;`.
///
/// Semicolons inside quoted strings, quoted identifiers (`"x"`, `` `x` ``,
/// `[x]`) and comments do not split. Comments are removed and blank
/// statements dropped; each statement is trimmed and carries no `;`.
pub fn split_statements(sql: &str) -> Vec<String> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Normal,
        Quoted(char),
        LineComment,
        BlockComment,
    }

    let mut statements = Vec::new();
    let mut current = String::new();
    let mut state = State::Normal;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Normal => match c {
                ';' => {
                    push_statement(&mut statements, &mut current);
                }
                '\'' | '"' | '`' => {
                    state = State::Quoted(c);
                    current.push(c);
                }
                '[' => {
                    state = State::Quoted(']');
                    current.push(c);
                }
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    state = State::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = State::BlockComment;
                    current.push(' ');
                }
                _ => current.push(c),
            },
            State::Quoted(close) => {
                current.push(c);
                if c == close {
                    state = State::Normal;
                }
            }
            State::LineComment => {
                if c == '\n' {
                    state = State::Normal;
                    current.push('\n');
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = State::Normal;
                }
            }
        }
    }
    push_statement(&mut statements, &mut current);
    statements
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let statement = current.trim();
    if !statement.is_empty() {
        statements.push(statement.to_string());
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> (tempfile::TempDir, DatabaseEngine) {
        let dir = tempfile::tempdir().unwrap();
        let engine = DatabaseEngine::new(dir.path(), Duration::from_millis(200));
        (dir, engine)
    }

    #[test]
    fn failing_script_rolls_back_everything() {
        let (_dir, engine) = engine();
        engine.start("a.sqlite").unwrap();

        let log = engine
            .execute_script(
                "a.sqlite",
                "CREATE TABLE t(x INTEGER);\nINSERT INTO t VALUES (1);\nINSERT INTO missing VALUES (2);",
            )
            .unwrap();

        let statuses: Vec<_> = log.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![ExecStatus::Success, ExecStatus::Success, ExecStatus::Error]
        );
        assert_eq!(log[1].message, "1 row(s) affected.");
        assert_eq!(log[2].sql, "INSERT INTO missing VALUES (2)");
        assert!(log[2].message.contains("no such table"));
        assert!(engine.list_tables("a.sqlite").unwrap().is_empty());
    }

    #[test]
    fn failing_script_stops_at_first_error() {
        let (_dir, engine) = engine();
        engine.start("a.sqlite").unwrap();
        let log = engine
            .execute_script("a.sqlite", "SELEC 1; CREATE TABLE never(x);")
            .unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].status, ExecStatus::Error);
        assert!(engine.list_tables("a.sqlite").unwrap().is_empty());
    }

    #[test]
    fn successful_script_commits() {
        let (_dir, engine) = engine();
        engine.start("a.sqlite").unwrap();
        let log = engine
            .execute_script(
                "a.sqlite",
                "CREATE TABLE t(x TEXT); INSERT INTO t VALUES ('a;b'); -- trailing\nSELECT * FROM t;",
            )
            .unwrap();
        assert_eq!(log.len(), 3);
        assert!(log.iter().all(|e| e.status == ExecStatus::Success));

        match engine.execute("a.sqlite", "SELECT x FROM t").unwrap() {
            QueryResult::Rows(rows) => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0]["x"], serde_json::json!("a;b"));
            }
            other => panic!("expected rows, got {other:?}"),
        }
    }

    #[test]
    fn select_on_empty_table_returns_no_rows() {
        let (_dir, engine) = engine();
        engine.start("a.sqlite").unwrap();
        engine.execute("a.sqlite", "CREATE TABLE t(x INTEGER)").unwrap();
        assert_eq!(
            engine.execute("a.sqlite", "select * from t").unwrap(),
            QueryResult::Rows(vec![])
        );
    }

    #[test]
    fn non_read_query_reports_changes() {
        let (_dir, engine) = engine();
        engine.start("a.sqlite").unwrap();
        engine.execute("a.sqlite", "CREATE TABLE t(x INTEGER, y REAL, z TEXT)").unwrap();
        let result = engine
            .execute("a.sqlite", "INSERT INTO t VALUES (1, 1.5, NULL), (2, 2.5, 'z')")
            .unwrap();
        assert_eq!(result, QueryResult::Changed { rows_affected: 2 });

        match engine.execute("a.sqlite", "SELECT * FROM t ORDER BY x").unwrap() {
            QueryResult::Rows(rows) => {
                let keys: Vec<_> = rows[0].keys().cloned().collect();
                assert_eq!(keys, vec!["x", "y", "z"]);
                assert_eq!(rows[0]["y"], serde_json::json!(1.5));
                assert_eq!(rows[0]["z"], serde_json::Value::Null);
            }
            other => panic!("expected rows, got {other:?}"),
        }
    }

    #[test]
    fn engine_errors_carry_code() {
        let (_dir, engine) = engine();
        engine.start("a.sqlite").unwrap();
        match engine.execute("a.sqlite", "SELECT * FROM nope") {
            Err(StoreError::Engine { message, code }) => {
                assert!(message.contains("no such table"));
                assert!(code.is_some());
            }
            other => panic!("expected engine error, got {other:?}"),
        }
    }

    #[test]
    fn operations_on_missing_database_do_not_create_it() {
        let (dir, engine) = engine();
        assert!(matches!(
            engine.execute("ghost.sqlite", "SELECT 1"),
            Err(StoreError::NotFound(_))
        ));
        assert!(!dir.path().join("ghost.sqlite").exists());
    }

    #[test]
    fn names_must_be_sqlite_files() {
        assert!(matches!(
            DatabaseEngine::validate_name("x.db"),
            Err(StoreError::InvalidType(_))
        ));
        assert_eq!(
            DatabaseEngine::validate_name("../x.sqlite").unwrap(),
            "x.sqlite"
        );
    }

    #[test]
    fn backup_onto_itself_conflicts() {
        let (_dir, engine) = engine();
        engine.start("a.sqlite").unwrap();
        assert!(matches!(
            engine.backup("a.sqlite", "a.sqlite"),
            Err(StoreError::Conflict(_))
        ));
    }

    #[test]
    fn backup_copies_bytes_and_never_clobbers() {
        let (dir, engine) = engine();
        engine.start("a.sqlite").unwrap();
        engine.execute("a.sqlite", "CREATE TABLE t(x)").unwrap();
        engine.start("b.sqlite").unwrap();

        engine.backup("a.sqlite", "copy.sqlite").unwrap();
        assert_eq!(
            std::fs::read(dir.path().join("a.sqlite")).unwrap(),
            std::fs::read(dir.path().join("copy.sqlite")).unwrap()
        );
        assert!(matches!(
            engine.backup("a.sqlite", "b.sqlite"),
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            engine.backup("zzz.sqlite", "c.sqlite"),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            engine.backup("a.sqlite", "c.db"),
            Err(StoreError::InvalidType(_))
        ));

        let names: Vec<_> = engine
            .list_databases()
            .unwrap()
            .into_iter()
            .map(|d| d.dbname)
            .collect();
        assert_eq!(names, vec!["a.sqlite", "b.sqlite", "copy.sqlite"]);
    }

    #[test]
    fn delete_removes_file() {
        let (dir, engine) = engine();
        engine.start("a.sqlite").unwrap();
        engine.delete_database("a.sqlite").unwrap();
        assert!(!dir.path().join("a.sqlite").exists());
        assert!(matches!(
            engine.delete_database("a.sqlite"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn script_cannot_commit_part_of_itself() {
        let (_dir, engine) = engine();
        engine.start("a.sqlite").unwrap();

        let log = engine
            .execute_script(
                "a.sqlite",
                "CREATE TABLE t(x); COMMIT; INSERT INTO missing VALUES(1)",
            )
            .unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].status, ExecStatus::Success);
        assert_eq!(log[1].status, ExecStatus::Error);
        assert_eq!(log[1].sql, "COMMIT");
        assert_eq!(log[1].message, TRANSACTION_CONTROL_MESSAGE);
        assert!(engine.list_tables("a.sqlite").unwrap().is_empty());

        for control in ["begin", "END TRANSACTION", "rollback"] {
            let script = format!("CREATE TABLE t(x); {control}; CREATE TABLE u(x)");
            let log = engine.execute_script("a.sqlite", &script).unwrap();
            assert_eq!(log.last().unwrap().status, ExecStatus::Error);
            assert!(engine.list_tables("a.sqlite").unwrap().is_empty());
        }
    }

    #[test]
    fn lists_tables_and_views_sorted() {
        let (_dir, engine) = engine();
        engine.start("a.sqlite").unwrap();
        engine
            .execute_script(
                "a.sqlite",
                "CREATE TABLE zeta(x); CREATE TABLE alpha(x INTEGER PRIMARY KEY AUTOINCREMENT); CREATE VIEW v AS SELECT * FROM zeta;",
            )
            .unwrap();
        assert_eq!(engine.list_tables("a.sqlite").unwrap(), vec!["alpha", "zeta"]);
        assert_eq!(engine.list_views("a.sqlite").unwrap(), vec!["v"]);
    }

    #[test]
    fn locked_database_is_busy() {
        let (dir, engine) = engine();
        engine.start("a.sqlite").unwrap();
        engine.execute("a.sqlite", "CREATE TABLE t(x)").unwrap();

        let holder = Connection::open(dir.path().join("a.sqlite")).unwrap();
        holder.execute_batch("BEGIN EXCLUSIVE").unwrap();

        let err = engine.execute("a.sqlite", "INSERT INTO t VALUES (1)").unwrap_err();
        assert!(err.is_retryable(), "got {err:?}");
        holder.execute_batch("ROLLBACK").unwrap();
    }

    #[test]
    fn splitter_respects_quotes_and_comments() {
        let sql = "INSERT INTO t VALUES ('a;b', \"c;d\");\n\
                   -- comment; with semicolon\n\
                   /* block; comment */ SELECT [weird;col] FROM t;;\n  ;";
        assert_eq!(
            split_statements(sql),
            vec![
                "INSERT INTO t VALUES ('a;b', \"c;d\")".to_string(),
                "SELECT [weird;col] FROM t".to_string(),
            ]
        );
    }

    #[test]
    fn splitter_handles_escaped_quotes() {
        assert_eq!(
            split_statements("SELECT 'it''s; fine'; SELECT 2"),
            vec!["SELECT 'it''s; fine'", "SELECT 2"]
        );
    }
}
