//! fnterm operator CLI.
//!
//! Provides the `fnterm` binary for tasks that do not need the HTTP server:
//! hashing passwords for the credential file, listing and calling functions
//! from a function directory, and running an SQL script against a database
//! with the same transactional semantics as the `upload-sql` command.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use serde::Serialize;

use fnterm_script::{FunctionRegistry, Value};
use fnterm_server::config::ServerConfig;
use fnterm_server::credentials::{hash_password, verify_password};
use fnterm_storage::{DatabaseEngine, ExecStatus};
use tracing_subscriber::EnvFilter;

/// fnterm server tools.
#[derive(Parser)]
#[command(name = "fnterm", about = "fnterm server tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hash a password for APP_PASSWORD or MASTER_PASSWORD.
    HashPassword {
        password: String,
    },

    /// List the functions of a function directory.
    Functions {
        /// Function directory (default: FNTERM_FUNCTIONS_DIR or ./functions).
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Call a function with positional arguments.
    Call {
        name: String,

        args: Vec<String>,

        /// Function directory (default: FNTERM_FUNCTIONS_DIR or ./functions).
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Run an SQL script inside one transaction.
    RunScript {
        /// Path to the `.sqlite` database; it must already exist.
        #[arg(long)]
        db: PathBuf,

        /// Path to the SQL script.
        #[arg(short, long)]
        file: PathBuf,

        /// Busy timeout in milliseconds.
        #[arg(long, default_value_t = 5000)]
        busy_timeout_ms: u64,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::HashPassword { password } => run_hash_password(&password),
        Commands::Functions { dir } => run_functions(dir),
        Commands::Call { name, args, dir } => run_call(&name, args, dir),
        Commands::RunScript {
            db,
            file,
            busy_timeout_ms,
        } => run_script(&db, &file, busy_timeout_ms),
    };
    process::exit(exit_code);
}

fn run_hash_password(password: &str) -> i32 {
    let hash = match hash_password(password) {
        Ok(hash) => hash,
        Err(e) => {
            eprintln!("Error: failed to hash password: {}", e);
            return 1;
        }
    };
    if !verify_password(password, &hash) {
        eprintln!("Error: generated hash failed verification");
        return 1;
    }
    println!("{}", hash);
    eprintln!("Copy the hash into APP_PASSWORD or MASTER_PASSWORD in the credential file.");
    0
}

/// Resolves the function directory from the flag or the server configuration.
fn functions_dir(dir: Option<PathBuf>) -> Result<PathBuf, String> {
    match dir {
        Some(dir) => Ok(dir),
        None => ServerConfig::from_env()
            .map(|config| config.functions_dir)
            .map_err(|e| e.to_string()),
    }
}

fn load_registry(dir: Option<PathBuf>) -> Result<FunctionRegistry, String> {
    let dir = functions_dir(dir)?;
    FunctionRegistry::load_dir(&dir).map_err(|e| e.to_string())
}

fn run_functions(dir: Option<PathBuf>) -> i32 {
    let registry = match load_registry(dir) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 3;
        }
    };
    print_json(&registry.descriptors())
}

/// Returns exit code: 0 = success, 1 = invocation error, 3 = load error.
fn run_call(name: &str, args: Vec<String>, dir: Option<PathBuf>) -> i32 {
    let registry = match load_registry(dir) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 3;
        }
    };
    let args = args.into_iter().map(Value::Str).collect();
    match registry.invoke(name, args) {
        Ok(value) => print_json(&value.into_json()),
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

/// Returns exit code: 0 = committed, 1 = rolled back, 3 = I/O or engine error.
fn run_script(db: &Path, file: &Path, busy_timeout_ms: u64) -> i32 {
    let script = match std::fs::read_to_string(file) {
        Ok(script) => script,
        Err(e) => {
            eprintln!("Error: failed to read '{}': {}", file.display(), e);
            return 3;
        }
    };

    let dir = db.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let name = db
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let engine = DatabaseEngine::new(dir, std::time::Duration::from_millis(busy_timeout_ms));

    let log = match engine.execute_script(&name, &script) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 3;
        }
    };

    let failed = log.iter().any(|entry| entry.status == ExecStatus::Error);
    let code = print_json(&log);
    if failed {
        eprintln!("Script failed; all statements were rolled back.");
        return 1;
    }
    code
}

fn print_json<T: Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{}", text);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}
