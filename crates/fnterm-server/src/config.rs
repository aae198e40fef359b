//! Server configuration read from `FNTERM_*` environment variables.
//!
//! Every path defaults to a location under `FNTERM_ROOT` (default `.`):
//!
//! | Variable | Default |
//! |---|---|
//! | `FNTERM_HOST` | `0.0.0.0` |
//! | `FNTERM_PORT` | `3000` |
//! | `FNTERM_FUNCTIONS_DIR` | `<root>/functions` |
//! | `FNTERM_DATABASE_DIR` | `<root>/database` |
//! | `FNTERM_CONFIG_FILE` | `<root>/config/config.fn` |
//! | `FNTERM_CREDENTIALS_FILE` | `<root>/.env` |
//! | `FNTERM_STATIC_DIR` | unset (no static files) |
//! | `FNTERM_BUSY_TIMEOUT_MS` | `5000` |
//! | `FNTERM_MAX_UPLOAD_BYTES` | `10485760` |
//! | `FNTERM_SESSION_TTL_SECS` | `86400` |

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub functions_dir: PathBuf,
    pub database_dir: PathBuf,
    pub config_file: PathBuf,
    pub credentials_file: PathBuf,
    pub static_dir: Option<PathBuf>,
    pub busy_timeout: Duration,
    pub max_upload_bytes: usize,
    /// Lifetime of a login session.
    pub session_ttl: Duration,
}

impl ServerConfig {
    /// Default layout under `root`.
    pub fn rooted(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        ServerConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            functions_dir: root.join("functions"),
            database_dir: root.join("database"),
            config_file: root.join("config").join("config.fn"),
            credentials_file: root.join(".env"),
            static_dir: None,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let root = var("FNTERM_ROOT").unwrap_or_else(|| ".".to_string());
        let mut config = ServerConfig::rooted(root);

        if let Some(host) = var("FNTERM_HOST") {
            config.host = host;
        }
        if let Some(port) = var("FNTERM_PORT") {
            config.port = parse("FNTERM_PORT", port)?;
        }
        if let Some(dir) = var("FNTERM_FUNCTIONS_DIR") {
            config.functions_dir = dir.into();
        }
        if let Some(dir) = var("FNTERM_DATABASE_DIR") {
            config.database_dir = dir.into();
        }
        if let Some(file) = var("FNTERM_CONFIG_FILE") {
            config.config_file = file.into();
        }
        if let Some(file) = var("FNTERM_CREDENTIALS_FILE") {
            config.credentials_file = file.into();
        }
        config.static_dir = var("FNTERM_STATIC_DIR").map(PathBuf::from);
        if let Some(ms) = var("FNTERM_BUSY_TIMEOUT_MS") {
            config.busy_timeout = Duration::from_millis(parse("FNTERM_BUSY_TIMEOUT_MS", ms)?);
        }
        if let Some(bytes) = var("FNTERM_MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = parse("FNTERM_MAX_UPLOAD_BYTES", bytes)?;
        }
        if let Some(secs) = var("FNTERM_SESSION_TTL_SECS") {
            config.session_ttl = Duration::from_secs(parse("FNTERM_SESSION_TTL_SECS", secs)?);
        }
        Ok(config)
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { var, value })
}
