//! Shared application state.
//!
//! [`AppState`] is cloned into every handler. It owns no database connection:
//! the [`DatabaseEngine`] opens one per call. The function registry is built
//! lazily by [`FunctionCatalog`] and thrown away whenever the file store
//! changes the function directory.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use fnterm_script::{FunctionRegistry, LoadError, FUNCTION_EXTENSION};
use fnterm_storage::{DatabaseEngine, FileStore};

use crate::config::ServerConfig;
use crate::credentials::Credentials;
use crate::error::ApiError;
use crate::session::SessionStore;

/// Cached registry over the function directory.
#[derive(Debug)]
pub struct FunctionCatalog {
    dir: PathBuf,
    cached: RwLock<Option<Arc<FunctionRegistry>>>,
}

impl FunctionCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FunctionCatalog {
            dir: dir.into(),
            cached: RwLock::new(None),
        }
    }

    /// The current registry, rebuilding it if it was invalidated.
    pub fn current(&self) -> Result<Arc<FunctionRegistry>, LoadError> {
        if let Some(registry) = self
            .cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Ok(Arc::clone(registry));
        }

        let mut slot = self.cached.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(registry) = slot.as_ref() {
            return Ok(Arc::clone(registry));
        }
        let registry = Arc::new(FunctionRegistry::load_dir(&self.dir)?);
        *slot = Some(Arc::clone(&registry));
        Ok(registry)
    }

    pub fn invalidate(&self) {
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = None;
        tracing::debug!("function registry invalidated");
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub files: Arc<FileStore>,
    pub databases: Arc<DatabaseEngine>,
    pub functions: Arc<FunctionCatalog>,
    pub sessions: Arc<SessionStore>,
    /// Loaded credential file; `None` disables authentication.
    pub credentials: Option<Arc<Credentials>>,
}

impl AppState {
    /// Creates the state, its directories, and loads the credential file.
    pub fn new(config: ServerConfig) -> Result<Self, ApiError> {
        let files = FileStore::new(
            &config.functions_dir,
            &config.config_file,
            FUNCTION_EXTENSION,
        );
        files.ensure_dir()?;
        let databases = DatabaseEngine::new(&config.database_dir, config.busy_timeout);
        databases.ensure_dir()?;

        let credentials = Credentials::load(&config.credentials_file).map_err(|err| {
            ApiError::Internal(format!(
                "failed to read credential file {}: {}",
                config.credentials_file.display(),
                err
            ))
        })?;
        if credentials.is_some() {
            tracing::info!(file = %config.credentials_file.display(), "authentication enabled");
        }

        Ok(AppState {
            functions: Arc::new(FunctionCatalog::new(&config.functions_dir)),
            files: Arc::new(files),
            databases: Arc::new(databases),
            sessions: Arc::new(SessionStore::new(config.session_ttl)),
            credentials: credentials.map(Arc::new),
            config: Arc::new(config),
        })
    }

    pub fn auth_enabled(&self) -> bool {
        self.credentials.is_some()
    }
}
