//! # Application State
//!
//! Shared state handed to every route handler through the `State`
//! extractor: runtime configuration, the lifecycle service and the
//! optional database pool.

use std::path::PathBuf;
use std::sync::Arc;

use sqlx::PgPool;
use thiserror::Error;

use crate::auth::SecretString;
use crate::lifecycle::Lifecycle;
use crate::storage::FileStorage;

/// Default upload request body limit: 25 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Runtime configuration.
#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Bearer secret. `None` disables secret checking.
    pub auth_token: Option<SecretString>,
    /// Root directory for uploaded documents.
    pub upload_dir: PathBuf,
    /// Request body limit for the upload route.
    pub max_upload_bytes: usize,
    pub metrics_enabled: bool,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("upload_dir", &self.upload_dir)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("metrics_enabled", &self.metrics_enabled)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            upload_dir: PathBuf::from("./uploads"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            metrics_enabled: true,
        }
    }
}

impl AppConfig {
    /// Read `ADMIT_*` variables, falling back to defaults for unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let port = match lookup("ADMIT_PORT") {
            Some(raw) => parse_var("ADMIT_PORT", "a port number", &raw)?,
            None => defaults.port,
        };
        let max_upload_bytes = match lookup("ADMIT_MAX_UPLOAD_BYTES") {
            Some(raw) => parse_var("ADMIT_MAX_UPLOAD_BYTES", "a byte count", &raw)?,
            None => defaults.max_upload_bytes,
        };
        let metrics_enabled = match lookup("ADMIT_METRICS_ENABLED") {
            Some(raw) => parse_flag("ADMIT_METRICS_ENABLED", &raw)?,
            None => defaults.metrics_enabled,
        };
        let auth_token = lookup("ADMIT_AUTH_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .map(SecretString::new);
        let upload_dir = lookup("ADMIT_UPLOAD_DIR")
            .filter(|d| !d.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.upload_dir);

        Ok(Self {
            port,
            auth_token,
            upload_dir,
            max_upload_bytes,
            metrics_enabled,
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    var: &'static str,
    expected: &'static str,
    raw: &str,
) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        var,
        expected,
        value: raw.to_string(),
    })
}

fn parse_flag(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            expected: "true or false",
            value: raw.to_string(),
        }),
    }
}

/// Shared application state. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub lifecycle: Arc<Lifecycle>,
    pub db_pool: Option<PgPool>,
}

impl AppState {
    /// Default configuration, in-memory only.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default(), None)
    }

    pub fn with_config(config: AppConfig, db_pool: Option<PgPool>) -> Self {
        let storage = FileStorage::new(config.upload_dir.clone());
        let lifecycle = Arc::new(Lifecycle::new(storage, db_pool.clone()));
        Self {
            config,
            lifecycle,
            db_pool,
        }
    }

    /// Load the catalog and every application from Postgres. A no-op when
    /// running in-memory only.
    pub async fn hydrate_from_db(&self) -> Result<(), sqlx::Error> {
        let Some(pool) = &self.db_pool else {
            return Ok(());
        };

        let catalog = crate::db::catalog::load(pool).await?;
        let program_count = catalog.programs().count();
        let department_count = catalog.departments().len();

        let applications = crate::db::applications::load_all(pool).await?;
        let application_count = applications.len();

        self.lifecycle.restore(catalog, applications);

        tracing::info!(
            departments = department_count,
            programs = program_count,
            applications = application_count,
            "hydrated in-memory state from database"
        );
        Ok(())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
