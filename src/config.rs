use anyhow::{Result, anyhow};
use serde::Deserialize;
use std::env;
use tracing::{info, warn};

use crate::{log_system_event, log_validation};

pub const DEFAULT_SESSION_HISTORY_LIMIT: usize = 100;

/// Complete application configuration loaded from environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
    pub chapters_file: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Json,
    Sqlite,
}

/// Where engine state is persisted between runs
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub path: String,
    pub database_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub session_history_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_history_limit: DEFAULT_SESSION_HISTORY_LIMIT,
        }
    }
}

/// Logging system configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        log_system_event!(config, "Loading engine configuration from environment variables");

        let config = Config {
            store: StoreConfig::from_env()?,
            engine: EngineConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            chapters_file: env::var("CHAPTERS_FILE").ok(),
        };

        log_system_event!(config, "Configuration loaded successfully");
        config.log_configuration_summary();

        Ok(config)
    }

    fn log_configuration_summary(&self) {
        info!(
            store_backend = ?self.store.backend,
            store_path = %self.store.path,
            session_history_limit = self.engine.session_history_limit,
            chapters_file = ?self.chapters_file,
            log_level = %self.logging.level,
            "Configuration summary"
        );
    }

    pub fn validate(&self) -> Result<()> {
        match self.store.backend {
            StoreBackend::Sqlite if !self.store.database_url.starts_with("sqlite:") => {
                return Err(anyhow!("DATABASE_URL must start with 'sqlite:'"));
            }
            StoreBackend::Json if self.store.path.trim().is_empty() => {
                return Err(anyhow!("STORE_PATH must not be empty"));
            }
            _ => {}
        }

        if self.engine.session_history_limit == 0 {
            return Err(anyhow!("SESSION_HISTORY_LIMIT must be greater than 0"));
        }

        if !["trace", "debug", "info", "warn", "error"]
            .iter()
            .any(|level| self.logging.level.to_lowercase().starts_with(level))
        {
            warn!(
                "Unrecognized log level '{}', filter may fall back to 'info'",
                self.logging.level
            );
        }

        log_validation!(
            success,
            "configuration",
            "Configuration validation completed successfully"
        );
        Ok(())
    }
}

impl StoreConfig {
    fn from_env() -> Result<Self> {
        let backend_str = env::var("STORE_BACKEND").unwrap_or_else(|_| "json".to_string());
        let backend = match backend_str.to_lowercase().as_str() {
            "json" | "file" => StoreBackend::Json,
            "sqlite" | "database" | "db" => StoreBackend::Sqlite,
            other => return Err(anyhow!("Invalid STORE_BACKEND value: '{}'", other)),
        };

        let path = env::var("STORE_PATH").unwrap_or_else(|_| "study_state.json".to_string());
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:study_engine.db?mode=rwc".to_string());

        Ok(StoreConfig {
            backend,
            path,
            database_url,
        })
    }
}

impl EngineConfig {
    fn from_env() -> Result<Self> {
        let session_history_limit = match env::var("SESSION_HISTORY_LIMIT") {
            Ok(value) => value.parse::<usize>().map_err(|_| {
                anyhow!(
                    "Invalid SESSION_HISTORY_LIMIT value: '{}'. Must be a positive integer",
                    value
                )
            })?,
            Err(_) => DEFAULT_SESSION_HISTORY_LIMIT,
        };

        Ok(EngineConfig {
            session_history_limit,
        })
    }
}

impl LoggingConfig {
    fn from_env() -> Result<Self> {
        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info,study_engine=debug".to_string());

        let file_enabled = env::var("LOG_FILE_ENABLED")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let console_enabled = env::var("LOG_CONSOLE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let log_directory = env::var("LOG_DIRECTORY").unwrap_or_else(|_| "logs".to_string());

        Ok(LoggingConfig {
            level,
            file_enabled,
            console_enabled,
            log_directory,
        })
    }
}
