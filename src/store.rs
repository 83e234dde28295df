use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::errors::{ErrorContext, StoreError};
use crate::log_store_operation;
use crate::models::LearningState;

/// Persistence boundary for the engine's state.
#[async_trait]
pub trait LearningStore: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<LearningState>, StoreError>;

    async fn save(&self, state: &LearningState) -> Result<(), StoreError>;

    fn backend_name(&self) -> &'static str;
}

/// Whole-state JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl LearningStore for JsonFileStore {
    async fn load(&self) -> Result<Option<LearningState>, StoreError> {
        let started = Instant::now();
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log_store_operation!(info, "json", "load", "no saved state, starting fresh");
                return Ok(None);
            }
            Err(e) => {
                return Err(StoreError::from(e).log_with_context(
                    ErrorContext::new("load", "state_file").with_id(&self.path.to_string_lossy()),
                ));
            }
        };

        let state: LearningState = serde_json::from_str(&content).map_err(|e| {
            StoreError::from(e).log_with_context(
                ErrorContext::new("load", "state_file").with_id(&self.path.to_string_lossy()),
            )
        })?;

        log_store_operation!(
            debug,
            "json",
            "load",
            count = state.review_cards.len() + state.learning_patterns.len(),
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(Some(state))
    }

    async fn save(&self, state: &LearningState) -> Result<(), StoreError> {
        let started = Instant::now();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(state)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        log_store_operation!(
            debug,
            "json",
            "save",
            count = state.review_cards.len() + state.learning_patterns.len(),
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "json"
    }
}
