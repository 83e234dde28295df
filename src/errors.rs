use tracing::{error, warn};

/// Failures at the persistence boundary. Scheduling operations themselves never fail.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Error context for structured logging
#[derive(Debug)]
pub struct ErrorContext {
    pub operation: String,
    pub resource_id: Option<String>,
    pub resource_type: String,
}

impl ErrorContext {
    pub fn new(operation: &str, resource_type: &str) -> Self {
        Self {
            operation: operation.to_string(),
            resource_id: None,
            resource_type: resource_type.to_string(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }
}

impl StoreError {
    pub fn corrupt(resource_type: &str, id: &str, detail: impl std::fmt::Display) -> Self {
        StoreError::Corrupt(format!("{} '{}': {}", resource_type, id, detail))
    }

    /// Log the error with its context and hand it back for propagation.
    pub fn log_with_context(self, context: ErrorContext) -> Self {
        match &self {
            StoreError::Corrupt(_) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Corrupt persisted record"
                );
            }
            _ => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Store operation failed"
                );
            }
        }
        self
    }
}
