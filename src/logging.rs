//! Standardized logging macros for consistent field names and message patterns across the engine
//!
//! These macros ensure:
//! - Consistent field naming conventions
//! - Appropriate logging levels for different scenarios
//! - Structured logging with context

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

// ============================================================================
// Engine Operation Logging Macros
// ============================================================================

/// Log a scheduling-engine operation with consistent fields
#[macro_export]
macro_rules! log_engine_op {
    (warn, $operation:expr, $msg:expr) => {
        tracing::warn!(
            component = "engine",
            operation = $operation,
            "Engine operation skipped: {}", $msg
        );
    };
    ($operation:expr, card_id = $card_id:expr, $msg:expr) => {
        tracing::debug!(
            component = "engine",
            operation = $operation,
            card_id = %$card_id,
            "Engine operation: {}", $msg
        );
    };
    ($operation:expr, question_id = $question_id:expr, $msg:expr) => {
        tracing::debug!(
            component = "engine",
            operation = $operation,
            question_id = %$question_id,
            "Engine operation: {}", $msg
        );
    };
    ($operation:expr, count = $count:expr, $msg:expr) => {
        tracing::info!(
            component = "engine",
            operation = $operation,
            count = $count,
            "Engine operation: {}", $msg
        );
    };
}

// ============================================================================
// Store Operation Logging Macros
// ============================================================================

/// Log persistence operations and their results
#[macro_export]
macro_rules! log_store_operation {
    (debug, $backend:expr, $operation:expr, count = $count:expr, duration_ms = $duration:expr) => {
        tracing::debug!(
            component = "store",
            backend = $backend,
            operation = $operation,
            result_count = $count,
            duration_ms = $duration,
            "Store operation completed"
        );
    };
    (info, $backend:expr, $operation:expr, $msg:expr) => {
        tracing::info!(
            component = "store",
            backend = $backend,
            operation = $operation,
            "Store operation: {}", $msg
        );
    };
}

// ============================================================================
// System Event Logging Macros
// ============================================================================

/// Log system startup and shutdown events
#[macro_export]
macro_rules! log_system_event {
    (startup, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "startup",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (shutdown, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "shutdown",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (config, $msg:expr) => {
        tracing::info!(event_type = "configuration", "System event: {}", $msg);
    };
}

/// Log performance metrics with consistent structure
#[macro_export]
macro_rules! log_performance {
    ($operation:expr, duration_ms = $duration:expr, items = $items:expr) => {
        tracing::debug!(
            event_type = "performance",
            operation = $operation,
            duration_ms = $duration,
            items = $items,
            "Performance metrics"
        );
    };
}

/// Log validation results consistently
#[macro_export]
macro_rules! log_validation {
    (success, $component:expr, $msg:expr) => {
        tracing::debug!(
            event_type = "validation",
            component = $component,
            result = "success",
            "Validation completed: {}", $msg
        );
    };
    (failure, $component:expr, error = $error:expr) => {
        tracing::warn!(
            event_type = "validation",
            component = $component,
            result = "failure",
            error = %$error,
            "Validation failed"
        );
    };
}

/// Install the global subscriber. The returned guard must outlive the program's logging.
pub fn setup_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::fmt;

    let env_filter =
        EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = config.console_enabled.then(|| {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(true)
            .with_writer(std::io::stderr)
    });

    let (file_layer, guard) = if config.file_enabled {
        std::fs::create_dir_all(&config.log_directory)?;
        let file_appender =
            tracing_appender::rolling::daily(&config.log_directory, "study-engine.log");
        let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);
        let layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_writer(non_blocking_file);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    log_system_event!(
        startup,
        component = "logging",
        format!("logging initialized (file output: {})", config.file_enabled)
    );

    Ok(guard)
}
