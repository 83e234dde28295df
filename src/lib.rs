pub mod logging;

pub mod adaptive;
pub mod clock;
pub mod config;
pub mod database;
pub mod errors;
pub mod gap_analyzer;
pub mod learning_service;
pub mod models;
pub mod pattern_tracker;
pub mod sm2_scheduler;
pub mod store;
pub mod study_planner;

pub use clock::{Clock, FixedClock, IdGenerator, SequentialIdGenerator, SystemClock, UuidGenerator};
pub use config::{Config, EngineConfig, StoreBackend};
pub use database::Database;
pub use errors::*;
pub use learning_service::LearningService;
pub use models::*;
pub use sm2_scheduler::{MAX_INTERVAL_DAYS, Quality, Sm2Scheduler};
pub use store::{JsonFileStore, LearningStore};
