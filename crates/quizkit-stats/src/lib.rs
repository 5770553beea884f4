//! # Quizkit Stats
//!
//! Player statistics for the quiz: the `get-stats` and `save-stats`
//! function handlers and the stores behind them.
//!
//! Missing configuration is not an error for reads (an empty mapping is
//! returned) but is for writes (503).

use thiserror::Error;

pub mod config;
pub mod database;
pub mod handlers;
pub mod store;
pub mod supabase;
pub mod types;

pub use config::{StatsBackend, StatsConfig};
pub use database::SqliteStatsStore;
pub use handlers::{FunctionEvent, FunctionResponse, StatsService};
pub use store::{MemoryStatsStore, StatsStore};
pub use supabase::SupabaseStatsStore;
pub use types::{GameRecord, GameStats, PlayerStats, MAX_GAME_HISTORY};

/// Errors raised by stats configuration and stores.
#[derive(Error, Debug)]
pub enum StatsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StatsError {
    /// Create a store error.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }
}

/// Result type alias for stats operations.
pub type StatsResult<T> = Result<T, StatsError>;
