//! Stats backend configuration from the environment.

use std::path::PathBuf;
use std::sync::Arc;

use url::Url;

use crate::database::SqliteStatsStore;
use crate::store::StatsStore;
use crate::supabase::SupabaseStatsStore;
use crate::{StatsError, StatsResult};

/// Hosted database URL.
pub const SUPABASE_URL_ENV: &str = "SUPABASE_URL";
/// Hosted database anonymous key.
pub const SUPABASE_KEY_ENV: &str = "SUPABASE_ANON_KEY";
/// Path of a local SQLite database, used when no hosted database is set.
pub const SQLITE_PATH_ENV: &str = "QUIZKIT_STATS_DB";

/// Where player statistics live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsBackend {
    /// Hosted PostgREST endpoint.
    Supabase { url: Url, anon_key: String },
    /// Local SQLite file.
    Sqlite { path: PathBuf },
}

/// Stats configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsConfig {
    /// `None` when no backend is configured.
    pub backend: Option<StatsBackend>,
}

impl StatsConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> StatsResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration from an arbitrary variable lookup.
    ///
    /// Empty values count as unset. The hosted database needs both its URL
    /// and key; with only one of them it is treated as unconfigured.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> StatsResult<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let (Some(url), Some(anon_key)) = (var(SUPABASE_URL_ENV), var(SUPABASE_KEY_ENV)) {
            let url = Url::parse(&url)
                .map_err(|e| StatsError::Config(format!("{}: {}", SUPABASE_URL_ENV, e)))?;
            return Ok(Self {
                backend: Some(StatsBackend::Supabase { url, anon_key }),
            });
        }

        let backend = var(SQLITE_PATH_ENV).map(|path| StatsBackend::Sqlite {
            path: PathBuf::from(path),
        });
        Ok(Self { backend })
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    /// Open the configured store, if any.
    pub fn connect(&self) -> StatsResult<Option<Arc<dyn StatsStore>>> {
        let store: Arc<dyn StatsStore> = match &self.backend {
            None => return Ok(None),
            Some(StatsBackend::Supabase { url, anon_key }) => {
                Arc::new(SupabaseStatsStore::new(url.clone(), anon_key.clone())?)
            }
            Some(StatsBackend::Sqlite { path }) => Arc::new(SqliteStatsStore::open(path)?),
        };
        Ok(Some(store))
    }
}
