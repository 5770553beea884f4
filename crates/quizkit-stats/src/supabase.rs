//! Hosted stats store speaking the Supabase (PostgREST) REST dialect.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::store::StatsStore;
use crate::types::{GameRecord, PlayerStats};
use crate::{StatsError, StatsResult};

const STATS_TABLE: &str = "stats";

/// A row of the `stats` table. Nullable columns default to zero/empty.
#[derive(Debug, Serialize, Deserialize)]
struct StatsRow {
    player_name: String,
    #[serde(default)]
    total_correct: Option<i64>,
    #[serde(default)]
    total_incorrect: Option<i64>,
    #[serde(default)]
    total_games: Option<i64>,
    #[serde(default)]
    games: Option<Vec<GameRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<String>,
}

impl StatsRow {
    fn new(player: &str, stats: &PlayerStats) -> Self {
        Self {
            player_name: player.to_string(),
            total_correct: Some(stats.total_correct),
            total_incorrect: Some(stats.total_incorrect),
            total_games: Some(stats.total_games),
            games: Some(stats.games.clone()),
            updated_at: None,
        }
    }

    fn into_stats(self) -> (String, PlayerStats) {
        (
            self.player_name,
            PlayerStats {
                total_correct: self.total_correct.unwrap_or(0),
                total_incorrect: self.total_incorrect.unwrap_or(0),
                total_games: self.total_games.unwrap_or(0),
                games: self.games.unwrap_or_default(),
            },
        )
    }
}

/// Columns written on update.
#[derive(Debug, Serialize)]
struct StatsUpdate<'a> {
    total_correct: i64,
    total_incorrect: i64,
    total_games: i64,
    games: &'a [GameRecord],
    updated_at: String,
}

/// PostgREST error body.
#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Stats store backed by a hosted Supabase project.
pub struct SupabaseStatsStore {
    client: Client,
    table_url: Url,
    anon_key: String,
}

impl SupabaseStatsStore {
    pub fn new(project_url: Url, anon_key: String) -> StatsResult<Self> {
        let table_url = project_url
            .join(&format!("rest/v1/{}", STATS_TABLE))
            .map_err(|e| StatsError::Config(e.to_string()))?;
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            table_url,
            anon_key,
        })
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
    }

    fn player_filter(player: &str) -> String {
        format!("eq.{}", player)
    }

    /// Turn a non-success status into a store error carrying the API message.
    async fn check(response: Response) -> StatsResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiError>(&body)
            .map(|e| e.message)
            .unwrap_or(body);
        Err(StatsError::store(format!("{}: {}", status, message)))
    }
}

#[async_trait]
impl StatsStore for SupabaseStatsStore {
    async fn all(&self) -> StatsResult<Vec<(String, PlayerStats)>> {
        let request = self
            .client
            .get(self.table_url.clone())
            .query(&[("select", "*"), ("order", "total_correct.desc")]);
        let response = Self::check(self.authorize(request).send().await?).await?;
        let rows: Vec<StatsRow> = response.json().await?;
        debug!(players = rows.len(), "Loaded stats from hosted store");
        Ok(rows.into_iter().map(StatsRow::into_stats).collect())
    }

    async fn get(&self, player: &str) -> StatsResult<Option<PlayerStats>> {
        let filter = Self::player_filter(player);
        let request = self
            .client
            .get(self.table_url.clone())
            .query(&[("select", "*"), ("player_name", filter.as_str())]);
        let response = Self::check(self.authorize(request).send().await?).await?;
        let rows: Vec<StatsRow> = response.json().await?;
        Ok(rows.into_iter().next().map(|row| row.into_stats().1))
    }

    async fn insert(&self, player: &str, stats: &PlayerStats) -> StatsResult<()> {
        let request = self
            .client
            .post(self.table_url.clone())
            .header("Prefer", "return=minimal")
            .json(&[StatsRow::new(player, stats)]);
        Self::check(self.authorize(request).send().await?).await?;
        Ok(())
    }

    async fn update(&self, player: &str, stats: &PlayerStats) -> StatsResult<()> {
        let filter = Self::player_filter(player);
        let update = StatsUpdate {
            total_correct: stats.total_correct,
            total_incorrect: stats.total_incorrect,
            total_games: stats.total_games,
            games: &stats.games,
            updated_at: Utc::now().to_rfc3339(),
        };
        let request = self
            .client
            .patch(self.table_url.clone())
            .query(&[("player_name", filter.as_str())])
            .header("Prefer", "return=minimal")
            .json(&update);
        Self::check(self.authorize(request).send().await?).await?;
        Ok(())
    }
}
