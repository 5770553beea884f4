//! `get-stats` and `save-stats` function handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{error, info, warn};

use crate::store::StatsStore;
use crate::types::{GameStats, PlayerStats};
use crate::StatsResult;

/// An incoming function invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionEvent {
    pub http_method: String,
    #[serde(default)]
    pub body: Option<String>,
}

impl FunctionEvent {
    pub fn new(http_method: &str, body: Option<&str>) -> Self {
        Self {
            http_method: http_method.to_string(),
            body: body.map(str::to_string),
        }
    }
}

/// A function response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl FunctionResponse {
    /// JSON response with CORS headers allowing `method`.
    pub fn json(status_code: u16, method: &str, body: &Value) -> Self {
        Self {
            status_code,
            headers: cors_headers(method),
            body: body.to_string(),
        }
    }

    /// Empty preflight response.
    pub fn preflight(method: &str) -> Self {
        Self {
            status_code: 200,
            headers: cors_headers(method),
            body: String::new(),
        }
    }

    /// 500 response carrying an error message.
    pub fn internal_error(method: &str, message: &str) -> Self {
        Self::json(
            500,
            method,
            &json!({"error": "Internal server error", "message": message}),
        )
    }

    /// Parsed JSON body.
    pub fn body_json(&self) -> serde_json::Result<Value> {
        serde_json::from_str(&self.body)
    }
}

fn cors_headers(method: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("Access-Control-Allow-Origin".to_string(), "*".to_string()),
        (
            "Access-Control-Allow-Headers".to_string(),
            "Content-Type".to_string(),
        ),
        (
            "Access-Control-Allow-Methods".to_string(),
            format!("{}, OPTIONS", method),
        ),
        ("Content-Type".to_string(), "application/json".to_string()),
    ])
}

/// Common method gate: preflight, then 405 for anything but `method`.
fn gate(event: &FunctionEvent, method: &str) -> Option<FunctionResponse> {
    if event.http_method == "OPTIONS" {
        return Some(FunctionResponse::preflight(method));
    }
    if event.http_method != method {
        return Some(FunctionResponse::json(
            405,
            method,
            &json!({"error": "Method not allowed"}),
        ));
    }
    None
}

/// Validated `save-stats` payload.
struct SaveRequest {
    player_name: String,
    game_stats: GameStats,
}

/// Pull the required fields out of a parsed body. `None` means a field is
/// missing, empty or of the wrong shape.
fn validate(body: &Value) -> Option<SaveRequest> {
    let player_name = body
        .get("playerName")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())?;
    let game_stats = body.get("gameStats").and_then(Value::as_object)?;
    Some(SaveRequest {
        player_name: player_name.to_string(),
        game_stats: GameStats(game_stats.clone()),
    })
}

/// Serves both stats endpoints against an optional store.
#[derive(Clone)]
pub struct StatsService {
    store: Option<Arc<dyn StatsStore>>,
}

impl StatsService {
    /// Service over a store; `None` means no backend is configured.
    pub fn new(store: Option<Arc<dyn StatsStore>>) -> Self {
        Self { store }
    }

    pub fn is_configured(&self) -> bool {
        self.store.is_some()
    }

    /// Handle `get-stats`.
    pub async fn get_stats(&self, event: &FunctionEvent) -> FunctionResponse {
        if let Some(response) = gate(event, "GET") {
            return response;
        }

        let Some(store) = &self.store else {
            warn!("Stats store not configured, returning empty stats");
            return FunctionResponse::json(200, "GET", &json!({}));
        };

        match store.all().await.and_then(leaderboard) {
            Ok(body) => FunctionResponse::json(200, "GET", &body),
            Err(e) => {
                error!(error = %e, "Error getting statistics");
                FunctionResponse::internal_error("GET", &e.to_string())
            }
        }
    }

    /// Handle `save-stats`.
    pub async fn save_stats(&self, event: &FunctionEvent) -> FunctionResponse {
        self.save_stats_at(event, Utc::now()).await
    }

    /// Handle `save-stats`, stamping the game with `now`.
    pub async fn save_stats_at(&self, event: &FunctionEvent, now: DateTime<Utc>) -> FunctionResponse {
        if let Some(response) = gate(event, "POST") {
            return response;
        }

        let body: Value = match serde_json::from_str(event.body.as_deref().unwrap_or_default()) {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "Error saving statistics");
                return FunctionResponse::internal_error("POST", &e.to_string());
            }
        };

        let Some(request) = validate(&body) else {
            return FunctionResponse::json(
                400,
                "POST",
                &json!({"error": "Missing required fields: playerName, gameStats"}),
            );
        };

        let Some(store) = &self.store else {
            warn!("Stats store not configured, rejecting save");
            return FunctionResponse::json(
                503,
                "POST",
                &json!({
                    "error": "Database not configured",
                    "message": "Please configure the stats database (SUPABASE_URL and SUPABASE_ANON_KEY, or QUIZKIT_STATS_DB)."
                }),
            );
        };

        match record(store.as_ref(), request, now).await {
            Ok(()) => FunctionResponse::json(
                200,
                "POST",
                &json!({"success": true, "message": "Statistics saved successfully"}),
            ),
            Err(e) => {
                error!(error = %e, "Error saving statistics");
                FunctionResponse::internal_error("POST", &e.to_string())
            }
        }
    }
}

/// Players keyed by name, in the store's ranking order.
fn leaderboard(players: Vec<(String, PlayerStats)>) -> StatsResult<Value> {
    let mut board = Map::with_capacity(players.len());
    for (name, stats) in players {
        board.insert(name, serde_json::to_value(stats)?);
    }
    Ok(Value::Object(board))
}

/// Load-modify-store for one finished game.
async fn record(store: &dyn StatsStore, request: SaveRequest, now: DateTime<Utc>) -> StatsResult<()> {
    let player = request.player_name;
    let existing = store.get(&player).await?;
    let is_new = existing.is_none();

    let mut stats = existing.unwrap_or_default();
    stats.record_game(request.game_stats, now);

    if is_new {
        store.insert(&player, &stats).await?;
    } else {
        store.update(&player, &stats).await?;
    }
    info!(player = %player, total_games = stats.total_games, "Statistics saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStatsStore;
    use crate::StatsError;
    use async_trait::async_trait;

    /// Store whose every call fails.
    struct BrokenStore;

    #[async_trait]
    impl StatsStore for BrokenStore {
        async fn all(&self) -> StatsResult<Vec<(String, PlayerStats)>> {
            Err(StatsError::store("connection reset"))
        }
        async fn get(&self, _player: &str) -> StatsResult<Option<PlayerStats>> {
            Err(StatsError::store("connection reset"))
        }
        async fn insert(&self, _player: &str, _stats: &PlayerStats) -> StatsResult<()> {
            Err(StatsError::store("connection reset"))
        }
        async fn update(&self, _player: &str, _stats: &PlayerStats) -> StatsResult<()> {
            Err(StatsError::store("connection reset"))
        }
    }

    fn service() -> (StatsService, Arc<MemoryStatsStore>) {
        let store = Arc::new(MemoryStatsStore::new());
        (StatsService::new(Some(store.clone())), store)
    }

    fn post(body: Value) -> FunctionEvent {
        FunctionEvent::new("POST", Some(&body.to_string()))
    }

    #[tokio::test]
    async fn test_save_new_player() {
        let (service, store) = service();
        let response = service
            .save_stats(&post(json!({
                "playerName": "Alice",
                "gameStats": {"correct": 8, "incorrect": 2}
            })))
            .await;

        assert_eq!(response.status_code, 200);
        assert_eq!(response.body_json().unwrap()["success"], true);

        let alice = store.get("Alice").await.unwrap().unwrap();
        assert_eq!(alice.total_games, 1);
        assert_eq!(alice.total_correct, 8);
        assert_eq!(alice.total_incorrect, 2);
        assert_eq!(alice.games.len(), 1);
    }

    #[tokio::test]
    async fn test_save_accumulates() {
        let (service, store) = service();
        for (correct, incorrect) in [(8, 2), (5, 5)] {
            let response = service
                .save_stats(&post(json!({
                    "playerName": "Alice",
                    "gameStats": {"correct": correct, "incorrect": incorrect}
                })))
                .await;
            assert_eq!(response.status_code, 200);
        }

        let alice = store.get("Alice").await.unwrap().unwrap();
        assert_eq!(alice.total_games, 2);
        assert_eq!(alice.total_correct, 13);
        assert_eq!(alice.total_incorrect, 7);
    }

    #[tokio::test]
    async fn test_missing_fields_is_400_even_unconfigured() {
        let unconfigured = StatsService::new(None);
        let (configured, _) = service();

        for service in [&unconfigured, &configured] {
            let response = service.save_stats(&post(json!({"playerName": "Alice"}))).await;
            assert_eq!(response.status_code, 400);

            let response = service
                .save_stats(&post(json!({"playerName": "", "gameStats": {"correct": 1}})))
                .await;
            assert_eq!(response.status_code, 400);

            let response = service
                .save_stats(&post(json!({"playerName": "Alice", "gameStats": null})))
                .await;
            assert_eq!(response.status_code, 400);
        }
    }

    #[tokio::test]
    async fn test_save_unconfigured_is_503() {
        let response = StatsService::new(None)
            .save_stats(&post(json!({"playerName": "Alice", "gameStats": {}})))
            .await;
        assert_eq!(response.status_code, 503);
        assert_eq!(
            response.body_json().unwrap()["error"],
            "Database not configured"
        );
    }

    #[tokio::test]
    async fn test_save_malformed_body_is_500() {
        let (service, _) = service();
        let response = service
            .save_stats(&FunctionEvent::new("POST", Some("{oops")))
            .await;
        assert_eq!(response.status_code, 500);

        let response = service.save_stats(&FunctionEvent::new("POST", None)).await;
        assert_eq!(response.status_code, 500);
    }

    #[tokio::test]
    async fn test_store_failure_is_500_with_message() {
        let service = StatsService::new(Some(Arc::new(BrokenStore)));

        let response = service
            .save_stats(&post(json!({"playerName": "Alice", "gameStats": {}})))
            .await;
        assert_eq!(response.status_code, 500);
        let body = response.body_json().unwrap();
        assert_eq!(body["error"], "Internal server error");
        assert!(body["message"].as_str().unwrap().contains("connection reset"));

        let response = service.get_stats(&FunctionEvent::new("GET", None)).await;
        assert_eq!(response.status_code, 500);
    }

    #[tokio::test]
    async fn test_get_stats() {
        let (service, _) = service();
        service
            .save_stats(&post(json!({"playerName": "Alice", "gameStats": {"correct": 8}})))
            .await;

        let response = service.get_stats(&FunctionEvent::new("GET", None)).await;
        assert_eq!(response.status_code, 200);

        let body = response.body_json().unwrap();
        assert_eq!(body["Alice"]["totalCorrect"], 8);
        assert_eq!(body["Alice"]["totalIncorrect"], 0);
        assert_eq!(body["Alice"]["totalGames"], 1);
        assert_eq!(body["Alice"]["games"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_stats_keeps_ranking() {
        let (service, _) = service();
        for (name, correct) in [("Alice", 1), ("Zed", 9), ("Mia", 5)] {
            service
                .save_stats(&post(json!({"playerName": name, "gameStats": {"correct": correct}})))
                .await;
        }

        let response = service.get_stats(&FunctionEvent::new("GET", None)).await;
        let body = response.body_json().unwrap();
        let names: Vec<_> = body.as_object().unwrap().keys().cloned().collect();
        assert_eq!(names, vec!["Zed", "Mia", "Alice"]);
    }

    #[tokio::test]
    async fn test_get_unconfigured_is_empty() {
        let response = StatsService::new(None)
            .get_stats(&FunctionEvent::new("GET", None))
            .await;
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, "{}");
    }

    #[tokio::test]
    async fn test_method_gate() {
        let (service, _) = service();

        let preflight = service.get_stats(&FunctionEvent::new("OPTIONS", None)).await;
        assert_eq!(preflight.status_code, 200);
        assert!(preflight.body.is_empty());
        assert_eq!(
            preflight.headers["Access-Control-Allow-Methods"],
            "GET, OPTIONS"
        );
        assert_eq!(preflight.headers["Access-Control-Allow-Origin"], "*");

        let wrong = service.get_stats(&FunctionEvent::new("POST", None)).await;
        assert_eq!(wrong.status_code, 405);

        let lowercase = service.get_stats(&FunctionEvent::new("get", None)).await;
        assert_eq!(lowercase.status_code, 405);
        let lowercase = service.save_stats(&FunctionEvent::new("post", None)).await;
        assert_eq!(lowercase.status_code, 405);

        let wrong = service.save_stats(&FunctionEvent::new("GET", None)).await;
        assert_eq!(wrong.status_code, 405);
        assert_eq!(wrong.headers["Access-Control-Allow-Methods"], "POST, OPTIONS");
    }

    #[test]
    fn test_event_wire_format() {
        let event: FunctionEvent =
            serde_json::from_value(json!({"httpMethod": "GET", "path": "/stats"})).unwrap();
        assert_eq!(event.http_method, "GET");
        assert!(event.body.is_none());

        let response = FunctionResponse::preflight("GET");
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["statusCode"], 200);
    }
}
