//! Stats store abstraction and an in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::types::PlayerStats;
use crate::StatsResult;

/// Persistence for per-player statistics, keyed by player name.
#[async_trait]
pub trait StatsStore: Send + Sync {
    /// Every player, highest total correct first.
    async fn all(&self) -> StatsResult<Vec<(String, PlayerStats)>>;

    /// One player's record, if it exists.
    async fn get(&self, player: &str) -> StatsResult<Option<PlayerStats>>;

    /// Create a record for a new player.
    async fn insert(&self, player: &str, stats: &PlayerStats) -> StatsResult<()>;

    /// Replace an existing player's record.
    async fn update(&self, player: &str, stats: &PlayerStats) -> StatsResult<()>;
}

/// Order players by total correct, descending; ties by name.
pub(crate) fn rank(players: &mut [(String, PlayerStats)]) {
    players.sort_by(|a, b| {
        b.1.total_correct
            .cmp(&a.1.total_correct)
            .then_with(|| a.0.cmp(&b.0))
    });
}

/// Store kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryStatsStore {
    players: RwLock<HashMap<String, PlayerStats>>,
}

impl MemoryStatsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatsStore for MemoryStatsStore {
    async fn all(&self) -> StatsResult<Vec<(String, PlayerStats)>> {
        let mut players: Vec<_> = self
            .players
            .read()
            .await
            .iter()
            .map(|(name, stats)| (name.clone(), stats.clone()))
            .collect();
        rank(&mut players);
        Ok(players)
    }

    async fn get(&self, player: &str) -> StatsResult<Option<PlayerStats>> {
        Ok(self.players.read().await.get(player).cloned())
    }

    async fn insert(&self, player: &str, stats: &PlayerStats) -> StatsResult<()> {
        self.players
            .write()
            .await
            .insert(player.to_string(), stats.clone());
        Ok(())
    }

    async fn update(&self, player: &str, stats: &PlayerStats) -> StatsResult<()> {
        self.insert(player, stats).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(correct: i64) -> PlayerStats {
        PlayerStats {
            total_correct: correct,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_all_ranks_by_correct() {
        let store = MemoryStatsStore::new();
        store.insert("Bea", &stats(3)).await.unwrap();
        store.insert("Alice", &stats(8)).await.unwrap();
        store.insert("Carl", &stats(3)).await.unwrap();

        let names: Vec<_> = store
            .all()
            .await
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["Alice", "Bea", "Carl"]);
    }

    #[tokio::test]
    async fn test_update_replaces() {
        let store = MemoryStatsStore::new();
        store.insert("Alice", &stats(1)).await.unwrap();
        store.update("Alice", &stats(9)).await.unwrap();

        assert_eq!(store.get("Alice").await.unwrap(), Some(stats(9)));
        assert_eq!(store.get("Bob").await.unwrap(), None);
    }
}
