//! Local SQLite stats store.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::store::StatsStore;
use crate::types::{GameRecord, PlayerStats};
use crate::{StatsError, StatsResult};

/// Database schema version for migrations
const SCHEMA_VERSION: i32 = 1;

/// Initialize or open the stats database
pub fn init_database(path: &Path) -> StatsResult<Connection> {
    let conn = Connection::open(path)?;

    let table_exists: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |row| row.get::<_, i32>(0).map(|count| count > 0),
        )
        .unwrap_or(false);

    let version: i32 = if table_exists {
        conn.query_row(
            "SELECT version FROM schema_version ORDER BY id DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0)
    } else {
        0
    };

    if version < SCHEMA_VERSION {
        create_schema_v1(&conn)?;
    }

    debug!(path = %path.display(), version = SCHEMA_VERSION, "Stats database ready");
    Ok(conn)
}

/// Create initial schema (version 1)
fn create_schema_v1(conn: &Connection) -> StatsResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            version INTEGER NOT NULL,
            applied_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS stats (
            player_name TEXT PRIMARY KEY,
            total_correct INTEGER NOT NULL DEFAULT 0,
            total_incorrect INTEGER NOT NULL DEFAULT 0,
            total_games INTEGER NOT NULL DEFAULT 0,
            games TEXT NOT NULL DEFAULT '[]',
            updated_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_stats_correct ON stats(total_correct);
        "#,
    )?;

    conn.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?, ?)",
        params![SCHEMA_VERSION, Utc::now().timestamp()],
    )?;

    Ok(())
}

fn row_to_stats(row: &Row<'_>) -> rusqlite::Result<(String, i64, i64, i64, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn decode(raw: (String, i64, i64, i64, String)) -> StatsResult<(String, PlayerStats)> {
    let (name, total_correct, total_incorrect, total_games, games) = raw;
    let games: Vec<GameRecord> = serde_json::from_str(&games)?;
    Ok((
        name,
        PlayerStats {
            total_correct,
            total_incorrect,
            total_games,
            games,
        },
    ))
}

/// Load every player, highest total correct first
pub fn load_all(conn: &Connection) -> StatsResult<Vec<(String, PlayerStats)>> {
    let mut stmt = conn.prepare(
        "SELECT player_name, total_correct, total_incorrect, total_games, games
         FROM stats ORDER BY total_correct DESC, player_name ASC",
    )?;
    let rows = stmt.query_map([], row_to_stats)?;

    let mut players = Vec::new();
    for row in rows {
        players.push(decode(row?)?);
    }
    Ok(players)
}

/// Load one player
pub fn load_player(conn: &Connection, player: &str) -> StatsResult<Option<PlayerStats>> {
    let raw = conn
        .query_row(
            "SELECT player_name, total_correct, total_incorrect, total_games, games
             FROM stats WHERE player_name = ?",
            params![player],
            row_to_stats,
        )
        .optional()?;
    raw.map(decode)
        .transpose()
        .map(|found| found.map(|(_, stats)| stats))
}

/// Insert a new player
pub fn insert_player(conn: &Connection, player: &str, stats: &PlayerStats) -> StatsResult<()> {
    conn.execute(
        "INSERT INTO stats (player_name, total_correct, total_incorrect, total_games, games, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
            player,
            stats.total_correct,
            stats.total_incorrect,
            stats.total_games,
            serde_json::to_string(&stats.games)?,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Update an existing player
pub fn update_player(conn: &Connection, player: &str, stats: &PlayerStats) -> StatsResult<()> {
    let changed = conn.execute(
        "UPDATE stats SET total_correct = ?, total_incorrect = ?, total_games = ?, games = ?, updated_at = ?
         WHERE player_name = ?",
        params![
            stats.total_correct,
            stats.total_incorrect,
            stats.total_games,
            serde_json::to_string(&stats.games)?,
            Utc::now().to_rfc3339(),
            player,
        ],
    )?;
    if changed == 0 {
        return Err(StatsError::store(format!("No stats row for player {}", player)));
    }
    Ok(())
}

/// Stats store backed by a local SQLite file.
pub struct SqliteStatsStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStatsStore {
    /// Open (and migrate) the database at the given path.
    pub fn open(path: &Path) -> StatsResult<Self> {
        let conn = init_database(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a database call on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> StatsResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StatsResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| StatsError::store("stats database lock poisoned"))?;
            f(&conn)
        })
        .await
        .map_err(|e| StatsError::store(e.to_string()))?
    }
}

#[async_trait]
impl StatsStore for SqliteStatsStore {
    async fn all(&self) -> StatsResult<Vec<(String, PlayerStats)>> {
        self.with_conn(load_all).await
    }

    async fn get(&self, player: &str) -> StatsResult<Option<PlayerStats>> {
        let player = player.to_string();
        self.with_conn(move |conn| load_player(conn, &player)).await
    }

    async fn insert(&self, player: &str, stats: &PlayerStats) -> StatsResult<()> {
        let (player, stats) = (player.to_string(), stats.clone());
        self.with_conn(move |conn| insert_player(conn, &player, &stats))
            .await
    }

    async fn update(&self, player: &str, stats: &PlayerStats) -> StatsResult<()> {
        let (player, stats) = (player.to_string(), stats.clone());
        self.with_conn(move |conn| update_player(conn, &player, &stats))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GameStats;
    use serde_json::json;

    fn played(correct: i64) -> PlayerStats {
        let mut stats = PlayerStats::default();
        let game: GameStats = serde_json::from_value(json!({"correct": correct})).unwrap();
        stats.record_game(game, Utc::now());
        stats
    }

    #[tokio::test]
    async fn test_insert_get_update() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStatsStore::open(&dir.path().join("stats.db")).unwrap();

        assert!(store.get("Alice").await.unwrap().is_none());

        let stats = played(8);
        store.insert("Alice", &stats).await.unwrap();
        assert_eq!(store.get("Alice").await.unwrap(), Some(stats));

        let better = played(10);
        store.update("Alice", &better).await.unwrap();
        assert_eq!(store.get("Alice").await.unwrap(), Some(better));
    }

    #[tokio::test]
    async fn test_duplicate_insert_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStatsStore::open(&dir.path().join("stats.db")).unwrap();

        store.insert("Alice", &played(1)).await.unwrap();
        assert!(matches!(
            store.insert("Alice", &played(2)).await,
            Err(StatsError::Database(_))
        ));
        assert!(store.update("Bob", &played(2)).await.is_err());
    }

    #[tokio::test]
    async fn test_all_ordered_and_persistent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.db");
        {
            let store = SqliteStatsStore::open(&path).unwrap();
            store.insert("Bea", &played(2)).await.unwrap();
            store.insert("Alice", &played(8)).await.unwrap();
        }

        let reopened = SqliteStatsStore::open(&path).unwrap();
        let all = reopened.all().await.unwrap();
        let names: Vec<_> = all.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Bea"]);
        assert_eq!(all[0].1.games.len(), 1);
    }

    #[test]
    fn test_reopen_does_not_rerun_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.db");
        init_database(&path).unwrap();
        let conn = init_database(&path).unwrap();

        let versions: i32 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }
}
