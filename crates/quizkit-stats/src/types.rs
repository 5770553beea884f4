use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Number of games kept in a player's history.
pub const MAX_GAME_HISTORY: usize = 50;

/// Statistics reported by the quiz page for one finished game.
///
/// Only `correct` and `incorrect` feed the totals; every other field is
/// kept verbatim in the game history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameStats(pub Map<String, Value>);

impl GameStats {
    /// Correct answers; missing or non-whole counts as zero.
    pub fn correct(&self) -> i64 {
        self.count("correct")
    }

    /// Incorrect answers; missing or non-whole counts as zero.
    pub fn incorrect(&self) -> i64 {
        self.count("incorrect")
    }

    /// Integer value of a field; whole floats such as `8.0` count too.
    fn count(&self, field: &str) -> i64 {
        let Some(value) = self.0.get(field) else {
            return 0;
        };
        value
            .as_i64()
            .or_else(|| {
                value
                    .as_f64()
                    .filter(|n| n.fract() == 0.0 && n.abs() < i64::MAX as f64)
                    .map(|n| n as i64)
            })
            .unwrap_or(0)
    }
}

/// A game as stored in the history: the reported stats plus when it was saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    #[serde(default)]
    pub date: String,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl GameRecord {
    /// Stamp a game with the save time. The stamp replaces any reported date.
    pub fn new(game: GameStats, saved_at: DateTime<Utc>) -> Self {
        let mut details = game.0;
        details.remove("date");
        Self {
            date: saved_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            details,
        }
    }
}

/// Aggregate statistics for one player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    #[serde(default)]
    pub total_correct: i64,
    #[serde(default)]
    pub total_incorrect: i64,
    #[serde(default)]
    pub total_games: i64,
    #[serde(default)]
    pub games: Vec<GameRecord>,
}

impl PlayerStats {
    /// Record a finished game and trim the history to the newest entries.
    pub fn record_game(&mut self, game: GameStats, saved_at: DateTime<Utc>) {
        self.total_correct += game.correct();
        self.total_incorrect += game.incorrect();
        self.total_games += 1;
        self.games.push(GameRecord::new(game, saved_at));

        if self.games.len() > MAX_GAME_HISTORY {
            let excess = self.games.len() - MAX_GAME_HISTORY;
            self.games.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn game(value: Value) -> GameStats {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_first_game() {
        let mut stats = PlayerStats::default();
        let at = Utc.with_ymd_and_hms(2026, 6, 11, 18, 0, 0).unwrap();
        stats.record_game(game(json!({"correct": 8, "incorrect": 2, "level": "basic"})), at);

        assert_eq!(stats.total_games, 1);
        assert_eq!(stats.total_correct, 8);
        assert_eq!(stats.total_incorrect, 2);
        assert_eq!(stats.games.len(), 1);
        assert_eq!(stats.games[0].date, "2026-06-11T18:00:00.000Z");
        assert_eq!(stats.games[0].details["level"], "basic");
    }

    #[test]
    fn test_missing_counts_are_zero() {
        let mut stats = PlayerStats::default();
        stats.record_game(game(json!({"correct": "lots"})), Utc::now());

        assert_eq!(stats.total_correct, 0);
        assert_eq!(stats.total_incorrect, 0);
        assert_eq!(stats.total_games, 1);
    }

    #[test]
    fn test_whole_float_counts() {
        let mut stats = PlayerStats::default();
        stats.record_game(game(json!({"correct": 8.0, "incorrect": 2.5})), Utc::now());

        assert_eq!(stats.total_correct, 8);
        assert_eq!(stats.total_incorrect, 0);
    }

    #[test]
    fn test_history_keeps_newest_fifty() {
        let mut stats = PlayerStats::default();
        for round in 0..55 {
            stats.record_game(game(json!({"correct": 1, "round": round})), Utc::now());
        }

        assert_eq!(stats.games.len(), MAX_GAME_HISTORY);
        assert_eq!(stats.games[0].details["round"], 5);
        assert_eq!(stats.games[49].details["round"], 54);
        assert_eq!(stats.total_games, 55);
        assert_eq!(stats.total_correct, 55);
    }

    #[test]
    fn test_record_serializes_flat() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let record = GameRecord::new(game(json!({"correct": 3, "date": "spoofed"})), at);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value, json!({"correct": 3, "date": "2026-01-02T03:04:05.000Z"}));
    }

    #[test]
    fn test_player_stats_wire_format() {
        let stats: PlayerStats = serde_json::from_value(json!({"totalCorrect": 4})).unwrap();
        assert_eq!(stats.total_correct, 4);
        assert!(stats.games.is_empty());

        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["totalGames"], 0);
    }
}
