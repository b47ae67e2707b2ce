//! Ranked player summaries.
//!
//! The canonical board is a bounded record sorted by total points. When
//! enabled, every refresh is mirrored into a sorted set keyed by username so
//! large deployments can page rankings without decoding the whole board.

use chrono::{DateTime, Utc};

use crate::village::errors::VillageError;
use crate::village::storage::{keys, Change, Records, ScoredMember};
use crate::village::types::{LeaderboardStore, PlayerData, PlayerSummary};

#[derive(Clone)]
pub struct Leaderboard {
    records: Records,
    limit: usize,
    mirror: bool,
}

impl Leaderboard {
    pub fn new(records: Records, limit: usize, mirror: bool) -> Self {
        Self {
            records,
            limit: limit.max(1),
            mirror,
        }
    }

    /// Replace the player's entry, re-sort and truncate to the configured bound.
    pub fn refresh_player(&self, instance: &str, player: &PlayerData, now: DateTime<Utc>) -> Result<(), VillageError> {
        let summary = player.summary();
        let limit = self.limit;
        self.records.upsert::<LeaderboardStore, (), _, _>(
            &keys::leaderboard(instance),
            now,
            || LeaderboardStore::new(now),
            |board| {
                board.players.retain(|p| p.username != summary.username);
                board.players.push(summary.clone());
                // Stable: ties keep their existing order.
                board
                    .players
                    .sort_by(|a, b| b.total_points.cmp(&a.total_points));
                board.players.truncate(limit);
                Ok(Change::Commit(()))
            },
        )?;
        if self.mirror {
            self.records.raw().z_add(
                &keys::leaderboard_scores(instance),
                &summary.username,
                summary.total_points as f64,
            )?;
        }
        Ok(())
    }

    pub fn board(&self, instance: &str) -> Result<Option<LeaderboardStore>, VillageError> {
        self.records.load(&keys::leaderboard(instance))
    }

    pub fn top(&self, instance: &str, n: usize) -> Result<Vec<PlayerSummary>, VillageError> {
        Ok(self
            .board(instance)?
            .map(|board| board.players.into_iter().take(n).collect())
            .unwrap_or_default())
    }

    /// 1-based rank. A player missing from the board ranks one past its end,
    /// so everyone ranks 1 before the board exists.
    pub fn rank(&self, instance: &str, username: &str) -> Result<usize, VillageError> {
        let players = self.board(instance)?.map(|board| board.players).unwrap_or_default();
        let position = players
            .iter()
            .position(|p| p.username == username)
            .unwrap_or(players.len());
        Ok(position + 1)
    }

    /// Highest scores from the sorted-set projection. Empty when mirroring is off.
    pub fn top_scores(&self, instance: &str, n: usize) -> Result<Vec<ScoredMember>, VillageError> {
        if !self.mirror || n == 0 {
            return Ok(Vec::new());
        }
        self.records
            .raw()
            .z_range(&keys::leaderboard_scores(instance), 0, n - 1, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::village::players::new_player;
    use crate::village::storage::MemoryStore;
    use std::sync::Arc;

    fn player(name: &str, points: u64) -> PlayerData {
        let mut p = new_player(name, 0, Utc::now());
        p.stats.social = points;
        p
    }

    fn board(limit: usize) -> Leaderboard {
        Leaderboard::new(Records::new(Arc::new(MemoryStore::new()), 4), limit, true)
    }

    #[test]
    fn refresh_keeps_one_entry_per_player_sorted() {
        let lb = board(10);
        let now = Utc::now();
        lb.refresh_player("t", &player("a", 5), now).expect("a");
        lb.refresh_player("t", &player("b", 9), now).expect("b");
        lb.refresh_player("t", &player("a", 12), now).expect("a again");
        let top = lb.top("t", 10).expect("top");
        let names: Vec<_> = top.iter().map(|s| s.username.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(top[0].total_points, 12);
    }

    #[test]
    fn board_is_truncated_to_limit() {
        let lb = board(3);
        let now = Utc::now();
        for (i, name) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            lb.refresh_player("t", &player(name, i as u64), now).expect("refresh");
        }
        let top = lb.top("t", 10).expect("top");
        assert_eq!(top.len(), 3);
        assert_eq!(top[0].username, "e");
        // Truncated player ranks one past the end.
        assert_eq!(lb.rank("t", "a").expect("rank"), 4);
    }

    #[test]
    fn rank_without_board_is_first() {
        let lb = board(3);
        assert_eq!(lb.rank("t", "ghost").expect("rank"), 1);
    }

    #[test]
    fn mirror_tracks_all_players() {
        let lb = board(1);
        let now = Utc::now();
        lb.refresh_player("t", &player("a", 3), now).expect("a");
        lb.refresh_player("t", &player("b", 7), now).expect("b");
        let scores = lb.top_scores("t", 5).expect("scores");
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].member, "b");
    }
}
