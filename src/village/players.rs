//! Player records.
//!
//! A player is written into its home shard and located through a per-player
//! index entry (`playerIndex:{instance}:{username}` -> shard id). The index is
//! claimed with compare-and-swap before the shard insert, so two concurrent
//! joins for the same name always land in the same shard and only one of them
//! creates the record.

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::logutil::escape_log;
use crate::metrics;
use crate::village::errors::VillageError;
use crate::village::leaderboard::Leaderboard;
use crate::village::shard::ShardRouter;
use crate::village::storage::{backoff, keys, Change, Records};
use crate::village::types::{GameState, HouseData, Inventory, PlayerData, PlayerShard, PlayerStats};

/// A brand-new player record with the starting house and inventory.
pub fn new_player(username: &str, shard_id: u32, now: DateTime<Utc>) -> PlayerData {
    PlayerData {
        username: username.to_string(),
        joined_at: now,
        last_active: now,
        shard_id,
        revision: 0,
        house: HouseData::default(),
        inventory: Inventory::default(),
        stats: PlayerStats::default(),
        quest_ids: Vec::new(),
        rewarded_quests: Vec::new(),
        pet: None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
    Created(PlayerData),
    Existing(PlayerData),
}

impl JoinOutcome {
    pub fn player(&self) -> &PlayerData {
        match self {
            JoinOutcome::Created(p) | JoinOutcome::Existing(p) => p,
        }
    }

    pub fn into_player(self) -> PlayerData {
        match self {
            JoinOutcome::Created(p) | JoinOutcome::Existing(p) => p,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, JoinOutcome::Created(_))
    }
}

enum Placement {
    Inserted(PlayerData),
    Existing(PlayerData),
    Full,
}

fn encode_shard(shard_id: u32) -> Vec<u8> {
    shard_id.to_string().into_bytes()
}

fn decode_shard(raw: &[u8]) -> Result<u32, VillageError> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| VillageError::Store("corrupt player index entry".to_string()))
}

#[derive(Clone)]
pub struct PlayerStore {
    records: Records,
    router: ShardRouter,
    leaderboard: Leaderboard,
    max_retries: u32,
}

impl PlayerStore {
    pub fn new(records: Records, router: ShardRouter, leaderboard: Leaderboard, max_retries: u32) -> Self {
        Self {
            records,
            router,
            leaderboard,
            max_retries,
        }
    }

    fn require_initialized(&self, instance: &str) -> Result<(), VillageError> {
        match self.records.load::<GameState>(&keys::game_state(instance))? {
            Some(_) => Ok(()),
            None => Err(VillageError::Uninitialized(instance.to_string())),
        }
    }

    /// Shard recorded for `username`, if the player was ever placed.
    pub fn home_shard(&self, instance: &str, username: &str) -> Result<Option<u32>, VillageError> {
        match self.records.raw().get(&keys::player_index(instance, username))? {
            Some(raw) => Ok(Some(decode_shard(&raw)?)),
            None => Ok(None),
        }
    }

    fn claim_index(&self, instance: &str, username: &str, shard_id: u32) -> Result<u32, VillageError> {
        let key = keys::player_index(instance, username);
        if self
            .records
            .raw()
            .compare_and_swap(&key, None, encode_shard(shard_id))?
        {
            return Ok(shard_id);
        }
        self.home_shard(instance, username)?
            .ok_or_else(|| VillageError::Store(format!("index entry for {} vanished", username)))
    }

    fn move_index(&self, instance: &str, username: &str, from: u32, to: u32) -> Result<u32, VillageError> {
        let key = keys::player_index(instance, username);
        let expected = encode_shard(from);
        if self
            .records
            .raw()
            .compare_and_swap(&key, Some(&expected), encode_shard(to))?
        {
            return Ok(to);
        }
        self.home_shard(instance, username)?
            .ok_or_else(|| VillageError::Store(format!("index entry for {} vanished", username)))
    }

    pub fn get(&self, instance: &str, username: &str) -> Result<Option<PlayerData>, VillageError> {
        let Some(shard_id) = self.home_shard(instance, username)? else {
            return Ok(None);
        };
        Ok(self
            .router
            .load_shard(instance, shard_id)?
            .and_then(|mut shard| shard.players.remove(username)))
    }

    /// Write `player` into its home shard.
    ///
    /// Fails with `Conflict` if the stored record's revision differs from
    /// `player.revision`. On success the returned record carries the new
    /// revision and the leaderboard has been refreshed.
    pub fn save(&self, instance: &str, player: &PlayerData, now: DateTime<Utc>) -> Result<PlayerData, VillageError> {
        self.require_initialized(instance)?;
        let shard_id = match self.home_shard(instance, &player.username)? {
            Some(id) => id,
            None => self.claim_index(instance, &player.username, player.shard_id)?,
        };
        let expected = player.revision;
        let (_, saved) = self.records.upsert::<PlayerShard, PlayerData, _, _>(
            &keys::player_shard(instance, shard_id),
            now,
            || PlayerShard::new(shard_id, now),
            |shard| {
                if let Some(stored) = shard.players.get(&player.username) {
                    if stored.revision != expected {
                        return Err(VillageError::Conflict(format!(
                            "stale player record for {} (have {}, stored {})",
                            player.username, expected, stored.revision
                        )));
                    }
                }
                let mut next = player.clone();
                next.shard_id = shard_id;
                next.revision = expected.wrapping_add(1);
                shard.players.insert(next.username.clone(), next.clone());
                Ok(Change::Commit(next))
            },
        )?;
        if let Err(e) = self.leaderboard.refresh_player(instance, &saved, now) {
            metrics::inc_store_failures();
            warn!(
                "leaderboard refresh failed for {}: {}",
                escape_log(&saved.username),
                e
            );
        }
        Ok(saved)
    }

    /// Load, mutate and save a player, reloading and re-running `f` when a
    /// concurrent save wins. `Ok(None)` when the player does not exist.
    pub fn update<R, F>(
        &self,
        instance: &str,
        username: &str,
        now: DateTime<Utc>,
        mut f: F,
    ) -> Result<Option<(PlayerData, R)>, VillageError>
    where
        F: FnMut(&mut PlayerData) -> Result<Change<R>, VillageError>,
    {
        for attempt in 0..=self.max_retries {
            let Some(mut player) = self.get(instance, username)? else {
                return Ok(None);
            };
            match f(&mut player)? {
                Change::Abort(result) => return Ok(Some((player, result))),
                Change::Commit(result) => match self.save(instance, &player, now) {
                    Ok(saved) => return Ok(Some((saved, result))),
                    Err(VillageError::Conflict(reason)) => {
                        metrics::inc_cas_retries();
                        debug!("player update retry {} for {}: {}", attempt + 1, escape_log(username), reason);
                        backoff(attempt);
                    }
                    Err(e) => return Err(e),
                },
            }
        }
        Err(VillageError::Conflict(format!(
            "player {} changed concurrently {} times",
            username,
            self.max_retries + 1
        )))
    }

    /// Place a new player, or return the existing record.
    ///
    /// `make_quests` runs only when the player did not exist at the start
    /// of the call; its ids are attached to the created record.
    pub fn join<F>(
        &self,
        instance: &str,
        username: &str,
        now: DateTime<Utc>,
        make_quests: F,
    ) -> Result<JoinOutcome, VillageError>
    where
        F: FnOnce() -> Result<Vec<String>, VillageError>,
    {
        self.require_initialized(instance)?;
        if let Some(existing) = self.get(instance, username)? {
            return Ok(JoinOutcome::Existing(existing));
        }

        let mut target = match self.home_shard(instance, username)? {
            Some(id) => id,
            None => {
                let home = self.router.home_shard_for(instance, username, now)?;
                self.claim_index(instance, username, home)?
            }
        };

        let mut candidate = new_player(username, target, now);
        candidate.quest_ids = make_quests()?;
        let capacity = self.router.capacity();

        for _ in 0..=self.max_retries {
            candidate.shard_id = target;
            let (_, placement) = self.records.upsert::<PlayerShard, Placement, _, _>(
                &keys::player_shard(instance, target),
                now,
                || PlayerShard::new(target, now),
                |shard| {
                    if let Some(existing) = shard.players.get(username) {
                        return Ok(Change::Abort(Placement::Existing(existing.clone())));
                    }
                    if shard.len() >= capacity {
                        return Ok(Change::Abort(Placement::Full));
                    }
                    shard.players.insert(username.to_string(), candidate.clone());
                    Ok(Change::Commit(Placement::Inserted(candidate.clone())))
                },
            )?;
            match placement {
                Placement::Inserted(player) => {
                    debug!("placed {} in shard {}", escape_log(username), target);
                    if let Err(e) = self.leaderboard.refresh_player(instance, &player, now) {
                        metrics::inc_store_failures();
                        warn!("leaderboard refresh failed for {}: {}", escape_log(username), e);
                    }
                    return Ok(JoinOutcome::Created(player));
                }
                Placement::Existing(player) => return Ok(JoinOutcome::Existing(player)),
                Placement::Full => {
                    let next = self.router.overflow_shard(instance, now)?;
                    target = self.move_index(instance, username, target, next)?;
                }
            }
        }
        Err(VillageError::Conflict(format!(
            "could not place {} in {}",
            username, instance
        )))
    }

    /// Every player in every shard. Used by maintenance recounts.
    pub fn all_players(&self, instance: &str) -> Result<Vec<PlayerData>, VillageError> {
        let count = self.router.shard_count(instance)?;
        let mut players = Vec::new();
        for shard_id in 0..count {
            if let Some(shard) = self.router.load_shard(instance, shard_id)? {
                players.extend(shard.players.into_values());
            }
        }
        Ok(players)
    }
}
