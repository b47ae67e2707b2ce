//! Player shard routing.
//!
//! Players live in fixed-capacity shard records. A player's shard is chosen
//! once at join time and stored in a per-player index entry; later reads and
//! writes always route through that entry, so growing the shard count never
//! moves anyone.

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::metrics;
use crate::village::errors::VillageError;
use crate::village::storage::{keys, Change, Records};
use crate::village::types::{GameState, PlayerShard};

/// Deterministic username -> shard mapping.
///
/// Walks the UTF-16 code units with `hash = hash * 31 + unit` in wrapping
/// 32-bit arithmetic, then takes `|hash % shard_count|`. A shard count of
/// zero is treated as one.
pub fn shard_of(username: &str, shard_count: u32) -> u32 {
    let count = shard_count.max(1) as i64;
    let mut hash: i32 = 0;
    for unit in username.encode_utf16() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(unit as i32);
    }
    ((hash as i64) % count).unsigned_abs() as u32
}

#[derive(Clone)]
pub struct ShardRouter {
    records: Records,
    capacity: usize,
}

impl ShardRouter {
    pub fn new(records: Records, capacity: usize) -> Self {
        Self {
            records,
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn load_shard(&self, instance: &str, shard_id: u32) -> Result<Option<PlayerShard>, VillageError> {
        self.records.load(&keys::player_shard(instance, shard_id))
    }

    /// Create an empty shard unless one already exists.
    pub fn create_shard(&self, instance: &str, shard_id: u32, now: DateTime<Utc>) -> Result<bool, VillageError> {
        self.records.insert_if_absent(
            &keys::player_shard(instance, shard_id),
            PlayerShard::new(shard_id, now),
            now,
        )
    }

    pub fn shard_count(&self, instance: &str) -> Result<u32, VillageError> {
        let state: GameState = self
            .records
            .load(&keys::game_state(instance))?
            .ok_or_else(|| VillageError::Uninitialized(instance.to_string()))?;
        Ok(state.shard_count.max(1))
    }

    fn has_room(&self, instance: &str, shard_id: u32) -> Result<bool, VillageError> {
        Ok(match self.load_shard(instance, shard_id)? {
            Some(shard) => shard.len() < self.capacity,
            None => true,
        })
    }

    /// Open a new shard when the newest one has reached capacity.
    ///
    /// Returns the id of the shard this call created, or `None` when nothing
    /// was needed or a concurrent caller already grew the count. Safe to run
    /// from any number of callers: the shard record is created with
    /// insert-if-absent and the count only moves from the value that was read.
    pub fn check_and_create(&self, instance: &str, now: DateTime<Utc>) -> Result<Option<u32>, VillageError> {
        let count = self.shard_count(instance)?;
        let newest = count - 1;
        let Some(shard) = self.load_shard(instance, newest)? else {
            return Ok(None);
        };
        if shard.len() < self.capacity {
            return Ok(None);
        }

        let new_id = count;
        if !self.create_shard(instance, new_id, now)? {
            debug!("shard {} of {} already present", new_id, instance);
        }
        let bumped = self
            .records
            .update::<GameState, bool, _>(&keys::game_state(instance), now, |state| {
                if state.shard_count == new_id {
                    state.shard_count = new_id + 1;
                    Ok(Change::Commit(true))
                } else {
                    Ok(Change::Abort(false))
                }
            })?
            .map(|(_, bumped)| bumped)
            .unwrap_or(false);

        if bumped {
            metrics::inc_shards_created();
            info!("instance {} grew to {} shards", instance, new_id + 1);
            Ok(Some(new_id))
        } else {
            Ok(None)
        }
    }

    /// Pick the home shard for a new player: the hashed shard when it has room,
    /// otherwise the newest shard, growing the shard count when that is full too.
    pub fn home_shard_for(&self, instance: &str, username: &str, now: DateTime<Utc>) -> Result<u32, VillageError> {
        let count = self.shard_count(instance)?;
        let hashed = shard_of(username, count);
        if self.has_room(instance, hashed)? {
            return Ok(hashed);
        }
        self.overflow_shard(instance, now)
    }

    /// Newest shard with room, creating one when needed.
    pub fn overflow_shard(&self, instance: &str, now: DateTime<Utc>) -> Result<u32, VillageError> {
        // Bounded: every pass either returns or observes a larger shard count.
        for _ in 0..8 {
            let newest = self.shard_count(instance)? - 1;
            if self.has_room(instance, newest)? {
                return Ok(newest);
            }
            if let Some(created) = self.check_and_create(instance, now)? {
                return Ok(created);
            }
        }
        Err(VillageError::Conflict(format!(
            "could not find a shard with room in {}",
            instance
        )))
    }
}
