//! Persistence for village instances.
//!
//! Two layers live here:
//! * raw stores ([`KvStore`] + [`SortedSetStore`]) with a sled-backed
//!   implementation for real deployments and an in-memory one for tests;
//! * [`Records`], the typed layer that serializes records with bincode and
//!   performs every read-modify-write under compare-and-swap so concurrent
//!   writers retry instead of silently discarding each other's deltas.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use rand::Rng;

use crate::metrics;
use crate::village::errors::VillageError;
use crate::village::types::Record;

const TREE_KV: &str = "village_kv";
const TREE_ZSETS: &str = "village_zsets";
const ZSET_SEPARATOR: char = '\u{0}';

/// Literal key layout for every persisted record.
pub mod keys {
    pub fn game_state(instance: &str) -> String {
        format!("gameState:{}", instance)
    }

    pub fn player_shard(instance: &str, shard: u32) -> String {
        format!("playerShard:{}:{}", instance, shard)
    }

    pub fn player_index(instance: &str, username: &str) -> String {
        format!("playerIndex:{}:{}", instance, username)
    }

    pub fn leaderboard(instance: &str) -> String {
        format!("leaderboard:{}", instance)
    }

    pub fn leaderboard_scores(instance: &str) -> String {
        format!("leaderboardScores:{}", instance)
    }

    pub fn activities(instance: &str) -> String {
        format!("activities:{}", instance)
    }

    pub fn quest_store(instance: &str) -> String {
        format!("questStore:{}", instance)
    }

    pub fn community(instance: &str) -> String {
        format!("community:{}", instance)
    }

    pub fn event_participation(instance: &str, event_id: &str) -> String {
        format!("eventParticipation:{}:{}", instance, event_id)
    }

    pub fn challenge_participation(instance: &str, challenge_id: &str) -> String {
        format!("challengeParticipation:{}:{}", instance, challenge_id)
    }
}

/// Atomic get/set by key. No cross-key transactions are assumed.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, VillageError>;

    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), VillageError>;

    /// Write `new` only if the stored value still equals `expected` (`None` = absent).
    /// Returns `false` when another writer got there first.
    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Vec<u8>,
    ) -> Result<bool, VillageError>;

    /// Keys starting with `prefix`, in byte order.
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, VillageError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
    pub member: String,
    pub score: f64,
}

/// Redis-style sorted set: members unique per key, ordered by score.
pub trait SortedSetStore: Send + Sync {
    fn z_add(&self, key: &str, member: &str, score: f64) -> Result<(), VillageError>;

    /// Members at ranks `start..=end`, ascending by score unless `reverse`.
    fn z_range(
        &self,
        key: &str,
        start: usize,
        end: usize,
        reverse: bool,
    ) -> Result<Vec<ScoredMember>, VillageError>;

    fn z_score(&self, key: &str, member: &str) -> Result<Option<f64>, VillageError>;
}

/// Everything the engine needs from a backend.
pub trait Store: KvStore + SortedSetStore {}

impl<T: KvStore + SortedSetStore> Store for T {}

fn sort_and_slice(
    mut members: Vec<ScoredMember>,
    start: usize,
    end: usize,
    reverse: bool,
) -> Vec<ScoredMember> {
    members.sort_by(|a, b| {
        let by_score = a.score.total_cmp(&b.score);
        let by_score = if reverse { by_score.reverse() } else { by_score };
        by_score.then_with(|| a.member.cmp(&b.member))
    });
    if start >= members.len() || start > end {
        return Vec::new();
    }
    let stop = end.saturating_add(1).min(members.len());
    members.drain(start..stop).collect()
}

/// Helper builder so tests can easily create throwaway stores with custom paths.
pub struct SledStoreBuilder {
    path: PathBuf,
    flush_each_write: bool,
}

impl SledStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            flush_each_write: true,
        }
    }

    /// Skip the fsync after every write. Sled still flushes in the background.
    pub fn without_flush(mut self) -> Self {
        self.flush_each_write = false;
        self
    }

    pub fn open(self) -> Result<SledStore, VillageError> {
        SledStore::open_with_options(self.path, self.flush_each_write)
    }
}

/// Sled-backed persistence for village records and sorted sets.
pub struct SledStore {
    _db: sled::Db,
    kv: sled::Tree,
    zsets: sled::Tree,
    flush_each_write: bool,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, VillageError> {
        Self::open_with_options(path, true)
    }

    fn open_with_options<P: AsRef<Path>>(path: P, flush: bool) -> Result<Self, VillageError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let kv = db.open_tree(TREE_KV)?;
        let zsets = db.open_tree(TREE_ZSETS)?;
        Ok(Self {
            _db: db,
            kv,
            zsets,
            flush_each_write: flush,
        })
    }

    fn maybe_flush(&self, tree: &sled::Tree) -> Result<(), VillageError> {
        if self.flush_each_write {
            tree.flush()?;
        }
        Ok(())
    }

    fn zset_key(key: &str, member: &str) -> String {
        format!("{}{}{}", key, ZSET_SEPARATOR, member)
    }
}

impl KvStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, VillageError> {
        Ok(self.kv.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), VillageError> {
        self.kv.insert(key.as_bytes(), value)?;
        self.maybe_flush(&self.kv)
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Vec<u8>,
    ) -> Result<bool, VillageError> {
        let swapped = self
            .kv
            .compare_and_swap(key.as_bytes(), expected, Some(new))?
            .is_ok();
        if swapped {
            self.maybe_flush(&self.kv)?;
        }
        Ok(swapped)
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, VillageError> {
        let mut keys = Vec::new();
        for entry in self.kv.scan_prefix(prefix.as_bytes()) {
            let (key, _) = entry?;
            keys.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(keys)
    }
}

impl SortedSetStore for SledStore {
    fn z_add(&self, key: &str, member: &str, score: f64) -> Result<(), VillageError> {
        let entry = Self::zset_key(key, member);
        self.zsets
            .insert(entry.as_bytes(), score.to_be_bytes().to_vec())?;
        self.maybe_flush(&self.zsets)
    }

    fn z_range(
        &self,
        key: &str,
        start: usize,
        end: usize,
        reverse: bool,
    ) -> Result<Vec<ScoredMember>, VillageError> {
        let prefix = format!("{}{}", key, ZSET_SEPARATOR);
        let mut members = Vec::new();
        for entry in self.zsets.scan_prefix(prefix.as_bytes()) {
            let (raw_key, raw_score) = entry?;
            let text = String::from_utf8_lossy(&raw_key);
            let Some(member) = text.strip_prefix(prefix.as_str()) else {
                continue;
            };
            members.push(ScoredMember {
                member: member.to_string(),
                score: decode_score(&raw_score)?,
            });
        }
        Ok(sort_and_slice(members, start, end, reverse))
    }

    fn z_score(&self, key: &str, member: &str) -> Result<Option<f64>, VillageError> {
        let entry = Self::zset_key(key, member);
        match self.zsets.get(entry.as_bytes())? {
            Some(raw) => Ok(Some(decode_score(&raw)?)),
            None => Ok(None),
        }
    }
}

fn decode_score(raw: &[u8]) -> Result<f64, VillageError> {
    let bytes: [u8; 8] = raw
        .try_into()
        .map_err(|_| VillageError::Store(format!("corrupt sorted-set score ({} bytes)", raw.len())))?;
    Ok(f64::from_be_bytes(bytes))
}

/// In-memory store for tests and demos. `set_failing(true)` makes every call
/// fail and `fail_writes_under` fails writes to one key prefix, which is how
/// tests exercise the store-failure paths.
#[derive(Default)]
pub struct MemoryStore {
    kv: Mutex<HashMap<String, Vec<u8>>>,
    zsets: Mutex<HashMap<String, HashMap<String, f64>>>,
    failing: AtomicBool,
    failing_prefix: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fail `set` and `compare_and_swap` for keys starting with `prefix`; `None` clears it.
    pub fn fail_writes_under(&self, prefix: Option<&str>) {
        if let Ok(mut guard) = self.failing_prefix.lock() {
            *guard = prefix.map(str::to_string);
        }
    }

    fn check(&self) -> Result<(), VillageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(VillageError::Store("injected failure".to_string()));
        }
        Ok(())
    }

    fn check_write(&self, key: &str) -> Result<(), VillageError> {
        self.check()?;
        let guard = self
            .failing_prefix
            .lock()
            .map_err(|_| VillageError::Store("failure switch poisoned".to_string()))?;
        match guard.as_deref() {
            Some(prefix) if key.starts_with(prefix) => {
                Err(VillageError::Store(format!("injected write failure for {}", key)))
            }
            _ => Ok(()),
        }
    }

    fn kv_guard(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>, VillageError> {
        self.kv
            .lock()
            .map_err(|_| VillageError::Store("kv mutex poisoned".to_string()))
    }

    fn zset_guard(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, HashMap<String, f64>>>, VillageError> {
        self.zsets
            .lock()
            .map_err(|_| VillageError::Store("zset mutex poisoned".to_string()))
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, VillageError> {
        self.check()?;
        Ok(self.kv_guard()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), VillageError> {
        self.check_write(key)?;
        self.kv_guard()?.insert(key.to_string(), value);
        Ok(())
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Vec<u8>,
    ) -> Result<bool, VillageError> {
        self.check_write(key)?;
        let mut guard = self.kv_guard()?;
        if guard.get(key).map(|v| v.as_slice()) != expected {
            return Ok(false);
        }
        guard.insert(key.to_string(), new);
        Ok(true)
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, VillageError> {
        self.check()?;
        let mut keys: Vec<String> = self
            .kv_guard()?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

impl SortedSetStore for MemoryStore {
    fn z_add(&self, key: &str, member: &str, score: f64) -> Result<(), VillageError> {
        self.check()?;
        self.zset_guard()?
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    fn z_range(
        &self,
        key: &str,
        start: usize,
        end: usize,
        reverse: bool,
    ) -> Result<Vec<ScoredMember>, VillageError> {
        self.check()?;
        let members = self
            .zset_guard()?
            .get(key)
            .map(|set| {
                set.iter()
                    .map(|(member, score)| ScoredMember {
                        member: member.clone(),
                        score: *score,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(sort_and_slice(members, start, end, reverse))
    }

    fn z_score(&self, key: &str, member: &str) -> Result<Option<f64>, VillageError> {
        self.check()?;
        Ok(self
            .zset_guard()?
            .get(key)
            .and_then(|set| set.get(member).copied()))
    }
}

/// Pause before retrying a lost compare-and-swap. Jittered so racing writers
/// do not retry in lockstep.
pub(crate) fn backoff(attempt: u32) {
    if attempt < 2 {
        std::thread::yield_now();
        return;
    }
    let ceiling = 50u64 << attempt.min(6);
    let micros = rand::thread_rng().gen_range(ceiling / 2..=ceiling);
    std::thread::sleep(std::time::Duration::from_micros(micros));
}

/// Outcome of an [`Records::update`] closure.
pub enum Change<R> {
    /// Persist the mutated record.
    Commit(R),
    /// Leave the stored record untouched.
    Abort(R),
}

/// Typed record access on top of a [`Store`].
#[derive(Clone)]
pub struct Records {
    store: Arc<dyn Store>,
    max_retries: u32,
}

impl Records {
    pub fn new(store: Arc<dyn Store>, max_retries: u32) -> Self {
        Self { store, max_retries }
    }

    pub fn raw(&self) -> &Arc<dyn Store> {
        &self.store
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, VillageError> {
        Ok(bincode::serialize(value)?)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, VillageError> {
        Ok(bincode::deserialize::<T>(bytes)?)
    }

    pub fn load<T: Record>(&self, key: &str) -> Result<Option<T>, VillageError> {
        match self.store.get(key)? {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Unconditional write. Only used for records nobody else can be writing yet.
    pub fn put<T: Record>(&self, key: &str, mut value: T, now: DateTime<Utc>) -> Result<T, VillageError> {
        value.touch(now);
        self.store.set(key, Self::serialize(&value)?)?;
        Ok(value)
    }

    /// Write `value` only if `key` is absent. Returns `false` when a record already exists.
    pub fn insert_if_absent<T: Record>(
        &self,
        key: &str,
        mut value: T,
        now: DateTime<Utc>,
    ) -> Result<bool, VillageError> {
        value.touch(now);
        self.store
            .compare_and_swap(key, None, Self::serialize(&value)?)
    }

    /// Read-modify-write an existing record. `Ok(None)` when the record is absent.
    pub fn update<T, R, F>(
        &self,
        key: &str,
        now: DateTime<Utc>,
        f: F,
    ) -> Result<Option<(T, R)>, VillageError>
    where
        T: Record,
        F: FnMut(&mut T) -> Result<Change<R>, VillageError>,
    {
        self.modify(key, now, || None, f)
    }

    /// Read-modify-write, starting from `init()` when the record does not exist yet.
    pub fn upsert<T, R, I, F>(
        &self,
        key: &str,
        now: DateTime<Utc>,
        init: I,
        f: F,
    ) -> Result<(T, R), VillageError>
    where
        T: Record,
        I: Fn() -> T,
        F: FnMut(&mut T) -> Result<Change<R>, VillageError>,
    {
        self.modify(key, now, || Some(init()), f)?
            .ok_or_else(|| VillageError::NotFound(key.to_string()))
    }

    fn modify<T, R, I, F>(
        &self,
        key: &str,
        now: DateTime<Utc>,
        init: I,
        mut f: F,
    ) -> Result<Option<(T, R)>, VillageError>
    where
        T: Record,
        I: Fn() -> Option<T>,
        F: FnMut(&mut T) -> Result<Change<R>, VillageError>,
    {
        for attempt in 0..=self.max_retries {
            let current = self.store.get(key)?;
            let mut value: T = match &current {
                Some(bytes) => Self::deserialize(bytes)?,
                None => match init() {
                    Some(fresh) => fresh,
                    None => return Ok(None),
                },
            };
            match f(&mut value)? {
                Change::Abort(result) => return Ok(Some((value, result))),
                Change::Commit(result) => {
                    value.touch(now);
                    let bytes = Self::serialize(&value)?;
                    if self
                        .store
                        .compare_and_swap(key, current.as_deref(), bytes)?
                    {
                        return Ok(Some((value, result)));
                    }
                    metrics::inc_cas_retries();
                    debug!("cas conflict on {} (attempt {})", key, attempt + 1);
                    backoff(attempt);
                }
            }
        }
        warn!("giving up on {} after {} conflicting writes", key, self.max_retries + 1);
        Err(VillageError::Conflict(format!(
            "{} changed concurrently {} times",
            key,
            self.max_retries + 1
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::village::types::{ActivityStore, GameState};
    use tempfile::TempDir;

    fn records(store: Arc<dyn Store>) -> Records {
        Records::new(store, 4)
    }

    #[test]
    fn sled_round_trip_game_state() {
        let dir = TempDir::new().expect("tempdir");
        let store = SledStoreBuilder::new(dir.path()).open().expect("store");
        let records = records(Arc::new(store));
        let now = Utc::now();
        records
            .put(&keys::game_state("p1"), GameState::new(now), now)
            .expect("put");
        let loaded: GameState = records
            .load(&keys::game_state("p1"))
            .expect("load")
            .expect("present");
        assert_eq!(loaded.shard_count, 1);
        assert_eq!(loaded.revision, 1);
    }

    #[test]
    fn insert_if_absent_never_clobbers() {
        let records = records(Arc::new(MemoryStore::new()));
        let now = Utc::now();
        let mut first = ActivityStore::new(now);
        first.activities.push(crate::village::types::Activity::new("a", "x", now));
        assert!(records.insert_if_absent("k", first, now).expect("insert"));
        assert!(!records
            .insert_if_absent("k", ActivityStore::new(now), now)
            .expect("second insert"));
        let loaded: ActivityStore = records.load("k").expect("load").expect("present");
        assert_eq!(loaded.activities.len(), 1);
    }

    #[test]
    fn update_on_missing_record_is_none() {
        let records = records(Arc::new(MemoryStore::new()));
        let result = records
            .update::<GameState, (), _>("missing", Utc::now(), |_| Ok(Change::Commit(())))
            .expect("update");
        assert!(result.is_none());
    }

    #[test]
    fn aborted_update_leaves_record_untouched() {
        let records = records(Arc::new(MemoryStore::new()));
        let now = Utc::now();
        records.put("gs", GameState::new(now), now).expect("put");
        records
            .update::<GameState, (), _>("gs", now, |state| {
                state.player_count = 99;
                Ok(Change::Abort(()))
            })
            .expect("update");
        let loaded: GameState = records.load("gs").expect("load").expect("present");
        assert_eq!(loaded.player_count, 0);
        assert_eq!(loaded.revision, 1);
    }

    #[test]
    fn sorted_set_orders_by_score() {
        let dir = TempDir::new().expect("tempdir");
        let store = SledStoreBuilder::new(dir.path())
            .without_flush()
            .open()
            .expect("store");
        store.z_add("lb", "alice", 10.0).expect("add");
        store.z_add("lb", "bob", 30.0).expect("add");
        store.z_add("lb", "carol", 20.0).expect("add");
        store.z_add("lb", "alice", 40.0).expect("re-add");
        let top = store.z_range("lb", 0, 1, true).expect("range");
        let names: Vec<_> = top.iter().map(|m| m.member.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob"]);
        assert_eq!(store.z_score("lb", "carol").expect("score"), Some(20.0));
        assert!(store.z_range("lb", 5, 9, true).expect("range").is_empty());
    }

    #[test]
    fn failing_memory_store_reports_errors() {
        let store = MemoryStore::new();
        store.set_failing(true);
        let err = store.get("anything").expect_err("should fail");
        assert!(err.is_store_failure());
    }
}
