//! Test utilities & fixtures shared by the integration tests.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;
use villehaven::config::EngineConfig;
use villehaven::village::{MemoryStore, SledStoreBuilder, Village};

pub const INSTANCE: &str = "p1";

/// Fresh in-memory village with `p1` already initialized.
#[allow(dead_code)]
pub fn village() -> Village {
    village_with(EngineConfig::default())
}

#[allow(dead_code)]
pub fn village_with(config: EngineConfig) -> Village {
    let village = Village::in_memory(config);
    assert!(village.initialize_instance(INSTANCE));
    village
}

#[allow(dead_code)]
pub fn small_shards(capacity: usize) -> EngineConfig {
    EngineConfig {
        shard_capacity: capacity,
        ..EngineConfig::default()
    }
}

/// Sled-backed village in a temp dir. Keep the `TempDir` alive for the test.
#[allow(dead_code)]
pub fn sled_village(config: EngineConfig) -> (TempDir, Village) {
    let dir = TempDir::new().expect("tempdir");
    let store = SledStoreBuilder::new(dir.path()).open().expect("sled store");
    let village = Village::new(Arc::new(store), config);
    assert!(village.initialize_instance(INSTANCE));
    (dir, village)
}

/// Village with a failure switch on its store.
#[allow(dead_code)]
pub fn flaky_village() -> (Arc<MemoryStore>, Village) {
    let store = Arc::new(MemoryStore::new());
    let village = Village::new(store.clone(), EngineConfig::default());
    assert!(village.initialize_instance(INSTANCE));
    (store, village)
}

/// A clock tests can move forward.
#[derive(Clone)]
pub struct TestClock(Arc<Mutex<DateTime<Utc>>>);

#[allow(dead_code)]
impl TestClock {
    pub fn at(year: i32, month: u32, day: u32, hour: u32) -> Self {
        let start = Utc
            .with_ymd_and_hms(year, month, day, hour, 0, 0)
            .single()
            .expect("valid time");
        Self(Arc::new(Mutex::new(start)))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().expect("clock");
        *now += by;
    }

    pub fn now(&self) -> DateTime<Utc> {
        *self.0.lock().expect("clock")
    }

    /// In-memory village on this clock with `p1` initialized.
    pub fn village(&self, config: EngineConfig) -> Village {
        let shared = Arc::clone(&self.0);
        let village = Village::in_memory(config).with_clock(Arc::new(move || *shared.lock().expect("clock")));
        assert!(village.initialize_instance(INSTANCE));
        village
    }
}
