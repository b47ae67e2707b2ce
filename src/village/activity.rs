use chrono::{DateTime, Utc};

use crate::village::errors::VillageError;
use crate::village::storage::{keys, Change, Records};
use crate::village::types::{Activity, ActivityStore};

/// Bounded, most-recent-first feed of player and system activity.
#[derive(Clone)]
pub struct ActivityFeed {
    records: Records,
    limit: usize,
    default_recent: usize,
}

impl ActivityFeed {
    pub fn new(records: Records, limit: usize, default_recent: usize) -> Self {
        Self {
            records,
            limit: limit.max(1),
            default_recent,
        }
    }

    pub fn add(&self, instance: &str, activity: Activity, now: DateTime<Utc>) -> Result<(), VillageError> {
        let limit = self.limit;
        self.records.upsert::<ActivityStore, (), _, _>(
            &keys::activities(instance),
            now,
            || ActivityStore::new(now),
            |store| {
                store.activities.insert(0, activity.clone());
                store.activities.truncate(limit);
                Ok(Change::Commit(()))
            },
        )?;
        Ok(())
    }

    /// Newest first. `None` uses the configured default page size.
    pub fn recent(&self, instance: &str, limit: Option<usize>) -> Result<Vec<Activity>, VillageError> {
        let take = limit.unwrap_or(self.default_recent);
        Ok(self
            .records
            .load::<ActivityStore>(&keys::activities(instance))?
            .map(|store| store.activities.into_iter().take(take).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::village::storage::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn feed_is_newest_first_and_bounded() {
        let feed = ActivityFeed::new(Records::new(Arc::new(MemoryStore::new()), 4), 3, 2);
        let now = Utc::now();
        for i in 0..5 {
            feed.add("t", Activity::new(format!("u{}", i), "did a thing", now), now)
                .expect("add");
        }
        let all = feed.recent("t", Some(10)).expect("recent");
        let names: Vec<_> = all.iter().map(|a| a.username.as_str()).collect();
        assert_eq!(names, vec!["u4", "u3", "u2"]);
        assert_eq!(feed.recent("t", None).expect("default").len(), 2);
    }

    #[test]
    fn empty_feed_reads_as_empty() {
        let feed = ActivityFeed::new(Records::new(Arc::new(MemoryStore::new()), 4), 3, 2);
        assert!(feed.recent("t", None).expect("recent").is_empty());
    }
}
