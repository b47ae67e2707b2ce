//! Exactly-once participation tracking for events and daily challenges.
//!
//! Each entity gets its own record holding a username set and a counter.
//! Registration is a single compare-and-swap on that record, so of any number
//! of concurrent attempts by one player exactly one sees `true`.

use chrono::{DateTime, Utc};

use crate::metrics;
use crate::village::errors::VillageError;
use crate::village::storage::{keys, Change, Records};
use crate::village::types::ParticipationRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    Event,
    Challenge,
}

#[derive(Clone)]
pub struct ParticipationRegistry {
    records: Records,
    kind: RegistryKind,
}

impl ParticipationRegistry {
    pub fn events(records: Records) -> Self {
        Self {
            records,
            kind: RegistryKind::Event,
        }
    }

    pub fn challenges(records: Records) -> Self {
        Self {
            records,
            kind: RegistryKind::Challenge,
        }
    }

    fn key(&self, instance: &str, entity_id: &str) -> String {
        match self.kind {
            RegistryKind::Event => keys::event_participation(instance, entity_id),
            RegistryKind::Challenge => keys::challenge_participation(instance, entity_id),
        }
    }

    /// Add `username` to the entity's set. `true` only for the call that added it.
    pub fn register(
        &self,
        instance: &str,
        entity_id: &str,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, VillageError> {
        let (_, added) = self.records.upsert::<ParticipationRecord, bool, _, _>(
            &self.key(instance, entity_id),
            now,
            || ParticipationRecord::new(entity_id, now),
            |record| {
                if record.participants.contains_key(username) {
                    return Ok(Change::Abort(false));
                }
                record.participants.insert(username.to_string(), true);
                record.participant_count = record.participant_count.saturating_add(1);
                Ok(Change::Commit(true))
            },
        )?;
        metrics::record_participation(added);
        Ok(added)
    }

    /// Remove `username` again, for a registration whose reward could not be paid.
    pub fn withdraw(
        &self,
        instance: &str,
        entity_id: &str,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, VillageError> {
        let removed = self.records.update::<ParticipationRecord, bool, _>(
            &self.key(instance, entity_id),
            now,
            |record| {
                if record.participants.remove(username).is_none() {
                    return Ok(Change::Abort(false));
                }
                record.participant_count = record.participant_count.saturating_sub(1);
                Ok(Change::Commit(true))
            },
        )?;
        Ok(removed.is_some_and(|(_, removed)| removed))
    }

    pub fn has_participated(&self, instance: &str, entity_id: &str, username: &str) -> Result<bool, VillageError> {
        Ok(self
            .records
            .load::<ParticipationRecord>(&self.key(instance, entity_id))?
            .map(|record| record.participants.contains_key(username))
            .unwrap_or(false))
    }

    pub fn participant_count(&self, instance: &str, entity_id: &str) -> Result<u64, VillageError> {
        Ok(self
            .records
            .load::<ParticipationRecord>(&self.key(instance, entity_id))?
            .map(|record| record.participant_count)
            .unwrap_or(0))
    }
}
