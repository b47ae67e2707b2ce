//! Community ledger: the per-instance aggregate of community progress,
//! player counts, the daily challenge, community events and milestones.
//!
//! `GameState` and `CommunityStore` are the most contended records in an
//! instance. Every mutation here is a single compare-and-swap update so
//! concurrent deltas add up instead of overwriting each other, and every
//! one-way flag (milestone achieved, challenge created for a date) is decided
//! inside that update so re-running a job is harmless.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::logutil::escape_log;
use crate::metrics;
use crate::village::activity::ActivityFeed;
use crate::village::errors::VillageError;
use crate::village::storage::{keys, Change, Records};
use crate::village::types::{
    Activity, CommunityEvent, CommunityStore, DailyChallenge, GameState, Milestone, PlayerData, PointKind,
    PointTotals, SYSTEM_ACTOR,
};

pub const WELCOME_EVENT_ID: &str = "welcome_event";

const CHALLENGE_DESCRIPTIONS: [&str; 5] = [
    "Plant trees and flowers around the village",
    "Help neighbors with their daily tasks",
    "Clean up the community spaces",
    "Share resources with those in need",
    "Learn new skills to benefit the community",
];

const EVENT_TITLES: [&str; 10] = [
    "Community Cleanup",
    "Tree Planting Day",
    "Knowledge Sharing",
    "Neighborly Help",
    "Village Celebration",
    "Garden Festival",
    "Environmental Awareness",
    "Social Connection Day",
    "Personal Growth Challenge",
    "Sustainability Drive",
];

const EVENT_DESCRIPTIONS: [&str; 10] = [
    "Help clean up our virtual village environment!",
    "Let's plant trees and make our village greener!",
    "Share knowledge and learn from each other!",
    "Help your neighbors with their daily tasks!",
    "Celebrate our community achievements together!",
    "Grow beautiful gardens and share your progress!",
    "Promote environmental awareness in our community!",
    "Build stronger connections with fellow villagers!",
    "Focus on personal development and growth!",
    "Work together for a more sustainable village!",
];

/// Flat reward for joining the daily challenge, in the challenge's track.
pub const CHALLENGE_REWARD: u64 = 5;

fn milestone(id: &str, title: &str, description: &str, points_required: u64) -> Milestone {
    Milestone {
        id: id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        points_required,
        achieved: false,
        achieved_at: None,
    }
}

pub fn default_milestones() -> Vec<Milestone> {
    vec![
        milestone("first_50_players", "Growing Community", "Reach 50 active villagers", 50),
        milestone(
            "clean_village",
            "Clean Village",
            "Reach 1000 environmental points as a community",
            1000,
        ),
        milestone("social_hub", "Social Hub", "Reach 1000 social points as a community", 1000),
        milestone(
            "learning_center",
            "Learning Center",
            "Reach 1000 personal growth points as a community",
            1000,
        ),
        milestone(
            "sustainable_village",
            "Sustainable Village",
            "Reach 5000 total community points",
            5000,
        ),
    ]
}

/// Fixed predicate per milestone id. Unknown ids never unlock.
pub fn milestone_reached(milestone: &Milestone, state: &GameState) -> bool {
    let progress = &state.community_progress;
    match milestone.id.as_str() {
        "first_50_players" => state.player_count >= milestone.points_required,
        "clean_village" => progress.environmental >= milestone.points_required,
        "social_hub" => progress.social >= milestone.points_required,
        "learning_center" => progress.personal >= milestone.points_required,
        "sustainable_village" => progress.total() >= milestone.points_required,
        _ => false,
    }
}

pub fn welcome_event(now: DateTime<Utc>) -> CommunityEvent {
    CommunityEvent {
        id: WELCOME_EVENT_ID.to_string(),
        title: "Welcome to Villehaven".to_string(),
        description: "Join our community and help us reach 50 villagers!".to_string(),
        start_time: now,
        end_time: now + Duration::days(7),
        goal: 50,
        progress: 0,
        participants: Vec::new(),
        rewards: PointTotals::new(10, 20, 10),
    }
}

pub fn initial_community(now: DateTime<Utc>) -> CommunityStore {
    CommunityStore {
        events: vec![welcome_event(now)],
        milestones: default_milestones(),
        revision: 0,
        last_updated: now,
    }
}

pub fn new_daily_challenge<R: Rng>(now: DateTime<Utc>, rng: &mut R) -> DailyChallenge {
    let kind = PointKind::ALL[rng.gen_range(0..PointKind::ALL.len())];
    let description = CHALLENGE_DESCRIPTIONS
        .choose(rng)
        .copied()
        .unwrap_or(CHALLENGE_DESCRIPTIONS[0]);
    DailyChallenge {
        kind,
        description: description.to_string(),
        goal: rng.gen_range(20..=30),
        current: 0,
        participants: Vec::new(),
        participant_count: 0,
        created_on: now.date_naive(),
        expires_at: now + Duration::hours(24),
    }
}

/// Replacement for an expired event: three-day window, goal 50-100, 5-20 points per track.
pub fn random_event<R: Rng>(now: DateTime<Utc>, rng: &mut R) -> CommunityEvent {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let suffix: String = (0..5)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    let title = EVENT_TITLES.choose(rng).copied().unwrap_or(EVENT_TITLES[0]);
    let description = EVENT_DESCRIPTIONS
        .choose(rng)
        .copied()
        .unwrap_or(EVENT_DESCRIPTIONS[0]);
    CommunityEvent {
        id: format!("event_{}_{}", now.timestamp_millis(), suffix),
        title: title.to_string(),
        description: description.to_string(),
        start_time: now,
        end_time: now + Duration::days(3),
        goal: rng.gen_range(50..=100),
        progress: 0,
        participants: Vec::new(),
        rewards: PointTotals::new(
            rng.gen_range(5..=20),
            rng.gen_range(5..=20),
            rng.gen_range(5..=20),
        ),
    }
}

/// (total, active) over `players`; active means seen within `window`.
pub fn count_players<'a, I>(players: I, now: DateTime<Utc>, window: Duration) -> (u64, u64)
where
    I: IntoIterator<Item = &'a PlayerData>,
{
    let cutoff = now - window;
    players.into_iter().fold((0, 0), |(total, active), player| {
        let is_active = player.last_active > cutoff;
        (total + 1, active + u64::from(is_active))
    })
}

/// Result of a daily challenge refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct ChallengeRefresh {
    pub challenge: DailyChallenge,
    /// False when today's challenge already existed and was kept.
    pub created: bool,
}

#[derive(Clone)]
pub struct CommunityLedger {
    records: Records,
    activity: ActivityFeed,
}

impl CommunityLedger {
    pub fn new(records: Records, activity: ActivityFeed) -> Self {
        Self { records, activity }
    }

    pub fn game_state(&self, instance: &str) -> Result<Option<GameState>, VillageError> {
        self.records.load(&keys::game_state(instance))
    }

    pub fn require_state(&self, instance: &str) -> Result<GameState, VillageError> {
        self.game_state(instance)?
            .ok_or_else(|| VillageError::Uninitialized(instance.to_string()))
    }

    pub fn community(&self, instance: &str) -> Result<Option<CommunityStore>, VillageError> {
        self.records.load(&keys::community(instance))
    }

    /// Create the game state (with a first daily challenge) and the community store.
    /// Existing records are left alone; returns whether the game state was new.
    pub fn initialize<R: Rng>(&self, instance: &str, now: DateTime<Utc>, rng: &mut R) -> Result<bool, VillageError> {
        let mut state = GameState::new(now);
        state.daily_challenge = Some(new_daily_challenge(now, rng));
        let created = self
            .records
            .insert_if_absent(&keys::game_state(instance), state, now)?;
        self.records
            .insert_if_absent(&keys::community(instance), initial_community(now), now)?;
        Ok(created)
    }

    fn update_state<R, F>(&self, instance: &str, now: DateTime<Utc>, f: F) -> Result<(GameState, R), VillageError>
    where
        F: FnMut(&mut GameState) -> Result<Change<R>, VillageError>,
    {
        self.records
            .update(&keys::game_state(instance), now, f)?
            .ok_or_else(|| VillageError::Uninitialized(instance.to_string()))
    }

    fn update_community<R, F>(
        &self,
        instance: &str,
        now: DateTime<Utc>,
        f: F,
    ) -> Result<(CommunityStore, R), VillageError>
    where
        F: FnMut(&mut CommunityStore) -> Result<Change<R>, VillageError>,
    {
        self.records
            .update(&keys::community(instance), now, f)?
            .ok_or_else(|| VillageError::Uninitialized(instance.to_string()))
    }

    /// Add `delta` to community progress, then evaluate milestones.
    /// Returns the milestones this call unlocked.
    pub fn apply_delta(
        &self,
        instance: &str,
        delta: &PointTotals,
        now: DateTime<Utc>,
    ) -> Result<Vec<Milestone>, VillageError> {
        if delta.is_zero() {
            return Ok(Vec::new());
        }
        self.update_state(instance, now, |state| {
            state.community_progress.add(delta);
            Ok(Change::Commit(()))
        })?;
        self.check_milestones(instance, now)
    }

    /// Bump the player count for a new join. Maintenance recounts replace this value.
    pub fn note_player_joined(&self, instance: &str, now: DateTime<Utc>) -> Result<Vec<Milestone>, VillageError> {
        self.update_state(instance, now, |state| {
            state.player_count = state.player_count.saturating_add(1);
            Ok(Change::Commit(()))
        })?;
        self.check_milestones(instance, now)
    }

    /// Flip every unachieved milestone whose predicate holds. The flip and
    /// its activity entry happen once no matter how many callers race.
    pub fn check_milestones(&self, instance: &str, now: DateTime<Utc>) -> Result<Vec<Milestone>, VillageError> {
        let state = self.require_state(instance)?;
        let Some(_) = self.community(instance)? else {
            return Ok(Vec::new());
        };
        let (_, unlocked) = self.update_community(instance, now, |community| {
            let mut unlocked = Vec::new();
            for milestone in community.milestones.iter_mut() {
                if milestone.achieved || !milestone_reached(milestone, &state) {
                    continue;
                }
                milestone.achieved = true;
                milestone.achieved_at = Some(now);
                unlocked.push(milestone.clone());
            }
            if unlocked.is_empty() {
                Ok(Change::Abort(unlocked))
            } else {
                Ok(Change::Commit(unlocked))
            }
        })?;
        for milestone in &unlocked {
            metrics::inc_milestones_achieved();
            info!("instance {} unlocked milestone {}", instance, milestone.id);
            let announced = self.activity.add(
                instance,
                Activity::new(
                    SYSTEM_ACTOR,
                    format!("🏆 Milestone achieved: {}!", milestone.title),
                    now,
                ),
                now,
            );
            // The flip is already committed.
            if let Err(e) = announced {
                metrics::inc_store_failures();
                warn!(
                    "instance {}: milestone {} unlocked but not announced: {}",
                    escape_log(instance),
                    milestone.id,
                    e
                );
            }
        }
        Ok(unlocked)
    }

    /// Make sure today's (UTC) challenge exists. Re-running on the same day keeps
    /// the current challenge and its identity.
    pub fn refresh_daily_challenge<R: Rng>(
        &self,
        instance: &str,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<ChallengeRefresh, VillageError> {
        let today = now.date_naive();
        let fresh = new_daily_challenge(now, rng);
        let (state, created) = self.update_state(instance, now, |state| {
            let same_day = state
                .daily_challenge
                .as_ref()
                .is_some_and(|current| current.created_on == today);
            if same_day {
                return Ok(Change::Abort(false));
            }
            state.daily_challenge = Some(fresh.clone());
            Ok(Change::Commit(true))
        })?;
        let challenge = state
            .daily_challenge
            .ok_or_else(|| VillageError::NotFound(format!("daily challenge for {}", instance)))?;
        if created {
            info!("instance {} new daily challenge {}", instance, challenge.challenge_id());
        } else {
            debug!("instance {} keeps challenge {}", instance, challenge.challenge_id());
        }
        Ok(ChallengeRefresh { challenge, created })
    }

    /// Count one participant on the challenge identified by `challenge_id` and add
    /// `delta` to community progress in the same write. The counters are only
    /// touched while that challenge is still the current one.
    pub fn record_challenge_participation(
        &self,
        instance: &str,
        challenge_id: &str,
        delta: &PointTotals,
        now: DateTime<Utc>,
    ) -> Result<(GameState, Vec<Milestone>), VillageError> {
        let (state, ()) = self.update_state(instance, now, |state| {
            if let Some(challenge) = state.daily_challenge.as_mut() {
                if challenge.challenge_id() == challenge_id {
                    challenge.current = challenge.current.saturating_add(1);
                    challenge.participant_count = challenge.participant_count.saturating_add(1);
                }
            }
            state.community_progress.add(delta);
            Ok(Change::Commit(()))
        })?;
        let unlocked = self.check_milestones(instance, now)?;
        Ok((state, unlocked))
    }

    pub fn find_event(&self, instance: &str, event_id: &str) -> Result<Option<CommunityEvent>, VillageError> {
        Ok(self
            .community(instance)?
            .and_then(|community| community.events.into_iter().find(|e| e.id == event_id)))
    }

    /// Advance an event's progress by one. `NotFound` if the event is gone.
    pub fn record_event_progress(
        &self,
        instance: &str,
        event_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CommunityEvent, VillageError> {
        let (_, event) = self.update_community(instance, now, |community| {
            match community.events.iter_mut().find(|e| e.id == event_id) {
                Some(event) => {
                    event.progress = event.progress.saturating_add(1);
                    Ok(Change::Commit(Some(event.clone())))
                }
                None => Ok(Change::Abort(None)),
            }
        })?;
        event.ok_or_else(|| VillageError::NotFound(format!("event {}", escape_log(event_id))))
    }

    /// Replace every event whose window has closed. Returns the new events.
    pub fn rotate_expired_events<R: Rng>(
        &self,
        instance: &str,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<Vec<CommunityEvent>, VillageError> {
        let (_, created) = self.update_community(instance, now, |community| {
            let mut created = Vec::new();
            for event in community.events.iter_mut() {
                if event.is_active(now) {
                    continue;
                }
                let mut replacement = random_event(now, &mut *rng);
                while created.iter().any(|e: &CommunityEvent| e.id == replacement.id) {
                    replacement = random_event(now, &mut *rng);
                }
                *event = replacement.clone();
                created.push(replacement);
            }
            if created.is_empty() {
                Ok(Change::Abort(created))
            } else {
                Ok(Change::Commit(created))
            }
        })?;
        for event in &created {
            info!("instance {} opened event {} ({})", instance, event.id, escape_log(&event.title));
        }
        Ok(created)
    }

    /// Store recomputed player counts, then re-check the player-count milestone.
    pub fn set_player_counts(
        &self,
        instance: &str,
        total: u64,
        active: u64,
        now: DateTime<Utc>,
    ) -> Result<(GameState, Vec<Milestone>), VillageError> {
        let (state, ()) = self.update_state(instance, now, |state| {
            state.player_count = total;
            state.active_player_count = active;
            Ok(Change::Commit(()))
        })?;
        let unlocked = self.check_milestones(instance, now)?;
        Ok((state, unlocked))
    }
}
