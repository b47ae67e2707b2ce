//! The `Village` facade: every operation the UI, the CLI and the scheduler
//! call. Component errors stop here; callers get `Option`, `bool` or an
//! [`ActionOutcome`] and the failure is logged.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::logutil::escape_log;
use crate::metrics;
use crate::village::actions::{self, ActionKind, ActionOutcome, PlayerIntent, MSG_LOGIN};
use crate::village::activity::ActivityFeed;
use crate::village::errors::VillageError;
use crate::village::leaderboard::Leaderboard;
use crate::village::ledger::{CommunityLedger, CHALLENGE_REWARD};
use crate::village::participation::ParticipationRegistry;
use crate::village::players::{JoinOutcome, PlayerStore};
use crate::village::quest::{self, QuestEngine};
use crate::village::realtime::{Broadcaster, Envelope, VillageEvent};
use crate::village::shard::ShardRouter;
use crate::village::storage::{Change, MemoryStore, Records, ScoredMember, SledStoreBuilder, Store};
use crate::village::types::{
    Activity, CommunityStore, GameState, Milestone, PetKind, PlayerData, PlayerSummary, PointTotals, QuestData,
};

/// Source of "now". Swappable so tests can move time forward.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

const LEADERBOARD_PREVIEW: usize = 10;

/// Everything a player's screen shows, loaded in one call.
#[derive(Debug, Clone, Serialize)]
pub struct VillageSnapshot {
    pub game_state: GameState,
    pub player: Option<PlayerData>,
    pub quests: Vec<QuestData>,
    pub rank: usize,
    pub leaderboard: Vec<PlayerSummary>,
    pub activities: Vec<Activity>,
    pub community: Option<CommunityStore>,
    pub challenge_participated: bool,
    /// Active event id -> whether this player already joined it.
    pub event_participation: BTreeMap<String, bool>,
}

/// Instance-wide view without a player, used by the CLI status command.
#[derive(Debug, Clone, Serialize)]
pub struct VillageOverview {
    pub game_state: GameState,
    pub community: Option<CommunityStore>,
    pub leaderboard: Vec<PlayerSummary>,
    pub activities: Vec<Activity>,
}

pub struct Village {
    pub(crate) config: EngineConfig,
    pub(crate) records: Records,
    pub(crate) router: ShardRouter,
    pub(crate) players: PlayerStore,
    pub(crate) quests: QuestEngine,
    pub(crate) ledger: CommunityLedger,
    pub(crate) leaderboard: Leaderboard,
    pub(crate) activity: ActivityFeed,
    pub(crate) events: ParticipationRegistry,
    pub(crate) challenges: ParticipationRegistry,
    pub(crate) broadcaster: Broadcaster,
    clock: Clock,
}

impl Village {
    pub fn new(store: Arc<dyn Store>, config: EngineConfig) -> Self {
        let records = Records::new(store, config.cas_max_retries);
        let router = ShardRouter::new(records.clone(), config.shard_capacity);
        let leaderboard = Leaderboard::new(records.clone(), config.leaderboard_limit, config.mirror_sorted_set);
        let activity = ActivityFeed::new(records.clone(), config.activity_limit, config.recent_activity_default);
        let players = PlayerStore::new(
            records.clone(),
            router.clone(),
            leaderboard.clone(),
            config.cas_max_retries,
        );
        Self {
            quests: QuestEngine::new(records.clone()),
            ledger: CommunityLedger::new(records.clone(), activity.clone()),
            events: ParticipationRegistry::events(records.clone()),
            challenges: ParticipationRegistry::challenges(records.clone()),
            broadcaster: Broadcaster::default(),
            clock: Arc::new(Utc::now),
            config,
            records,
            router,
            players,
            leaderboard,
            activity,
        }
    }

    /// Open (or create) a sled database at `path`.
    pub fn open<P: AsRef<Path>>(path: P, config: EngineConfig) -> Result<Self, VillageError> {
        let store = SledStoreBuilder::new(path.as_ref()).open()?;
        Ok(Self::new(Arc::new(store), config))
    }

    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn records(&self) -> &Records {
        &self.records
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Envelope> {
        self.broadcaster.subscribe()
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub(crate) fn report(&self, op: &str, instance: &str, err: &VillageError) {
        if err.is_store_failure() {
            metrics::inc_store_failures();
            error!("{} failed for {}: {}", op, escape_log(instance), err);
            return;
        }
        match err {
            VillageError::Conflict(_) | VillageError::Uninitialized(_) => {
                warn!("{} rejected for {}: {}", op, escape_log(instance), err)
            }
            _ => debug!("{} rejected for {}: {}", op, escape_log(instance), err),
        }
    }

    fn settle<T>(&self, op: &str, instance: &str, result: Result<T, VillageError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.report(op, instance, &e);
                None
            }
        }
    }

    fn outcome(
        &self,
        op: &str,
        instance: &str,
        username: &str,
        result: Result<ActionOutcome, VillageError>,
    ) -> ActionOutcome {
        match result {
            Ok(outcome) => {
                metrics::inc_actions_processed();
                outcome
            }
            Err(e) => {
                metrics::inc_actions_rejected();
                self.report(op, instance, &e);
                let last_known = self.players.get(instance, username).ok().flatten();
                ActionOutcome::from_error(&e).with_player(last_known)
            }
        }
    }

    fn publish_progress(&self, instance: &str, username: &str, completed: &[QuestData], milestones: &[Milestone]) {
        for quest in completed {
            self.broadcaster.publish(
                instance,
                VillageEvent::QuestCompleted {
                    username: username.to_string(),
                    quest_id: quest.id.clone(),
                    title: quest.title.clone(),
                },
            );
        }
        for milestone in milestones {
            self.broadcaster.publish(
                instance,
                VillageEvent::Milestone {
                    id: milestone.id.clone(),
                    title: milestone.title.clone(),
                },
            );
        }
    }

    // ==== INSTANCE LIFECYCLE ====

    fn try_initialize(&self, instance: &str) -> Result<bool, VillageError> {
        let now = self.now();
        let mut rng = rand::thread_rng();
        let created = self.ledger.initialize(instance, now, &mut rng)?;
        self.router.create_shard(instance, 0, now)?;
        if created {
            info!("initialized village {}", escape_log(instance));
        }
        Ok(created)
    }

    /// Create the instance's stores. Safe to call again; existing data is kept.
    pub fn initialize_instance(&self, instance: &str) -> bool {
        self.settle("initialize", instance, self.try_initialize(instance))
            .is_some()
    }

    pub fn is_initialized(&self, instance: &str) -> bool {
        self.game_state(instance).is_some()
    }

    // ==== PLAYERS ====

    fn try_join(&self, instance: &str, username: &str) -> Result<ActionOutcome, VillageError> {
        let now = self.now();
        self.ledger.require_state(instance)?;
        let mut rng = rand::thread_rng();
        let joined = self.players.join(instance, username, now, || {
            self.quests.create_welcome_quests(instance, username, now, &mut rng)
        })?;
        let player = match joined {
            JoinOutcome::Created(player) => player,
            JoinOutcome::Existing(player) => {
                return Ok(ActionOutcome::ok(format!("Welcome back, {}!", username), player));
            }
        };
        info!("{} joined {} in shard {}", escape_log(username), escape_log(instance), player.shard_id);
        let milestones = self
            .settle("player count", instance, self.ledger.note_player_joined(instance, now))
            .unwrap_or_default();
        self.settle(
            "activity",
            instance,
            self.activity
                .add(instance, Activity::new(username, "joined the village", now), now),
        );
        self.settle("shard check", instance, self.router.check_and_create(instance, now));
        self.broadcaster.publish(
            instance,
            VillageEvent::PlayerJoined {
                username: username.to_string(),
            },
        );
        self.publish_progress(instance, username, &[], &milestones);
        let mut outcome = ActionOutcome::ok(format!("Welcome to Villehaven, {}!", username), player);
        outcome.milestones = milestones;
        Ok(outcome)
    }

    /// Join the village, or return the existing player unchanged.
    pub fn join(&self, instance: &str, username: &str) -> ActionOutcome {
        self.outcome("join", instance, username, self.try_join(instance, username))
    }

    pub fn get_player(&self, instance: &str, username: &str) -> Option<PlayerData> {
        self.settle("get player", instance, self.players.get(instance, username))
            .flatten()
    }

    /// Whole-record save with a revision check. `None` on conflict or failure.
    pub fn save_player(&self, instance: &str, player: &PlayerData) -> Option<PlayerData> {
        self.settle("save player", instance, self.players.save(instance, player, self.now()))
    }

    /// Mark the player active now.
    pub fn touch(&self, instance: &str, username: &str) -> Option<PlayerData> {
        let now = self.now();
        let result = self.players.update(instance, username, now, |player| {
            player.last_active = now;
            Ok(Change::Commit(()))
        });
        self.settle("touch", instance, result)
            .flatten()
            .map(|(player, ())| player)
    }

    pub fn player_quests(&self, instance: &str, username: &str) -> Vec<QuestData> {
        let Some(player) = self.get_player(instance, username) else {
            return Vec::new();
        };
        self.settle("quests", instance, self.quests.player_quests(instance, &player.quest_ids))
            .unwrap_or_default()
    }

    // ==== ACTIONS ====

    fn try_action(
        &self,
        instance: &str,
        username: &str,
        action: ActionKind,
        amount: u32,
    ) -> Result<ActionOutcome, VillageError> {
        let now = self.now();
        self.ledger.require_state(instance)?;
        if amount == 0 {
            return Err(VillageError::Invalid("amount must be at least 1".to_string()));
        }
        let player = self
            .players
            .get(instance, username)?
            .ok_or_else(|| VillageError::NotFound(username.to_string()))?;

        let mut rng = rand::thread_rng();
        let progress = self.quests.process_action(
            instance,
            username,
            &player.quest_ids,
            action.quest_track(),
            now,
            &mut rng,
        )?;
        let quest_store = self.quests.store(instance)?;
        let (saved, (points, payout)) = self
            .players
            .update(instance, username, now, |player| {
                let points = action.apply(player, amount, now)?;
                let payout = quest_store
                    .as_ref()
                    .map(|store| quest::collect_rewards(store, player))
                    .unwrap_or_default();
                Ok(Change::Commit((points, payout)))
            })?
            .ok_or_else(|| VillageError::NotFound(username.to_string()))?;

        let mut delta = points;
        delta.add(&payout.points);
        let milestones = self
            .settle("community delta", instance, self.ledger.apply_delta(instance, &delta, now))
            .unwrap_or_default();
        self.settle(
            "activity",
            instance,
            self.activity
                .add(instance, Activity::new(username, action.describe(amount), now), now),
        );
        debug!(
            "{} {} x{} in {} (+{} points, {} quests advanced, {} paid)",
            escape_log(username),
            action,
            amount,
            escape_log(instance),
            delta.total(),
            progress.advanced.len(),
            payout.quests.len()
        );

        self.broadcaster.publish(
            instance,
            VillageEvent::Action {
                username: username.to_string(),
                action,
                points: delta,
            },
        );
        self.publish_progress(instance, username, &payout.quests, &milestones);

        let mut message = format!("You {}! +{} points", action.describe(amount), delta.total());
        for quest in &payout.quests {
            message.push_str(&format!(" | Quest complete: {}", quest.title));
        }
        let mut outcome = ActionOutcome::ok(message, saved);
        outcome.points = delta;
        outcome.completed_quests = payout.quests;
        outcome.new_quests = payout.follow_ups;
        outcome.milestones = milestones;
        Ok(outcome)
    }

    pub fn perform_action(&self, instance: &str, username: &str, action: ActionKind, amount: u32) -> ActionOutcome {
        self.outcome(
            "action",
            instance,
            username,
            self.try_action(instance, username, action, amount),
        )
    }

    /// Pay a participation reward. If the player write fails the registration
    /// is withdrawn so the player can try again.
    fn credit_participation(
        &self,
        registry: &ParticipationRegistry,
        instance: &str,
        entity_id: &str,
        username: &str,
        reward: &PointTotals,
        now: DateTime<Utc>,
    ) -> Result<PlayerData, VillageError> {
        let credited = self
            .players
            .update(instance, username, now, |player| {
                player.stats.add_points(reward);
                player.stats.total_actions = player.stats.total_actions.saturating_add(1);
                player.last_active = now;
                Ok(Change::Commit(()))
            })
            .and_then(|saved| {
                saved
                    .map(|(player, ())| player)
                    .ok_or_else(|| VillageError::NotFound(username.to_string()))
            });
        if credited.is_err() {
            self.settle(
                "withdraw participation",
                instance,
                registry.withdraw(instance, entity_id, username, now),
            );
        }
        credited
    }

    fn try_daily_challenge(&self, instance: &str, username: &str) -> Result<ActionOutcome, VillageError> {
        let now = self.now();
        let state = self.ledger.require_state(instance)?;
        self.players
            .get(instance, username)?
            .ok_or_else(|| VillageError::NotFound(username.to_string()))?;
        let challenge = state
            .daily_challenge
            .ok_or_else(|| VillageError::Invalid("There is no daily challenge right now.".to_string()))?;
        if challenge.is_expired(now) {
            return Err(VillageError::Invalid(
                "Today's challenge has ended. A new one arrives soon!".to_string(),
            ));
        }
        let challenge_id = challenge.challenge_id();
        if !self.challenges.register(instance, &challenge_id, username, now)? {
            return Err(VillageError::AlreadyDone(
                "You already joined today's challenge!".to_string(),
            ));
        }

        let reward = PointTotals::single(challenge.kind, CHALLENGE_REWARD);
        let saved = self.credit_participation(&self.challenges, instance, &challenge_id, username, &reward, now)?;

        let milestones = self
            .settle(
                "challenge progress",
                instance,
                self.ledger
                    .record_challenge_participation(instance, &challenge_id, &reward, now),
            )
            .map(|(_, unlocked)| unlocked)
            .unwrap_or_default();
        self.settle(
            "activity",
            instance,
            self.activity.add(
                instance,
                Activity::new(username, "participated in the daily challenge", now),
                now,
            ),
        );
        self.broadcaster.publish(
            instance,
            VillageEvent::ChallengeJoined {
                username: username.to_string(),
                challenge_id,
            },
        );
        self.publish_progress(instance, username, &[], &milestones);

        let mut outcome = ActionOutcome::ok(
            format!("Challenge joined! +{} {} points", CHALLENGE_REWARD, challenge.kind),
            saved,
        );
        outcome.points = reward;
        outcome.milestones = milestones;
        Ok(outcome)
    }

    pub fn participate_in_daily_challenge(&self, instance: &str, username: &str) -> ActionOutcome {
        self.outcome(
            "daily challenge",
            instance,
            username,
            self.try_daily_challenge(instance, username),
        )
    }

    fn try_event(&self, instance: &str, username: &str, event_id: &str) -> Result<ActionOutcome, VillageError> {
        let now = self.now();
        self.ledger.require_state(instance)?;
        self.players
            .get(instance, username)?
            .ok_or_else(|| VillageError::NotFound(username.to_string()))?;
        let event = self
            .ledger
            .find_event(instance, event_id)?
            .filter(|event| event.is_active(now))
            .ok_or_else(|| VillageError::Invalid("That event is not running.".to_string()))?;
        if !self.events.register(instance, event_id, username, now)? {
            return Err(VillageError::AlreadyDone(
                "You already joined this event!".to_string(),
            ));
        }

        let reward = event.rewards;
        let saved = self.credit_participation(&self.events, instance, event_id, username, &reward, now)?;
        self.settle(
            "event progress",
            instance,
            self.ledger.record_event_progress(instance, event_id, now),
        );

        let milestones = self
            .settle("community delta", instance, self.ledger.apply_delta(instance, &reward, now))
            .unwrap_or_default();
        self.settle(
            "activity",
            instance,
            self.activity.add(
                instance,
                Activity::new(username, format!("participated in the \"{}\" event", event.title), now),
                now,
            ),
        );
        self.broadcaster.publish(
            instance,
            VillageEvent::EventJoined {
                username: username.to_string(),
                event_id: event_id.to_string(),
            },
        );
        self.publish_progress(instance, username, &[], &milestones);

        let mut outcome = ActionOutcome::ok(
            format!("You joined \"{}\"! +{} points", event.title, reward.total()),
            saved,
        );
        outcome.points = reward;
        outcome.milestones = milestones;
        Ok(outcome)
    }

    pub fn participate_in_event(&self, instance: &str, username: &str, event_id: &str) -> ActionOutcome {
        self.outcome(
            "event",
            instance,
            username,
            self.try_event(instance, username, event_id),
        )
    }

    fn try_adopt(
        &self,
        instance: &str,
        username: &str,
        kind: PetKind,
        name: Option<&str>,
    ) -> Result<ActionOutcome, VillageError> {
        let now = self.now();
        self.ledger.require_state(instance)?;
        let (saved, ()) = self
            .players
            .update(instance, username, now, |player| {
                actions::adopt_pet(player, kind, name, now)?;
                Ok(Change::Commit(()))
            })?
            .ok_or_else(|| VillageError::NotFound(username.to_string()))?;
        let pet_name = saved
            .pet
            .as_ref()
            .map(|pet| pet.name.clone())
            .unwrap_or_else(|| kind.display_name().to_string());
        Ok(ActionOutcome::ok(
            format!("You adopted {}! {}", pet_name, kind.bonus_description()),
            saved,
        ))
    }

    pub fn adopt_pet(&self, instance: &str, username: &str, kind: PetKind, name: Option<&str>) -> ActionOutcome {
        self.outcome(
            "adopt pet",
            instance,
            username,
            self.try_adopt(instance, username, kind, name),
        )
    }

    /// UI entry point. `None` means the viewer is not logged in.
    pub fn handle_intent(&self, instance: &str, username: Option<&str>, intent: PlayerIntent) -> ActionOutcome {
        let Some(username) = username else {
            return ActionOutcome::rejected(MSG_LOGIN);
        };
        match intent {
            PlayerIntent::Join => self.join(instance, username),
            PlayerIntent::Action { action, amount } => self.perform_action(instance, username, action, amount),
            PlayerIntent::DailyChallenge => self.participate_in_daily_challenge(instance, username),
            PlayerIntent::Event { event_id } => self.participate_in_event(instance, username, &event_id),
            PlayerIntent::AdoptPet { kind, name } => self.adopt_pet(instance, username, kind, name.as_deref()),
        }
    }

    // ==== READ MODELS ====

    pub fn game_state(&self, instance: &str) -> Option<GameState> {
        self.settle("game state", instance, self.ledger.game_state(instance))
            .flatten()
    }

    pub fn community(&self, instance: &str) -> Option<CommunityStore> {
        self.settle("community", instance, self.ledger.community(instance))
            .flatten()
    }

    pub fn leaderboard(&self, instance: &str, n: usize) -> Vec<PlayerSummary> {
        self.settle("leaderboard", instance, self.leaderboard.top(instance, n))
            .unwrap_or_default()
    }

    /// 1-based rank; players missing from the board rank one past its end.
    /// `None` only when the board could not be read.
    pub fn player_rank(&self, instance: &str, username: &str) -> Option<usize> {
        self.settle("rank", instance, self.leaderboard.rank(instance, username))
    }

    /// Highest scores from the sorted-set index, which covers every player
    /// rather than the bounded board. Empty when the index is disabled.
    pub fn score_ranking(&self, instance: &str, n: usize) -> Vec<ScoredMember> {
        self.settle("score ranking", instance, self.leaderboard.top_scores(instance, n))
            .unwrap_or_default()
    }

    pub fn recent_activities(&self, instance: &str, limit: Option<usize>) -> Vec<Activity> {
        self.settle("activities", instance, self.activity.recent(instance, limit))
            .unwrap_or_default()
    }

    pub fn add_activity(&self, instance: &str, username: &str, action: &str) -> bool {
        let now = self.now();
        self.settle(
            "activity",
            instance,
            self.activity.add(instance, Activity::new(username, action, now), now),
        )
        .is_some()
    }

    pub fn has_participated_in_event(&self, instance: &str, event_id: &str, username: &str) -> bool {
        self.settle(
            "event participation",
            instance,
            self.events.has_participated(instance, event_id, username),
        )
        .unwrap_or(false)
    }

    pub fn has_participated_in_challenge(&self, instance: &str, challenge_id: &str, username: &str) -> bool {
        self.settle(
            "challenge participation",
            instance,
            self.challenges.has_participated(instance, challenge_id, username),
        )
        .unwrap_or(false)
    }

    /// Raw registry access; `true` only for the first registration.
    pub fn register_event_participation(&self, instance: &str, event_id: &str, username: &str) -> bool {
        self.settle(
            "register event",
            instance,
            self.events.register(instance, event_id, username, self.now()),
        )
        .unwrap_or(false)
    }

    pub fn register_challenge_participation(&self, instance: &str, challenge_id: &str, username: &str) -> bool {
        self.settle(
            "register challenge",
            instance,
            self.challenges.register(instance, challenge_id, username, self.now()),
        )
        .unwrap_or(false)
    }

    pub fn apply_community_delta(&self, instance: &str, delta: &PointTotals) -> bool {
        self.settle(
            "community delta",
            instance,
            self.ledger.apply_delta(instance, delta, self.now()),
        )
        .is_some()
    }

    pub fn check_milestones(&self, instance: &str) -> Vec<Milestone> {
        self.settle("milestones", instance, self.ledger.check_milestones(instance, self.now()))
            .unwrap_or_default()
    }

    pub fn check_and_create_shard(&self, instance: &str) -> Option<u32> {
        self.settle("shard check", instance, self.router.check_and_create(instance, self.now()))
            .flatten()
    }

    fn try_snapshot(&self, instance: &str, username: &str) -> Result<VillageSnapshot, VillageError> {
        let now = self.now();
        let game_state = self.ledger.require_state(instance)?;
        let player = self
            .players
            .update(instance, username, now, |player| {
                player.last_active = now;
                Ok(Change::Commit(()))
            })?
            .map(|(player, ())| player);
        let quests = match &player {
            Some(p) => self.quests.player_quests(instance, &p.quest_ids)?,
            None => Vec::new(),
        };
        let challenge_participated = match &game_state.daily_challenge {
            Some(challenge) => self
                .challenges
                .has_participated(instance, &challenge.challenge_id(), username)?,
            None => false,
        };
        let community = self.ledger.community(instance)?;
        let mut event_participation = BTreeMap::new();
        if let Some(community) = &community {
            for event in community.events.iter().filter(|e| e.is_active(now)) {
                let joined = self.events.has_participated(instance, &event.id, username)?;
                event_participation.insert(event.id.clone(), joined);
            }
        }
        Ok(VillageSnapshot {
            rank: self.leaderboard.rank(instance, username)?,
            leaderboard: self.leaderboard.top(instance, LEADERBOARD_PREVIEW)?,
            activities: self.activity.recent(instance, None)?,
            game_state,
            player,
            quests,
            community,
            challenge_participated,
            event_participation,
        })
    }

    /// Everything the player's view needs. Also marks the player active.
    pub fn snapshot(&self, instance: &str, username: &str) -> Option<VillageSnapshot> {
        self.settle("snapshot", instance, self.try_snapshot(instance, username))
    }

    fn try_overview(&self, instance: &str) -> Result<VillageOverview, VillageError> {
        Ok(VillageOverview {
            game_state: self.ledger.require_state(instance)?,
            community: self.ledger.community(instance)?,
            leaderboard: self.leaderboard.top(instance, LEADERBOARD_PREVIEW)?,
            activities: self.activity.recent(instance, None)?,
        })
    }

    pub fn overview(&self, instance: &str) -> Option<VillageOverview> {
        self.settle("overview", instance, self.try_overview(instance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn village() -> Village {
        Village::in_memory(EngineConfig::default())
    }

    #[test]
    fn actions_before_initialization_get_a_clear_message() {
        let village = village();
        let outcome = village.perform_action("p1", "alice", ActionKind::Plant, 1);
        assert!(!outcome.success);
        assert_eq!(outcome.message, actions::MSG_NOT_INITIALIZED);
    }

    #[test]
    fn anonymous_intents_are_refused() {
        let village = village();
        let outcome = village.handle_intent("p1", None, PlayerIntent::Join);
        assert_eq!(outcome.message, MSG_LOGIN);
    }

    #[test]
    fn join_then_act_updates_community() {
        let village = village();
        assert!(village.initialize_instance("p1"));
        assert!(village.join("p1", "alice").success);
        let outcome = village.perform_action("p1", "alice", ActionKind::Help, 2);
        assert!(outcome.success, "{}", outcome.message);
        let state = village.game_state("p1").expect("state");
        assert_eq!(state.community_progress.social, 2);
        assert_eq!(state.player_count, 1);
    }

    #[test]
    fn failing_store_preserves_no_partial_state() {
        let store = Arc::new(MemoryStore::new());
        let village = Village::new(store.clone(), EngineConfig::default());
        village.initialize_instance("p1");
        village.join("p1", "bob");
        store.set_failing(true);
        let outcome = village.perform_action("p1", "bob", ActionKind::Learn, 1);
        assert!(!outcome.success);
        assert_eq!(outcome.message, actions::MSG_STORE_FAILURE);
        assert!(village.get_player("p1", "bob").is_none());
        store.set_failing(false);
        let bob = village.get_player("p1", "bob").expect("bob");
        assert_eq!(bob.stats.personal, 0);
    }
}
