//! Personal quests.
//!
//! All quests of an instance live in one quest store record. Progress for an
//! action is applied to that record in a single compare-and-swap, and any
//! replacement quests for completed ones are inserted in the same write.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::metrics;
use crate::village::errors::VillageError;
use crate::village::storage::{keys, Change, Records};
use crate::village::types::{PlayerData, PointKind, PointReward, PointTotals, QuestData, QuestReward, QuestStore};

const ENVIRONMENTAL_TITLES: [&str; 5] = [
    "Green Guardian",
    "Nature's Ally",
    "Eco Warrior",
    "Environmental Steward",
    "Earth Protector",
];
const SOCIAL_TITLES: [&str; 5] = [
    "Community Builder",
    "Social Butterfly",
    "Neighborly Helper",
    "Village Connector",
    "Friend to All",
];
const PERSONAL_TITLES: [&str; 5] = [
    "Self Improver",
    "Knowledge Seeker",
    "Skill Master",
    "Personal Growth",
    "Mind Expander",
];

const ENVIRONMENTAL_DESCRIPTIONS: [&str; 5] = [
    "Plant more trees and flowers to improve our environment.",
    "Keep your home and surroundings clean for a healthier ecosystem.",
    "Grow sustainable crops in your farm to support local food needs.",
    "Create a beautiful garden to support local wildlife.",
    "Promote environmental consciousness in Villehaven.",
];
const SOCIAL_DESCRIPTIONS: [&str; 5] = [
    "Help your neighbors with their daily tasks.",
    "Participate in community events and activities.",
    "Build connections with other villagers.",
    "Support community initiatives and projects.",
    "Spread positivity throughout the village.",
];
const PERSONAL_DESCRIPTIONS: [&str; 5] = [
    "Focus on your own learning and personal growth.",
    "Develop new skills to benefit yourself and others.",
    "Expand your knowledge in various areas.",
    "Take time for self-reflection and improvement.",
    "Nurture your mind with new experiences.",
];

fn titles_for(kind: PointKind) -> &'static [&'static str] {
    match kind {
        PointKind::Environmental => &ENVIRONMENTAL_TITLES,
        PointKind::Social => &SOCIAL_TITLES,
        PointKind::Personal => &PERSONAL_TITLES,
    }
}

fn descriptions_for(kind: PointKind) -> &'static [&'static str] {
    match kind {
        PointKind::Environmental => &ENVIRONMENTAL_DESCRIPTIONS,
        PointKind::Social => &SOCIAL_DESCRIPTIONS,
        PointKind::Personal => &PERSONAL_DESCRIPTIONS,
    }
}

fn pick<R: Rng>(options: &[&'static str], rng: &mut R) -> String {
    options.choose(rng).copied().unwrap_or_default().to_string()
}

/// `{prefix}_{millis}_{7 base-36 chars}`
fn quest_id<R: Rng>(prefix: &str, now: DateTime<Utc>, rng: &mut R) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let suffix: String = (0..7)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("{}_{}_{}", prefix, now.timestamp_millis(), suffix)
}

#[allow(clippy::too_many_arguments)]
fn quest(
    id: String,
    kind: PointKind,
    title: &str,
    description: &str,
    goal: u32,
    points: u64,
    currency: u64,
    player_id: &str,
) -> QuestData {
    QuestData {
        id,
        title: title.to_string(),
        description: description.to_string(),
        progress: 0,
        goal,
        reward: QuestReward {
            points: PointReward::new(kind, points),
            currency,
            items: Vec::new(),
        },
        completed_at: None,
        player_id: player_id.to_string(),
        follow_up: None,
    }
}

/// The three starter quests every new player receives, one per track.
pub fn welcome_quests<R: Rng>(player_id: &str, now: DateTime<Utc>, rng: &mut R) -> Vec<QuestData> {
    vec![
        quest(
            quest_id("welcome_quest", now, rng),
            PointKind::Personal,
            "Welcome to Villehaven",
            "Take your first steps in improving your new home.",
            3,
            10,
            50,
            player_id,
        ),
        quest(
            quest_id("plant_trees", now, rng),
            PointKind::Environmental,
            "Greener Village",
            "Plant trees to improve the environment.",
            5,
            15,
            30,
            player_id,
        ),
        quest(
            quest_id("help_neighbors", now, rng),
            PointKind::Social,
            "Neighborly",
            "Help your neighbors with their tasks.",
            3,
            15,
            25,
            player_id,
        ),
    ]
}

/// A fresh quest on one of the two tracks other than `completed`.
pub fn replacement_quest<R: Rng>(
    completed: PointKind,
    player_id: &str,
    now: DateTime<Utc>,
    rng: &mut R,
) -> QuestData {
    let others = completed.others();
    let kind = others[rng.gen_range(0..others.len())];
    let title = pick(titles_for(kind), rng);
    let description = pick(descriptions_for(kind), rng);
    let goal = rng.gen_range(3..=7);
    let points = rng.gen_range(10..=20);
    let currency = rng.gen_range(20..=50);
    quest(
        quest_id(kind.as_str(), now, rng),
        kind,
        &title,
        &description,
        goal,
        points,
        currency,
        player_id,
    )
}

/// What one action did to the quest store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestProgress {
    pub advanced: Vec<String>,
    /// Quests that reached their goal with this action, as stored.
    pub completed: Vec<QuestData>,
    /// Replacements generated for `completed`, already persisted.
    pub new_quests: Vec<QuestData>,
}

impl QuestProgress {
    pub fn is_empty(&self) -> bool {
        self.advanced.is_empty()
    }
}

/// Rewards credited to a player by [`collect_rewards`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestPayout {
    pub quests: Vec<QuestData>,
    pub follow_ups: Vec<QuestData>,
    pub points: PointTotals,
    pub currency: u64,
    pub items: Vec<String>,
}

/// Credit every completed quest of `player` that has not been paid yet and
/// attach its follow-up quest.
///
/// Completion is stored on the quest while payment is stored on the player,
/// so a completion whose player write failed is paid by the next write that
/// runs this.
pub fn collect_rewards(store: &QuestStore, player: &mut PlayerData) -> QuestPayout {
    let owed: Vec<QuestData> = player
        .quest_ids
        .iter()
        .filter(|id| !player.rewarded_quests.contains(*id))
        .filter_map(|id| store.quests.get(id))
        .filter(|quest| quest.is_complete())
        .cloned()
        .collect();

    let mut payout = QuestPayout::default();
    for quest in owed {
        payout.points.add(&quest.reward.points.as_totals());
        payout.currency = payout.currency.saturating_add(quest.reward.currency);
        payout.items.extend(quest.reward.items.iter().cloned());
        player.rewarded_quests.push(quest.id.clone());
        if let Some(next) = quest.follow_up.as_ref().and_then(|id| store.quests.get(id)) {
            if !player.quest_ids.contains(&next.id) {
                player.quest_ids.push(next.id.clone());
            }
            payout.follow_ups.push(next.clone());
        }
        payout.quests.push(quest);
    }
    player.stats.add_points(&payout.points);
    player.inventory.currency = player.inventory.currency.saturating_add(payout.currency);
    player.inventory.items.extend(payout.items.iter().cloned());
    payout
}

#[derive(Clone)]
pub struct QuestEngine {
    records: Records,
}

impl QuestEngine {
    pub fn new(records: Records) -> Self {
        Self { records }
    }

    fn key(instance: &str) -> String {
        keys::quest_store(instance)
    }

    pub fn store(&self, instance: &str) -> Result<Option<QuestStore>, VillageError> {
        self.records.load(&Self::key(instance))
    }

    /// Quests for `ids`, in id order; unknown ids are skipped.
    pub fn player_quests(&self, instance: &str, ids: &[String]) -> Result<Vec<QuestData>, VillageError> {
        let Some(store) = self.store(instance)? else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|id| store.quests.get(id).cloned()).collect())
    }

    /// Persist the welcome quests for a new player and return their ids.
    ///
    /// Ids are re-rolled inside the write if they collide with an existing quest.
    pub fn create_welcome_quests<R: Rng>(
        &self,
        instance: &str,
        player_id: &str,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<Vec<String>, VillageError> {
        let (_, ids) = self.records.upsert::<QuestStore, Vec<String>, _, _>(
            &Self::key(instance),
            now,
            || QuestStore::new(now),
            |store| {
                let mut ids = Vec::with_capacity(3);
                for mut quest in welcome_quests(player_id, now, &mut *rng) {
                    while store.quests.contains_key(&quest.id) {
                        quest.id = quest_id("welcome", now, &mut *rng);
                    }
                    ids.push(quest.id.clone());
                    store.quests.insert(quest.id.clone(), quest);
                }
                Ok(Change::Commit(ids))
            },
        )?;
        Ok(ids)
    }

    /// Advance every incomplete quest of `track` among `quest_ids` by one.
    ///
    /// Completion and replacement generation happen in the same write, so a
    /// quest completes once. Paying for it is [`collect_rewards`]'s job.
    pub fn process_action<R: Rng>(
        &self,
        instance: &str,
        player_id: &str,
        quest_ids: &[String],
        track: PointKind,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<QuestProgress, VillageError> {
        let (_, progress) = self.records.upsert::<QuestStore, QuestProgress, _, _>(
            &Self::key(instance),
            now,
            || QuestStore::new(now),
            |store| {
                let mut progress = QuestProgress::default();
                let mut finished = Vec::new();
                for id in quest_ids {
                    let Some(quest) = store.quests.get_mut(id) else {
                        continue;
                    };
                    if quest.is_complete() || quest.kind() != track || quest.progress >= quest.goal {
                        continue;
                    }
                    quest.progress += 1;
                    progress.advanced.push(id.clone());
                    if quest.progress == quest.goal {
                        quest.completed_at = Some(now);
                        finished.push((id.clone(), quest.kind()));
                    }
                }
                for (id, kind) in finished {
                    let mut fresh = replacement_quest(kind, player_id, now, &mut *rng);
                    while store.quests.contains_key(&fresh.id) {
                        fresh.id = quest_id(fresh.kind().as_str(), now, &mut *rng);
                    }
                    if let Some(done) = store.quests.get_mut(&id) {
                        done.follow_up = Some(fresh.id.clone());
                        progress.completed.push(done.clone());
                    }
                    store.quests.insert(fresh.id.clone(), fresh.clone());
                    progress.new_quests.push(fresh);
                }
                if progress.is_empty() {
                    Ok(Change::Abort(progress))
                } else {
                    Ok(Change::Commit(progress))
                }
            },
        )?;
        if !progress.completed.is_empty() {
            metrics::add_quests_completed(progress.completed.len() as u64);
        }
        Ok(progress)
    }
}
