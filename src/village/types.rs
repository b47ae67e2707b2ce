use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Schema tag written into every `GameState`.
pub const GAME_STATE_VERSION: u32 = 1;

/// Name used for system-authored activity entries.
pub const SYSTEM_ACTOR: &str = "Villehaven";

/// Records persisted through [`crate::village::storage::Records`].
///
/// `touch` is invoked on every successful write so that revisions and
/// `last_updated` stamps never have to be maintained by hand.
pub trait Record: Serialize + serde::de::DeserializeOwned {
    fn touch(&mut self, now: DateTime<Utc>);
}

macro_rules! revisioned_record {
    ($ty:ty) => {
        impl Record for $ty {
            fn touch(&mut self, now: DateTime<Utc>) {
                self.revision = self.revision.wrapping_add(1);
                self.last_updated = now;
            }
        }
    };
}

/// The three progression tracks shared by quests, challenges and community totals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PointKind {
    Environmental,
    Social,
    Personal,
}

impl PointKind {
    pub const ALL: [PointKind; 3] = [
        PointKind::Environmental,
        PointKind::Social,
        PointKind::Personal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PointKind::Environmental => "environmental",
            PointKind::Social => "social",
            PointKind::Personal => "personal",
        }
    }

    /// The two kinds different from `self`, in declaration order.
    pub fn others(&self) -> [PointKind; 2] {
        match self {
            PointKind::Environmental => [PointKind::Social, PointKind::Personal],
            PointKind::Social => [PointKind::Environmental, PointKind::Personal],
            PointKind::Personal => [PointKind::Environmental, PointKind::Social],
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "environmental" | "env" | "environment" => Some(PointKind::Environmental),
            "social" | "soc" | "community" => Some(PointKind::Social),
            "personal" | "per" | "growth" => Some(PointKind::Personal),
            _ => None,
        }
    }
}

impl std::fmt::Display for PointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bundle of environmental/social/personal points. Used both for community
/// totals and for the deltas applied to them.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PointTotals {
    pub environmental: u64,
    pub social: u64,
    pub personal: u64,
}

impl PointTotals {
    pub fn new(environmental: u64, social: u64, personal: u64) -> Self {
        Self {
            environmental,
            social,
            personal,
        }
    }

    pub fn single(kind: PointKind, amount: u64) -> Self {
        let mut totals = Self::default();
        *totals.get_mut(kind) = amount;
        totals
    }

    pub fn get(&self, kind: PointKind) -> u64 {
        match kind {
            PointKind::Environmental => self.environmental,
            PointKind::Social => self.social,
            PointKind::Personal => self.personal,
        }
    }

    pub fn get_mut(&mut self, kind: PointKind) -> &mut u64 {
        match kind {
            PointKind::Environmental => &mut self.environmental,
            PointKind::Social => &mut self.social,
            PointKind::Personal => &mut self.personal,
        }
    }

    pub fn total(&self) -> u64 {
        self.environmental
            .saturating_add(self.social)
            .saturating_add(self.personal)
    }

    pub fn is_zero(&self) -> bool {
        self.total() == 0
    }

    pub fn add(&mut self, other: &PointTotals) {
        self.environmental = self.environmental.saturating_add(other.environmental);
        self.social = self.social.saturating_add(other.social);
        self.personal = self.personal.saturating_add(other.personal);
    }
}

// ==== ROOT GAME STATE ====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameState {
    pub version: u32,
    pub revision: u64,
    pub community_progress: PointTotals,
    pub player_count: u64,
    /// Players active within the configured window; recomputed by maintenance.
    pub active_player_count: u64,
    pub daily_challenge: Option<DailyChallenge>,
    /// Number of player shards created so far. Never decreases.
    pub shard_count: u32,
    pub last_updated: DateTime<Utc>,
}

impl GameState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            version: GAME_STATE_VERSION,
            revision: 0,
            community_progress: PointTotals::default(),
            player_count: 0,
            active_player_count: 0,
            daily_challenge: None,
            shard_count: 1,
            last_updated: now,
        }
    }
}

revisioned_record!(GameState);

// ==== PLAYER RECORDS ====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerShard {
    pub shard_id: u32,
    pub players: HashMap<String, PlayerData>,
    pub revision: u64,
    pub last_updated: DateTime<Utc>,
}

impl PlayerShard {
    pub fn new(shard_id: u32, now: DateTime<Utc>) -> Self {
        Self {
            shard_id,
            players: HashMap::new(),
            revision: 0,
            last_updated: now,
        }
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

revisioned_record!(PlayerShard);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interior {
    pub cleanliness: u8,
    pub furniture: Vec<String>,
    pub decorations: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Exterior {
    pub plants: u32,
    pub decorations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Crop {
    pub kind: String,
    pub planted_at: DateTime<Utc>,
    pub growth_stage: u8,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Farm {
    pub crops: Vec<Crop>,
    pub trees: u32,
    pub compost: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HouseData {
    pub interior: Interior,
    pub exterior: Exterior,
    pub farm: Farm,
}

impl Default for HouseData {
    fn default() -> Self {
        Self {
            interior: Interior {
                cleanliness: 50,
                furniture: vec![
                    "basic_bed".to_string(),
                    "basic_table".to_string(),
                    "basic_chair".to_string(),
                ],
                decorations: Vec::new(),
            },
            exterior: Exterior::default(),
            farm: Farm::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Inventory {
    pub seeds: BTreeMap<String, u32>,
    pub materials: BTreeMap<String, u32>,
    pub items: Vec<String>,
    pub currency: u64,
}

impl Default for Inventory {
    fn default() -> Self {
        let seeds = [("carrot", 5), ("tomato", 3)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let materials = [("wood", 10), ("stone", 5)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Self {
            seeds,
            materials,
            items: Vec::new(),
            currency: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerStats {
    pub environmental: u64,
    pub social: u64,
    pub personal: u64,
    pub total_actions: u64,
}

impl PlayerStats {
    pub fn total_points(&self) -> u64 {
        self.environmental
            .saturating_add(self.social)
            .saturating_add(self.personal)
    }

    pub fn add_points(&mut self, points: &PointTotals) {
        self.environmental = self.environmental.saturating_add(points.environmental);
        self.social = self.social.saturating_add(points.social);
        self.personal = self.personal.saturating_add(points.personal);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PetKind {
    Cat,
    Dog,
    Bird,
    Rabbit,
}

impl PetKind {
    pub const ALL: [PetKind; 4] = [PetKind::Cat, PetKind::Dog, PetKind::Bird, PetKind::Rabbit];

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cat" => Some(PetKind::Cat),
            "dog" => Some(PetKind::Dog),
            "bird" => Some(PetKind::Bird),
            "rabbit" => Some(PetKind::Rabbit),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PetKind::Cat => "Cat",
            PetKind::Dog => "Dog",
            PetKind::Bird => "Bird",
            PetKind::Rabbit => "Rabbit",
        }
    }

    pub fn bonus_description(&self) -> &'static str {
        match self {
            PetKind::Cat => "Boosts personal growth points by 10%",
            PetKind::Dog => "Boosts community points by 10%",
            PetKind::Bird => "Boosts environmental points by 10%",
            PetKind::Rabbit => "Makes crops grow 15% faster",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PetData {
    pub kind: PetKind,
    pub name: String,
    pub happiness: u8,
    pub adopted_at: DateTime<Utc>,
}

/// The single source of truth for one player's progression.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerData {
    pub username: String,
    pub joined_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    /// Home shard, fixed at join time. Reads and writes route through this value.
    pub shard_id: u32,
    /// Optimistic concurrency token; bumped by every successful save.
    pub revision: u64,
    pub house: HouseData,
    pub inventory: Inventory,
    pub stats: PlayerStats,
    pub quest_ids: Vec<String>,
    /// Completed quests whose reward has been credited to this record.
    pub rewarded_quests: Vec<String>,
    pub pet: Option<PetData>,
}

impl PlayerData {
    pub fn summary(&self) -> PlayerSummary {
        PlayerSummary {
            username: self.username.clone(),
            total_points: self.stats.total_points(),
            last_active: self.last_active,
            joined_at: self.joined_at,
        }
    }
}

// ==== QUESTS ====

/// Point portion of a quest reward. Exactly one track is rewarded, matching the quest's kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PointReward {
    Environmental(u64),
    Social(u64),
    Personal(u64),
}

impl PointReward {
    pub fn new(kind: PointKind, amount: u64) -> Self {
        match kind {
            PointKind::Environmental => PointReward::Environmental(amount),
            PointKind::Social => PointReward::Social(amount),
            PointKind::Personal => PointReward::Personal(amount),
        }
    }

    pub fn kind(&self) -> PointKind {
        match self {
            PointReward::Environmental(_) => PointKind::Environmental,
            PointReward::Social(_) => PointKind::Social,
            PointReward::Personal(_) => PointKind::Personal,
        }
    }

    pub fn amount(&self) -> u64 {
        match *self {
            PointReward::Environmental(n) | PointReward::Social(n) | PointReward::Personal(n) => n,
        }
    }

    pub fn as_totals(&self) -> PointTotals {
        PointTotals::single(self.kind(), self.amount())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestReward {
    pub points: PointReward,
    pub currency: u64,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestData {
    pub id: String,
    pub title: String,
    pub description: String,
    pub progress: u32,
    pub goal: u32,
    pub reward: QuestReward,
    /// Set once when `progress` reaches `goal`; immutable afterwards.
    pub completed_at: Option<DateTime<Utc>>,
    pub player_id: String,
    /// Replacement generated when this quest completed.
    pub follow_up: Option<String>,
}

impl QuestData {
    /// The quest's track is carried by its reward variant.
    pub fn kind(&self) -> PointKind {
        self.reward.points.kind()
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestStore {
    pub quests: HashMap<String, QuestData>,
    pub revision: u64,
    pub last_updated: DateTime<Utc>,
}

impl QuestStore {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            quests: HashMap::new(),
            revision: 0,
            last_updated: now,
        }
    }
}

revisioned_record!(QuestStore);

// ==== COMMUNITY ====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommunityEvent {
    pub id: String,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub goal: u32,
    pub progress: u32,
    /// Legacy small-scale participant list. Advisory only; the participation
    /// registry decides who has been rewarded.
    pub participants: Vec<String>,
    pub rewards: PointTotals,
}

impl CommunityEvent {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.end_time > now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyChallenge {
    pub kind: PointKind,
    pub description: String,
    pub goal: u32,
    pub current: u32,
    /// Legacy inline list, advisory only (see [`CommunityEvent::participants`]).
    pub participants: Vec<String>,
    pub participant_count: u64,
    pub created_on: NaiveDate,
    pub expires_at: DateTime<Utc>,
}

impl DailyChallenge {
    /// Participation identity, stable for a given (date, type) pair.
    pub fn challenge_id(&self) -> String {
        format!("daily_{}_{}", self.created_on.format("%Y-%m-%d"), self.kind)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Milestone {
    pub id: String,
    pub title: String,
    pub description: String,
    pub points_required: u64,
    /// One-way flag.
    pub achieved: bool,
    pub achieved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommunityStore {
    pub events: Vec<CommunityEvent>,
    pub milestones: Vec<Milestone>,
    pub revision: u64,
    pub last_updated: DateTime<Utc>,
}

revisioned_record!(CommunityStore);

// ==== LEADERBOARD & ACTIVITY ====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerSummary {
    pub username: String,
    pub total_points: u64,
    pub last_active: DateTime<Utc>,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaderboardStore {
    pub players: Vec<PlayerSummary>,
    pub revision: u64,
    pub last_updated: DateTime<Utc>,
}

impl LeaderboardStore {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            players: Vec::new(),
            revision: 0,
            last_updated: now,
        }
    }
}

revisioned_record!(LeaderboardStore);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub username: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
}

impl Activity {
    pub fn new(username: impl Into<String>, action: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            username: username.into(),
            action: action.into(),
            timestamp: now,
        }
    }
}

/// Most-recent-first activity log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityStore {
    pub activities: Vec<Activity>,
    pub revision: u64,
    pub last_updated: DateTime<Utc>,
}

impl ActivityStore {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            activities: Vec::new(),
            revision: 0,
            last_updated: now,
        }
    }
}

revisioned_record!(ActivityStore);

// ==== PARTICIPATION ====

/// Per-entity participant set for an event or a daily challenge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParticipationRecord {
    pub entity_id: String,
    pub participants: HashMap<String, bool>,
    pub participant_count: u64,
    pub revision: u64,
    pub last_updated: DateTime<Utc>,
}

impl ParticipationRecord {
    pub fn new(entity_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            participants: HashMap::new(),
            participant_count: 0,
            revision: 0,
            last_updated: now,
        }
    }
}

revisioned_record!(ParticipationRecord);
