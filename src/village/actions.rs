//! Player-facing action rules and the intent/outcome types exchanged with the UI.
//!
//! Everything here is pure: given a player record, an action mutates it and
//! reports the points it granted. Persistence and the community-side effects
//! are orchestrated by [`crate::village::Village`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::village::errors::VillageError;
use crate::village::types::{Crop, Milestone, PetData, PetKind, PlayerData, PointKind, PointTotals, QuestData};

pub const MSG_NOT_INITIALIZED: &str = "Village not initialized yet - please join/initialize first";
pub const MSG_LOGIN: &str = "Please log in to play";
pub const MSG_JOIN_FIRST: &str = "Please join the game first!";
pub const MSG_PET_TAKEN: &str = "You already have a pet!";
pub const MSG_STORE_FAILURE: &str = "Something went wrong saving your progress. Please try again.";
pub const MSG_BUSY: &str = "The village is busy right now. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Plant,
    Clean,
    Help,
    Learn,
}

impl ActionKind {
    pub const ALL: [ActionKind; 4] = [
        ActionKind::Plant,
        ActionKind::Clean,
        ActionKind::Help,
        ActionKind::Learn,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "plant" => Some(ActionKind::Plant),
            "clean" => Some(ActionKind::Clean),
            "help" => Some(ActionKind::Help),
            "learn" => Some(ActionKind::Learn),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Plant => "plant",
            ActionKind::Clean => "clean",
            ActionKind::Help => "help",
            ActionKind::Learn => "learn",
        }
    }

    /// Quest track advanced by this action.
    pub fn quest_track(&self) -> PointKind {
        match self {
            ActionKind::Plant | ActionKind::Clean => PointKind::Environmental,
            ActionKind::Help => PointKind::Social,
            ActionKind::Learn => PointKind::Personal,
        }
    }

    /// Points granted for `amount`, independent of the player's state.
    pub fn points(&self, amount: u32) -> PointTotals {
        let amount = u64::from(amount);
        match self {
            ActionKind::Plant => PointTotals::new(amount, 0, 0),
            ActionKind::Clean => {
                let personal = amount / 2;
                PointTotals::new(amount - personal, 0, personal)
            }
            ActionKind::Help => PointTotals::new(0, amount, 0),
            ActionKind::Learn => PointTotals::new(0, 0, amount),
        }
    }

    /// Activity feed wording.
    pub fn describe(&self, amount: u32) -> &'static str {
        match self {
            ActionKind::Plant if amount > 1 => "planted crops",
            ActionKind::Plant => "planted a plant",
            ActionKind::Clean => "cleaned their house",
            ActionKind::Help => "helped a neighbor",
            ActionKind::Learn => "learned something new",
        }
    }

    /// Apply the action to `player` and return the points it granted.
    pub fn apply(&self, player: &mut PlayerData, amount: u32, now: DateTime<Utc>) -> Result<PointTotals, VillageError> {
        if amount == 0 {
            return Err(VillageError::Invalid("amount must be at least 1".to_string()));
        }
        let points = self.points(amount);
        match self {
            ActionKind::Plant => plant(player, amount, now),
            ActionKind::Clean => {
                let interior = &mut player.house.interior;
                let raised = u32::from(interior.cleanliness).saturating_add(amount.saturating_mul(10));
                interior.cleanliness = raised.min(100) as u8;
            }
            ActionKind::Help | ActionKind::Learn => {}
        }
        player.stats.add_points(&points);
        player.stats.total_actions = player.stats.total_actions.saturating_add(1);
        player.last_active = now;
        Ok(points)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn plant(player: &mut PlayerData, amount: u32, now: DateTime<Utc>) {
    let farm = &mut player.house.farm;
    if amount > 2 {
        farm.trees = farm.trees.saturating_add(1);
        return;
    }
    let seed = if amount == 1 { "carrot" } else { "tomato" };
    if let Some(count) = player.inventory.seeds.get_mut(seed) {
        if *count > 0 {
            *count -= 1;
            farm.crops.push(Crop {
                kind: seed.to_string(),
                planted_at: now,
                growth_stage: 0,
            });
        }
    }
}

/// Give the player a pet. A player keeps their first pet for good.
pub fn adopt_pet(player: &mut PlayerData, kind: PetKind, name: Option<&str>, now: DateTime<Utc>) -> Result<(), VillageError> {
    if player.pet.is_some() {
        return Err(VillageError::AlreadyDone(MSG_PET_TAKEN.to_string()));
    }
    let name = name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(kind.display_name());
    player.pet = Some(PetData {
        kind,
        name: name.to_string(),
        happiness: 100,
        adopted_at: now,
    });
    player.last_active = now;
    Ok(())
}

/// What the UI can ask the engine to do on behalf of a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerIntent {
    Join,
    Action { action: ActionKind, amount: u32 },
    DailyChallenge,
    Event { event_id: String },
    AdoptPet { kind: PetKind, name: Option<String> },
}

/// Result of a player intent: a short message plus the player's latest known record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub message: String,
    pub player: Option<PlayerData>,
    pub points: PointTotals,
    pub completed_quests: Vec<QuestData>,
    pub new_quests: Vec<QuestData>,
    pub milestones: Vec<Milestone>,
}

impl ActionOutcome {
    pub fn ok(message: impl Into<String>, player: PlayerData) -> Self {
        Self {
            success: true,
            message: message.into(),
            player: Some(player),
            points: PointTotals::default(),
            completed_quests: Vec::new(),
            new_quests: Vec::new(),
            milestones: Vec::new(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            player: None,
            points: PointTotals::default(),
            completed_quests: Vec::new(),
            new_quests: Vec::new(),
            milestones: Vec::new(),
        }
    }

    /// Map an engine error onto the user-visible message for it.
    pub fn from_error(err: &VillageError) -> Self {
        let message = match err {
            VillageError::Uninitialized(_) => MSG_NOT_INITIALIZED.to_string(),
            VillageError::NotFound(_) => MSG_JOIN_FIRST.to_string(),
            VillageError::AlreadyDone(msg) | VillageError::Invalid(msg) => msg.clone(),
            VillageError::Conflict(_) => MSG_BUSY.to_string(),
            _ => MSG_STORE_FAILURE.to_string(),
        };
        Self::rejected(message)
    }

    pub fn with_player(mut self, player: Option<PlayerData>) -> Self {
        self.player = player;
        self
    }
}
