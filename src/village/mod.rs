//! The Villehaven engine: shared community state, player progression and
//! sharded player storage on top of a key-value store.
//!
//! [`Village`] is the entry point. The submodules are usable on their own
//! (tests drive them directly with a [`storage::MemoryStore`]).

pub mod actions;
pub mod activity;
pub mod engine;
pub mod errors;
pub mod leaderboard;
pub mod ledger;
pub mod maintenance;
pub mod participation;
pub mod players;
pub mod quest;
pub mod realtime;
pub mod shard;
pub mod storage;
pub mod types;

pub use actions::{ActionKind, ActionOutcome, PlayerIntent};
pub use engine::{Clock, Village, VillageOverview, VillageSnapshot};
pub use errors::VillageError;
pub use maintenance::{start_maintenance, JobReport, MaintenanceHandle, MaintenanceJob};
pub use realtime::{Broadcaster, Envelope, VillageEvent};
pub use shard::shard_of;
pub use storage::{MemoryStore, SledStore, SledStoreBuilder, Store};
pub use types::*;
