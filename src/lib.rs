//! # Villehaven - shared-state village engine
//!
//! Villehaven is the progression and storage engine behind a multiplayer
//! village simulation. Many players share one village per game instance:
//! every point a player earns also moves the village's community progress,
//! unlocks milestones and feeds a shared leaderboard and activity feed.
//!
//! ## Features
//!
//! - **Sharded player storage**: players live in fixed-capacity shards with a
//!   deterministic home-shard hash and an index for stable lookups.
//! - **Conflict-safe writes**: every shared record is updated through
//!   compare-and-swap with bounded retries, so concurrent actions never lose
//!   each other's updates.
//! - **Quests, challenges and events**: per-player quests with one-time
//!   rewards, a daily community challenge and rotating community events, each
//!   rewarded at most once per player.
//! - **Maintenance jobs**: daily reset, weekly stats, full-scan recounts and
//!   shard capacity checks, runnable inline or through a tokio runner.
//! - **Storage backends**: sled on disk, or an in-memory store for tests.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use villehaven::config::EngineConfig;
//! use villehaven::village::{ActionKind, Village};
//!
//! let village = Village::open("./data/villehaven", EngineConfig::default())?;
//! village.initialize_instance("post-1");
//! village.join("post-1", "alice");
//! let outcome = village.perform_action("post-1", "alice", ActionKind::Plant, 3);
//! println!("{}", outcome.message);
//! # Ok::<(), villehaven::village::VillageError>(())
//! ```
//!
//! ## Module Organization
//!
//! - [`village`] - the engine and its components
//! - [`config`] - TOML configuration
//! - [`validation`] - instance id and username checks
//! - [`metrics`] - process-wide counters
//! - [`logutil`] - log escaping for user-supplied text

pub mod config;
pub mod logutil;
pub mod metrics;
pub mod validation;
pub mod village;
