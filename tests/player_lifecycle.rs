//! Joining, actions and pets through the `Village` facade.

mod common;

use common::{village, INSTANCE};
use villehaven::village::actions::{MSG_JOIN_FIRST, MSG_LOGIN, MSG_NOT_INITIALIZED, MSG_PET_TAKEN};
use villehaven::config::EngineConfig;
use villehaven::village::{shard_of, ActionKind, PetKind, PlayerIntent, PointTotals, Village};

#[test]
fn alice_joins_a_fresh_instance() {
    let village = village();
    assert_eq!(shard_of("alice", 1), 0);

    let outcome = village.join(INSTANCE, "alice");
    assert!(outcome.success, "{}", outcome.message);
    let alice = outcome.player.expect("player");
    assert_eq!(alice.shard_id, 0);
    assert_eq!(alice.quest_ids.len(), 3);
    assert_eq!(alice.inventory.currency, 100);
    assert_eq!(alice.house.interior.cleanliness, 50);

    let quests = village.player_quests(INSTANCE, "alice");
    assert_eq!(quests.len(), 3);
    assert!(quests.iter().all(|q| q.progress == 0 && q.completed_at.is_none()));

    assert_eq!(village.player_rank(INSTANCE, "alice"), Some(1));
    let board = village.leaderboard(INSTANCE, 10);
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].username, "alice");
    assert_eq!(board[0].total_points, 0);

    let state = village.game_state(INSTANCE).expect("state");
    assert_eq!(state.player_count, 1);
    let feed = village.recent_activities(INSTANCE, None);
    assert_eq!(feed[0].username, "alice");
    assert_eq!(feed[0].action, "joined the village");
}

#[test]
fn joining_twice_returns_the_same_player() {
    let village = village();
    let first = village.join(INSTANCE, "bob").player.expect("first");
    let again = village.join(INSTANCE, "bob");
    assert!(again.success);
    assert_eq!(again.player.expect("again"), first);
    assert_eq!(village.player_quests(INSTANCE, "bob").len(), 3);
    assert_eq!(village.game_state(INSTANCE).expect("state").player_count, 1);
}

#[test]
fn planting_three_grows_a_tree() {
    let village = village();
    village.join(INSTANCE, "alice");
    let before = village.get_player(INSTANCE, "alice").expect("alice");

    let outcome = village.perform_action(INSTANCE, "alice", ActionKind::Plant, 3);
    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(outcome.points, PointTotals::new(3, 0, 0));

    let after = village.get_player(INSTANCE, "alice").expect("alice");
    assert_eq!(after.stats.environmental, before.stats.environmental + 3);
    assert_eq!(after.house.farm.trees, before.house.farm.trees + 1);
    assert_eq!(after.stats.total_actions, before.stats.total_actions + 1);
    assert_eq!(after.inventory.seeds, before.inventory.seeds);

    let state = village.game_state(INSTANCE).expect("state");
    assert_eq!(state.community_progress.environmental, 3);
    assert_eq!(village.recent_activities(INSTANCE, Some(1))[0].action, "planted crops");
}

#[test]
fn every_action_kind_scores_its_track() {
    let village = village();
    village.join(INSTANCE, "erin");
    for action in ActionKind::ALL {
        assert!(village.perform_action(INSTANCE, "erin", action, 2).success);
    }
    let erin = village.get_player(INSTANCE, "erin").expect("erin");
    assert_eq!(erin.stats.total_actions, 4);
    assert_eq!(erin.stats.social, 2);
    // plant 2 + clean 1, learn 2 + clean 1
    assert_eq!(erin.stats.environmental, 3);
    assert_eq!(erin.stats.personal, 3);
    assert_eq!(erin.house.interior.cleanliness, 70);
}

#[test]
fn actions_need_a_joined_player_and_a_live_instance() {
    let village = village();
    let outcome = village.perform_action(INSTANCE, "ghost", ActionKind::Help, 1);
    assert!(!outcome.success);
    assert_eq!(outcome.message, MSG_JOIN_FIRST);

    let fresh = Village::in_memory(EngineConfig::default());
    let outcome = fresh.join("nowhere", "alice");
    assert_eq!(outcome.message, MSG_NOT_INITIALIZED);
    assert!(fresh.get_player("nowhere", "alice").is_none());
}

#[test]
fn zero_amount_changes_nothing() {
    let village = village();
    village.join(INSTANCE, "finn");
    let outcome = village.perform_action(INSTANCE, "finn", ActionKind::Learn, 0);
    assert!(!outcome.success);
    assert_eq!(outcome.player.expect("last known").stats.total_actions, 0);
    assert_eq!(
        village.game_state(INSTANCE).expect("state").community_progress,
        PointTotals::default()
    );
}

#[test]
fn one_pet_per_player() {
    let village = village();
    village.join(INSTANCE, "gail");
    let outcome = village.adopt_pet(INSTANCE, "gail", PetKind::Rabbit, Some("Clover"));
    assert!(outcome.success);
    let pet = outcome.player.and_then(|p| p.pet).expect("pet");
    assert_eq!(pet.name, "Clover");
    assert_eq!(pet.happiness, 100);

    let second = village.adopt_pet(INSTANCE, "gail", PetKind::Cat, None);
    assert!(!second.success);
    assert_eq!(second.message, MSG_PET_TAKEN);
    let kept = village.get_player(INSTANCE, "gail").and_then(|p| p.pet).expect("pet");
    assert_eq!(kept.kind, PetKind::Rabbit);
}

#[test]
fn intents_route_to_operations() {
    let village = village();
    assert_eq!(village.handle_intent(INSTANCE, None, PlayerIntent::Join).message, MSG_LOGIN);

    assert!(village.handle_intent(INSTANCE, Some("hana"), PlayerIntent::Join).success);
    let intent: PlayerIntent =
        serde_json::from_str(r#"{"type":"action","action":"help","amount":4}"#).expect("intent");
    let outcome = village.handle_intent(INSTANCE, Some("hana"), intent);
    assert!(outcome.success);
    assert_eq!(outcome.player.expect("player").stats.social, 4);
}

#[test]
fn snapshot_marks_the_player_active() {
    let clock = common::TestClock::at(2024, 5, 1, 12);
    let village = clock.village(EngineConfig::default());
    village.join(INSTANCE, "ivan");
    clock.advance(chrono::Duration::hours(3));

    let snapshot = village.snapshot(INSTANCE, "ivan").expect("snapshot");
    let ivan = snapshot.player.expect("ivan");
    assert_eq!(ivan.last_active, clock.now());
    assert_eq!(snapshot.quests.len(), 3);
    assert_eq!(snapshot.rank, 1);
    assert!(!snapshot.challenge_participated);
    assert_eq!(snapshot.event_participation.get("welcome_event"), Some(&false));

    let stranger = village.snapshot(INSTANCE, "nobody").expect("snapshot");
    assert!(stranger.player.is_none());
    assert!(stranger.quests.is_empty());
}
