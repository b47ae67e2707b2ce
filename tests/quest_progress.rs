//! Quest advancement, one-time completion and replacement quests.

mod common;

use common::{flaky_village, village, INSTANCE};
use villehaven::village::actions::MSG_STORE_FAILURE;
use villehaven::village::storage::keys;
use villehaven::village::{ActionKind, PointKind};

#[test]
fn greener_village_completes_once_and_is_replaced() {
    let village = village();
    village.join(INSTANCE, "alice");

    for _ in 0..4 {
        let outcome = village.perform_action(INSTANCE, "alice", ActionKind::Plant, 1);
        assert!(outcome.success);
        assert!(outcome.completed_quests.is_empty());
    }
    let fifth = village.perform_action(INSTANCE, "alice", ActionKind::Plant, 1);
    assert!(fifth.success);
    assert_eq!(fifth.completed_quests.len(), 1);
    assert_eq!(fifth.completed_quests[0].title, "Greener Village");
    assert!(fifth.message.contains("Quest complete: Greener Village"));
    assert_eq!(fifth.new_quests.len(), 1);
    assert_ne!(fifth.new_quests[0].kind(), PointKind::Environmental);
    // 1 point for the plant plus the 15 point quest reward
    assert_eq!(fifth.points.environmental, 16);

    let alice = village.get_player(INSTANCE, "alice").expect("alice");
    assert_eq!(alice.stats.environmental, 20);
    assert_eq!(alice.inventory.currency, 130);
    assert_eq!(alice.quest_ids.len(), 4);
    assert!(alice.quest_ids.contains(&fifth.new_quests[0].id));

    let done_id = fifth.completed_quests[0].id.clone();
    let done = village
        .player_quests(INSTANCE, "alice")
        .into_iter()
        .find(|q| q.id == done_id)
        .expect("completed quest");
    let completed_at = done.completed_at.expect("completed");
    assert_eq!(done.progress, 5);

    let sixth = village.perform_action(INSTANCE, "alice", ActionKind::Clean, 2);
    assert!(sixth.completed_quests.is_empty());
    let done = village
        .player_quests(INSTANCE, "alice")
        .into_iter()
        .find(|q| q.id == done_id)
        .expect("completed quest");
    assert_eq!(done.progress, 5);
    assert_eq!(done.completed_at, Some(completed_at));

    let alice = village.get_player(INSTANCE, "alice").expect("alice");
    assert_eq!(alice.inventory.currency, 130);
    assert_eq!(alice.stats.environmental, 21);
    let state = village.game_state(INSTANCE).expect("state");
    assert_eq!(state.community_progress.environmental, 21);
    assert_eq!(state.community_progress.personal, 1);
}

#[test]
fn quests_only_advance_on_their_track() {
    let village = village();
    village.join(INSTANCE, "bob");
    for _ in 0..3 {
        village.perform_action(INSTANCE, "bob", ActionKind::Learn, 1);
    }
    let quests = village.player_quests(INSTANCE, "bob");
    let personal = quests.iter().find(|q| q.title == "Welcome to Villehaven").expect("personal");
    assert!(personal.completed_at.is_some());
    for quest in quests.iter().filter(|q| q.kind() != PointKind::Personal) {
        assert_eq!(quest.progress, 0, "{} should not move", quest.title);
    }
    let bob = village.get_player(INSTANCE, "bob").expect("bob");
    // 3 learned plus the 10 point welcome reward
    assert_eq!(bob.stats.personal, 13);
    assert_eq!(bob.inventory.currency, 150);
}

#[test]
fn reward_lost_to_a_failed_player_write_is_paid_later() {
    let (store, village) = flaky_village();
    village.join(INSTANCE, "alice");
    for _ in 0..2 {
        assert!(village.perform_action(INSTANCE, "alice", ActionKind::Help, 1).success);
    }

    store.fail_writes_under(Some(&keys::player_shard(INSTANCE, 0)));
    let failed = village.perform_action(INSTANCE, "alice", ActionKind::Help, 3);
    assert!(!failed.success);
    assert_eq!(failed.message, MSG_STORE_FAILURE);
    let neighborly = village
        .player_quests(INSTANCE, "alice")
        .into_iter()
        .find(|q| q.title == "Neighborly")
        .expect("neighborly");
    assert!(neighborly.completed_at.is_some());
    let alice = village.get_player(INSTANCE, "alice").expect("alice");
    assert_eq!(alice.inventory.currency, 100);
    assert_eq!(alice.quest_ids.len(), 3);

    store.fail_writes_under(None);
    let retry = village.perform_action(INSTANCE, "alice", ActionKind::Help, 1);
    assert!(retry.success, "{}", retry.message);
    assert_eq!(retry.completed_quests.len(), 1);
    assert_eq!(retry.completed_quests[0].id, neighborly.id);
    assert_eq!(retry.new_quests.len(), 1);
    assert_eq!(neighborly.follow_up.as_deref(), Some(retry.new_quests[0].id.as_str()));

    let alice = village.get_player(INSTANCE, "alice").expect("alice");
    assert_eq!(alice.inventory.currency, 125);
    // 2 + 1 helped plus the 15 point reward
    assert_eq!(alice.stats.social, 18);
    assert_eq!(alice.quest_ids.len(), 4);
    assert_eq!(village.game_state(INSTANCE).expect("state").community_progress.social, 18);

    let after = village.perform_action(INSTANCE, "alice", ActionKind::Help, 1);
    assert!(after.completed_quests.is_empty());
    let alice = village.get_player(INSTANCE, "alice").expect("alice");
    assert_eq!(alice.inventory.currency, 125);
    assert_eq!(alice.stats.social, 19);
}
