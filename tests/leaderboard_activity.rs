//! Leaderboard projection and the bounded activity feed.

mod common;

use common::{flaky_village, village, village_with, INSTANCE};
use villehaven::config::EngineConfig;
use villehaven::village::actions::MSG_STORE_FAILURE;
use villehaven::village::ActionKind;

#[test]
fn repeated_saves_keep_one_entry_with_the_latest_score() {
    let village = village();
    village.join(INSTANCE, "alice");
    let mut player = village.get_player(INSTANCE, "alice").expect("alice");
    for bump in 1..=5u64 {
        player.stats.social += bump;
        player = village.save_player(INSTANCE, &player).expect("save");
    }

    let board = village.leaderboard(INSTANCE, 100);
    let entries: Vec<_> = board.iter().filter(|e| e.username == "alice").collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].total_points, player.stats.total_points());
    assert_eq!(entries[0].total_points, 15);
}

#[test]
fn stale_saves_are_rejected() {
    let village = village();
    village.join(INSTANCE, "bob");
    let stale = village.get_player(INSTANCE, "bob").expect("bob");
    assert!(village.perform_action(INSTANCE, "bob", ActionKind::Help, 2).success);

    let mut overwrite = stale.clone();
    overwrite.stats.social = 99;
    assert!(village.save_player(INSTANCE, &overwrite).is_none());
    assert_eq!(village.get_player(INSTANCE, "bob").expect("bob").stats.social, 2);
}

#[test]
fn leaderboard_is_bounded_and_sorted() {
    let village = village_with(EngineConfig {
        leaderboard_limit: 3,
        ..EngineConfig::default()
    });
    for (name, amount) in [("ann", 5), ("bea", 9), ("cal", 1), ("dan", 7), ("eli", 3)] {
        village.join(INSTANCE, name);
        assert!(village.perform_action(INSTANCE, name, ActionKind::Learn, amount).success);
    }
    let board = village.leaderboard(INSTANCE, 10);
    let names: Vec<_> = board.iter().map(|e| e.username.as_str()).collect();
    assert_eq!(names, vec!["bea", "dan", "ann"]);
    assert!(board.windows(2).all(|w| w[0].total_points >= w[1].total_points));
    assert_eq!(village.player_rank(INSTANCE, "bea"), Some(1));
    assert_eq!(village.player_rank(INSTANCE, "cal"), Some(4));
}

#[test]
fn everyone_ranks_first_on_a_fresh_instance() {
    let village = village();
    assert_eq!(village.player_rank(INSTANCE, "ghost"), Some(1));
    village.join(INSTANCE, "ann");
    assert!(village.perform_action(INSTANCE, "ann", ActionKind::Plant, 1).success);
    assert_eq!(village.player_rank(INSTANCE, "ann"), Some(1));
    assert_eq!(village.player_rank(INSTANCE, "ghost"), Some(2));
}

#[test]
fn score_ranking_covers_players_past_the_board_limit() {
    let village = village_with(EngineConfig {
        leaderboard_limit: 2,
        ..EngineConfig::default()
    });
    for (name, amount) in [("ann", 5), ("bea", 9), ("cal", 1)] {
        village.join(INSTANCE, name);
        assert!(village.perform_action(INSTANCE, name, ActionKind::Plant, amount).success);
    }
    assert_eq!(village.leaderboard(INSTANCE, 10).len(), 2);

    let scores = village.score_ranking(INSTANCE, 10);
    let names: Vec<_> = scores.iter().map(|s| s.member.as_str()).collect();
    assert_eq!(names, vec!["bea", "ann", "cal"]);
    assert_eq!(scores[2].score, 1.0);

    let unindexed = village_with(EngineConfig {
        mirror_sorted_set: false,
        ..EngineConfig::default()
    });
    unindexed.join(INSTANCE, "dan");
    assert!(unindexed.score_ranking(INSTANCE, 10).is_empty());
}

#[test]
fn activity_feed_keeps_the_newest_two_hundred() {
    let village = village();
    for i in 0..250 {
        assert!(village.add_activity(INSTANCE, "system", &format!("entry {}", i)));
    }
    let all = village.recent_activities(INSTANCE, Some(1000));
    assert_eq!(all.len(), 200);
    assert_eq!(all[0].action, "entry 249");
    assert_eq!(all[199].action, "entry 50");
    assert_eq!(village.recent_activities(INSTANCE, None).len(), 50);
}

#[test]
fn store_failures_surface_as_messages() {
    let (store, village) = flaky_village();
    village.join(INSTANCE, "cory");
    store.set_failing(true);

    let outcome = village.perform_action(INSTANCE, "cory", ActionKind::Plant, 1);
    assert!(!outcome.success);
    assert_eq!(outcome.message, MSG_STORE_FAILURE);
    assert!(village.game_state(INSTANCE).is_none());
    assert!(village.leaderboard(INSTANCE, 10).is_empty());
    assert!(!village.add_activity(INSTANCE, "cory", "waved"));

    store.set_failing(false);
    assert_eq!(village.get_player(INSTANCE, "cory").expect("cory").stats.total_actions, 0);
    assert!(village.perform_action(INSTANCE, "cory", ActionKind::Plant, 1).success);
}
