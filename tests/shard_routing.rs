//! Shard hashing, capacity overflow and shard creation.

mod common;

use chrono::Utc;
use common::{sled_village, small_shards, village, village_with, INSTANCE};
use villehaven::config::EngineConfig;
use villehaven::village::players::new_player;
use villehaven::village::storage::keys;
use villehaven::village::{shard_of, PlayerShard};

#[test]
fn shard_of_is_deterministic_and_in_range() {
    let names = ["alice", "bob", "Zoë", "🚀rocket", "", "a_very_long_username_with_digits_0123456789"];
    for n in [1u32, 2, 3, 7, 64, 1000] {
        for name in names {
            let shard = shard_of(name, n);
            assert!(shard < n, "{} -> {} with n={}", name, shard, n);
            assert_eq!(shard, shard_of(name, n));
        }
    }
    assert_eq!(shard_of("anything", 0), 0);
}

#[test]
fn shard_of_matches_known_values() {
    // h("ab") = 97 * 31 + 98
    assert_eq!(shard_of("ab", 1000), 105);
    assert_eq!(shard_of("a", 10), 7);
    // Long names wrap negative; the remainder takes the dividend's sign and abs() folds it.
    let long = "zzzzzzzzzzzzzzzzzzzz";
    let mut hash: i32 = 0;
    for unit in long.encode_utf16() {
        hash = hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(i32::from(unit));
    }
    let expected = ((hash as i64) % 7).unsigned_abs() as u32;
    assert_eq!(shard_of(long, 7), expected);
}

#[test]
fn full_shard_triggers_exactly_one_new_shard() {
    let village = village();
    let now = Utc::now();
    let mut shard = PlayerShard::new(0, now);
    for i in 0..5000 {
        let name = format!("villager{}", i);
        shard.players.insert(name.clone(), new_player(&name, 0, now));
    }
    village
        .records()
        .put(&keys::player_shard(INSTANCE, 0), shard, now)
        .expect("seed shard");

    let before = village.game_state(INSTANCE).expect("state").shard_count;
    assert_eq!(village.check_and_create_shard(INSTANCE), Some(before));
    let state = village.game_state(INSTANCE).expect("state");
    assert_eq!(state.shard_count, before + 1);

    // The new shard is empty, so a second check changes nothing.
    assert_eq!(village.check_and_create_shard(INSTANCE), None);
    assert_eq!(village.game_state(INSTANCE).expect("state").shard_count, before + 1);
}

#[test]
fn overflowing_players_never_enter_a_full_shard() {
    let capacity = 3;
    let village = village_with(small_shards(capacity));
    let names: Vec<String> = (0..10).map(|i| format!("player{}", i)).collect();
    for name in &names {
        assert!(village.join(INSTANCE, name).success);
    }

    let state = village.game_state(INSTANCE).expect("state");
    assert!(state.shard_count >= 4);
    let mut seen = 0;
    for shard_id in 0..state.shard_count {
        let shard: Option<PlayerShard> = village
            .records()
            .load(&keys::player_shard(INSTANCE, shard_id))
            .expect("load");
        let shard = shard.expect("shard exists");
        assert!(shard.players.len() <= capacity);
        seen += shard.players.len();
    }
    assert_eq!(seen, names.len());

    // Lookups go through the index, not the (now different) hash.
    for name in &names {
        let player = village.get_player(INSTANCE, name).expect("player");
        assert_eq!(&player.username, name);
    }
}

#[test]
fn home_shard_survives_reopen_on_sled() {
    let (dir, village) = sled_village(small_shards(2));
    for name in ["ana", "ben", "cy", "dee", "eli"] {
        assert!(village.join(INSTANCE, name).success);
    }
    let placements: Vec<(String, u32)> = ["ana", "ben", "cy", "dee", "eli"]
        .iter()
        .map(|n| (n.to_string(), village.get_player(INSTANCE, n).expect("player").shard_id))
        .collect();
    drop(village);

    let reopened = villehaven::village::Village::open(dir.path(), EngineConfig {
        shard_capacity: 2,
        ..EngineConfig::default()
    })
    .expect("reopen");
    for (name, shard) in placements {
        let player = reopened.get_player(INSTANCE, &name).expect("player");
        assert_eq!(player.shard_id, shard);
    }
}
