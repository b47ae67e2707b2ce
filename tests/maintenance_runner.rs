//! The tokio maintenance runner and live event broadcast.

mod common;

use std::sync::Arc;

use common::{village, INSTANCE};
use villehaven::village::{start_maintenance, ActionKind, MaintenanceJob, VillageEvent};

#[tokio::test]
async fn runner_executes_jobs_in_order() {
    let village = Arc::new(village());
    village.join(INSTANCE, "alice");
    village.join(INSTANCE, "bob");

    let handle = start_maintenance(Arc::clone(&village));
    let daily = handle.run(INSTANCE, MaintenanceJob::DailyReset).await.expect("daily");
    assert_eq!(daily.job, Some(MaintenanceJob::DailyReset));
    assert_eq!(daily.player_count, Some(2));
    assert!(daily.challenge_id.is_some());

    let weekly = handle
        .run(INSTANCE, MaintenanceJob::WeeklyMaintenance)
        .await
        .expect("weekly");
    assert_eq!(weekly.new_shard, None);

    let shard = handle.run(INSTANCE, MaintenanceJob::ShardCheck).await.expect("shard");
    assert_eq!(shard.new_shard, None);

    let missing = handle.run("unknown", MaintenanceJob::RecountPlayers).await;
    assert!(missing.is_err());

    handle.shutdown().await;
}

#[tokio::test]
async fn subscribers_see_village_events() {
    let village = village();
    let mut rx = village.subscribe();
    village.join(INSTANCE, "cat");
    village.perform_action(INSTANCE, "cat", ActionKind::Plant, 2);

    let joined = rx.recv().await.expect("join event");
    assert_eq!(joined.instance, INSTANCE);
    assert_eq!(
        joined.event,
        VillageEvent::PlayerJoined {
            username: "cat".to_string()
        }
    );
    let action = rx.recv().await.expect("action event");
    match action.event {
        VillageEvent::Action { username, action, points } => {
            assert_eq!(username, "cat");
            assert_eq!(action, ActionKind::Plant);
            assert_eq!(points.environmental, 2);
        }
        other => panic!("unexpected event {:?}", other),
    }
}
