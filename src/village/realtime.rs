//! Fire-and-forget fan-out of village events to live viewers.
//!
//! Nothing in the engine depends on delivery: a publish with no subscribers,
//! or a lagging subscriber, is silently dropped.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::village::actions::ActionKind;
use crate::village::types::PointTotals;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VillageEvent {
    PlayerJoined { username: String },
    Action { username: String, action: ActionKind, points: PointTotals },
    QuestCompleted { username: String, quest_id: String, title: String },
    Milestone { id: String, title: String },
    ChallengeJoined { username: String, challenge_id: String },
    EventJoined { username: String, event_id: String },
    Maintenance { job: String },
}

/// Event tagged with the instance it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub instance: String,
    pub event: VillageEvent,
}

#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<Envelope>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    pub fn publish(&self, instance: &str, event: VillageEvent) {
        let _ = self.tx.send(Envelope {
            instance: instance.to_string(),
            event,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let broadcaster = Broadcaster::new(8);
        let mut rx = broadcaster.subscribe();
        broadcaster.publish(
            "p1",
            VillageEvent::PlayerJoined {
                username: "alice".into(),
            },
        );
        let envelope = rx.recv().await.expect("event");
        assert_eq!(envelope.instance, "p1");
        assert!(matches!(envelope.event, VillageEvent::PlayerJoined { .. }));
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        let broadcaster = Broadcaster::default();
        broadcaster.publish("p1", VillageEvent::Maintenance { job: "daily_reset".into() });
    }
}
