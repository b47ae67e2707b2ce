//! Scheduled maintenance: daily reset, weekly stats, player recounts and
//! shard capacity checks.
//!
//! Jobs are plain synchronous methods on [`Village`] so a cron entry or the
//! CLI can run them directly. [`start_maintenance`] wraps them in a tokio task
//! fed through an mpsc channel, the same shape as a command scheduler: callers
//! enqueue a job and get its [`JobReport`] back over a oneshot channel.
//!
//! All jobs are safe to run more than once; an at-least-once scheduler can
//! deliver the same job twice without double-counting anything.

use std::fmt;
use std::sync::Arc;

use chrono::Duration;
use log::{error, info, warn};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::logutil::escape_log;
use crate::metrics;
use crate::village::engine::Village;
use crate::village::errors::VillageError;
use crate::village::ledger::count_players;
use crate::village::realtime::VillageEvent;
use crate::village::types::{Activity, SYSTEM_ACTOR};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceJob {
    DailyReset,
    WeeklyMaintenance,
    RecountPlayers,
    ShardCheck,
}

impl MaintenanceJob {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaintenanceJob::DailyReset => "daily_reset",
            MaintenanceJob::WeeklyMaintenance => "weekly_maintenance",
            MaintenanceJob::RecountPlayers => "recount_players",
            MaintenanceJob::ShardCheck => "shard_check",
        }
    }
}

impl fmt::Display for MaintenanceJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a job run changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobReport {
    pub job: Option<MaintenanceJob>,
    pub instance: String,
    pub player_count: Option<u64>,
    pub active_player_count: Option<u64>,
    pub challenge_id: Option<String>,
    /// False when today's challenge already existed.
    pub challenge_created: bool,
    pub new_events: Vec<String>,
    pub milestones: Vec<String>,
    pub new_shard: Option<u32>,
}

impl JobReport {
    fn new(job: MaintenanceJob, instance: &str) -> Self {
        Self {
            job: Some(job),
            instance: instance.to_string(),
            ..Self::default()
        }
    }
}

impl Village {
    fn recount(&self, instance: &str, report: &mut JobReport) -> Result<(u64, u64), VillageError> {
        let now = self.now();
        let players = self.players.all_players(instance)?;
        let window = Duration::hours(self.config.active_window_hours);
        let (total, active) = count_players(&players, now, window);
        let (_, unlocked) = self.ledger.set_player_counts(instance, total, active, now)?;
        report.player_count = Some(total);
        report.active_player_count = Some(active);
        report
            .milestones
            .extend(unlocked.into_iter().map(|m| m.id));
        Ok((total, active))
    }

    fn daily_reset_job(&self, instance: &str, report: &mut JobReport) -> Result<(), VillageError> {
        let now = self.now();
        let mut rng = rand::thread_rng();
        let refresh = self.ledger.refresh_daily_challenge(instance, now, &mut rng)?;
        report.challenge_id = Some(refresh.challenge.challenge_id());
        report.challenge_created = refresh.created;
        self.recount(instance, report)?;
        let unlocked = self.ledger.check_milestones(instance, now)?;
        report
            .milestones
            .extend(unlocked.into_iter().map(|m| m.id));
        let rotated = self.ledger.rotate_expired_events(instance, now, &mut rng)?;
        report.new_events = rotated.into_iter().map(|e| e.id).collect();
        Ok(())
    }

    fn weekly_job(&self, instance: &str, report: &mut JobReport) -> Result<(), VillageError> {
        let now = self.now();
        let (total, active) = self.recount(instance, report)?;
        report.new_shard = self.router.check_and_create(instance, now)?;
        let state = self.ledger.require_state(instance)?;
        let points = state.community_progress.total();
        self.activity.add(
            instance,
            Activity::new(
                SYSTEM_ACTOR,
                format!(
                    "📊 Weekly stats: {} villagers, {} active, {} total points!",
                    total, active, points
                ),
                now,
            ),
            now,
        )?;
        Ok(())
    }

    /// Run one maintenance job to completion.
    pub fn run_job(&self, instance: &str, job: MaintenanceJob) -> Result<JobReport, VillageError> {
        self.ledger.require_state(instance)?;
        let mut report = JobReport::new(job, instance);
        match job {
            MaintenanceJob::DailyReset => self.daily_reset_job(instance, &mut report)?,
            MaintenanceJob::WeeklyMaintenance => self.weekly_job(instance, &mut report)?,
            MaintenanceJob::RecountPlayers => {
                self.recount(instance, &mut report)?;
            }
            MaintenanceJob::ShardCheck => {
                report.new_shard = self.router.check_and_create(instance, self.now())?;
            }
        }
        metrics::inc_jobs_run();
        info!(
            "{} finished for {} (players={:?} active={:?} new_shard={:?} milestones={})",
            job,
            escape_log(instance),
            report.player_count,
            report.active_player_count,
            report.new_shard,
            report.milestones.len()
        );
        self.broadcaster.publish(
            instance,
            VillageEvent::Maintenance {
                job: job.as_str().to_string(),
            },
        );
        Ok(report)
    }

    /// Daily reset with errors logged; `None` on failure.
    pub fn daily_reset(&self, instance: &str) -> Option<JobReport> {
        self.job_or_log(instance, MaintenanceJob::DailyReset)
    }

    pub fn weekly_maintenance(&self, instance: &str) -> Option<JobReport> {
        self.job_or_log(instance, MaintenanceJob::WeeklyMaintenance)
    }

    /// Full-scan recount of `playerCount` / `activePlayerCount`.
    pub fn recount_players(&self, instance: &str) -> Option<JobReport> {
        self.job_or_log(instance, MaintenanceJob::RecountPlayers)
    }

    fn job_or_log(&self, instance: &str, job: MaintenanceJob) -> Option<JobReport> {
        match self.run_job(instance, job) {
            Ok(report) => Some(report),
            Err(e) => {
                self.report(job.as_str(), instance, &e);
                None
            }
        }
    }
}

enum MaintenanceCommand {
    Run {
        instance: String,
        job: MaintenanceJob,
        respond: oneshot::Sender<Result<JobReport, VillageError>>,
    },
    Shutdown(oneshot::Sender<()>),
}

#[derive(Clone, Debug)]
pub struct MaintenanceHandle {
    tx: mpsc::UnboundedSender<MaintenanceCommand>,
}

impl MaintenanceHandle {
    /// Queue `job` and wait for its report. Jobs run one at a time in
    /// submission order.
    pub async fn run(&self, instance: &str, job: MaintenanceJob) -> Result<JobReport, VillageError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(MaintenanceCommand::Run {
                instance: instance.to_string(),
                job,
                respond: tx,
            })
            .map_err(|_| VillageError::Store("maintenance runner stopped".to_string()))?;
        rx.await
            .map_err(|_| VillageError::Store("maintenance runner dropped the job".to_string()))?
    }

    /// Queue `job` without waiting for it.
    pub fn submit(&self, instance: &str, job: MaintenanceJob) {
        let (tx, _rx) = oneshot::channel();
        let _ = self.tx.send(MaintenanceCommand::Run {
            instance: instance.to_string(),
            job,
            respond: tx,
        });
    }

    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        let _ = self.tx.send(MaintenanceCommand::Shutdown(tx));
        let _ = rx.await;
    }
}

/// Spawn the maintenance runner. Must be called inside a tokio runtime.
pub fn start_maintenance(village: Arc<Village>) -> MaintenanceHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<MaintenanceCommand>();
    let handle = MaintenanceHandle { tx };

    tokio::spawn(async move {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                MaintenanceCommand::Run { instance, job, respond } => {
                    let worker = Arc::clone(&village);
                    let joined = tokio::task::spawn_blocking(move || worker.run_job(&instance, job)).await;
                    let result = match joined {
                        Ok(result) => result,
                        Err(e) => {
                            error!("maintenance job {} panicked: {}", job, e);
                            Err(VillageError::Store(format!("job {} aborted", job)))
                        }
                    };
                    if let Err(e) = &result {
                        warn!("maintenance job {} failed: {}", job, e);
                        if e.is_store_failure() {
                            metrics::inc_store_failures();
                        }
                    }
                    let _ = respond.send(result);
                }
                MaintenanceCommand::Shutdown(done) => {
                    let _ = done.send(());
                    break;
                }
            }
        }
        info!("maintenance runner stopped");
    });

    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn daily_reset_twice_keeps_the_same_challenge() {
        let village = Village::in_memory(EngineConfig::default());
        village.initialize_instance("p1");
        let first = village.daily_reset("p1").expect("first");
        let second = village.daily_reset("p1").expect("second");
        assert_eq!(first.challenge_id, second.challenge_id);
        assert!(!second.challenge_created);
    }

    #[test]
    fn jobs_on_unknown_instances_fail_cleanly() {
        let village = Village::in_memory(EngineConfig::default());
        assert!(village.weekly_maintenance("nowhere").is_none());
        assert!(matches!(
            village.run_job("nowhere", MaintenanceJob::ShardCheck),
            Err(VillageError::Uninitialized(_))
        ));
    }

    #[tokio::test]
    async fn runner_returns_reports_and_shuts_down() {
        let village = Arc::new(Village::in_memory(EngineConfig::default()));
        village.initialize_instance("p1");
        village.join("p1", "alice");
        let handle = start_maintenance(Arc::clone(&village));
        let report = handle
            .run("p1", MaintenanceJob::RecountPlayers)
            .await
            .expect("report");
        assert_eq!(report.player_count, Some(1));
        assert_eq!(report.active_player_count, Some(1));
        handle.shutdown().await;
        assert!(handle.run("p1", MaintenanceJob::ShardCheck).await.is_err());
    }
}
