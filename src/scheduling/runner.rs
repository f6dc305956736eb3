//! Scheduler service
//!
//! Owns the job registry, per-schedule budgets, and the retry
//! controller, and drives the evaluation loop: a periodic tick collects
//! due jobs, each dispatched onto a worker task so a slow refresh never
//! stalls trigger evaluation. Retry timers and run completions feed
//! back into the same loop over channels, keeping all budget and retry
//! bookkeeping on the one coordinating task.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, SchedulerConfig};
use crate::errors::{AppError, ConfigError, FetchError};
use crate::fetcher::{FetchOrchestrator, RunOutcome};
use crate::models::{RunBudgetState, RunWindowConfig, Schedule, ScheduleMode, WindowDefaults};
use crate::store::ScheduleStore;

use super::budget;
use super::projection::{next_run_times, TriggerSpec};
use super::registry::{DueJob, JobRegistry};
use super::retry::RetryController;

/// Fixed id of the configuration-owned default schedule
pub const DEFAULT_SCHEDULE_ID: &str = "default";

/// Outcome of one spawned run, reported back to the coordinating loop
struct RunCompletion {
    schedule_id: String,
    job_key: Option<String>,
    window: RunWindowConfig,
    result: Result<RunOutcome, FetchError>,
}

pub struct SchedulerService {
    store: ScheduleStore,
    orchestrator: Arc<FetchOrchestrator>,
    defaults: WindowDefaults,
    tick_interval: Duration,
    registry: JobRegistry,
    budgets: HashMap<String, RunBudgetState>,
    retry: RetryController,
    retry_rx: Option<mpsc::UnboundedReceiver<String>>,
    done_tx: mpsc::UnboundedSender<RunCompletion>,
    done_rx: Option<mpsc::UnboundedReceiver<RunCompletion>>,
    in_flight: usize,
}

impl SchedulerService {
    /// Build the service and bind all persisted schedules to jobs
    ///
    /// Schedules that fail to compile are skipped with a warning; the
    /// rest of the store still binds.
    pub fn new(
        store: ScheduleStore,
        orchestrator: Arc<FetchOrchestrator>,
        config: &Config,
    ) -> Result<Self, AppError> {
        let (tx, retry_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let mut service = Self {
            store,
            orchestrator,
            defaults: config.window.clone(),
            tick_interval: Duration::from_secs(config.scheduler.tick_interval_secs.max(1)),
            registry: JobRegistry::new(),
            budgets: HashMap::new(),
            retry: RetryController::new(tx),
            retry_rx: Some(retry_rx),
            done_tx,
            done_rx: Some(done_rx),
            in_flight: 0,
        };
        service.materialize_default_schedule(&config.scheduler)?;

        let schedules = service.store.load()?;
        let defaults = service.defaults.clone();
        service.registry.refresh_all(&schedules, &defaults, Utc::now());
        info!(
            "Scheduler bound {} job(s) from {} schedule(s)",
            service.registry.job_count(),
            schedules.len()
        );
        Ok(service)
    }

    /// Create or refresh the config-owned default schedule in the store
    fn materialize_default_schedule(&mut self, config: &SchedulerConfig) -> Result<(), AppError> {
        let Some(default) = &config.default_schedule else {
            return Ok(());
        };
        let mut schedule = match self.store.get(DEFAULT_SCHEDULE_ID)? {
            Some(existing) => existing,
            None => {
                let mut fresh =
                    Schedule::new_interval("Default schedule", default.interval_minutes);
                fresh.id = DEFAULT_SCHEDULE_ID.to_string();
                fresh.timezone = self.defaults.timezone.clone();
                fresh.weekdays_only = self.defaults.weekdays_only;
                fresh
            }
        };
        schedule.mode = ScheduleMode::Interval;
        schedule.interval_minutes = Some(default.interval_minutes);
        schedule.enabled = default.enabled;
        self.store.upsert(schedule)?;
        Ok(())
    }

    /// Validate, persist, and bind a schedule
    pub fn upsert_schedule(&mut self, schedule: Schedule) -> Result<(), AppError> {
        // Compile before persisting so a broken definition never lands
        // in the store
        schedule.tz()?;
        if schedule.enabled {
            TriggerSpec::from_schedule(&schedule)?;
        }
        self.store.upsert(schedule.clone())?;
        self.registry.upsert(&schedule, &self.defaults, Utc::now())?;
        Ok(())
    }

    /// Delete a schedule and its jobs
    pub fn remove_schedule(&mut self, schedule_id: &str) -> Result<(), AppError> {
        self.store.delete(schedule_id)?;
        self.registry.remove(schedule_id);
        self.budgets.remove(schedule_id);
        self.retry.on_success(schedule_id);
        Ok(())
    }

    pub fn list_schedules(&self) -> Result<Vec<Schedule>, AppError> {
        Ok(self.store.load()?)
    }

    /// Upcoming admissible run instants for one schedule
    pub fn preview(
        &self,
        schedule_id: &str,
        count: usize,
    ) -> Result<Vec<DateTime<Utc>>, AppError> {
        let schedule = self
            .store
            .get(schedule_id)?
            .ok_or_else(|| ConfigError::ScheduleNotFound {
                id: schedule_id.to_string(),
            })?;
        let window = RunWindowConfig::from_schedule(&schedule, &self.defaults)?;
        let trigger = TriggerSpec::from_schedule(&schedule)?;
        Ok(next_run_times(&trigger, &window, Utc::now(), count))
    }

    /// Run once immediately, outside any schedule's window and budget
    pub async fn run_manual(&self) -> Result<RunOutcome, FetchError> {
        self.orchestrator.run(None).await
    }

    /// Shared flag raised when some schedule has exhausted its retries
    ///
    /// Clone the handle before [`run`](Self::run) consumes the service;
    /// it stays readable (and is cleared by the next successful run)
    /// while the loop is live.
    pub fn standing_failure(&self) -> Arc<AtomicBool> {
        self.retry.standing_failure_flag()
    }

    /// Drive the evaluation loop until cancelled
    ///
    /// On cancellation, pending retry timers are cleared and no new
    /// dispatches start, but an in-flight run finishes naturally and
    /// its bookkeeping still lands before the loop returns.
    pub async fn run(mut self, cancel: CancellationToken) {
        let (Some(mut retry_rx), Some(mut done_rx)) =
            (self.retry_rx.take(), self.done_rx.take())
        else {
            error!("Scheduler loop started twice");
            return;
        };
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            "Scheduler loop started, tick every {}s",
            self.tick_interval.as_secs()
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Scheduler loop stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.evaluate_tick();
                }
                Some(schedule_id) = retry_rx.recv() => {
                    debug!("Retry timer elapsed for schedule '{schedule_id}'");
                    self.dispatch(&schedule_id, None);
                }
                Some(completion) = done_rx.recv() => {
                    self.handle_completion(completion);
                }
            }
        }
        self.retry.shutdown();

        while self.in_flight > 0 {
            match done_rx.recv().await {
                Some(completion) => self.handle_completion(completion),
                None => break,
            }
        }
    }

    fn evaluate_tick(&mut self) {
        let now = Utc::now();
        for job in self.registry.due_jobs(now) {
            let DueJob { key, schedule_id } = job;
            self.dispatch(&schedule_id, Some(&key));
        }
    }

    /// Dispatch one schedule-bound run through the window and budget
    /// gates onto a worker task
    fn dispatch(&mut self, schedule_id: &str, job_key: Option<&str>) {
        let now = Utc::now();
        let window = match self.window_for(schedule_id) {
            Ok(Some(window)) => window,
            Ok(None) => {
                debug!("Schedule '{schedule_id}' vanished before dispatch");
                self.finish_job(job_key);
                return;
            }
            Err(e) => {
                warn!("Schedule '{schedule_id}' is not dispatchable: {e}");
                self.finish_job(job_key);
                return;
            }
        };

        let state = self.budgets.entry(schedule_id.to_string()).or_default();
        if !budget::should_run_now(state, now, &window) {
            debug!("Schedule '{schedule_id}' outside window or over budget, not dispatched");
            self.finish_job(job_key);
            return;
        }

        self.in_flight += 1;
        let orchestrator = Arc::clone(&self.orchestrator);
        let done_tx = self.done_tx.clone();
        let schedule_id = schedule_id.to_string();
        let job_key = job_key.map(str::to_string);
        tokio::spawn(async move {
            let result = orchestrator.run(Some(&schedule_id)).await;
            let _ = done_tx.send(RunCompletion {
                schedule_id,
                job_key,
                window,
                result,
            });
        });
    }

    /// Account for a finished run: budget, retry chain, and job state
    fn handle_completion(&mut self, completion: RunCompletion) {
        let RunCompletion {
            schedule_id,
            job_key,
            window,
            result,
        } = completion;
        self.in_flight = self.in_flight.saturating_sub(1);

        match result {
            Ok(RunOutcome::Completed { .. }) => {
                let state = self.budgets.entry(schedule_id.clone()).or_default();
                budget::record_run(state, Utc::now(), &window, true);
                self.retry.on_success(&schedule_id);
            }
            Ok(RunOutcome::Skipped(reason)) => {
                debug!("Schedule '{schedule_id}' run skipped: {reason:?}");
            }
            Err(FetchError::Config(e)) => {
                // Misconfiguration does not improve by retrying
                error!("Schedule '{schedule_id}' failed on configuration: {e}");
            }
            Err(e) => {
                error!("Schedule '{schedule_id}' run failed: {e}");
                let state = self.budgets.entry(schedule_id.clone()).or_default();
                budget::record_run(state, Utc::now(), &window, false);
                let failed_attempts = state.failed_attempts;
                self.retry.on_failure(&schedule_id, failed_attempts, &window);
            }
        }
        self.finish_job(job_key.as_deref());
    }

    fn finish_job(&mut self, job_key: Option<&str>) {
        if let Some(key) = job_key {
            self.registry.job_finished(key);
        }
    }

    fn window_for(&self, schedule_id: &str) -> Result<Option<RunWindowConfig>, AppError> {
        match self.store.get(schedule_id)? {
            Some(schedule) => Ok(Some(RunWindowConfig::from_schedule(
                &schedule,
                &self.defaults,
            )?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DefaultScheduleConfig;
    use crate::datasets::DatasetReader;
    use crate::errors::RefreshError;
    use crate::notifications::NotificationService;
    use crate::refresh::RefreshCollaborator;
    use crate::scheduling::guard::ExecutionGuard;
    use crate::store::LastCheckStore;
    use async_trait::async_trait;

    struct NoopRefresher;

    #[async_trait]
    impl RefreshCollaborator for NoopRefresher {
        async fn refresh_all(&self) -> Result<(), RefreshError> {
            Ok(())
        }
    }

    fn service_in(dir: &tempfile::TempDir, config: &Config) -> SchedulerService {
        let store = ScheduleStore::new(dir.path().join("schedules.json"));
        let orchestrator = Arc::new(FetchOrchestrator::new(
            store.clone(),
            LastCheckStore::new(dir.path().join("last_check.json")),
            DatasetReader::new(dir.path()),
            Arc::new(NoopRefresher),
            Arc::new(NotificationService::with_channels(vec![])),
            ExecutionGuard::new(),
            vec!["ethereum".to_string()],
        ));
        SchedulerService::new(store, orchestrator, config).unwrap()
    }

    #[tokio::test]
    async fn startup_binds_persisted_schedules() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScheduleStore::new(dir.path().join("schedules.json"));
        store.upsert(Schedule::new_interval("a", 30)).unwrap();
        store.upsert(Schedule::new_interval("b", 45)).unwrap();

        let service = service_in(&dir, &Config::default());
        assert_eq!(service.registry.job_count(), 2);
    }

    #[tokio::test]
    async fn default_schedule_is_materialized_under_its_fixed_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.scheduler.default_schedule = Some(DefaultScheduleConfig {
            enabled: true,
            interval_minutes: 15,
        });

        let service = service_in(&dir, &config);
        let schedules = service.list_schedules().unwrap();
        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].id, DEFAULT_SCHEDULE_ID);
        assert_eq!(schedules[0].interval_minutes, Some(15));

        // Re-running materialization does not duplicate it
        let service = service_in(&dir, &config);
        assert_eq!(service.list_schedules().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upsert_rejects_broken_definitions_before_persisting() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = service_in(&dir, &Config::default());

        let mut bad = Schedule::new_interval("bad", 30);
        bad.mode = ScheduleMode::Cron;
        bad.cron_expression = Some("not-cron".to_string());
        assert!(service.upsert_schedule(bad).is_err());
        assert!(service.list_schedules().unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_schedule_clears_jobs_and_budget() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = service_in(&dir, &Config::default());
        let schedule = Schedule::new_interval("gone", 30);
        service.upsert_schedule(schedule.clone()).unwrap();
        assert_eq!(service.registry.job_count(), 1);

        service.remove_schedule(&schedule.id).unwrap();
        assert_eq!(service.registry.job_count(), 0);
        assert!(service.list_schedules().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dispatch_runs_the_orchestrator_and_records_the_budget() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.window.weekdays_only = false;
        config.window.enabled_days = vec![1, 2, 3, 4, 5, 6, 7];
        let mut service = service_in(&dir, &config);

        let mut schedule = Schedule::new_interval("always", 60);
        schedule.weekdays_only = false;
        service.upsert_schedule(schedule.clone()).unwrap();

        service.dispatch(&schedule.id, None);
        assert_eq!(service.in_flight, 1);

        let mut done_rx = service.done_rx.take().unwrap();
        let completion = done_rx.recv().await.unwrap();
        service.handle_completion(completion);

        assert_eq!(service.in_flight, 0);
        assert_eq!(service.budgets[&schedule.id].runs_today, 1);
        let stamped = service.store.get(&schedule.id).unwrap().unwrap();
        assert!(stamped.last_run.is_some());
    }

    #[tokio::test]
    async fn retry_exhaustion_raises_the_inspectable_standing_failure_flag() {
        use std::sync::atomic::Ordering;

        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.window.weekdays_only = false;
        config.window.enabled_days = vec![1, 2, 3, 4, 5, 6, 7];
        let mut service = service_in(&dir, &config);

        let mut schedule = Schedule::new_interval("flaky", 60);
        schedule.weekdays_only = false;
        service.upsert_schedule(schedule.clone()).unwrap();

        let flag = service.standing_failure();
        assert!(!flag.load(Ordering::Relaxed));

        let window = RunWindowConfig::from_schedule(&schedule, &config.window).unwrap();
        for _ in 0..window.retry_max_attempts {
            service.handle_completion(RunCompletion {
                schedule_id: schedule.id.clone(),
                job_key: None,
                window: window.clone(),
                result: Err(FetchError::Refresh(RefreshError::Failed {
                    code: Some(1),
                    stderr: "unreachable".to_string(),
                })),
            });
        }
        assert!(flag.load(Ordering::Relaxed));

        // The handle stays shared: a success observed later clears it
        service.handle_completion(RunCompletion {
            schedule_id: schedule.id.clone(),
            job_key: None,
            window,
            result: Ok(RunOutcome::Completed {
                delta: Default::default(),
            }),
        });
        assert!(!flag.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn preview_surfaces_unknown_ids() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(&dir, &Config::default());
        assert!(matches!(
            service.preview("ghost", 3),
            Err(AppError::Config(ConfigError::ScheduleNotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn preview_lists_future_instants_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = service_in(&dir, &Config::default());
        let mut schedule = Schedule::new_interval("soon", 60);
        schedule.weekdays_only = false;
        service.upsert_schedule(schedule.clone()).unwrap();

        let times = service.preview(&schedule.id, 3).unwrap();
        assert_eq!(times.len(), 3);
        assert!(times[0] < times[1] && times[1] < times[2]);
        assert!(times[0] > Utc::now());
    }
}
