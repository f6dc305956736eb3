//! Job registry
//!
//! Maps persisted schedules to live trigger jobs. One schedule owns one
//! or more jobs: a single `fetch_<id>` job for interval and cron modes,
//! and one `fetch_<id>_<HHMM>` job per clock time in specific-times
//! mode. The registry keys jobs by schedule id explicitly, so removal
//! and replacement never rely on scanning key prefixes.

use chrono::{DateTime, Timelike, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::errors::ConfigError;
use crate::models::{RunWindowConfig, Schedule, WindowDefaults};

use super::projection::TriggerSpec;

/// One registered trigger job
#[derive(Debug, Clone)]
pub struct JobEntry {
    /// Stable job key, `fetch_<schedule_id>` or `fetch_<schedule_id>_<HHMM>`
    pub key: String,
    pub schedule_id: String,
    pub trigger: TriggerSpec,
    pub window: RunWindowConfig,
    pub next_fire: Option<DateTime<Utc>>,
    pub in_flight: bool,
}

/// A job the registry has handed out for execution
///
/// Carries only identity; the dispatcher re-derives the window from the
/// store so edits made after registration are honored.
#[derive(Debug, Clone)]
pub struct DueJob {
    pub key: String,
    pub schedule_id: String,
}

#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: HashMap<String, Vec<JobEntry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the jobs for one schedule
    ///
    /// Replacement is whole-schedule: all previous jobs for this id are
    /// dropped first, so a mode switch cannot leave stale sub-jobs
    /// behind. A disabled schedule registers nothing. A schedule whose
    /// trigger cannot be compiled registers nothing and surfaces the
    /// error.
    pub fn upsert(
        &mut self,
        schedule: &Schedule,
        defaults: &WindowDefaults,
        now: DateTime<Utc>,
    ) -> Result<(), ConfigError> {
        self.jobs.remove(&schedule.id);
        if !schedule.enabled {
            debug!("Schedule '{}' is disabled, no jobs registered", schedule.id);
            return Ok(());
        }

        let window = RunWindowConfig::from_schedule(schedule, defaults)?;
        let trigger = TriggerSpec::from_schedule(schedule)?;
        let anchor = schedule.last_run.unwrap_or(schedule.created_at);

        let entries = match &trigger {
            TriggerSpec::SpecificTimes(times) => times
                .iter()
                .map(|time| {
                    let single = TriggerSpec::SpecificTimes(vec![*time]);
                    let next_fire = single.next_fire(window.timezone, now, anchor);
                    JobEntry {
                        key: format!(
                            "fetch_{}_{:02}{:02}",
                            schedule.id,
                            time.hour(),
                            time.minute()
                        ),
                        schedule_id: schedule.id.clone(),
                        trigger: single,
                        window: window.clone(),
                        next_fire,
                        in_flight: false,
                    }
                })
                .collect(),
            _ => {
                let next_fire = trigger.next_fire(window.timezone, now, anchor);
                vec![JobEntry {
                    key: format!("fetch_{}", schedule.id),
                    schedule_id: schedule.id.clone(),
                    trigger,
                    window,
                    next_fire,
                    in_flight: false,
                }]
            }
        };

        info!(
            "Registered {} job(s) for schedule '{}' ({})",
            entries.len(),
            schedule.id,
            schedule.name
        );
        self.jobs.insert(schedule.id.clone(), entries);
        Ok(())
    }

    /// Drop all jobs for a schedule id; unknown ids are a no-op
    pub fn remove(&mut self, schedule_id: &str) {
        if self.jobs.remove(schedule_id).is_some() {
            info!("Removed jobs for schedule '{schedule_id}'");
        }
    }

    /// Rebuild the registry from the full schedule set
    ///
    /// Schedules that fail to compile are skipped with a warning so one
    /// bad record never takes down the rest.
    pub fn refresh_all(
        &mut self,
        schedules: &[Schedule],
        defaults: &WindowDefaults,
        now: DateTime<Utc>,
    ) {
        let keep: Vec<String> = schedules.iter().map(|s| s.id.clone()).collect();
        self.jobs.retain(|id, _| keep.contains(id));
        for schedule in schedules {
            if let Err(e) = self.upsert(schedule, defaults, now) {
                warn!("Skipping schedule '{}': {e}", schedule.id);
            }
        }
    }

    /// Jobs whose fire time has arrived
    ///
    /// Each returned job is marked in flight and its next fire time is
    /// recomputed from `now`, not from the missed instant: a backlog of
    /// missed fires collapses into the one run being dispatched.
    pub fn due_jobs(&mut self, now: DateTime<Utc>) -> Vec<DueJob> {
        let mut due = Vec::new();
        for entries in self.jobs.values_mut() {
            for entry in entries.iter_mut() {
                let fire = match entry.next_fire {
                    Some(fire) if fire <= now => fire,
                    _ => continue,
                };
                if entry.in_flight {
                    // Coalesce: push past the backlog without dispatching
                    entry.next_fire = entry.trigger.next_fire(entry.window.timezone, now, fire);
                    continue;
                }
                entry.in_flight = true;
                entry.next_fire = entry.trigger.next_fire(entry.window.timezone, now, fire);
                due.push(DueJob {
                    key: entry.key.clone(),
                    schedule_id: entry.schedule_id.clone(),
                });
            }
        }
        due
    }

    /// Mark a dispatched job as finished
    pub fn job_finished(&mut self, key: &str) {
        for entries in self.jobs.values_mut() {
            for entry in entries.iter_mut() {
                if entry.key == key {
                    entry.in_flight = false;
                    return;
                }
            }
        }
    }

    /// All registered jobs, for status display
    pub fn snapshot(&self) -> Vec<JobEntry> {
        let mut all: Vec<JobEntry> = self.jobs.values().flatten().cloned().collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }

    pub fn job_count(&self) -> usize {
        self.jobs.values().map(|entries| entries.len()).sum()
    }
}
