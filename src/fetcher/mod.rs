//! Fetch orchestrator
//!
//! One run: snapshot the known proposal sets, invoke the external
//! refresh, diff the sets, notify on new proposals, and persist the run
//! summary. The whole sequence runs under the process-wide execution
//! guard, so scheduled and manual runs can never interleave.

use chrono::{Datelike, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::datasets::DatasetReader;
use crate::errors::FetchError;
use crate::models::{parse_hhmm, FetchDelta, LastCheckRecord, ProtocolId, Schedule};
use crate::notifications::NotificationService;
use crate::refresh::RefreshCollaborator;
use crate::scheduling::guard::ExecutionGuard;
use crate::store::{LastCheckStore, ScheduleStore};

/// Why a run was skipped instead of executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another run currently holds the execution guard
    AlreadyRunning,
    /// The bound schedule no longer exists in the store
    ScheduleMissing,
    /// The bound schedule was disabled after the job fired
    ScheduleDisabled,
    /// The execution-time window re-check rejected the instant
    OutsideWindow,
}

/// Result of one orchestrated run
#[derive(Debug)]
pub enum RunOutcome {
    Completed { delta: FetchDelta },
    Skipped(SkipReason),
}

pub struct FetchOrchestrator {
    schedules: ScheduleStore,
    last_check: LastCheckStore,
    datasets: DatasetReader,
    refresher: Arc<dyn RefreshCollaborator>,
    notifier: Arc<NotificationService>,
    guard: ExecutionGuard,
    default_protocols: Vec<ProtocolId>,
}

impl FetchOrchestrator {
    pub fn new(
        schedules: ScheduleStore,
        last_check: LastCheckStore,
        datasets: DatasetReader,
        refresher: Arc<dyn RefreshCollaborator>,
        notifier: Arc<NotificationService>,
        guard: ExecutionGuard,
        default_protocols: Vec<ProtocolId>,
    ) -> Self {
        Self {
            schedules,
            last_check,
            datasets,
            refresher,
            notifier,
            guard,
            default_protocols,
        }
    }

    /// Execute one run, bound to a schedule or manual (`None`)
    ///
    /// A schedule-bound run re-reads its schedule from the store first,
    /// so edits and deletions made after the trigger fired are honored.
    /// Manual runs bypass the window checks entirely.
    pub async fn run(&self, schedule_id: Option<&str>) -> Result<RunOutcome, FetchError> {
        let schedule = match schedule_id {
            Some(id) => match self.schedules.get(id)? {
                Some(schedule) => {
                    if !schedule.enabled {
                        info!("Schedule '{id}' is disabled, skipping run");
                        return Ok(RunOutcome::Skipped(SkipReason::ScheduleDisabled));
                    }
                    if !execution_window_allows(&schedule) {
                        info!("Schedule '{id}' is outside its run window, skipping run");
                        return Ok(RunOutcome::Skipped(SkipReason::OutsideWindow));
                    }
                    Some(schedule)
                }
                None => {
                    warn!("Schedule '{id}' no longer exists, skipping run");
                    return Ok(RunOutcome::Skipped(SkipReason::ScheduleMissing));
                }
            },
            None => None,
        };

        let _permit = match self.guard.try_acquire() {
            Some(permit) => permit,
            None => {
                warn!("Fetch skipped, previous run still in progress");
                return Ok(RunOutcome::Skipped(SkipReason::AlreadyRunning));
            }
        };

        let protocols: Vec<ProtocolId> = match &schedule {
            Some(s) if !s.chains.is_empty() => s.chains.clone(),
            _ => self.default_protocols.clone(),
        };
        info!("Starting fetch run for {} protocol(s)", protocols.len());

        let before: Vec<_> = protocols
            .iter()
            .map(|p| (p.clone(), self.datasets.known_numbers(p)))
            .collect();

        self.refresher.refresh_all().await?;

        let mut delta = FetchDelta::default();
        for (protocol, known) in before {
            let after = self.datasets.known_numbers(&protocol);
            let new_numbers = &after - &known;
            if !new_numbers.is_empty() {
                delta.insert(
                    protocol.clone(),
                    self.datasets.records_for(&protocol, &new_numbers),
                );
            }
        }

        if delta.is_empty() {
            info!("Fetch run completed, no new proposals");
        } else {
            info!(
                "Fetch run completed, {} new proposal(s) across {:?}",
                delta.total(),
                delta.protocols()
            );
            self.notifier.notify_all(&delta).await;
        }

        // Bookkeeping failures do not fail a run that already fetched
        let now = Utc::now();
        if let Err(e) = self.last_check.save(&LastCheckRecord {
            timestamp: now,
            new_proposals_count: delta.total(),
            protocols_with_new: delta.protocols(),
        }) {
            warn!("Failed to persist last-check record: {e}");
        }
        if let Some(schedule) = &schedule {
            if let Err(e) = self.schedules.update_last_run(&schedule.id, now) {
                warn!("Failed to stamp last_run for '{}': {e}", schedule.id);
            }
        }

        Ok(RunOutcome::Completed { delta })
    }
}

/// Execution-time re-check of the schedule's own window fields
///
/// Deliberately narrower than the dispatch gate: only the weekday rule
/// and the end-of-day cutoff, evaluated in the schedule's timezone at
/// the moment the run actually starts.
fn execution_window_allows(schedule: &Schedule) -> bool {
    let tz = match schedule.tz() {
        Ok(tz) => tz,
        Err(e) => {
            warn!("Schedule '{}': {e}, treating window as closed", schedule.id);
            return false;
        }
    };
    let local = Utc::now().with_timezone(&tz);

    if schedule.weekdays_only && local.weekday().number_from_monday() > 5 {
        return false;
    }
    if let Some(raw) = schedule.end_time.as_deref() {
        match parse_hhmm(raw) {
            Ok(end) => {
                if local.time() > end {
                    return false;
                }
            }
            Err(e) => {
                warn!("Schedule '{}': {e}, ignoring end_time", schedule.id);
            }
        }
    }
    true
}
