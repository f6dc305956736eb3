//! Trigger projection
//!
//! Turns a schedule's trigger definition into concrete future fire
//! instants. All projection happens in the schedule's timezone and is
//! converted back to UTC at the edge.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use std::str::FromStr;
use tracing::warn;

use crate::errors::ConfigError;
use crate::models::{parse_hhmm, RunWindowConfig, Schedule, ScheduleMode};

/// Compiled trigger for one schedule
#[derive(Debug, Clone)]
pub enum TriggerSpec {
    /// Every `minutes` minutes, anchored at the schedule's last run
    Interval { minutes: u32 },
    /// Cron expression evaluated in the schedule's timezone
    Cron(Box<CronSchedule>),
    /// Explicit daily clock times, ascending
    SpecificTimes(Vec<NaiveTime>),
}

/// Normalize a classic five-field cron expression to the seconds-first
/// form the parser expects; six- and seven-field expressions pass through
pub fn normalize_cron_expression(expression: &str) -> String {
    let fields = expression.split_whitespace().count();
    if fields == 5 {
        format!("0 {}", expression.trim())
    } else {
        expression.trim().to_string()
    }
}

/// Parse a cron expression, accepting the five-field classic form
pub fn parse_cron(expression: &str) -> Result<CronSchedule, ConfigError> {
    let normalized = normalize_cron_expression(expression);
    CronSchedule::from_str(&normalized)
        .map_err(|e| ConfigError::invalid_cron(expression, e.to_string()))
}

impl TriggerSpec {
    /// Compile the trigger from the schedule's mode-selected fields
    ///
    /// Only the fields of the active mode are consulted. Malformed
    /// entries in a `specific_times` list are skipped one by one; a
    /// schedule whose active fields yield nothing usable is an error.
    pub fn from_schedule(schedule: &Schedule) -> Result<Self, ConfigError> {
        let no_trigger = || ConfigError::NoUsableTrigger {
            id: schedule.id.clone(),
            mode: schedule.mode.as_str().to_string(),
        };

        match schedule.mode {
            ScheduleMode::Interval => match schedule.interval_minutes {
                Some(minutes) if minutes > 0 => Ok(TriggerSpec::Interval { minutes }),
                _ => Err(no_trigger()),
            },
            ScheduleMode::Cron => {
                let expression = schedule.cron_expression.as_deref().ok_or_else(no_trigger)?;
                Ok(TriggerSpec::Cron(Box::new(parse_cron(expression)?)))
            }
            ScheduleMode::SpecificTimes => {
                let raw = schedule.times.as_deref().ok_or_else(no_trigger)?;
                let mut times = Vec::with_capacity(raw.len());
                for value in raw {
                    match parse_hhmm(value) {
                        Ok(time) => times.push(time),
                        Err(_) => {
                            warn!(
                                "Schedule '{}': skipping unparseable time '{}'",
                                schedule.id, value
                            );
                        }
                    }
                }
                if times.is_empty() {
                    return Err(no_trigger());
                }
                times.sort();
                times.dedup();
                Ok(TriggerSpec::SpecificTimes(times))
            }
        }
    }

    /// First fire instant strictly after `after`
    ///
    /// `anchor` seeds interval triggers (the schedule's last run, or its
    /// creation time for a schedule that has never fired).
    pub fn next_fire(
        &self,
        tz: Tz,
        after: DateTime<Utc>,
        anchor: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match self {
            TriggerSpec::Interval { minutes } => {
                let step = Duration::minutes(i64::from(*minutes));
                if after < anchor {
                    return Some(anchor + step);
                }
                // Smallest anchor + k*step strictly after `after`
                let elapsed = (after - anchor).num_minutes();
                let k = elapsed / i64::from(*minutes) + 1;
                Some(anchor + step * (k as i32))
            }
            TriggerSpec::Cron(schedule) => schedule
                .after(&after.with_timezone(&tz))
                .next()
                .map(|local| local.with_timezone(&Utc)),
            TriggerSpec::SpecificTimes(times) => {
                let local_after = after.with_timezone(&tz);
                let mut day = local_after.date_naive();
                // A week of scan is always enough for daily clock times
                for _ in 0..8 {
                    for time in times {
                        let naive = day.and_time(*time);
                        let resolved = match tz.from_local_datetime(&naive) {
                            chrono::LocalResult::Single(dt) => Some(dt),
                            chrono::LocalResult::Ambiguous(first, _) => Some(first),
                            chrono::LocalResult::None => None,
                        };
                        if let Some(candidate) = resolved {
                            let candidate = candidate.with_timezone(&Utc);
                            if candidate > after {
                                return Some(candidate);
                            }
                        }
                    }
                    day = day.succ_opt()?;
                }
                None
            }
        }
    }
}

/// Project the next `count` admissible run instants for preview
///
/// Trigger instants are generated in order and filtered through the run
/// window; the scan is bounded so a window that never admits anything
/// terminates with fewer results instead of spinning.
pub fn next_run_times(
    trigger: &TriggerSpec,
    window: &RunWindowConfig,
    now: DateTime<Utc>,
    count: usize,
) -> Vec<DateTime<Utc>> {
    let horizon = now + Duration::days(370);
    let mut results = Vec::with_capacity(count);
    let mut cursor = now;
    let anchor = now;

    while results.len() < count && cursor < horizon {
        match trigger.next_fire(window.timezone, cursor, anchor) {
            Some(fire) if fire < horizon => {
                if super::window::is_admissible(fire, window) {
                    results.push(fire);
                }
                cursor = fire;
            }
            _ => break,
        }
    }
    results
}
