//! Per-schedule daily run budget
//!
//! The budget is ephemeral process state: a restart forgets today's
//! count, which errs on the side of running rather than silently
//! starving a schedule.

use chrono::{DateTime, Utc};

use crate::models::{RunBudgetState, RunWindowConfig};

/// Roll the budget over if the local date has changed since the last run
///
/// The date is taken in the window's timezone, so "today" means the
/// schedule's today, not the server's.
pub fn roll_over_if_new_day(
    state: &mut RunBudgetState,
    now: DateTime<Utc>,
    config: &RunWindowConfig,
) {
    let today = now.with_timezone(&config.timezone).date_naive();
    if state.last_run_date != Some(today) {
        state.runs_today = 0;
        state.failed_attempts = 0;
        state.last_run_date = Some(today);
    }
}

/// Whether the daily budget still has headroom at `now`
pub fn within_daily_limit(
    state: &mut RunBudgetState,
    now: DateTime<Utc>,
    config: &RunWindowConfig,
) -> bool {
    roll_over_if_new_day(state, now, config);
    state.runs_today < config.max_runs_per_day
}

/// Record a completed run attempt
///
/// Every attempt consumes budget, success or not; a success additionally
/// clears the consecutive-failure counter.
pub fn record_run(
    state: &mut RunBudgetState,
    now: DateTime<Utc>,
    config: &RunWindowConfig,
    success: bool,
) {
    roll_over_if_new_day(state, now, config);
    state.runs_today += 1;
    if success {
        state.failed_attempts = 0;
    } else {
        state.failed_attempts += 1;
    }
}

/// Combined scheduled-path gate: window admissibility plus daily budget
pub fn should_run_now(
    state: &mut RunBudgetState,
    now: DateTime<Utc>,
    config: &RunWindowConfig,
) -> bool {
    super::window::is_admissible(now, config) && within_daily_limit(state, now, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config() -> RunWindowConfig {
        RunWindowConfig {
            timezone: chrono_tz::Asia::Singapore,
            weekdays_only: false,
            enabled_days: vec![1, 2, 3, 4, 5, 6, 7],
            start_time: None,
            end_time: None,
            max_runs_per_day: 2,
            retry_on_failure: true,
            retry_max_attempts: 3,
            retry_delay_minutes: 5,
        }
    }

    #[test]
    fn budget_exhausts_and_rolls_over_on_local_date_change() {
        let cfg = config();
        let mut state = RunBudgetState::default();
        let day_one = Utc.with_ymd_and_hms(2026, 9, 1, 4, 0, 0).unwrap();

        assert!(within_daily_limit(&mut state, day_one, &cfg));
        record_run(&mut state, day_one, &cfg, true);
        record_run(&mut state, day_one, &cfg, true);
        assert!(!within_daily_limit(&mut state, day_one, &cfg));

        // 17:00 UTC is already Sept 2 in Singapore: fresh budget
        let next_local_day = Utc.with_ymd_and_hms(2026, 9, 1, 17, 0, 0).unwrap();
        assert!(within_daily_limit(&mut state, next_local_day, &cfg));
        assert_eq!(state.runs_today, 0);
    }

    #[test]
    fn rollover_does_not_happen_within_the_same_local_day() {
        let cfg = config();
        let mut state = RunBudgetState::default();
        let morning = Utc.with_ymd_and_hms(2026, 9, 1, 1, 0, 0).unwrap();
        let afternoon = Utc.with_ymd_and_hms(2026, 9, 1, 8, 0, 0).unwrap();

        record_run(&mut state, morning, &cfg, true);
        roll_over_if_new_day(&mut state, afternoon, &cfg);
        assert_eq!(state.runs_today, 1);
    }

    #[test]
    fn failures_count_consecutively_and_success_clears_them() {
        let cfg = config();
        let mut state = RunBudgetState::default();
        let now = Utc.with_ymd_and_hms(2026, 9, 1, 4, 0, 0).unwrap();

        record_run(&mut state, now, &cfg, false);
        record_run(&mut state, now, &cfg, false);
        assert_eq!(state.failed_attempts, 2);

        record_run(&mut state, now, &cfg, true);
        assert_eq!(state.failed_attempts, 0);
        assert_eq!(state.runs_today, 3);
    }

    #[test]
    fn failed_runs_still_consume_budget() {
        let cfg = config();
        let mut state = RunBudgetState::default();
        let now = Utc.with_ymd_and_hms(2026, 9, 1, 4, 0, 0).unwrap();

        record_run(&mut state, now, &cfg, false);
        record_run(&mut state, now, &cfg, false);
        assert!(!within_daily_limit(&mut state, now, &cfg));
    }
}
