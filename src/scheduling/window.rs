//! Run-window evaluation
//!
//! Pure functions over a [`RunWindowConfig`] and an instant; no clock
//! reads and no stored state, so every gate decision is reproducible.

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::models::RunWindowConfig;

/// Whether a run is admissible at `now` under the window rules
///
/// The instant is converted into the window's timezone first; all
/// day-of-week and clock comparisons happen in local time. The time
/// window is inclusive on both ends, and an absent end time means the
/// window stays open for the rest of the day.
pub fn is_admissible(now: DateTime<Utc>, config: &RunWindowConfig) -> bool {
    let local = now.with_timezone(&config.timezone);
    let weekday = local.weekday().number_from_monday() as u8;

    if config.weekdays_only && weekday > 5 {
        return false;
    }
    if !config.enabled_days.contains(&weekday) {
        return false;
    }

    let time = local.time();
    if let Some(start) = config.start_time {
        if time < start {
            return false;
        }
    }
    if let Some(end) = config.end_time {
        // Compare at minute precision so an 18:00:30 tick still lands
        // inside a window ending at 18:00
        let minute = time.with_second(0).and_then(|t| t.with_nanosecond(0));
        if minute.map_or(time > end, |t| t > end) {
            return false;
        }
    }

    true
}
