//! Core data model for schedules, run windows, budgets, and fetch results

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::ConfigError;

/// Identifier of one monitored protocol (e.g. "ethereum", "tron")
pub type ProtocolId = String;

/// Trigger mode of a schedule
///
/// Exactly one of the optional trigger fields on [`Schedule`] is
/// authoritative, selected by this mode; the others are preserved but
/// ignored, so switching modes back and forth does not lose data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    /// Fire every `interval_minutes` minutes
    Interval,
    /// Fire per a five-field cron expression
    Cron,
    /// Fire at explicit daily clock times
    SpecificTimes,
}

impl ScheduleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleMode::Interval => "interval",
            ScheduleMode::Cron => "cron",
            ScheduleMode::SpecificTimes => "specific_times",
        }
    }
}

/// A durable, user-authored schedule definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    /// Immutable, globally unique identifier
    pub id: String,
    pub name: String,
    /// Protocols this schedule fetches; empty means "the configured default set"
    #[serde(default)]
    pub chains: Vec<ProtocolId>,
    pub mode: ScheduleMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_expression: Option<String>,
    /// Daily clock times as "HH:MM" strings, ascending
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub times: Option<Vec<String>>,
    #[serde(default = "default_weekdays_only")]
    pub weekdays_only: bool,
    /// IANA timezone identifier the schedule is evaluated in
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Optional daily end-of-window time as "HH:MM"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
}

fn default_weekdays_only() -> bool {
    true
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_enabled() -> bool {
    true
}

impl Schedule {
    /// Create a new interval schedule with a fresh unique id
    pub fn new_interval<S: Into<String>>(name: S, interval_minutes: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            chains: Vec::new(),
            mode: ScheduleMode::Interval,
            interval_minutes: Some(interval_minutes),
            cron_expression: None,
            times: None,
            weekdays_only: default_weekdays_only(),
            timezone: default_timezone(),
            end_time: None,
            enabled: true,
            created_at: Utc::now(),
            last_run: None,
        }
    }

    /// Resolve the schedule's IANA timezone
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        Tz::from_str(&self.timezone).map_err(|_| ConfigError::UnknownTimezone {
            zone: self.timezone.clone(),
        })
    }
}

/// Process-wide run-window defaults applied where a schedule is silent
///
/// Schedules carry their own `weekdays_only`, `timezone` and `end_time`;
/// everything else here fills the gaps when deriving a [`RunWindowConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowDefaults {
    #[serde(default = "default_weekdays_only")]
    pub weekdays_only: bool,
    /// ISO weekdays (Monday=1 .. Sunday=7) on which runs are allowed
    #[serde(default = "default_enabled_days")]
    pub enabled_days: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default = "default_max_runs_per_day")]
    pub max_runs_per_day: u32,
    #[serde(default = "default_retry_on_failure")]
    pub retry_on_failure: bool,
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    #[serde(default = "default_retry_delay_minutes")]
    pub retry_delay_minutes: u32,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_enabled_days() -> Vec<u8> {
    vec![1, 2, 3, 4, 5]
}

fn default_max_runs_per_day() -> u32 {
    24
}

fn default_retry_on_failure() -> bool {
    true
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_delay_minutes() -> u32 {
    5
}

impl Default for WindowDefaults {
    fn default() -> Self {
        Self {
            weekdays_only: default_weekdays_only(),
            enabled_days: default_enabled_days(),
            start_time: None,
            end_time: None,
            max_runs_per_day: default_max_runs_per_day(),
            retry_on_failure: default_retry_on_failure(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_delay_minutes: default_retry_delay_minutes(),
            timezone: default_timezone(),
        }
    }
}

/// Fully-resolved run window configuration, immutable per evaluation
#[derive(Debug, Clone)]
pub struct RunWindowConfig {
    pub timezone: Tz,
    pub weekdays_only: bool,
    pub enabled_days: Vec<u8>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub max_runs_per_day: u32,
    pub retry_on_failure: bool,
    pub retry_max_attempts: u32,
    pub retry_delay_minutes: u32,
}

impl RunWindowConfig {
    /// Derive a window configuration from a schedule plus process defaults
    ///
    /// The schedule's own `weekdays_only`, `timezone` and `end_time` win;
    /// enabled days, start time, the daily budget and retry policy come
    /// from the defaults.
    pub fn from_schedule(
        schedule: &Schedule,
        defaults: &WindowDefaults,
    ) -> Result<Self, ConfigError> {
        let end_time = match schedule.end_time.as_deref() {
            Some(s) => Some(parse_hhmm(s)?),
            None => match defaults.end_time.as_deref() {
                Some(s) => Some(parse_hhmm(s)?),
                None => None,
            },
        };
        let start_time = match defaults.start_time.as_deref() {
            Some(s) => Some(parse_hhmm(s)?),
            None => None,
        };

        Ok(Self {
            timezone: schedule.tz()?,
            weekdays_only: schedule.weekdays_only,
            enabled_days: defaults.enabled_days.clone(),
            start_time,
            end_time,
            max_runs_per_day: defaults.max_runs_per_day,
            retry_on_failure: defaults.retry_on_failure,
            retry_max_attempts: defaults.retry_max_attempts,
            retry_delay_minutes: defaults.retry_delay_minutes,
        })
    }

}

/// Parse an "HH:MM" clock time string
pub fn parse_hhmm(value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| ConfigError::invalid_time(value))
}

/// Per-schedule run budget state, ephemeral and owned by the scheduler
///
/// `runs_today` and `failed_attempts` reset exactly when the observed
/// local date differs from `last_run_date`; `failed_attempts` also
/// resets on any recorded success.
#[derive(Debug, Clone, Default)]
pub struct RunBudgetState {
    pub runs_today: u32,
    pub last_run_date: Option<NaiveDate>,
    pub failed_attempts: u32,
}

/// Durable summary of the most recent completed run, overwritten each time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastCheckRecord {
    pub timestamp: DateTime<Utc>,
    pub new_proposals_count: usize,
    pub protocols_with_new: Vec<ProtocolId>,
}

/// One proposal record; only `number` is meaningful to the core,
/// the rest is carried for notification display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalRecord {
    pub number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

/// Newly observed proposals for one run, keyed by protocol
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchDelta {
    pub by_protocol: BTreeMap<ProtocolId, Vec<ProposalRecord>>,
}

impl FetchDelta {
    pub fn is_empty(&self) -> bool {
        self.by_protocol.values().all(|records| records.is_empty())
    }

    /// Total number of new proposals across all protocols
    pub fn total(&self) -> usize {
        self.by_protocol.values().map(|records| records.len()).sum()
    }

    /// Protocols that contributed at least one new proposal
    pub fn protocols(&self) -> Vec<ProtocolId> {
        self.by_protocol
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(protocol, _)| protocol.clone())
            .collect()
    }

    pub fn insert(&mut self, protocol: ProtocolId, records: Vec<ProposalRecord>) {
        if !records.is_empty() {
            self.by_protocol.insert(protocol, records);
        }
    }
}

/// Set of known proposal identities for one protocol
pub type ProposalNumbers = BTreeSet<u64>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hhmm_accepts_valid_times() {
        assert_eq!(
            parse_hhmm("09:30").unwrap(),
            NaiveTime::from_hms_opt(9, 30, 0).unwrap()
        );
        assert_eq!(
            parse_hhmm(" 23:59 ").unwrap(),
            NaiveTime::from_hms_opt(23, 59, 0).unwrap()
        );
    }

    #[test]
    fn parse_hhmm_rejects_garbage() {
        assert!(parse_hhmm("25:00").is_err());
        assert!(parse_hhmm("9am").is_err());
        assert!(parse_hhmm("").is_err());
    }

    #[test]
    fn schedule_roundtrips_through_json_preserving_inactive_fields() {
        let mut schedule = Schedule::new_interval("hourly", 60);
        // Leftover fields from a previous mode stay on the record
        schedule.times = Some(vec!["09:00".to_string(), "17:00".to_string()]);
        schedule.cron_expression = Some("0 */2 * * *".to_string());

        let json = serde_json::to_string(&schedule).unwrap();
        let back: Schedule = serde_json::from_str(&json).unwrap();

        assert_eq!(back.mode, ScheduleMode::Interval);
        assert_eq!(back.interval_minutes, Some(60));
        assert_eq!(back.times.as_deref(), Some(&["09:00".to_string(), "17:00".to_string()][..]));
        assert_eq!(back.cron_expression.as_deref(), Some("0 */2 * * *"));
    }

    #[test]
    fn unknown_timezone_is_a_config_error() {
        let mut schedule = Schedule::new_interval("bad-tz", 60);
        schedule.timezone = "Mars/Olympus_Mons".to_string();
        assert!(matches!(
            schedule.tz(),
            Err(ConfigError::UnknownTimezone { .. })
        ));
    }

    #[test]
    fn fetch_delta_totals_and_protocols() {
        let mut delta = FetchDelta::default();
        delta.insert(
            "ethereum".to_string(),
            vec![
                ProposalRecord {
                    number: 4,
                    title: Some("EIP-4".to_string()),
                    status: None,
                    kind: None,
                    created: None,
                },
                ProposalRecord {
                    number: 5,
                    title: None,
                    status: None,
                    kind: None,
                    created: None,
                },
            ],
        );
        delta.insert("tron".to_string(), vec![]);

        assert_eq!(delta.total(), 2);
        assert_eq!(delta.protocols(), vec!["ethereum".to_string()]);
        assert!(!delta.is_empty());
    }
}
