//! Scheduled blockchain governance proposal monitor
//!
//! Watches on-disk proposal datasets for a set of blockchain protocols,
//! refreshing them on user-defined schedules and notifying configured
//! channels when new proposals appear. The scheduling engine supports
//! interval, cron, and fixed-clock-time triggers, run windows with
//! weekday and time-of-day rules, daily run budgets, and exponential
//! retry backoff on failure.

pub mod config;
pub mod datasets;
pub mod errors;
pub mod fetcher;
pub mod models;
pub mod notifications;
pub mod refresh;
pub mod scheduling;
pub mod store;
