//! Scheduling engine
//!
//! Window evaluation and run budgets are pure and stateless
//! ([`window`], [`budget`]); trigger projection compiles schedule
//! definitions into fire instants ([`projection`]); the registry binds
//! schedules to live jobs ([`registry`]); the guard serializes runs
//! ([`guard`]); retries run on their own timers ([`retry`]); and the
//! service ties it all to the evaluation loop ([`runner`]).

pub mod budget;
pub mod guard;
pub mod projection;
pub mod registry;
pub mod retry;
pub mod runner;
pub mod window;

pub use guard::{ExecutionGuard, RunPermit};
pub use projection::TriggerSpec;
pub use registry::JobRegistry;
pub use retry::RetryController;
pub use runner::{SchedulerService, DEFAULT_SCHEDULE_ID};
