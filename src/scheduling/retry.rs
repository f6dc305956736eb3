//! Failure retry controller
//!
//! Retries live outside the regular trigger cadence: a failed run arms
//! a one-shot timer with exponential backoff, and the timer fires a
//! retry request back into the scheduler loop. At most one retry timer
//! exists per schedule; a newer failure or a success replaces or cancels
//! it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::models::RunWindowConfig;

/// Backoff delay before retry number `failed_attempts`
///
/// Doubles per consecutive failure: base, 2x, 4x, ...
pub fn backoff_delay(base_minutes: u32, failed_attempts: u32) -> Duration {
    let attempts = failed_attempts.max(1);
    let factor = 2u64.saturating_pow(attempts - 1);
    Duration::from_secs(u64::from(base_minutes) * 60 * factor)
}

#[derive(Debug)]
pub struct RetryController {
    tx: mpsc::UnboundedSender<String>,
    pending: HashMap<String, JoinHandle<()>>,
    standing_failure: Arc<AtomicBool>,
}

impl RetryController {
    /// `tx` carries schedule ids whose retry timer has elapsed
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            tx,
            pending: HashMap::new(),
            standing_failure: Arc::new(AtomicBool::new(false)),
        }
    }

    /// React to a failed run
    ///
    /// Arms a backoff timer unless retries are disabled or the attempt
    /// budget is exhausted; exhaustion raises the standing-failure flag
    /// instead. An already-armed timer for the same schedule is replaced.
    pub fn on_failure(
        &mut self,
        schedule_id: &str,
        failed_attempts: u32,
        window: &RunWindowConfig,
    ) {
        if !window.retry_on_failure {
            return;
        }
        if failed_attempts >= window.retry_max_attempts {
            warn!(
                "Schedule '{schedule_id}': {failed_attempts} consecutive failures, giving up until next trigger"
            );
            self.standing_failure.store(true, Ordering::Relaxed);
            self.cancel(schedule_id);
            return;
        }

        let delay = backoff_delay(window.retry_delay_minutes, failed_attempts);
        info!(
            "Schedule '{schedule_id}': retry {failed_attempts}/{} in {}s",
            window.retry_max_attempts,
            delay.as_secs()
        );
        self.cancel(schedule_id);
        let tx = self.tx.clone();
        let id = schedule_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(id);
        });
        self.pending.insert(schedule_id.to_string(), handle);
    }

    /// React to a successful run: cancel any pending retry and clear the
    /// standing-failure flag
    pub fn on_success(&mut self, schedule_id: &str) {
        self.cancel(schedule_id);
        self.standing_failure.store(false, Ordering::Relaxed);
    }

    fn cancel(&mut self, schedule_id: &str) {
        if let Some(handle) = self.pending.remove(schedule_id) {
            handle.abort();
        }
    }

    /// Shared flag raised when some schedule has exhausted its retries
    pub fn standing_failure_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.standing_failure)
    }

    pub fn has_pending(&self, schedule_id: &str) -> bool {
        self.pending.contains_key(schedule_id)
    }

    /// Abort all pending retry timers
    pub fn shutdown(&mut self) {
        for (_, handle) in self.pending.drain() {
            handle.abort();
        }
    }
}

impl Drop for RetryController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> RunWindowConfig {
        RunWindowConfig {
            timezone: chrono_tz::UTC,
            weekdays_only: false,
            enabled_days: vec![1, 2, 3, 4, 5, 6, 7],
            start_time: None,
            end_time: None,
            max_runs_per_day: 24,
            retry_on_failure: true,
            retry_max_attempts: 3,
            retry_delay_minutes: 5,
        }
    }

    #[test]
    fn backoff_doubles_per_consecutive_failure() {
        assert_eq!(backoff_delay(5, 1), Duration::from_secs(5 * 60));
        assert_eq!(backoff_delay(5, 2), Duration::from_secs(10 * 60));
        assert_eq!(backoff_delay(5, 3), Duration::from_secs(20 * 60));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_fires_after_the_backoff_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut controller = RetryController::new(tx);
        controller.on_failure("sched-1", 1, &window());
        assert!(controller.has_pending("sched-1"));

        tokio::time::advance(Duration::from_secs(5 * 60 + 1)).await;
        assert_eq!(rx.recv().await.as_deref(), Some("sched-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_raise_standing_failure_and_no_fourth_retry() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut controller = RetryController::new(tx);
        let flag = controller.standing_failure_flag();

        controller.on_failure("sched-1", 3, &window());
        assert!(!controller.has_pending("sched-1"));
        assert!(flag.load(Ordering::Relaxed));

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn success_cancels_pending_retry_and_clears_flag() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut controller = RetryController::new(tx);
        let flag = controller.standing_failure_flag();
        flag.store(true, Ordering::Relaxed);

        controller.on_failure("sched-1", 1, &window());
        controller.on_success("sched-1");
        assert!(!controller.has_pending("sched-1"));
        assert!(!flag.load(Ordering::Relaxed));

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_failure_replaces_the_pending_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut controller = RetryController::new(tx);
        controller.on_failure("sched-1", 1, &window());
        controller.on_failure("sched-1", 2, &window());

        // First timer (5m) was aborted; nothing at the 5 minute mark
        tokio::time::advance(Duration::from_secs(5 * 60 + 1)).await;
        assert!(rx.try_recv().is_err());

        // Second timer (10m) fires
        tokio::time::advance(Duration::from_secs(5 * 60)).await;
        assert_eq!(rx.recv().await.as_deref(), Some("sched-1"));
    }

    #[test]
    fn retries_disabled_means_no_timer() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let (tx, _rx) = mpsc::unbounded_channel();
            let mut controller = RetryController::new(tx);
            let mut cfg = window();
            cfg.retry_on_failure = false;
            controller.on_failure("sched-1", 1, &cfg);
            assert!(!controller.has_pending("sched-1"));
        });
    }
}
